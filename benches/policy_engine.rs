use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sentinel_gateway::core::{BehaviorStore, Classification, PolicyEngine, Verdict};
use sentinel_gateway::models::PolicyConfig;
use std::sync::Arc;

fn policy_engine_benchmark(c: &mut Criterion) {
    let store = Arc::new(BehaviorStore::new());
    let engine = PolicyEngine::new(
        store.clone(),
        PolicyConfig {
            suspicion_threshold: 3,
            rate_threshold_per_minute: 1_000_000.0,
        },
    );
    let classification = Classification {
        prediction: Verdict::Normal,
        confidence: 0.9,
        explanation: None,
        model: None,
        degraded: false,
    };

    c.bench_function("observe_and_decide", |b| {
        b.iter(|| {
            store.observe(black_box("198.51.100.1"));
            black_box(engine.decide(black_box("198.51.100.1"), &classification))
        })
    });
}

criterion_group!(benches, policy_engine_benchmark);
criterion_main!(benches);
