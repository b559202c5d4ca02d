//! Block/allow policy for the detection gateway.
//!
//! The policy engine is a pure function of the behavior store and an
//! incoming classification; it holds no state of its own. Rules are
//! evaluated in order and the first match wins:
//!
//! 1. an already-blocked identity stays blocked (sticky),
//! 2. repeated anomalous classifications exceed the suspicion threshold,
//! 3. the request rate exceeds the configured ceiling, once the request
//!    count alone exceeds it.
//!
//! The rate check fires independently of classification correctness, so
//! a degraded or offline classifier still leaves a line of defense.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::core::behavior_store::{BehaviorStore, IdentityRecord};
use crate::core::classifier::Classification;
use crate::models::PolicyConfig;
use crate::utils::elapsed_minutes;

/// Floor for the elapsed-time divisor: one second. A brand-new identity
/// (`first_seen == last_seen`) must never divide by zero.
const MIN_ELAPSED_MINUTES: f64 = 1.0 / 60.0;

/// Why an identity was blocked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockReason {
    AlreadyBlocked,
    RepeatedAnomalies,
    ExcessiveRate,
}

impl BlockReason {
    /// Machine-readable reason code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            BlockReason::AlreadyBlocked => "already-blocked",
            BlockReason::RepeatedAnomalies => "repeated-anomalous-activity",
            BlockReason::ExcessiveRate => "excessive-request-rate",
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BlockReason::AlreadyBlocked => "already blocked",
            BlockReason::RepeatedAnomalies => "repeated anomalous activity",
            BlockReason::ExcessiveRate => "excessive request rate",
        };
        write!(f, "{}", text)
    }
}

/// Outcome of a policy decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Block(BlockReason),
}

/// Requests per minute over the record's lifetime, floored at one second
/// of elapsed time
pub fn request_rate(record: &IdentityRecord) -> f64 {
    let elapsed = elapsed_minutes(record.first_seen, record.last_seen).max(MIN_ELAPSED_MINUTES);
    record.request_count as f64 / elapsed
}

/// The policy engine
pub struct PolicyEngine {
    store: Arc<BehaviorStore>,
    config: PolicyConfig,
}

impl PolicyEngine {
    /// Create a new policy engine over the given behavior store
    pub fn new(store: Arc<BehaviorStore>, config: PolicyConfig) -> Self {
        Self { store, config }
    }

    /// Decide whether the current request from `identity` is allowed.
    ///
    /// Must be called after `observe` has recorded the request. An absent
    /// record (raced with expiry) is treated as allow.
    pub fn decide(&self, identity: &str, classification: &Classification) -> Decision {
        let Some(record) = self.store.get(identity) else {
            return Decision::Allow;
        };

        if record.blocked {
            return Decision::Block(BlockReason::AlreadyBlocked);
        }

        if classification.is_anomalous() {
            if let Some(suspicions) = self.store.mark_suspicious(identity) {
                if suspicions >= u64::from(self.config.suspicion_threshold) {
                    return Decision::Block(BlockReason::RepeatedAnomalies);
                }
            }
        }

        // Fewer requests than the per-minute ceiling can never be a
        // sustained flood; without this gate the one-second elapsed floor
        // would flag the second request of any burst.
        if record.request_count as f64 > self.config.rate_threshold_per_minute
            && request_rate(&record) > self.config.rate_threshold_per_minute
        {
            return Decision::Block(BlockReason::ExcessiveRate);
        }

        Decision::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Classification;
    use chrono::{Duration, Utc};

    fn engine(store: Arc<BehaviorStore>) -> PolicyEngine {
        PolicyEngine::new(
            store,
            PolicyConfig {
                suspicion_threshold: 3,
                rate_threshold_per_minute: 100.0,
            },
        )
    }

    fn anomalous() -> Classification {
        Classification {
            prediction: crate::core::Verdict::Anomalous,
            confidence: 0.95,
            explanation: None,
            model: None,
            degraded: false,
        }
    }

    fn normal() -> Classification {
        Classification {
            prediction: crate::core::Verdict::Normal,
            confidence: 0.9,
            explanation: None,
            model: None,
            degraded: false,
        }
    }

    #[test]
    fn test_unknown_identity_is_allowed() {
        let store = Arc::new(BehaviorStore::new());
        let engine = engine(store);
        assert_eq!(engine.decide("10.0.0.1", &normal()), Decision::Allow);
    }

    #[test]
    fn test_repeated_anomalies_block_on_third() {
        let store = Arc::new(BehaviorStore::new());
        let engine = engine(store.clone());

        for _ in 0..2 {
            store.observe("10.0.0.5");
            assert_eq!(engine.decide("10.0.0.5", &anomalous()), Decision::Allow);
        }

        store.observe("10.0.0.5");
        assert_eq!(
            engine.decide("10.0.0.5", &anomalous()),
            Decision::Block(BlockReason::RepeatedAnomalies)
        );
    }

    #[test]
    fn test_block_is_sticky_regardless_of_later_classifications() {
        let store = Arc::new(BehaviorStore::new());
        let engine = engine(store.clone());

        store.observe("10.0.0.5");
        store.set_blocked("10.0.0.5", "repeated anomalous activity");

        for _ in 0..5 {
            store.observe("10.0.0.5");
            assert_eq!(
                engine.decide("10.0.0.5", &normal()),
                Decision::Block(BlockReason::AlreadyBlocked)
            );
        }

        // An explicit unblock lifts it
        store.clear_blocked("10.0.0.5");
        store.observe("10.0.0.5");
        assert_eq!(engine.decide("10.0.0.5", &normal()), Decision::Allow);
    }

    #[test]
    fn test_excessive_rate_blocks_normal_traffic() {
        let store = Arc::new(BehaviorStore::new());
        let engine = engine(store.clone());

        // 150 requests land within far less than a minute, so the
        // per-minute rate shoots past 100 even with every classification
        // normal
        let mut decision = Decision::Allow;
        for _ in 0..150 {
            store.observe("192.0.2.4");
            decision = engine.decide("192.0.2.4", &normal());
            if decision != Decision::Allow {
                break;
            }
        }
        assert_eq!(decision, Decision::Block(BlockReason::ExcessiveRate));
    }

    #[test]
    fn test_short_burst_below_ceiling_is_not_rate_blocked() {
        let store = Arc::new(BehaviorStore::new());
        let engine = engine(store.clone());

        // A handful of back-to-back requests land inside the one-second
        // elapsed floor. The raw per-minute rate looks huge, but with
        // fewer requests than the ceiling allows in a minute this is a
        // burst, not a flood.
        for _ in 0..10 {
            store.observe("203.0.113.9");
            assert_eq!(engine.decide("203.0.113.9", &normal()), Decision::Allow);
        }
    }

    #[test]
    fn test_suspicion_threshold_wins_over_rate_during_burst() {
        let store = Arc::new(BehaviorStore::new());
        let engine = engine(store.clone());

        // Two rapid anomalous requests must not trip the rate rule; the
        // third must be denied for repeated anomalies, not for rate.
        for _ in 0..2 {
            store.observe("203.0.113.10");
            assert_eq!(engine.decide("203.0.113.10", &anomalous()), Decision::Allow);
        }
        store.observe("203.0.113.10");
        assert_eq!(
            engine.decide("203.0.113.10", &anomalous()),
            Decision::Block(BlockReason::RepeatedAnomalies)
        );
    }

    #[test]
    fn test_brand_new_identity_never_blocked_on_rate() {
        let store = Arc::new(BehaviorStore::new());
        let engine = engine(store.clone());

        // One request with first_seen == last_seen: the one-second floor
        // yields 60 req/min, under the 100 req/min threshold
        store.observe("198.51.100.1");
        assert_eq!(engine.decide("198.51.100.1", &normal()), Decision::Allow);
    }

    #[test]
    fn test_request_rate_uses_elapsed_floor() {
        let now = Utc::now();
        let record = IdentityRecord {
            first_seen: now,
            last_seen: now,
            request_count: 1,
            suspicion_count: 0,
            blocked: false,
            blocked_at: None,
            block_reason: None,
        };
        assert_eq!(request_rate(&record), 60.0);

        let spread = IdentityRecord {
            first_seen: now,
            last_seen: now + Duration::minutes(2),
            request_count: 300,
            suspicion_count: 0,
            blocked: false,
            blocked_at: None,
            block_reason: None,
        };
        assert_eq!(request_rate(&spread), 150.0);
    }

    #[test]
    fn test_reason_codes_are_machine_readable() {
        assert_eq!(BlockReason::AlreadyBlocked.code(), "already-blocked");
        assert_eq!(
            BlockReason::RepeatedAnomalies.code(),
            "repeated-anomalous-activity"
        );
        assert_eq!(BlockReason::ExcessiveRate.code(), "excessive-request-rate");
        assert_eq!(
            BlockReason::RepeatedAnomalies.to_string(),
            "repeated anomalous activity"
        );
    }
}
