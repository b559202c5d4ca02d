//! Sentinel Gateway
//!
//! This is the main entry point for the detection gateway.
//! It initializes the application components, starts the background
//! maintenance tasks, and serves the HTTP API.

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use dotenv::dotenv;
use log::info;
use std::sync::Arc;
use std::time::Duration;

use sentinel_gateway::api::{self, ApiState};
use sentinel_gateway::config;
use sentinel_gateway::core::{
    BehaviorStore, EnforcementPoint, EventNotifier, HttpClassifier, IngressGateway,
    MitigationDispatcher, PolicyEngine, RyuEnforcementPoint,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    env_logger::init();

    info!("Starting Sentinel Gateway...");

    // Load configuration
    let config = config::load_config().context("Failed to load configuration")?;
    let config = Arc::new(config);

    // External collaborators
    let classifier = Arc::new(
        HttpClassifier::new(&config.classifier)
            .context("Failed to create classifier client")?,
    );
    let enforcement: Arc<dyn EnforcementPoint> = Arc::new(
        RyuEnforcementPoint::new(&config.enforcement)
            .context("Failed to create enforcement client")?,
    );

    // Core components
    let store = Arc::new(BehaviorStore::new());
    let dispatcher = Arc::new(MitigationDispatcher::new(enforcement.clone(), store.clone()));
    let notifier = Arc::new(EventNotifier::new(config.notifier.event_buffer));
    let policy = PolicyEngine::new(store.clone(), config.policy.clone());
    let gateway = Arc::new(IngressGateway::new(
        classifier,
        store.clone(),
        policy,
        dispatcher.clone(),
        notifier.clone(),
    ));

    // Periodic expiry sweep over the behavior store
    {
        let store = store.clone();
        let retention = chrono::Duration::seconds(config.behavior.retention_seconds as i64);
        let interval = Duration::from_secs(config.behavior.sweep_interval_seconds.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = store.purge_expired(chrono::Utc::now(), retention);
                if removed > 0 {
                    info!("expiry sweep removed {} identity records", removed);
                }
            }
        });
    }

    // Periodic retry of failed rule installations and removals
    if config.enforcement.retry_interval_seconds > 0 {
        let dispatcher = dispatcher.clone();
        let interval = Duration::from_secs(config.enforcement.retry_interval_seconds);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let recovered = dispatcher.retry_failed().await;
                if recovered > 0 {
                    info!("retry pass recovered {} stuck enforcement records", recovered);
                }
            }
        });
    }

    // Create API state
    let state = web::Data::new(ApiState {
        gateway,
        dispatcher,
        notifier,
        enforcement,
        config: config.clone(),
    });

    // Start HTTP server
    HttpServer::new(move || App::new().app_data(state.clone()).configure(api::config))
        .bind((config.server.host.as_str(), config.server.port))
        .with_context(|| {
            format!(
                "Failed to bind {}:{}",
                config.server.host, config.server.port
            )
        })?
        .run()
        .await?;

    Ok(())
}
