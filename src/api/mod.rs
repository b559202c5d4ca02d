//! API endpoints for the detection gateway.
//!
//! This module provides the HTTP surface: detection requests, manual
//! unblock, the active block list, the observer event stream, and a
//! health check.

use actix_web::{web, HttpResponse, Responder};
use futures::StreamExt;
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::core::{
    DetectionOutcome, DetectionRequest, EnforcementPoint, Event, EventNotifier, GatewayError,
    IngressGateway, MitigationDispatcher,
};
use crate::models::Config;

pub struct ApiState {
    pub gateway: Arc<IngressGateway>,
    pub dispatcher: Arc<MitigationDispatcher>,
    pub notifier: Arc<EventNotifier>,
    pub enforcement: Arc<dyn EnforcementPoint>,
    pub config: Arc<Config>,
}

/// API configuration function for Actix-web
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/health").route(web::get().to(health_check)))
            .service(web::resource("/detect").route(web::post().to(detect)))
            .service(web::resource("/unblock").route(web::post().to(unblock)))
            .service(web::resource("/blocked").route(web::get().to(list_blocked)))
            .service(web::resource("/events").route(web::get().to(event_stream))),
    );
}

/// Health check endpoint response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    enforcement_reachable: bool,
    blocked_identities: usize,
    observers: usize,
    suspicion_threshold: u32,
    rate_threshold_per_minute: f64,
}

/// Manual unblock request
#[derive(Debug, Serialize, Deserialize)]
pub struct UnblockRequest {
    pub identity: String,
}

#[derive(Serialize)]
struct UnblockResponse {
    success: bool,
    /// `removed` on full success, `remove-failed` when the identity is
    /// allowed again locally but the remote rule removal failed,
    /// `not-blocked` when no record existed
    status: &'static str,
}

#[derive(Serialize)]
struct RejectionResponse {
    status: &'static str,
    message: String,
}

/// Health check endpoint
async fn health_check(state: web::Data<ApiState>) -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        enforcement_reachable: state.enforcement.is_reachable().await,
        blocked_identities: state.dispatcher.list_active().await.len(),
        observers: state.notifier.observer_count(),
        suspicion_threshold: state.config.policy.suspicion_threshold,
        rate_threshold_per_minute: state.config.policy.rate_threshold_per_minute,
    })
}

/// Detection endpoint: allow-with-verdict, block rejection, or client error
async fn detect(
    state: web::Data<ApiState>,
    request: web::Json<DetectionRequest>,
) -> impl Responder {
    match state.gateway.handle_detection(&request).await {
        Ok(outcome @ DetectionOutcome::Allowed { .. }) => HttpResponse::Ok().json(outcome),
        Ok(outcome @ DetectionOutcome::Blocked { .. }) => HttpResponse::Forbidden().json(outcome),
        Err(GatewayError::InvalidInput(message)) => {
            HttpResponse::BadRequest().json(RejectionResponse {
                status: "rejected-invalid-input",
                message,
            })
        }
    }
}

/// Manual unblock endpoint
async fn unblock(state: web::Data<ApiState>, request: web::Json<UnblockRequest>) -> impl Responder {
    let known = state
        .dispatcher
        .list_active()
        .await
        .iter()
        .any(|r| r.identity == request.identity);

    let success = state.dispatcher.unblock(&request.identity).await;

    // The policy-layer block is lifted whenever a record existed, even if
    // the remote removal failed
    if known {
        state
            .notifier
            .publish(Event::identity_unblocked(&request.identity));
    }

    let status = if !known {
        "not-blocked"
    } else if success {
        "removed"
    } else {
        "remove-failed"
    };
    HttpResponse::Ok().json(UnblockResponse { success, status })
}

/// Active block records, insertion-ordered
async fn list_blocked(state: web::Data<ApiState>) -> impl Responder {
    HttpResponse::Ok().json(state.dispatcher.list_active().await)
}

fn event_line(event: &Event) -> web::Bytes {
    let mut line = serde_json::to_vec(event).unwrap_or_default();
    line.push(b'\n');
    web::Bytes::from(line)
}

/// NDJSON event stream: a snapshot of the active block records first,
/// then incremental events. The receiver is registered before the
/// snapshot is taken, so a transition can appear twice but is never
/// missed by a late subscriber.
async fn event_stream(state: web::Data<ApiState>) -> HttpResponse {
    let receiver = state.notifier.subscribe();
    let snapshot = state.dispatcher.list_active().await;

    let snapshot_stream = futures::stream::iter(snapshot.into_iter().map(|record| {
        Ok::<web::Bytes, actix_web::Error>(event_line(&Event::IdentityBlocked { record }))
    }));

    let live_stream = futures::stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    return Some((Ok::<web::Bytes, actix_web::Error>(event_line(&event)), receiver))
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("event observer lagged, {} events dropped", missed);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    HttpResponse::Ok()
        .content_type("application/x-ndjson")
        .streaming(snapshot_stream.chain(live_stream))
}
