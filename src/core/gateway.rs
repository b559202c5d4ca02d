//! Ingress gateway for detection requests.
//!
//! One logical task per inbound request: classify (with graceful
//! degradation), observe, decide, and either return the verdict or deny
//! the request and dispatch mitigation. Upstream outages are never
//! surfaced to the caller as request failures.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::core::behavior_store::BehaviorStore;
use crate::core::classifier::{Classification, Classify, TrafficMetadata};
use crate::core::mitigation::{BlockRecord, MitigationDispatcher};
use crate::core::notifier::{Event, EventNotifier};
use crate::core::policy::{Decision, PolicyEngine};

/// Errors surfaced to the caller of `handle_detection`
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed request; rejected before any state mutation
    #[error("invalid detection request: {0}")]
    InvalidInput(String),
}

/// An inbound detection request
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionRequest {
    /// Source identity, typically an IPv4 address
    pub identity: String,
    /// Numeric traffic features; truncated/padded to the model's arity
    pub features: Vec<f64>,
    /// Optional contextual metadata forwarded to the classifier
    #[serde(default)]
    pub metadata: TrafficMetadata,
}

/// Outcome of a detection request
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DetectionOutcome {
    /// The request is allowed; the classification verdict is returned
    /// unchanged (it may still say "anomalous")
    Allowed { classification: Classification },
    /// The request itself is denied
    Blocked {
        reason: String,
        reason_code: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        record: Option<BlockRecord>,
    },
}

/// The ingress gateway
pub struct IngressGateway {
    classifier: Arc<dyn Classify>,
    store: Arc<BehaviorStore>,
    policy: PolicyEngine,
    dispatcher: Arc<MitigationDispatcher>,
    notifier: Arc<EventNotifier>,
}

impl IngressGateway {
    /// Create a new gateway wired to its collaborators
    pub fn new(
        classifier: Arc<dyn Classify>,
        store: Arc<BehaviorStore>,
        policy: PolicyEngine,
        dispatcher: Arc<MitigationDispatcher>,
        notifier: Arc<EventNotifier>,
    ) -> Self {
        Self {
            classifier,
            store,
            policy,
            dispatcher,
            notifier,
        }
    }

    fn validate(request: &DetectionRequest) -> Result<(), GatewayError> {
        let identity = request.identity.trim();
        if identity.is_empty() {
            return Err(GatewayError::InvalidInput("missing identity".to_string()));
        }
        if identity == "0.0.0.0" || identity.eq_ignore_ascii_case("unknown") {
            return Err(GatewayError::InvalidInput(format!(
                "unroutable identity: {}",
                identity
            )));
        }
        if request.features.is_empty() {
            return Err(GatewayError::InvalidInput(
                "empty feature vector".to_string(),
            ));
        }
        Ok(())
    }

    /// Handle one detection request.
    ///
    /// Invalid input is rejected with no state mutation. A classifier
    /// timeout or error degrades to a low-confidence "normal" verdict
    /// rather than failing the request.
    pub async fn handle_detection(
        &self,
        request: &DetectionRequest,
    ) -> Result<DetectionOutcome, GatewayError> {
        Self::validate(request)?;
        let identity = request.identity.trim();

        let classification = match self
            .classifier
            .classify(&request.features, &request.metadata)
            .await
        {
            Ok(classification) => classification,
            Err(e) => {
                warn!("classifier unavailable, degrading to normal: {}", e);
                Classification::degraded_normal()
            }
        };

        self.store.observe(identity);

        match self.policy.decide(identity, &classification) {
            Decision::Allow => {
                debug!(
                    "{} allowed ({:?}, confidence {:.2})",
                    identity, classification.prediction, classification.confidence
                );
                self.notifier.publish(Event::detection_result(
                    identity,
                    classification.clone(),
                    true,
                ));
                Ok(DetectionOutcome::Allowed { classification })
            }
            Decision::Block(reason) => {
                let result = self.dispatcher.block(identity, reason, &classification).await;
                self.notifier.publish(Event::detection_result(
                    identity,
                    classification,
                    false,
                ));
                if result.newly_blocked {
                    self.notifier.publish(Event::IdentityBlocked {
                        record: result.record.clone(),
                    });
                }
                Ok(DetectionOutcome::Blocked {
                    reason: reason.to_string(),
                    reason_code: reason.code().to_string(),
                    record: Some(result.record),
                })
            }
        }
    }
}
