//! Core components of the detection gateway.
//!
//! This module contains the behavior store, policy engine, mitigation
//! dispatcher, event notifier, ingress gateway, and the clients for the
//! external classifier and enforcement point.

pub mod behavior_store;
pub mod classifier;
pub mod enforcement;
pub mod gateway;
pub mod mitigation;
pub mod notifier;
pub mod policy;

pub use behavior_store::{BehaviorStore, IdentityRecord};
pub use classifier::{Classification, ClassifierError, Classify, HttpClassifier, TrafficMetadata, Verdict};
pub use enforcement::{EnforcementError, EnforcementPoint, RyuEnforcementPoint};
pub use gateway::{DetectionOutcome, DetectionRequest, GatewayError, IngressGateway};
pub use mitigation::{BlockRecord, BlockResult, EnforcementStatus, MitigationDispatcher};
pub use notifier::{Event, EventNotifier};
pub use policy::{BlockReason, Decision, PolicyEngine};
