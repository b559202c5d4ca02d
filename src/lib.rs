//! Sentinel Gateway
//!
//! An adaptive rate-based DDoS detection and mitigation gateway.
//! Incoming detection requests are classified by an external ML service,
//! tracked per source identity, and blocked at an external SDN enforcement
//! point when the policy engine decides against them.

pub mod api;
pub mod config;
pub mod core;
pub mod models;
pub mod utils;
