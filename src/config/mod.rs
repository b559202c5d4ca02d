//! Configuration management for the detection gateway.
//!
//! This module handles loading and managing application configuration
//! from environment variables and configuration files.

use crate::models::Config;
use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use std::env;

/// Load configuration from a config file and environment variables
pub fn load_config() -> Result<Config, ConfigError> {
    let config_file = env::var("CONFIG_FILE").unwrap_or_else(|_| "config/default.toml".to_string());

    let config = ConfigBuilder::builder()
        .add_source(File::with_name(&config_file).required(false))
        .add_source(Environment::default())
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 8080)?
        .set_default("classifier.base_url", "http://127.0.0.1:5001")?
        .set_default("classifier.timeout_ms", 500)?
        .set_default("classifier.feature_arity", 17)?
        .set_default("enforcement.base_url", "http://127.0.0.1:8081")?
        .set_default("enforcement.timeout_ms", 3000)?
        .set_default("enforcement.dpid", 1)?
        .set_default("enforcement.rule_priority", 60000)?
        .set_default("enforcement.retry_interval_seconds", 60)?
        .set_default("behavior.retention_seconds", 3600)?
        .set_default("behavior.sweep_interval_seconds", 60)?
        .set_default("policy.suspicion_threshold", 3)?
        .set_default("policy.rate_threshold_per_minute", 100.0)?
        .set_default("notifier.event_buffer", 256)?
        .build()?;

    config.try_deserialize()
}
