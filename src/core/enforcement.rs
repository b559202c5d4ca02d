//! Enforcement-point client for the detection gateway.
//!
//! Drop rules are installed on an external SDN controller through its
//! OpenFlow REST API (Ryu-compatible): an empty action list on a matching
//! flow entry drops the traffic.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::models::EnforcementConfig;

const ETH_TYPE_IPV4: u32 = 0x0800;

/// Errors that can occur while talking to the enforcement point
#[derive(Debug, Error)]
pub enum EnforcementError {
    #[error("enforcement request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("enforcement point returned status {0}")]
    BadStatus(u16),
}

/// Interface to the external enforcement point
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EnforcementPoint: Send + Sync {
    /// Install a drop rule for traffic from `identity`
    async fn install_drop_rule(&self, identity: &str) -> Result<(), EnforcementError>;

    /// Remove the drop rule for `identity`
    async fn remove_drop_rule(&self, identity: &str) -> Result<(), EnforcementError>;

    /// Whether the enforcement point currently answers at all
    async fn is_reachable(&self) -> bool;
}

#[derive(Serialize)]
struct FlowMatch<'a> {
    eth_type: u32,
    ipv4_src: &'a str,
}

#[derive(Serialize)]
struct InstallRule<'a> {
    dpid: u64,
    priority: u32,
    #[serde(rename = "match")]
    match_fields: FlowMatch<'a>,
    /// Empty action list means drop
    actions: [(); 0],
}

#[derive(Serialize)]
struct RemoveRule<'a> {
    dpid: u64,
    #[serde(rename = "match")]
    match_fields: FlowMatch<'a>,
}

/// REST client against a Ryu-style controller
pub struct RyuEnforcementPoint {
    client: reqwest::Client,
    base_url: String,
    dpid: u64,
    rule_priority: u32,
}

impl RyuEnforcementPoint {
    /// Create a new enforcement client with the configured timeout
    pub fn new(config: &EnforcementConfig) -> Result<Self, EnforcementError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            dpid: config.dpid,
            rule_priority: config.rule_priority,
        })
    }

    async fn post_rule<T: Serialize>(
        &self,
        endpoint: &str,
        rule: &T,
    ) -> Result<(), EnforcementError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, endpoint))
            .json(rule)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EnforcementError::BadStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl EnforcementPoint for RyuEnforcementPoint {
    async fn install_drop_rule(&self, identity: &str) -> Result<(), EnforcementError> {
        let rule = InstallRule {
            dpid: self.dpid,
            priority: self.rule_priority,
            match_fields: FlowMatch {
                eth_type: ETH_TYPE_IPV4,
                ipv4_src: identity,
            },
            actions: [],
        };
        self.post_rule("/stats/flowentry/add", &rule).await
    }

    async fn remove_drop_rule(&self, identity: &str) -> Result<(), EnforcementError> {
        let rule = RemoveRule {
            dpid: self.dpid,
            match_fields: FlowMatch {
                eth_type: ETH_TYPE_IPV4,
                ipv4_src: identity,
            },
        };
        self.post_rule("/stats/flowentry/delete", &rule).await
    }

    async fn is_reachable(&self) -> bool {
        self.client
            .get(format!("{}/stats/switches", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
