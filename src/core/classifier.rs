//! External ML classifier client for the detection gateway.
//!
//! The classifier is an external HTTP service; this module defines the
//! verdict types, the `Classify` trait the gateway consumes, and the
//! `reqwest`-backed implementation with a bounded sub-second timeout.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::models::ClassifierConfig;

/// Errors that can occur while calling the classifier
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("classifier returned status {0}")]
    BadStatus(u16),
}

/// Classifier verdict for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Normal,
    Anomalous,
}

/// A classification returned by the external model (or substituted
/// locally when the model is unreachable)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub prediction: Verdict,
    /// Model confidence in [0, 1]
    pub confidence: f64,
    /// Structured factor list explaining the verdict, if the model
    /// provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<serde_json::Value>,
    /// Name of the model that produced the verdict
    #[serde(default, rename = "model_used", skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// True when this verdict was substituted because the classifier was
    /// unreachable; never set by the remote service
    #[serde(default)]
    pub degraded: bool,
}

impl Classification {
    /// The low-confidence "normal" verdict used when the classifier
    /// times out or errors
    pub fn degraded_normal() -> Self {
        Self {
            prediction: Verdict::Normal,
            confidence: 0.0,
            explanation: None,
            model: None,
            degraded: true,
        }
    }

    pub fn is_anomalous(&self) -> bool {
        self.prediction == Verdict::Anomalous
    }
}

/// Contextual metadata sent alongside the feature vector
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrafficMetadata {
    /// Observed packet rate, packets per second
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_rate: Option<f64>,
    /// Average packet size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_packet_size: Option<f64>,
    /// Declared network-slice label (e.g. "eMBB", "URLLC")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_slice: Option<String>,
}

/// Interface to the external classifier
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Classify: Send + Sync {
    /// Classify one request's traffic features
    async fn classify(
        &self,
        features: &[f64],
        metadata: &TrafficMetadata,
    ) -> Result<Classification, ClassifierError>;
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    features: Vec<f64>,
    metadata: &'a TrafficMetadata,
}

/// HTTP client against the classifier's `/predict` endpoint
pub struct HttpClassifier {
    client: reqwest::Client,
    base_url: String,
    feature_arity: usize,
}

impl HttpClassifier {
    /// Create a new classifier client with the configured timeout
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            feature_arity: config.feature_arity,
        })
    }

    /// Truncate or zero-pad a feature vector to the model's expected arity
    fn fit_features(&self, features: &[f64]) -> Vec<f64> {
        let mut fitted = features.to_vec();
        fitted.resize(self.feature_arity, 0.0);
        fitted
    }
}

#[async_trait]
impl Classify for HttpClassifier {
    async fn classify(
        &self,
        features: &[f64],
        metadata: &TrafficMetadata,
    ) -> Result<Classification, ClassifierError> {
        let body = PredictRequest {
            features: self.fit_features(features),
            metadata,
        };

        let response = self
            .client
            .post(format!("{}/predict", self.base_url))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClassifierError::BadStatus(response.status().as_u16()));
        }

        let mut classification: Classification = response.json().await?;
        // The degraded flag is a local concept only
        classification.degraded = false;
        Ok(classification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(arity: usize) -> ClassifierConfig {
        ClassifierConfig {
            base_url: "http://127.0.0.1:5001".to_string(),
            timeout_ms: 500,
            feature_arity: arity,
        }
    }

    #[test]
    fn test_fit_features_pads_and_truncates() {
        let classifier = HttpClassifier::new(&test_config(4)).unwrap();

        assert_eq!(classifier.fit_features(&[1.0, 2.0]), vec![1.0, 2.0, 0.0, 0.0]);
        assert_eq!(
            classifier.fit_features(&[1.0, 2.0, 3.0, 4.0, 5.0]),
            vec![1.0, 2.0, 3.0, 4.0]
        );
    }

    #[test]
    fn test_degraded_classification_is_normal_low_confidence() {
        let degraded = Classification::degraded_normal();
        assert_eq!(degraded.prediction, Verdict::Normal);
        assert_eq!(degraded.confidence, 0.0);
        assert!(degraded.degraded);
        assert!(!degraded.is_anomalous());
    }

    #[test]
    fn test_classification_deserializes_remote_payload() {
        let json = r#"{
            "prediction": "anomalous",
            "confidence": 0.93,
            "explanation": {"top_factors": ["packets_per_second"]},
            "model_used": "ensemble"
        }"#;

        let classification: Classification = serde_json::from_str(json).unwrap();
        assert!(classification.is_anomalous());
        assert_eq!(classification.confidence, 0.93);
        assert_eq!(classification.model.as_deref(), Some("ensemble"));
        assert!(!classification.degraded);
    }
}
