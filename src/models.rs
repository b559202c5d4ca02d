use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
}

/// External classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Base URL of the classifier service
    pub base_url: String,
    /// Request timeout in milliseconds (sub-second; gates every request)
    pub timeout_ms: u64,
    /// Number of features the model expects; vectors are truncated or
    /// zero-padded to this arity before sending
    pub feature_arity: usize,
}

/// Enforcement-point (SDN controller) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnforcementConfig {
    /// Base URL of the controller's REST API
    pub base_url: String,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// Datapath ID of the switch the drop rules target
    pub dpid: u64,
    /// Priority assigned to installed drop rules
    pub rule_priority: u32,
    /// Interval for retrying failed rule installations, in seconds.
    /// Zero disables retries.
    pub retry_interval_seconds: u64,
}

/// Behavior store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorConfig {
    /// Identity records older than this (by last activity) are purged,
    /// blocked records included
    pub retention_seconds: u64,
    /// Interval between expiry sweeps, in seconds
    pub sweep_interval_seconds: u64,
}

/// Policy engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Number of anomalous classifications before an identity is blocked
    pub suspicion_threshold: u32,
    /// Request-rate ceiling in requests per minute
    pub rate_threshold_per_minute: f64,
}

/// Event notifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Broadcast buffer size; slow observers lagging past this lose events
    pub event_buffer: usize,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Classifier configuration
    pub classifier: ClassifierConfig,
    /// Enforcement-point configuration
    pub enforcement: EnforcementConfig,
    /// Behavior store configuration
    pub behavior: BehaviorConfig,
    /// Policy configuration
    pub policy: PolicyConfig,
    /// Notifier configuration
    pub notifier: NotifierConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenv::dotenv().ok();

        Ok(Self {
            server: ServerConfig {
                host: std::env::var("SERVER_HOST")?,
                port: std::env::var("SERVER_PORT")?.parse()?,
            },
            classifier: ClassifierConfig {
                base_url: std::env::var("CLASSIFIER_URL")?,
                timeout_ms: std::env::var("CLASSIFIER_TIMEOUT_MS")?.parse()?,
                feature_arity: std::env::var("CLASSIFIER_FEATURE_ARITY")?.parse()?,
            },
            enforcement: EnforcementConfig {
                base_url: std::env::var("ENFORCEMENT_URL")?,
                timeout_ms: std::env::var("ENFORCEMENT_TIMEOUT_MS")?.parse()?,
                dpid: std::env::var("ENFORCEMENT_DPID")?.parse()?,
                rule_priority: std::env::var("ENFORCEMENT_RULE_PRIORITY")?.parse()?,
                retry_interval_seconds: std::env::var("ENFORCEMENT_RETRY_INTERVAL_SECS")?.parse()?,
            },
            behavior: BehaviorConfig {
                retention_seconds: std::env::var("BEHAVIOR_RETENTION_SECS")?.parse()?,
                sweep_interval_seconds: std::env::var("BEHAVIOR_SWEEP_INTERVAL_SECS")?.parse()?,
            },
            policy: PolicyConfig {
                suspicion_threshold: std::env::var("POLICY_SUSPICION_THRESHOLD")?.parse()?,
                rate_threshold_per_minute: std::env::var("POLICY_RATE_THRESHOLD")?.parse()?,
            },
            notifier: NotifierConfig {
                event_buffer: std::env::var("NOTIFIER_EVENT_BUFFER")?.parse()?,
            },
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            classifier: ClassifierConfig {
                base_url: "http://127.0.0.1:5001".to_string(),
                timeout_ms: 500,
                feature_arity: 17,
            },
            enforcement: EnforcementConfig {
                base_url: "http://127.0.0.1:8081".to_string(),
                timeout_ms: 3000,
                dpid: 1,
                rule_priority: 60000,
                retry_interval_seconds: 60,
            },
            behavior: BehaviorConfig {
                retention_seconds: 3600,
                sweep_interval_seconds: 60,
            },
            policy: PolicyConfig {
                suspicion_threshold: 3,
                rate_threshold_per_minute: 100.0,
            },
            notifier: NotifierConfig { event_buffer: 256 },
        }
    }
}
