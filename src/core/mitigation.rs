//! Mitigation dispatch for the detection gateway.
//!
//! Translates block decisions into drop-rule installations on the external
//! enforcement point and keeps one `BlockRecord` per blocked identity.
//! Blocking takes effect locally (the policy layer denies the identity)
//! whether or not the remote rule installed; a failed installation is
//! recorded, surfaced, and optionally retried.

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::behavior_store::BehaviorStore;
use crate::core::classifier::Classification;
use crate::core::enforcement::EnforcementPoint;
use crate::core::policy::BlockReason;

/// State of the drop rule at the enforcement point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnforcementStatus {
    Pending,
    Installed,
    /// Installation failed; the rule is absent remotely
    Failed,
    /// Removal failed; the rule may still sit on the switch while the
    /// identity is already allowed again locally
    RemoveFailed,
}

/// One currently (or failed-to-be) blocked identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRecord {
    pub id: String,
    pub identity: String,
    /// Human-readable reason
    pub reason: String,
    /// Machine-readable reason code
    pub reason_code: String,
    /// Classifier confidence at block time
    pub confidence: f64,
    /// Model that produced the verdict, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Classifier explanation payload, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<serde_json::Value>,
    pub status: EnforcementStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a `block` call
#[derive(Debug, Clone)]
pub struct BlockResult {
    pub record: BlockRecord,
    /// False when the identity was already blocked and the existing
    /// record was returned unchanged
    pub newly_blocked: bool,
}

/// Dispatcher owning the block records and the enforcement-point calls
pub struct MitigationDispatcher {
    enforcement: Arc<dyn EnforcementPoint>,
    store: Arc<BehaviorStore>,
    /// Insertion-ordered; one entry per identity
    records: RwLock<Vec<BlockRecord>>,
}

impl MitigationDispatcher {
    /// Create a new dispatcher
    pub fn new(enforcement: Arc<dyn EnforcementPoint>, store: Arc<BehaviorStore>) -> Self {
        Self {
            enforcement,
            store,
            records: RwLock::new(Vec::new()),
        }
    }

    /// Block `identity`, installing a drop rule at the enforcement point.
    ///
    /// Idempotent: an existing record is returned unchanged, except one
    /// stuck in `RemoveFailed` (the identity was unblocked locally), which
    /// is reset and re-blocked. The pending record is inserted before the
    /// remote call, so a concurrent `block` for the same identity sees it
    /// and no-ops rather than installing the rule twice. The local block
    /// always takes effect; a remote failure leaves the record in `Failed`
    /// for retry and operator visibility.
    pub async fn block(
        &self,
        identity: &str,
        reason: BlockReason,
        classification: &Classification,
    ) -> BlockResult {
        let pending = {
            let mut records = self.records.write().await;
            if let Some(existing) = records.iter_mut().find(|r| r.identity == identity) {
                if existing.status != EnforcementStatus::RemoveFailed {
                    return BlockResult {
                        record: existing.clone(),
                        newly_blocked: false,
                    };
                }
                // Re-block after a failed removal: the identity was
                // allowed again locally, so the block must be
                // re-established. Reinstalling the same match remotely is
                // harmless.
                existing.reason = reason.to_string();
                existing.reason_code = reason.code().to_string();
                existing.confidence = classification.confidence;
                existing.model = classification.model.clone();
                existing.explanation = classification.explanation.clone();
                existing.status = EnforcementStatus::Pending;
                existing.updated_at = Utc::now();
                existing.clone()
            } else {
                let now = Utc::now();
                let record = BlockRecord {
                    id: Uuid::new_v4().to_string(),
                    identity: identity.to_string(),
                    reason: reason.to_string(),
                    reason_code: reason.code().to_string(),
                    confidence: classification.confidence,
                    model: classification.model.clone(),
                    explanation: classification.explanation.clone(),
                    status: EnforcementStatus::Pending,
                    created_at: now,
                    updated_at: now,
                };
                records.push(record.clone());
                record
            }
        };

        // Fail closed at the policy layer before the remote call
        self.store.set_blocked(identity, &pending.reason);

        let status = match self.enforcement.install_drop_rule(identity).await {
            Ok(()) => {
                info!("installed drop rule for {} ({})", identity, pending.reason);
                EnforcementStatus::Installed
            }
            Err(e) => {
                warn!(
                    "drop rule installation for {} failed, block held locally: {}",
                    identity, e
                );
                EnforcementStatus::Failed
            }
        };

        let record = {
            let mut records = self.records.write().await;
            match records
                .iter_mut()
                .find(|r| r.id == pending.id && r.status == EnforcementStatus::Pending)
            {
                Some(record) => {
                    record.status = status;
                    record.updated_at = Utc::now();
                    record.clone()
                }
                // Unblocked while the install was in flight
                None => pending,
            }
        };

        BlockResult {
            record,
            newly_blocked: true,
        }
    }

    /// Unblock `identity`.
    ///
    /// The policy-layer block is lifted immediately; the record is removed
    /// only when the remote rule removal succeeds, otherwise it is retained
    /// as `RemoveFailed` so operators can see the stuck rule and the retry
    /// pass can finish the removal. Returns true on full success, false if
    /// the identity was not blocked or the removal failed remotely.
    pub async fn unblock(&self, identity: &str) -> bool {
        let known = {
            let records = self.records.read().await;
            records.iter().any(|r| r.identity == identity)
        };
        if !known {
            return false;
        }

        // Optimistic locally: the identity returns to allow regardless of
        // the remote outcome
        self.store.clear_blocked(identity);

        match self.enforcement.remove_drop_rule(identity).await {
            Ok(()) => {
                let mut records = self.records.write().await;
                records.retain(|r| r.identity != identity);
                info!("removed drop rule for {}", identity);
                true
            }
            Err(e) => {
                warn!(
                    "drop rule removal for {} failed, record retained: {}",
                    identity, e
                );
                let mut records = self.records.write().await;
                if let Some(record) = records.iter_mut().find(|r| r.identity == identity) {
                    record.status = EnforcementStatus::RemoveFailed;
                    record.updated_at = Utc::now();
                }
                false
            }
        }
    }

    /// Active block records in insertion order
    pub async fn list_active(&self) -> Vec<BlockRecord> {
        self.records.read().await.clone()
    }

    /// Re-attempt the enforcement-point call that failed for each stuck
    /// record: installation for `Failed` records, removal for
    /// `RemoveFailed` ones (whose record is deleted once the rule is off
    /// the switch).
    ///
    /// Returns the number of records recovered.
    pub async fn retry_failed(&self) -> usize {
        let stuck: Vec<(String, EnforcementStatus)> = {
            let records = self.records.read().await;
            records
                .iter()
                .filter(|r| {
                    matches!(
                        r.status,
                        EnforcementStatus::Failed | EnforcementStatus::RemoveFailed
                    )
                })
                .map(|r| (r.identity.clone(), r.status))
                .collect()
        };

        let mut recovered = 0;
        for (identity, status) in stuck {
            match status {
                EnforcementStatus::Failed => {
                    match self.enforcement.install_drop_rule(&identity).await {
                        Ok(()) => {
                            let mut records = self.records.write().await;
                            if let Some(record) = records
                                .iter_mut()
                                .find(|r| r.identity == identity && r.status == status)
                            {
                                record.status = EnforcementStatus::Installed;
                                record.updated_at = Utc::now();
                                recovered += 1;
                                info!("retry installed drop rule for {}", identity);
                            }
                        }
                        Err(e) => {
                            warn!("installation retry for {} failed: {}", identity, e);
                        }
                    }
                }
                EnforcementStatus::RemoveFailed => {
                    match self.enforcement.remove_drop_rule(&identity).await {
                        Ok(()) => {
                            let mut records = self.records.write().await;
                            let before = records.len();
                            // A re-block may have raced the retry; only a
                            // record still awaiting removal is dropped
                            records
                                .retain(|r| !(r.identity == identity && r.status == status));
                            if records.len() < before {
                                recovered += 1;
                                info!("retry removed drop rule for {}", identity);
                            }
                        }
                        Err(e) => {
                            warn!("removal retry for {} failed: {}", identity, e);
                        }
                    }
                }
                _ => {}
            }
        }
        recovered
    }
}
