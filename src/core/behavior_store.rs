//! Per-identity behavior tracking for the detection gateway.
//!
//! This module owns the rolling request statistics for every observed
//! source identity. Updates to one identity are serialized by the sharded
//! map; different identities proceed in parallel.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use log::error;
use serde::{Deserialize, Serialize};

/// Rolling statistics for one source identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// When the identity was first observed
    pub first_seen: DateTime<Utc>,
    /// When the identity was last observed
    pub last_seen: DateTime<Utc>,
    /// Requests observed since `first_seen`
    pub request_count: u64,
    /// Requests classified as anomalous
    pub suspicion_count: u64,
    /// Whether the identity is currently blocked (sticky until unblocked)
    pub blocked: bool,
    /// When the block was applied; set only while `blocked` is true
    pub blocked_at: Option<DateTime<Utc>>,
    /// Why the block was applied; set only while `blocked` is true
    pub block_reason: Option<String>,
}

impl IdentityRecord {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            first_seen: now,
            last_seen: now,
            request_count: 0,
            suspicion_count: 0,
            blocked: false,
            blocked_at: None,
            block_reason: None,
        }
    }
}

/// In-memory store of per-identity behavior records.
///
/// The store is the sole owner of `IdentityRecord`s; callers only ever
/// receive snapshots.
pub struct BehaviorStore {
    records: DashMap<String, IdentityRecord>,
}

impl BehaviorStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Record one request from `identity`, creating the record if absent.
    ///
    /// Returns a snapshot of the record after the update.
    pub fn observe(&self, identity: &str) -> IdentityRecord {
        let now = Utc::now();
        let mut record = self
            .records
            .entry(identity.to_string())
            .or_insert_with(|| IdentityRecord::new(now));
        record.request_count += 1;
        record.last_seen = now;
        record.clone()
    }

    /// Increment the suspicion counter for an existing record.
    ///
    /// Returns the counter after the update, or `None` if the record does
    /// not exist (a benign race with expiry, not an error).
    pub fn mark_suspicious(&self, identity: &str) -> Option<u64> {
        let mut record = self.records.get_mut(identity)?;
        if record.suspicion_count >= record.request_count {
            // Invariant: suspicion_count <= request_count. Refuse the
            // increment rather than repairing shared state.
            error!(
                "suspicion counter for {} ({}) already at request count ({}); increment refused",
                identity, record.suspicion_count, record.request_count
            );
            return Some(record.suspicion_count);
        }
        record.suspicion_count += 1;
        Some(record.suspicion_count)
    }

    /// Get a snapshot of the record for `identity`, if present
    pub fn get(&self, identity: &str) -> Option<IdentityRecord> {
        self.records.get(identity).map(|r| r.clone())
    }

    /// Mark `identity` as blocked. Creates the record if it raced with an
    /// expiry sweep, so a block decision is never lost.
    pub fn set_blocked(&self, identity: &str, reason: &str) {
        let now = Utc::now();
        let mut record = self
            .records
            .entry(identity.to_string())
            .or_insert_with(|| IdentityRecord::new(now));
        record.blocked = true;
        record.blocked_at = Some(now);
        record.block_reason = Some(reason.to_string());
    }

    /// Lift the block on `identity`; no-op if the record is absent
    pub fn clear_blocked(&self, identity: &str) {
        if let Some(mut record) = self.records.get_mut(identity) {
            record.blocked = false;
            record.blocked_at = None;
            record.block_reason = None;
        }
    }

    /// Remove every record whose last activity is older than `retention`.
    ///
    /// Blocked records expire too: an identity that goes quiet past the
    /// retention window is forgotten, block included. The sweep proceeds
    /// shard by shard, so concurrent `observe` calls on other shards are
    /// not stalled for the whole pass.
    ///
    /// Returns the number of records removed.
    pub fn purge_expired(&self, now: DateTime<Utc>, retention: Duration) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, record| now.signed_duration_since(record.last_seen) <= retention);
        before.saturating_sub(self.records.len())
    }

    /// Number of identities currently tracked
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for BehaviorStore {
    fn default() -> Self {
        Self::new()
    }
}
