//! Audit trail for dispatched intents
//!
//! Append-only and in-memory, capped at a retention limit: once full, the
//! oldest record by `created_at` is evicted. Each record carries a
//! fingerprint of the intent that produced it so a stored record can be
//! checked against the intent it claims to describe.

use crate::intent::{ActionTag, StructuredIntent};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// One dispatched intent and how it ended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub audit_id: Uuid,
    pub action: ActionTag,
    pub intent_fingerprint: String,
    pub success: bool,
    pub error: Option<String>,
    pub elapsed_ms: u64,
    pub created_at: DateTime<Utc>,
}

pub const DEFAULT_AUDIT_RETENTION: usize = 10_000;

#[derive(Default)]
struct Records {
    by_id: HashMap<Uuid, ExecutionRecord>,
    by_time: BTreeSet<(DateTime<Utc>, Uuid)>,
}

/// Audit trail storage
pub struct AuditLog {
    records: Arc<RwLock<Records>>,
    max_records: usize,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_AUDIT_RETENTION)
    }

    /// Keep at most `max_records` (at least one).
    pub fn with_retention(max_records: usize) -> Self {
        Self {
            records: Arc::new(RwLock::new(Records::default())),
            max_records: max_records.max(1),
        }
    }

    pub fn max_records(&self) -> usize {
        self.max_records
    }

    /// Store an execution record, evicting the oldest when over the limit.
    pub async fn record(&self, record: ExecutionRecord) -> Result<Uuid> {
        let audit_id = record.audit_id;
        let mut records = self.records.write().await;

        if let Some(previous) = records.by_id.remove(&audit_id) {
            records.by_time.remove(&(previous.created_at, audit_id));
        }
        records.by_time.insert((record.created_at, audit_id));
        records.by_id.insert(audit_id, record);

        while records.by_id.len() > self.max_records {
            let Some((_, oldest)) = records.by_time.pop_first() else {
                break;
            };
            records.by_id.remove(&oldest);
        }

        Ok(audit_id)
    }

    pub async fn get(&self, audit_id: Uuid) -> Result<Option<ExecutionRecord>> {
        let records = self.records.read().await;
        Ok(records.by_id.get(&audit_id).cloned())
    }

    /// All retained records, oldest first.
    pub async fn list(&self) -> Result<Vec<ExecutionRecord>> {
        let records = self.records.read().await;

        Ok(records
            .by_time
            .iter()
            .filter_map(|(_, id)| records.by_id.get(id).cloned())
            .collect())
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.by_id.is_empty()
    }

    /// True when the stored fingerprint matches `intent`.
    pub async fn verify_integrity(&self, audit_id: Uuid, intent: &StructuredIntent) -> Result<bool> {
        let records = self.records.read().await;

        Ok(records
            .by_id
            .get(&audit_id)
            .is_some_and(|record| record.intent_fingerprint == compute_intent_fingerprint(intent)))
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA-256 over the serialized intent, hex encoded.
/// Serialization streams straight into the hasher.
pub fn compute_intent_fingerprint(intent: &StructuredIntent) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), intent).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
