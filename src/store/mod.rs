// Record store interface - the engine reads through it and commits validated
// change sets through it, nothing else

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::workflow::types::{
    AuditLogEntry, ChangeSet, ClassificationRecord, TransientId, TransientRecord, TransientSummary,
};

pub use memory::MemoryStore;

/// Errors raised by store backends
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transient #{transient_id} has no backing record")]
    Missing { transient_id: TransientId },

    #[error("transient #{transient_id} already exists")]
    Duplicate { transient_id: TransientId },

    #[error("revision mismatch for transient #{transient_id}")]
    Conflict { transient_id: TransientId },

    #[error("corrupt stored value: {0}")]
    Corrupt(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[cfg(feature = "database")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(feature = "database")]
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Transactional key-value access to transient records, keyed by transient id
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait TransientStore: Send + Sync {
    /// Register a new transient record
    async fn insert(&self, record: TransientRecord) -> Result<(), StoreError>;

    /// Read the current workflow fields of a transient
    async fn fetch(&self, transient_id: TransientId) -> Result<Option<TransientRecord>, StoreError>;

    /// Atomically apply a change set: record update, audit appends (skipping
    /// existing dedup keys), classification upsert and summary recompute.
    /// Fails with `Conflict` when the stored revision differs from
    /// `changes.expected_revision`; nothing is written in that case.
    async fn commit(
        &self,
        transient_id: TransientId,
        changes: ChangeSet,
    ) -> Result<TransientRecord, StoreError>;

    /// History log entries ordered by creation time
    async fn history(&self, transient_id: TransientId) -> Result<Vec<AuditLogEntry>, StoreError>;

    /// Current classification, if any was ingested
    async fn classification(
        &self,
        transient_id: TransientId,
    ) -> Result<Option<ClassificationRecord>, StoreError>;

    /// Last recomputed summary, if any
    async fn summary(&self, transient_id: TransientId) -> Result<Option<TransientSummary>, StoreError>;
}

/// Rebuild the summary aggregate for one transient from its committed state
pub fn compute_summary(
    record: &TransientRecord,
    classification: Option<&ClassificationRecord>,
    history_entries: u64,
    now: DateTime<Utc>,
) -> TransientSummary {
    TransientSummary {
        transient_id: record.id,
        mwl: record.mwl,
        current_classification: classification.map(|c| c.classification.clone()),
        classification_mjd: classification.map(|c| c.observation_mjd),
        history_entries,
        updated_at: now,
    }
}
