use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

use super::{compute_summary, StoreError, TransientStore};
use crate::workflow::types::{
    AuditLogEntry, ChangeSet, ClassificationRecord, TransientId, TransientRecord, TransientSummary,
};

#[derive(Debug, Default)]
struct MemoryState {
    records: HashMap<TransientId, TransientRecord>,
    history: HashMap<TransientId, Vec<AuditLogEntry>>,
    dedup_keys: HashSet<String>,
    classifications: HashMap<TransientId, ClassificationRecord>,
    summaries: HashMap<TransientId, TransientSummary>,
}

/// In-process store. Every commit runs under a single write lock, which makes
/// it atomic with respect to readers and other commits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with records
    pub fn with_records(records: impl IntoIterator<Item = TransientRecord>) -> Self {
        let state = MemoryState {
            records: records.into_iter().map(|r| (r.id, r)).collect(),
            ..Default::default()
        };
        Self {
            state: RwLock::new(state),
        }
    }
}

#[async_trait]
impl TransientStore for MemoryStore {
    async fn insert(&self, record: TransientRecord) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.records.contains_key(&record.id) {
            return Err(StoreError::Duplicate {
                transient_id: record.id,
            });
        }
        state.records.insert(record.id, record);
        Ok(())
    }

    async fn fetch(&self, transient_id: TransientId) -> Result<Option<TransientRecord>, StoreError> {
        Ok(self.state.read().await.records.get(&transient_id).cloned())
    }

    async fn commit(
        &self,
        transient_id: TransientId,
        changes: ChangeSet,
    ) -> Result<TransientRecord, StoreError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let record = state
            .records
            .get_mut(&transient_id)
            .ok_or(StoreError::Missing { transient_id })?;
        if record.revision != changes.expected_revision {
            return Err(StoreError::Conflict { transient_id });
        }

        record.apply(&changes.update);
        record.revision += 1;
        let updated = record.clone();

        let log = state.history.entry(transient_id).or_default();
        for entry in changes.audit {
            if state.dedup_keys.insert(entry.dedup_key.clone()) {
                log.push(entry);
            } else {
                debug!(transient_id, dedup_key = %entry.dedup_key, "Skipping duplicate history entry");
            }
        }
        log.sort_by_key(|entry| entry.date_created);
        let history_entries = log.len() as u64;

        if let Some(classification) = changes.classification {
            state.classifications.insert(transient_id, classification);
        }

        if changes.recompute_summary {
            let summary = compute_summary(
                &updated,
                state.classifications.get(&transient_id),
                history_entries,
                Utc::now(),
            );
            state.summaries.insert(transient_id, summary);
        }

        Ok(updated)
    }

    async fn history(&self, transient_id: TransientId) -> Result<Vec<AuditLogEntry>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .history
            .get(&transient_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn classification(
        &self,
        transient_id: TransientId,
    ) -> Result<Option<ClassificationRecord>, StoreError> {
        Ok(self.state.read().await.classifications.get(&transient_id).cloned())
    }

    async fn summary(&self, transient_id: TransientId) -> Result<Option<TransientSummary>, StoreError> {
        Ok(self.state.read().await.summaries.get(&transient_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::types::{MarshallWorkflowLocation, RecordUpdate};

    fn entry(id: TransientId, message: &str, key: &str) -> AuditLogEntry {
        AuditLogEntry {
            transient_id: id,
            date_created: Utc::now(),
            message: message.to_string(),
            dedup_key: key.to_string(),
        }
    }

    #[tokio::test]
    async fn test_commit_applies_update_and_bumps_revision() {
        let store = MemoryStore::with_records([TransientRecord::new(1, "AT2024a", 1.0, 2.0)]);
        let mut changes = ChangeSet::new(0);
        changes.update = RecordUpdate {
            mwl: Some(MarshallWorkflowLocation::Archive),
            ..Default::default()
        };
        changes.audit.push(entry(1, "moved", "k1"));

        let updated = store.commit(1, changes).await.unwrap();
        assert_eq!(updated.mwl, MarshallWorkflowLocation::Archive);
        assert_eq!(updated.revision, 1);
        assert_eq!(store.history(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_revision_is_rejected_without_writes() {
        let store = MemoryStore::with_records([TransientRecord::new(1, "AT2024a", 1.0, 2.0)]);
        store.commit(1, ChangeSet::new(0)).await.unwrap();

        let mut stale = ChangeSet::new(0);
        stale.audit.push(entry(1, "late", "k2"));
        let err = store.commit(1, stale).await.unwrap_err();

        assert!(matches!(err, StoreError::Conflict { transient_id: 1 }));
        assert!(store.history(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_dedup_key_is_skipped() {
        let store = MemoryStore::with_records([TransientRecord::new(1, "AT2024a", 1.0, 2.0)]);
        let mut first = ChangeSet::new(0);
        first.audit.push(entry(1, "moved", "same"));
        store.commit(1, first).await.unwrap();

        let mut second = ChangeSet::new(1);
        second.audit.push(entry(1, "moved", "same"));
        store.commit(1, second).await.unwrap();

        assert_eq!(store.history(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_record_and_duplicate_insert() {
        let store = MemoryStore::new();
        let err = store.commit(9, ChangeSet::new(0)).await.unwrap_err();
        assert!(matches!(err, StoreError::Missing { transient_id: 9 }));

        store.insert(TransientRecord::new(9, "AT2024z", 0.0, 0.0)).await.unwrap();
        let err = store
            .insert(TransientRecord::new(9, "AT2024z", 0.0, 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { transient_id: 9 }));
    }
}
