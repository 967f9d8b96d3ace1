// History log entries: vocabulary normalisation and idempotency keys

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use super::types::{AuditLogEntry, TransientId};

/// Internal list names rewritten to the phrases users see in the marshall
const USER_FACING_VOCABULARY: [(&str, &str); 3] = [
    ("pending observation", "classification targets"),
    ("following", "followup targets"),
    ("pending classification", "queued for classification"),
];

/// Replace internal location names with their user-facing phrases
pub fn normalize_vocabulary(message: &str) -> String {
    USER_FACING_VOCABULARY
        .iter()
        .fold(message.to_string(), |text, (internal, public)| {
            text.replace(internal, public)
        })
}

/// Idempotency key of a history entry: SHA-256 over id, timestamp and message
pub fn dedup_key(transient_id: TransientId, date_created: DateTime<Utc>, message: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(transient_id.to_be_bytes());
    hasher.update(date_created.timestamp_micros().to_be_bytes());
    hasher.update(message.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Build a normalised history entry stamped at `now`
pub fn entry(transient_id: TransientId, now: DateTime<Utc>, message: &str) -> AuditLogEntry {
    let message = normalize_vocabulary(message);
    AuditLogEntry {
        transient_id,
        date_created: now,
        dedup_key: dedup_key(transient_id, now, &message),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_is_normalized() {
        assert_eq!(
            normalize_vocabulary("moved from 'pending observation' to 'archive' list by Jane Doe"),
            "moved from 'classification targets' to 'archive' list by Jane Doe"
        );
        assert_eq!(
            normalize_vocabulary("moved from 'review for followup' to 'following' list by Jane Doe"),
            "moved from 'review for followup' to 'followup targets' list by Jane Doe"
        );
        assert_eq!(
            normalize_vocabulary("moved from 'following' to 'followup complete' list by Jane Doe"),
            "moved from 'followup targets' to 'followup complete' list by Jane Doe"
        );
    }

    #[test]
    fn test_dedup_key_depends_on_every_component() {
        let now = Utc::now();
        let base = dedup_key(1, now, "moved");
        assert_eq!(base, dedup_key(1, now, "moved"));
        assert_ne!(base, dedup_key(2, now, "moved"));
        assert_ne!(base, dedup_key(1, now, "snoozed"));
        assert_ne!(base, dedup_key(1, now + chrono::Duration::seconds(1), "moved"));
        assert_eq!(base.len(), 64);
    }

    #[test]
    fn test_entry_key_matches_stored_message() {
        let now = Utc::now();
        let entry = entry(5, now, "object snoozed by Jane Doe in pending observation");
        assert_eq!(entry.message, "object snoozed by Jane Doe in classification targets");
        assert_eq!(entry.dedup_key, dedup_key(5, now, &entry.message));
    }
}
