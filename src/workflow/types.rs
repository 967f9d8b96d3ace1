// Core types for the transient triage workflow

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a transient (the transient bucket id)
pub type TransientId = i64;

/// Curation-lifecycle stage of a transient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarshallWorkflowLocation {
    /// Freshly ingested, not yet looked at
    Inbox,
    /// Queued for a classification spectrum
    PendingObservation,
    /// Classified and waiting for a followup decision
    ReviewForFollowup,
    /// Actively being followed
    Following,
    /// Followup campaign finished
    FollowupComplete,
    /// Out of every active list
    Archive,
}

impl MarshallWorkflowLocation {
    pub const ALL: [MarshallWorkflowLocation; 6] = [
        MarshallWorkflowLocation::Inbox,
        MarshallWorkflowLocation::PendingObservation,
        MarshallWorkflowLocation::ReviewForFollowup,
        MarshallWorkflowLocation::Following,
        MarshallWorkflowLocation::FollowupComplete,
        MarshallWorkflowLocation::Archive,
    ];

    /// Stored form, as it appears in the record and in audit messages
    pub fn as_str(self) -> &'static str {
        match self {
            MarshallWorkflowLocation::Inbox => "inbox",
            MarshallWorkflowLocation::PendingObservation => "pending observation",
            MarshallWorkflowLocation::ReviewForFollowup => "review for followup",
            MarshallWorkflowLocation::Following => "following",
            MarshallWorkflowLocation::FollowupComplete => "followup complete",
            MarshallWorkflowLocation::Archive => "archive",
        }
    }

    /// Parse either the stored form ("review for followup") or the
    /// snake_case form ("review_for_followup")
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', " ");
        Self::ALL
            .into_iter()
            .find(|location| location.as_str() == normalized)
    }
}

impl fmt::Display for MarshallWorkflowLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External-alert stage of a transient, independent of the curation stage
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertWorkflowLocation {
    QueuedForAtel,
    SoxsClassificationReleased,
    ArchivedWithoutAlert,
    /// Value outside the allow-list, only accepted when the deployment
    /// allows open alert locations
    Other(String),
}

impl AlertWorkflowLocation {
    pub const KNOWN: [AlertWorkflowLocation; 3] = [
        AlertWorkflowLocation::QueuedForAtel,
        AlertWorkflowLocation::SoxsClassificationReleased,
        AlertWorkflowLocation::ArchivedWithoutAlert,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            AlertWorkflowLocation::QueuedForAtel => "queued for atel",
            AlertWorkflowLocation::SoxsClassificationReleased => "soxs classification released",
            AlertWorkflowLocation::ArchivedWithoutAlert => "archived without alert",
            AlertWorkflowLocation::Other(value) => value,
        }
    }

    /// Parse an allow-listed location; unknown values yield `None`
    pub fn parse_known(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', " ");
        Self::KNOWN
            .into_iter()
            .find(|location| location.as_str() == normalized)
    }

    /// Parse a stored value, keeping unknown values as `Other`
    pub fn from_stored(value: &str) -> Self {
        Self::parse_known(value).unwrap_or_else(|| AlertWorkflowLocation::Other(value.to_string()))
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, AlertWorkflowLocation::Other(_))
    }
}

impl fmt::Display for AlertWorkflowLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current workflow fields of one transient, joined with the transient's
/// name and sky position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransientRecord {
    pub id: TransientId,
    pub name: String,
    pub ra: f64,
    pub dec: f64,
    pub mwl: MarshallWorkflowLocation,
    pub awl: Option<AlertWorkflowLocation>,
    pub snoozed: bool,
    pub classified: bool,
    pub pi_name: Option<String>,
    pub pi_email: Option<String>,
    pub observation_priority: Option<i64>,
    pub last_reviewed_mag_date: Option<DateTime<Utc>>,
    /// Incremented by the store on every committed change set
    pub revision: u64,
}

impl TransientRecord {
    pub fn new(id: TransientId, name: impl Into<String>, ra: f64, dec: f64) -> Self {
        Self {
            id,
            name: name.into(),
            ra,
            dec,
            mwl: MarshallWorkflowLocation::Inbox,
            awl: None,
            snoozed: false,
            classified: false,
            pi_name: None,
            pi_email: None,
            observation_priority: None,
            last_reviewed_mag_date: None,
            revision: 0,
        }
    }

    pub fn with_mwl(mut self, mwl: MarshallWorkflowLocation) -> Self {
        self.mwl = mwl;
        self
    }

    pub fn with_awl(mut self, awl: AlertWorkflowLocation) -> Self {
        self.awl = Some(awl);
        self
    }

    pub fn with_classified(mut self, classified: bool) -> Self {
        self.classified = classified;
        self
    }

    pub fn with_pi(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.pi_name = Some(name.into());
        self.pi_email = Some(email.into());
        self
    }

    pub fn with_observation_priority(mut self, priority: i64) -> Self {
        self.observation_priority = Some(priority);
        self
    }

    /// Both PI fields present and non-blank
    pub fn has_pi(&self) -> bool {
        let filled = |field: &Option<String>| field.as_deref().is_some_and(|v| !v.trim().is_empty());
        filled(&self.pi_name) && filled(&self.pi_email)
    }

    /// Apply a validated update in place. Stores call this so that every
    /// backend interprets a `RecordUpdate` the same way.
    pub fn apply(&mut self, update: &RecordUpdate) {
        if let Some(mwl) = update.mwl {
            self.mwl = mwl;
        }
        if let Some(awl) = &update.awl {
            self.awl = Some(awl.clone());
        }
        if let Some(snoozed) = update.snoozed {
            self.snoozed = snoozed;
        }
        if let Some(classified) = update.classified {
            self.classified = classified;
        }
        if let Some(pi) = &update.pi {
            self.pi_name = Some(pi.name.clone());
            self.pi_email = Some(pi.email.clone());
        }
        if let Some(priority) = update.observation_priority {
            self.observation_priority = priority;
        }
        if let Some(reviewed) = update.last_reviewed_mag_date {
            self.last_reviewed_mag_date = Some(reviewed);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalInvestigator {
    pub name: String,
    pub email: String,
}

/// Partial update of a transient record; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordUpdate {
    pub mwl: Option<MarshallWorkflowLocation>,
    pub awl: Option<AlertWorkflowLocation>,
    pub snoozed: Option<bool>,
    pub classified: Option<bool>,
    pub pi: Option<PrincipalInvestigator>,
    /// `Some(None)` clears the priority
    pub observation_priority: Option<Option<i64>>,
    pub last_reviewed_mag_date: Option<DateTime<Utc>>,
}

impl RecordUpdate {
    pub fn is_empty(&self) -> bool {
        *self == RecordUpdate::default()
    }
}

/// Current scientific classification of a transient. One row per transient;
/// a new classification replaces every field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRecord {
    pub transient_id: TransientId,
    pub name: String,
    pub ra: f64,
    pub dec: f64,
    pub observation_date: NaiveDate,
    pub observation_mjd: f64,
    pub survey: String,
    pub classification: String,
    pub redshift: Option<f64>,
    pub classification_wrt_max: String,
    pub phase: Option<String>,
    pub reducer: String,
}

/// One row of a transient's history log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub transient_id: TransientId,
    pub date_created: DateTime<Utc>,
    pub message: String,
    /// Idempotency key; appending an entry whose key already exists is a no-op
    pub dedup_key: String,
}

/// Everything one request changes, committed atomically by a store
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    /// Revision the engine validated against; a store rejects the commit with
    /// a conflict when the record has moved on
    pub expected_revision: u64,
    pub update: RecordUpdate,
    pub audit: Vec<AuditLogEntry>,
    pub classification: Option<ClassificationRecord>,
    pub recompute_summary: bool,
}

impl ChangeSet {
    pub fn new(expected_revision: u64) -> Self {
        Self {
            expected_revision,
            update: RecordUpdate::default(),
            audit: Vec::new(),
            classification: None,
            recompute_summary: false,
        }
    }
}

/// Aggregate refreshed after a classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransientSummary {
    pub transient_id: TransientId,
    pub mwl: MarshallWorkflowLocation,
    pub current_classification: Option<String>,
    pub classification_mjd: Option<f64>,
    pub history_entries: u64,
    pub updated_at: DateTime<Utc>,
}
