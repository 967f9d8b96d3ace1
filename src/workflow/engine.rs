// Workflow transition engine - every request is read, validated, and committed
// as one change set while the transient's lock is held

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::audit;
use super::classification::{build_classification, Classify};
use super::errors::WorkflowError;
use super::locks::TransientLocks;
use super::priority::{PriorityChange, PriorityScale};
use super::state_machine::{check_awl_transition, check_mwl_transition, WorkflowPolicy};
use super::types::{
    AlertWorkflowLocation, AuditLogEntry, ChangeSet, MarshallWorkflowLocation, PrincipalInvestigator,
    TransientId, TransientRecord,
};
use crate::identity::ActingUser;
use crate::store::TransientStore;

/// Priority given to objects entering `following` when the policy resets it
pub const FOLLOWING_DEFAULT_PRIORITY: i64 = 2;

/// Alert location set by every classification
pub const CLASSIFIED_ALERT_LOCATION: AlertWorkflowLocation = AlertWorkflowLocation::ArchivedWithoutAlert;

/// Move a transient between lists on either workflow axis
#[derive(Debug, Clone, PartialEq)]
pub struct MoveWorkflow {
    pub transient_id: TransientId,
    pub mwl: Option<MarshallWorkflowLocation>,
    pub awl: Option<AlertWorkflowLocation>,
    pub snooze: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetPrincipalInvestigator {
    pub transient_id: TransientId,
    pub pi_name: String,
    pub pi_email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetObservationPriority {
    pub transient_id: TransientId,
    pub priority: PriorityChange,
}

pub struct WorkflowEngine {
    store: Arc<dyn TransientStore>,
    policy: WorkflowPolicy,
    locks: TransientLocks,
}

impl std::fmt::Debug for WorkflowEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("policy", &self.policy)
            .field("locks", &self.locks)
            .finish()
    }
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn TransientStore>, policy: WorkflowPolicy) -> Self {
        Self {
            store,
            policy,
            locks: TransientLocks::new(),
        }
    }

    pub fn policy(&self) -> &WorkflowPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn TransientStore> {
        &self.store
    }

    /// Current record of a transient
    pub async fn record(&self, transient_id: TransientId) -> Result<TransientRecord, WorkflowError> {
        self.store
            .fetch(transient_id)
            .await?
            .ok_or(WorkflowError::NotFound { transient_id })
    }

    /// History log of a transient, oldest first
    pub async fn history(&self, transient_id: TransientId) -> Result<Vec<AuditLogEntry>, WorkflowError> {
        Ok(self.store.history(transient_id).await?)
    }

    async fn commit(
        &self,
        transient_id: TransientId,
        changes: ChangeSet,
    ) -> Result<TransientRecord, WorkflowError> {
        self.store.commit(transient_id, changes).await.map_err(|e| {
            let err = WorkflowError::from(e);
            match &err {
                WorkflowError::Conflict { .. } => {
                    warn!(transient_id, "Record changed underneath the request, nothing committed")
                }
                other => error!(transient_id, error = %other, "Failed to commit change set"),
            }
            err
        })
    }

    fn rejected(transient_id: TransientId, operation: &str, err: WorkflowError) -> WorkflowError {
        warn!(transient_id, operation, kind = ?err.kind(), reason = %err, "Request rejected");
        err
    }

    /// Move a transient to another curation and/or alert list. Both moves are
    /// validated before anything is written; either both land or neither does.
    pub async fn move_workflow(
        &self,
        request: &MoveWorkflow,
        actor: &ActingUser,
    ) -> Result<String, WorkflowError> {
        let transient_id = request.transient_id;
        if request.mwl.is_none() && request.awl.is_none() {
            return Err(WorkflowError::validation("no workflow location requested"));
        }

        let _guard = self.locks.acquire(transient_id).await;
        let record = self.record(transient_id).await?;
        let user = actor.display_name();
        let now = Utc::now();
        let mut changes = ChangeSet::new(record.revision);
        let mut responses = Vec::new();

        if let Some(mwl) = request.mwl {
            check_mwl_transition(&record, mwl)
                .map_err(|e| Self::rejected(transient_id, "move_workflow", e))?;

            let message = if request.snooze {
                format!("object snoozed by {user}")
            } else {
                format!("moved from '{}' to '{mwl}' list by {user}", record.mwl)
            };
            changes.update.mwl = Some(mwl);
            changes.update.snoozed = Some(request.snooze);
            match mwl {
                MarshallWorkflowLocation::Archive => changes.update.last_reviewed_mag_date = Some(now),
                MarshallWorkflowLocation::Following if self.policy.auto_reset_priority_on_following => {
                    changes.update.observation_priority = Some(Some(FOLLOWING_DEFAULT_PRIORITY))
                }
                _ => {}
            }
            changes.audit.push(audit::entry(transient_id, now, &message));
            responses.push(format!(
                "transient #{transient_id} moved to the `{mwl}` marshallWorkflowLocation"
            ));
        }

        if let Some(awl) = &request.awl {
            check_awl_transition(&record, awl, &self.policy)
                .map_err(|e| Self::rejected(transient_id, "move_workflow", e))?;

            let previous = record
                .awl
                .as_ref()
                .map_or_else(|| "none".to_string(), |a| a.to_string());
            changes.update.awl = Some(awl.clone());
            // an alert move always un-snoozes, even right after a snoozing move
            changes.update.snoozed = Some(false);
            changes.audit.push(audit::entry(
                transient_id,
                now,
                &format!("moved from '{previous}' to '{awl}' list by {user}"),
            ));
            responses.push(format!(
                "transient #{transient_id} moved to the `{awl}` alertWorkflowLocation"
            ));
        }

        let updated = self.commit(transient_id, changes).await?;
        info!(
            transient_id,
            from_mwl = %record.mwl,
            to_mwl = %updated.mwl,
            awl = ?updated.awl.as_ref().map(|a| a.to_string()),
            snoozed = updated.snoozed,
            actor = %actor,
            "Workflow location changed"
        );
        Ok(responses.join("; "))
    }

    /// Assign or correct the principal investigator of a transient
    pub async fn set_principal_investigator(
        &self,
        request: &SetPrincipalInvestigator,
        actor: &ActingUser,
    ) -> Result<String, WorkflowError> {
        let transient_id = request.transient_id;
        let pi_name = request.pi_name.trim();
        let pi_email = request.pi_email.trim();
        if pi_name.is_empty() || pi_email.is_empty() {
            return Err(WorkflowError::validation("both piName and piEmail are required"));
        }

        let _guard = self.locks.acquire(transient_id).await;
        let record = self.record(transient_id).await?;

        let in_window = matches!(
            record.mwl,
            MarshallWorkflowLocation::ReviewForFollowup | MarshallWorkflowLocation::Following
        );
        if !in_window && !record.has_pi() {
            return Err(Self::rejected(
                transient_id,
                "set_principal_investigator",
                WorkflowError::NotEligible {
                    transient_id,
                    reason: format!(
                        "it is in the `{}` list and does not have a PI assigned",
                        record.mwl
                    ),
                },
            ));
        }

        let user = actor.display_name();
        let message = match record.pi_name.as_deref().filter(|n| !n.trim().is_empty()) {
            Some(old_name) => format!(
                "PI changed from {old_name} ({}) to {pi_name} ({pi_email}) by {user}",
                record.pi_email.as_deref().unwrap_or_default()
            ),
            None => format!("{pi_name} ({pi_email}) assigned as PI of this object by {user}"),
        };

        let now = Utc::now();
        let mut changes = ChangeSet::new(record.revision);
        changes.update.pi = Some(PrincipalInvestigator {
            name: pi_name.to_string(),
            email: pi_email.to_string(),
        });
        changes.audit.push(audit::entry(transient_id, now, &message));
        self.commit(transient_id, changes).await?;

        info!(transient_id, pi_name, actor = %actor, "PI assigned");
        Ok(format!(
            "changed the PI of transient #{transient_id} to '{pi_name}' ({pi_email})"
        ))
    }

    /// Set or clear the observation priority. The write is never gated; the
    /// workflow location only decides the words used in the history log.
    /// Clearing is quiet: no history entry is written.
    pub async fn set_observation_priority(
        &self,
        request: &SetObservationPriority,
        actor: &ActingUser,
    ) -> Result<String, WorkflowError> {
        let transient_id = request.transient_id;
        let _guard = self.locks.acquire(transient_id).await;
        let record = self.record(transient_id).await?;

        let now = Utc::now();
        let mut changes = ChangeSet::new(record.revision);
        changes.update.observation_priority = Some(request.priority.value());

        if let PriorityChange::Set(priority) = request.priority {
            let scale = PriorityScale::for_location(record.mwl);
            let message = format!(
                "{} changed from {} to {} by {}",
                scale.noun(),
                scale.label(record.observation_priority),
                scale.label(Some(priority)),
                actor.display_name()
            );
            changes.audit.push(audit::entry(transient_id, now, &message));
        }

        self.commit(transient_id, changes).await?;
        info!(transient_id, priority = %request.priority, actor = %actor, "Observation priority changed");
        Ok(format!(
            "changed the observational priority of transient #{transient_id} to '{}'",
            request.priority
        ))
    }

    /// Record a new classification. The first classification of a transient
    /// also sets its classified flag and moves it to `review for followup`,
    /// bypassing the adjacency table since it is what satisfies the
    /// classified guard.
    pub async fn classify(&self, request: &Classify, actor: &ActingUser) -> Result<String, WorkflowError> {
        let transient_id = request.transient_id;
        if request.spectral_type.trim().is_empty() {
            return Err(WorkflowError::validation("a classification type is required"));
        }
        if request.source.trim().is_empty() {
            return Err(WorkflowError::validation("a classification source is required"));
        }

        let _guard = self.locks.acquire(transient_id).await;
        let record = self.record(transient_id).await?;
        let user = actor.display_name();
        let classification = build_classification(&record, request, &user);

        let now = Utc::now();
        let mut changes = ChangeSet::new(record.revision);
        // TODO: route to `queued for atel` once the client sends its
        // send-to-alert preference; every classification archives the alert for now
        changes.update.awl = Some(CLASSIFIED_ALERT_LOCATION);
        if !record.classified {
            changes.update.classified = Some(true);
            changes.update.mwl = Some(MarshallWorkflowLocation::ReviewForFollowup);
            changes.update.snoozed = Some(false);
        }
        changes.audit.push(audit::entry(
            transient_id,
            now,
            &format!("classified as '{}' by {user}", classification.classification),
        ));
        let label = classification.classification.clone();
        changes.classification = Some(classification);
        changes.recompute_summary = true;

        let updated = self.commit(transient_id, changes).await?;
        info!(
            transient_id,
            classification = %label,
            first_classification = !record.classified,
            mwl = %updated.mwl,
            actor = %actor,
            "Classification recorded"
        );
        Ok(format!("transient #{transient_id} classified as '{label}'"))
    }
}
