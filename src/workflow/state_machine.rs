// Guarded transition tables for both workflow axes

use serde::{Deserialize, Serialize};

use super::errors::{WorkflowAxis, WorkflowError};
use super::types::TransientRecord;
use super::types::{AlertWorkflowLocation as Awl, MarshallWorkflowLocation as Mwl};

/// Deployment switches covering the observed revisions of the workflow rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowPolicy {
    /// Only `queued for atel -> soxs classification released` is allowed on
    /// the alert axis
    pub strict_awl: bool,
    /// Accept alert locations outside the allow-list (non-strict only)
    pub open_awl_values: bool,
    /// Entering `following` resets the observation priority to 2
    pub auto_reset_priority_on_following: bool,
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self {
            strict_awl: true,
            open_awl_values: false,
            auto_reset_priority_on_following: false,
        }
    }
}

/// Extra precondition attached to an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    None,
    Classified,
    PiAssigned,
}

/// Outgoing edges of the curation workflow. `archive` is terminal.
pub fn mwl_edges(from: Mwl) -> &'static [(Mwl, Guard)] {
    match from {
        Mwl::Inbox => &[(Mwl::Archive, Guard::None)],
        Mwl::PendingObservation => &[
            (Mwl::ReviewForFollowup, Guard::Classified),
            (Mwl::Archive, Guard::None),
        ],
        Mwl::ReviewForFollowup => &[
            (Mwl::Following, Guard::PiAssigned),
            (Mwl::Archive, Guard::None),
        ],
        Mwl::Following => &[(Mwl::FollowupComplete, Guard::None)],
        Mwl::FollowupComplete => &[(Mwl::Archive, Guard::None)],
        Mwl::Archive => &[],
    }
}

/// Validate a curation move of `record` to `to`
pub fn check_mwl_transition(record: &TransientRecord, to: Mwl) -> Result<(), WorkflowError> {
    let reject = |reason: String| WorkflowError::InvalidTransition {
        transient_id: record.id,
        axis: WorkflowAxis::Marshall,
        to: to.to_string(),
        reason,
    };

    let guard = mwl_edges(record.mwl)
        .iter()
        .find(|(target, _)| *target == to)
        .map(|(_, guard)| *guard)
        .ok_or_else(|| reject(format!("it is in the `{}` list", record.mwl)))?;

    match guard {
        Guard::None => Ok(()),
        Guard::Classified if record.classified => Ok(()),
        Guard::Classified => Err(reject("it is not classified".to_string())),
        Guard::PiAssigned if record.has_pi() => Ok(()),
        Guard::PiAssigned => Err(reject("it does not have a PI assigned".to_string())),
    }
}

/// Resolve a requested alert location against the policy's allow-list
pub fn parse_awl(raw: &str, policy: &WorkflowPolicy) -> Result<Awl, WorkflowError> {
    if let Some(known) = Awl::parse_known(raw) {
        return Ok(known);
    }
    let value = raw.trim();
    if !policy.strict_awl && policy.open_awl_values && !value.is_empty() {
        return Ok(Awl::Other(value.to_string()));
    }
    Err(WorkflowError::InvalidTarget {
        axis: WorkflowAxis::Alert,
        value: raw.to_string(),
    })
}

/// Validate an alert-workflow move of `record` to `to`
pub fn check_awl_transition(
    record: &TransientRecord,
    to: &Awl,
    policy: &WorkflowPolicy,
) -> Result<(), WorkflowError> {
    if !policy.strict_awl {
        return Ok(());
    }
    match (&record.awl, to) {
        (Some(Awl::QueuedForAtel), Awl::SoxsClassificationReleased) => Ok(()),
        (current, _) => Err(WorkflowError::InvalidTransition {
            transient_id: record.id,
            axis: WorkflowAxis::Alert,
            to: to.to_string(),
            reason: match current {
                Some(awl) => format!("it is in the `{awl}` list"),
                None => "it has no alert workflow location".to_string(),
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::errors::ErrorKind;
    use proptest::prelude::*;

    fn record_at(mwl: Mwl) -> TransientRecord {
        TransientRecord::new(1, "SN2024x", 150.0, 2.2)
            .with_mwl(mwl)
            .with_classified(true)
            .with_pi("Jane Doe", "jane@x.org")
    }

    fn mwl_strategy() -> impl Strategy<Value = Mwl> {
        prop::sample::select(Mwl::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_only_table_edges_are_accepted(from in mwl_strategy(), to in mwl_strategy()) {
            let in_table = mwl_edges(from).iter().any(|(target, _)| *target == to);
            let result = check_mwl_transition(&record_at(from), to);
            prop_assert_eq!(result.is_ok(), in_table);
            if let Err(err) = result {
                prop_assert_eq!(err.kind(), ErrorKind::InvalidTransition);
            }
        }
    }

    #[test]
    fn test_archive_is_terminal() {
        assert!(mwl_edges(Mwl::Archive).is_empty());
        for to in Mwl::ALL {
            assert!(check_mwl_transition(&record_at(Mwl::Archive), to).is_err());
        }
    }

    #[test]
    fn test_review_requires_classification() {
        let mut record = record_at(Mwl::PendingObservation);
        record.classified = false;
        let err = check_mwl_transition(&record, Mwl::ReviewForFollowup).unwrap_err();
        assert!(err.to_string().contains("not classified"));

        record.classified = true;
        assert!(check_mwl_transition(&record, Mwl::ReviewForFollowup).is_ok());
    }

    #[test]
    fn test_following_requires_pi() {
        let mut record = record_at(Mwl::ReviewForFollowup);
        record.pi_email = None;
        let err = check_mwl_transition(&record, Mwl::Following).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert!(err.to_string().contains("PI"));
    }

    #[test]
    fn test_strict_awl_allows_single_edge() {
        let policy = WorkflowPolicy::default();
        let queued = record_at(Mwl::Following).with_awl(Awl::QueuedForAtel);
        assert!(check_awl_transition(&queued, &Awl::SoxsClassificationReleased, &policy).is_ok());
        assert!(check_awl_transition(&queued, &Awl::ArchivedWithoutAlert, &policy).is_err());

        let released = record_at(Mwl::Following).with_awl(Awl::SoxsClassificationReleased);
        assert!(check_awl_transition(&released, &Awl::SoxsClassificationReleased, &policy).is_err());
        assert!(check_awl_transition(&record_at(Mwl::Inbox), &Awl::QueuedForAtel, &policy).is_err());
    }

    #[test]
    fn test_lenient_awl_accepts_any_allow_listed_value() {
        let policy = WorkflowPolicy {
            strict_awl: false,
            ..Default::default()
        };
        let record = record_at(Mwl::Inbox).with_awl(Awl::SoxsClassificationReleased);
        for to in Awl::KNOWN {
            assert!(check_awl_transition(&record, &to, &policy).is_ok());
        }
        let err = parse_awl("sent to tns", &policy).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTarget);
    }

    #[test]
    fn test_open_awl_values_only_when_lenient() {
        let open = WorkflowPolicy {
            strict_awl: false,
            open_awl_values: true,
            ..Default::default()
        };
        assert_eq!(
            parse_awl("sent to tns", &open).unwrap(),
            Awl::Other("sent to tns".to_string())
        );
        assert!(parse_awl("  ", &open).is_err());

        let strict_open = WorkflowPolicy {
            open_awl_values: true,
            ..Default::default()
        };
        assert!(parse_awl("sent to tns", &strict_open).is_err());
        assert_eq!(parse_awl("queued_for_atel", &strict_open).unwrap(), Awl::QueuedForAtel);
    }
}
