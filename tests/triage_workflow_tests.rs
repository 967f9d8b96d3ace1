//! Triage Workflow Tests
//!
//! End-to-end walk of a transient through the marshall lists via the
//! request service, backed by the in-memory store.

use std::sync::Arc;
use transient_marshall::identity::ActingUser;
use transient_marshall::store::{MemoryStore, TransientStore};
use transient_marshall::workflow::{
    AlertWorkflowLocation, ErrorKind, MarshallWorkflowLocation, TransientRecord, TriageRequest,
    TriageService, WorkflowEngine, WorkflowPolicy,
};

/// Test fixture wiring a service to a shared in-memory store
struct TriageFixture {
    store: Arc<MemoryStore>,
    service: TriageService,
    actor: ActingUser,
}

impl TriageFixture {
    fn new(records: Vec<TransientRecord>, policy: WorkflowPolicy) -> Self {
        let store = Arc::new(MemoryStore::with_records(records));
        let service = TriageService::new(WorkflowEngine::new(store.clone(), policy));
        Self {
            store,
            service,
            actor: ActingUser::new("jane.doe"),
        }
    }

    async fn send(&self, request: TriageRequest) -> Result<String, transient_marshall::WorkflowError> {
        self.service.handle(request, &self.actor).await
    }

    async fn record(&self, transient_id: i64) -> TransientRecord {
        self.store.fetch(transient_id).await.unwrap().unwrap()
    }
}

fn move_mwl(transient_id: i64, mwl: &str) -> TriageRequest {
    TriageRequest::MoveWorkflow {
        transient_id,
        mwl: Some(mwl.to_string()),
        awl: None,
        snoozed: false,
    }
}

#[tokio::test]
async fn test_pending_observation_to_following_walkthrough() {
    let fixture = TriageFixture::new(
        vec![TransientRecord::new(42, "SN2024xyz", 150.1, -12.3)
            .with_mwl(MarshallWorkflowLocation::PendingObservation)],
        WorkflowPolicy::default(),
    );

    // unclassified objects cannot be reviewed
    let err = fixture
        .send(move_mwl(42, "review_for_followup"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    let response = fixture
        .send(TriageRequest::Classify {
            transient_id: 42,
            observation_date: "2024-03-01".to_string(),
            source: "SOXS".to_string(),
            spectral_type: "supernova".to_string(),
            sub_type: Some("Ia".to_string()),
            redshift: Some("0.034".to_string()),
            classification_wrt_max: Some("pre-max".to_string()),
            phase: None,
            peculiar: false,
        })
        .await
        .unwrap();
    assert_eq!(response, "transient #42 classified as 'Ia'");

    let record = fixture.record(42).await;
    assert!(record.classified);
    assert_eq!(record.mwl, MarshallWorkflowLocation::ReviewForFollowup);
    assert_eq!(record.awl, Some(AlertWorkflowLocation::ArchivedWithoutAlert));

    // no PI yet
    let err = fixture.send(move_mwl(42, "following")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    fixture
        .send(TriageRequest::SetPi {
            transient_id: 42,
            pi_name: "Jane".to_string(),
            pi_email: "jane@x.org".to_string(),
        })
        .await
        .unwrap();

    let response = fixture.send(move_mwl(42, "following")).await.unwrap();
    assert_eq!(response, "transient #42 moved to the `following` marshallWorkflowLocation");
    assert_eq!(fixture.record(42).await.mwl, MarshallWorkflowLocation::Following);

    let history = fixture.store.history(42).await.unwrap();
    let messages: Vec<&str> = history.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(
        messages,
        vec![
            "classified as 'Ia' by Jane Doe",
            "Jane (jane@x.org) assigned as PI of this object by Jane Doe",
            "moved from 'review for followup' to 'followup targets' list by Jane Doe",
        ]
    );
}

#[tokio::test]
async fn test_followup_campaign_ends_in_archive() {
    let fixture = TriageFixture::new(
        vec![TransientRecord::new(7, "AT2024q", 10.0, 20.0)
            .with_mwl(MarshallWorkflowLocation::Following)
            .with_classified(true)
            .with_pi("Jane", "jane@x.org")],
        WorkflowPolicy::default(),
    );

    fixture.send(move_mwl(7, "followup complete")).await.unwrap();
    fixture.send(move_mwl(7, "archive")).await.unwrap();

    let record = fixture.record(7).await;
    assert_eq!(record.mwl, MarshallWorkflowLocation::Archive);
    assert!(record.last_reviewed_mag_date.is_some());

    // archive is terminal
    let err = fixture.send(move_mwl(7, "inbox")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    assert_eq!(fixture.store.history(7).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_history_uses_user_facing_list_names() {
    let fixture = TriageFixture::new(
        vec![TransientRecord::new(3, "AT2024c", 0.0, 0.0)
            .with_mwl(MarshallWorkflowLocation::PendingObservation)],
        WorkflowPolicy::default(),
    );

    fixture.send(move_mwl(3, "archive")).await.unwrap();

    let history = fixture.store.history(3).await.unwrap();
    assert_eq!(
        history[0].message,
        "moved from 'classification targets' to 'archive' list by Jane Doe"
    );
}

#[tokio::test]
async fn test_alert_axis_under_strict_policy() {
    let fixture = TriageFixture::new(
        vec![
            TransientRecord::new(1, "AT2024a", 0.0, 0.0).with_awl(AlertWorkflowLocation::QueuedForAtel),
            TransientRecord::new(2, "AT2024b", 0.0, 0.0)
                .with_awl(AlertWorkflowLocation::ArchivedWithoutAlert),
        ],
        WorkflowPolicy::default(),
    );
    let move_awl = |transient_id, awl: &str| TriageRequest::MoveWorkflow {
        transient_id,
        mwl: None,
        awl: Some(awl.to_string()),
        snoozed: false,
    };

    let response = fixture
        .send(move_awl(1, "soxs classification released"))
        .await
        .unwrap();
    assert_eq!(
        response,
        "transient #1 moved to the `soxs classification released` alertWorkflowLocation"
    );

    let err = fixture.send(move_awl(2, "queued for atel")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    let err = fixture.send(move_awl(1, "pessto classification released")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTarget);
}

#[tokio::test]
async fn test_open_alert_values_when_configured() {
    let policy = WorkflowPolicy {
        strict_awl: false,
        open_awl_values: true,
        auto_reset_priority_on_following: false,
    };
    let fixture = TriageFixture::new(vec![TransientRecord::new(1, "AT2024a", 0.0, 0.0)], policy);

    fixture
        .send(TriageRequest::MoveWorkflow {
            transient_id: 1,
            mwl: None,
            awl: Some("pessto classification released".to_string()),
            snoozed: false,
        })
        .await
        .unwrap();

    assert_eq!(
        fixture.record(1).await.awl,
        Some(AlertWorkflowLocation::Other("pessto classification released".to_string()))
    );
}

#[tokio::test]
async fn test_invalid_location_is_rejected_before_reading() {
    let fixture = TriageFixture::new(vec![], WorkflowPolicy::default());
    let err = fixture.send(move_mwl(404, "pending classification")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTarget);
}
