use tracing::Instrument;

use super::engine::WorkflowEngine;
use super::errors::WorkflowError;
use super::request::{TriageCommand, TriageRequest};
use crate::identity::ActingUser;
use crate::telemetry::{create_transition_span, generate_correlation_id};

/// Response when a payload carried nothing to act on
pub const NOTHING_CHANGED: &str = "nothing has changed";

/// Single entry point for the outer request layer: validates a request,
/// dispatches it to the engine and returns the confirmation text
#[derive(Debug)]
pub struct TriageService {
    engine: WorkflowEngine,
}

impl TriageService {
    pub fn new(engine: WorkflowEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    pub async fn handle(&self, request: TriageRequest, actor: &ActingUser) -> Result<String, WorkflowError> {
        let correlation_id = generate_correlation_id();
        let span = create_transition_span(
            request.operation(),
            request.transient_id(),
            actor.login(),
            &correlation_id,
        );

        async move {
            let command = request.validate(self.engine.policy())?;
            match command {
                TriageCommand::MoveWorkflow(cmd) => self.engine.move_workflow(&cmd, actor).await,
                TriageCommand::SetPrincipalInvestigator(cmd) => {
                    self.engine.set_principal_investigator(&cmd, actor).await
                }
                TriageCommand::SetObservationPriority(cmd) => {
                    self.engine.set_observation_priority(&cmd, actor).await
                }
                TriageCommand::Classify(cmd) => self.engine.classify(&cmd, actor).await,
                TriageCommand::Noop(_) => Ok(NOTHING_CHANGED.to_string()),
            }
        }
        .instrument(span)
        .await
    }
}
