// Workflow Module - Transient Triage State Machine
//
// Validates and applies curation moves, PI assignment, priority changes and
// classifications. Every request is checked against the current record first
// and then committed as a single change set.

pub mod types;
pub mod errors;
pub mod state_machine;
pub mod audit;
pub mod priority;
pub mod classification;
pub mod locks;
pub mod engine;
pub mod request;
pub mod service;

pub use types::{
    AlertWorkflowLocation, AuditLogEntry, ChangeSet, ClassificationRecord, MarshallWorkflowLocation,
    TransientId, TransientRecord, TransientSummary,
};
pub use errors::{ErrorKind, WorkflowAxis, WorkflowError};
pub use state_machine::WorkflowPolicy;
pub use classification::Classify;
pub use engine::{MoveWorkflow, SetObservationPriority, SetPrincipalInvestigator, WorkflowEngine};
pub use priority::{PriorityChange, PriorityScale};
pub use request::{TriageCommand, TriageRequest};
pub use service::{TriageService, NOTHING_CHANGED};
