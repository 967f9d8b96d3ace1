// Transient Marshall Library - Triage Workflow Core
// This exposes the core components for testing and integration

pub mod config;
pub mod telemetry;
pub mod identity;
pub mod store;
pub mod workflow;

#[cfg(feature = "database")]
pub mod database;

// Re-export key types for easy access
pub use config::{DatabaseConfig, MarshallConfig, ObservabilityConfig};
pub use telemetry::{create_transition_span, generate_correlation_id, init_telemetry};
pub use identity::ActingUser;
pub use store::{MemoryStore, StoreError, TransientStore};
pub use workflow::{
    AlertWorkflowLocation, MarshallWorkflowLocation, TransientRecord, TriageRequest, TriageService,
    WorkflowEngine, WorkflowError, WorkflowPolicy,
};

#[cfg(feature = "database")]
pub use database::SqliteStore;
