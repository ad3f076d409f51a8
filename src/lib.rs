// ShowSet Workflow - stage, version, cascade and lock engine for ShowSets
// This exposes the core components for the admin binary and for integration

pub mod cli;
pub mod config;
pub mod observability;
pub mod permissions;
pub mod showset;
pub mod store;
pub mod telemetry;
pub mod versioning;
pub mod workflow;

// Re-export key types for easy access
pub use config::{config, WorkflowConfig};
pub use observability::{workflow_metrics, OperationTimer, WorkflowMetrics};
pub use permissions::{Actor, PermissionResolver, PermissionSet, Role, StaticPermissionResolver};
pub use showset::{
    Area, DiscussionItem, DiscussionKind, FieldUpdate, Language, LocalizedText, ShowSet, ShowSetId,
    ShowSetPatch, Stage, StageName, StageStatus,
};
pub use store::{FileShowSetStore, InMemoryShowSetStore, ShowSetStore, StoreError};
pub use telemetry::{create_workflow_span, generate_correlation_id, init_telemetry};
pub use versioning::{DeliverableType, VersionBump, VersionLedger, VersionScheme, VersionTrigger};
pub use workflow::{
    CascadePolicy, LockPolicy, TransitionRequest, WorkflowError, WorkflowOrchestrator,
};
