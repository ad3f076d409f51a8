// ShowSet workflow engine
//
// The stage state machine, cascade engine and lock gate are synchronous and
// operate on a working copy; the orchestrator owns the store round trip and
// the best-effort collaborators.

pub mod activity;
pub mod attachments;
pub mod cascade;
pub mod error;
pub mod lock;
pub mod orchestrator;
pub mod stage;
pub mod translation;

pub use activity::{
    ActivityKind, ActivityRecord, ActivitySink, InMemoryActivitySink, JsonLinesActivitySink,
};
pub use attachments::{
    AttachmentDescriptor, LocalUploadSigner, UploadHandle, UploadSigner, ALLOWED_MIME_TYPES,
};
pub use cascade::{
    CascadeContext, CascadeOutcome, CascadePolicy, LockReleaseCascade, ReworkCascade, StageReset,
};
pub use error::{ErrorKind, SideEffectError, WorkflowError};
pub use lock::{ExplicitAdminLock, ImplicitCompletionLock, LockPolicy};
pub use orchestrator::{
    DiscussionPost, DiscussionThread, LinksUpdate, NewShowSet, OrchestratorSettings,
    PostedDiscussion, Recall, RecallRequest, SetVersionRequest, StageUpdate, Unlock,
    UnlockRequest, UpstreamRevision, UpstreamRevisionRequest, VersionEdit, VersionTarget,
    WorkflowOrchestrator,
};
pub use stage::{
    bumps_version, RevisionNoteInput, StageMachine, StageRules, TransitionOutcome,
    TransitionRequest,
};
pub use translation::{
    ChannelTranslationQueue, LoggingTranslationQueue, TranslationJob, TranslationQueue,
};
