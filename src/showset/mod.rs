// ShowSet data model
//
// A ShowSet is owned by the store and only ever mutated through the workflow
// orchestrator. Everything in here is plain data.

pub mod patch;
pub mod types;

pub use patch::{FieldUpdate, ShowSetPatch};
pub use types::{
    Area, AttachmentRef, DiscussionItem, DiscussionKind, Language, Links, LocalizedText,
    RevisionNote, ShowSet, ShowSetId, ShowSetLock, Stage, StageName, StageStatus, UnknownStage,
    UnlockRecord,
};
