// Translation fan-out for free-text notes

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use super::error::SideEffectError;
use crate::showset::{DiscussionItem, Language, ShowSetId};

/// Flat, JSON-serializable job payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationJob {
    pub note_id: Uuid,
    pub show_set_id: String,
    pub source_language: Language,
    pub text: String,
    pub target_languages: Vec<Language>,
}

impl TranslationJob {
    pub fn for_item(show_set_id: &ShowSetId, item: &DiscussionItem) -> Self {
        Self {
            note_id: item.id,
            show_set_id: show_set_id.to_string(),
            source_language: item.language,
            text: item.text.clone(),
            target_languages: item.language.others(),
        }
    }
}

/// Fire-and-forget outbound queue. Consumers must tolerate duplicates.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait TranslationQueue: Send + Sync {
    async fn enqueue(&self, job: TranslationJob) -> Result<(), SideEffectError>;
}

/// Hands jobs to an in-process consumer over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelTranslationQueue {
    sender: mpsc::UnboundedSender<TranslationJob>,
}

impl ChannelTranslationQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TranslationJob>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl TranslationQueue for ChannelTranslationQueue {
    async fn enqueue(&self, job: TranslationJob) -> Result<(), SideEffectError> {
        self.sender
            .send(job)
            .map_err(|_| SideEffectError::Unavailable("translation consumer dropped".to_string()))
    }
}

/// Emits jobs as structured log events. Used where no translation backend is
/// wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingTranslationQueue;

#[async_trait]
impl TranslationQueue for LoggingTranslationQueue {
    async fn enqueue(&self, job: TranslationJob) -> Result<(), SideEffectError> {
        let payload = serde_json::to_string(&job)?;
        info!(
            note_id = %job.note_id,
            show_set_id = %job.show_set_id,
            payload = %payload,
            "Translation job queued"
        );
        Ok(())
    }
}
