// Core types for ShowSets and their stage pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::versioning::{VersionLedger, VersionScheme};

/// The five deliverable stages, in pipeline order.
///
/// The derived `Ord` follows declaration order and every upstream/downstream
/// computation relies on it, so variants must never be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StageName {
    #[serde(rename = "screen")]
    Screen,
    #[serde(rename = "structure")]
    Structure,
    #[serde(rename = "integrated")]
    Integrated,
    #[serde(rename = "inBim360")]
    InBim360,
    #[serde(rename = "drawing2d")]
    Drawing2d,
}

impl StageName {
    pub const ALL: [StageName; 5] = [
        StageName::Screen,
        StageName::Structure,
        StageName::Integrated,
        StageName::InBim360,
        StageName::Drawing2d,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Screen => "screen",
            StageName::Structure => "structure",
            StageName::Integrated => "integrated",
            StageName::InBim360 => "inBim360",
            StageName::Drawing2d => "drawing2d",
        }
    }

    pub fn is_upstream_of(&self, other: StageName) -> bool {
        *self < other
    }

    /// Stages strictly after this one.
    pub fn downstream(&self) -> impl Iterator<Item = StageName> + '_ {
        Self::ALL.into_iter().filter(move |s| s > self)
    }

    /// Stages in `[from, to)`.
    pub fn span(from: StageName, to: StageName) -> Vec<StageName> {
        Self::ALL
            .into_iter()
            .filter(|s| *s >= from && *s < to)
            .collect()
    }

    /// The external-sync stage never carries an assignee or version label.
    pub fn supports_assignment(&self) -> bool {
        !matches!(self, StageName::InBim360)
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown stage '{0}'")]
pub struct UnknownStage(pub String);

impl FromStr for StageName {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| UnknownStage(s.to_string()))
    }
}

/// Per-stage lifecycle status. There is no terminal state: `complete` can
/// always be reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    NotStarted,
    InProgress,
    OnHold,
    EngineerReview,
    ClientReview,
    Complete,
    RevisionRequired,
}

impl StageStatus {
    pub const ALL: [StageStatus; 7] = [
        StageStatus::NotStarted,
        StageStatus::InProgress,
        StageStatus::OnHold,
        StageStatus::EngineerReview,
        StageStatus::ClientReview,
        StageStatus::Complete,
        StageStatus::RevisionRequired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::NotStarted => "not_started",
            StageStatus::InProgress => "in_progress",
            StageStatus::OnHold => "on_hold",
            StageStatus::EngineerReview => "engineer_review",
            StageStatus::ClientReview => "client_review",
            StageStatus::Complete => "complete",
            StageStatus::RevisionRequired => "revision_required",
        }
    }

    pub fn is_review(&self) -> bool {
        matches!(self, StageStatus::EngineerReview | StageStatus::ClientReview)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown stage status '{s}'"))
    }
}

/// Supported languages for localized text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Ja,
    Zh,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::En, Language::Ja, Language::Zh];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ja => "ja",
            Language::Zh => "zh",
        }
    }

    /// Every supported language except this one.
    pub fn others(&self) -> Vec<Language> {
        Self::ALL.into_iter().filter(|l| l != self).collect()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|lang| lang.as_str() == s)
            .ok_or_else(|| format!("unsupported language '{s}'"))
    }
}

/// Text held in each supported language; missing translations are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub en: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ja: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zh: Option<String>,
}

impl LocalizedText {
    pub fn from_source(language: Language, text: impl Into<String>) -> Self {
        let mut localized = Self::default();
        localized.set(language, text);
        localized
    }

    pub fn get(&self, language: Language) -> Option<&str> {
        match language {
            Language::En => self.en.as_deref(),
            Language::Ja => self.ja.as_deref(),
            Language::Zh => self.zh.as_deref(),
        }
    }

    pub fn set(&mut self, language: Language, text: impl Into<String>) {
        let slot = match language {
            Language::En => &mut self.en,
            Language::Ja => &mut self.ja,
            Language::Zh => &mut self.zh,
        };
        *slot = Some(text.into());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Area {
    Interior,
    Exterior,
}

impl FromStr for Area {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interior" => Ok(Area::Interior),
            "exterior" => Ok(Area::Exterior),
            other => Err(format!("unknown area '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShowSetId(String);

impl ShowSetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShowSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShowSetId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Revision note fields stored on a stage alongside its discussion item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionNote {
    pub note_id: Uuid,
    pub text: String,
    pub language: Language,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

/// One entry of the stages map. Replaced as a whole on every change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_note: Option<RevisionNote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// External URLs associated with a ShowSet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Links {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_viewer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bim360: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drawing_set: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_folder: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowSetLock {
    pub locked_at: DateTime<Utc>,
    pub locked_by: String,
}

/// Most recent unlock. `rework_pending` stays set until a lock-release
/// cascade consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockRecord {
    pub unlocked_at: DateTime<Utc>,
    pub unlocked_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub rework_pending: bool,
}

/// A descriptor for a file attached to a discussion item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub id: Uuid,
    pub key: String,
    pub file_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// Flat notes and threaded issues share one record shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiscussionKind {
    Note,
    Issue {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_id: Option<Uuid>,
        reply_count: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscussionItem {
    pub id: Uuid,
    pub stage: StageName,
    #[serde(flatten)]
    pub kind: DiscussionKind,
    pub text: String,
    pub language: Language,
    pub author_id: String,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<AttachmentRef>,
}

/// The unit of coordinated work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowSet {
    pub id: ShowSetId,
    pub area: Area,
    pub scene: String,
    #[serde(default)]
    pub description: LocalizedText,
    #[serde(default)]
    pub related_items: Vec<String>,
    pub stages: BTreeMap<StageName, Stage>,
    #[serde(default)]
    pub links: Links,
    pub versions: VersionLedger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<ShowSetLock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_unlock: Option<UnlockRecord>,
    #[serde(default)]
    pub discussion: Vec<DiscussionItem>,
    /// Store-managed write counter used for compare-and-swap.
    #[serde(default)]
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShowSet {
    /// A fresh ShowSet: every stage `not_started`, every counter at 1.
    pub fn new(
        id: ShowSetId,
        area: Area,
        scene: impl Into<String>,
        scheme: VersionScheme,
        now: DateTime<Utc>,
    ) -> Self {
        let stages = StageName::ALL
            .into_iter()
            .map(|name| (name, Stage::default()))
            .collect();

        Self {
            id,
            area,
            scene: scene.into(),
            description: LocalizedText::default(),
            related_items: Vec::new(),
            stages,
            links: Links::default(),
            versions: VersionLedger::new(scheme),
            lock: None,
            last_unlock: None,
            discussion: Vec::new(),
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn stage(&self, name: StageName) -> Option<&Stage> {
        self.stages.get(&name)
    }

    pub fn stage_mut(&mut self, name: StageName) -> &mut Stage {
        self.stages.entry(name).or_default()
    }

    pub fn status_of(&self, name: StageName) -> StageStatus {
        self.stage(name).map(|s| s.status).unwrap_or_default()
    }

    pub fn discussion_item(&self, id: Uuid) -> Option<&DiscussionItem> {
        self.discussion.iter().find(|item| item.id == id)
    }
}
