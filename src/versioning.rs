// Version Ledger - per-deliverable counters plus an append-only history log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::showset::{LocalizedText, StageName};

/// Version-counter bucket a stage's output belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliverableType {
    Screen,
    Structure,
    Integrated,
    /// Shared bucket for structure and integrated.
    Model,
    Drawing2d,
}

impl DeliverableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliverableType::Screen => "screen",
            DeliverableType::Structure => "structure",
            DeliverableType::Integrated => "integrated",
            DeliverableType::Model => "model",
            DeliverableType::Drawing2d => "drawing2d",
        }
    }
}

impl fmt::Display for DeliverableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliverableType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "screen" => Ok(DeliverableType::Screen),
            "structure" => Ok(DeliverableType::Structure),
            "integrated" => Ok(DeliverableType::Integrated),
            "model" => Ok(DeliverableType::Model),
            "drawing2d" => Ok(DeliverableType::Drawing2d),
            other => Err(format!("unknown deliverable type '{other}'")),
        }
    }
}

/// How stages map onto deliverable counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionScheme {
    /// Every versioned stage has its own counter.
    #[default]
    PerStage,
    /// `structure` and `integrated` share the `model` counter.
    SharedModel,
}

impl VersionScheme {
    /// The external-sync stage (`inBim360`) has no deliverable.
    pub fn deliverable_for(&self, stage: StageName) -> Option<DeliverableType> {
        match (self, stage) {
            (_, StageName::Screen) => Some(DeliverableType::Screen),
            (VersionScheme::PerStage, StageName::Structure) => Some(DeliverableType::Structure),
            (VersionScheme::PerStage, StageName::Integrated) => Some(DeliverableType::Integrated),
            (VersionScheme::SharedModel, StageName::Structure | StageName::Integrated) => {
                Some(DeliverableType::Model)
            }
            (_, StageName::InBim360) => None,
            (_, StageName::Drawing2d) => Some(DeliverableType::Drawing2d),
        }
    }

    pub fn deliverables(&self) -> Vec<DeliverableType> {
        let mut deliverables: Vec<_> = StageName::ALL
            .into_iter()
            .filter_map(|stage| self.deliverable_for(stage))
            .collect();
        deliverables.dedup();
        deliverables
    }
}

/// What caused a version change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VersionTrigger {
    Rework { stage: StageName },
    Recall { from: StageName, target: StageName },
    LockRelease { origin: StageName },
    Manual,
}

impl VersionTrigger {
    pub fn label(&self) -> &'static str {
        match self {
            VersionTrigger::Rework { .. } => "rework",
            VersionTrigger::Recall { .. } => "recall",
            VersionTrigger::LockRelease { .. } => "lock_release",
            VersionTrigger::Manual => "manual",
        }
    }
}

/// Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionHistoryEntry {
    pub id: Uuid,
    pub deliverable: DeliverableType,
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<LocalizedText>,
    pub trigger: VersionTrigger,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Result of a counter change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionBump {
    pub deliverable: DeliverableType,
    pub from: u32,
    pub to: u32,
    pub history_id: Uuid,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("version target must be at least 1, got {0}")]
    NonPositiveTarget(u32),
    #[error("deliverable {0} is not tracked by this ShowSet")]
    UnknownDeliverable(DeliverableType),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionLedger {
    counters: BTreeMap<DeliverableType, u32>,
    #[serde(default)]
    history: Vec<VersionHistoryEntry>,
}

impl VersionLedger {
    pub fn new(scheme: VersionScheme) -> Self {
        Self {
            counters: scheme.deliverables().into_iter().map(|d| (d, 1)).collect(),
            history: Vec::new(),
        }
    }

    pub fn counters(&self) -> &BTreeMap<DeliverableType, u32> {
        &self.counters
    }

    pub fn current(&self, deliverable: DeliverableType) -> Option<u32> {
        self.counters.get(&deliverable).copied()
    }

    pub fn history(&self) -> &[VersionHistoryEntry] {
        &self.history
    }

    pub fn history_for(&self, deliverable: DeliverableType) -> Vec<&VersionHistoryEntry> {
        self.history
            .iter()
            .filter(|entry| entry.deliverable == deliverable)
            .collect()
    }

    /// Increments a counter by exactly one and appends a history entry with
    /// no reason attached. Counters are never created here.
    pub fn bump(
        &mut self,
        deliverable: DeliverableType,
        trigger: VersionTrigger,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<VersionBump, VersionError> {
        let from = self
            .current(deliverable)
            .ok_or(VersionError::UnknownDeliverable(deliverable))?;
        Ok(self.record(deliverable, from, from + 1, None, trigger, actor_id, now))
    }

    /// Administrative override. Returns `Ok(None)` when `target` equals the
    /// current value; any other positive target is accepted, including ones
    /// lower than the current value.
    pub fn set(
        &mut self,
        deliverable: DeliverableType,
        target: u32,
        reason: Option<LocalizedText>,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<VersionBump>, VersionError> {
        if target == 0 {
            return Err(VersionError::NonPositiveTarget(target));
        }
        let from = self
            .current(deliverable)
            .ok_or(VersionError::UnknownDeliverable(deliverable))?;
        if from == target {
            return Ok(None);
        }
        Ok(Some(self.record(
            deliverable,
            from,
            target,
            reason,
            VersionTrigger::Manual,
            actor_id,
            now,
        )))
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &mut self,
        deliverable: DeliverableType,
        from: u32,
        to: u32,
        reason: Option<LocalizedText>,
        trigger: VersionTrigger,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> VersionBump {
        let entry = VersionHistoryEntry {
            id: Uuid::new_v4(),
            deliverable,
            version: to,
            reason,
            trigger,
            created_by: actor_id.to_string(),
            created_at: now,
        };
        let history_id = entry.id;
        debug!(
            deliverable = %deliverable,
            from = from,
            to = to,
            trigger = entry.trigger.label(),
            "Recording version change"
        );
        self.counters.insert(deliverable, to);
        self.history.push(entry);
        VersionBump {
            deliverable,
            from,
            to,
            history_id,
        }
    }
}
