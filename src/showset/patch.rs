// Typed patches applied to a stored ShowSet inside a single conditional write

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::types::{DiscussionItem, Links, ShowSet, ShowSetLock, Stage, StageName, UnlockRecord};
use crate::versioning::VersionLedger;

/// Update instruction for an optional field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum FieldUpdate<T> {
    #[default]
    Keep,
    Set(T),
    Clear,
}

impl<T: Clone + PartialEq> FieldUpdate<T> {
    /// Applies the update and reports whether the field changed.
    pub fn apply(&self, target: &mut Option<T>) -> bool {
        let next = match self {
            FieldUpdate::Keep => return false,
            FieldUpdate::Set(value) => Some(value.clone()),
            FieldUpdate::Clear => None,
        };
        if *target == next {
            return false;
        }
        *target = next;
        true
    }

    fn between(before: &Option<T>, after: &Option<T>) -> Self {
        match (before, after) {
            (b, a) if b == a => FieldUpdate::Keep,
            (_, Some(value)) => FieldUpdate::Set(value.clone()),
            (_, None) => FieldUpdate::Clear,
        }
    }
}

impl<T> FieldUpdate<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, FieldUpdate::Keep)
    }
}

/// The set of fields one workflow operation changes on a ShowSet.
///
/// Stage entries are whole sub-record replacements; discussion items are
/// upserted by id; the version ledger is replaced as a unit so counters and
/// history always move together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShowSetPatch {
    pub stages: BTreeMap<StageName, Stage>,
    pub versions: Option<VersionLedger>,
    pub links: Option<Links>,
    pub lock: FieldUpdate<ShowSetLock>,
    pub last_unlock: FieldUpdate<UnlockRecord>,
    pub discussion: Vec<DiscussionItem>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ShowSetPatch {
    /// Computes the patch turning `before` into `after`.
    pub fn between(before: &ShowSet, after: &ShowSet) -> Self {
        let stages = after
            .stages
            .iter()
            .filter(|(name, stage)| before.stages.get(name) != Some(stage))
            .map(|(name, stage)| (*name, stage.clone()))
            .collect();

        let discussion = after
            .discussion
            .iter()
            .filter(|item| before.discussion_item(item.id) != Some(item))
            .cloned()
            .collect();

        let mut patch = Self {
            stages,
            versions: (before.versions != after.versions).then(|| after.versions.clone()),
            links: (before.links != after.links).then(|| after.links.clone()),
            lock: FieldUpdate::between(&before.lock, &after.lock),
            last_unlock: FieldUpdate::between(&before.last_unlock, &after.last_unlock),
            discussion,
            updated_at: None,
        };
        if !patch.is_empty() {
            patch.updated_at = Some(after.updated_at);
        }
        patch
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
            && self.versions.is_none()
            && self.links.is_none()
            && self.lock.is_keep()
            && self.last_unlock.is_keep()
            && self.discussion.is_empty()
    }

    pub fn apply_to(&self, show_set: &mut ShowSet) {
        for (name, stage) in &self.stages {
            show_set.stages.insert(*name, stage.clone());
        }
        if let Some(versions) = &self.versions {
            show_set.versions = versions.clone();
        }
        if let Some(links) = &self.links {
            show_set.links = links.clone();
        }
        self.lock.apply(&mut show_set.lock);
        self.last_unlock.apply(&mut show_set.last_unlock);
        for item in &self.discussion {
            match show_set.discussion.iter_mut().find(|i| i.id == item.id) {
                Some(existing) => *existing = item.clone(),
                None => show_set.discussion.push(item.clone()),
            }
        }
        if let Some(updated_at) = self.updated_at {
            show_set.updated_at = updated_at;
        }
    }
}
