// Activity log - immutable audit entries emitted by every state change

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use super::error::SideEffectError;
use crate::permissions::Actor;
use crate::showset::ShowSetId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    ShowSetCreated,
    ShowSetDeleted,
    LinksUpdated,
    StatusChanged,
    AssigneeChanged,
    VersionLabelChanged,
    VersionBumped,
    CascadeReset,
    UpstreamRevisionRequested,
    Recalled,
    Locked,
    Unlocked,
    VersionEdited,
    DiscussionPosted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: Uuid,
    pub show_set_id: String,
    pub actor_id: String,
    pub actor_name: String,
    pub kind: ActivityKind,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

impl ActivityRecord {
    pub fn new(
        show_set_id: &ShowSetId,
        actor: &Actor,
        kind: ActivityKind,
        details: Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            show_set_id: show_set_id.to_string(),
            actor_id: actor.id.clone(),
            actor_name: actor.name.clone(),
            kind,
            details,
            created_at,
        }
    }
}

/// Append-only sink for activity records. Best effort: failures never fail
/// the workflow operation that produced the record.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn append(&self, record: ActivityRecord) -> Result<(), SideEffectError>;
}

/// Keeps records in memory, in append order.
#[derive(Debug, Default)]
pub struct InMemoryActivitySink {
    records: Mutex<Vec<ActivityRecord>>,
}

impl InMemoryActivitySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<ActivityRecord> {
        self.records.lock().await.clone()
    }

    pub async fn kinds_for(&self, show_set_id: &str) -> Vec<ActivityKind> {
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| r.show_set_id == show_set_id)
            .map(|r| r.kind)
            .collect()
    }
}

#[async_trait]
impl ActivitySink for InMemoryActivitySink {
    async fn append(&self, record: ActivityRecord) -> Result<(), SideEffectError> {
        self.records.lock().await.push(record);
        Ok(())
    }
}

/// Appends one JSON document per line to a file.
#[derive(Debug)]
pub struct JsonLinesActivitySink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesActivitySink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub async fn read_all(&self) -> Result<Vec<ActivityRecord>, SideEffectError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(SideEffectError::from))
            .collect()
    }
}

#[async_trait]
impl ActivitySink for JsonLinesActivitySink {
    async fn append(&self, record: ActivityRecord) -> Result<(), SideEffectError> {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::Role;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(kind: ActivityKind) -> ActivityRecord {
        ActivityRecord::new(
            &ShowSetId::new("AB-101"),
            &Actor::new("u1", "Uma", Role::Artist),
            kind,
            json!({ "stage": "screen" }),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_in_memory_sink_preserves_order() {
        let sink = InMemoryActivitySink::new();
        sink.append(record(ActivityKind::StatusChanged)).await.unwrap();
        sink.append(record(ActivityKind::VersionBumped)).await.unwrap();

        assert_eq!(
            sink.kinds_for("AB-101").await,
            vec![ActivityKind::StatusChanged, ActivityKind::VersionBumped]
        );
        assert!(sink.kinds_for("AB-999").await.is_empty());
    }

    #[tokio::test]
    async fn test_json_lines_sink_appends() {
        let dir = TempDir::new().unwrap();
        let sink = JsonLinesActivitySink::new(dir.path().join("activity.jsonl"));
        assert!(sink.read_all().await.unwrap().is_empty());

        sink.append(record(ActivityKind::Locked)).await.unwrap();
        sink.append(record(ActivityKind::Unlocked)).await.unwrap();

        let records = sink.read_all().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, ActivityKind::Locked);
        assert_eq!(records[1].details["stage"], "screen");
    }
}
