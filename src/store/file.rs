use async_trait::async_trait;
use fd_lock::RwLock;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{apply_conditional, ShowSetStore, StoreError};
use crate::showset::{ShowSet, ShowSetId, ShowSetPatch};

/// File system store: one JSON document per ShowSet.
///
/// Writes for the same id hold an exclusive `fd-lock` on `<id>.showset.lock`
/// for the whole read/check/write, so separate processes sharing a directory
/// serialize on it. Documents land via a uniquely named temp file and a
/// rename, so readers never observe a half-written file.
#[derive(Debug, Clone)]
pub struct FileShowSetStore {
    directory: PathBuf,
}

/// Paths owned by one ShowSet id.
#[derive(Debug, Clone)]
struct RecordPaths {
    id: ShowSetId,
    document: PathBuf,
    lock: PathBuf,
}

impl RecordPaths {
    fn temp(&self) -> PathBuf {
        self.document
            .with_extension(format!("json.{}.tmp", Uuid::new_v4().simple()))
    }
}

impl FileShowSetStore {
    pub async fn open(directory: impl AsRef<Path>) -> Result<Self, StoreError> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory).await?;
        Ok(Self { directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn paths(&self, id: &ShowSetId) -> RecordPaths {
        RecordPaths {
            id: id.clone(),
            document: self.directory.join(format!("{}.showset.json", id)),
            lock: self.directory.join(format!("{}.showset.lock", id)),
        }
    }

    /// Run `op` on a blocking thread while holding the id's file lock.
    async fn locked<T, F>(&self, id: &ShowSetId, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&RecordPaths) -> Result<T, StoreError> + Send + 'static,
    {
        let paths = self.paths(id);
        tokio::task::spawn_blocking(move || {
            let lock_file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&paths.lock)?;
            let mut lock = RwLock::new(lock_file);
            let _guard = lock.write()?;
            op(&paths)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("store task failed: {e}")))?
    }
}

fn read_document(path: &Path) -> Result<Option<ShowSet>, StoreError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_document(paths: &RecordPaths, show_set: &ShowSet) -> Result<(), StoreError> {
    let temp_path = paths.temp();
    let json = serde_json::to_vec_pretty(show_set)?;
    std::fs::write(&temp_path, json)?;
    if let Err(e) = std::fs::rename(&temp_path, &paths.document) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e.into());
    }
    debug!(
        show_set_id = %show_set.id,
        revision = show_set.revision,
        path = %paths.document.display(),
        "ShowSet written"
    );
    Ok(())
}

#[async_trait]
impl ShowSetStore for FileShowSetStore {
    async fn get(&self, id: &ShowSetId) -> Result<Option<ShowSet>, StoreError> {
        let path = self.paths(id).document;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn create(&self, show_set: &ShowSet) -> Result<ShowSet, StoreError> {
        let mut stored = show_set.clone();
        stored.revision = 1;
        self.locked(&show_set.id, move |paths| {
            if read_document(&paths.document)?.is_some() {
                return Err(StoreError::AlreadyExists(paths.id.to_string()));
            }
            write_document(paths, &stored)?;
            Ok(stored)
        })
        .await
    }

    async fn put(&self, show_set: &ShowSet) -> Result<ShowSet, StoreError> {
        let mut stored = show_set.clone();
        self.locked(&show_set.id, move |paths| {
            let previous = read_document(&paths.document)?.map(|r| r.revision);
            stored.revision = previous.unwrap_or(0) + 1;
            write_document(paths, &stored)?;
            Ok(stored)
        })
        .await
    }

    async fn update(
        &self,
        id: &ShowSetId,
        expected_revision: u64,
        patch: &ShowSetPatch,
    ) -> Result<ShowSet, StoreError> {
        let patch = patch.clone();
        self.locked(id, move |paths| {
            let current = read_document(&paths.document)?
                .ok_or_else(|| StoreError::NotFound(paths.id.to_string()))?;
            let next = apply_conditional(&current, expected_revision, &patch)?;
            write_document(paths, &next)?;
            Ok(next)
        })
        .await
    }

    async fn delete(&self, id: &ShowSetId) -> Result<bool, StoreError> {
        self.locked(id, |paths| match std::fs::remove_file(&paths.document) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        })
        .await
    }

    async fn list(&self) -> Result<Vec<ShowSet>, StoreError> {
        let mut show_sets = Vec::new();
        let mut entries = fs::read_dir(&self.directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_record = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(".showset.json"))
                .unwrap_or(false);
            if !is_record {
                continue;
            }
            match fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<ShowSet>(&bytes) {
                    Ok(show_set) => show_sets.push(show_set),
                    Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable ShowSet"),
                },
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable ShowSet"),
            }
        }
        show_sets.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(show_sets)
    }
}
