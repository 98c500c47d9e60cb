use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{ArtifactKey, ArtifactKind, ArtifactStore};
use crate::error::{StorageError, StorageResult};

/// JSON files under `<root>/iteration-<n>/`.
///
/// ```text
/// output/iteration-0/script.json
/// output/iteration-0/personas.json
/// output/iteration-0/conversations/persona-0.json
/// output/iteration-0/evaluations.json
/// output/iteration-0/summary.json
/// output/iteration-0/failure-analysis.json
/// ```
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `root`; directories are created on write.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn iteration_dir(&self, iteration: u32) -> PathBuf {
        self.root.join(format!("iteration-{}", iteration))
    }

    /// File backing `key`
    pub fn path_for(&self, key: &ArtifactKey) -> PathBuf {
        let dir = self.iteration_dir(key.iteration);
        match (&key.kind, &key.persona_id) {
            (ArtifactKind::Conversation, Some(id)) => {
                dir.join("conversations").join(format!("{}.json", id))
            }
            (kind, _) => dir.join(format!("{}.json", kind.as_str())),
        }
    }
}

fn io_error(path: &Path, e: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

#[async_trait]
impl ArtifactStore for FileStore {
    async fn put(&self, key: &ArtifactKey, value: &serde_json::Value) -> StorageResult<()> {
        key.validate()?;
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }

        let body = serde_json::to_string_pretty(value).map_err(|e| StorageError::Malformed {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| io_error(&path, e))?;

        debug!(path = %path.display(), "Artifact written");
        Ok(())
    }

    async fn get(&self, key: &ArtifactKey) -> StorageResult<Option<serde_json::Value>> {
        key.validate()?;
        let path = self.path_for(key);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, e)),
        };

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StorageError::Malformed {
                key: key.to_string(),
                message: e.to_string(),
            })
    }

    async fn list_iterations(&self) -> StorageResult<Vec<u32>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.root, e)),
        };

        let mut iterations = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.root, e))?
        {
            let name = entry.file_name();
            if let Some(n) = name
                .to_str()
                .and_then(|s| s.strip_prefix("iteration-"))
                .and_then(|s| s.parse::<u32>().ok())
            {
                iterations.push(n);
            }
        }

        iterations.sort_unstable();
        Ok(iterations)
    }
}
