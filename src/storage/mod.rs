//! Storage layer for iteration artifacts.
//!
//! Artifacts are JSON values addressed by `(iteration, kind)`, plus a persona
//! id for conversations. Two backends implement [`ArtifactStore`]: plain JSON
//! files laid out per iteration, and a SQLite table. [`Artifacts`] adds the
//! typed save/load operations the orchestrator and CLI use.

mod file;
mod sqlite;

pub use file::FileStore;
pub use sqlite::SqliteStore;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::{AppError, AppResult, StorageError, StorageResult};
use crate::prompts::SEED_SCRIPT;
use crate::types::{
    BotScript, Conversation, Evaluation, FailureAnalysis, IterationSummary, Persona,
};

/// Kind of artifact written during an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Script,
    Personas,
    Conversation,
    Evaluations,
    Summary,
    FailureAnalysis,
}

impl ArtifactKind {
    /// Get the kind name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Script => "script",
            ArtifactKind::Personas => "personas",
            ArtifactKind::Conversation => "conversation",
            ArtifactKind::Evaluations => "evaluations",
            ArtifactKind::Summary => "summary",
            ArtifactKind::FailureAnalysis => "failure-analysis",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "script" => Ok(ArtifactKind::Script),
            "personas" => Ok(ArtifactKind::Personas),
            "conversation" => Ok(ArtifactKind::Conversation),
            "evaluations" => Ok(ArtifactKind::Evaluations),
            "summary" => Ok(ArtifactKind::Summary),
            "failure-analysis" | "failures" => Ok(ArtifactKind::FailureAnalysis),
            _ => Err(format!("Unknown artifact kind: {}", s)),
        }
    }
}

/// Address of one stored artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub iteration: u32,
    pub kind: ArtifactKind,
    /// Set only for [`ArtifactKind::Conversation`].
    pub persona_id: Option<String>,
}

impl ArtifactKey {
    /// Key for an iteration-level artifact
    pub fn new(iteration: u32, kind: ArtifactKind) -> Self {
        Self {
            iteration,
            kind,
            persona_id: None,
        }
    }

    /// Key for one persona's conversation
    pub fn conversation(iteration: u32, persona_id: impl Into<String>) -> Self {
        Self {
            iteration,
            kind: ArtifactKind::Conversation,
            persona_id: Some(persona_id.into()),
        }
    }

    /// Reject persona ids that could escape the iteration namespace.
    pub fn validate(&self) -> StorageResult<()> {
        match (&self.kind, &self.persona_id) {
            (ArtifactKind::Conversation, Some(id)) => {
                let safe = !id.is_empty()
                    && id
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
                if safe {
                    Ok(())
                } else {
                    Err(StorageError::InvalidKey {
                        key: self.to_string(),
                    })
                }
            }
            (ArtifactKind::Conversation, None) | (_, Some(_)) => Err(StorageError::InvalidKey {
                key: self.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.persona_id {
            Some(id) => write!(f, "iteration-{}/{}/{}", self.iteration, self.kind, id),
            None => write!(f, "iteration-{}/{}", self.iteration, self.kind),
        }
    }
}

/// Keyed JSON blob store. Writes overwrite; there is no locking.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Write a value under `key`, replacing any previous value.
    async fn put(&self, key: &ArtifactKey, value: &serde_json::Value) -> StorageResult<()>;

    /// Read the value under `key`; `Ok(None)` when nothing was written.
    async fn get(&self, key: &ArtifactKey) -> StorageResult<Option<serde_json::Value>>;

    /// Iterations that have at least one artifact, ascending.
    async fn list_iterations(&self) -> StorageResult<Vec<u32>>;
}

/// Open the backend selected by configuration.
pub async fn open_store(config: &StoreConfig) -> StorageResult<Arc<dyn ArtifactStore>> {
    match config.backend {
        StoreBackend::File => Ok(Arc::new(FileStore::new(&config.output_dir))),
        StoreBackend::Sqlite => Ok(Arc::new(SqliteStore::new(&config.database).await?)),
    }
}

/// Typed access to iteration artifacts.
#[derive(Clone)]
pub struct Artifacts {
    store: Arc<dyn ArtifactStore>,
    seed_script_path: Option<PathBuf>,
}

impl Artifacts {
    /// Wrap a store; the seed script is the built-in one.
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            store,
            seed_script_path: None,
        }
    }

    /// Read the version 0 script from a JSON file instead of the built-in seed.
    pub fn with_seed_script_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.seed_script_path = Some(path.into());
        self
    }

    async fn save<T: Serialize + Sync>(&self, key: ArtifactKey, value: &T) -> StorageResult<()> {
        key.validate()?;
        let json = serde_json::to_value(value).map_err(|e| StorageError::Malformed {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        debug!(key = %key, "Saving artifact");
        self.store.put(&key, &json).await
    }

    async fn load<T: DeserializeOwned>(&self, key: ArtifactKey) -> StorageResult<Option<T>> {
        key.validate()?;
        match self.store.get(&key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StorageError::Malformed {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// The seed script (version 0).
    pub async fn seed_script(&self) -> AppResult<BotScript> {
        let Some(path) = &self.seed_script_path else {
            return Ok(BotScript::seed(SEED_SCRIPT));
        };

        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StorageError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        let script: BotScript =
            serde_json::from_str(&raw).map_err(|e| StorageError::Malformed {
                key: path.display().to_string(),
                message: e.to_string(),
            })?;
        if script.version != 0 {
            return Err(AppError::Config {
                message: format!(
                    "Seed script at {} must be version 0, found {}",
                    path.display(),
                    script.version
                ),
            });
        }
        Ok(script)
    }

    /// Active script for an iteration.
    ///
    /// Iteration 0 always uses the seed. Later iterations require the script
    /// written by the previous iteration's rewrite; its absence is fatal.
    pub async fn load_script(&self, iteration: u32) -> AppResult<BotScript> {
        if iteration == 0 {
            return self.seed_script().await;
        }

        self.load(ArtifactKey::new(iteration, ArtifactKind::Script))
            .await?
            .ok_or_else(|| AppError::Precondition {
                message: format!(
                    "No script found for iteration {}; run iteration {} first",
                    iteration,
                    iteration - 1
                ),
            })
    }

    /// Persist the script active for (or produced for) `iteration`.
    pub async fn save_script(&self, iteration: u32, script: &BotScript) -> StorageResult<()> {
        self.save(ArtifactKey::new(iteration, ArtifactKind::Script), script)
            .await
    }

    /// Persist the persona batch
    pub async fn save_personas(&self, iteration: u32, personas: &[Persona]) -> StorageResult<()> {
        self.save(ArtifactKey::new(iteration, ArtifactKind::Personas), &personas)
            .await
    }

    /// Persona batch, empty when none was written
    pub async fn load_personas(&self, iteration: u32) -> StorageResult<Vec<Persona>> {
        Ok(self
            .load(ArtifactKey::new(iteration, ArtifactKind::Personas))
            .await?
            .unwrap_or_default())
    }

    /// Persist one persona's conversation
    pub async fn save_conversation(
        &self,
        iteration: u32,
        conversation: &Conversation,
    ) -> StorageResult<()> {
        self.save(
            ArtifactKey::conversation(iteration, &conversation.persona_id),
            conversation,
        )
        .await
    }

    /// One persona's conversation, if written
    pub async fn load_conversation(
        &self,
        iteration: u32,
        persona_id: &str,
    ) -> StorageResult<Option<Conversation>> {
        self.load(ArtifactKey::conversation(iteration, persona_id))
            .await
    }

    /// Persist the evaluation batch
    pub async fn save_evaluations(
        &self,
        iteration: u32,
        evaluations: &[Evaluation],
    ) -> StorageResult<()> {
        self.save(
            ArtifactKey::new(iteration, ArtifactKind::Evaluations),
            &evaluations,
        )
        .await
    }

    /// Evaluation batch, empty when none was written
    pub async fn load_evaluations(&self, iteration: u32) -> StorageResult<Vec<Evaluation>> {
        Ok(self
            .load(ArtifactKey::new(iteration, ArtifactKind::Evaluations))
            .await?
            .unwrap_or_default())
    }

    /// Persist the iteration summary
    pub async fn save_summary(&self, summary: &IterationSummary) -> StorageResult<()> {
        self.save(
            ArtifactKey::new(summary.iteration, ArtifactKind::Summary),
            summary,
        )
        .await
    }

    /// Iteration summary, if the iteration completed
    pub async fn load_summary(&self, iteration: u32) -> StorageResult<Option<IterationSummary>> {
        self.load(ArtifactKey::new(iteration, ArtifactKind::Summary))
            .await
    }

    /// Summaries of every completed iteration, ascending by iteration.
    pub async fn load_all_summaries(&self) -> StorageResult<Vec<IterationSummary>> {
        let mut summaries = Vec::new();
        for iteration in self.store.list_iterations().await? {
            if let Some(summary) = self.load_summary(iteration).await? {
                summaries.push(summary);
            }
        }
        Ok(summaries)
    }

    /// Persist the failure analysis
    pub async fn save_failure_analysis(
        &self,
        iteration: u32,
        analysis: &FailureAnalysis,
    ) -> StorageResult<()> {
        self.save(
            ArtifactKey::new(iteration, ArtifactKind::FailureAnalysis),
            analysis,
        )
        .await
    }

    /// Failure analysis, if the iteration fell below threshold
    pub async fn load_failure_analysis(
        &self,
        iteration: u32,
    ) -> StorageResult<Option<FailureAnalysis>> {
        self.load(ArtifactKey::new(iteration, ArtifactKind::FailureAnalysis))
            .await
    }

    /// Raw JSON for any key, for inspection tools.
    pub async fn load_raw(&self, key: &ArtifactKey) -> StorageResult<Option<serde_json::Value>> {
        key.validate()?;
        self.store.get(key).await
    }
}
