use async_trait::async_trait;
use chrono::Utc;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

use super::{ArtifactKey, ArtifactStore};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed artifact store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let store = Self { pool };
        store.run_migrations().await?;

        info!(path = %config.path.display(), "SQLite artifact store ready");
        Ok(store)
    }

    /// In-memory store on a single connection (each connection would
    /// otherwise see its own empty database).
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR.run(&self.pool).await.map_err(|e| StorageError::Migration {
            message: format!("Failed to run migrations: {}", e),
        })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ArtifactStore for SqliteStore {
    async fn put(&self, key: &ArtifactKey, value: &serde_json::Value) -> StorageResult<()> {
        key.validate()?;
        let body = serde_json::to_string(value).map_err(|e| StorageError::Malformed {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        sqlx::query(
            r#"
            INSERT INTO artifacts (iteration, kind, persona_id, body, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (iteration, kind, persona_id)
            DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at
            "#,
        )
        .bind(key.iteration as i64)
        .bind(key.kind.as_str())
        .bind(key.persona_id.as_deref().unwrap_or(""))
        .bind(&body)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, key: &ArtifactKey) -> StorageResult<Option<serde_json::Value>> {
        key.validate()?;
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT body
            FROM artifacts
            WHERE iteration = ? AND kind = ? AND persona_id = ?
            "#,
        )
        .bind(key.iteration as i64)
        .bind(key.kind.as_str())
        .bind(key.persona_id.as_deref().unwrap_or(""))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((body,)) => serde_json::from_str(&body)
                .map(Some)
                .map_err(|e| StorageError::Malformed {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    async fn list_iterations(&self) -> StorageResult<Vec<u32>> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT DISTINCT iteration FROM artifacts ORDER BY iteration ASC")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(i,)| i as u32).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::ArtifactKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_overwrites_same_key() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let key = ArtifactKey::new(1, ArtifactKind::Script);

        store.put(&key, &json!({"version": 1})).await.unwrap();
        store.put(&key, &json!({"version": 1, "content": "v2"})).await.unwrap();

        assert_eq!(
            store.get(&key).await.unwrap(),
            Some(json!({"version": 1, "content": "v2"}))
        );
    }

    #[tokio::test]
    async fn test_conversation_keys_are_distinct_per_persona() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        store
            .put(&ArtifactKey::conversation(0, "persona-0"), &json!("a"))
            .await
            .unwrap();
        store
            .put(&ArtifactKey::conversation(0, "persona-1"), &json!("b"))
            .await
            .unwrap();

        assert_eq!(
            store
                .get(&ArtifactKey::conversation(0, "persona-1"))
                .await
                .unwrap(),
            Some(json!("b"))
        );
        assert_eq!(
            store
                .get(&ArtifactKey::conversation(0, "persona-2"))
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_error() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO artifacts (iteration, kind, persona_id, body, updated_at) VALUES (0, 'summary', '', 'not json', 'now')",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let err = store
            .get(&ArtifactKey::new(0, ArtifactKind::Summary))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Malformed { .. }));
    }

    #[tokio::test]
    async fn test_list_iterations() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        for i in [3, 1, 3] {
            store
                .put(&ArtifactKey::new(i, ArtifactKind::Summary), &json!({}))
                .await
                .unwrap();
        }
        assert_eq!(store.list_iterations().await.unwrap(), vec![1, 3]);
    }
}
