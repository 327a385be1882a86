use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;

use super::{Checkpoint, Checkpointer};
use crate::agent::AgentError;

impl From<sqlx::Error> for AgentError {
    fn from(err: sqlx::Error) -> Self {
        AgentError::CheckpointError(format!("SQLite error: {}", err))
    }
}

/// Checkpointer backed by a single SQLite table
///
/// Each row holds one checkpoint serialized as JSON; `seq` orders a thread's history.
#[derive(Clone)]
pub struct SqliteSaver {
    pool: SqlitePool,
}

impl SqliteSaver {
    /// Open (creating if missing) the database at `url`, e.g. `sqlite://checkpoints.db`
    pub async fn connect(url: &str) -> Result<Self, AgentError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// A private in-memory database that lives as long as this saver
    pub async fn in_memory() -> Result<Self, AgentError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // A second connection would open a different, empty database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, AgentError> {
        let saver = Self { pool };
        saver.migrate().await?;
        Ok(saver)
    }

    async fn migrate(&self) -> Result<(), AgentError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                thread_id TEXT NOT NULL,
                parent_id TEXT,
                step INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                payload TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_checkpoints_thread ON checkpoints (thread_id, seq)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn decode(payload: &str) -> Result<Checkpoint, AgentError> {
        serde_json::from_str(payload)
            .map_err(|e| AgentError::CheckpointError(format!("Corrupt checkpoint payload: {}", e)))
    }
}

#[async_trait]
impl Checkpointer for SqliteSaver {
    async fn get(&self, thread_id: &str) -> Result<Option<Checkpoint>, AgentError> {
        let row = sqlx::query(
            "SELECT payload FROM checkpoints WHERE thread_id = ? ORDER BY seq DESC LIMIT 1",
        )
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let payload: String = row.try_get("payload")?;
                Ok(Some(Self::decode(&payload)?))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, checkpoint: Checkpoint) -> Result<(), AgentError> {
        let payload = serde_json::to_string(&checkpoint)
            .map_err(|e| AgentError::CheckpointError(format!("Failed to encode checkpoint: {}", e)))?;

        sqlx::query(
            "INSERT INTO checkpoints (id, thread_id, parent_id, step, created_at, payload) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&checkpoint.id)
        .bind(&checkpoint.thread_id)
        .bind(&checkpoint.parent_id)
        .bind(checkpoint.step as i64)
        .bind(checkpoint.created_at.to_rfc3339())
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self, thread_id: &str, limit: Option<usize>) -> Result<Vec<Checkpoint>, AgentError> {
        // SQLite treats a negative LIMIT as no limit
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = sqlx::query(
            "SELECT payload FROM checkpoints WHERE thread_id = ? ORDER BY seq DESC LIMIT ?",
        )
        .bind(thread_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let payload: String = row.try_get("payload")?;
                Self::decode(&payload)
            })
            .collect()
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<(), AgentError> {
        sqlx::query("DELETE FROM checkpoints WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
