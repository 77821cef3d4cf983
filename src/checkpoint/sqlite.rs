//! SQLite-backed checkpoint store.
//!
//! Keeps one row per conversation in the `checkpoints` table, replaced
//! transactionally on save after the revision check. Pure serialization
//! lives in the persistence module; this module is database I/O only.
//!
//! When the `sqlite-migrations` feature is enabled (default), embedded
//! migrations (`sqlx::migrate!("./migrations")`) run on connect; disabling
//! the feature assumes external migration orchestration.

use std::sync::Arc;

use sqlx::{Row, SqlitePool};
use tracing::instrument;

use crate::checkpoint::persistence::PersistedCheckpoint;
use crate::checkpoint::{Checkpoint, CheckpointError, CheckpointStore};

/// Resolves the database URL from the environment.
///
/// Checks `THREADLOOM_SQLITE_URL` first (a full sqlx URL), then
/// `SQLITE_DB_NAME` (a bare file name), then falls back to
/// `sqlite://threadloom.db`. Loads `.env` if present.
#[must_use]
pub fn resolve_database_url() -> String {
    let _ = dotenvy::dotenv();
    if let Ok(url) = std::env::var("THREADLOOM_SQLITE_URL") {
        return url;
    }
    let name =
        std::env::var("SQLITE_DB_NAME").unwrap_or_else(|_| "threadloom.db".to_string());
    format!("sqlite://{name}")
}

pub struct SqliteCheckpointStore {
    pool: Arc<SqlitePool>,
}

impl std::fmt::Debug for SqliteCheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCheckpointStore").finish()
    }
}

impl SqliteCheckpointStore {
    /// Connect (or create) a SQLite database at `database_url`.
    /// Example URL: "sqlite://threadloom.db"
    #[must_use = "store must be used to persist checkpoints"]
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self, CheckpointError> {
        // SQLite won't create the file itself without the ?mode=rwc knob.
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            if !path.is_empty() && !path.starts_with(':') && !std::path::Path::new(path).exists()
            {
                std::fs::File::create(path).map_err(|e| CheckpointError::Backend {
                    message: format!("create database file {path}: {e}"),
                })?;
            }
        }
        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| CheckpointError::Backend {
                message: format!("connect error: {e}"),
            })?;
        #[cfg(feature = "sqlite-migrations")]
        {
            if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
                return Err(CheckpointError::Backend {
                    message: format!("migration failure: {e}"),
                });
            }
        }
        #[cfg(not(feature = "sqlite-migrations"))]
        {
            // Feature disabled: schema is expected to exist already.
        }
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait::async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    #[instrument(skip(self), err)]
    async fn load(&self, conversation_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let row = sqlx::query(
            r#"
            SELECT snapshot_json
            FROM checkpoints
            WHERE conversation_id = ?1
        "#,
        )
        .bind(conversation_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| CheckpointError::Backend {
            message: format!("load checkpoint: {e}"),
        })?;

        let Some(row) = row else {
            return Ok(None);
        };
        let snapshot: String =
            row.try_get("snapshot_json")
                .map_err(|e| CheckpointError::Backend {
                    message: format!("read snapshot_json: {e}"),
                })?;
        let persisted =
            PersistedCheckpoint::from_json(&snapshot).map_err(|e| CheckpointError::Backend {
                message: format!("decode checkpoint: {e}"),
            })?;
        let checkpoint = Checkpoint::try_from(persisted).map_err(|e| CheckpointError::Backend {
            message: format!("decode checkpoint: {e}"),
        })?;
        Ok(Some(checkpoint))
    }

    #[instrument(skip(self, checkpoint), fields(conversation_id = %checkpoint.conversation_id, revision = checkpoint.revision), err)]
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        let persisted = PersistedCheckpoint::from(&checkpoint);
        let snapshot_json = persisted.to_json().map_err(|e| CheckpointError::Backend {
            message: format!("encode checkpoint: {e}"),
        })?;

        let mut tx = self.pool.begin().await.map_err(|e| CheckpointError::Backend {
            message: format!("tx begin: {e}"),
        })?;

        // Revision check and replace inside one transaction.
        let stored: u64 = sqlx::query(
            r#"
            SELECT revision FROM checkpoints WHERE conversation_id = ?1
        "#,
        )
        .bind(&checkpoint.conversation_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| CheckpointError::Backend {
            message: format!("read revision: {e}"),
        })?
        .map(|row| row.try_get::<i64, _>("revision"))
        .transpose()
        .map_err(|e| CheckpointError::Backend {
            message: format!("decode revision: {e}"),
        })?
        .map(|r| r as u64)
        .unwrap_or(0);

        if checkpoint.revision != stored + 1 {
            return Err(CheckpointError::Conflict {
                conversation_id: checkpoint.conversation_id,
                attempted: checkpoint.revision,
                stored,
            });
        }

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO checkpoints (
                conversation_id,
                revision,
                snapshot_json,
                created_at
            ) VALUES (?1, ?2, ?3, ?4)
        "#,
        )
        .bind(&checkpoint.conversation_id)
        .bind(checkpoint.revision as i64)
        .bind(&snapshot_json)
        .bind(checkpoint.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| CheckpointError::Backend {
            message: format!("write checkpoint: {e}"),
        })?;

        tx.commit().await.map_err(|e| CheckpointError::Backend {
            message: format!("tx commit: {e}"),
        })?;
        Ok(())
    }
}
