//! # Checkpoints
//!
//! Per-run snapshots of the [`RunState`] and the step the workflow will run
//! next. A checkpoint is written after every applied step, so a failed run
//! can be resumed from the failing step with all earlier fields intact.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::run::RunState;
use crate::workflow::pipeline::WorkflowStep;

/// Schema version for migrations
const SCHEMA_VERSION: i32 = 1;

/// Saved progress of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub run_id: String,
    /// The step to execute on resume
    pub step: WorkflowStep,
    pub state: RunState,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(step: WorkflowStep, state: RunState) -> Self {
        Self {
            run_id: state.run_id.clone(),
            step,
            state,
            saved_at: Utc::now(),
        }
    }
}

/// Storage for checkpoints, one (the latest) per run id
pub trait Checkpointer: Send + Sync {
    fn save(&self, checkpoint: &Checkpoint) -> Result<()>;

    fn load(&self, run_id: &str) -> Result<Option<Checkpoint>>;

    /// Known run ids, most recently saved first
    fn list(&self) -> Result<Vec<String>>;
}

/// Process-local checkpoints
#[derive(Debug, Default)]
pub struct InMemoryCheckpointer {
    checkpoints: Mutex<HashMap<String, Checkpoint>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Checkpointer for InMemoryCheckpointer {
    fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let mut checkpoints = self
            .checkpoints
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        checkpoints.insert(checkpoint.run_id.clone(), checkpoint.clone());
        Ok(())
    }

    fn load(&self, run_id: &str) -> Result<Option<Checkpoint>> {
        let checkpoints = self
            .checkpoints
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        Ok(checkpoints.get(run_id).cloned())
    }

    fn list(&self) -> Result<Vec<String>> {
        let checkpoints = self
            .checkpoints
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let mut entries: Vec<_> = checkpoints.values().collect();
        entries.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(entries.into_iter().map(|c| c.run_id.clone()).collect())
    }
}

/// SQLite-backed checkpoints, one row per run id
pub struct SqliteCheckpointer {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCheckpointer {
    /// Open or create the checkpoint database at `path`
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(path.as_ref()).context("Failed to open checkpoint database")?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open checkpoint database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let checkpointer = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        checkpointer.run_migrations()?;
        Ok(checkpointer)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current_version < 1 {
            conn.execute(
                r#"
                CREATE TABLE IF NOT EXISTS checkpoints (
                    run_id TEXT PRIMARY KEY,
                    step TEXT NOT NULL,
                    state TEXT NOT NULL,
                    saved_at TEXT NOT NULL
                )
                "#,
                [],
            )?;
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                [SCHEMA_VERSION],
            )?;
        }

        Ok(())
    }

    fn row_to_checkpoint(row: &rusqlite::Row) -> rusqlite::Result<(String, String, String, String)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    }
}

impl Checkpointer for SqliteCheckpointer {
    fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let step = serde_json::to_string(&checkpoint.step)?;
        let state = serde_json::to_string(&checkpoint.state)?;

        conn.execute(
            r#"
            INSERT INTO checkpoints (run_id, step, state, saved_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(run_id) DO UPDATE SET
                step = excluded.step,
                state = excluded.state,
                saved_at = excluded.saved_at
            "#,
            params![
                checkpoint.run_id,
                step,
                state,
                checkpoint.saved_at.to_rfc3339()
            ],
        )
        .context("Failed to save checkpoint")?;

        tracing::debug!(run_id = %checkpoint.run_id, step = ?checkpoint.step, "Checkpoint saved");
        Ok(())
    }

    fn load(&self, run_id: &str) -> Result<Option<Checkpoint>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let row = conn
            .query_row(
                "SELECT run_id, step, state, saved_at FROM checkpoints WHERE run_id = ?1",
                params![run_id],
                |row| Self::row_to_checkpoint(row),
            )
            .optional()
            .context("Failed to load checkpoint")?;

        let Some((run_id, step, state, saved_at)) = row else {
            return Ok(None);
        };

        Ok(Some(Checkpoint {
            run_id,
            step: serde_json::from_str(&step).context("Corrupt checkpoint step")?,
            state: serde_json::from_str(&state).context("Corrupt checkpoint state")?,
            saved_at: DateTime::parse_from_rfc3339(&saved_at)
                .context("Corrupt checkpoint timestamp")?
                .with_timezone(&Utc),
        }))
    }

    fn list(&self) -> Result<Vec<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare("SELECT run_id FROM checkpoints ORDER BY saved_at DESC")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }
}
