use anyhow::{anyhow, Result};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domains::config::paths::registry_db_path;

/// Handle to the registry's on-disk metadata store. Cheap to clone;
/// all access goes through the worktree method traits.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    #[allow(dead_code)]
    pub(crate) db_path: PathBuf,
}

impl Database {
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = db_path.unwrap_or_else(registry_db_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path,
        };

        db.initialize_schema()?;

        Ok(db)
    }

    pub(crate) fn get_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("registry database lock poisoned"))
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS worktrees (
                id TEXT PRIMARY KEY,
                repository_path TEXT NOT NULL,
                branch TEXT NOT NULL,
                path TEXT NOT NULL,
                state TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                issue_reference TEXT,
                session_name TEXT,
                last_error TEXT,
                UNIQUE(repository_path, branch)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_worktrees_repo ON worktrees(repository_path)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_worktrees_state ON worktrees(state)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS hook_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                worktree_id TEXT NOT NULL,
                phase TEXT NOT NULL,
                command TEXT NOT NULL,
                status TEXT NOT NULL,
                exit_code INTEGER,
                stdout TEXT NOT NULL,
                stderr TEXT NOT NULL,
                duration_ms INTEGER NOT NULL,
                recorded_at INTEGER NOT NULL,
                FOREIGN KEY(worktree_id) REFERENCES worktrees(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_hook_results_worktree ON hook_results(worktree_id)",
            [],
        )?;

        Ok(())
    }
}
