use anyhow::Result;
use chrono::{TimeZone, Utc};
use rusqlite::{params, Row};
use std::path::{Path, PathBuf};

use super::database::Database;
use super::entity::{LifecycleState, Worktree};
use crate::domains::lifecycle::{HookPhase, HookResult, HookStatus};
use crate::domains::session::SessionHandle;

pub trait WorktreeMethods {
    /// Write the full record in one statement so readers never observe
    /// a partially written row.
    fn upsert_worktree(&self, repo_path: &Path, worktree: &Worktree) -> Result<()>;
    fn try_get_worktree(&self, repo_path: &Path, branch: &str) -> Result<Option<Worktree>>;
    fn list_worktrees(&self, repo_path: &Path) -> Result<Vec<Worktree>>;
    fn update_worktree_state(&self, id: &str, state: LifecycleState) -> Result<()>;
    fn set_worktree_session(&self, id: &str, session_name: Option<&str>) -> Result<()>;
    fn set_worktree_issue(&self, id: &str, issue_reference: &str) -> Result<()>;
    fn set_worktree_error(&self, id: &str, last_error: Option<&str>) -> Result<()>;
    fn delete_worktree(&self, id: &str) -> Result<()>;
    fn save_hook_results(&self, worktree_id: &str, results: &[HookResult]) -> Result<()>;
    fn list_hook_results(&self, worktree_id: &str) -> Result<Vec<HookResult>>;
}

fn row_to_worktree(row: &Row) -> rusqlite::Result<Worktree> {
    Ok(Worktree {
        id: row.get(0)?,
        branch: row.get(1)?,
        path: PathBuf::from(row.get::<_, String>(2)?),
        state: row
            .get::<_, String>(3)?
            .parse()
            .unwrap_or(LifecycleState::Failed),
        created_at: Utc
            .timestamp_opt(row.get(4)?, 0)
            .single()
            .unwrap_or_else(Utc::now),
        updated_at: Utc
            .timestamp_opt(row.get(5)?, 0)
            .single()
            .unwrap_or_else(Utc::now),
        issue_reference: row.get(6)?,
        session: row
            .get::<_, Option<String>>(7)?
            .map(|name| SessionHandle { name }),
        last_error: row.get(8)?,
    })
}

const WORKTREE_COLUMNS: &str = "id, branch, path, state, created_at, updated_at, \
                                issue_reference, session_name, last_error";

impl WorktreeMethods for Database {
    fn upsert_worktree(&self, repo_path: &Path, worktree: &Worktree) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "INSERT OR REPLACE INTO worktrees (
                id, repository_path, branch, path, state,
                created_at, updated_at, issue_reference, session_name, last_error
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                worktree.id,
                repo_path.to_string_lossy(),
                worktree.branch,
                worktree.path.to_string_lossy(),
                worktree.state.as_str(),
                worktree.created_at.timestamp(),
                worktree.updated_at.timestamp(),
                worktree.issue_reference,
                worktree.session.as_ref().map(|s| s.name.clone()),
                worktree.last_error,
            ],
        )?;

        Ok(())
    }

    fn try_get_worktree(&self, repo_path: &Path, branch: &str) -> Result<Option<Worktree>> {
        let conn = self.get_conn()?;

        let sql = format!(
            "SELECT {WORKTREE_COLUMNS} FROM worktrees
             WHERE repository_path = ?1 AND branch = ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(
            params![repo_path.to_string_lossy(), branch],
            row_to_worktree,
        )?;

        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    fn list_worktrees(&self, repo_path: &Path) -> Result<Vec<Worktree>> {
        let conn = self.get_conn()?;

        let sql = format!(
            "SELECT {WORKTREE_COLUMNS} FROM worktrees
             WHERE repository_path = ?1
             ORDER BY created_at, branch"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![repo_path.to_string_lossy()], row_to_worktree)?;

        let mut worktrees = Vec::new();
        for row in rows {
            worktrees.push(row?);
        }
        Ok(worktrees)
    }

    fn update_worktree_state(&self, id: &str, state: LifecycleState) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE worktrees SET state = ?1, updated_at = ?2 WHERE id = ?3",
            params![state.as_str(), Utc::now().timestamp(), id],
        )?;
        Ok(())
    }

    fn set_worktree_session(&self, id: &str, session_name: Option<&str>) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE worktrees SET session_name = ?1, updated_at = ?2 WHERE id = ?3",
            params![session_name, Utc::now().timestamp(), id],
        )?;
        Ok(())
    }

    fn set_worktree_issue(&self, id: &str, issue_reference: &str) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE worktrees SET issue_reference = ?1, updated_at = ?2 WHERE id = ?3",
            params![issue_reference, Utc::now().timestamp(), id],
        )?;
        Ok(())
    }

    fn set_worktree_error(&self, id: &str, last_error: Option<&str>) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE worktrees SET last_error = ?1, updated_at = ?2 WHERE id = ?3",
            params![last_error, Utc::now().timestamp(), id],
        )?;
        Ok(())
    }

    fn delete_worktree(&self, id: &str) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute("DELETE FROM worktrees WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn save_hook_results(&self, worktree_id: &str, results: &[HookResult]) -> Result<()> {
        let mut conn = self.get_conn()?;

        let tx = conn.transaction()?;
        let now = Utc::now().timestamp();
        for result in results {
            tx.execute(
                "INSERT INTO hook_results (
                    worktree_id, phase, command, status, exit_code,
                    stdout, stderr, duration_ms, recorded_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    worktree_id,
                    result.phase.as_str(),
                    result.command,
                    result.status.as_str(),
                    result.exit_code,
                    result.stdout,
                    result.stderr,
                    result.duration_ms as i64,
                    now,
                ],
            )?;
        }
        tx.commit()?;

        Ok(())
    }

    fn list_hook_results(&self, worktree_id: &str) -> Result<Vec<HookResult>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            "SELECT phase, command, status, exit_code, stdout, stderr, duration_ms
             FROM hook_results
             WHERE worktree_id = ?1
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![worktree_id], |row| {
            Ok(HookResult {
                phase: row
                    .get::<_, String>(0)?
                    .parse()
                    .unwrap_or(HookPhase::OnCreate),
                command: row.get(1)?,
                status: row
                    .get::<_, String>(2)?
                    .parse()
                    .unwrap_or(HookStatus::Failed),
                exit_code: row.get(3)?,
                stdout: row.get(4)?,
                stderr: row.get(5)?,
                duration_ms: row.get::<_, i64>(6)? as u64,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}
