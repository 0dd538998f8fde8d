//! # Transition Ledger
//!
//! Session-scoped coordination state, stored apart from the scores so it can be
//! wiped without losing anything learned:
//!
//! - **Snapshot log**: every observed track change, newest last.
//! - **History stack**: tracks that were current right before a transition,
//!   popped by "previous".
//! - **Ignore slot**: when present, the next detected transition was caused by
//!   us and must not trigger a reaction. Consumed at most once.
//! - **Notification slot**: handle of the desktop notification we last showed,
//!   so score updates replace it instead of stacking new ones.
//!
//! Rows are ordered by their autoincrement id, so "most recent" never depends on
//! clock resolution.

use crate::player::PlaybackStatus;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// A timestamped observation of the player.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    pub path: String,
    pub status: PlaybackStatus,
    pub position: i64,
    pub duration: i64,
    pub timestamp: DateTime<Utc>,
}

impl StateSnapshot {
    pub fn new(path: impl Into<String>, status: PlaybackStatus, position: i64, duration: i64) -> Self {
        Self {
            path: path.into(),
            status,
            position,
            duration,
            timestamp: Utc::now(),
        }
    }
}

/// A track that was current just before a transition.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub path: String,
    pub timestamp: DateTime<Utc>,
}

pub struct Ledger {
    conn: Connection,
    retention: usize,
}

impl Ledger {
    /// Open (creating if needed) the ledger at `path`. Each log keeps at most
    /// `retention` rows.
    pub fn open(path: &Path, retention: usize) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open ledger at {}", path.display()))?;
        Self::with_connection(conn, retention)
    }

    pub fn open_in_memory(retention: usize) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, retention)
    }

    fn with_connection(conn: Connection, retention: usize) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS state_changes (
                state_id  INTEGER PRIMARY KEY AUTOINCREMENT,
                path      TEXT    NOT NULL,
                status    TEXT    NOT NULL,
                position  INTEGER NOT NULL,
                duration  INTEGER NOT NULL,
                timestamp TEXT    NOT NULL
            );
            CREATE TABLE IF NOT EXISTS queue_history (
                entry_id  INTEGER PRIMARY KEY AUTOINCREMENT,
                path      TEXT    NOT NULL,
                timestamp TEXT    NOT NULL
            );
            CREATE TABLE IF NOT EXISTS ignore_flag (
                slot      INTEGER PRIMARY KEY CHECK (slot = 1),
                timestamp TEXT    NOT NULL
            );
            CREATE TABLE IF NOT EXISTS notification (
                slot      INTEGER PRIMARY KEY CHECK (slot = 1),
                handle    INTEGER NOT NULL,
                timestamp TEXT    NOT NULL
            );",
        )
        .context("Failed to create ledger tables")?;

        Ok(Self { conn, retention: retention.max(1) })
    }

    /// Most recent snapshot, if any.
    pub fn last_snapshot(&self) -> Result<Option<StateSnapshot>> {
        self.conn
            .query_row(
                "SELECT path, status, position, duration, timestamp
                 FROM state_changes ORDER BY state_id DESC LIMIT 1",
                [],
                |row| {
                    let status: String = row.get(1)?;
                    Ok(StateSnapshot {
                        path: row.get(0)?,
                        status: status.parse().unwrap_or(PlaybackStatus::Stopped),
                        position: row.get(2)?,
                        duration: row.get(3)?,
                        timestamp: row.get(4)?,
                    })
                },
            )
            .optional()
            .context("Failed to read last state snapshot")
    }

    pub fn record_snapshot(&mut self, snapshot: &StateSnapshot) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO state_changes (path, status, position, duration, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                snapshot.path,
                snapshot.status.as_str(),
                snapshot.position,
                snapshot.duration,
                snapshot.timestamp
            ],
        )
        .context("Failed to record state snapshot")?;
        trim(&tx, "state_changes", "state_id", self.retention)?;
        tx.commit().context("Committing state snapshot failed")?;
        Ok(())
    }

    pub fn snapshot_count(&self) -> Result<usize> {
        count(&self.conn, "state_changes")
    }

    pub fn push_history(&mut self, path: &str) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO queue_history (path, timestamp) VALUES (?1, ?2)",
            params![path, Utc::now()],
        )
        .with_context(|| format!("Failed to push {path} onto queue history"))?;
        trim(&tx, "queue_history", "entry_id", self.retention)?;
        tx.commit().context("Committing queue history failed")?;
        debug!("Pushed onto queue history: {path}");
        Ok(())
    }

    /// Top of the history stack, left in place.
    pub fn peek_history(&self) -> Result<Option<HistoryEntry>> {
        self.conn
            .query_row(
                "SELECT path, timestamp FROM queue_history ORDER BY entry_id DESC LIMIT 1",
                [],
                |row| Ok(HistoryEntry { path: row.get(0)?, timestamp: row.get(1)? }),
            )
            .optional()
            .context("Failed to read queue history")
    }

    /// Remove and return the top of the history stack.
    pub fn pop_history(&mut self) -> Result<Option<HistoryEntry>> {
        let tx = self.conn.transaction()?;
        let top = tx
            .query_row(
                "SELECT entry_id, path, timestamp FROM queue_history ORDER BY entry_id DESC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        HistoryEntry { path: row.get(1)?, timestamp: row.get(2)? },
                    ))
                },
            )
            .optional()
            .context("Failed to read queue history")?;

        let Some((entry_id, entry)) = top else {
            return Ok(None);
        };

        tx.execute("DELETE FROM queue_history WHERE entry_id = ?1", [entry_id])
            .context("Failed to pop queue history")?;
        tx.commit().context("Committing queue history pop failed")?;
        Ok(Some(entry))
    }

    /// History paths, newest first.
    pub fn history(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT path FROM queue_history ORDER BY entry_id DESC")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<String>>>()
            .context("Failed to read queue history")
    }

    pub fn history_len(&self) -> Result<usize> {
        count(&self.conn, "queue_history")
    }

    /// Mark the next detected transition as self-inflicted.
    pub fn set_ignore(&self) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO ignore_flag (slot, timestamp) VALUES (1, ?1)",
                [Utc::now()],
            )
            .context("Failed to set ignore flag")?;
        Ok(())
    }

    /// Consume the ignore flag. Returns whether one was pending.
    pub fn take_ignore(&self) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM ignore_flag", [])
            .context("Failed to consume ignore flag")?;
        Ok(removed > 0)
    }

    pub fn ignore_pending(&self) -> Result<bool> {
        Ok(count(&self.conn, "ignore_flag")? > 0)
    }

    /// Handle of the notification currently on screen, 0 if none.
    pub fn notification_id(&self) -> Result<u32> {
        let handle: Option<u32> = self
            .conn
            .query_row("SELECT handle FROM notification WHERE slot = 1", [], |row| row.get(0))
            .optional()
            .context("Failed to read notification handle")?;
        Ok(handle.unwrap_or(0))
    }

    pub fn replace_notification_id(&self, handle: u32) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO notification (slot, handle, timestamp) VALUES (1, ?1, ?2)",
                params![handle, Utc::now()],
            )
            .context("Failed to store notification handle")?;
        Ok(())
    }

    /// Wipe every table.
    pub fn reset(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(
            "DELETE FROM state_changes;
             DELETE FROM queue_history;
             DELETE FROM ignore_flag;
             DELETE FROM notification;",
        )
        .context("Failed to reset ledger")?;
        tx.commit().context("Committing ledger reset failed")?;
        Ok(())
    }
}

fn count(conn: &Connection, table: &str) -> Result<usize> {
    let rows: i64 = conn
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .with_context(|| format!("Failed to count rows in {table}"))?;
    Ok(usize::try_from(rows).unwrap_or(0))
}

/// Keep the newest `keep` rows of `table`.
fn trim(conn: &Connection, table: &str, id_column: &str, keep: usize) -> Result<()> {
    let keep = i64::try_from(keep).unwrap_or(i64::MAX);
    conn.execute(
        &format!(
            "DELETE FROM {table} WHERE {id_column} NOT IN
             (SELECT {id_column} FROM {table} ORDER BY {id_column} DESC LIMIT ?1)"
        ),
        [keep],
    )
    .with_context(|| format!("Failed to trim {table}"))?;
    Ok(())
}
