//! # Score Store
//!
//! Durable mapping from track path to an integer preference score and the time
//! the score was last touched. This is the long-term learned preference and is
//! kept in its own database, separate from the session ledger.
//!
//! Every operation is its own transaction; a record is created lazily the first
//! time a track is looked up and is never deleted.

use crate::config::SchedulerConfig;
use crate::selector::{self, Candidate};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;

/// One scored track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRecord {
    pub path: String,
    pub score: i32,
    pub last_played: DateTime<Utc>,
}

/// Result of a score adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adjustment {
    pub previous: i32,
    pub score: i32,
}

impl Adjustment {
    /// Whether the delta was applied (it is dropped when it would leave the bounds).
    pub fn applied(&self) -> bool {
        self.previous != self.score
    }
}

pub struct ScoreStore {
    conn: Connection,
    min_score: i32,
    default_score: i32,
    max_score: i32,
}

impl ScoreStore {
    /// Open (creating if needed) the score database at `path`.
    pub fn open(path: &Path, config: &SchedulerConfig) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open score database at {}", path.display()))?;
        Self::with_connection(conn, config)
    }

    /// In-memory store, for tests and benchmarks.
    pub fn open_in_memory(config: &SchedulerConfig) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, config)
    }

    fn with_connection(conn: Connection, config: &SchedulerConfig) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS song_scores (
                path        TEXT    PRIMARY KEY,
                score       INTEGER NOT NULL,
                last_played TEXT    NOT NULL
            )",
            [],
        )
        .context("Failed to create song_scores table")?;

        Ok(Self {
            conn,
            min_score: config.min_score,
            default_score: config.default_score,
            max_score: config.max_score,
        })
    }

    /// Score of `path`, creating a record with the default score if the track
    /// has never been seen.
    pub fn get_or_init(&mut self, path: &str) -> Result<i32> {
        let tx = self.conn.transaction()?;
        let score = get_or_init_in(&tx, path, self.default_score)?;
        tx.commit().context("Committing score lookup failed")?;
        Ok(score)
    }

    /// Score of `path` without creating a record.
    pub fn score_of(&self, path: &str) -> Result<Option<i32>> {
        self.conn
            .query_row("SELECT score FROM song_scores WHERE path = ?1", [path], |row| row.get(0))
            .optional()
            .with_context(|| format!("Failed to look up score for {path}"))
    }

    /// Add `delta` to the score of `path`.
    ///
    /// A delta that would leave `[min_score, max_score]` is ignored rather than
    /// clamped. `last_played` is refreshed either way.
    pub fn adjust(&mut self, path: &str, delta: i32) -> Result<Adjustment> {
        let tx = self.conn.transaction()?;
        let previous = get_or_init_in(&tx, path, self.default_score)?;

        let score = match previous.checked_add(delta) {
            Some(candidate) if (self.min_score..=self.max_score).contains(&candidate) => candidate,
            _ => previous,
        };

        tx.execute(
            "UPDATE song_scores SET score = ?1, last_played = ?2 WHERE path = ?3",
            params![score, Utc::now(), path],
        )
        .with_context(|| format!("Failed to update score for {path}"))?;
        tx.commit().context("Committing score update failed")?;

        info!("Updated score for {path}: {previous} -> {score}");
        Ok(Adjustment { previous, score })
    }

    /// Every (path, score) pair, highest score first, ties by path.
    pub fn all_scores(&self) -> Result<Vec<Candidate>> {
        let mut stmt = self
            .conn
            .prepare("SELECT path, score FROM song_scores ORDER BY score DESC, path ASC")?;
        let rows = stmt
            .query_map([], |row| Ok(Candidate { path: row.get(0)?, score: row.get(1)? }))
            .context("Cannot query scores.")?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read score rows")
    }

    /// Full records, highest score first. `limit` of `None` returns all of them.
    pub fn records(&self, limit: Option<usize>) -> Result<Vec<ScoreRecord>> {
        let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
        let mut stmt = self.conn.prepare(
            "SELECT path, score, last_played FROM song_scores
             ORDER BY score DESC, path ASC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit], |row| {
                Ok(ScoreRecord {
                    path: row.get(0)?,
                    score: row.get(1)?,
                    last_played: row.get(2)?,
                })
            })
            .context("Cannot query score records.")?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read score records")
    }

    pub fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM song_scores", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Chance that a track holding `score` is picked by the weighted selector,
    /// given every score currently stored.
    pub fn play_probability(&self, score: i32) -> Result<f64> {
        let scores = self.all_scores()?;
        Ok(selector::probability(score, &scores))
    }
}

fn get_or_init_in(conn: &Connection, path: &str, default_score: i32) -> Result<i32> {
    let existing: Option<i32> = conn
        .query_row("SELECT score FROM song_scores WHERE path = ?1", [path], |row| row.get(0))
        .optional()
        .with_context(|| format!("Failed to look up score for {path}"))?;

    if let Some(score) = existing {
        return Ok(score);
    }

    debug!("New song: {path}");
    conn.execute(
        "INSERT INTO song_scores (path, score, last_played) VALUES (?1, ?2, ?3)",
        params![path, default_score, Utc::now()],
    )
    .with_context(|| format!("Failed to insert score record for {path}"))?;
    Ok(default_score)
}
