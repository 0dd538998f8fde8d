//! # Configuration Module
//!
//! This module handles configuration management and directory setup for wshuffle.
//! It splits storage into two places on purpose:
//!
//! - **Scores** live in the platform data directory and survive restarts:
//!   - Linux: `~/.local/share/wshuffle/scores.db`
//!   - macOS: `~/Library/Application Support/wshuffle/scores.db`
//! - **Session state** (the transition ledger, daemon socket and PID file) lives
//!   in the runtime directory, which is wiped on reboot:
//!   - `$XDG_RUNTIME_DIR/wshuffle/`, else `/dev/shm/wshuffle/`, else the temp dir
//!
//! ## Configuration File
//!
//! Optional JSON at `<config dir>/wshuffle/config.json`. Every key is optional:
//!
//! ```json
//! {
//!   "scheduler": { "max_score": 12, "disable_weighted_shuffle_threshold": 0.2 },
//!   "runtime": { "log_path": "/dev/shm/wshuffle.log" }
//! }
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "wshuffle";

/// Largest absolute score accepted. `2^score` must stay a finite, non-zero `f64`.
const SCORE_LIMIT: i32 = 1000;

/// Returns the platform-appropriate score database path.
///
/// Creates the `wshuffle` data directory if it doesn't exist.
///
/// # Errors
///
/// This function will return an error if:
/// - The system data directory cannot be determined
/// - The wshuffle subdirectory cannot be created due to permissions
pub fn get_scores_db_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("scores.db"))
}

/// Returns the wshuffle data directory, creating it when needed.
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| anyhow::anyhow!(
            "Could not determine system data directory. Please ensure your platform supports standard data directories."
        ))?;

    ensure_dir(data_dir.join(APP_DIR))
}

/// Returns the session-scoped directory for the ledger, socket and PID file.
///
/// Prefers `$XDG_RUNTIME_DIR`, then `/dev/shm`, then the system temp dir. All
/// three are cleared on reboot.
pub fn get_runtime_dir() -> Result<PathBuf> {
    let base = dirs::runtime_dir()
        .or_else(|| {
            let shm = PathBuf::from("/dev/shm");
            shm.is_dir().then_some(shm)
        })
        .unwrap_or_else(std::env::temp_dir);

    ensure_dir(base.join(APP_DIR))
}

/// Default location of the optional JSON configuration file.
pub fn get_config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.json"))
}

fn ensure_dir(dir: PathBuf) -> Result<PathBuf> {
    fs::create_dir_all(&dir)
        .with_context(|| format!(
            "Failed to create wshuffle directory at {}. Please check file permissions.",
            dir.display()
        ))?;
    Ok(dir)
}

/// Tunables for scoring, selection and queueing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Lowest score a track can be adjusted down to
    pub min_score: i32,
    /// Score given to a track the first time it is seen
    pub default_score: i32,
    /// Highest score a track can be adjusted up to
    pub max_score: i32,
    /// Fraction of transitions that pick uniformly from the whole library
    pub disable_weighted_shuffle_threshold: f64,
    /// The scheduler never enqueues into a queue this long or longer
    pub max_queue_size: usize,
    /// Weighted re-draws allowed when the chosen track is already queued
    pub max_enqueue_attempts: usize,
    /// Rows kept in each ledger log (snapshots, history)
    pub ledger_retention: usize,
    pub notifications: bool,
    pub notification_timeout_ms: i32,
    pub notification_icon: String,
    pub app_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_score: -1,
            default_score: 2,
            max_score: 15,
            disable_weighted_shuffle_threshold: 0.3,
            max_queue_size: 20,
            max_enqueue_attempts: 10,
            ledger_retention: 500,
            notifications: true,
            notification_timeout_ms: 5000,
            notification_icon: "audio-headphones".to_string(),
            app_name: "weighted_shuffle".to_string(),
        }
    }
}

impl SchedulerConfig {
    /// Checks that the bounds and fractions are coherent.
    pub fn validate(&self) -> Result<()> {
        if self.min_score > self.default_score || self.default_score > self.max_score {
            bail!(
                "Score bounds must satisfy min <= default <= max (got {} <= {} <= {})",
                self.min_score, self.default_score, self.max_score
            );
        }
        if self.min_score < -SCORE_LIMIT || self.max_score > SCORE_LIMIT {
            bail!("Scores must stay within +/-{SCORE_LIMIT} to keep 2^score finite");
        }
        if !(0.0..=1.0).contains(&self.disable_weighted_shuffle_threshold) {
            bail!(
                "disable_weighted_shuffle_threshold must be within [0, 1], got {}",
                self.disable_weighted_shuffle_threshold
            );
        }
        if self.max_queue_size == 0 {
            bail!("max_queue_size must be at least 1");
        }
        if self.max_enqueue_attempts == 0 {
            bail!("max_enqueue_attempts must be at least 1");
        }
        Ok(())
    }
}

/// File locations and external program names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Long-lived score database
    pub scores_db_path: PathBuf,
    /// Session-scoped ledger database
    pub ledger_db_path: PathBuf,
    /// Unix socket the daemon listens on
    pub socket_path: PathBuf,
    /// PID file for daemon management
    pub pid_file: PathBuf,
    /// Append log output here instead of stderr
    pub log_path: Option<PathBuf>,
    /// Player remote-control executable
    pub player_command: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let runtime_dir = get_runtime_dir().unwrap_or_else(|_| std::env::temp_dir());
        Self {
            scores_db_path: get_scores_db_path().unwrap_or_else(|_| PathBuf::from("scores.db")),
            ledger_db_path: runtime_dir.join("ledger.db"),
            socket_path: runtime_dir.join("wshuffle.sock"),
            pid_file: runtime_dir.join("wshuffle.pid"),
            log_path: None,
            player_command: "cmus-remote".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Keep every file under `dir`. Used by tests and throwaway sessions.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            scores_db_path: dir.join("scores.db"),
            ledger_db_path: dir.join("ledger.db"),
            socket_path: dir.join("wshuffle.sock"),
            pid_file: dir.join("wshuffle.pid"),
            log_path: None,
            player_command: "cmus-remote".to_string(),
        }
    }
}

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scheduler: SchedulerConfig,
    pub runtime: RuntimeConfig,
}

impl Config {
    /// Load configuration from `path`, or from the default location.
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails [`SchedulerConfig::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match get_config_file_path() {
                Some(default_path) if default_path.exists() => Self::from_file(&default_path)?,
                _ => Self::default(),
            },
        };

        config.scheduler.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }
}
