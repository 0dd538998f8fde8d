//! Reinforcement-weighted song scheduler for cmus.
//!
//! wshuffle sits beside a running player, watches track changes and queues the
//! next track according to a per-track preference score instead of pure
//! randomness.
//!
//! Core modules:
//! - [`db`] - Score store (long-lived preferences)
//! - [`ledger`] - Session state: snapshots, history, suppression flags
//! - [`selector`] - Exponentially weighted selection
//! - [`scheduler`] - Transition handling and the react/previous/score commands
//! - [`daemon`] - Long-lived single-writer service
//!
//! ### Supporting Modules
//!
//! - [`config`] - Configuration and data directory management
//! - [`player`] - cmus control through `cmus-remote`
//! - [`notify`] - Desktop notifications
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use wshuffle::config::Config;
//! use wshuffle::notify::DesktopNotifier;
//! use wshuffle::player::CmusRemote;
//! use wshuffle::scheduler::{Request, Scheduler};
//!
//! let config = Config::load(None)?;
//! let mut scheduler = Scheduler::open(&config, CmusRemote::default(), DesktopNotifier)?;
//!
//! // React to whatever cmus is playing now
//! println!("{}", scheduler.dispatch(Request::React)?);
//!
//! // Like the current track a bit more
//! println!("{}", scheduler.dispatch(Request::Score(1))?);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Scoring
//!
//! Every track has an integer score, 2 when first seen, bounded to
//! `[-1, 15]` by default. A track is drawn with weight `2^score`, so one point
//! up doubles its odds against everything else. Changes that would leave the
//! bounds are dropped, not clamped.
//!
//! ## Error Handling
//!
//! All public functions return `Result<T, anyhow::Error>`. Player and
//! notification failures abort the current operation; the only failures
//! handled in place are an exhausted weighted draw (uniform fallback) and an
//! empty history on `previous` (the player's own previous command).

pub mod cli;
pub mod completion;
pub mod config;
pub mod daemon;
pub mod db;
pub mod ledger;
pub mod notify;
pub mod player;
pub mod scheduler;
pub mod selector;
