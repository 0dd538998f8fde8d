//! # Command-Line Interface Module
//!
//! Clap derive definitions for wshuffle.
//!
//! ## Commands
//!
//! - `react`: observe the player and react to a track change (default, and
//!   what cmus' `status ...` hook invocation means)
//! - `previous`: go back to the previously current track
//! - `score <delta>`: change the current track's score
//! - `info`, `list`: inspect scores
//! - `reset`: forget session state
//! - `daemon`: run the scheduler as a long-lived service
//!
//! ## Examples
//!
//! ```bash
//! # cmus: set status_display_program=wshuffle
//! wshuffle react
//! wshuffle score 1
//! wshuffle score -1
//! wshuffle previous
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

/// Main application arguments structure.
///
/// Running without a subcommand is the same as `react`, so the binary can be
/// registered directly as a player event hook.
#[derive(Parser, Debug)]
#[command(name = "wshuffle")]
#[command(about = "wshuffle: reinforcement-weighted song scheduling for cmus")]
#[command(version)]
pub struct Args {
    /// Configuration file (JSON). Defaults to <config dir>/wshuffle/config.json
    #[arg(long, global = true, env = "WSHUFFLE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Append log output to this file instead of stderr
    #[arg(long, global = true, env = "WSHUFFLE_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// React to the player's current state
    ///
    /// Meant to be run on every player event. Does nothing if the current
    /// track hasn't changed; otherwise records the change and queues the next
    /// track.
    React,

    /// Go back to the previous track
    ///
    /// Puts the current track back at the front of the queue and plays the
    /// track that was current before it. With no history, falls back to the
    /// player's own previous command.
    Previous,

    /// Change the current track's score
    ///
    /// Each point doubles (or halves) the chance of the track being picked.
    /// Changes that would leave the configured score range are ignored.
    Score {
        /// Amount to add, e.g. 1 or -1
        #[arg(allow_hyphen_values = true)]
        delta: i32,
    },

    /// Show the current track's score and chance of being picked
    Info,

    /// List scored tracks, highest score first
    List {
        /// Only show this many tracks
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print full records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Forget session state (history, pending flags). Scores are kept.
    Reset,

    /// Manage the scheduler daemon
    ///
    /// While the daemon runs, `react`, `previous` and `score` are forwarded to
    /// it and handled one at a time.
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },

    /// Player hook arguments, e.g. cmus' `status playing file ...`.
    /// Handled exactly like `react`; see [`is_player_hook`].
    #[command(external_subcommand)]
    PlayerEvent(Vec<String>),

    /// Generate shell completions
    ///
    /// Usage: wshuffle completion bash > ~/.local/share/bash-completion/completions/wshuffle
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Daemon management actions
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum DaemonAction {
    /// Start the daemon
    Start {
        /// Stay attached to the terminal instead of forking
        #[arg(long)]
        foreground: bool,
    },

    /// Stop the running daemon
    Stop,

    /// Check daemon status
    Status,
}

/// Whether unrecognised arguments are a cmus `status_display_program` call.
///
/// cmus always passes `status <state>` first. Anything else is a mistyped
/// command and must not trigger a reaction.
pub fn is_player_hook(args: &[String]) -> bool {
    args.first().is_some_and(|first| first == "status")
}
