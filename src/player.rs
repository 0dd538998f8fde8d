//! # Player Control
//!
//! The scheduler never guesses what the player is doing: queue contents and the
//! current track are always read back from the player itself. This module wraps
//! that command/response interface behind the [`Player`] trait and provides the
//! `cmus` implementation, driven through `cmus-remote`.
//!
//! ## Design Decision: cmus-remote vs Socket Protocol
//!
//! Like the rest of the tooling around cmus, this shells out to `cmus-remote`
//! instead of speaking the socket protocol directly. Every call that changes
//! player state checks the exit status and fails loudly on error.
//!
//! ## Status Output
//!
//! ```text
//! status playing
//! file /music/artist/album/song.flac
//! duration 245
//! position 31
//! tag artist Some Artist
//! set shuffle false
//! ```

use anyhow::{bail, Context, Result};
use log::debug;
use std::fmt;
use std::process::Command;
use std::str::FromStr;

/// Playback status reported by the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Playing,
    Paused,
    Stopped,
}

impl PlaybackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackStatus::Playing => "playing",
            PlaybackStatus::Paused => "paused",
            PlaybackStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlaybackStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "playing" => Ok(PlaybackStatus::Playing),
            "paused" => Ok(PlaybackStatus::Paused),
            "stopped" => Ok(PlaybackStatus::Stopped),
            other => bail!("Unknown playback status: {other}"),
        }
    }
}

/// Current player state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerState {
    pub status: PlaybackStatus,
    /// Loaded track, `None` when the player has nothing loaded
    pub file: Option<String>,
    /// Seconds into the track
    pub position: i64,
    /// Track length in seconds
    pub duration: i64,
}

impl PlayerState {
    /// Parse `cmus-remote -Q` style `key value` lines.
    ///
    /// Only `status`, `file`, `position` and `duration` are read; everything
    /// else (`tag ...`, `set ...`) is skipped.
    pub fn parse(output: &str) -> Result<Self> {
        let mut status = None;
        let mut file = None;
        let mut position = 0;
        let mut duration = 0;

        for line in output.lines() {
            let Some((key, value)) = line.split_once(' ') else {
                continue;
            };
            let value = value.trim();
            match key {
                "status" => status = Some(value.parse()?),
                "file" if !value.is_empty() => file = Some(value.to_string()),
                "position" => {
                    position = value
                        .parse()
                        .with_context(|| format!("Invalid position in player status: {value}"))?;
                }
                "duration" => {
                    duration = value
                        .parse()
                        .with_context(|| format!("Invalid duration in player status: {value}"))?;
                }
                _ => {}
            }
        }

        let status = status.context("Player status output has no status line")?;
        Ok(Self { status, file, position, duration })
    }
}

/// Split a newline-separated listing into paths, skipping blank lines.
pub fn parse_listing(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Operations the scheduler needs from a media player.
pub trait Player {
    /// Current status and loaded track.
    fn current_state(&self) -> Result<PlayerState>;
    /// Every track in the library.
    fn library(&self) -> Result<Vec<String>>;
    /// Tracks currently in the play queue, in order.
    fn queue(&self) -> Result<Vec<String>>;
    /// Append a track to the play queue.
    fn enqueue(&self, path: &str) -> Result<()>;
    /// Put a track at the front of the play queue.
    fn prepend(&self, path: &str) -> Result<()>;
    /// Start playing a track immediately.
    fn play(&self, path: &str) -> Result<()>;
    /// Hand "previous" back to the player itself. Used when we have no history.
    fn replay(&self) -> Result<()>;
}

impl<P: Player + ?Sized> Player for Box<P> {
    fn current_state(&self) -> Result<PlayerState> {
        (**self).current_state()
    }
    fn library(&self) -> Result<Vec<String>> {
        (**self).library()
    }
    fn queue(&self) -> Result<Vec<String>> {
        (**self).queue()
    }
    fn enqueue(&self, path: &str) -> Result<()> {
        (**self).enqueue(path)
    }
    fn prepend(&self, path: &str) -> Result<()> {
        (**self).prepend(path)
    }
    fn play(&self, path: &str) -> Result<()> {
        (**self).play(path)
    }
    fn replay(&self) -> Result<()> {
        (**self).replay()
    }
}

/// cmus, controlled through `cmus-remote`.
#[derive(Debug, Clone)]
pub struct CmusRemote {
    program: String,
}

impl Default for CmusRemote {
    fn default() -> Self {
        Self::new("cmus-remote")
    }
}

impl CmusRemote {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    /// Run `cmus-remote` with `args`, returning stdout.
    ///
    /// # Errors
    ///
    /// Fails if the program cannot be started or exits non-zero.
    fn run(&self, args: &[&str]) -> Result<String> {
        debug!("Running {} {:?}", self.program, args);
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .with_context(|| format!("Failed to execute {}. Is cmus installed?", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "{} {} failed ({}): {}",
                self.program,
                args.join(" "),
                output.status,
                stderr.trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run a cmus command-mode command (`cmus-remote -C "<command>"`).
    fn command(&self, command: &str) -> Result<String> {
        self.run(&["-C", command])
    }
}

impl Player for CmusRemote {
    fn current_state(&self) -> Result<PlayerState> {
        let output = self.run(&["-Q"]).context("Failed to query cmus status")?;
        PlayerState::parse(&output)
    }

    fn library(&self) -> Result<Vec<String>> {
        Ok(parse_listing(&self.command("save -l -")?))
    }

    fn queue(&self) -> Result<Vec<String>> {
        Ok(parse_listing(&self.command("save -q -")?))
    }

    fn enqueue(&self, path: &str) -> Result<()> {
        self.run(&["-q", path])
            .with_context(|| format!("Failed to add {path} to the queue"))?;
        Ok(())
    }

    fn prepend(&self, path: &str) -> Result<()> {
        self.command(&format!("add -Q {path}"))
            .with_context(|| format!("Failed to prepend {path} to the queue"))?;
        Ok(())
    }

    fn play(&self, path: &str) -> Result<()> {
        self.command(&format!("player-play {path}"))
            .with_context(|| format!("Failed to play {path}"))?;
        Ok(())
    }

    fn replay(&self) -> Result<()> {
        self.run(&["-r"]).context("Failed to send previous to cmus")?;
        Ok(())
    }
}
