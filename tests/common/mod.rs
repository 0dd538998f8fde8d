//! Shared fakes for the integration tests: an in-memory player that records
//! every state-changing call, and a notifier that hands out handles the way a
//! notification server does.

#![allow(dead_code)]

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, Mutex};
use wshuffle::config::SchedulerConfig;
use wshuffle::db::ScoreStore;
use wshuffle::ledger::{Ledger, StateSnapshot};
use wshuffle::notify::{Notification, Notifier};
use wshuffle::player::{PlaybackStatus, Player, PlayerState};
use wshuffle::scheduler::Scheduler;

/// A state-changing call made on the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Enqueue(String),
    Prepend(String),
    Play(String),
    Replay,
}

#[derive(Debug, Default)]
struct PlayerInner {
    current: Option<String>,
    library: Vec<String>,
    queue: Vec<String>,
    calls: Vec<Call>,
    failing: bool,
}

/// In-memory player. Clones share state, so a test can keep one handle while
/// the scheduler owns another.
#[derive(Debug, Clone, Default)]
pub struct FakePlayer {
    inner: Arc<Mutex<PlayerInner>>,
}

impl FakePlayer {
    pub fn new(library: &[&str]) -> Self {
        let player = Self::default();
        player.inner.lock().unwrap().library = library.iter().map(|p| p.to_string()).collect();
        player
    }

    pub fn set_current(&self, path: Option<&str>) {
        self.inner.lock().unwrap().current = path.map(str::to_string);
    }

    pub fn set_queue(&self, paths: &[&str]) {
        self.inner.lock().unwrap().queue = paths.iter().map(|p| p.to_string()).collect();
    }

    /// Make every player command fail, like a non-zero `cmus-remote` exit.
    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().unwrap().failing = failing;
    }

    pub fn queued(&self) -> Vec<String> {
        self.inner.lock().unwrap().queue.clone()
    }

    pub fn current(&self) -> Option<String> {
        self.inner.lock().unwrap().current.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    fn check(&self) -> Result<()> {
        if self.inner.lock().unwrap().failing {
            bail!("cmus-remote exited with status 1");
        }
        Ok(())
    }
}

impl Player for FakePlayer {
    fn current_state(&self) -> Result<PlayerState> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        Ok(PlayerState {
            status: if inner.current.is_some() { PlaybackStatus::Playing } else { PlaybackStatus::Stopped },
            file: inner.current.clone(),
            position: 12,
            duration: 200,
        })
    }

    fn library(&self) -> Result<Vec<String>> {
        self.check()?;
        Ok(self.inner.lock().unwrap().library.clone())
    }

    fn queue(&self) -> Result<Vec<String>> {
        self.check()?;
        Ok(self.inner.lock().unwrap().queue.clone())
    }

    fn enqueue(&self, path: &str) -> Result<()> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        inner.queue.push(path.to_string());
        inner.calls.push(Call::Enqueue(path.to_string()));
        Ok(())
    }

    fn prepend(&self, path: &str) -> Result<()> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        inner.queue.insert(0, path.to_string());
        inner.calls.push(Call::Prepend(path.to_string()));
        Ok(())
    }

    fn play(&self, path: &str) -> Result<()> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        inner.current = Some(path.to_string());
        inner.calls.push(Call::Play(path.to_string()));
        Ok(())
    }

    fn replay(&self) -> Result<()> {
        self.check()?;
        self.inner.lock().unwrap().calls.push(Call::Replay);
        Ok(())
    }
}

/// Keeps a notification's handle when asked to replace it, otherwise hands
/// out the next free one.
#[derive(Debug, Clone, Default)]
pub struct FakeNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
    last_id: Arc<Mutex<u32>>,
}

impl FakeNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for FakeNotifier {
    fn notify(&self, notification: &Notification) -> Result<u32> {
        self.sent.lock().unwrap().push(notification.clone());
        if notification.replaces_id != 0 {
            return Ok(notification.replaces_id);
        }
        let mut last_id = self.last_id.lock().unwrap();
        *last_id += 1;
        Ok(*last_id)
    }
}

/// Config that never bypasses weighting, so selection is score-driven only.
pub fn weighted_only() -> SchedulerConfig {
    SchedulerConfig {
        disable_weighted_shuffle_threshold: 0.0,
        ..Default::default()
    }
}

pub fn scheduler(
    config: SchedulerConfig,
    player: FakePlayer,
    notifier: FakeNotifier,
    seed: u64,
) -> Result<Scheduler<FakePlayer, FakeNotifier>> {
    let scores = ScoreStore::open_in_memory(&config)?;
    let ledger = Ledger::open_in_memory(config.ledger_retention)?;
    Ok(Scheduler::new(config, scores, ledger, player, notifier, StdRng::seed_from_u64(seed)))
}

pub fn snapshot(path: &str) -> StateSnapshot {
    StateSnapshot::new(path, PlaybackStatus::Playing, 0, 200)
}
