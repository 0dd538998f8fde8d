//! # Scheduler
//!
//! Reacts to player transitions and decides what gets queued next.
//!
//! ## Transition Handling
//!
//! [`Scheduler::on_observed_state`] runs once per player event:
//!
//! 1. Same track as the last recorded snapshot → nothing happens.
//! 2. Otherwise the snapshot is recorded.
//! 3. A pending ignore flag is consumed and the transition is dropped. This is
//!    how our own `previous` command avoids triggering a reaction to itself.
//! 4. The track that just stopped being current goes onto the history stack.
//! 5. A next track is chosen (uniformly from the library some of the time,
//!    weighted by score otherwise) and queued.
//! 6. The observed track gets a score record if it didn't have one.
//!
//! All state between calls lives in the [`Ledger`] and the [`ScoreStore`];
//! the scheduler itself holds nothing but handles to them.
//!
//! ## Commands
//!
//! The three entry points exposed to the outside world are wrapped up as
//! [`Request`] and routed through [`Scheduler::dispatch`]:
//!
//! - `react` - observe the player and react
//! - `previous` - go back to the track before the current one
//! - `score <delta>` - adjust the current track's score and show a notification

use crate::config::{Config, SchedulerConfig};
use crate::db::{Adjustment, ScoreStore};
use crate::ledger::{Ledger, StateSnapshot};
use crate::notify::{Notification, Notifier};
use crate::player::Player;
use crate::selector;
use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::str::FromStr;

/// What a call to [`Scheduler::on_observed_state`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    /// The player has no track loaded
    NothingLoaded,
    /// Same track as last time
    Unchanged,
    /// Transition absorbed by a pending ignore flag
    Suppressed,
    /// A track was added to the queue
    Queued(String),
    /// The queue is at capacity, nothing was added
    QueueFull,
    /// Neither the score store nor the library had anything to offer
    NothingToQueue,
}

impl fmt::Display for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reaction::NothingLoaded => write!(f, "nothing loaded"),
            Reaction::Unchanged => write!(f, "unchanged"),
            Reaction::Suppressed => write!(f, "transition ignored"),
            Reaction::Queued(path) => write!(f, "queued {path}"),
            Reaction::QueueFull => write!(f, "queue full"),
            Reaction::NothingToQueue => write!(f, "nothing to queue"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// `track` was added after `redraws` extra weighted draws
    Queued { track: String, redraws: usize },
    QueueFull,
}

/// What [`Scheduler::go_to_previous`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Previous {
    /// History was empty; the player's own previous command was used
    Replayed,
    /// `track` is now playing; `requeued` was put back at the front of the queue
    Playing { track: String, requeued: Option<String> },
}

impl fmt::Display for Previous {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Previous::Replayed => write!(f, "no history, replayed"),
            Previous::Playing { track, .. } => write!(f, "playing {track}"),
        }
    }
}

/// Result of [`Scheduler::adjust_score`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreUpdate {
    pub path: String,
    pub adjustment: Adjustment,
    /// Chance of this track being the weighted pick, 0.0..=1.0
    pub probability: f64,
    pub notification_id: u32,
}

impl fmt::Display for ScoreUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} -> {} ({:.2}% chance)",
            self.path,
            self.adjustment.previous,
            self.adjustment.score,
            self.probability * 100.0
        )
    }
}

/// Score details for the current track.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub path: String,
    pub score: Option<i32>,
    pub probability: f64,
}

/// The operations reachable from outside (CLI or daemon socket).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    React,
    Previous,
    Score(i32),
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::React => write!(f, "react"),
            Request::Previous => write!(f, "previous"),
            Request::Score(delta) => write!(f, "score {delta}"),
        }
    }
}

impl FromStr for Request {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        let request = match (parts.next(), parts.next()) {
            (Some("react"), None) => Request::React,
            (Some("previous"), None) => Request::Previous,
            (Some("score"), Some(delta)) => Request::Score(
                delta
                    .parse()
                    .with_context(|| format!("Invalid score delta: {delta}"))?,
            ),
            _ => bail!("Unknown request: {}", s.trim()),
        };

        if parts.next().is_some() {
            bail!("Unexpected arguments in request: {}", s.trim());
        }
        Ok(request)
    }
}

pub struct Scheduler<P, N> {
    config: SchedulerConfig,
    scores: ScoreStore,
    ledger: Ledger,
    player: P,
    notifier: N,
    rng: StdRng,
}

impl<P: Player, N: Notifier> Scheduler<P, N> {
    pub fn new(
        config: SchedulerConfig,
        scores: ScoreStore,
        ledger: Ledger,
        player: P,
        notifier: N,
        rng: StdRng,
    ) -> Self {
        Self { config, scores, ledger, player, notifier, rng }
    }

    /// Open both stores at their configured locations.
    pub fn open(config: &Config, player: P, notifier: N) -> Result<Self> {
        let scores = ScoreStore::open(&config.runtime.scores_db_path, &config.scheduler)?;
        let ledger = Ledger::open(&config.runtime.ledger_db_path, config.scheduler.ledger_retention)?;
        Ok(Self::new(
            config.scheduler.clone(),
            scores,
            ledger,
            player,
            notifier,
            StdRng::from_entropy(),
        ))
    }

    pub fn scores(&self) -> &ScoreStore {
        &self.scores
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Route one request to its operation and summarise the outcome.
    pub fn dispatch(&mut self, request: Request) -> Result<String> {
        debug!("Dispatching {request}");
        let summary = match request {
            Request::React => self.react()?.to_string(),
            Request::Previous => self.go_to_previous()?.to_string(),
            Request::Score(delta) => self.adjust_score(delta)?.to_string(),
        };
        Ok(summary)
    }

    /// Query the player and feed its state to [`Self::on_observed_state`].
    pub fn react(&mut self) -> Result<Reaction> {
        let state = self.player.current_state()?;
        let Some(path) = state.file else {
            debug!("Player has nothing loaded ({})", state.status);
            return Ok(Reaction::NothingLoaded);
        };

        self.on_observed_state(StateSnapshot::new(path, state.status, state.position, state.duration))
    }

    pub fn on_observed_state(&mut self, snapshot: StateSnapshot) -> Result<Reaction> {
        let last = self.ledger.last_snapshot()?;
        if last.as_ref().is_some_and(|last| last.path == snapshot.path) {
            return Ok(Reaction::Unchanged);
        }

        self.ledger.record_snapshot(&snapshot)?;

        if self.ledger.take_ignore()? {
            info!("Ignoring transition to {}", snapshot.path);
            return Ok(Reaction::Suppressed);
        }

        if let Some(last) = &last {
            self.ledger.push_history(&last.path)?;
        }

        let reaction = match self.choose_next()? {
            Some(track) => match self.enqueue(&track)? {
                EnqueueOutcome::Queued { track, .. } => Reaction::Queued(track),
                EnqueueOutcome::QueueFull => Reaction::QueueFull,
            },
            None => {
                warn!("Nothing to queue: no scored tracks and an empty library");
                Reaction::NothingToQueue
            }
        };

        // Tracks played from outside the weighted path still get scored
        self.scores.get_or_init(&snapshot.path)?;
        Ok(reaction)
    }

    /// Pick the next track: sometimes uniformly from the whole library,
    /// otherwise weighted by score.
    fn choose_next(&mut self) -> Result<Option<String>> {
        let mut library = None;

        if self.rng.gen::<f64>() < self.config.disable_weighted_shuffle_threshold {
            let listing = self.player.library()?;
            if let Some(track) = selector::pick_uniform(&listing, &mut self.rng) {
                info!("Picked from library: {track}");
                return Ok(Some(track.to_string()));
            }
            debug!("Library listing is empty, falling back to weighted selection");
            library = Some(listing);
        }

        let scores = self.scores.all_scores()?;
        if let Some(track) = selector::select(&scores, &mut self.rng) {
            info!("Picked song: {track}");
            return Ok(Some(track.to_string()));
        }

        let listing = match library {
            Some(listing) => listing,
            None => self.player.library()?,
        };
        Ok(selector::pick_uniform(&listing, &mut self.rng).map(str::to_string))
    }

    /// Queue `track`, re-drawing a bounded number of times if it is already
    /// queued. Never grows a queue that is already at capacity.
    pub fn enqueue(&mut self, track: &str) -> Result<EnqueueOutcome> {
        let queue = self.player.queue()?;
        if queue.len() >= self.config.max_queue_size {
            info!("Queue is full ({} tracks), skipping adding {track}", queue.len());
            return Ok(EnqueueOutcome::QueueFull);
        }

        let mut track = track.to_string();
        let mut attempts = 0;
        if queue.contains(&track) {
            let candidates = self.scores.all_scores()?;
            while queue.contains(&track) && attempts < self.config.max_enqueue_attempts {
                match selector::select(&candidates, &mut self.rng) {
                    Some(next) => track = next.to_string(),
                    None => break,
                }
                attempts += 1;
            }
        }

        if queue.contains(&track) {
            warn!("{track} is already queued, adding it again after {attempts} re-draws");
        }

        self.player.enqueue(&track)?;
        info!("Added to queue: {track}");
        Ok(EnqueueOutcome::Queued { track, redraws: attempts })
    }

    /// Go back to the track that was current before the last transition.
    ///
    /// The resulting player transition is marked to be ignored. With an empty
    /// history the player's own previous command is used instead.
    pub fn go_to_previous(&mut self) -> Result<Previous> {
        self.ledger.set_ignore()?;

        let Some(entry) = self.ledger.peek_history()? else {
            info!("No previous song in queue history");
            self.player.replay()?;
            return Ok(Previous::Replayed);
        };

        // History is only popped once the player has answered
        let current = self.player.current_state()?.file;
        self.ledger.pop_history()?;
        if let Some(current) = &current {
            self.player.prepend(current)?;
            info!("Prepended to queue: {current}");
        }

        self.player.play(&entry.path)?;
        info!("Playing previous song: {}", entry.path);
        Ok(Previous::Playing { track: entry.path, requeued: current })
    }

    /// Change the current track's score by `delta` and show the result in a
    /// single, updated-in-place notification.
    pub fn adjust_score(&mut self, delta: i32) -> Result<ScoreUpdate> {
        let path = self
            .player
            .current_state()?
            .file
            .context("Cannot change score: no track is loaded in the player")?;

        let adjustment = self.scores.adjust(&path, delta)?;
        let probability = self.scores.play_probability(adjustment.score)?;

        let previous_id = self.ledger.notification_id()?;
        let notification = Notification {
            app_name: self.config.app_name.clone(),
            replaces_id: previous_id,
            icon: self.config.notification_icon.clone(),
            summary: notification_summary(delta, adjustment.score),
            body: format!("{:.2}% chance of playing", probability * 100.0),
            timeout_ms: self.config.notification_timeout_ms,
        };
        let notification_id = self.notifier.notify(&notification)?;
        if notification_id != previous_id {
            self.ledger.replace_notification_id(notification_id)?;
        }

        Ok(ScoreUpdate { path, adjustment, probability, notification_id })
    }

    /// Score and chance for the current track, without creating a record.
    pub fn current_info(&self) -> Result<TrackInfo> {
        let path = self
            .player
            .current_state()?
            .file
            .context("No track is loaded in the player")?;
        let score = self.scores.score_of(&path)?;
        let probability = match score {
            Some(score) => self.scores.play_probability(score)?,
            None => 0.0,
        };
        Ok(TrackInfo { path, score, probability })
    }

    /// Forget all session state. Scores are untouched.
    pub fn reset_ledger(&mut self) -> Result<()> {
        self.ledger.reset()?;
        info!("Ledger reset");
        Ok(())
    }
}

fn notification_summary(delta: i32, score: i32) -> String {
    match delta {
        d if d > 0 => format!("Upvoted - {score} score"),
        d if d < 0 => format!("Downvoted - {score} score"),
        _ => format!("Score - {score}"),
    }
}
