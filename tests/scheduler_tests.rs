//! # Scheduler Integration Tests
//!
//! Drives the scheduler against an in-memory player and checks what ends up in
//! the player, the ledger and the score store.

mod common;

use anyhow::Result;
use approx::assert_relative_eq;
use common::{scheduler, snapshot, weighted_only, Call, FakeNotifier, FakePlayer};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;
use wshuffle::config::{Config, RuntimeConfig, SchedulerConfig};
use wshuffle::db::{Adjustment, ScoreStore};
use wshuffle::ledger::Ledger;
use wshuffle::scheduler::{EnqueueOutcome, Previous, Reaction, Request, Scheduler};

/// Scheduler whose score store already holds `scores`.
fn scheduler_with_scores(
    config: SchedulerConfig,
    player: FakePlayer,
    scores: &[(&str, i32)],
) -> Result<Scheduler<FakePlayer, FakeNotifier>> {
    let mut store = ScoreStore::open_in_memory(&config)?;
    for (path, score) in scores {
        let initial = store.get_or_init(path)?;
        store.adjust(path, score - initial)?;
    }
    let ledger = Ledger::open_in_memory(config.ledger_retention)?;
    Ok(Scheduler::new(
        config,
        store,
        ledger,
        player,
        FakeNotifier::default(),
        StdRng::seed_from_u64(7),
    ))
}

mod transition_tests {
    use super::*;

    #[test]
    fn test_first_transition_queues_from_library_when_nothing_is_scored() -> Result<()> {
        let player = FakePlayer::new(&["/m/a.mp3", "/m/b.mp3"]);
        player.set_current(Some("/m/a.mp3"));
        let mut scheduler = scheduler(weighted_only(), player.clone(), FakeNotifier::default(), 1)?;

        let reaction = scheduler.react()?;

        let Reaction::Queued(track) = reaction else {
            panic!("expected a queued track, got {reaction:?}");
        };
        assert!(track == "/m/a.mp3" || track == "/m/b.mp3");
        assert_eq!(player.queued(), vec![track]);

        // Nothing was playing before, so there is nothing to go back to
        assert_eq!(scheduler.ledger().history_len()?, 0);
        assert_eq!(scheduler.ledger().snapshot_count()?, 1);
        assert_eq!(scheduler.scores().score_of("/m/a.mp3")?, Some(2));
        Ok(())
    }

    #[test]
    fn test_repeated_event_for_same_track_changes_nothing() -> Result<()> {
        let player = FakePlayer::new(&["/m/a.mp3", "/m/b.mp3"]);
        player.set_current(Some("/m/a.mp3"));
        let mut scheduler = scheduler(weighted_only(), player.clone(), FakeNotifier::default(), 2)?;

        scheduler.react()?;
        let calls = player.calls();

        // cmus reports pause, seek and volume changes through the same hook
        assert_eq!(scheduler.react()?, Reaction::Unchanged);
        assert_eq!(scheduler.react()?, Reaction::Unchanged);

        assert_eq!(player.calls(), calls);
        assert_eq!(scheduler.ledger().snapshot_count()?, 1);
        assert_eq!(scheduler.ledger().history_len()?, 0);
        Ok(())
    }

    #[test]
    fn test_transition_pushes_previous_track_onto_history() -> Result<()> {
        let player = FakePlayer::new(&["/m/a.mp3", "/m/b.mp3", "/m/c.mp3"]);
        let mut scheduler = scheduler(weighted_only(), player.clone(), FakeNotifier::default(), 3)?;

        player.set_current(Some("/m/a.mp3"));
        scheduler.react()?;
        player.set_current(Some("/m/b.mp3"));
        scheduler.react()?;
        player.set_current(Some("/m/c.mp3"));
        scheduler.react()?;

        assert_eq!(scheduler.ledger().history()?, vec!["/m/b.mp3", "/m/a.mp3"]);
        assert_eq!(scheduler.ledger().snapshot_count()?, 3);
        assert_eq!(player.queued().len(), 3);
        Ok(())
    }

    #[test]
    fn test_nothing_loaded() -> Result<()> {
        let player = FakePlayer::new(&["/m/a.mp3"]);
        let mut scheduler = scheduler(weighted_only(), player.clone(), FakeNotifier::default(), 4)?;

        assert_eq!(scheduler.react()?, Reaction::NothingLoaded);
        assert_eq!(scheduler.dispatch(Request::React)?, "nothing loaded");
        assert_eq!(scheduler.ledger().snapshot_count()?, 0);
        assert!(player.calls().is_empty());
        Ok(())
    }

    #[test]
    fn test_nothing_to_queue_still_scores_observed_track() -> Result<()> {
        let player = FakePlayer::new(&[]);
        let mut scheduler = scheduler(weighted_only(), player.clone(), FakeNotifier::default(), 5)?;

        let reaction = scheduler.on_observed_state(snapshot("/m/outside.mp3"))?;

        assert_eq!(reaction, Reaction::NothingToQueue);
        assert!(player.calls().is_empty());
        assert_eq!(scheduler.scores().score_of("/m/outside.mp3")?, Some(2));
        Ok(())
    }

    #[test]
    fn test_weighted_selection_prefers_scored_tracks() -> Result<()> {
        let player = FakePlayer::new(&["/m/other.mp3"]);
        player.set_current(Some("/m/cur.mp3"));
        let mut scheduler =
            scheduler_with_scores(weighted_only(), player.clone(), &[("/m/fav.mp3", 15)])?;

        assert_eq!(scheduler.react()?, Reaction::Queued("/m/fav.mp3".to_string()));
        Ok(())
    }

    #[test]
    fn test_shuffle_bypass_picks_from_library() -> Result<()> {
        let config = SchedulerConfig {
            disable_weighted_shuffle_threshold: 1.0,
            ..Default::default()
        };
        let player = FakePlayer::new(&["/m/lib.mp3"]);
        player.set_current(Some("/m/cur.mp3"));
        let mut scheduler = scheduler_with_scores(config, player.clone(), &[("/m/fav.mp3", 15)])?;

        assert_eq!(scheduler.react()?, Reaction::Queued("/m/lib.mp3".to_string()));
        // The bypass pick is not scored until it is actually observed
        assert_eq!(scheduler.scores().score_of("/m/lib.mp3")?, None);
        Ok(())
    }

    #[test]
    fn test_shuffle_bypass_with_empty_library_falls_back_to_scores() -> Result<()> {
        let config = SchedulerConfig {
            disable_weighted_shuffle_threshold: 1.0,
            ..Default::default()
        };
        let player = FakePlayer::new(&[]);
        player.set_current(Some("/m/cur.mp3"));
        let mut scheduler = scheduler_with_scores(config, player.clone(), &[("/m/fav.mp3", 15)])?;

        assert_eq!(scheduler.react()?, Reaction::Queued("/m/fav.mp3".to_string()));
        Ok(())
    }

    #[test]
    fn test_player_failure_aborts_before_recording() -> Result<()> {
        let player = FakePlayer::new(&["/m/a.mp3"]);
        player.set_current(Some("/m/a.mp3"));
        player.set_failing(true);
        let mut scheduler = scheduler(weighted_only(), player.clone(), FakeNotifier::default(), 6)?;

        let err = scheduler.react().unwrap_err();
        assert!(err.to_string().contains("exited with status 1"));
        assert_eq!(scheduler.ledger().snapshot_count()?, 0);
        Ok(())
    }
}

mod enqueue_tests {
    use super::*;

    #[test]
    fn test_full_queue_is_left_alone() -> Result<()> {
        let config = SchedulerConfig {
            max_queue_size: 2,
            ..weighted_only()
        };
        let player = FakePlayer::new(&["/m/x.mp3", "/m/y.mp3"]);
        player.set_queue(&["/m/x.mp3", "/m/y.mp3"]);
        player.set_current(Some("/m/cur.mp3"));
        let mut scheduler = scheduler(config, player.clone(), FakeNotifier::default(), 8)?;

        assert_eq!(scheduler.react()?, Reaction::QueueFull);
        assert!(player.calls().is_empty());
        assert_eq!(player.queued(), vec!["/m/x.mp3", "/m/y.mp3"]);

        // The observed track is scored even though nothing was queued
        assert_eq!(scheduler.scores().score_of("/m/cur.mp3")?, Some(2));
        Ok(())
    }

    #[test]
    fn test_already_queued_track_is_redrawn() -> Result<()> {
        let player = FakePlayer::new(&[]);
        player.set_queue(&["/m/a.mp3"]);
        let mut scheduler = scheduler_with_scores(
            weighted_only(),
            player.clone(),
            &[("/m/a.mp3", 2), ("/m/b.mp3", 15)],
        )?;

        let EnqueueOutcome::Queued { track, redraws } = scheduler.enqueue("/m/a.mp3")? else {
            panic!("expected the track to be queued");
        };
        assert_eq!(track, "/m/b.mp3");
        assert!(redraws >= 1);
        assert_eq!(player.queued(), vec!["/m/a.mp3", "/m/b.mp3"]);
        Ok(())
    }

    #[test]
    fn test_redraws_are_bounded() -> Result<()> {
        let player = FakePlayer::new(&[]);
        player.set_queue(&["/m/a.mp3"]);
        let mut scheduler =
            scheduler_with_scores(weighted_only(), player.clone(), &[("/m/a.mp3", 2)])?;

        // The only candidate is already queued; every re-draw collides, then
        // the collision is accepted
        assert_eq!(
            scheduler.enqueue("/m/a.mp3")?,
            EnqueueOutcome::Queued { track: "/m/a.mp3".to_string(), redraws: 10 }
        );
        assert_eq!(player.queued(), vec!["/m/a.mp3", "/m/a.mp3"]);
        Ok(())
    }

    #[test]
    fn test_redraw_limit_follows_config() -> Result<()> {
        let config = SchedulerConfig {
            max_enqueue_attempts: 3,
            ..weighted_only()
        };
        let player = FakePlayer::new(&[]);
        player.set_queue(&["/m/a.mp3"]);
        let mut scheduler = scheduler_with_scores(config, player.clone(), &[("/m/a.mp3", 2)])?;

        assert_eq!(
            scheduler.enqueue("/m/a.mp3")?,
            EnqueueOutcome::Queued { track: "/m/a.mp3".to_string(), redraws: 3 }
        );
        Ok(())
    }

    #[test]
    fn test_fresh_track_needs_no_redraws() -> Result<()> {
        let player = FakePlayer::new(&[]);
        let mut scheduler =
            scheduler_with_scores(weighted_only(), player.clone(), &[("/m/a.mp3", 2)])?;

        assert_eq!(
            scheduler.enqueue("/m/a.mp3")?,
            EnqueueOutcome::Queued { track: "/m/a.mp3".to_string(), redraws: 0 }
        );
        Ok(())
    }
}

mod previous_tests {
    use super::*;

    #[test]
    fn test_previous_with_empty_history_replays() -> Result<()> {
        let player = FakePlayer::new(&["/m/a.mp3"]);
        player.set_current(Some("/m/a.mp3"));
        let mut scheduler = scheduler(weighted_only(), player.clone(), FakeNotifier::default(), 9)?;

        assert_eq!(scheduler.go_to_previous()?, Previous::Replayed);
        assert_eq!(player.calls(), vec![Call::Replay]);
        assert!(scheduler.ledger().ignore_pending()?);
        Ok(())
    }

    #[test]
    fn test_previous_requeues_current_and_plays_last() -> Result<()> {
        let player = FakePlayer::new(&["/m/a.mp3", "/m/b.mp3"]);
        let mut scheduler = scheduler(weighted_only(), player.clone(), FakeNotifier::default(), 10)?;

        player.set_current(Some("/m/a.mp3"));
        scheduler.react()?;
        player.set_current(Some("/m/b.mp3"));
        scheduler.react()?;
        let before = player.calls().len();

        let previous = scheduler.go_to_previous()?;

        assert_eq!(
            previous,
            Previous::Playing {
                track: "/m/a.mp3".to_string(),
                requeued: Some("/m/b.mp3".to_string()),
            }
        );
        assert_eq!(
            player.calls()[before..],
            [Call::Prepend("/m/b.mp3".to_string()), Call::Play("/m/a.mp3".to_string())]
        );
        assert_eq!(player.queued()[0], "/m/b.mp3");
        assert_eq!(scheduler.ledger().history_len()?, 0);
        Ok(())
    }

    #[test]
    fn test_failed_status_query_keeps_history() -> Result<()> {
        let player = FakePlayer::new(&["/m/a.mp3", "/m/b.mp3"]);
        let mut scheduler = scheduler(weighted_only(), player.clone(), FakeNotifier::default(), 18)?;

        player.set_current(Some("/m/a.mp3"));
        scheduler.react()?;
        player.set_current(Some("/m/b.mp3"));
        scheduler.react()?;
        assert_eq!(scheduler.ledger().history_len()?, 1);

        player.set_failing(true);
        assert!(scheduler.go_to_previous().is_err());
        assert_eq!(scheduler.ledger().history()?, vec!["/m/a.mp3"]);

        // Once the player is back, going back still works
        player.set_failing(false);
        assert_eq!(
            scheduler.go_to_previous()?,
            Previous::Playing {
                track: "/m/a.mp3".to_string(),
                requeued: Some("/m/b.mp3".to_string()),
            }
        );
        assert_eq!(scheduler.ledger().history_len()?, 0);
        Ok(())
    }

    #[test]
    fn test_transition_caused_by_previous_is_suppressed() -> Result<()> {
        let player = FakePlayer::new(&["/m/a.mp3", "/m/b.mp3"]);
        let mut scheduler = scheduler(weighted_only(), player.clone(), FakeNotifier::default(), 11)?;

        player.set_current(Some("/m/a.mp3"));
        scheduler.react()?;
        player.set_current(Some("/m/b.mp3"));
        scheduler.react()?;
        scheduler.go_to_previous()?;
        let calls = player.calls();

        // The player now reports /m/a.mp3, the track we jumped back to
        assert_eq!(scheduler.react()?, Reaction::Suppressed);

        assert_eq!(player.calls(), calls);
        assert_eq!(scheduler.ledger().history_len()?, 0);
        assert!(!scheduler.ledger().ignore_pending()?);
        assert_eq!(scheduler.ledger().last_snapshot()?.map(|s| s.path), Some("/m/a.mp3".to_string()));

        // The flag is spent; the next real change is handled normally
        player.set_current(Some("/m/b.mp3"));
        assert!(matches!(scheduler.react()?, Reaction::Queued(_)));
        assert_eq!(scheduler.ledger().history()?, vec!["/m/a.mp3"]);
        Ok(())
    }
}

mod score_tests {
    use super::*;

    #[test]
    fn test_adjust_score_notifies_and_reuses_handle() -> Result<()> {
        let player = FakePlayer::new(&[]);
        player.set_current(Some("/m/a.mp3"));
        let notifier = FakeNotifier::default();
        let mut scheduler = scheduler(weighted_only(), player.clone(), notifier.clone(), 12)?;

        let first = scheduler.adjust_score(1)?;
        assert_eq!(first.path, "/m/a.mp3");
        assert_eq!(first.adjustment, Adjustment { previous: 2, score: 3 });
        assert_relative_eq!(first.probability, 1.0);
        assert_eq!(first.notification_id, 1);

        let second = scheduler.adjust_score(-1)?;
        assert_eq!(second.adjustment, Adjustment { previous: 3, score: 2 });
        assert_eq!(second.notification_id, 1);

        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].replaces_id, 0);
        assert_eq!(sent[0].summary, "Upvoted - 3 score");
        assert_eq!(sent[0].body, "100.00% chance of playing");
        assert_eq!(sent[1].replaces_id, 1);
        assert_eq!(sent[1].summary, "Downvoted - 2 score");
        assert_eq!(scheduler.ledger().notification_id()?, 1);
        Ok(())
    }

    #[test]
    fn test_probability_reflects_other_scores() -> Result<()> {
        let player = FakePlayer::new(&[]);
        player.set_current(Some("/m/a.mp3"));
        let mut scheduler =
            scheduler_with_scores(weighted_only(), player.clone(), &[("/m/b.mp3", 3)])?;

        // a: 2 -> 3, b: 3, so each carries half the weight
        let update = scheduler.adjust_score(1)?;
        assert_relative_eq!(update.probability, 0.5);
        Ok(())
    }

    #[test]
    fn test_out_of_range_delta_is_ignored() -> Result<()> {
        let player = FakePlayer::new(&[]);
        player.set_current(Some("/m/a.mp3"));
        let mut scheduler = scheduler(weighted_only(), player.clone(), FakeNotifier::default(), 13)?;

        let update = scheduler.adjust_score(100)?;
        assert_eq!(update.adjustment, Adjustment { previous: 2, score: 2 });
        assert!(!update.adjustment.applied());

        let update = scheduler.adjust_score(i32::MAX)?;
        assert_eq!(update.adjustment.score, 2);
        Ok(())
    }

    #[test]
    fn test_adjust_score_without_track_fails() -> Result<()> {
        let player = FakePlayer::new(&[]);
        let notifier = FakeNotifier::default();
        let mut scheduler = scheduler(weighted_only(), player, notifier.clone(), 14)?;

        assert!(scheduler.adjust_score(1).is_err());
        assert!(notifier.sent().is_empty());
        Ok(())
    }

    #[test]
    fn test_score_dispatch_summary() -> Result<()> {
        let player = FakePlayer::new(&[]);
        player.set_current(Some("/m/a.mp3"));
        let mut scheduler = scheduler(weighted_only(), player, FakeNotifier::default(), 15)?;

        let summary = scheduler.dispatch(Request::Score(1))?;
        assert_eq!(summary, "/m/a.mp3: 2 -> 3 (100.00% chance)");
        Ok(())
    }

    #[test]
    fn test_current_info_does_not_create_records() -> Result<()> {
        let player = FakePlayer::new(&[]);
        player.set_current(Some("/m/new.mp3"));
        let scheduler = scheduler(weighted_only(), player, FakeNotifier::default(), 16)?;

        let info = scheduler.current_info()?;
        assert_eq!(info.path, "/m/new.mp3");
        assert_eq!(info.score, None);
        assert!(scheduler.scores().is_empty()?);
        Ok(())
    }
}

mod persistence_tests {
    use super::*;

    #[test]
    fn test_state_survives_across_invocations() -> Result<()> {
        let dir = TempDir::new()?;
        let config = Config {
            scheduler: weighted_only(),
            runtime: RuntimeConfig::in_dir(dir.path()),
        };
        let player = FakePlayer::new(&["/m/a.mp3", "/m/b.mp3"]);
        player.set_current(Some("/m/a.mp3"));

        {
            let mut scheduler = Scheduler::open(&config, player.clone(), FakeNotifier::default())?;
            assert!(matches!(scheduler.react()?, Reaction::Queued(_)));
            scheduler.adjust_score(1)?;
        }

        // A fresh process sees the same ledger and scores
        let mut scheduler = Scheduler::open(&config, player.clone(), FakeNotifier::default())?;
        assert_eq!(scheduler.react()?, Reaction::Unchanged);
        assert_eq!(scheduler.scores().score_of("/m/a.mp3")?, Some(3));
        Ok(())
    }

    #[test]
    fn test_reset_keeps_scores() -> Result<()> {
        let player = FakePlayer::new(&["/m/a.mp3", "/m/b.mp3"]);
        let mut scheduler = scheduler(weighted_only(), player.clone(), FakeNotifier::default(), 17)?;

        player.set_current(Some("/m/a.mp3"));
        scheduler.react()?;
        player.set_current(Some("/m/b.mp3"));
        scheduler.react()?;
        scheduler.go_to_previous()?;

        scheduler.reset_ledger()?;

        assert_eq!(scheduler.ledger().snapshot_count()?, 0);
        assert_eq!(scheduler.ledger().history_len()?, 0);
        assert!(!scheduler.ledger().ignore_pending()?);
        assert_eq!(scheduler.scores().len()?, 2);
        Ok(())
    }
}
