//! Weighted track selection.
//!
//! Each track carries an integer score and is drawn with weight `2^score`, so
//! every score step doubles (or halves) a track's odds relative to the rest.

use log::{debug, warn};
use rand::seq::SliceRandom;
use rand::Rng;

/// A track and its current score, as fed to the selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: String,
    pub score: i32,
}

impl Candidate {
    pub fn new(path: impl Into<String>, score: i32) -> Self {
        Self { path: path.into(), score }
    }
}

/// Selection weight of a score.
#[inline]
#[must_use]
pub fn weight(score: i32) -> f64 {
    2f64.powi(score)
}

/// Sum of `2^score` over all candidates.
#[must_use]
pub fn total_weight(candidates: &[Candidate]) -> f64 {
    candidates.iter().map(|c| weight(c.score)).sum()
}

/// Probability that a track with `score` is drawn from `candidates`.
///
/// Returns 0.0 for an empty candidate set.
#[must_use]
pub fn probability(score: i32, candidates: &[Candidate]) -> f64 {
    let total = total_weight(candidates);
    if total > 0.0 && total.is_finite() {
        weight(score) / total
    } else {
        0.0
    }
}

/// Draw one track proportionally to `2^score`.
///
/// The walk subtracts weights in descending score order (ties by path) until
/// the draw is used up. Input already in that order, as the score store returns
/// it, is walked as is; anything else is sorted first. If the walk runs off the
/// end, which only floating-point rounding at the boundary can cause, a uniform
/// pick is returned instead.
///
/// Returns `None` only for an empty candidate set, after logging a warning.
pub fn select<'a, R: Rng + ?Sized>(candidates: &'a [Candidate], rng: &mut R) -> Option<&'a str> {
    let mut ordered: Vec<&Candidate> = candidates.iter().collect();
    if !ordered.windows(2).all(|w| in_walk_order(w[0], w[1])) {
        ordered.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.path.cmp(&b.path)));
    }

    let total = total_weight(candidates);
    if total > 0.0 && total.is_finite() {
        let mut remaining = rng.gen_range(0.0..total);
        for &candidate in &ordered {
            remaining -= weight(candidate.score);
            if remaining <= 0.0 {
                debug!("Picked track: {} (score {})", candidate.path, candidate.score);
                return Some(&candidate.path);
            }
        }
    }

    match candidates.choose(rng) {
        Some(candidate) => {
            warn!(
                "Weighted draw exhausted over {} tracks, picking uniformly: {}",
                candidates.len(),
                candidate.path
            );
            Some(&candidate.path)
        }
        None => {
            warn!("No scored tracks to choose from");
            None
        }
    }
}

fn in_walk_order(a: &Candidate, b: &Candidate) -> bool {
    a.score > b.score || (a.score == b.score && a.path <= b.path)
}

/// Uniform pick from a plain listing.
pub fn pick_uniform<'a, R: Rng + ?Sized>(paths: &'a [String], rng: &mut R) -> Option<&'a str> {
    paths.choose(rng).map(String::as_str)
}
