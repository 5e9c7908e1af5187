//! Blink Subsystem
//!
//! The eyes blink on a randomized interval and also play one blink before
//! each expression change, swapping the visuals while they are closed.
//!
//! # Stages
//!
//! ```text
//!            start()         advance()            advance()        advance()
//!   Idle ──► Opening ──► Transitioning ──► Closing ──┬──► Callback (Transition)
//!            [Open]      [Transitioning]    [Closed]  │
//!                                                     └──► Reopening ──► Idle
//!                                                        [Transitioning]  [Open]
//! ```
//!
//! The animator only tracks stages. Timing lives in the session, which
//! schedules one phase tick per [`BlinkConfig::phase_delay`].

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration
// ============================================================================

/// Blink timing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlinkConfig {
    /// Shortest wait between periodic blinks
    pub interval_min: Duration,
    /// Longest wait between periodic blinks
    pub interval_max: Duration,
    /// Delay between consecutive phases
    pub phase_delay: Duration,
    /// Fixed RNG seed for reproducible intervals
    pub seed: Option<u64>,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            interval_min: Duration::from_secs(4),
            interval_max: Duration::from_secs(7),
            phase_delay: Duration::from_millis(100),
            seed: None,
        }
    }
}

impl BlinkConfig {
    /// Build the interval RNG, seeded if configured
    #[must_use]
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Draw the wait before the next periodic blink, uniform in `[min, max]`
    pub fn draw_interval<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.interval_max <= self.interval_min {
            return self.interval_min;
        }
        rng.gen_range(self.interval_min..=self.interval_max)
    }
}

// ============================================================================
// Phases
// ============================================================================

/// Visible eye phase reported to the presenter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlinkPhase {
    /// Eyes open
    Open,
    /// Half closed
    Transitioning,
    /// Eyes closed
    Closed,
}

/// What started the current animation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlinkKind {
    /// Scheduled idle blink
    Periodic,
    /// Blink that hides an expression change
    Transition,
}

/// Result of one [`BlinkAnimator::advance`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlinkStep {
    /// Show this phase; the animation continues
    Phase(BlinkPhase),
    /// Eyes are open again; the periodic blink is over
    Reopened,
    /// Eyes are closed; apply the pending expression now
    Callback,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Idle,
    Opening,
    Transitioning,
    Closing,
    Reopening,
}

// ============================================================================
// Animator
// ============================================================================

/// Stage tracker for one blink at a time
#[derive(Debug)]
pub struct BlinkAnimator {
    stage: Stage,
    kind: BlinkKind,
    completed: u64,
}

impl Default for BlinkAnimator {
    fn default() -> Self {
        Self::new()
    }
}

impl BlinkAnimator {
    /// Create an idle animator
    #[must_use]
    pub fn new() -> Self {
        Self {
            stage: Stage::Idle,
            kind: BlinkKind::Periodic,
            completed: 0,
        }
    }

    /// Whether an animation is in progress
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.stage != Stage::Idle
    }

    /// Whether a transition blink is in progress
    #[must_use]
    pub fn in_transition(&self) -> bool {
        self.is_running() && self.kind == BlinkKind::Transition
    }

    /// Periodic blinks played to the end
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Begin an animation; returns the first phase to show
    ///
    /// Returns `None` if it cannot start: a transition blink is never
    /// replaced, and a periodic blink does not replace anything. A transition
    /// replaces a periodic blink in progress.
    pub fn start(&mut self, kind: BlinkKind) -> Option<BlinkPhase> {
        if self.is_running() && (self.kind == BlinkKind::Transition || kind == BlinkKind::Periodic)
        {
            return None;
        }
        self.kind = kind;
        self.stage = Stage::Opening;
        Some(BlinkPhase::Open)
    }

    /// Move to the next stage
    ///
    /// Returns `None` when idle.
    pub fn advance(&mut self) -> Option<BlinkStep> {
        let (next, step) = match (self.stage, self.kind) {
            (Stage::Idle, _) => return None,
            (Stage::Opening, _) => (
                Stage::Transitioning,
                BlinkStep::Phase(BlinkPhase::Transitioning),
            ),
            (Stage::Transitioning, _) => (Stage::Closing, BlinkStep::Phase(BlinkPhase::Closed)),
            (Stage::Closing, BlinkKind::Transition) => (Stage::Idle, BlinkStep::Callback),
            (Stage::Closing, BlinkKind::Periodic) => (
                Stage::Reopening,
                BlinkStep::Phase(BlinkPhase::Transitioning),
            ),
            (Stage::Reopening, _) => {
                self.completed += 1;
                (Stage::Idle, BlinkStep::Reopened)
            }
        };
        self.stage = next;
        Some(step)
    }

    /// Abandon a periodic blink; returns whether one was running
    ///
    /// Transition blinks are left alone.
    pub fn interrupt(&mut self) -> bool {
        if self.is_running() && self.kind == BlinkKind::Periodic {
            self.stage = Stage::Idle;
            true
        } else {
            false
        }
    }
}
