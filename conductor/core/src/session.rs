//! Session State Machine
//!
//! The Session is the single owner of everything that changes over time on
//! the face: the expression, the blink animation, both text channels and
//! every timer that drives them.
//!
//! # Time
//!
//! A session never reads the clock. Every entry point takes the current
//! [`Instant`], and the owner (normally the [`Conductor`](crate::Conductor))
//! is expected to call [`Session::advance`] when [`Session::next_deadline`]
//! passes. Tests drive it with any instants they like.
//!
//! # Transitions
//!
//! ```text
//!  command / auto-revert / idle
//!            │
//!            ▼
//!   in flight? ── yes ──► dropped (or queued with TransitionPolicy::Latest)
//!            │ no
//!            ▼
//!   blink suppressed? ── yes ──► apply now
//!            │ no
//!            ▼
//!   Open ─100ms─► Transitioning ─100ms─► Closed ─100ms─► apply
//! ```
//!
//! Applying a transition shows the new expression, arms its auto-revert, and
//! resumes periodic blinking unless the new state suppresses it.

use std::time::Duration;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::blink::{BlinkAnimator, BlinkConfig, BlinkKind, BlinkPhase, BlinkStep};
use crate::expression::{EmotionCommand, ExpressionState};
use crate::presenter::Presenter;
use crate::protocol::{InboundMessage, TextChunk};
use crate::streaming::{PacerConfig, StreamChannel, StreamKind, StreamStats};
use crate::timers::{TimerKind, TimerWheel};

// ============================================================================
// Configuration
// ============================================================================

/// What happens to a transition requested while another is animating
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionPolicy {
    /// Discard the new request
    #[default]
    Drop,
    /// Keep the most recent request and start it when the current one ends
    Latest,
}

impl TransitionPolicy {
    /// Parse a policy name (case-insensitive)
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "drop" => Some(Self::Drop),
            "latest" => Some(Self::Latest),
            _ => None,
        }
    }
}

/// Session settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Inactivity before falling asleep
    /// Default: 10s
    pub idle_timeout: Duration,
    /// Handling of overlapping transitions
    pub transition_policy: TransitionPolicy,
    /// Blink timing
    pub blink: BlinkConfig,
    /// Text pacing
    pub pacer: PacerConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(10),
            transition_policy: TransitionPolicy::Drop,
            blink: BlinkConfig::default(),
            pacer: PacerConfig::default(),
        }
    }
}

// ============================================================================
// Transitions
// ============================================================================

/// Why a transition was requested
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionOrigin {
    /// Explicit emotion command
    Command,
    /// Auto-revert timer
    AutoRevert,
    /// Idle timer
    Idle,
}

impl TransitionOrigin {
    fn as_str(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::AutoRevert => "auto_revert",
            Self::Idle => "idle",
        }
    }
}

#[derive(Clone, Debug)]
struct TransitionRequest {
    target: ExpressionState,
    origin: TransitionOrigin,
    /// Auto-revert delay, counted from when the target becomes visible
    revert_after: Option<Duration>,
    reason: String,
}

// ============================================================================
// Snapshot
// ============================================================================

/// Session counters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Messages handled (including inert ones)
    pub messages: u64,
    /// Emotion commands received
    pub commands: u64,
    /// Transitions that reached the presenter
    pub transitions_applied: u64,
    /// Transitions discarded because another was in flight
    pub transitions_dropped: u64,
    /// User interactions reported by the presenter side
    pub user_interactions: u64,
}

/// Point-in-time view of one text channel
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChannelSnapshot {
    /// Text shown so far
    pub displayed: String,
    /// Characters waiting to be revealed
    pub pending_chars: usize,
    /// Whether the current message ended
    pub finished: bool,
    /// Counters
    pub stats: StreamStats,
}

impl ChannelSnapshot {
    fn of(channel: &StreamChannel) -> Self {
        Self {
            displayed: channel.displayed().to_string(),
            pending_chars: channel.pending_chars(),
            finished: channel.is_finished(),
            stats: channel.stats().clone(),
        }
    }
}

/// Point-in-time view of the session
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Current expression
    pub expression: ExpressionState,
    /// Expression before the last command
    pub previous: ExpressionState,
    /// A transition blink is animating
    pub transition_in_flight: bool,
    /// Target waiting behind it (`latest` policy only)
    pub queued_transition: Option<ExpressionState>,
    /// Any blink is animating
    pub blink_running: bool,
    /// The idle timer is armed
    pub idle_armed: bool,
    /// The auto-revert timer is armed
    pub auto_revert_armed: bool,
    /// Transcript channel
    pub transcript: ChannelSnapshot,
    /// Reply channel
    pub reply: ChannelSnapshot,
    /// Counters
    pub stats: SessionStats,
}

// ============================================================================
// Session
// ============================================================================

/// The face session: expression state machine plus all of its timers
pub struct Session<P> {
    config: SessionConfig,
    presenter: P,
    current: ExpressionState,
    previous: ExpressionState,
    timers: TimerWheel<TimerKind>,
    blink: BlinkAnimator,
    rng: StdRng,
    in_flight: Option<TransitionRequest>,
    queued: Option<TransitionRequest>,
    transcript: StreamChannel,
    reply: StreamChannel,
    stats: SessionStats,
}

impl<P: Presenter> Session<P> {
    /// Start a session at `now` in the `Normal` state
    ///
    /// The presenter is not called for the initial state.
    pub fn new(config: SessionConfig, presenter: P, now: Instant) -> Self {
        let rng = config.blink.rng();
        let transcript = StreamChannel::new(StreamKind::Transcript, &config.pacer);
        let reply = StreamChannel::new(StreamKind::Reply, &config.pacer);

        let mut session = Self {
            config,
            presenter,
            current: ExpressionState::Normal,
            previous: ExpressionState::Normal,
            timers: TimerWheel::new(),
            blink: BlinkAnimator::new(),
            rng,
            in_flight: None,
            queued: None,
            transcript,
            reply,
            stats: SessionStats::default(),
        };
        session.reset_idle(now);
        session.schedule_periodic_blink(now);
        session
    }

    /// Current expression
    #[must_use]
    pub fn expression(&self) -> ExpressionState {
        self.current
    }

    /// Expression recorded by the last command
    #[must_use]
    pub fn previous(&self) -> ExpressionState {
        self.previous
    }

    /// Settings in use
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The presenter
    #[must_use]
    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// The presenter, mutably
    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    /// Consume the session, returning its presenter
    pub fn into_presenter(self) -> P {
        self.presenter
    }

    /// Live deadline of one timer
    #[must_use]
    pub fn timer_deadline(&self, kind: TimerKind) -> Option<Instant> {
        self.timers.deadline_of(kind)
    }

    /// Earliest instant at which [`advance`](Self::advance) has work
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Handle one decoded message
    pub fn handle_message(&mut self, message: InboundMessage, now: Instant) {
        self.stats.messages += 1;
        if message.is_interaction() {
            self.reset_idle(now);
        }

        match message {
            InboundMessage::Emotion(command) => self.apply_command(command, now),
            InboundMessage::Transcript(chunk) => self.on_chunk(StreamKind::Transcript, &chunk, now),
            InboundMessage::Reply(chunk) => self.on_chunk(StreamKind::Reply, &chunk, now),
            InboundMessage::Inert => debug!("Inert message ignored"),
        }
    }

    /// Apply an emotion command
    ///
    /// Any pending auto-revert is cancelled, even if the command itself ends
    /// up dropped.
    pub fn apply_command(&mut self, command: EmotionCommand, now: Instant) {
        self.stats.commands += 1;
        self.timers.cancel(TimerKind::AutoRevert);
        if let Some(in_flight) = self.in_flight.as_mut() {
            in_flight.revert_after = None;
        }

        let revert_after = command.revert_after();
        self.request_transition(
            TransitionRequest {
                target: command.target,
                origin: TransitionOrigin::Command,
                revert_after,
                reason: command.trigger_reason,
            },
            now,
        );
    }

    /// User touched the device; restarts the idle countdown
    pub fn user_interaction(&mut self, now: Instant) {
        self.stats.user_interactions += 1;
        self.reset_idle(now);
    }

    /// Fire every timer due at or before `now`
    pub fn advance(&mut self, now: Instant) {
        while let Some(expired) = self.timers.pop_due(now, true) {
            self.fire(expired.kind, expired.deadline);
        }
    }

    /// Fire every timer due strictly before `now`
    ///
    /// Called before applying an input that arrived at `now`, so that the
    /// input wins over any timer due at the same instant.
    pub fn settle(&mut self, now: Instant) {
        while let Some(expired) = self.timers.pop_due(now, false) {
            self.fire(expired.kind, expired.deadline);
        }
    }

    /// Capture the current state
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            expression: self.current,
            previous: self.previous,
            transition_in_flight: self.in_flight.is_some(),
            queued_transition: self.queued.as_ref().map(|r| r.target),
            blink_running: self.blink.is_running(),
            idle_armed: self.timers.is_armed(TimerKind::Idle),
            auto_revert_armed: self.timers.is_armed(TimerKind::AutoRevert),
            transcript: ChannelSnapshot::of(&self.transcript),
            reply: ChannelSnapshot::of(&self.reply),
            stats: self.stats.clone(),
        }
    }

    // ------------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------------

    fn fire(&mut self, kind: TimerKind, at: Instant) {
        match kind {
            TimerKind::AutoRevert => self.on_auto_revert(at),
            TimerKind::Idle => self.on_idle(at),
            TimerKind::BlinkInterval => self.on_blink_interval(at),
            TimerKind::BlinkPhase => self.on_blink_phase(at),
            TimerKind::Pacer(stream) => self.on_pacer_tick(stream, at),
        }
    }

    fn on_auto_revert(&mut self, at: Instant) {
        let target = if self.previous != self.current {
            self.previous
        } else {
            ExpressionState::Normal
        };
        self.request_transition(
            TransitionRequest {
                target,
                origin: TransitionOrigin::AutoRevert,
                revert_after: None,
                reason: String::new(),
            },
            at,
        );
    }

    fn on_idle(&mut self, at: Instant) {
        if self.current == ExpressionState::Sleep {
            debug!("Idle timeout while asleep");
            return;
        }
        self.request_transition(
            TransitionRequest {
                target: ExpressionState::Sleep,
                origin: TransitionOrigin::Idle,
                revert_after: None,
                reason: String::new(),
            },
            at,
        );
    }

    fn on_blink_interval(&mut self, at: Instant) {
        if self.current.suppresses_blink() {
            return;
        }
        if let Some(phase) = self.blink.start(BlinkKind::Periodic) {
            self.presenter.on_blink_phase(phase);
            self.schedule_blink_phase(at);
        }
    }

    fn on_blink_phase(&mut self, at: Instant) {
        match self.blink.advance() {
            Some(BlinkStep::Phase(phase)) => {
                self.presenter.on_blink_phase(phase);
                self.schedule_blink_phase(at);
            }
            Some(BlinkStep::Reopened) => {
                self.presenter.on_blink_phase(BlinkPhase::Open);
                self.schedule_periodic_blink(at);
            }
            Some(BlinkStep::Callback) => {
                if let Some(request) = self.in_flight.take() {
                    self.apply_transition(request, at);
                }
            }
            None => {}
        }
    }

    fn on_pacer_tick(&mut self, stream: StreamKind, at: Instant) {
        let channel = match stream {
            StreamKind::Transcript => &mut self.transcript,
            StreamKind::Reply => &mut self.reply,
        };
        let Some(text) = channel.tick() else {
            return;
        };
        let more = channel.has_pending();

        self.present_text(stream, &text);
        if more {
            self.timers
                .schedule(TimerKind::Pacer(stream), at + self.config.pacer.tick);
        }
    }

    fn reset_idle(&mut self, now: Instant) {
        self.timers
            .schedule(TimerKind::Idle, now + self.config.idle_timeout);
    }

    fn schedule_periodic_blink(&mut self, now: Instant) {
        if self.current.suppresses_blink() {
            self.timers.cancel(TimerKind::BlinkInterval);
            return;
        }
        let wait = self.config.blink.draw_interval(&mut self.rng);
        self.timers.schedule(TimerKind::BlinkInterval, now + wait);
    }

    fn schedule_blink_phase(&mut self, now: Instant) {
        self.timers
            .schedule(TimerKind::BlinkPhase, now + self.config.blink.phase_delay);
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    fn request_transition(&mut self, request: TransitionRequest, now: Instant) {
        if self.in_flight.is_none() {
            self.start_transition(request, now);
            return;
        }

        match self.config.transition_policy {
            TransitionPolicy::Drop => {
                self.stats.transitions_dropped += 1;
                warn!(
                    origin = request.origin.as_str(),
                    target = %request.target,
                    reason = %request.reason,
                    "Transition dropped, another is in flight"
                );
                if request.origin == TransitionOrigin::Idle {
                    self.reset_idle(now);
                }
            }
            TransitionPolicy::Latest => {
                debug!(
                    origin = request.origin.as_str(),
                    target = %request.target,
                    "Transition queued behind the one in flight"
                );
                if let Some(replaced) = self.queued.replace(request) {
                    self.stats.transitions_dropped += 1;
                    warn!(
                        origin = replaced.origin.as_str(),
                        target = %replaced.target,
                        "Queued transition superseded"
                    );
                }
            }
        }
    }

    fn start_transition(&mut self, request: TransitionRequest, now: Instant) {
        debug!(
            origin = request.origin.as_str(),
            from = %self.current,
            target = %request.target,
            reason = %request.reason,
            "Transition started"
        );
        if request.origin == TransitionOrigin::Command {
            self.previous = self.current;
        }

        if self.current.suppresses_blink() {
            self.apply_transition(request, now);
            return;
        }

        self.blink.interrupt();
        self.timers.cancel(TimerKind::BlinkInterval);
        if let Some(phase) = self.blink.start(BlinkKind::Transition) {
            self.presenter.on_blink_phase(phase);
            self.schedule_blink_phase(now);
            self.in_flight = Some(request);
        }
    }

    fn apply_transition(&mut self, request: TransitionRequest, now: Instant) {
        self.stats.transitions_applied += 1;
        self.current = request.target;
        self.presenter.on_expression_changed(request.target);
        debug!(
            origin = request.origin.as_str(),
            state = %request.target,
            "Transition applied"
        );

        if let Some(delay) = request.revert_after {
            self.timers.schedule(TimerKind::AutoRevert, now + delay);
        }
        // Waking without an interaction still needs an idle countdown
        if request.target != ExpressionState::Sleep && !self.timers.is_armed(TimerKind::Idle) {
            self.reset_idle(now);
        }
        self.schedule_periodic_blink(now);

        if let Some(next) = self.queued.take() {
            self.start_transition(next, now);
        }
    }

    // ------------------------------------------------------------------------
    // Text channels
    // ------------------------------------------------------------------------

    fn on_chunk(&mut self, stream: StreamKind, chunk: &TextChunk, now: Instant) {
        let channel = match stream {
            StreamKind::Transcript => &mut self.transcript,
            StreamKind::Reply => &mut self.reply,
        };
        let outcome = channel.on_chunk(chunk);
        let has_pending = channel.has_pending();

        if outcome.cleared {
            self.present_text(stream, "");
        }
        if let Some(text) = outcome.shown {
            self.present_text(stream, &text);
        }

        let pacer = TimerKind::Pacer(stream);
        if has_pending && !self.timers.is_armed(pacer) {
            self.timers.schedule(pacer, now + self.config.pacer.tick);
        }
    }

    fn present_text(&mut self, stream: StreamKind, text: &str) {
        match stream {
            StreamKind::Transcript => self.presenter.on_transcript_updated(text),
            StreamKind::Reply => self.presenter.on_reply_text_updated(text),
        }
    }
}

impl<P> std::fmt::Debug for Session<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("current", &self.current)
            .field("previous", &self.previous)
            .field("in_flight", &self.in_flight.as_ref().map(|r| r.target))
            .field("blink", &self.blink)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presenter::{PresenterEvent, RecordingPresenter};
    use pretty_assertions::assert_eq;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn seeded() -> SessionConfig {
        SessionConfig {
            blink: BlinkConfig {
                seed: Some(1234),
                ..BlinkConfig::default()
            },
            ..SessionConfig::default()
        }
    }

    fn session_with(config: SessionConfig) -> (Session<RecordingPresenter>, Instant) {
        let t0 = Instant::now();
        (Session::new(config, RecordingPresenter::new(), t0), t0)
    }

    fn session() -> (Session<RecordingPresenter>, Instant) {
        session_with(seeded())
    }

    fn emotion(target: ExpressionState, duration_ms: i64) -> InboundMessage {
        InboundMessage::Emotion(EmotionCommand::new(target, duration_ms, "test"))
    }

    /// Deliver `message` at `at` the way the conductor does
    fn send(session: &mut Session<RecordingPresenter>, message: InboundMessage, at: Instant) {
        session.settle(at);
        session.handle_message(message, at);
    }

    fn reply(text: &str, is_final: bool) -> InboundMessage {
        InboundMessage::Reply(TextChunk::new(text, is_final))
    }

    #[test]
    fn test_initial_state() {
        let (mut session, t0) = session();
        let snapshot = session.snapshot();
        assert_eq!(snapshot.expression, ExpressionState::Normal);
        assert!(snapshot.idle_armed);
        assert!(!snapshot.auto_revert_armed);
        assert!(session.presenter().events().is_empty());

        let blink_at = session.timer_deadline(TimerKind::BlinkInterval).unwrap();
        assert!(blink_at >= t0 + ms(4000) && blink_at <= t0 + ms(7000));
        assert_eq!(session.next_deadline(), Some(blink_at));
    }

    #[test]
    fn test_command_blinks_then_applies() {
        let (mut session, t0) = session();
        send(&mut session, emotion(ExpressionState::Happy, 0), t0);
        assert_eq!(session.presenter().blink_phases(), vec![BlinkPhase::Open]);
        assert!(session.snapshot().transition_in_flight);

        session.advance(t0 + ms(299));
        assert_eq!(session.expression(), ExpressionState::Normal);

        session.advance(t0 + ms(300));
        assert_eq!(
            session.presenter().events(),
            vec![
                PresenterEvent::BlinkPhase { phase: BlinkPhase::Open },
                PresenterEvent::BlinkPhase { phase: BlinkPhase::Transitioning },
                PresenterEvent::BlinkPhase { phase: BlinkPhase::Closed },
                PresenterEvent::ExpressionChanged { state: ExpressionState::Happy },
            ]
        );
        assert_eq!(session.previous(), ExpressionState::Normal);
        assert!(!session.snapshot().transition_in_flight);
    }

    #[test]
    fn test_auto_revert_to_previous() {
        let (mut session, t0) = session();
        send(&mut session, emotion(ExpressionState::Happy, 1000), t0);
        session.advance(t0 + ms(300));
        assert_eq!(
            session.timer_deadline(TimerKind::AutoRevert),
            Some(t0 + ms(1300))
        );

        session.advance(t0 + ms(1599));
        assert_eq!(session.expression(), ExpressionState::Happy);
        session.advance(t0 + ms(1600));
        assert_eq!(session.expression(), ExpressionState::Normal);
        assert_eq!(
            session.presenter().expressions(),
            vec![ExpressionState::Happy, ExpressionState::Normal]
        );
        assert!(!session.snapshot().auto_revert_armed);
    }

    #[test]
    fn test_revert_goes_to_normal_when_previous_matches() {
        let (mut session, t0) = session();
        send(&mut session, emotion(ExpressionState::Happy, 0), t0);
        session.advance(t0 + ms(300));
        send(&mut session, emotion(ExpressionState::Happy, 1000), t0 + ms(400));
        session.advance(t0 + ms(700));
        assert_eq!(session.previous(), ExpressionState::Happy);

        session.advance(t0 + ms(2000));
        assert_eq!(session.expression(), ExpressionState::Normal);
    }

    #[test]
    fn test_later_command_cancels_revert() {
        let (mut session, t0) = session();
        send(&mut session, emotion(ExpressionState::Happy, 1000), t0);
        session.advance(t0 + ms(300));
        send(&mut session, emotion(ExpressionState::Sad, 0), t0 + ms(500));
        assert!(!session.snapshot().auto_revert_armed);

        session.advance(t0 + ms(5000));
        assert_eq!(session.expression(), ExpressionState::Sad);
        assert_eq!(
            session.presenter().expressions(),
            vec![ExpressionState::Happy, ExpressionState::Sad]
        );
    }

    #[test]
    fn test_later_command_arms_only_its_own_revert() {
        let (mut session, t0) = session();
        send(&mut session, emotion(ExpressionState::Happy, 1000), t0);
        session.advance(t0 + ms(300));
        send(&mut session, emotion(ExpressionState::Sad, 2000), t0 + ms(500));
        session.advance(t0 + ms(800));
        assert_eq!(
            session.timer_deadline(TimerKind::AutoRevert),
            Some(t0 + ms(2800))
        );

        session.advance(t0 + ms(2799));
        assert_eq!(session.expression(), ExpressionState::Sad);
        session.advance(t0 + ms(3100));
        assert_eq!(session.expression(), ExpressionState::Happy);
    }

    #[test]
    fn test_command_at_revert_instant_wins() {
        let (mut session, t0) = session();
        send(&mut session, emotion(ExpressionState::Happy, 1000), t0);
        session.advance(t0 + ms(300));

        send(&mut session, emotion(ExpressionState::Sad, 0), t0 + ms(1300));
        session.advance(t0 + ms(5000));
        assert_eq!(
            session.presenter().expressions(),
            vec![ExpressionState::Happy, ExpressionState::Sad]
        );
    }

    #[test]
    fn test_command_during_transition_is_dropped() {
        let (mut session, t0) = session();
        send(&mut session, emotion(ExpressionState::Happy, 1000), t0);
        send(&mut session, emotion(ExpressionState::Sad, 0), t0 + ms(50));

        session.advance(t0 + ms(300));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.expression, ExpressionState::Happy);
        assert_eq!(snapshot.stats.transitions_dropped, 1);
        // The dropped command still cancelled Happy's revert
        assert!(!snapshot.auto_revert_armed);

        session.advance(t0 + ms(5000));
        assert_eq!(session.presenter().expressions(), vec![ExpressionState::Happy]);
    }

    #[test]
    fn test_at_most_one_transition_in_flight() {
        let (mut session, t0) = session();
        for (i, target) in ExpressionState::ALL.into_iter().enumerate() {
            send(&mut session, emotion(target, 0), t0 + ms(10 * i as u64));
        }
        let opens = session
            .presenter()
            .blink_phases()
            .iter()
            .filter(|p| **p == BlinkPhase::Open)
            .count();
        assert_eq!(opens, 1);

        session.advance(t0 + ms(300));
        assert_eq!(session.presenter().expressions(), vec![ExpressionState::Normal]);
        assert_eq!(session.snapshot().stats.transitions_dropped, 4);
    }

    #[test]
    fn test_latest_policy_runs_most_recent_request() {
        let (mut session, t0) = session_with(SessionConfig {
            transition_policy: TransitionPolicy::Latest,
            ..seeded()
        });
        send(&mut session, emotion(ExpressionState::Happy, 0), t0);
        send(&mut session, emotion(ExpressionState::Sad, 0), t0 + ms(50));
        send(&mut session, emotion(ExpressionState::Warning, 0), t0 + ms(60));
        assert_eq!(
            session.snapshot().queued_transition,
            Some(ExpressionState::Warning)
        );

        session.advance(t0 + ms(300));
        assert_eq!(session.expression(), ExpressionState::Happy);
        assert!(session.snapshot().transition_in_flight);

        session.advance(t0 + ms(600));
        assert_eq!(
            session.presenter().expressions(),
            vec![ExpressionState::Happy, ExpressionState::Warning]
        );
        assert_eq!(session.previous(), ExpressionState::Happy);
    }

    #[test]
    fn test_idle_timeout_sleeps() {
        let (mut session, t0) = session();
        session.advance(t0 + ms(9999));
        assert_eq!(session.expression(), ExpressionState::Normal);

        session.advance(t0 + ms(10_300));
        assert_eq!(session.expression(), ExpressionState::Sleep);
        assert!(!session.snapshot().idle_armed);
    }

    #[test]
    fn test_interaction_defers_idle() {
        let (mut session, t0) = session();
        session.advance(t0 + ms(9000));
        session.user_interaction(t0 + ms(9000));

        session.advance(t0 + ms(18_999));
        assert_eq!(session.expression(), ExpressionState::Normal);
        session.advance(t0 + ms(19_300));
        assert_eq!(session.expression(), ExpressionState::Sleep);
    }

    #[test]
    fn test_text_messages_count_as_interaction() {
        let (mut session, t0) = session();
        send(
            &mut session,
            InboundMessage::Transcript(TextChunk::new("你好", false)),
            t0 + ms(8000),
        );
        assert_eq!(
            session.timer_deadline(TimerKind::Idle),
            Some(t0 + ms(18_000))
        );
    }

    #[test]
    fn test_inert_message_does_not_reset_idle() {
        let (mut session, t0) = session();
        send(&mut session, InboundMessage::Inert, t0 + ms(5000));
        assert_eq!(
            session.timer_deadline(TimerKind::Idle),
            Some(t0 + ms(10_000))
        );
    }

    #[test]
    fn test_idle_while_asleep_is_noop() {
        let (mut session, t0) = session();
        send(&mut session, emotion(ExpressionState::Sleep, 0), t0);
        session.advance(t0 + ms(20_000));
        assert_eq!(session.presenter().expressions(), vec![ExpressionState::Sleep]);
        assert_eq!(session.snapshot().stats.transitions_dropped, 0);
    }

    #[test]
    fn test_sleep_does_not_cancel_revert() {
        let (mut session, t0) = session();
        send(&mut session, emotion(ExpressionState::Happy, 15_000), t0);
        session.advance(t0 + ms(10_300));
        assert_eq!(session.expression(), ExpressionState::Sleep);
        assert!(session.snapshot().auto_revert_armed);

        // Revert fires at 15.3s from Sleep straight to Normal, no blink
        session.presenter_mut().clear();
        session.advance(t0 + ms(15_300));
        assert_eq!(session.expression(), ExpressionState::Normal);
        assert_eq!(
            session.presenter().events(),
            vec![PresenterEvent::ExpressionChanged {
                state: ExpressionState::Normal
            }]
        );
    }

    #[test]
    fn test_revert_out_of_sleep_rearms_idle() {
        let (mut session, t0) = session();
        send(&mut session, emotion(ExpressionState::Happy, 15_000), t0);
        session.advance(t0 + ms(10_300));
        assert_eq!(session.expression(), ExpressionState::Sleep);
        assert!(!session.snapshot().idle_armed);

        session.advance(t0 + ms(15_300));
        assert_eq!(session.expression(), ExpressionState::Normal);
        assert!(session.snapshot().idle_armed);
        assert_eq!(
            session.timer_deadline(TimerKind::Idle),
            Some(t0 + ms(25_300))
        );

        // No interaction since t0: back to sleep one interval after waking
        session.advance(t0 + ms(25_600));
        assert_eq!(session.expression(), ExpressionState::Sleep);
        session.advance(t0 + ms(120_000));
        assert_eq!(session.expression(), ExpressionState::Sleep);
    }

    #[test]
    fn test_dropped_idle_rearms() {
        let (mut session, t0) = session();
        send(&mut session, emotion(ExpressionState::Happy, 9500), t0);
        // Message at t0 pushed idle to 10s; revert fires at 9.8s and animates
        // until 10.1s, so idle lands mid-transition
        session.advance(t0 + ms(10_000));
        assert!(session.snapshot().transition_in_flight);
        assert_eq!(
            session.timer_deadline(TimerKind::Idle),
            Some(t0 + ms(20_000))
        );

        session.advance(t0 + ms(10_100));
        assert_eq!(session.expression(), ExpressionState::Normal);
        session.advance(t0 + ms(20_300));
        assert_eq!(session.expression(), ExpressionState::Sleep);
    }

    #[test]
    fn test_suppressed_states_skip_animation() {
        let (mut session, t0) = session();
        send(&mut session, emotion(ExpressionState::Warning, 0), t0);
        session.advance(t0 + ms(300));
        session.presenter_mut().clear();

        send(&mut session, emotion(ExpressionState::Happy, 0), t0 + ms(400));
        assert_eq!(
            session.presenter().events(),
            vec![PresenterEvent::ExpressionChanged {
                state: ExpressionState::Happy
            }]
        );
        assert!(!session.snapshot().transition_in_flight);
    }

    #[test]
    fn test_no_periodic_blink_while_suppressed() {
        let (mut session, t0) = session();
        send(&mut session, emotion(ExpressionState::Warning, 0), t0);
        session.advance(t0 + ms(300));
        session.presenter_mut().clear();
        assert!(session.timer_deadline(TimerKind::BlinkInterval).is_none());

        // Idle takes it to Sleep at 10s; still no blinking
        session.advance(t0 + ms(60_000));
        assert_eq!(session.expression(), ExpressionState::Sleep);
        assert!(session.presenter().blink_phases().is_empty());
    }

    #[test]
    fn test_blink_resumes_after_warning() {
        let (mut session, t0) = session();
        send(&mut session, emotion(ExpressionState::Warning, 500), t0);
        session.advance(t0 + ms(800));
        assert_eq!(session.expression(), ExpressionState::Normal);
        session.presenter_mut().clear();

        let blink_at = session.timer_deadline(TimerKind::BlinkInterval).unwrap();
        assert!(blink_at <= t0 + ms(800 + 7000));
        session.advance(blink_at + ms(400));
        assert_eq!(
            session.presenter().blink_phases(),
            vec![
                BlinkPhase::Open,
                BlinkPhase::Transitioning,
                BlinkPhase::Closed,
                BlinkPhase::Transitioning,
                BlinkPhase::Open,
            ]
        );
    }

    #[test]
    fn test_warning_scenario_has_no_blinks_between_changes() {
        let (mut session, t0) = session();
        send(
            &mut session,
            InboundMessage::Emotion(EmotionCommand::new(ExpressionState::Warning, 500, "x")),
            t0,
        );
        session.advance(t0 + ms(2000));

        let events = session.presenter().events();
        let warning = events
            .iter()
            .position(|e| {
                *e == PresenterEvent::ExpressionChanged {
                    state: ExpressionState::Warning,
                }
            })
            .unwrap();
        let normal = events
            .iter()
            .position(|e| {
                *e == PresenterEvent::ExpressionChanged {
                    state: ExpressionState::Normal,
                }
            })
            .unwrap();
        assert!(warning < normal);
        assert!(events[warning + 1..normal]
            .iter()
            .all(|e| !matches!(e, PresenterEvent::BlinkPhase { .. })));
        assert_eq!(
            session.presenter().expressions(),
            vec![ExpressionState::Warning, ExpressionState::Normal]
        );
    }

    #[test]
    fn test_periodic_blink_timeline() {
        let (mut session, _t0) = session();
        let start = session.timer_deadline(TimerKind::BlinkInterval).unwrap();

        session.advance(start);
        assert_eq!(session.presenter().blink_phases(), vec![BlinkPhase::Open]);
        session.advance(start + ms(200));
        assert_eq!(session.presenter().blink_phases().len(), 3);
        session.advance(start + ms(400));
        assert_eq!(session.presenter().blink_phases().len(), 5);
        assert!(!session.snapshot().blink_running);

        let next = session.timer_deadline(TimerKind::BlinkInterval).unwrap();
        assert!(next >= start + ms(4400) && next <= start + ms(7400));
    }

    #[test]
    fn test_transition_interrupts_periodic_blink() {
        let (mut session, _t0) = session();
        let start = session.timer_deadline(TimerKind::BlinkInterval).unwrap();
        session.advance(start + ms(100));

        send(&mut session, emotion(ExpressionState::Sad, 0), start + ms(150));
        session.advance(start + ms(450));
        assert_eq!(
            session.presenter().blink_phases(),
            vec![
                BlinkPhase::Open,
                BlinkPhase::Transitioning,
                BlinkPhase::Open,
                BlinkPhase::Transitioning,
                BlinkPhase::Closed,
            ]
        );
        assert_eq!(session.expression(), ExpressionState::Sad);
    }

    #[test]
    fn test_reply_paced_reveal() {
        let (mut session, t0) = session();
        send(&mut session, reply("abcdefg", true), t0);
        assert!(session.presenter().replies().is_empty());

        session.advance(t0 + ms(30));
        assert_eq!(session.presenter().replies(), vec!["abc"]);
        session.advance(t0 + ms(90));
        assert_eq!(session.presenter().replies(), vec!["abc", "abcdef", "abcdefg"]);
        assert!(session.timer_deadline(TimerKind::Pacer(StreamKind::Reply)).is_none());
    }

    #[test]
    fn test_reply_chunks_round_trip() {
        let (mut session, t0) = session();
        let chunks = ["今天", "天气", "很好，", "适合", "出去走走。"];
        for (i, text) in chunks.iter().enumerate() {
            send(&mut session, reply(text, false), t0 + ms(40 * i as u64));
        }
        send(&mut session, reply("", true), t0 + ms(200));
        session.advance(t0 + ms(2000));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.reply.displayed, chunks.concat());
        assert_eq!(snapshot.reply.pending_chars, 0);
        assert!(snapshot.reply.finished);
        assert_eq!(session.presenter().replies().last(), Some(&chunks.concat()));
    }

    #[test]
    fn test_reply_reset_never_concatenates() {
        let (mut session, t0) = session();
        send(&mut session, reply("hello", true), t0);
        send(&mut session, reply("world", true), t0 + ms(40));
        session.advance(t0 + ms(1000));

        let replies = session.presenter().replies();
        assert!(replies.iter().all(|r| !r.contains("helloworld")));
        assert!(replies.contains(&String::new()));
        assert_eq!(replies.last().map(String::as_str), Some("world"));
        assert_eq!(session.snapshot().reply.stats.resets, 1);
    }

    #[test]
    fn test_transcript_verbatim_by_default() {
        let (mut session, t0) = session();
        send(
            &mut session,
            InboundMessage::Transcript(TextChunk::new("你知道", false)),
            t0,
        );
        send(
            &mut session,
            InboundMessage::Transcript(TextChunk::new("你知道我是谁吗", true)),
            t0 + ms(10),
        );
        assert_eq!(
            session.presenter().transcripts(),
            vec!["你知道", "你知道我是谁吗"]
        );
        assert!(session
            .timer_deadline(TimerKind::Pacer(StreamKind::Transcript))
            .is_none());
    }

    #[test]
    fn test_transcript_paced_mode() {
        let (mut session, t0) = session_with(SessionConfig {
            pacer: PacerConfig {
                transcript_mode: crate::streaming::RevealMode::Paced,
                ..PacerConfig::default()
            },
            ..seeded()
        });
        send(
            &mut session,
            InboundMessage::Transcript(TextChunk::new("abcd", true)),
            t0,
        );
        session.advance(t0 + ms(60));
        assert_eq!(session.presenter().transcripts(), vec!["abc", "abcd"]);
    }

    #[test]
    fn test_chunk_does_not_restart_running_tick() {
        let (mut session, t0) = session();
        send(&mut session, reply("abcdef", false), t0);
        send(&mut session, reply("ghi", false), t0 + ms(20));
        assert_eq!(
            session.timer_deadline(TimerKind::Pacer(StreamKind::Reply)),
            Some(t0 + ms(30))
        );
    }

    #[test]
    fn test_transition_policy_parse() {
        assert_eq!(TransitionPolicy::parse("LATEST"), Some(TransitionPolicy::Latest));
        assert_eq!(TransitionPolicy::parse("drop"), Some(TransitionPolicy::Drop));
        assert_eq!(TransitionPolicy::parse("queue"), None);
    }
}
