//! Presenter Seam
//!
//! The session never renders anything. It reports every visible change
//! through [`Presenter`], and whatever sits behind it (a GUI, a log, a
//! test recorder) draws it.
//!
//! Calls are made from the session task. Implementations must return
//! quickly; anything slow belongs on the far side of a channel, which is
//! what [`ChannelPresenter`] is for.
//!
//! User input travels the other way through
//! [`SessionHandle::user_interaction`](crate::SessionHandle::user_interaction).

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::blink::BlinkPhase;
use crate::expression::ExpressionState;

/// Receiver of visible changes
pub trait Presenter {
    /// The face now shows `state`
    fn on_expression_changed(&mut self, state: ExpressionState);

    /// The eyes moved to `phase`
    fn on_blink_phase(&mut self, phase: BlinkPhase);

    /// Full transcript text to display
    fn on_transcript_updated(&mut self, text: &str);

    /// Full reply text to display
    fn on_reply_text_updated(&mut self, text: &str);
}

impl<P: Presenter + ?Sized> Presenter for Box<P> {
    fn on_expression_changed(&mut self, state: ExpressionState) {
        (**self).on_expression_changed(state);
    }

    fn on_blink_phase(&mut self, phase: BlinkPhase) {
        (**self).on_blink_phase(phase);
    }

    fn on_transcript_updated(&mut self, text: &str) {
        (**self).on_transcript_updated(text);
    }

    fn on_reply_text_updated(&mut self, text: &str) {
        (**self).on_reply_text_updated(text);
    }
}

/// One presenter call as data
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PresenterEvent {
    /// See [`Presenter::on_expression_changed`]
    ExpressionChanged {
        /// New state
        state: ExpressionState,
    },
    /// See [`Presenter::on_blink_phase`]
    BlinkPhase {
        /// New phase
        phase: BlinkPhase,
    },
    /// See [`Presenter::on_transcript_updated`]
    TranscriptUpdated {
        /// Displayed transcript
        text: String,
    },
    /// See [`Presenter::on_reply_text_updated`]
    ReplyTextUpdated {
        /// Displayed reply
        text: String,
    },
}

/// Default queue depth for [`ChannelPresenter`]
pub const DEFAULT_PRESENTER_CAPACITY: usize = 1024;

/// Forwards every call as a [`PresenterEvent`] on a bounded channel
///
/// The session never waits on the consumer. When the queue is full the
/// event is dropped with a warning; once the receiver is gone events are
/// dropped quietly.
#[derive(Debug, Clone)]
pub struct ChannelPresenter {
    tx: mpsc::Sender<PresenterEvent>,
    dropped: u64,
}

impl ChannelPresenter {
    /// Create a presenter with [`DEFAULT_PRESENTER_CAPACITY`]
    #[must_use]
    pub fn new() -> (Self, mpsc::Receiver<PresenterEvent>) {
        Self::with_capacity(DEFAULT_PRESENTER_CAPACITY)
    }

    /// Create a presenter that queues at most `capacity` events
    #[must_use]
    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<PresenterEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, dropped: 0 }, rx)
    }

    /// Events dropped because the queue was full
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn send(&mut self, event: PresenterEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.dropped += 1;
                warn!(
                    ?event,
                    dropped = self.dropped,
                    "Presenter queue full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Presenter receiver closed, dropping event");
            }
        }
    }
}

impl Presenter for ChannelPresenter {
    fn on_expression_changed(&mut self, state: ExpressionState) {
        self.send(PresenterEvent::ExpressionChanged { state });
    }

    fn on_blink_phase(&mut self, phase: BlinkPhase) {
        self.send(PresenterEvent::BlinkPhase { phase });
    }

    fn on_transcript_updated(&mut self, text: &str) {
        self.send(PresenterEvent::TranscriptUpdated {
            text: text.to_string(),
        });
    }

    fn on_reply_text_updated(&mut self, text: &str) {
        self.send(PresenterEvent::ReplyTextUpdated {
            text: text.to_string(),
        });
    }
}

/// Logs every call with `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPresenter;

impl Presenter for LogPresenter {
    fn on_expression_changed(&mut self, state: ExpressionState) {
        info!(%state, "Expression changed");
    }

    fn on_blink_phase(&mut self, phase: BlinkPhase) {
        debug!(?phase, "Blink phase");
    }

    fn on_transcript_updated(&mut self, text: &str) {
        info!(text, "Transcript updated");
    }

    fn on_reply_text_updated(&mut self, text: &str) {
        debug!(text, "Reply updated");
    }
}

/// A recorded call with the instant it happened
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recorded {
    /// When the call was made
    pub at: Instant,
    /// What was presented
    pub event: PresenterEvent,
}

/// Keeps every call in memory
#[derive(Debug, Default, Clone)]
pub struct RecordingPresenter {
    records: Vec<Recorded>,
}

impl RecordingPresenter {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call, oldest first
    #[must_use]
    pub fn records(&self) -> &[Recorded] {
        &self.records
    }

    /// Every event, oldest first
    #[must_use]
    pub fn events(&self) -> Vec<PresenterEvent> {
        self.records.iter().map(|r| r.event.clone()).collect()
    }

    /// States passed to `on_expression_changed`
    #[must_use]
    pub fn expressions(&self) -> Vec<ExpressionState> {
        self.records
            .iter()
            .filter_map(|r| match r.event {
                PresenterEvent::ExpressionChanged { state } => Some(state),
                _ => None,
            })
            .collect()
    }

    /// Phases passed to `on_blink_phase`
    #[must_use]
    pub fn blink_phases(&self) -> Vec<BlinkPhase> {
        self.records
            .iter()
            .filter_map(|r| match r.event {
                PresenterEvent::BlinkPhase { phase } => Some(phase),
                _ => None,
            })
            .collect()
    }

    /// Texts passed to `on_transcript_updated`
    #[must_use]
    pub fn transcripts(&self) -> Vec<String> {
        self.records
            .iter()
            .filter_map(|r| match &r.event {
                PresenterEvent::TranscriptUpdated { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Texts passed to `on_reply_text_updated`
    #[must_use]
    pub fn replies(&self) -> Vec<String> {
        self.records
            .iter()
            .filter_map(|r| match &r.event {
                PresenterEvent::ReplyTextUpdated { text } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forget everything recorded so far
    pub fn clear(&mut self) {
        self.records.clear();
    }

    fn record(&mut self, event: PresenterEvent) {
        self.records.push(Recorded {
            at: Instant::now(),
            event,
        });
    }
}

impl Presenter for RecordingPresenter {
    fn on_expression_changed(&mut self, state: ExpressionState) {
        self.record(PresenterEvent::ExpressionChanged { state });
    }

    fn on_blink_phase(&mut self, phase: BlinkPhase) {
        self.record(PresenterEvent::BlinkPhase { phase });
    }

    fn on_transcript_updated(&mut self, text: &str) {
        self.record(PresenterEvent::TranscriptUpdated {
            text: text.to_string(),
        });
    }

    fn on_reply_text_updated(&mut self, text: &str) {
        self.record(PresenterEvent::ReplyTextUpdated {
            text: text.to_string(),
        });
    }
}
