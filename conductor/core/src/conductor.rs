//! Conductor - The Session Task
//!
//! The Conductor runs one [`Session`] on its own tokio task and is the only
//! code that ever touches it. Everything else talks to it through a
//! cloneable [`SessionHandle`].
//!
//! # Design Philosophy
//!
//! Connections come and go in parallel, timers fire at any moment, and the
//! presenter side can report a tap at any time. Funnelling all of that into
//! one task means state transitions never interleave:
//!
//! ```text
//!  connection A ─┐
//!  connection B ─┼─► mpsc inbox ─┐
//!  UI taps      ─┘               ├─► select! ─► Session ─► Presenter
//!  next timer deadline ──────────┘
//! ```
//!
//! When an input and a timer are due together the input goes first, so a
//! command always beats an auto-revert scheduled for the same instant.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use crate::presenter::Presenter;
use crate::protocol::InboundMessage;
use crate::session::{Session, SessionConfig, SessionSnapshot};

/// Default inbox capacity
pub const DEFAULT_INBOX_CAPACITY: usize = 256;

/// Conductor configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConductorConfig {
    /// Session behavior
    pub session: SessionConfig,
    /// Inputs buffered before senders wait
    pub inbox_capacity: usize,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            inbox_capacity: DEFAULT_INBOX_CAPACITY,
        }
    }
}

/// Errors from talking to the session task
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    /// The session task has stopped
    #[error("Session has shut down")]
    Closed,
}

/// Inputs accepted by the session task
#[derive(Debug)]
pub enum SessionInput {
    /// A decoded line from a connection
    Message(InboundMessage),
    /// The user touched the device
    UserInteraction,
    /// Request a snapshot of the current state
    Snapshot(oneshot::Sender<SessionSnapshot>),
    /// Stop the task
    Shutdown,
}

/// Cloneable sender side of the session task
#[derive(Clone, Debug)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionInput>,
}

impl SessionHandle {
    /// Send a decoded message
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` if the session task has stopped.
    pub async fn dispatch(&self, message: InboundMessage) -> Result<(), SessionError> {
        self.send(SessionInput::Message(message)).await
    }

    /// Report a user interaction (resets the idle timer)
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` if the session task has stopped.
    pub async fn user_interaction(&self) -> Result<(), SessionError> {
        self.send(SessionInput::UserInteraction).await
    }

    /// Fetch a snapshot of the session
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` if the session task has stopped.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SessionInput::Snapshot(reply_tx)).await?;
        reply_rx.await.map_err(|_| SessionError::Closed)
    }

    /// Ask the session task to stop
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` if it already stopped.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.send(SessionInput::Shutdown).await
    }

    /// Whether the session task has stopped
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, input: SessionInput) -> Result<(), SessionError> {
        self.tx.send(input).await.map_err(|_| SessionError::Closed)
    }
}

/// The session task
pub struct Conductor<P> {
    session: Session<P>,
    inbox: mpsc::Receiver<SessionInput>,
}

impl<P> std::fmt::Debug for Conductor<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conductor")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl<P: Presenter + Send + 'static> Conductor<P> {
    /// Create a conductor and its handle without starting it
    pub fn new(config: ConductorConfig, presenter: P) -> (Self, SessionHandle) {
        let (tx, inbox) = mpsc::channel(config.inbox_capacity.max(1));
        let session = Session::new(config.session, presenter, Instant::now());
        (Self { session, inbox }, SessionHandle { tx })
    }

    /// Create a conductor and run it on a new task
    ///
    /// The task ends on [`SessionHandle::shutdown`] or once every handle is
    /// dropped, and yields the presenter back.
    pub fn spawn(config: ConductorConfig, presenter: P) -> (SessionHandle, JoinHandle<P>) {
        let (conductor, handle) = Self::new(config, presenter);
        (handle, tokio::spawn(conductor.run()))
    }

    /// Run until shutdown
    pub async fn run(mut self) -> P {
        info!("Session started");
        loop {
            let deadline = self.session.next_deadline();
            tokio::select! {
                biased;

                input = self.inbox.recv() => {
                    let Some(input) = input else {
                        debug!("All session handles dropped");
                        break;
                    };
                    if !self.handle_input(input) {
                        break;
                    }
                }

                () = wait_until(deadline) => {
                    self.session.advance(Instant::now());
                }
            }
        }
        info!(state = %self.session.expression(), "Session stopped");
        self.session.into_presenter()
    }

    /// Apply one input; returns false on shutdown
    fn handle_input(&mut self, input: SessionInput) -> bool {
        let now = Instant::now();
        match input {
            SessionInput::Message(message) => {
                self.session.settle(now);
                self.session.handle_message(message, now);
            }
            SessionInput::UserInteraction => {
                self.session.settle(now);
                self.session.user_interaction(now);
            }
            SessionInput::Snapshot(reply) => {
                self.session.advance(now);
                // Requester may have given up
                let _ = reply.send(self.session.snapshot());
            }
            SessionInput::Shutdown => return false,
        }
        true
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
