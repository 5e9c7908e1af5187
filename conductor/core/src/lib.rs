//! Face Conductor - Headless Session Controller for the Robot Face
//!
//! This crate owns everything the face does between "a line arrived on the
//! socket" and "the renderer was told what to draw": which expression is
//! showing, when the eyes blink, and how fast transcript and reply text is
//! revealed. It draws nothing itself; a [`Presenter`] does.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  Upstream (ASR / LLM / emotion)               │
//! │            newline-delimited JSON over TCP or a socket        │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │
//! ┌──────────────────────────────┼───────────────────────────────┐
//! │                      FACE CONDUCTOR                          │
//! │  ┌───────────┐  ┌────────────┴─┐  ┌────────────────────────┐ │
//! │  │ Transport │─►│   Protocol   │─►│   Conductor (1 task)   │ │
//! │  │ acceptors │  │ line decoder │  │  ┌──────────────────┐  │ │
//! │  └───────────┘  └──────────────┘  │  │     Session      │  │ │
//! │                                   │  │ expression/blink │  │ │
//! │                                   │  │ pacers/timers    │  │ │
//! │                                   │  └────────┬─────────┘  │ │
//! │                                   └───────────┼────────────┘ │
//! └───────────────────────────────────────────────┼──────────────┘
//!                                                 │
//!                                           Presenter (UI)
//! ```
//!
//! # Key Types
//!
//! - [`Conductor`]: Runs the session on its own task
//! - [`SessionHandle`]: Cloneable handle used by connections and the UI
//! - [`Session`]: The state machine itself, driven by explicit instants
//! - [`InboundMessage`]: One decoded upstream line
//! - [`Presenter`]: Where visible changes go
//!
//! # Quick Start
//!
//! ```ignore
//! use face_conductor::{
//!     transport, Conductor, ConductorConfig, LogPresenter,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (handle, _task) = Conductor::spawn(ConductorConfig::default(), LogPresenter);
//!
//!     let config = transport::TransportConfig::default();
//!     let mut acceptor = transport::bind(&config).await?;
//!     loop {
//!         let accepted = acceptor.accept().await?;
//!         let handle = handle.clone();
//!         tokio::spawn(async move {
//!             transport::serve_connection(
//!                 &accepted.conn_id,
//!                 accepted.reader,
//!                 &handle,
//!                 config.max_line_bytes,
//!             )
//!             .await
//!         });
//!     }
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`expression`]: Expression states and emotion commands
//! - [`protocol`]: Line framing and message decoding
//! - [`timers`]: Deadline bookkeeping with cancellation
//! - [`blink`]: Blink animation sequencing
//! - [`streaming`]: Paced text reveal for transcript and reply
//! - [`presenter`]: The output seam
//! - [`session`]: The session state machine
//! - [`conductor`]: The session task and its handle
//! - [`transport`]: TCP and Unix socket listeners
//! - [`config`]: TOML, environment and CLI configuration
//!
//! # No UI Dependencies
//!
//! This crate has **zero** dependencies on any UI framework. It's pure
//! behavior that can sit behind a GUI, a log, or a test recorder.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod blink;
pub mod conductor;
pub mod config;
pub mod expression;
pub mod presenter;
pub mod protocol;
pub mod session;
pub mod streaming;
pub mod timers;
pub mod transport;

// Re-exports for convenience
pub use blink::{BlinkAnimator, BlinkConfig, BlinkKind, BlinkPhase, BlinkStep};
pub use conductor::{
    Conductor, ConductorConfig, SessionError, SessionHandle, SessionInput, DEFAULT_INBOX_CAPACITY,
};
pub use expression::{EmotionCommand, ExpressionState};
pub use presenter::{
    ChannelPresenter, LogPresenter, Presenter, PresenterEvent, Recorded, RecordingPresenter,
    DEFAULT_PRESENTER_CAPACITY,
};
pub use protocol::{decode_line, DecodeError, InboundMessage, LineDecoder, LineError, TextChunk};
pub use session::{
    ChannelSnapshot, Session, SessionConfig, SessionSnapshot, SessionStats, TransitionOrigin,
    TransitionPolicy,
};
pub use streaming::{ChunkOutcome, PacerConfig, RevealMode, StreamChannel, StreamKind, StreamStats};
pub use timers::{Expired, TimerKind, TimerWheel};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, load_config_with_env, ConfigError,
    ConfigOverrides, ConfigSource, FaceConfig, FaceToml,
};
