//! Streaming Text Pacer
//!
//! The transcript and the reply arrive in arbitrary chunks. Each has its own
//! [`StreamChannel`] which buffers the chunks and reveals them at a steady
//! rate, producing the "typing" effect.
//!
//! # Architecture
//!
//! ```text
//!  TextChunk ──► on_chunk() ──► pending ──► tick() every 30ms ──► displayed
//!                   │                        (3 chars/tick)          │
//!                   └── reset if finished ──┘                        ▼
//!                                                    Presenter::on_*_updated
//! ```
//!
//! # Features
//!
//! - **Character-based**: reveal never splits a code point
//! - **Bounded**: pending text is capped; excess is dropped with a warning
//! - **Reset on new message**: text after `isFinal` never joins the old one
//! - **Timer-free**: channels are plain data; the session owns the tick timer

mod channel;

pub use channel::{
    ChunkOutcome, PacerConfig, RevealMode, StreamChannel, StreamKind, StreamStats,
};
