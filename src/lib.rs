//! # speech-gateway
//!
//! A small HTTP gateway in front of an opaque text-to-speech backend.
//!
//! The gateway owns everything *around* synthesis: startup configuration,
//! request validation, serialised access to a backend that is not safe for
//! concurrent use, per-request scratch files, and a degraded mode that keeps
//! the HTTP surface answering (with one second of silence) when the model
//! could not be loaded.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use speech_gateway::{BackendState, Gateway, GatewayOptions};
//!
//! # async fn run() -> anyhow::Result<()> {
//! // No backend: every request is answered with the canonical silent WAV.
//! let gateway = Gateway::new(BackendState::skipped("no backend"), GatewayOptions::default());
//! speech_gateway::server::serve("0.0.0.0:8001".parse()?, Arc::new(gateway)).await
//! # }
//! ```
//!
//! ## Request pipeline
//! 1. **Degraded mode**: no backend → canonical silent WAV, status 200,
//!    for any non-empty text.
//! 2. **Validation**: text must be non-blank and within the length limit;
//!    speed must be a positive number.
//! 3. **Speaker lookup**: requested language → speaker id, else 400.
//! 4. **Admission**: bounded queue, 503 when full.
//! 5. **Synthesis**: one call at a time, output into a scratch directory
//!    that is removed on every exit path.
//! 6. **Read-back**: output must be a readable WAV, else 500.

pub mod backend;
pub mod command;
pub mod config;
pub mod dictfix;
pub mod error;
pub mod gateway;
pub mod scratch;
pub mod server;
pub mod speakers;
pub mod wav;

// Speaker tables from a HuggingFace-compatible hub (or a mirror).
#[cfg(feature = "hub")]
pub mod download;

// ─── Re-exports for convenience ─────────────────────────────────────────────

pub use backend::{BackendState, SynthesisBackend};
pub use error::GatewayError;
pub use gateway::{AudioResponse, Gateway, GatewayOptions, ModelDescriptor, SynthesisRequest};
pub use speakers::{SpeakerId, SpeakerTable};
