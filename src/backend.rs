//! Synthesis backend interface and its one-shot lifecycle.
//!
//! ```text
//! Uninitialized ──(load attempt)──▶ Ready(backend)
//!                        └────────▶ Unavailable { reason }
//! ```
//!
//! Both outcomes are terminal for the lifetime of the process.  A failed (or
//! panicking) load never propagates: it only moves the gateway into degraded
//! mode.

use std::{
    panic::{self, AssertUnwindSafe},
    path::Path,
    sync::Arc,
};

use anyhow::Result;

use crate::speakers::{SpeakerId, SpeakerTable};

/// An opaque text-to-speech engine.
///
/// Implementations are **not** assumed to tolerate concurrent
/// [`synthesize_to_file`](Self::synthesize_to_file) calls; the gateway
/// serialises them.
pub trait SynthesisBackend: Send + Sync {
    /// Short provider name, reported by the status endpoint.
    fn provider(&self) -> &str;

    /// The speaker table, fixed after load.
    fn speakers(&self) -> &SpeakerTable;

    /// Synthesise `text` with `speaker` at `speed` and write a WAV file to
    /// `output`.  May block for a long time.
    fn synthesize_to_file(
        &self,
        text: &str,
        speaker: SpeakerId,
        speed: f32,
        output: &Path,
    ) -> Result<()>;
}

/// Lifecycle state of the gateway's backend, decided once at startup.
#[derive(Clone)]
pub enum BackendState {
    Ready(Arc<dyn SynthesisBackend>),
    Unavailable { reason: String },
}

impl BackendState {
    /// Run `load` exactly once and record the outcome.
    ///
    /// Errors and panics both end in [`BackendState::Unavailable`].
    pub fn acquire<F>(load: F) -> Self
    where
        F: FnOnce() -> Result<Arc<dyn SynthesisBackend>>,
    {
        match panic::catch_unwind(AssertUnwindSafe(load)) {
            Ok(Ok(backend)) => {
                tracing::info!(
                    provider = backend.provider(),
                    speakers = backend.speakers().len(),
                    "synthesis backend ready"
                );
                Self::Ready(backend)
            }
            Ok(Err(e)) => {
                let reason = format!("{e:#}");
                tracing::warn!(%reason, "synthesis backend failed to load, serving in degraded mode");
                Self::Unavailable { reason }
            }
            Err(payload) => {
                let reason = match payload.downcast_ref::<&str>() {
                    Some(s) => format!("backend loader panicked: {s}"),
                    None => match payload.downcast_ref::<String>() {
                        Some(s) => format!("backend loader panicked: {s}"),
                        None => "backend loader panicked".to_string(),
                    },
                };
                tracing::warn!(%reason, "synthesis backend failed to load, serving in degraded mode");
                Self::Unavailable { reason }
            }
        }
    }

    /// Record that no load was attempted.
    pub fn skipped(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        tracing::warn!(%reason, "synthesis backend skipped, serving in degraded mode");
        Self::Unavailable { reason }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn backend(&self) -> Option<&Arc<dyn SynthesisBackend>> {
        match self {
            Self::Ready(b) => Some(b),
            Self::Unavailable { .. } => None,
        }
    }
}

impl std::fmt::Debug for BackendState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(b) => f.debug_tuple("Ready").field(&b.provider()).finish(),
            Self::Unavailable { reason } => {
                f.debug_struct("Unavailable").field("reason", reason).finish()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(SpeakerTable);

    impl SynthesisBackend for Fixed {
        fn provider(&self) -> &str {
            "fixed"
        }
        fn speakers(&self) -> &SpeakerTable {
            &self.0
        }
        fn synthesize_to_file(&self, _: &str, _: SpeakerId, _: f32, _: &Path) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_acquire_ready() {
        let state = BackendState::acquire(|| {
            Ok(Arc::new(Fixed(SpeakerTable::new([("ZH".into(), 1)]))) as Arc<dyn SynthesisBackend>)
        });
        assert!(state.is_ready());
        assert_eq!(state.backend().unwrap().speakers().get("ZH"), Some(1));
    }

    #[test]
    fn test_acquire_error_degrades() {
        let state = BackendState::acquire(|| anyhow::bail!("model weights missing"));
        match state {
            BackendState::Unavailable { reason } => assert!(reason.contains("model weights missing")),
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[test]
    fn test_acquire_panic_degrades() {
        let state = BackendState::acquire(|| panic!("incompatible runtime"));
        match state {
            BackendState::Unavailable { reason } => assert!(reason.contains("incompatible runtime")),
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[test]
    fn test_skipped() {
        let state = BackendState::skipped("no backend configured");
        assert!(!state.is_ready());
        assert!(state.backend().is_none());
    }
}
