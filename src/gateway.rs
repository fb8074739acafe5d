//! The Speech Request Gateway.
//!
//! Owns the [`BackendState`] decided at startup and turns validated requests
//! into exactly one [`AudioResponse`] or one [`GatewayError`]:
//!
//! 1. **Degraded mode**: with no backend, any non-empty text gets the
//!    canonical silent WAV with a success status.
//! 2. **Validation**: blank / oversized text and non-positive speed are
//!    rejected before the backend is touched.
//! 3. **Speaker lookup**: unknown languages are rejected without touching
//!    the backend.
//! 4. **Admission**: at most `queue_depth` calls are admitted (running plus
//!    waiting); the rest get [`GatewayError::Busy`] immediately.
//! 5. **Execution**: on a blocking worker, under a single global lock, into
//!    a per-request scratch directory that is removed on every exit path.

use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::{
    backend::{BackendState, SynthesisBackend},
    error::{GatewayError, SYNTHESIS_FAILED_MESSAGE},
    scratch::{self, ScratchFile},
    speakers::SpeakerId,
    wav,
};

pub const DEFAULT_SPEED: f32 = 1.0;

// ─────────────────────────────────────────────────────────────────────────────
// Request / response types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub language: String,
    pub speed: f32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioResponse {
    pub bytes: Vec<u8>,
    pub media_type: &'static str,
    /// `true` for the silent fallback served in degraded mode.
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub model_id: String,
    pub model_name: String,
    pub description: String,
    pub supported_languages: Vec<String>,
    pub speaker_ids: Vec<SpeakerId>,
    pub input_format: String,
    pub output_format: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    pub service_name: &'static str,
    pub status: &'static str,
    pub provider: String,
    pub model: String,
    pub version: &'static str,
    pub queue_depth: usize,
    pub in_flight: usize,
    pub scratch_directory: String,
    pub scratch_directory_exists: bool,
    pub scratch_entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Static gateway settings, usually built from
/// [`GatewayConfig`](crate::config::GatewayConfig).
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub model_id: String,
    pub model_name: String,
    pub model_description: String,
    pub default_language: String,
    pub queue_depth: usize,
    pub max_text_chars: usize,
    pub scratch_root: PathBuf,
    pub expose_error_detail: bool,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            model_id: "melotts".to_string(),
            model_name: "MeloTTS".to_string(),
            model_description: "MeloTTS text-to-speech model".to_string(),
            default_language: "ZH".to_string(),
            queue_depth: 8,
            max_text_chars: 5_000,
            scratch_root: std::env::temp_dir().join("tts-gateway"),
            expose_error_detail: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Gateway
// ─────────────────────────────────────────────────────────────────────────────

pub struct Gateway {
    backend: BackendState,
    options: GatewayOptions,
    /// Serialises every call into the backend.
    synth_lock: Arc<Mutex<()>>,
    /// Admission slots: running + waiting synthesis calls.
    queue: Arc<Semaphore>,
    /// Number of admission slots actually created (at least one).
    queue_depth: usize,
}

impl Gateway {
    pub fn new(backend: BackendState, options: GatewayOptions) -> Self {
        let queue_depth = options.queue_depth.max(1);
        Self {
            backend,
            options,
            synth_lock: Arc::new(Mutex::new(())),
            queue: Arc::new(Semaphore::new(queue_depth)),
            queue_depth,
        }
    }

    pub fn backend(&self) -> &BackendState {
        &self.backend
    }

    pub fn options(&self) -> &GatewayOptions {
        &self.options
    }

    /// Build a request, filling in defaults for the optional fields.
    pub fn request(
        &self,
        text: String,
        language: Option<String>,
        speed: Option<f32>,
    ) -> SynthesisRequest {
        SynthesisRequest {
            text,
            language: language
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| self.options.default_language.clone()),
            speed: speed.unwrap_or(DEFAULT_SPEED),
        }
    }

    fn validate(&self, req: &SynthesisRequest) -> Result<(), GatewayError> {
        if req.text.trim().is_empty() {
            return Err(GatewayError::InvalidInput("text must not be empty".to_string()));
        }
        let chars = req.text.chars().count();
        if chars > self.options.max_text_chars {
            return Err(GatewayError::InvalidInput(format!(
                "text is too long ({chars} characters, limit {})",
                self.options.max_text_chars
            )));
        }
        if !req.speed.is_finite() || req.speed <= 0.0 {
            return Err(GatewayError::InvalidInput(format!(
                "speed must be a positive number, got {}",
                req.speed
            )));
        }
        Ok(())
    }

    /// Log `detail` and return the client-facing synthesis error.
    fn synthesis_failed(&self, detail: String) -> GatewayError {
        tracing::error!(%detail, "synthesis failed");
        if self.options.expose_error_detail {
            GatewayError::SynthesisFailed(detail)
        } else {
            GatewayError::SynthesisFailed(SYNTHESIS_FAILED_MESSAGE.to_string())
        }
    }

    pub async fn synthesize(&self, req: SynthesisRequest) -> Result<AudioResponse, GatewayError> {
        if req.text.is_empty() {
            return Err(GatewayError::InvalidInput("text must not be empty".to_string()));
        }

        let backend = match &self.backend {
            BackendState::Ready(backend) => Arc::clone(backend),
            BackendState::Unavailable { .. } => {
                tracing::warn!(
                    chars = req.text.chars().count(),
                    "backend unavailable, answering with silent audio"
                );
                return Ok(AudioResponse {
                    bytes: wav::silent_wav().to_vec(),
                    media_type: wav::MEDIA_TYPE,
                    degraded: true,
                });
            }
        };

        self.validate(&req)?;

        let speaker = backend
            .speakers()
            .get(&req.language)
            .ok_or_else(|| GatewayError::InvalidLanguage(req.language.clone()))?;

        let permit = Arc::clone(&self.queue).try_acquire_owned().map_err(|_| {
            tracing::warn!(queue_depth = self.queue_depth, "synthesis queue full");
            GatewayError::Busy
        })?;

        let lock = Arc::clone(&self.synth_lock);
        let scratch_root = self.options.scratch_root.clone();

        // The worker keeps the permit until the backend call really ends, even
        // if this future is dropped because the client went away.
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            run_backend(backend.as_ref(), &scratch_root, &req, speaker)
        });

        match task.await {
            Ok(Ok(bytes)) => Ok(AudioResponse { bytes, media_type: wav::MEDIA_TYPE, degraded: false }),
            Ok(Err(detail)) => Err(self.synthesis_failed(detail)),
            Err(join) => Err(self.synthesis_failed(format!("synthesis worker aborted: {join}"))),
        }
    }

    /// Fixed descriptor for the configured model id.
    pub fn describe_model(&self, model_id: &str) -> Result<ModelDescriptor, GatewayError> {
        if model_id != self.options.model_id {
            return Err(GatewayError::ModelNotFound(model_id.to_string()));
        }
        let (supported_languages, speaker_ids) = match self.backend.backend() {
            Some(b) => (b.speakers().languages(), b.speakers().speaker_ids()),
            None => (Vec::new(), Vec::new()),
        };
        Ok(ModelDescriptor {
            model_id: self.options.model_id.clone(),
            model_name: self.options.model_name.clone(),
            description: self.options.model_description.clone(),
            supported_languages,
            speaker_ids,
            input_format: "text".to_string(),
            output_format: "audio".to_string(),
        })
    }

    pub fn status(&self) -> GatewayStatus {
        let root = &self.options.scratch_root;
        let (status, provider, reason) = match &self.backend {
            BackendState::Ready(b) => ("ready", b.provider().to_string(), None),
            BackendState::Unavailable { reason } => (
                "degraded",
                "none".to_string(),
                self.options.expose_error_detail.then(|| reason.clone()),
            ),
        };
        GatewayStatus {
            service_name: "speech-gateway",
            status,
            provider,
            model: self.options.model_id.clone(),
            version: env!("CARGO_PKG_VERSION"),
            queue_depth: self.queue_depth,
            in_flight: self.queue_depth.saturating_sub(self.queue.available_permits()),
            scratch_directory: root.display().to_string(),
            scratch_directory_exists: root.is_dir(),
            scratch_entries: scratch::count_entries(root),
            reason,
        }
    }
}

/// One backend call inside a scratch directory.  Runs on a blocking thread
/// with the synthesis lock held; errors come back as internal detail text.
fn run_backend(
    backend: &dyn SynthesisBackend,
    scratch_root: &std::path::Path,
    req: &SynthesisRequest,
    speaker: SpeakerId,
) -> Result<Vec<u8>, String> {
    let scratch = ScratchFile::create(scratch_root).map_err(|e| format!("{e:#}"))?;

    tracing::info!(
        language = %req.language,
        speaker,
        speed = req.speed,
        chars = req.text.chars().count(),
        "synthesising"
    );
    let started = std::time::Instant::now();

    backend
        .synthesize_to_file(&req.text, speaker, req.speed, scratch.output_path())
        .map_err(|e| format!("backend error: {e:#}"))?;

    let bytes = scratch
        .read_back()
        .map_err(|e| format!("{e:#}"))?
        .ok_or_else(|| "backend produced no output file".to_string())?;
    let spec = wav::inspect(&bytes).map_err(|e| format!("backend output rejected: {e:#}"))?;
    scratch.release();

    tracing::info!(
        bytes = bytes.len(),
        sample_rate = spec.sample_rate,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "synthesis finished"
    );
    Ok(bytes)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
