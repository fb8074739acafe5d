//! Named configuration options.
//!
//! Every option is a CLI flag with an environment-variable fallback, so the
//! same binary can be driven from a shell, a container `ENV` block, or a
//! systemd unit.  Network mirrors, CPU-only execution and the TLS bypass are
//! not used by the gateway itself; they are forwarded to the backend process,
//! which performs its own first-run asset downloads.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{builder::BoolishValueParser, Args};

use crate::gateway::GatewayOptions;

pub const DEFAULT_BACKEND_ARGS: &[&str] =
    &["--speaker", "{speaker}", "--speed", "{speed}", "--output", "{output}"];

#[derive(Debug, Clone, Args)]
pub struct GatewayConfig {
    /// Interface to bind the HTTP server to
    #[arg(long, env = "TTS_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "TTS_PORT", default_value_t = 8001)]
    pub port: u16,

    // ── Backend ──────────────────────────────────────────────────────────────
    /// Synthesiser program run once per request.  Unset → degraded mode.
    #[arg(long, env = "TTS_BACKEND_PROGRAM")]
    pub backend_program: Option<PathBuf>,

    /// Argument template; `{speaker}`, `{speed}` and `{output}` are substituted
    #[arg(
        long = "backend-arg",
        env = "TTS_BACKEND_ARGS",
        value_delimiter = ' ',
        allow_hyphen_values = true
    )]
    pub backend_args: Vec<String>,

    /// Extra `KEY=VALUE` environment entries for the backend process
    #[arg(long = "backend-env", env = "TTS_BACKEND_ENV", value_delimiter = ',')]
    pub backend_env: Vec<String>,

    /// Local model config.json holding the speaker table
    #[arg(long, env = "TTS_SPEAKERS")]
    pub speakers: Option<PathBuf>,

    /// Hub repository whose config.json holds the speaker table
    #[arg(long, env = "TTS_MODEL_REPO")]
    pub model_repo: Option<String>,

    // ── Network / runtime environment ────────────────────────────────────────
    /// Mirror of the model hub, e.g. https://hf-mirror.com
    #[arg(long, env = "HF_ENDPOINT")]
    pub hub_endpoint: Option<String>,

    /// Package index mirror for the backend's first-run installs
    #[arg(long, env = "TTS_PACKAGE_INDEX")]
    pub package_index: Option<String>,

    /// HTTP(S) proxy for the backend's downloads
    #[arg(long, env = "TTS_PROXY")]
    pub proxy: Option<String>,

    /// Hide every GPU from the backend
    #[arg(long, env = "TTS_FORCE_CPU", value_parser = BoolishValueParser::new())]
    pub force_cpu: bool,

    /// Disable TLS certificate verification in the backend process.
    /// Only for constrained local setups behind intercepting proxies.
    #[arg(
        long,
        env = "TTS_INSECURE_SKIP_TLS_VERIFY",
        value_parser = BoolishValueParser::new()
    )]
    pub insecure_skip_tls_verify: bool,

    // ── Model descriptor ─────────────────────────────────────────────────────
    #[arg(long, env = "TTS_MODEL_ID", default_value = "melotts")]
    pub model_id: String,

    #[arg(long, env = "TTS_MODEL_NAME", default_value = "MeloTTS")]
    pub model_name: String,

    #[arg(long, env = "TTS_MODEL_DESCRIPTION", default_value = "MeloTTS text-to-speech model")]
    pub model_description: String,

    // ── Request handling ─────────────────────────────────────────────────────
    /// Language used when a request does not name one
    #[arg(long, env = "TTS_DEFAULT_LANGUAGE", default_value = "ZH")]
    pub default_language: String,

    /// Synthesis requests admitted at once (running + waiting)
    #[arg(long, env = "TTS_QUEUE_DEPTH", default_value_t = 8)]
    pub queue_depth: usize,

    #[arg(long, env = "TTS_MAX_TEXT_CHARS", default_value_t = 5000)]
    pub max_text_chars: usize,

    /// Directory for per-request backend output
    #[arg(long, env = "TTS_SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Scratch entries older than this are removed at startup
    #[arg(long, env = "TTS_SCRATCH_MAX_AGE_SECS", default_value_t = 3600)]
    pub scratch_max_age_secs: u64,

    /// Echo internal failure text to clients (development builds only)
    #[arg(
        long,
        env = "TTS_EXPOSE_ERROR_DETAIL",
        value_parser = BoolishValueParser::new()
    )]
    pub expose_error_detail: bool,
}

impl GatewayConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("tts-gateway"))
    }

    pub fn scratch_max_age(&self) -> Duration {
        Duration::from_secs(self.scratch_max_age_secs)
    }

    /// The argument template, falling back to [`DEFAULT_BACKEND_ARGS`].
    pub fn backend_args(&self) -> Vec<String> {
        let args: Vec<String> =
            self.backend_args.iter().filter(|a| !a.is_empty()).cloned().collect();
        if args.is_empty() {
            DEFAULT_BACKEND_ARGS.iter().map(|s| s.to_string()).collect()
        } else {
            args
        }
    }

    /// Environment handed to the backend process.
    pub fn backend_env(&self) -> Result<Vec<(String, String)>> {
        let mut env = Vec::new();
        if let Some(endpoint) = &self.hub_endpoint {
            env.push(("HF_ENDPOINT".to_string(), endpoint.clone()));
        }
        if let Some(index) = &self.package_index {
            env.push(("PIP_INDEX_URL".to_string(), index.clone()));
        }
        if let Some(proxy) = &self.proxy {
            env.push(("HTTP_PROXY".to_string(), proxy.clone()));
            env.push(("HTTPS_PROXY".to_string(), proxy.clone()));
        }
        if self.force_cpu {
            env.push(("CUDA_VISIBLE_DEVICES".to_string(), String::new()));
            env.push(("FORCE_CPU".to_string(), "1".to_string()));
            env.push(("PYTORCH_ENABLE_MPS_FALLBACK".to_string(), "1".to_string()));
        }
        if self.insecure_skip_tls_verify {
            tracing::warn!(
                "TLS certificate verification is disabled for the backend process; \
                 downloads can be intercepted"
            );
            env.push(("PYTHONHTTPSVERIFY".to_string(), "0".to_string()));
            env.push(("CURL_CA_BUNDLE".to_string(), String::new()));
            env.push(("REQUESTS_CA_BUNDLE".to_string(), String::new()));
        }
        for entry in self.backend_env.iter().filter(|e| !e.is_empty()) {
            let (key, value) = entry
                .split_once('=')
                .with_context(|| format!("Backend env entry '{entry}' is not KEY=VALUE"))?;
            env.push((key.trim().to_string(), value.to_string()));
        }
        Ok(env)
    }

    pub fn gateway_options(&self) -> GatewayOptions {
        GatewayOptions {
            model_id: self.model_id.clone(),
            model_name: self.model_name.clone(),
            model_description: self.model_description.clone(),
            default_language: self.default_language.clone(),
            queue_depth: self.queue_depth.max(1),
            max_text_chars: self.max_text_chars,
            scratch_root: self.scratch_root(),
            expose_error_detail: self.expose_error_detail,
        }
    }
}
