//! HTTP surface of the gateway.
//!
//! | Method | Path                      | Body / query                     |
//! |--------|---------------------------|----------------------------------|
//! | GET    | `/speak`                  | `?text=&language=&speed=`        |
//! | GET    | `/api/ai/tts/speak`       | same as `/speak` (legacy path)   |
//! | POST   | `/synthesize`             | `{text, speed?, language?}`      |
//! | POST   | `/speech`                 | same as `/synthesize`            |
//! | GET    | `/model/{model_id}`       | -                                |
//! | GET    | `/get_model`              | `?model_uid=` (legacy path)      |
//! | GET    | `/api/ai/tts/get_model`   | same as `/get_model`             |
//! | GET    | `/health`                 | -                                |
//! | GET    | `/status`                 | -                                |
//!
//! Framework rejections (bad query string, bad JSON) are converted into
//! [`GatewayError::InvalidInput`] so every failure has the same
//! `{"detail": ...}` shape.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, Request, State,
    },
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info_span;

use crate::{
    error::GatewayError,
    gateway::{AudioResponse, Gateway, GatewayStatus, ModelDescriptor},
};

/// Header marking a degraded-mode (silent) response.
pub const FALLBACK_HEADER: &str = "x-tts-fallback";

type SharedGateway = Arc<Gateway>;

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SpeakQuery {
    pub text: Option<String>,
    pub language: Option<String>,
    pub speed: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct SynthesizeBody {
    #[serde(alias = "input")]
    pub text: String,
    #[serde(default)]
    pub speed: Option<f32>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GetModelQuery {
    pub model_uid: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

impl IntoResponse for AudioResponse {
    fn into_response(self) -> Response {
        let mut resp = ([(header::CONTENT_TYPE, self.media_type)], self.bytes).into_response();
        if self.degraded {
            resp.headers_mut().insert(FALLBACK_HEADER, HeaderValue::from_static("silent"));
        }
        resp
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router(gateway: SharedGateway) -> Router {
    let trace_layer = TraceLayer::new_for_http().make_span_with(|request: &Request| {
        info_span!("http_request", method = %request.method(), uri = %request.uri())
    });

    Router::new()
        .route("/speak", get(speak))
        .route("/api/ai/tts/speak", get(speak))
        .route("/synthesize", post(synthesize))
        .route("/speech", post(synthesize))
        .route("/model/{model_id}", get(describe_model))
        .route("/get_model", get(get_model))
        .route("/api/ai/tts/get_model", get(get_model))
        .route("/health", get(health))
        .route("/status", get(status))
        .layer(trace_layer)
        .layer(CorsLayer::permissive())
        .with_state(gateway)
}

/// Bind `addr` and serve until Ctrl+C / SIGTERM.
pub async fn serve(addr: SocketAddr, gateway: SharedGateway) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, ready = gateway.backend().is_ready(), "speech gateway listening");
    axum::serve(listener, router(gateway)).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn speak(
    State(gateway): State<SharedGateway>,
    query: Result<Query<SpeakQuery>, QueryRejection>,
) -> Result<AudioResponse, GatewayError> {
    let Query(query) = query.map_err(|e| GatewayError::InvalidInput(e.body_text()))?;
    let text = query
        .text
        .ok_or_else(|| GatewayError::InvalidInput("missing query parameter `text`".to_string()))?;
    let request = gateway.request(text, query.language, query.speed);
    gateway.synthesize(request).await
}

async fn synthesize(
    State(gateway): State<SharedGateway>,
    body: Result<Json<SynthesizeBody>, JsonRejection>,
) -> Result<AudioResponse, GatewayError> {
    let Json(body) = body.map_err(|e| GatewayError::InvalidInput(e.body_text()))?;
    let request = gateway.request(body.text, body.language, body.speed);
    gateway.synthesize(request).await
}

async fn describe_model(
    State(gateway): State<SharedGateway>,
    Path(model_id): Path<String>,
) -> Result<Json<ModelDescriptor>, GatewayError> {
    gateway.describe_model(&model_id).map(Json)
}

async fn get_model(
    State(gateway): State<SharedGateway>,
    query: Result<Query<GetModelQuery>, QueryRejection>,
) -> Result<Json<ModelDescriptor>, GatewayError> {
    let Query(query) = query.map_err(|e| GatewayError::InvalidInput(e.body_text()))?;
    let model_uid = query.model_uid.ok_or_else(|| {
        GatewayError::InvalidInput("missing query parameter `model_uid`".to_string())
    })?;
    gateway.describe_model(&model_uid).map(Json)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn status(State(gateway): State<SharedGateway>) -> Json<GatewayStatus> {
    Json(gateway.status())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
