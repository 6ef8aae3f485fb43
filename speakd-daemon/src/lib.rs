//! speakd daemon library: app builder for testing and serving.

pub mod config;
pub mod rate_limit;
pub mod response;
mod state;

use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use speakd_core::RawSpeakRequest;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

pub use config::DaemonConfig;
pub use rate_limit::RateLimitConfig;
pub use state::AppState;

/// Build the axum Router with the given state (used by main and tests).
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/tts/speak", post(speak))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// POST /api/tts/speak: `{ text, language? }` -> audio bytes or JSON error.
async fn speak(
    State(state): State<AppState>,
    body: Result<Json<RawSpeakRequest>, JsonRejection>,
) -> Response {
    if !state.limiter.lock().await.check() {
        warn!("speak request refused by rate limit");
        return response::rate_limited();
    }
    let Json(raw) = match body {
        Ok(body) => body,
        Err(rejection) => return response::invalid_body(rejection),
    };
    let synth = &state.synthesizer;
    let request = match synth.validate(&raw) {
        Ok(request) => request,
        Err(failure) => return response::validation_failure(failure),
    };
    let outcome = synth.synthesize(&request).await;
    response::emit(outcome, &synth.engine().content_type)
}
