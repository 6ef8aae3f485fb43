//! Outcome -> HTTP response. Exactly one of: audio bytes, or a JSON error body.

use axum::{
    body::Body,
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use speakd_core::{FailureKind, SynthesisOutcome, ValidationFailure};

const INVALID_BODY: &str = "Invalid request body";
const RATE_LIMITED: &str = "Too many API requests, please try again later.";

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ErrorBody {
    fn new(message: impl Into<String>, error: Option<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error,
        }
    }
}

pub fn emit(outcome: SynthesisOutcome, content_type: &str) -> Response {
    match outcome {
        SynthesisOutcome::Success { audio } => audio_response(audio, content_type),
        SynthesisOutcome::Failure { kind, diagnostics } => (
            failure_status(kind),
            Json(ErrorBody::new(kind.message(), Some(diagnostics))),
        )
            .into_response(),
    }
}

pub fn validation_failure(failure: ValidationFailure) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody::new(failure.to_string(), None)),
    )
        .into_response()
}

pub fn invalid_body(rejection: JsonRejection) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody::new(INVALID_BODY, Some(rejection.body_text()))),
    )
        .into_response()
}

pub fn rate_limited() -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(ErrorBody::new(RATE_LIMITED, None)),
    )
        .into_response()
}

fn failure_status(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn audio_response(audio: Vec<u8>, content_type: &str) -> Response {
    let len = audio.len();
    let mut res = Response::new(Body::from(audio));
    let headers = res.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    res
}
