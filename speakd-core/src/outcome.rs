//! Success/failure policy over a finished engine run.

use crate::runner::RawRunResult;
use std::fmt;

/// Diagnostics used when a failing engine wrote nothing to stderr.
pub const UNKNOWN_ERROR: &str = "Unknown error";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The engine process could not be started.
    LaunchError,
    /// The engine ran and exited non-zero; `None` when it died from a signal.
    EngineError(Option<i32>),
    /// The engine ran but its exit status could not be collected.
    StatusUnavailable,
    /// Clean exit but no audio.
    EmptyOutput,
    Timeout,
    OutputTooLarge,
    /// The caller went away before completion; the engine was killed.
    CallerCancelled,
}

impl FailureKind {
    /// Short, stable caller-facing message.
    pub fn message(&self) -> &'static str {
        match self {
            FailureKind::LaunchError => "Failed to start speech synthesis process",
            FailureKind::EngineError(_)
            | FailureKind::StatusUnavailable
            | FailureKind::EmptyOutput => "Speech synthesis failed",
            FailureKind::Timeout => "Speech synthesis timed out",
            FailureKind::OutputTooLarge => "Speech synthesis output too large",
            FailureKind::CallerCancelled => "Speech synthesis cancelled",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::LaunchError => f.write_str("launch error"),
            FailureKind::EngineError(Some(code)) => write!(f, "engine error (exit code {})", code),
            FailureKind::EngineError(None) => f.write_str("engine error (killed by signal)"),
            FailureKind::StatusUnavailable => f.write_str("engine exit status unavailable"),
            FailureKind::EmptyOutput => f.write_str("empty output"),
            FailureKind::Timeout => f.write_str("timeout"),
            FailureKind::OutputTooLarge => f.write_str("output too large"),
            FailureKind::CallerCancelled => f.write_str("caller cancelled"),
        }
    }
}

/// The single final value produced per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisOutcome {
    Success { audio: Vec<u8> },
    Failure { kind: FailureKind, diagnostics: String },
}

impl SynthesisOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SynthesisOutcome::Success { .. })
    }

    fn failure(kind: FailureKind, diagnostics: impl Into<String>) -> Self {
        SynthesisOutcome::Failure {
            kind,
            diagnostics: diagnostics.into(),
        }
    }
}

/// Decide the outcome. Order matters: a zero exit code alone is not success,
/// the engine must also have produced audio.
pub fn arbitrate(raw: RawRunResult) -> SynthesisOutcome {
    match raw {
        RawRunResult::LaunchFailed { message } => {
            SynthesisOutcome::failure(FailureKind::LaunchError, message)
        }
        RawRunResult::TimedOut { after, diagnostics } => SynthesisOutcome::failure(
            FailureKind::Timeout,
            or_else(diagnostics, || format!("engine did not finish within {} ms", after.as_millis())),
        ),
        RawRunResult::OutputTooLarge { limit, diagnostics } => SynthesisOutcome::failure(
            FailureKind::OutputTooLarge,
            or_else(diagnostics, || format!("engine wrote more than {} bytes", limit)),
        ),
        RawRunResult::StatusUnavailable {
            message,
            diagnostics,
        } => SynthesisOutcome::failure(FailureKind::StatusUnavailable, or_else(diagnostics, || message)),
        RawRunResult::Exited {
            exit_code,
            diagnostics,
            ..
        } if exit_code != Some(0) => SynthesisOutcome::failure(
            FailureKind::EngineError(exit_code),
            or_else(diagnostics, || UNKNOWN_ERROR.to_string()),
        ),
        RawRunResult::Exited {
            audio, diagnostics, ..
        } if audio.is_empty() => SynthesisOutcome::failure(FailureKind::EmptyOutput, diagnostics),
        RawRunResult::Exited { audio, .. } => SynthesisOutcome::Success { audio },
    }
}

fn or_else(diagnostics: String, fallback: impl FnOnce() -> String) -> String {
    if diagnostics.trim().is_empty() {
        fallback()
    } else {
        diagnostics
    }
}
