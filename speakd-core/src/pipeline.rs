//! Speak pipeline: validate -> run engine -> arbitrate.

use crate::config::EngineConfig;
use crate::outcome::{arbitrate, FailureKind, SynthesisOutcome};
use crate::request::{validate_request, RawSpeakRequest, SynthesisRequest, ValidationFailure};
use crate::runner::run_engine;
use tracing::{info, warn};
use uuid::Uuid;

const VERIFY_SAMPLE: &str = "Hello, world!";

/// Runs speak requests against one configured engine. Holds no per-request state;
/// every call gets its own process and buffers.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    engine: EngineConfig,
}

impl Synthesizer {
    pub fn new(engine: EngineConfig) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    pub fn validate(&self, raw: &RawSpeakRequest) -> Result<SynthesisRequest, ValidationFailure> {
        validate_request(raw, &self.engine.default_language)
    }

    /// Validate then synthesize. Validation failures never start a process.
    pub async fn speak(&self, raw: &RawSpeakRequest) -> Result<SynthesisOutcome, ValidationFailure> {
        let request = self.validate(raw)?;
        Ok(self.synthesize(&request).await)
    }

    /// One engine invocation for an already validated request.
    pub async fn synthesize(&self, request: &SynthesisRequest) -> SynthesisOutcome {
        let id = Uuid::new_v4();
        info!(
            invocation = %id,
            chars = request.text.chars().count(),
            language = %request.language,
            "starting speech synthesis"
        );
        let mut guard = CancelGuard { id, armed: true };
        let outcome = arbitrate(run_engine(&self.engine, request).await);
        guard.armed = false;

        match &outcome {
            SynthesisOutcome::Success { audio } => {
                info!(invocation = %id, bytes = audio.len(), "speech synthesis succeeded");
            }
            SynthesisOutcome::Failure { kind, diagnostics } => {
                warn!(invocation = %id, %kind, diagnostics = %diagnostics, "speech synthesis failed");
            }
        }
        outcome
    }
}

/// Logs a cancelled invocation when the request future is dropped mid-run.
/// The child itself is killed by kill-on-drop in the runner.
struct CancelGuard {
    id: Uuid,
    armed: bool,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.armed {
            warn!(
                invocation = %self.id,
                kind = %FailureKind::CallerCancelled,
                "caller went away before synthesis finished; engine process killed"
            );
        }
    }
}

/// Run the engine once on a sample sentence; `Success` means it is usable.
pub async fn verify_engine(engine: &EngineConfig) -> SynthesisOutcome {
    let request = SynthesisRequest {
        text: VERIFY_SAMPLE.to_string(),
        language: engine.default_language.clone(),
    };
    let outcome = arbitrate(run_engine(engine, &request).await);
    match &outcome {
        SynthesisOutcome::Success { audio } => {
            info!(program = ?engine.program, bytes = audio.len(), "engine verification passed")
        }
        SynthesisOutcome::Failure { kind, .. } => {
            warn!(program = ?engine.program, %kind, "engine verification failed")
        }
    }
    outcome
}
