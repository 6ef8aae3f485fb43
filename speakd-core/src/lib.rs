//! speakd core: request validation, synthesis engine runner, outcome arbitration,
//! and the text-generation client.

pub mod config;
pub mod generation;
pub mod outcome;
pub mod pipeline;
pub mod request;
pub mod runner;

pub use config::EngineConfig;
pub use generation::{GenerationClient, GenerationConfig, GenerationError};
pub use outcome::{arbitrate, FailureKind, SynthesisOutcome, UNKNOWN_ERROR};
pub use pipeline::{verify_engine, Synthesizer};
pub use request::{validate_request, RawSpeakRequest, SynthesisRequest, ValidationFailure};
pub use runner::{run_engine, RawRunResult};
