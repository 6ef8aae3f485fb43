//! Engine configuration (engine.toml): how to launch the synthesis engine and the bounds
//! applied to each invocation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_LANGUAGE: &str = "hi";
pub const DEFAULT_CONTENT_TYPE: &str = "audio/mpeg";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 16 * 1024 * 1024;

/// Launch description for the external synthesis engine.
///
/// The engine is invoked as `<program> <args...> <text> <language>` from `working_dir`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub program: PathBuf,
    /// Fixed leading arguments, e.g. the script path for an interpreter.
    pub args: Vec<String>,
    /// Engine install location; every invocation runs here.
    pub working_dir: PathBuf,
    pub default_language: String,
    /// Codec of the bytes the engine writes to stdout.
    pub content_type: String,
    pub timeout_ms: u64,
    pub max_output_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("python"),
            args: vec!["speak.py".to_string()],
            working_dir: PathBuf::from("."),
            default_language: DEFAULT_LANGUAGE.to_string(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl EngineConfig {
    /// Config for a standalone engine executable with no leading arguments.
    pub fn for_program(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            ..Self::default()
        }
    }

    /// Load from TOML string.
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        let cfg: EngineConfig = toml::from_str(s)?;
        cfg.check()?;
        Ok(cfg)
    }

    /// Load from file path.
    pub fn load_path(path: &std::path::Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("read engine config {:?}: {}", path, e))?;
        Self::from_toml(&s)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Reject configs that could never run an engine.
    pub fn check(&self) -> anyhow::Result<()> {
        if self.program.as_os_str().is_empty() {
            anyhow::bail!("engine program must not be empty");
        }
        if self.timeout_ms == 0 {
            anyhow::bail!("engine timeout_ms must be greater than zero");
        }
        if self.max_output_bytes == 0 {
            anyhow::bail!("engine max_output_bytes must be greater than zero");
        }
        Ok(())
    }
}
