//! Daemon configuration: optional TOML file (`SPEAKD_CONFIG`) plus env overrides.

use crate::rate_limit::RateLimitConfig;
use serde::Deserialize;
use speakd_core::EngineConfig;
use std::path::{Path, PathBuf};

pub const DEFAULT_BIND: &str = "0.0.0.0:8000";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub bind: String,
    pub engine: EngineConfig,
    /// Limit on `POST /api/tts/speak`.
    pub rate_limit: RateLimitConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            engine: EngineConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl DaemonConfig {
    pub fn from_toml(s: &str) -> anyhow::Result<Self> {
        let cfg: DaemonConfig = toml::from_str(s)?;
        cfg.engine.check()?;
        Ok(cfg)
    }

    pub fn load_path(path: &Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("read config {:?}: {}", path, e))?;
        Self::from_toml(&s)
    }

    /// File from `SPEAKD_CONFIG` if set, then env overrides.
    pub fn from_env() -> anyhow::Result<Self> {
        let lookup = |k: &str| std::env::var(k).ok().filter(|v| !v.is_empty());
        let mut cfg = match lookup("SPEAKD_CONFIG") {
            Some(path) => Self::load_path(Path::new(&path))?,
            None => Self::default(),
        };
        cfg.apply_overrides(lookup)?;
        Ok(cfg)
    }

    /// `SPEAKD_BIND`, `SPEAKD_PORT` (or plain `PORT`), `SPEAKD_ENGINE`, `SPEAKD_ENGINE_DIR`,
    /// `SPEAKD_TIMEOUT_MS`, `SPEAKD_RATE_LIMIT`, `SPEAKD_RATE_WINDOW_SECS`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(bind) = lookup("SPEAKD_BIND") {
            self.bind = bind;
        }
        let port = lookup("SPEAKD_PORT")
            .map(|v| ("SPEAKD_PORT", v))
            .or_else(|| lookup("PORT").map(|v| ("PORT", v)));
        if let Some((key, port)) = port {
            let port: u16 = port
                .parse()
                .map_err(|e| anyhow::anyhow!("{} {:?}: {}", key, port, e))?;
            let host = self.bind.rsplit_once(':').map(|(h, _)| h).unwrap_or("0.0.0.0");
            self.bind = format!("{}:{}", host, port);
        }
        if let Some(program) = lookup("SPEAKD_ENGINE") {
            self.engine.program = PathBuf::from(program);
            self.engine.args.clear();
        }
        if let Some(dir) = lookup("SPEAKD_ENGINE_DIR") {
            self.engine.working_dir = PathBuf::from(dir);
        }
        if let Some(ms) = lookup("SPEAKD_TIMEOUT_MS") {
            self.engine.timeout_ms = ms
                .parse::<u64>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    anyhow::anyhow!("SPEAKD_TIMEOUT_MS must be a positive integer, got {:?}", ms)
                })?;
        }
        if let Some(n) = lookup("SPEAKD_RATE_LIMIT") {
            self.rate_limit.max_requests = n
                .parse::<u32>()
                .map_err(|e| anyhow::anyhow!("SPEAKD_RATE_LIMIT {:?}: {}", n, e))?;
        }
        if let Some(secs) = lookup("SPEAKD_RATE_WINDOW_SECS") {
            self.rate_limit.window_secs = secs
                .parse::<u64>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    anyhow::anyhow!("SPEAKD_RATE_WINDOW_SECS must be a positive integer, got {:?}", secs)
                })?;
        }
        Ok(())
    }
}
