use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::{
    core::progress::ProgressConfig,
    error::{GenerationError, Result},
    services::http_backend::DEFAULT_BASE_URL,
};

pub const DEFAULT_PRIMARY_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_FALLBACK_TIMEOUT: Duration = Duration::from_secs(60);

/// Orchestrator timing and progress settings
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Wait budget for the primary call before switching to the fallback path
    pub primary_timeout: Duration,
    /// Bound on the single fallback call; elapsing here is terminal
    pub fallback_timeout: Duration,
    pub progress: ProgressConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            primary_timeout: DEFAULT_PRIMARY_TIMEOUT,
            fallback_timeout: DEFAULT_FALLBACK_TIMEOUT,
            progress: ProgressConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_primary_timeout(mut self, timeout: Duration) -> Self {
        self.primary_timeout = timeout;
        self
    }

    pub fn with_fallback_timeout(mut self, timeout: Duration) -> Self {
        self.fallback_timeout = timeout;
        self
    }

    pub fn with_progress(mut self, progress: ProgressConfig) -> Self {
        self.progress = progress;
        self
    }
}

/// Settings resolved from the environment (and `.env` when the caller loaded it)
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// `TRIPGEN_BASE_URL`
    pub base_url: String,
    /// `TRIPGEN_SESSION_DIR`
    pub session_dir: PathBuf,
    /// `TRIPGEN_PRIMARY_TIMEOUT_SECS`, `TRIPGEN_FALLBACK_TIMEOUT_SECS`
    pub orchestrator: OrchestratorConfig,
}

impl EnvConfig {
    pub fn from_env() -> Result<Self> {
        let base_url = env::var("TRIPGEN_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let session_dir = env::var("TRIPGEN_SESSION_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_session_dir());

        let mut orchestrator = OrchestratorConfig::default();
        if let Some(secs) = read_secs("TRIPGEN_PRIMARY_TIMEOUT_SECS")? {
            orchestrator.primary_timeout = secs;
        }
        if let Some(secs) = read_secs("TRIPGEN_FALLBACK_TIMEOUT_SECS")? {
            orchestrator.fallback_timeout = secs;
        }

        Ok(Self {
            base_url,
            session_dir,
            orchestrator,
        })
    }
}

pub fn default_session_dir() -> PathBuf {
    env::temp_dir().join("tripgen-session")
}

fn read_secs(name: &str) -> Result<Option<Duration>> {
    match env::var(name) {
        Ok(raw) => parse_secs(name, &raw).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_secs(name: &str, raw: &str) -> Result<Duration> {
    let secs: u64 = raw.trim().parse().map_err(|_| {
        GenerationError::Config(format!("{name} must be a whole number of seconds, got `{raw}`"))
    })?;
    if secs == 0 {
        return Err(GenerationError::Config(format!("{name} must be greater than zero")));
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.primary_timeout, Duration::from_secs(20));
        assert_eq!(config.fallback_timeout, Duration::from_secs(60));
        assert_eq!(config.progress.ceiling, 95.0);
    }

    #[test]
    fn test_parse_secs() {
        assert_eq!(parse_secs("X", " 15 ").unwrap(), Duration::from_secs(15));
        assert!(parse_secs("X", "0").is_err());
        assert!(parse_secs("X", "soon").is_err());
    }
}
