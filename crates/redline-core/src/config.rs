//! Runtime configuration
//!
//! Values come from, in increasing precedence: built-in defaults, a TOML
//! file, the `REDLINE_MEMORY_DIR` environment variable, and CLI flags.

use crate::error::ConfigError;
use redline_kernel::DEFAULT_MAX_DEPENDENCY_POLLS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding [`RedlineConfig::memory_dir`]
pub const MEMORY_DIR_ENV: &str = "REDLINE_MEMORY_DIR";

/// Orchestrator and stage worker settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedlineConfig {
    /// Control-loop iteration cap per `run`
    pub max_iterations: usize,
    /// Priority of the bootstrap review task
    pub bootstrap_priority: u32,
    /// Priority used when a caller does not pick one
    pub default_priority: u32,
    /// Re-polls before a gated task is recorded as blocked (0 = never)
    pub max_dependency_polls: u32,
    /// Concurrent policy checks in the review stage
    pub review_concurrency: usize,
    /// Concurrent restyles in the style stage
    pub style_concurrency: usize,
    /// Policies checked per clause
    pub max_policies_per_clause: usize,
    /// Lines kept in a version diff summary
    pub diff_max_lines: usize,
    /// Directory holding one JSON file per project
    pub memory_dir: PathBuf,
    /// Transformation cache time-to-live
    pub transformation_cache_ttl_secs: u64,
    /// Transformation cache entry cap
    pub transformation_cache_capacity: u64,
}

impl RedlineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With iteration cap
    #[inline]
    #[must_use]
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// With dependency re-poll bound
    #[inline]
    #[must_use]
    pub fn with_max_dependency_polls(mut self, polls: u32) -> Self {
        self.max_dependency_polls = polls;
        self
    }

    /// With review fan-out width
    #[inline]
    #[must_use]
    pub fn with_review_concurrency(mut self, limit: usize) -> Self {
        self.review_concurrency = limit;
        self
    }

    /// With style fan-out width
    #[inline]
    #[must_use]
    pub fn with_style_concurrency(mut self, limit: usize) -> Self {
        self.style_concurrency = limit;
        self
    }

    /// With project memory directory
    #[inline]
    #[must_use]
    pub fn with_memory_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.memory_dir = dir.into();
        self
    }

    /// Transformation cache TTL as a [`Duration`]
    #[inline]
    #[must_use]
    pub fn transformation_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.transformation_cache_ttl_secs)
    }

    /// Parse from TOML; missing keys keep their defaults
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load a TOML file, apply the environment override and validate
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env();
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Apply `REDLINE_MEMORY_DIR` if set and non-empty
    pub fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var(MEMORY_DIR_ENV) {
            if !dir.is_empty() {
                self.memory_dir = PathBuf::from(dir);
            }
        }
    }

    /// Reject settings the orchestrator cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(&'static str, bool); 4] = [
            ("max_iterations", self.max_iterations == 0),
            ("review_concurrency", self.review_concurrency == 0),
            ("style_concurrency", self.style_concurrency == 0),
            ("max_policies_per_clause", self.max_policies_per_clause == 0),
        ];
        for (field, is_zero) in checks {
            if is_zero {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.memory_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "memory_dir",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for RedlineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            bootstrap_priority: 1,
            default_priority: 10,
            max_dependency_polls: DEFAULT_MAX_DEPENDENCY_POLLS,
            review_concurrency: 10,
            style_concurrency: 10,
            max_policies_per_clause: 3,
            diff_max_lines: 20,
            memory_dir: PathBuf::from("project_memory"),
            transformation_cache_ttl_secs: 3600,
            transformation_cache_capacity: 1024,
        }
    }
}
