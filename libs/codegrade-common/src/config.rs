// Sandbox and service configuration for codegrade
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Constructs rejected in every guest program regardless of caller config.
/// Matching is case-insensitive.
pub const BASELINE_BLOCKED_PATTERNS: &[&str] = &[
    "import os",
    "import sys",
    "import subprocess",
    "import shutil",
    "import socket",
    "import ctypes",
    "from os",
    "from sys",
    "from subprocess",
    "__import__",
    "__builtins__",
    "__class__",
    "__subclasses__",
    "__globals__",
    "open(",
    "exec(",
    "eval(",
    "compile(",
    "globals(",
    "locals(",
    "getattr(",
    "setattr(",
    "delattr(",
    "breakpoint(",
    "os.system",
    "subprocess",
];

fn default_timeout_ms() -> u64 {
    5000
}

fn default_max_output_length() -> usize {
    10_000
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_result_ttl_secs() -> u64 {
    86400
}

/// Tunable execution limits for one grading call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum output length in characters before truncation
    #[serde(default = "default_max_output_length")]
    pub max_output_length: usize,
    /// Extra denylist entries on top of [`BASELINE_BLOCKED_PATTERNS`]
    #[serde(default)]
    pub blocked_patterns: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_output_length: default_max_output_length(),
            blocked_patterns: Vec::new(),
        }
    }
}

impl SandboxConfig {
    /// Baseline denylist unioned with the caller's entries, lower-cased,
    /// baseline first, duplicates and blanks dropped.
    pub fn merged_patterns(&self) -> Vec<String> {
        let mut patterns: Vec<String> = BASELINE_BLOCKED_PATTERNS
            .iter()
            .map(|p| p.to_string())
            .collect();

        for pattern in &self.blocked_patterns {
            let pattern = pattern.trim().to_lowercase();
            if !pattern.is_empty() && !patterns.contains(&pattern) {
                patterns.push(pattern);
            }
        }

        patterns
    }
}

/// Service-wide configuration, read from `config/codegrade.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default = "default_result_ttl_secs")]
    pub result_ttl_secs: u64,
    /// Mirror graded submissions to Redis when set
    #[serde(default)]
    pub redis_url: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            sandbox: SandboxConfig::default(),
            result_ttl_secs: default_result_ttl_secs(),
            redis_url: None,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a JSON file, then apply environment overrides.
    /// A missing file is not an error; defaults are used instead.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config = if config_path.exists() {
            let content = fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            Self::from_json(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            warn!(path = %config_path.display(), "Config file not found, using defaults");
            Self::default()
        };

        let config = config.with_env_overrides(|key| std::env::var(key).ok())?;
        info!(
            bind_addr = %config.bind_addr,
            timeout_ms = config.sandbox.timeout_ms,
            max_output_length = config.sandbox.max_output_length,
            extra_patterns = config.sandbox.blocked_patterns.len(),
            redis_mirror = config.redis_url.is_some(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Load with default path (config/codegrade.json)
    pub fn load_default() -> Result<Self> {
        Self::load(Path::new("config/codegrade.json"))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Apply `CODEGRADE_*` and `REDIS_URL` overrides from a variable lookup
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("CODEGRADE_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(timeout) = lookup("CODEGRADE_TIMEOUT_MS") {
            self.sandbox.timeout_ms = timeout
                .parse()
                .context("CODEGRADE_TIMEOUT_MS must be an integer")?;
        }
        if let Some(max_output) = lookup("CODEGRADE_MAX_OUTPUT") {
            self.sandbox.max_output_length = max_output
                .parse()
                .context("CODEGRADE_MAX_OUTPUT must be an integer")?;
        }
        if let Some(url) = lookup("REDIS_URL") {
            self.redis_url = Some(url);
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_from_empty_json() {
        let config = ServiceConfig::from_json("{}").unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.sandbox.timeout_ms, 5000);
        assert_eq!(config.sandbox.max_output_length, 10_000);
    }

    #[test]
    fn test_partial_sandbox_section() {
        let config =
            ServiceConfig::from_json(r#"{"sandbox": {"timeout_ms": 250, "blocked_patterns": ["while"]}}"#)
                .unwrap();
        assert_eq!(config.sandbox.timeout_ms, 250);
        assert_eq!(config.sandbox.max_output_length, 10_000);
        assert_eq!(config.sandbox.blocked_patterns, vec!["while".to_string()]);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CODEGRADE_TIMEOUT_MS", "1500"),
            ("CODEGRADE_BIND_ADDR", "127.0.0.1:8080"),
            ("REDIS_URL", "redis://localhost:6379"),
        ]
        .into_iter()
        .collect();

        let config = ServiceConfig::default()
            .with_env_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.sandbox.timeout_ms, 1500);
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.redis_url.as_deref(), Some("redis://localhost:6379"));
    }

    #[test]
    fn test_invalid_env_override_is_rejected() {
        let result = ServiceConfig::default().with_env_overrides(|key| {
            (key == "CODEGRADE_TIMEOUT_MS").then(|| "soon".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_merged_patterns_union() {
        let config = SandboxConfig {
            blocked_patterns: vec!["  Input(  ".to_string(), "open(".to_string(), "".to_string()],
            ..Default::default()
        };
        let patterns = config.merged_patterns();

        assert_eq!(patterns.len(), BASELINE_BLOCKED_PATTERNS.len() + 1);
        assert_eq!(patterns.last().map(String::as_str), Some("input("));
        assert!(patterns.iter().any(|p| p == "__import__"));
    }
}
