//! Runtime configuration
//!
//! Read from the process environment; binaries load `.env` first.

use crate::error::OrchestrationError;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_FINANCIAL_API_BASE_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub financial_api_base_url: String,
    /// Bound on each capability's external call
    pub tool_timeout: Duration,
    pub max_context_messages: usize,
    pub port: u16,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            financial_api_base_url: DEFAULT_FINANCIAL_API_BASE_URL.to_string(),
            tool_timeout: Duration::from_secs(10),
            max_context_messages: 40,
            port: 8080,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let first = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| lookup(*k).filter(|v| !v.trim().is_empty()))
        };

        let tool_timeout_secs: u64 = parse_or(first(&["TOOL_TIMEOUT_SECS"]), "TOOL_TIMEOUT_SECS", 10)?;

        Ok(Self {
            gemini_api_key: first(&["GEMINI_API_KEY"]).unwrap_or(defaults.gemini_api_key),
            gemini_model: first(&["GEMINI_MODEL"]).unwrap_or(defaults.gemini_model),
            financial_api_base_url: first(&["FINANCIAL_API_BASE_URL", "TOOLS_API_BASE_URL"])
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.financial_api_base_url),
            tool_timeout: Duration::from_secs(tool_timeout_secs),
            max_context_messages: parse_or(
                first(&["MAX_CONTEXT_MESSAGES"]),
                "MAX_CONTEXT_MESSAGES",
                defaults.max_context_messages,
            )?,
            port: parse_or(first(&["PORT", "API_PORT"]), "PORT", defaults.port)?,
        })
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| {
            OrchestrationError::ConfigError(format!("{} has invalid value '{}'", key, value))
        }),
    }
}
