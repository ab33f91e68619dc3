//! Configuration management with environment variable support.
//!
//! This module provides centralized configuration for dom-eval, supporting:
//! - Environment variables for all configurable values
//! - Sensible defaults for the evaluator, scoring and batch settings
//! - Builder-style overrides from the CLI
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DOM_EVAL_JUDGE_PROVIDER` | Evaluator provider (`openai`, `anthropic`, `pixel`) | `openai` |
//! | `DOM_EVAL_JUDGE_ENDPOINT` | Evaluator API endpoint URL | provider specific |
//! | `DOM_EVAL_JUDGE_MODEL` | Vision model name | provider specific |
//! | `DOM_EVAL_JUDGE_API_KEY` | API key (falls back to `OPENAI_API_KEY` / `ANTHROPIC_API_KEY`) | none |
//! | `DOM_EVAL_JUDGE_MAX_TOKENS` | Maximum tokens in evaluator response | `1000` |
//! | `DOM_EVAL_JUDGE_CONNECT_TIMEOUT` | Connection timeout in seconds | `10` |
//! | `DOM_EVAL_JUDGE_REQUEST_TIMEOUT` | Request timeout in seconds | `120` |
//! | `DOM_EVAL_JUDGE_MAX_RETRIES` | Retries after the first attempt | `3` |
//! | `DOM_EVAL_JUDGE_RETRY_BASE_MS` | Base backoff delay (ms) | `1000` |
//! | `DOM_EVAL_JUDGE_CONCURRENCY` | Concurrent evaluator calls | `4` |
//! | `DOM_EVAL_SUCCESS_THRESHOLD` | Final score needed for success | `0.9` |
//! | `DOM_EVAL_WORKERS` | Parallel workers | `4` |
//! | `DOM_EVAL_TASK_TIMEOUT` | Per-task timeout in seconds | `300` |
//! | `DOM_EVAL_DYNAMIC_ATTRIBUTES` | Extra dynamic attribute names (comma separated) | none |
//! | `DOM_EVAL_OUTPUT_DIR` | Base directory for evaluation runs | `./evaluations` |
//!
//! # Example
//!
//! ```bash
//! # Score against a local OpenAI-compatible server
//! export DOM_EVAL_JUDGE_ENDPOINT="http://localhost:11434/v1/chat/completions"
//! export DOM_EVAL_JUDGE_MODEL="llava"
//!
//! # Treat framework-generated ids as dynamic
//! export DOM_EVAL_DYNAMIC_ATTRIBUTES="id,data-key"
//! ```

use std::env;
use std::str::FromStr;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

// ============================================================================
// Default Values
// ============================================================================

/// Default OpenAI-compatible chat completions endpoint
pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Default OpenAI vision model
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

/// Default Anthropic messages endpoint
pub const DEFAULT_ANTHROPIC_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";

/// Default Anthropic vision model
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-latest";

/// Default max tokens for evaluator responses
pub const DEFAULT_JUDGE_MAX_TOKENS: u32 = 1000;

/// Default evaluator connection timeout (seconds)
pub const DEFAULT_JUDGE_CONNECT_TIMEOUT: u64 = 10;

/// Default evaluator request timeout (seconds)
pub const DEFAULT_JUDGE_REQUEST_TIMEOUT: u64 = 120;

/// Default number of retries after the first evaluator attempt
pub const DEFAULT_JUDGE_MAX_RETRIES: u32 = 3;

/// Default base backoff delay (milliseconds)
pub const DEFAULT_JUDGE_RETRY_BASE_MS: u64 = 1000;

/// Default ceiling on concurrent evaluator calls
pub const DEFAULT_JUDGE_CONCURRENCY: usize = 4;

/// Default final score needed for a task to pass
pub const DEFAULT_SUCCESS_THRESHOLD: f64 = 0.9;

/// Default worker count in parallel mode
pub const DEFAULT_WORKERS: usize = 4;

/// Default per-task timeout (seconds)
pub const DEFAULT_TASK_TIMEOUT: u64 = 300;

/// Default base directory for evaluation runs
pub const DEFAULT_OUTPUT_DIR: &str = "./evaluations";

// ============================================================================
// Environment Variable Names
// ============================================================================

pub const ENV_JUDGE_PROVIDER: &str = "DOM_EVAL_JUDGE_PROVIDER";
pub const ENV_JUDGE_ENDPOINT: &str = "DOM_EVAL_JUDGE_ENDPOINT";
pub const ENV_JUDGE_MODEL: &str = "DOM_EVAL_JUDGE_MODEL";
pub const ENV_JUDGE_API_KEY: &str = "DOM_EVAL_JUDGE_API_KEY";
pub const ENV_JUDGE_MAX_TOKENS: &str = "DOM_EVAL_JUDGE_MAX_TOKENS";
pub const ENV_JUDGE_CONNECT_TIMEOUT: &str = "DOM_EVAL_JUDGE_CONNECT_TIMEOUT";
pub const ENV_JUDGE_REQUEST_TIMEOUT: &str = "DOM_EVAL_JUDGE_REQUEST_TIMEOUT";
pub const ENV_JUDGE_MAX_RETRIES: &str = "DOM_EVAL_JUDGE_MAX_RETRIES";
pub const ENV_JUDGE_RETRY_BASE_MS: &str = "DOM_EVAL_JUDGE_RETRY_BASE_MS";
pub const ENV_JUDGE_CONCURRENCY: &str = "DOM_EVAL_JUDGE_CONCURRENCY";
pub const ENV_SUCCESS_THRESHOLD: &str = "DOM_EVAL_SUCCESS_THRESHOLD";
pub const ENV_WORKERS: &str = "DOM_EVAL_WORKERS";
pub const ENV_TASK_TIMEOUT: &str = "DOM_EVAL_TASK_TIMEOUT";
pub const ENV_DYNAMIC_ATTRIBUTES: &str = "DOM_EVAL_DYNAMIC_ATTRIBUTES";
pub const ENV_OUTPUT_DIR: &str = "DOM_EVAL_OUTPUT_DIR";

// Provider-native key variables, used when no DOM_EVAL key is set
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Evaluator provider family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI-compatible chat completions API
    OpenAi,
    /// Anthropic messages API
    Anthropic,
    /// Local pixel comparison, no network
    Pixel,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Pixel => "pixel",
        }
    }

    fn default_endpoint(&self) -> &'static str {
        match self {
            Provider::OpenAi | Provider::Pixel => DEFAULT_OPENAI_ENDPOINT,
            Provider::Anthropic => DEFAULT_ANTHROPIC_ENDPOINT,
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            Provider::OpenAi | Provider::Pixel => DEFAULT_OPENAI_MODEL,
            Provider::Anthropic => DEFAULT_ANTHROPIC_MODEL,
        }
    }

    fn key_env(&self) -> Option<&'static str> {
        match self {
            Provider::OpenAi => Some(ENV_OPENAI_API_KEY),
            Provider::Anthropic => Some(ENV_ANTHROPIC_API_KEY),
            Provider::Pixel => None,
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "gpt4" | "gpt-4" => Ok(Provider::OpenAi),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            "pixel" | "offline" => Ok(Provider::Pixel),
            other => Err(format!(
                "Unknown provider '{}'. Use: openai, anthropic, or pixel",
                other
            )),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Centralized configuration for dom-eval
#[derive(Debug, Clone)]
pub struct Config {
    /// Evaluator configuration
    pub judge: JudgeSettings,
    /// Scoring configuration
    pub scoring: ScoringSettings,
    /// Batch execution configuration
    pub batch: BatchSettings,
}

/// Evaluator-related settings
#[derive(Debug, Clone)]
pub struct JudgeSettings {
    /// Provider family
    pub provider: Provider,
    /// API endpoint URL
    pub endpoint: String,
    /// Model name
    pub model: String,
    /// API key, if the provider needs one
    pub api_key: Option<String>,
    /// Maximum tokens in response
    pub max_tokens: u32,
    /// Connection timeout (seconds)
    pub connect_timeout: u64,
    /// Whole-request timeout (seconds)
    pub request_timeout: u64,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Base backoff delay (milliseconds)
    pub retry_base_ms: u64,
    /// Ceiling on concurrent evaluator calls
    pub concurrency: usize,
}

/// Scoring-related settings
#[derive(Debug, Clone)]
pub struct ScoringSettings {
    /// Final score needed for success
    pub success_threshold: f64,
    /// Extra attribute names to treat as dynamic
    pub dynamic_attributes: Vec<String>,
}

/// Batch execution settings
#[derive(Debug, Clone)]
pub struct BatchSettings {
    /// Worker count in parallel mode
    pub workers: usize,
    /// Per-task timeout (seconds)
    pub task_timeout: u64,
    /// Base directory for evaluation runs
    pub output_dir: String,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            judge: JudgeSettings::from_env(),
            scoring: ScoringSettings::from_env(),
            batch: BatchSettings::from_env(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            judge: JudgeSettings::defaults(),
            scoring: ScoringSettings::defaults(),
            batch: BatchSettings::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

impl JudgeSettings {
    /// Create evaluator settings from environment variables
    pub fn from_env() -> Self {
        let provider = env::var(ENV_JUDGE_PROVIDER)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Provider::OpenAi);

        Self {
            provider,
            endpoint: env::var(ENV_JUDGE_ENDPOINT)
                .unwrap_or_else(|_| provider.default_endpoint().to_string()),
            model: env::var(ENV_JUDGE_MODEL)
                .unwrap_or_else(|_| provider.default_model().to_string()),
            api_key: env::var(ENV_JUDGE_API_KEY)
                .ok()
                .or_else(|| provider.key_env().and_then(|k| env::var(k).ok()))
                .filter(|k| !k.is_empty()),
            max_tokens: parse_env(ENV_JUDGE_MAX_TOKENS).unwrap_or(DEFAULT_JUDGE_MAX_TOKENS),
            connect_timeout: parse_env(ENV_JUDGE_CONNECT_TIMEOUT)
                .unwrap_or(DEFAULT_JUDGE_CONNECT_TIMEOUT),
            request_timeout: parse_env(ENV_JUDGE_REQUEST_TIMEOUT)
                .unwrap_or(DEFAULT_JUDGE_REQUEST_TIMEOUT),
            max_retries: parse_env(ENV_JUDGE_MAX_RETRIES).unwrap_or(DEFAULT_JUDGE_MAX_RETRIES),
            retry_base_ms: parse_env(ENV_JUDGE_RETRY_BASE_MS)
                .unwrap_or(DEFAULT_JUDGE_RETRY_BASE_MS),
            concurrency: parse_env(ENV_JUDGE_CONCURRENCY)
                .filter(|n: &usize| *n > 0)
                .unwrap_or(DEFAULT_JUDGE_CONCURRENCY),
        }
    }

    /// Create evaluator settings with defaults
    pub fn defaults() -> Self {
        Self {
            provider: Provider::OpenAi,
            endpoint: DEFAULT_OPENAI_ENDPOINT.to_string(),
            model: DEFAULT_OPENAI_MODEL.to_string(),
            api_key: None,
            max_tokens: DEFAULT_JUDGE_MAX_TOKENS,
            connect_timeout: DEFAULT_JUDGE_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_JUDGE_REQUEST_TIMEOUT,
            max_retries: DEFAULT_JUDGE_MAX_RETRIES,
            retry_base_ms: DEFAULT_JUDGE_RETRY_BASE_MS,
            concurrency: DEFAULT_JUDGE_CONCURRENCY,
        }
    }

    /// Switch provider, resetting endpoint and model to that provider's defaults
    pub fn with_provider(mut self, provider: Provider) -> Self {
        if self.provider != provider {
            self.endpoint = provider.default_endpoint().to_string();
            self.model = provider.default_model().to_string();
            self.api_key = provider.key_env().and_then(|k| env::var(k).ok());
        }
        self.provider = provider;
        self
    }
}

impl ScoringSettings {
    /// Create scoring settings from environment variables
    pub fn from_env() -> Self {
        Self {
            success_threshold: parse_env(ENV_SUCCESS_THRESHOLD)
                .filter(|t: &f64| (0.0..=1.0).contains(t))
                .unwrap_or(DEFAULT_SUCCESS_THRESHOLD),
            dynamic_attributes: env::var(ENV_DYNAMIC_ATTRIBUTES)
                .map(|s| parse_list(&s))
                .unwrap_or_default(),
        }
    }

    /// Create scoring settings with defaults
    pub fn defaults() -> Self {
        Self {
            success_threshold: DEFAULT_SUCCESS_THRESHOLD,
            dynamic_attributes: Vec::new(),
        }
    }
}

impl BatchSettings {
    /// Create batch settings from environment variables
    pub fn from_env() -> Self {
        Self {
            workers: parse_env(ENV_WORKERS)
                .filter(|n: &usize| *n > 0)
                .unwrap_or(DEFAULT_WORKERS),
            task_timeout: parse_env(ENV_TASK_TIMEOUT).unwrap_or(DEFAULT_TASK_TIMEOUT),
            output_dir: env::var(ENV_OUTPUT_DIR).unwrap_or_else(|_| DEFAULT_OUTPUT_DIR.to_string()),
        }
    }

    /// Create batch settings with defaults
    pub fn defaults() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            task_timeout: DEFAULT_TASK_TIMEOUT,
            output_dir: DEFAULT_OUTPUT_DIR.to_string(),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// Split a comma-separated list, dropping empty entries
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
