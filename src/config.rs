//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with the `APP__` prefix and `__` as the section separator)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Deployment variables (`HOST`, `PORT`, `OPENAI_API_KEY`)
//! 2. Environment variables (`APP__SERVER__PORT`, `APP__RATE_LIMIT__MAX_REQUESTS`, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! ## Why a double underscore separator:
//! Several keys contain underscores themselves (`max_requests`, `window_ms`), so a
//! single `_` separator could not tell `rate_limit.max_requests` apart from
//! `rate.limit.max.requests`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Longest accepted rate-limit window.
pub const MAX_RATE_LIMIT_WINDOW_MS: u64 = 24 * 60 * 60 * 1000;

/// Main application configuration that contains all settings.
///
/// Configuration is split into logical groups so each part of the service only
/// needs to look at the section it cares about:
/// - `server`: where the HTTP server listens
/// - `providers`: which speech-to-text / language-model API to call and how
/// - `pipeline`: prompt and sampling settings for the three processing steps
/// - `rate_limit`: fixed-window limits for the consultation endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub providers: ProvidersConfig,
    pub pipeline: PipelineConfig,
    pub rate_limit: RateLimitConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
///
/// ## Client addresses:
/// Rate limiting keys on the socket peer IP. Set `trust_forwarded_headers` only
/// when every request arrives through a proxy that overwrites `Forwarded` /
/// `X-Forwarded-For`; otherwise clients could pick their own key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest request body read by the pipeline endpoints
    pub max_body_bytes: usize,
    pub trust_forwarded_headers: bool,
}

/// External AI provider settings.
///
/// Both the transcription and the completion calls go to an OpenAI-compatible API,
/// so they share the key, base URL and timeout.
///
/// ## Fields:
/// - `api_key`: Bearer key; `None` lets the server start but every provider call fails
/// - `api_base`: Base URL without a trailing slash (e.g. "https://api.openai.com/v1")
/// - `transcription_model`: Speech-to-text model (e.g. "whisper-1")
/// - `completion_model`: Chat model used for extraction and diagnosis
/// - `timeout_secs`: Per-request timeout for every outbound call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub transcription_model: String,
    pub completion_model: String,
    pub timeout_secs: u64,
}

/// Settings for the transcription, extraction and diagnosis steps.
///
/// ## Sampling:
/// Extraction runs close to deterministic so identical text yields identical
/// structured output; diagnosis gets a little more room for phrasing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Source language of consultation audio (ISO 639-1, e.g. "en")
    pub language: String,
    /// Priming prompt sent with every transcription request
    pub transcription_prompt: String,
    pub extraction_temperature: f32,
    pub diagnosis_temperature: f32,
}

/// Fixed-window rate limiting settings.
///
/// ## Fields:
/// - `max_requests`: Requests allowed per client address per window
/// - `window_ms`: Window length in milliseconds (15 minutes by default, at most one day)
/// - `max_tracked_clients`: Upper bound on client entries held in memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_ms: u64,
    pub max_tracked_clients: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                max_body_bytes: 1024 * 1024,
                trust_forwarded_headers: false,
            },
            providers: ProvidersConfig {
                api_key: None,
                api_base: "https://api.openai.com/v1".to_string(),
                transcription_model: "whisper-1".to_string(),
                completion_model: "gpt-4o-mini".to_string(),
                timeout_secs: 120,
            },
            pipeline: PipelineConfig {
                language: "en".to_string(),
                transcription_prompt: "Medical consultation between a doctor and a patient. \
                    Includes patient name, age, identification number, symptoms, \
                    vital signs and medical terminology."
                    .to_string(),
                extraction_temperature: 0.1,
                diagnosis_temperature: 0.3,
            },
            rate_limit: RateLimitConfig {
                max_requests: 100,
                window_ms: 15 * 60 * 1000,
                max_tracked_clients: 10_000,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with `APP__`
    /// 4. Handle deployment-platform variables (`HOST`, `PORT`) and the
    ///    conventional `OPENAI_API_KEY`
    ///
    /// ## Environment Variable Examples:
    /// - `APP__SERVER__PORT=3000`
    /// - `APP__PROVIDERS__COMPLETION_MODEL=gpt-4o`
    /// - `APP__RATE_LIMIT__MAX_REQUESTS=20`
    /// - `APP__SERVER__TRUST_FORWARDED_HEADERS=true`
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Ok(api_key) = env::var("OPENAI_API_KEY") {
            settings = settings.set_override("providers.api_key", api_key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port and body limit are not 0
    /// - Model names and the API base are not empty
    /// - Timeouts and rate-limit settings are greater than 0, and the rate-limit
    ///   window is at most one day
    /// - Temperatures are within the provider's accepted range (0.0 to 2.0)
    ///
    /// A missing API key is not an error here: the service can still answer
    /// validation, health and CORS requests without one.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.server.max_body_bytes == 0 {
            return Err(anyhow::anyhow!("Server max_body_bytes must be greater than 0"));
        }

        if self.providers.api_base.trim().is_empty() {
            return Err(anyhow::anyhow!("Provider API base URL cannot be empty"));
        }

        if self.providers.transcription_model.trim().is_empty()
            || self.providers.completion_model.trim().is_empty()
        {
            return Err(anyhow::anyhow!("Provider model names cannot be empty"));
        }

        if self.providers.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Provider timeout must be greater than 0"));
        }

        for (name, value) in [
            ("extraction_temperature", self.pipeline.extraction_temperature),
            ("diagnosis_temperature", self.pipeline.diagnosis_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(anyhow::anyhow!("{} must be between 0.0 and 2.0", name));
            }
        }

        if self.rate_limit.max_requests == 0 {
            return Err(anyhow::anyhow!("Rate limit max_requests must be greater than 0"));
        }

        if self.rate_limit.window_ms == 0 {
            return Err(anyhow::anyhow!("Rate limit window_ms must be greater than 0"));
        }

        if self.rate_limit.window_ms > MAX_RATE_LIMIT_WINDOW_MS {
            return Err(anyhow::anyhow!(
                "Rate limit window_ms cannot exceed {} (one day)",
                MAX_RATE_LIMIT_WINDOW_MS
            ));
        }

        if self.rate_limit.max_tracked_clients == 0 {
            return Err(anyhow::anyhow!("Rate limit max_tracked_clients must be greater than 0"));
        }

        Ok(())
    }

    /// Timeout applied to every outbound provider request.
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.providers.timeout_secs)
    }

    /// Address string passed to `HttpServer::bind`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
