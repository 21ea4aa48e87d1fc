//! Application settings and configuration management

use crate::error::{AppError, Result};
use crate::pipeline::device::{DevicePreference, OffloadPolicy};
use crate::pipeline::BackendKind;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable naming an alternative configuration file
pub const CONFIG_PATH_ENV: &str = "DOTCANVAS_CONFIG";

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Diffusion model and inference backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    /// Which pipeline implementation to load: "remote" or "synthetic"
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Weight variant requested from the model repository
    #[serde(default = "default_variant")]
    pub variant: String,
    /// "auto", "cpu", "cuda" or "cuda:<ordinal>"
    #[serde(default = "default_auto")]
    pub device: String,
    /// "auto", "always" or "never"
    #[serde(default = "default_auto")]
    pub offload: String,
    /// Base URL of the diffusion worker (remote backend only)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

fn default_backend() -> String {
    "remote".to_string()
}

fn default_model_id() -> String {
    "stabilityai/sdxl-lightning".to_string()
}

fn default_variant() -> String {
    "fp16".to_string()
}

fn default_auto() -> String {
    "auto".to_string()
}

fn default_endpoint() -> String {
    "http://127.0.0.1:7860".to_string()
}

fn default_request_timeout() -> u64 {
    600
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            model_id: default_model_id(),
            variant: default_variant(),
            device: default_auto(),
            offload: default_auto(),
            endpoint: default_endpoint(),
            request_timeout_secs: default_request_timeout(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// Noise scheduler configuration, tuned for low step counts
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_scheduler_name")]
    pub name: String,
    #[serde(default = "default_algorithm_type")]
    pub algorithm_type: String,
    #[serde(default = "default_true")]
    pub use_karras_sigmas: bool,
}

fn default_scheduler_name() -> String {
    "DPMSolverMultistepScheduler".to_string()
}

fn default_algorithm_type() -> String {
    "sde-dpmsolver++".to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: default_scheduler_name(),
            algorithm_type: default_algorithm_type(),
            use_karras_sigmas: true,
        }
    }
}

/// Admission control in front of the inference pipeline
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueSettings {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
    /// How long a caller waits for its result; unset waits indefinitely
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_max_concurrent() -> usize {
    1
}

fn default_max_pending() -> usize {
    16
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_pending: default_max_pending(),
            timeout_secs: None,
        }
    }
}

/// Upper bounds enforced on generation requests
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_max_samples")]
    pub max_samples: u32,
    #[serde(default = "default_max_cfg_scale")]
    pub max_cfg_scale: f32,
}

fn default_max_dimension() -> u32 {
    2048
}

fn default_max_steps() -> u32 {
    150
}

fn default_max_samples() -> u32 {
    4
}

fn default_max_cfg_scale() -> f32 {
    30.0
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_dimension: default_max_dimension(),
            max_steps: default_max_steps(),
            max_samples: default_max_samples(),
            max_cfg_scale: default_max_cfg_scale(),
        }
    }
}

/// Cross-origin policy; an empty list allows every origin
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CorsConfig {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// Authentication configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_keys: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_rps")]
    pub requests_per_second: u32,
    #[serde(default = "default_burst")]
    pub burst_size: u32,
}

fn default_rps() -> u32 {
    10
}

fn default_burst() -> u32 {
    20
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: default_rps(),
            burst_size: default_burst(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Settings {
    /// Load settings from the configuration file and environment variables
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .unwrap_or_else(|_| "config/default.toml".to_string());
        Self::load_from_path(path)
    }

    /// Load settings from a specific configuration file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_string_lossy().to_string();

        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", i64::from(default_port()))?
            .add_source(File::with_name(&path).required(false))
            // Override with environment variables, e.g. DOTCANVAS__SERVER__PORT
            .add_source(
                Environment::with_prefix("DOTCANVAS")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("auth.api_keys")
                    .with_list_parse_key("cors.allowed_origins")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(invalid("Server port cannot be 0"));
        }

        let backend: BackendKind = self.model.backend.parse()?;
        self.model.device.parse::<DevicePreference>()?;
        self.model.offload.parse::<OffloadPolicy>()?;

        if backend == BackendKind::Remote && self.model.endpoint.trim().is_empty() {
            return Err(invalid("model.endpoint is required for the remote backend"));
        }
        if self.model.model_id.trim().is_empty() {
            return Err(invalid("model.model_id cannot be empty"));
        }

        if self.queue.max_concurrent == 0 {
            return Err(invalid("queue.max_concurrent must be at least 1"));
        }
        if self.queue.max_pending < self.queue.max_concurrent {
            return Err(invalid(
                "queue.max_pending cannot be smaller than queue.max_concurrent",
            ));
        }

        if self.limits.max_dimension < 8 || self.limits.max_steps == 0 || self.limits.max_samples == 0
        {
            return Err(invalid("limits must allow at least one valid request"));
        }
        if !(self.limits.max_cfg_scale.is_finite() && self.limits.max_cfg_scale > 0.0) {
            return Err(invalid("limits.max_cfg_scale must be a positive number"));
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err(invalid(&format!(
                "logging.format '{}' must be 'json' or 'pretty'",
                self.logging.format
            )));
        }

        Ok(())
    }
}

fn invalid(message: &str) -> AppError {
    AppError::Config(config::ConfigError::Message(message.to_string()))
}
