//! Request and response bodies of the HTTP API

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::LimitsConfig;
use crate::error::{AppError, Result};
use crate::gateway::ModelSnapshot;
use crate::pipeline::{GenerationParams, Sampler};
use crate::queue::QueueStats;

pub const DEFAULT_NEGATIVE_PROMPT: &str = "blurry, low quality, distorted, deformed, disfigured";
pub const DEFAULT_DIMENSION: u32 = 512;
pub const DEFAULT_STEPS: u32 = 30;
pub const DEFAULT_CFG_SCALE: f32 = 7.0;
pub const DEFAULT_SAMPLES: u32 = 1;

/// Body of `POST /generate`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    #[serde(
        default,
        rename = "cfgScale",
        alias = "cfg_scale",
        skip_serializing_if = "Option::is_none"
    )]
    pub cfg_scale: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampler: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples: Option<u32>,
    /// Fixed seed; a random one is drawn when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Apply defaults, check every field against `limits` and fix the seed
    pub fn into_params(self, limits: &LimitsConfig) -> Result<GenerationParams> {
        if self.prompt.trim().is_empty() {
            return Err(AppError::Validation("prompt: must not be empty".to_string()));
        }

        let width = self.width.unwrap_or(DEFAULT_DIMENSION);
        let height = self.height.unwrap_or(DEFAULT_DIMENSION);
        check_dimension("width", width, limits.max_dimension)?;
        check_dimension("height", height, limits.max_dimension)?;

        let steps = self.steps.unwrap_or(DEFAULT_STEPS);
        if steps == 0 || steps > limits.max_steps {
            return Err(AppError::Validation(format!(
                "steps: must be between 1 and {}",
                limits.max_steps
            )));
        }

        let cfg_scale = self.cfg_scale.unwrap_or(DEFAULT_CFG_SCALE);
        if !cfg_scale.is_finite() || cfg_scale <= 0.0 || cfg_scale > limits.max_cfg_scale {
            return Err(AppError::Validation(format!(
                "cfgScale: must be greater than 0 and at most {}",
                limits.max_cfg_scale
            )));
        }

        let samples = self.samples.unwrap_or(DEFAULT_SAMPLES);
        if samples == 0 || samples > limits.max_samples {
            return Err(AppError::Validation(format!(
                "samples: must be between 1 and {}",
                limits.max_samples
            )));
        }

        let sampler = match self.sampler.as_deref() {
            Some(label) => label.parse::<Sampler>()?,
            None => Sampler::default(),
        };

        let seed = self
            .seed
            .unwrap_or_else(|| rand::thread_rng().gen_range(0..=u64::from(u32::MAX)));

        Ok(GenerationParams {
            prompt: self.prompt,
            negative_prompt: self
                .negative_prompt
                .unwrap_or_else(|| DEFAULT_NEGATIVE_PROMPT.to_string()),
            width,
            height,
            steps,
            cfg_scale,
            sampler,
            samples,
            seed,
        })
    }
}

fn check_dimension(field: &str, value: u32, max: u32) -> Result<()> {
    if value == 0 || value > max {
        return Err(AppError::Validation(format!(
            "{}: must be between 1 and {}",
            field, max
        )));
    }
    Ok(())
}
