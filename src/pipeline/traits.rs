//! Common traits and types for diffusion pipelines

use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::SchedulerConfig;
use crate::error::{AppError, Result};
use crate::pipeline::device::{Device, Placement};

/// Sampling strategy label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Sampler {
    #[serde(rename = "DDIM")]
    Ddim,
    #[serde(rename = "DDPM")]
    Ddpm,
    #[serde(rename = "K_DPMPP_2M")]
    KDpmpp2m,
    #[serde(rename = "K_DPMPP_2S_ANCESTRAL")]
    KDpmpp2sAncestral,
    #[serde(rename = "K_DPM_2")]
    KDpm2,
    #[serde(rename = "K_DPM_2_ANCESTRAL")]
    KDpm2Ancestral,
    #[serde(rename = "K_EULER")]
    KEuler,
    #[default]
    #[serde(rename = "K_EULER_ANCESTRAL")]
    KEulerAncestral,
    #[serde(rename = "K_HEUN")]
    KHeun,
    #[serde(rename = "K_LMS")]
    KLms,
}

impl Sampler {
    pub const ALL: [Sampler; 10] = [
        Sampler::Ddim,
        Sampler::Ddpm,
        Sampler::KDpmpp2m,
        Sampler::KDpmpp2sAncestral,
        Sampler::KDpm2,
        Sampler::KDpm2Ancestral,
        Sampler::KEuler,
        Sampler::KEulerAncestral,
        Sampler::KHeun,
        Sampler::KLms,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sampler::Ddim => "DDIM",
            Sampler::Ddpm => "DDPM",
            Sampler::KDpmpp2m => "K_DPMPP_2M",
            Sampler::KDpmpp2sAncestral => "K_DPMPP_2S_ANCESTRAL",
            Sampler::KDpm2 => "K_DPM_2",
            Sampler::KDpm2Ancestral => "K_DPM_2_ANCESTRAL",
            Sampler::KEuler => "K_EULER",
            Sampler::KEulerAncestral => "K_EULER_ANCESTRAL",
            Sampler::KHeun => "K_HEUN",
            Sampler::KLms => "K_LMS",
        }
    }

    /// Ancestral samplers inject fresh noise at every step
    pub fn is_ancestral(&self) -> bool {
        matches!(
            self,
            Sampler::KEulerAncestral | Sampler::KDpm2Ancestral | Sampler::KDpmpp2sAncestral
        )
    }
}

impl fmt::Display for Sampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sampler {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let label = s.trim().to_uppercase();
        Sampler::ALL
            .into_iter()
            .find(|sampler| sampler.as_str() == label)
            .ok_or_else(|| {
                let known: Vec<&str> = Sampler::ALL.iter().map(|s| s.as_str()).collect();
                AppError::Validation(format!(
                    "sampler: unknown sampler '{}', expected one of {}",
                    s,
                    known.join(", ")
                ))
            })
    }
}

/// Fully validated generation parameters handed to a pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationParams {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub cfg_scale: f32,
    pub sampler: Sampler,
    pub samples: u32,
    /// Seed the pipeline must use; fixed before the call so it can be reported back
    pub seed: u64,
}

/// Images produced by a single pipeline call
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub images: Vec<DynamicImage>,
    pub seed: u64,
}

/// Everything a loader needs to bring a model up on a compute target
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub model_id: String,
    pub variant: String,
    pub device: Device,
    pub placement: Placement,
    pub scheduler: SchedulerConfig,
}

impl LoadOptions {
    /// Tensor precision used on the selected device
    pub fn dtype(&self) -> &'static str {
        if self.device.is_accelerator() {
            "float16"
        } else {
            "float32"
        }
    }
}

/// A loaded text-to-image pipeline
#[async_trait]
pub trait ImagePipeline: Send + Sync {
    /// Short identifier of the implementation
    fn name(&self) -> &str;

    /// Run the full sampling loop. This is long running and cannot be interrupted.
    async fn generate(&self, params: GenerationParams) -> Result<GenerationOutput>;
}

/// Brings an [`ImagePipeline`] up. Called at most once per successful load.
#[async_trait]
pub trait PipelineLoader: Send + Sync {
    fn backend(&self) -> &str;

    async fn load(&self, options: &LoadOptions) -> Result<Arc<dyn ImagePipeline>>;
}
