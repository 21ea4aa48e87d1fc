//! In-process pipeline that renders seeded procedural images
//!
//! It walks the same denoising loop shape as a real sampler: every pixel starts
//! as seeded noise and is pulled toward a prompt-derived target over `steps`
//! iterations on a decreasing sigma schedule. Output is deterministic for a
//! given prompt, seed and parameter set. Runs on the blocking thread pool.

use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::TAU;
use std::sync::Arc;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::pipeline::traits::{
    GenerationOutput, GenerationParams, ImagePipeline, LoadOptions, PipelineLoader,
};

/// Loader for [`SyntheticPipeline`]
#[derive(Debug, Default)]
pub struct SyntheticLoader;

/// Procedural stand-in for a diffusion model
#[derive(Debug)]
pub struct SyntheticPipeline {
    model_id: String,
    style: u64,
}

impl SyntheticPipeline {
    pub fn new(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            style: fnv1a(model_id.as_bytes()),
        }
    }

    /// Render every requested sample synchronously
    pub fn render(&self, params: &GenerationParams) -> Vec<DynamicImage> {
        (0..params.samples)
            .map(|index| DynamicImage::ImageRgb8(render_sample(params, self.style, index)))
            .collect()
    }
}

#[async_trait]
impl PipelineLoader for SyntheticLoader {
    fn backend(&self) -> &str {
        "synthetic"
    }

    async fn load(&self, options: &LoadOptions) -> Result<Arc<dyn ImagePipeline>> {
        debug!(
            model = %options.model_id,
            device = %options.device,
            "Preparing synthetic pipeline"
        );
        Ok(Arc::new(SyntheticPipeline::new(&options.model_id)))
    }
}

#[async_trait]
impl ImagePipeline for SyntheticPipeline {
    fn name(&self) -> &str {
        &self.model_id
    }

    async fn generate(&self, params: GenerationParams) -> Result<GenerationOutput> {
        let pipeline = SyntheticPipeline {
            model_id: self.model_id.clone(),
            style: self.style,
        };
        let seed = params.seed;

        let images = tokio::task::spawn_blocking(move || pipeline.render(&params))
            .await
            .map_err(|e| AppError::Inference(format!("Sampling task failed: {}", e)))?;

        Ok(GenerationOutput { images, seed })
    }
}

struct Conditioning {
    start: [f32; 3],
    end: [f32; 3],
    frequency: f32,
}

fn conditioning(params: &GenerationParams, style: u64) -> Conditioning {
    let hash = fnv1a(params.prompt.as_bytes())
        ^ style
        ^ fnv1a(params.negative_prompt.as_bytes()).rotate_left(17);

    let channel = |shift: u32| ((hash >> shift) & 0xff) as f32 / 255.0;
    Conditioning {
        start: [channel(0), channel(8), channel(16)],
        end: [channel(24), channel(32), channel(40)],
        frequency: 1.0 + ((hash >> 48) & 0x7) as f32,
    }
}

fn render_sample(params: &GenerationParams, style: u64, index: u32) -> RgbImage {
    let cond = conditioning(params, style);
    let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(u64::from(index)));

    let steps = params.steps.max(1);
    let sigma_min = 0.08 / (steps as f32).sqrt();
    let sigmas: Vec<f32> = (0..=steps)
        .map(|k| 1.0 - (1.0 - sigma_min) * k as f32 / steps as f32)
        .collect();
    let guidance = (params.cfg_scale / 7.0).clamp(0.25, 3.0);
    let ancestral = params.sampler.is_ancestral();

    let (width, height) = (params.width, params.height);
    let mut image = RgbImage::new(width, height);

    for y in 0..height {
        let v = y as f32 / height as f32;
        for x in 0..width {
            let u = x as f32 / width as f32;
            let t = (u + v) * 0.5;
            let wave = (u * cond.frequency * TAU).sin() * (v * cond.frequency * TAU).cos() * 0.15;

            let mut pixel = [0u8; 3];
            for (c, out) in pixel.iter_mut().enumerate() {
                let base = cond.start[c] * (1.0 - t) + cond.end[c] * t + wave;
                let target = (0.5 + (base - 0.5) * guidance).clamp(0.0, 1.0);

                let mut value: f32 = rng.gen();
                for window in sigmas.windows(2) {
                    let (current, next) = (window[0], window[1]);
                    value = target + (value - target) * (next / current);
                    if ancestral {
                        value += (rng.gen::<f32>() - 0.5) * 0.02 * next;
                    }
                }
                *out = (value.clamp(0.0, 1.0) * 255.0).round() as u8;
            }
            image.put_pixel(x, y, Rgb(pixel));
        }
    }

    image
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}
