//! Generation use case: ensure the model, admit the job, encode the result

use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::gateway::lifecycle::ModelManager;
use crate::pipeline::GenerationParams;
use crate::queue::GenerationQueue;
use crate::response;

/// Encoded images and the seed that produced them
#[derive(Debug, Clone)]
pub struct GeneratedImages {
    /// PNG data URLs, one per sample
    pub images: Vec<String>,
    pub seed: u64,
}

pub struct GenerationService {
    models: Arc<ModelManager>,
    queue: Arc<GenerationQueue>,
}

impl GenerationService {
    pub fn new(models: Arc<ModelManager>, queue: Arc<GenerationQueue>) -> Self {
        Self { models, queue }
    }

    pub async fn generate(&self, params: GenerationParams) -> Result<GeneratedImages> {
        let span = info_span!("generate", request_id = %Uuid::new_v4());

        async move {
            let pipeline = self.models.ensure_ready().await?;

            info!(
                width = params.width,
                height = params.height,
                steps = params.steps,
                sampler = %params.sampler,
                samples = params.samples,
                seed = params.seed,
                "Generating image"
            );

            let started = Instant::now();
            let output = self.queue.submit(pipeline, params).await?;
            if output.images.is_empty() {
                return Err(AppError::Inference("pipeline returned no images".to_string()));
            }

            let seed = output.seed;
            let images = tokio::task::spawn_blocking(move || response::png_data_urls(&output.images))
                .await
                .map_err(|e| AppError::Encoding(format!("encoding task failed: {}", e)))??;

            info!(
                seed = seed,
                images = images.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Image generated"
            );

            Ok(GeneratedImages { images, seed })
        }
        .instrument(span)
        .await
    }
}
