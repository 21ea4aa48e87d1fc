//! Pipeline backed by an out-of-process diffusion worker reached over HTTP
//!
//! The worker owns the weights and the accelerator. `POST /load` brings the
//! model up with the requested device, precision and scheduler; `POST /generate`
//! runs one sampling call and answers with base64 encoded images.

use async_trait::async_trait;
use image::DynamicImage;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ModelConfig;
use crate::error::{AppError, Result};
use crate::pipeline::device::Placement;
use crate::pipeline::traits::{
    GenerationOutput, GenerationParams, ImagePipeline, LoadOptions, PipelineLoader,
};
use crate::response::base64;

/// Loader that asks a remote worker to load the model
pub struct RemoteLoader {
    endpoint: String,
    client: Client,
}

/// Handle to a model that a remote worker has loaded
pub struct RemotePipeline {
    model_id: String,
    endpoint: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ApiLoadRequest<'a> {
    model_id: &'a str,
    variant: &'a str,
    torch_dtype: &'a str,
    device: String,
    cpu_offload: bool,
    scheduler: ApiScheduler<'a>,
}

#[derive(Debug, Serialize)]
struct ApiScheduler<'a> {
    name: &'a str,
    algorithm_type: &'a str,
    use_karras_sigmas: bool,
}

#[derive(Debug, Serialize)]
struct ApiGenerateRequest<'a> {
    prompt: &'a str,
    negative_prompt: &'a str,
    width: u32,
    height: u32,
    num_inference_steps: u32,
    guidance_scale: f32,
    sampler: &'a str,
    num_images_per_prompt: u32,
    seed: u64,
}

/// Worker response; both `images` and OpenAI style `data` lists are accepted
#[derive(Debug, Deserialize)]
struct ApiGenerateResponse {
    #[serde(default)]
    images: Vec<ApiImageData>,
    #[serde(default)]
    data: Vec<ApiImageData>,
    #[serde(default)]
    seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiImageData {
    Encoded(String),
    Object {
        #[serde(default)]
        b64_json: Option<String>,
        #[serde(default)]
        base64: Option<String>,
    },
}

impl ApiImageData {
    fn into_encoded(self) -> Option<String> {
        match self {
            ApiImageData::Encoded(data) => Some(data),
            ApiImageData::Object { b64_json, base64 } => b64_json.or(base64),
        }
    }
}

/// Worker error body, FastAPI style or plain message
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl RemoteLoader {
    /// Create a new loader from configuration
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl PipelineLoader for RemoteLoader {
    fn backend(&self) -> &str {
        "remote"
    }

    async fn load(&self, options: &LoadOptions) -> Result<Arc<dyn ImagePipeline>> {
        let url = format!("{}/load", self.endpoint);
        let body = ApiLoadRequest {
            model_id: &options.model_id,
            variant: &options.variant,
            torch_dtype: options.dtype(),
            device: options.device.to_string(),
            cpu_offload: options.placement == Placement::CpuOffload,
            scheduler: ApiScheduler {
                name: &options.scheduler.name,
                algorithm_type: &options.scheduler.algorithm_type,
                use_karras_sigmas: options.scheduler.use_karras_sigmas,
            },
        };

        debug!(endpoint = %self.endpoint, model = %options.model_id, "Requesting model load");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Load(format!("Connection failed to {}: {}", self.endpoint, e)))?;

        if !response.status().is_success() {
            return Err(AppError::Load(worker_error(response).await));
        }

        info!(endpoint = %self.endpoint, model = %options.model_id, "Worker loaded model");

        Ok(Arc::new(RemotePipeline {
            model_id: options.model_id.clone(),
            endpoint: self.endpoint.clone(),
            client: self.client.clone(),
        }))
    }
}

#[async_trait]
impl ImagePipeline for RemotePipeline {
    fn name(&self) -> &str {
        &self.model_id
    }

    async fn generate(&self, params: GenerationParams) -> Result<GenerationOutput> {
        let url = format!("{}/generate", self.endpoint);
        let body = ApiGenerateRequest {
            prompt: &params.prompt,
            negative_prompt: &params.negative_prompt,
            width: params.width,
            height: params.height,
            num_inference_steps: params.steps,
            guidance_scale: params.cfg_scale,
            sampler: params.sampler.as_str(),
            num_images_per_prompt: params.samples,
            seed: params.seed,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Inference(format!("Worker at {} timed out: {}", self.endpoint, e))
                } else {
                    AppError::Inference(format!("Connection failed to {}: {}", self.endpoint, e))
                }
            })?;

        if !response.status().is_success() {
            return Err(AppError::Inference(worker_error(response).await));
        }

        let api_response = response
            .json::<ApiGenerateResponse>()
            .await
            .map_err(|e| AppError::Inference(format!("Failed to parse worker response: {}", e)))?;

        let seed = api_response.seed.unwrap_or(params.seed);
        let encoded: Vec<String> = api_response
            .images
            .into_iter()
            .chain(api_response.data)
            .filter_map(ApiImageData::into_encoded)
            .collect();

        if encoded.is_empty() {
            return Err(AppError::Inference("Worker returned no images".to_string()));
        }

        let images = tokio::task::spawn_blocking(move || decode_images(&encoded))
            .await
            .map_err(|e| AppError::Internal(format!("Image decoding task failed: {}", e)))??;

        Ok(GenerationOutput { images, seed })
    }
}

fn decode_images(encoded: &[String]) -> Result<Vec<DynamicImage>> {
    encoded
        .iter()
        .map(|data| {
            let bytes = base64::decode(data).map_err(|e| {
                AppError::Inference(format!("Worker returned invalid image data: {}", e))
            })?;
            image::load_from_memory(&bytes)
                .map_err(|e| AppError::Inference(format!("Worker returned an unreadable image: {}", e)))
        })
        .collect()
}

async fn worker_error(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorResponse>(&body)
        .ok()
        .and_then(|e| e.detail.or(e.message))
        .unwrap_or(body);
    format!("Worker returned {}: {}", status, message)
}
