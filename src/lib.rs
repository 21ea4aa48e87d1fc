//! DotCanvas AI image generation service
//!
//! An HTTP gateway that lazily loads a text-to-image diffusion pipeline on
//! first use, admits generation jobs through a bounded queue and answers with
//! PNG data URLs.

pub mod api;
pub mod config;
pub mod error;
pub mod gateway;
pub mod middleware;
pub mod pipeline;
pub mod queue;
pub mod response;

pub use error::{AppError, Result};

use std::sync::Arc;

use gateway::{GenerationService, ModelManager};
use pipeline::PipelineLoader;
use queue::{GenerationQueue, QueueConfig};

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<config::Settings>,
    pub models: Arc<ModelManager>,
    pub queue: Arc<GenerationQueue>,
    pub service: GenerationService,
}

impl AppState {
    /// Wire the state around an explicit loader. Must be called inside a Tokio runtime.
    pub fn new(settings: config::Settings, loader: Arc<dyn PipelineLoader>) -> Self {
        let models = Arc::new(ModelManager::new(loader, settings.model.clone()));
        let queue = Arc::new(GenerationQueue::with_config(QueueConfig::from(&settings.queue)));
        let service = GenerationService::new(models.clone(), queue.clone());

        Self {
            settings: Arc::new(settings),
            models,
            queue,
            service,
        }
    }

    /// Wire the state with the loader selected by `settings.model.backend`
    pub fn from_settings(settings: config::Settings) -> Result<Self> {
        let loader = pipeline::create_loader(&settings.model)?;
        Ok(Self::new(settings, loader))
    }
}
