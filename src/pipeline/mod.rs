//! Pipeline module - Inference capability traits, device selection and backends

pub mod device;
pub mod remote;
pub mod synthetic;
pub mod traits;

use std::str::FromStr;
use std::sync::Arc;

use crate::config::ModelConfig;
use crate::error::{AppError, Result};

pub use traits::{
    GenerationOutput, GenerationParams, ImagePipeline, LoadOptions, PipelineLoader, Sampler,
};

/// Available pipeline implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Out-of-process diffusion worker over HTTP
    Remote,
    /// In-process procedural renderer
    Synthetic,
}

impl FromStr for BackendKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "remote" | "http" => Ok(Self::Remote),
            "synthetic" => Ok(Self::Synthetic),
            _ => Err(AppError::Config(config::ConfigError::Message(format!(
                "Invalid model backend '{}'. Must be 'remote' or 'synthetic'",
                s
            )))),
        }
    }
}

/// Build the loader selected by configuration
pub fn create_loader(config: &ModelConfig) -> Result<Arc<dyn PipelineLoader>> {
    match config.backend.parse::<BackendKind>()? {
        BackendKind::Remote => Ok(Arc::new(remote::RemoteLoader::new(config)?)),
        BackendKind::Synthetic => Ok(Arc::new(synthetic::SyntheticLoader)),
    }
}
