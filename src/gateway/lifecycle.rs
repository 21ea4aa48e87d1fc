//! Model lifecycle manager
//!
//! Owns the process-wide handle to the inference pipeline. The handle moves
//! `Unloaded -> Loading -> Ready`, or `Loading -> Failed`; a failed handle is
//! retried by the next caller. At most one load runs at a time: callers that
//! arrive while a load is in flight wait for it and share its outcome.
//! The load itself runs in its own task so a disconnecting caller cannot
//! abandon it half way.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info};

use crate::config::ModelConfig;
use crate::error::{AppError, Result};
use crate::pipeline::device::{Device, DevicePreference, OffloadPolicy, Placement};
use crate::pipeline::{ImagePipeline, LoadOptions, PipelineLoader};

/// Lifecycle state of the model handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelState {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

struct Status {
    state: ModelState,
    pipeline: Option<Arc<dyn ImagePipeline>>,
    device: Option<Device>,
    placement: Option<Placement>,
    loaded_at: Option<DateTime<Utc>>,
    load_duration: Option<Duration>,
    last_error: Option<String>,
    load_attempts: u32,
    finished_loads: u32,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            state: ModelState::Unloaded,
            pipeline: None,
            device: None,
            placement: None,
            loaded_at: None,
            load_duration: None,
            last_error: None,
            load_attempts: 0,
            finished_loads: 0,
        }
    }
}

/// Point-in-time view of the model handle
#[derive(Debug, Clone, Serialize)]
pub struct ModelSnapshot {
    pub state: ModelState,
    pub model_id: String,
    pub backend: String,
    pub device: Option<Device>,
    pub cpu_offload: Option<bool>,
    pub loaded_at: Option<DateTime<Utc>>,
    pub load_duration_ms: Option<u64>,
    pub last_error: Option<String>,
    pub load_attempts: u32,
}

/// Lazily loads the pipeline once and hands it out to every request
pub struct ModelManager {
    loader: Arc<dyn PipelineLoader>,
    config: Arc<ModelConfig>,
    status: Arc<RwLock<Status>>,
    load_lock: Arc<Mutex<()>>,
}

impl ModelManager {
    pub fn new(loader: Arc<dyn PipelineLoader>, config: ModelConfig) -> Self {
        Self {
            loader,
            config: Arc::new(config),
            status: Arc::new(RwLock::new(Status::default())),
            load_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Current state; never waits for a load in progress
    pub fn state(&self) -> ModelState {
        self.status.read().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ModelState::Ready
    }

    pub fn snapshot(&self) -> ModelSnapshot {
        let status = self.status.read();
        ModelSnapshot {
            state: status.state,
            model_id: self.config.model_id.clone(),
            backend: self.loader.backend().to_string(),
            device: status.device,
            cpu_offload: status.placement.map(|p| p == Placement::CpuOffload),
            loaded_at: status.loaded_at,
            load_duration_ms: status.load_duration.map(|d| d.as_millis() as u64),
            last_error: status.last_error.clone(),
            load_attempts: status.load_attempts,
        }
    }

    /// Return the loaded pipeline, loading it first if needed.
    ///
    /// Blocks the caller for the full duration of a load.
    pub async fn ensure_ready(&self) -> Result<Arc<dyn ImagePipeline>> {
        let observed_loads = {
            let status = self.status.read();
            if let Some(pipeline) = ready_pipeline(&status) {
                return Ok(pipeline);
            }
            status.finished_loads
        };

        let guard = self.load_lock.clone().lock_owned().await;

        {
            let status = self.status.read();
            if let Some(pipeline) = ready_pipeline(&status) {
                return Ok(pipeline);
            }
            // A load that finished while we waited failed; share its outcome
            if status.state == ModelState::Failed && status.finished_loads > observed_loads {
                return Err(AppError::Load(
                    status.last_error.clone().unwrap_or_default(),
                ));
            }
        }

        let loader = self.loader.clone();
        let config = self.config.clone();
        let status = self.status.clone();

        let handle = tokio::spawn(async move {
            let mut in_flight = LoadInFlight {
                status: status.clone(),
                _lock: guard,
                settled: false,
            };
            let result = run_load(loader, &config, &status).await;
            in_flight.settled = true;
            result
        });

        handle
            .await
            .map_err(|e| AppError::Load(format!("load task aborted: {}", e)))?
    }
}

/// Held by the load task. If the task unwinds before `run_load` records an
/// outcome, the handle is marked failed before the load lock is released.
struct LoadInFlight {
    status: Arc<RwLock<Status>>,
    _lock: OwnedMutexGuard<()>,
    settled: bool,
}

impl Drop for LoadInFlight {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut status = self.status.write();
        status.state = ModelState::Failed;
        status.pipeline = None;
        status.last_error = Some("model load aborted before completing".to_string());
        status.finished_loads += 1;
        error!("Model load aborted before completing");
    }
}

fn ready_pipeline(status: &Status) -> Option<Arc<dyn ImagePipeline>> {
    match status.state {
        ModelState::Ready => status.pipeline.clone(),
        _ => None,
    }
}

async fn run_load(
    loader: Arc<dyn PipelineLoader>,
    config: &ModelConfig,
    status: &RwLock<Status>,
) -> Result<Arc<dyn ImagePipeline>> {
    {
        let mut status = status.write();
        status.state = ModelState::Loading;
        status.load_attempts += 1;
        status.last_error = None;
    }

    let started = Instant::now();
    let result = match load_options(config) {
        Ok(options) => {
            {
                let mut status = status.write();
                status.device = Some(options.device);
                status.placement = Some(options.placement);
            }
            info!(
                backend = %loader.backend(),
                model = %options.model_id,
                device = %options.device,
                placement = ?options.placement,
                dtype = options.dtype(),
                "Loading model"
            );
            loader.load(&options).await
        }
        Err(e) => Err(e),
    };

    let mut status = status.write();
    status.finished_loads += 1;
    match result {
        Ok(pipeline) => {
            let elapsed = started.elapsed();
            status.state = ModelState::Ready;
            status.pipeline = Some(pipeline.clone());
            status.loaded_at = Some(Utc::now());
            status.load_duration = Some(elapsed);
            info!(
                model = %config.model_id,
                duration_ms = elapsed.as_millis() as u64,
                "Model loaded successfully"
            );
            Ok(pipeline)
        }
        Err(e) => {
            let message = match e {
                AppError::Load(message) => message,
                other => other.to_string(),
            };
            status.state = ModelState::Failed;
            status.last_error = Some(message.clone());
            error!(model = %config.model_id, error = %message, "Error loading model");
            Err(AppError::Load(message))
        }
    }
}

/// Pick the compute target and placement for this load
fn load_options(config: &ModelConfig) -> Result<LoadOptions> {
    let preference: DevicePreference = config
        .device
        .parse()
        .map_err(|e: AppError| AppError::Load(e.to_string()))?;
    let offload: OffloadPolicy = config
        .offload
        .parse()
        .map_err(|e: AppError| AppError::Load(e.to_string()))?;

    let device = preference.resolve()?;
    let placement = offload.placement_for(device);

    Ok(LoadOptions {
        model_id: config.model_id.clone(),
        variant: config.variant.clone(),
        device,
        placement,
        scheduler: config.scheduler.clone(),
    })
}
