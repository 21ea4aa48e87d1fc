//! Bounded admission queue in front of the inference pipeline

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::{debug, warn};

use crate::config::QueueSettings;
use crate::error::{AppError, Result};
use crate::pipeline::{GenerationOutput, GenerationParams, ImagePipeline};

/// Job with its response channel
struct QueuedJob {
    pipeline: Arc<dyn ImagePipeline>,
    params: GenerationParams,
    response_tx: oneshot::Sender<Result<GenerationOutput>>,
    _slot: PendingSlot,
}

/// Configuration for the generation queue
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of admitted jobs, waiting or running
    pub max_pending: usize,
    /// Maximum number of jobs running against the pipeline at once
    pub max_concurrent: usize,
    /// How long a caller waits for its result
    pub timeout: Option<Duration>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_pending: 16,
            max_concurrent: 1,
            timeout: None,
        }
    }
}

impl From<&QueueSettings> for QueueConfig {
    fn from(settings: &QueueSettings) -> Self {
        Self {
            max_pending: settings.max_pending,
            max_concurrent: settings.max_concurrent,
            timeout: settings.timeout_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Default)]
struct QueueCounters {
    pending: AtomicU64,
    in_flight: AtomicU64,
    processed: AtomicU64,
}

/// Admission slot; released when the job is finished or dropped
struct PendingSlot(Arc<QueueCounters>);

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.0.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Generation queue that serializes access to the pipeline
pub struct GenerationQueue {
    request_tx: mpsc::Sender<QueuedJob>,
    config: QueueConfig,
    counters: Arc<QueueCounters>,
}

impl GenerationQueue {
    /// Create a new queue with default configuration
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    /// Create a new queue with custom configuration. Must be called inside a Tokio runtime.
    pub fn with_config(config: QueueConfig) -> Self {
        let max_pending = config.max_pending.max(1);
        let (request_tx, request_rx) = mpsc::channel(max_pending);
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        let counters = Arc::new(QueueCounters::default());

        tokio::spawn(Self::process_jobs(request_rx, semaphore, counters.clone()));

        Self {
            request_tx,
            config,
            counters,
        }
    }

    /// Submit a job and wait for its result
    pub async fn submit(
        &self,
        pipeline: Arc<dyn ImagePipeline>,
        params: GenerationParams,
    ) -> Result<GenerationOutput> {
        let slot = self.reserve_slot()?;
        let (response_tx, response_rx) = oneshot::channel();

        let job = QueuedJob {
            pipeline,
            params,
            response_tx,
            _slot: slot,
        };

        self.request_tx
            .send(job)
            .await
            .map_err(|_| AppError::Internal("Failed to queue request".to_string()))?;

        debug!(pending = self.pending_count(), "Job queued");

        let result = match self.config.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, response_rx).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(timeout_secs = timeout.as_secs(), "Caller gave up waiting for generation");
                    return Err(AppError::Timeout(format!(
                        "Image generation did not finish within {} seconds",
                        timeout.as_secs()
                    )));
                }
            },
            None => response_rx.await,
        };

        result.unwrap_or_else(|_| {
            Err(AppError::Internal("Request processing was cancelled".to_string()))
        })
    }

    fn reserve_slot(&self) -> Result<PendingSlot> {
        let max_pending = self.config.max_pending as u64;
        self.counters
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |pending| {
                (pending < max_pending).then_some(pending + 1)
            })
            .map_err(|pending| {
                warn!(pending = pending, "Generation queue is full");
                AppError::QueueFull(format!(
                    "{} requests already waiting, try again later",
                    pending
                ))
            })?;
        Ok(PendingSlot(self.counters.clone()))
    }

    /// Run admitted jobs, at most `max_concurrent` at a time
    async fn process_jobs(
        mut request_rx: mpsc::Receiver<QueuedJob>,
        semaphore: Arc<Semaphore>,
        counters: Arc<QueueCounters>,
    ) {
        while let Some(job) = request_rx.recv().await {
            let sem = semaphore.clone();
            let counters = counters.clone();

            tokio::spawn(async move {
                let QueuedJob {
                    pipeline,
                    params,
                    response_tx,
                    _slot: slot,
                } = job;

                let _permit = match sem.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        let _ = response_tx.send(Err(AppError::Internal(
                            "Failed to acquire processing permit".to_string(),
                        )));
                        return;
                    }
                };

                // Nobody is waiting for this result any more
                if response_tx.is_closed() {
                    debug!(seed = params.seed, "Skipping job abandoned by its caller");
                    return;
                }

                counters.in_flight.fetch_add(1, Ordering::AcqRel);
                debug!(pipeline = %pipeline.name(), seed = params.seed, "Processing job");

                // Runs to completion even when the caller has gone away
                let result = pipeline.generate(params).await;

                drop(slot);
                counters.in_flight.fetch_sub(1, Ordering::AcqRel);
                counters.processed.fetch_add(1, Ordering::AcqRel);

                let _ = response_tx.send(result);
            });
        }
    }

    /// Number of admitted jobs, waiting or running
    pub fn pending_count(&self) -> u64 {
        self.counters.pending.load(Ordering::Acquire)
    }

    /// Number of jobs currently running
    pub fn in_flight_count(&self) -> u64 {
        self.counters.in_flight.load(Ordering::Acquire)
    }

    /// Number of finished jobs
    pub fn processed_count(&self) -> u64 {
        self.counters.processed.load(Ordering::Acquire)
    }

    /// Get queue statistics
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.pending_count(),
            in_flight: self.in_flight_count(),
            processed: self.processed_count(),
            max_pending: self.config.max_pending,
            max_concurrent: self.config.max_concurrent,
        }
    }
}

impl Default for GenerationQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue statistics
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub in_flight: u64,
    pub processed: u64,
    pub max_pending: usize,
    pub max_concurrent: usize,
}
