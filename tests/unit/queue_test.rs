//! Unit tests for the generation queue

#[path = "../common/mod.rs"]
mod common;

use common::FakePipeline;
use dotcanvas_ai_service::{
    config::QueueSettings,
    pipeline::{GenerationParams, ImagePipeline, Sampler},
    queue::{GenerationQueue, QueueConfig},
    AppError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

fn params(seed: u64) -> GenerationParams {
    GenerationParams {
        prompt: "a red cube".to_string(),
        negative_prompt: String::new(),
        width: 64,
        height: 64,
        steps: 2,
        cfg_scale: 7.0,
        sampler: Sampler::KEuler,
        samples: 1,
        seed,
    }
}

async fn wait_for_calls(pipeline: &FakePipeline, calls: usize) {
    for _ in 0..100 {
        if pipeline.call_count() >= calls {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("pipeline never reached {} calls", calls);
}

#[test]
fn test_queue_config_defaults() {
    let config = QueueConfig::default();

    assert_eq!(config.max_pending, 16);
    assert_eq!(config.max_concurrent, 1);
    assert!(config.timeout.is_none());
}

#[test]
fn test_queue_config_from_settings() {
    let settings = QueueSettings {
        max_concurrent: 2,
        max_pending: 4,
        timeout_secs: Some(90),
    };

    let config = QueueConfig::from(&settings);
    assert_eq!(config.max_concurrent, 2);
    assert_eq!(config.max_pending, 4);
    assert_eq!(config.timeout, Some(Duration::from_secs(90)));
}

#[tokio::test]
async fn test_submit_returns_pipeline_output() {
    let queue = GenerationQueue::new();
    let pipeline: Arc<dyn ImagePipeline> = Arc::new(FakePipeline::new());

    let output = queue.submit(pipeline, params(5)).await.unwrap();

    assert_eq!(output.seed, 5);
    assert_eq!(output.images.len(), 1);
    assert_eq!(queue.processed_count(), 1);
    assert_eq!(queue.pending_count(), 0);
}

#[tokio::test]
async fn test_jobs_run_one_at_a_time() {
    let gate = Arc::new(Semaphore::new(0));
    let pipeline = Arc::new(FakePipeline::gated(gate.clone()));
    let queue = Arc::new(GenerationQueue::new());

    let first = {
        let queue = queue.clone();
        let pipeline: Arc<dyn ImagePipeline> = pipeline.clone();
        tokio::spawn(async move { queue.submit(pipeline, params(1)).await })
    };
    let second = {
        let queue = queue.clone();
        let pipeline: Arc<dyn ImagePipeline> = pipeline.clone();
        tokio::spawn(async move { queue.submit(pipeline, params(2)).await })
    };

    wait_for_calls(&pipeline, 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pipeline.call_count(), 1);
    assert_eq!(queue.in_flight_count(), 1);
    assert_eq!(queue.pending_count(), 2);

    gate.add_permits(2);
    assert!(first.await.unwrap().is_ok());
    assert!(second.await.unwrap().is_ok());
    assert_eq!(pipeline.call_count(), 2);
    assert_eq!(queue.processed_count(), 2);
}

#[tokio::test]
async fn test_saturated_queue_rejects_without_running() {
    let gate = Arc::new(Semaphore::new(0));
    let pipeline = Arc::new(FakePipeline::gated(gate.clone()));
    let queue = Arc::new(GenerationQueue::with_config(QueueConfig {
        max_pending: 1,
        max_concurrent: 1,
        timeout: None,
    }));

    let running = {
        let queue = queue.clone();
        let pipeline: Arc<dyn ImagePipeline> = pipeline.clone();
        tokio::spawn(async move { queue.submit(pipeline, params(1)).await })
    };
    wait_for_calls(&pipeline, 1).await;

    let rejected = queue.submit(pipeline.clone(), params(2)).await;
    assert!(matches!(rejected, Err(AppError::QueueFull(_))));
    assert_eq!(pipeline.call_count(), 1);

    gate.add_permits(1);
    assert!(running.await.unwrap().is_ok());
    assert_eq!(queue.pending_count(), 0);
}

#[tokio::test]
async fn test_timeout_does_not_cancel_running_job() {
    let gate = Arc::new(Semaphore::new(0));
    let pipeline = Arc::new(FakePipeline::gated(gate.clone()));
    let queue = GenerationQueue::with_config(QueueConfig {
        max_pending: 4,
        max_concurrent: 1,
        timeout: Some(Duration::from_millis(50)),
    });

    let result = queue.submit(pipeline.clone(), params(1)).await;
    assert!(matches!(result, Err(AppError::Timeout(_))));
    assert_eq!(queue.in_flight_count(), 1);

    gate.add_permits(1);
    for _ in 0..100 {
        if queue.processed_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(queue.processed_count(), 1);
    assert_eq!(queue.pending_count(), 0);
}

#[tokio::test]
async fn test_abandoned_waiting_job_is_skipped() {
    let gate = Arc::new(Semaphore::new(0));
    let pipeline = Arc::new(FakePipeline::gated(gate.clone()));
    let queue = Arc::new(GenerationQueue::with_config(QueueConfig {
        max_pending: 4,
        max_concurrent: 1,
        timeout: Some(Duration::from_millis(50)),
    }));

    let first = {
        let queue = queue.clone();
        let pipeline: Arc<dyn ImagePipeline> = pipeline.clone();
        tokio::spawn(async move { queue.submit(pipeline, params(1)).await })
    };
    wait_for_calls(&pipeline, 1).await;

    // Waits behind the running job and gives up before it gets a turn
    let second = queue.submit(pipeline.clone(), params(2)).await;
    assert!(matches!(second, Err(AppError::Timeout(_))));
    assert!(matches!(first.await.unwrap(), Err(AppError::Timeout(_))));

    gate.add_permits(2);
    for _ in 0..100 {
        if queue.pending_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(queue.pending_count(), 0);
    assert_eq!(queue.processed_count(), 1);
    assert_eq!(pipeline.call_count(), 1);
}
