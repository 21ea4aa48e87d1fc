//! Queue module - Admission control for generation jobs

pub mod request_queue;

pub use request_queue::{GenerationQueue, QueueConfig, QueueStats};
