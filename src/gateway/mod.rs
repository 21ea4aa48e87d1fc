//! Gateway module - Model lifecycle and the generation use case

pub mod lifecycle;
pub mod service;

pub use lifecycle::{ModelManager, ModelSnapshot, ModelState};
pub use service::{GeneratedImages, GenerationService};
