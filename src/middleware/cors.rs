//! Cross-origin policy

use axum::http::HeaderValue;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::config::CorsConfig;

/// Restrict origins when configured, otherwise allow everything
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.trim().parse().ok())
        .collect();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Log once at startup when every origin is allowed
pub fn warn_if_permissive(config: &CorsConfig) {
    if config.allowed_origins.is_empty() {
        warn!("CORS allows every origin; set cors.allowed_origins for production deployments");
    }
}
