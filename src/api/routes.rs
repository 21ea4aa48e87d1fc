//! Router construction

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::api::handlers;
use crate::middleware::{auth::AuthLayer, cors::cors_layer, rate_limit::RateLimitLayer};
use crate::AppState;

/// Build the application router with its middleware stack
pub fn create_router(state: Arc<AppState>) -> Router {
    let settings = state.settings.clone();

    let mut router = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/model", get(handlers::model_info))
        .route("/generate", post(handlers::generate))
        .with_state(state);

    if settings.rate_limit.enabled {
        router = router.layer(RateLimitLayer::new(
            settings.rate_limit.requests_per_second,
            settings.rate_limit.burst_size,
        ));
    }

    if settings.auth.enabled {
        router = router.layer(AuthLayer::new(settings.auth.api_keys.clone()));
    }

    router
        .layer(cors_layer(&settings.cors))
        .layer(TraceLayer::new_for_http())
}
