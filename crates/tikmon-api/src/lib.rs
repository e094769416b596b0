//! tikmon-api - HTTP endpoints of the tikmon exporter
//!
//! Serves the scrape endpoint Prometheus calls with `?target=`, the service
//! discovery list, the configuration reload hook and a health check. The
//! URL paths come from the `global` section and are fixed at startup.
//!
//! # Usage
//!
//! ```ignore
//! use tikmon_api::{create_router, AppState};
//!
//! let state = AppState::new(config, scraper);
//! let router = create_router(state);
//! axum::serve(listener, router).await?;
//! ```

pub mod error;
pub mod handlers;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

use axum::body::Body;
use axum::http::Request;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info_span;

/// Create the exporter router with the given application state
pub fn create_router(state: AppState) -> Router {
    let global = state.config().snapshot().global.clone();

    let mut router = Router::new()
        .route("/health", get(|| async { "OK" }))
        .route(&path(&global.metrics_url), get(handlers::metrics::scrape));

    // an empty path disables the endpoint
    if !global.discover_url.is_empty() {
        router = router.route(
            &path(&global.discover_url),
            get(handlers::discover::discover),
        );
    }
    if !global.reload_url.is_empty() {
        router = router.route(&path(&global.reload_url), post(handlers::reload::reload));
    }

    let ids = state.clone();
    router
        .layer(
            TraceLayer::new_for_http().make_span_with(move |request: &Request<Body>| {
                info_span!(
                    "request",
                    id = ids.next_request_id(),
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .with_state(state)
}

fn path(url: &str) -> String {
    format!("/{}", url.trim_start_matches('/'))
}
