//! Scrape endpoint

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tikmon_engine::ScrapeError;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

/// Scrape query parameters
#[derive(Debug, Default, Deserialize)]
pub struct ScrapeQuery {
    /// Target name from the configuration
    pub target: Option<String>,
    /// Comma separated module names, the target's defaults when absent
    pub module: Option<String>,
}

impl ScrapeQuery {
    fn modules(&self) -> Vec<String> {
        self.module
            .as_deref()
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Scrape a target and return its registry in the text format
///
/// GET /{metrics_url}?target=<name>[&module=a,b]
pub async fn scrape(
    State(state): State<AppState>,
    Query(query): Query<ScrapeQuery>,
) -> Result<Response, ApiError> {
    let target = query
        .target
        .as_deref()
        .filter(|target| !target.is_empty())
        .ok_or(ScrapeError::TargetMissing)?;
    let modules = query.modules();

    let config = state.config().snapshot();
    state.scraper().scrape(&config, target, &modules).await?;
    let body = state.scraper().encode(target)?;

    info!(%target, bytes = body.len(), "scrape served");
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response())
}
