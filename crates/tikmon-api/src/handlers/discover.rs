//! Service discovery endpoint
//!
//! Publishes every configured target as a Prometheus static config so the
//! exporter can feed an `http_sd_configs` job.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tikmon_core::Configuration;

use crate::state::AppState;

/// One entry of the discovery list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaticConfig {
    pub targets: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

pub fn static_configs(config: &Configuration) -> Vec<StaticConfig> {
    config
        .targets
        .iter()
        .map(|(name, target)| StaticConfig {
            targets: vec![name.clone()],
            labels: target.discover_labels.clone(),
        })
        .collect()
}

/// GET /{discover_url}
pub async fn discover(State(state): State<AppState>) -> Json<Vec<StaticConfig>> {
    Json(static_configs(&state.config().snapshot()))
}
