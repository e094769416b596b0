//! Configuration reload endpoint

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub targets: usize,
    pub modules: usize,
}

/// POST /{reload_url}
pub async fn reload(State(state): State<AppState>) -> Result<Json<ReloadResponse>, ApiError> {
    let config = state.reload()?;
    Ok(Json(ReloadResponse {
        targets: config.targets.len(),
        modules: config.modules.len(),
    }))
}
