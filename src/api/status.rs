//! Backend status endpoint
//!
//! GET /v1/backends/status returns the pool's read-only diagnostic snapshot.
//! Quarantines that have lapsed show as not limited; viewing the snapshot
//! never changes pool state.

use axum::{extract::State, Json};

use crate::server::state::AppState;
use crate::services::backend_pool::ResourceStatus;

/// GET /v1/backends/status
pub async fn backend_status(State(state): State<AppState>) -> Json<Vec<ResourceStatus>> {
    Json(state.dispatcher.snapshot())
}
