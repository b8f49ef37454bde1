//! `/specifications/` and `/usages/` handlers (component G, reading I)

use axum::extract::State;
use axum::Json;

use crate::specs::{self, Specifications, Usage};
use crate::state::AppState;

pub async fn specifications(State(state): State<AppState>) -> Json<Specifications> {
    let mut sys = state.system().lock().await;
    let spec = specs::specifications(
        &mut sys,
        &state.config().container,
        state.docker_version(),
        state.pool().size(),
    );
    Json(spec)
}

pub async fn usages(State(state): State<AppState>) -> Json<Usage> {
    let container_count = state.pool().size().saturating_sub(state.pool().available());
    let mut sys = state.system().lock().await;
    let usage = specs::usage(&mut sys, container_count).await;
    Json(usage)
}
