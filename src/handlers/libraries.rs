//! `/libraries/` handler (component G, reading J)

use std::time::Duration;

use axum::extract::State;
use axum::Json;

use crate::error::AppResult;
use crate::libraries::{self, InstalledLibraries};
use crate::state::AppState;

pub async fn libraries(State(state): State<AppState>) -> AppResult<Json<InstalledLibraries>> {
    let pool = state.pool_handle();
    let guard = pool.acquire_guarded().await?;

    let probe_timeout = Duration::from_secs_f64(state.config().execution.execute_timeout_seconds);
    let container = libraries::probe_container(pool.runtime(), &guard.container_id, probe_timeout).await;

    guard.release().await;

    Ok(Json(libraries::installed(&state.config().external_libraries, container)))
}
