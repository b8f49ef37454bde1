//! `/execute/` handler (component G, driving E/D/F)
//!
//! Parses the `multipart/form-data` body, merges the uploaded overlay tar
//! over the requested stored base environment, stages it into an acquired
//! slot, runs the command list, and always releases the slot back to the
//! pool regardless of outcome.

use std::time::Duration;

use axum::extract::{Multipart, State};
use axum::Json;

use crate::command::parse_run_request;
use crate::error::{AppError, AppResult};
use crate::executor::{self, ExecuteResponse};
use crate::merge::merge_tar_gz;
use crate::state::AppState;

pub async fn execute(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<ExecuteResponse>> {
    let mut config_json: Option<String> = None;
    let mut overlay: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        match field.name() {
            Some("config") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("invalid 'config' field: {e}")))?;
                config_json = Some(text);
            }
            Some("environment") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("invalid 'environment' field: {e}")))?;
                overlay = Some(bytes.to_vec());
            }
            _ => {}
        }
    }

    let config_json =
        config_json.ok_or_else(|| AppError::BadRequest("missing required field 'config'".to_string()))?;

    let default_timeout = state.config().execution.execute_timeout_seconds;
    let request = parse_run_request(&config_json, default_timeout)?;

    let base = match &request.environment {
        Some(id) => Some(state.store().read(id)?),
        None => None,
    };
    let staged = merge_tar_gz(overlay, base)?;

    let pool = state.pool_handle();
    let guard = pool.acquire_guarded().await?;

    let execute_timeout = Duration::from_secs_f64(state.config().execution.execute_timeout_seconds);
    let environment_ttl =
        Duration::from_secs(state.config().execution.environment_expiration_seconds);

    let result = executor::execute(
        pool.runtime(),
        state.store(),
        &guard,
        staged.as_deref(),
        &request.commands,
        request.result_path.as_deref(),
        request.save,
        execute_timeout,
        environment_ttl,
    )
    .await;

    // Always released, even if `executor::execute` had panicked above: the
    // guard's `Drop` would have spawned the release itself in that case.
    guard.release().await;

    result.map(Json)
}
