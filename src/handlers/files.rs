//! `/files/{uuid}/{path...}` handlers (component G, reading from C)

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::AppResult;
use crate::state::AppState;

pub async fn head_file(
    State(state): State<AppState>,
    Path((id, inner_path)): Path<(String, String)>,
) -> AppResult<Response> {
    let size = state.store().file_size(&id, &inner_path)?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_LENGTH, size.to_string())],
    )
        .into_response())
}

pub async fn get_file(
    State(state): State<AppState>,
    Path((id, inner_path)): Path<(String, String)>,
) -> AppResult<Response> {
    let bytes = state.store().extract_file(&id, &inner_path)?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    )
        .into_response())
}
