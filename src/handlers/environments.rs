//! `/environments/{uuid}/` handlers (component G, reading from C)

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub async fn head_environment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let path = state
        .store()
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("unknown environment '{id}'")))?;

    let metadata = tokio::fs::metadata(&path).await.map_err(AppError::from)?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/gzip".to_string()),
            (header::CONTENT_LENGTH, metadata.len().to_string()),
        ],
    )
        .into_response())
}

pub async fn get_environment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let path = state
        .store()
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("unknown environment '{id}'")))?;

    let file = File::open(&path).await.map_err(AppError::from)?;
    let metadata = file.metadata().await.map_err(AppError::from)?;
    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/gzip".to_string()),
            (header::CONTENT_LENGTH, metadata.len().to_string()),
        ],
        body,
    )
        .into_response())
}
