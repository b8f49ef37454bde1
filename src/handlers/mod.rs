//! HTTP Request Handlers
//!
//! This module contains all HTTP request handlers organized by domain.

pub mod environments;
pub mod execute;
pub mod files;
pub mod health;
pub mod libraries;
pub mod specifications;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Create all API routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .route("/execute/", post(execute::execute))
        .route(
            "/environments/{id}/",
            get(environments::get_environment).head(environments::head_environment),
        )
        .route(
            "/files/{id}/{*path}",
            get(files::get_file).head(files::head_file),
        )
        .route("/specifications/", get(specifications::specifications))
        .route("/usages/", get(specifications::usages))
        .route("/libraries/", get(libraries::libraries))
}
