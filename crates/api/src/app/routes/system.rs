use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::Response};
use serde_json::json;

use crate::app::dto;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> Response {
    dto::data(
        StatusCode::OK,
        json!({
            "status": "ok",
            "backend": services.backend,
        }),
    )
}

pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> Response {
    dto::data(StatusCode::OK, json!({ "subject": principal.subject() }))
}
