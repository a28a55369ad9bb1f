use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::Response,
    routing::get,
    Router,
};

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/counts", get(counts))
        .route("/transactions/recent", get(recent_transactions))
}

pub async fn counts(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.services.dashboard.counts().await {
        Ok(counts) => dto::data(StatusCode::OK, counts),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn recent_transactions(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::RecentQuery>,
) -> Response {
    match services.services.dashboard.recent_transactions(query.limit).await {
        Ok(rows) => dto::data(StatusCode::OK, rows),
        Err(e) => errors::service_error_to_response(e),
    }
}
