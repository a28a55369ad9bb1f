//! Stock movements. Append-only: there is no update or delete route.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};

use stockflow_core::MovementId;
use stockflow_inventory::NewMovement;

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::RequestOrigin;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_transactions).post(create_transaction))
        .route("/:id", get(get_transaction))
}

pub async fn list_transactions(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::TransactionQuery>,
) -> Response {
    let filter = match query.into_filter() {
        Ok(f) => f,
        Err(e) => return errors::service_error_to_response(e.into()),
    };

    match services.services.transactions.list(&filter).await {
        Ok(rows) => dto::data(StatusCode::OK, rows),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_transaction(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id: MovementId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::invalid_id(e),
    };

    match services.services.transactions.get(id).await {
        Ok(movement) => dto::data(StatusCode::OK, movement),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Record a movement; responds with the movement and the row's new quantity.
pub async fn create_transaction(
    Extension(services): Extension<Arc<AppServices>>,
    RequestOrigin(origin): RequestOrigin,
    Json(body): Json<NewMovement>,
) -> Response {
    match services.services.transactions.create(body, &origin).await {
        Ok(recorded) => dto::data(StatusCode::CREATED, recorded),
        Err(e) => errors::service_error_to_response(e),
    }
}
