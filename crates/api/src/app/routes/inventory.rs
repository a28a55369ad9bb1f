use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use stockflow_core::InventoryId;
use stockflow_inventory::NewInventory;

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::RequestOrigin;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_inventory).post(create_inventory))
        .route("/:id", get(get_inventory).delete(delete_inventory))
}

pub async fn list_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::InventoryQuery>,
) -> Response {
    let filter = match query.into_filter() {
        Ok(f) => f,
        Err(e) => return errors::invalid_id(e),
    };

    match services.services.inventory.list(&filter).await {
        Ok(rows) => dto::data(StatusCode::OK, rows),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id: InventoryId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::invalid_id(e),
    };

    match services.services.inventory.get(id).await {
        Ok(record) => dto::data(StatusCode::OK, record),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// New rows always start at quantity 0; stock arrives through `/transactions`.
pub async fn create_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    RequestOrigin(origin): RequestOrigin,
    Json(body): Json<NewInventory>,
) -> Response {
    match services.services.inventory.create(body, &origin).await {
        Ok(record) => dto::data(StatusCode::CREATED, record),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn delete_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    RequestOrigin(origin): RequestOrigin,
    Path(id): Path<String>,
) -> Response {
    let id: InventoryId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::invalid_id(e),
    };

    match services.services.inventory.delete(id, &origin).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
