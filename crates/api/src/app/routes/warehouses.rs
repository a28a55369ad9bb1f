use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use stockflow_core::WarehouseId;
use stockflow_inventory::NewWarehouse;

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::RequestOrigin;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_warehouses).post(create_warehouse))
        .route("/:id", get(get_warehouse).delete(delete_warehouse))
}

pub async fn list_warehouses(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::WarehouseQuery>,
) -> Response {
    match services.services.warehouses.list(&query.into_filter()).await {
        Ok(rows) => dto::data(StatusCode::OK, rows),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id: WarehouseId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::invalid_id(e),
    };

    match services.services.warehouses.get(id).await {
        Ok(warehouse) => dto::data(StatusCode::OK, warehouse),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn create_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    RequestOrigin(origin): RequestOrigin,
    Json(body): Json<NewWarehouse>,
) -> Response {
    match services.services.warehouses.create(body, &origin).await {
        Ok(warehouse) => dto::data(StatusCode::CREATED, warehouse),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn delete_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    RequestOrigin(origin): RequestOrigin,
    Path(id): Path<String>,
) -> Response {
    let id: WarehouseId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::invalid_id(e),
    };

    match services.services.warehouses.delete(id, &origin).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
