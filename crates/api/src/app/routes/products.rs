use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use stockflow_core::ProductId;
use stockflow_inventory::NewProduct;

use crate::app::{dto, errors};
use crate::app::services::AppServices;
use crate::context::RequestOrigin;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/:id", get(get_product).delete(delete_product))
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ProductQuery>,
) -> Response {
    match services.services.products.list(&query.into_filter()).await {
        Ok(rows) => dto::data(StatusCode::OK, rows),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> Response {
    let id: ProductId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::invalid_id(e),
    };

    match services.services.products.get(id).await {
        Ok(product) => dto::data(StatusCode::OK, product),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    RequestOrigin(origin): RequestOrigin,
    Json(body): Json<NewProduct>,
) -> Response {
    match services.services.products.create(body, &origin).await {
        Ok(product) => dto::data(StatusCode::CREATED, product),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Deleting a product cascades to its inventory rows and their movements.
pub async fn delete_product(
    Extension(services): Extension<Arc<AppServices>>,
    RequestOrigin(origin): RequestOrigin,
    Path(id): Path<String>,
) -> Response {
    let id: ProductId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::invalid_id(e),
    };

    match services.services.products.delete(id, &origin).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
