use axum::{routing::get, Router};

pub mod dashboard;
pub mod inventory;
pub mod products;
pub mod system;
pub mod transactions;
pub mod warehouses;
pub mod ws;

/// Router for the open endpoints (CRUD, dashboard, socket upgrade).
pub fn router() -> Router {
    Router::new()
        .nest("/warehouses", warehouses::router())
        .nest("/products", products::router())
        .nest("/inventory", inventory::router())
        .nest("/transactions", transactions::router())
        .nest("/dashboard", dashboard::router())
        .route("/ws", get(ws::connect))
}

/// Router for endpoints that require a bearer token.
pub fn protected_router() -> Router {
    Router::new()
        .route("/ws/room", get(ws::room_occupancy))
        .route("/whoami", get(system::whoami))
}
