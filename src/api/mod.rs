//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Order endpoints are mounted under `/api`; `/health` sits at the root.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI documentation for the swapflow REST API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "swapflow",
        version = "0.1.0",
        description = "Swap-order execution engine: durable orders, best-venue routing, live lifecycle streaming.",
        license(name = "MIT"),
    ),
    tags(
        (name = "System", description = "Health check"),
        (name = "Orders", description = "Order submission, lookup, cancellation"),
    ),
    paths(
        handlers::system::health_handler,
        handlers::orders::create_order,
        handlers::orders::get_order,
        handlers::orders::list_orders,
        handlers::orders::count_orders,
        handlers::orders::cancel_order,
    ),
    components(schemas(
        crate::domain::OrderId,
        crate::domain::Order,
        crate::domain::OrderStatus,
        crate::error::ErrorResponse,
        dto::CreateOrderBody,
        dto::OrderListResponse,
        dto::CountPayload,
        dto::HealthResponse,
    ))
)]
#[derive(Debug)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api", handlers::routes())
        .merge(handlers::system::routes())
}
