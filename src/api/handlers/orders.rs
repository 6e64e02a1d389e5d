//! Order endpoint handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    ApiResponse, CountOrdersQuery, CountPayload, CreateOrderBody, ListOrdersQuery,
    OrderListResponse,
};
use crate::app_state::AppState;
use crate::domain::{OrderId, OrderStatus};
use crate::error::{EngineError, ErrorResponse};
use crate::service::CreateOrderRequest;
use crate::store::OrderFilter;

/// Hard cap on page size for list queries.
const MAX_PAGE_SIZE: u32 = 200;

/// `POST /api/orders` — Create an order and enqueue its execution.
///
/// # Errors
///
/// Returns [`EngineError`] on invalid input or when the queue is down.
#[utoipa::path(
    post,
    path = "/api/orders",
    tag = "Orders",
    summary = "Submit a swap order",
    description = "Persists the order, enqueues an execution job, and returns the pending order.",
    request_body = CreateOrderBody,
    responses(
        (status = 201, description = "Order accepted"),
        (status = 400, description = "Validation failed", body = ErrorResponse),
        (status = 503, description = "Execution queue unavailable", body = ErrorResponse),
    )
)]
pub async fn create_order(
    State(state): State<AppState>,
    Json(body): Json<CreateOrderBody>,
) -> Result<impl IntoResponse, EngineError> {
    let order = state
        .order_service
        .create(CreateOrderRequest {
            token_in: body.token_in,
            token_out: body.token_out,
            amount: body.amount,
            slippage_tolerance: body.slippage_tolerance,
            max_retries: body.max_retries,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::new(order))))
}

/// `GET /api/orders/:id` — Fetch one order.
///
/// # Errors
///
/// Returns [`EngineError::OrderNotFound`] when absent.
#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    tag = "Orders",
    summary = "Get an order",
    params(("id" = uuid::Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Order found"),
        (status = 404, description = "Order not found", body = ErrorResponse),
    )
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, EngineError> {
    let order = state.order_service.get(OrderId::from_uuid(id)).await?;
    Ok(Json(ApiResponse::new(order)))
}

/// `GET /api/orders` — List orders with filters and pagination.
///
/// # Errors
///
/// Returns [`EngineError::Validation`] on an unknown status filter.
#[utoipa::path(
    get,
    path = "/api/orders",
    tag = "Orders",
    summary = "List orders",
    params(
        ("status" = Option<String>, Query, description = "Status filter"),
        ("tokenIn" = Option<String>, Query, description = "Input token filter"),
        ("tokenOut" = Option<String>, Query, description = "Output token filter"),
        ("limit" = Option<u32>, Query, description = "Page size (max 200)"),
        ("offset" = Option<u32>, Query, description = "Page offset"),
    ),
    responses(
        (status = 200, description = "Order page", body = OrderListResponse),
        (status = 400, description = "Invalid filter", body = ErrorResponse),
    )
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<impl IntoResponse, EngineError> {
    let filter = OrderFilter {
        status: parse_status(query.status.as_deref())?,
        token_in: query.token_in,
        token_out: query.token_out,
        limit: Some(query.limit.unwrap_or(50).min(MAX_PAGE_SIZE)),
        offset: query.offset,
        ..OrderFilter::default()
    };
    let (orders, count) = state.order_service.list(filter).await?;
    Ok(Json(OrderListResponse {
        success: true,
        data: orders,
        count,
    }))
}

/// `GET /api/orders/count` — Count orders matching a status filter.
///
/// # Errors
///
/// Returns [`EngineError::Validation`] on an unknown status filter.
#[utoipa::path(
    get,
    path = "/api/orders/count",
    tag = "Orders",
    summary = "Count orders",
    params(("status" = Option<String>, Query, description = "Status filter")),
    responses(
        (status = 200, description = "Order count"),
        (status = 400, description = "Invalid filter", body = ErrorResponse),
    )
)]
pub async fn count_orders(
    State(state): State<AppState>,
    Query(query): Query<CountOrdersQuery>,
) -> Result<impl IntoResponse, EngineError> {
    let filter = OrderFilter {
        status: parse_status(query.status.as_deref())?,
        ..OrderFilter::default()
    };
    let count = state.order_service.count(filter).await?;
    Ok(Json(ApiResponse::new(CountPayload { count })))
}

/// `DELETE /api/orders/:id` — Cancel a non-terminal order.
///
/// # Errors
///
/// - [`EngineError::OrderNotFound`] when absent.
/// - [`EngineError::Conflict`] (409) when already terminal.
#[utoipa::path(
    delete,
    path = "/api/orders/{id}",
    tag = "Orders",
    summary = "Cancel an order",
    params(("id" = uuid::Uuid, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Order cancelled"),
        (status = 404, description = "Order not found", body = ErrorResponse),
        (status = 409, description = "Order already terminal", body = ErrorResponse),
    )
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<uuid::Uuid>,
) -> Result<impl IntoResponse, EngineError> {
    let order = state.order_service.cancel(OrderId::from_uuid(id)).await?;
    Ok(Json(ApiResponse::new(order)))
}

/// Order routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order).get(list_orders))
        .route("/orders/count", get(count_orders))
        .route("/orders/{id}", get(get_order).delete(cancel_order))
}

/// Parses an optional status query value.
fn parse_status(raw: Option<&str>) -> Result<Option<OrderStatus>, EngineError> {
    raw.map(|s| {
        s.parse::<OrderStatus>()
            .map_err(EngineError::Validation)
    })
    .transpose()
}
