//! REST request and response DTOs.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::Order;

/// Request body for `POST /api/orders`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderBody {
    /// Input token identifier.
    pub token_in: String,
    /// Output token identifier.
    pub token_out: String,
    /// Amount of the input token to swap.
    pub amount: Decimal,
    /// Slippage tolerance in percent (0..=100). Defaults to 0.5.
    #[serde(default)]
    pub slippage_tolerance: Option<Decimal>,
    /// Execution retries (0..=10). Defaults to 3.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

/// Standard success envelope: `{success: true, data}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// Always `true` for success responses.
    pub success: bool,
    /// Endpoint-specific payload.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Wraps a payload in the success envelope.
    #[must_use]
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// List envelope: `{success: true, data: [...], count}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct OrderListResponse {
    /// Always `true` for success responses.
    pub success: bool,
    /// One page of orders.
    pub data: Vec<Order>,
    /// Total orders matching the filter (pagination excluded).
    pub count: u64,
}

/// Payload for `GET /api/orders/count`.
#[derive(Debug, Serialize, ToSchema)]
pub struct CountPayload {
    /// Matching order count.
    pub count: u64,
}

/// Query parameters for `GET /api/orders`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListOrdersQuery {
    /// Filter by persisted status.
    #[serde(default)]
    pub status: Option<String>,
    /// Filter by input token.
    #[serde(default)]
    pub token_in: Option<String>,
    /// Filter by output token.
    #[serde(default)]
    pub token_out: Option<String>,
    /// Page size (defaults to 50, max 200).
    #[serde(default)]
    pub limit: Option<u32>,
    /// Page offset.
    #[serde(default)]
    pub offset: Option<u32>,
}

/// Query parameters for `GET /api/orders/count`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CountOrdersQuery {
    /// Filter by persisted status.
    #[serde(default)]
    pub status: Option<String>,
}

/// Response body for `GET /health`.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Always `"healthy"` while the process serves requests.
    pub status: String,
    /// Seconds since startup.
    pub uptime_seconds: i64,
    /// Crate version.
    pub version: String,
    /// Current server time (ISO-8601).
    pub timestamp: String,
}
