//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::notify::NotificationHub;
use crate::service::OrderService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Order service for all business logic.
    pub order_service: Arc<OrderService>,
    /// Notification hub for WebSocket subscriptions.
    pub hub: Arc<NotificationHub>,
    /// Process start time, for the health endpoint's uptime.
    pub started_at: DateTime<Utc>,
}
