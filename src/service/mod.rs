//! Service layer: order lifecycle coordination in front of the store
//! and the execution queue.

pub mod order_service;

pub use order_service::{CreateOrderRequest, OrderService};
