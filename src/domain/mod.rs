//! Domain layer: order entity, status state machine, quotes and swap
//! results shared by every component.

pub mod order;
pub mod order_id;
pub mod quote;

pub use order::{
    DEFAULT_MAX_RETRIES, DEFAULT_SLIPPAGE_TOLERANCE, MAX_RETRIES_CEILING, NewOrder, Order,
    OrderStatus, OrderUpdate,
};
pub use order_id::OrderId;
pub use quote::{Quote, SwapResult, SwapStatus};
