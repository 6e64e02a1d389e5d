//! Notification layer: the per-order subscriber registry that streams
//! lifecycle updates to live clients.

pub mod hub;

pub use hub::{NotificationHub, StatusFrame, Subscriber};
