//! WebSocket layer: the execution endpoint that creates orders and
//! streams their lifecycle back to the submitting client.

pub mod connection;
pub mod handler;
pub mod messages;
