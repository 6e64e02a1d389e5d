//! WebSocket message types: client actions and server frames.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Actions a client can send over the execution socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Create an order and bind this socket as its subscriber.
    Execute {
        /// The order to create.
        order: ExecuteOrderBody,
    },
    /// Liveness probe, answered with a `success` frame.
    Ping,
}

/// Order payload inside an `execute` action.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteOrderBody {
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

/// Frames the server sends besides hub status pushes.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// A request failed.
    Error {
        /// Human-readable failure reason.
        message: String,
        /// Frame timestamp.
        timestamp: DateTime<Utc>,
    },
    /// A request succeeded.
    Success {
        /// Human-readable outcome.
        message: String,
        /// Optional payload (e.g. the created order).
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
        /// Frame timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl ServerMessage {
    /// Builds an error frame stamped now.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Builds a success frame stamped now.
    #[must_use]
    pub fn success(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self::Success {
            message: message.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn execute_action_parses() {
        let raw = r#"{"action":"execute","order":{"tokenIn":"SOL","tokenOut":"USDC","amount":1.0,"slippageTolerance":1.0,"maxRetries":3}}"#;
        let parsed: Result<ClientMessage, _> = serde_json::from_str(raw);
        let Ok(ClientMessage::Execute { order }) = parsed else {
            panic!("expected execute action");
        };
        assert_eq!(order.token_in, "SOL");
        assert_eq!(order.amount, dec!(1.0));
        assert_eq!(order.max_retries, Some(3));
    }

    #[test]
    fn ping_action_parses() {
        let parsed: Result<ClientMessage, _> = serde_json::from_str(r#"{"action":"ping"}"#);
        assert!(matches!(parsed, Ok(ClientMessage::Ping)));
    }

    #[test]
    fn error_frame_has_type_tag() {
        let frame = ServerMessage::error("bad request");
        let json = serde_json::to_value(&frame).unwrap_or_default();
        assert_eq!(json.get("type").and_then(|v| v.as_str()), Some("error"));
    }

    #[test]
    fn success_frame_omits_missing_data() {
        let frame = ServerMessage::success("pong", None);
        let json = serde_json::to_string(&frame).unwrap_or_default();
        assert!(!json.contains("\"data\""));
    }
}
