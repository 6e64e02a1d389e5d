//! WebSocket connection loop for order execution.
//!
//! Each connection owns an outbound channel that the notification hub
//! writes status frames into. The loop multiplexes client actions and
//! hub pushes; when the socket closes, every subscription held by the
//! connection is removed.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::messages::{ClientMessage, ServerMessage};
use crate::app_state::AppState;
use crate::notify::Subscriber;
use crate::service::CreateOrderRequest;

/// Runs the read/write loop for one execution socket.
pub async fn run_connection(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let subscriber_id = Uuid::new_v4();
    let (push_tx, mut push_rx) = mpsc::unbounded_channel::<String>();

    tracing::debug!(%subscriber_id, "execution socket opened");

    loop {
        tokio::select! {
            // Incoming message from the client.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response =
                            handle_client_message(&text, &state, subscriber_id, &push_tx).await;
                        let Ok(json) = serde_json::to_string(&response) else {
                            continue;
                        };
                        if ws_tx.send(Message::text(json)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
            // Status frame pushed by the hub.
            frame = push_rx.recv() => {
                match frame {
                    Some(frame) => {
                        if ws_tx.send(Message::text(frame)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    state.hub.remove_all_by_subscriber(subscriber_id).await;
    tracing::debug!(%subscriber_id, "execution socket closed");
}

/// Dispatches one client action, returning the frame to send back.
async fn handle_client_message(
    text: &str,
    state: &AppState,
    subscriber_id: Uuid,
    push_tx: &mpsc::UnboundedSender<String>,
) -> ServerMessage {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => return ServerMessage::error(format!("malformed message: {e}")),
    };

    match message {
        ClientMessage::Ping => ServerMessage::success("pong", None),
        ClientMessage::Execute { order } => {
            let created = state
                .order_service
                .create(CreateOrderRequest {
                    token_in: order.token_in,
                    token_out: order.token_out,
                    amount: order.amount,
                    slippage_tolerance: order.slippage_tolerance,
                    max_retries: order.max_retries,
                })
                .await;
            match created {
                Ok(created) => {
                    // Bind this socket as the order's subscriber before
                    // a worker can emit the first status push.
                    state
                        .hub
                        .register(
                            created.id,
                            Subscriber::new(subscriber_id, push_tx.clone()),
                        )
                        .await;
                    let data = serde_json::to_value(&created).ok();
                    ServerMessage::success("order accepted", data)
                }
                Err(e) => ServerMessage::error(e.to_string()),
            }
        }
    }
}
