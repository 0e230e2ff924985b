use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use shared_proto::{ClientEvent, ServerEvent};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::state::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// One task per connection. The read loop awaits dispatch before pulling
/// the next frame, which keeps per-connection event order; a companion
/// writer task drains the outbound channel into the socket.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    tracing::info!(component = "ws", %connection_id, "connection opened");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    state.peers.insert(connection_id, tx);

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(frame).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = stream.next().await {
        match frame {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => {
                    let outbound = state.router.dispatch(connection_id, event).await;
                    state.deliver(outbound);
                }
                Err(err) => {
                    tracing::warn!(
                        component = "ws",
                        %connection_id,
                        error = %err,
                        "skipping undecodable frame"
                    );
                }
            },
            Message::Close(_) => break,
            // Binary, ping and pong frames carry no events.
            _ => {}
        }
    }

    state.peers.remove(&connection_id);
    let unbound = state.router.disconnect(connection_id);
    tracing::info!(component = "ws", %connection_id, "connection closed");

    if unbound.is_some() {
        // Hold the presence broadcast briefly so a quick reconnect from
        // another tab collapses into a single update.
        let state = state.clone();
        tokio::spawn(async move {
            tokio::time::sleep(state.presence_grace).await;
            state.broadcast_all(&ServerEvent::UsersUpdate(state.router.presence_snapshot()));
        });
    }

    // Dropping the peer entry above closes the channel, ending the writer.
    let _ = writer.await;
}
