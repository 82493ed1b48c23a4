//! WebSocket handling for live status updates.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::{AppState, BroadcastHub};

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

/// Register the connection as an observer and forward broadcasts to it
/// until the client goes away.
async fn handle_socket(socket: WebSocket, hub: BroadcastHub) {
    let (id, mut outbox) = hub.register();
    info!(observer = id, "WebSocket connection established");

    let (mut sink, mut stream) = socket.split();

    // Sole writer for this connection.
    let mut writer = tokio::spawn(async move {
        while let Some(message) = outbox.recv().await {
            if let Err(e) = sink.send(Message::Text((&*message).into())).await {
                debug!(observer = id, error = %e, "WebSocket write failed");
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut writer => break,
            received = stream.next() => match received {
                Some(Ok(Message::Close(_))) | None => {
                    info!(observer = id, "WebSocket connection closed");
                    break;
                }
                Some(Err(e)) => {
                    warn!(observer = id, error = %e, "WebSocket error");
                    break;
                }
                // Inbound messages carry no meaning.
                Some(Ok(_)) => {}
            },
        }
    }

    writer.abort();
    hub.unregister(id);
}
