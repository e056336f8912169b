use crate::api::LayoutAppState;
use crate::overlay::LayoutEvent;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// GET /api/ws - WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<LayoutAppState>>,
) -> Response {
    info!("WebSocket upgrade request received");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Create WebSocket router
pub fn create_ws_router(state: LayoutAppState) -> Router {
    Router::new()
        .route("/api/ws", get(ws_handler))
        .with_state(Arc::new(state))
}

/// Forward layout change notifications until the client goes away
async fn handle_socket(mut socket: WebSocket, state: Arc<LayoutAppState>) {
    let mut events_rx = state.store.subscribe();
    info!("WebSocket connection established");

    loop {
        tokio::select! {
            Some(msg) = socket.recv() => {
                match msg {
                    Ok(Message::Close(_)) => {
                        info!("WebSocket client disconnected");
                        break;
                    }
                    Ok(Message::Ping(data)) => {
                        if let Err(e) = socket.send(Message::Pong(data)).await {
                            error!(error = %e, "Failed to send pong");
                            break;
                        }
                    }
                    Ok(_) => {
                        // Clients only listen
                    }
                    Err(e) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                }
            }

            result = events_rx.recv() => {
                match result {
                    Ok(event) => {
                        if let Err(e) = send_event(&mut socket, &event).await {
                            error!(error = %e, "Failed to send layout event");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Events carry no data, the next one is enough to resync
                        warn!(skipped = skipped, "WebSocket lagged, skipped layout events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        error!("Layout event channel closed");
                        break;
                    }
                }
            }

            else => {
                break;
            }
        }
    }

    info!("WebSocket connection closed");
}

async fn send_event(socket: &mut WebSocket, event: &LayoutEvent) -> anyhow::Result<()> {
    let json = serde_json::to_string(event)?;
    socket.send(Message::Text(json)).await?;
    Ok(())
}
