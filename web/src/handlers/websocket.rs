//! WebSocket endpoint for live status updates.
//!
//! # Message Protocol
//!
//! **Server → Client:** the text frame `update` whenever a bill has been
//! paid. It carries nothing else; the client re-fetches
//! `/user/:user_id/status`.
//!
//! Client messages are read only to notice the connection closing.

use crate::hub::{HubHandle, UPDATE_FRAME};
use crate::state::AppState;
use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, stream::StreamExt};
use tracing::{debug, info, warn};

/// `GET /ws`: upgrade and register the connection as a viewer.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn handle(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    debug!("WebSocket connection requested");
    ws.on_upgrade(move |socket| serve_viewer(socket, state.hub))
}

/// Forward refresh signals until either side goes away.
async fn serve_viewer(socket: WebSocket, hub: HubHandle) {
    let viewer = match hub.register().await {
        Ok(viewer) => viewer,
        Err(e) => {
            warn!(error = %e, "Viewer hub unavailable, closing WebSocket");
            return;
        },
    };
    let viewer_id = viewer.id;
    let mut signals = viewer.signals;
    info!(viewer_id, "WebSocket viewer connected");

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while signals.recv().await.is_some() {
            if sender
                .send(Message::Text(UPDATE_FRAME.to_string()))
                .await
                .is_err()
            {
                // Client disconnected
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    hub.unregister(viewer_id).await;
    info!(viewer_id, "WebSocket viewer disconnected");
}
