use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::AppState;

#[derive(Deserialize, Default)]
pub struct WsQuery {
    pub route_id: Option<Uuid>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.route_id))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, route_id: Option<Uuid>) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = tokio_stream::StreamExt::filter_map(
        BroadcastStream::new(state.route_events_tx.subscribe()),
        move |result| match result {
            Ok(event) if route_id.is_none_or(|id| id == event.route_id()) => Some(event),
            Ok(_) => None,
            Err(err) => {
                warn!(error = %err, "websocket listener lagged; events skipped");
                None
            }
        },
    );

    info!(route_id = ?route_id, "websocket client connected");

    let send_task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize route event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!(route_id = ?route_id, "websocket client disconnected");
}
