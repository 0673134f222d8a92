use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::core::error::KioskError;
use crate::core::state::AppState;
use crate::models::kiosk::KioskEvent;
use crate::models::LocationId;
use crate::stores::repository::Repository;

/// Live event stream for the kiosk screens of a location
///
/// GET /events/{location_id}  (WebSocket)
pub async fn kiosk_socket_handler(
    State(state): State<Arc<AppState>>,
    Path(location_id): Path<LocationId>,
    ws: WebSocketUpgrade,
) -> Result<Response, KioskError> {
    if state.store.location(location_id).is_none() {
        return Err(KioskError::NotFound(format!("Location {}", location_id)));
    }

    // Subscribe before the upgrade so no event between here and the first
    // poll is lost
    let events = state.events.subscribe(location_id);
    info!(location_id, kiosks = state.events.subscriber_count(location_id), "Kiosk connected");

    Ok(ws
        .on_upgrade(move |socket| forward_events(socket, events, location_id))
        .into_response())
}

async fn forward_events(socket: WebSocket, mut events: broadcast::Receiver<KioskEvent>, location_id: LocationId) {
    let (mut sender, mut receiver) = socket.split();

    let send_task = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(location_id, skipped, "Kiosk fell behind, events dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!(location_id, error = %e, "Failed to encode kiosk event");
                    continue;
                }
            };

            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Kiosks only listen; anything they send besides a close is ignored
    while let Some(Ok(msg)) = receiver.next().await {
        if let Message::Close(_) = msg {
            break;
        }
    }

    send_task.abort();
    debug!(location_id, "Kiosk disconnected");
}
