use axum::extract::ws::Message;
use futures::SinkExt;
use tracing::warn;
use uuid::Uuid;

use super::storage::WsStorage;

/// Sends one JSON-serializable value down a specific connection, keyed by
/// connection id rather than user id (see `storage.rs`).
pub async fn send_to_connection(storage: &WsStorage, conn_id: &Uuid, message: &impl serde::Serialize) {
    let Some(sender) = storage.get(conn_id) else { return };
    let text = match serde_json::to_string(message) {
        Ok(t) => t,
        Err(e) => {
            warn!(%e, "failed to serialize outgoing WS message");
            return;
        }
    };
    let mut guard = sender.lock().await;
    if let Err(e) = guard.send(Message::text(text)).await {
        warn!(%conn_id, %e, "failed to send WS message");
    }
}
