//! Tracks live WebSocket connections by an opaque connection id — keyed by
//! connection rather than user since a client may call `join` more than
//! once per socket; there's no 1:1 socket/user constraint.

use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use futures::stream::SplitSink;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

pub type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

#[derive(Default)]
pub struct WsStorage {
    connections: DashMap<Uuid, WsSender>,
}

impl WsStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, conn_id: Uuid, sender: WsSender) {
        self.connections.insert(conn_id, sender);
    }

    pub fn remove(&self, conn_id: &Uuid) {
        self.connections.remove(conn_id);
    }

    pub fn get(&self, conn_id: &Uuid) -> Option<WsSender> {
        self.connections.get(conn_id).map(|e| e.value().clone())
    }
}
