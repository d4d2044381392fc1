//! Redis-backed sidecar bridge to a legacy conferencing bus: event
//! ingress/egress only, treated as an external collaborator reached purely
//! by interface.
//!
//! Egress republishes every core event onto a single Redis pub/sub channel
//! as JSON. Ingress — translating the legacy bus's own wire protocol back
//! into orchestrator calls — has no documented protocol to decode, so
//! `BusBridge::next_ingress` is a stub returning [`BusError::Unimplemented`].

mod error;

pub use error::BusError;

use conflux_core::event::{Event, EventBus};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Minimal contract a legacy-bus sink must satisfy, so the orchestrator's
/// wiring code (and tests) can depend on a trait rather than a concrete
/// Redis client.
#[async_trait::async_trait]
pub trait LegacyBusSink: Send + Sync {
    async fn publish_event(&self, event: &Event) -> Result<(), BusError>;

    /// Pull the next message the legacy bus sent inbound. Unimplemented:
    /// no legacy protocol is specified to decode.
    async fn next_ingress(&self) -> Result<serde_json::Value, BusError> {
        Err(BusError::Unimplemented)
    }
}

/// Redis pub/sub implementation of [`LegacyBusSink`].
pub struct RedisBusBridge {
    conn: ConnectionManager,
    channel: String,
}

impl RedisBusBridge {
    pub async fn connect(redis_url: &str, channel: impl Into<String>) -> Result<Self, BusError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self {
            conn,
            channel: channel.into(),
        })
    }

    /// Subscribes to every event kind on `events` and republishes each to
    /// the legacy channel until the bus is dropped. Mirrors the
    /// `EventBus::subscribe_all` wildcard feed so the bridge sees everything
    /// a client could subscribe to with `onEvent(eventName, "all")`.
    pub fn spawn_forwarder(self: Arc<Self>, events: Arc<EventBus>) -> JoinHandle<()> {
        let mut rx = events.subscribe_all();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(err) = self.publish_event(&event).await {
                    warn!(%err, "failed to republish event to legacy bus");
                }
            }
        })
    }
}

#[async_trait::async_trait]
impl LegacyBusSink for RedisBusBridge {
    async fn publish_event(&self, event: &Event) -> Result<(), BusError> {
        let payload = serde_json::to_string(event).map_err(|e| {
            // Serialization of our own typed event can't fail in practice;
            // surfaced as a generic Redis error would be misleading, so this
            // is the one place we log and swallow rather than bubble up.
            warn!(%e, "failed to serialize event for legacy bus");
            e
        });
        let Ok(payload) = payload else { return Ok(()) };

        let mut conn = self.conn.clone();
        let _: () = conn.publish(&self.channel, payload).await?;
        debug!(channel = %self.channel, "event republished to legacy bus");
        Ok(())
    }
}
