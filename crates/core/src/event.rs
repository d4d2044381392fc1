//! In-process publish/subscribe for lifecycle and media-state events.
//!
//! Subscription is keyed by `(EventKind, identifier)`; `"all"` is the
//! wildcard identifier used for global subscribers (e.g. the legacy-bus
//! bridge). Fan-out on `publish` is a single table lookup per key.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

use crate::types::{HostId, MediaId, RoomId, SessionId, UserId};

pub const ALL_IDENTIFIER: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    RoomCreated,
    RoomDestroyed,
    UserJoined,
    UserLeft,
    MediaConnected,
    MediaDisconnected,
    MediaState,
    IceCandidate,
    ContentFloorChanged,
    ConferenceFloorChanged,
    MediaVolumeChanged,
    MediaMuted,
    MediaUnmuted,
    MediaStartTalking,
    MediaStopTalking,
    StrategyChanged,
    SubscribedTo,
    KeyframeNeeded,
    Dtmf,
}

impl EventKind {
    /// Every client-facing kind, in no particular order. Used by subscribers
    /// that want a single global feed (the legacy-bus bridge) instead of
    /// enumerating each event kind by hand.
    pub const ALL: &'static [EventKind] = &[
        EventKind::RoomCreated,
        EventKind::RoomDestroyed,
        EventKind::UserJoined,
        EventKind::UserLeft,
        EventKind::MediaConnected,
        EventKind::MediaDisconnected,
        EventKind::MediaState,
        EventKind::IceCandidate,
        EventKind::ContentFloorChanged,
        EventKind::ConferenceFloorChanged,
        EventKind::MediaVolumeChanged,
        EventKind::MediaMuted,
        EventKind::MediaUnmuted,
        EventKind::MediaStartTalking,
        EventKind::MediaStopTalking,
        EventKind::StrategyChanged,
        EventKind::SubscribedTo,
        EventKind::KeyframeNeeded,
        EventKind::Dtmf,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::RoomCreated => "ROOM_CREATED",
            EventKind::RoomDestroyed => "ROOM_DESTROYED",
            EventKind::UserJoined => "USER_JOINED",
            EventKind::UserLeft => "USER_LEFT",
            EventKind::MediaConnected => "MEDIA_CONNECTED",
            EventKind::MediaDisconnected => "MEDIA_DISCONNECTED",
            EventKind::MediaState => "MEDIA_STATE",
            EventKind::IceCandidate => "ICE_CANDIDATE",
            EventKind::ContentFloorChanged => "CONTENT_FLOOR_CHANGED",
            EventKind::ConferenceFloorChanged => "CONFERENCE_FLOOR_CHANGED",
            EventKind::MediaVolumeChanged => "MEDIA_VOLUME_CHANGED",
            EventKind::MediaMuted => "MEDIA_MUTED",
            EventKind::MediaUnmuted => "MEDIA_UNMUTED",
            EventKind::MediaStartTalking => "MEDIA_START_TALKING",
            EventKind::MediaStopTalking => "MEDIA_STOP_TALKING",
            EventKind::StrategyChanged => "STRATEGY_CHANGED",
            EventKind::SubscribedTo => "SUBSCRIBED_TO",
            EventKind::KeyframeNeeded => "KEYFRAME_NEEDED",
            EventKind::Dtmf => "DTMF",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloorInfo {
    pub floor: Option<MediaId>,
    pub previous_floor: Vec<MediaId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Event {
    RoomCreated { room_id: RoomId },
    RoomDestroyed { room_id: RoomId },
    UserJoined { room_id: RoomId, user_id: UserId },
    UserLeft { room_id: RoomId, user_id: UserId },
    MediaConnected { room_id: RoomId, user_id: UserId, media_id: MediaId },
    MediaDisconnected { room_id: RoomId, user_id: UserId, media_id: MediaId },
    MediaState { room_id: RoomId, media_id: MediaId, state: String },
    IceCandidate { media_id: MediaId, candidate: serde_json::Value },
    ContentFloorChanged { room_id: RoomId, info: FloorInfo },
    ConferenceFloorChanged { room_id: RoomId, info: FloorInfo },
    MediaVolumeChanged { media_id: MediaId, volume: f32 },
    MediaMuted { media_id: MediaId },
    MediaUnmuted { media_id: MediaId },
    MediaStartTalking { media_id: MediaId },
    MediaStopTalking { media_id: MediaId },
    StrategyChanged { identifier: String, strategy: crate::types::Strategy },
    SubscribedTo { media_id: MediaId, source_id: MediaId },
    KeyframeNeeded { media_id: MediaId },
    Dtmf { media_id: MediaId, tone: String },
    HostOffline { host_id: HostId },
    ElementTransposed { key: String },
    MediaNegotiated { session_id: SessionId },
}

impl Event {
    pub fn kind(&self) -> Option<EventKind> {
        match self {
            Event::RoomCreated { .. } => Some(EventKind::RoomCreated),
            Event::RoomDestroyed { .. } => Some(EventKind::RoomDestroyed),
            Event::UserJoined { .. } => Some(EventKind::UserJoined),
            Event::UserLeft { .. } => Some(EventKind::UserLeft),
            Event::MediaConnected { .. } => Some(EventKind::MediaConnected),
            Event::MediaDisconnected { .. } => Some(EventKind::MediaDisconnected),
            Event::MediaState { .. } => Some(EventKind::MediaState),
            Event::IceCandidate { .. } => Some(EventKind::IceCandidate),
            Event::ContentFloorChanged { .. } => Some(EventKind::ContentFloorChanged),
            Event::ConferenceFloorChanged { .. } => Some(EventKind::ConferenceFloorChanged),
            Event::MediaVolumeChanged { .. } => Some(EventKind::MediaVolumeChanged),
            Event::MediaMuted { .. } => Some(EventKind::MediaMuted),
            Event::MediaUnmuted { .. } => Some(EventKind::MediaUnmuted),
            Event::MediaStartTalking { .. } => Some(EventKind::MediaStartTalking),
            Event::MediaStopTalking { .. } => Some(EventKind::MediaStopTalking),
            Event::StrategyChanged { .. } => Some(EventKind::StrategyChanged),
            Event::SubscribedTo { .. } => Some(EventKind::SubscribedTo),
            Event::KeyframeNeeded { .. } => Some(EventKind::KeyframeNeeded),
            Event::Dtmf { .. } => Some(EventKind::Dtmf),
            // Internal coordination events (host offline, transposer ready,
            // negotiation completion) are not fanned out to client subscribers.
            Event::HostOffline { .. } | Event::ElementTransposed { .. } | Event::MediaNegotiated { .. } => None,
        }
    }

    /// The identifier a subscriber would key on to receive this event
    /// (room id for room-scoped events, media id for media-scoped ones, etc).
    pub fn identifier(&self) -> Option<String> {
        match self {
            Event::RoomCreated { room_id } | Event::RoomDestroyed { room_id } => {
                Some(room_id.to_string())
            }
            Event::UserJoined { room_id, .. } | Event::UserLeft { room_id, .. } => {
                Some(room_id.to_string())
            }
            Event::MediaConnected { room_id, .. } | Event::MediaDisconnected { room_id, .. } => {
                Some(room_id.to_string())
            }
            Event::MediaState { room_id, .. } => Some(room_id.to_string()),
            Event::IceCandidate { media_id, .. } => Some(media_id.to_string()),
            Event::ContentFloorChanged { room_id, .. }
            | Event::ConferenceFloorChanged { room_id, .. } => Some(room_id.to_string()),
            Event::MediaVolumeChanged { media_id, .. }
            | Event::MediaMuted { media_id }
            | Event::MediaUnmuted { media_id }
            | Event::MediaStartTalking { media_id }
            | Event::MediaStopTalking { media_id } => Some(media_id.to_string()),
            Event::StrategyChanged { identifier, .. } => Some(identifier.clone()),
            Event::SubscribedTo { media_id, .. } => Some(media_id.to_string()),
            Event::KeyframeNeeded { media_id } => Some(media_id.to_string()),
            Event::Dtmf { media_id, .. } => Some(media_id.to_string()),
            Event::HostOffline { .. } | Event::ElementTransposed { .. } | Event::MediaNegotiated { .. } => None,
        }
    }
}

type SubscriberKey = (EventKind, String);

/// Process-wide event bus. Cheap to clone (Arc-backed internally via DashMap).
#[derive(Default)]
pub struct EventBus {
    subscribers: DashMap<SubscriberKey, Vec<mpsc::UnboundedSender<Event>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
        }
    }

    /// Subscribe to `kind` events scoped to `identifier` (use `ALL_IDENTIFIER`
    /// for the global feed).
    pub fn subscribe(&self, kind: EventKind, identifier: &str) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .entry((kind, identifier.to_string()))
            .or_default()
            .push(tx);
        rx
    }

    /// Subscribe to every client-facing kind at the wildcard identifier,
    /// merged onto one channel. The legacy-bus bridge uses this for its
    /// single global republish feed instead of one receiver per kind.
    pub fn subscribe_all(self: &std::sync::Arc<Self>) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        for kind in EventKind::ALL {
            let mut inner = self.subscribe(*kind, ALL_IDENTIFIER);
            let tx = tx.clone();
            tokio::spawn(async move {
                while let Some(event) = inner.recv().await {
                    if tx.send(event).is_err() {
                        break;
                    }
                }
            });
        }
        rx
    }

    /// Drop every subscriber registered under `identifier`, across all kinds.
    /// Used when a room is destroyed.
    pub fn unsubscribe_identifier(&self, identifier: &str) {
        self.subscribers
            .retain(|(_, id), _| id != identifier);
    }

    pub fn publish(&self, event: Event) {
        let Some(kind) = event.kind() else {
            trace!(?event, "internal event not fanned out");
            return;
        };
        let id = event.identifier().unwrap_or_default();

        if let Some(mut entry) = self.subscribers.get_mut(&(kind, id.clone())) {
            entry.retain(|tx| tx.send(event.clone()).is_ok());
        }
        if id != ALL_IDENTIFIER {
            if let Some(mut entry) = self.subscribers.get_mut(&(kind, ALL_IDENTIFIER.to_string())) {
                entry.retain(|tx| tx.send(event.clone()).is_ok());
            }
        }
    }
}
