//! Wire DTOs for every client method the orchestrator exposes. Framing,
//! transports and transaction-id plumbing are intentionally out of scope;
//! this module gives the illustrative `axum` gateway a concrete shape to
//! deserialize into, not a protocol specification.

use conflux_core::types::{
    ConnectKind, MediaId, MediaProfile, MediaSessionType, RoomId, SessionId, Strategy, UserId,
    UserType,
};
use serde::{Deserialize, Serialize};

/// One request, tagged by method name, carrying its own params inline —
/// `method`/`params` rather than `type`/`data` since these are
/// request/response calls rather than fire-and-forget signals.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum ClientRequest {
    Join {
        room_id: Option<RoomId>,
        user_type: UserType,
        name: String,
    },
    Leave {
        user_id: UserId,
        room_id: RoomId,
    },
    Publish {
        user_id: UserId,
        session_type: MediaSessionType,
        #[serde(default)]
        media_profile: MediaProfile,
        descriptor: Option<String>,
        #[serde(default)]
        options: serde_json::Value,
        #[serde(default)]
        name: String,
    },
    Unpublish {
        media_id: SessionId,
    },
    /// Feeds a new remote descriptor into a session the caller already has
    /// open — e.g. adding a screen-share m-line to an already-published
    /// session. See `Controller::renegotiate`.
    Renegotiate {
        media_id: SessionId,
        descriptor: String,
    },
    Subscribe {
        user_id: UserId,
        source_id: SessionId,
        session_type: MediaSessionType,
        #[serde(default)]
        media_profile: MediaProfile,
        #[serde(default)]
        options: serde_json::Value,
        #[serde(default)]
        name: String,
    },
    Unsubscribe {
        media_id: SessionId,
    },
    PublishAndSubscribe {
        user_id: UserId,
        session_type: MediaSessionType,
        #[serde(default)]
        media_profile: MediaProfile,
        descriptor: Option<String>,
        #[serde(default)]
        options: serde_json::Value,
        #[serde(default)]
        name: String,
    },
    Connect {
        source_id: MediaId,
        sink_ids: Vec<MediaId>,
        #[serde(default = "default_connect_kind")]
        kind: ConnectKind,
    },
    Disconnect {
        source_id: MediaId,
        sink_id: MediaId,
        #[serde(default = "default_connect_kind")]
        kind: ConnectKind,
    },
    AddIceCandidate {
        media_id: MediaId,
        candidate: serde_json::Value,
    },
    StartRecording {
        media_id: MediaId,
        path: String,
        #[serde(default)]
        params: serde_json::Value,
    },
    StopRecording {
        recording_id: MediaId,
    },
    SetConferenceFloor {
        room_id: RoomId,
        media_id: MediaId,
    },
    ReleaseConferenceFloor {
        room_id: RoomId,
    },
    SetContentFloor {
        room_id: RoomId,
        media_id: MediaId,
    },
    ReleaseContentFloor {
        room_id: RoomId,
    },
    GetRooms,
    GetUsers {
        room_id: RoomId,
    },
    GetUserMedias {
        user_id: UserId,
    },
    SetVolume {
        media_id: MediaId,
        volume: f32,
    },
    Mute {
        media_id: MediaId,
    },
    Unmute {
        media_id: MediaId,
    },
    Dtmf {
        media_id: MediaId,
        tone: char,
    },
    RequestKeyframe {
        media_id: MediaId,
    },
    SetStrategy {
        identifier: String,
        strategy: Strategy,
    },
    GetStrategy {
        identifier: String,
    },
    OnEvent {
        event_name: String,
        identifier: String,
    },
}

fn default_connect_kind() -> ConnectKind {
    ConnectKind::All
}

/// Incoming envelope: every request carries an opaque `transactionId` echoed
/// back verbatim in the response.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientEnvelope {
    pub transaction_id: String,
    #[serde(flatten)]
    pub request: ClientRequest,
}

/// Outgoing response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseEnvelope {
    pub transaction_id: String,
    #[serde(flatten)]
    pub result: ResponseResult,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResponseResult {
    Ok { result: serde_json::Value },
    Err { error: ErrorBody },
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: u32,
    pub message: String,
}

/// Outgoing server-pushed event, wrapping a core `Event` with the name the
/// client subscribed under.
#[derive(Debug, Clone, Serialize)]
pub struct ServerEvent {
    pub event: String,
    pub identifier: String,
    pub data: serde_json::Value,
}
