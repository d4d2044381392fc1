use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(u: Uuid) -> Self {
                Self(u)
            }
        }
    };
}

uuid_id!(RoomId);
uuid_id!(UserId);
uuid_id!(SessionId);
uuid_id!(MediaId);

/// Host identifiers are operator-assigned (config seed), not generated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostId(pub String);

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for HostId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for HostId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserType {
    Sfu,
    Mcu,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaSessionType {
    Webrtc,
    Rtp,
    Recording,
    Uri,
    Mcu,
    Filter,
}

/// Which backend(s) a media session's traffic routes through when adapters
/// are composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MediaProfile {
    #[default]
    Main,
    Content,
    Audio,
    All,
}

impl MediaProfile {
    pub fn is_audio(self) -> bool {
        matches!(self, MediaProfile::Audio | MediaProfile::All)
    }

    pub fn is_main(self) -> bool {
        matches!(self, MediaProfile::Main | MediaProfile::All)
    }

    pub fn is_content(self) -> bool {
        matches!(self, MediaProfile::Content | MediaProfile::All)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NegotiationRole {
    Offerer,
    Answerer,
}

/// Direction of a single media kind (audio/video/content) within a media unit.
/// `Disabled` is the `false` sentinel of `MediaUnit.mediaTypes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MediaDirection {
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
    #[default]
    Disabled,
}

impl MediaDirection {
    pub fn is_active(self) -> bool {
        !matches!(self, MediaDirection::Disabled | MediaDirection::Inactive)
    }

    pub fn has_send(self) -> bool {
        matches!(self, MediaDirection::SendRecv | MediaDirection::SendOnly)
    }

    pub fn has_recv(self) -> bool {
        matches!(self, MediaDirection::SendRecv | MediaDirection::RecvOnly)
    }

    pub fn from_sdp_attr(attr: &str) -> Self {
        match attr {
            "sendrecv" => MediaDirection::SendRecv,
            "sendonly" => MediaDirection::SendOnly,
            "recvonly" => MediaDirection::RecvOnly,
            "inactive" => MediaDirection::Inactive,
            _ => MediaDirection::Disabled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct MediaTypes {
    pub audio: MediaDirection,
    pub video: MediaDirection,
    pub content: MediaDirection,
}

impl MediaTypes {
    /// Union of two unit descriptions, keeping whichever side is active.
    pub fn merge(self, other: MediaTypes) -> MediaTypes {
        MediaTypes {
            audio: if other.audio.is_active() { other.audio } else { self.audio },
            video: if other.video.is_active() { other.video } else { self.video },
            content: if other.content.is_active() { other.content } else { self.content },
        }
    }
}

/// The "kind" argument to `connect`/`disconnect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectKind {
    All,
    Audio,
    Video,
    Content,
}

/// Named policy attached to a room/user/session/media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Strategy {
    pub name: String,
    pub params: serde_json::Value,
}

impl Strategy {
    pub fn freewill() -> Self {
        Strategy {
            name: "freewill".to_string(),
            params: serde_json::Value::Null,
        }
    }
}
