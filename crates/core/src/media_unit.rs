//! A single backend element, one m-line's worth of negotiated media.

use std::collections::HashMap;

use crate::adapter::ElementId;
use crate::types::{HostId, MediaId, MediaSessionType, MediaTypes, RoomId, SessionId, UserId};

/// A pair of RTP endpoints bridging this unit's host to one remote host.
/// Keyed by the remote host id on the owning `MediaUnit`.
#[derive(Debug, Clone)]
pub struct TransposerPair {
    /// Element on this unit's own host.
    pub source_element: ElementId,
    /// Element on the remote (sink) host.
    pub sink_element: ElementId,
    pub sink_host: HostId,
    /// Number of sinks on `sink_host` currently connected through this pair;
    /// released when it drops to zero.
    pub sink_refs: usize,
}

#[derive(Debug, Clone)]
pub struct MediaUnit {
    pub id: MediaId,
    pub session_id: SessionId,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub session_type: MediaSessionType,
    pub host: HostId,
    pub element_id: ElementId,
    pub media_types: MediaTypes,
    pub local_descriptor: Option<String>,
    pub remote_descriptor: Option<String>,
    pub mixer_id: Option<MediaId>,
    pub subtitle: Option<String>,
    pub enable_subtitle: bool,
    pub transposers: HashMap<HostId, TransposerPair>,
}

impl MediaUnit {
    pub fn new(
        session_id: SessionId,
        room_id: RoomId,
        user_id: UserId,
        session_type: MediaSessionType,
        host: HostId,
        element_id: ElementId,
    ) -> Self {
        Self {
            id: MediaId::new(),
            session_id,
            room_id,
            user_id,
            session_type,
            host,
            element_id,
            media_types: MediaTypes::default(),
            local_descriptor: None,
            remote_descriptor: None,
            mixer_id: None,
            subtitle: None,
            enable_subtitle: false,
            transposers: HashMap::new(),
        }
    }

    /// Whether this unit can serve as a conference (speaker) floor: it must
    /// carry outbound video.
    pub fn is_conference_floor_candidate(&self) -> bool {
        self.media_types.video.has_send()
    }

    /// Whether this unit carries the content (screen-share) channel.
    pub fn get_content_media(&self) -> bool {
        self.media_types.content.is_active()
    }

    pub fn transposer_for(&self, remote_host: &HostId) -> Option<&TransposerPair> {
        self.transposers.get(remote_host)
    }
}
