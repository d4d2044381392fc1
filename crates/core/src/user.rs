//! A participant in a room.
//!
//! Owns the set of media-session ids it created; the sessions themselves
//! live in the controller's flat map.

use crate::media_session::MediaSession;
use crate::types::{MediaProfile, MediaSessionType, RoomId, SessionId, Strategy, UserId, UserType};

pub struct User {
    pub id: UserId,
    pub room_id: RoomId,
    pub user_type: UserType,
    pub name: String,
    pub strategy: Strategy,
    pub media_sessions: Vec<SessionId>,
}

impl User {
    pub fn new(room_id: RoomId, user_type: UserType, name: String) -> Self {
        Self {
            id: UserId::new(),
            room_id,
            user_type,
            name,
            strategy: Strategy::freewill(),
            media_sessions: Vec::new(),
        }
    }

    /// Creates a new media session through the `publish`/`subscribe` factory
    /// and registers its id against this user.
    pub fn new_session(
        &mut self,
        name: String,
        session_type: MediaSessionType,
        media_profile: MediaProfile,
        options: serde_json::Value,
    ) -> MediaSession {
        let session = MediaSession::new(name, self.room_id, self.id, session_type, media_profile, options);
        self.media_sessions.push(session.id);
        session
    }

    pub fn remove_session(&mut self, session_id: SessionId) {
        self.media_sessions.retain(|s| *s != session_id);
    }

    /// `leave` stops every owned session; returns the ids so the caller can
    /// stop and deindex them.
    pub fn leave(&mut self) -> Vec<SessionId> {
        std::mem::take(&mut self.media_sessions)
    }

    pub fn has_sessions(&self) -> bool {
        !self.media_sessions.is_empty()
    }
}
