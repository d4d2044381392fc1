//! Container of users and media sessions; owns the conference and content
//! floors with MRU history.

use std::collections::VecDeque;

use crate::event::FloorInfo;
use crate::types::{MediaId, RoomId, SessionId, Strategy, UserId};

pub struct Room {
    pub id: RoomId,
    pub users: Vec<UserId>,
    pub media_sessions: Vec<SessionId>,
    pub medias: Vec<MediaId>,
    pub conference_floor: Option<MediaId>,
    pub previous_conference_floors: VecDeque<MediaId>,
    pub content_floor: Option<MediaId>,
    pub previous_content_floors: VecDeque<MediaId>,
    pub strategy: Strategy,
    /// MCU mixer session id, present once the first MCU user has published.
    pub mcu_session: Option<SessionId>,
    /// The synthetic user the controller creates to own the mixer session.
    /// Excluded from the "any MCU users left" check in `leave` — otherwise
    /// the mixer would never tear down, since this user never itself leaves.
    pub mcu_control_user: Option<UserId>,
    floor_history_cap: usize,
}

fn push_mru(history: &mut VecDeque<MediaId>, media_id: MediaId, cap: usize) {
    history.push_front(media_id);
    history.truncate(cap);
}

impl Room {
    pub fn new(floor_history_cap: usize) -> Self {
        Self {
            id: RoomId::new(),
            users: Vec::new(),
            media_sessions: Vec::new(),
            medias: Vec::new(),
            conference_floor: None,
            previous_conference_floors: VecDeque::new(),
            content_floor: None,
            previous_content_floors: VecDeque::new(),
            strategy: Strategy::freewill(),
            mcu_session: None,
            mcu_control_user: None,
            floor_history_cap: floor_history_cap.max(1),
        }
    }

    pub fn add_user(&mut self, user_id: UserId) {
        if !self.users.contains(&user_id) {
            self.users.push(user_id);
        }
    }

    pub fn remove_user(&mut self, user_id: UserId) {
        self.users.retain(|u| *u != user_id);
    }

    pub fn add_media_session(&mut self, session_id: SessionId) {
        if !self.media_sessions.contains(&session_id) {
            self.media_sessions.push(session_id);
        }
    }

    pub fn remove_media_session(&mut self, session_id: SessionId) {
        self.media_sessions.retain(|s| *s != session_id);
    }

    pub fn add_media(&mut self, media_id: MediaId) {
        if !self.medias.contains(&media_id) {
            self.medias.push(media_id);
        }
    }

    pub fn remove_media(&mut self, media_id: MediaId) {
        self.medias.retain(|m| *m != media_id);
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn content_floor_info(&self) -> FloorInfo {
        FloorInfo {
            floor: self.content_floor,
            previous_floor: self.previous_content_floors.iter().cloned().collect(),
        }
    }

    pub fn conference_floor_info(&self) -> FloorInfo {
        FloorInfo {
            floor: self.conference_floor,
            previous_floor: self.previous_conference_floors.iter().cloned().collect(),
        }
    }

    /// Replaces the current content floor, pushing the previous one onto the
    /// MRU history.
    pub fn set_content_floor(&mut self, media_id: MediaId) -> FloorInfo {
        if let Some(current) = self.content_floor.take() {
            push_mru(&mut self.previous_content_floors, current, self.floor_history_cap);
        }
        self.content_floor = Some(media_id);
        self.content_floor_info()
    }

    /// Restores the most-recently-pushed previous floor.
    pub fn release_content_floor(&mut self) -> FloorInfo {
        self.content_floor = self.previous_content_floors.pop_front();
        self.content_floor_info()
    }

    pub fn set_conference_floor(&mut self, media_id: MediaId) -> FloorInfo {
        if let Some(current) = self.conference_floor.take() {
            push_mru(&mut self.previous_conference_floors, current, self.floor_history_cap);
        }
        self.conference_floor = Some(media_id);
        self.conference_floor_info()
    }

    pub fn release_conference_floor(&mut self) -> FloorInfo {
        self.conference_floor = self.previous_conference_floors.pop_front();
        self.conference_floor_info()
    }

    /// A disconnected media matching the current content floor archives that
    /// floor into history and clears it, rather than restoring the previous
    /// holder — the disconnected media is still the most-recently-held floor,
    /// so it belongs at the front of history same as any other replacement.
    fn archive_content_floor_on_disconnect(&mut self, media_id: MediaId) -> FloorInfo {
        push_mru(&mut self.previous_content_floors, media_id, self.floor_history_cap);
        self.content_floor = None;
        self.content_floor_info()
    }

    fn archive_conference_floor_on_disconnect(&mut self, media_id: MediaId) -> FloorInfo {
        push_mru(&mut self.previous_conference_floors, media_id, self.floor_history_cap);
        self.conference_floor = None;
        self.conference_floor_info()
    }

    /// A disconnected media matching the current content or conference floor
    /// triggers an automatic release of that floor. Returns the floors that
    /// changed. Each floor reacts only to its own referent.
    pub fn on_media_disconnected(&mut self, media_id: MediaId) -> (Option<FloorInfo>, Option<FloorInfo>) {
        let content_change = if self.content_floor == Some(media_id) {
            Some(self.archive_content_floor_on_disconnect(media_id))
        } else {
            None
        };
        let conference_change = if self.conference_floor == Some(media_id) {
            Some(self.archive_conference_floor_on_disconnect(media_id))
        } else {
            None
        };
        (content_change, conference_change)
    }
}

/// Resolves the room-wide conference-floor search: if the incoming media has
/// no video, look first among the session's sibling units, then across all
/// the user's sessions, for a unit whose video is `sendrecv` or `sendonly`.
/// Returns `None` when nothing qualifies (the caller then no-ops with a
/// warning).
pub fn resolve_conference_floor_candidate(
    incoming_media: MediaId,
    incoming_has_send_video: bool,
    sibling_candidates: &[(MediaId, bool)],
    user_session_candidates: &[(MediaId, bool)],
) -> Option<MediaId> {
    if incoming_has_send_video {
        return Some(incoming_media);
    }
    sibling_candidates
        .iter()
        .find(|(_, ok)| *ok)
        .or_else(|| user_session_candidates.iter().find(|(_, ok)| *ok))
        .map(|(id, _)| *id)
}
