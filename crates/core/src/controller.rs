//! Top-level façade: request routing, cross-entity invariants, event
//! subscription fan-out, strategy dispatch.
//!
//! Rooms, users, sessions and media units are cyclic by nature (room ↔ user
//! ↔ session ↔ media ↔ room); they are modeled as arena-style flat indexes
//! keyed by id, with tree membership (`Room.users`, `User.media_sessions`,
//! ...) as the source of truth and these maps as a cache for O(log n) lookup
//! by any id.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info, warn};

use crate::adapter::{ComposedAdapter, ElementId, NegotiateOptions};
use crate::balancer::Balancer;
use crate::dtmf::DtmfSink;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::event::{Event, EventBus};
use crate::media_session::{MediaSession, NegotiationContext};
use crate::media_unit::{MediaUnit, TransposerPair};
use crate::room::{resolve_conference_floor_candidate, Room};
use crate::types::{
    ConnectKind, HostId, MediaId, MediaProfile, MediaSessionType, RoomId, SessionId, Strategy,
    UserId, UserType,
};
use crate::user::User;

pub struct ControllerSettings {
    pub floor_history_cap: usize,
    pub dtmf_timeout: Duration,
    pub dtmf_code_length: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            floor_history_cap: 10,
            dtmf_timeout: Duration::from_secs(3),
            dtmf_code_length: 2,
        }
    }
}

pub struct Controller {
    rooms: DashMap<RoomId, Arc<RwLock<Room>>>,
    users: DashMap<UserId, Arc<RwLock<User>>>,
    sessions: DashMap<SessionId, Arc<RwLock<MediaSession>>>,
    medias: DashMap<MediaId, Arc<RwLock<MediaUnit>>>,
    adapter: Arc<ComposedAdapter>,
    balancer: Arc<Balancer>,
    events: Arc<EventBus>,
    settings: ControllerSettings,
    /// Coalesces concurrent cross-host transposer creation, keyed
    /// `srcHost|srcElementId|sinkHost`.
    transposer_inflight: DashMap<String, Arc<Notify>>,
    /// Named policies attached to a room/user/session/media identifier.
    /// Backs `setStrategy`/`getStrategy`.
    strategies: DashMap<String, Strategy>,
    /// Lets internal owned callbacks (the per-session DTMF sink) reach back
    /// into the controller without a reference-cycle; populated once at
    /// construction via `Arc::new_cyclic`.
    self_handle: Weak<Controller>,
}

impl Controller {
    pub fn new(
        adapter: Arc<ComposedAdapter>,
        balancer: Arc<Balancer>,
        events: Arc<EventBus>,
        settings: ControllerSettings,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            rooms: DashMap::new(),
            users: DashMap::new(),
            sessions: DashMap::new(),
            medias: DashMap::new(),
            adapter,
            balancer,
            events,
            settings,
            transposer_inflight: DashMap::new(),
            strategies: DashMap::new(),
            self_handle: weak.clone(),
        })
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    // ---------------------------------------------------------------
    // Room / user lifecycle
    // ---------------------------------------------------------------

    /// `join(roomId, type, params) → userId`. `room_id = None`
    /// creates a fresh room.
    pub async fn join(
        &self,
        room_id: Option<RoomId>,
        user_type: UserType,
        name: String,
    ) -> (RoomId, UserId) {
        let room_id = match room_id {
            Some(id) if self.rooms.contains_key(&id) => id,
            Some(id) => {
                self.rooms.insert(id, Arc::new(RwLock::new(Room::new(self.settings.floor_history_cap))));
                self.events.publish(Event::RoomCreated { room_id: id });
                id
            }
            None => {
                let room = Room::new(self.settings.floor_history_cap);
                let id = room.id;
                self.rooms.insert(id, Arc::new(RwLock::new(room)));
                self.events.publish(Event::RoomCreated { room_id: id });
                id
            }
        };

        let user = User::new(room_id, user_type, name);
        let user_id = user.id;
        self.users.insert(user_id, Arc::new(RwLock::new(user)));

        if let Some(room) = self.rooms.get(&room_id) {
            room.write().await.add_user(user_id);
        }

        info!(%room_id, %user_id, "user joined");
        self.events.publish(Event::UserJoined { room_id, user_id });
        (room_id, user_id)
    }

    /// `leave(userId, roomId)`. Idempotent: an unknown user/room resolves
    /// successfully.
    pub async fn leave(&self, user_id: UserId, room_id: RoomId) -> OrchestratorResult<()> {
        let Some((_, user_lock)) = self.users.remove(&user_id) else {
            return Ok(());
        };

        let session_ids = user_lock.write().await.leave();
        let user_type = user_lock.read().await.user_type;

        for session_id in session_ids {
            let _ = self.stop_session(session_id).await;
        }

        if let Some(room) = self.rooms.get(&room_id) {
            let mut room = room.write().await;
            room.remove_user(user_id);

            if user_type == UserType::Mcu {
                let control_user = room.mcu_control_user;
                let remaining_mcu = {
                    let mut any = false;
                    for uid in &room.users {
                        if Some(*uid) == control_user {
                            continue;
                        }
                        if let Some(u) = self.users.get(uid) {
                            if u.read().await.user_type == UserType::Mcu {
                                any = true;
                                break;
                            }
                        }
                    }
                    any
                };
                if !remaining_mcu {
                    if let Some(mcu_session) = room.mcu_session.take() {
                        room.mcu_control_user = None;
                        drop(room);
                        let _ = self.stop_session(mcu_session).await;
                        if let Some(control_user_id) = control_user {
                            self.users.remove(&control_user_id);
                            if let Some(room) = self.rooms.get(&room_id) {
                                room.write().await.remove_user(control_user_id);
                            }
                        }
                    }
                }
            }
        }

        self.events.publish(Event::UserLeft { room_id, user_id });

        let room_lock = self.rooms.get(&room_id).map(|e| e.value().clone());
        let room_now_empty = match room_lock {
            Some(room) => room.read().await.is_empty(),
            None => false,
        };

        if room_now_empty {
            self.destroy_room(room_id).await;
        }

        Ok(())
    }

    async fn destroy_room(&self, room_id: RoomId) {
        if self.rooms.remove(&room_id).is_some() {
            info!(%room_id, "room empty, destroyed");
            self.events.publish(Event::RoomDestroyed { room_id });
            self.events.unsubscribe_identifier(&room_id.to_string());
        }
    }

    // ---------------------------------------------------------------
    // Publish / subscribe
    // ---------------------------------------------------------------

    /// `publish(user, room, type, params) → {mediaId, descriptor}` (spec
    /// §6). `mediaId` in the client-facing API is the session id: from the
    /// client's perspective, one offer/answer exchange *is* "a media".
    pub async fn publish(
        &self,
        user_id: UserId,
        session_type: MediaSessionType,
        media_profile: MediaProfile,
        descriptor: Option<String>,
        options: serde_json::Value,
        name: String,
    ) -> OrchestratorResult<(SessionId, String)> {
        let user_lock = self
            .users
            .get(&user_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| OrchestratorError::UserNotFound(user_id.to_string()))?;

        let mut session = {
            let mut user = user_lock.write().await;
            user.new_session(name, session_type, media_profile, options)
        };

        let outcome = self.process_session(&mut session, descriptor).await?;
        let session_id = session.id;
        let room_id = session.room_id;

        self.register_session(session, outcome.new_units).await;

        if let Some(room) = self.rooms.get(&room_id) {
            room.write().await.add_media_session(session_id);
        }

        if outcome.emit_media_negotiated {
            self.events.publish(Event::MediaNegotiated { session_id });
        }
        self.events.publish(Event::MediaConnected { room_id, user_id, media_id: self.primary_media(session_id).await });

        Ok((session_id, outcome.local_descriptor))
    }

    /// `subscribe(user, source, type, params) → {mediaId, descriptor}`
    ///: as `publish`, plus connecting the source session's units
    /// into the new one on success.
    pub async fn subscribe(
        &self,
        user_id: UserId,
        source_session_id: SessionId,
        session_type: MediaSessionType,
        media_profile: MediaProfile,
        options: serde_json::Value,
        name: String,
    ) -> OrchestratorResult<(SessionId, String)> {
        let (session_id, answer) = self
            .publish(user_id, session_type, media_profile, None, options, name)
            .await?;

        self.connect_sessions(source_session_id, &[session_id], ConnectKind::All).await?;
        self.events.publish(Event::SubscribedTo { media_id: self.primary_media(session_id).await, source_id: self.primary_media(source_session_id).await });

        Ok((session_id, answer))
    }

    /// `publishAndSubscribe(...)` fused: on first
    /// MCU user, create/reuse the room's MCU mixer session, connect existing
    /// SFU sessions into it, and connect the room's content floor to the
    /// publisher if it carries content media.
    pub async fn publish_and_subscribe(
        &self,
        user_id: UserId,
        session_type: MediaSessionType,
        media_profile: MediaProfile,
        descriptor: Option<String>,
        options: serde_json::Value,
        name: String,
    ) -> OrchestratorResult<(SessionId, String)> {
        let (session_id, answer) = self
            .publish(user_id, session_type, media_profile, descriptor, options, name)
            .await?;

        let user_type = self
            .users
            .get(&user_id)
            .ok_or_else(|| OrchestratorError::UserNotFound(user_id.to_string()))?
            .read()
            .await
            .user_type;
        let room_id = self
            .sessions
            .get(&session_id)
            .ok_or_else(|| OrchestratorError::MediaNotFound(session_id.to_string()))?
            .read()
            .await
            .room_id;

        if user_type == UserType::Mcu {
            self.ensure_mcu_mixer(room_id, session_id).await?;
        }

        let carries_content = self.session_has_content(session_id).await;
        if carries_content {
            let room_lock = self.rooms.get(&room_id).map(|e| e.value().clone());
            let content_floor = match room_lock {
                Some(room) => room.read().await.content_floor,
                None => None,
            };
            if let Some(floor_media) = content_floor {
                if let Some(floor_session) = self.session_for_media(floor_media).await {
                    let _ = self.connect_sessions(floor_session, &[session_id], ConnectKind::Content).await;
                }
            }
        }

        Ok((session_id, answer))
    }

    async fn ensure_mcu_mixer(&self, room_id: RoomId, joining_session: SessionId) -> OrchestratorResult<()> {
        let room_lock = self
            .rooms
            .get(&room_id)
            .ok_or_else(|| OrchestratorError::RoomNotFound(room_id.to_string()))?
            .value()
            .clone();
        let existing = room_lock.read().await.mcu_session;
        if existing.is_some() {
            return Ok(());
        }

        // The mixer is itself a session, owned by a synthetic MCU control
        // user the controller keeps internally.
        let (_, mcu_user_id) = self.join(Some(room_id), UserType::Mcu, "mcu".to_string()).await;
        let user_lock = self.users.get(&mcu_user_id).unwrap().value().clone();
        let mut mixer_session = {
            let mut user = user_lock.write().await;
            user.new_session("mcu-mixer".to_string(), MediaSessionType::Mcu, MediaProfile::All, serde_json::Value::Null)
        };
        let outcome = self.process_session(&mut mixer_session, None).await?;
        let mixer_session_id = mixer_session.id;
        self.register_session(mixer_session, outcome.new_units).await;

        if let Some(room) = self.rooms.get(&room_id) {
            let mut room = room.write().await;
            room.add_media_session(mixer_session_id);
            room.mcu_session = Some(mixer_session_id);
            room.mcu_control_user = Some(mcu_user_id);
        }

        // Connect every existing SFU session in the room into the mixer.
        let sibling_sessions: Vec<SessionId> = room_lock.read().await.media_sessions.clone();

        for sid in sibling_sessions {
            if sid == mixer_session_id || sid == joining_session {
                continue;
            }
            let _ = self.connect_sessions(sid, &[mixer_session_id], ConnectKind::All).await;
        }

        Ok(())
    }

    /// Feeds a new remote descriptor into an already-published session,
    /// driving the renegotiation path. There is no separate client verb for
    /// this — a client adding a screen-share m-line to a session it already
    /// has open sends this the same way it sent the original `publish`
    /// offer, just against the session it already owns (decision recorded
    /// in DESIGN.md).
    pub async fn renegotiate(&self, session_id: SessionId, descriptor: String) -> OrchestratorResult<String> {
        let session_lock = self
            .sessions
            .get(&session_id)
            .ok_or_else(|| OrchestratorError::MediaNotFound(session_id.to_string()))?
            .value()
            .clone();

        let (room_id, user_id, existing_media) = {
            let s = session_lock.read().await;
            (s.room_id, s.user_id, s.medias.clone())
        };

        let outcome = {
            let mut session = session_lock.write().await;
            self.process_session(&mut session, Some(descriptor)).await?
        };

        // Kinds that already had an element are re-answered on their
        // existing element rather than negotiating a new one.
        for (profile, partial) in &outcome.reprocess {
            let Some(unit_id) = self.find_media_for_profile(&existing_media, *profile).await else {
                continue;
            };
            if let Some(unit_lock) = self.medias.get(&unit_id).map(|e| e.value().clone()) {
                let element_id = unit_lock.read().await.element_id.clone();
                self.adapter.for_profile(*profile).process_answer(&element_id, partial).await?;
                unit_lock.write().await.remote_descriptor = Some(partial.clone());
            }
        }

        // A brand-new unit (e.g. content negotiated for the first time) is
        // registered against the session exactly as `register_session` would
        // for a fresh publish.
        if !outcome.new_units.is_empty() {
            let mut session = session_lock.write().await;
            for unit in outcome.new_units {
                let media_id = unit.id;
                session.medias.push(media_id);
                self.medias.insert(media_id, Arc::new(RwLock::new(unit)));
                if let Some(room) = self.rooms.get(&room_id) {
                    room.write().await.add_media(media_id);
                }
                self.events.publish(Event::MediaConnected { room_id, user_id, media_id });
            }
        }

        Ok(outcome.local_descriptor)
    }

    /// Finds, among `media_ids`, the unit already carrying `profile`'s kind
    /// — used by `renegotiate` to map a reprocessed partial back onto the
    /// `MediaUnit` whose element should receive `processAnswer`.
    async fn find_media_for_profile(&self, media_ids: &[MediaId], profile: MediaProfile) -> Option<MediaId> {
        for mid in media_ids {
            let unit_lock = self.medias.get(mid)?.value().clone();
            let types = unit_lock.read().await.media_types;
            let matches = match profile {
                MediaProfile::Audio => types.audio.is_active(),
                MediaProfile::Main | MediaProfile::All => types.video.is_active(),
                MediaProfile::Content => types.content.is_active(),
            };
            if matches {
                return Some(*mid);
            }
        }
        None
    }

    async fn session_has_content(&self, session_id: SessionId) -> bool {
        let Some(session) = self.sessions.get(&session_id) else { return false };
        let media_ids = session.read().await.medias.clone();
        for mid in media_ids {
            if let Some(m) = self.medias.get(&mid) {
                if m.read().await.get_content_media() {
                    return true;
                }
            }
        }
        false
    }

    async fn session_for_media(&self, media_id: MediaId) -> Option<SessionId> {
        let unit = self.medias.get(&media_id)?.value().clone();
        Some(unit.read().await.session_id)
    }

    async fn primary_media(&self, session_id: SessionId) -> MediaId {
        let Some(session) = self.sessions.get(&session_id).map(|e| e.value().clone()) else {
            return MediaId::new();
        };
        session.read().await.medias.first().copied().unwrap_or_else(MediaId::new)
    }

    /// Runs `MediaSession::process` with an adapter/balancer context borrowed
    /// for the call only.
    async fn process_session(
        &self,
        session: &mut MediaSession,
        descriptor: Option<String>,
    ) -> OrchestratorResult<crate::media_session::ProcessOutcome> {
        let ctx = NegotiationContext {
            adapter: &self.adapter,
            balancer: &self.balancer,
        };
        session.process(descriptor, &ctx).await
    }

    async fn register_session(&self, mut session: MediaSession, new_units: Vec<MediaUnit>) {
        let has_audio = new_units.iter().any(|u| u.media_types.audio.is_active());
        for unit in new_units {
            session.medias.push(unit.id);
            self.medias.insert(unit.id, Arc::new(RwLock::new(unit)));
        }
        let session_id = session.id;
        let room_id = session.room_id;

        if has_audio {
            let sink = Arc::new(SessionDtmfSink {
                controller: self.handle(),
                session_id,
            });
            session.attach_dtmf(self.settings.dtmf_timeout, self.settings.dtmf_code_length, sink);
        }

        for mid in &session.medias {
            if let Some(r) = self.rooms.get(&room_id) {
                r.write().await.add_media(*mid);
            }
        }

        self.sessions.insert(session_id, Arc::new(RwLock::new(session)));
    }

    /// A `Weak` handle this controller can hand to owned callbacks (DTMF
    /// sink) without creating an ownership cycle.
    fn handle(&self) -> Weak<Controller> {
        self.self_handle.clone()
    }

    // ---------------------------------------------------------------
    // Connect / disconnect (cross-host transposition)
    // ---------------------------------------------------------------

    async fn connect_sessions(
        &self,
        source_session: SessionId,
        sink_sessions: &[SessionId],
        kind: ConnectKind,
    ) -> OrchestratorResult<()> {
        let source_media = self
            .sessions
            .get(&source_session)
            .ok_or_else(|| OrchestratorError::MediaNotFound(source_session.to_string()))?
            .read()
            .await
            .medias
            .clone();

        for sink_session in sink_sessions {
            let sink_media = self
                .sessions
                .get(sink_session)
                .ok_or_else(|| OrchestratorError::MediaNotFound(sink_session.to_string()))?
                .read()
                .await
                .medias
                .clone();

            for src_id in &source_media {
                for sink_id in &sink_media {
                    self.connect_media(*src_id, *sink_id, kind).await?;
                }
            }
        }
        Ok(())
    }

    /// `connect(sourceId, sinkIds[], kind)`.
    pub async fn connect(&self, source_id: MediaId, sink_ids: &[MediaId], kind: ConnectKind) -> OrchestratorResult<()> {
        for sink_id in sink_ids {
            self.connect_media(source_id, *sink_id, kind).await?;
        }
        Ok(())
    }

    async fn connect_media(&self, src_id: MediaId, sink_id: MediaId, kind: ConnectKind) -> OrchestratorResult<()> {
        let src_lock = self
            .medias
            .get(&src_id)
            .ok_or_else(|| OrchestratorError::MediaNotFound(src_id.to_string()))?
            .value()
            .clone();
        let sink_lock = self
            .medias
            .get(&sink_id)
            .ok_or_else(|| OrchestratorError::MediaNotFound(sink_id.to_string()))?
            .value()
            .clone();

        let (src_host, src_element) = {
            let src = src_lock.read().await;
            (src.host.clone(), src.element_id.clone())
        };
        let (sink_host, sink_element) = {
            let sink = sink_lock.read().await;
            (sink.host.clone(), sink.element_id.clone())
        };

        if src_host == sink_host {
            self.adapter.for_profile(MediaProfile::All).connect(&src_element, &sink_element, kind).await?;
            self.events.publish(Event::MediaConnected {
                room_id: src_lock.read().await.room_id,
                user_id: src_lock.read().await.user_id,
                media_id: sink_id,
            });
            return Ok(());
        }

        self.connect_cross_host(src_lock, &src_host, &src_element, sink_lock, &sink_host, &sink_element, kind).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn connect_cross_host(
        &self,
        src_lock: Arc<RwLock<MediaUnit>>,
        src_host: &HostId,
        src_element: &ElementId,
        sink_lock: Arc<RwLock<MediaUnit>>,
        sink_host: &HostId,
        sink_element: &ElementId,
        kind: ConnectKind,
    ) -> OrchestratorResult<()> {
        let key = format!("{src_host}|{src_element}|{sink_host}");

        loop {
            if let Some(pair) = src_lock.read().await.transposer_for(sink_host).cloned() {
                self.adapter
                    .for_profile(MediaProfile::Main)
                    .connect(&pair.sink_element, sink_element, kind)
                    .await?;
                src_lock.write().await.transposers.get_mut(sink_host).unwrap().sink_refs += 1;
                self.balancer.increment_host_streams(sink_host, MediaProfile::Main);
                return Ok(());
            }

            if let Some(notify) = self.transposer_inflight.get(&key).map(|n| n.clone()) {
                notify.notified().await;
                continue;
            }

            let notify = Arc::new(Notify::new());
            self.transposer_inflight.insert(key.clone(), notify.clone());

            let result = self
                .create_transposer(&src_lock, src_host, src_element, sink_host)
                .await;

            self.transposer_inflight.remove(&key);
            notify.notify_waiters();
            self.events.publish(Event::ElementTransposed { key: key.clone() });

            result?;
            // loop back around: the pair now exists, connect the sink side.
        }
    }

    async fn create_transposer(
        &self,
        src_lock: &Arc<RwLock<MediaUnit>>,
        src_host: &HostId,
        src_element: &ElementId,
        sink_host: &HostId,
    ) -> OrchestratorResult<()> {
        let room_id = src_lock.read().await.room_id;

        let rtp_adapter = self.adapter.for_profile(MediaProfile::Main);
        let src_ip = self.balancer.retrieve_host(src_host)?.ip;
        let sink_ip = self.balancer.retrieve_host(sink_host)?.ip;

        let (source_transposer, _) = rtp_adapter
            .create_media_element(
                room_id,
                MediaSessionType::Rtp,
                NegotiateOptions { preferred_host: Some(src_host.clone()), ..Default::default() },
            )
            .await?;
        let (sink_transposer, _) = rtp_adapter
            .create_media_element(
                room_id,
                MediaSessionType::Rtp,
                NegotiateOptions { preferred_host: Some(sink_host.clone()), ..Default::default() },
            )
            .await?;

        let offer = rtp_adapter.generate_offer(&source_transposer, serde_json::Value::Null).await?;
        let offer = crate::sdp::filter_by_video_codec(&offer, "H264").unwrap_or(offer);
        let offer = crate::sdp::non_pure_replace_server_ipv4(&offer, &src_ip).unwrap_or(offer);

        let answer = rtp_adapter.process_offer(&sink_transposer, &offer).await?;
        let answer = crate::sdp::non_pure_replace_server_ipv4(&answer, &sink_ip).unwrap_or(answer);
        rtp_adapter.process_answer(&source_transposer, &answer).await?;

        rtp_adapter.connect(src_element, &source_transposer, ConnectKind::All).await?;

        self.balancer.increment_host_streams(src_host, MediaProfile::Main);
        self.balancer.increment_host_streams(sink_host, MediaProfile::Main);

        src_lock.write().await.transposers.insert(
            sink_host.clone(),
            TransposerPair {
                source_element: source_transposer,
                sink_element: sink_transposer,
                sink_host: sink_host.clone(),
                sink_refs: 1,
            },
        );

        Ok(())
    }

    /// `disconnect(...)`. Only the sink-side transposer is torn down; the
    /// source side survives until the source is released, so other sinks on
    /// the same remote host keep working.
    pub async fn disconnect(&self, source_id: MediaId, sink_id: MediaId, kind: ConnectKind) -> OrchestratorResult<()> {
        let src_lock = self
            .medias
            .get(&source_id)
            .ok_or_else(|| OrchestratorError::MediaNotFound(source_id.to_string()))?
            .value()
            .clone();
        let sink_lock = self
            .medias
            .get(&sink_id)
            .ok_or_else(|| OrchestratorError::MediaNotFound(sink_id.to_string()))?
            .value()
            .clone();

        let (src_host, src_element) = {
            let src = src_lock.read().await;
            (src.host.clone(), src.element_id.clone())
        };
        let (sink_host, sink_element) = {
            let sink = sink_lock.read().await;
            (sink.host.clone(), sink.element_id.clone())
        };

        if src_host == sink_host {
            self.adapter.for_profile(MediaProfile::All).disconnect(&src_element, &sink_element, kind).await?;
            return Ok(());
        }

        if let Some(pair) = src_lock.read().await.transposer_for(&sink_host).cloned() {
            self.adapter.for_profile(MediaProfile::Main).disconnect(&pair.sink_element, &sink_element, kind).await?;
            let mut src = src_lock.write().await;
            if let Some(p) = src.transposers.get_mut(&sink_host) {
                p.sink_refs = p.sink_refs.saturating_sub(1);
            }
            self.balancer.decrement_host_streams(&sink_host, MediaProfile::Main);
        }

        Ok(())
    }

    /// Releases every transposer a media unit owns as a source.
    async fn release_unit_transposers(&self, media_id: MediaId) {
        let Some(unit_lock) = self.medias.get(&media_id).map(|e| e.value().clone()) else {
            return;
        };
        let transposers: HashMap<HostId, TransposerPair> =
            std::mem::take(&mut unit_lock.write().await.transposers);

        let (src_host, room_id) = {
            let u = unit_lock.read().await;
            (u.host.clone(), u.room_id)
        };

        for (sink_host, pair) in transposers {
            let adapter = self.adapter.for_profile(MediaProfile::Main);
            let _ = adapter.stop(room_id, MediaSessionType::Rtp, &pair.source_element).await;
            let _ = adapter.stop(room_id, MediaSessionType::Rtp, &pair.sink_element).await;
            self.balancer.decrement_host_streams(&src_host, MediaProfile::Main);
            self.balancer.decrement_host_streams(&sink_host, MediaProfile::Main);
        }
    }

    // ---------------------------------------------------------------
    // Unpublish / unsubscribe / stop
    // ---------------------------------------------------------------

    pub async fn unpublish(&self, media_id: SessionId) -> OrchestratorResult<()> {
        self.stop_session(media_id).await
    }

    pub async fn unsubscribe(&self, media_id: SessionId) -> OrchestratorResult<()> {
        self.stop_session(media_id).await
    }

    async fn stop_session(&self, session_id: SessionId) -> OrchestratorResult<()> {
        let Some((_, session_lock)) = self.sessions.remove(&session_id) else {
            return Ok(());
        };
        let session = session_lock.read().await;
        let room_id = session.room_id;
        let user_id = session.user_id;
        let media_ids = session.medias.clone();
        drop(session);

        for media_id in &media_ids {
            self.release_unit_transposers(*media_id).await;
            if let Some((_, unit_lock)) = self.medias.remove(media_id) {
                let unit = unit_lock.read().await;
                let _ = self
                    .adapter
                    .for_profile(MediaProfile::All)
                    .stop(room_id, unit.session_type, &unit.element_id)
                    .await;
            }
            self.events.publish(Event::MediaDisconnected { room_id, user_id, media_id: *media_id });

            if let Some(room) = self.rooms.get(&room_id) {
                let mut room = room.write().await;
                room.remove_media(*media_id);
                let (content_change, conference_change) = room.on_media_disconnected(*media_id);
                if let Some(info) = content_change {
                    self.events.publish(Event::ContentFloorChanged { room_id, info });
                }
                if let Some(info) = conference_change {
                    self.events.publish(Event::ConferenceFloorChanged { room_id, info });
                }
            }
        }

        if let Some(room) = self.rooms.get(&room_id) {
            room.write().await.remove_media_session(session_id);
        }
        if let Some(user) = self.users.get(&user_id) {
            user.write().await.remove_session(session_id);
        }

        Ok(())
    }

    // ---------------------------------------------------------------
    // Floors
    // ---------------------------------------------------------------

    pub async fn set_content_floor(&self, room_id: RoomId, media_id: MediaId) -> OrchestratorResult<()> {
        if !self.medias.contains_key(&media_id) {
            return Err(OrchestratorError::MediaNotFound(media_id.to_string()));
        }
        let room = self
            .rooms
            .get(&room_id)
            .ok_or_else(|| OrchestratorError::RoomNotFound(room_id.to_string()))?;
        let info = room.write().await.set_content_floor(media_id);
        self.events.publish(Event::ContentFloorChanged { room_id, info });
        Ok(())
    }

    pub async fn release_content_floor(&self, room_id: RoomId) -> OrchestratorResult<()> {
        let room = self
            .rooms
            .get(&room_id)
            .ok_or_else(|| OrchestratorError::RoomNotFound(room_id.to_string()))?;
        let info = room.write().await.release_content_floor();
        self.events.publish(Event::ContentFloorChanged { room_id, info });
        Ok(())
    }

    /// `setConferenceFloor`: if the incoming media has no video,
    /// search sibling units of its session, then all of the user's sessions,
    /// for a unit whose video is `sendrecv`/`sendonly`; no-op with a warning
    /// if none is found.
    pub async fn set_conference_floor(&self, room_id: RoomId, media_id: MediaId) -> OrchestratorResult<()> {
        let unit_lock = self
            .medias
            .get(&media_id)
            .ok_or_else(|| OrchestratorError::MediaNotFound(media_id.to_string()))?
            .value()
            .clone();
        let (has_video, session_id, user_id) = {
            let unit = unit_lock.read().await;
            (unit.is_conference_floor_candidate(), unit.session_id, unit.user_id)
        };

        let sibling_candidates = self.candidate_units_for_session(session_id).await;
        let user_candidates = self.candidate_units_for_user(user_id).await;

        let Some(chosen) = resolve_conference_floor_candidate(media_id, has_video, &sibling_candidates, &user_candidates) else {
            warn!(%media_id, "setConferenceFloor: no unit with outbound video found, ignoring");
            return Ok(());
        };

        let room = self
            .rooms
            .get(&room_id)
            .ok_or_else(|| OrchestratorError::RoomNotFound(room_id.to_string()))?;
        let info = room.write().await.set_conference_floor(chosen);
        self.events.publish(Event::ConferenceFloorChanged { room_id, info });
        Ok(())
    }

    pub async fn release_conference_floor(&self, room_id: RoomId) -> OrchestratorResult<()> {
        let room = self
            .rooms
            .get(&room_id)
            .ok_or_else(|| OrchestratorError::RoomNotFound(room_id.to_string()))?;
        let info = room.write().await.release_conference_floor();
        self.events.publish(Event::ConferenceFloorChanged { room_id, info });
        Ok(())
    }

    async fn candidate_units_for_session(&self, session_id: SessionId) -> Vec<(MediaId, bool)> {
        let Some(session) = self.sessions.get(&session_id) else { return Vec::new() };
        let media_ids = session.read().await.medias.clone();
        let mut out = Vec::with_capacity(media_ids.len());
        for mid in media_ids {
            if let Some(m) = self.medias.get(&mid) {
                out.push((mid, m.read().await.is_conference_floor_candidate()));
            }
        }
        out
    }

    async fn candidate_units_for_user(&self, user_id: UserId) -> Vec<(MediaId, bool)> {
        let Some(user) = self.users.get(&user_id) else { return Vec::new() };
        let session_ids = user.read().await.media_sessions.clone();
        let mut out = Vec::new();
        for sid in session_ids {
            out.extend(self.candidate_units_for_session(sid).await);
        }
        out
    }

    // ---------------------------------------------------------------
    // Misc client-facing operations
    // ---------------------------------------------------------------

    pub async fn add_ice_candidate(&self, media_id: MediaId, candidate: serde_json::Value) -> OrchestratorResult<()> {
        let unit = self
            .medias
            .get(&media_id)
            .ok_or_else(|| OrchestratorError::MediaNotFound(media_id.to_string()))?
            .value()
            .clone();
        let element_id = unit.read().await.element_id.clone();
        self.adapter.for_profile(MediaProfile::All).add_ice_candidate(&element_id, candidate.clone()).await?;
        self.events.publish(Event::IceCandidate { media_id, candidate });
        Ok(())
    }

    pub async fn start_recording(&self, media_id: MediaId, path: String, params: serde_json::Value) -> OrchestratorResult<MediaId> {
        let unit = self
            .medias
            .get(&media_id)
            .ok_or_else(|| OrchestratorError::MediaNotFound(media_id.to_string()))?
            .value()
            .clone();
        let element_id = unit.read().await.element_id.clone();
        self.adapter.for_profile(MediaProfile::All).start_recording(&element_id, &path, params).await?;
        Ok(media_id)
    }

    pub async fn stop_recording(&self, media_id: MediaId) -> OrchestratorResult<()> {
        let unit = self
            .medias
            .get(&media_id)
            .ok_or_else(|| OrchestratorError::MediaNotFound(media_id.to_string()))?
            .value()
            .clone();
        let element_id = unit.read().await.element_id.clone();
        self.adapter.for_profile(MediaProfile::All).stop_recording(&element_id).await
    }

    pub async fn mute(&self, media_id: MediaId) -> OrchestratorResult<()> {
        self.events.publish(Event::MediaMuted { media_id });
        Ok(())
    }

    pub async fn unmute(&self, media_id: MediaId) -> OrchestratorResult<()> {
        self.events.publish(Event::MediaUnmuted { media_id });
        Ok(())
    }

    pub async fn set_volume(&self, media_id: MediaId, volume: f32) -> OrchestratorResult<()> {
        self.events.publish(Event::MediaVolumeChanged { media_id, volume });
        Ok(())
    }

    pub async fn request_keyframe(&self, media_id: MediaId) -> OrchestratorResult<()> {
        self.events.publish(Event::KeyframeNeeded { media_id });
        Ok(())
    }

    pub async fn dtmf(&self, media_id: MediaId, tone: char) -> OrchestratorResult<()> {
        let session_id = self
            .medias
            .get(&media_id)
            .ok_or_else(|| OrchestratorError::MediaNotFound(media_id.to_string()))?
            .read()
            .await
            .session_id;
        if let Some(session) = self.sessions.get(&session_id) {
            session.read().await.on_dtmf_digit(tone).await;
        }
        self.events.publish(Event::Dtmf { media_id, tone: tone.to_string() });
        Ok(())
    }

    pub async fn set_strategy(&self, identifier: String, strategy: Strategy) -> OrchestratorResult<()> {
        self.strategies.insert(identifier.clone(), strategy.clone());
        self.events.publish(Event::StrategyChanged { identifier, strategy });
        Ok(())
    }

    /// `getStrategy`. Unset identifiers report the default
    /// `freewill` strategy rather than an error — every room/user/session/
    /// media implicitly carries one.
    pub fn get_strategy(&self, identifier: &str) -> Strategy {
        self.strategies
            .get(identifier)
            .map(|e| e.value().clone())
            .unwrap_or_else(Strategy::freewill)
    }

    pub fn get_rooms(&self) -> Vec<RoomId> {
        self.rooms.iter().map(|e| *e.key()).collect()
    }

    pub async fn get_users(&self, room_id: RoomId) -> Vec<UserId> {
        let Some(room) = self.rooms.get(&room_id).map(|e| e.value().clone()) else {
            return Vec::new();
        };
        room.read().await.users.clone()
    }

    pub async fn get_user_medias(&self, user_id: UserId) -> Vec<MediaId> {
        let Some(user) = self.users.get(&user_id) else { return Vec::new() };
        let session_ids = user.read().await.media_sessions.clone();
        let mut out = Vec::new();
        for sid in session_ids {
            if let Some(s) = self.sessions.get(&sid) {
                out.extend(s.read().await.medias.clone());
            }
        }
        out
    }

    /// Whether `media_id`'s subtitle flag is currently on, toggled by the
    /// `*3`/`*4` DTMF commands. One of the `get*` accessors alongside
    /// `getRooms`/`getUsers`.
    pub async fn is_subtitle_enabled(&self, media_id: MediaId) -> Option<bool> {
        let unit = self.medias.get(&media_id)?.value().clone();
        Some(unit.read().await.enable_subtitle)
    }

    // ---------------------------------------------------------------
    // Host lifecycle
    // ---------------------------------------------------------------

    /// Consumes `MEDIA_SERVER_OFFLINE` by purging every media unit on that
    /// host without a backend round-trip.
    pub async fn handle_host_offline(&self, host_id: &HostId) {
        self.adapter.for_profile(MediaProfile::All).purge_host(host_id).await;
        let candidates: Vec<(MediaId, Arc<RwLock<MediaUnit>>)> = self
            .medias
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        let mut affected = Vec::new();
        for (media_id, unit_lock) in candidates {
            if unit_lock.read().await.host == *host_id {
                affected.push(media_id);
            }
        }
        for media_id in affected {
            if let Some((_, unit_lock)) = self.medias.remove(&media_id) {
                let unit = unit_lock.read().await;
                self.events.publish(Event::MediaDisconnected { room_id: unit.room_id, user_id: unit.user_id, media_id });
            }
        }
    }

    /// Releases every registered host through the balancer.
    pub async fn shutdown(&self) {
        for host_id in self.balancer.all_host_ids() {
            self.handle_host_offline(&host_id).await;
        }
    }

    // ---------------------------------------------------------------
    // Adapter event fan-in: adapter events flow back through the media
    // unit, up to the session and controller, and out to subscribed
    // clients via the event bus.
    // ---------------------------------------------------------------

    async fn media_by_element(&self, element_id: &ElementId) -> Option<(MediaId, Arc<RwLock<MediaUnit>>)> {
        for entry in self.medias.iter() {
            if entry.value().read().await.element_id == *element_id {
                return Some((*entry.key(), entry.value().clone()));
            }
        }
        None
    }

    /// Subscribes to every distinct backend's event stream and translates
    /// each `AdapterEvent` into the client-facing event taxonomy. Called
    /// once at process startup.
    pub fn spawn_adapter_event_loop(self: &Arc<Self>) {
        for adapter in self.adapter.distinct_backends() {
            let mut rx = adapter.events();
            let this = self.clone();
            tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    this.handle_adapter_event(event).await;
                }
            });
        }
    }

    async fn handle_adapter_event(&self, event: crate::adapter::AdapterEvent) {
        use crate::adapter::AdapterEvent;
        match event {
            AdapterEvent::MediaStateChanged { element_id, state } => {
                if let Some((media_id, unit)) = self.media_by_element(&element_id).await {
                    let room_id = unit.read().await.room_id;
                    self.events.publish(Event::MediaState { room_id, media_id, state });
                }
            }
            AdapterEvent::Ice { element_id, candidate } => {
                if let Some((media_id, _)) = self.media_by_element(&element_id).await {
                    self.events.publish(Event::IceCandidate { media_id, candidate });
                }
            }
            AdapterEvent::FlowIn { element_id, kind } => {
                if kind == ConnectKind::Audio || kind == ConnectKind::All {
                    if let Some((media_id, _)) = self.media_by_element(&element_id).await {
                        self.events.publish(Event::MediaStartTalking { media_id });
                    }
                }
            }
            AdapterEvent::FlowOut { element_id, kind } => {
                if kind == ConnectKind::Audio || kind == ConnectKind::All {
                    if let Some((media_id, _)) = self.media_by_element(&element_id).await {
                        self.events.publish(Event::MediaStopTalking { media_id });
                    }
                }
            }
            AdapterEvent::EndOfStream { element_id } => {
                if let Some((media_id, unit)) = self.media_by_element(&element_id).await {
                    let (room_id, user_id) = {
                        let u = unit.read().await;
                        (u.room_id, u.user_id)
                    };
                    self.events.publish(Event::MediaDisconnected { room_id, user_id, media_id });
                    if let Some(room) = self.rooms.get(&room_id) {
                        let mut room = room.write().await;
                        let (content_change, conference_change) = room.on_media_disconnected(media_id);
                        if let Some(info) = content_change {
                            self.events.publish(Event::ContentFloorChanged { room_id, info });
                        }
                        if let Some(info) = conference_change {
                            self.events.publish(Event::ConferenceFloorChanged { room_id, info });
                        }
                    }
                }
            }
            AdapterEvent::Dtmf { element_id, digit } => {
                if let Some((_, unit)) = self.media_by_element(&element_id).await {
                    let session_id = unit.read().await.session_id;
                    if let Some(session) = self.sessions.get(&session_id) {
                        session.read().await.on_dtmf_digit(digit).await;
                    }
                }
            }
            // The controller coordinates cross-host transposer creation
            // itself via an internal `Notify` (see `connect_cross_host`);
            // a backend-raised `ElementTransposed` has nothing further to do.
            AdapterEvent::ElementTransposed { .. } => {}
        }
    }
}

struct SessionDtmfSink {
    controller: Weak<Controller>,
    session_id: SessionId,
}

#[async_trait]
impl DtmfSink for SessionDtmfSink {
    async fn set_video_floor(&self) {
        let Some(controller) = self.controller.upgrade() else { return };
        let Some(session) = controller.sessions.get(&self.session_id) else { return };
        let (room_id, media_id) = {
            let s = session.read().await;
            (s.room_id, s.medias.first().copied())
        };
        if let Some(media_id) = media_id {
            let _ = controller.set_conference_floor(room_id, media_id).await;
        }
    }

    async fn set_layout_type(&self, layout_id: u32) {
        let Some(controller) = self.controller.upgrade() else { return };
        let Some(session) = controller.sessions.get(&self.session_id) else { return };
        let element_id = {
            let s = session.read().await;
            let Some(mid) = s.medias.first().copied() else { return };
            let Some(unit) = controller.medias.get(&mid) else { return };
            unit.read().await.element_id.clone()
        };
        let _ = controller.adapter.for_profile(MediaProfile::All).set_layout_type(&element_id, layout_id).await;
    }

    async fn toggle_subtitle(&self, per_media: bool) {
        let Some(controller) = self.controller.upgrade() else { return };
        let Some(session) = controller.sessions.get(&self.session_id) else { return };
        let media_ids = session.read().await.medias.clone();
        for mid in media_ids {
            if let Some(unit) = controller.medias.get(&mid) {
                let mut unit = unit.write().await;
                unit.enable_subtitle = !unit.enable_subtitle;
                if !per_media {
                    debug!(media_id = %mid, "toggled subtitle globally");
                } else {
                    debug!(media_id = %mid, "toggled subtitle per-media");
                }
            }
        }
    }
}
