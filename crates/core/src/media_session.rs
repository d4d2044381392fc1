//! A negotiation unit exposed to clients: one offer/answer exchange that
//! produces one or more [`MediaUnit`]s.

use std::sync::Arc;
use std::time::Duration;

use crate::adapter::{ComposedAdapter, NegotiateOptions, NegotiatedUnit};
use crate::balancer::Balancer;
use crate::dtmf::{DtmfAggregator, DtmfSink};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::media_unit::MediaUnit;
use crate::sdp;
use crate::types::{
    MediaId, MediaProfile, MediaSessionType, MediaTypes, NegotiationRole, RoomId, SessionId,
    Strategy, UserId,
};

/// Result of feeding a new remote descriptor into the session's role state
/// machine.
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoteDescriptorTransition {
    /// True exactly when this assignment is the first to flip
    /// `should_process_remote_descriptor_as_answerer` from false to true —
    /// the point at which an OFFERER emits `MEDIA_NEGOTIATED` once its
    /// self-generated offer is answered.
    pub became_answerer_after_offer: bool,
}

pub struct MediaSession {
    pub id: SessionId,
    pub name: String,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub session_type: MediaSessionType,
    pub media_profile: MediaProfile,
    pub options: serde_json::Value,
    /// Ordered media unit ids produced by this session's negotiation(s).
    pub medias: Vec<MediaId>,
    pub negotiation_role: Option<NegotiationRole>,
    pub should_renegotiate: bool,
    pub should_process_remote_descriptor_as_answerer: bool,
    pub remote_descriptor: Option<String>,
    pub local_descriptor: Option<String>,
    pub strategy: Strategy,
    pub dtmf: Option<Arc<DtmfAggregator>>,
    /// Union of every unit's `MediaTypes` negotiated so far. `MediaSession`
    /// doesn't own `MediaUnit` storage (arena model), so this is the only
    /// record it keeps of which kinds it has already negotiated — needed by
    /// `renegotiate` to tell an already-answered kind from a brand-new one.
    pub negotiated_kinds: MediaTypes,
}

impl MediaSession {
    pub fn new(
        name: String,
        room_id: RoomId,
        user_id: UserId,
        session_type: MediaSessionType,
        media_profile: MediaProfile,
        options: serde_json::Value,
    ) -> Self {
        Self {
            id: SessionId::new(),
            name,
            room_id,
            user_id,
            session_type,
            media_profile,
            options,
            medias: Vec::new(),
            negotiation_role: None,
            should_renegotiate: false,
            should_process_remote_descriptor_as_answerer: false,
            remote_descriptor: None,
            local_descriptor: None,
            strategy: Strategy::freewill(),
            dtmf: None,
            negotiated_kinds: MediaTypes::default(),
        }
    }

    /// Attaches the per-session DTMF aggregator once an audio unit exists.
    pub fn attach_dtmf(&mut self, timeout: Duration, code_length: usize, sink: Arc<dyn DtmfSink>) {
        if self.dtmf.is_none() {
            self.dtmf = Some(DtmfAggregator::new(timeout, code_length, sink));
        }
    }

    pub async fn on_dtmf_digit(&self, digit: char) {
        if let Some(dtmf) = &self.dtmf {
            dtmf.on_digit(digit).await;
        }
    }

    /// Explicit setter replacing a promise-returning property setter. Drives
    /// the role/renegotiation state machine and returns the computed
    /// transition.
    pub fn set_remote_descriptor(&mut self, sdp: String) -> RemoteDescriptorTransition {
        let had_local = self.local_descriptor.is_some();
        let had_remote = self.remote_descriptor.is_some();

        if self.negotiation_role.is_none() && !had_local {
            self.negotiation_role = Some(NegotiationRole::Answerer);
        }

        let mut transition = RemoteDescriptorTransition::default();
        if had_local && !had_remote {
            let was_set = self.should_process_remote_descriptor_as_answerer;
            self.should_process_remote_descriptor_as_answerer = true;
            transition.became_answerer_after_offer = !was_set;
        } else if had_local && had_remote {
            self.should_renegotiate = true;
        }

        self.remote_descriptor = Some(sdp);
        transition
    }

    pub fn set_local_descriptor(&mut self, sdp: String) {
        if self.negotiation_role.is_none() && self.remote_descriptor.is_none() {
            self.negotiation_role = Some(NegotiationRole::Offerer);
        }
        self.local_descriptor = Some(sdp);
    }

    /// Idempotent re-entry under the same remote descriptor when neither
    /// renegotiation flag is set.
    pub fn is_idempotent_reentry(&self, remote_sdp: Option<&str>) -> bool {
        !self.should_renegotiate
            && !self.should_process_remote_descriptor_as_answerer
            && self.remote_descriptor.as_deref() == remote_sdp
            && self.local_descriptor.is_some()
    }
}

/// Read-only handles a session needs to reach the adapter layer during
/// `process`/renegotiation. Borrowed for the duration of the call only —
/// `MediaSession` itself never stores these, matching the arena-of-IDs model
/// the rest of this crate uses.
pub struct NegotiationContext<'a> {
    pub adapter: &'a ComposedAdapter,
    pub balancer: &'a Balancer,
}

/// What `process()` produced: the answer/offer to hand back to the client
/// plus the fresh media units the caller (the controller) must register.
pub struct ProcessOutcome {
    pub local_descriptor: String,
    pub new_units: Vec<MediaUnit>,
    pub emit_media_negotiated: bool,
    /// Kinds whose existing element should be re-answered via
    /// `processAnswer` (the controller maps these to the session's existing
    /// `MediaUnit`s, since `MediaSession` itself doesn't own them).
    pub reprocess: Vec<(MediaProfile, String)>,
}

const PROFILE_AUDIO: MediaProfile = MediaProfile::Audio;
const PROFILE_MAIN: MediaProfile = MediaProfile::Main;
const PROFILE_CONTENT: MediaProfile = MediaProfile::Content;

fn kind_label(profile: MediaProfile) -> &'static str {
    match profile {
        MediaProfile::Audio => "audio",
        MediaProfile::Main => "video",
        MediaProfile::Content => "content",
        MediaProfile::All => "video",
    }
}

fn partial_for(profile: MediaProfile, remote_sdp: &str) -> OrchestratorResult<Option<String>> {
    match profile {
        MediaProfile::Audio => sdp::get_audio_sdp(remote_sdp),
        MediaProfile::Main | MediaProfile::All => sdp::get_video_sdp(remote_sdp),
        MediaProfile::Content => sdp::get_content_sdp(remote_sdp),
    }
}

fn unit_from_negotiated(
    negotiated: NegotiatedUnit,
    session: &MediaSession,
) -> MediaUnit {
    let mut unit = MediaUnit::new(
        session.id,
        session.room_id,
        session.user_id,
        session.session_type,
        negotiated.host,
        negotiated.element_id,
    );
    unit.media_types = negotiated.media_types;
    unit.local_descriptor = negotiated.local_descriptor;
    unit.remote_descriptor = negotiated.remote_descriptor;
    unit
}

impl MediaSession {
    /// Runs one offer/answer exchange.
    /// `remote_sdp = None` requests a locally generated offer.
    pub async fn process(
        &mut self,
        remote_sdp: Option<String>,
        ctx: &NegotiationContext<'_>,
    ) -> OrchestratorResult<ProcessOutcome> {
        if self.is_idempotent_reentry(remote_sdp.as_deref()) {
            return Ok(ProcessOutcome {
                local_descriptor: self.local_descriptor.clone().unwrap_or_default(),
                new_units: Vec::new(),
                emit_media_negotiated: false,
                reprocess: Vec::new(),
            });
        }

        let transition = if let Some(sdp) = remote_sdp.clone() {
            self.set_remote_descriptor(sdp)
        } else {
            RemoteDescriptorTransition::default()
        };

        if self.should_renegotiate || self.should_process_remote_descriptor_as_answerer {
            return self.renegotiate(ctx).await;
        }

        let mut units: Vec<MediaUnit> = Vec::new();
        let mut parts: Vec<(String, String)> = Vec::new();

        if ctx.adapter.is_composed() {
            for profile in [PROFILE_AUDIO, PROFILE_MAIN, PROFILE_CONTENT] {
                let partial = match &remote_sdp {
                    Some(sdp) => match partial_for(profile, sdp)? {
                        Some(p) => Some(p),
                        None => continue,
                    },
                    None => None,
                };

                let adapter = ctx.adapter.for_profile(profile);
                let options = NegotiateOptions {
                    media_profile: profile,
                    media_spec: self.options.clone(),
                    extra: serde_json::Value::Null,
                    ..Default::default()
                };
                let negotiated = adapter
                    .negotiate(self.room_id, self.user_id, self.id, partial, self.session_type, options)
                    .await?;

                for n in negotiated {
                    let unit = unit_from_negotiated(n, self);
                    if let Some(local) = &unit.local_descriptor {
                        parts.push((kind_label(profile).to_string(), local.clone()));
                    }
                    units.push(unit);
                }
            }
        } else {
            let adapter = ctx.adapter.for_profile(MediaProfile::All);
            let options = NegotiateOptions {
                media_profile: self.media_profile,
                media_spec: self.options.clone(),
                extra: serde_json::Value::Null,
                ..Default::default()
            };
            let negotiated = adapter
                .negotiate(self.room_id, self.user_id, self.id, remote_sdp.clone(), self.session_type, options)
                .await?;

            for n in negotiated {
                let unit = unit_from_negotiated(n, self);
                if let Some(local) = &unit.local_descriptor {
                    let kind = if unit.media_types.audio.is_active() { "audio" } else { "video" };
                    parts.push((kind.to_string(), local.clone()));
                }
                units.push(unit);
            }
        }

        if remote_sdp.is_some() && units.is_empty() {
            return Err(OrchestratorError::MediaNoAvailableCodec(format!(
                "session {} negotiated zero media units",
                self.id
            )));
        }

        if let (Some(remote), true) = (&remote_sdp, !units.is_empty()) {
            let video_parity = sdp::has_available_video_codec(remote)
                == units.iter().any(|u| u.media_types.video.is_active());
            let audio_parity = sdp::has_available_audio_codec(remote)
                == units.iter().any(|u| u.media_types.audio.is_active());
            if !video_parity || !audio_parity {
                return Err(OrchestratorError::MediaNoAvailableCodec(format!(
                    "session {}: negotiated codec kinds do not match offered kinds",
                    self.id
                )));
            }
        }

        let answer = if parts.is_empty() {
            String::new()
        } else {
            sdp::reassemble_answer(&parts)?
        };

        for unit in &units {
            self.negotiated_kinds = self.negotiated_kinds.merge(unit.media_types);
        }

        if remote_sdp.is_some() {
            self.set_remote_descriptor(remote_sdp.clone().unwrap());
        }
        if !answer.is_empty() {
            self.set_local_descriptor(answer.clone());
        }

        let emit_media_negotiated = match self.negotiation_role {
            Some(NegotiationRole::Answerer) => true,
            Some(NegotiationRole::Offerer) => transition.became_answerer_after_offer,
            None => false,
        };

        Ok(ProcessOutcome {
            local_descriptor: answer,
            new_units: units,
            emit_media_negotiated,
            reprocess: Vec::new(),
        })
    }

    /// Renegotiation path for content/audio/video added after the initial
    /// exchange. Existing units keep their
    /// descriptors; only kinds present in the new remote partial are
    /// re-processed. A brand-new content m-line creates a unit via
    /// `negotiate`; everything else calls `processAnswer` on the existing
    /// element.
    async fn renegotiate(&mut self, ctx: &NegotiationContext<'_>) -> OrchestratorResult<ProcessOutcome> {
        let remote = self
            .remote_descriptor
            .clone()
            .ok_or_else(|| OrchestratorError::MediaInvalidOperation("renegotiate without a remote descriptor".into()))?;

        let mut new_units = Vec::new();
        let mut reprocessed_kinds = Vec::new();

        for profile in [PROFILE_AUDIO, PROFILE_MAIN, PROFILE_CONTENT] {
            let Some(partial) = partial_for(profile, &remote)? else {
                continue;
            };

            let has_existing = self.media_has_kind(profile);
            if !has_existing && profile == PROFILE_CONTENT {
                let adapter = ctx.adapter.for_profile(profile);
                let options = NegotiateOptions {
                    media_profile: profile,
                    media_spec: self.options.clone(),
                    extra: serde_json::Value::Null,
                    ..Default::default()
                };
                let negotiated = adapter
                    .negotiate(self.room_id, self.user_id, self.id, Some(partial), self.session_type, options)
                    .await?;
                for n in negotiated {
                    new_units.push(unit_from_negotiated(n, self));
                }
                continue;
            }

            reprocessed_kinds.push((profile, partial));
        }

        for unit in &new_units {
            self.negotiated_kinds = self.negotiated_kinds.merge(unit.media_types);
        }

        // Reassemble the answer:
        // kinds that already had an element keep their previous partial
        // (re-answering doesn't change what was already negotiated), kinds
        // negotiated for the first time here contribute their fresh partial.
        let mut parts: Vec<(String, String)> = Vec::new();
        if let Some(existing_answer) = &self.local_descriptor {
            for (profile, _) in &reprocessed_kinds {
                if let Some(partial) = partial_for(*profile, existing_answer)? {
                    parts.push((kind_label(*profile).to_string(), partial));
                }
            }
        }
        for unit in &new_units {
            if let Some(local) = &unit.local_descriptor {
                let kind = if unit.media_types.content.is_active() {
                    "content"
                } else if unit.media_types.audio.is_active() {
                    "audio"
                } else {
                    "video"
                };
                parts.push((kind.to_string(), local.clone()));
            }
        }

        let answer = if parts.is_empty() {
            self.local_descriptor.clone().unwrap_or_default()
        } else {
            sdp::reassemble_answer(&parts)?
        };
        self.local_descriptor = Some(answer.clone());

        self.should_renegotiate = false;
        self.should_process_remote_descriptor_as_answerer = false;

        Ok(ProcessOutcome {
            local_descriptor: answer,
            new_units,
            emit_media_negotiated: false,
            reprocess: reprocessed_kinds,
        })
    }

    /// Whether this session has already negotiated a unit carrying `profile`.
    fn media_has_kind(&self, profile: MediaProfile) -> bool {
        match profile {
            MediaProfile::Audio => self.negotiated_kinds.audio.is_active(),
            MediaProfile::Main | MediaProfile::All => self.negotiated_kinds.video.is_active(),
            MediaProfile::Content => self.negotiated_kinds.content.is_active(),
        }
    }
}
