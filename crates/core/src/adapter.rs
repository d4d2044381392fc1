//! Backend-neutral operations a media-server driver must expose.
//!
//! The orchestrator never assumes a concrete backend; it drives whatever
//! implements [`MediaAdapter`]. A real backend would be a pipeline-and-element
//! gRPC-like driver; `conflux-sim-adapter` is the in-process reference
//! implementation this core is tested against.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::OrchestratorResult;
use crate::types::{ConnectKind, HostId, MediaProfile, MediaSessionType, MediaTypes, RoomId, SessionId, UserId};

/// Opaque backend element id. The orchestrator never parses it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementId(pub String);

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NegotiateOptions {
    pub media_profile: MediaProfile,
    pub media_spec: serde_json::Value,
    pub extra: serde_json::Value,
    /// Forces element placement onto a specific host instead of letting the
    /// adapter ask the balancer. A transposer pair needs one endpoint pinned
    /// to the source host and one to the sink host, which ordinary
    /// profile-based selection cannot guarantee.
    pub preferred_host: Option<HostId>,
}

/// One raw negotiated unit as handed back by `negotiate`; the session layer
/// wraps this into a full [`crate::media_unit::MediaUnit`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiatedUnit {
    pub element_id: ElementId,
    pub host: HostId,
    pub media_types: MediaTypes,
    pub local_descriptor: Option<String>,
    pub remote_descriptor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AdapterEvent {
    MediaStateChanged { element_id: ElementId, state: String },
    FlowIn { element_id: ElementId, kind: ConnectKind },
    FlowOut { element_id: ElementId, kind: ConnectKind },
    Ice { element_id: ElementId, candidate: serde_json::Value },
    EndOfStream { element_id: ElementId },
    Dtmf { element_id: ElementId, digit: char },
    ElementTransposed { key: String },
}

/// Backend-neutral adapter contract.
#[async_trait]
pub trait MediaAdapter: Send + Sync {
    /// Subscribe to this adapter's element/pipeline event stream. Called once
    /// by the controller at startup; the adapter fans every subsequent event
    /// out to this channel.
    fn events(&self) -> mpsc::UnboundedReceiver<AdapterEvent>;

    async fn create_media_element(
        &self,
        room_id: RoomId,
        session_type: MediaSessionType,
        options: NegotiateOptions,
    ) -> OrchestratorResult<(ElementId, HostId)>;

    async fn negotiate(
        &self,
        room_id: RoomId,
        user_id: UserId,
        session_id: SessionId,
        descriptor: Option<String>,
        session_type: MediaSessionType,
        options: NegotiateOptions,
    ) -> OrchestratorResult<Vec<NegotiatedUnit>>;

    async fn process_offer(&self, element_id: &ElementId, sdp: &str) -> OrchestratorResult<String>;

    async fn process_answer(&self, element_id: &ElementId, sdp: &str) -> OrchestratorResult<()>;

    async fn generate_offer(
        &self,
        element_id: &ElementId,
        filters: serde_json::Value,
    ) -> OrchestratorResult<String>;

    async fn gather_candidates(&self, element_id: &ElementId) -> OrchestratorResult<()>;

    async fn add_ice_candidate(
        &self,
        element_id: &ElementId,
        candidate: serde_json::Value,
    ) -> OrchestratorResult<()>;

    async fn connect(
        &self,
        src: &ElementId,
        sink: &ElementId,
        kind: ConnectKind,
    ) -> OrchestratorResult<()>;

    async fn disconnect(
        &self,
        src: &ElementId,
        sink: &ElementId,
        kind: ConnectKind,
    ) -> OrchestratorResult<()>;

    async fn start_recording(
        &self,
        element_id: &ElementId,
        path: &str,
        params: serde_json::Value,
    ) -> OrchestratorResult<()>;

    async fn stop_recording(&self, element_id: &ElementId) -> OrchestratorResult<()>;

    async fn set_video_floor(&self, element_id: &ElementId, floor_element: &ElementId) -> OrchestratorResult<()>;

    async fn set_layout_type(&self, element_id: &ElementId, layout_id: u32) -> OrchestratorResult<()>;

    async fn stop(&self, room_id: RoomId, session_type: MediaSessionType, element_id: &ElementId) -> OrchestratorResult<()>;

    /// Purge every pipeline/element on `host_id` without a backend round-trip.
    async fn purge_host(&self, host_id: &HostId);
}

/// A composed adapter routes different media profiles to different physical
/// backends. `MediaSession::process` asks for
/// the adapter serving a given profile and fans `negotiate` out accordingly.
pub struct ComposedAdapter {
    by_profile: HashMap<MediaProfile, Arc<dyn MediaAdapter>>,
    default: Arc<dyn MediaAdapter>,
}

impl ComposedAdapter {
    pub fn new(default: Arc<dyn MediaAdapter>) -> Self {
        Self {
            by_profile: HashMap::new(),
            default,
        }
    }

    pub fn with_profile(mut self, profile: MediaProfile, adapter: Arc<dyn MediaAdapter>) -> Self {
        self.by_profile.insert(profile, adapter);
        self
    }

    /// True when at least one profile has a distinct backend from the
    /// default, i.e. `negotiate` must be fan-split per profile.
    pub fn is_composed(&self) -> bool {
        !self.by_profile.is_empty()
    }

    pub fn for_profile(&self, profile: MediaProfile) -> Arc<dyn MediaAdapter> {
        self.by_profile
            .get(&profile)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    /// Every distinct backend behind this composed adapter, deduplicated by
    /// pointer identity. Used once at startup to fan every backend's event
    /// stream into the controller.
    pub fn distinct_backends(&self) -> Vec<Arc<dyn MediaAdapter>> {
        let mut out: Vec<Arc<dyn MediaAdapter>> = vec![self.default.clone()];
        for adapter in self.by_profile.values() {
            if !out.iter().any(|existing| Arc::ptr_eq(existing, adapter)) {
                out.push(adapter.clone());
            }
        }
        out
    }
}
