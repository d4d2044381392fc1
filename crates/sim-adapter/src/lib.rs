//! In-process reference implementation of [`conflux_core::adapter::MediaAdapter`].
//!
//! This stands in for a real pipeline-and-element gRPC-like driver: it
//! fabricates plausible SDP, tracks elements and pipelines per `(room, host)`
//! with a realistic cross-host transposition lifecycle, and raises the same
//! event taxonomy a real backend would. `conflux-core` cannot be exercised
//! without something implementing its adapter contract, so this crate is
//! that something.

mod error;
mod pipeline;
mod sdp_gen;

use async_trait::async_trait;
use conflux_core::adapter::{AdapterEvent, ElementId, MediaAdapter, NegotiateOptions, NegotiatedUnit};
use conflux_core::balancer::Balancer;
use conflux_core::error::OrchestratorResult;
use conflux_core::types::{
    ConnectKind, HostId, MediaProfile, MediaSessionType, MediaTypes, RoomId, SessionId, UserId,
};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

pub use error::AdapterError;
pub use pipeline::PipelineKey;
use pipeline::PipelineRegistry;

#[derive(Debug, Clone)]
struct ElementRecord {
    room_id: RoomId,
    host: HostId,
    session_type: MediaSessionType,
    media_types: MediaTypes,
    local_descriptor: Option<String>,
    remote_descriptor: Option<String>,
    port: u16,
}

/// Reference adapter backing the orchestrator's own tests and the demo
/// gateway. A single instance serves every media profile; `conflux-api`
/// composes three clones of it behind `ComposedAdapter` when demonstrating a
/// per-profile-backend deployment, or uses one directly for the common case.
pub struct SimAdapter {
    balancer: Arc<Balancer>,
    pipelines: PipelineRegistry,
    elements: DashMap<ElementId, ElementRecord>,
    next_port: AtomicU16,
    events_tx: mpsc::UnboundedSender<AdapterEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<AdapterEvent>>>,
    /// Method-call ledger for test assertions that check exact adapter call
    /// sequences. Not part of the adapter contract.
    call_log: Mutex<Vec<String>>,
}

impl SimAdapter {
    pub fn new(balancer: Arc<Balancer>) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            balancer,
            pipelines: PipelineRegistry::default(),
            elements: DashMap::new(),
            next_port: AtomicU16::new(10000),
            events_tx: tx,
            events_rx: Mutex::new(Some(rx)),
            call_log: Mutex::new(Vec::new()),
        })
    }

    fn log(&self, call: impl Into<String>) {
        self.call_log.lock().unwrap().push(call.into());
    }

    /// Snapshot of every adapter method invoked so far, in order.
    pub fn call_log(&self) -> Vec<String> {
        self.call_log.lock().unwrap().clone()
    }

    fn fresh_port(&self) -> u16 {
        self.next_port.fetch_add(2, Ordering::Relaxed)
    }

    fn require_element(&self, id: &ElementId) -> OrchestratorResult<ElementRecord> {
        self.elements
            .get(id)
            .map(|e| e.clone())
            .ok_or_else(|| AdapterError::ElementNotFound(id.to_string()).into())
    }

    /// Kinds this session type should negotiate when no remote descriptor is
    /// given (i.e. this adapter must generate the offer), driven by the
    /// requested media profile.
    fn kinds_for_profile(profile: MediaProfile) -> Vec<sdp_gen::Kind> {
        use sdp_gen::Kind;
        match profile {
            MediaProfile::Audio => vec![Kind::Audio],
            MediaProfile::Main => vec![Kind::Video],
            MediaProfile::Content => vec![Kind::Content],
            MediaProfile::All => vec![Kind::Audio, Kind::Video],
        }
    }
}

#[async_trait]
impl MediaAdapter for SimAdapter {
    fn events(&self) -> mpsc::UnboundedReceiver<AdapterEvent> {
        self.events_rx
            .lock()
            .unwrap()
            .take()
            .expect("SimAdapter::events() called more than once")
    }

    async fn create_media_element(
        &self,
        room_id: RoomId,
        session_type: MediaSessionType,
        options: NegotiateOptions,
    ) -> OrchestratorResult<(ElementId, HostId)> {
        self.log("create_media_element");
        let host = match &options.preferred_host {
            Some(host_id) => self.balancer.retrieve_host(host_id)?,
            None => self.balancer.get_host(options.media_profile)?,
        };
        self.pipelines.acquire(room_id, host.id.clone());

        let element_id = ElementId(format!("elem-{}", uuid::Uuid::new_v4()));
        self.elements.insert(
            element_id.clone(),
            ElementRecord {
                room_id,
                host: host.id.clone(),
                session_type,
                media_types: MediaTypes::default(),
                local_descriptor: None,
                remote_descriptor: None,
                port: self.fresh_port(),
            },
        );
        debug!(%element_id, host = %host.id, "element created");
        Ok((element_id, host.id))
    }

    async fn negotiate(
        &self,
        room_id: RoomId,
        _user_id: UserId,
        _session_id: SessionId,
        descriptor: Option<String>,
        session_type: MediaSessionType,
        options: NegotiateOptions,
    ) -> OrchestratorResult<Vec<NegotiatedUnit>> {
        self.log("negotiate");
        let host = self.balancer.get_host(options.media_profile)?;
        self.pipelines.acquire(room_id, host.id.clone());

        let mut units = Vec::new();

        if let Some(remote_sdp) = &descriptor {
            for partial in sdp_gen::offered_kinds(remote_sdp)? {
                let element_id = ElementId(format!("elem-{}", uuid::Uuid::new_v4()));
                let port = self.fresh_port();
                let answer = sdp_gen::build_answer(&host.ip, port, partial.kind, partial.direction.mirror());
                let media_types = sdp_gen::media_types_for(partial.kind, partial.direction.mirror());

                self.elements.insert(
                    element_id.clone(),
                    ElementRecord {
                        room_id,
                        host: host.id.clone(),
                        session_type,
                        media_types,
                        local_descriptor: Some(answer.clone()),
                        remote_descriptor: Some(partial.sdp.clone()),
                        port,
                    },
                );

                units.push(NegotiatedUnit {
                    element_id,
                    host: host.id.clone(),
                    media_types,
                    local_descriptor: Some(answer),
                    remote_descriptor: Some(partial.sdp),
                });
            }
        } else {
            for kind in Self::kinds_for_profile(options.media_profile) {
                let element_id = ElementId(format!("elem-{}", uuid::Uuid::new_v4()));
                let port = self.fresh_port();
                let offer = sdp_gen::build_answer(&host.ip, port, kind, sdp_gen::Direction::SendRecv);
                let media_types = sdp_gen::media_types_for(kind, sdp_gen::Direction::SendRecv);

                self.elements.insert(
                    element_id.clone(),
                    ElementRecord {
                        room_id,
                        host: host.id.clone(),
                        session_type,
                        media_types,
                        local_descriptor: Some(offer.clone()),
                        remote_descriptor: None,
                        port,
                    },
                );

                units.push(NegotiatedUnit {
                    element_id,
                    host: host.id.clone(),
                    media_types,
                    local_descriptor: Some(offer),
                    remote_descriptor: None,
                });
            }
        }

        Ok(units)
    }

    async fn process_offer(&self, element_id: &ElementId, sdp: &str) -> OrchestratorResult<String> {
        self.log("process_offer");
        let record = self.require_element(element_id)?;
        let host = self.balancer.retrieve_host(&record.host)?;
        let partials = sdp_gen::offered_kinds(sdp)?;
        let Some(first) = partials.into_iter().next() else {
            return Err(AdapterError::MalformedOffer(
                "offer carried no usable media section".to_string(),
            )
            .into());
        };
        let answer = sdp_gen::build_answer(&host.ip, record.port, first.kind, first.direction.mirror());

        if let Some(mut e) = self.elements.get_mut(element_id) {
            e.remote_descriptor = Some(sdp.to_string());
            e.local_descriptor = Some(answer.clone());
            e.media_types = sdp_gen::media_types_for(first.kind, first.direction.mirror());
        }

        self.events_tx
            .send(AdapterEvent::MediaStateChanged { element_id: element_id.clone(), state: "NEGOTIATED".into() })
            .ok();
        Ok(answer)
    }

    async fn process_answer(&self, element_id: &ElementId, sdp: &str) -> OrchestratorResult<()> {
        self.log("process_answer");
        if let Some(mut e) = self.elements.get_mut(element_id) {
            e.remote_descriptor = Some(sdp.to_string());
        }
        self.events_tx
            .send(AdapterEvent::MediaStateChanged { element_id: element_id.clone(), state: "NEGOTIATED".into() })
            .ok();
        Ok(())
    }

    async fn generate_offer(&self, element_id: &ElementId, _filters: serde_json::Value) -> OrchestratorResult<String> {
        self.log("generate_offer");
        let record = self.require_element(element_id)?;
        let host = self.balancer.retrieve_host(&record.host)?;
        // RTP transposer endpoints only ever carry video.
        let offer = sdp_gen::build_answer(&host.ip, record.port, sdp_gen::Kind::Video, sdp_gen::Direction::SendRecv);
        if let Some(mut e) = self.elements.get_mut(element_id) {
            e.local_descriptor = Some(offer.clone());
        }
        Ok(offer)
    }

    async fn gather_candidates(&self, element_id: &ElementId) -> OrchestratorResult<()> {
        self.log("gather_candidates");
        self.require_element(element_id)?;
        self.events_tx
            .send(AdapterEvent::Ice {
                element_id: element_id.clone(),
                candidate: serde_json::json!({"candidate": "stub", "sdpMid": "0", "sdpMLineIndex": 0}),
            })
            .ok();
        Ok(())
    }

    async fn add_ice_candidate(&self, element_id: &ElementId, _candidate: serde_json::Value) -> OrchestratorResult<()> {
        self.log("add_ice_candidate");
        self.require_element(element_id)?;
        Ok(())
    }

    async fn connect(&self, src: &ElementId, sink: &ElementId, kind: ConnectKind) -> OrchestratorResult<()> {
        self.log("connect");
        self.require_element(src)?;
        self.require_element(sink)?;
        self.events_tx
            .send(AdapterEvent::FlowOut { element_id: src.clone(), kind })
            .ok();
        self.events_tx
            .send(AdapterEvent::FlowIn { element_id: sink.clone(), kind })
            .ok();
        Ok(())
    }

    async fn disconnect(&self, src: &ElementId, sink: &ElementId, _kind: ConnectKind) -> OrchestratorResult<()> {
        self.log("disconnect");
        self.require_element(src)?;
        self.require_element(sink)?;
        Ok(())
    }

    async fn start_recording(&self, element_id: &ElementId, path: &str, _params: serde_json::Value) -> OrchestratorResult<()> {
        self.log("start_recording");
        self.require_element(element_id)?;
        debug!(%element_id, path, "recording started");
        Ok(())
    }

    async fn stop_recording(&self, element_id: &ElementId) -> OrchestratorResult<()> {
        self.log("stop_recording");
        self.require_element(element_id)?;
        Ok(())
    }

    async fn set_video_floor(&self, element_id: &ElementId, _floor_element: &ElementId) -> OrchestratorResult<()> {
        self.log("set_video_floor");
        self.require_element(element_id)?;
        Ok(())
    }

    async fn set_layout_type(&self, element_id: &ElementId, _layout_id: u32) -> OrchestratorResult<()> {
        self.log("set_layout_type");
        self.require_element(element_id)?;
        Ok(())
    }

    async fn stop(&self, room_id: RoomId, _session_type: MediaSessionType, element_id: &ElementId) -> OrchestratorResult<()> {
        self.log("stop");
        let Some((_, record)) = self.elements.remove(element_id) else {
            return Ok(());
        };
        self.pipelines.release(room_id, record.host);
        self.events_tx
            .send(AdapterEvent::EndOfStream { element_id: element_id.clone() })
            .ok();
        Ok(())
    }

    async fn purge_host(&self, host_id: &HostId) {
        self.log("purge_host");
        let stale: Vec<ElementId> = self
            .elements
            .iter()
            .filter(|e| e.value().host == *host_id)
            .map(|e| e.key().clone())
            .collect();
        for element_id in stale {
            self.elements.remove(&element_id);
        }
        self.pipelines.purge_host(host_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conflux_core::balancer::{BalancePolicy, Host};
    use conflux_core::event::EventBus;

    fn balancer_with_host() -> Arc<Balancer> {
        let events = Arc::new(EventBus::new());
        let balancer = Arc::new(Balancer::new(BalancePolicy::RoundRobin, events));
        balancer.register_host(Host::new(HostId::from("h1"), "10.0.0.1".to_string(), vec![]));
        balancer
    }

    #[tokio::test]
    async fn creates_element_and_assigns_host() {
        let adapter = SimAdapter::new(balancer_with_host());
        let room_id = RoomId::new();
        let (element_id, host_id) = adapter
            .create_media_element(room_id, MediaSessionType::Webrtc, NegotiateOptions::default())
            .await
            .unwrap();
        assert_eq!(host_id, HostId::from("h1"));
        assert!(adapter.elements.contains_key(&element_id));
    }

    #[tokio::test]
    async fn negotiate_without_remote_generates_offer() {
        let adapter = SimAdapter::new(balancer_with_host());
        let room_id = RoomId::new();
        let units = adapter
            .negotiate(
                room_id,
                UserId::new(),
                SessionId::new(),
                None,
                MediaSessionType::Webrtc,
                NegotiateOptions { media_profile: MediaProfile::All, ..Default::default() },
            )
            .await
            .unwrap();
        assert_eq!(units.len(), 2);
        assert!(units.iter().any(|u| u.media_types.audio.is_active()));
        assert!(units.iter().any(|u| u.media_types.video.is_active()));
    }

    #[tokio::test]
    async fn stop_releases_pipeline_at_zero_elements() {
        let adapter = SimAdapter::new(balancer_with_host());
        let room_id = RoomId::new();
        let (element_id, host_id) = adapter
            .create_media_element(room_id, MediaSessionType::Webrtc, NegotiateOptions::default())
            .await
            .unwrap();
        assert_eq!(adapter.pipelines.active_elements(room_id, &host_id), 1);
        adapter.stop(room_id, MediaSessionType::Webrtc, &element_id).await.unwrap();
        assert_eq!(adapter.pipelines.active_elements(room_id, &host_id), 0);
        assert!(!adapter.pipelines.exists(room_id, &host_id));
    }
}
