//! Host registry, per-host load counters and host selection policy.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{info, warn};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::event::{Event, EventBus};
use crate::types::{HostId, MediaProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalancePolicy {
    RoundRobin,
    ProfileAffinity,
}

impl BalancePolicy {
    pub fn parse(s: &str) -> Self {
        match s {
            "profile_affinity" => BalancePolicy::ProfileAffinity,
            _ => BalancePolicy::RoundRobin,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    pub ip: String,
    pub profiles: Vec<MediaProfile>,
    pub online: bool,
    /// Per-profile active stream counters.
    pub load: std::collections::HashMap<String, u64>,
}

impl Host {
    pub fn new(id: HostId, ip: String, profiles: Vec<MediaProfile>) -> Self {
        Self {
            id,
            ip,
            profiles,
            online: true,
            load: std::collections::HashMap::new(),
        }
    }

    fn affine_to(&self, profile: MediaProfile) -> bool {
        self.profiles.is_empty()
            || self.profiles.contains(&profile)
            || self.profiles.contains(&MediaProfile::All)
    }

    fn total_load(&self) -> u64 {
        self.load.values().sum()
    }

    fn profile_key(profile: MediaProfile) -> &'static str {
        match profile {
            MediaProfile::Main => "main",
            MediaProfile::Content => "content",
            MediaProfile::Audio => "audio",
            MediaProfile::All => "all",
        }
    }
}

/// Host registry and selection policy. Hosts are shared-read by every
/// session; mutated only here.
pub struct Balancer {
    hosts: DashMap<HostId, Host>,
    policy: BalancePolicy,
    round_robin_cursor: AtomicUsize,
    events: std::sync::Arc<EventBus>,
}

impl Balancer {
    pub fn new(policy: BalancePolicy, events: std::sync::Arc<EventBus>) -> Self {
        Self {
            hosts: DashMap::new(),
            policy,
            round_robin_cursor: AtomicUsize::new(0),
            events,
        }
    }

    pub fn register_host(&self, host: Host) {
        info!(host_id = %host.id, ip = %host.ip, "host registered");
        self.hosts.insert(host.id.clone(), host);
    }

    pub fn retrieve_host(&self, id: &HostId) -> OrchestratorResult<Host> {
        self.hosts
            .get(id)
            .map(|h| h.clone())
            .ok_or_else(|| OrchestratorError::ConnectionError(format!("unknown host {id}")))
    }

    /// Selects a host for `profile` per the configured policy.
    pub fn get_host(&self, profile: MediaProfile) -> OrchestratorResult<Host> {
        let online: Vec<Host> = self
            .hosts
            .iter()
            .filter(|e| e.online && e.affine_to(profile))
            .map(|e| e.value().clone())
            .collect();

        if online.is_empty() {
            return Err(OrchestratorError::ConnectionError(
                "no online media-server hosts available".to_string(),
            ));
        }

        let chosen = match self.policy {
            BalancePolicy::RoundRobin => {
                let idx = self.round_robin_cursor.fetch_add(1, Ordering::Relaxed) % online.len();
                online[idx].clone()
            }
            BalancePolicy::ProfileAffinity => {
                let affine: Vec<&Host> = online
                    .iter()
                    .filter(|h| !h.profiles.is_empty() && h.affine_to(profile))
                    .collect();
                let pool = if affine.is_empty() { online.iter().collect::<Vec<_>>() } else { affine };
                pool.into_iter()
                    .min_by_key(|h| h.total_load())
                    .cloned()
                    .expect("pool checked non-empty above")
            }
        };

        Ok(chosen)
    }

    pub fn increment_host_streams(&self, host_id: &HostId, profile: MediaProfile) {
        if let Some(mut h) = self.hosts.get_mut(host_id) {
            *h.load.entry(Host::profile_key(profile).to_string()).or_insert(0) += 1;
        }
    }

    pub fn decrement_host_streams(&self, host_id: &HostId, profile: MediaProfile) {
        if let Some(mut h) = self.hosts.get_mut(host_id) {
            let key = Host::profile_key(profile).to_string();
            if let Some(count) = h.load.get_mut(&key) {
                *count = count.saturating_sub(1);
            }
        }
    }

    /// Marks a host offline and raises `MEDIA_SERVER_OFFLINE` for consumers to
    /// purge state.
    pub fn mark_offline(&self, host_id: &HostId) {
        if let Some(mut h) = self.hosts.get_mut(host_id) {
            h.online = false;
        }
        warn!(%host_id, "media server offline");
        self.events.publish(Event::HostOffline { host_id: host_id.clone() });
    }

    pub fn all_host_ids(&self) -> Vec<HostId> {
        self.hosts.iter().map(|e| e.key().clone()).collect()
    }
}
