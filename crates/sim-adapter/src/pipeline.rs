//! Per-`(room, host)` pipeline lifecycle coalescing: entries are looked up
//! and mutated through `DashMap`'s own entry API rather than an external
//! lock, so concurrent first-element creation on the same `(room, host)`
//! coalesces onto one pipeline.

use conflux_core::types::{HostId, RoomId};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

pub type PipelineKey = (RoomId, HostId);

#[derive(Default)]
struct PipelineState {
    active_elements: AtomicUsize,
}

#[derive(Default)]
pub struct PipelineRegistry {
    pipelines: DashMap<PipelineKey, PipelineState>,
}

impl PipelineRegistry {
    /// Registers one more element against this room/host pipeline, creating
    /// the pipeline if this is the first.
    pub fn acquire(&self, room_id: RoomId, host_id: HostId) {
        let key = (room_id, host_id.clone());
        let entry = self.pipelines.entry(key).or_insert_with(|| {
            debug!(%room_id, %host_id, "pipeline created");
            PipelineState::default()
        });
        entry.active_elements.fetch_add(1, Ordering::Relaxed);
    }

    /// Releases one element; tears the pipeline down once it reaches zero.
    pub fn release(&self, room_id: RoomId, host_id: HostId) {
        let key = (room_id, host_id.clone());
        let drained = match self.pipelines.get(&key) {
            Some(entry) => entry.active_elements.fetch_sub(1, Ordering::Relaxed) <= 1,
            None => return,
        };
        if drained {
            self.pipelines.remove(&key);
            debug!(%room_id, %host_id, "pipeline torn down");
        }
    }

    pub fn active_elements(&self, room_id: RoomId, host_id: &HostId) -> usize {
        self.pipelines
            .get(&(room_id, host_id.clone()))
            .map(|e| e.active_elements.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn exists(&self, room_id: RoomId, host_id: &HostId) -> bool {
        self.pipelines.contains_key(&(room_id, host_id.clone()))
    }

    pub fn purge_host(&self, host_id: &HostId) {
        self.pipelines.retain(|(_, h), _| h != host_id);
    }
}
