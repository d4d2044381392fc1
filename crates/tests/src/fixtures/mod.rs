//! Test harness: a full `Controller` wired to an in-process `SimAdapter`,
//! with a couple of hosts pre-registered so cross-host scenarios have
//! somewhere to place a sink.

use conflux_core::adapter::ComposedAdapter;
use conflux_core::balancer::{BalancePolicy, Balancer, Host};
use conflux_core::controller::{Controller, ControllerSettings};
use conflux_core::event::EventBus;
use conflux_core::types::{HostId, MediaProfile};
use conflux_sim_adapter::SimAdapter;
use std::sync::Arc;
use std::time::Duration;

pub mod sdp;

pub const HOST_A: &str = "host-a";
pub const HOST_B: &str = "host-b";

pub struct Harness {
    pub controller: Arc<Controller>,
    pub balancer: Arc<Balancer>,
    pub events: Arc<EventBus>,
    pub adapter: Arc<SimAdapter>,
}

impl Harness {
    /// Two hosts, each affine to a distinct profile so tests can force
    /// same-host or cross-host placement deterministically instead of
    /// depending on round-robin ordering: publish with `MediaProfile::Audio`
    /// to land on host A, `MediaProfile::Main` to land on host B.
    pub fn new() -> Self {
        let events = Arc::new(EventBus::new());
        let balancer = Arc::new(Balancer::new(BalancePolicy::RoundRobin, events.clone()));
        balancer.register_host(Host::new(
            HostId::from(HOST_A),
            "10.0.0.1".to_string(),
            vec![MediaProfile::Audio],
        ));
        balancer.register_host(Host::new(
            HostId::from(HOST_B),
            "10.0.0.2".to_string(),
            vec![MediaProfile::Main],
        ));

        let sim = SimAdapter::new(balancer.clone());
        let adapter = Arc::new(ComposedAdapter::new(sim.clone()));

        let controller = Controller::new(
            adapter,
            balancer.clone(),
            events.clone(),
            ControllerSettings {
                floor_history_cap: 10,
                dtmf_timeout: Duration::from_millis(50),
                dtmf_code_length: 2,
            },
        );
        controller.spawn_adapter_event_loop();

        Self { controller, balancer, events, adapter: sim }
    }
}
