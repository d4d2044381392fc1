use conflux_core::balancer::Balancer;
use conflux_core::controller::Controller;
use conflux_core::event::EventBus;
use conflux_bus_bridge::RedisBusBridge;
use std::sync::Arc;

use crate::ws::storage::WsStorage;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<Controller>,
    pub balancer: Arc<Balancer>,
    pub events: Arc<EventBus>,
    pub ws_storage: Arc<WsStorage>,
    pub bus_bridge: Option<Arc<RedisBusBridge>>,
}
