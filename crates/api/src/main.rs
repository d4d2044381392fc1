use conflux_api::state::AppState;
use conflux_api::ws::storage::WsStorage;
use conflux_bus_bridge::RedisBusBridge;
use conflux_config::ConfluxSettings;
use conflux_core::adapter::ComposedAdapter;
use conflux_core::balancer::{BalancePolicy, Balancer, Host};
use conflux_core::controller::{Controller, ControllerSettings};
use conflux_core::event::EventBus;
use conflux_core::types::MediaProfile;
use conflux_sim_adapter::SimAdapter;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "conflux_api=debug,conflux_core=debug,conflux_sim_adapter=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = ConfluxSettings::load()?;
    tracing::info!(host = %settings.gateway.host, port = settings.gateway.port, "starting conflux-api");

    let events = Arc::new(EventBus::new());
    let policy = BalancePolicy::parse(&settings.balancer.policy);
    let balancer = Arc::new(Balancer::new(policy, events.clone()));
    for seed in &settings.balancer.hosts {
        let profiles = seed
            .profiles
            .iter()
            .map(|p| parse_profile(p))
            .collect::<Vec<_>>();
        balancer.register_host(Host::new(seed.id.clone().into(), seed.ip.clone(), profiles));
    }

    // Stand-in for "the concrete media-server backend". A single
    // instance serves every profile here; swap in distinct instances per
    // `ComposedAdapter::with_profile` to demonstrate a composed deployment.
    let sim_adapter = SimAdapter::new(balancer.clone());
    let adapter = Arc::new(ComposedAdapter::new(sim_adapter));

    let controller_settings = ControllerSettings {
        floor_history_cap: settings.floor_history_cap,
        dtmf_timeout: Duration::from_millis(settings.dtmf.timeout_ms),
        dtmf_code_length: settings.dtmf.code_length,
    };
    let controller = Controller::new(adapter, balancer.clone(), events.clone(), controller_settings);
    controller.spawn_adapter_event_loop();

    let bus_bridge = match &settings.bus.redis_url {
        Some(url) => match RedisBusBridge::connect(url, "conflux:events").await {
            Ok(bridge) => {
                let bridge = Arc::new(bridge);
                bridge.clone().spawn_forwarder(events.clone());
                Some(bridge)
            }
            Err(err) => {
                tracing::warn!(%err, "failed to connect legacy-bus bridge, continuing without it");
                None
            }
        },
        None => None,
    };

    let state = AppState {
        controller: controller.clone(),
        balancer: balancer.clone(),
        events,
        ws_storage: Arc::new(WsStorage::new()),
        bus_bridge,
    };
    let app = conflux_api::build_router(state);

    let addr = format!("{}:{}", settings.gateway.host, settings.gateway.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app).await?;

    // Explicit teardown: releases every registered host through the balancer.
    controller.shutdown().await;

    Ok(())
}

fn parse_profile(s: &str) -> MediaProfile {
    match s {
        "audio" => MediaProfile::Audio,
        "content" => MediaProfile::Content,
        "all" => MediaProfile::All,
        _ => MediaProfile::Main,
    }
}
