use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct ConfluxSettings {
    pub gateway: GatewaySettings,
    pub balancer: BalancerSettings,
    pub dtmf: DtmfSettings,
    pub floor_history_cap: usize,
    pub bus: BusSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewaySettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BalancerSettings {
    /// "round_robin" or "profile_affinity".
    pub policy: String,
    pub hosts: Vec<HostSeed>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HostSeed {
    pub id: String,
    pub ip: String,
    /// Profile tags this host is affine to: "main", "audio", "content", "all".
    #[serde(default)]
    pub profiles: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DtmfSettings {
    pub timeout_ms: u64,
    pub code_length: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusSettings {
    /// Redis URL for the legacy-bus bridge sidecar. None disables the bridge.
    pub redis_url: Option<String>,
}

impl ConfluxSettings {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::default()
                    .separator("__")
                    .prefix("CONFLUX"),
            )
            .set_default("gateway.host", "0.0.0.0")?
            .set_default("gateway.port", 7880)?
            .set_default("balancer.policy", "round_robin")?
            .set_default("balancer.hosts", Vec::<String>::new())?
            .set_default("dtmf.timeout_ms", 3000)?
            .set_default("dtmf.code_length", 2)?
            .set_default("floor_history_cap", 10)?
            .set_default("bus.redis_url", None::<String>)?
            .build()?;

        config.try_deserialize()
    }
}

impl Default for ConfluxSettings {
    fn default() -> Self {
        Self::load().expect("failed to load default settings")
    }
}
