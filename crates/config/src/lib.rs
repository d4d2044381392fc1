mod settings;

pub use settings::{
    BalancerSettings, BusSettings, DtmfSettings, GatewaySettings, HostSeed, ConfluxSettings,
};
