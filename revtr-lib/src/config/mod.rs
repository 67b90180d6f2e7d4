mod loader;
mod overrides;
mod telemetry;
mod tls;
mod types;

pub use loader::{
    load_plc_config, load_vp_config, read_plc_config, read_vp_config, validate_plc_config,
    validate_vp_config,
};
pub use overrides::{PlcOverrides, VpOverrides};
pub use telemetry::{LoggingConfig, TelemetryConfig};
pub use tls::RpcTlsConfig;
pub use types::{
    HealthConfig, MonitorConfig, PlcConfig, PlcEndpoint, ScamperConfig, SpoofConfig, StoreConfig,
    VpConfig,
};
