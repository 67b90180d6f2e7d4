//! Vantage point lifecycle: sessions follow the socket directory, ownership
//! follows the sessions, and a periodic sweep keeps the agents running.

mod events;
mod health;
mod shell;

pub use events::VpLifecycle;
pub use health::{check_vp, classify, HealthSweep, ServiceStatus, HEALTHY, RESTART, START, STATUS};
pub use shell::{CommandOutput, RemoteShell, SshShell};
