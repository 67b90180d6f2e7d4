#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod plcontroller;
pub mod rpc;
pub mod scamper;
pub mod spoof;
pub mod store;
pub mod telemetry;
pub mod tls;
pub mod uuencode;
pub mod vp;
pub mod warts;
pub mod watcher;

pub use config::{load_plc_config, load_vp_config, PlcConfig, VpConfig};
pub use error::{Result, RevtrError};
pub use plcontroller::PlController;
pub use scamper::{Registry, Request, Session};
pub use spoof::Correlator;
pub use store::{FileVpStore, MemoryVpStore, VpStore};
pub use watcher::{SocketEvent, SocketWatcher};
