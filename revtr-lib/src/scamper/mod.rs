//! Probe-daemon control sockets: command rendering, response parsing, the
//! per-vantage-point session and the registry of open sessions.

mod command;
mod process;
mod registry;
mod response;
mod socket;

pub use command::Request;
pub use process::ManagedProcess;
pub use registry::Registry;
pub use response::Response;
pub use socket::{parse_socket_name, MeasurementResult, ResultReceiver, Session};
