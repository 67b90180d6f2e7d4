//! Vantage point agent: captures replies to spoofed probes and forwards
//! them to the PL-Controller.

mod agent;
mod batcher;
pub mod icmp;
mod monitor;

pub use agent::run;
pub use batcher::{Batcher, PlcSink, ProbeSink};
pub use monitor::{Backoff, ProbeMonitor};
