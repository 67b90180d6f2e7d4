//! Types exchanged over RPC and kept in the vantage point store.

mod measurement;
mod ping;
mod probe;
mod traceroute;
mod vantage_point;

pub use measurement::{PingMeasurement, TracerouteMeasurement};
pub use ping::{Ping, PingResponse, PingStats, Time, TsAndAddr};
pub use probe::{
    NotifyRecSpoofResponse, Probe, RecordRoute, Spoof, Stamp, TimeStamp, TimestampKind,
};
pub use traceroute::{Traceroute, TracerouteHop};
pub use vantage_point::{VantagePoint, VpRequest};

use std::net::Ipv4Addr;

use crate::warts::Address;

fn ipv4_or_unspecified(addr: Option<&Address>) -> Ipv4Addr {
    addr.and_then(Address::as_ipv4).unwrap_or(Ipv4Addr::UNSPECIFIED)
}

/// Seconds since the unix epoch.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
