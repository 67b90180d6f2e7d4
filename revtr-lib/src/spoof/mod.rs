//! Correlation of spoofed echo replies with the controllers that asked for
//! them.

mod correlator;
mod sender;

pub use correlator::{Correlator, CorrelatorConfig};
pub use sender::{ControllerSender, ProbeSender};

use std::fmt::Write;
use std::net::Ipv4Addr;

/// ICMP identifier carried by every spoofed echo request.
pub const ICMP_ID: u16 = 0xF0F1;
/// ICMP sequence number carried by every spoofed echo request.
pub const ICMP_SEQ: u16 = 0xF2F3;

/// Hex payload of a spoofed echo request: spoofer address then probe id.
pub fn payload(spoofer: Ipv4Addr, id: u32) -> String {
    let mut out = String::with_capacity(16);
    for b in spoofer.octets().iter().chain(id.to_be_bytes().iter()) {
        let _ = write!(out, "{b:02x}");
    }
    out
}
