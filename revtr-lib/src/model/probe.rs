use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::RevtrError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRoute {
    pub hops: Vec<Ipv4Addr>,
}

/// Flag of an IPv4 timestamp option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampKind {
    TsOnly,
    TsAndAddr,
    Prespecified,
}

impl TimestampKind {
    pub fn from_flag(flag: u8) -> Option<Self> {
        match flag {
            0 => Some(TimestampKind::TsOnly),
            1 => Some(TimestampKind::TsAndAddr),
            3 => Some(TimestampKind::Prespecified),
            _ => None,
        }
    }
}

impl fmt::Display for TimestampKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TimestampKind::TsOnly => "tsonly",
            TimestampKind::TsAndAddr => "tsandaddr",
            TimestampKind::Prespecified => "tsprespec",
        })
    }
}

impl FromStr for TimestampKind {
    type Err = RevtrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tsonly" => Ok(TimestampKind::TsOnly),
            "tsandaddr" => Ok(TimestampKind::TsAndAddr),
            "tsprespec" => Ok(TimestampKind::Prespecified),
            other => Err(RevtrError::Icmp(format!("unknown timestamp kind {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stamp {
    pub time: u32,
    /// Unset for timestamp-only options.
    pub ip: Option<Ipv4Addr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeStamp {
    pub kind: TimestampKind,
    pub stamps: Vec<Stamp>,
}

/// A spoofed echo reply observed by a vantage point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Probe {
    /// Correlation id taken from the payload.
    pub id: u32,
    /// Vantage point that sent the spoofed request.
    pub spoofer_ip: Ipv4Addr,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub seq: u16,
    #[serde(default)]
    pub record_route: Option<RecordRoute>,
    #[serde(default)]
    pub timestamp: Option<TimeStamp>,
    /// Controller that asked for the probe; filled in on correlation.
    #[serde(default)]
    pub sender_ip: Option<Ipv4Addr>,
}

/// Registration of an expected spoofed reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spoof {
    pub id: u32,
    /// Controller that issued the spoofed probe.
    pub ip: Ipv4Addr,
    /// Vantage point that sends the spoofed probe.
    pub sip: Ipv4Addr,
    pub dst: Ipv4Addr,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyRecSpoofResponse {
    pub id: u32,
    #[serde(default)]
    pub error: String,
}
