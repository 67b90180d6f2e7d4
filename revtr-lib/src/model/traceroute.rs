use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use super::{ipv4_or_unspecified, Time};
use crate::warts;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracerouteHop {
    pub addr: Ipv4Addr,
    pub probe_ttl: u32,
    pub probe_id: u32,
    pub probe_size: u32,
    /// Microseconds.
    pub rtt: u32,
    pub reply_ttl: u32,
    pub reply_tos: u32,
    pub reply_size: u32,
    pub reply_ipid: u32,
    pub icmp_type: u32,
    pub icmp_code: u32,
    pub icmp_q_ttl: u32,
    pub icmp_q_ipl: u32,
    pub icmp_q_tos: u32,
}

/// A completed traceroute, or a failed one with `error` set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traceroute {
    #[serde(rename = "type")]
    pub kind: String,
    pub user_id: u32,
    pub method: String,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub sport: u32,
    pub dport: u32,
    pub stop_reason: String,
    pub stop_data: u32,
    pub start: Time,
    pub hop_count: u32,
    pub attempts: u32,
    pub hop_limit: u32,
    pub first_hop: u32,
    pub wait: u32,
    /// Centiseconds between probes.
    pub wait_probe: u32,
    pub tos: u32,
    pub probe_size: u32,
    pub gap_limit: u32,
    #[serde(default)]
    pub hops: Vec<TracerouteHop>,
    #[serde(default)]
    pub error: String,
}

impl Traceroute {
    pub fn failed(src: Ipv4Addr, dst: Ipv4Addr, start: Time, error: String) -> Self {
        Self {
            kind: "trace".to_string(),
            user_id: 0,
            method: String::new(),
            src,
            dst,
            sport: 0,
            dport: 0,
            stop_reason: String::new(),
            stop_data: 0,
            start,
            hop_count: 0,
            attempts: 0,
            hop_limit: 0,
            first_hop: 0,
            wait: 0,
            wait_probe: 0,
            tos: 0,
            probe_size: 0,
            gap_limit: 0,
            hops: Vec::new(),
            error,
        }
    }
}

impl From<&warts::Traceroute> for Traceroute {
    fn from(t: &warts::Traceroute) -> Self {
        let f = &t.flags;
        let hops = t
            .hops
            .iter()
            .map(|h| TracerouteHop {
                addr: ipv4_or_unspecified(h.address()),
                probe_ttl: u32::from(h.probe_ttl),
                probe_id: u32::from(h.probe_id),
                probe_size: u32::from(h.probe_size),
                rtt: h.rtt_us,
                reply_ttl: u32::from(h.reply_ttl),
                reply_tos: u32::from(h.tos),
                reply_size: u32::from(h.reply_size),
                reply_ipid: u32::from(h.ipid),
                icmp_type: u32::from(h.icmp_type()),
                icmp_code: u32::from(h.icmp_code()),
                icmp_q_ttl: u32::from(h.quoted_ttl),
                icmp_q_ipl: u32::from(h.quoted_ip_len),
                icmp_q_tos: u32::from(h.quoted_tos),
            })
            .collect::<Vec<_>>();

        Self {
            kind: "trace".to_string(),
            user_id: f.user_id,
            method: t.trace_type().map(|m| m.to_string()).unwrap_or_default(),
            src: ipv4_or_unspecified(f.src.as_ref().or(f.src_ref.as_ref())),
            dst: ipv4_or_unspecified(f.dst.as_ref().or(f.dst_ref.as_ref())),
            sport: u32::from(f.sport),
            dport: u32::from(f.dport),
            stop_reason: t.stop_reason().map(|r| r.to_string()).unwrap_or_default(),
            stop_data: u32::from(f.stop_data),
            start: Time::from(f.start),
            hop_count: hops.len() as u32,
            attempts: u32::from(f.attempts),
            hop_limit: u32::from(f.hop_limit),
            first_hop: u32::from(f.first_hop),
            wait: u32::from(f.wait_s),
            wait_probe: u32::from(f.min_wait_centi),
            tos: u32::from(f.tos),
            probe_size: u32::from(f.probe_size),
            gap_limit: u32::from(f.gap_limit),
            hops,
            error: String::new(),
        }
    }
}
