use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use super::ipv4_or_unspecified;
use crate::warts;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Time {
    pub sec: u64,
    pub usec: u64,
}

impl Time {
    pub fn now() -> Self {
        let us = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        Self::from_micros(us)
    }

    fn from_micros(us: u64) -> Self {
        Self { sec: us / 1_000_000, usec: us % 1_000_000 }
    }
}

impl From<warts::Timeval> for Time {
    fn from(tv: warts::Timeval) -> Self {
        Self { sec: u64::from(tv.sec), usec: u64::from(tv.usec) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TsAndAddr {
    pub ip: Ipv4Addr,
    pub ts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingResponse {
    pub from: Ipv4Addr,
    /// Probe id the reply answers.
    pub seq: u32,
    pub reply_size: u32,
    pub reply_ttl: u32,
    pub reply_proto: String,
    pub tx: Time,
    pub rx: Time,
    /// Microseconds.
    pub rtt: u32,
    pub probe_ipid: u32,
    pub reply_ipid: u32,
    pub icmp_type: u32,
    pub icmp_code: u32,
    #[serde(default)]
    pub rr: Vec<Ipv4Addr>,
    #[serde(default)]
    pub tsonly: Vec<u32>,
    #[serde(default)]
    pub tsandaddr: Vec<TsAndAddr>,
}

/// Reply statistics in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PingStats {
    pub replies: u32,
    pub loss: f32,
    pub min: f32,
    pub max: f32,
    pub avg: f32,
    pub stddev: f32,
}

impl From<warts::PingStats> for PingStats {
    fn from(s: warts::PingStats) -> Self {
        Self {
            replies: u32::from(s.replies),
            loss: f32::from(s.loss),
            min: s.min,
            max: s.max,
            avg: s.avg,
            stddev: s.stddev,
        }
    }
}

/// A completed ping, or a failed one with `error` set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ping {
    #[serde(rename = "type")]
    pub kind: String,
    pub method: String,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub start: Time,
    pub ping_sent: u32,
    pub probe_size: u32,
    pub user_id: u32,
    pub ttl: u32,
    pub wait: u32,
    pub timeout: u32,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub responses: Vec<PingResponse>,
    #[serde(default)]
    pub statistics: Option<PingStats>,
    /// Address the probes claimed to come from, for spoofed pings.
    #[serde(default)]
    pub spoofed_from: Option<Ipv4Addr>,
    #[serde(default)]
    pub error: String,
}

impl Ping {
    /// Result streamed back for a measurement that did not complete.
    pub fn failed(src: Ipv4Addr, dst: Ipv4Addr, start: Time, error: String) -> Self {
        Self {
            kind: "ping".to_string(),
            method: String::new(),
            src,
            dst,
            start,
            ping_sent: 0,
            probe_size: 0,
            user_id: 0,
            ttl: 0,
            wait: 0,
            timeout: 0,
            flags: Vec::new(),
            responses: Vec::new(),
            statistics: None,
            spoofed_from: None,
            error,
        }
    }
}

impl From<&warts::Ping> for Ping {
    fn from(p: &warts::Ping) -> Self {
        let f = &p.flags;
        let flags = warts::PingFlag::names(f.ping_flags);

        let responses = p
            .replies
            .iter()
            .map(|r| {
                let tx = Time::from(r.tx);
                let rx = Time::from_micros(r.tx.as_micros() + u64::from(r.rtt_us));
                let mut resp = PingResponse {
                    from: ipv4_or_unspecified(r.addr.as_ref()),
                    seq: u32::from(r.probe_id),
                    reply_size: u32::from(r.reply_size),
                    reply_ttl: u32::from(r.reply_ttl),
                    reply_proto: warts::ReplyProto::from_code(r.reply_proto).to_string(),
                    tx,
                    rx,
                    rtt: r.rtt_us,
                    probe_ipid: u32::from(r.probe_ipid),
                    reply_ipid: u32::from(r.reply_ipid),
                    icmp_type: u32::from(r.icmp_type()),
                    icmp_code: u32::from(r.icmp_code()),
                    rr: r.record_route.iter().filter_map(warts::Address::as_ipv4).collect(),
                    tsonly: Vec::new(),
                    tsandaddr: Vec::new(),
                };
                if p.is_ts_only() {
                    resp.tsonly = r.timestamps.clone();
                } else if p.is_ts_and_addr() {
                    resp.tsandaddr = r
                        .timestamps
                        .iter()
                        .zip(&r.timestamp_addrs)
                        .map(|(ts, addr)| TsAndAddr {
                            ip: addr.as_ipv4().unwrap_or(Ipv4Addr::UNSPECIFIED),
                            ts: *ts,
                        })
                        .collect();
                }
                resp
            })
            .collect();

        Self {
            kind: "ping".to_string(),
            method: p.method().map(|m| m.to_string()).unwrap_or_default(),
            src: ipv4_or_unspecified(f.src.as_ref()),
            dst: ipv4_or_unspecified(f.dst.as_ref()),
            start: Time::from(f.start),
            ping_sent: u32::from(f.probe_count),
            probe_size: u32::from(f.probe_size),
            user_id: f.user_id,
            ttl: u32::from(f.ttl),
            wait: u32::from(f.wait_s),
            timeout: u32::from(f.timeout_s),
            flags,
            responses,
            statistics: Some(p.stats().into()),
            spoofed_from: None,
            error: String::new(),
        }
    }
}
