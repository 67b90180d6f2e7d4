//! Parsing of raw IPv4/ICMP datagrams captured on a vantage point.

use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::IcmpTypes;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::Packet;
use std::net::Ipv4Addr;

use crate::error::{Result, RevtrError};
use crate::model::{Probe, RecordRoute, Stamp, TimeStamp, TimestampKind};
use crate::spoof::{ICMP_ID, ICMP_SEQ};

const OPT_END: u8 = 0;
const OPT_NOP: u8 = 1;
const OPT_RECORD_ROUTE: u8 = 7;
const OPT_TIMESTAMP: u8 = 68;

const IPV4_MIN_HEADER: usize = 20;
/// Spoofer address plus probe id.
const SPOOF_PAYLOAD: usize = 8;

fn ipv4_at(b: &[u8], at: usize) -> Ipv4Addr {
    Ipv4Addr::new(b[at], b[at + 1], b[at + 2], b[at + 3])
}

fn u32_at(b: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

/// Wraps `buf` as an IPv4 packet whose header and payload lie inside it.
fn ipv4_packet(buf: &[u8]) -> Result<Ipv4Packet<'_>> {
    let ip = Ipv4Packet::new(buf)
        .ok_or_else(|| RevtrError::Icmp(format!("datagram of {} bytes too short", buf.len())))?;
    if ip.get_version() != 4 {
        return Err(RevtrError::Icmp(format!("not IPv4 (version {})", ip.get_version())));
    }
    let header_len = usize::from(ip.get_header_length()) * 4;
    if header_len < IPV4_MIN_HEADER || header_len > buf.len() {
        return Err(RevtrError::Icmp(format!("bad header length {header_len}")));
    }
    let total_len = usize::from(ip.get_total_length());
    if total_len < header_len || total_len > buf.len() {
        return Err(RevtrError::Icmp(format!("bad total length {total_len}")));
    }
    Ok(ip)
}

fn parse_options(mut opts: &[u8]) -> Result<(Option<RecordRoute>, Option<TimeStamp>)> {
    let mut rr = None;
    let mut ts = None;
    while let Some(&kind) = opts.first() {
        match kind {
            OPT_END => break,
            OPT_NOP => {
                opts = &opts[1..];
                continue;
            }
            _ => {}
        }
        let len = usize::from(*opts.get(1).ok_or_else(|| truncated(kind))?);
        if len < 2 || len > opts.len() {
            return Err(truncated(kind));
        }
        let body = &opts[..len];
        match kind {
            OPT_RECORD_ROUTE => rr = Some(parse_record_route(body)?),
            OPT_TIMESTAMP => ts = Some(parse_timestamp(body)?),
            _ => {}
        }
        opts = &opts[len..];
    }
    Ok((rr, ts))
}

fn truncated(kind: u8) -> RevtrError {
    RevtrError::Icmp(format!("truncated IP option {kind}"))
}

/// `[type, len, ptr, addr...]`; the pointer (1-based) marks the first free slot.
fn parse_record_route(opt: &[u8]) -> Result<RecordRoute> {
    if opt.len() < 3 {
        return Err(truncated(OPT_RECORD_ROUTE));
    }
    let filled = usize::from(opt[2]).saturating_sub(4).min(opt.len() - 3) / 4;
    let hops = (0..filled).map(|i| ipv4_at(opt, 3 + i * 4)).collect();
    Ok(RecordRoute { hops })
}

/// `[type, len, ptr, oflw|flag, data...]`.
fn parse_timestamp(opt: &[u8]) -> Result<TimeStamp> {
    if opt.len() < 4 {
        return Err(truncated(OPT_TIMESTAMP));
    }
    let flag = opt[3] & 0x0f;
    let kind = TimestampKind::from_flag(flag)
        .ok_or_else(|| RevtrError::Icmp(format!("unknown timestamp flag {flag}")))?;
    let data = &opt[4..];
    let filled = usize::from(opt[2]).saturating_sub(5).min(data.len());

    let stamps = match kind {
        TimestampKind::TsOnly => (0..filled / 4)
            .map(|i| Stamp { time: u32_at(data, i * 4), ip: None })
            .collect(),
        // prespecified slots are reported whether or not they were stamped
        TimestampKind::TsAndAddr | TimestampKind::Prespecified => {
            let used = if kind == TimestampKind::Prespecified { data.len() } else { filled };
            (0..used / 8)
                .map(|i| Stamp { ip: Some(ipv4_at(data, i * 8)), time: u32_at(data, i * 8 + 4) })
                .collect()
        }
    };
    Ok(TimeStamp { kind, stamps })
}

/// Turns a captured datagram into a probe when it is a reply to one of our
/// spoofed echo requests. `Ok(None)` for any other traffic.
pub fn parse_probe(datagram: &[u8]) -> Result<Option<Probe>> {
    let ip = ipv4_packet(datagram)?;
    if ip.get_next_level_protocol() != IpNextHeaderProtocols::Icmp {
        return Ok(None);
    }
    let icmp = EchoReplyPacket::new(ip.payload()).ok_or_else(|| {
        RevtrError::Icmp(format!("icmp message of {} bytes too short", ip.payload().len()))
    })?;
    let payload = icmp.payload();
    if icmp.get_icmp_type() != IcmpTypes::EchoReply
        || icmp.get_identifier() != ICMP_ID
        || icmp.get_sequence_number() != ICMP_SEQ
        || payload.len() < SPOOF_PAYLOAD
    {
        return Ok(None);
    }
    let (record_route, timestamp) = parse_options(ip.get_options_raw())?;
    Ok(Some(Probe {
        id: u32_at(payload, 4),
        spoofer_ip: ipv4_at(payload, 0),
        src: ip.get_source(),
        dst: ip.get_destination(),
        seq: icmp.get_sequence_number(),
        record_route,
        timestamp,
        sender_ip: None,
    }))
}
