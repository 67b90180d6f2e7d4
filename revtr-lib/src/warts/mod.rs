//! Decoder for the probe daemon's binary result format.
//!
//! A stream is a sequence of records, each with an 8-byte header: magic
//! `0x1205`, record type, body length. Only list, cycle, ping and traceroute
//! bodies are decoded; every other record type is skipped by its length.

mod list;
mod names;
mod ping;
mod reader;
mod traceroute;

use std::net::{IpAddr, Ipv4Addr};

use thiserror::Error;

pub use list::{Cycle, CycleStop, List};
pub use names::{PingFlag, PingMethod, ReplyProto, StopReason, TraceType, UnknownName};
pub use ping::{Ping, PingFlags, PingReply, PingStats};
pub use traceroute::{IcmpExtension, TraceFlags, TraceHop, Traceroute};

use reader::Reader;

pub const MAGIC: u16 = 0x1205;
pub const HEADER_LEN: usize = 8;

/// Errors produced while decoding a result stream
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WartsError {
    #[error("unexpected end of data reading {0}")]
    Truncated(&'static str),

    #[error("bad magic {0:#06x}")]
    BadMagic(u16),

    #[error("address reference {0} out of range")]
    BadAddressRef(u32),

    #[error("address type {kind} with length {len}")]
    BadAddress { kind: u8, len: u8 },

    #[error("in {kind:?} record (user id {user_id:?}): {source}")]
    InRecord {
        kind: RecordType,
        user_id: Option<u32>,
        #[source]
        source: Box<WartsError>,
    },
}

impl WartsError {
    /// User id of the record that failed, when its flags were decoded before
    /// the failure.
    pub fn user_id(&self) -> Option<u32> {
        match self {
            WartsError::InRecord { user_id, .. } => *user_id,
            _ => None,
        }
    }

    pub(crate) fn within(self, kind: RecordType, user_id: Option<u32>) -> Self {
        match self {
            e @ WartsError::InRecord { .. } => e,
            other => WartsError::InRecord { kind, user_id, source: Box::new(other) },
        }
    }
}

/// Record types that appear in a result stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    List,
    CycleStart,
    CycleDef,
    CycleStop,
    Address,
    Traceroute,
    Ping,
    Other(u16),
}

impl RecordType {
    pub fn from_code(code: u16) -> Self {
        match code {
            0x01 => RecordType::List,
            0x02 => RecordType::CycleStart,
            0x03 => RecordType::CycleDef,
            0x04 => RecordType::CycleStop,
            0x05 => RecordType::Address,
            0x06 => RecordType::Traceroute,
            0x07 => RecordType::Ping,
            other => RecordType::Other(other),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            RecordType::List => 0x01,
            RecordType::CycleStart => 0x02,
            RecordType::CycleDef => 0x03,
            RecordType::CycleStop => 0x04,
            RecordType::Address => 0x05,
            RecordType::Traceroute => 0x06,
            RecordType::Ping => 0x07,
            RecordType::Other(code) => code,
        }
    }
}

/// Address as stored in a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Ip(IpAddr),
    Other { kind: u8, data: Vec<u8> },
}

impl Address {
    pub fn as_ipv4(&self) -> Option<Ipv4Addr> {
        match self {
            Address::Ip(IpAddr::V4(ip)) => Some(*ip),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeval {
    pub sec: u32,
    pub usec: u32,
}

impl Timeval {
    pub fn as_micros(self) -> u64 {
        u64::from(self.sec) * 1_000_000 + u64::from(self.usec)
    }
}

/// A decoded record.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    List(List),
    CycleStart(Cycle),
    CycleDef(Cycle),
    CycleStop(CycleStop),
    Traceroute(Traceroute),
    Ping(Ping),
}

impl Record {
    pub fn record_type(&self) -> RecordType {
        match self {
            Record::List(_) => RecordType::List,
            Record::CycleStart(_) => RecordType::CycleStart,
            Record::CycleDef(_) => RecordType::CycleDef,
            Record::CycleStop(_) => RecordType::CycleStop,
            Record::Traceroute(_) => RecordType::Traceroute,
            Record::Ping(_) => RecordType::Ping,
        }
    }

    /// User id of measurement records.
    pub fn user_id(&self) -> Option<u32> {
        match self {
            Record::Ping(p) => Some(p.flags.user_id),
            Record::Traceroute(t) => Some(t.flags.user_id),
            _ => None,
        }
    }
}

/// Decodes every record in `data` and returns those whose type is in `filter`.
///
/// Records of types outside `filter` are still decoded when known so that a
/// malformed stream is reported rather than silently truncated.
pub fn parse(data: &[u8], filter: &[RecordType]) -> Result<Vec<Record>, WartsError> {
    let mut r = Reader::new(data);
    let mut out = Vec::new();

    while !r.is_empty() {
        let magic = r.u16("record header")?;
        if magic != MAGIC {
            return Err(WartsError::BadMagic(magic));
        }
        let kind = RecordType::from_code(r.u16("record header")?);
        let len = r.u32("record header")?;
        let len = usize::try_from(len).map_err(|_| WartsError::Truncated("record body"))?;
        let body = r.bytes(len, "record body")?;

        let record = decode_body(kind, body)?;
        if let Some(record) = record {
            if filter.contains(&record.record_type()) {
                out.push(record);
            }
        }
    }

    Ok(out)
}

fn decode_body(kind: RecordType, body: &[u8]) -> Result<Option<Record>, WartsError> {
    let mut r = Reader::new(body);
    let record = match kind {
        RecordType::List => Record::List(List::read(&mut r).map_err(|e| e.within(kind, None))?),
        RecordType::CycleStart => {
            Record::CycleStart(Cycle::read(&mut r).map_err(|e| e.within(kind, None))?)
        }
        RecordType::CycleDef => {
            Record::CycleDef(Cycle::read(&mut r).map_err(|e| e.within(kind, None))?)
        }
        RecordType::CycleStop => {
            Record::CycleStop(CycleStop::read(&mut r).map_err(|e| e.within(kind, None))?)
        }
        RecordType::Traceroute => Record::Traceroute(Traceroute::read(&mut r)?),
        RecordType::Ping => Record::Ping(Ping::read(&mut r)?),
        RecordType::Address | RecordType::Other(_) => return Ok(None),
    };
    Ok(Some(record))
}
