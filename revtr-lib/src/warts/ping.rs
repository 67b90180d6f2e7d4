use super::names::{PingFlag, PingMethod};
use super::reader::{AddressTable, Flags, Reader};
use super::{Address, RecordType, Timeval, WartsError};

/// A ping record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ping {
    pub flags: PingFlags,
    pub replies: Vec<PingReply>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PingFlags {
    pub list_id: u32,
    pub cycle_id: u32,
    pub src_id: u32,
    pub dst_id: u32,
    pub start: Timeval,
    pub stop_reason: u8,
    pub stop_data: u8,
    pub data: Vec<u8>,
    pub probe_count: u16,
    pub probe_size: u16,
    pub wait_s: u8,
    pub ttl: u8,
    pub reply_count: u16,
    pub pings_sent: u16,
    pub method: u8,
    pub sport: u16,
    pub dport: u16,
    pub user_id: u32,
    pub src: Option<Address>,
    pub dst: Option<Address>,
    pub ping_flags: u8,
    pub tos: u8,
    pub prespecified: Vec<Address>,
    pub icmp_checksum: u16,
    pub mtu: u16,
    pub timeout_s: u8,
    pub wait_us: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PingReply {
    pub dst_id: u32,
    pub flags: u8,
    pub reply_ttl: u8,
    pub reply_size: u16,
    /// ICMP type in the high byte, code in the low byte.
    pub icmp: u16,
    pub rtt_us: u32,
    pub probe_id: u16,
    pub reply_ipid: u16,
    pub probe_ipid: u16,
    pub reply_proto: u8,
    pub tcp_flags: u8,
    pub addr: Option<Address>,
    pub record_route: Vec<Address>,
    pub timestamps: Vec<u32>,
    pub timestamp_addrs: Vec<Address>,
    pub reply_ipid32: u32,
    pub tx: Timeval,
    /// Originate, receive and transmit timestamps of an ICMP timestamp reply.
    pub ts_reply: Option<[u32; 3]>,
}

/// Summary statistics of a ping; times in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PingStats {
    pub replies: u16,
    pub loss: u16,
    pub min: f32,
    pub max: f32,
    pub avg: f32,
    pub stddev: f32,
}

impl Ping {
    pub(crate) fn read(r: &mut Reader<'_>) -> Result<Self, WartsError> {
        let mut addrs = AddressTable::default();
        let flags =
            PingFlags::read(r, &mut addrs).map_err(|e| e.within(RecordType::Ping, None))?;
        let user_id = Some(flags.user_id);

        let count = r.u16("reply count").map_err(|e| e.within(RecordType::Ping, user_id))?;
        let mut replies = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let reply = PingReply::read(r, &mut addrs)
                .map_err(|e| e.within(RecordType::Ping, user_id))?;
            replies.push(reply);
        }

        Ok(Ping { flags, replies })
    }

    pub fn method(&self) -> Option<PingMethod> {
        PingMethod::try_from(self.flags.method).ok()
    }

    pub fn is_ts_only(&self) -> bool {
        self.flags.ping_flags & PingFlag::TsOnly.mask() != 0
    }

    pub fn is_ts_and_addr(&self) -> bool {
        self.flags.ping_flags & PingFlag::TsAndAddr.mask() != 0
    }

    /// Reply statistics. Computed in microseconds and reported in
    /// milliseconds; replies beyond `pings_sent` count as duplicates and
    /// suppress the loss figure.
    pub fn stats(&self) -> PingStats {
        let mut stats = PingStats { replies: self.flags.reply_count, ..PingStats::default() };

        let pings_sent = usize::from(self.flags.pings_sent);
        let dups = self.replies.len().saturating_sub(pings_sent);
        if dups == 0 {
            stats.loss = self.flags.pings_sent.saturating_sub(self.flags.reply_count);
        }

        if self.replies.is_empty() {
            return stats;
        }

        let rtts: Vec<f64> = self.replies.iter().map(|r| f64::from(r.rtt_us)).collect();
        let n = rtts.len() as f64;
        let min = rtts.iter().copied().fold(f64::INFINITY, f64::min);
        let max = rtts.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = rtts.iter().sum::<f64>() / n;
        let variance = rtts.iter().map(|rtt| (rtt - avg).powi(2)).sum::<f64>() / n;

        stats.min = (min / 1000.0) as f32;
        stats.max = (max / 1000.0) as f32;
        stats.avg = (avg / 1000.0) as f32;
        stats.stddev = (variance.sqrt() / 1000.0) as f32;
        stats
    }
}

impl PingFlags {
    fn read(r: &mut Reader<'_>, addrs: &mut AddressTable) -> Result<Self, WartsError> {
        let mut pf = PingFlags::default();
        let mut data_len = 0usize;
        let flags = Flags::read(r)?;
        for id in flags.ids() {
            match id {
                1 => pf.list_id = r.u32("list id")?,
                2 => pf.cycle_id = r.u32("cycle id")?,
                3 => pf.src_id = r.u32("src id")?,
                4 => pf.dst_id = r.u32("dst id")?,
                5 => pf.start = r.timeval("start time")?,
                6 => pf.stop_reason = r.u8("stop reason")?,
                7 => pf.stop_data = r.u8("stop data")?,
                8 => data_len = usize::from(r.u16("data length")?),
                9 => pf.data = r.bytes(data_len, "data")?.to_vec(),
                10 => pf.probe_count = r.u16("probe count")?,
                11 => pf.probe_size = r.u16("probe size")?,
                12 => pf.wait_s = r.u8("wait")?,
                13 => pf.ttl = r.u8("ttl")?,
                14 => pf.reply_count = r.u16("reply count")?,
                15 => pf.pings_sent = r.u16("pings sent")?,
                16 => pf.method = r.u8("method")?,
                17 => pf.sport = r.u16("sport")?,
                18 => pf.dport = r.u16("dport")?,
                19 => pf.user_id = r.u32("user id")?,
                20 => pf.src = Some(addrs.read(r)?),
                21 => pf.dst = Some(addrs.read(r)?),
                22 => pf.ping_flags = r.u8("ping flags")?,
                23 => pf.tos = r.u8("tos")?,
                24 => {
                    let n = r.u8("prespecified count")?;
                    for _ in 0..n {
                        pf.prespecified.push(addrs.read(r)?);
                    }
                }
                25 => pf.icmp_checksum = r.u16("icmp checksum")?,
                26 => pf.mtu = r.u16("mtu")?,
                27 => pf.timeout_s = r.u8("timeout")?,
                28 => pf.wait_us = r.u32("wait us")?,
                _ => {
                    flags.skip_params(r)?;
                    break;
                }
            }
        }
        Ok(pf)
    }
}

impl PingReply {
    fn read(r: &mut Reader<'_>, addrs: &mut AddressTable) -> Result<Self, WartsError> {
        let mut pr = PingReply::default();
        let flags = Flags::read(r)?;
        for id in flags.ids() {
            match id {
                1 => pr.dst_id = r.u32("reply dst id")?,
                2 => pr.flags = r.u8("reply flags")?,
                3 => pr.reply_ttl = r.u8("reply ttl")?,
                4 => pr.reply_size = r.u16("reply size")?,
                5 => pr.icmp = r.u16("icmp type/code")?,
                6 => pr.rtt_us = r.u32("rtt")?,
                7 => pr.probe_id = r.u16("probe id")?,
                8 => pr.reply_ipid = r.u16("reply ipid")?,
                9 => pr.probe_ipid = r.u16("probe ipid")?,
                10 => pr.reply_proto = r.u8("reply proto")?,
                11 => pr.tcp_flags = r.u8("tcp flags")?,
                12 => pr.addr = Some(addrs.read(r)?),
                13 => {
                    let n = r.u8("record route count")?;
                    for _ in 0..n {
                        pr.record_route.push(addrs.read(r)?);
                    }
                }
                14 => {
                    let ts_count = r.u8("timestamp count")?;
                    let ip_count = r.u8("timestamp address count")?;
                    for _ in 0..ts_count {
                        pr.timestamps.push(r.u32("timestamp")?);
                    }
                    for _ in 0..ip_count {
                        pr.timestamp_addrs.push(addrs.read(r)?);
                    }
                }
                15 => pr.reply_ipid32 = r.u32("reply ipid32")?,
                16 => pr.tx = r.timeval("tx")?,
                17 => {
                    let o = r.u32("ts reply")?;
                    let rx = r.u32("ts reply")?;
                    let t = r.u32("ts reply")?;
                    pr.ts_reply = Some([o, rx, t]);
                }
                _ => {
                    flags.skip_params(r)?;
                    break;
                }
            }
        }
        Ok(pr)
    }

    pub fn icmp_type(&self) -> u8 {
        (self.icmp >> 8) as u8
    }

    pub fn icmp_code(&self) -> u8 {
        (self.icmp & 0xff) as u8
    }
}
