use super::names::{StopReason, TraceType};
use super::reader::{AddressTable, Flags, Reader};
use super::{Address, RecordType, Timeval, WartsError};

/// A traceroute record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Traceroute {
    pub flags: TraceFlags,
    pub hops: Vec<TraceHop>,
    pub end_of_trace: u16,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceFlags {
    pub list_id: u32,
    pub cycle_id: u32,
    pub src_ref: Option<Address>,
    pub dst_ref: Option<Address>,
    pub start: Timeval,
    pub stop_reason: u8,
    pub stop_data: u8,
    pub trace_flags: u8,
    pub attempts: u8,
    pub hop_limit: u8,
    pub trace_type: u8,
    pub probe_size: u16,
    pub sport: u16,
    pub dport: u16,
    pub first_hop: u8,
    pub tos: u8,
    pub wait_s: u8,
    pub loops: u8,
    pub hops_probed: u16,
    pub gap_limit: u8,
    pub gap_action: u8,
    pub loop_action: u8,
    pub probes_sent: u16,
    pub min_wait_centi: u8,
    pub confidence: u8,
    pub src: Option<Address>,
    pub dst: Option<Address>,
    pub user_id: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraceHop {
    /// Address given by reference into the record table.
    pub addr_ref: Option<Address>,
    pub probe_ttl: u8,
    pub reply_ttl: u8,
    pub flags: u8,
    pub probe_id: u8,
    pub rtt_us: u32,
    pub icmp: u16,
    pub probe_size: u16,
    pub reply_size: u16,
    pub ipid: u16,
    pub tos: u8,
    pub next_hop_mtu: u16,
    pub quoted_ip_len: u16,
    pub quoted_ttl: u8,
    pub tcp_flags: u8,
    pub quoted_tos: u8,
    pub icmp_extensions: Vec<IcmpExtension>,
    pub addr: Option<Address>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IcmpExtension {
    pub class: u8,
    pub kind: u8,
    pub data: Vec<u8>,
}

impl Traceroute {
    pub(crate) fn read(r: &mut Reader<'_>) -> Result<Self, WartsError> {
        let mut addrs = AddressTable::default();
        let flags = TraceFlags::read(r, &mut addrs)
            .map_err(|e| e.within(RecordType::Traceroute, None))?;
        let user_id = Some(flags.user_id);
        let wrap = |e: WartsError| e.within(RecordType::Traceroute, user_id);

        let count = r.u16("hop count").map_err(wrap)?;
        let mut hops = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            hops.push(TraceHop::read(r, &mut addrs).map_err(wrap)?);
        }
        // older writers omit the trailer
        let end_of_trace = if r.is_empty() { 0 } else { r.u16("end of trace").map_err(wrap)? };

        Ok(Traceroute { flags, hops, end_of_trace })
    }

    pub fn trace_type(&self) -> Option<TraceType> {
        TraceType::try_from(self.flags.trace_type).ok()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        StopReason::try_from(self.flags.stop_reason).ok()
    }
}

impl TraceFlags {
    fn read(r: &mut Reader<'_>, addrs: &mut AddressTable) -> Result<Self, WartsError> {
        let mut tf = TraceFlags::default();
        let flags = Flags::read(r)?;
        for id in flags.ids() {
            match id {
                1 => tf.list_id = r.u32("list id")?,
                2 => tf.cycle_id = r.u32("cycle id")?,
                3 => tf.src_ref = Some(addrs.read_ref(r)?),
                4 => tf.dst_ref = Some(addrs.read_ref(r)?),
                5 => tf.start = r.timeval("start time")?,
                6 => tf.stop_reason = r.u8("stop reason")?,
                7 => tf.stop_data = r.u8("stop data")?,
                8 => tf.trace_flags = r.u8("trace flags")?,
                9 => tf.attempts = r.u8("attempts")?,
                10 => tf.hop_limit = r.u8("hop limit")?,
                11 => tf.trace_type = r.u8("trace type")?,
                12 => tf.probe_size = r.u16("probe size")?,
                13 => tf.sport = r.u16("sport")?,
                14 => tf.dport = r.u16("dport")?,
                15 => tf.first_hop = r.u8("first hop")?,
                16 => tf.tos = r.u8("tos")?,
                17 => tf.wait_s = r.u8("wait")?,
                18 => tf.loops = r.u8("loops")?,
                19 => tf.hops_probed = r.u16("hops probed")?,
                20 => tf.gap_limit = r.u8("gap limit")?,
                21 => tf.gap_action = r.u8("gap action")?,
                22 => tf.loop_action = r.u8("loop action")?,
                23 => tf.probes_sent = r.u16("probes sent")?,
                24 => tf.min_wait_centi = r.u8("min wait")?,
                25 => tf.confidence = r.u8("confidence")?,
                26 => tf.src = Some(addrs.read(r)?),
                27 => tf.dst = Some(addrs.read(r)?),
                28 => tf.user_id = r.u32("user id")?,
                _ => {
                    flags.skip_params(r)?;
                    break;
                }
            }
        }
        Ok(tf)
    }
}

impl TraceHop {
    fn read(r: &mut Reader<'_>, addrs: &mut AddressTable) -> Result<Self, WartsError> {
        let mut th = TraceHop::default();
        let flags = Flags::read(r)?;
        for id in flags.ids() {
            match id {
                1 => th.addr_ref = Some(addrs.read_ref(r)?),
                2 => th.probe_ttl = r.u8("probe ttl")?,
                3 => th.reply_ttl = r.u8("reply ttl")?,
                4 => th.flags = r.u8("hop flags")?,
                5 => th.probe_id = r.u8("probe id")?,
                6 => th.rtt_us = r.u32("rtt")?,
                7 => th.icmp = r.u16("icmp type/code")?,
                8 => th.probe_size = r.u16("probe size")?,
                9 => th.reply_size = r.u16("reply size")?,
                10 => th.ipid = r.u16("ipid")?,
                11 => th.tos = r.u8("tos")?,
                12 => th.next_hop_mtu = r.u16("next hop mtu")?,
                13 => th.quoted_ip_len = r.u16("quoted ip length")?,
                14 => th.quoted_ttl = r.u8("quoted ttl")?,
                15 => th.tcp_flags = r.u8("tcp flags")?,
                16 => th.quoted_tos = r.u8("quoted tos")?,
                17 => th.icmp_extensions = read_extensions(r)?,
                18 => th.addr = Some(addrs.read(r)?),
                _ => {
                    flags.skip_params(r)?;
                    break;
                }
            }
        }
        Ok(th)
    }

    /// Reply address, preferring the inline form.
    pub fn address(&self) -> Option<&Address> {
        self.addr.as_ref().or(self.addr_ref.as_ref())
    }

    pub fn icmp_type(&self) -> u8 {
        (self.icmp >> 8) as u8
    }

    pub fn icmp_code(&self) -> u8 {
        (self.icmp & 0xff) as u8
    }
}

fn read_extensions(r: &mut Reader<'_>) -> Result<Vec<IcmpExtension>, WartsError> {
    let total = usize::from(r.u16("icmp extensions length")?);
    let mut out = Vec::new();
    let mut consumed = 0usize;
    while consumed < total {
        let len = r.u16("icmp extension length")?;
        let class = r.u8("icmp extension class")?;
        let kind = r.u8("icmp extension type")?;
        let data = r.bytes(usize::from(len), "icmp extension data")?.to_vec();
        out.push(IcmpExtension { class, kind, data });
        consumed += usize::from(len) + 4;
    }
    Ok(out)
}
