use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use super::{Address, Timeval, WartsError};

/// Big-endian cursor over a record body.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, pos: usize, what: &'static str) -> Result<(), WartsError> {
        if pos > self.buf.len() {
            return Err(WartsError::Truncated(what));
        }
        self.pos = pos;
        Ok(())
    }

    pub fn bytes(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], WartsError> {
        let end = self.pos.checked_add(n).ok_or(WartsError::Truncated(what))?;
        let out = self.buf.get(self.pos..end).ok_or(WartsError::Truncated(what))?;
        self.pos = end;
        Ok(out)
    }

    pub fn u8(&mut self, what: &'static str) -> Result<u8, WartsError> {
        Ok(self.bytes(1, what)?[0])
    }

    pub fn u16(&mut self, what: &'static str) -> Result<u16, WartsError> {
        let b = self.bytes(2, what)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self, what: &'static str) -> Result<u32, WartsError> {
        let b = self.bytes(4, what)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn timeval(&mut self, what: &'static str) -> Result<Timeval, WartsError> {
        let sec = self.u32(what)?;
        let usec = self.u32(what)?;
        Ok(Timeval { sec, usec })
    }

    /// NUL-terminated string.
    pub fn string(&mut self, what: &'static str) -> Result<String, WartsError> {
        let rest = self.buf.get(self.pos..).ok_or(WartsError::Truncated(what))?;
        let len = rest.iter().position(|b| *b == 0).ok_or(WartsError::Truncated(what))?;
        let s = String::from_utf8_lossy(&rest[..len]).into_owned();
        self.pos += len + 1;
        Ok(s)
    }
}

/// Set of flag ids read from a variable-length flag block.
///
/// Each byte carries seven flags in its low bits; the high bit says another
/// byte follows. Flag `n` of byte `k` (both 1-based) has id `n + 7 * (k - 1)`.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Flags {
    bits: u128,
    param_len: u16,
    params_start: usize,
}

impl Flags {
    pub fn read(r: &mut Reader<'_>) -> Result<Self, WartsError> {
        let mut bits = 0u128;
        let mut byte_num = 0u32;
        loop {
            let b = r.u8("flags")?;
            for bit in 0..7u32 {
                if b & (1 << bit) != 0 {
                    let id = bit + 1 + 7 * byte_num;
                    if id < 128 {
                        bits |= 1u128 << id;
                    }
                }
            }
            byte_num += 1;
            if b & 0x80 == 0 {
                break;
            }
        }

        let param_len = if bits != 0 { r.u16("flag parameter length")? } else { 0 };
        Ok(Self { bits, param_len, params_start: r.position() })
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Set flag ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = u8> + '_ {
        (1u8..128).filter(move |id| self.bits & (1u128 << id) != 0)
    }

    /// Jump past the parameter block. Used when a flag of unknown width is
    /// met and the remaining parameters cannot be decoded.
    pub fn skip_params(&self, r: &mut Reader<'_>) -> Result<(), WartsError> {
        r.seek(self.params_start + usize::from(self.param_len), "flag parameters")
    }
}

#[cfg(test)]
pub(crate) fn encode_flags(ids: &[u8]) -> Vec<u8> {
    let max = ids.iter().copied().max().unwrap_or(0);
    if max == 0 {
        return vec![0];
    }
    let n = usize::from(max).div_ceil(7);
    let mut out = vec![0u8; n];
    for id in ids {
        let idx = usize::from(id - 1) / 7;
        let bit = (id - 1) % 7;
        out[idx] |= 1 << bit;
    }
    for b in out.iter_mut().take(n - 1) {
        *b |= 0x80;
    }
    out
}

/// Per-record address table. Fully written addresses are appended and later
/// referenced by 0-based index.
#[derive(Debug, Default)]
pub(crate) struct AddressTable {
    addrs: Vec<Address>,
}

impl AddressTable {
    pub fn read(&mut self, r: &mut Reader<'_>) -> Result<Address, WartsError> {
        let len = r.u8("address length")?;
        if len == 0 {
            let id = r.u32("address reference")?;
            return self.get(id);
        }
        let kind = r.u8("address type")?;
        let data = r.bytes(usize::from(len), "address")?;
        let addr = match (kind, data.len()) {
            (1, 4) => Address::Ip(IpAddr::V4(Ipv4Addr::new(data[0], data[1], data[2], data[3]))),
            (2, 16) => {
                let mut b = [0u8; 16];
                b.copy_from_slice(data);
                Address::Ip(IpAddr::V6(Ipv6Addr::from(b)))
            }
            (1 | 2, _) => return Err(WartsError::BadAddress { kind, len }),
            _ => Address::Other { kind, data: data.to_vec() },
        };
        self.addrs.push(addr.clone());
        Ok(addr)
    }

    pub fn get(&self, id: u32) -> Result<Address, WartsError> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.addrs.get(i))
            .cloned()
            .ok_or(WartsError::BadAddressRef(id))
    }

    /// Referenced-only form: a bare u32 index.
    pub fn read_ref(&self, r: &mut Reader<'_>) -> Result<Address, WartsError> {
        let id = r.u32("address reference")?;
        self.get(id)
    }
}
