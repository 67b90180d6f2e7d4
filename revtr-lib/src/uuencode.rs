//! Line-oriented uuencoding as used on the probe daemon's control socket.

use bytes::{BufMut, BytesMut};

use crate::error::{Result, RevtrError};

const LINE_LEN: usize = 45;

fn valid(c: u8) -> bool {
    (32..=96).contains(&c)
}

fn dec(c: u8) -> u8 {
    c.wrapping_sub(32) & 0x3f
}

fn enc(b: u8) -> u8 {
    if b == 0 {
        b'`'
    } else {
        b + b' '
    }
}

/// Decodes uuencoded text.
///
/// Decoding stops at the first empty line, at a line whose length character
/// is out of range, or at the terminating `` ` `` line.
pub fn decode(input: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(input.len() * 3 / 4);

    for line in input.split(|b| *b == b'\n') {
        let Some((&len_char, body)) = line.split_first() else {
            break;
        };
        if !valid(len_char) {
            break;
        }
        if body.is_empty() && len_char == b'`' {
            break;
        }

        let len = usize::from(dec(len_char));
        let start = out.len();
        for chunk in body.chunks(4) {
            if chunk.len() < 4 {
                // short trailing group; only the declared length matters
                break;
            }
            if let Some(bad) = chunk.iter().find(|c| !valid(**c)) {
                return Err(RevtrError::UuDecode(format!("invalid byte {bad:#04x}")));
            }
            let (a, b, c, d) = (dec(chunk[0]), dec(chunk[1]), dec(chunk[2]), dec(chunk[3]));
            out.push((a << 2) | (b >> 4));
            out.push((b << 4) | (c >> 2));
            out.push((c << 6) | d);
        }

        let decoded = out.len() - start;
        if decoded < len {
            return Err(RevtrError::UuDecode(format!(
                "line declares {len} bytes but carries {decoded}"
            )));
        }
        out.truncate(start + len);
    }

    Ok(out)
}

/// Encodes bytes in 45-byte lines followed by the `` ` `` terminator line.
pub fn encode(input: &[u8]) -> Vec<u8> {
    let mut out = BytesMut::with_capacity(input.len() * 4 / 3 + input.len() / LINE_LEN * 2 + 4);

    for line in input.chunks(LINE_LEN) {
        // LINE_LEN fits in a u8
        out.put_u8(enc(line.len() as u8));
        for group in line.chunks(3) {
            let mut b = [0u8; 3];
            b[..group.len()].copy_from_slice(group);
            out.put_u8(enc(b[0] >> 2));
            out.put_u8(enc(((b[0] & 0x03) << 4) | (b[1] >> 4)));
            out.put_u8(enc(((b[1] & 0x0f) << 2) | (b[2] >> 6)));
            out.put_u8(enc(b[2] & 0x3f));
        }
        out.put_u8(b'\n');
    }
    out.put_slice(b"`\n");

    out.to_vec()
}
