//! KLV (Key-Length-Value) framing.
//!
//! All data in MXF files is encoded as KLV triplets: a 16-byte Universal
//! Label key, a BER-encoded length and the value bytes. The writer encodes
//! lengths with a configurable minimum encoded size so that a length can be
//! patched in place later without shifting the value.

use crate::error::{MxfError, Result};
use crate::ul::UL;
use byteorder::{BigEndian, WriteBytesExt};
use std::io::Write;

/// Key length in bytes.
pub const KEY_SIZE: usize = 16;

/// Default minimum encoded BER length size in bytes (one leading byte plus
/// three length bytes).
pub const DEFAULT_MIN_LLEN: u8 = 4;

/// Number of bytes `encode_ber_length` will produce.
pub fn ber_length_size(length: u64, min_llen: u8) -> usize {
    if min_llen <= 1 && length < 0x80 {
        return 1;
    }

    let mut needed = 1usize;
    let mut value = length >> 8;
    while value > 0 {
        needed += 1;
        value >>= 8;
    }
    let needed = needed.max(min_llen.saturating_sub(1) as usize);
    1 + needed
}

/// Encode a length as BER, using at least `min_llen` bytes.
pub fn encode_ber_length(length: u64, min_llen: u8) -> Vec<u8> {
    if min_llen <= 1 && length < 0x80 {
        return vec![length as u8];
    }

    let total = ber_length_size(length, min_llen);
    let num_bytes = total - 1;
    let mut out = Vec::with_capacity(total);
    out.push(0x80 | num_bytes as u8);
    for i in (0..num_bytes).rev() {
        out.push((length >> (8 * i)) as u8);
    }
    out
}

/// Write a key and BER length, returning the number of bytes written.
pub fn write_kl<W: Write>(writer: &mut W, key: &UL, length: u64, min_llen: u8) -> Result<usize> {
    writer.write_all(key)?;
    let len_bytes = encode_ber_length(length, min_llen);
    writer.write_all(&len_bytes)?;
    Ok(KEY_SIZE + len_bytes.len())
}

/// Write a complete KLV triplet, returning the number of bytes written.
pub fn write_klv<W: Write>(writer: &mut W, key: &UL, value: &[u8], min_llen: u8) -> Result<usize> {
    let kl_size = write_kl(writer, key, value.len() as u64, min_llen)?;
    writer.write_all(value)?;
    Ok(kl_size + value.len())
}

/// Write a local set item (2-byte tag, 2-byte length, value).
pub fn write_local_item<W: Write>(writer: &mut W, tag: u16, value: &[u8]) -> Result<usize> {
    if value.len() > u16::MAX as usize {
        return Err(MxfError::FormatLimit(format!(
            "Local set item 0x{:04x} value size {} exceeds 65535",
            tag,
            value.len()
        )));
    }
    writer.write_u16::<BigEndian>(tag)?;
    writer.write_u16::<BigEndian>(value.len() as u16)?;
    writer.write_all(value)?;
    Ok(4 + value.len())
}

/// Size in bytes of a fill item whose total size is `total`, or an error if
/// the gap is too small to hold a key and length.
pub fn fill_value_size(total: u64, min_llen: u8) -> Result<u64> {
    let overhead = (KEY_SIZE + min_llen as usize) as u64;
    if total < overhead {
        return Err(MxfError::InvalidArgument(format!(
            "Fill gap of {} bytes is smaller than the {} byte KLV overhead",
            total, overhead
        )));
    }
    Ok(total - overhead)
}

/// Write a fill item occupying exactly `total` bytes.
pub fn write_fill<W: Write>(writer: &mut W, fill_key: &UL, total: u64, min_llen: u8) -> Result<()> {
    let value_size = fill_value_size(total, min_llen)?;
    writer.write_all(fill_key)?;
    let len_bytes = encode_ber_length(value_size, min_llen);
    debug_assert_eq!(len_bytes.len(), min_llen as usize);
    writer.write_all(&len_bytes)?;

    const ZEROES: [u8; 4096] = [0; 4096];
    let mut remaining = value_size as usize;
    while remaining > 0 {
        let chunk = remaining.min(ZEROES.len());
        writer.write_all(&ZEROES[..chunk])?;
        remaining -= chunk;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ul::labels;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ber_short_form() {
        assert_eq!(encode_ber_length(0x45, 1), vec![0x45]);
        assert_eq!(ber_length_size(0x45, 1), 1);
    }

    #[test]
    fn test_ber_long_form_minimum() {
        // default 4-byte encoding
        assert_eq!(encode_ber_length(0x45, 4), vec![0x83, 0x00, 0x00, 0x45]);
        assert_eq!(
            encode_ber_length(0x0102, 4),
            vec![0x83, 0x00, 0x01, 0x02]
        );
        assert_eq!(ber_length_size(0x45, 4), 4);
    }

    #[test]
    fn test_ber_grows_past_minimum() {
        let encoded = encode_ber_length(0x0102_0304_05, 4);
        assert_eq!(encoded, vec![0x85, 0x01, 0x02, 0x03, 0x04, 0x05]);
    }

    #[test]
    fn test_ber_eight_byte_llen() {
        let encoded = encode_ber_length(96_000, 8);
        assert_eq!(encoded.len(), 8);
        assert_eq!(encoded[0], 0x87);
        assert_eq!(&encoded[1..], &[0, 0, 0, 0, 1, 0x77, 0]);
    }

    #[test]
    fn test_write_klv() {
        let mut buffer = Vec::new();
        let size = write_klv(&mut buffer, &labels::PRIMER_PACK, &[1, 2, 3], 4).unwrap();
        assert_eq!(size, 16 + 4 + 3);
        assert_eq!(buffer.len(), size);
        assert_eq!(&buffer[0..16], &labels::PRIMER_PACK);
        assert_eq!(&buffer[16..20], &[0x83, 0, 0, 3]);
        assert_eq!(&buffer[20..], &[1, 2, 3]);
    }

    #[test]
    fn test_write_local_item() {
        let mut buffer = Vec::new();
        let size = write_local_item(&mut buffer, 0x3C0A, &[0xAA; 16]).unwrap();
        assert_eq!(size, 20);
        assert_eq!(&buffer[0..2], &[0x3C, 0x0A]);
        assert_eq!(&buffer[2..4], &[0x00, 0x10]);
    }

    #[test]
    fn test_write_fill_exact_size() {
        let mut buffer = Vec::new();
        write_fill(&mut buffer, &labels::KLV_FILL, 64, 4).unwrap();
        assert_eq!(buffer.len(), 64);
        assert_eq!(&buffer[0..16], &labels::KLV_FILL);

        // too small for key + length
        let mut buffer = Vec::new();
        assert!(write_fill(&mut buffer, &labels::KLV_FILL, 10, 4).is_err());
    }
}
