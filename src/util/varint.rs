//! Variable-length integer encoding (VInt / VLong).
//!
//! Seven payload bits per byte, low-order group first, high bit set on every
//! byte except the last. A `u32` takes at most 5 bytes, a `u64` at most 10.

use std::io::{Read, Write};

use byteorder::ReadBytesExt;

use crate::error::{QuiverError, Result};

/// Maximum encoded length of a VInt.
pub const MAX_VINT_LEN: usize = 5;

/// Maximum encoded length of a VLong.
pub const MAX_VLONG_LEN: usize = 10;

/// Append the VInt encoding of `value` to `out`.
pub fn encode_vint_into(value: u32, out: &mut Vec<u8>) {
    encode_vlong_into(value as u64, out);
}

/// Append the VLong encoding of `value` to `out`.
pub fn encode_vlong_into(mut value: u64, out: &mut Vec<u8>) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

/// Encode a u32 as a VInt.
pub fn encode_vint(value: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(MAX_VINT_LEN);
    encode_vint_into(value, &mut bytes);
    bytes
}

/// Encode a u64 as a VLong.
pub fn encode_vlong(value: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(MAX_VLONG_LEN);
    encode_vlong_into(value, &mut bytes);
    bytes
}

/// Number of bytes the VLong encoding of `value` occupies.
pub fn vlong_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

fn decode(bytes: &[u8], max_len: usize, max_value: u64) -> Result<(u64, usize)> {
    let mut result = 0u64;

    for (i, &byte) in bytes.iter().enumerate().take(max_len) {
        result |= ((byte & 0x7F) as u64) << (7 * i);
        if byte & 0x80 == 0 {
            if result > max_value {
                return Err(QuiverError::corrupt("varint", "VarInt overflow"));
            }
            return Ok((result, i + 1));
        }
    }

    if bytes.len() >= max_len {
        Err(QuiverError::corrupt("varint", "VarInt overflow"))
    } else {
        Err(QuiverError::corrupt("varint", "Incomplete VarInt"))
    }
}

/// Decode a VInt from the front of `bytes`, returning the value and its length.
pub fn decode_vint(bytes: &[u8]) -> Result<(u32, usize)> {
    let (value, len) = decode(bytes, MAX_VINT_LEN, u32::MAX as u64)?;
    Ok((value as u32, len))
}

/// Decode a VLong from the front of `bytes`, returning the value and its length.
pub fn decode_vlong(bytes: &[u8]) -> Result<(u64, usize)> {
    decode(bytes, MAX_VLONG_LEN, u64::MAX)
}

/// Write a VInt to a writer, returning the number of bytes written.
pub fn write_vint<W: Write + ?Sized>(writer: &mut W, value: u32) -> Result<usize> {
    write_vlong(writer, value as u64)
}

/// Write a VLong to a writer, returning the number of bytes written.
pub fn write_vlong<W: Write + ?Sized>(writer: &mut W, value: u64) -> Result<usize> {
    let mut buf = Vec::with_capacity(MAX_VLONG_LEN);
    encode_vlong_into(value, &mut buf);
    writer.write_all(&buf)?;
    Ok(buf.len())
}

fn read<R: Read + ?Sized>(reader: &mut R, max_len: usize, max_value: u64) -> Result<u64> {
    let mut result = 0u64;

    for i in 0..max_len {
        let byte = reader.read_u8()?;
        result |= ((byte & 0x7F) as u64) << (7 * i);
        if byte & 0x80 == 0 {
            if result > max_value {
                return Err(QuiverError::corrupt("varint", "VarInt overflow"));
            }
            return Ok(result);
        }
    }

    Err(QuiverError::corrupt("varint", "VarInt overflow"))
}

/// Read a VInt from a reader.
pub fn read_vint<R: Read + ?Sized>(reader: &mut R) -> Result<u32> {
    Ok(read(reader, MAX_VINT_LEN, u32::MAX as u64)? as u32)
}

/// Read a VLong from a reader.
pub fn read_vlong<R: Read + ?Sized>(reader: &mut R) -> Result<u64> {
    read(reader, MAX_VLONG_LEN, u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_encode_decode_boundaries() {
        for &value in &[0u32, 1, 127, 128, 16383, 16384, u32::MAX] {
            let encoded = encode_vint(value);
            let (decoded, len) = decode_vint(&encoded).unwrap();
            assert_eq!(value, decoded);
            assert_eq!(encoded.len(), len);
            assert_eq!(vlong_len(value as u64), len);
        }

        let encoded = encode_vlong(u64::MAX);
        assert_eq!(encoded.len(), MAX_VLONG_LEN);
        assert_eq!(decode_vlong(&encoded).unwrap(), (u64::MAX, MAX_VLONG_LEN));
    }

    #[test]
    fn test_encoding_efficiency() {
        assert_eq!(encode_vint(0).len(), 1);
        assert_eq!(encode_vint(127).len(), 1);
        assert_eq!(encode_vint(128).len(), 2);
        assert_eq!(encode_vint(16384).len(), 3);
    }

    #[test]
    fn test_stream_read_write() {
        let mut buffer = Vec::new();
        write_vint(&mut buffer, 98765).unwrap();
        write_vlong(&mut buffer, 123456789012345).unwrap();

        let mut cursor = Cursor::new(buffer);
        assert_eq!(read_vint(&mut cursor).unwrap(), 98765);
        assert_eq!(read_vlong(&mut cursor).unwrap(), 123456789012345);
    }

    #[test]
    fn test_incomplete_varint() {
        let err = decode_vint(&[0x80]).unwrap_err();
        assert!(err.is_corruption());
        assert!(decode_vlong(&[0x80, 0x80]).is_err());
    }

    #[test]
    fn test_overflow() {
        // A VLong value does not fit in a VInt
        let encoded = encode_vlong(u32::MAX as u64 + 1);
        assert!(decode_vint(&encoded).unwrap_err().is_corruption());

        let mut cursor = Cursor::new(vec![0xFF; 6]);
        assert!(read_vint(&mut cursor).is_err());
    }
}
