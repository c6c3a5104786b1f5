//! Cursor over an immutable, shared byte arena.
//!
//! Segment files are loaded once into an `Arc<[u8]>`; every enumerator decodes
//! from its own `ByteCursor`, so cloning a cursor copies a pointer and two
//! offsets, never the data.

use std::io::Read;
use std::sync::Arc;

use crate::error::{QuiverError, Result};
use crate::util::varint;

/// A bounded read cursor over a shared byte buffer.
#[derive(Debug, Clone)]
pub struct ByteCursor {
    data: Arc<[u8]>,
    position: usize,
    end: usize,
}

impl ByteCursor {
    /// Create a cursor over `data[start..end]`, positioned at `start`.
    pub fn new(data: Arc<[u8]>, start: usize, end: usize) -> Self {
        debug_assert!(start <= end && end <= data.len());
        ByteCursor {
            data,
            position: start,
            end,
        }
    }

    /// Create a cursor over the whole buffer.
    pub fn over(data: Arc<[u8]>) -> Self {
        let end = data.len();
        Self::new(data, 0, end)
    }

    /// Absolute position in the underlying buffer.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Move to an absolute position.
    pub fn seek(&mut self, position: usize) -> Result<()> {
        if position > self.end {
            return Err(QuiverError::corrupt(
                "byte stream",
                format!("seek to {position} past end {}", self.end),
            ));
        }
        self.position = position;
        Ok(())
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.end - self.position
    }

    /// Whether every byte has been consumed.
    pub fn is_eof(&self) -> bool {
        self.position >= self.end
    }

    fn take(&mut self, len: usize) -> Result<&[u8]> {
        if len > self.remaining() {
            return Err(QuiverError::corrupt(
                "byte stream",
                format!("read of {len} bytes past end at {}", self.position),
            ));
        }
        let start = self.position;
        self.position += len;
        Ok(&self.data[start..start + len])
    }

    /// Skip `len` bytes.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a little-endian u32.
    pub fn read_u32_le(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        Ok(u32::from_le_bytes(buf))
    }

    /// Read a little-endian u64.
    pub fn read_u64_le(&mut self) -> Result<u64> {
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    /// Read a VInt.
    pub fn read_vint(&mut self) -> Result<u32> {
        let (value, len) = varint::decode_vint(&self.data[self.position..self.end])?;
        self.position += len;
        Ok(value)
    }

    /// Read a VLong.
    pub fn read_vlong(&mut self) -> Result<u64> {
        let (value, len) = varint::decode_vlong(&self.data[self.position..self.end])?;
        self.position += len;
        Ok(value)
    }

    /// Read `len` raw bytes as a borrowed slice.
    pub fn read_slice(&mut self, len: usize) -> Result<&[u8]> {
        self.take(len)
    }

    /// Read a VInt length prefix followed by that many bytes.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_vint()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    /// The shared buffer this cursor reads from.
    pub fn data(&self) -> &Arc<[u8]> {
        &self.data
    }
}

impl Read for ByteCursor {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = buf.len().min(self.remaining());
        buf[..n].copy_from_slice(&self.data[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_values() {
        let mut bytes = Vec::new();
        varint::encode_vint_into(300, &mut bytes);
        varint::encode_vlong_into(1 << 40, &mut bytes);
        bytes.push(7);
        bytes.extend_from_slice(&42u64.to_le_bytes());
        bytes.push(3);
        bytes.extend_from_slice(b"fox");

        let mut cursor = ByteCursor::over(Arc::from(bytes));
        assert_eq!(cursor.read_vint().unwrap(), 300);
        assert_eq!(cursor.read_vlong().unwrap(), 1 << 40);
        assert_eq!(cursor.read_u8().unwrap(), 7);
        assert_eq!(cursor.read_u64_le().unwrap(), 42);
        assert_eq!(cursor.read_bytes().unwrap(), b"fox");
        assert!(cursor.is_eof());
    }

    #[test]
    fn test_bounded_window() {
        let data: Arc<[u8]> = Arc::from(vec![1u8, 2, 3, 4, 5]);
        let mut cursor = ByteCursor::new(data, 1, 3);

        assert_eq!(cursor.read_u8().unwrap(), 2);
        assert_eq!(cursor.read_u8().unwrap(), 3);
        assert!(cursor.read_u8().unwrap_err().is_corruption());
    }

    #[test]
    fn test_clone_is_independent() {
        let data: Arc<[u8]> = Arc::from(vec![10u8, 20, 30]);
        let mut a = ByteCursor::over(data);
        a.read_u8().unwrap();

        let mut b = a.clone();
        assert_eq!(b.read_u8().unwrap(), 20);
        assert_eq!(b.read_u8().unwrap(), 30);
        assert_eq!(a.read_u8().unwrap(), 20);
    }
}
