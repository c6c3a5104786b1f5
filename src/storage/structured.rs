//! Structured binary I/O with a running checksum.
//!
//! [`StructWriter`] and [`StructReader`] wrap a storage output/input and keep a
//! CRC32 over every byte that passes through them, so a codec can append or
//! verify a checksum footer without a second pass over the file.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher;

use crate::error::{QuiverError, Result};
use crate::storage::{StorageInput, StorageOutput};
use crate::util::varint;

/// A structured file writer for binary data.
pub struct StructWriter<W: StorageOutput> {
    writer: W,
    hasher: Hasher,
    position: u64,
}

impl<W: StorageOutput> StructWriter<W> {
    /// Create a new structured file writer.
    pub fn new(writer: W) -> Self {
        StructWriter {
            writer,
            hasher: Hasher::new(),
            position: 0,
        }
    }

    /// Write raw bytes without length prefix.
    pub fn write_raw(&mut self, value: &[u8]) -> Result<()> {
        self.writer.write_all(value)?;
        self.hasher.update(value);
        self.position += value.len() as u64;
        Ok(())
    }

    /// Write a u8 value.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_raw(&[value])
    }

    /// Write a u32 value (little-endian).
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        let mut buf = Vec::with_capacity(4);
        buf.write_u32::<LittleEndian>(value)?;
        self.write_raw(&buf)
    }

    /// Write a u64 value (little-endian).
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        let mut buf = Vec::with_capacity(8);
        buf.write_u64::<LittleEndian>(value)?;
        self.write_raw(&buf)
    }

    /// Write an i64 value (little-endian, two's complement).
    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.write_u64(value as u64)
    }

    /// Write a VInt.
    pub fn write_vint(&mut self, value: u32) -> Result<()> {
        self.write_raw(&varint::encode_vint(value))
    }

    /// Write a VLong.
    pub fn write_vlong(&mut self, value: u64) -> Result<()> {
        self.write_raw(&varint::encode_vlong(value))
    }

    /// Write a string with length prefix.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Write raw bytes with length prefix.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        let len = u32::try_from(value.len())
            .map_err(|_| QuiverError::invalid_argument("byte string longer than u32::MAX"))?;
        self.write_vint(len)?;
        self.write_raw(value)
    }

    /// Write a string map as a count followed by key/value pairs in key order.
    pub fn write_string_map(&mut self, map: &BTreeMap<String, String>) -> Result<()> {
        self.write_vint(map.len() as u32)?;
        for (key, value) in map {
            self.write_string(key)?;
            self.write_string(value)?;
        }
        Ok(())
    }

    /// Get current file position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// CRC32 of every byte written so far.
    pub fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Flush and close the underlying output.
    pub fn close(mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.close()
    }
}

impl<W: StorageOutput> std::fmt::Debug for StructWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructWriter")
            .field("writer", &self.writer)
            .field("position", &self.position)
            .finish()
    }
}

impl<W: StorageOutput> Write for StructWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer.write_all(buf)?;
        self.hasher.update(buf);
        self.position += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// A structured file reader for binary data.
pub struct StructReader<R: StorageInput> {
    reader: R,
    hasher: Hasher,
    position: u64,
    file_size: u64,
    resource: String,
}

impl<R: StorageInput> StructReader<R> {
    /// Create a new structured file reader for the named resource.
    pub fn new(reader: R, resource: &str) -> Result<Self> {
        let file_size = reader.size()?;
        Ok(StructReader {
            reader,
            hasher: Hasher::new(),
            position: 0,
            file_size,
            resource: resource.to_string(),
        })
    }

    /// Name of the resource being read, for error messages.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Read exact number of raw bytes.
    pub fn read_raw(&mut self, length: usize) -> Result<Vec<u8>> {
        if length as u64 > self.remaining() {
            return Err(QuiverError::corrupt(
                &self.resource,
                format!("read of {length} bytes past end of file"),
            ));
        }
        let mut bytes = vec![0u8; length];
        self.reader.read_exact(&mut bytes)?;
        self.hasher.update(&bytes);
        self.position += length as u64;
        Ok(bytes)
    }

    /// Read a u8 value.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_raw(1)?[0])
    }

    /// Read a u32 value (little-endian).
    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_raw(4)?;
        Ok((&bytes[..]).read_u32::<LittleEndian>()?)
    }

    /// Read a u64 value (little-endian).
    pub fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.read_raw(8)?;
        Ok((&bytes[..]).read_u64::<LittleEndian>()?)
    }

    /// Read an i64 value (little-endian, two's complement).
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.read_u64()? as i64)
    }

    /// Read a VInt.
    pub fn read_vint(&mut self) -> Result<u32> {
        varint::read_vint(self).map_err(|e| self.annotate(e))
    }

    /// Read a VLong.
    pub fn read_vlong(&mut self) -> Result<u64> {
        varint::read_vlong(self).map_err(|e| self.annotate(e))
    }

    /// Read a string with length prefix.
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes)
            .map_err(|e| QuiverError::corrupt(&self.resource, format!("Invalid UTF-8: {e}")))
    }

    /// Read bytes with length prefix.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let length = self.read_vint()? as usize;
        self.read_raw(length)
    }

    /// Read a string map written by [`StructWriter::write_string_map`].
    pub fn read_string_map(&mut self) -> Result<BTreeMap<String, String>> {
        let count = self.read_vint()? as usize;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = self.read_string()?;
            let value = self.read_string()?;
            if map.insert(key, value).is_some() {
                return Err(QuiverError::corrupt(&self.resource, "duplicate map key"));
            }
        }
        Ok(map)
    }

    /// Get current file position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Get file size.
    pub fn size(&self) -> u64 {
        self.file_size
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> u64 {
        self.file_size.saturating_sub(self.position)
    }

    /// CRC32 of every byte read so far.
    pub fn checksum(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    fn annotate(&self, err: QuiverError) -> QuiverError {
        match err {
            QuiverError::CorruptIndex { message, .. } => {
                QuiverError::corrupt(&self.resource, message)
            }
            QuiverError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                QuiverError::corrupt(&self.resource, "unexpected end of file")
            }
            other => other,
        }
    }
}

impl<R: StorageInput> Read for StructReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.reader.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.position += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn test_struct_writer_reader() {
        let storage = MemoryStorage::new_default();

        let mut attributes = BTreeMap::new();
        attributes.insert("format".to_string(), "block".to_string());

        let written_checksum = {
            let output = storage.create_output("test.struct").unwrap();
            let mut writer = StructWriter::new(output);

            writer.write_u8(42).unwrap();
            writer.write_u32(5678).unwrap();
            writer.write_u64(9876543210).unwrap();
            writer.write_i64(-1).unwrap();
            writer.write_vint(12345).unwrap();
            writer.write_vlong(1 << 50).unwrap();
            writer.write_string("Hello, World!").unwrap();
            writer.write_bytes(b"\x00\xffbinary").unwrap();
            writer.write_string_map(&attributes).unwrap();

            let checksum = writer.checksum();
            writer.close().unwrap();
            checksum
        };

        let input = storage.open_input("test.struct").unwrap();
        let mut reader = StructReader::new(input, "test.struct").unwrap();

        assert_eq!(reader.read_u8().unwrap(), 42);
        assert_eq!(reader.read_u32().unwrap(), 5678);
        assert_eq!(reader.read_u64().unwrap(), 9876543210);
        assert_eq!(reader.read_i64().unwrap(), -1);
        assert_eq!(reader.read_vint().unwrap(), 12345);
        assert_eq!(reader.read_vlong().unwrap(), 1 << 50);
        assert_eq!(reader.read_string().unwrap(), "Hello, World!");
        assert_eq!(reader.read_bytes().unwrap(), b"\x00\xffbinary");
        assert_eq!(reader.read_string_map().unwrap(), attributes);

        assert_eq!(reader.remaining(), 0);
        assert_eq!(reader.checksum(), written_checksum);
    }

    #[test]
    fn test_checksum_covers_every_byte() {
        let storage = MemoryStorage::new_default();
        let mut a = StructWriter::new(storage.create_output("a").unwrap());
        let mut b = StructWriter::new(storage.create_output("b").unwrap());

        a.write_vint(1).unwrap();
        b.write_vint(2).unwrap();
        assert_ne!(a.checksum(), b.checksum());
        assert_eq!(a.checksum(), crc32fast::hash(&[1]));
    }

    #[test]
    fn test_read_past_end_is_corruption() {
        let storage = MemoryStorage::new_default();
        {
            let output = storage.create_output("short").unwrap();
            let mut writer = StructWriter::new(output);
            writer.write_vint(10).unwrap();
            writer.write_raw(b"abc").unwrap();
            writer.close().unwrap();
        }

        let input = storage.open_input("short").unwrap();
        let mut reader = StructReader::new(input, "short").unwrap();
        let err = reader.read_bytes().unwrap_err();
        assert!(err.is_corruption());
    }
}
