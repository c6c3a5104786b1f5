//! Codec headers, checksum footers and whole-file verification.
//!
//! Every codec file starts with a header:
//!
//! ```text
//! u32     magic     (0x3fd76c17)
//! string  codec name
//! vint    format version
//! ```
//!
//! and, for checksummed versions, ends with a footer:
//!
//! ```text
//! u32     footer magic (!0x3fd76c17)
//! u32     checksum algorithm (0 = CRC32)
//! u64     checksum of every preceding byte
//! ```

use std::io::Read;
use std::sync::Arc;

use crate::error::{QuiverError, Result};
use crate::storage::structured::{StructReader, StructWriter};
use crate::storage::{Storage, StorageInput, StorageOutput};
use crate::util::bytes::ByteCursor;

/// Magic number at the start of every codec file.
pub const CODEC_MAGIC: u32 = 0x3fd7_6c17;

/// Magic number at the start of every footer.
pub const FOOTER_MAGIC: u32 = !CODEC_MAGIC;

/// Footer length in bytes.
pub const FOOTER_LENGTH: u64 = 16;

const CRC32_ALGORITHM: u32 = 0;

/// Write a codec header.
pub fn write_header<W: StorageOutput>(
    writer: &mut StructWriter<W>,
    codec: &str,
    version: u32,
) -> Result<()> {
    writer.write_u32(CODEC_MAGIC)?;
    writer.write_string(codec)?;
    writer.write_vint(version)
}

/// Validate a codec header and return the stored version.
pub fn check_header<R: StorageInput>(
    reader: &mut StructReader<R>,
    codec: &str,
    min_version: u32,
    max_version: u32,
) -> Result<u32> {
    let magic = reader.read_u32()?;
    let actual = reader.read_string()?;
    let version = reader.read_vint()?;
    validate_header(reader.resource(), magic, &actual, version, codec, min_version, max_version)
}

fn validate_header(
    resource: &str,
    magic: u32,
    actual: &str,
    version: u32,
    codec: &str,
    min_version: u32,
    max_version: u32,
) -> Result<u32> {
    if magic != CODEC_MAGIC {
        return Err(QuiverError::corrupt(
            resource,
            format!("codec header mismatch: actual magic {magic:#x}, expected {CODEC_MAGIC:#x}"),
        ));
    }
    if actual != codec {
        return Err(QuiverError::corrupt(
            resource,
            format!("codec mismatch: actual codec {actual:?}, expected {codec:?}"),
        ));
    }
    if version < min_version || version > max_version {
        return Err(QuiverError::corrupt(
            resource,
            format!("unsupported format version {version} (supported {min_version}..={max_version})"),
        ));
    }
    Ok(version)
}

/// Write a checksum footer. Must be the last thing written to the file.
pub fn write_footer<W: StorageOutput>(writer: &mut StructWriter<W>) -> Result<()> {
    writer.write_u32(FOOTER_MAGIC)?;
    writer.write_u32(CRC32_ALGORITHM)?;
    let checksum = writer.checksum();
    writer.write_u64(checksum as u64)
}

/// Validate the checksum footer and that nothing follows it.
pub fn check_footer<R: StorageInput>(reader: &mut StructReader<R>) -> Result<u64> {
    if reader.remaining() < FOOTER_LENGTH {
        return Err(QuiverError::corrupt(
            reader.resource(),
            format!("misplaced codec footer: {} bytes remain", reader.remaining()),
        ));
    }

    let magic = reader.read_u32()?;
    if magic != FOOTER_MAGIC {
        return Err(QuiverError::corrupt(
            reader.resource(),
            format!("codec footer mismatch: actual magic {magic:#x}, expected {FOOTER_MAGIC:#x}"),
        ));
    }

    let algorithm = reader.read_u32()?;
    if algorithm != CRC32_ALGORITHM {
        return Err(QuiverError::corrupt(
            reader.resource(),
            format!("unknown checksum algorithm {algorithm}"),
        ));
    }

    let expected = reader.checksum() as u64;
    let actual = reader.read_u64()?;
    if actual != expected {
        return Err(QuiverError::corrupt(
            reader.resource(),
            format!("checksum failed: actual {actual:#x}, expected {expected:#x}"),
        ));
    }

    check_eof(reader)?;
    Ok(actual)
}

/// Validate that every byte of the file has been consumed.
pub fn check_eof<R: StorageInput>(reader: &StructReader<R>) -> Result<()> {
    if reader.remaining() != 0 {
        return Err(QuiverError::corrupt(
            reader.resource(),
            format!(
                "did not read all bytes: position {} of {}",
                reader.position(),
                reader.size()
            ),
        ));
    }
    Ok(())
}

/// A fully loaded, header- and footer-validated codec file.
#[derive(Debug, Clone)]
pub struct VerifiedFile {
    /// The whole file, header and footer included.
    pub data: Arc<[u8]>,
    /// Format version from the header.
    pub version: u32,
    /// Absolute offset of the first byte after the header.
    pub body_start: usize,
    /// Absolute offset of the first footer byte.
    pub body_end: usize,
}

/// Load a whole file into memory, validating its header and checksum footer.
///
/// Offsets recorded by a [`StructWriter`] while the file was written are
/// absolute positions into [`VerifiedFile::data`].
pub fn read_verified_file(
    storage: &dyn Storage,
    name: &str,
    codec: &str,
    min_version: u32,
    max_version: u32,
) -> Result<VerifiedFile> {
    let mut input = storage.open_input(name)?;
    let mut bytes = Vec::with_capacity(input.size()? as usize);
    input.read_to_end(&mut bytes)?;
    let data: Arc<[u8]> = Arc::from(bytes);

    let mut cursor = ByteCursor::over(Arc::clone(&data));
    let truncated = |_: QuiverError| QuiverError::corrupt(name, "truncated codec header");
    let magic = cursor.read_u32_le().map_err(truncated)?;
    let actual = cursor.read_bytes().map_err(truncated)?;
    let version = cursor.read_vint().map_err(truncated)?;
    let actual = String::from_utf8(actual)
        .map_err(|_| QuiverError::corrupt(name, "codec name is not UTF-8"))?;
    let version = validate_header(name, magic, &actual, version, codec, min_version, max_version)?;

    let body_start = cursor.position();
    let footer = FOOTER_LENGTH as usize;
    if data.len() < body_start + footer {
        return Err(QuiverError::corrupt(name, "file too short for a codec footer"));
    }
    let body_end = data.len() - footer;

    cursor.seek(body_end)?;
    let magic = cursor.read_u32_le()?;
    if magic != FOOTER_MAGIC {
        return Err(QuiverError::corrupt(
            name,
            format!("codec footer mismatch: actual magic {magic:#x}, expected {FOOTER_MAGIC:#x}"),
        ));
    }
    let algorithm = cursor.read_u32_le()?;
    if algorithm != CRC32_ALGORITHM {
        return Err(QuiverError::corrupt(
            name,
            format!("unknown checksum algorithm {algorithm}"),
        ));
    }
    let expected = crc32fast::hash(&data[..data.len() - 8]) as u64;
    let actual = cursor.read_u64_le()?;
    if actual != expected {
        return Err(QuiverError::corrupt(
            name,
            format!("checksum failed: actual {actual:#x}, expected {expected:#x}"),
        ));
    }

    Ok(VerifiedFile {
        data,
        version,
        body_start,
        body_end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    fn write_file(storage: &MemoryStorage, name: &str, version: u32, body: &[u8]) {
        let output = storage.create_output(name).unwrap();
        let mut writer = StructWriter::new(output);
        write_header(&mut writer, "TestCodec", version).unwrap();
        writer.write_raw(body).unwrap();
        write_footer(&mut writer).unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn test_header_footer_roundtrip() {
        let storage = MemoryStorage::new_default();
        write_file(&storage, "_0.test", 3, b"payload");

        let input = storage.open_input("_0.test").unwrap();
        let mut reader = StructReader::new(input, "_0.test").unwrap();
        assert_eq!(check_header(&mut reader, "TestCodec", 0, 5).unwrap(), 3);
        assert_eq!(reader.read_raw(7).unwrap(), b"payload");
        check_footer(&mut reader).unwrap();
    }

    #[test]
    fn test_wrong_codec_name() {
        let storage = MemoryStorage::new_default();
        write_file(&storage, "_0.test", 0, b"");

        let input = storage.open_input("_0.test").unwrap();
        let mut reader = StructReader::new(input, "_0.test").unwrap();
        let err = check_header(&mut reader, "OtherCodec", 0, 0).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_version_out_of_range() {
        let storage = MemoryStorage::new_default();
        write_file(&storage, "_0.test", 7, b"");

        let input = storage.open_input("_0.test").unwrap();
        let mut reader = StructReader::new(input, "_0.test").unwrap();
        assert!(check_header(&mut reader, "TestCodec", 0, 6).unwrap_err().is_corruption());
    }

    #[test]
    fn test_verified_file_offsets() {
        let storage = MemoryStorage::new_default();
        write_file(&storage, "_0.test", 1, b"abcdef");

        let file = read_verified_file(&storage, "_0.test", "TestCodec", 0, 1).unwrap();
        assert_eq!(file.version, 1);
        assert_eq!(&file.data[file.body_start..file.body_end], b"abcdef");
        assert_eq!(file.data.len() as u64, storage.file_size("_0.test").unwrap());
    }

    #[test]
    fn test_flipped_byte_fails_checksum() {
        let storage = MemoryStorage::new_default();
        write_file(&storage, "_0.test", 1, b"abcdef");

        let mut bytes = Vec::new();
        storage.open_input("_0.test").unwrap().read_to_end(&mut bytes).unwrap();
        let len = bytes.len();
        bytes[len - FOOTER_LENGTH as usize - 2] ^= 0x20;
        storage.replace_file("_0.test", bytes).unwrap();

        let err = read_verified_file(&storage, "_0.test", "TestCodec", 0, 1).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_missing_file_is_not_corruption() {
        let storage = MemoryStorage::new_default();
        let err = read_verified_file(&storage, "_9.test", "TestCodec", 0, 1).unwrap_err();
        assert!(err.is_not_found());
        assert!(!err.is_corruption());
    }
}
