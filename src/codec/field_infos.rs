//! Per-field metadata and its on-disk format (`.fnm`).
//!
//! One [`FieldInfo`] is written per field when a segment is flushed and read
//! back verbatim by every later opener.
//!
//! # File layout
//!
//! ```text
//! header("QuiverFieldInfos", version)
//! vint    field count
//! repeated:
//!   string  name
//!   vint    number
//!   u8      flags         bit0 indexed, bit1 term vectors, bit2 omit norms, bit3 payloads
//!   u8      options       bit0 omit freqs+positions, bit1 omit positions, bit2 offsets
//!   u8      doc values    low nibble doc values type, high nibble norms type
//!   i64     doc values generation
//!   map     attributes
//! footer                  (version >= checksum version, else exact EOF)
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::AHashMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::codec::codec_util;
use crate::codec::config::FieldInfosConfig;
use crate::codec::segment::segment_file_name;
use crate::codec::terms::TermOrder;
use crate::error::{QuiverError, Result};
use crate::storage::Storage;
use crate::storage::structured::{StructReader, StructWriter};

/// Codec name written in the `.fnm` header.
pub const CODEC_NAME: &str = "QuiverFieldInfos";

/// File extension of field metadata files.
pub const EXTENSION: &str = "fnm";

/// First format version; no checksum footer.
pub const FORMAT_START: u32 = 0;

/// First format version with a checksum footer.
pub const FORMAT_CHECKSUM: u32 = 1;

/// Current format version.
pub const FORMAT_CURRENT: u32 = FORMAT_CHECKSUM;

const IS_INDEXED: u8 = 0x1;
const STORE_TERMVECTOR: u8 = 0x2;
const OMIT_NORMS: u8 = 0x4;
const STORE_PAYLOADS: u8 = 0x8;

const OMIT_TERM_FREQ_AND_POSITIONS: u8 = 0x1;
const OMIT_POSITIONS: u8 = 0x2;
const STORE_OFFSETS_IN_POSTINGS: u8 = 0x4;

/// How much of the postings is recorded for a field.
///
/// Each level includes everything the lower levels record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum IndexOptions {
    /// Not indexed.
    #[default]
    None,
    /// Only document ids.
    DocsOnly,
    /// Document ids and term frequencies.
    DocsAndFreqs,
    /// Document ids, frequencies and positions.
    DocsAndFreqsAndPositions,
    /// Document ids, frequencies, positions and offsets.
    DocsAndFreqsAndPositionsAndOffsets,
}

impl IndexOptions {
    /// Whether term frequencies are recorded.
    pub fn has_freqs(self) -> bool {
        self >= IndexOptions::DocsAndFreqs
    }

    /// Whether positions are recorded.
    pub fn has_positions(self) -> bool {
        self >= IndexOptions::DocsAndFreqsAndPositions
    }

    /// Whether offsets are recorded.
    pub fn has_offsets(self) -> bool {
        self >= IndexOptions::DocsAndFreqsAndPositionsAndOffsets
    }
}

/// Type of a per-document value store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocValuesType {
    /// A single 64-bit number per document.
    Numeric,
    /// An arbitrary byte string per document.
    Binary,
    /// A single deduplicated, sorted byte string per document.
    Sorted,
    /// A set of deduplicated, sorted byte strings per document.
    SortedSet,
}

impl DocValuesType {
    /// Wire code of an optional doc values type; `0` means none.
    pub fn code(value: Option<DocValuesType>) -> u8 {
        match value {
            None => 0,
            Some(DocValuesType::Numeric) => 1,
            Some(DocValuesType::Binary) => 2,
            Some(DocValuesType::Sorted) => 3,
            Some(DocValuesType::SortedSet) => 4,
        }
    }

    /// Decode a wire code. Unknown codes are a format error.
    pub fn from_code(code: u8, resource: &str) -> Result<Option<DocValuesType>> {
        match code {
            0 => Ok(None),
            1 => Ok(Some(DocValuesType::Numeric)),
            2 => Ok(Some(DocValuesType::Binary)),
            3 => Ok(Some(DocValuesType::Sorted)),
            4 => Ok(Some(DocValuesType::SortedSet)),
            _ => Err(QuiverError::corrupt(
                resource,
                format!("invalid doc values type byte: {code}"),
            )),
        }
    }
}

/// Metadata of a single field within a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Field name, unique within the segment.
    pub name: String,
    /// Stable field number, unique within the segment.
    pub number: u32,
    /// Whether the field is indexed.
    pub indexed: bool,
    /// Whether term vectors are stored.
    pub store_term_vectors: bool,
    /// Whether norms are omitted.
    pub omit_norms: bool,
    /// Whether positions carry payloads.
    pub store_payloads: bool,
    /// Postings detail level.
    pub index_options: IndexOptions,
    /// Type of the field's doc values, if any.
    pub doc_values_type: Option<DocValuesType>,
    /// Type of the field's norms, if any.
    pub norms_type: Option<DocValuesType>,
    /// Doc values generation, `-1` when never updated.
    pub doc_values_gen: i64,
    /// Free-form string attributes.
    pub attributes: BTreeMap<String, String>,
}

impl FieldInfo {
    /// Attribute naming the field's term order (`"natural"` or `"reverse"`).
    pub const TERM_ORDER_ATTRIBUTE: &'static str = "quiver.term_order";

    /// Create an unindexed field with default flags.
    pub fn new<S: Into<String>>(name: S, number: u32) -> Self {
        FieldInfo {
            name: name.into(),
            number,
            indexed: false,
            store_term_vectors: false,
            omit_norms: false,
            store_payloads: false,
            index_options: IndexOptions::None,
            doc_values_type: None,
            norms_type: None,
            doc_values_gen: -1,
            attributes: BTreeMap::new(),
        }
    }

    /// Mark the field as indexed with the given options.
    pub fn indexed(mut self, options: IndexOptions) -> Self {
        self.indexed = options != IndexOptions::None;
        self.index_options = options;
        self
    }

    /// Store payloads with positions.
    pub fn with_payloads(mut self) -> Self {
        self.store_payloads = true;
        self
    }

    /// Store term vectors.
    pub fn with_term_vectors(mut self) -> Self {
        self.store_term_vectors = true;
        self
    }

    /// Omit norms.
    pub fn omitting_norms(mut self) -> Self {
        self.omit_norms = true;
        self
    }

    /// Attach doc values of the given type.
    pub fn with_doc_values(mut self, doc_values_type: DocValuesType, generation: i64) -> Self {
        self.doc_values_type = Some(doc_values_type);
        self.doc_values_gen = generation;
        self
    }

    /// Attach norms of the given type.
    pub fn with_norms_type(mut self, norms_type: DocValuesType) -> Self {
        self.norms_type = Some(norms_type);
        self
    }

    /// Set a string attribute.
    pub fn with_attribute<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Set the order terms of this field are stored in.
    pub fn with_term_order(self, order: TermOrder) -> Self {
        self.with_attribute(Self::TERM_ORDER_ATTRIBUTE, order.as_str())
    }

    /// The field's term order, natural byte order unless configured.
    pub fn term_order(&self) -> TermOrder {
        self.attributes
            .get(Self::TERM_ORDER_ATTRIBUTE)
            .and_then(|value| TermOrder::parse(value))
            .unwrap_or_default()
    }

    /// Whether the field has norms.
    pub fn has_norms(&self) -> bool {
        self.indexed && !self.omit_norms
    }

    /// Check the invariants tying the flags together.
    pub fn validate(&self) -> Result<()> {
        if !self.indexed {
            if self.index_options != IndexOptions::None {
                return Err(QuiverError::invalid_argument(format!(
                    "field '{}' is not indexed but has index options {:?}",
                    self.name, self.index_options
                )));
            }
        } else if self.index_options == IndexOptions::None {
            return Err(QuiverError::invalid_argument(format!(
                "field '{}' is indexed but has no index options",
                self.name
            )));
        }
        if self.store_payloads && !self.index_options.has_positions() {
            return Err(QuiverError::invalid_argument(format!(
                "field '{}' stores payloads without positions",
                self.name
            )));
        }
        Ok(())
    }

    fn flag_bytes(&self) -> (u8, u8) {
        let mut flags = 0;
        if self.indexed {
            flags |= IS_INDEXED;
        }
        if self.store_term_vectors {
            flags |= STORE_TERMVECTOR;
        }
        if self.omit_norms {
            flags |= OMIT_NORMS;
        }
        if self.store_payloads {
            flags |= STORE_PAYLOADS;
        }

        let options = match self.index_options {
            IndexOptions::None | IndexOptions::DocsAndFreqsAndPositions => 0,
            IndexOptions::DocsOnly => OMIT_TERM_FREQ_AND_POSITIONS,
            IndexOptions::DocsAndFreqs => OMIT_POSITIONS,
            IndexOptions::DocsAndFreqsAndPositionsAndOffsets => STORE_OFFSETS_IN_POSTINGS,
        };
        (flags, options)
    }

    fn index_options_from_bytes(indexed: bool, options: u8, resource: &str) -> Result<IndexOptions> {
        if !indexed {
            return if options == 0 {
                Ok(IndexOptions::None)
            } else {
                Err(QuiverError::corrupt(
                    resource,
                    format!("unindexed field with index option bits {options:#x}"),
                ))
            };
        }
        Ok(if options & OMIT_TERM_FREQ_AND_POSITIONS != 0 {
            IndexOptions::DocsOnly
        } else if options & OMIT_POSITIONS != 0 {
            IndexOptions::DocsAndFreqs
        } else if options & STORE_OFFSETS_IN_POSTINGS != 0 {
            IndexOptions::DocsAndFreqsAndPositionsAndOffsets
        } else {
            IndexOptions::DocsAndFreqsAndPositions
        })
    }
}

/// The ordered collection of field metadata of one segment.
#[derive(Debug, Clone, Default)]
pub struct FieldInfos {
    by_number: Vec<Arc<FieldInfo>>,
    by_name: AHashMap<String, usize>,
}

impl FieldInfos {
    /// Build from a list of fields. Duplicate names or numbers are rejected.
    pub fn new(fields: Vec<FieldInfo>) -> Result<Self> {
        let mut by_number: Vec<Arc<FieldInfo>> = Vec::with_capacity(fields.len());
        for field in fields {
            field.validate()?;
            by_number.push(Arc::new(field));
        }
        by_number.sort_by_key(|field| field.number);

        let mut by_name = AHashMap::with_capacity(by_number.len());
        for (i, field) in by_number.iter().enumerate() {
            if i > 0 && by_number[i - 1].number == field.number {
                return Err(QuiverError::invalid_argument(format!(
                    "duplicate field number {} ('{}' and '{}')",
                    field.number,
                    by_number[i - 1].name,
                    field.name
                )));
            }
            if by_name.insert(field.name.clone(), i).is_some() {
                return Err(QuiverError::invalid_argument(format!(
                    "duplicate field name '{}'",
                    field.name
                )));
            }
        }

        Ok(FieldInfos { by_number, by_name })
    }

    /// Look up a field by name.
    pub fn field_info(&self, name: &str) -> Option<&Arc<FieldInfo>> {
        self.by_name.get(name).map(|&i| &self.by_number[i])
    }

    /// Look up a field by number.
    pub fn field_info_by_number(&self, number: u32) -> Option<&Arc<FieldInfo>> {
        self.by_number
            .binary_search_by_key(&number, |field| field.number)
            .ok()
            .map(|i| &self.by_number[i])
    }

    /// Iterate over fields in number order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<FieldInfo>> {
        self.by_number.iter()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    /// Whether there are no fields.
    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }

    /// Whether any field records frequencies.
    pub fn has_freqs(&self) -> bool {
        self.iter().any(|f| f.index_options.has_freqs())
    }

    /// Whether any field records positions.
    pub fn has_positions(&self) -> bool {
        self.iter().any(|f| f.index_options.has_positions())
    }

    /// Whether any field records offsets.
    pub fn has_offsets(&self) -> bool {
        self.iter().any(|f| f.index_options.has_offsets())
    }

    /// Whether any field stores payloads.
    pub fn has_payloads(&self) -> bool {
        self.iter().any(|f| f.store_payloads)
    }

    /// Whether any field stores term vectors.
    pub fn has_vectors(&self) -> bool {
        self.iter().any(|f| f.store_term_vectors)
    }

    /// Whether any field has norms.
    pub fn has_norms(&self) -> bool {
        self.iter().any(|f| f.has_norms())
    }

    /// Whether any field has doc values.
    pub fn has_doc_values(&self) -> bool {
        self.iter().any(|f| f.doc_values_type.is_some())
    }
}

impl PartialEq for FieldInfos {
    fn eq(&self, other: &Self) -> bool {
        self.by_number == other.by_number
    }
}

/// Reads and writes [`FieldInfos`] as `<segment>.fnm`.
#[derive(Debug, Clone)]
pub struct FieldInfosFormat {
    write_version: u32,
    checksum_version: u32,
}

impl FieldInfosFormat {
    /// Create a format using the configured version thresholds.
    pub fn new(config: &FieldInfosConfig) -> Self {
        FieldInfosFormat {
            write_version: config.write_version.min(FORMAT_CURRENT),
            checksum_version: config.checksum_version,
        }
    }

    /// Write the field metadata of a segment.
    pub fn write(
        &self,
        storage: &dyn Storage,
        segment: &str,
        segment_suffix: &str,
        infos: &FieldInfos,
    ) -> Result<()> {
        let name = segment_file_name(segment, segment_suffix, EXTENSION);
        let output = storage.create_output(&name)?;
        let mut writer = StructWriter::new(output);

        codec_util::write_header(&mut writer, CODEC_NAME, self.write_version)?;
        writer.write_vint(infos.len() as u32)?;
        for field in infos.iter() {
            let (flags, options) = field.flag_bytes();
            let dv_packed = DocValuesType::code(field.doc_values_type)
                | (DocValuesType::code(field.norms_type) << 4);

            writer.write_string(&field.name)?;
            writer.write_vint(field.number)?;
            writer.write_u8(flags)?;
            writer.write_u8(options)?;
            writer.write_u8(dv_packed)?;
            writer.write_i64(field.doc_values_gen)?;
            writer.write_string_map(&field.attributes)?;
        }
        if self.write_version >= self.checksum_version {
            codec_util::write_footer(&mut writer)?;
        }
        writer.close()?;

        debug!("wrote {} field infos to {name}", infos.len());
        Ok(())
    }

    /// Read the field metadata of a segment.
    pub fn read(
        &self,
        storage: &dyn Storage,
        segment: &str,
        segment_suffix: &str,
    ) -> Result<FieldInfos> {
        let name = segment_file_name(segment, segment_suffix, EXTENSION);
        let input = storage.open_input(&name)?;
        let mut reader = StructReader::new(input, &name)?;

        let version = codec_util::check_header(&mut reader, CODEC_NAME, FORMAT_START, FORMAT_CURRENT)?;
        let count = reader.read_vint()? as usize;
        let mut fields = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let field_name = reader.read_string()?;
            let number = reader.read_vint()?;
            let flags = reader.read_u8()?;
            let options = reader.read_u8()?;
            let dv_packed = reader.read_u8()?;
            let doc_values_gen = reader.read_i64()?;
            let attributes = reader.read_string_map()?;

            let indexed = flags & IS_INDEXED != 0;
            let field = FieldInfo {
                name: field_name,
                number,
                indexed,
                store_term_vectors: flags & STORE_TERMVECTOR != 0,
                omit_norms: flags & OMIT_NORMS != 0,
                store_payloads: flags & STORE_PAYLOADS != 0,
                index_options: FieldInfo::index_options_from_bytes(indexed, options, &name)?,
                doc_values_type: DocValuesType::from_code(dv_packed & 0x0F, &name)?,
                norms_type: DocValuesType::from_code(dv_packed >> 4, &name)?,
                doc_values_gen,
                attributes,
            };
            fields.push(field);
        }

        if version >= self.checksum_version {
            codec_util::check_footer(&mut reader)?;
        } else {
            warn!("{name} has pre-checksum format version {version}; validating by end of file only");
            codec_util::check_eof(&reader)?;
        }

        FieldInfos::new(fields).map_err(|e| QuiverError::corrupt(&name, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    fn sample_fields() -> Vec<FieldInfo> {
        vec![
            FieldInfo::new("body", 0)
                .indexed(IndexOptions::DocsAndFreqsAndPositions)
                .with_payloads(),
            FieldInfo::new("title", 1)
                .indexed(IndexOptions::DocsAndFreqsAndPositionsAndOffsets)
                .with_term_vectors()
                .with_norms_type(DocValuesType::Numeric)
                .with_attribute("analyzer", "standard"),
            FieldInfo::new("id", 2).indexed(IndexOptions::DocsOnly).omitting_norms(),
            FieldInfo::new("price", 3).with_doc_values(DocValuesType::SortedSet, 4),
        ]
    }

    #[test]
    fn test_index_options_ordering() {
        assert!(IndexOptions::None < IndexOptions::DocsOnly);
        assert!(IndexOptions::DocsAndFreqs.has_freqs());
        assert!(!IndexOptions::DocsAndFreqs.has_positions());
        assert!(IndexOptions::DocsAndFreqsAndPositionsAndOffsets.has_offsets());
    }

    #[test]
    fn test_lookup() {
        let infos = FieldInfos::new(sample_fields()).unwrap();
        assert_eq!(infos.len(), 4);
        assert_eq!(infos.field_info("title").unwrap().number, 1);
        assert_eq!(infos.field_info_by_number(2).unwrap().name, "id");
        assert!(infos.field_info("missing").is_none());
        assert!(infos.has_positions());
        assert!(infos.has_offsets());
        assert!(infos.has_payloads());
        assert!(infos.has_doc_values());
    }

    #[test]
    fn test_duplicates_rejected() {
        let dup_name = vec![FieldInfo::new("a", 0), FieldInfo::new("a", 1)];
        assert!(FieldInfos::new(dup_name).is_err());

        let dup_number = vec![FieldInfo::new("a", 0), FieldInfo::new("b", 0)];
        assert!(FieldInfos::new(dup_number).is_err());
    }

    #[test]
    fn test_invalid_flags_rejected() {
        let mut field = FieldInfo::new("a", 0);
        field.index_options = IndexOptions::DocsOnly;
        assert!(field.validate().is_err());

        let payloads_without_positions = FieldInfo::new("b", 0)
            .indexed(IndexOptions::DocsAndFreqs)
            .with_payloads();
        assert!(payloads_without_positions.validate().is_err());
    }

    #[test]
    fn test_write_read() {
        let storage = MemoryStorage::new_default();
        let format = FieldInfosFormat::new(&FieldInfosConfig::default());
        let infos = FieldInfos::new(sample_fields()).unwrap();

        format.write(&storage, "_0", "", &infos).unwrap();
        let read = format.read(&storage, "_0", "").unwrap();

        assert_eq!(read, infos);
        assert_eq!(
            read.field_info("title").unwrap().attributes.get("analyzer").map(String::as_str),
            Some("standard")
        );
        assert_eq!(read.field_info("price").unwrap().doc_values_gen, 4);
    }

    #[test]
    fn test_term_order_attribute() {
        let field = FieldInfo::new("tags", 0)
            .indexed(IndexOptions::DocsOnly)
            .with_term_order(TermOrder::Reverse);
        assert_eq!(field.term_order(), TermOrder::Reverse);
        assert_eq!(FieldInfo::new("plain", 1).term_order(), TermOrder::Natural);
    }

    #[test]
    fn test_pre_checksum_version() {
        let storage = MemoryStorage::new_default();
        let legacy = FieldInfosFormat::new(&FieldInfosConfig {
            write_version: FORMAT_START,
            ..FieldInfosConfig::default()
        });
        let infos = FieldInfos::new(sample_fields()).unwrap();

        legacy.write(&storage, "_1", "", &infos).unwrap();
        let current = FieldInfosFormat::new(&FieldInfosConfig::default());
        assert_eq!(current.read(&storage, "_1", "").unwrap(), infos);
    }

    #[test]
    fn test_pre_checksum_trailing_garbage() {
        let storage = MemoryStorage::new_default();
        let legacy = FieldInfosFormat::new(&FieldInfosConfig {
            write_version: FORMAT_START,
            ..FieldInfosConfig::default()
        });
        legacy
            .write(&storage, "_2", "", &FieldInfos::new(sample_fields()).unwrap())
            .unwrap();

        let mut bytes = Vec::new();
        std::io::Read::read_to_end(&mut storage.open_input("_2.fnm").unwrap(), &mut bytes).unwrap();
        bytes.push(0);
        storage.replace_file("_2.fnm", bytes).unwrap();

        let err = legacy.read(&storage, "_2", "").unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_unknown_doc_values_type() {
        assert!(DocValuesType::from_code(9, "_0.fnm").unwrap_err().is_corruption());
        assert_eq!(DocValuesType::from_code(3, "_0.fnm").unwrap(), Some(DocValuesType::Sorted));
    }
}
