//! Segment descriptors, read/write state and the segment reader.

use std::sync::Arc;

use log::debug;

use crate::codec::codec_util;
use crate::codec::config::CodecRegistry;
use crate::codec::field_infos::FieldInfos;
use crate::codec::fields::FieldsProducer;
use crate::codec::terms::Terms;
use crate::error::Result;
use crate::storage::Storage;
use crate::storage::structured::{StructReader, StructWriter};

/// Name of a segment file: `<segment>[_<suffix>].<extension>`.
pub fn segment_file_name(segment: &str, suffix: &str, extension: &str) -> String {
    if suffix.is_empty() {
        format!("{segment}.{extension}")
    } else {
        format!("{segment}_{suffix}.{extension}")
    }
}

fn join_suffix(outer: &str, inner: &str) -> String {
    if outer.is_empty() {
        inner.to_string()
    } else {
        format!("{outer}_{inner}")
    }
}

/// Everything a format needs to write a segment.
#[derive(Debug, Clone)]
pub struct SegmentWriteState {
    pub storage: Arc<dyn Storage>,
    pub segment: String,
    pub segment_suffix: String,
    pub max_doc: u32,
    pub field_infos: Arc<FieldInfos>,
}

impl SegmentWriteState {
    pub fn new(
        storage: Arc<dyn Storage>,
        segment: &str,
        max_doc: u32,
        field_infos: Arc<FieldInfos>,
    ) -> Self {
        SegmentWriteState {
            storage,
            segment: segment.to_string(),
            segment_suffix: String::new(),
            max_doc,
            field_infos,
        }
    }

    /// The same state, writing files under an additional suffix.
    pub fn with_suffix(&self, suffix: &str) -> Self {
        SegmentWriteState {
            segment_suffix: join_suffix(&self.segment_suffix, suffix),
            ..self.clone()
        }
    }

    /// Name of this segment's file with the given extension.
    pub fn file_name(&self, extension: &str) -> String {
        segment_file_name(&self.segment, &self.segment_suffix, extension)
    }
}

/// Everything a format needs to open a segment.
#[derive(Debug, Clone)]
pub struct SegmentReadState {
    pub storage: Arc<dyn Storage>,
    pub segment: String,
    pub segment_suffix: String,
    pub field_infos: Arc<FieldInfos>,
}

impl SegmentReadState {
    pub fn new(storage: Arc<dyn Storage>, segment: &str, field_infos: Arc<FieldInfos>) -> Self {
        SegmentReadState {
            storage,
            segment: segment.to_string(),
            segment_suffix: String::new(),
            field_infos,
        }
    }

    /// The same state, reading files under an additional suffix.
    pub fn with_suffix(&self, suffix: &str) -> Self {
        SegmentReadState {
            segment_suffix: join_suffix(&self.segment_suffix, suffix),
            ..self.clone()
        }
    }

    /// Name of this segment's file with the given extension.
    pub fn file_name(&self, extension: &str) -> String {
        segment_file_name(&self.segment, &self.segment_suffix, extension)
    }
}

/// The descriptor of a sealed segment, stored as `<segment>.si`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    pub name: String,
    /// Name of the codec the segment was written with.
    pub codec: String,
    pub max_doc: u32,
}

const SEGMENT_INFO_CODEC: &str = "QuiverSegmentInfo";
const SEGMENT_INFO_EXTENSION: &str = "si";
const SEGMENT_INFO_VERSION: u32 = 0;

impl SegmentInfo {
    pub fn write(&self, storage: &dyn Storage) -> Result<()> {
        let name = segment_file_name(&self.name, "", SEGMENT_INFO_EXTENSION);
        let mut writer = StructWriter::new(storage.create_output(&name)?);
        codec_util::write_header(&mut writer, SEGMENT_INFO_CODEC, SEGMENT_INFO_VERSION)?;
        writer.write_string(&self.codec)?;
        writer.write_vint(self.max_doc)?;
        codec_util::write_footer(&mut writer)?;
        writer.close()
    }

    pub fn read(storage: &dyn Storage, segment: &str) -> Result<Self> {
        let name = segment_file_name(segment, "", SEGMENT_INFO_EXTENSION);
        let mut reader = StructReader::new(storage.open_input(&name)?, &name)?;
        codec_util::check_header(
            &mut reader,
            SEGMENT_INFO_CODEC,
            SEGMENT_INFO_VERSION,
            SEGMENT_INFO_VERSION,
        )?;
        let codec = reader.read_string()?;
        let max_doc = reader.read_vint()?;
        codec_util::check_footer(&mut reader)?;

        Ok(SegmentInfo {
            name: segment.to_string(),
            codec,
            max_doc,
        })
    }
}

/// Read access to a sealed segment.
#[derive(Debug)]
pub struct SegmentReader {
    info: SegmentInfo,
    field_infos: Arc<FieldInfos>,
    fields: Box<dyn FieldsProducer>,
}

impl SegmentReader {
    /// Open a segment, resolving its codec by name in `registry`.
    pub fn open(registry: &CodecRegistry, storage: Arc<dyn Storage>, segment: &str) -> Result<Self> {
        let info = SegmentInfo::read(storage.as_ref(), segment)?;
        let codec = registry.lookup(&info.codec)?;
        let field_infos = Arc::new(codec.field_infos_format().read(storage.as_ref(), segment, "")?);
        let state = SegmentReadState::new(storage, segment, Arc::clone(&field_infos));
        let fields = codec.fields_producer(&state)?;

        debug!(
            "opened segment {segment} (codec {}, {} docs, {} fields)",
            info.codec,
            info.max_doc,
            field_infos.len()
        );
        Ok(SegmentReader {
            info,
            field_infos,
            fields,
        })
    }

    pub fn info(&self) -> &SegmentInfo {
        &self.info
    }

    pub fn max_doc(&self) -> u32 {
        self.info.max_doc
    }

    pub fn field_infos(&self) -> &Arc<FieldInfos> {
        &self.field_infos
    }

    pub fn fields(&self) -> &dyn FieldsProducer {
        self.fields.as_ref()
    }

    /// The term dictionary of `field`; `None` for unknown or unindexed fields.
    pub fn terms(&self, field: &str) -> Result<Option<Arc<dyn Terms>>> {
        match self.field_infos.field_info(field) {
            Some(info) if info.indexed => self.fields.terms(field),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn test_file_names() {
        assert_eq!(segment_file_name("_0", "", "tim"), "_0.tim");
        assert_eq!(segment_file_name("_0", "Block0", "tim"), "_0_Block0.tim");
    }

    #[test]
    fn test_nested_suffix() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let state = SegmentWriteState::new(storage, "_3", 10, Arc::new(FieldInfos::default()));
        let nested = state.with_suffix("a").with_suffix("b");
        assert_eq!(nested.file_name("doc"), "_3_a_b.doc");
        assert_eq!(state.file_name("doc"), "_3.doc");
    }

    #[test]
    fn test_segment_info_roundtrip() {
        let storage = MemoryStorage::new_default();
        let info = SegmentInfo {
            name: "_7".to_string(),
            codec: "Memory".to_string(),
            max_doc: 1234,
        };
        info.write(&storage).unwrap();
        assert_eq!(SegmentInfo::read(&storage, "_7").unwrap(), info);
        assert!(SegmentInfo::read(&storage, "_8").unwrap_err().is_not_found());
    }
}
