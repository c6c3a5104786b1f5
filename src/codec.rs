//! Codecs: how a segment's field metadata and postings are laid out on disk.
//!
//! A [`Codec`] pairs a [`FieldInfosFormat`] with a [`PostingsFormat`]. The
//! postings formats are a closed set:
//!
//! - **Block**: disk-resident term blocks, delta-coded postings with skip
//!   data and term ordinals.
//! - **Memory**: each field's terms in an output-sharing trie, decoded
//!   into RAM when the segment is opened.
//! - **RandomPerField**: a test format that picks one of a palette of formats
//!   per field from a persisted seed.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use quiver::codec::config::{CodecConfig, CodecRegistry};
//! use quiver::codec::field_infos::{FieldInfo, FieldInfos, IndexOptions};
//! use quiver::codec::segment::{SegmentReader, SegmentWriteState};
//! use quiver::codec::terms::{SeekStatus, TermStats};
//! use quiver::storage::{Storage, StorageConfig, StorageFactory};
//!
//! # fn main() -> quiver::error::Result<()> {
//! let storage = StorageFactory::create(StorageConfig::default())?;
//! let registry = CodecRegistry::from_config(&CodecConfig::default())?;
//! let codec = registry.default_codec()?;
//!
//! let field = FieldInfo::new("body", 0).indexed(IndexOptions::DocsAndFreqs);
//! let infos = Arc::new(FieldInfos::new(vec![field.clone()])?);
//! let state = SegmentWriteState::new(Arc::clone(&storage), "_0", 10, infos);
//!
//! let mut fields = codec.fields_consumer(&state)?;
//! {
//!     let mut terms = fields.add_field(&field)?;
//!     let postings = terms.start_term(b"quiver")?;
//!     postings.start_doc(3, 2)?;
//!     postings.finish_doc()?;
//!     terms.finish_term(b"quiver", TermStats::new(1, 2))?;
//!     terms.finish(2, 1, 1)?;
//! }
//! fields.close()?;
//! codec.write_segment(&state)?;
//!
//! let reader = SegmentReader::open(&registry, storage, "_0")?;
//! let terms = reader.terms("body")?.expect("indexed field");
//! let mut terms_enum = terms.iterator()?;
//! assert_eq!(terms_enum.seek_ceil(b"quiver")?, SeekStatus::Found);
//! assert_eq!(terms_enum.doc_freq()?, 1);
//! # Ok(())
//! # }
//! ```

use log::debug;

use crate::codec::block::BlockPostingsFormat;
use crate::codec::field_infos::FieldInfosFormat;
use crate::codec::fields::{FieldsConsumer, FieldsProducer};
use crate::codec::memory::MemoryPostingsFormat;
use crate::codec::random::RandomPerFieldPostingsFormat;
use crate::codec::segment::{SegmentInfo, SegmentReadState, SegmentWriteState};
use crate::error::Result;

pub mod block;
pub mod codec_util;
pub mod config;
pub mod field_infos;
pub mod fields;
pub mod memory;
pub mod posting_list;
pub mod postings;
pub mod random;
pub mod segment;
pub mod terms;

/// The postings formats a codec can be built from.
#[derive(Debug, Clone)]
pub enum PostingsFormat {
    Block(BlockPostingsFormat),
    Memory(MemoryPostingsFormat),
    RandomPerField(RandomPerFieldPostingsFormat),
}

impl PostingsFormat {
    pub fn name(&self) -> &'static str {
        match self {
            PostingsFormat::Block(_) => BlockPostingsFormat::NAME,
            PostingsFormat::Memory(_) => MemoryPostingsFormat::NAME,
            PostingsFormat::RandomPerField(_) => RandomPerFieldPostingsFormat::NAME,
        }
    }

    /// Open a writer for the segment's postings.
    pub fn fields_consumer(&self, state: &SegmentWriteState) -> Result<Box<dyn FieldsConsumer>> {
        match self {
            PostingsFormat::Block(format) => format.fields_consumer(state),
            PostingsFormat::Memory(format) => format.fields_consumer(state),
            PostingsFormat::RandomPerField(format) => format.fields_consumer(state),
        }
    }

    /// Open the segment's postings for reading.
    pub fn fields_producer(&self, state: &SegmentReadState) -> Result<Box<dyn FieldsProducer>> {
        match self {
            PostingsFormat::Block(format) => format.fields_producer(state),
            PostingsFormat::Memory(format) => format.fields_producer(state),
            PostingsFormat::RandomPerField(format) => format.fields_producer(state),
        }
    }
}

/// A named combination of formats, recorded in every segment it writes.
#[derive(Debug, Clone)]
pub struct Codec {
    name: String,
    postings_format: PostingsFormat,
    field_infos_format: FieldInfosFormat,
}

impl Codec {
    pub fn new<S: Into<String>>(
        name: S,
        postings_format: PostingsFormat,
        field_infos_format: FieldInfosFormat,
    ) -> Self {
        Codec {
            name: name.into(),
            postings_format,
            field_infos_format,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn postings_format(&self) -> &PostingsFormat {
        &self.postings_format
    }

    pub fn field_infos_format(&self) -> &FieldInfosFormat {
        &self.field_infos_format
    }

    /// Open a writer for the segment's postings.
    pub fn fields_consumer(&self, state: &SegmentWriteState) -> Result<Box<dyn FieldsConsumer>> {
        self.postings_format.fields_consumer(state)
    }

    /// Open the segment's postings for reading.
    pub fn fields_producer(&self, state: &SegmentReadState) -> Result<Box<dyn FieldsProducer>> {
        self.postings_format.fields_producer(state)
    }

    /// Write the field metadata and the segment descriptor.
    ///
    /// Called after the postings are sealed; the descriptor is written last.
    pub fn write_segment(&self, state: &SegmentWriteState) -> Result<()> {
        let storage = state.storage.as_ref();
        self.field_infos_format
            .write(storage, &state.segment, "", &state.field_infos)?;

        let info = SegmentInfo {
            name: state.segment.clone(),
            codec: self.name.clone(),
            max_doc: state.max_doc,
        };
        info.write(storage)?;

        debug!(
            "flushed segment {} with codec {} ({} docs, {} fields)",
            state.segment,
            self.name,
            state.max_doc,
            state.field_infos.len()
        );
        Ok(())
    }
}
