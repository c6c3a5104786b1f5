//! # Quiver
//!
//! The codec layer of an inverted index: how a segment's field metadata, term
//! dictionaries and postings lists are written to and read from storage.
//!
//! ## Features
//!
//! - Field metadata records with checksummed headers and footers
//! - Pluggable postings formats behind one set of consumer/enumerator traits
//! - Block format with skip data and term ordinals, in-memory trie format,
//!   and a randomized per-field composite for testing
//! - Output-sharing trie algebra for compact term dictionaries
//! - Immutable segments with cheap, independent cursor clones

pub mod codec;
pub mod error;
pub mod outputs;
pub mod storage;
pub mod util;

pub mod prelude {
    pub use crate::codec::config::{CodecConfig, CodecRegistry};
    pub use crate::codec::field_infos::{FieldInfo, FieldInfos, IndexOptions};
    pub use crate::codec::fields::{FieldsConsumer, FieldsProducer};
    pub use crate::codec::postings::{
        DocId, DocsAndPositionsEnum, DocsEnum, LiveDocs, NO_MORE_DOCS, PostingsConsumer,
    };
    pub use crate::codec::segment::{SegmentReadState, SegmentReader, SegmentWriteState};
    pub use crate::codec::terms::{SeekStatus, TermOrder, TermStats, Terms, TermsConsumer, TermsEnum};
    pub use crate::codec::{Codec, PostingsFormat};
    pub use crate::error::{QuiverError, Result};
    pub use crate::storage::{Storage, StorageConfig, StorageFactory};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
