//! Disk-resident block postings format.
//!
//! Three files per segment:
//!
//! - `.tim`: the term dictionary. Terms are prefix-coded in blocks of
//!   `terms_index_interval` entries; each field keeps an index with the
//!   first term and file pointer of every block, and a directory at the end
//!   of the file locates each field's index.
//! - `.doc`: delta-coded doc ids with the frequency folded into the low bit,
//!   followed per term by single-level skip data.
//! - `.pos`: positions, payloads and offsets.
//!
//! ```text
//! .tim body:
//!   vint  skip interval
//!   vint  terms index interval
//!   term blocks and field indexes, interleaved per field:
//!     block:  vint count
//!             repeated: vint prefix, vint suffix length, suffix, vint doc_freq,
//!                       [vlong ttf - doc_freq], vlong doc fp delta,
//!                       [vlong pos fp delta], vlong skip offset (0 = none)
//!     index:  vint blocks, repeated: bytes first term, vlong block fp
//!   directory: vint fields
//!     repeated: vint number, u8 order, vlong terms, vlong sum_ttf + 1,
//!               vlong sum_df, vint doc_count, vlong index fp
//!   u64   directory fp
//! ```
//!
//! File pointers inside a block are delta-coded from zero at the start of
//! the block, so every block decodes on its own.

use crate::codec::config::BlockConfig;
use crate::codec::fields::{FieldsConsumer, FieldsProducer};
use crate::codec::segment::{SegmentReadState, SegmentWriteState};
use crate::error::Result;

mod reader;
mod writer;

pub use reader::{BlockFieldsReader, BlockTerms};
pub use writer::BlockFieldsWriter;

const TERMS_CODEC: &str = "QuiverBlockTerms";
const DOCS_CODEC: &str = "QuiverBlockDocs";
const POSITIONS_CODEC: &str = "QuiverBlockPositions";
const VERSION_START: u32 = 0;
const VERSION_CURRENT: u32 = VERSION_START;

const TERMS_EXTENSION: &str = "tim";
const DOCS_EXTENSION: &str = "doc";
const POSITIONS_EXTENSION: &str = "pos";

/// The block postings format.
#[derive(Debug, Clone)]
pub struct BlockPostingsFormat {
    config: BlockConfig,
}

impl BlockPostingsFormat {
    pub const NAME: &'static str = "Block";

    pub fn new(config: BlockConfig) -> Self {
        BlockPostingsFormat { config }
    }

    pub fn config(&self) -> BlockConfig {
        self.config
    }

    pub fn fields_consumer(&self, state: &SegmentWriteState) -> Result<Box<dyn FieldsConsumer>> {
        Ok(Box::new(BlockFieldsWriter::new(state, self.config)?))
    }

    pub fn fields_producer(&self, state: &SegmentReadState) -> Result<Box<dyn FieldsProducer>> {
        Ok(Box::new(BlockFieldsReader::open(state)?))
    }
}
