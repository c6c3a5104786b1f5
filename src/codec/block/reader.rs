use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;

use crate::codec::codec_util::{self, VerifiedFile};
use crate::codec::field_infos::FieldInfo;
use crate::codec::fields::FieldsProducer;
use crate::codec::posting_list::{PostingLayout, PostingListEnum, SkipData};
use crate::codec::postings::{DocsAndPositionsEnum, DocsEnum, LiveDocs};
use crate::codec::segment::SegmentReadState;
use crate::codec::terms::{self, SeekStatus, TermOrder, Terms, TermsEnum};
use crate::error::{QuiverError, Result};
use crate::storage::Storage;
use crate::util::bytes::ByteCursor;

use super::{
    DOCS_CODEC, DOCS_EXTENSION, POSITIONS_CODEC, POSITIONS_EXTENSION, TERMS_CODEC,
    TERMS_EXTENSION, VERSION_CURRENT, VERSION_START,
};

#[derive(Debug)]
struct IndexEntry {
    first_term: Vec<u8>,
    fp: u64,
}

/// Immutable per-field state shared by every enum over the field.
#[derive(Debug, Clone)]
struct FieldData {
    layout: PostingLayout,
    order: TermOrder,
    num_terms: u64,
    terms_index_interval: u32,
    skip_interval: u32,
    index: Arc<[IndexEntry]>,
    terms: ByteCursor,
    docs: ByteCursor,
    positions: ByteCursor,
    resource: Arc<str>,
}

impl FieldData {
    fn corrupt(&self, message: impl Into<String>) -> QuiverError {
        QuiverError::corrupt(self.resource.as_ref(), message)
    }
}

fn load(storage: &dyn Storage, name: &str, codec: &str) -> Result<(VerifiedFile, ByteCursor)> {
    let file = codec_util::read_verified_file(storage, name, codec, VERSION_START, VERSION_CURRENT)?;
    let cursor = ByteCursor::new(Arc::clone(&file.data), file.body_start, file.body_end);
    Ok((file, cursor))
}

/// Reads a segment written in the block postings format.
#[derive(Debug)]
pub struct BlockFieldsReader {
    fields: BTreeMap<String, Arc<BlockTerms>>,
}

impl BlockFieldsReader {
    pub fn open(state: &SegmentReadState) -> Result<Self> {
        let storage = state.storage.as_ref();
        let name = state.file_name(TERMS_EXTENSION);
        let (terms_file, mut input) = load(storage, &name, TERMS_CODEC)?;
        let (_, docs) = load(storage, &state.file_name(DOCS_EXTENSION), DOCS_CODEC)?;
        let (_, positions) = load(storage, &state.file_name(POSITIONS_EXTENSION), POSITIONS_CODEC)?;

        let corrupt = |message: String| QuiverError::corrupt(&name, message);
        let map_eof = |e: QuiverError| {
            if e.is_corruption() {
                QuiverError::corrupt(&name, e.to_string())
            } else {
                e
            }
        };

        let skip_interval = input.read_vint().map_err(map_eof)?;
        let terms_index_interval = input.read_vint().map_err(map_eof)?;
        if terms_index_interval == 0 {
            return Err(corrupt("terms index interval is 0".to_string()));
        }

        if terms_file.body_end < terms_file.body_start + 8 {
            return Err(corrupt("missing field directory pointer".to_string()));
        }
        let mut tail = input.clone();
        tail.seek(terms_file.body_end - 8)?;
        let dir_fp = tail.read_u64_le()? as usize;
        let terms_in = ByteCursor::new(
            Arc::clone(&terms_file.data),
            terms_file.body_start,
            terms_file.body_end - 8,
        );

        let mut dir = terms_in.clone();
        dir.seek(dir_fp).map_err(map_eof)?;
        let num_fields = dir.read_vint().map_err(map_eof)?;
        let resource: Arc<str> = Arc::from(name.as_str());

        let mut fields = BTreeMap::new();
        for _ in 0..num_fields {
            let number = dir.read_vint().map_err(map_eof)?;
            let info = state
                .field_infos
                .field_info_by_number(number)
                .ok_or_else(|| corrupt(format!("unknown field number {number}")))?;
            let order = TermOrder::from_code(dir.read_u8().map_err(map_eof)?, &name)?;
            let num_terms = dir.read_vlong().map_err(map_eof)?;
            let sum_total_term_freq = dir.read_vlong().map_err(map_eof)? as i64 - 1;
            let sum_doc_freq = dir.read_vlong().map_err(map_eof)?;
            let doc_count = dir.read_vint().map_err(map_eof)?;
            let index_fp = dir.read_vlong().map_err(map_eof)? as usize;

            if num_terms == 0 || !info.indexed {
                return Err(corrupt(format!("field '{}' has no terms", info.name)));
            }

            let mut index_in = terms_in.clone();
            index_in.seek(index_fp).map_err(map_eof)?;
            let blocks = index_in.read_vint().map_err(map_eof)? as u64;
            if blocks != num_terms.div_ceil(terms_index_interval as u64) {
                return Err(corrupt(format!(
                    "field '{}': {blocks} blocks for {num_terms} terms",
                    info.name
                )));
            }
            let mut index = Vec::with_capacity(blocks as usize);
            for _ in 0..blocks {
                let first_term = index_in.read_bytes().map_err(map_eof)?;
                let fp = index_in.read_vlong().map_err(map_eof)?;
                index.push(IndexEntry { first_term, fp });
            }

            let data = FieldData {
                layout: PostingLayout::of(info),
                order,
                num_terms,
                terms_index_interval,
                skip_interval,
                index: Arc::from(index),
                terms: terms_in.clone(),
                docs: docs.clone(),
                positions: positions.clone(),
                resource: Arc::clone(&resource),
            };
            let previous = fields.insert(
                info.name.clone(),
                Arc::new(BlockTerms {
                    field: Arc::clone(info),
                    data,
                    sum_total_term_freq,
                    sum_doc_freq,
                    doc_count,
                }),
            );
            if previous.is_some() {
                return Err(corrupt(format!("field '{}' listed twice", info.name)));
            }
        }

        debug!("opened block postings {name} with {} fields", fields.len());
        Ok(BlockFieldsReader { fields })
    }
}

impl FieldsProducer for BlockFieldsReader {
    fn terms(&self, field: &str) -> Result<Option<Arc<dyn Terms>>> {
        Ok(self
            .fields
            .get(field)
            .map(|terms| Arc::clone(terms) as Arc<dyn Terms>))
    }

    fn fields(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    fn size(&self) -> usize {
        self.fields.len()
    }
}

/// The term dictionary of one field in the block format.
#[derive(Debug)]
pub struct BlockTerms {
    field: Arc<FieldInfo>,
    data: FieldData,
    sum_total_term_freq: i64,
    sum_doc_freq: u64,
    doc_count: u32,
}

impl BlockTerms {
    pub fn field(&self) -> &FieldInfo {
        &self.field
    }
}

impl Terms for BlockTerms {
    fn iterator(&self) -> Result<Box<dyn TermsEnum>> {
        Ok(Box::new(BlockTermsEnum::new(self.data.clone())))
    }

    fn size(&self) -> Option<u64> {
        Some(self.data.num_terms)
    }

    fn sum_total_term_freq(&self) -> i64 {
        self.sum_total_term_freq
    }

    fn sum_doc_freq(&self) -> u64 {
        self.sum_doc_freq
    }

    fn doc_count(&self) -> u32 {
        self.doc_count
    }

    fn order(&self) -> TermOrder {
        self.data.order
    }

    fn has_freqs(&self) -> bool {
        self.data.layout.has_freqs
    }

    fn has_positions(&self) -> bool {
        self.data.layout.has_positions
    }

    fn has_offsets(&self) -> bool {
        self.data.layout.has_offsets
    }

    fn has_payloads(&self) -> bool {
        self.data.layout.store_payloads
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct TermState {
    doc_freq: u32,
    total_term_freq: i64,
    doc_fp: u64,
    pos_fp: u64,
    skip_offset: u64,
}

#[derive(Debug, Clone)]
struct BlockTermsEnum {
    data: FieldData,
    input: ByteCursor,
    block: Option<usize>,
    block_len: u32,
    entries_read: u32,
    term: Vec<u8>,
    state: TermState,
    positioned: bool,
    exhausted: bool,
}

impl BlockTermsEnum {
    fn new(data: FieldData) -> Self {
        let input = data.terms.clone();
        BlockTermsEnum {
            data,
            input,
            block: None,
            block_len: 0,
            entries_read: 0,
            term: Vec::new(),
            state: TermState::default(),
            positioned: false,
            exhausted: false,
        }
    }

    fn load_block(&mut self, block: usize) -> Result<()> {
        let fp = self.data.index[block].fp as usize;
        self.input.seek(fp)?;
        self.block_len = self.input.read_vint()?;
        if self.block_len == 0 || self.block_len > self.data.terms_index_interval {
            return Err(self
                .data
                .corrupt(format!("term block {block} holds {} entries", self.block_len)));
        }
        self.block = Some(block);
        self.entries_read = 0;
        self.term.clear();
        self.state = TermState::default();
        self.exhausted = false;
        Ok(())
    }

    fn read_entry(&mut self) -> Result<()> {
        let layout = self.data.layout;
        let input = &mut self.input;

        let prefix = input.read_vint()? as usize;
        let suffix_len = input.read_vint()? as usize;
        if prefix > self.term.len() {
            return Err(self
                .data
                .corrupt(format!("term prefix {prefix} longer than previous term")));
        }
        self.term.truncate(prefix);
        self.term.extend_from_slice(input.read_slice(suffix_len)?);

        let state = &mut self.state;
        state.doc_freq = input.read_vint()?;
        state.total_term_freq = if layout.has_freqs {
            state.doc_freq as i64 + input.read_vlong()? as i64
        } else {
            -1
        };
        state.doc_fp += input.read_vlong()?;
        if layout.has_positions {
            state.pos_fp += input.read_vlong()?;
        }
        state.skip_offset = input.read_vlong()?;

        self.entries_read += 1;
        self.positioned = true;
        Ok(())
    }

    fn set_end(&mut self) {
        self.positioned = false;
        self.exhausted = true;
    }

    fn current_ord(&self) -> Option<u64> {
        let block = self.block?;
        Some(block as u64 * self.data.terms_index_interval as u64 + self.entries_read as u64 - 1)
    }

    fn postings(
        &self,
        live_docs: Option<&LiveDocs>,
        with_positions: bool,
    ) -> Result<PostingListEnum> {
        if !self.positioned {
            return Err(terms::unpositioned());
        }
        let state = self.state;
        let mut docs = self.data.docs.clone();
        docs.seek(state.doc_fp as usize)?;

        let skip_data = if state.skip_offset > 0 {
            let mut input = docs.clone();
            input.seek((state.doc_fp + state.skip_offset) as usize)?;
            Some(SkipData {
                interval: self.data.skip_interval,
                input,
            })
        } else {
            None
        };

        let positions = if with_positions {
            let mut positions = self.data.positions.clone();
            positions.seek(state.pos_fp as usize)?;
            Some(positions)
        } else {
            None
        };

        Ok(PostingListEnum::new(
            self.data.layout,
            state.doc_freq,
            docs,
            positions,
            skip_data,
            live_docs,
        ))
    }
}

impl TermsEnum for BlockTermsEnum {
    fn next(&mut self) -> Result<Option<&[u8]>> {
        if self.exhausted {
            return Ok(None);
        }
        let block = self.block;
        match block {
            None => self.load_block(0)?,
            Some(block) if self.entries_read >= self.block_len => {
                if block + 1 >= self.data.index.len() {
                    self.set_end();
                    return Ok(None);
                }
                self.load_block(block + 1)?;
            }
            Some(_) => {}
        }
        self.read_entry()?;
        Ok(Some(self.term.as_slice()))
    }

    fn seek_ceil(&mut self, target: &[u8]) -> Result<SeekStatus> {
        let order = self.data.order;
        let blocks = self
            .data
            .index
            .partition_point(|entry| order.compare(&entry.first_term, target).is_le());

        self.load_block(blocks.saturating_sub(1))?;
        loop {
            if self.entries_read >= self.block_len {
                let next = self.block.map_or(0, |block| block + 1);
                if next >= self.data.index.len() {
                    self.set_end();
                    return Ok(SeekStatus::End);
                }
                self.load_block(next)?;
            }
            self.read_entry()?;
            match order.compare(&self.term, target) {
                std::cmp::Ordering::Less => continue,
                std::cmp::Ordering::Equal => return Ok(SeekStatus::Found),
                std::cmp::Ordering::Greater => return Ok(SeekStatus::NotFound),
            }
        }
    }

    fn term(&self) -> Option<&[u8]> {
        self.positioned.then_some(self.term.as_slice())
    }

    fn ord(&self) -> Result<u64> {
        match self.current_ord() {
            Some(ord) if self.positioned => Ok(ord),
            _ => Err(terms::unpositioned()),
        }
    }

    fn seek_exact_ord(&mut self, ord: u64) -> Result<()> {
        if ord >= self.data.num_terms {
            return Err(QuiverError::invalid_argument(format!(
                "ord {ord} out of range for {} terms",
                self.data.num_terms
            )));
        }
        let interval = self.data.terms_index_interval as u64;
        self.load_block((ord / interval) as usize)?;
        for _ in 0..=(ord % interval) {
            if self.entries_read >= self.block_len {
                return Err(self.data.corrupt(format!("term block too short for ord {ord}")));
            }
            self.read_entry()?;
        }
        Ok(())
    }

    fn doc_freq(&self) -> Result<u32> {
        if !self.positioned {
            return Err(terms::unpositioned());
        }
        Ok(self.state.doc_freq)
    }

    fn total_term_freq(&self) -> Result<i64> {
        if !self.positioned {
            return Err(terms::unpositioned());
        }
        Ok(self.state.total_term_freq)
    }

    fn docs(&self, live_docs: Option<&LiveDocs>) -> Result<Box<dyn DocsEnum>> {
        Ok(Box::new(self.postings(live_docs, false)?))
    }

    fn docs_and_positions(
        &self,
        live_docs: Option<&LiveDocs>,
    ) -> Result<Option<Box<dyn DocsAndPositionsEnum>>> {
        if !self.data.layout.has_positions {
            return Ok(None);
        }
        Ok(Some(Box::new(self.postings(live_docs, true)?)))
    }

    fn box_clone(&self) -> Box<dyn TermsEnum> {
        Box::new(self.clone())
    }
}
