//! In-memory postings format.
//!
//! Each field's terms are stored in an [`OutputTrie`] over
//! [`ByteSequenceOutputs`]: the output of a term is its encoded postings, so
//! terms sharing a prefix with similar postings share bytes on disk. Opening
//! a segment decodes every field into RAM; enumeration never touches storage.
//!
//! ```text
//! .mem body:
//!   vint  fields
//!   repeated per field:
//!     vint number, u8 order, vlong terms, vlong sum_ttf + 1, vlong sum_df,
//!     vint doc_count, vlong trie length, trie
//! trie output per term:
//!   vint doc_freq, [vlong ttf - doc_freq], vint docs length, docs, positions
//! ```
//!
//! Terms have no ordinals in this format.

use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::AHashSet;
use log::{debug, trace};

use crate::codec::codec_util;
use crate::codec::field_infos::FieldInfo;
use crate::codec::fields::{FieldsConsumer, FieldsProducer};
use crate::codec::posting_list::{PostingLayout, PostingListEnum, PostingListWriter};
use crate::codec::postings::{DocsAndPositionsEnum, DocsEnum, LiveDocs, PostingsConsumer};
use crate::codec::segment::{SegmentReadState, SegmentWriteState};
use crate::codec::terms::{self, SeekStatus, TermOrder, TermStats, Terms, TermsConsumer, TermsEnum};
use crate::error::{QuiverError, Result};
use crate::outputs::{ByteSequenceOutputs, OutputTrie};
use crate::storage::structured::StructWriter;
use crate::util::bytes::ByteCursor;
use crate::util::varint;

const CODEC: &str = "QuiverMemoryPostings";
const EXTENSION: &str = "mem";
const VERSION_START: u32 = 0;
const VERSION_CURRENT: u32 = VERSION_START;

/// The in-memory postings format.
#[derive(Debug, Clone, Default)]
pub struct MemoryPostingsFormat;

impl MemoryPostingsFormat {
    pub const NAME: &'static str = "Memory";

    pub fn new() -> Self {
        MemoryPostingsFormat
    }

    pub fn fields_consumer(&self, state: &SegmentWriteState) -> Result<Box<dyn FieldsConsumer>> {
        Ok(Box::new(MemoryFieldsWriter::new(state)))
    }

    pub fn fields_producer(&self, state: &SegmentReadState) -> Result<Box<dyn FieldsProducer>> {
        Ok(Box::new(MemoryFieldsReader::open(state)?))
    }
}

/// Buffers every field and writes the segment on close.
#[derive(Debug)]
pub struct MemoryFieldsWriter {
    state: SegmentWriteState,
    sections: BTreeMap<u32, Vec<u8>>,
    added: AHashSet<u32>,
}

impl MemoryFieldsWriter {
    fn new(state: &SegmentWriteState) -> Self {
        MemoryFieldsWriter {
            state: state.clone(),
            sections: BTreeMap::new(),
            added: AHashSet::new(),
        }
    }
}

impl FieldsConsumer for MemoryFieldsWriter {
    fn add_field(&mut self, field: &FieldInfo) -> Result<Box<dyn TermsConsumer + '_>> {
        if !field.indexed {
            return Err(QuiverError::invalid_argument(format!(
                "field '{}' is not indexed",
                field.name
            )));
        }
        assert!(
            self.added.insert(field.number),
            "field '{}' added twice",
            field.name
        );
        let postings = PostingListWriter::new(field, self.state.max_doc, 0);
        Ok(Box::new(MemoryTermsWriter {
            owner: self,
            field: field.name.clone(),
            number: field.number,
            order: field.term_order(),
            postings,
            trie: OutputTrie::new(ByteSequenceOutputs::new()),
        }))
    }

    fn close(self: Box<Self>) -> Result<()> {
        let name = self.state.file_name(EXTENSION);
        let mut out = StructWriter::new(self.state.storage.create_output(&name)?);
        codec_util::write_header(&mut out, CODEC, VERSION_CURRENT)?;
        out.write_vint(self.sections.len() as u32)?;
        for section in self.sections.values() {
            out.write_raw(section)?;
        }
        codec_util::write_footer(&mut out)?;
        let size = out.position();
        out.close()?;

        debug!(
            "wrote memory postings {name}: {} fields, {size} bytes",
            self.sections.len()
        );
        Ok(())
    }
}

struct MemoryTermsWriter<'a> {
    owner: &'a mut MemoryFieldsWriter,
    field: String,
    number: u32,
    order: TermOrder,
    postings: PostingListWriter,
    trie: OutputTrie<ByteSequenceOutputs>,
}

impl TermsConsumer for MemoryTermsWriter<'_> {
    fn start_term(&mut self, term: &[u8]) -> Result<&mut dyn PostingsConsumer> {
        self.postings.start_term(term);
        Ok(&mut self.postings)
    }

    fn finish_term(&mut self, term: &[u8], stats: TermStats) -> Result<()> {
        let layout = self.postings.layout();
        let encoded = self.postings.finish_term(term, stats);

        let mut value = Vec::with_capacity(encoded.docs.len() + encoded.positions.len() + 8);
        varint::encode_vint_into(stats.doc_freq, &mut value);
        if layout.has_freqs {
            varint::encode_vlong_into((stats.total_term_freq - stats.doc_freq as i64) as u64, &mut value);
        }
        varint::encode_vint_into(encoded.docs.len() as u32, &mut value);
        value.extend_from_slice(&encoded.docs);
        if layout.has_positions {
            value.extend_from_slice(&encoded.positions);
        }

        trace!("field '{}': term {term:?} df={}", self.field, stats.doc_freq);
        self.trie.insert(term, value)
    }

    fn finish(&mut self, sum_total_term_freq: i64, sum_doc_freq: u64, doc_count: u32) -> Result<()> {
        self.postings
            .finish(sum_total_term_freq, sum_doc_freq, doc_count);
        if self.trie.is_empty() {
            return Ok(());
        }

        let mut trie = Vec::new();
        self.trie.write(&mut trie);

        let mut section = Vec::with_capacity(trie.len() + 32);
        varint::encode_vint_into(self.number, &mut section);
        section.push(self.order.code());
        varint::encode_vlong_into(self.trie.len() as u64, &mut section);
        varint::encode_vlong_into((sum_total_term_freq + 1) as u64, &mut section);
        varint::encode_vlong_into(sum_doc_freq, &mut section);
        varint::encode_vint_into(doc_count, &mut section);
        varint::encode_vlong_into(trie.len() as u64, &mut section);
        section.extend_from_slice(&trie);

        debug!(
            "field '{}': {} terms in {} trie nodes",
            self.field,
            self.trie.len(),
            self.trie.node_count()
        );
        self.owner.sections.insert(self.number, section);
        Ok(())
    }

    fn order(&self) -> TermOrder {
        self.order
    }
}

/// A decoded term: its statistics and the ranges of its postings in the arena.
#[derive(Debug)]
struct TermEntry {
    term: Vec<u8>,
    doc_freq: u32,
    total_term_freq: i64,
    docs: (usize, usize),
    positions: (usize, usize),
}

#[derive(Debug)]
struct FieldData {
    layout: PostingLayout,
    order: TermOrder,
    terms: Vec<TermEntry>,
    arena: Arc<[u8]>,
}

/// Reads a segment written in the in-memory postings format.
#[derive(Debug)]
pub struct MemoryFieldsReader {
    fields: BTreeMap<String, Arc<MemoryTerms>>,
}

impl MemoryFieldsReader {
    pub fn open(state: &SegmentReadState) -> Result<Self> {
        let name = state.file_name(EXTENSION);
        let file = codec_util::read_verified_file(
            state.storage.as_ref(),
            &name,
            CODEC,
            VERSION_START,
            VERSION_CURRENT,
        )?;
        let mut input = ByteCursor::new(Arc::clone(&file.data), file.body_start, file.body_end);
        let fields = Self::decode(state, &name, &mut input).map_err(|e| {
            if e.is_corruption() {
                QuiverError::corrupt(&name, e.to_string())
            } else {
                e
            }
        })?;
        if !input.is_eof() {
            return Err(QuiverError::corrupt(&name, "trailing bytes after the last field"));
        }

        debug!("opened memory postings {name} with {} fields", fields.len());
        Ok(MemoryFieldsReader { fields })
    }

    fn decode(
        state: &SegmentReadState,
        name: &str,
        input: &mut ByteCursor,
    ) -> Result<BTreeMap<String, Arc<MemoryTerms>>> {
        let num_fields = input.read_vint()?;
        let mut fields = BTreeMap::new();
        for _ in 0..num_fields {
            let number = input.read_vint()?;
            let info = state
                .field_infos
                .field_info_by_number(number)
                .ok_or_else(|| QuiverError::corrupt(name, format!("unknown field number {number}")))?;
            let order = TermOrder::from_code(input.read_u8()?, name)?;
            let num_terms = input.read_vlong()?;
            let sum_total_term_freq = input.read_vlong()? as i64 - 1;
            let sum_doc_freq = input.read_vlong()?;
            let doc_count = input.read_vint()?;
            let trie_len = input.read_vlong()? as usize;
            if trie_len > input.remaining() {
                return Err(QuiverError::corrupt(name, "trie extends past end of file"));
            }

            let start = input.position();
            let mut trie_in = ByteCursor::new(Arc::clone(input.data()), start, start + trie_len);
            let trie = OutputTrie::read(ByteSequenceOutputs::new(), &mut trie_in)?;
            if !trie_in.is_eof() {
                return Err(QuiverError::corrupt(name, "trie shorter than its recorded length"));
            }
            input.skip(trie_len)?;

            if trie.len() as u64 != num_terms {
                return Err(QuiverError::corrupt(
                    name,
                    format!("field '{}': {} terms, expected {num_terms}", info.name, trie.len()),
                ));
            }

            let layout = PostingLayout::of(info);
            let entries = match order {
                TermOrder::Natural => trie.iter(),
                TermOrder::Reverse => trie.iter_rev(),
            };
            let mut arena = Vec::new();
            let mut terms = Vec::with_capacity(trie.len());
            for (term, value) in entries {
                terms.push(decode_term(name, layout, term, &value, &mut arena)?);
            }

            let data = FieldData {
                layout,
                order,
                terms,
                arena: Arc::from(arena),
            };
            let previous = fields.insert(
                info.name.clone(),
                Arc::new(MemoryTerms {
                    data: Arc::new(data),
                    sum_total_term_freq,
                    sum_doc_freq,
                    doc_count,
                }),
            );
            if previous.is_some() {
                return Err(QuiverError::corrupt(name, format!("field '{}' listed twice", info.name)));
            }
        }
        Ok(fields)
    }
}

fn decode_term(
    name: &str,
    layout: PostingLayout,
    term: Vec<u8>,
    value: &[u8],
    arena: &mut Vec<u8>,
) -> Result<TermEntry> {
    let mut at = 0;
    let read_vint = |at: &mut usize| -> Result<u32> {
        let (v, len) = varint::decode_vint(&value[*at..])?;
        *at += len;
        Ok(v)
    };
    let doc_freq = read_vint(&mut at)?;
    let total_term_freq = if layout.has_freqs {
        let (extra, len) = varint::decode_vlong(&value[at..])?;
        at += len;
        doc_freq as i64 + extra as i64
    } else {
        -1
    };
    let docs_len = read_vint(&mut at)? as usize;
    if doc_freq == 0 || docs_len > value.len() - at {
        return Err(QuiverError::corrupt(
            name,
            format!("malformed postings for term {term:?}"),
        ));
    }

    let base = arena.len();
    arena.extend_from_slice(&value[at..]);
    let docs = (base, base + docs_len);
    let positions = (base + docs_len, arena.len());
    Ok(TermEntry {
        term,
        doc_freq,
        total_term_freq,
        docs,
        positions,
    })
}

impl FieldsProducer for MemoryFieldsReader {
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

/// The term dictionary of one field, fully decoded.
#[derive(Debug)]
pub struct MemoryTerms {
    data: Arc<FieldData>,
    sum_total_term_freq: i64,
    sum_doc_freq: u64,
    doc_count: u32,
}

impl Terms for MemoryTerms {
    fn iterator(&self) -> Result<Box<dyn TermsEnum>> {
        Ok(Box::new(MemoryTermsEnum {
            data: Arc::clone(&self.data),
            current: None,
            exhausted: false,
        }))
    }

    fn size(&self) -> Option<u64> {
        Some(self.data.terms.len() as u64)
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

#[derive(Debug, Clone)]
struct MemoryTermsEnum {
    data: Arc<FieldData>,
    current: Option<usize>,
    exhausted: bool,
}

impl MemoryTermsEnum {
    fn entry(&self) -> Result<&TermEntry> {
        self.current
            .map(|idx| &self.data.terms[idx])
            .ok_or_else(terms::unpositioned)
    }

    fn postings(&self, live_docs: Option<&LiveDocs>, with_positions: bool) -> Result<PostingListEnum> {
        let entry = self.entry()?;
        let arena = &self.data.arena;
        let docs = ByteCursor::new(Arc::clone(arena), entry.docs.0, entry.docs.1);
        let positions = with_positions
            .then(|| ByteCursor::new(Arc::clone(arena), entry.positions.0, entry.positions.1));
        Ok(PostingListEnum::new(
            self.data.layout,
            entry.doc_freq,
            docs,
            positions,
            None,
            live_docs,
        ))
    }
}

impl TermsEnum for MemoryTermsEnum {
    fn next(&mut self) -> Result<Option<&[u8]>> {
        if self.exhausted {
            return Ok(None);
        }
        let next = self.current.map_or(0, |idx| idx + 1);
        if next >= self.data.terms.len() {
            self.current = None;
            self.exhausted = true;
            return Ok(None);
        }
        self.current = Some(next);
        Ok(Some(self.data.terms[next].term.as_slice()))
    }

    fn seek_ceil(&mut self, target: &[u8]) -> Result<SeekStatus> {
        let order = self.data.order;
        let terms = &self.data.terms;
        let idx = terms.partition_point(|entry| order.compare(&entry.term, target).is_lt());
        if idx >= terms.len() {
            self.current = None;
            self.exhausted = true;
            return Ok(SeekStatus::End);
        }
        self.current = Some(idx);
        self.exhausted = false;
        if terms[idx].term == target {
            Ok(SeekStatus::Found)
        } else {
            Ok(SeekStatus::NotFound)
        }
    }

    fn term(&self) -> Option<&[u8]> {
        self.current.map(|idx| self.data.terms[idx].term.as_slice())
    }

    fn doc_freq(&self) -> Result<u32> {
        Ok(self.entry()?.doc_freq)
    }

    fn total_term_freq(&self) -> Result<i64> {
        Ok(self.entry()?.total_term_freq)
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
