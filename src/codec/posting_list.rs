//! Shared postings encoding used by the block and memory formats.
//!
//! A term's postings are two byte streams plus optional skip data:
//!
//! ```text
//! docs:       per doc   vint (delta << 1 | freq == 1), [vint freq]   with freqs
//!                       vint delta                                   docs only
//! positions:  per pos   vint position delta
//!                       [vint payload length + 1, 0 = none; payload] with payloads
//!                       [vint start delta; vint end - start]         with offsets
//! skip data:  vint count, per entry vint doc delta, vlong docs offset delta,
//!             [vlong positions offset delta]
//! ```
//!
//! Doc deltas start from 0 and position and offset deltas restart at every
//! document, so decoding can resume at any skip entry.

use std::sync::Arc;

use crate::codec::field_infos::FieldInfo;
use crate::codec::postings::{
    DocId, DocsAndPositionsEnum, DocsEnum, LiveDocs, NO_MORE_DOCS, PostingsConsumer,
    PostingsWriteChecker,
};
use crate::codec::terms::TermStats;
use crate::error::{QuiverError, Result};
use crate::util::bytes::ByteCursor;
use crate::util::varint;

/// Which parts of the postings a field records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostingLayout {
    pub has_freqs: bool,
    pub has_positions: bool,
    pub has_offsets: bool,
    pub store_payloads: bool,
}

impl PostingLayout {
    pub fn of(field: &FieldInfo) -> Self {
        PostingLayout {
            has_freqs: field.index_options.has_freqs(),
            has_positions: field.index_options.has_positions(),
            has_offsets: field.index_options.has_offsets(),
            store_payloads: field.store_payloads,
        }
    }
}

/// A resume point every `skip_interval` documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipEntry {
    /// Last document before the resume point.
    pub doc: DocId,
    /// Offset into the term's docs stream.
    pub doc_offset: u64,
    /// Offset into the term's positions stream.
    pub pos_offset: u64,
}

/// The encoded postings of one finished term.
#[derive(Debug, Default)]
pub struct EncodedTerm {
    pub stats: Option<TermStats>,
    pub docs: Vec<u8>,
    pub positions: Vec<u8>,
    pub skip: Vec<SkipEntry>,
}

impl EncodedTerm {
    /// Serialize the skip entries.
    pub fn write_skip(&self, layout: PostingLayout, out: &mut Vec<u8>) {
        varint::encode_vint_into(self.skip.len() as u32, out);
        let mut last = SkipEntry {
            doc: 0,
            doc_offset: 0,
            pos_offset: 0,
        };
        for entry in &self.skip {
            varint::encode_vint_into((entry.doc - last.doc) as u32, out);
            varint::encode_vlong_into(entry.doc_offset - last.doc_offset, out);
            if layout.has_positions {
                varint::encode_vlong_into(entry.pos_offset - last.pos_offset, out);
            }
            last = *entry;
        }
    }
}

/// Decode skip entries written by [`EncodedTerm::write_skip`].
pub fn read_skip(input: &mut ByteCursor, layout: PostingLayout) -> Result<Vec<SkipEntry>> {
    let count = input.read_vint()? as usize;
    let mut entries = Vec::with_capacity(count.min(input.remaining()));
    let mut last = SkipEntry {
        doc: 0,
        doc_offset: 0,
        pos_offset: 0,
    };
    for _ in 0..count {
        let doc = last.doc as i64 + input.read_vint()? as i64;
        if doc >= NO_MORE_DOCS as i64 {
            return Err(QuiverError::corrupt("skip data", format!("doc {doc} out of range")));
        }
        let doc_offset = last.doc_offset + input.read_vlong()?;
        let pos_offset = if layout.has_positions {
            last.pos_offset + input.read_vlong()?
        } else {
            0
        };
        last = SkipEntry {
            doc: doc as DocId,
            doc_offset,
            pos_offset,
        };
        entries.push(last);
    }
    Ok(entries)
}

/// Buffers and encodes the postings of one term at a time.
#[derive(Debug)]
pub struct PostingListWriter {
    checker: PostingsWriteChecker,
    layout: PostingLayout,
    skip_interval: u32,
    term: EncodedTerm,
    last_doc: DocId,
    doc_count: u32,
    last_position: i32,
    last_start_offset: i32,
}

impl PostingListWriter {
    /// `skip_interval == 0` disables skip data.
    pub fn new(field: &FieldInfo, max_doc: u32, skip_interval: u32) -> Self {
        PostingListWriter {
            checker: PostingsWriteChecker::new(field, max_doc),
            layout: PostingLayout::of(field),
            skip_interval,
            term: EncodedTerm::default(),
            last_doc: 0,
            doc_count: 0,
            last_position: 0,
            last_start_offset: 0,
        }
    }

    pub fn layout(&self) -> PostingLayout {
        self.layout
    }

    /// Begin a new term.
    pub fn start_term(&mut self, term: &[u8]) {
        self.checker.start_term(term);
        self.term = EncodedTerm::default();
        self.last_doc = 0;
        self.doc_count = 0;
    }

    /// Complete the current term and hand over its encoded postings.
    pub fn finish_term(&mut self, term: &[u8], stats: TermStats) -> EncodedTerm {
        self.checker.finish_term(term, &stats);
        let mut encoded = std::mem::take(&mut self.term);
        if encoded.skip.last().is_some_and(|entry| entry.doc == self.last_doc) {
            // a resume point after the last doc is never used
            encoded.skip.pop();
        }
        encoded.stats = Some(stats);
        encoded
    }

    /// Complete the field.
    pub fn finish(&mut self, sum_total_term_freq: i64, sum_doc_freq: u64, doc_count: u32) {
        self.checker.finish(sum_total_term_freq, sum_doc_freq, doc_count);
    }
}

impl PostingsConsumer for PostingListWriter {
    fn start_doc(&mut self, doc: DocId, freq: u32) -> Result<()> {
        self.checker.start_doc(doc, freq);

        let delta = (doc - self.last_doc) as u32;
        let docs = &mut self.term.docs;
        if self.layout.has_freqs {
            if freq == 1 {
                varint::encode_vint_into((delta << 1) | 1, docs);
            } else {
                varint::encode_vint_into(delta << 1, docs);
                varint::encode_vint_into(freq, docs);
            }
        } else {
            varint::encode_vint_into(delta, docs);
        }

        self.last_doc = doc;
        self.last_position = 0;
        self.last_start_offset = 0;
        Ok(())
    }

    fn add_position(
        &mut self,
        position: i32,
        payload: Option<&[u8]>,
        start_offset: i32,
        end_offset: i32,
    ) -> Result<()> {
        self.checker
            .add_position(position, payload, start_offset, end_offset);

        let out = &mut self.term.positions;
        varint::encode_vint_into((position - self.last_position) as u32, out);
        if self.layout.store_payloads {
            match payload {
                Some(bytes) => {
                    varint::encode_vint_into(bytes.len() as u32 + 1, out);
                    out.extend_from_slice(bytes);
                }
                None => varint::encode_vint_into(0, out),
            }
        }
        if self.layout.has_offsets {
            varint::encode_vint_into((start_offset - self.last_start_offset) as u32, out);
            varint::encode_vint_into((end_offset - start_offset) as u32, out);
            self.last_start_offset = start_offset;
        }

        self.last_position = position;
        Ok(())
    }

    fn finish_doc(&mut self) -> Result<()> {
        self.checker.finish_doc();
        self.doc_count += 1;
        if self.skip_interval > 0 && self.doc_count % self.skip_interval == 0 {
            self.term.skip.push(SkipEntry {
                doc: self.last_doc,
                doc_offset: self.term.docs.len() as u64,
                pos_offset: self.term.positions.len() as u64,
            });
        }
        Ok(())
    }
}

/// Skip data of a term, decoded on first use.
#[derive(Debug, Clone)]
pub struct SkipData {
    pub interval: u32,
    pub input: ByteCursor,
}

/// Decodes a term's postings written by [`PostingListWriter`].
#[derive(Debug, Clone)]
pub struct PostingListEnum {
    layout: PostingLayout,
    doc_freq: u32,
    live_docs: Option<LiveDocs>,

    docs: ByteCursor,
    docs_start: usize,
    positions: Option<ByteCursor>,
    positions_start: usize,
    skip_data: Option<SkipData>,
    skip: Option<Arc<[SkipEntry]>>,

    docs_read: u32,
    accum: i64,
    doc: DocId,
    freq: u32,

    positions_read: u32,
    position: i32,
    start_offset: i32,
    end_offset: i32,
    payload: Option<(usize, usize)>,
}

impl PostingListEnum {
    /// Create an enumerator over `doc_freq` documents.
    ///
    /// `positions` is read only when given; pass `None` to enumerate documents
    /// alone on a field that records positions.
    pub fn new(
        layout: PostingLayout,
        doc_freq: u32,
        docs: ByteCursor,
        positions: Option<ByteCursor>,
        skip_data: Option<SkipData>,
        live_docs: Option<&LiveDocs>,
    ) -> Self {
        let docs_start = docs.position();
        let positions_start = positions.as_ref().map_or(0, |p| p.position());
        PostingListEnum {
            layout,
            doc_freq,
            live_docs: live_docs.cloned(),
            docs,
            docs_start,
            positions,
            positions_start,
            skip_data,
            skip: None,
            docs_read: 0,
            accum: 0,
            doc: -1,
            freq: 0,
            positions_read: 0,
            position: 0,
            start_offset: -1,
            end_offset: -1,
            payload: None,
        }
    }

    fn read_position(&mut self) -> Result<i32> {
        let layout = self.layout;
        let input = self
            .positions
            .as_mut()
            .ok_or_else(|| QuiverError::invalid_argument("positions were not requested"))?;

        let delta = input.read_vint()?;
        let position = self.position as i64 + delta as i64;
        if position > i32::MAX as i64 {
            return Err(QuiverError::corrupt("postings", format!("position {position} overflows")));
        }
        self.position = position as i32;

        if layout.store_payloads {
            let len = input.read_vint()? as usize;
            self.payload = if len == 0 {
                None
            } else {
                let start = input.position();
                input.skip(len - 1)?;
                Some((start, len - 1))
            };
        }

        if layout.has_offsets {
            let start = self.start_offset.max(0) as i64 + input.read_vint()? as i64;
            let end = start + input.read_vint()? as i64;
            if end > i32::MAX as i64 {
                return Err(QuiverError::corrupt("postings", format!("offset {end} overflows")));
            }
            self.start_offset = start as i32;
            self.end_offset = end as i32;
        }

        self.positions_read += 1;
        Ok(self.position)
    }

    fn skip_remaining_positions(&mut self) -> Result<()> {
        if self.positions.is_some() {
            while self.positions_read < self.freq {
                self.read_position()?;
            }
        }
        Ok(())
    }

    fn skip_entries(&mut self) -> Result<Option<Arc<[SkipEntry]>>> {
        if self.skip.is_none() {
            let Some(skip_data) = self.skip_data.as_mut() else {
                return Ok(None);
            };
            let entries = read_skip(&mut skip_data.input, self.layout)?;
            self.skip = Some(Arc::from(entries));
        }
        Ok(self.skip.clone())
    }

    /// Jump to the last skip entry before `target` when it lies ahead.
    fn skip_to(&mut self, target: DocId) -> Result<()> {
        let interval = match &self.skip_data {
            Some(skip_data) if self.doc_freq > skip_data.interval => skip_data.interval,
            _ => return Ok(()),
        };
        let Some(entries) = self.skip_entries()? else {
            return Ok(());
        };

        let reached = entries.partition_point(|entry| entry.doc < target);
        if reached == 0 {
            return Ok(());
        }
        let docs_at_entry = reached as u32 * interval;
        if docs_at_entry <= self.docs_read {
            return Ok(());
        }

        let entry = entries[reached - 1];
        self.docs.seek(self.docs_start + entry.doc_offset as usize)?;
        if let Some(positions) = self.positions.as_mut() {
            positions.seek(self.positions_start + entry.pos_offset as usize)?;
        }
        self.docs_read = docs_at_entry;
        self.accum = entry.doc as i64;
        self.doc = entry.doc;
        self.freq = 0;
        self.positions_read = 0;
        Ok(())
    }
}

impl DocsEnum for PostingListEnum {
    fn doc_id(&self) -> DocId {
        self.doc
    }

    fn next_doc(&mut self) -> Result<DocId> {
        loop {
            if self.docs_read >= self.doc_freq {
                self.doc = NO_MORE_DOCS;
                return Ok(NO_MORE_DOCS);
            }
            self.skip_remaining_positions()?;

            let code = self.docs.read_vint()?;
            let (delta, freq) = if self.layout.has_freqs {
                let freq = if code & 1 != 0 { 1 } else { self.docs.read_vint()? };
                (code >> 1, freq)
            } else {
                (code, 1)
            };
            self.accum += delta as i64;
            if self.accum >= NO_MORE_DOCS as i64 || freq == 0 {
                return Err(QuiverError::corrupt(
                    "postings",
                    format!("invalid doc {} with freq {freq}", self.accum),
                ));
            }

            self.docs_read += 1;
            self.freq = freq;
            self.positions_read = 0;
            self.position = 0;
            self.start_offset = -1;
            self.end_offset = -1;
            self.payload = None;

            let doc = self.accum as DocId;
            if self.live_docs.as_ref().is_none_or(|live| live.is_live(doc)) {
                self.doc = doc;
                return Ok(doc);
            }
        }
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        self.skip_to(target)?;
        loop {
            let doc = self.next_doc()?;
            if doc >= target {
                return Ok(doc);
            }
        }
    }

    fn freq(&self) -> u32 {
        self.freq
    }

    fn cost(&self) -> u64 {
        self.doc_freq as u64
    }
}

impl DocsAndPositionsEnum for PostingListEnum {
    fn next_position(&mut self) -> Result<i32> {
        if self.positions_read >= self.freq {
            return Err(QuiverError::invalid_argument(format!(
                "next_position called more than freq={} times",
                self.freq
            )));
        }
        self.read_position()
    }

    fn start_offset(&self) -> i32 {
        if self.layout.has_offsets { self.start_offset } else { -1 }
    }

    fn end_offset(&self) -> i32 {
        if self.layout.has_offsets { self.end_offset } else { -1 }
    }

    fn payload(&self) -> Option<&[u8]> {
        let (start, len) = self.payload?;
        let positions = self.positions.as_ref()?;
        Some(&positions.data()[start..start + len])
    }
}
