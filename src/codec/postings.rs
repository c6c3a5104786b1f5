//! Postings contracts: per-term document, frequency and position streams.
//!
//! Writers receive `start_doc`, `freq` times `add_position`, then
//! `finish_doc` for every document of a term. Readers expose the same data
//! through [`DocsEnum`] and [`DocsAndPositionsEnum`].

use std::fmt::Debug;
use std::sync::Arc;

use bit_vec::BitVec;

use crate::codec::field_infos::{FieldInfo, IndexOptions};
use crate::codec::terms::{TermOrder, TermStats};
use crate::error::Result;

/// Document number within a segment.
pub type DocId = i32;

/// Returned by enumerators once all documents have been consumed.
pub const NO_MORE_DOCS: DocId = i32::MAX;

/// Receives the postings of a single term.
pub trait PostingsConsumer {
    /// Begin a document that contains the term `freq` times.
    fn start_doc(&mut self, doc: DocId, freq: u32) -> Result<()>;

    /// Add one occurrence. Offsets are `-1` when the field does not record them.
    fn add_position(
        &mut self,
        position: i32,
        payload: Option<&[u8]>,
        start_offset: i32,
        end_offset: i32,
    ) -> Result<()>;

    /// Complete the current document.
    fn finish_doc(&mut self) -> Result<()>;
}

/// Iterates over the documents of a term in increasing order.
pub trait DocsEnum: Send + Debug {
    /// Current document: `-1` before the first call, [`NO_MORE_DOCS`] at the end.
    fn doc_id(&self) -> DocId;

    /// Advance to the next live document.
    fn next_doc(&mut self) -> Result<DocId>;

    /// Advance to the first live document at or beyond `target`.
    ///
    /// Always moves forward at least once, exactly like calling
    /// [`next_doc`](Self::next_doc) until the result is `>= target`.
    fn advance(&mut self, target: DocId) -> Result<DocId>;

    /// Frequency of the term in the current document, `1` when not recorded.
    fn freq(&self) -> u32;

    /// Approximate number of documents left.
    fn cost(&self) -> u64;
}

/// Iterates over documents and, within each, the term's positions.
pub trait DocsAndPositionsEnum: DocsEnum {
    /// Next position in the current document. Call at most `freq()` times.
    fn next_position(&mut self) -> Result<i32>;

    /// Start offset of the current position, `-1` when not recorded.
    fn start_offset(&self) -> i32;

    /// End offset of the current position, `-1` when not recorded.
    fn end_offset(&self) -> i32;

    /// Payload of the current position, `None` when it carried none.
    fn payload(&self) -> Option<&[u8]>;
}

/// Query-time mask of live (not deleted) documents.
#[derive(Debug, Clone)]
pub struct LiveDocs {
    bits: Arc<BitVec>,
}

impl LiveDocs {
    /// All of `max_doc` documents are live.
    pub fn all_live(max_doc: usize) -> Self {
        LiveDocs {
            bits: Arc::new(BitVec::from_elem(max_doc, true)),
        }
    }

    /// All documents live except `deleted`.
    pub fn with_deletions<I: IntoIterator<Item = DocId>>(max_doc: usize, deleted: I) -> Self {
        let mut live = Self::all_live(max_doc);
        for doc in deleted {
            live.delete(doc);
        }
        live
    }

    /// Mark a document deleted.
    pub fn delete(&mut self, doc: DocId) {
        let bits = Arc::make_mut(&mut self.bits);
        if doc >= 0 && (doc as usize) < bits.len() {
            bits.set(doc as usize, false);
        }
    }

    /// Whether a document is live. Documents beyond the mask are live.
    pub fn is_live(&self, doc: DocId) -> bool {
        doc >= 0 && self.bits.get(doc as usize).unwrap_or(true)
    }

    /// Number of live documents within the mask.
    pub fn num_live(&self) -> usize {
        self.bits.iter().filter(|live| *live).count()
    }

    /// Size of the mask.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Whether the mask is empty.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }
}

/// Write-side assertions shared by every postings format.
///
/// Violations are programmer errors and panic.
#[derive(Debug)]
pub struct PostingsWriteChecker {
    field: String,
    index_options: IndexOptions,
    store_payloads: bool,
    order: TermOrder,

    last_term: Option<Vec<u8>>,
    current_term: Option<Vec<u8>>,
    term_docs: u32,
    term_total_freq: i64,
    last_doc: DocId,

    in_doc: bool,
    doc_freq: u32,
    doc_positions: u32,
    last_position: i32,
    last_start_offset: i32,

    sum_doc_freq: u64,
    sum_total_term_freq: i64,
    max_doc: u32,
    docs_seen: BitVec,
    finished: bool,
}

impl PostingsWriteChecker {
    /// Documents of the field must lie in `0..max_doc`.
    pub fn new(field: &FieldInfo, max_doc: u32) -> Self {
        PostingsWriteChecker {
            field: field.name.clone(),
            index_options: field.index_options,
            store_payloads: field.store_payloads,
            order: field.term_order(),
            last_term: None,
            current_term: None,
            term_docs: 0,
            term_total_freq: 0,
            last_doc: -1,
            in_doc: false,
            doc_freq: 0,
            doc_positions: 0,
            last_position: 0,
            last_start_offset: 0,
            sum_doc_freq: 0,
            sum_total_term_freq: 0,
            max_doc,
            docs_seen: BitVec::from_elem(max_doc as usize, false),
            finished: false,
        }
    }

    pub fn order(&self) -> TermOrder {
        self.order
    }

    pub fn start_term(&mut self, term: &[u8]) {
        assert!(!self.finished, "field '{}' is already finished", self.field);
        assert!(
            self.current_term.is_none(),
            "field '{}': start_term before finish_term",
            self.field
        );
        if let Some(last) = &self.last_term {
            assert!(
                self.order.compare(last, term).is_lt(),
                "field '{}': terms out of order ({last:?} then {term:?})",
                self.field
            );
        }
        self.current_term = Some(term.to_vec());
        self.term_docs = 0;
        self.term_total_freq = 0;
        self.last_doc = -1;
    }

    pub fn start_doc(&mut self, doc: DocId, freq: u32) {
        assert!(self.current_term.is_some(), "field '{}': start_doc outside a term", self.field);
        assert!(!self.in_doc, "field '{}': start_doc before finish_doc", self.field);
        assert!(doc >= 0 && doc != NO_MORE_DOCS, "field '{}': invalid doc {doc}", self.field);
        assert!(
            (doc as u32) < self.max_doc,
            "field '{}': doc {doc} is not below max_doc {}",
            self.field,
            self.max_doc
        );
        assert!(
            doc > self.last_doc,
            "field '{}': docs out of order ({} then {doc})",
            self.field,
            self.last_doc
        );
        assert!(freq >= 1, "field '{}': doc {doc} has freq 0", self.field);

        self.in_doc = true;
        self.last_doc = doc;
        self.term_docs += 1;
        self.doc_freq = if self.index_options.has_freqs() { freq } else { 1 };
        self.term_total_freq += self.doc_freq as i64;
        self.doc_positions = 0;
        self.last_position = 0;
        self.last_start_offset = 0;

        self.docs_seen.set(doc as usize, true);
    }

    pub fn add_position(
        &mut self,
        position: i32,
        payload: Option<&[u8]>,
        start_offset: i32,
        end_offset: i32,
    ) {
        assert!(self.in_doc, "field '{}': add_position outside a doc", self.field);
        assert!(
            self.index_options.has_positions(),
            "field '{}' does not record positions",
            self.field
        );
        assert!(
            self.doc_positions < self.doc_freq,
            "field '{}': more than freq={} positions",
            self.field,
            self.doc_freq
        );
        assert!(
            position >= self.last_position,
            "field '{}': position {position} before {}",
            self.field,
            self.last_position
        );

        if self.index_options.has_offsets() {
            assert!(
                start_offset >= self.last_start_offset && end_offset >= start_offset,
                "field '{}': invalid offsets {start_offset}..{end_offset}",
                self.field
            );
            self.last_start_offset = start_offset;
        } else {
            assert!(
                start_offset == -1 && end_offset == -1,
                "field '{}' does not record offsets",
                self.field
            );
        }

        assert!(
            payload.is_none() || self.store_payloads,
            "field '{}' does not store payloads",
            self.field
        );

        self.doc_positions += 1;
        self.last_position = position;
    }

    pub fn finish_doc(&mut self) {
        assert!(self.in_doc, "field '{}': finish_doc outside a doc", self.field);
        if self.index_options.has_positions() {
            assert_eq!(
                self.doc_positions, self.doc_freq,
                "field '{}': doc {} declared freq {} but added {} positions",
                self.field, self.last_doc, self.doc_freq, self.doc_positions
            );
        }
        self.in_doc = false;
    }

    pub fn finish_term(&mut self, term: &[u8], stats: &TermStats) {
        assert!(!self.in_doc, "field '{}': finish_term inside a doc", self.field);
        let current = self.current_term.take();
        assert_eq!(
            current.as_deref(),
            Some(term),
            "field '{}': finish_term for a term that was not started",
            self.field
        );
        assert!(stats.doc_freq > 0, "field '{}': term without documents", self.field);
        assert_eq!(
            stats.doc_freq, self.term_docs,
            "field '{}': doc_freq does not match the documents added",
            self.field
        );

        let expected_ttf = if self.index_options.has_freqs() {
            self.term_total_freq
        } else {
            -1
        };
        assert_eq!(
            stats.total_term_freq, expected_ttf,
            "field '{}': total_term_freq does not match the postings",
            self.field
        );

        self.sum_doc_freq += stats.doc_freq as u64;
        self.sum_total_term_freq += self.term_total_freq;
        self.last_term = current;
    }

    pub fn finish(&mut self, sum_total_term_freq: i64, sum_doc_freq: u64, doc_count: u32) {
        assert!(
            self.current_term.is_none(),
            "field '{}': finish with an open term",
            self.field
        );
        assert!(!self.finished, "field '{}' finished twice", self.field);
        assert_eq!(
            sum_doc_freq, self.sum_doc_freq,
            "field '{}': sum_doc_freq mismatch",
            self.field
        );
        let expected_sum_ttf = if self.index_options.has_freqs() {
            self.sum_total_term_freq
        } else {
            -1
        };
        assert_eq!(
            sum_total_term_freq, expected_sum_ttf,
            "field '{}': sum_total_term_freq mismatch",
            self.field
        );
        let seen = self.docs_seen.iter().filter(|seen| *seen).count() as u32;
        assert_eq!(doc_count, seen, "field '{}': doc_count mismatch", self.field);
        self.finished = true;
    }
}
