//! Term dictionary contracts.
//!
//! The write side is a [`TermsConsumer`] that receives one field's terms in
//! sorted order; the read side is a [`Terms`] per field handing out
//! [`TermsEnum`] cursors.

use std::cmp::Ordering;
use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::codec::postings::{DocsAndPositionsEnum, DocsEnum, LiveDocs, PostingsConsumer};
use crate::error::{QuiverError, Result};

/// Order in which a field's terms are stored and enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TermOrder {
    /// Unsigned byte-wise order.
    #[default]
    Natural,
    /// Unsigned byte-wise order, reversed.
    Reverse,
}

impl TermOrder {
    /// Compare two terms under this order.
    pub fn compare(self, a: &[u8], b: &[u8]) -> Ordering {
        match self {
            TermOrder::Natural => a.cmp(b),
            TermOrder::Reverse => b.cmp(a),
        }
    }

    /// Attribute value naming this order.
    pub fn as_str(self) -> &'static str {
        match self {
            TermOrder::Natural => "natural",
            TermOrder::Reverse => "reverse",
        }
    }

    /// Parse an attribute value.
    pub fn parse(value: &str) -> Option<TermOrder> {
        match value {
            "natural" => Some(TermOrder::Natural),
            "reverse" => Some(TermOrder::Reverse),
            _ => None,
        }
    }

    /// Wire code.
    pub fn code(self) -> u8 {
        match self {
            TermOrder::Natural => 0,
            TermOrder::Reverse => 1,
        }
    }

    /// Decode a wire code.
    pub fn from_code(code: u8, resource: &str) -> Result<TermOrder> {
        match code {
            0 => Ok(TermOrder::Natural),
            1 => Ok(TermOrder::Reverse),
            _ => Err(QuiverError::corrupt(
                resource,
                format!("invalid term order byte: {code}"),
            )),
        }
    }
}

/// Result of [`TermsEnum::seek_ceil`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekStatus {
    /// The target term exists; the cursor is on it.
    Found,
    /// The target is absent; the cursor is on the next greater term.
    NotFound,
    /// No term is greater than or equal to the target.
    End,
}

/// Per-term statistics passed to [`TermsConsumer::finish_term`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermStats {
    /// Number of documents containing the term.
    pub doc_freq: u32,
    /// Total occurrences across all documents, `-1` when frequencies are omitted.
    pub total_term_freq: i64,
}

impl TermStats {
    pub fn new(doc_freq: u32, total_term_freq: i64) -> Self {
        TermStats {
            doc_freq,
            total_term_freq,
        }
    }
}

/// Receives the terms of one field, in sorted order, during a flush.
///
/// Per term: [`start_term`](Self::start_term), then the postings through the
/// returned consumer, then [`finish_term`](Self::finish_term). After the last
/// term, [`finish`](Self::finish) closes the field.
pub trait TermsConsumer {
    /// Begin a term and return the consumer for its postings.
    fn start_term(&mut self, term: &[u8]) -> Result<&mut dyn PostingsConsumer>;

    /// Complete the current term.
    ///
    /// `stats.doc_freq` must equal the number of documents just added.
    fn finish_term(&mut self, term: &[u8], stats: TermStats) -> Result<()>;

    /// Complete the field.
    fn finish(&mut self, sum_total_term_freq: i64, sum_doc_freq: u64, doc_count: u32)
    -> Result<()>;

    /// The order terms must arrive in.
    fn order(&self) -> TermOrder;
}

/// The term dictionary of one field.
pub trait Terms: Send + Sync + Debug {
    /// A new cursor, positioned before the first term.
    fn iterator(&self) -> Result<Box<dyn TermsEnum>>;

    /// Number of terms, if known.
    fn size(&self) -> Option<u64>;

    /// Sum of total term frequencies, `-1` when frequencies are omitted.
    fn sum_total_term_freq(&self) -> i64;

    /// Sum of document frequencies.
    fn sum_doc_freq(&self) -> u64;

    /// Number of documents with at least one term in this field.
    fn doc_count(&self) -> u32;

    /// The order terms are enumerated in.
    fn order(&self) -> TermOrder;

    fn has_freqs(&self) -> bool;

    fn has_positions(&self) -> bool;

    fn has_offsets(&self) -> bool;

    fn has_payloads(&self) -> bool;
}

/// A cursor over the terms of one field.
///
/// Cloning with [`box_clone`](Self::box_clone) yields an independent cursor
/// over the same immutable data.
pub trait TermsEnum: Send + Debug {
    /// Advance to the next term; `None` once exhausted, and on every later call.
    fn next(&mut self) -> Result<Option<&[u8]>>;

    /// Position on `target` or, failing that, the smallest greater term.
    fn seek_ceil(&mut self, target: &[u8]) -> Result<SeekStatus>;

    /// Position on `target` if it exists.
    fn seek_exact(&mut self, target: &[u8]) -> Result<bool> {
        Ok(self.seek_ceil(target)? == SeekStatus::Found)
    }

    /// The current term, or `None` when not positioned on one.
    fn term(&self) -> Option<&[u8]>;

    /// Ordinal of the current term.
    fn ord(&self) -> Result<u64> {
        Err(QuiverError::unsupported("this terms dictionary has no ordinals"))
    }

    /// Position on the term with the given ordinal.
    fn seek_exact_ord(&mut self, _ord: u64) -> Result<()> {
        Err(QuiverError::unsupported("this terms dictionary has no ordinals"))
    }

    /// Number of documents containing the current term.
    fn doc_freq(&self) -> Result<u32>;

    /// Total occurrences of the current term, `-1` when frequencies are omitted.
    fn total_term_freq(&self) -> Result<i64>;

    /// Documents of the current term, skipping those not in `live_docs`.
    fn docs(&self, live_docs: Option<&LiveDocs>) -> Result<Box<dyn DocsEnum>>;

    /// Documents and positions of the current term, or `None` when the field
    /// does not record positions.
    fn docs_and_positions(
        &self,
        live_docs: Option<&LiveDocs>,
    ) -> Result<Option<Box<dyn DocsAndPositionsEnum>>>;

    /// An independent cursor in the same state.
    fn box_clone(&self) -> Box<dyn TermsEnum>;
}

impl Clone for Box<dyn TermsEnum> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

pub(crate) fn unpositioned() -> QuiverError {
    QuiverError::invalid_argument("terms enum is not positioned on a term")
}
