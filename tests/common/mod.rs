#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use quiver::codec::Codec;
use quiver::codec::config::{CodecConfig, CodecRegistry};
use quiver::codec::field_infos::{FieldInfo, FieldInfos};
use quiver::codec::fields::FieldsConsumer;
use quiver::codec::postings::{DocId, DocsAndPositionsEnum, DocsEnum, LiveDocs, NO_MORE_DOCS};
use quiver::codec::segment::SegmentWriteState;
use quiver::codec::terms::{TermStats, TermsEnum};
use quiver::storage::Storage;
use rand::Rng;
use rand::rngs::StdRng;

pub const CODECS: [&str; 3] = ["Block", "Memory", "RandomPerField"];

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub position: i32,
    pub payload: Option<Vec<u8>>,
    pub start_offset: i32,
    pub end_offset: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub doc: DocId,
    pub freq: u32,
    pub positions: Vec<Position>,
}

/// Every posting of one field, buffered so it can be replayed through any codec.
#[derive(Debug, Clone)]
pub struct FieldPostings {
    pub info: FieldInfo,
    pub terms: BTreeMap<Vec<u8>, Vec<Posting>>,
}

impl FieldPostings {
    pub fn new(info: FieldInfo) -> Self {
        FieldPostings {
            info,
            terms: BTreeMap::new(),
        }
    }

    /// Terms in the field's storage order.
    pub fn sorted_terms(&self) -> Vec<&Vec<u8>> {
        let order = self.info.term_order();
        let mut terms: Vec<&Vec<u8>> = self.terms.keys().collect();
        terms.sort_by(|a, b| order.compare(a, b));
        terms
    }

    pub fn stats(&self, term: &[u8]) -> TermStats {
        let postings = &self.terms[term];
        let ttf = if self.info.index_options.has_freqs() {
            postings.iter().map(|p| p.freq as i64).sum()
        } else {
            -1
        };
        TermStats::new(postings.len() as u32, ttf)
    }
}

pub fn registry(seed: u64) -> CodecRegistry {
    let mut config = CodecConfig::default();
    config.random.seed = Some(seed);
    config.block.skip_interval = 4;
    config.block.terms_index_interval = 8;
    CodecRegistry::from_config(&config).unwrap()
}

/// Write `fields` as segment `segment`, including `.fnm` and `.si`.
pub fn write_segment(
    codec: &Codec,
    storage: &Arc<dyn Storage>,
    segment: &str,
    max_doc: u32,
    fields: &[FieldPostings],
) -> Arc<FieldInfos> {
    let infos = Arc::new(FieldInfos::new(fields.iter().map(|f| f.info.clone()).collect()).unwrap());
    let state = SegmentWriteState::new(Arc::clone(storage), segment, max_doc, Arc::clone(&infos));

    let mut consumer = codec.fields_consumer(&state).unwrap();
    for field in fields.iter().rev() {
        if field.info.indexed {
            feed_field(consumer.as_mut(), field);
        }
    }
    consumer.close().unwrap();
    codec.write_segment(&state).unwrap();
    infos
}

fn feed_field(consumer: &mut dyn FieldsConsumer, field: &FieldPostings) {
    let has_freqs = field.info.index_options.has_freqs();
    let mut terms = consumer.add_field(&field.info).unwrap();
    let mut sum_ttf = 0;
    let mut sum_df = 0;
    let mut docs = BTreeSet::new();

    for term in field.sorted_terms() {
        let postings = terms.start_term(term).unwrap();
        for posting in &field.terms[term] {
            postings.start_doc(posting.doc, posting.freq).unwrap();
            for p in &posting.positions {
                postings
                    .add_position(p.position, p.payload.as_deref(), p.start_offset, p.end_offset)
                    .unwrap();
            }
            postings.finish_doc().unwrap();
            docs.insert(posting.doc);
        }
        let stats = field.stats(term);
        sum_df += stats.doc_freq as u64;
        sum_ttf += stats.total_term_freq.max(0);
        terms.finish_term(term, stats).unwrap();
    }

    let sum_ttf = if has_freqs { sum_ttf } else { -1 };
    terms.finish(sum_ttf, sum_df, docs.len() as u32).unwrap();
}

/// Random postings for `info` over docs `0..max_doc`.
pub fn random_postings(rng: &mut StdRng, info: FieldInfo, num_terms: usize, max_doc: i32) -> FieldPostings {
    let options = info.index_options;
    let store_payloads = info.store_payloads;
    let mut field = FieldPostings::new(info);

    let mut attempts = 0;
    while field.terms.len() < num_terms && attempts < num_terms * 20 {
        attempts += 1;
        let len = rng.random_range(0..7);
        let term: Vec<u8> = (0..len).map(|_| b"abcde"[rng.random_range(0..5)]).collect();
        if field.terms.contains_key(&term) {
            continue;
        }

        let density = rng.random_range(0.01..0.6);
        let mut postings = Vec::new();
        for doc in 0..max_doc {
            if !rng.random_bool(density) {
                continue;
            }
            let freq = if options.has_freqs() { rng.random_range(1..=5) } else { 1 };
            let mut positions = Vec::new();
            if options.has_positions() {
                let mut position = rng.random_range(0..4);
                let mut start = rng.random_range(0..10);
                for _ in 0..freq {
                    let payload = if store_payloads {
                        match rng.random_range(0..3) {
                            0 => None,
                            1 => Some(Vec::new()),
                            _ => Some((0..rng.random_range(1..5)).map(|_| rng.random()).collect()),
                        }
                    } else {
                        None
                    };
                    let (start_offset, end_offset) = if options.has_offsets() {
                        let end = start + rng.random_range(0..6);
                        (start, end)
                    } else {
                        (-1, -1)
                    };
                    positions.push(Position {
                        position,
                        payload,
                        start_offset,
                        end_offset,
                    });
                    position += rng.random_range(0..4);
                    start += rng.random_range(0..8);
                }
            }
            postings.push(Posting { doc, freq, positions });
        }
        if postings.is_empty() {
            let doc = rng.random_range(0..max_doc);
            let freq = if options.has_positions() { 1 } else { rng.random_range(1..=3) };
            let freq = if options.has_freqs() { freq } else { 1 };
            let positions = if options.has_positions() {
                vec![Position {
                    position: 0,
                    payload: None,
                    start_offset: if options.has_offsets() { 0 } else { -1 },
                    end_offset: if options.has_offsets() { 1 } else { -1 },
                }]
            } else {
                Vec::new()
            };
            postings.push(Posting { doc, freq, positions });
        }
        field.terms.insert(term, postings);
    }
    field
}

/// Drain a docs enum, checking that ids strictly increase.
pub fn drain_docs(docs: &mut dyn DocsEnum) -> Vec<(DocId, u32)> {
    let mut seen = Vec::new();
    let mut last = -1;
    loop {
        let doc = docs.next_doc().unwrap();
        if doc == NO_MORE_DOCS {
            return seen;
        }
        assert!(doc > last, "doc {doc} after {last}");
        assert_eq!(docs.doc_id(), doc);
        last = doc;
        seen.push((doc, docs.freq()));
    }
}

/// Drain a positions enum into postings.
pub fn drain_positions(docs: &mut dyn DocsAndPositionsEnum) -> Vec<Posting> {
    let mut seen = Vec::new();
    loop {
        let doc = docs.next_doc().unwrap();
        if doc == NO_MORE_DOCS {
            return seen;
        }
        let freq = docs.freq();
        let mut positions = Vec::with_capacity(freq as usize);
        for _ in 0..freq {
            let position = docs.next_position().unwrap();
            positions.push(Position {
                position,
                payload: docs.payload().map(<[u8]>::to_vec),
                start_offset: docs.start_offset(),
                end_offset: docs.end_offset(),
            });
        }
        seen.push(Posting { doc, freq, positions });
    }
}

/// Expected postings of `term` with `live_docs` applied.
pub fn expected_docs(field: &FieldPostings, term: &[u8], live_docs: Option<&LiveDocs>) -> Vec<(DocId, u32)> {
    let has_freqs = field.info.index_options.has_freqs();
    field.terms[term]
        .iter()
        .filter(|p| live_docs.is_none_or(|live| live.is_live(p.doc)))
        .map(|p| (p.doc, if has_freqs { p.freq } else { 1 }))
        .collect()
}

/// Collect every term of an enum from its current position.
pub fn drain_terms(terms_enum: &mut dyn TermsEnum) -> Vec<Vec<u8>> {
    let mut terms = Vec::new();
    while let Some(term) = terms_enum.next().unwrap() {
        terms.push(term.to_vec());
    }
    terms
}
