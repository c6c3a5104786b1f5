use ahash::AHashSet;
use log::{debug, trace};

use crate::codec::codec_util;
use crate::codec::config::BlockConfig;
use crate::codec::field_infos::FieldInfo;
use crate::codec::fields::FieldsConsumer;
use crate::codec::posting_list::{EncodedTerm, PostingListWriter};
use crate::codec::postings::PostingsConsumer;
use crate::codec::segment::SegmentWriteState;
use crate::codec::terms::{TermOrder, TermStats, TermsConsumer};
use crate::error::{QuiverError, Result};
use crate::storage::StorageOutput;
use crate::storage::structured::StructWriter;
use crate::util::varint;

use super::{
    DOCS_CODEC, DOCS_EXTENSION, POSITIONS_CODEC, POSITIONS_EXTENSION, TERMS_CODEC,
    TERMS_EXTENSION, VERSION_CURRENT,
};

type Output = StructWriter<Box<dyn StorageOutput>>;

/// Directory entry of one field, written when the segment is closed.
#[derive(Debug)]
struct FieldEntry {
    number: u32,
    order: TermOrder,
    num_terms: u64,
    sum_total_term_freq: i64,
    sum_doc_freq: u64,
    doc_count: u32,
    index_fp: u64,
}

#[derive(Debug)]
struct PendingTerm {
    term: Vec<u8>,
    stats: TermStats,
    doc_fp: u64,
    pos_fp: u64,
    skip_offset: u64,
}

/// Writes a segment in the block postings format.
#[derive(Debug)]
pub struct BlockFieldsWriter {
    name: String,
    config: BlockConfig,
    max_doc: u32,
    terms_out: Output,
    docs_out: Output,
    positions_out: Output,
    fields: Vec<FieldEntry>,
    added: AHashSet<u32>,
}

impl BlockFieldsWriter {
    pub fn new(state: &SegmentWriteState, config: BlockConfig) -> Result<Self> {
        if config.terms_index_interval == 0 {
            return Err(QuiverError::invalid_argument(
                "terms_index_interval must be at least 1",
            ));
        }
        let storage = state.storage.as_ref();

        let mut terms_out = StructWriter::new(storage.create_output(&state.file_name(TERMS_EXTENSION))?);
        codec_util::write_header(&mut terms_out, TERMS_CODEC, VERSION_CURRENT)?;
        terms_out.write_vint(config.skip_interval)?;
        terms_out.write_vint(config.terms_index_interval)?;

        let mut docs_out = StructWriter::new(storage.create_output(&state.file_name(DOCS_EXTENSION))?);
        codec_util::write_header(&mut docs_out, DOCS_CODEC, VERSION_CURRENT)?;

        let mut positions_out =
            StructWriter::new(storage.create_output(&state.file_name(POSITIONS_EXTENSION))?);
        codec_util::write_header(&mut positions_out, POSITIONS_CODEC, VERSION_CURRENT)?;

        Ok(BlockFieldsWriter {
            name: state.file_name(TERMS_EXTENSION),
            config,
            max_doc: state.max_doc,
            terms_out,
            docs_out,
            positions_out,
            fields: Vec::new(),
            added: AHashSet::new(),
        })
    }
}

impl FieldsConsumer for BlockFieldsWriter {
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
        Ok(Box::new(BlockTermsWriter::new(self, field)))
    }

    fn close(self: Box<Self>) -> Result<()> {
        let BlockFieldsWriter {
            name,
            mut terms_out,
            mut docs_out,
            mut positions_out,
            mut fields,
            ..
        } = *self;

        fields.sort_by_key(|entry| entry.number);
        let dir_fp = terms_out.position();
        terms_out.write_vint(fields.len() as u32)?;
        for entry in &fields {
            terms_out.write_vint(entry.number)?;
            terms_out.write_u8(entry.order.code())?;
            terms_out.write_vlong(entry.num_terms)?;
            terms_out.write_vlong((entry.sum_total_term_freq + 1) as u64)?;
            terms_out.write_vlong(entry.sum_doc_freq)?;
            terms_out.write_vint(entry.doc_count)?;
            terms_out.write_vlong(entry.index_fp)?;
        }
        terms_out.write_u64(dir_fp)?;

        for mut out in [terms_out, docs_out, positions_out] {
            codec_util::write_footer(&mut out)?;
            out.close()?;
        }

        debug!("closed block postings {name} with {} fields", fields.len());
        Ok(())
    }
}

/// Writes the terms of one field.
struct BlockTermsWriter<'a> {
    owner: &'a mut BlockFieldsWriter,
    field: String,
    number: u32,
    order: TermOrder,
    postings: PostingListWriter,
    pending: Vec<PendingTerm>,
    index: Vec<(Vec<u8>, u64)>,
    num_terms: u64,
    block: Vec<u8>,
}

impl<'a> BlockTermsWriter<'a> {
    fn new(owner: &'a mut BlockFieldsWriter, field: &FieldInfo) -> Self {
        let postings = PostingListWriter::new(field, owner.max_doc, owner.config.skip_interval);
        BlockTermsWriter {
            owner,
            field: field.name.clone(),
            number: field.number,
            order: field.term_order(),
            postings,
            pending: Vec::new(),
            index: Vec::new(),
            num_terms: 0,
            block: Vec::new(),
        }
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let layout = self.postings.layout();
        let block = &mut self.block;
        block.clear();

        varint::encode_vint_into(self.pending.len() as u32, block);
        let mut last_term: &[u8] = &[];
        let mut last_doc_fp = 0;
        let mut last_pos_fp = 0;
        for pending in &self.pending {
            let prefix = common_prefix(last_term, &pending.term);
            let suffix = &pending.term[prefix..];
            varint::encode_vint_into(prefix as u32, block);
            varint::encode_vint_into(suffix.len() as u32, block);
            block.extend_from_slice(suffix);

            varint::encode_vint_into(pending.stats.doc_freq, block);
            if layout.has_freqs {
                let extra = pending.stats.total_term_freq - pending.stats.doc_freq as i64;
                varint::encode_vlong_into(extra as u64, block);
            }
            varint::encode_vlong_into(pending.doc_fp - last_doc_fp, block);
            if layout.has_positions {
                varint::encode_vlong_into(pending.pos_fp - last_pos_fp, block);
            }
            varint::encode_vlong_into(pending.skip_offset, block);

            last_term = &pending.term;
            last_doc_fp = pending.doc_fp;
            last_pos_fp = pending.pos_fp;
        }

        let block_fp = self.owner.terms_out.position();
        self.owner.terms_out.write_raw(&self.block)?;
        let first = std::mem::take(&mut self.pending[0].term);
        self.index.push((first, block_fp));
        self.pending.clear();
        Ok(())
    }

    fn write_postings(&mut self, encoded: &EncodedTerm) -> Result<(u64, u64, u64)> {
        let layout = self.postings.layout();
        let doc_fp = self.owner.docs_out.position();
        self.owner.docs_out.write_raw(&encoded.docs)?;

        let skip_offset = if encoded.skip.is_empty() {
            0
        } else {
            let mut skip = Vec::new();
            encoded.write_skip(layout, &mut skip);
            self.owner.docs_out.write_raw(&skip)?;
            encoded.docs.len() as u64
        };

        let pos_fp = self.owner.positions_out.position();
        if layout.has_positions {
            self.owner.positions_out.write_raw(&encoded.positions)?;
        }
        Ok((doc_fp, pos_fp, skip_offset))
    }
}

impl TermsConsumer for BlockTermsWriter<'_> {
    fn start_term(&mut self, term: &[u8]) -> Result<&mut dyn PostingsConsumer> {
        self.postings.start_term(term);
        Ok(&mut self.postings)
    }

    fn finish_term(&mut self, term: &[u8], stats: TermStats) -> Result<()> {
        let encoded = self.postings.finish_term(term, stats);
        let (doc_fp, pos_fp, skip_offset) = self.write_postings(&encoded)?;
        trace!(
            "field '{}': term {term:?} df={} at doc fp {doc_fp}",
            self.field, stats.doc_freq
        );

        self.pending.push(PendingTerm {
            term: term.to_vec(),
            stats,
            doc_fp,
            pos_fp,
            skip_offset,
        });
        self.num_terms += 1;
        if self.pending.len() >= self.owner.config.terms_index_interval as usize {
            self.flush_block()?;
        }
        Ok(())
    }

    fn finish(&mut self, sum_total_term_freq: i64, sum_doc_freq: u64, doc_count: u32) -> Result<()> {
        self.postings
            .finish(sum_total_term_freq, sum_doc_freq, doc_count);
        if self.num_terms == 0 {
            return Ok(());
        }
        self.flush_block()?;

        let out = &mut self.owner.terms_out;
        let index_fp = out.position();
        out.write_vint(self.index.len() as u32)?;
        for (first_term, fp) in &self.index {
            out.write_bytes(first_term)?;
            out.write_vlong(*fp)?;
        }

        self.owner.fields.push(FieldEntry {
            number: self.number,
            order: self.order,
            num_terms: self.num_terms,
            sum_total_term_freq,
            sum_doc_freq,
            doc_count,
            index_fp,
        });
        debug!(
            "field '{}': {} terms in {} blocks",
            self.field,
            self.num_terms,
            self.index.len()
        );
        Ok(())
    }

    fn order(&self) -> TermOrder {
        self.order
    }
}

fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

