//! Test composite that stores each field with a different postings format.
//!
//! At write time every field is assigned one format of a fixed palette,
//! chosen by a [`StdRng`] seeded from the segment seed and the field number.
//! The seed and the assignment are persisted in `<segment>.rpf`, so opening
//! the segment rebuilds the same composition. Sub-formats write their files
//! under the suffix `<format name><palette index>`.
//!
//! ```text
//! .rpf body:
//!   vlong seed
//!   vint  fields
//!   repeated: vint field number, vint palette index
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::codec::PostingsFormat;
use crate::codec::codec_util;
use crate::codec::field_infos::{FieldInfo, FieldInfos};
use crate::codec::fields::{FieldsConsumer, FieldsProducer};
use crate::codec::segment::{SegmentReadState, SegmentWriteState};
use crate::codec::terms::{Terms, TermsConsumer};
use crate::error::{QuiverError, Result};
use crate::storage::structured::StructWriter;
use crate::util::bytes::ByteCursor;

const CODEC: &str = "QuiverRandomPerField";
const EXTENSION: &str = "rpf";
const VERSION_START: u32 = 0;
const VERSION_CURRENT: u32 = VERSION_START;

/// Picks a postings format per field from a palette.
#[derive(Debug, Clone)]
pub struct RandomPerFieldPostingsFormat {
    palette: Arc<[PostingsFormat]>,
    seed: Option<u64>,
}

impl RandomPerFieldPostingsFormat {
    pub const NAME: &'static str = "RandomPerField";

    /// Create the format. Without a fixed `seed`, each segment draws its own.
    ///
    /// # Panics
    ///
    /// Panics if `palette` is empty.
    pub fn new(palette: Vec<PostingsFormat>, seed: Option<u64>) -> Self {
        assert!(!palette.is_empty(), "palette must hold at least one format");
        RandomPerFieldPostingsFormat {
            palette: Arc::from(palette),
            seed,
        }
    }

    pub fn palette(&self) -> &[PostingsFormat] {
        &self.palette
    }

    /// Palette index used for `field` in a segment written with `seed`.
    pub fn pick(&self, seed: u64, field: u32) -> usize {
        let mut rng = StdRng::seed_from_u64(seed ^ field as u64);
        rng.random_range(0..self.palette.len())
    }

    pub fn fields_consumer(&self, state: &SegmentWriteState) -> Result<Box<dyn FieldsConsumer>> {
        let seed = self.seed.unwrap_or_else(rand::random);
        debug!("random per-field postings for {} with seed {seed}", state.segment);
        Ok(Box::new(RandomFieldsWriter {
            format: self.clone(),
            state: state.clone(),
            seed,
            assignments: BTreeMap::new(),
            consumers: (0..self.palette.len()).map(|_| None).collect(),
        }))
    }

    pub fn fields_producer(&self, state: &SegmentReadState) -> Result<Box<dyn FieldsProducer>> {
        Ok(Box::new(RandomFieldsReader::open(self, state)?))
    }
}

fn sub_suffix(format: &PostingsFormat, index: usize) -> String {
    format!("{}{}", format.name(), index)
}

struct RandomFieldsWriter {
    format: RandomPerFieldPostingsFormat,
    state: SegmentWriteState,
    seed: u64,
    assignments: BTreeMap<u32, usize>,
    consumers: Vec<Option<Box<dyn FieldsConsumer>>>,
}

impl FieldsConsumer for RandomFieldsWriter {
    fn add_field(&mut self, field: &FieldInfo) -> Result<Box<dyn TermsConsumer + '_>> {
        let index = self.format.pick(self.seed, field.number);
        let sub_format = &self.format.palette[index];
        self.assignments.insert(field.number, index);

        let consumer = match self.consumers[index] {
            Some(ref mut consumer) => consumer,
            ref mut slot @ None => {
                let sub_state = self.state.with_suffix(&sub_suffix(sub_format, index));
                slot.insert(sub_format.fields_consumer(&sub_state)?)
            }
        };
        debug!(
            "field '{}' uses {} (palette index {index})",
            field.name,
            sub_format.name()
        );
        consumer.add_field(field)
    }

    fn close(self: Box<Self>) -> Result<()> {
        let name = self.state.file_name(EXTENSION);
        let mut out = StructWriter::new(self.state.storage.create_output(&name)?);
        codec_util::write_header(&mut out, CODEC, VERSION_CURRENT)?;
        out.write_vlong(self.seed)?;
        out.write_vint(self.assignments.len() as u32)?;
        for (number, index) in &self.assignments {
            out.write_vint(*number)?;
            out.write_vint(*index as u32)?;
        }
        codec_util::write_footer(&mut out)?;
        out.close()?;

        for consumer in self.consumers.into_iter().flatten() {
            consumer.close()?;
        }
        Ok(())
    }
}

/// Reads a segment written by [`RandomPerFieldPostingsFormat`].
#[derive(Debug)]
pub struct RandomFieldsReader {
    seed: u64,
    assignments: BTreeMap<u32, usize>,
    producers: BTreeMap<usize, Box<dyn FieldsProducer>>,
    field_infos: Arc<FieldInfos>,
}

impl RandomFieldsReader {
    fn open(format: &RandomPerFieldPostingsFormat, state: &SegmentReadState) -> Result<Self> {
        let name = state.file_name(EXTENSION);
        let file = codec_util::read_verified_file(
            state.storage.as_ref(),
            &name,
            CODEC,
            VERSION_START,
            VERSION_CURRENT,
        )?;
        let mut input = ByteCursor::new(Arc::clone(&file.data), file.body_start, file.body_end);
        let corrupt = |e: QuiverError| QuiverError::corrupt(&name, e.to_string());

        let seed = input.read_vlong().map_err(corrupt)?;
        let count = input.read_vint().map_err(corrupt)?;
        let mut assignments = BTreeMap::new();
        for _ in 0..count {
            let number = input.read_vint().map_err(corrupt)?;
            let index = input.read_vint().map_err(corrupt)? as usize;
            if index >= format.palette.len() {
                return Err(QuiverError::corrupt(
                    &name,
                    format!("palette index {index} out of range"),
                ));
            }
            if state.field_infos.field_info_by_number(number).is_none() {
                return Err(QuiverError::corrupt(&name, format!("unknown field number {number}")));
            }
            assignments.insert(number, index);
        }
        if !input.is_eof() {
            return Err(QuiverError::corrupt(&name, "trailing bytes after field assignments"));
        }

        let mut producers = BTreeMap::new();
        for &index in assignments.values() {
            if producers.contains_key(&index) {
                continue;
            }
            let sub_format = &format.palette[index];
            let sub_state = state.with_suffix(&sub_suffix(sub_format, index));
            producers.insert(index, sub_format.fields_producer(&sub_state)?);
        }

        debug!(
            "opened random per-field postings {name}: seed {seed}, {} formats",
            producers.len()
        );
        Ok(RandomFieldsReader {
            seed,
            assignments,
            producers,
            field_infos: Arc::clone(&state.field_infos),
        })
    }

    /// Seed the segment was written with.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl FieldsProducer for RandomFieldsReader {
    fn terms(&self, field: &str) -> Result<Option<Arc<dyn Terms>>> {
        let Some(info) = self.field_infos.field_info(field) else {
            return Ok(None);
        };
        let producer = self
            .assignments
            .get(&info.number)
            .and_then(|index| self.producers.get(index));
        match producer {
            Some(producer) => producer.terms(field),
            None => Ok(None),
        }
    }

    fn fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self
            .producers
            .values()
            .flat_map(|producer| producer.fields())
            .collect();
        fields.sort();
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::block::BlockPostingsFormat;
    use crate::codec::config::BlockConfig;
    use crate::codec::field_infos::{FieldInfos, IndexOptions};
    use crate::codec::memory::MemoryPostingsFormat;
    use crate::codec::terms::TermStats;
    use crate::storage::Storage;
    use crate::storage::memory::MemoryStorage;

    fn palette() -> Vec<PostingsFormat> {
        vec![
            PostingsFormat::Block(BlockPostingsFormat::new(BlockConfig::default())),
            PostingsFormat::Memory(MemoryPostingsFormat::new()),
        ]
    }

    fn write_segment(format: &RandomPerFieldPostingsFormat, fields: usize) -> SegmentReadState {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let infos: Vec<FieldInfo> = (0..fields)
            .map(|i| FieldInfo::new(format!("f{i}"), i as u32).indexed(IndexOptions::DocsOnly))
            .collect();
        let infos = Arc::new(FieldInfos::new(infos).unwrap());
        let state = SegmentWriteState::new(Arc::clone(&storage), "_2", 4, Arc::clone(&infos));

        let mut consumer = format.fields_consumer(&state).unwrap();
        for info in infos.iter() {
            let mut terms = consumer.add_field(info).unwrap();
            let term = info.name.as_bytes();
            let postings = terms.start_term(term).unwrap();
            postings.start_doc(info.number as i32 % 4, 1).unwrap();
            postings.finish_doc().unwrap();
            terms.finish_term(term, TermStats::new(1, -1)).unwrap();
            terms.finish(-1, 1, 1).unwrap();
        }
        consumer.close().unwrap();
        SegmentReadState::new(storage, "_2", infos)
    }

    #[test]
    fn test_pick_is_deterministic() {
        let format = RandomPerFieldPostingsFormat::new(palette(), Some(7));
        for field in 0..20 {
            assert_eq!(format.pick(7, field), format.pick(7, field));
            assert!(format.pick(7, field) < 2);
        }
    }

    #[test]
    fn test_roundtrip_with_fixed_seed() {
        let format = RandomPerFieldPostingsFormat::new(palette(), Some(1234));
        let state = write_segment(&format, 12);

        let files = state.storage.list_files().unwrap();
        assert!(files.contains(&"_2.rpf".to_string()));

        let reader = RandomFieldsReader::open(&format, &state).unwrap();
        assert_eq!(reader.seed(), 1234);
        assert_eq!(reader.fields().len(), 12);
        for i in 0..12u32 {
            let field = format!("f{i}");
            let terms = reader.terms(&field).unwrap().unwrap();
            let mut terms_enum = terms.iterator().unwrap();
            assert_eq!(terms_enum.next().unwrap(), Some(field.as_bytes()));
            let mut docs = terms_enum.docs(None).unwrap();
            assert_eq!(docs.next_doc().unwrap(), i as i32 % 4);
        }
        assert!(reader.terms("nope").unwrap().is_none());
    }

    #[test]
    fn test_sub_formats_use_suffixes() {
        let format = RandomPerFieldPostingsFormat::new(palette(), None);
        let state = write_segment(&format, 30);
        let files = state.storage.list_files().unwrap();
        for file in &files {
            assert!(
                file == "_2.rpf" || file.starts_with("_2_Block0.") || file.starts_with("_2_Memory1."),
                "unexpected file {file}"
            );
        }
    }

    #[test]
    fn test_palette_index_out_of_range() {
        let format = RandomPerFieldPostingsFormat::new(palette(), Some(3));
        let state = write_segment(&format, 1);

        let mut out = StructWriter::new(state.storage.create_output("_2.rpf").unwrap());
        codec_util::write_header(&mut out, CODEC, VERSION_CURRENT).unwrap();
        out.write_vlong(3).unwrap();
        out.write_vint(1).unwrap();
        out.write_vint(0).unwrap();
        out.write_vint(5).unwrap();
        codec_util::write_footer(&mut out).unwrap();
        out.close().unwrap();

        let err = RandomFieldsReader::open(&format, &state).unwrap_err();
        assert!(err.is_corruption());
    }
}
