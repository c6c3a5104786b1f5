//! Segment-level entry points of a postings format.

use std::fmt::Debug;
use std::sync::Arc;

use crate::codec::field_infos::FieldInfo;
use crate::codec::terms::{Terms, TermsConsumer};
use crate::error::Result;

/// Writes the postings of one segment, field by field.
///
/// Fields may be added in any order, each at most once. Call
/// [`close`](Self::close) after the last field to seal the files.
pub trait FieldsConsumer {
    /// Begin a field and return the consumer for its terms.
    fn add_field(&mut self, field: &FieldInfo) -> Result<Box<dyn TermsConsumer + '_>>;

    /// Seal the segment's postings files.
    fn close(self: Box<Self>) -> Result<()>;
}

/// Read access to the postings of one segment.
pub trait FieldsProducer: Send + Sync + Debug {
    /// The term dictionary of `field`, or `None` if it has no postings.
    fn terms(&self, field: &str) -> Result<Option<Arc<dyn Terms>>>;

    /// Names of the fields with postings, sorted.
    fn fields(&self) -> Vec<String>;

    /// Number of fields with postings.
    fn size(&self) -> usize {
        self.fields().len()
    }
}
