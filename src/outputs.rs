//! Output-sharing algebra for term dictionaries.
//!
//! An [`Outputs`] implementation describes how values attached to dictionary
//! keys are factored along shared key prefixes: [`Outputs::common`] finds the
//! part two outputs share, [`Outputs::subtract`] removes a factored prefix and
//! [`Outputs::add`] puts it back. [`OutputTrie`] uses these to push outputs
//! toward the root, so keys with a common prefix and similar values share
//! storage.
//!
//! [`ListOfOutputs`] lifts a scalar algebra to one where a key may carry
//! several values, produced by inserting the same key more than once.

use std::fmt::Debug;

use crate::error::{QuiverError, Result};
use crate::util::bytes::ByteCursor;

pub mod byte_sequence;
pub mod list;
pub mod positive_int;
pub mod trie;

pub use byte_sequence::ByteSequenceOutputs;
pub use list::{ListOfOutputs, OutputValue};
pub use positive_int::PositiveIntOutputs;
pub use trie::OutputTrie;

/// An algebra over the values attached to dictionary keys.
///
/// Outputs are immutable values; no operation mutates its arguments.
pub trait Outputs: Send + Sync + Debug {
    /// The value type.
    type Output: Clone + PartialEq + Debug + Send + Sync;

    /// The "no output" sentinel, identity of [`add`](Self::add).
    fn no_output(&self) -> Self::Output;

    /// The greatest output shared by `a` and `b`.
    fn common(&self, a: &Self::Output, b: &Self::Output) -> Self::Output;

    /// Remove the factored prefix `inc` from `output`.
    fn subtract(&self, output: &Self::Output, inc: &Self::Output) -> Self::Output;

    /// Prepend `prefix` to `output`.
    fn add(&self, prefix: &Self::Output, output: &Self::Output) -> Self::Output;

    /// Combine two outputs attached to the same key, `first` before `second`.
    fn merge(&self, _first: &Self::Output, _second: &Self::Output) -> Result<Self::Output> {
        Err(QuiverError::unsupported(format!(
            "{self:?} cannot attach more than one output to a key"
        )))
    }

    /// Append the wire form of `output`.
    fn write(&self, output: &Self::Output, out: &mut Vec<u8>);

    /// Read an output written by [`write`](Self::write).
    fn read(&self, input: &mut ByteCursor) -> Result<Self::Output>;

    /// Append the wire form of a final (end-of-key) output.
    fn write_final_output(&self, output: &Self::Output, out: &mut Vec<u8>) {
        self.write(output, out)
    }

    /// Read an output written by [`write_final_output`](Self::write_final_output).
    fn read_final_output(&self, input: &mut ByteCursor) -> Result<Self::Output> {
        self.read(input)
    }

    /// Human readable rendering, for diagnostics only.
    fn output_to_string(&self, output: &Self::Output) -> String;
}
