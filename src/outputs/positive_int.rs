//! Non-negative integer outputs (counts, ordinals, file pointers).

use crate::error::Result;
use crate::outputs::Outputs;
use crate::util::bytes::ByteCursor;
use crate::util::varint;

/// Outputs over `u64` where `0` is the "no output" value.
///
/// The shared part of two values is their minimum, so along a trie path the
/// outputs sum to the stored value.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositiveIntOutputs;

impl PositiveIntOutputs {
    pub fn new() -> Self {
        PositiveIntOutputs
    }
}

impl Outputs for PositiveIntOutputs {
    type Output = u64;

    fn no_output(&self) -> u64 {
        0
    }

    fn common(&self, a: &u64, b: &u64) -> u64 {
        (*a).min(*b)
    }

    fn subtract(&self, output: &u64, inc: &u64) -> u64 {
        assert!(inc <= output, "cannot subtract {inc} from {output}");
        output - inc
    }

    fn add(&self, prefix: &u64, output: &u64) -> u64 {
        prefix + output
    }

    fn write(&self, output: &u64, out: &mut Vec<u8>) {
        varint::encode_vlong_into(*output, out);
    }

    fn read(&self, input: &mut ByteCursor) -> Result<u64> {
        input.read_vlong()
    }

    fn output_to_string(&self, output: &u64) -> String {
        output.to_string()
    }
}
