//! Byte string outputs, factored by common prefix.

use crate::error::Result;
use crate::outputs::Outputs;
use crate::util::bytes::ByteCursor;
use crate::util::varint;

/// Outputs over byte strings where the empty string is the "no output" value.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteSequenceOutputs;

impl ByteSequenceOutputs {
    pub fn new() -> Self {
        ByteSequenceOutputs
    }
}

impl Outputs for ByteSequenceOutputs {
    type Output = Vec<u8>;

    fn no_output(&self) -> Vec<u8> {
        Vec::new()
    }

    fn common(&self, a: &Vec<u8>, b: &Vec<u8>) -> Vec<u8> {
        let shared = a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count();
        a[..shared].to_vec()
    }

    fn subtract(&self, output: &Vec<u8>, inc: &Vec<u8>) -> Vec<u8> {
        assert!(
            output.starts_with(inc),
            "{inc:?} is not a prefix of {output:?}"
        );
        output[inc.len()..].to_vec()
    }

    fn add(&self, prefix: &Vec<u8>, output: &Vec<u8>) -> Vec<u8> {
        let mut result = Vec::with_capacity(prefix.len() + output.len());
        result.extend_from_slice(prefix);
        result.extend_from_slice(output);
        result
    }

    fn write(&self, output: &Vec<u8>, out: &mut Vec<u8>) {
        varint::encode_vint_into(output.len() as u32, out);
        out.extend_from_slice(output);
    }

    fn read(&self, input: &mut ByteCursor) -> Result<Vec<u8>> {
        input.read_bytes()
    }

    fn output_to_string(&self, output: &Vec<u8>) -> String {
        let hex: Vec<String> = output.iter().map(|b| format!("{b:02x}")).collect();
        format!("[{}]", hex.join(" "))
    }
}
