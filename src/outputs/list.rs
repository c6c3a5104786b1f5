//! Lifts a scalar [`Outputs`] to keys carrying one or more values.
//!
//! Wire form: a VInt count `N`, then `N` scalar outputs. A count of one reads
//! back as [`OutputValue::Scalar`], so a single-element list does not survive
//! a round trip as a list. That normalization is part of the format. A count
//! of zero is [`OutputValue::Empty`].
//!
//! [`OutputValue::Empty`] is the "no output" value. It is distinct from every
//! scalar, including the wrapped algebra's own zero: subtracting equal values
//! yields `Scalar(zero)`, a real value relative to its trie prefix.

use crate::error::Result;
use crate::outputs::Outputs;
use crate::util::bytes::ByteCursor;
use crate::util::varint;

/// One value, or several values attached to the same key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputValue<T> {
    Empty,
    Scalar(T),
    List(Vec<T>),
}

impl<T: Clone> OutputValue<T> {
    /// The values in order, a scalar as a single element.
    pub fn as_list(&self) -> Vec<T> {
        match self {
            OutputValue::Empty => Vec::new(),
            OutputValue::Scalar(value) => vec![value.clone()],
            OutputValue::List(values) => values.clone(),
        }
    }

    /// Whether this holds more than one value.
    pub fn is_list(&self) -> bool {
        matches!(self, OutputValue::List(_))
    }
}

/// Wraps a scalar algebra so that repeated keys merge into ordered lists.
#[derive(Debug, Clone, Default)]
pub struct ListOfOutputs<O> {
    inner: O,
}

impl<O: Outputs> ListOfOutputs<O> {
    pub fn new(inner: O) -> Self {
        ListOfOutputs { inner }
    }

    /// The wrapped scalar algebra.
    pub fn inner(&self) -> &O {
        &self.inner
    }

    fn scalar<'a>(&self, value: &'a OutputValue<O::Output>, op: &str) -> &'a O::Output {
        match value {
            OutputValue::Scalar(value) => value,
            OutputValue::Empty => panic!("{op} is not defined for the empty output"),
            OutputValue::List(_) => panic!("{op} is only defined for single outputs"),
        }
    }
}

impl<O: Outputs> Outputs for ListOfOutputs<O> {
    type Output = OutputValue<O::Output>;

    fn no_output(&self) -> Self::Output {
        OutputValue::Empty
    }

    fn common(&self, a: &Self::Output, b: &Self::Output) -> Self::Output {
        if matches!(a, OutputValue::Empty) || matches!(b, OutputValue::Empty) {
            return OutputValue::Empty;
        }
        let a = self.scalar(a, "common");
        let b = self.scalar(b, "common");
        OutputValue::Scalar(self.inner.common(a, b))
    }

    fn subtract(&self, output: &Self::Output, inc: &Self::Output) -> Self::Output {
        if matches!(inc, OutputValue::Empty) {
            return output.clone();
        }
        let output = self.scalar(output, "subtract");
        let inc = self.scalar(inc, "subtract");
        OutputValue::Scalar(self.inner.subtract(output, inc))
    }

    fn add(&self, prefix: &Self::Output, output: &Self::Output) -> Self::Output {
        if matches!(prefix, OutputValue::Empty) {
            return output.clone();
        }
        let prefix = self.scalar(prefix, "add");
        match output {
            OutputValue::Empty => OutputValue::Scalar(prefix.clone()),
            OutputValue::Scalar(value) => OutputValue::Scalar(self.inner.add(prefix, value)),
            OutputValue::List(values) => OutputValue::List(
                values.iter().map(|value| self.inner.add(prefix, value)).collect(),
            ),
        }
    }

    fn merge(&self, first: &Self::Output, second: &Self::Output) -> Result<Self::Output> {
        match (first, second) {
            (OutputValue::Empty, other) | (other, OutputValue::Empty) => Ok(other.clone()),
            _ => {
                let mut values = first.as_list();
                values.extend(second.as_list());
                Ok(OutputValue::List(values))
            }
        }
    }

    fn write(&self, output: &Self::Output, out: &mut Vec<u8>) {
        let scalar = self.scalar(output, "write");
        self.inner.write(scalar, out);
    }

    fn read(&self, input: &mut ByteCursor) -> Result<Self::Output> {
        Ok(OutputValue::Scalar(self.inner.read(input)?))
    }

    fn write_final_output(&self, output: &Self::Output, out: &mut Vec<u8>) {
        match output {
            OutputValue::Empty => varint::encode_vint_into(0, out),
            OutputValue::Scalar(value) => {
                varint::encode_vint_into(1, out);
                self.inner.write(value, out);
            }
            OutputValue::List(values) => {
                varint::encode_vint_into(values.len() as u32, out);
                for value in values {
                    self.inner.write(value, out);
                }
            }
        }
    }

    fn read_final_output(&self, input: &mut ByteCursor) -> Result<Self::Output> {
        let count = input.read_vint()? as usize;
        match count {
            0 => Ok(OutputValue::Empty),
            1 => Ok(OutputValue::Scalar(self.inner.read(input)?)),
            _ => {
                let mut values = Vec::with_capacity(count.min(input.remaining()));
                for _ in 0..count {
                    values.push(self.inner.read(input)?);
                }
                Ok(OutputValue::List(values))
            }
        }
    }

    fn output_to_string(&self, output: &Self::Output) -> String {
        match output {
            OutputValue::Empty => "NO_OUTPUT".to_string(),
            OutputValue::Scalar(value) => self.inner.output_to_string(value),
            OutputValue::List(values) => {
                let parts: Vec<String> = values
                    .iter()
                    .map(|value| self.inner.output_to_string(value))
                    .collect();
                format!("[{}]", parts.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outputs::PositiveIntOutputs;
    use std::sync::Arc;

    fn outputs() -> ListOfOutputs<PositiveIntOutputs> {
        ListOfOutputs::new(PositiveIntOutputs::new())
    }

    #[test]
    fn test_merge_flattens_in_order() {
        let outputs = outputs();
        let a = OutputValue::List(vec![1, 2]);
        let b = OutputValue::Scalar(3);
        let merged = outputs.merge(&a, &b).unwrap();
        assert_eq!(merged, OutputValue::List(vec![1, 2, 3]));
        assert_eq!(merged.as_list(), [a.as_list(), b.as_list()].concat());
    }

    #[test]
    fn test_empty_is_merge_and_add_identity() {
        let outputs = outputs();
        let empty = outputs.no_output();
        for x in [OutputValue::Scalar(0), OutputValue::Scalar(5), OutputValue::List(vec![1, 2])] {
            assert_ne!(empty, x);
            assert_eq!(outputs.merge(&empty, &x).unwrap(), x);
            assert_eq!(outputs.merge(&x, &empty).unwrap(), x);
            assert_eq!(outputs.add(&empty, &x), x);
        }
        assert_eq!(outputs.add(&OutputValue::Scalar(4), &empty), OutputValue::Scalar(4));
        assert_eq!(outputs.merge(&empty, &empty).unwrap(), empty);
    }

    #[test]
    fn test_merge_keeps_relative_zero() {
        // Inside a trie, merged values are relative to the path prefix, so a
        // scalar zero is a real value and must be kept.
        let outputs = outputs();
        let merged = outputs
            .merge(&OutputValue::Scalar(0), &OutputValue::Scalar(1))
            .unwrap();
        assert_eq!(merged, OutputValue::List(vec![0, 1]));
        assert_eq!(
            outputs.add(&OutputValue::Scalar(1), &merged),
            OutputValue::List(vec![1, 2])
        );
    }

    #[test]
    fn test_add_applies_to_every_element() {
        let outputs = outputs();
        let list = OutputValue::List(vec![1, 5]);
        assert_eq!(
            outputs.add(&OutputValue::Scalar(10), &list),
            OutputValue::List(vec![11, 15])
        );
        assert_eq!(outputs.add(&outputs.no_output(), &list), list);
    }

    #[test]
    fn test_scalar_laws() {
        let outputs = outputs();
        let p = OutputValue::Scalar(3);
        let x = OutputValue::Scalar(8);
        assert_eq!(outputs.subtract(&outputs.add(&p, &x), &p), x);
        assert_eq!(outputs.common(&x, &x), x);
        assert_eq!(outputs.subtract(&x, &x), OutputValue::Scalar(0));
        assert_eq!(outputs.subtract(&x, &outputs.no_output()), x);
        assert_eq!(outputs.common(&x, &outputs.no_output()), outputs.no_output());
    }

    #[test]
    fn test_final_output_wire_form() {
        let outputs = outputs();
        let mut bytes = Vec::new();
        outputs.write_final_output(&OutputValue::List(vec![1, 2, 3]), &mut bytes);
        outputs.write_final_output(&OutputValue::List(vec![9]), &mut bytes);
        outputs.write_final_output(&OutputValue::Scalar(7), &mut bytes);
        assert_eq!(&bytes[..4], &[3, 1, 2, 3]);

        let mut cursor = ByteCursor::over(Arc::from(bytes));
        assert_eq!(
            outputs.read_final_output(&mut cursor).unwrap(),
            OutputValue::List(vec![1, 2, 3])
        );
        // A single-element list collapses to a scalar.
        assert_eq!(outputs.read_final_output(&mut cursor).unwrap(), OutputValue::Scalar(9));
        assert_eq!(outputs.read_final_output(&mut cursor).unwrap(), OutputValue::Scalar(7));
    }

    #[test]
    fn test_zero_count_reads_as_empty() {
        let outputs = outputs();
        let mut bytes = Vec::new();
        outputs.write_final_output(&OutputValue::Empty, &mut bytes);
        assert_eq!(bytes, vec![0u8]);
        let mut cursor = ByteCursor::over(Arc::from(bytes));
        assert_eq!(outputs.read_final_output(&mut cursor).unwrap(), OutputValue::Empty);
    }

    #[test]
    fn test_output_to_string() {
        let outputs = outputs();
        assert_eq!(outputs.output_to_string(&OutputValue::Scalar(5)), "5");
        assert_eq!(
            outputs.output_to_string(&OutputValue::List(vec![1, 2, 3])),
            "[1, 2, 3]"
        );
    }

    #[test]
    #[should_panic]
    fn test_common_of_list_panics() {
        let outputs = outputs();
        outputs.common(&OutputValue::List(vec![1, 2]), &OutputValue::Scalar(1));
    }
}
