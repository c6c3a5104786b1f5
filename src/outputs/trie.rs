//! A byte-keyed trie whose outputs are pushed toward the root.
//!
//! Every arc carries the output shared by all keys below it; the remainder is
//! kept on deeper arcs and on the final node of each key. Inserting a key that
//! is already present merges the new output into the existing one, which is
//! how a key comes to carry a list of outputs.
//!
//! # Wire form
//!
//! ```text
//! vint  node count
//! repeated per node (node 0 is the root, children follow their parent):
//!   u8    flags          bit0 final, bit1 final output present
//!   [final output]
//!   vint  arc count
//!   repeated per arc, ascending label:
//!     u8    label
//!     vint  (target << 1) | output present
//!     [output]
//! ```

use crate::error::{QuiverError, Result};
use crate::outputs::Outputs;
use crate::util::bytes::ByteCursor;
use crate::util::varint;

const FLAG_FINAL: u8 = 0x1;
const FLAG_FINAL_OUTPUT: u8 = 0x2;

#[derive(Debug, Clone)]
struct Edge<T> {
    label: u8,
    output: T,
    target: usize,
}

#[derive(Debug, Clone)]
struct Node<T> {
    arcs: Vec<Edge<T>>,
    final_output: Option<T>,
}

impl<T> Node<T> {
    fn empty() -> Self {
        Node {
            arcs: Vec::new(),
            final_output: None,
        }
    }
}

/// A trie mapping byte keys to outputs of an [`Outputs`] algebra.
#[derive(Debug, Clone)]
pub struct OutputTrie<O: Outputs> {
    outputs: O,
    nodes: Vec<Node<O::Output>>,
    len: usize,
}

impl<O: Outputs> OutputTrie<O> {
    /// Create an empty trie.
    pub fn new(outputs: O) -> Self {
        OutputTrie {
            outputs,
            nodes: vec![Node::empty()],
            len: 0,
        }
    }

    /// The output algebra.
    pub fn outputs(&self) -> &O {
        &self.outputs
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the trie holds no keys.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn new_node(&mut self) -> usize {
        self.nodes.push(Node::empty());
        self.nodes.len() - 1
    }

    fn push_prefix(&mut self, node: usize, prefix: &O::Output) {
        let outputs = &self.outputs;
        let node = &mut self.nodes[node];
        for arc in &mut node.arcs {
            arc.output = outputs.add(prefix, &arc.output);
        }
        if let Some(output) = node.final_output.as_mut() {
            *output = outputs.add(prefix, output);
        }
    }

    /// Insert `key` with `output`.
    ///
    /// If the key is already present the outputs are merged, existing first;
    /// this fails for algebras that cannot merge.
    pub fn insert(&mut self, key: &[u8], output: O::Output) -> Result<()> {
        let no_output = self.outputs.no_output();
        let mut node = 0;
        let mut remaining = output;

        for (i, &label) in key.iter().enumerate() {
            match self.nodes[node].arcs.binary_search_by_key(&label, |arc| arc.label) {
                Ok(idx) => {
                    let arc = &self.nodes[node].arcs[idx];
                    let target = arc.target;
                    let common = self.outputs.common(&arc.output, &remaining);
                    if common != arc.output {
                        let pushed = self.outputs.subtract(&arc.output, &common);
                        self.nodes[node].arcs[idx].output = common.clone();
                        self.push_prefix(target, &pushed);
                    }
                    remaining = self.outputs.subtract(&remaining, &common);
                    node = target;
                }
                Err(idx) => {
                    // The final output of the new key is the zero relative to
                    // its path, a real value rather than "no output".
                    let relative_zero = self.outputs.subtract(&remaining, &remaining);
                    let target = self.new_node();
                    self.nodes[node].arcs.insert(
                        idx,
                        Edge {
                            label,
                            output: remaining,
                            target,
                        },
                    );
                    remaining = relative_zero;
                    node = target;
                    for &label in &key[i + 1..] {
                        let target = self.new_node();
                        self.nodes[node].arcs.push(Edge {
                            label,
                            output: no_output.clone(),
                            target,
                        });
                        node = target;
                    }
                    break;
                }
            }
        }

        let merged = match &self.nodes[node].final_output {
            Some(existing) => self.outputs.merge(existing, &remaining)?,
            None => {
                self.len += 1;
                remaining
            }
        };
        self.nodes[node].final_output = Some(merged);
        Ok(())
    }

    /// Look up the output of `key`.
    pub fn get(&self, key: &[u8]) -> Option<O::Output> {
        let mut node = 0;
        let mut output = self.outputs.no_output();
        for &label in key {
            let arcs = &self.nodes[node].arcs;
            let idx = arcs.binary_search_by_key(&label, |arc| arc.label).ok()?;
            output = self.outputs.add(&output, &arcs[idx].output);
            node = arcs[idx].target;
        }
        let final_output = self.nodes[node].final_output.as_ref()?;
        Some(self.outputs.add(&output, final_output))
    }

    /// Iterate over `(key, output)` pairs in ascending byte order.
    pub fn iter(&self) -> Entries<'_, O> {
        Entries::new(self, false)
    }

    /// Iterate over `(key, output)` pairs in descending byte order.
    pub fn iter_rev(&self) -> Entries<'_, O> {
        Entries::new(self, true)
    }

    /// Append the serialized trie to `out`.
    pub fn write(&self, out: &mut Vec<u8>) {
        let no_output = self.outputs.no_output();
        varint::encode_vint_into(self.nodes.len() as u32, out);
        for node in &self.nodes {
            match &node.final_output {
                Some(output) if *output != no_output => {
                    out.push(FLAG_FINAL | FLAG_FINAL_OUTPUT);
                    self.outputs.write_final_output(output, out);
                }
                Some(_) => out.push(FLAG_FINAL),
                None => out.push(0),
            }
            varint::encode_vint_into(node.arcs.len() as u32, out);
            for arc in &node.arcs {
                out.push(arc.label);
                let has_output = arc.output != no_output;
                varint::encode_vlong_into(((arc.target as u64) << 1) | has_output as u64, out);
                if has_output {
                    self.outputs.write(&arc.output, out);
                }
            }
        }
    }

    /// Read a trie written by [`write`](Self::write).
    pub fn read(outputs: O, input: &mut ByteCursor) -> Result<Self> {
        let corrupt = |message: String| QuiverError::corrupt("output trie", message);

        let count = input.read_vint()? as usize;
        if count == 0 {
            return Err(corrupt("trie without a root node".to_string()));
        }

        let no_output = outputs.no_output();
        let mut nodes = Vec::with_capacity(count.min(input.remaining()));
        let mut len = 0;
        for index in 0..count {
            let flags = input.read_u8()?;
            let final_output = if flags & FLAG_FINAL_OUTPUT != 0 {
                Some(outputs.read_final_output(input)?)
            } else if flags & FLAG_FINAL != 0 {
                Some(no_output.clone())
            } else {
                None
            };
            if final_output.is_some() {
                len += 1;
            }

            let arc_count = input.read_vint()? as usize;
            let mut arcs: Vec<Edge<O::Output>> = Vec::with_capacity(arc_count.min(256));
            for _ in 0..arc_count {
                let label = input.read_u8()?;
                let packed = input.read_vlong()?;
                let target = (packed >> 1) as usize;
                if target <= index || target >= count {
                    return Err(corrupt(format!(
                        "arc from node {index} to invalid target {target}"
                    )));
                }
                if arcs.last().is_some_and(|last| last.label >= label) {
                    return Err(corrupt(format!("unsorted arcs at node {index}")));
                }
                let output = if packed & 1 != 0 {
                    outputs.read(input)?
                } else {
                    no_output.clone()
                };
                arcs.push(Edge {
                    label,
                    output,
                    target,
                });
            }
            nodes.push(Node { arcs, final_output });
        }

        Ok(OutputTrie {
            outputs,
            nodes,
            len,
        })
    }
}

struct Frame<T> {
    node: usize,
    visited_arcs: usize,
    prefix: T,
    final_done: bool,
}

/// Iterator over the entries of an [`OutputTrie`].
///
/// Walks the trie with an explicit stack. In ascending order a key is
/// emitted before its extensions, in descending order after them.
pub struct Entries<'a, O: Outputs> {
    trie: &'a OutputTrie<O>,
    descending: bool,
    key: Vec<u8>,
    stack: Vec<Frame<O::Output>>,
}

impl<'a, O: Outputs> Entries<'a, O> {
    fn new(trie: &'a OutputTrie<O>, descending: bool) -> Self {
        Entries {
            trie,
            descending,
            key: Vec::new(),
            stack: vec![Frame {
                node: 0,
                visited_arcs: 0,
                prefix: trie.outputs.no_output(),
                final_done: false,
            }],
        }
    }
}

impl<O: Outputs> Iterator for Entries<'_, O> {
    type Item = (Vec<u8>, O::Output);

    fn next(&mut self) -> Option<Self::Item> {
        let trie = self.trie;
        loop {
            let frame = self.stack.last_mut()?;
            let node = &trie.nodes[frame.node];

            if !self.descending && !frame.final_done {
                frame.final_done = true;
                if let Some(output) = &node.final_output {
                    return Some((self.key.clone(), trie.outputs.add(&frame.prefix, output)));
                }
            }

            if frame.visited_arcs < node.arcs.len() {
                let idx = if self.descending {
                    node.arcs.len() - 1 - frame.visited_arcs
                } else {
                    frame.visited_arcs
                };
                frame.visited_arcs += 1;
                let arc = &node.arcs[idx];
                let prefix = trie.outputs.add(&frame.prefix, &arc.output);
                self.key.push(arc.label);
                self.stack.push(Frame {
                    node: arc.target,
                    visited_arcs: 0,
                    prefix,
                    final_done: false,
                });
                continue;
            }

            if self.descending && !frame.final_done {
                frame.final_done = true;
                if let Some(output) = &node.final_output {
                    return Some((self.key.clone(), trie.outputs.add(&frame.prefix, output)));
                }
            }

            self.stack.pop();
            if !self.stack.is_empty() {
                self.key.pop();
            }
        }
    }
}
