use std::collections::BTreeMap;
use std::sync::Arc;

use quiver::outputs::{
    ByteSequenceOutputs, ListOfOutputs, OutputTrie, OutputValue, Outputs, PositiveIntOutputs,
};
use quiver::util::bytes::ByteCursor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_key(rng: &mut StdRng) -> Vec<u8> {
    let len = rng.random_range(0..6);
    (0..len).map(|_| b"cato"[rng.random_range(0..4)]).collect()
}

#[test]
fn test_algebra_laws() {
    let mut rng = StdRng::seed_from_u64(3);
    let ints = PositiveIntOutputs::new();
    let bytes = ByteSequenceOutputs::new();

    for _ in 0..500 {
        let p: u64 = rng.random_range(0..1000);
        let x: u64 = rng.random_range(0..1000);
        assert_eq!(ints.subtract(&ints.add(&p, &x), &p), x);
        assert_eq!(ints.common(&x, &x), x);
        assert_eq!(ints.add(&ints.no_output(), &x), x);

        let p = random_key(&mut rng);
        let x = random_key(&mut rng);
        assert_eq!(bytes.subtract(&bytes.add(&p, &x), &p), x);
        assert_eq!(bytes.common(&x, &x), x);
        assert_eq!(bytes.add(&bytes.no_output(), &x), x);
    }
}

#[test]
fn test_merge_flattens() {
    let lists = ListOfOutputs::new(PositiveIntOutputs::new());
    let a = OutputValue::List(vec![4, 5]);
    let b = OutputValue::Scalar(6);
    let merged = lists.merge(&a, &b).unwrap();
    assert_eq!(merged.as_list(), [a.as_list(), b.as_list()].concat());
    assert_eq!(lists.merge(&b, &a).unwrap(), OutputValue::List(vec![6, 4, 5]));
}

#[test]
fn test_trie_matches_model() {
    let mut rng = StdRng::seed_from_u64(11);
    let outputs = ListOfOutputs::new(PositiveIntOutputs::new());
    let mut trie = OutputTrie::new(outputs.clone());
    let mut model: BTreeMap<Vec<u8>, Vec<u64>> = BTreeMap::new();

    for _ in 0..300 {
        let key = random_key(&mut rng);
        let value = rng.random_range(0..50);
        trie.insert(&key, OutputValue::Scalar(value)).unwrap();
        model.entry(key).or_default().push(value);
    }

    let expected: Vec<(Vec<u8>, OutputValue<u64>)> = model
        .into_iter()
        .map(|(key, values)| {
            let value = if values.len() == 1 {
                OutputValue::Scalar(values[0])
            } else {
                OutputValue::List(values)
            };
            (key, value)
        })
        .collect();
    assert_eq!(trie.len(), expected.len());
    assert_eq!(trie.iter().collect::<Vec<_>>(), expected);

    let mut reversed = expected.clone();
    reversed.reverse();
    assert_eq!(trie.iter_rev().collect::<Vec<_>>(), reversed);

    let mut bytes = Vec::new();
    trie.write(&mut bytes);
    let mut cursor = ByteCursor::over(Arc::from(bytes));
    let read = OutputTrie::read(outputs, &mut cursor).unwrap();
    assert!(cursor.is_eof());
    assert_eq!(read.iter().collect::<Vec<_>>(), expected);
    for (key, value) in &expected {
        assert_eq!(read.get(key).as_ref(), Some(value));
    }
}

#[test]
fn test_singleton_list_reads_back_as_scalar() {
    let outputs = ListOfOutputs::new(PositiveIntOutputs::new());
    let mut out = Vec::new();
    outputs.write_final_output(&OutputValue::List(vec![9]), &mut out);

    let mut cursor = ByteCursor::over(Arc::from(out));
    assert_eq!(outputs.read_final_output(&mut cursor).unwrap(), OutputValue::Scalar(9));
}
