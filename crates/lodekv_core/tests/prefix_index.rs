//! Model test: the radix index answers prefix queries exactly like a sorted
//! set of the same keys.

use lodekv_core::index::RadixTree;
use proptest::prelude::*;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
enum Step {
    Insert(Vec<u8>),
    Remove(Vec<u8>),
}

fn key() -> impl Strategy<Value = Vec<u8>> {
    // Small alphabet so keys share prefixes and labels split often.
    prop::collection::vec(prop::sample::select(vec![b'a', b'b', b'/', 0u8, 0xff]), 0..8)
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => key().prop_map(Step::Insert),
        1 => key().prop_map(Step::Remove),
    ]
}

fn expected(model: &BTreeSet<Vec<u8>>, prefix: &[u8]) -> Vec<Vec<u8>> {
    model.iter().filter(|k| k.starts_with(prefix)).cloned().collect()
}

fn actual(tree: &RadixTree, prefix: &[u8]) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    tree.visit_prefix(prefix, |k| out.push(k.to_vec()));
    out
}

proptest! {
    #[test]
    fn prefix_queries_match_sorted_set(
        steps in prop::collection::vec(step(), 0..64),
        prefixes in prop::collection::vec(key(), 1..8),
    ) {
        let mut tree = RadixTree::default();
        let mut model = BTreeSet::new();

        for step in steps {
            match step {
                Step::Insert(k) => {
                    let added = tree.insert(&k);
                    if k.is_empty() {
                        prop_assert!(!added);
                    } else {
                        prop_assert_eq!(added, model.insert(k));
                    }
                }
                Step::Remove(k) => {
                    prop_assert_eq!(tree.remove(&k), model.remove(&k));
                }
            }
        }

        prop_assert_eq!(tree.len(), model.len());
        for k in &model {
            prop_assert!(tree.contains(k));
        }
        for prefix in prefixes {
            prop_assert_eq!(actual(&tree, &prefix), expected(&model, &prefix));
        }
    }
}
