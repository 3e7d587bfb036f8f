//! Property tests for the weighted selection tree

use hostdb::WeightedTree;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
enum Op {
    Insert(u8, u64),
    Remove(u8),
    Reweight(u8, u64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<u8>(), 1u64..1_000_000).prop_map(|(k, w)| Op::Insert(k, w)),
        any::<u8>().prop_map(Op::Remove),
        (any::<u8>(), 0u64..1_000_000).prop_map(|(k, w)| Op::Reweight(k, w)),
    ]
}

proptest! {
    #[test]
    fn tree_matches_model(ops in prop::collection::vec(op(), 1..300)) {
        let mut tree: WeightedTree<u32> = WeightedTree::new();
        let mut model: HashMap<u32, u64> = HashMap::new();

        for op in ops {
            match op {
                Op::Insert(k, w) => {
                    let k = k as u32;
                    let result = tree.insert(k, w);
                    prop_assert_eq!(result.is_ok(), !model.contains_key(&k));
                    model.entry(k).or_insert(w);
                }
                Op::Remove(k) => {
                    let k = k as u32;
                    let result = tree.remove(&k);
                    prop_assert_eq!(result.ok(), model.remove(&k));
                }
                Op::Reweight(k, w) => {
                    let k = k as u32;
                    let result = tree.reweight(&k, w);
                    prop_assert_eq!(result.is_ok(), model.contains_key(&k));
                    if result.is_ok() {
                        if w == 0 {
                            model.remove(&k);
                        } else {
                            model.insert(k, w);
                        }
                    }
                }
            }

            prop_assert!(tree.check_invariants().is_ok());
            prop_assert_eq!(tree.len(), model.len());
            prop_assert_eq!(tree.total_weight(), model.values().sum::<u64>());
        }

        for (k, w) in &model {
            prop_assert_eq!(tree.weight_of(k), Some(*w));
        }
    }

    #[test]
    fn selection_is_distinct_and_bounded(
        weights in prop::collection::vec(1u64..1_000, 0..64),
        n in 0usize..80,
        seed in any::<u64>(),
    ) {
        let mut tree = WeightedTree::new();
        for (i, w) in weights.iter().enumerate() {
            tree.insert(i as u32, *w).unwrap();
        }
        let exclude: Vec<u32> = (0..weights.len() as u32).step_by(3).collect();
        let mut rng = StdRng::seed_from_u64(seed);

        let picked = tree.select_random_with(n, &exclude, &mut rng);
        let unique: HashSet<u32> = picked.iter().copied().collect();
        prop_assert_eq!(unique.len(), picked.len());
        prop_assert_eq!(picked.len(), n.min(weights.len() - exclude.len()));
        prop_assert!(picked.iter().all(|k| !exclude.contains(k)));
    }
}
