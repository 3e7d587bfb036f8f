//! Weighted selection tree
//!
//! A binary tree whose leaves are the eligible hosts. Every node caches the
//! sum of the leaf weights below it, so a uniform draw over the root's
//! weight can be turned into a weighted pick with a single root-to-leaf
//! descent. Branch nodes always have two children; removing a leaf
//! promotes its sibling into the parent's slot.
//!
//! Nodes live in an arena and are addressed by index. A key → leaf map
//! gives O(1) access to a leaf, parent links give the path back to the
//! root, so insert, remove and reweight are all O(depth).

use crate::entry::Weight;
use crate::errors::{TreeError, TreeResult};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::hash::Hash;

type NodeId = usize;

#[derive(Debug, Clone)]
enum NodeKind<K> {
    Leaf { key: K },
    Branch { left: NodeId, right: NodeId },
    Vacant,
}

#[derive(Debug, Clone)]
struct Node<K> {
    parent: Option<NodeId>,
    /// Sum of leaf weights in this subtree; a leaf's own weight
    subtree_weight: Weight,
    /// Live leaves in this subtree
    leaves: usize,
    kind: NodeKind<K>,
}

impl<K> Node<K> {
    fn vacant() -> Self {
        Self {
            parent: None,
            subtree_weight: 0,
            leaves: 0,
            kind: NodeKind::Vacant,
        }
    }
}

/// Weighted random selection over keys
#[derive(Debug, Clone)]
pub struct WeightedTree<K> {
    nodes: Vec<Node<K>>,
    free: Vec<NodeId>,
    root: Option<NodeId>,
    index: HashMap<K, NodeId>,
}

impl<K> Default for WeightedTree<K>
where
    K: Clone + Eq + Hash + Display,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> WeightedTree<K>
where
    K: Clone + Eq + Hash + Display,
{
    /// Create an empty tree
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            index: HashMap::new(),
        }
    }

    /// Number of leaves
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Sum of all leaf weights
    pub fn total_weight(&self) -> Weight {
        self.root.map(|root| self.nodes[root].subtree_weight).unwrap_or(0)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Weight of the leaf holding `key`
    pub fn weight_of(&self, key: &K) -> Option<Weight> {
        self.index.get(key).map(|&leaf| self.nodes[leaf].subtree_weight)
    }

    /// All keys, in no particular order
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.index.keys()
    }

    /// Insert `key` as a new leaf.
    ///
    /// Descends towards the child holding fewer leaves (lighter on ties,
    /// left when both match) and splits the leaf it lands on.
    pub fn insert(&mut self, key: K, weight: Weight) -> TreeResult<()> {
        if weight == 0 {
            return Err(TreeError::ZeroWeight(key.to_string()));
        }
        if self.index.contains_key(&key) {
            return Err(TreeError::DuplicateIdentity(key.to_string()));
        }
        let total = self.total_weight();
        if total.checked_add(weight).is_none() {
            return Err(TreeError::WeightOverflow { total, added: weight });
        }

        let leaf = self.alloc(Node {
            parent: None,
            subtree_weight: weight,
            leaves: 1,
            kind: NodeKind::Leaf { key: key.clone() },
        });
        self.index.insert(key, leaf);

        let Some(mut current) = self.root else {
            self.root = Some(leaf);
            return Ok(());
        };

        while let NodeKind::Branch { left, right } = self.nodes[current].kind {
            current = if self.prefer_left(left, right) { left } else { right };
        }

        // `current` is a leaf: put a branch in its place holding both leaves
        let parent = self.nodes[current].parent;
        let branch = self.alloc(Node {
            parent,
            subtree_weight: self.nodes[current].subtree_weight + weight,
            leaves: 2,
            kind: NodeKind::Branch { left: current, right: leaf },
        });
        self.nodes[current].parent = Some(branch);
        self.nodes[leaf].parent = Some(branch);
        self.replace_child(parent, current, branch);

        self.update_path(parent, |node| {
            node.subtree_weight += weight;
            node.leaves += 1;
        });
        Ok(())
    }

    /// Remove the leaf holding `key`, returning its weight
    pub fn remove(&mut self, key: &K) -> TreeResult<Weight> {
        let leaf = *self
            .index
            .get(key)
            .ok_or_else(|| TreeError::NotFound(key.to_string()))?;
        let weight = self.nodes[leaf].subtree_weight;

        let Some(parent) = self.nodes[leaf].parent else {
            self.index.remove(key);
            self.clear();
            return Ok(weight);
        };

        let sibling = match self.nodes[parent].kind {
            NodeKind::Branch { left, right } if left == leaf => right,
            NodeKind::Branch { left, right } if right == leaf => left,
            _ => {
                return Err(TreeError::Inconsistent(format!(
                    "leaf for {} is not a child of its parent",
                    key
                )))
            }
        };

        self.index.remove(key);

        // Collapse the parent: the sibling takes its slot
        let grandparent = self.nodes[parent].parent;
        self.nodes[sibling].parent = grandparent;
        self.replace_child(grandparent, parent, sibling);
        self.release(leaf);
        self.release(parent);

        self.update_path(grandparent, |node| {
            node.subtree_weight -= weight;
            node.leaves -= 1;
        });
        Ok(weight)
    }

    /// Change the weight of `key`. A zero weight removes it.
    pub fn reweight(&mut self, key: &K, weight: Weight) -> TreeResult<()> {
        let leaf = *self
            .index
            .get(key)
            .ok_or_else(|| TreeError::NotFound(key.to_string()))?;
        if weight == 0 {
            return self.remove(key).map(|_| ());
        }

        let old = self.nodes[leaf].subtree_weight;
        if weight > old {
            let total = self.total_weight();
            if total.checked_add(weight - old).is_none() {
                return Err(TreeError::WeightOverflow { total, added: weight - old });
            }
        }

        self.nodes[leaf].subtree_weight = weight;
        let parent = self.nodes[leaf].parent;
        self.update_path(parent, |node| {
            node.subtree_weight = node.subtree_weight - old + weight;
        });
        Ok(())
    }

    /// Draw up to `n` distinct keys, each draw proportional to weight among
    /// the keys not yet drawn and not in `exclude`.
    pub fn select_random(&self, n: usize, exclude: &[K]) -> Vec<K> {
        self.select_random_with(n, exclude, &mut rand::thread_rng())
    }

    /// [`select_random`](Self::select_random) with a caller-supplied RNG
    pub fn select_random_with<R: Rng + ?Sized>(&self, n: usize, exclude: &[K], rng: &mut R) -> Vec<K> {
        let mut picked = Vec::with_capacity(n.min(self.len()));
        let Some(root) = self.root else {
            return picked;
        };

        // Weight temporarily taken out of each subtree by excluded or
        // already drawn leaves. The tree itself is never touched.
        let mut taken: HashMap<NodeId, Weight> = HashMap::new();
        let excluded: HashSet<NodeId> = exclude.iter().filter_map(|key| self.index.get(key).copied()).collect();
        for leaf in excluded {
            self.take(leaf, &mut taken);
        }

        while picked.len() < n {
            let remaining = self.effective_weight(root, &taken);
            if remaining == 0 {
                break;
            }
            let target = rng.gen_range(0..remaining);
            let Some(leaf) = self.descend(root, target, &taken) else {
                break;
            };
            if let NodeKind::Leaf { key } = &self.nodes[leaf].kind {
                picked.push(key.clone());
            }
            self.take(leaf, &mut taken);
        }
        picked
    }

    /// Longest root-to-leaf path, in edges
    pub fn depth(&self) -> usize {
        let Some(root) = self.root else {
            return 0;
        };
        let mut deepest = 0;
        let mut stack = vec![(root, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            if let NodeKind::Branch { left, right } = self.nodes[id].kind {
                stack.push((left, depth + 1));
                stack.push((right, depth + 1));
            }
        }
        deepest
    }

    /// Walk the whole tree and check every structural invariant
    pub fn check_invariants(&self) -> TreeResult<()> {
        let Some(root) = self.root else {
            if self.index.is_empty() {
                return Ok(());
            }
            return Err(TreeError::Inconsistent(format!("no root but {} indexed keys", self.index.len())));
        };
        if self.nodes[root].parent.is_some() {
            return Err(TreeError::Inconsistent("root has a parent".into()));
        }

        let mut seen_leaves = 0;
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            match &node.kind {
                NodeKind::Vacant => {
                    return Err(TreeError::Inconsistent(format!("vacant node {} is reachable", id)));
                }
                NodeKind::Leaf { key } => {
                    if node.subtree_weight == 0 || node.leaves != 1 {
                        return Err(TreeError::Inconsistent(format!("bad leaf for {}", key)));
                    }
                    if self.index.get(key) != Some(&id) {
                        return Err(TreeError::Inconsistent(format!("index does not point at leaf for {}", key)));
                    }
                    seen_leaves += 1;
                }
                NodeKind::Branch { left, right } => {
                    let (l, r) = (&self.nodes[*left], &self.nodes[*right]);
                    if l.parent != Some(id) || r.parent != Some(id) {
                        return Err(TreeError::Inconsistent(format!("broken parent link under {}", id)));
                    }
                    if l.subtree_weight.checked_add(r.subtree_weight) != Some(node.subtree_weight) {
                        return Err(TreeError::Inconsistent(format!(
                            "subtree weight {} at {} != {} + {}",
                            node.subtree_weight, id, l.subtree_weight, r.subtree_weight
                        )));
                    }
                    if l.leaves + r.leaves != node.leaves {
                        return Err(TreeError::Inconsistent(format!("leaf count mismatch at {}", id)));
                    }
                    stack.push(*left);
                    stack.push(*right);
                }
            }
        }

        if seen_leaves != self.index.len() {
            return Err(TreeError::Inconsistent(format!(
                "{} reachable leaves, {} indexed keys",
                seen_leaves,
                self.index.len()
            )));
        }
        Ok(())
    }

    fn alloc(&mut self, node: Node<K>) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = node;
                id
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, id: NodeId) {
        self.nodes[id] = Node::vacant();
        self.free.push(id);
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.root = None;
    }

    fn prefer_left(&self, left: NodeId, right: NodeId) -> bool {
        let (l, r) = (&self.nodes[left], &self.nodes[right]);
        (l.leaves, l.subtree_weight) <= (r.leaves, r.subtree_weight)
    }

    fn replace_child(&mut self, parent: Option<NodeId>, old: NodeId, new: NodeId) {
        match parent {
            None => self.root = Some(new),
            Some(parent) => {
                if let NodeKind::Branch { left, right } = &mut self.nodes[parent].kind {
                    if *left == old {
                        *left = new;
                    } else if *right == old {
                        *right = new;
                    }
                }
            }
        }
    }

    fn update_path(&mut self, mut at: Option<NodeId>, update: impl Fn(&mut Node<K>)) {
        while let Some(id) = at {
            update(&mut self.nodes[id]);
            at = self.nodes[id].parent;
        }
    }

    fn effective_weight(&self, id: NodeId, taken: &HashMap<NodeId, Weight>) -> Weight {
        self.nodes[id].subtree_weight - taken.get(&id).copied().unwrap_or(0)
    }

    /// Deduct a leaf's weight from every subtree containing it
    fn take(&self, leaf: NodeId, taken: &mut HashMap<NodeId, Weight>) {
        let weight = self.nodes[leaf].subtree_weight;
        let mut at = Some(leaf);
        while let Some(id) = at {
            *taken.entry(id).or_insert(0) += weight;
            at = self.nodes[id].parent;
        }
    }

    /// Find the leaf whose weight interval contains `target`.
    /// Requires `target < effective_weight(from)`.
    fn descend(&self, from: NodeId, mut target: Weight, taken: &HashMap<NodeId, Weight>) -> Option<NodeId> {
        let mut current = from;
        loop {
            match self.nodes[current].kind {
                NodeKind::Leaf { .. } => return Some(current),
                NodeKind::Branch { left, right } => {
                    let left_weight = self.effective_weight(left, taken);
                    if target < left_weight {
                        current = left;
                    } else {
                        target -= left_weight;
                        current = right;
                    }
                }
                NodeKind::Vacant => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tree_of(weights: &[(&'static str, Weight)]) -> WeightedTree<String> {
        let mut tree = WeightedTree::new();
        for (key, weight) in weights {
            tree.insert(key.to_string(), *weight).unwrap();
            tree.check_invariants().unwrap();
        }
        tree
    }

    #[test]
    fn test_insert_remove_scenario() {
        let mut tree = tree_of(&[("A", 10), ("B", 30), ("C", 60)]);
        assert_eq!(tree.total_weight(), 100);
        assert_eq!(tree.len(), 3);

        assert_eq!(tree.remove(&"B".to_string()).unwrap(), 30);
        tree.check_invariants().unwrap();
        assert_eq!(tree.total_weight(), 70);

        let mut picked = tree.select_random(3, &[]);
        picked.sort();
        assert_eq!(picked, vec!["A".to_string(), "C".to_string()]);
    }

    #[test]
    fn test_insert_rejects_bad_input() {
        let mut tree = tree_of(&[("A", 10)]);
        assert_eq!(
            tree.insert("A".to_string(), 5),
            Err(TreeError::DuplicateIdentity("A".to_string()))
        );
        assert_eq!(tree.insert("B".to_string(), 0), Err(TreeError::ZeroWeight("B".to_string())));
        assert!(matches!(
            tree.insert("C".to_string(), u64::MAX),
            Err(TreeError::WeightOverflow { total: 10, .. })
        ));
        // Failed inserts leave nothing behind
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.total_weight(), 10);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_remove_missing_and_last() {
        let mut tree = tree_of(&[("A", 10)]);
        assert_eq!(tree.remove(&"Z".to_string()), Err(TreeError::NotFound("Z".to_string())));
        tree.remove(&"A".to_string()).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.total_weight(), 0);
        assert!(tree.select_random(5, &[]).is_empty());
        tree.check_invariants().unwrap();

        // Arena is reusable after emptying
        tree.insert("B".to_string(), 4).unwrap();
        assert_eq!(tree.total_weight(), 4);
    }

    #[test]
    fn test_reweight() {
        let mut tree = tree_of(&[("A", 10), ("B", 30), ("C", 60)]);
        tree.reweight(&"A".to_string(), 110).unwrap();
        tree.check_invariants().unwrap();
        assert_eq!(tree.total_weight(), 200);
        assert_eq!(tree.weight_of(&"A".to_string()), Some(110));

        tree.reweight(&"C".to_string(), 0).unwrap();
        tree.check_invariants().unwrap();
        assert!(!tree.contains(&"C".to_string()));
        assert_eq!(tree.total_weight(), 140);

        assert_eq!(tree.reweight(&"C".to_string(), 5), Err(TreeError::NotFound("C".to_string())));
        assert!(matches!(
            tree.reweight(&"B".to_string(), u64::MAX),
            Err(TreeError::WeightOverflow { .. })
        ));
        assert_eq!(tree.weight_of(&"B".to_string()), Some(30));
    }

    #[test]
    fn test_select_never_repeats_and_honours_exclude() {
        let mut tree = WeightedTree::new();
        for i in 0..50u64 {
            tree.insert(format!("host-{}", i), i + 1).unwrap();
        }
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..100 {
            let picked = tree.select_random_with(20, &[], &mut rng);
            let unique: HashSet<_> = picked.iter().collect();
            assert_eq!(unique.len(), 20);
        }

        let exclude: Vec<String> = (0..45).map(|i| format!("host-{}", i)).collect();
        let mut picked = tree.select_random_with(10, &exclude, &mut rng);
        picked.sort();
        let expected: Vec<String> = (45..50).map(|i| format!("host-{}", i)).collect();
        assert_eq!(picked, expected);
    }

    #[test]
    fn test_selection_frequency_matches_weights() {
        let tree = tree_of(&[("A", 10), ("B", 30), ("C", 60)]);
        let mut rng = StdRng::seed_from_u64(42);
        let draws = 100_000;
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..draws {
            let picked = tree.select_random_with(1, &[], &mut rng);
            *counts.entry(picked[0].clone()).or_insert(0) += 1;
        }

        for (key, weight) in [("A", 10.0), ("B", 30.0), ("C", 60.0)] {
            let observed = counts[key] as f64 / draws as f64;
            let expected = weight / 100.0;
            assert!(
                (observed - expected).abs() < 0.01,
                "{}: observed {} expected {}",
                key,
                observed,
                expected
            );
        }
    }

    #[test]
    fn test_depth_stays_logarithmic() {
        let mut tree = WeightedTree::new();
        for i in 0..1024u64 {
            // Wildly uneven weights must not skew the shape
            tree.insert(i.to_string(), 1 + (i % 7) * 1_000_000).unwrap();
        }
        tree.check_invariants().unwrap();
        assert_eq!(tree.depth(), 10);

        for i in (0..1024u64).step_by(3) {
            tree.remove(&i.to_string()).unwrap();
        }
        tree.check_invariants().unwrap();
        assert!(tree.depth() <= 10);
    }
}
