//! Union-Find (disjoint set) over arbitrary hashable items
//!
//! Union by rank, path compression on `find`. Items are registered lazily the first
//! time they are seen, so callers never declare the universe up front.

use rustc_hash::FxHashMap;
use std::hash::Hash;

/// Disjoint-set forest
#[derive(Debug, Clone)]
pub struct UnionFind<T> {
    index: FxHashMap<T, usize>,
    items: Vec<T>,
    parent: Vec<usize>,
    rank: Vec<u32>,
}

impl<T> Default for UnionFind<T> {
    fn default() -> Self {
        Self {
            index: FxHashMap::default(),
            items: Vec::new(),
            parent: Vec::new(),
            rank: Vec::new(),
        }
    }
}

impl<T: Eq + Hash + Clone> UnionFind<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `item` as its own singleton (no-op when already known)
    pub fn add(&mut self, item: &T) -> usize {
        if let Some(&idx) = self.index.get(item) {
            return idx;
        }
        let idx = self.items.len();
        self.index.insert(item.clone(), idx);
        self.items.push(item.clone());
        self.parent.push(idx);
        self.rank.push(0);
        idx
    }

    fn find_idx(&mut self, idx: usize) -> usize {
        let mut root = idx;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Path compression
        let mut cur = idx;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// Representative of `item`'s set
    pub fn find(&mut self, item: &T) -> T {
        let idx = self.add(item);
        let root = self.find_idx(idx);
        self.items[root].clone()
    }

    /// Merge the sets of `a` and `b`
    pub fn union(&mut self, a: &T, b: &T) {
        let ia = self.add(a);
        let ib = self.add(b);
        let root_a = self.find_idx(ia);
        let root_b = self.find_idx(ib);

        if root_a == root_b {
            return;
        }

        // Attach the shallower tree under the deeper one
        match self.rank[root_a].cmp(&self.rank[root_b]) {
            std::cmp::Ordering::Greater => self.parent[root_b] = root_a,
            std::cmp::Ordering::Less => self.parent[root_a] = root_b,
            std::cmp::Ordering::Equal => {
                self.parent[root_b] = root_a;
                self.rank[root_a] += 1;
            }
        }
    }

    /// Partition of every registered item, groups in first-seen order
    pub fn groups(&mut self) -> Vec<Vec<T>> {
        let mut by_root: FxHashMap<usize, usize> = FxHashMap::default();
        let mut groups: Vec<Vec<T>> = Vec::new();

        for idx in 0..self.items.len() {
            let root = self.find_idx(idx);
            let slot = *by_root.entry(root).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push(self.items[idx].clone());
        }

        groups
    }
}

/// Merge groups that share members
///
/// Every consecutive pair inside a group is unioned; the returned partition holds
/// each distinct item once. Order of groups and members is not significant.
pub fn cluster_lists<T: Eq + Hash + Clone>(groups: &[Vec<T>]) -> Vec<Vec<T>> {
    let mut uf = UnionFind::new();

    for group in groups {
        match group.as_slice() {
            [] => {}
            [single] => {
                uf.add(single);
            }
            members => {
                for pair in members.windows(2) {
                    uf.union(&pair[0], &pair[1]);
                }
            }
        }
    }

    uf.groups()
}
