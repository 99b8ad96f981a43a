//! Probabilistic skip list mapping trade timestamps to record byte offsets.
//!
//! Each shard owns one of these to seek into its log without scanning from the
//! start. The list is built in append order, so insertion only ever links a
//! node after the current tail of each level it is promoted to.
//!
//! # Layout
//!
//! ```text
//! level 2:  H ───────────────► n3 ─────────────────────► NIL
//! level 1:  H ───────► n1 ───► n3 ───────────► n6 ─────► NIL
//! level 0:  H ► n0 ──► n1 ───► n3 ─► n4 ─► n5 ► n6 ─► n7 ► NIL
//! ```
//!
//! Nodes live in an arena (`Vec<Node>`) and link to each other by index;
//! `heads` and `tails` play the role of the sentinel and per-level tail
//! pointers.
//!
//! # Ordering
//!
//! Correct predecessor answers require inserts in non-decreasing timestamp
//! order. Out-of-order inserts never panic, but searches may then return an
//! earlier node than the true predecessor.

use rand::{Rng, SeedableRng, rngs::StdRng};

/// Maximum number of levels.
pub const MAX_LEVEL: usize = 10;

/// Sentinel for "no node" in link arrays.
const NIL: u32 = u32::MAX;

/// One `(timestamp, offset)` pair stored in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub ts: u64,
    pub offset: u64,
}

#[derive(Debug)]
struct Node {
    entry: IndexEntry,
    next: [u32; MAX_LEVEL],
}

/// Skip list with per-level tail pointers and coin-flip promotion.
pub struct SkipList {
    nodes: Vec<Node>,
    heads: [u32; MAX_LEVEL],
    tails: [u32; MAX_LEVEL],
    /// Number of levels holding at least one node.
    height: usize,
    rng: StdRng,
}

impl SkipList {
    /// Create an empty list seeded from OS entropy.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create an empty list with a deterministic promotion sequence.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            nodes: Vec::new(),
            heads: [NIL; MAX_LEVEL],
            tails: [NIL; MAX_LEVEL],
            height: 0,
            rng,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of levels currently in use (0 when empty).
    pub fn height(&self) -> usize {
        self.height
    }

    /// Append `(ts, offset)`.
    ///
    /// The node is linked after the tail of level 0, then promoted one level
    /// at a time while a fair coin keeps landing heads, up to `MAX_LEVEL - 1`.
    pub fn insert(&mut self, ts: u64, offset: u64) {
        let idx = self.nodes.len() as u32;
        self.nodes.push(Node { entry: IndexEntry { ts, offset }, next: [NIL; MAX_LEVEL] });

        let mut level = 0;
        loop {
            match self.tails[level] {
                NIL => self.heads[level] = idx,
                tail => self.nodes[tail as usize].next[level] = idx,
            }
            self.tails[level] = idx;

            if level + 1 == MAX_LEVEL || !self.rng.gen_bool(0.5) {
                break;
            }
            level += 1;
        }
        self.height = self.height.max(level + 1);
    }

    /// Greatest entry whose timestamp is `<= ts`, or `None` if the list is
    /// empty or `ts` precedes every entry. Among equal timestamps the most
    /// recently inserted entry wins.
    pub fn search(&self, ts: u64) -> Option<IndexEntry> {
        // NIL doubles as the head sentinel while descending.
        let mut cur = NIL;
        for level in (0..self.height).rev() {
            loop {
                let next = if cur == NIL { self.heads[level] } else { self.nodes[cur as usize].next[level] };
                if next != NIL && self.nodes[next as usize].entry.ts <= ts {
                    cur = next;
                } else {
                    break;
                }
            }
        }
        (cur != NIL).then(|| self.nodes[cur as usize].entry)
    }

    /// Number of nodes linked at `level`.
    #[cfg(test)]
    fn level_len(&self, level: usize) -> usize {
        let mut n = 0;
        let mut cur = self.heads[level];
        while cur != NIL {
            n += 1;
            cur = self.nodes[cur as usize].next[level];
        }
        n
    }
}

impl Default for SkipList {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SkipList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkipList").field("len", &self.nodes.len()).field("height", &self.height).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reference answer: last inserted entry with timestamp <= ts.
    fn brute_force(entries: &[IndexEntry], ts: u64) -> Option<IndexEntry> {
        entries.iter().rev().find(|e| e.ts <= ts).copied()
    }

    #[test]
    fn simple_search() {
        let mut sk = SkipList::with_seed(1);
        assert!(sk.search(1_621_250_971).is_none());

        sk.insert(1_621_250_971, 123);
        assert_eq!(sk.search(1_621_250_971).unwrap().offset, 123);
        assert_eq!(sk.search(u64::MAX).unwrap().offset, 123);
        assert!(sk.search(1_621_250_970).is_none());
    }

    #[test]
    fn sequential_search() {
        let mut sk = SkipList::with_seed(7);
        for i in 1..1000u64 {
            sk.insert(i, i);
        }
        for q in [1, 100, 200, 500, 900, 999] {
            assert_eq!(sk.search(q).unwrap().offset, q);
        }
        assert!(sk.search(0).is_none());
        assert_eq!(sk.search(5000).unwrap().offset, 999);
    }

    #[test]
    fn predecessor_matches_brute_force() {
        for seed in 0..8u64 {
            let mut gen_rng = StdRng::seed_from_u64(seed ^ 0xdead_beef);
            let mut sk = SkipList::with_seed(seed);
            let mut entries = Vec::new();
            let mut ts = 1_000u64;
            for offset in 0..2_000u64 {
                // Steps of 0 produce runs of equal timestamps.
                ts += gen_rng.gen_range(0..4);
                sk.insert(ts, offset);
                entries.push(IndexEntry { ts, offset });
            }
            for q in 990..ts + 5 {
                assert_eq!(sk.search(q), brute_force(&entries, q), "seed {seed} query {q}");
            }
        }
    }

    #[test]
    fn equal_timestamps_return_latest() {
        let mut sk = SkipList::with_seed(3);
        sk.insert(10, 0);
        sk.insert(20, 100);
        sk.insert(20, 200);
        sk.insert(20, 300);
        sk.insert(30, 400);
        assert_eq!(sk.search(20).unwrap().offset, 300);
        assert_eq!(sk.search(19).unwrap().offset, 0);
        assert_eq!(sk.search(29).unwrap().offset, 300);
    }

    #[test]
    fn levels_thin_out() {
        let mut sk = SkipList::with_seed(11);
        for i in 0..10_000u64 {
            sk.insert(i, i * 10);
        }
        assert!(sk.height() <= MAX_LEVEL);
        assert_eq!(sk.level_len(0), 10_000);
        for level in 1..sk.height() {
            assert!(sk.level_len(level) <= sk.level_len(level - 1));
        }
        // Roughly half the nodes reach level 1.
        let l1 = sk.level_len(1);
        assert!(l1 > 4_000 && l1 < 6_000, "level 1 holds {l1}");
    }

    #[test]
    fn out_of_order_insert_does_not_panic() {
        let mut sk = SkipList::with_seed(9);
        for ts in [50u64, 10, 40, 20, 30] {
            sk.insert(ts, ts);
        }
        // Any answer must still be a node at or before the query.
        if let Some(e) = sk.search(35) {
            assert!(e.ts <= 35);
        }
        assert!(sk.search(5).is_none());
    }
}
