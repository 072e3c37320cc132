//! Minimal constraint graph of a closed DBM.
//!
//! The closure of a zone carries `dim * (dim - 1)` constraints, most of
//! them implied by others. The analysis here finds the unique minimum
//! subset whose closure regenerates the matrix — the *minimal graph* —
//! used by subtraction to enumerate facets and by the packed stream format
//! to store zones compactly.
//!
//! Clocks whose difference is fixed (`D[i,j] + D[j,i] = <=0`, a *zero
//! cycle*) are collapsed into equivalence classes first: inside a class
//! only a canonical cycle through the members in index order is kept, and
//! constraints to the rest of the graph live on the class representative
//! (its smallest member). Between representatives, an edge is essential
//! exactly when no tight two-hop path reproduces it.

pub mod pack;

use crate::bound::Bound;
use crate::dbm::kernel::idx;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use tracing::trace;

/// A `dim * dim` matrix of bits marking constraint positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub struct BitMatrix {
    dim: usize,
    words: Vec<u32>,
}

impl BitMatrix {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            words: vec![0; (dim * dim).div_ceil(32)],
        }
    }

    pub(crate) fn from_words(dim: usize, words: Vec<u32>) -> Self {
        debug_assert_eq!(words.len(), (dim * dim).div_ceil(32));
        Self { dim, words }
    }

    #[must_use]
    pub const fn dim(&self) -> usize {
        self.dim
    }

    pub(crate) fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn set(&mut self, i: usize, j: usize) {
        let bit = idx(self.dim, i, j);
        self.words[bit >> 5] |= 1 << (bit & 31);
    }

    pub fn clear(&mut self, i: usize, j: usize) {
        let bit = idx(self.dim, i, j);
        self.words[bit >> 5] &= !(1 << (bit & 31));
    }

    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> bool {
        let bit = idx(self.dim, i, j);
        (self.words[bit >> 5] >> (bit & 31)) & 1 != 0
    }

    /// Number of marked constraints.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Marked `(i, j)` positions in row-major order.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let dim = self.dim;
        (0..dim * dim)
            .filter(move |&bit| (self.words[bit >> 5] >> (bit & 31)) & 1 != 0)
            .map(move |bit| (bit / dim, bit % dim))
    }
}

/// Zero-cycle successor chains: `next[i]` is the smallest `j > i` on a
/// zero cycle with `i`, or 0 when `i` is the last of its class.
pub(crate) fn zero_cycle_chains(dbm: &[Bound], dim: usize) -> Vec<usize> {
    let mut next = vec![0; dim];
    for i in 0..dim {
        for j in i + 1..dim {
            if dbm[idx(dim, i, j)].add(dbm[idx(dim, j, i)]) == Bound::LE_ZERO {
                next[i] = j;
                break;
            }
        }
    }
    next
}

/// Analyze a closed, non-empty DBM; returns the minimal graph and its
/// essential-edge count.
pub fn analyze(dbm: &[Bound], dim: usize) -> (BitMatrix, usize) {
    let mut bits = BitMatrix::new(dim);
    if dim <= 1 {
        return (bits, 0);
    }

    let next = zero_cycle_chains(dbm, dim);
    // A clock is a representative iff nothing chains to it.
    let mut is_rep = vec![true; dim];
    for &n in &next {
        if n != 0 {
            is_rep[n] = false;
        }
    }

    // Canonical cycle through every non-trivial class, in index order.
    for rep in 0..dim {
        if !is_rep[rep] || next[rep] == 0 {
            continue;
        }
        let mut last = rep;
        while next[last] != 0 {
            bits.set(last, next[last]);
            last = next[last];
        }
        bits.set(last, rep);
    }

    // Essential edges between representatives: no third representative
    // offers an equally tight two-hop path.
    for i in 0..dim {
        if !is_rep[i] {
            continue;
        }
        for j in 0..dim {
            if i == j || !is_rep[j] {
                continue;
            }
            let dij = dbm[idx(dim, i, j)];
            if dij.is_infinity() {
                continue;
            }
            let redundant = (0..dim).any(|k| {
                k != i
                    && k != j
                    && is_rep[k]
                    && dbm[idx(dim, i, k)].add(dbm[idx(dim, k, j)]) == dij
            });
            if !redundant {
                bits.set(i, j);
            }
        }
    }

    let count = bits.count();
    (bits, count)
}

/// Remove lower-bound constraints `x0 - xj <= 0` from a bit matrix; they
/// are trivially satisfied by any valuation and subtracting them yields
/// nothing. Returns the new count.
pub fn clean_bit_matrix(dbm: &[Bound], dim: usize, bits: &mut BitMatrix) -> usize {
    for j in 1..dim {
        if bits.get(0, j) && dbm[idx(dim, 0, j)] == Bound::LE_ZERO {
            bits.clear(0, j);
        }
    }
    bits.count()
}

const CACHE_SLOTS: usize = 683;

struct CacheEntry {
    hash: u64,
    dim: usize,
    cells: Vec<Bound>,
    bits: BitMatrix,
    count: usize,
}

thread_local! {
    static CACHE: RefCell<Vec<Option<Box<CacheEntry>>>> =
        RefCell::new((0..CACHE_SLOTS).map(|_| None).collect());
}

fn hash_cells(dbm: &[Bound], dim: usize) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    dim.hash(&mut hasher);
    dbm.hash(&mut hasher);
    hasher.finish()
}

/// [`analyze`] through a process-wide, bounded, direct-mapped result
/// cache. Distinct handles holding equal matrices share the analysis.
pub fn analyze_cached(dbm: &[Bound], dim: usize) -> (BitMatrix, usize) {
    let hash = hash_cells(dbm, dim);
    let slot = (hash % CACHE_SLOTS as u64) as usize;
    let hit = CACHE.with(|cache| {
        let cache = cache.borrow();
        cache[slot].as_ref().and_then(|entry| {
            (entry.hash == hash && entry.dim == dim && entry.cells == dbm)
                .then(|| (entry.bits.clone(), entry.count))
        })
    });
    if let Some(found) = hit {
        trace!(slot, "mingraph cache hit");
        return found;
    }
    let (bits, count) = analyze(dbm, dim);
    CACHE.with(|cache| {
        cache.borrow_mut()[slot] = Some(Box::new(CacheEntry {
            hash,
            dim,
            cells: dbm.to_vec(),
            bits: bits.clone(),
            count,
        }));
    });
    (bits, count)
}

/// Drop all process-wide cached analyses.
pub fn clear_cache() {
    CACHE.with(|cache| cache.borrow_mut().fill_with(|| None));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbm::kernel::{close, constrain, init};

    fn zone(dim: usize, cons: &[(usize, usize, Bound)]) -> Vec<Bound> {
        let mut dbm = vec![Bound::LE_ZERO; dim * dim];
        init(&mut dbm, dim);
        for &(i, j, b) in cons {
            assert!(constrain(&mut dbm, dim, i, j, b));
        }
        assert!(close(&mut dbm, dim));
        dbm
    }

    #[test]
    fn unconstrained_zone_has_no_edges() {
        let dim = 4;
        let mut dbm = vec![Bound::LE_ZERO; dim * dim];
        init(&mut dbm, dim);
        let (bits, count) = analyze(&dbm, dim);
        assert_eq!(count, 0);
        assert_eq!(bits.count(), 0);
    }

    #[test]
    fn box_zone_keeps_its_sides() {
        let dim = 3;
        let dbm = zone(
            dim,
            &[
                (1, 0, Bound::weak(10)),
                (0, 1, Bound::weak(-2)),
                (2, 0, Bound::weak(7)),
            ],
        );
        let (bits, count) = analyze(&dbm, dim);
        assert_eq!(count, 4);
        assert!(bits.get(1, 0));
        assert!(bits.get(0, 1));
        assert!(bits.get(2, 0));
        // The zero lower bound of y is a face of the box too.
        assert!(bits.get(0, 2));
        // x - y <= 10 is implied through the reference clock.
        assert!(!bits.get(1, 2));
    }

    #[test]
    fn zero_cycle_class_keeps_a_cycle() {
        // x - y == 3, 0 <= x <= 10: x and y collapse into one class.
        let dim = 3;
        let dbm = zone(
            dim,
            &[
                (1, 2, Bound::weak(3)),
                (2, 1, Bound::weak(-3)),
                (1, 0, Bound::weak(10)),
            ],
        );
        let (bits, count) = analyze(&dbm, dim);
        assert_eq!(count, 4);
        // The class chain in index order, closed back on itself.
        assert!(bits.get(1, 2));
        assert!(bits.get(2, 1));
        // External bounds on the representative x only.
        assert!(bits.get(0, 1));
        assert!(bits.get(1, 0));
        assert!(!bits.get(0, 2));
        assert!(!bits.get(2, 0));
    }

    #[test]
    fn point_zone_chains_through_reference() {
        // x == 2, y == 5: everything is one class with the reference.
        let dim = 3;
        let dbm = zone(
            dim,
            &[
                (1, 0, Bound::weak(2)),
                (0, 1, Bound::weak(-2)),
                (2, 0, Bound::weak(5)),
                (0, 2, Bound::weak(-5)),
            ],
        );
        let (bits, count) = analyze(&dbm, dim);
        // One chain 0 -> 1 -> 2 -> 0.
        assert_eq!(count, 3);
        assert!(bits.get(0, 1));
        assert!(bits.get(1, 2));
        assert!(bits.get(2, 0));
    }

    #[test]
    fn diagonal_chain_prunes_middle() {
        // 1 <= x - y <= 1 is a class; a long diagonal chain x <= y + 5,
        // y <= z + 5, x <= z + 10 prunes the implied edge.
        let dim = 4;
        let dbm = zone(
            dim,
            &[
                (1, 2, Bound::weak(5)),
                (2, 3, Bound::weak(5)),
                (1, 0, Bound::weak(20)),
                (2, 0, Bound::weak(20)),
                (3, 0, Bound::weak(20)),
            ],
        );
        let (bits, _) = analyze(&dbm, dim);
        assert!(bits.get(1, 2));
        assert!(bits.get(2, 3));
        // x - z <= 10 follows from the two hops.
        assert!(!bits.get(1, 3));
    }

    #[test]
    fn clean_drops_trivial_lower_bounds() {
        let dim = 3;
        let dbm = zone(dim, &[(1, 0, Bound::weak(4)), (2, 0, Bound::weak(4))]);
        let (mut bits, count) = analyze(&dbm, dim);
        // Two upper bounds and two zero lower bounds.
        assert_eq!(count, 4);
        assert_eq!(clean_bit_matrix(&dbm, dim, &mut bits), 2);
        assert!(!bits.get(0, 1));
        assert!(!bits.get(0, 2));
        assert!(bits.get(1, 0));

        // A real lower bound survives the clean.
        let dbm = zone(dim, &[(0, 1, Bound::weak(-1))]);
        let (mut bits, _) = analyze(&dbm, dim);
        assert_eq!(clean_bit_matrix(&dbm, dim, &mut bits), bits.count());
        assert!(bits.get(0, 1));
    }

    #[test]
    fn cached_analysis_matches() {
        clear_cache();
        let dim = 3;
        let dbm = zone(dim, &[(1, 0, Bound::weak(9)), (1, 2, Bound::weak(1))]);
        let direct = analyze(&dbm, dim);
        let first = analyze_cached(&dbm, dim);
        let second = analyze_cached(&dbm, dim);
        assert_eq!(direct, first);
        assert_eq!(first, second);
        clear_cache();
    }

    #[test]
    fn closure_of_marked_edges_regenerates_the_zone() {
        let dim = 4;
        let dbm = zone(
            dim,
            &[
                (1, 0, Bound::weak(8)),
                (0, 2, Bound::strict(-1)),
                (1, 2, Bound::weak(3)),
                (3, 1, Bound::weak(0)),
            ],
        );
        let (bits, _) = analyze(&dbm, dim);
        let mut rebuilt = vec![Bound::LE_ZERO; dim * dim];
        init(&mut rebuilt, dim);
        for (i, j) in bits.edges() {
            rebuilt[idx(dim, i, j)] = dbm[idx(dim, i, j)];
        }
        assert!(close(&mut rebuilt, dim));
        assert_eq!(rebuilt, dbm);
    }
}
