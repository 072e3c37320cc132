//! Raw matrix algorithms.
//!
//! Everything in this module works on a row-major `[Bound]` slice of length
//! `dim * dim` with no handle or sharing concerns; the [`Dbm`](super::Dbm)
//! wrapper owns copy-on-write and emptiness tagging. Operations that can
//! empty the zone return `false` and leave the matrix unusable; callers
//! must discard it.
//!
//! Unless stated otherwise every function expects a closed, non-empty
//! matrix and preserves closure.

use crate::bound::Bound;
use crate::common::{is_le, is_lt, ClockSet, Relation};

#[inline]
pub(crate) fn idx(dim: usize, i: usize, j: usize) -> usize {
    i * dim + j
}

/// Set the unconstrained zone: all clocks non-negative, no upper bounds.
pub fn init(dbm: &mut [Bound], dim: usize) {
    dbm.fill(Bound::INFINITY);
    for j in 0..dim {
        dbm[idx(dim, 0, j)] = Bound::LE_ZERO;
        dbm[idx(dim, j, j)] = Bound::LE_ZERO;
    }
}

/// Set the single-point zone where every clock is 0.
pub fn zero(dbm: &mut [Bound], dim: usize) {
    dbm.fill(Bound::LE_ZERO);
}

pub fn is_init(dbm: &[Bound], dim: usize) -> bool {
    (0..dim).all(|i| {
        (0..dim).all(|j| {
            let expected = if i == 0 || i == j {
                Bound::LE_ZERO
            } else {
                Bound::INFINITY
            };
            dbm[idx(dim, i, j)] == expected
        })
    })
}

pub fn is_zero(dbm: &[Bound], _dim: usize) -> bool {
    dbm.iter().all(|&b| b == Bound::LE_ZERO)
}

/// Full Floyd-Warshall tightening, `O(dim^3)`.
///
/// Returns `false` when a negative cycle shows up, i.e. the zone is empty.
#[must_use]
pub fn close(dbm: &mut [Bound], dim: usize) -> bool {
    for k in 0..dim {
        for i in 0..dim {
            let dik = dbm[idx(dim, i, k)];
            if dik.is_infinity() || i == k {
                continue;
            }
            for j in 0..dim {
                let cand = dik.add(dbm[idx(dim, k, j)]);
                if cand < dbm[idx(dim, i, j)] {
                    dbm[idx(dim, i, j)] = cand;
                }
            }
            if dbm[idx(dim, i, i)] < Bound::LE_ZERO {
                return false;
            }
        }
    }
    true
}

/// Re-close after changes confined to row and column `k`, `O(dim^2)`.
#[must_use]
pub fn close1(dbm: &mut [Bound], dim: usize, k: usize) -> bool {
    for i in 0..dim {
        let dik = dbm[idx(dim, i, k)];
        if dik.is_infinity() || i == k {
            continue;
        }
        for j in 0..dim {
            let cand = dik.add(dbm[idx(dim, k, j)]);
            if cand < dbm[idx(dim, i, j)] {
                dbm[idx(dim, i, j)] = cand;
            }
        }
        if dbm[idx(dim, i, i)] < Bound::LE_ZERO {
            return false;
        }
    }
    true
}

/// Re-close after a single tightening of `dbm[i,j]`, `O(dim^2)`.
///
/// Precondition: the matrix was closed before the write, and the new value
/// does not empty the zone (`-dbm[i,j]` still compatible with `dbm[j,i]`).
pub fn close_ij(dbm: &mut [Bound], dim: usize, i: usize, j: usize) {
    debug_assert!(i != j);
    debug_assert!(dbm[idx(dim, i, j)].negated() < dbm[idx(dim, j, i)]);

    let c = dbm[idx(dim, i, j)];
    for p in 0..dim {
        let dpi = dbm[idx(dim, p, i)];
        if dpi.is_infinity() {
            continue;
        }
        let through = dpi.add(c);
        for q in 0..dim {
            let cand = through.add(dbm[idx(dim, j, q)]);
            if cand < dbm[idx(dim, p, q)] {
                dbm[idx(dim, p, q)] = cand;
            }
        }
    }
    debug_assert!(is_closed(dbm, dim));
}

/// Re-close when only the clocks in `touched` had rows/columns modified.
#[must_use]
pub fn close_x(dbm: &mut [Bound], dim: usize, touched: &ClockSet) -> bool {
    for k in touched.iter().take_while(|&k| k < dim) {
        if !close1(dbm, dim, k) {
            return false;
        }
    }
    true
}

/// Specialized closure after LU extrapolation: rows `k` where both ceilings
/// are absent cannot participate in any tightened path and are skipped.
pub fn close_lu(dbm: &mut [Bound], dim: usize, lower: &[i32], upper: &[i32]) {
    for k in 0..dim {
        if k > 0 && lower[k] == -crate::bound::MAX_BOUND && upper[k] == -crate::bound::MAX_BOUND {
            continue;
        }
        for i in 0..dim {
            let dik = dbm[idx(dim, i, k)];
            if dik.is_infinity() || i == k {
                continue;
            }
            for j in 0..dim {
                let cand = dik.add(dbm[idx(dim, k, j)]);
                if cand < dbm[idx(dim, i, j)] {
                    dbm[idx(dim, i, j)] = cand;
                }
            }
        }
    }
    debug_assert!(is_closed(dbm, dim));
}

/// Debug helper: closure and diagonal invariants hold.
pub fn is_closed(dbm: &[Bound], dim: usize) -> bool {
    for i in 0..dim {
        if dbm[idx(dim, i, i)] != Bound::LE_ZERO {
            return false;
        }
        if dbm[idx(dim, 0, i)] > Bound::LE_ZERO {
            return false;
        }
    }
    for k in 0..dim {
        for i in 0..dim {
            for j in 0..dim {
                if dbm[idx(dim, i, k)].add(dbm[idx(dim, k, j)]) < dbm[idx(dim, i, j)] {
                    return false;
                }
            }
        }
    }
    true
}

/// Tighten `dbm[i,j]` with `c`. Returns `false` when the zone empties.
#[must_use]
pub fn constrain(dbm: &mut [Bound], dim: usize, i: usize, j: usize, c: Bound) -> bool {
    if c < dbm[idx(dim, i, j)] {
        if c.negated() >= dbm[idx(dim, j, i)] {
            return false;
        }
        dbm[idx(dim, i, j)] = c;
        close_ij(dbm, dim, i, j);
    }
    true
}

/// Let time pass: drop all upper bounds.
pub fn up(dbm: &mut [Bound], dim: usize) {
    for i in 1..dim {
        dbm[idx(dim, i, 0)] = Bound::INFINITY;
    }
}

/// `up` with some clocks stopped: stopped clocks keep their value, so only
/// differences between running and stopped clocks open up.
pub fn up_stop(dbm: &mut [Bound], dim: usize, stopped: &ClockSet) {
    for i in 1..dim {
        if stopped.contains(i) {
            continue;
        }
        dbm[idx(dim, i, 0)] = Bound::INFINITY;
        for j in 1..dim {
            if stopped.contains(j) {
                dbm[idx(dim, i, j)] = Bound::INFINITY;
            }
        }
    }
}

/// Reverse time: lower bounds fall to what diagonal constraints allow.
pub fn down(dbm: &mut [Bound], dim: usize) {
    for j in 1..dim {
        let mut min = Bound::LE_ZERO;
        for i in 1..dim {
            let dij = dbm[idx(dim, i, j)];
            if dij < min {
                min = dij;
            }
        }
        dbm[idx(dim, 0, j)] = min;
    }
}

/// `down` with stopped clocks: only running clocks move backwards. A
/// running clock is limited by diagonals to other running clocks (they
/// stop together at zero) and by paths through the pinned stopped clocks.
pub fn down_stop(dbm: &mut [Bound], dim: usize, stopped: &ClockSet) {
    for j in 1..dim {
        if stopped.contains(j) {
            continue;
        }
        let mut min = Bound::LE_ZERO;
        for i in 1..dim {
            let dij = if stopped.contains(i) {
                dbm[idx(dim, 0, i)].add(dbm[idx(dim, i, j)])
            } else {
                dbm[idx(dim, i, j)]
            };
            if dij < min {
                min = dij;
            }
        }
        if min > dbm[idx(dim, 0, j)] {
            dbm[idx(dim, 0, j)] = min;
        }
    }
    debug_assert!(is_closed(dbm, dim));
}

/// Remove all constraints on clock `k`.
pub fn free_clock(dbm: &mut [Bound], dim: usize, k: usize) {
    debug_assert!(k > 0 && k < dim);
    for i in 0..dim {
        if i != k {
            dbm[idx(dim, k, i)] = Bound::INFINITY;
            dbm[idx(dim, i, k)] = dbm[idx(dim, i, 0)];
        }
    }
}

/// Remove upper bounds on clock `k`.
pub fn free_up(dbm: &mut [Bound], dim: usize, k: usize) {
    debug_assert!(k > 0 && k < dim);
    for j in 0..dim {
        if j != k {
            dbm[idx(dim, k, j)] = Bound::INFINITY;
        }
    }
}

/// Remove lower bounds on clock `k`.
pub fn free_down(dbm: &mut [Bound], dim: usize, k: usize) {
    debug_assert!(k > 0 && k < dim);
    for i in 0..dim {
        if i != k {
            dbm[idx(dim, i, k)] = dbm[idx(dim, i, 0)];
        }
    }
}

/// Remove upper bounds on all clocks.
pub fn free_all_up(dbm: &mut [Bound], dim: usize) {
    for i in 1..dim {
        for j in 0..dim {
            if i != j {
                dbm[idx(dim, i, j)] = Bound::INFINITY;
            }
        }
    }
    // Same effect as freeUp on every clock; dbm[i,0] = inf alone would
    // leave diagonal entries tighter than derivable.
}

/// Remove lower bounds on all clocks.
pub fn free_all_down(dbm: &mut [Bound], dim: usize) {
    for i in 1..dim {
        for j in 1..dim {
            if i != j {
                dbm[idx(dim, i, j)] = dbm[idx(dim, i, 0)];
            }
        }
    }
    for j in 1..dim {
        dbm[idx(dim, 0, j)] = Bound::LE_ZERO;
    }
}

/// Assign clock `k` the constant `v`.
pub fn update_value(dbm: &mut [Bound], dim: usize, k: usize, v: i32) {
    debug_assert!(k > 0 && k < dim && v >= 0);
    let dk0 = Bound::weak(v);
    let d0k = Bound::weak(-v);
    for i in 0..dim {
        if i != k {
            dbm[idx(dim, k, i)] = dk0.add(dbm[idx(dim, 0, i)]);
            dbm[idx(dim, i, k)] = dbm[idx(dim, i, 0)].add(d0k);
        }
    }
    debug_assert!(is_closed(dbm, dim));
}

/// Assign `xi := xj`: copy row and column `j` into row and column `i`.
pub fn update_clock(dbm: &mut [Bound], dim: usize, i: usize, j: usize) {
    debug_assert!(i != j && i > 0 && j > 0);
    for k in 0..dim {
        if k != i {
            dbm[idx(dim, i, k)] = dbm[idx(dim, j, k)];
            dbm[idx(dim, k, i)] = dbm[idx(dim, k, j)];
        }
    }
    debug_assert!(is_closed(dbm, dim));
}

/// Shift clock `k` by `v`: `xk := xk + v`.
pub fn update_increment(dbm: &mut [Bound], dim: usize, k: usize, v: i32) {
    debug_assert!(k > 0 && k < dim);
    for i in 0..dim {
        if i != k {
            dbm[idx(dim, k, i)] = dbm[idx(dim, k, i)].offset(v);
            dbm[idx(dim, i, k)] = dbm[idx(dim, i, k)].offset(-v);
        }
    }
}

/// Assign `xi := xj + v`.
pub fn update(dbm: &mut [Bound], dim: usize, i: usize, j: usize, v: i32) {
    debug_assert!(i != j && i > 0 && j > 0);
    for k in 0..dim {
        if k != i {
            dbm[idx(dim, i, k)] = dbm[idx(dim, j, k)].offset(v);
            dbm[idx(dim, k, i)] = dbm[idx(dim, k, j)].offset(-v);
        }
    }
    debug_assert!(is_closed(dbm, dim));
}

/// Weaken strict constraints in column `clock` that no diagonal keeps
/// tight. With `clock == 0` this relaxes all upper bounds (`relaxUp`).
pub fn relax_down_clock(dbm: &mut [Bound], dim: usize, clock: usize) {
    for i in 0..dim {
        let dic = dbm[idx(dim, i, clock)];
        if dic.is_infinity() || dic.is_weak() {
            continue;
        }
        let wic = dic.as_weak();
        let blocked = (0..dim).any(|j| {
            if j == clock {
                return false;
            }
            let dij = dbm[idx(dim, i, j)];
            let djc = dbm[idx(dim, j, clock)];
            !dij.is_infinity() && !djc.is_infinity() && dij.add(djc.as_weak()) < wic
        });
        if !blocked {
            dbm[idx(dim, i, clock)] = wic;
        }
    }
}

/// Weaken strict constraints in row `clock` that no diagonal keeps tight.
/// With `clock == 0` this relaxes all lower bounds (`relaxDown`).
pub fn relax_up_clock(dbm: &mut [Bound], dim: usize, clock: usize) {
    for i in 0..dim {
        let dci = dbm[idx(dim, clock, i)];
        if dci.is_infinity() || dci.is_weak() {
            continue;
        }
        let wci = dci.as_weak();
        let blocked = (0..dim).any(|j| {
            if j == clock {
                return false;
            }
            let dji = dbm[idx(dim, j, i)];
            let dcj = dbm[idx(dim, clock, j)];
            !dji.is_infinity() && !dcj.is_infinity() && dji.add(dcj.as_weak()) < wci
        });
        if !blocked {
            dbm[idx(dim, clock, i)] = wci;
        }
    }
}

/// Weaken all upper bounds.
pub fn relax_up(dbm: &mut [Bound], dim: usize) {
    relax_down_clock(dbm, dim, 0);
}

/// Weaken all lower bounds.
pub fn relax_down(dbm: &mut [Bound], dim: usize) {
    relax_up_clock(dbm, dim, 0);
}

/// Make every finite constraint weak. Closure survives because a sum of
/// weakened bounds is never tighter than the weakened sum.
pub fn relax_all(dbm: &mut [Bound], dim: usize) {
    for i in 0..dim {
        for j in 0..dim {
            let b = dbm[idx(dim, i, j)];
            if i != j && !b.is_infinity() && b.is_strict() {
                dbm[idx(dim, i, j)] = b.as_weak();
            }
        }
    }
}

/// Make all weak lower bounds strict and re-close. May empty the zone.
#[must_use]
pub fn tighten_down(dbm: &mut [Bound], dim: usize) -> bool {
    let mut changed = false;
    for j in 1..dim {
        let b = dbm[idx(dim, 0, j)];
        if b.is_weak() {
            if b.as_strict().negated() >= dbm[idx(dim, j, 0)] {
                return false;
            }
            dbm[idx(dim, 0, j)] = b.as_strict();
            changed = true;
        }
    }
    !changed || close1(dbm, dim, 0)
}

/// Make all weak upper bounds strict and re-close. May empty the zone.
#[must_use]
pub fn tighten_up(dbm: &mut [Bound], dim: usize) -> bool {
    let mut changed = false;
    for i in 1..dim {
        let b = dbm[idx(dim, i, 0)];
        if !b.is_infinity() && b.is_weak() {
            if b.as_strict().negated() >= dbm[idx(dim, 0, i)] {
                return false;
            }
            dbm[idx(dim, i, 0)] = b.as_strict();
            changed = true;
        }
    }
    !changed || close1(dbm, dim, 0)
}

/// Elementwise intersection of `dst` with `src`, re-closed. Returns
/// `false` when the intersection is empty.
#[must_use]
pub fn intersection(dst: &mut [Bound], src: &[Bound], dim: usize) -> bool {
    let mut touched = ClockSet::new(dim);
    for i in 0..dim {
        for j in 0..dim {
            let k = idx(dim, i, j);
            if src[k] < dst[k] {
                if src[k].negated() >= dst[idx(dim, j, i)].min(src[idx(dim, j, i)]) {
                    return false;
                }
                dst[k] = src[k];
                touched.insert(i);
                touched.insert(j);
            }
        }
    }
    touched.is_empty() || close_x(dst, dim, &touched)
}

/// Intersection with every bound weakened first. Used to detect weak
/// adjacency between zones; `dst` receives the weak intersection.
#[must_use]
pub fn relaxed_intersection(dst: &mut [Bound], a: &[Bound], b: &[Bound], dim: usize) -> bool {
    for k in 0..dim * dim {
        let m = a[k].min(b[k]);
        dst[k] = if m.is_infinity() { m } else { m.as_weak() };
    }
    close(dst, dim)
}

/// Cheap necessary test for a non-empty intersection: check all two-cycles.
/// `true` means "maybe", `false` is definite.
#[must_use]
pub fn have_intersection(a: &[Bound], b: &[Bound], dim: usize) -> bool {
    for i in 0..dim {
        for j in i + 1..dim {
            let dij = a[idx(dim, i, j)].min(b[idx(dim, i, j)]);
            let dji = a[idx(dim, j, i)].min(b[idx(dim, j, i)]);
            if dij.add(dji) < Bound::LE_ZERO {
                return false;
            }
        }
    }
    true
}

/// Elementwise max. The result is the convex hull and is already closed.
pub fn convex_union(dst: &mut [Bound], src: &[Bound], _dim: usize) {
    for (d, s) in dst.iter_mut().zip(src) {
        if *s > *d {
            *d = *s;
        }
    }
}

/// Pairwise comparison of all entries.
pub fn relation(a: &[Bound], b: &[Bound], _dim: usize) -> Relation {
    let mut rel = Relation::EQUAL;
    for (x, y) in a.iter().zip(b) {
        if x < y {
            rel.remove(Relation::SUPERSET);
        } else if x > y {
            rel.remove(Relation::SUBSET);
        }
        if rel == Relation::DIFFERENT {
            break;
        }
    }
    rel
}

pub fn is_subset_eq(a: &[Bound], b: &[Bound], _dim: usize) -> bool {
    a.iter().zip(b).all(|(x, y)| x <= y)
}

pub fn is_superset_eq(a: &[Bound], b: &[Bound], _dim: usize) -> bool {
    a.iter().zip(b).all(|(x, y)| x >= y)
}

/// The zone satisfies `xi - xj (<|<=) c` somewhere, i.e. the constraint
/// does not contradict the zone.
pub fn satisfies(dbm: &[Bound], dim: usize, i: usize, j: usize, c: Bound) -> bool {
    c.negated() < dbm[idx(dim, j, i)]
}

pub fn is_unbounded(dbm: &[Bound], dim: usize) -> bool {
    (1..dim).any(|i| dbm[idx(dim, i, 0)].is_infinity())
}

/// The all-zero valuation is in the zone.
pub fn has_zero(dbm: &[Bound], _dim: usize) -> bool {
    dbm.iter().all(|&b| b >= Bound::LE_ZERO)
}

/// Integer point membership with exact strict/weak discipline.
pub fn is_point_included(pt: &[i32], dbm: &[Bound], dim: usize) -> bool {
    for i in 0..dim {
        for j in 0..dim {
            let b = dbm[idx(dim, i, j)];
            if b.is_infinity() {
                continue;
            }
            let diff = pt[i] - pt[j];
            if b.is_strict() {
                if diff >= b.bound() {
                    return false;
                }
            } else if diff > b.bound() {
                return false;
            }
        }
    }
    true
}

/// Real point membership with the epsilon-tolerant comparison.
pub fn is_real_point_included(pt: &[f64], dbm: &[Bound], dim: usize) -> bool {
    for i in 0..dim {
        for j in 0..dim {
            let b = dbm[idx(dim, i, j)];
            if b.is_infinity() {
                continue;
            }
            let diff = pt[i] - pt[j];
            let bound = f64::from(b.bound());
            if b.is_strict() {
                if !is_lt(diff, bound) {
                    return false;
                }
            } else if !is_le(diff, bound) {
                return false;
            }
        }
    }
    true
}

/// Exchange the roles of clocks `x` and `y`.
pub fn swap_clocks(dbm: &mut [Bound], dim: usize, x: usize, y: usize) {
    debug_assert!(x > 0 && y > 0 && x < dim && y < dim);
    if x == y {
        return;
    }
    for k in 0..dim {
        if k != x && k != y {
            dbm.swap(idx(dim, x, k), idx(dim, y, k));
            dbm.swap(idx(dim, k, x), idx(dim, k, y));
        }
    }
    dbm.swap(idx(dim, x, y), idx(dim, y, x));
}
