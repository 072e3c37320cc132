//! Extrapolation: controlled widening of bounds past the clock ceilings so
//! that the reachability quotient stays finite.
//!
//! The ceilings come in two shapes: a single `max` per clock, or separate
//! `lower`/`upper` ceilings. Each shape has a plain variant and a diagonal
//! variant that additionally erases difference constraints between clocks
//! whose ceilings are exceeded. `-MAX_BOUND` encodes an absent ceiling.
//! Every variant is a monotone widener and re-closes the matrix.

use super::kernel::{self, idx};
use crate::bound::{Bound, MAX_BOUND};

fn lower_limit(max: i32) -> Bound {
    if max >= 0 {
        Bound::strict(-max)
    } else {
        Bound::LE_ZERO
    }
}

/// Classic maximum-bounds extrapolation: remove every bound above the
/// ceiling of its row clock, clamp lower bounds below `-max`.
pub fn extrapolate_max_bounds(dbm: &mut [Bound], dim: usize, max: &[i32]) {
    debug_assert_eq!(max.len(), dim);
    let mut changed = false;
    for i in 1..dim {
        let ceiling = Bound::weak(max[i]);
        for j in 0..dim {
            if i != j && !dbm[idx(dim, i, j)].is_infinity() && dbm[idx(dim, i, j)] > ceiling {
                dbm[idx(dim, i, j)] = Bound::INFINITY;
                changed = true;
            }
        }
    }
    for j in 1..dim {
        let limit = lower_limit(max[j]);
        if dbm[idx(dim, 0, j)] < limit {
            dbm[idx(dim, 0, j)] = limit;
            changed = true;
        }
    }
    if changed {
        let ok = kernel::close(dbm, dim);
        debug_assert!(ok);
    }
}

/// Diagonal-preserving maximum-bounds extrapolation: difference
/// constraints between two clocks survive as long as both ceilings are
/// respected by the zone's lower bounds.
pub fn diagonal_extrapolate_max_bounds(dbm: &mut [Bound], dim: usize, max: &[i32]) {
    debug_assert_eq!(max.len(), dim);
    let mut changed = false;
    for i in 1..dim {
        let ceiling = Bound::weak(max[i]);
        let low_i = lower_limit(max[i]);
        for j in 0..dim {
            if i == j || dbm[idx(dim, i, j)].is_infinity() {
                continue;
            }
            let above = dbm[idx(dim, i, j)] > ceiling
                || dbm[idx(dim, 0, i)] < low_i
                || (j != 0 && dbm[idx(dim, 0, j)] < lower_limit(max[j]));
            if above {
                dbm[idx(dim, i, j)] = Bound::INFINITY;
                changed = true;
            }
        }
    }
    for j in 1..dim {
        let limit = lower_limit(max[j]);
        if dbm[idx(dim, 0, j)] < limit {
            dbm[idx(dim, 0, j)] = limit;
            changed = true;
        }
    }
    if changed {
        let ok = kernel::close(dbm, dim);
        debug_assert!(ok);
    }
}

/// Lower/upper-bounds extrapolation: upper-side widening is driven by the
/// `lower` ceilings, lower-bound clamping by the `upper` ceilings.
pub fn extrapolate_lu_bounds(dbm: &mut [Bound], dim: usize, lower: &[i32], upper: &[i32]) {
    debug_assert_eq!(lower.len(), dim);
    debug_assert_eq!(upper.len(), dim);
    let mut changed = false;
    for i in 1..dim {
        let ceiling = Bound::weak(lower[i]);
        for j in 0..dim {
            if i != j && !dbm[idx(dim, i, j)].is_infinity() && dbm[idx(dim, i, j)] > ceiling {
                dbm[idx(dim, i, j)] = Bound::INFINITY;
                changed = true;
            }
        }
    }
    for j in 1..dim {
        let limit = lower_limit(upper[j]);
        if dbm[idx(dim, 0, j)] < limit {
            dbm[idx(dim, 0, j)] = limit;
            changed = true;
        }
    }
    if changed {
        kernel::close_lu(dbm, dim, lower, upper);
    }
}

/// Diagonal-preserving LU extrapolation, the coarsest of the family.
pub fn diagonal_extrapolate_lu_bounds(dbm: &mut [Bound], dim: usize, lower: &[i32], upper: &[i32]) {
    debug_assert_eq!(lower.len(), dim);
    debug_assert_eq!(upper.len(), dim);
    let mut changed = false;
    for i in 1..dim {
        let ceiling = Bound::weak(lower[i]);
        let low_i = lower_limit(lower[i]);
        for j in 0..dim {
            if i == j || dbm[idx(dim, i, j)].is_infinity() {
                continue;
            }
            let above = dbm[idx(dim, i, j)] > ceiling
                || dbm[idx(dim, 0, i)] < low_i
                || (j != 0 && dbm[idx(dim, 0, j)] < lower_limit(upper[j]));
            if above {
                dbm[idx(dim, i, j)] = Bound::INFINITY;
                changed = true;
            }
        }
    }
    for j in 1..dim {
        let limit = lower_limit(upper[j]);
        if dbm[idx(dim, 0, j)] < limit {
            dbm[idx(dim, 0, j)] = limit;
            changed = true;
        }
    }
    if changed {
        kernel::close_lu(dbm, dim, lower, upper);
    }
}

/// Absent ceiling marker.
pub const NO_CEILING: i32 = -MAX_BOUND;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bound::Bound;
    use crate::dbm::kernel::{close, constrain, init, is_closed, is_subset_eq};

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
    fn clamps_and_erases() {
        let dim = 2;
        let dbm = zone(dim, &[(1, 0, Bound::weak(100)), (0, 1, Bound::weak(-90))]);
        let max = [0, 10];
        let mut m = dbm.clone();
        extrapolate_max_bounds(&mut m, dim, &max);
        assert!(is_closed(&m, dim));
        assert!(is_subset_eq(&dbm, &m, dim));
        // The upper bound of x exceeded its ceiling and is gone.
        assert!(m[idx(dim, 1, 0)].is_infinity());
        // The lower bound clamped to a strict ceiling bound.
        assert_eq!(m[idx(dim, 0, 1)], Bound::strict(-10));
    }

    #[test]
    fn widens_monotonically() {
        let dim = 3;
        let dbm = zone(
            dim,
            &[
                (1, 0, Bound::weak(100)),
                (0, 1, Bound::weak(-90)),
                (2, 0, Bound::weak(3)),
            ],
        );
        let max = [0, 10, 10];
        let mut m = dbm.clone();
        extrapolate_max_bounds(&mut m, dim, &max);
        assert!(is_closed(&m, dim));
        assert!(is_subset_eq(&dbm, &m, dim));
        assert!(m[idx(dim, 1, 0)].is_infinity());
        // y stayed put, and the diagonal y - x keeps the closure tight
        // below the clamped lower bound of x.
        assert_eq!(m[idx(dim, 2, 0)], Bound::weak(3));

        // The diagonal variant erases that diagonal because the lower
        // ceiling of x is violated, so the clamp survives.
        let mut dm = dbm.clone();
        diagonal_extrapolate_max_bounds(&mut dm, dim, &max);
        assert!(is_subset_eq(&m, &dm, dim));
        assert_eq!(dm[idx(dim, 0, 1)], Bound::strict(-10));
    }

    #[test]
    fn family_forms_a_lattice() {
        let dim = 3;
        let dbm = zone(
            dim,
            &[
                (1, 0, Bound::weak(20)),
                (0, 1, Bound::weak(-15)),
                (2, 0, Bound::weak(2)),
                (1, 2, Bound::weak(18)),
                (2, 1, Bound::weak(-13)),
            ],
        );
        let max = [0, 10, 10];

        let mut m = dbm.clone();
        extrapolate_max_bounds(&mut m, dim, &max);
        let mut dm = dbm.clone();
        diagonal_extrapolate_max_bounds(&mut dm, dim, &max);
        let mut dlu = dbm.clone();
        diagonal_extrapolate_lu_bounds(&mut dlu, dim, &max, &max);

        assert!(is_subset_eq(&dbm, &m, dim));
        assert!(is_subset_eq(&m, &dm, dim));
        assert!(is_subset_eq(&dm, &dlu, dim));
    }

    #[test]
    fn below_ceiling_is_identity() {
        let dim = 3;
        let dbm = zone(dim, &[(1, 0, Bound::weak(4)), (2, 0, Bound::weak(5))]);
        let max = [0, 10, 10];
        let variants: [fn(&mut [Bound], usize, &[i32]); 2] =
            [extrapolate_max_bounds, diagonal_extrapolate_max_bounds];
        for f in variants {
            let mut m = dbm.clone();
            f(&mut m, dim, &max);
            assert_eq!(m, dbm);
        }
        let mut m = dbm.clone();
        extrapolate_lu_bounds(&mut m, dim, &max, &max);
        assert_eq!(m, dbm);
    }

    #[test]
    fn lu_uses_separate_ceilings() {
        let dim = 2;
        let dbm = zone(dim, &[(1, 0, Bound::weak(8)), (0, 1, Bound::weak(-6))]);
        // Lower ceiling smaller than the upper bound: upper bound erased.
        let mut m = dbm.clone();
        extrapolate_lu_bounds(&mut m, dim, &[0, 5], &[0, 10]);
        assert!(m[idx(dim, 1, 0)].is_infinity());
        assert_eq!(m[idx(dim, 0, 1)], Bound::weak(-6));

        // Upper ceiling smaller than the lower bound: lower bound clamped.
        let mut m = dbm.clone();
        extrapolate_lu_bounds(&mut m, dim, &[0, 10], &[0, 5]);
        assert_eq!(m[idx(dim, 1, 0)], Bound::weak(8));
        assert_eq!(m[idx(dim, 0, 1)], Bound::strict(-5));
    }
}
