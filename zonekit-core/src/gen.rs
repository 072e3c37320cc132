//! Random generation of zones, federations and points, used by the
//! property tests. Out of the algorithmic core but kept as a sibling
//! module so the test suites share one set of generators.

use crate::bound::Bound;
use crate::common::Constraint;
use crate::dbm::kernel::{self, idx};
use crate::dbm::Dbm;
use crate::federation::Federation;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Deterministic generator for reproducible tests.
pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// A random closed, non-empty zone with bounds roughly within `range`.
/// Lower and upper bounds first, then a few diagonal tightenings.
pub fn generate(rng: &mut impl Rng, dim: usize, range: i32) -> Dbm {
    let range = range.max(20);
    if dim <= 1 {
        return Dbm::init(dim);
    }
    let mut cells = vec![Bound::LE_ZERO; dim * dim];
    kernel::init(&mut cells, dim);
    for i in 1..dim {
        let middle = rng.gen_range(0..range / 2);
        cells[idx(dim, 0, i)] = Bound::from_raw(1 - rng.gen_range(0..=middle));
        cells[idx(dim, i, 0)] = Bound::from_raw(1 + middle + rng.gen_range(0..range / 2));
    }
    let closed = kernel::close(&mut cells, dim);
    debug_assert!(closed);

    // Tighten some diagonals, keeping the zone non-empty.
    for i in 1..dim {
        for j in 0..i {
            if rng.gen_range(0..4) != 0 {
                continue;
            }
            let slack = i64::from(cells[idx(dim, i, j)].raw())
                + i64::from(cells[idx(dim, j, i)].raw());
            let max_tighten = (slack - 1).max(0) / 2;
            if max_tighten == 0 {
                continue;
            }
            let delta = rng.gen_range(0..=max_tighten) as i32;
            if delta == 0 {
                continue;
            }
            let (ti, tj) = if rng.gen_bool(0.5) { (i, j) } else { (j, i) };
            let tightened = Bound::from_raw(cells[idx(dim, ti, tj)].raw() - delta);
            if tightened.negated() < cells[idx(dim, tj, ti)] {
                cells[idx(dim, ti, tj)] = tightened;
                kernel::close_ij(&mut cells, dim, ti, tj);
            }
        }
    }
    Dbm::from_cells(dim, cells)
}

/// A random non-empty zone satisfying all of `constraints`.
pub fn generate_constrained(
    rng: &mut impl Rng,
    dim: usize,
    range: i32,
    constraints: &[Constraint],
) -> Dbm {
    let mut dbm = generate(rng, dim, range);
    let mut base = Dbm::init(dim);
    for &c in constraints {
        let ok = base.constrain(c);
        debug_assert!(ok, "contradictory constraint set");
    }
    if !dbm.intersect(&base) {
        return base;
    }
    dbm
}

/// Constrain a zone randomly while keeping the constraints marked in
/// `keep` untouched and the zone non-empty.
pub fn generate_pre_constrained(rng: &mut impl Rng, dbm: &mut Dbm, range: i32, keep: &[(usize, usize)]) {
    let dim = dbm.dim();
    for i in 0..dim {
        for j in 0..dim {
            if i == j || keep.contains(&(i, j)) || rng.gen_range(0..3) != 0 {
                continue;
            }
            let current = dbm.get(i, j).unwrap();
            if current.is_infinity() {
                let opposite = dbm.get(j, i).unwrap();
                let floor = if opposite.is_infinity() {
                    -range
                } else {
                    -opposite.bound() + 1
                };
                if floor < range {
                    let b = rng.gen_range(floor..range);
                    dbm.constrain(Constraint::weak(i, j, b));
                }
            }
        }
    }
}

/// A second argument for intersection or subtraction tests: a biased mix
/// of equal, superset, subset, overlapping and unrelated zones.
pub fn generate_arg(rng: &mut impl Rng, dbm: &Dbm, range: i32) -> Dbm {
    match rng.gen_range(0..5) {
        0 => dbm.clone(),
        1 => generate_superset(rng, dbm),
        2 => generate_subset(rng, dbm),
        3 => {
            // Overlapping: a superset tightened independently.
            let mut arg = generate_superset(rng, dbm);
            generate_pre_constrained(rng, &mut arg, range, &[]);
            arg
        }
        _ => generate(rng, dbm.dim(), range),
    }
}

/// A random superset of a zone: weaken entries and re-close.
pub fn generate_superset(rng: &mut impl Rng, dbm: &Dbm) -> Dbm {
    let dim = dbm.dim();
    let mut cells = dbm.cells().to_vec();
    for i in 1..dim {
        for j in 0..dim {
            if i != j && rng.gen_bool(0.3) {
                let b = cells[idx(dim, i, j)];
                cells[idx(dim, i, j)] = if b.is_infinity() || rng.gen_bool(0.2) {
                    Bound::INFINITY
                } else {
                    Bound::from_raw(b.raw() + rng.gen_range(0..20))
                };
            }
        }
    }
    let closed = kernel::close(&mut cells, dim);
    debug_assert!(closed);
    let result = Dbm::from_cells(dim, cells);
    debug_assert!(dbm.subset_eq(&result));
    result
}

/// A random non-empty subset of a zone: tighten a few entries.
pub fn generate_subset(rng: &mut impl Rng, dbm: &Dbm) -> Dbm {
    let dim = dbm.dim();
    let mut result = dbm.clone();
    for _ in 0..dim {
        let i = rng.gen_range(0..dim);
        let j = rng.gen_range(0..dim);
        if i == j {
            continue;
        }
        let current = result.get(i, j).unwrap();
        let opposite = result.get(j, i).unwrap();
        if opposite.is_infinity() && current.is_infinity() {
            let b = rng.gen_range(0..40);
            result.constrain(Constraint::weak(i, j, b));
            continue;
        }
        if current.is_infinity() {
            continue;
        }
        let slack = i64::from(current.raw()) + i64::from(opposite.as_weak().raw()) - 1;
        if slack <= 1 {
            continue;
        }
        let delta = rng.gen_range(0..slack / 2) as i32;
        let tightened = Bound::from_raw(current.raw() - delta);
        if tightened.negated() < opposite {
            let ok = result.constrain(Constraint::new(i, j, tightened));
            debug_assert!(ok);
        }
    }
    debug_assert!(result.subset_eq(dbm));
    result
}

/// A random integer point inside the zone, when the zone contains one.
pub fn generate_point(rng: &mut impl Rng, dbm: &Dbm) -> Option<Vec<i32>> {
    let real = generate_real_point(rng, dbm)?;
    let rounded: Vec<i32> = real.iter().map(|&v| v.round() as i32).collect();
    dbm.contains(&rounded).then_some(rounded)
}

/// A random real point inside the zone. Clocks are fixed one by one
/// within the bounds induced by the already-fixed ones.
pub fn generate_real_point(rng: &mut impl Rng, dbm: &Dbm) -> Option<Vec<f64>> {
    if dbm.is_empty() {
        return None;
    }
    let dim = dbm.dim();
    let cells = dbm.cells();
    let mut pt = vec![0.0; dim];
    for i in 1..dim {
        let mut lower = -f64::from(cells[idx(dim, 0, i)].bound());
        let mut upper = if cells[idx(dim, i, 0)].is_infinity() {
            lower + 100.0
        } else {
            f64::from(cells[idx(dim, i, 0)].bound())
        };
        for j in 1..i {
            let dij = cells[idx(dim, i, j)];
            if !dij.is_infinity() {
                upper = upper.min(pt[j] + f64::from(dij.bound()));
            }
            let dji = cells[idx(dim, j, i)];
            if !dji.is_infinity() {
                lower = lower.max(pt[j] - f64::from(dji.bound()));
            }
        }
        if upper < lower {
            return None;
        }
        pt[i] = if upper > lower {
            lower + (upper - lower) * rng.gen_range(0.05..0.95)
        } else {
            lower
        };
    }
    dbm.contains_real(&pt).then_some(pt)
}

/// A random federation of up to `max_size` zones.
pub fn generate_federation(rng: &mut impl Rng, dim: usize, max_size: usize, range: i32) -> Federation {
    let mut fed = Federation::new(dim);
    let size = rng.gen_range(1..=max_size.max(1));
    for _ in 0..size {
        fed.push(generate(rng, dim, range));
    }
    fed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_zones_are_valid() {
        let mut rng = rng(42);
        for dim in 1..6 {
            for _ in 0..50 {
                let dbm = generate(&mut rng, dim, 1000);
                assert!(!dbm.is_empty());
                assert!(kernel::is_closed(dbm.cells(), dim));
            }
        }
    }

    #[test]
    fn supersets_and_subsets_nest() {
        let mut rng = rng(7);
        for _ in 0..50 {
            let dbm = generate(&mut rng, 4, 500);
            let superset = generate_superset(&mut rng, &dbm);
            let subset = generate_subset(&mut rng, &dbm);
            assert!(dbm.subset_eq(&superset));
            assert!(subset.subset_eq(&dbm));
            assert!(subset.subset_eq(&superset));
        }
    }

    #[test]
    fn generated_points_are_members() {
        let mut rng = rng(11);
        for _ in 0..100 {
            let dbm = generate(&mut rng, 3, 200);
            if let Some(pt) = generate_real_point(&mut rng, &dbm) {
                assert!(dbm.contains_real(&pt));
            }
        }
    }

    #[test]
    fn constrained_generation_respects_constraints() {
        let mut rng = rng(3);
        let cons = [Constraint::weak(1, 0, 50), Constraint::weak(0, 1, -10)];
        for _ in 0..30 {
            let dbm = generate_constrained(&mut rng, 3, 200, &cons);
            assert!(!dbm.is_empty());
            for &c in &cons {
                assert!(dbm.satisfies(c));
            }
        }
    }

    #[test]
    fn federations_have_uniform_dimension() {
        let mut rng = rng(99);
        let fed = generate_federation(&mut rng, 3, 5, 100);
        assert!(!fed.is_empty());
        assert!(fed.zones().iter().all(|z| z.dim() == 3));
    }
}
