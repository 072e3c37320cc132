//! Zone subtraction.
//!
//! Subtracting a convex zone B from a zone A walks the essential
//! constraints of B: each constraint `xi - xj <= c` splits off the piece
//! of A beyond its negation, and A is tightened with the constraint before
//! the next edge so the pieces stay disjoint. The minimal graph of B is
//! computed once per subtraction (and cached on B's handle), with the
//! trivially satisfied lower bounds removed first.
//!
//! The order in which edges are processed decides how many pieces come
//! out. The default strategy re-scores the remaining edges each round and
//! picks the most productive split; the plain strategy takes them in
//! row-major order.

use super::Federation;
use crate::bound::Bound;
use crate::common::SubtractStyle;
use crate::dbm::kernel::idx;
use crate::dbm::Dbm;
use crate::mingraph::{self, BitMatrix};
use tracing::trace;

/// Score of splitting on edge `(i, j)` of `b` against `a`: low means the
/// split removes a lot, `i32::MAX`-ish values mean the facet lies outside
/// `a`. Infinity handling mirrors the saturated bound arithmetic.
fn worst_value(a: &[Bound], b: &[Bound], dim: usize, i: usize, j: usize) -> i64 {
    let bij = i64::from(b[idx(dim, i, j)].as_weak().raw());
    for k in 0..dim {
        if k == i || k == j {
            continue;
        }
        let bkj = b[idx(dim, k, j)];
        let aik = a[idx(dim, i, k)];
        if !bkj.is_infinity() && !aik.is_infinity() {
            let v = bij - (i64::from(aik.as_weak().raw()) + i64::from(bkj.as_weak().raw()));
            if v >= 0 {
                return i64::from(Bound::INFINITY.raw());
            }
        }
        let bik = b[idx(dim, i, k)];
        let akj = a[idx(dim, k, j)];
        if !bik.is_infinity() && !akj.is_infinity() {
            let v = bij - (i64::from(akj.as_weak().raw()) + i64::from(bik.as_weak().raw()));
            if v >= 0 {
                return i64::from(Bound::INFINITY.raw());
            }
        }
    }
    bij - i64::from(a[idx(dim, i, j)].raw())
}

/// Subtract `b` (with its cleaned minimal graph) from the single zone `a`,
/// returning the disjoint pieces. `a` is consumed.
pub(crate) fn intern_subtract(
    mut a: Dbm,
    b: &Dbm,
    bits: &BitMatrix,
    style: SubtractStyle,
) -> Vec<Dbm> {
    let dim = a.dim();
    debug_assert!(dim > 1 && !a.is_empty() && !b.is_empty());
    match style {
        SubtractStyle::MinGraph => {
            let edges: Vec<(usize, usize)> = bits.edges().collect();
            let mut result = Vec::new();
            let total = edges.len();
            for (n, (i, j)) in edges.into_iter().enumerate() {
                let c = b.get(i, j).unwrap();
                let aij = a.get(i, j).unwrap();
                if c >= aij {
                    continue; // adds nothing
                }
                let neg = c.negated();
                if neg >= a.get(j, i).unwrap() {
                    // The facet lies outside a: a - b = a.
                    result.push(a);
                    return result;
                }
                if n + 1 == total {
                    let ok = a.constrain(crate::common::Constraint::new(j, i, neg));
                    debug_assert!(ok);
                    result.push(a);
                    return result;
                }
                let mut piece = a.clone();
                let ok = piece.constrain(crate::common::Constraint::new(j, i, neg));
                debug_assert!(ok);
                result.push(piece);
                // Keep the remainder disjoint from the piece.
                let ok = a.constrain(crate::common::Constraint::new(i, j, c));
                debug_assert!(ok);
            }
            trace!(splits = result.len(), "mingraph subtraction");
            result
        }
        SubtractStyle::BestFirst => {
            // Read the edges once, keeping only those that can tighten.
            let mut edges: Vec<(usize, usize)> = {
                let (ac, bc) = (a.cells(), b.cells());
                bits.edges()
                    .filter(|&(i, j)| bc[idx(dim, i, j)] < ac[idx(dim, i, j)])
                    .collect()
            };
            let mut result = Vec::new();
            while !edges.is_empty() {
                // Pick the most productive remaining edge; drop edges that
                // stopped tightening; bail out when one is outside.
                let mut best: Option<(usize, i64)> = None;
                let mut k = 0;
                while k < edges.len() {
                    let (ci, cj) = edges[k];
                    let (ac, bc) = (a.cells(), b.cells());
                    let c = bc[idx(dim, ci, cj)];
                    if c.negated() >= ac[idx(dim, cj, ci)] {
                        result.push(a);
                        return result;
                    }
                    if c >= ac[idx(dim, ci, cj)] {
                        edges.swap_remove(k);
                        continue;
                    }
                    let score = if ac[idx(dim, ci, cj)].is_infinity() {
                        -i64::from(Bound::INFINITY.raw())
                    } else {
                        worst_value(ac, bc, dim, ci, cj)
                    };
                    if best.map_or(true, |(_, s)| score < s) {
                        best = Some((k, score));
                    }
                    k += 1;
                }
                let Some((k, _)) = best else {
                    break; // nothing tightens any more
                };
                let (i, j) = edges.swap_remove(k);
                let c = b.get(i, j).unwrap();
                let neg = c.negated();
                if edges.is_empty() {
                    let ok = a.constrain(crate::common::Constraint::new(j, i, neg));
                    debug_assert!(ok);
                    result.push(a);
                    return result;
                }
                let mut piece = a.clone();
                let ok = piece.constrain(crate::common::Constraint::new(j, i, neg));
                debug_assert!(ok);
                result.push(piece);
                let ok = a.constrain(crate::common::Constraint::new(i, j, c));
                debug_assert!(ok);
            }
            trace!(splits = result.len(), "best-first subtraction");
            result
        }
    }
}

/// `fed -= b`, computing b's cleaned minimal graph at most once.
pub(crate) fn subtract_fed_dbm(fed: &mut Federation, b: &Dbm, style: SubtractStyle) {
    let dim = fed.dim();
    let members = fed.write();
    let mut graph: Option<(BitMatrix, usize)> = None;
    let mut result = Vec::with_capacity(members.len());

    for a in members {
        if !a.intersects(b) {
            result.push(a); // a - b = a
            continue;
        }
        if graph.is_none() {
            let (mut bits, _) = b.mingraph();
            let count = mingraph::clean_bit_matrix(b.cells(), dim, &mut bits);
            if count == 0 {
                // b covers everything a zone can be: result is empty.
                fed.set_empty();
                return;
            }
            graph = Some((bits, count));
        }
        let (bits, _) = graph.as_ref().unwrap();
        result.extend(intern_subtract(a, b, bits, style));
    }
    fed.read(result);
}
