//! A single zone as a Difference Bound Matrix.
//!
//! [`Dbm`] is a cheap handle: copies share the underlying matrix and the
//! first mutation after a copy clones it (copy-on-write). The empty zone
//! is a first-class tagged state that remembers only its dimension;
//! operations that can empty a zone report it through their return value.
//!
//! Row-major layout, clock 0 is the reference clock: `D[i,j]` bounds
//! `xi - xj`. A non-empty handle always holds a closed matrix.

pub mod extrapolate;
pub mod kernel;

use crate::bound::Bound;
use crate::common::{add_epsilon, sub_epsilon, ClockSet, Constraint, Relation, EPSILON};
use crate::error::{Error, Result};
use crate::mingraph::BitMatrix;
use crate::store::{self, Shared};
use kernel::idx;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// A delay answer: the time to wait, the facet bound that produced it and
/// whether that bound is strict.
#[derive(Debug, Copy, Clone, PartialEq)]
#[must_use]
pub struct Delay {
    pub time: f64,
    pub value: f64,
    pub strict: bool,
}

/// A convex zone of clock valuations, or the empty zone.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "DbmRepr", into = "DbmRepr")]
#[must_use]
pub struct Dbm {
    dim: usize,
    inner: Option<Rc<Shared>>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename = "Dbm")]
struct DbmRepr {
    dim: usize,
    cells: Option<Vec<Bound>>,
}

impl From<Dbm> for DbmRepr {
    fn from(dbm: Dbm) -> Self {
        Self {
            cells: dbm.inner.as_ref().map(|rc| rc.cells().to_vec()),
            dim: dbm.dim,
        }
    }
}

impl TryFrom<DbmRepr> for Dbm {
    type Error = String;

    fn try_from(repr: DbmRepr) -> std::result::Result<Self, String> {
        match repr.cells {
            None => Ok(Self::empty(repr.dim)),
            Some(cells) => {
                if cells.len() != repr.dim * repr.dim {
                    return Err(format!(
                        "matrix length {} does not match dimension {}",
                        cells.len(),
                        repr.dim
                    ));
                }
                let mut cells = cells;
                if !kernel::close(&mut cells, repr.dim) {
                    return Err("matrix encodes an empty zone".into());
                }
                Ok(Self::from_cells(repr.dim, cells))
            }
        }
    }
}

impl Dbm {
    /// The empty zone of the given dimension.
    pub fn empty(dim: usize) -> Self {
        assert!(dim >= 1, "a DBM needs at least the reference clock");
        Self { dim, inner: None }
    }

    /// The unconstrained zone: all clocks non-negative.
    pub fn init(dim: usize) -> Self {
        let mut cells = vec![Bound::LE_ZERO; dim * dim];
        kernel::init(&mut cells, dim);
        Self::from_cells(dim, cells)
    }

    /// The single point where every clock is zero.
    pub fn zero(dim: usize) -> Self {
        Self::from_cells(dim, vec![Bound::LE_ZERO; dim * dim])
    }

    /// Build from a raw bound matrix, closing it. Returns the empty zone
    /// of the same dimension when the constraints are inconsistent.
    pub fn from_matrix(dim: usize, bounds: &[Bound]) -> Self {
        assert_eq!(bounds.len(), dim * dim);
        let mut cells = bounds.to_vec();
        for i in 0..dim {
            cells[idx(dim, i, i)] = Bound::LE_ZERO;
        }
        if kernel::close(&mut cells, dim) {
            Self::from_cells(dim, cells)
        } else {
            Self::empty(dim)
        }
    }

    pub(crate) fn from_cells(dim: usize, cells: Vec<Bound>) -> Self {
        Self {
            dim,
            inner: Some(Shared::new(dim, cells.into_boxed_slice())),
        }
    }

    #[must_use]
    pub const fn dim(&self) -> usize {
        self.dim
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// The bound on `xi - xj`, `None` on the empty zone.
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> Option<Bound> {
        self.inner
            .as_ref()
            .map(|rc| rc.cells()[idx(self.dim, i, j)])
    }

    pub(crate) fn cells(&self) -> &[Bound] {
        self.inner.as_ref().expect("empty DBM has no matrix").cells()
    }

    fn set_empty(&mut self) {
        self.inner = None;
    }

    /// Both handles point at the same matrix.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        match (&self.inner, &other.inner) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => self.dim == other.dim,
            _ => false,
        }
    }

    /// Intern the matrix in the process-wide table, sharing storage with
    /// any structurally equal zone interned before.
    pub fn intern(&mut self) {
        if let Some(rc) = self.inner.as_mut() {
            store::intern(rc);
        }
    }

    /// The minimal graph of this zone with its essential-edge count,
    /// cached on the shared handle.
    pub fn mingraph(&self) -> (BitMatrix, usize) {
        let shared = self.inner.as_ref().expect("empty DBM has no minimal graph");
        shared.mingraph_with(crate::mingraph::analyze_cached)
    }

    // ---- relations ----------------------------------------------------

    pub fn relation(&self, other: &Self) -> Relation {
        if self.dim != other.dim {
            return Relation::DIFFERENT;
        }
        match (&self.inner, &other.inner) {
            (None, None) => Relation::EQUAL,
            (None, Some(_)) => Relation::SUBSET,
            (Some(_), None) => Relation::SUPERSET,
            (Some(a), Some(b)) => {
                if Rc::ptr_eq(a, b) {
                    Relation::EQUAL
                } else {
                    kernel::relation(a.cells(), b.cells(), self.dim)
                }
            }
        }
    }

    #[must_use]
    pub fn subset_eq(&self, other: &Self) -> bool {
        self.dim == other.dim
            && match (&self.inner, &other.inner) {
                (None, _) => true,
                (_, None) => false,
                (Some(a), Some(b)) => {
                    Rc::ptr_eq(a, b) || kernel::is_subset_eq(a.cells(), b.cells(), self.dim)
                }
            }
    }

    #[must_use]
    pub fn superset_eq(&self, other: &Self) -> bool {
        other.subset_eq(self)
    }

    /// Cheap two-cycle test for a non-empty intersection. `true` means
    /// "maybe"; `false` is definite.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        debug_assert_eq!(self.dim, other.dim);
        match (&self.inner, &other.inner) {
            (Some(a), Some(b)) => kernel::have_intersection(a.cells(), b.cells(), self.dim),
            _ => false,
        }
    }

    // ---- predicates ---------------------------------------------------

    #[must_use]
    pub fn is_init(&self) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|rc| kernel::is_init(rc.cells(), self.dim))
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|rc| kernel::is_zero(rc.cells(), self.dim))
    }

    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|rc| kernel::is_unbounded(rc.cells(), self.dim))
    }

    #[must_use]
    pub fn has_zero(&self) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|rc| kernel::has_zero(rc.cells(), self.dim))
    }

    /// Time can elapse without leaving the zone: no clock is pinned
    /// between a weak lower and an equal weak upper bound.
    #[must_use]
    pub fn can_delay(&self) -> bool {
        let Some(rc) = self.inner.as_ref() else {
            return false;
        };
        let cells = rc.cells();
        !(1..self.dim).any(|i| {
            let up = cells[idx(self.dim, i, 0)];
            let low = cells[idx(self.dim, 0, i)];
            up.is_weak() && low.is_weak() && up == low.weak_negated()
        })
    }

    /// The constraint is consistent with the zone.
    #[must_use]
    pub fn satisfies(&self, c: Constraint) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|rc| kernel::satisfies(rc.cells(), self.dim, c.i, c.j, c.bound))
    }

    /// Applying the constraint would actually tighten the zone.
    #[must_use]
    pub fn is_constrained_by(&self, c: Constraint) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|rc| c.bound < rc.cells()[idx(self.dim, c.i, c.j)])
    }

    #[must_use]
    pub fn contains(&self, point: &[i32]) -> bool {
        debug_assert_eq!(point.len(), self.dim);
        self.inner
            .as_ref()
            .is_some_and(|rc| kernel::is_point_included(point, rc.cells(), self.dim))
    }

    /// Real point membership with the epsilon-tolerant comparison.
    #[must_use]
    pub fn contains_real(&self, point: &[f64]) -> bool {
        debug_assert_eq!(point.len(), self.dim);
        self.inner
            .as_ref()
            .is_some_and(|rc| kernel::is_real_point_included(point, rc.cells(), self.dim))
    }

    // ---- constraining -------------------------------------------------

    /// Tighten with one constraint. Returns `false` when the zone becomes
    /// empty.
    pub fn constrain(&mut self, c: Constraint) -> bool {
        debug_assert!(c.i < self.dim && c.j < self.dim && c.i != c.j);
        let dim = self.dim;
        let Some(rc) = self.inner.as_mut() else {
            return false;
        };
        let cells = rc.cells();
        if c.bound >= cells[idx(dim, c.i, c.j)] {
            return true;
        }
        if c.bound.negated() >= cells[idx(dim, c.j, c.i)] {
            self.set_empty();
            return false;
        }
        let cells = Shared::make_mut(rc);
        cells[idx(dim, c.i, c.j)] = c.bound;
        kernel::close_ij(cells, dim, c.i, c.j);
        true
    }

    /// Constrain clock `k` to the exact value `v`.
    pub fn constrain_clock(&mut self, k: usize, v: i32) -> bool {
        debug_assert!(k > 0 && k < self.dim);
        let dim = self.dim;
        let Some(rc) = self.inner.as_mut() else {
            return false;
        };
        let cells = rc.cells();
        let upper = Bound::weak(v);
        let lower = Bound::weak(-v);
        let new_up = upper.min(cells[idx(dim, k, 0)]);
        let new_low = lower.min(cells[idx(dim, 0, k)]);
        if new_up == cells[idx(dim, k, 0)] && new_low == cells[idx(dim, 0, k)] {
            return true;
        }
        if new_up.negated() >= new_low {
            self.set_empty();
            return false;
        }
        let cells = Shared::make_mut(rc);
        cells[idx(dim, k, 0)] = new_up;
        cells[idx(dim, 0, k)] = new_low;
        if kernel::close1(cells, dim, 0) && kernel::close1(cells, dim, k) {
            true
        } else {
            self.set_empty();
            false
        }
    }

    /// Tighten with a batch of constraints; cheaper than one-by-one
    /// because the closure runs once over the touched clocks.
    pub fn constrain_many(&mut self, constraints: &[Constraint]) -> bool {
        self.constrain_batch(constraints, None)
    }

    /// Batched constraining with clock indices translated through `table`.
    pub fn constrain_indexed(&mut self, table: &[usize], constraints: &[Constraint]) -> bool {
        self.constrain_batch(constraints, Some(table))
    }

    fn constrain_batch(&mut self, constraints: &[Constraint], table: Option<&[usize]>) -> bool {
        let dim = self.dim;
        let Some(rc) = self.inner.as_mut() else {
            return false;
        };
        let translate = |c: &Constraint| match table {
            Some(t) => (t[c.i], t[c.j]),
            None => (c.i, c.j),
        };

        // Check everything against the current matrix first: an empty
        // result is detected without copying.
        let cells = rc.cells();
        let mut effective = Vec::new();
        for c in constraints {
            let (i, j) = translate(c);
            debug_assert!(i < dim && j < dim && i != j);
            if c.bound < cells[idx(dim, i, j)] {
                if c.bound.negated() >= cells[idx(dim, j, i)] {
                    self.set_empty();
                    return false;
                }
                effective.push((i, j, c.bound));
            }
        }
        if effective.is_empty() {
            return true;
        }

        let cells = Shared::make_mut(rc);
        if let [(i, j, b)] = effective[..] {
            cells[idx(dim, i, j)] = b;
            kernel::close_ij(cells, dim, i, j);
            return true;
        }
        let mut touched = ClockSet::new(dim);
        for (i, j, b) in effective {
            if b < cells[idx(dim, i, j)] {
                cells[idx(dim, i, j)] = b;
            }
            touched.insert(i);
            touched.insert(j);
        }
        if kernel::close_x(cells, dim, &touched) {
            true
        } else {
            self.set_empty();
            false
        }
    }

    /// Intersect with `other`. Returns `false` when the result is empty.
    pub fn intersect(&mut self, other: &Self) -> bool {
        debug_assert_eq!(self.dim, other.dim);
        let dim = self.dim;
        if self.inner.is_none() {
            return false;
        }
        let Some(arg) = other.inner.as_ref() else {
            self.set_empty();
            return false;
        };
        let rc = self.inner.as_mut().expect("checked non-empty");
        if Rc::ptr_eq(rc, arg) {
            return true;
        }
        let rel = kernel::relation(rc.cells(), arg.cells(), dim);
        if rel.is_subset_eq() {
            return true;
        }
        if rel.is_superset_eq() {
            self.inner = Some(Rc::clone(arg));
            return true;
        }
        if !kernel::have_intersection(rc.cells(), arg.cells(), dim) {
            self.set_empty();
            return false;
        }
        if kernel::intersection(Shared::make_mut(rc), arg.cells(), dim) {
            true
        } else {
            self.set_empty();
            false
        }
    }

    /// Grow to the convex union with `other`.
    pub fn convex_union(&mut self, other: &Self) {
        debug_assert_eq!(self.dim, other.dim);
        let dim = self.dim;
        match (&mut self.inner, &other.inner) {
            (_, None) => {}
            (inner @ None, Some(arg)) => *inner = Some(Rc::clone(arg)),
            (Some(rc), Some(arg)) => {
                if !kernel::is_superset_eq(rc.cells(), arg.cells(), dim) {
                    kernel::convex_union(Shared::make_mut(rc), arg.cells(), dim);
                }
            }
        }
    }

    // ---- delay and free operations ------------------------------------

    /// Let time pass: remove all upper bounds.
    pub fn up(&mut self) {
        let dim = self.dim;
        if let Some(rc) = self.inner.as_mut() {
            if (1..dim).any(|i| !rc.cells()[idx(dim, i, 0)].is_infinity()) {
                kernel::up(Shared::make_mut(rc), dim);
            }
        }
    }

    /// `up` with the clocks in `stopped` frozen.
    pub fn up_stop(&mut self, stopped: &ClockSet) {
        let dim = self.dim;
        if let Some(rc) = self.inner.as_mut() {
            kernel::up_stop(Shared::make_mut(rc), dim, stopped);
        }
    }

    /// Reverse time: relax lower bounds down to zero.
    pub fn down(&mut self) {
        let dim = self.dim;
        if let Some(rc) = self.inner.as_mut() {
            let cells = rc.cells();
            let needs = (1..dim).any(|j| {
                let mut min = Bound::LE_ZERO;
                for i in 1..dim {
                    min = min.min(cells[idx(dim, i, j)]);
                }
                min != cells[idx(dim, 0, j)]
            });
            if needs {
                kernel::down(Shared::make_mut(rc), dim);
            }
        }
    }

    /// `down` with the clocks in `stopped` frozen.
    pub fn down_stop(&mut self, stopped: &ClockSet) {
        let dim = self.dim;
        if let Some(rc) = self.inner.as_mut() {
            kernel::down_stop(Shared::make_mut(rc), dim, stopped);
        }
    }

    pub fn free_clock(&mut self, k: usize) {
        let dim = self.dim;
        if let Some(rc) = self.inner.as_mut() {
            kernel::free_clock(Shared::make_mut(rc), dim, k);
        }
    }

    pub fn free_up(&mut self, k: usize) {
        let dim = self.dim;
        if let Some(rc) = self.inner.as_mut() {
            kernel::free_up(Shared::make_mut(rc), dim, k);
        }
    }

    pub fn free_down(&mut self, k: usize) {
        let dim = self.dim;
        if let Some(rc) = self.inner.as_mut() {
            kernel::free_down(Shared::make_mut(rc), dim, k);
        }
    }

    pub fn free_all_up(&mut self) {
        let dim = self.dim;
        if let Some(rc) = self.inner.as_mut() {
            kernel::free_all_up(Shared::make_mut(rc), dim);
        }
    }

    pub fn free_all_down(&mut self) {
        let dim = self.dim;
        if let Some(rc) = self.inner.as_mut() {
            kernel::free_all_down(Shared::make_mut(rc), dim);
        }
    }

    // ---- clock updates ------------------------------------------------

    /// `xk := v`
    pub fn update_value(&mut self, k: usize, v: i32) {
        let dim = self.dim;
        if let Some(rc) = self.inner.as_mut() {
            kernel::update_value(Shared::make_mut(rc), dim, k, v);
        }
    }

    /// `xi := xj`
    pub fn update_clock(&mut self, i: usize, j: usize) {
        if i == j {
            return;
        }
        let dim = self.dim;
        if let Some(rc) = self.inner.as_mut() {
            kernel::update_clock(Shared::make_mut(rc), dim, i, j);
        }
    }

    /// `xk := xk + v`
    pub fn update_increment(&mut self, k: usize, v: i32) {
        if v == 0 {
            return;
        }
        let dim = self.dim;
        if let Some(rc) = self.inner.as_mut() {
            kernel::update_increment(Shared::make_mut(rc), dim, k, v);
        }
    }

    /// `xi := xj + v`, dispatching to the cheaper forms when possible.
    pub fn update(&mut self, i: usize, j: usize, v: i32) {
        if self.is_empty() {
            return;
        }
        if i == j {
            self.update_increment(i, v);
        } else if v == 0 {
            self.update_clock(i, j);
        } else {
            let dim = self.dim;
            let rc = self.inner.as_mut().expect("checked non-empty");
            kernel::update(Shared::make_mut(rc), dim, i, j, v);
        }
    }

    pub fn swap_clocks(&mut self, x: usize, y: usize) {
        let dim = self.dim;
        if let Some(rc) = self.inner.as_mut() {
            let cells = rc.cells();
            if cells[idx(dim, x, y)] != Bound::LE_ZERO || cells[idx(dim, y, x)] != Bound::LE_ZERO {
                kernel::swap_clocks(Shared::make_mut(rc), dim, x, y);
            }
        }
    }

    // ---- relax and tighten --------------------------------------------

    pub fn relax_up(&mut self) {
        self.relax_down_clock(0);
    }

    pub fn relax_down(&mut self) {
        self.relax_up_clock(0);
    }

    /// Weaken the strict bounds in column `clock` not pinned by diagonals.
    pub fn relax_down_clock(&mut self, clock: usize) {
        let dim = self.dim;
        if let Some(rc) = self.inner.as_mut() {
            kernel::relax_down_clock(Shared::make_mut(rc), dim, clock);
        }
    }

    /// Weaken the strict bounds in row `clock` not pinned by diagonals.
    pub fn relax_up_clock(&mut self, clock: usize) {
        let dim = self.dim;
        if let Some(rc) = self.inner.as_mut() {
            kernel::relax_up_clock(Shared::make_mut(rc), dim, clock);
        }
    }

    pub fn relax_all(&mut self) {
        let dim = self.dim;
        if let Some(rc) = self.inner.as_mut() {
            let any = rc
                .cells()
                .iter()
                .any(|b| b.is_strict() && !b.is_infinity());
            if any {
                kernel::relax_all(Shared::make_mut(rc), dim);
            }
        }
    }

    /// Make weak lower bounds strict. Returns `false` when this empties
    /// the zone.
    pub fn tighten_down(&mut self) -> bool {
        let dim = self.dim;
        let Some(rc) = self.inner.as_mut() else {
            return false;
        };
        if kernel::tighten_down(Shared::make_mut(rc), dim) {
            true
        } else {
            self.set_empty();
            false
        }
    }

    /// Make weak upper bounds strict. Returns `false` when this empties
    /// the zone.
    pub fn tighten_up(&mut self) -> bool {
        let dim = self.dim;
        let Some(rc) = self.inner.as_mut() else {
            return false;
        };
        if kernel::tighten_up(Shared::make_mut(rc), dim) {
            true
        } else {
            self.set_empty();
            false
        }
    }

    // ---- extrapolation ------------------------------------------------

    pub fn extrapolate_max_bounds(&mut self, max: &[i32]) {
        let dim = self.dim;
        if let Some(rc) = self.inner.as_mut() {
            extrapolate::extrapolate_max_bounds(Shared::make_mut(rc), dim, max);
        }
    }

    pub fn diagonal_extrapolate_max_bounds(&mut self, max: &[i32]) {
        let dim = self.dim;
        if let Some(rc) = self.inner.as_mut() {
            extrapolate::diagonal_extrapolate_max_bounds(Shared::make_mut(rc), dim, max);
        }
    }

    pub fn extrapolate_lu_bounds(&mut self, lower: &[i32], upper: &[i32]) {
        let dim = self.dim;
        if let Some(rc) = self.inner.as_mut() {
            extrapolate::extrapolate_lu_bounds(Shared::make_mut(rc), dim, lower, upper);
        }
    }

    pub fn diagonal_extrapolate_lu_bounds(&mut self, lower: &[i32], upper: &[i32]) {
        let dim = self.dim;
        if let Some(rc) = self.inner.as_mut() {
            extrapolate::diagonal_extrapolate_lu_bounds(Shared::make_mut(rc), dim, lower, upper);
        }
    }

    // ---- valuations and delays ----------------------------------------

    /// A clock valuation contained in the zone. Clocks marked not-free in
    /// `free` keep their value from `valuation`.
    pub fn valuation(&self, free: Option<&[bool]>) -> Result<Vec<f64>> {
        let Some(rc) = self.inner.as_ref() else {
            return Err(Error::EmptyZone);
        };
        let dim = self.dim;
        let cells = rc.cells();
        let mut val = vec![0.0; dim];
        let mut is_free = match free {
            Some(f) => f.to_vec(),
            None => vec![true; dim],
        };
        is_free[0] = false;

        for i in 1..dim {
            if !is_free[i] {
                continue;
            }
            let mut l_strict = cells[idx(dim, 0, i)].is_strict();
            let mut lower = -f64::from(cells[idx(dim, 0, i)].bound());
            let mut u_strict = cells[idx(dim, i, 0)].is_strict();
            let mut upper = if cells[idx(dim, i, 0)].is_infinity() {
                f64::INFINITY
            } else {
                f64::from(cells[idx(dim, i, 0)].bound())
            };

            for j in 1..dim {
                if is_free[j] || i == j {
                    continue;
                }
                let dij = cells[idx(dim, i, j)];
                if !dij.is_infinity() {
                    let b = f64::from(dij.bound()) + val[j];
                    if b < upper || (b <= upper && !u_strict) {
                        upper = b;
                        u_strict = dij.is_strict();
                    }
                }
                let dji = cells[idx(dim, j, i)];
                if !dji.is_infinity() {
                    let b = val[j] - f64::from(dji.bound());
                    if b > lower || (b >= lower && !l_strict) {
                        lower = b;
                        l_strict = dji.is_strict();
                    }
                }
            }

            val[i] = if lower.floor() == lower && !l_strict {
                lower
            } else if ((lower + 1.0).floor() <= upper && !u_strict) || (lower + 1.0).floor() < upper
            {
                (lower + 1.0).floor()
            } else if !u_strict {
                upper
            } else {
                (lower + upper) / 2.0
            };
            is_free[i] = false;
        }

        if self.contains_real(&val) {
            Ok(val)
        } else {
            Err(Error::EmptyZone)
        }
    }

    /// Smallest delay from `point` into the zone, if one exists.
    #[must_use]
    pub fn min_delay(&self, point: &[f64], stopped: Option<&ClockSet>) -> Option<Delay> {
        let rc = self.inner.as_ref()?;
        let dim = self.dim;
        let cells = rc.cells();

        if kernel::is_real_point_included(point, cells, dim) {
            return Some(Delay {
                time: 0.0,
                value: 0.0,
                strict: false,
            });
        }

        let mut best: Option<Delay> = None;
        let apply = |d: f64, pt: &mut [f64]| {
            pt[0] = point[0];
            for i in 1..dim {
                pt[i] = if stopped.is_some_and(|s| s.contains(i)) {
                    point[i]
                } else {
                    point[i] + d
                };
            }
        };

        for k in 1..dim {
            // Delay up to the lower facet of clock k.
            let low = cells[idx(dim, 0, k)];
            let mut di = (point[0] - point[k]) - f64::from(low.bound());
            if di < 0.0 {
                continue;
            }
            let value = di;
            let strict = low.is_strict();
            if strict {
                di = add_epsilon(di, EPSILON);
            }
            if best.as_ref().is_some_and(|b| di >= b.time) {
                continue;
            }
            let mut pt = vec![0.0; dim];
            let probe = if strict {
                add_epsilon(value, 1e-6 * EPSILON)
            } else {
                value
            };
            apply(probe, &mut pt);
            if !kernel::is_real_point_included(&pt, cells, dim) {
                continue;
            }
            // The probe is inside; find a delay with a comfortable margin
            // that still lands inside.
            let mut extra = EPSILON;
            loop {
                apply(di, &mut pt);
                if kernel::is_real_point_included(&pt, cells, dim) {
                    best = Some(Delay {
                        time: di,
                        value,
                        strict,
                    });
                    break;
                }
                if strict || extra < 1e-6 * EPSILON {
                    break;
                }
                extra *= 0.1;
                di = add_epsilon(value, extra);
            }
        }
        best
    }

    /// Largest delay from `point` staying inside the zone. `None` when the
    /// point is already past an upper facet.
    #[must_use]
    pub fn max_delay(&self, point: &[f64], stopped: Option<&ClockSet>) -> Option<Delay> {
        let rc = self.inner.as_ref()?;
        let dim = self.dim;
        let cells = rc.cells();
        let mut best = Delay {
            time: f64::INFINITY,
            value: f64::INFINITY,
            strict: true,
        };
        for k in 1..dim {
            let up = cells[idx(dim, k, 0)];
            if up.is_infinity() || stopped.is_some_and(|s| s.contains(k)) {
                continue;
            }
            let strict = up.is_strict();
            let mut d = f64::from(up.bound()) - (point[k] - point[0]);
            if d < 0.0 {
                return None;
            }
            let value = d;
            if strict {
                d = sub_epsilon(d, EPSILON);
            }
            if d < best.time {
                best = Delay {
                    time: d,
                    value,
                    strict,
                };
            }
        }
        Some(best)
    }

    /// Largest backward delay from `point` staying inside the zone,
    /// capped at `max`.
    #[must_use]
    pub fn max_back_delay(&self, point: &[f64], max: f64) -> f64 {
        let Some(rc) = self.inner.as_ref() else {
            return 0.0;
        };
        let dim = self.dim;
        if dim == 1 {
            return max;
        }
        let cells = rc.cells();
        let mut t = 0.0;
        let mut pt = point.to_vec();
        for k in 1..dim {
            let low = cells[idx(dim, 0, k)];
            let mut di = f64::from(low.bound()) - point[0] + point[k];
            if di < 0.0 {
                continue;
            }
            if low.is_strict() {
                di = sub_epsilon(di, EPSILON);
            }
            if di > t {
                // Moving the reference clock up moves every other clock
                // down by the same amount.
                pt[0] = point[0] + di;
                if kernel::is_real_point_included(&pt, cells, dim) {
                    t = di;
                }
                pt[0] = point[0];
            }
        }
        t.min(max)
    }
}

impl PartialEq for Dbm {
    fn eq(&self, other: &Self) -> bool {
        self.dim == other.dim
            && match (&self.inner, &other.inner) {
                (None, None) => true,
                (Some(a), Some(b)) => Rc::ptr_eq(a, b) || a.cells() == b.cells(),
                _ => false,
            }
    }
}

impl Eq for Dbm {}

impl std::hash::Hash for Dbm {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.dim.hash(state);
        if let Some(rc) = self.inner.as_ref() {
            rc.cells().hash(state);
        }
    }
}

impl fmt::Debug for Dbm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            None => write!(f, "Dbm::empty({})", self.dim),
            Some(rc) => {
                writeln!(f, "Dbm({}) [", self.dim)?;
                for i in 0..self.dim {
                    write!(f, "  ")?;
                    for j in 0..self.dim {
                        write!(f, "{:>8} ", rc.cells()[idx(self.dim, i, j)].to_string())?;
                    }
                    writeln!(f)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl fmt::Display for Dbm {
    /// Conjunction of the essential constraints, `false` for the empty
    /// zone and `true` for the unconstrained one. Not a parseable surface.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(rc) = self.inner.as_ref() else {
            return write!(f, "false");
        };
        let dim = self.dim;
        let cells = rc.cells();
        let (bits, count) = self.mingraph();
        if count == 0 {
            return write!(f, "true");
        }
        let name = |i: usize| format!("x{i}");
        let mut first = true;
        write!(f, "(")?;
        for (i, j) in bits.edges() {
            if !first {
                write!(f, " && ")?;
            }
            first = false;
            let b = cells[idx(dim, i, j)];
            let op = if b.is_strict() { "<" } else { "<=" };
            if i == 0 {
                write!(f, "{}{}{}", -b.bound(), op, name(j))?;
            } else if j == 0 {
                write!(f, "{}{}{}", name(i), op, b.bound())?;
            } else {
                write!(f, "{}-{}{}{}", name(i), name(j), op, b.bound())?;
            }
        }
        write!(f, ")")
    }
}
