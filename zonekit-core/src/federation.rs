//! Federations: finite unions of zones.
//!
//! A [`Federation`] owns a list of non-empty [`Dbm`]s of one dimension and
//! is interpreted as their set union. Members may overlap and need not be
//! pairwise incomparable unless a reduction has run. Every operation keeps
//! the two structural invariants: uniform dimension, no empty member.
//!
//! Set operations decompose into per-member DBM operations; subtraction
//! and the reduction strategies live in the submodules.

mod predt;
mod reduce;
mod subtract;

use crate::bound::Bound;
use crate::common::{ClockSet, Constraint, MergeStyle, Relation, SubtractStyle};
use crate::dbm::{Dbm, Delay};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A set union of zones.
#[derive(Clone, Serialize, Deserialize)]
#[must_use]
pub struct Federation {
    dim: usize,
    zones: Vec<Dbm>,
    merge_style: MergeStyle,
}

impl Federation {
    /// The empty federation.
    pub fn new(dim: usize) -> Self {
        assert!(dim >= 1, "a federation needs at least the reference clock");
        Self {
            dim,
            zones: Vec::new(),
            merge_style: MergeStyle::default(),
        }
    }

    /// Federation holding the unconstrained zone.
    pub fn init(dim: usize) -> Self {
        Self::from(Dbm::init(dim))
    }

    /// Federation holding the origin point.
    pub fn zero(dim: usize) -> Self {
        Self::from(Dbm::zero(dim))
    }

    #[must_use]
    pub const fn dim(&self) -> usize {
        self.dim
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.zones.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    #[must_use]
    pub fn zones(&self) -> &[Dbm] {
        &self.zones
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Dbm> {
        self.zones.iter()
    }

    #[must_use]
    pub const fn merge_style(&self) -> MergeStyle {
        self.merge_style
    }

    /// Choose the compatibility test used by merge reduction.
    pub fn set_merge_style(&mut self, style: MergeStyle) {
        self.merge_style = style;
    }

    /// Drop all members and change the dimension.
    pub fn set_dimension(&mut self, dim: usize) {
        assert!(dim >= 1);
        self.zones.clear();
        self.dim = dim;
    }

    pub fn set_empty(&mut self) {
        self.zones.clear();
    }

    /// Reset to the single zero-point zone.
    pub fn set_zero(&mut self) {
        if !(self.size() == 1 && self.zones[0].is_zero()) {
            self.zones.clear();
            self.zones.push(Dbm::zero(self.dim));
        }
    }

    /// Reset to the single unconstrained zone.
    pub fn set_init(&mut self) {
        if !(self.size() == 1 && self.zones[0].is_init()) {
            self.zones.clear();
            self.zones.push(Dbm::init(self.dim));
        }
    }

    // ---- list plumbing ------------------------------------------------

    /// Insert a zone without any inclusion filtering. Empty zones are
    /// dropped, keeping the invariant.
    pub fn push(&mut self, dbm: Dbm) {
        debug_assert_eq!(dbm.dim(), self.dim);
        if !dbm.is_empty() {
            self.zones.push(dbm);
        }
    }

    /// Move every member of `other` to the end of this federation.
    pub fn append(&mut self, other: &mut Self) {
        debug_assert_eq!(self.dim, other.dim);
        self.zones.append(&mut other.zones);
    }

    /// Move every member of `other` to the front of this federation.
    pub fn append_begin(&mut self, other: &mut Self) {
        debug_assert_eq!(self.dim, other.dim);
        other.zones.append(&mut self.zones);
        std::mem::swap(&mut self.zones, &mut other.zones);
    }

    /// Alias of [`Federation::append`], kept for symmetry.
    pub fn append_end(&mut self, other: &mut Self) {
        self.append(other);
    }

    /// Take everything from `other`, leaving it empty.
    pub fn steal(&mut self, other: &mut Self) {
        self.append(other);
    }

    /// Move the member at `index` out of `other` into this federation.
    pub fn steal_dbm(&mut self, index: usize, other: &mut Self) {
        debug_assert_eq!(self.dim, other.dim);
        self.zones.push(other.zones.swap_remove(index));
    }

    /// Drain the member list, e.g. to permute it externally.
    pub fn write(&mut self) -> Vec<Dbm> {
        std::mem::take(&mut self.zones)
    }

    /// Replace the member list with `zones`.
    pub fn read(&mut self, zones: Vec<Dbm>) {
        debug_assert!(zones.iter().all(|z| z.dim() == self.dim && !z.is_empty()));
        self.zones = zones;
    }

    /// Deterministic permutation of the member list, used by tests to
    /// expose accidental order sensitivity: odd positions first, then the
    /// even ones reversed.
    pub fn mix(&mut self) {
        let zones = self.write();
        let mut mixed = Vec::with_capacity(zones.len());
        let mut evens = Vec::new();
        for (k, z) in zones.into_iter().enumerate() {
            if k % 2 == 1 {
                mixed.push(z);
            } else {
                evens.push(z);
            }
        }
        while let Some(z) = evens.pop() {
            mixed.push(z);
        }
        self.read(mixed);
    }

    /// Drop any empty members. The operations of this crate never store
    /// one; this repairs the invariant after an external [`Federation::read`].
    pub fn remove_empty(&mut self) {
        self.zones.retain(|z| !z.is_empty());
    }

    #[must_use]
    pub fn has_empty(&self) -> bool {
        self.zones.iter().any(Dbm::is_empty)
    }

    /// Exact membership: some member holds exactly this zone.
    #[must_use]
    pub fn has(&self, dbm: &Dbm) -> bool {
        if dbm.dim() != self.dim {
            return false;
        }
        dbm.is_empty() || self.zones.iter().any(|z| z == dbm)
    }

    /// Some member shares its matrix handle with `dbm`.
    #[must_use]
    pub fn has_same(&self, dbm: &Dbm) -> bool {
        self.zones.iter().any(|z| z.same_as(dbm))
    }

    /// Remove the member sharing its handle with `dbm`, if present.
    pub fn remove_this_dbm(&mut self, dbm: &Dbm) -> bool {
        match self.zones.iter().position(|z| z.same_as(dbm)) {
            Some(k) => {
                self.zones.remove(k);
                true
            }
            None => false,
        }
    }

    /// Drop members included in `dbm`. Returns `false` when `dbm` itself
    /// is included in a member (so inserting it would be redundant).
    pub fn remove_included_in_dbm(&mut self, dbm: &Dbm) -> bool {
        let mut arg_not_included = true;
        self.zones.retain(|z| {
            let rel = z.relation(dbm);
            if rel.is_superset_eq() && !rel.is_subset_eq() {
                arg_not_included = false;
            }
            !rel.is_subset_eq()
        });
        arg_not_included
    }

    /// Drop members included in the federation `arg` (member-wise test).
    pub fn remove_included_in(&mut self, arg: &Self) {
        debug_assert_eq!(self.dim, arg.dim);
        if arg.is_empty() {
            return;
        }
        self.zones
            .retain(|z| !arg.zones.iter().any(|a| z.subset_eq(a)));
    }

    // ---- predicates ---------------------------------------------------

    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.zones.iter().any(Dbm::is_unbounded)
    }

    /// The members that are unbounded upwards.
    pub fn get_unbounded(&self) -> Self {
        let mut result = Self::new(self.dim);
        for z in &self.zones {
            if z.is_unbounded() {
                result.union_dbm(z);
            }
        }
        result
    }

    /// The members that are bounded.
    pub fn get_bounded(&self) -> Self {
        let mut result = Self::new(self.dim);
        for z in &self.zones {
            if !z.is_unbounded() {
                result.union_dbm(z);
            }
        }
        result
    }

    #[must_use]
    pub fn has_zero(&self) -> bool {
        self.zones.iter().any(Dbm::has_zero)
    }

    #[must_use]
    pub fn can_delay(&self) -> bool {
        self.zones.iter().any(Dbm::can_delay)
    }

    #[must_use]
    pub fn contains(&self, point: &[i32]) -> bool {
        self.zones.iter().any(|z| z.contains(point))
    }

    #[must_use]
    pub fn contains_real(&self, point: &[f64]) -> bool {
        self.zones.iter().any(|z| z.contains_real(point))
    }

    #[must_use]
    pub fn satisfies(&self, c: Constraint) -> bool {
        self.zones.iter().any(|z| z.satisfies(c))
    }

    #[must_use]
    pub fn is_constrained_by(&self, c: Constraint) -> bool {
        self.zones.iter().any(|z| z.is_constrained_by(c))
    }

    /// Largest upper bound of `clock` over the members.
    #[must_use]
    pub fn max_upper(&self, clock: usize) -> Option<Bound> {
        self.zones.iter().filter_map(|z| z.get(clock, 0)).max()
    }

    /// Largest lower-bound entry of `clock` over the members.
    #[must_use]
    pub fn max_lower(&self, clock: usize) -> Option<Bound> {
        self.zones.iter().filter_map(|z| z.get(0, clock)).max()
    }

    // ---- relations ----------------------------------------------------

    /// Member-wise relation: `SUBSET` when every member fits inside some
    /// member of `arg`, `SUPERSET` the other way around. Exact only for
    /// those answers; incomparable unions may come out `DIFFERENT` even
    /// when set inclusion holds (see [`Federation::exact_relation`]).
    pub fn relation(&self, arg: &Self) -> Relation {
        if self.dim != arg.dim {
            return Relation::DIFFERENT;
        }
        if self.is_empty() {
            return if arg.is_empty() {
                Relation::EQUAL
            } else {
                Relation::SUBSET
            };
        }
        if arg.is_empty() {
            return Relation::SUPERSET;
        }

        let this_size = self.size();
        let arg_size = arg.size();
        let mut this_sub = vec![false; this_size];
        let mut arg_sub = vec![false; arg_size];
        for (i, z) in self.zones.iter().enumerate() {
            for (j, a) in arg.zones.iter().enumerate() {
                if this_sub[i] && arg_sub[j] {
                    continue;
                }
                let rel = z.relation(a);
                this_sub[i] |= rel.is_subset_eq();
                arg_sub[j] |= rel.is_superset_eq();
            }
        }
        let mut rel = Relation::DIFFERENT;
        if this_sub.iter().all(|&b| b) {
            rel |= Relation::SUBSET;
        }
        if arg_sub.iter().all(|&b| b) {
            rel |= Relation::SUPERSET;
        }
        rel
    }

    /// Member-wise relation against a single zone.
    pub fn relation_dbm(&self, arg: &Dbm) -> Relation {
        if self.dim != arg.dim() {
            return Relation::DIFFERENT;
        }
        if self.is_empty() {
            return if arg.is_empty() {
                Relation::EQUAL
            } else {
                Relation::SUBSET
            };
        }
        if arg.is_empty() {
            return Relation::SUPERSET;
        }
        let mut subset = Relation::SUBSET;
        let mut superset = Relation::DIFFERENT;
        for z in &self.zones {
            let rel = z.relation(arg);
            subset &= rel;
            superset |= rel & Relation::SUPERSET;
        }
        (subset & Relation::SUBSET) | superset
    }

    /// Every member is included in `arg`.
    #[must_use]
    pub fn le_dbm(&self, arg: &Dbm) -> bool {
        self.zones.iter().all(|z| z.subset_eq(arg))
    }

    /// Some member includes `arg`.
    #[must_use]
    pub fn superset_eq_dbm(&self, arg: &Dbm) -> bool {
        !arg.is_empty() && self.zones.iter().any(|z| arg.subset_eq(z))
    }

    /// Exact, subtraction-based relation between federations.
    pub fn exact_relation(&self, arg: &Self) -> Relation {
        if self.dim != arg.dim {
            return Relation::DIFFERENT;
        }
        let mut rel = Relation::DIFFERENT;
        if self.is_subtraction_empty(arg) {
            rel |= Relation::SUBSET;
        }
        if arg.is_subtraction_empty(self) {
            rel |= Relation::SUPERSET;
        }
        rel
    }

    /// Exact set equality.
    #[must_use]
    pub fn equals(&self, arg: &Self) -> bool {
        self.exact_relation(arg) == Relation::EQUAL
    }

    /// `self - arg` is empty, i.e. `self` is included in the union `arg`.
    #[must_use]
    pub fn is_subtraction_empty(&self, arg: &Self) -> bool {
        debug_assert_eq!(self.dim, arg.dim);
        if self.is_empty() {
            return true;
        }
        if arg.is_empty() {
            return false;
        }
        // Cheap convex test against the first member before subtracting.
        if self.relation_dbm(&arg.zones[0]).is_subset_eq() {
            return true;
        }
        if arg.size() == 1 {
            return false;
        }
        let mut rest = self.clone();
        rest.subtract_fed(arg);
        rest.is_empty()
    }

    /// `dbm - arg` is empty, i.e. the zone is covered by the union.
    #[must_use]
    pub fn covers_dbm(&self, dbm: &Dbm) -> bool {
        debug_assert_eq!(self.dim, dbm.dim());
        if dbm.is_empty() {
            return true;
        }
        if self.is_empty() {
            return false;
        }
        if self.dim <= 1 || self.superset_eq_dbm(dbm) {
            return true;
        }
        if self.size() == 1 {
            return false;
        }
        let mut rest = Self::from(dbm.clone());
        rest.subtract_fed(self);
        rest.is_empty()
    }

    // ---- union --------------------------------------------------------

    /// Union with one zone, pruning members it includes.
    pub fn union_dbm(&mut self, dbm: &Dbm) {
        if dbm.is_empty() {
            return;
        }
        debug_assert_eq!(self.dim, dbm.dim());
        if self.remove_included_in_dbm(dbm) {
            self.zones.push(dbm.clone());
        }
    }

    /// Union with another federation, pruning included members both ways.
    pub fn union_fed(&mut self, arg: &Self) {
        debug_assert_eq!(self.dim, arg.dim);
        for a in &arg.zones {
            self.union_dbm(a);
        }
    }

    /// Union by moving the members of `arg`, pruning inclusions both ways.
    pub fn union_with(&mut self, arg: &mut Self) {
        debug_assert_eq!(self.dim, arg.dim);
        self.zones.retain(|z| !arg.zones.iter().any(|a| z.subset_eq(a)));
        arg.zones
            .retain(|a| !self.zones.iter().any(|z| a.subset_eq(z)));
        self.append(arg);
    }

    /// Replace by the convex hull of all members.
    pub fn convex_hull(&mut self) {
        if self.size() > 1 {
            let mut hull = self.zones[0].clone();
            for z in &self.zones[1..] {
                hull.convex_union(z);
            }
            self.zones.clear();
            self.zones.push(hull);
        }
    }

    /// `+=`: collapse to a single convex union with `arg`.
    pub fn convex_union_dbm(&mut self, arg: &Dbm) {
        self.convex_hull();
        if arg.is_empty() {
            return;
        }
        match self.zones.first_mut() {
            Some(hull) => hull.convex_union(arg),
            None => self.zones.push(arg.clone()),
        }
    }

    /// `+=`: collapse to a single convex union with all of `arg`.
    pub fn convex_union_fed(&mut self, arg: &Self) {
        self.convex_hull();
        for a in &arg.zones {
            self.convex_union_dbm(a);
        }
    }

    // ---- intersection -------------------------------------------------

    /// Cheap intersection tests.
    #[must_use]
    pub fn intersects_dbm(&self, arg: &Dbm) -> bool {
        !arg.is_empty() && self.zones.iter().any(|z| z.intersects(arg))
    }

    #[must_use]
    pub fn intersects_fed(&self, arg: &Self) -> bool {
        self.zones
            .iter()
            .any(|z| arg.zones.iter().any(|a| z.intersects(a)))
    }

    /// `&=` with a single zone: intersect every member, dropping the ones
    /// that become empty, then merge-reduce.
    pub fn intersect_dbm(&mut self, arg: &Dbm) {
        if arg.is_empty() {
            self.set_empty();
            return;
        }
        debug_assert_eq!(self.dim, arg.dim());
        self.zones.retain_mut(|z| z.intersect(arg));
        self.merge_reduce();
    }

    /// `&=` with a federation: distribute over the members and reduce.
    pub fn intersect_fed(&mut self, arg: &Self) {
        debug_assert_eq!(self.dim, arg.dim);
        if arg.is_empty() {
            self.set_empty();
            return;
        }
        if self.is_empty() {
            return;
        }
        let mine = self.write();
        let mut result = Self::new(self.dim);
        result.set_merge_style(self.merge_style);
        for a in &arg.zones {
            let mut part = Self::new(self.dim);
            for z in &mine {
                let mut zi = z.clone();
                if zi.intersect(a) {
                    part.push(zi);
                }
            }
            let skip = result.size();
            result.append(&mut part);
            result.merge_reduce_from(skip);
        }
        self.zones = result.zones;
    }

    // ---- subtraction --------------------------------------------------

    /// `-=` a single zone, with the default edge ordering.
    pub fn subtract_dbm(&mut self, arg: &Dbm) {
        self.subtract_dbm_with(arg, SubtractStyle::default());
    }

    /// `-=` a single zone with an explicit edge-ordering strategy.
    pub fn subtract_dbm_with(&mut self, arg: &Dbm, style: SubtractStyle) {
        if self.is_empty() || arg.is_empty() {
            return;
        }
        debug_assert_eq!(self.dim, arg.dim());
        if self.dim == 1 {
            self.set_empty();
            return;
        }
        subtract::subtract_fed_dbm(self, arg, style);
    }

    /// `-=` a federation: iterate the members, stopping once empty.
    pub fn subtract_fed(&mut self, arg: &Self) {
        debug_assert_eq!(self.dim, arg.dim);
        for a in &arg.zones {
            self.subtract_dbm(a);
            if self.is_empty() {
                break;
            }
        }
    }

    /// Subtract and close downwards, skipping members whose upper bounds
    /// cannot be affected.
    pub fn subtract_down(&mut self, arg: &Self) {
        if !self.is_empty() {
            for a in &arg.zones {
                if !self.can_skip_subtract(a) {
                    self.subtract_dbm(a);
                    if self.is_empty() {
                        return;
                    }
                }
            }
        }
        self.down();
    }

    /// The subtraction of `arg` cannot remove anything relevant: some
    /// member dominates all of `arg`'s upper bounds strictly.
    #[must_use]
    pub(crate) fn can_skip_subtract(&self, arg: &Dbm) -> bool {
        if arg.is_empty() {
            return true;
        }
        let dim = self.dim;
        self.zones.iter().any(|z| {
            (1..dim).all(|i| z.get(i, 0).unwrap() > arg.get(i, 0).unwrap())
        })
    }

    // ---- member-wise operations ---------------------------------------

    pub fn constrain(&mut self, c: Constraint) -> bool {
        self.zones.retain_mut(|z| z.constrain(c));
        !self.is_empty()
    }

    pub fn constrain_clock(&mut self, k: usize, v: i32) -> bool {
        self.zones.retain_mut(|z| z.constrain_clock(k, v));
        !self.is_empty()
    }

    pub fn constrain_many(&mut self, constraints: &[Constraint]) -> bool {
        if let [c] = constraints {
            return self.constrain(*c);
        }
        self.zones.retain_mut(|z| z.constrain_many(constraints));
        !self.is_empty()
    }

    pub fn constrain_indexed(&mut self, table: &[usize], constraints: &[Constraint]) -> bool {
        self.zones
            .retain_mut(|z| z.constrain_indexed(table, constraints));
        !self.is_empty()
    }

    pub fn up(&mut self) {
        for z in &mut self.zones {
            z.up();
        }
    }

    pub fn up_stop(&mut self, stopped: &ClockSet) {
        for z in &mut self.zones {
            z.up_stop(stopped);
        }
    }

    pub fn down(&mut self) {
        for z in &mut self.zones {
            z.down();
        }
    }

    pub fn down_stop(&mut self, stopped: &ClockSet) {
        for z in &mut self.zones {
            z.down_stop(stopped);
        }
    }

    pub fn free_clock(&mut self, k: usize) {
        for z in &mut self.zones {
            z.free_clock(k);
        }
    }

    pub fn free_up(&mut self, k: usize) {
        for z in &mut self.zones {
            z.free_up(k);
        }
    }

    pub fn free_down(&mut self, k: usize) {
        for z in &mut self.zones {
            z.free_down(k);
        }
    }

    pub fn free_all_up(&mut self) {
        for z in &mut self.zones {
            z.free_all_up();
        }
    }

    pub fn free_all_down(&mut self) {
        for z in &mut self.zones {
            z.free_all_down();
        }
    }

    pub fn update_value(&mut self, k: usize, v: i32) {
        for z in &mut self.zones {
            z.update_value(k, v);
        }
    }

    pub fn update_clock(&mut self, i: usize, j: usize) {
        if i == j {
            return;
        }
        for z in &mut self.zones {
            z.update_clock(i, j);
        }
    }

    pub fn update_increment(&mut self, k: usize, v: i32) {
        for z in &mut self.zones {
            z.update_increment(k, v);
        }
    }

    pub fn update(&mut self, i: usize, j: usize, v: i32) {
        for z in &mut self.zones {
            z.update(i, j, v);
        }
    }

    pub fn swap_clocks(&mut self, x: usize, y: usize) {
        for z in &mut self.zones {
            z.swap_clocks(x, y);
        }
    }

    pub fn relax_up(&mut self) {
        for z in &mut self.zones {
            z.relax_up();
        }
    }

    pub fn relax_down(&mut self) {
        for z in &mut self.zones {
            z.relax_down();
        }
    }

    pub fn relax_up_clock(&mut self, clock: usize) {
        for z in &mut self.zones {
            z.relax_up_clock(clock);
        }
    }

    pub fn relax_down_clock(&mut self, clock: usize) {
        for z in &mut self.zones {
            z.relax_down_clock(clock);
        }
    }

    pub fn relax_all(&mut self) {
        for z in &mut self.zones {
            z.relax_all();
        }
    }

    pub fn tighten_down(&mut self) {
        self.zones.retain_mut(|z| z.tighten_down());
    }

    pub fn tighten_up(&mut self) {
        self.zones.retain_mut(|z| z.tighten_up());
    }

    pub fn extrapolate_max_bounds(&mut self, max: &[i32]) {
        for z in &mut self.zones {
            z.extrapolate_max_bounds(max);
        }
    }

    pub fn diagonal_extrapolate_max_bounds(&mut self, max: &[i32]) {
        for z in &mut self.zones {
            z.diagonal_extrapolate_max_bounds(max);
        }
    }

    pub fn extrapolate_lu_bounds(&mut self, lower: &[i32], upper: &[i32]) {
        for z in &mut self.zones {
            z.extrapolate_lu_bounds(lower, upper);
        }
    }

    pub fn diagonal_extrapolate_lu_bounds(&mut self, lower: &[i32], upper: &[i32]) {
        for z in &mut self.zones {
            z.diagonal_extrapolate_lu_bounds(lower, upper);
        }
    }

    /// Split on every diagonal constraint, widen each part, then restore
    /// the diagonals that held on it. Prevents the widening from crossing
    /// diagonals the surrounding logic depends on.
    pub fn split_extrapolate(&mut self, diagonals: &[Constraint], max: &[i32]) {
        for &c in diagonals {
            let mut split = Vec::with_capacity(self.zones.len());
            for z in self.write() {
                if z.satisfies(c) && z.satisfies(c.negated()) {
                    let mut keep = z.clone();
                    let mut other = z;
                    let ok = other.constrain(c);
                    debug_assert!(ok);
                    let ok = keep.constrain(c.negated());
                    debug_assert!(ok);
                    split.push(other);
                    split.push(keep);
                } else {
                    split.push(z);
                }
            }
            self.read(split);
        }

        for z in &mut self.zones {
            let sat: Vec<Constraint> = diagonals
                .iter()
                .map(|&c| if z.satisfies(c) { c } else { c.negated() })
                .collect();
            z.extrapolate_max_bounds(max);
            for c in sat {
                let ok = z.constrain(c);
                debug_assert!(ok, "re-asserting a satisfied diagonal cannot fail");
            }
        }

        self.merge_reduce();
    }

    // ---- delays and valuations ----------------------------------------

    /// Smallest delay taking `point` into the federation.
    #[must_use]
    pub fn min_delay(&self, point: &[f64], stopped: Option<&ClockSet>) -> Option<Delay> {
        if self.dim == 1 {
            return (!self.is_empty()).then_some(Delay {
                time: 0.0,
                value: 0.0,
                strict: false,
            });
        }
        let mut best: Option<Delay> = None;
        for z in &self.zones {
            if let Some(d) = z.min_delay(point, stopped) {
                if best.as_ref().map_or(true, |b| d.time < b.time) {
                    best = Some(d);
                }
            }
        }
        best
    }

    /// Largest delay keeping `point` inside the federation, chaining
    /// through members that touch.
    #[must_use]
    pub fn max_delay(&self, point: &[f64], stopped: Option<&ClockSet>) -> Option<Delay> {
        self.delay(point, stopped).map(|(_, max)| max)
    }

    /// Largest backward delay from `point`, capped at `max`.
    #[must_use]
    pub fn max_back_delay(&self, point: &[f64], max: f64) -> f64 {
        let mut t = 0.0_f64;
        for z in &self.zones {
            t = t.max(z.max_back_delay(point, max));
        }
        t
    }

    /// Delay interval from `point`: the minimum delay into the federation
    /// and the maximum delay that stays inside, crossing between members
    /// when they touch.
    #[must_use]
    pub fn delay(&self, point: &[f64], stopped: Option<&ClockSet>) -> Option<(Delay, Delay)> {
        let min = self.min_delay(point, stopped)?;
        let dim = self.dim;
        let mut max = Delay {
            time: min.time,
            value: if min.strict {
                crate::common::add_epsilon(min.value, crate::common::EPSILON)
            } else {
                min.value
            },
            strict: min.strict,
        };

        let mut pt = vec![0.0; dim.max(1)];
        let mut current = min.time;
        let mut last: Option<usize> = None;
        'retry: loop {
            for (k, z) in self.zones.iter().enumerate() {
                pt[0] = point[0];
                for i in 1..dim {
                    pt[i] = if stopped.is_some_and(|s| s.contains(i)) {
                        point[i]
                    } else {
                        point[i] + current
                    };
                }
                if last == Some(k) || !z.contains_real(&pt) {
                    continue;
                }
                let Some(d) = z.max_delay(&pt, stopped) else {
                    continue;
                };
                if d.time.is_infinite() {
                    max = Delay {
                        time: f64::INFINITY,
                        value: f64::INFINITY,
                        strict: true,
                    };
                    break 'retry;
                }
                let new_max = current + d.time;
                if new_max > max.time {
                    last = Some(k);
                    max = Delay {
                        time: new_max,
                        value: d.value + current,
                        strict: d.strict,
                    };
                    current = new_max;
                    continue 'retry;
                }
            }
            break;
        }
        Some((min, max))
    }

    /// A valuation contained in some member.
    pub fn valuation(&self) -> Result<Vec<f64>> {
        let first = self.zones.first().ok_or(Error::EmptyZone)?;
        first.valuation(None)
    }

    /// Intern every member in the shared store.
    pub fn intern(&mut self) {
        for z in &mut self.zones {
            z.intern();
        }
    }

    pub(crate) fn zones_mut(&mut self) -> &mut Vec<Dbm> {
        &mut self.zones
    }
}

impl From<Dbm> for Federation {
    fn from(dbm: Dbm) -> Self {
        let mut fed = Self::new(dbm.dim());
        fed.push(dbm);
        fed
    }
}

impl FromIterator<Dbm> for Federation {
    /// Collect zones into a federation; panics on an empty iterator
    /// (there is no dimension to fall back to).
    fn from_iter<T: IntoIterator<Item = Dbm>>(iter: T) -> Self {
        let mut it = iter.into_iter();
        let first = it.next().expect("cannot infer the dimension");
        let mut fed = Self::from(first);
        for z in it {
            fed.push(z);
        }
        fed
    }
}

impl<'a> IntoIterator for &'a Federation {
    type Item = &'a Dbm;
    type IntoIter = std::slice::Iter<'a, Dbm>;

    fn into_iter(self) -> Self::IntoIter {
        self.zones.iter()
    }
}

impl std::fmt::Debug for Federation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Federation")
            .field("dim", &self.dim)
            .field("size", &self.zones.len())
            .field("zones", &self.zones)
            .finish()
    }
}

impl std::fmt::Display for Federation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "false");
        }
        for (k, z) in self.zones.iter().enumerate() {
            if k > 0 {
                write!(f, " || ")?;
            }
            write!(f, "{z}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Constraint;

    pub(crate) fn square(dim: usize, lo: i32, hi: i32) -> Dbm {
        let mut dbm = Dbm::init(dim);
        for i in 1..dim {
            assert!(dbm.constrain(Constraint::weak(i, 0, hi)));
            assert!(dbm.constrain(Constraint::weak(0, i, -lo)));
        }
        dbm
    }

    #[test]
    fn push_skips_empty() {
        let mut fed = Federation::new(2);
        fed.push(Dbm::empty(2));
        assert!(fed.is_empty());
        fed.push(Dbm::init(2));
        assert_eq!(fed.size(), 1);
    }

    #[test]
    fn union_prunes_included() {
        let mut fed = Federation::from(square(2, 0, 5));
        fed.union_dbm(&square(2, 1, 4)); // included, dropped
        assert_eq!(fed.size(), 1);
        fed.union_dbm(&square(2, 0, 10)); // includes the member, replaces
        assert_eq!(fed.size(), 1);
        assert_eq!(fed.zones()[0], square(2, 0, 10));
        fed.union_dbm(&square(2, 20, 30)); // disjoint, added
        assert_eq!(fed.size(), 2);
    }

    #[test]
    fn append_and_steal_move_members() {
        let mut a = Federation::from(square(2, 0, 1));
        let mut b = Federation::from(square(2, 5, 6));
        b.push(square(2, 8, 9));
        a.append(&mut b);
        assert_eq!(a.size(), 3);
        assert!(b.is_empty());

        let mut c = Federation::new(2);
        c.steal_dbm(1, &mut a);
        assert_eq!(a.size(), 2);
        assert_eq!(c.size(), 1);
    }

    #[test]
    fn mix_permutes_and_preserves() {
        let mut fed = Federation::from(square(2, 0, 1));
        fed.push(square(2, 2, 3));
        fed.push(square(2, 4, 5));
        fed.push(square(2, 6, 7));
        let before = fed.clone();
        fed.mix();
        assert_eq!(fed.size(), 4);
        assert!(fed.equals(&before));
        assert!(!fed.zones()[0].same_as(&before.zones()[0]));
    }

    #[test]
    fn intersect_distributes() {
        let mut fed = Federation::from(square(2, 0, 4));
        fed.push(square(2, 6, 10));
        fed.intersect_dbm(&square(2, 3, 7));
        // [3,4] and [6,7]
        assert_eq!(fed.size(), 2);
        assert!(fed.contains(&[0, 3]));
        assert!(fed.contains(&[0, 7]));
        assert!(!fed.contains(&[0, 5]));
    }

    #[test]
    fn relations_between_federations() {
        let mut halves = Federation::from(square(2, 0, 4));
        halves.push(square(2, 4, 10));
        let whole = Federation::from(square(2, 0, 10));

        // Member-wise: each half inside the whole.
        assert_eq!(halves.relation(&whole), Relation::SUBSET);
        // Exact: both directions hold.
        assert_eq!(halves.exact_relation(&whole), Relation::EQUAL);
        assert!(whole.is_subtraction_empty(&halves));
        assert!(halves.is_subtraction_empty(&whole));
    }

    #[test]
    fn max_bounds_over_members() {
        let mut fed = Federation::from(square(2, 1, 4));
        fed.push(square(2, 2, 9));
        assert_eq!(fed.max_upper(1), Some(Bound::weak(9)));
        assert_eq!(fed.max_lower(1), Some(Bound::weak(-1)));
    }

    #[test]
    fn delay_chains_through_members() {
        let mut fed = Federation::from(square(2, 0, 4));
        fed.push(square(2, 4, 10));
        // From 2, the max delay chains through the touching member to 10.
        let (min, max) = fed.delay(&[0.0, 2.0], None).unwrap();
        assert_eq!(min.time, 0.0);
        assert!((max.time - 8.0).abs() < 1e-9);

        // From outside, min delay reaches the first member.
        let min = fed.min_delay(&[0.0, -3.0], None);
        assert!(min.is_some());
    }

    #[test]
    fn split_extrapolate_respects_diagonals() {
        let dim = 3;
        let mut dbm = Dbm::init(dim);
        assert!(dbm.constrain(Constraint::weak(1, 0, 30)));
        assert!(dbm.constrain(Constraint::weak(2, 0, 30)));
        let mut fed = Federation::from(dbm);
        let diag = Constraint::weak(1, 2, 0); // x <= y
        fed.split_extrapolate(&[diag], &[0, 5, 5]);
        assert!(!fed.is_empty());
        // The widened federation covers the original box on both sides of
        // the diagonal.
        assert!(fed.contains(&[0, 30, 30]));
        assert!(fed.contains(&[0, 30, 0]));
        assert!(fed.contains(&[0, 0, 30]));
        assert!(fed.contains(&[0, 1, 2]));
    }
}
