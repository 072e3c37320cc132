//! Priced zones: a DBM with an affine cost function.
//!
//! A [`PricedDbm`] carries a rate per clock and the cost of the zone's
//! offset point (the lower corner). The cost of a valuation `p` is
//! `cost + sum(rates[i] * (p[i] - offset[i]))`. Operations that move the
//! offset re-anchor the cost; every mutation drops the cached infimum.
//!
//! The infimum over the zone is computed by the dual network simplex in
//! [`crate::infimum`].

use crate::bound::{Bound, MAX_BOUND};
use crate::common::{Constraint, Relation};
use crate::dbm::kernel::{self, idx};
use crate::dbm::Dbm;
use crate::error::{Error, Result};
use crate::infimum::{self, Solution};
use crate::mingraph::pack;
use serde::{Deserialize, Serialize};
use std::cell::Cell;

/// Sentinel marking an unknown cached infimum in the packed stream.
const INVALID_CACHE: i32 = i32::MAX;

/// A zone with a linear cost plane over it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[must_use]
pub struct PricedDbm {
    dbm: Dbm,
    rates: Vec<i32>,
    cost: i32,
    cache: Cell<Option<i64>>,
}

impl PricedDbm {
    /// The unconstrained zone with zero rates and zero cost.
    pub fn init(dim: usize) -> Self {
        Self {
            dbm: Dbm::init(dim),
            rates: vec![0; dim],
            cost: 0,
            cache: Cell::new(Some(0)),
        }
    }

    /// The origin point with zero rates and zero cost.
    pub fn zero(dim: usize) -> Self {
        Self {
            dbm: Dbm::zero(dim),
            rates: vec![0; dim],
            cost: 0,
            cache: Cell::new(Some(0)),
        }
    }

    /// Price an existing zone with zero rates and the given base cost.
    pub fn from_dbm(dbm: Dbm, cost: i32) -> Self {
        let dim = dbm.dim();
        Self {
            dbm,
            rates: vec![0; dim],
            cost,
            cache: Cell::new(Some(i64::from(cost))),
        }
    }

    #[must_use]
    pub fn dim(&self) -> usize {
        self.dbm.dim()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dbm.is_empty()
    }

    pub fn dbm(&self) -> &Dbm {
        &self.dbm
    }

    #[must_use]
    pub fn rates(&self) -> &[i32] {
        &self.rates
    }

    #[must_use]
    pub fn rate(&self, clock: usize) -> i32 {
        self.rates[clock]
    }

    /// Cost of the offset point.
    #[must_use]
    pub const fn cost_at_offset(&self) -> i32 {
        self.cost
    }

    fn invalidate(&self) {
        self.cache.set(None);
    }

    /// The offset point: every clock at its lower bound.
    #[must_use]
    pub fn offset(&self) -> Vec<i32> {
        let dim = self.dim();
        let mut val = vec![0; dim];
        for i in 1..dim {
            val[i] = -self.dbm.get(0, i).expect("non-empty priced zone").bound();
        }
        val
    }

    /// Sum of all rates: the cost slope of letting time pass.
    #[must_use]
    pub fn slope_of_delay_trajectory(&self) -> i32 {
        self.rates[1..].iter().sum()
    }

    pub fn set_rate(&mut self, clock: usize, rate: i32) {
        debug_assert!(clock > 0 && clock < self.dim());
        self.rates[clock] = rate;
        self.invalidate();
    }

    pub fn set_cost(&mut self, cost: i32) {
        self.cost = cost;
        self.invalidate();
    }

    /// Add a non-negative amount to the cost everywhere.
    pub fn increment_cost(&mut self, value: i32) {
        debug_assert!(value >= 0);
        self.cost += value;
        if let Some(c) = self.cache.get() {
            self.cache.set(Some(c + i64::from(value)));
        }
    }

    /// Cost of a valuation contained in the zone.
    #[must_use]
    pub fn cost_of_valuation(&self, valuation: &[i32]) -> i32 {
        debug_assert!(self.dbm.contains(valuation));
        let offset = self.offset();
        let mut cost = i64::from(self.cost);
        for i in 1..self.dim() {
            cost += i64::from(self.rates[i]) * i64::from(valuation[i] - offset[i]);
        }
        cost as i32
    }

    // ---- infimum ------------------------------------------------------

    /// Minimum of the relative cost plane `cost + rates` over `cells`.
    /// `None` when unbounded below.
    fn relative_infimum(cells: &[Bound], dim: usize, cost: i64, rates: &[i32]) -> Option<i64> {
        if rates.iter().all(|&r| r >= 0) {
            return Some(cost);
        }
        match infimum::solve(cells, dim, rates) {
            Solution::Unbounded => None,
            Solution::Valuation(val) => {
                let mut total = cost;
                for i in 1..dim {
                    let lower = -i64::from(cells[i].bound());
                    total += i64::from(rates[i]) * (val[i] - lower);
                }
                Some(total)
            }
        }
    }

    /// The infimum cost over the zone, `None` when unbounded below.
    /// Cached until the next mutation.
    #[must_use]
    pub fn infimum(&self) -> Option<i64> {
        if let Some(c) = self.cache.get() {
            return Some(c);
        }
        let dim = self.dim();
        let result =
            Self::relative_infimum(self.dbm.cells(), dim, i64::from(self.cost), &self.rates);
        if let Some(v) = result {
            self.cache.set(Some(v));
        }
        result
    }

    /// The infimum with an achieving valuation.
    ///
    /// # Errors
    ///
    /// [`Error::UnboundedInfimum`] when the cost is unbounded below.
    pub fn infimum_valuation(&self) -> Result<(i64, Vec<i32>)> {
        self.infimum_valuation_inner(self.dbm.cells())
    }

    /// Like [`PricedDbm::infimum_valuation`], with the clocks marked
    /// not-free pinned to the values of `valuation`.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyZone`] when the pinned values leave the zone,
    /// [`Error::UnboundedInfimum`] when the cost is unbounded below.
    pub fn infimum_valuation_with(
        &self,
        valuation: &[i32],
        free: &[bool],
    ) -> Result<(i64, Vec<i32>)> {
        let dim = self.dim();
        let mut restricted = self.dbm.clone();
        for i in 1..dim {
            if !free[i] {
                let pinned = [
                    Constraint::weak(i, 0, valuation[i]),
                    Constraint::weak(0, i, -valuation[i]),
                ];
                if !restricted.constrain_many(&pinned) {
                    return Err(Error::EmptyZone);
                }
            }
        }
        self.infimum_valuation_inner(restricted.cells())
    }

    fn infimum_valuation_inner(&self, cells: &[Bound]) -> Result<(i64, Vec<i32>)> {
        let dim = self.dim();
        let valuation: Vec<i64> = if self.rates.iter().all(|&r| r >= 0) {
            (0..dim)
                .map(|i| {
                    if i == 0 {
                        0
                    } else {
                        -i64::from(cells[i].bound())
                    }
                })
                .collect()
        } else {
            match infimum::solve(cells, dim, &self.rates) {
                Solution::Unbounded => return Err(Error::UnboundedInfimum),
                Solution::Valuation(val) => val,
            }
        };
        let offset = self.offset();
        let mut total = i64::from(self.cost);
        for i in 1..dim {
            total += i64::from(self.rates[i]) * (valuation[i] - i64::from(offset[i]));
        }
        let val: Vec<i32> = valuation.iter().map(|&v| v as i32).collect();
        Ok((total, val))
    }

    // ---- zone operations ----------------------------------------------

    /// Tighten with one constraint, re-anchoring the cost at the moved
    /// offset point. Returns `false` when the zone empties.
    pub fn constrain(&mut self, c: Constraint) -> bool {
        if self.dbm.is_empty() {
            return false;
        }
        if !self.dbm.is_constrained_by(c) {
            return true;
        }
        // The offset may move: measure the cost at the origin, apply, and
        // re-measure at the new offset.
        let dim = self.dim();
        let mut cost = i64::from(self.cost);
        for k in 1..dim {
            cost += i64::from(self.rates[k]) * i64::from(self.dbm.get(0, k).unwrap().bound());
        }
        if !self.dbm.constrain(c) {
            return false;
        }
        for k in 1..dim {
            cost -= i64::from(self.rates[k]) * i64::from(self.dbm.get(0, k).unwrap().bound());
        }
        self.cost = cost as i32;
        self.invalidate();
        true
    }

    /// Batched constraining with the same cost re-anchoring.
    pub fn constrain_many(&mut self, constraints: &[Constraint]) -> bool {
        if self.dbm.is_empty() {
            return false;
        }
        if !constraints.iter().any(|&c| self.dbm.is_constrained_by(c)) {
            return true;
        }
        let dim = self.dim();
        let mut cost = i64::from(self.cost);
        for k in 1..dim {
            cost += i64::from(self.rates[k]) * i64::from(self.dbm.get(0, k).unwrap().bound());
        }
        if !self.dbm.constrain_many(constraints) {
            return false;
        }
        for k in 1..dim {
            cost -= i64::from(self.rates[k]) * i64::from(self.dbm.get(0, k).unwrap().bound());
        }
        self.cost = cost as i32;
        self.invalidate();
        true
    }

    /// Constrain onto the facet `xj - xi == -D[i,j]`.
    pub fn constrain_to_facet(&mut self, i: usize, j: usize) -> bool {
        let bound = -self.dbm.get(i, j).expect("non-empty priced zone").bound();
        self.constrain(Constraint::weak(j, i, bound))
    }

    /// Let time pass. The offset keeps its lower bounds, so the cost
    /// anchor stays put.
    pub fn up(&mut self) {
        self.dbm.up();
        self.invalidate();
    }

    /// Delay with the rate of the delay trajectory assigned to `zero`, a
    /// clock on a zero cycle with the reference clock.
    pub fn up_zero(&mut self, rate: i32, zero: usize) {
        debug_assert!(zero > 0 && zero < self.dim());
        debug_assert!(self.on_zero_cycle(0, zero));
        self.dbm.up();
        self.rates[zero] = 0;
        self.rates[zero] = rate - self.slope_of_delay_trajectory();
        self.invalidate();
    }

    /// Reset a cost-free clock.
    pub fn update_value(&mut self, clock: usize, value: i32) {
        debug_assert_eq!(self.rates[clock], 0);
        self.dbm.update_value(clock, value);
        self.invalidate();
    }

    /// Reset `clock`, first transferring its rate to `zero`, a clock on a
    /// zero cycle with it.
    pub fn update_value_zero(&mut self, clock: usize, value: i32, zero: usize) {
        debug_assert!(self.on_zero_cycle(clock, zero));
        if zero != 0 {
            self.rates[zero] += self.rates[clock];
        }
        self.rates[clock] = 0;
        self.dbm.update_value(clock, value);
        self.invalidate();
    }

    /// Free a cost-free clock in both directions.
    pub fn free_clock(&mut self, clock: usize) {
        debug_assert_eq!(self.rates[clock], 0);
        self.dbm.free_clock(clock);
        self.invalidate();
    }

    /// Remove the upper bound of a clock with non-negative rate.
    pub fn free_up(&mut self, clock: usize) {
        debug_assert!(self.rates[clock] >= 0);
        self.dbm.free_up(clock);
        self.invalidate();
    }

    /// Remove the lower bound of a clock with non-positive rate; the
    /// offset point drops to zero for that clock.
    pub fn free_down(&mut self, clock: usize) {
        debug_assert!(self.rates[clock] <= 0);
        let bound = -self.dbm.get(0, clock).expect("non-empty priced zone").bound();
        self.cost -= bound * self.rates[clock];
        self.dbm.free_down(clock);
        self.invalidate();
    }

    /// Make every finite bound weak.
    pub fn relax(&mut self) {
        self.dbm.relax_all();
        self.invalidate();
    }

    /// Re-close the zone after external matrix edits.
    pub fn close(&mut self) -> bool {
        if self.dbm.is_empty() {
            return false;
        }
        let cells = self.dbm.cells().to_vec();
        self.dbm = Dbm::from_matrix(self.dim(), &cells);
        self.invalidate();
        !self.dbm.is_empty()
    }

    #[must_use]
    pub fn satisfies(&self, c: Constraint) -> bool {
        self.dbm.satisfies(c)
    }

    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.dbm.is_unbounded()
    }

    #[must_use]
    pub fn contains(&self, point: &[i32]) -> bool {
        self.dbm.contains(point)
    }

    /// Membership ignoring strictness.
    #[must_use]
    pub fn contains_weakly(&self, point: &[i32]) -> bool {
        if self.dbm.is_empty() {
            return false;
        }
        let dim = self.dim();
        let cells = self.dbm.cells();
        for i in 0..dim {
            for j in 0..dim {
                let b = cells[idx(dim, i, j)];
                if !b.is_infinity() && point[i] - point[j] > b.bound() {
                    return false;
                }
            }
        }
        true
    }

    #[must_use]
    pub fn contains_real(&self, point: &[f64]) -> bool {
        self.dbm.contains_real(point)
    }

    // ---- zero cycles and normal form ----------------------------------

    /// The clocks `i` and `j` keep a constant difference in this zone.
    #[must_use]
    pub fn on_zero_cycle(&self, i: usize, j: usize) -> bool {
        let a = self.dbm.get(i, j).expect("non-empty priced zone");
        let b = self.dbm.get(j, i).expect("non-empty priced zone");
        !a.is_infinity() && !b.is_infinity() && a.bound() == -b.bound()
    }

    /// First clock on a zero cycle with `x`, searching from `from`.
    #[must_use]
    pub fn find_next_zero_cycle(&self, x: usize, from: usize) -> Option<usize> {
        (from..self.dim()).find(|&i| i != x && self.on_zero_cycle(i, x))
    }

    #[must_use]
    pub fn find_zero_cycle(&self, x: usize) -> Option<usize> {
        self.find_next_zero_cycle(x, 0)
    }

    /// Successor chains of the zero-cycle classes (`0` terminates).
    fn zero_cycle_chains(&self) -> Vec<usize> {
        let dim = self.dim();
        let mut next = vec![0; dim];
        for i in 0..dim {
            for j in i + 1..dim {
                if self.on_zero_cycle(i, j) {
                    next[i] = j;
                    break;
                }
            }
        }
        next
    }

    /// Transfer rates along zero cycles so that only the last clock of
    /// each class carries cost, and clocks pinned to the reference carry
    /// none.
    pub fn normalise(&mut self) {
        let next = self.zero_cycle_chains();
        let mut i = next[0];
        while i != 0 {
            self.rates[i] = 0;
            i = next[i];
        }
        for i in 1..self.dim() {
            if next[i] != 0 {
                self.rates[next[i]] += self.rates[i];
                self.rates[i] = 0;
            }
        }
        self.invalidate();
    }

    #[must_use]
    pub fn has_normal_form(&self) -> bool {
        let next = self.zero_cycle_chains();
        let mut i = next[0];
        while i != 0 {
            if self.rates[i] != 0 {
                return false;
            }
            i = next[i];
        }
        (1..self.dim()).all(|i| next[i] == 0 || self.rates[i] == 0)
    }

    // ---- facets -------------------------------------------------------

    /// Non-redundant lower facets of the zone: clocks `i` whose lower
    /// bound `x0 - xi` is a face.
    pub fn lower_facets(&mut self) -> Vec<usize> {
        self.facets(|dbm, dim| kernel::relax_up_clock(dbm, dim, 0), |i| (0, i))
    }

    /// Non-redundant upper facets of the zone.
    pub fn upper_facets(&mut self) -> Vec<usize> {
        self.facets(|dbm, dim| kernel::relax_down_clock(dbm, dim, 0), |i| (i, 0))
    }

    /// Lower facets relative to `clock`.
    pub fn lower_relative_facets(&mut self, clock: usize) -> Vec<usize> {
        self.facets(
            move |dbm, dim| kernel::relax_down_clock(dbm, dim, clock),
            move |i| (i, clock),
        )
    }

    /// Upper facets relative to `clock`.
    pub fn upper_relative_facets(&mut self, clock: usize) -> Vec<usize> {
        self.facets(
            move |dbm, dim| kernel::relax_up_clock(dbm, dim, clock),
            move |i| (clock, i),
        )
    }

    fn facets(
        &mut self,
        relax: impl Fn(&mut [Bound], usize),
        edge: impl Fn(usize) -> (usize, usize),
    ) -> Vec<usize> {
        let dim = self.dim();
        let mut cells = self.dbm.cells().to_vec();
        relax(&mut cells, dim);
        self.dbm = Dbm::from_matrix(dim, &cells);
        self.invalidate();

        let next = crate::mingraph::zero_cycle_chains(self.dbm.cells(), dim);
        let cells = self.dbm.cells();
        let mut facets = Vec::new();
        for i in 0..dim {
            if next[i] != 0 {
                continue;
            }
            let (a, b) = edge(i);
            if !is_redundant(cells, dim, a, b, &next) {
                facets.push(i);
            }
        }
        facets
    }

    // ---- relation -----------------------------------------------------

    /// Cost of `self`'s plane at the offset point of `other_cells`.
    fn cost_at_other_offset(&self, other_cells: &[Bound]) -> i64 {
        let dim = self.dim();
        let own = self.dbm.cells();
        let mut cost = i64::from(self.cost);
        for i in 1..dim {
            let other_lower = -i64::from(other_cells[i].bound());
            let own_lower = -i64::from(own[i].bound());
            cost += i64::from(self.rates[i]) * (other_lower - own_lower);
        }
        cost
    }

    /// Infimum of the difference of two planes over `cells`, both costs
    /// anchored at the offset of `cells`.
    fn inf_of_diff(cells: &[Bound], dim: usize, cost1: i64, rates1: &[i32], cost2: i64, rates2: &[i32]) -> i64 {
        let rates: Vec<i32> = rates1
            .iter()
            .zip(rates2)
            .map(|(&a, &b)| a - b)
            .collect();
        Self::relative_infimum(cells, dim, cost1 - cost2, &rates)
            .unwrap_or(-i64::from(MAX_BOUND))
    }

    /// Relation combining zone inclusion with plane dominance: a zone is
    /// "included" in a cheaper-or-equal zone covering it.
    pub fn relation(&self, other: &Self) -> Relation {
        let dim = self.dim();
        if dim != other.dim() {
            return Relation::DIFFERENT;
        }
        let leq = |a: &[i32], b: &[i32]| a.iter().zip(b).all(|(x, y)| x <= y);
        let d1 = self.dbm.cells();
        let d2 = other.dbm.cells();
        let zones = kernel::relation(d1, d2, dim);
        if zones.is_equal() {
            let cost1 = i64::from(self.cost);
            let cost2 = i64::from(other.cost);
            let c = cost1 <= cost2 && leq(&self.rates, &other.rates);
            let d = cost2 <= cost1 && leq(&other.rates, &self.rates);
            if c && d {
                return Relation::EQUAL;
            }
            if c {
                return Relation::SUPERSET;
            }
            if d {
                return Relation::SUBSET;
            }
            // Incomparable planes: settle by the sign of the two
            // difference infima.
            let c = Self::inf_of_diff(d1, dim, cost2, &other.rates, cost1, &self.rates);
            if c > 0 {
                return Relation::SUPERSET;
            }
            let d = Self::inf_of_diff(d1, dim, cost1, &self.rates, cost2, &other.rates);
            if c == 0 && d == 0 {
                Relation::EQUAL
            } else if c >= 0 {
                Relation::SUPERSET
            } else if d >= 0 {
                Relation::SUBSET
            } else {
                Relation::DIFFERENT
            }
        } else if zones.is_superset_eq() {
            // other is the smaller zone; it must also be the costlier.
            let cost1 = self.cost_at_other_offset(d2);
            let cost2 = i64::from(other.cost);
            if cost1 <= cost2
                && (leq(&self.rates, &other.rates)
                    || Self::inf_of_diff(d2, dim, cost2, &other.rates, cost1, &self.rates) >= 0)
            {
                Relation::SUPERSET
            } else {
                Relation::DIFFERENT
            }
        } else if zones.is_subset_eq() {
            let cost2 = other.cost_at_other_offset(d1);
            let cost1 = i64::from(self.cost);
            if cost2 <= cost1
                && (leq(&other.rates, &self.rates)
                    || Self::inf_of_diff(d1, dim, cost1, &self.rates, cost2, &other.rates) >= 0)
            {
                Relation::SUBSET
            } else {
                Relation::DIFFERENT
            }
        } else {
            Relation::DIFFERENT
        }
    }

    // ---- extrapolation ------------------------------------------------

    /// Max-bounds extrapolation; the ceilings of clocks with a non-zero
    /// rate are lifted to infinity first, since widening a priced clock
    /// would change the infimum.
    pub fn extrapolate_max_bounds(&mut self, max: &[i32]) {
        let mut max = max.to_vec();
        for i in 1..self.dim() {
            if self.rates[i] != 0 {
                max[i] = MAX_BOUND;
            }
        }
        self.dbm.extrapolate_max_bounds(&max);
        self.invalidate();
    }

    /// Diagonal max-bounds extrapolation with rate transfer: an inactive
    /// clock on a zero cycle first hands its rate to a partner (an active
    /// one when possible) so its ceiling can be widened.
    pub fn diagonal_extrapolate_max_bounds(&mut self, max: &[i32]) {
        let mut max = max.to_vec();
        for i in 1..self.dim() {
            if max[i] == -MAX_BOUND && self.rates[i] != 0 {
                if let Some(first) = self.find_zero_cycle(i) {
                    let mut k = first;
                    while max[k] == -MAX_BOUND {
                        match self.find_next_zero_cycle(i, k + 1) {
                            Some(n) => k = n,
                            None => {
                                k = first;
                                break;
                            }
                        }
                    }
                    if k != 0 {
                        self.rates[k] += self.rates[i];
                    }
                    self.rates[i] = 0;
                }
            }
        }
        for i in 1..self.dim() {
            if self.rates[i] != 0 {
                max[i] = MAX_BOUND;
            }
        }
        self.dbm.diagonal_extrapolate_max_bounds(&max);
        self.invalidate();
    }

    /// Diagonal LU extrapolation; both ceilings of priced clocks are
    /// lifted first.
    pub fn diagonal_extrapolate_lu_bounds(&mut self, lower: &[i32], upper: &[i32]) {
        let mut lower = lower.to_vec();
        let mut upper = upper.to_vec();
        for i in 1..self.dim() {
            if self.rates[i] != 0 {
                lower[i] = MAX_BOUND;
                upper[i] = MAX_BOUND;
            }
        }
        self.dbm.diagonal_extrapolate_lu_bounds(&lower, &upper);
        self.invalidate();
    }

    // ---- packed form --------------------------------------------------

    /// Serialize as the priced prefix (cost, cached infimum, rates)
    /// followed by the zone's packed stream.
    #[must_use]
    pub fn write_packed(&self, minimize: bool, try16: bool) -> Vec<u32> {
        let dim = self.dim();
        let mut out = pack::write_with_offset(&self.dbm, minimize, try16, dim + 2);
        out[0] = self.cost as u32;
        out[1] = self.cache.get().map_or(INVALID_CACHE, |c| c as i32) as u32;
        for (k, &r) in self.rates.iter().enumerate() {
            out[2 + k] = r as u32;
        }
        out
    }

    /// Rebuild from [`PricedDbm::write_packed`] output. The dimension is
    /// supplied by the caller, as with every priced stream consumer.
    pub fn read_packed(dim: usize, stream: &[u32]) -> Self {
        let cost = stream[0] as i32;
        let cache = stream[1] as i32;
        let rates: Vec<i32> = stream[2..2 + dim].iter().map(|&w| w as i32).collect();
        let dbm = pack::read(&stream[2 + dim..]);
        debug_assert_eq!(dbm.dim(), dim);
        Self {
            dbm,
            rates,
            cost,
            cache: Cell::new((cache != INVALID_CACHE).then(|| i64::from(cache))),
        }
    }

    /// Debug invariant: the cache matches a recomputation, rates are
    /// anchored, and an unbounded zone has a non-negative delay slope.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if self.dbm.is_empty() {
            return true;
        }
        let cache_ok = match self.cache.get() {
            None => true,
            Some(c) => {
                let fresh = Self::relative_infimum(
                    self.dbm.cells(),
                    self.dim(),
                    i64::from(self.cost),
                    &self.rates,
                );
                fresh == Some(c)
            }
        };
        cache_ok
            && self.rates[0] == 0
            && (!self.is_unbounded() || self.slope_of_delay_trajectory() >= 0)
    }
}

/// A constraint `(i, j)` is implied by a two-hop path through a class
/// representative.
fn is_redundant(cells: &[Bound], dim: usize, i: usize, j: usize, next: &[usize]) -> bool {
    if i == j {
        return true;
    }
    let bij = cells[idx(dim, i, j)];
    if bij.is_infinity() {
        return true;
    }
    for k in 0..dim {
        if k != i && k != j && next[k] == 0 {
            let bik = cells[idx(dim, i, k)];
            let bkj = cells[idx(dim, k, j)];
            if !bik.is_infinity() && !bkj.is_infinity() && bij >= bik.add(bkj) {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn priced_interval(lo: i32, hi: Option<i32>, rate: i32, cost: i32) -> PricedDbm {
        let mut p = PricedDbm::init(2);
        assert!(p.constrain(Constraint::weak(0, 1, -lo)));
        if let Some(hi) = hi {
            assert!(p.constrain(Constraint::weak(1, 0, hi)));
        }
        p.set_rate(1, rate);
        p.set_cost(cost);
        p
    }

    #[test]
    fn zero_rates_infimum_is_cost() {
        let p = priced_interval(2, Some(5), 0, 11);
        assert_eq!(p.infimum(), Some(11));
        let (inf, val) = p.infimum_valuation().unwrap();
        assert_eq!(inf, 11);
        assert_eq!(val, vec![0, 2]);
    }

    #[test]
    fn positive_rate_infimum_at_offset() {
        // Cost of x over [2,5] relative to the offset x = 2.
        let p = priced_interval(2, Some(5), 1, 0);
        assert_eq!(p.infimum(), Some(0));
        let (_, val) = p.infimum_valuation().unwrap();
        assert_eq!(val, vec![0, 2]);
    }

    #[test]
    fn negative_rate_infimum_at_upper_bound() {
        let p = priced_interval(2, Some(5), -1, 0);
        // Down 3 from the offset: 0 - 1 * (5 - 2).
        assert_eq!(p.infimum(), Some(-3));
        let (inf, val) = p.infimum_valuation().unwrap();
        assert_eq!(inf, -3);
        assert_eq!(val, vec![0, 5]);
    }

    #[test]
    fn unbounded_negative_rate() {
        let p = priced_interval(2, None, -1, 0);
        assert_eq!(p.infimum(), None);
        assert_eq!(p.infimum_valuation(), Err(Error::UnboundedInfimum));
    }

    #[test]
    fn infimum_cache_and_invalidation() {
        let mut p = priced_interval(0, Some(9), -2, 0);
        assert_eq!(p.infimum(), Some(-18));
        // Cached now; shrinking the zone must drop it.
        assert!(p.constrain(Constraint::weak(1, 0, 4)));
        assert_eq!(p.infimum(), Some(-8));
        assert!(p.is_valid());
    }

    #[test]
    fn constrain_reanchors_cost() {
        // Raising the lower bound moves the offset; with rate 2 the cost
        // at the new offset grows accordingly.
        let mut p = priced_interval(0, Some(10), 2, 5);
        assert!(p.constrain(Constraint::weak(0, 1, -3)));
        assert_eq!(p.cost_at_offset(), 5 + 2 * 3);
        assert_eq!(p.infimum(), Some(11));
    }

    #[test]
    fn free_down_moves_offset() {
        let mut p = priced_interval(4, Some(9), -1, 10);
        p.free_down(1);
        // Offset moved from 4 to 0: cost at offset rises by 4.
        assert_eq!(p.cost_at_offset(), 14);
        assert_eq!(p.offset(), vec![0, 0]);
    }

    #[test]
    fn cost_of_valuation_matches_plane() {
        let p = priced_interval(2, Some(8), 3, 1);
        assert_eq!(p.cost_of_valuation(&[0, 2]), 1);
        assert_eq!(p.cost_of_valuation(&[0, 5]), 1 + 3 * 3);
    }

    #[test]
    fn normalise_transfers_rates() {
        let mut p = PricedDbm::init(3);
        // Pin y = x + 1 into a zero cycle.
        assert!(p.constrain(Constraint::weak(2, 1, 1)));
        assert!(p.constrain(Constraint::weak(1, 2, -1)));
        p.set_rate(1, 3);
        p.set_rate(2, 4);
        assert!(!p.has_normal_form());
        p.normalise();
        assert!(p.has_normal_form());
        assert_eq!(p.rate(1), 0);
        assert_eq!(p.rate(2), 7);
    }

    #[test]
    fn relation_compares_planes() {
        let cheap = priced_interval(0, Some(5), 1, 0);
        let pricey = priced_interval(0, Some(5), 2, 3);
        // Same zone, cheaper plane everywhere: cheap "covers" pricey.
        assert_eq!(cheap.relation(&pricey), Relation::SUPERSET);
        assert_eq!(pricey.relation(&cheap), Relation::SUBSET);
        assert_eq!(cheap.relation(&cheap), Relation::EQUAL);

        // A smaller, more expensive zone is dominated.
        let small = priced_interval(1, Some(4), 1, 2);
        assert_eq!(cheap.relation(&small), Relation::SUPERSET);
        assert_eq!(small.relation(&cheap), Relation::SUBSET);
    }

    #[test]
    fn packed_round_trip() {
        let mut p = priced_interval(2, Some(7), -3, 4);
        let _ = p.infimum();
        for (minimize, try16) in [(true, true), (true, false), (false, false)] {
            let stream = p.write_packed(minimize, try16);
            let back = PricedDbm::read_packed(2, &stream);
            assert_eq!(back.dim(), 2);
            assert_eq!(back.cost_at_offset(), 4);
            assert_eq!(back.rates(), p.rates());
            assert_eq!(back.dbm(), p.dbm());
            assert_eq!(back.infimum(), p.infimum());
        }
        // An invalidated cache survives as the sentinel.
        p.set_rate(1, -1);
        let stream = p.write_packed(true, true);
        let back = PricedDbm::read_packed(2, &stream);
        assert_eq!(back.infimum(), Some(-5 + 4));
    }

    #[test]
    fn facets_of_a_box() {
        let mut p = PricedDbm::init(3);
        assert!(p.constrain_many(&[
            Constraint::weak(1, 0, 5),
            Constraint::weak(0, 1, -1),
            Constraint::weak(2, 0, 7),
        ]));
        let lower = p.lower_facets();
        assert!(lower.contains(&1));
        assert!(lower.contains(&2));
        let upper = p.upper_facets();
        assert!(upper.contains(&1));
        assert!(upper.contains(&2));
    }

    #[test]
    fn extrapolation_lifts_priced_ceilings() {
        let mut p = priced_interval(0, Some(100), 1, 0);
        let before = p.dbm().clone();
        p.extrapolate_max_bounds(&[0, 10]);
        // The clock carries cost, so its ceiling was lifted: no widening.
        assert_eq!(p.dbm(), &before);

        let mut q = priced_interval(0, Some(100), 0, 0);
        q.extrapolate_max_bounds(&[0, 10]);
        assert!(q.dbm().get(1, 0).unwrap().is_infinity());
    }

    #[test]
    fn contains_weakly_ignores_strictness() {
        let mut p = PricedDbm::init(2);
        assert!(p.constrain(Constraint::strict(1, 0, 5)));
        assert!(!p.contains(&[0, 5]));
        assert!(p.contains_weakly(&[0, 5]));
        assert!(!p.contains_weakly(&[0, 6]));
    }
}
