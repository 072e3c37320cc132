//! Timed predecessors and successors.
//!
//! `predt(good, bad)` is the set of valuations from which delaying reaches
//! `good` without first touching `bad`; `succt` is the dual. For a union
//! of bad zones the predecessor distributes as an intersection:
//! `predt(g, b1 | b2) = predt(g, b1) & predt(g, b2)`, computed per good
//! member with the convex-bad formula
//! `down(g) - down(b) | down((down(b) & g) - b)`.

use super::Federation;
use crate::dbm::Dbm;

impl Federation {
    /// Replace this federation of good zones by the timed predecessors
    /// avoiding `bad`. `restrict` is intersected into every `down`.
    pub fn predt(&mut self, bad: &Self, restrict: Option<&Dbm>) {
        debug_assert_eq!(self.dim(), bad.dim());
        if bad.size() == 1 {
            self.predt_dbm(&bad.zones()[0], restrict);
            return;
        }
        if bad.is_empty() {
            self.down();
            if let Some(r) = restrict {
                self.intersect_dbm(r);
            }
            return;
        }
        if self.is_empty() {
            return;
        }

        let dim = self.dim();
        let mut result = Federation::new(dim);
        result.set_merge_style(self.merge_style());
        for goods in self.zones() {
            let mut down_good = goods.clone();
            down_good.down();
            if let Some(r) = restrict {
                down_good.intersect(r);
            }
            let mut intersec = Federation::from(down_good.clone());
            for bads in bad.zones() {
                if intersec.is_empty() {
                    break;
                }
                if !down_good.intersects(bads) {
                    continue;
                }
                let part = predt_convex(goods, &down_good, bads, restrict);
                intersec.intersect_fed(&part);
            }
            result.append(&mut intersec);
        }
        *self.zones_mut() = result.write();
    }

    /// [`Federation::predt`] against a single convex bad zone.
    pub fn predt_dbm(&mut self, bad: &Dbm, restrict: Option<&Dbm>) {
        debug_assert_eq!(self.dim(), bad.dim());
        if bad.is_empty() {
            self.down();
            if let Some(r) = restrict {
                self.intersect_dbm(r);
            }
            return;
        }
        if self.is_empty() {
            return;
        }
        let dim = self.dim();
        let mut result = Federation::new(dim);
        result.set_merge_style(self.merge_style());
        for goods in self.zones() {
            let mut down_good = goods.clone();
            down_good.down();
            if let Some(r) = restrict {
                down_good.intersect(r);
            }
            let mut intersec = if down_good.intersects(bad) {
                predt_convex(goods, &down_good, bad, restrict)
            } else {
                Federation::from(down_good)
            };
            result.append(&mut intersec);
        }
        *self.zones_mut() = result.write();
    }

    /// Timed successors avoiding `bad`, with the safety check that the
    /// result's upper facets stay out of `good`'s complement. Returns
    /// `false` when the check fails and the federation is left unchanged.
    pub fn succt(&mut self, bad: &Self) -> bool {
        debug_assert_eq!(self.dim(), bad.dim());
        if self.is_subtraction_empty(bad) {
            self.set_empty();
            return true;
        }
        if bad.is_empty() || self.is_empty() {
            self.up();
            return true;
        }

        let dim = self.dim();
        let mut result = Federation::new(dim);
        result.set_merge_style(self.merge_style());
        for goods in self.zones() {
            let mut up_good = goods.clone();
            up_good.up();
            let mut intersec: Option<Federation> = None;
            for bads in bad.zones() {
                let Some(part) = succt_convex(goods, &up_good, bads) else {
                    return false;
                };
                match intersec.as_mut() {
                    None => intersec = Some(part),
                    Some(acc) => acc.intersect_fed(&part),
                }
                if intersec.as_ref().is_some_and(Federation::is_empty) {
                    break;
                }
            }
            if let Some(mut acc) = intersec {
                result.append(&mut acc);
            }
        }
        *self.zones_mut() = result.write();
        true
    }

    /// `self` is included in `predt(good, bad)`, computed with early
    /// exits instead of materializing the predecessor set.
    #[must_use]
    pub fn is_included_in_predt(&self, good: &Self, bad: &Self) -> bool {
        if self.is_empty() {
            return true;
        }
        if good.is_empty() {
            return false;
        }
        let mut down_good_fed = good.clone();
        down_good_fed.down();
        let le_down_good = self.is_subtraction_empty(&down_good_fed);
        if bad.is_empty() {
            return le_down_good;
        }
        if !le_down_good {
            // Included in predt implies included in down(good).
            return false;
        }

        let mut result: Option<Federation> = None;
        for bads in bad.zones() {
            let mut down_bad = bads.clone();
            down_bad.down();
            let mut good_and_down_bad = good.clone();
            good_and_down_bad.intersect_dbm(&down_bad);
            let mut fed = down_good_fed.clone();
            fed.subtract_dbm(&down_bad);
            if !good_and_down_bad.is_empty() {
                good_and_down_bad.subtract_dbm(bads);
                good_and_down_bad.down();
                fed.union_with(&mut good_and_down_bad);
            }
            // Not inside this partial predecessor: false for sure.
            if !self.is_subtraction_empty(&fed) {
                return false;
            }
            match result.as_mut() {
                None => result = Some(fed),
                Some(acc) => {
                    acc.intersect_fed(&fed);
                    if acc.is_empty() {
                        return false;
                    }
                }
            }
        }
        result.is_some_and(|acc| self.is_subtraction_empty(&acc))
    }

    /// The lower facets of every member as a federation: each weak lower
    /// bound turned into an equality slice, minus the closed-boundary
    /// parts counted twice.
    pub fn to_lower_bounds(&self) -> Self {
        let dim = self.dim();
        if self.is_empty() || dim <= 1 {
            return self.clone();
        }
        let mut result = Federation::new(dim);
        result.set_merge_style(self.merge_style());
        for k in self.zones() {
            for j in 1..dim {
                let low = k.get(0, j).unwrap();
                if low.is_weak() {
                    let mut copy = k.clone();
                    if copy.constrain(crate::common::Constraint::new(j, 0, low.weak_negated())) {
                        result.push(copy);
                    }
                }
            }
        }
        if self.size() > 1 {
            for k in self.zones() {
                let mut copy = k.clone();
                if copy.tighten_down() {
                    result.subtract_dbm(&copy);
                }
            }
        }
        result
    }

    /// The upper facets of every member as a federation.
    pub fn to_upper_bounds(&self) -> Self {
        let dim = self.dim();
        if self.is_empty() {
            return self.clone();
        }
        let mut result = Federation::new(dim);
        result.set_merge_style(self.merge_style());
        if dim <= 1 {
            return result;
        }
        for k in self.zones() {
            for i in 1..dim {
                let up = k.get(i, 0).unwrap();
                if !up.is_infinity() && up.is_weak() {
                    let mut copy = k.clone();
                    if copy.constrain(crate::common::Constraint::new(0, i, up.weak_negated())) {
                        result.push(copy);
                    }
                }
            }
        }
        if self.size() > 1 {
            for k in self.zones() {
                let mut copy = k.clone();
                if copy.tighten_up() {
                    result.subtract_dbm(&copy);
                }
            }
        }
        result
    }

    /// Turn every weak lower facet into an upper facet and close down.
    /// Returns the empty federation when some lower bound is strict.
    pub fn lower_to_upper(&self) -> Self {
        let dim = self.dim();
        if self.is_empty() {
            return self.clone();
        }
        let mut result = Federation::new(dim);
        result.set_merge_style(self.merge_style());
        if dim <= 1 {
            return result;
        }
        for k in self.zones() {
            for i in 1..dim {
                let low = k.get(0, i).unwrap();
                if low.is_weak() {
                    let mut copy = k.clone();
                    if copy.constrain(crate::common::Constraint::new(i, 0, low.weak_negated())) {
                        copy.down();
                        result.push(copy);
                    }
                } else {
                    return Federation::new(dim);
                }
            }
        }
        result
    }
}

/// `predt` of one good member against one convex bad zone:
/// `down(g) - down(b) | down((down(b) & g) - b)`, restricted.
fn predt_convex(
    goods: &Dbm,
    down_good: &Dbm,
    bad: &Dbm,
    restrict: Option<&Dbm>,
) -> Federation {
    let mut down_bad = bad.clone();
    down_bad.down();
    if let Some(r) = restrict {
        down_bad.intersect(r);
    }

    let mut part = Federation::from(down_good.clone());
    part.subtract_dbm(&down_bad);

    let mut entered = down_bad;
    if entered.intersect(goods) {
        let mut through = Federation::from(entered);
        through.subtract_dbm(bad);
        through.down();
        if let Some(r) = restrict {
            through.intersect_dbm(r);
        }
        part.append(&mut through);
    }
    part
}

/// `succt` of one good member against one convex bad zone, with the
/// safety check. `None` when the check fails.
fn succt_convex(goods: &Dbm, up_good: &Dbm, bad: &Dbm) -> Option<Federation> {
    let dim = goods.dim();
    if goods.subset_eq(bad) {
        return Some(Federation::new(dim));
    }
    let mut up_bad = bad.clone();
    up_bad.up();

    let mut result = Federation::from(up_good.clone());
    result.subtract_dbm(&up_bad);
    let mut through = goods.clone();
    if through.intersect(&up_bad) {
        let mut through_fed = Federation::from(through);
        through_fed.subtract_dbm(bad);
        through_fed.up();
        result.union_with(&mut through_fed);
    }

    let copy = result.clone();
    result.relax_up();
    result.reduce();

    let mut check = result.to_upper_bounds();
    check.subtract_dbm(goods);
    let mut probe = copy;
    probe.intersect_fed(&check);
    probe.is_empty().then_some(result)
}
