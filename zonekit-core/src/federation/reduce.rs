//! Federation reductions.
//!
//! Every reduction preserves the set union and only reshapes the member
//! list. They trade accuracy for cost: `reduce` removes included members,
//! `merge_reduce` additionally merges pairs whose convex union is exact,
//! and the convex/expensive/partition family works ever harder to shrink
//! the list.

use super::Federation;
use crate::bound::Bound;
use crate::common::MergeStyle;
use crate::dbm::kernel::{self, idx};
use tracing::trace;

/// No intersection for sure, computed on weak-biased sums of a diagonal
/// pair. Finite bounds only.
fn check_weak_add(a: Bound, b: Bound) -> bool {
    if a.is_infinity() || b.is_infinity() {
        return false;
    }
    let sum = i64::from(a.raw()) + i64::from(b.raw()) - i64::from(a.raw() & b.raw() & 1);
    sum < i64::from(Bound::LE_ZERO.raw())
}

enum Outcome {
    Advance,
    SameIndex,
    Done,
}

impl Federation {
    /// Remove members included in other members.
    pub fn reduce(&mut self) {
        let mut i = 0;
        'outer: while i < self.zones_mut().len() {
            let mut j = i + 1;
            while j < self.zones_mut().len() {
                let rel = self.zones()[i].relation(&self.zones()[j]);
                if rel.is_superset_eq() {
                    self.zones_mut().remove(j);
                } else if rel.is_subset_eq() {
                    self.zones_mut().remove(i);
                    continue 'outer;
                } else {
                    j += 1;
                }
            }
            i += 1;
        }
    }

    /// Pairwise merge of members whose convex union adds nothing, plus the
    /// inclusion pruning of [`Federation::reduce`] in the same pass.
    pub fn merge_reduce(&mut self) {
        self.merge_reduce_level(0, 0);
    }

    /// [`Federation::merge_reduce`] skipping the first `skip` members,
    /// which are already known reduced.
    pub(crate) fn merge_reduce_from(&mut self, skip: usize) {
        self.merge_reduce_level(skip, 0);
    }

    /// Merge reduction with an explicit effort `level`: level 0 proves a
    /// merge safe against the pair alone, level 1 additionally discounts
    /// pieces covered by single other members, level 2 subtracts the
    /// other members one by one.
    pub fn merge_reduce_level(&mut self, skip: usize, level: u32) {
        if self.size() <= 1 {
            return;
        }
        let dim = self.dim();
        let unrestricted = level != 0 || self.merge_style() == MergeStyle::Unrestricted;
        let mut merged = 0usize;

        let mut i = skip.max(1);
        'outer: while i < self.zones_mut().len() {
            let mut j = 0;
            while j < i {
                let zi = self.zones()[i].clone();
                let zj = self.zones()[j].clone();
                let d1 = zi.cells();
                let d2 = zj.cells();

                let mut subset = true;
                let mut superset = true;
                let mut nb_ok = usize::from(dim <= 2);
                let mut disjoint = false;
                'scan: for a in 1..dim {
                    let mut row_ok = false;
                    for b in 0..a {
                        let ab = idx(dim, a, b);
                        let ba = idx(dim, b, a);
                        if check_weak_add(d1[ab], d2[ba]) || check_weak_add(d1[ba], d2[ab]) {
                            disjoint = true;
                            break 'scan;
                        }
                        subset &= d1[ab] <= d2[ab] && d1[ba] <= d2[ba];
                        superset &= d1[ab] >= d2[ab] && d1[ba] >= d2[ba];
                        row_ok |= d1[ab] == d2[ab] && d1[ba] == d2[ba];
                    }
                    nb_ok += usize::from(row_ok);
                }
                if disjoint {
                    j += 1;
                    continue;
                }
                if subset {
                    self.zones_mut().remove(i);
                    continue 'outer;
                }
                if superset {
                    self.zones_mut().remove(j);
                    i -= 1;
                    continue;
                }
                let mergeable = if unrestricted {
                    nb_ok > 0
                } else {
                    nb_ok + 2 >= dim
                };
                if mergeable {
                    let mut hull = zi.clone();
                    hull.convex_union(&zj);
                    let mut fc = Federation::from(hull.clone());
                    fc.subtract_dbm(&zi);
                    let mut safe = fc.le_dbm(&zj);
                    if !safe && level != 0 {
                        fc.subtract_dbm(&zj);
                        debug_assert!(!fc.is_empty());
                        for k in 0..self.zones_mut().len() {
                            if k == i || k == j {
                                continue;
                            }
                            if level == 1 {
                                fc.remove_included_in_dbm(&self.zones()[k]);
                            } else {
                                fc.subtract_dbm(&self.zones()[k]);
                            }
                            if fc.is_empty() {
                                safe = true;
                                break;
                            }
                        }
                    }
                    if safe {
                        merged += 1;
                        self.zones_mut()[i] = hull;
                        self.zones_mut().remove(j);
                        i -= 1;
                        j = 0;
                        continue;
                    }
                }
                j += 1;
            }
            i += 1;
        }
        if merged > 0 {
            trace!(merged, size = self.size(), "merge reduce");
        }
    }

    /// Remove members covered by the union of the others. Exact and
    /// quadratic in subtractions.
    pub fn expensive_reduce(&mut self) {
        let mut i = 0;
        while self.size() > 1 && i < self.zones_mut().len() {
            let current = self.zones_mut().remove(i);
            if self.zones().iter().all(|z| z.subset_eq(&current)) {
                // Everything else fits inside: the federation is current.
                self.zones_mut().clear();
                self.zones_mut().push(current);
                break;
            } else if self.covers_dbm(&current) {
                // Covered by the rest; drop it.
                if self.size() <= 1 {
                    break;
                }
            } else {
                self.zones_mut().insert(i, current);
                i += 1;
            }
        }
    }

    /// Grow members by absorbing compatible neighbours into a convex hull
    /// and commit when the hull adds nothing, otherwise re-split the hull
    /// into fewer pieces when that wins.
    pub fn convex_reduce(&mut self) {
        if self.size() <= 1 {
            return;
        }
        let dim = self.dim();
        let mut fi = 0;
        'outer: while fi < self.zones_mut().len() {
            let mut removed = Federation::new(dim);
            removed.set_merge_style(self.merge_style());
            let outcome = 'with_removed: loop {
                let dbmi = self.zones()[fi].clone();
                let mut convexi = dbmi.clone();
                let mut fj = fi + 1;
                while fj < self.zones_mut().len() {
                    let dbmj = self.zones()[fj].clone();
                    let d1 = dbmi.cells();
                    let d2 = dbmj.cells();
                    let mut subset = true;
                    let mut superset = true;
                    let mut compatible = dim <= 2;
                    let mut sym_compatible = compatible;
                    let mut disjoint = false;
                    'scan: for a in 1..dim {
                        for b in 0..a {
                            let ab = idx(dim, a, b);
                            let ba = idx(dim, b, a);
                            if check_weak_add(d1[ab], d2[ba]) || check_weak_add(d1[ba], d2[ab]) {
                                disjoint = true;
                                break 'scan;
                            }
                            let c1 = d1[ab] == d2[ab];
                            compatible |= c1;
                            subset &= d1[ab] <= d2[ab];
                            superset &= d1[ab] >= d2[ab];
                            let c2 = d1[ba] == d2[ba];
                            compatible |= c2;
                            sym_compatible |= c1 && c2;
                            subset &= d1[ba] <= d2[ba];
                            superset &= d1[ba] >= d2[ba];
                        }
                    }
                    if disjoint {
                        fj += 1;
                        continue;
                    }
                    if subset {
                        // dbmi is inside dbmj: drop it, restart on the
                        // member that slid into its slot.
                        self.zones_mut().remove(fi);
                        self.append(&mut removed);
                        if fi >= self.zones_mut().len() {
                            break 'with_removed Outcome::Done;
                        }
                        continue 'with_removed;
                    }
                    if superset {
                        self.zones_mut().remove(fj);
                        continue;
                    }
                    if sym_compatible {
                        let mut try_merge = dbmi.clone();
                        try_merge.convex_union(&dbmj);
                        let mut rest = Federation::from(try_merge.clone());
                        rest.subtract_dbm(&dbmi);
                        rest.subtract_dbm(&dbmj);
                        if rest.is_empty() {
                            self.zones_mut()[fi] = try_merge;
                            self.zones_mut().remove(fj);
                            self.append(&mut removed);
                            continue 'with_removed;
                        }
                    }
                    if compatible || sym_compatible {
                        convexi.convex_union(&dbmj);
                        removed.push(dbmj);
                        self.zones_mut().remove(fj);
                        continue;
                    }
                    fj += 1;
                }

                if removed.is_empty() {
                    break 'with_removed Outcome::Advance;
                }

                // Second pass: the hull may have grown over members that
                // were not directly compatible.
                let mut fj = fi + 1;
                while fj < self.zones_mut().len() {
                    if self.zones()[fj].subset_eq(&convexi) {
                        let z = self.zones_mut().remove(fj);
                        removed.push(z);
                    } else {
                        fj += 1;
                    }
                }

                removed.merge_reduce();
                let mut too_much = Federation::from(convexi.clone());
                too_much.subtract_dbm(&dbmi);
                too_much.subtract_fed(&removed);
                if too_much.is_empty() {
                    // The hull is exactly the absorbed members: commit.
                    self.zones_mut()[fi] = convexi;
                    if self.size() == 1 {
                        break 'with_removed Outcome::Done;
                    }
                    break 'with_removed Outcome::SameIndex;
                }

                // The hull overshoots; re-split it and keep whichever of
                // the splits or the original members is smaller.
                too_much.merge_reduce();
                let mut new_fed = Federation::from(convexi);
                new_fed.subtract_fed(&too_much);
                new_fed.merge_reduce();
                if new_fed.size() <= removed.size() {
                    self.zones_mut().remove(fi);
                    self.append(&mut new_fed);
                    break 'with_removed Outcome::SameIndex;
                }

                removed.zones_mut().insert(0, dbmi.clone());
                removed.expensive_reduce();
                let head_survived = removed
                    .zones()
                    .first()
                    .map_or(false, |z| z.same_as(&dbmi));
                if head_survived {
                    removed.zones_mut().remove(0);
                    self.append(&mut removed);
                    break 'with_removed Outcome::Advance;
                }
                self.zones_mut().remove(fi);
                self.append(&mut removed);
                break 'with_removed Outcome::SameIndex;
            };
            match outcome {
                Outcome::Advance => fi += 1,
                Outcome::SameIndex => {}
                Outcome::Done => break 'outer,
            }
        }
    }

    /// Replace the federation by `hull - (hull - fed)` when the detour
    /// pays off.
    pub fn expensive_convex_reduce(&mut self) {
        if self.size() <= 1 {
            return;
        }
        let mut hull = self.zones()[0].clone();
        for z in &self.zones()[1..] {
            hull.convex_union(z);
        }
        let mut excess = Federation::from(hull.clone());
        excess.subtract_fed(self);

        // Abort heuristics: a wild excess will not merge into few pieces.
        if excess.size() > 5 * self.size() {
            return;
        }
        excess.merge_reduce();
        if excess.size() > self.size() {
            return;
        }

        let mut new_fed = Federation::from(hull);
        new_fed.subtract_fed(&excess);
        if new_fed.size() < 3 * (excess.size() + self.size()) {
            new_fed.merge_reduce();
            if new_fed.size() < self.size() {
                trace!(from = self.size(), to = new_fed.size(), "expensive convex reduce");
                *self.zones_mut() = new_fed.write();
            }
        }
    }

    /// Partition into weakly-disjoint islands and reduce each island
    /// separately.
    pub fn partition_reduce(&mut self) {
        match self.size() {
            0 | 1 => {}
            2 => self.convex_reduce(),
            _ => {
                let dim = self.dim();
                let mut scratch = vec![Bound::LE_ZERO; dim * dim];
                let mut result = Federation::new(dim);
                result.set_merge_style(self.merge_style());

                while !self.zones_mut().is_empty() {
                    let mut island = Federation::new(dim);
                    island.set_merge_style(self.merge_style());
                    let seed = self.zones_mut().remove(0);
                    island.zones_mut().push(seed);

                    let mut i = 0;
                    while i < island.zones_mut().len() {
                        let zi = island.zones()[i].clone();
                        let mut j = 0;
                        while j < self.zones_mut().len() {
                            let touches = kernel::relaxed_intersection(
                                &mut scratch,
                                zi.cells(),
                                self.zones()[j].cells(),
                                dim,
                            );
                            if touches {
                                let z = self.zones_mut().remove(j);
                                island.zones_mut().push(z);
                            } else {
                                j += 1;
                            }
                        }
                        i += 1;
                    }

                    island.convex_reduce();
                    island.expensive_convex_reduce();
                    result.append(&mut island);
                }
                *self.zones_mut() = result.write();
            }
        }
    }
}
