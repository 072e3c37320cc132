//! Infimum of a linear cost function over a zone, by dual network simplex.
//!
//! Minimizing `sum(rates[i] * xi)` subject to the difference constraints
//! of a closed DBM is the dual of a min-cost-flow problem on the zone's
//! constraint graph: nodes are clocks (the reference clock is the root),
//! arcs are the essential constraints of the minimal graph, and the
//! supply of node `i` is `-rates[i]`. The simplex walks spanning trees of
//! that graph; at termination the node potentials are exactly the
//! coordinates of an infimum-achieving valuation.
//!
//! Trees are stored as indexed nodes carrying predecessor, depth, a
//! preorder thread, the direction and flow of the arc to the predecessor,
//! and the node potential.

use crate::bound::{Bound, MAX_BOUND};
use crate::dbm::kernel::idx;
use crate::mingraph;
use tracing::trace;

#[derive(Debug, Clone, Copy)]
struct Node {
    pred: usize,
    depth: u32,
    thread: usize,
    /// Arc between this node and its predecessor points at this node.
    inbound: bool,
    flow: i64,
    potential: i64,
}

#[derive(Debug, Copy, Clone)]
struct Arc {
    i: usize,
    j: usize,
}

/// Supply/demand of a node in the flow formulation.
fn b(rates: &[i32], i: usize) -> i64 {
    -i64::from(rates[i])
}

const INF: i64 = MAX_BOUND as i64;

/// Decoded bound of `dbm[i,j]`, `INF` for a missing constraint.
fn cost(dbm: &[Bound], dim: usize, i: usize, j: usize) -> i64 {
    let bound = dbm[idx(dim, i, j)];
    if bound.is_infinity() {
        INF
    } else {
        i64::from(bound.bound())
    }
}

/// Initial spanning tree of artificial arcs `0 <-> i`, with direction
/// chosen by the sign of the supply so that the tree is strongly feasible.
fn initial_tree(dbm: &[Bound], dim: usize, rates: &[i32]) -> Vec<Node> {
    let mut tree = Vec::with_capacity(dim);
    tree.push(Node {
        pred: 0,
        depth: 0,
        thread: 1 % dim,
        inbound: false,
        flow: -1,
        potential: 0,
    });
    for i in 1..dim {
        let supply = b(rates, i);
        tree.push(Node {
            pred: 0,
            depth: 1,
            thread: (i + 1) % dim,
            inbound: supply < 0,
            flow: i64::from(rates[i]).abs(),
            potential: if supply < 0 {
                -cost(dbm, dim, 0, i)
            } else {
                cost(dbm, dim, i, 0)
            },
        });
    }
    tree
}

/// Dantzig's rule: the arc with the most negative reduced cost.
fn entering_arc(arcs: &[Arc], tree: &[Node], dbm: &[Bound], dim: usize) -> Option<Arc> {
    let mut best = None;
    let mut lowest = 0;
    for arc in arcs {
        let reduced =
            cost(dbm, dim, arc.i, arc.j) - tree[arc.i].potential + tree[arc.j].potential;
        if reduced < lowest {
            lowest = reduced;
            best = Some(*arc);
        }
    }
    best
}

fn nth_pred(tree: &[Node], mut node: usize, n: i64) -> usize {
    for _ in 0..n.max(0) {
        node = tree[node].pred;
    }
    node
}

fn is_predecessor_of(tree: &[Node], n: usize, m: usize) -> bool {
    n == nth_pred(tree, m, i64::from(tree[m].depth) - i64::from(tree[n].depth))
}

/// Deepest common ancestor of `k` and `l`.
fn cycle_root(tree: &[Node], k: usize, l: usize) -> usize {
    let diff = i64::from(tree[k].depth) - i64::from(tree[l].depth);
    let mut k = nth_pred(tree, k, diff);
    let mut l = nth_pred(tree, l, -diff);
    while k != l {
        k = tree[k].pred;
        l = tree[l].pred;
    }
    k
}

/// First blocking arc when augmenting along the entering arc `(k, l)`:
/// the arc against the direction of `(k, l)` with the lowest flow, ties
/// broken towards the last such arc to keep the tree strongly feasible.
fn leaving_arc(tree: &[Node], k: usize, l: usize, root: usize) -> usize {
    let mut smallest = i64::MAX;
    let mut node = usize::MAX;
    let mut up = k;
    while up != root {
        if !tree[up].inbound && tree[up].flow < smallest {
            smallest = tree[up].flow;
            node = up;
        }
        up = tree[up].pred;
    }
    let mut down = l;
    while down != root {
        if tree[down].inbound && tree[down].flow <= smallest {
            smallest = tree[down].flow;
            node = down;
        }
        down = tree[down].pred;
    }
    debug_assert!(node != usize::MAX, "no oppositely directed arc in cycle");
    node
}

fn update_flow_in_cycle(tree: &mut [Node], k: usize, l: usize, root: usize, flow: i64) {
    if flow > 0 {
        let mut up = k;
        while up != root {
            tree[up].flow += if tree[up].inbound { flow } else { -flow };
            debug_assert!(tree[up].flow >= 0);
            up = tree[up].pred;
        }
        let mut down = l;
        while down != root {
            tree[down].flow += if tree[down].inbound { -flow } else { flow };
            debug_assert!(tree[down].flow >= 0);
            down = tree[down].pred;
        }
    }
}

/// Add `change` to the potential of every node in the subtree rooted at
/// `leave` (thread order).
fn update_potentials(tree: &mut [Node], leave: usize, change: i64) {
    let depth = tree[leave].depth;
    let mut z = leave;
    loop {
        tree[z].potential += change;
        z = tree[z].thread;
        if tree[z].depth <= depth {
            break;
        }
    }
}

/// Last node in preorder strictly before reaching `exclude`.
fn last_node_before(tree: &[Node], mut node: usize, exclude: usize) -> usize {
    let mut last = node;
    while node != exclude {
        last = node;
        node = tree[node].thread;
    }
    last
}

/// Last node of the subtree rooted at `node` (all deeper than `depth`).
fn last_node_deeper(tree: &[Node], mut node: usize, depth: u32) -> usize {
    let mut last = node;
    loop {
        last = node;
        node = tree[node].thread;
        if tree[node].depth <= depth {
            break;
        }
    }
    last
}

/// Re-hang the subtree cut off by removing the arc at `leave`: the path
/// from `non_root` up to `leave` reverses direction, `non_root` becomes a
/// child of `root_node`, and thread/depth bookkeeping follows.
fn update_non_root_subtree(
    tree: &mut [Node],
    root_node: usize,
    non_root: usize,
    leave: usize,
    source_in_root_subtree: bool,
    flow: i64,
) {
    // Thread surgery, walking the reversed path.
    let point_to_leave = last_node_before(tree, tree[leave].pred, leave);
    let mut last_out = last_node_deeper(tree, non_root, tree[non_root].depth);
    let mut preorder_out = tree[last_out].thread;
    let mut i = non_root;
    while i != leave {
        let prev = i;
        i = tree[i].pred;
        tree[last_out].thread = i;
        last_out = last_node_before(tree, i, prev);
        if i == tree[preorder_out].pred {
            tree[last_out].thread = preorder_out;
            last_out = last_node_deeper(tree, preorder_out, tree[i].depth);
            preorder_out = tree[last_out].thread;
        }
    }
    if point_to_leave == root_node {
        tree[root_node].thread = non_root;
        tree[last_out].thread = preorder_out;
    } else {
        tree[last_out].thread = tree[root_node].thread;
        tree[root_node].thread = non_root;
        tree[point_to_leave].thread = preorder_out;
    }

    // Reverse pred/flow/inbound along the path; the entering arc's data
    // lands on non_root.
    let mut new_pred = root_node;
    let mut new_flow = flow;
    let mut new_inbound = !source_in_root_subtree;
    let mut node = non_root;
    loop {
        let saved_pred = tree[node].pred;
        let saved_flow = tree[node].flow;
        let saved_inbound = tree[node].inbound;
        tree[node].pred = new_pred;
        tree[node].flow = new_flow;
        tree[node].inbound = !new_inbound;
        if node == leave {
            break;
        }
        new_pred = node;
        new_flow = saved_flow;
        new_inbound = saved_inbound;
        node = saved_pred;
    }

    // Depths follow the new preorder thread.
    let stop = tree[last_out].thread;
    let mut node = non_root;
    while node != stop {
        tree[node].depth = tree[tree[node].pred].depth + 1;
        node = tree[node].thread;
    }
}

fn update_spanning_tree(
    tree: &mut [Node],
    k: usize,
    l: usize,
    leave: usize,
    root: usize,
    cost_enter: i64,
) {
    let reduced_cost = cost_enter - tree[k].potential + tree[l].potential;
    let flow = tree[leave].flow;
    update_flow_in_cycle(tree, k, l, root, flow);
    if !is_predecessor_of(tree, leave, k) {
        update_potentials(tree, leave, -reduced_cost);
        update_non_root_subtree(tree, k, l, leave, true, flow);
    } else {
        update_potentials(tree, leave, reduced_cost);
        update_non_root_subtree(tree, l, k, leave, false, flow);
    }
}

/// Artificial arcs with zero flow distort the potentials towards the
/// infinite corner; shift every such subtree down so the potentials stay
/// non-negative and finite where possible.
fn remove_artificial_arcs(tree: &mut [Node], dbm: &[Bound], dim: usize, rates: &[i32]) {
    for i in 1..dim {
        if tree[i].potential == INF && tree[i].pred == 0 && tree[i].flow == 0 {
            tree[i].inbound = true;
            let mut min_potential = INF + cost(dbm, dim, 0, i);
            let mut sum = b(rates, i);
            let mut t = tree[i].thread;
            while tree[t].depth > tree[i].depth {
                sum += b(rates, t);
                min_potential = min_potential.min(tree[t].potential);
                t = tree[t].thread;
            }
            debug_assert_eq!(sum, 0);
            update_potentials(tree, i, -min_potential);
        }
    }
}

fn check_tree_integrity(tree: &[Node], dbm: &[Bound], dim: usize, rates: &[i32]) -> bool {
    // Flow conservation at every node.
    let mut sum: Vec<i64> = (0..dim).map(|i| b(rates, i)).collect();
    sum[0] = -(1..dim).map(|i| b(rates, i)).sum::<i64>();
    for i in 1..dim {
        let p = tree[i].pred;
        if tree[i].inbound {
            sum[i] += tree[i].flow;
            sum[p] -= tree[i].flow;
        } else {
            sum[p] += tree[i].flow;
            sum[i] -= tree[i].flow;
        }
    }
    if sum.iter().any(|&s| s != 0) {
        return false;
    }
    // Zero reduced cost on tree arcs.
    for i in 1..dim {
        let p = tree[i].pred;
        if tree[i].potential == INF && p == 0 {
            continue;
        }
        let reduced = if tree[i].inbound {
            cost(dbm, dim, p, i) - tree[p].potential + tree[i].potential
        } else {
            cost(dbm, dim, i, p) + tree[p].potential - tree[i].potential
        };
        if reduced != 0 {
            return false;
        }
    }
    // Depth agreement with the predecessor.
    for i in 1..dim {
        if tree[tree[i].pred].depth + 1 != tree[i].depth {
            return false;
        }
    }
    // The thread is a preorder covering all nodes exactly once.
    let mut seen = vec![false; dim];
    seen[0] = true;
    let mut t = tree[0].thread;
    for _ in 1..dim {
        if seen[t] {
            return false;
        }
        seen[t] = true;
        t = tree[t].thread;
    }
    t == 0 && seen.iter().all(|&s| s)
}

/// Result of the simplex: the infimum-achieving potentials, or the proof
/// that the problem is unbounded below.
pub(crate) enum Solution {
    Valuation(Vec<i64>),
    Unbounded,
}

/// Run the dual network simplex. The potentials at termination are the
/// optimal clock valuation; an artificial arc keeping positive flow means
/// the infimum is `-inf`.
pub(crate) fn solve(dbm: &[Bound], dim: usize, rates: &[i32]) -> Solution {
    debug_assert_eq!(rates.len(), dim);
    debug_assert_eq!(rates[0], 0);

    let (bits, count) = mingraph::analyze_cached(dbm, dim);
    let mut arcs = Vec::with_capacity(count);
    for (i, j) in bits.edges() {
        arcs.push(Arc { i, j });
    }

    let mut tree = initial_tree(dbm, dim, rates);
    debug_assert!(check_tree_integrity(&tree, dbm, dim, rates));

    let mut pivots = 0usize;
    while let Some(arc) = entering_arc(&arcs, &tree, dbm, dim) {
        let root = cycle_root(&tree, arc.i, arc.j);
        let leave = leaving_arc(&tree, arc.i, arc.j, root);
        update_spanning_tree(
            &mut tree,
            arc.i,
            arc.j,
            leave,
            root,
            cost(dbm, dim, arc.i, arc.j),
        );
        debug_assert!(check_tree_integrity(&tree, dbm, dim, rates));
        pivots += 1;
        debug_assert!(
            pivots <= dim * dim * (MAX_BOUND as usize),
            "network simplex failed to terminate"
        );
    }
    trace!(pivots, dim, "network simplex done");

    remove_artificial_arcs(&mut tree, dbm, dim, rates);

    for i in 1..dim {
        debug_assert!(tree[i].potential >= 0);
        if tree[i].potential == INF && tree[i].pred == 0 && tree[i].flow > 0 {
            return Solution::Unbounded;
        }
    }
    Solution::Valuation(tree.iter().map(|n| n.potential).collect())
}

/// Infimum of `cost + sum(rates[i] * xi)` over the zone. `None` when the
/// infimum is `-inf`.
pub fn infimum(dbm: &[Bound], dim: usize, cost_offset: i32, rates: &[i32]) -> Option<i64> {
    if rates.iter().all(|&r| r >= 0) {
        // Minimal at the lower corner of the zone.
        let lower: i64 = (1..dim)
            .map(|i| i64::from(rates[i]) * -i64::from(dbm[idx(dim, 0, i)].bound()))
            .sum();
        return Some(i64::from(cost_offset) + lower);
    }
    match solve(dbm, dim, rates) {
        Solution::Unbounded => None,
        Solution::Valuation(val) => {
            let sum: i64 = (1..dim).map(|i| i64::from(rates[i]) * val[i]).sum();
            Some(i64::from(cost_offset) + sum)
        }
    }
}

/// Infimum together with an achieving valuation. `None` when unbounded.
pub fn infimum_valuation(
    dbm: &[Bound],
    dim: usize,
    cost_offset: i32,
    rates: &[i32],
) -> Option<(i64, Vec<i64>)> {
    if rates.iter().all(|&r| r >= 0) {
        let mut val = vec![0i64; dim];
        for i in 1..dim {
            val[i] = -i64::from(dbm[idx(dim, 0, i)].bound());
        }
        let sum: i64 = (1..dim).map(|i| i64::from(rates[i]) * val[i]).sum();
        return Some((i64::from(cost_offset) + sum, val));
    }
    match solve(dbm, dim, rates) {
        Solution::Unbounded => None,
        Solution::Valuation(val) => {
            let sum: i64 = (1..dim).map(|i| i64::from(rates[i]) * val[i]).sum();
            Some((i64::from(cost_offset) + sum, val))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Constraint;
    use crate::dbm::Dbm;

    fn cells(dbm: &Dbm) -> Vec<Bound> {
        (0..dbm.dim() * dbm.dim())
            .map(|k| dbm.get(k / dbm.dim(), k % dbm.dim()).unwrap())
            .collect()
    }

    fn interval(lo: i32, hi: Option<i32>) -> Dbm {
        let mut dbm = Dbm::init(2);
        assert!(dbm.constrain(Constraint::weak(0, 1, -lo)));
        if let Some(hi) = hi {
            assert!(dbm.constrain(Constraint::weak(1, 0, hi)));
        }
        dbm
    }

    #[test]
    fn zero_rates_give_the_offset() {
        let dbm = interval(2, Some(5));
        assert_eq!(infimum(&cells(&dbm), 2, 7, &[0, 0]), Some(7));
    }

    #[test]
    fn positive_rate_sits_at_lower_bound() {
        let dbm = interval(2, Some(5));
        assert_eq!(infimum(&cells(&dbm), 2, 0, &[0, 1]), Some(2));
        let (inf, val) = infimum_valuation(&cells(&dbm), 2, 0, &[0, 1]).unwrap();
        assert_eq!(inf, 2);
        assert_eq!(val, vec![0, 2]);
    }

    #[test]
    fn negative_rate_sits_at_upper_bound() {
        let dbm = interval(2, Some(5));
        assert_eq!(infimum(&cells(&dbm), 2, 0, &[0, -1]), Some(-5));
        let (inf, val) = infimum_valuation(&cells(&dbm), 2, 0, &[0, -1]).unwrap();
        assert_eq!(inf, -5);
        assert_eq!(val, vec![0, 5]);
    }

    #[test]
    fn unbounded_zone_with_negative_rate() {
        let dbm = interval(2, None);
        assert_eq!(infimum(&cells(&dbm), 2, 0, &[0, -1]), None);
        assert!(infimum_valuation(&cells(&dbm), 2, 0, &[0, -1]).is_none());
    }

    #[test]
    fn diagonal_constraints_couple_clocks() {
        // x in [2,10], y in [0,10], y >= x: minimize y - 2x.
        let mut dbm = Dbm::init(3);
        assert!(dbm.constrain(Constraint::weak(0, 1, -2)));
        assert!(dbm.constrain(Constraint::weak(1, 0, 10)));
        assert!(dbm.constrain(Constraint::weak(2, 0, 10)));
        assert!(dbm.constrain(Constraint::weak(1, 2, 0))); // x - y <= 0
        let c = cells(&dbm);
        // Best at x = y = 10: 10 - 20 = -10.
        assert_eq!(infimum(&c, 3, 0, &[0, -2, 1]), Some(-10));
        let (_, val) = infimum_valuation(&c, 3, 0, &[0, -2, 1]).unwrap();
        assert_eq!(val, vec![0, 10, 10]);
    }

    #[test]
    fn mixed_rates_pick_the_right_corner() {
        // x in [1,4], y in [2,6], independent.
        let mut dbm = Dbm::init(3);
        assert!(dbm.constrain(Constraint::weak(0, 1, -1)));
        assert!(dbm.constrain(Constraint::weak(1, 0, 4)));
        assert!(dbm.constrain(Constraint::weak(0, 2, -2)));
        assert!(dbm.constrain(Constraint::weak(2, 0, 6)));
        let c = cells(&dbm);
        // Minimize 3x - 2y: x low, y high.
        assert_eq!(infimum(&c, 3, 5, &[0, 3, -2]), Some(5 + 3 - 12));
        let (_, val) = infimum_valuation(&c, 3, 5, &[0, 3, -2]).unwrap();
        assert_eq!(val, vec![0, 1, 6]);
    }

    #[test]
    fn infimum_is_a_lower_bound_for_members() {
        let mut dbm = Dbm::init(3);
        assert!(dbm.constrain(Constraint::weak(1, 0, 7)));
        assert!(dbm.constrain(Constraint::weak(0, 1, -1)));
        assert!(dbm.constrain(Constraint::weak(2, 0, 9)));
        assert!(dbm.constrain(Constraint::weak(2, 1, 4)));
        let c = cells(&dbm);
        let rates = [0, -3, 2];
        let inf = infimum(&c, 3, 1, &rates).unwrap();
        for x in 1..=7 {
            for y in 0..=9i32 {
                let pt = [0, x, y];
                if dbm.contains(&pt) {
                    let value = 1 + i64::from(rates[1]) * i64::from(x)
                        + i64::from(rates[2]) * i64::from(y);
                    assert!(value >= inf, "point {pt:?} beats the infimum");
                }
            }
        }
    }
}
