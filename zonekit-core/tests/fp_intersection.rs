//! Frozen contract for floating-point membership.
//!
//! Real-valued membership uses an epsilon-tolerant comparison. As a
//! consequence two zones with a provably empty intersection can both
//! contain the same floating-point valuation when a difference of clocks
//! rounds onto the shared bound. This is intentional, documented
//! behaviour; the assertions below pin it down. Do not "fix" the
//! tolerance without revisiting every consumer of `contains_real`.

use zonekit_core::prelude::*;

fn zone(dim: usize, bounds: &[Bound]) -> Dbm {
    Dbm::from_matrix(dim, bounds)
}

#[test]
fn disjoint_zones_share_a_rounded_point() {
    // { 8 < x < 86, 182 < y <= 445, x + 174 < y < x + 437 }
    let dbm1 = zone(
        3,
        &[
            Bound::weak(0),
            Bound::strict(-8),
            Bound::strict(-182),
            Bound::strict(86),
            Bound::weak(0),
            Bound::strict(-174),
            Bound::weak(445),
            Bound::strict(400),
            Bound::weak(0),
        ],
    );
    // { 8 < x <= 10, 182 < y < 184, x - y == -174 }
    let dbm2 = zone(
        3,
        &[
            Bound::weak(0),
            Bound::strict(-8),
            Bound::strict(-182),
            Bound::weak(10),
            Bound::weak(0),
            Bound::weak(-174),
            Bound::weak(184),
            Bound::weak(174),
            Bound::weak(0),
        ],
    );

    let x = 8.984_497_415_081_040_8_f64;
    let y = 182.984_497_415_081_05_f64;
    let pt = [0.0, x, y];

    // The difference rounds to a representable value equal to the shared
    // bound, putting the point weakly on dbm2's equality and, with the
    // tolerance, inside dbm1's strict constraint as well.
    assert_eq!(x - y, -174.0);
    assert!(x < y - 174.0);

    assert!(dbm1.contains_real(&pt));
    assert!(dbm2.contains_real(&pt));

    // The exact integer-bound test knows better: no intersection.
    assert!(!dbm1.intersects(&dbm2));
    let mut exact = dbm1.clone();
    assert!(!exact.intersect(&dbm2));
    assert!(exact.is_empty());
}

#[test]
fn tolerance_is_one_sided() {
    let mut dbm = Dbm::init(2);
    assert!(dbm.constrain(Constraint::strict(1, 0, 5)));
    // Within epsilon above the bound still passes, far above fails.
    assert!(dbm.contains_real(&[0.0, 5.0]));
    assert!(!dbm.contains_real(&[0.0, 5.1]));
}
