//! Priced-zone scenarios and the infimum lower-bound property.

use rand::Rng;
use zonekit_core::gen;
use zonekit_core::prelude::*;

#[test]
fn no_rates_means_offset_cost() {
    let mut rng = gen::rng(41);
    for _ in 0..40 {
        let zone = gen::generate(&mut rng, 3, 300);
        let cost = rng_cost(&mut rng);
        let priced = PricedDbm::from_dbm(zone, cost);
        assert_eq!(priced.infimum(), Some(i64::from(cost)));
    }
}

fn rng_cost(rng: &mut impl rand::Rng) -> i32 {
    rng.gen_range(-50..50)
}

#[test]
fn simple_rate_scenario() {
    // n = 2, D = { 2 <= x <= 5 }.
    let mut zone = Dbm::init(2);
    assert!(zone.constrain(Constraint::weak(0, 1, -2)));
    assert!(zone.constrain(Constraint::weak(1, 0, 5)));

    // r = (0, 1), c = 0: infimum at x = 2.
    let mut p = PricedDbm::from_dbm(zone.clone(), 0);
    p.set_rate(1, 1);
    assert_eq!(p.infimum(), Some(0));
    let (inf, val) = p.infimum_valuation().unwrap();
    assert_eq!(inf, 0);
    assert_eq!(val, vec![0, 2]);
    assert_eq!(p.cost_of_valuation(&[0, 2]), 0);

    // r = (0, -1): infimum at x = 5, three units below the offset cost.
    let mut p = PricedDbm::from_dbm(zone, 0);
    p.set_rate(1, -1);
    assert_eq!(p.infimum(), Some(-3));
    let (inf, val) = p.infimum_valuation().unwrap();
    assert_eq!(inf, -3);
    assert_eq!(val, vec![0, 5]);

    // Unbounded zone with a negative rate: no infimum.
    let mut open = Dbm::init(2);
    assert!(open.constrain(Constraint::weak(0, 1, -2)));
    let mut p = PricedDbm::from_dbm(open, 0);
    p.set_rate(1, -1);
    assert_eq!(p.infimum(), None);
    assert_eq!(p.infimum_valuation(), Err(Error::UnboundedInfimum));
}

#[test]
fn infimum_bounds_every_member_point() {
    let mut rng = gen::rng(42);
    let mut checked = 0;
    for round in 0..120 {
        let zone = gen::generate(&mut rng, 3, 120);
        let mut priced = PricedDbm::from_dbm(zone.clone(), rng_cost(&mut rng));
        let bounded = !zone.is_unbounded();
        for i in 1..3 {
            let rate = if bounded {
                rng.gen_range(-20..20)
            } else {
                rng.gen_range(0..20)
            };
            priced.set_rate(i, rate);
        }
        let Some(inf) = priced.infimum() else {
            continue;
        };
        assert!(priced.is_valid(), "round {round}");
        for _ in 0..20 {
            if let Some(pt) = gen::generate_point(&mut rng, &zone) {
                let cost = i64::from(priced.cost_of_valuation(&pt));
                assert!(
                    cost >= inf,
                    "round {round}: point {pt:?} costs {cost} below infimum {inf}"
                );
                checked += 1;
            }
        }
        // The infimum valuation itself achieves the infimum.
        let (inf2, val) = priced.infimum_valuation().unwrap();
        assert_eq!(inf2, inf);
        assert!(priced.contains_weakly(&val), "round {round}: {val:?}");
    }
    assert!(checked > 100, "too few points generated: {checked}");
}

#[test]
fn constrained_infimum_valuation() {
    let mut zone = Dbm::init(3);
    assert!(zone.constrain(Constraint::weak(1, 0, 10)));
    assert!(zone.constrain(Constraint::weak(2, 0, 10)));
    let mut p = PricedDbm::from_dbm(zone, 0);
    p.set_rate(1, -1);
    p.set_rate(2, 2);

    // Pin y to 4 and minimize over x alone.
    let (inf, val) = p
        .infimum_valuation_with(&[0, 0, 4], &[true, true, false])
        .unwrap();
    assert_eq!(val[2], 4);
    assert_eq!(val[1], 10);
    assert_eq!(inf, -10 + 2 * 4);

    // Pinning outside the zone fails.
    assert_eq!(
        p.infimum_valuation_with(&[0, 0, 11], &[true, true, false]),
        Err(Error::EmptyZone)
    );
}

#[test]
fn upper_bounds_reached_by_simplex() {
    // Coupled clocks: minimize -x - y with x <= 6, y - x <= 2.
    let mut zone = Dbm::init(3);
    assert!(zone.constrain(Constraint::weak(1, 0, 6)));
    assert!(zone.constrain(Constraint::weak(2, 1, 2)));
    let mut p = PricedDbm::from_dbm(zone, 0);
    p.set_rate(1, -1);
    p.set_rate(2, -1);
    let (inf, val) = p.infimum_valuation().unwrap();
    assert_eq!(val, vec![0, 6, 8]);
    assert_eq!(inf, -14);
}
