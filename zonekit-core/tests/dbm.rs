//! End-to-end properties of single-zone operations, mostly quantified
//! over randomly generated closed DBMs.

use zonekit_core::gen;
use zonekit_core::prelude::*;

const DIMS: std::ops::Range<usize> = 2..6;
const ROUNDS: usize = 40;

#[test]
fn zero_and_init_scenario() {
    let zero = Dbm::zero(3);
    assert!(zero.has_zero());
    assert!(zero.contains(&[0, 0, 0]));
    assert!(!zero.contains(&[0, 1, 0]));

    let init = Dbm::init(3);
    assert!(init.is_unbounded());
    assert!(init.contains(&[0, 0, 0]));
    assert!(init.contains(&[0, 1000, 1000]));

    assert!(zero.subset_eq(&init));
    assert_ne!(zero, init);
}

#[test]
fn relax_up_scenario() {
    let mut rng = gen::rng(0x5eed);
    for dim in DIMS {
        for _ in 0..ROUNDS {
            let dbm = gen::generate(&mut rng, dim, 500);
            let mut relaxed = dbm.clone();
            relaxed.relax_up();
            assert!(dbm.subset_eq(&relaxed));
            let mut twice = relaxed.clone();
            twice.relax_up();
            assert_eq!(twice, relaxed);
        }
    }
}

#[test]
fn close_is_idempotent() {
    let mut rng = gen::rng(1);
    for dim in DIMS {
        for _ in 0..ROUNDS {
            let dbm = gen::generate(&mut rng, dim, 1000);
            let cells: Vec<_> = (0..dim * dim)
                .map(|k| dbm.get(k / dim, k % dim).unwrap())
                .collect();
            let again = Dbm::from_matrix(dim, &cells);
            assert_eq!(again, dbm);
        }
    }
}

#[test]
fn up_and_down_are_idempotent_wideners() {
    let mut rng = gen::rng(2);
    for dim in DIMS {
        for _ in 0..ROUNDS {
            let dbm = gen::generate(&mut rng, dim, 500);

            let mut up = dbm.clone();
            up.up();
            assert!(dbm.subset_eq(&up));
            assert!(up.is_unbounded());
            let mut up2 = up.clone();
            up2.up();
            assert_eq!(up2, up);

            let mut down = dbm.clone();
            down.down();
            assert!(dbm.subset_eq(&down));
            let mut down2 = down.clone();
            down2.down();
            assert_eq!(down2, down);
        }
    }
}

#[test]
fn operations_only_widen() {
    let mut rng = gen::rng(3);
    for dim in 2..5 {
        for _ in 0..ROUNDS {
            let dbm = gen::generate(&mut rng, dim, 300);
            let clock = 1 + (dim - 1) / 2;

            let ops: Vec<(&str, Box<dyn Fn(&mut Dbm)>)> = vec![
                ("up", Box::new(|d: &mut Dbm| d.up())),
                ("down", Box::new(|d: &mut Dbm| d.down())),
                ("free_clock", Box::new(move |d: &mut Dbm| d.free_clock(clock))),
                ("free_up", Box::new(move |d: &mut Dbm| d.free_up(clock))),
                ("free_down", Box::new(move |d: &mut Dbm| d.free_down(clock))),
                ("relax_up", Box::new(|d: &mut Dbm| d.relax_up())),
                ("relax_down", Box::new(|d: &mut Dbm| d.relax_down())),
                ("relax_all", Box::new(|d: &mut Dbm| d.relax_all())),
            ];
            for (name, op) in ops {
                let mut out = dbm.clone();
                op(&mut out);
                assert!(
                    dbm.subset_eq(&out),
                    "{name} shrank the zone at dim {dim}"
                );
                // Re-closing a closed matrix is the identity.
                let cells: Vec<Bound> = (0..dim * dim)
                    .map(|k| out.get(k / dim, k % dim).unwrap())
                    .collect();
                assert_eq!(Dbm::from_matrix(dim, &cells), out, "{name} broke closure");
            }
        }
    }
}

#[test]
fn intersection_is_commutative_and_associative() {
    let mut rng = gen::rng(4);
    for dim in DIMS {
        for _ in 0..ROUNDS {
            let a = gen::generate(&mut rng, dim, 400);
            let b = gen::generate_arg(&mut rng, &a, 400);
            let c = gen::generate_arg(&mut rng, &b, 400);

            let mut ab = a.clone();
            let ab_ok = ab.intersect(&b);
            let mut ba = b.clone();
            let ba_ok = ba.intersect(&a);
            assert_eq!(ab_ok, ba_ok);
            if ab_ok {
                assert_eq!(ab, ba);
            }

            let mut ab_c = a.clone();
            let left = ab_c.intersect(&b) && ab_c.intersect(&c);
            let mut bc = b.clone();
            let mut a_bc = a.clone();
            let right = bc.intersect(&c) && a_bc.intersect(&bc);
            assert_eq!(left, right);
            if left {
                assert_eq!(ab_c, a_bc);
            }
        }
    }
}

#[test]
fn convex_union_is_commutative_and_associative() {
    let mut rng = gen::rng(5);
    for dim in DIMS {
        for _ in 0..ROUNDS {
            let a = gen::generate(&mut rng, dim, 400);
            let b = gen::generate(&mut rng, dim, 400);
            let c = gen::generate(&mut rng, dim, 400);

            let mut ab = a.clone();
            ab.convex_union(&b);
            let mut ba = b.clone();
            ba.convex_union(&a);
            assert_eq!(ab, ba);

            let mut abc1 = ab;
            abc1.convex_union(&c);
            let mut bc = b.clone();
            bc.convex_union(&c);
            let mut abc2 = a.clone();
            abc2.convex_union(&bc);
            assert_eq!(abc1, abc2);

            assert!(a.subset_eq(&abc1));
            assert!(c.subset_eq(&abc1));
        }
    }
}

#[test]
fn extrapolations_form_a_lattice() {
    let mut rng = gen::rng(6);
    for dim in DIMS {
        for _ in 0..ROUNDS {
            let dbm = gen::generate(&mut rng, dim, 400);
            let max: Vec<i32> = std::iter::once(0)
                .chain((1..dim).map(|_| 50))
                .collect();

            let mut m = dbm.clone();
            m.extrapolate_max_bounds(&max);
            let mut dm = dbm.clone();
            dm.diagonal_extrapolate_max_bounds(&max);
            let mut dlu = dbm.clone();
            dlu.diagonal_extrapolate_lu_bounds(&max, &max);

            assert!(dbm.subset_eq(&m), "extrapolation must widen");
            assert!(m.subset_eq(&dm));
            assert!(dm.subset_eq(&dlu));

            // Re-applying never shrinks the widened zone.
            let mut m2 = m.clone();
            m2.extrapolate_max_bounds(&max);
            assert!(m.subset_eq(&m2));
        }
    }
}

#[test]
fn updates_produce_member_points() {
    let mut rng = gen::rng(7);
    for _ in 0..ROUNDS {
        let mut dbm = gen::generate(&mut rng, 4, 200);
        dbm.update_value(1, 3);
        dbm.update_clock(2, 1);
        dbm.update(3, 1, 4);
        assert_eq!(dbm.get(1, 0), Some(Bound::weak(3)));
        assert_eq!(dbm.get(2, 0), Some(Bound::weak(3)));
        assert_eq!(dbm.get(3, 0), Some(Bound::weak(7)));
        assert!(dbm.contains(&[0, 3, 3, 7]));
    }
}

#[test]
fn generated_points_respect_relations() {
    let mut rng = gen::rng(8);
    for _ in 0..200 {
        let a = gen::generate(&mut rng, 3, 300);
        let b = gen::generate_arg(&mut rng, &a, 300);
        if let Some(pt) = gen::generate_real_point(&mut rng, &a) {
            if a.subset_eq(&b) {
                assert!(b.contains_real(&pt));
            }
            if !b.contains_real(&pt) {
                assert!(!a.subset_eq(&b));
            }
        }
    }
}
