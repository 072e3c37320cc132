//! Minimal-graph analysis and packed-stream round-trips.

use zonekit_core::gen;
use zonekit_core::mingraph::{self, pack};
use zonekit_core::prelude::*;

#[test]
fn minimal_graph_scenario() {
    // D = { 0 <= x, 0 <= y, x - y = 3, x <= 10 }: x and y fall onto a
    // zero cycle, so the canonical form keeps the two-edge cycle through
    // the class plus the representative's external bounds.
    let mut dbm = Dbm::init(3);
    assert!(dbm.constrain(Constraint::weak(1, 2, 3)));
    assert!(dbm.constrain(Constraint::weak(2, 1, -3)));
    assert!(dbm.constrain(Constraint::weak(1, 0, 10)));

    let (bits, count) = dbm.mingraph();
    assert_eq!(count, 4);
    let edges: Vec<(usize, usize)> = bits.edges().collect();
    assert!(edges.contains(&(1, 2)));
    assert!(edges.contains(&(2, 1)));
    assert!(edges.contains(&(0, 1)));
    assert!(edges.contains(&(1, 0)));
}

#[test]
fn pack_unpack_round_trip() {
    let mut rng = gen::rng(31);
    for dim in 1..6 {
        for _ in 0..60 {
            let dbm = gen::generate(&mut rng, dim, 600);
            for minimize in [false, true] {
                for try16 in [false, true] {
                    let stream = pack::write(&dbm, minimize, try16);
                    assert_eq!(pack::dim_of(&stream), dim);
                    assert_eq!(pack::size_of(&stream), stream.len());

                    // unpack(pack(D)) == D
                    let back = pack::read(&stream);
                    assert_eq!(back, dbm);

                    // pack(unpack(s)) == s bit for bit
                    let again = pack::write(&back, minimize, try16);
                    assert_eq!(again, stream);

                    assert!(pack::is_equal_to(&dbm, &stream));
                    assert_eq!(pack::relation_with(&dbm, &stream), Relation::EQUAL);
                }
            }
        }
    }
}

#[test]
fn sixteen_bit_streams_are_smaller() {
    let mut rng = gen::rng(32);
    let mut seen16 = false;
    for _ in 0..40 {
        let dbm = gen::generate(&mut rng, 4, 100);
        let wide = pack::write(&dbm, true, false);
        let narrow = pack::write(&dbm, true, true);
        assert!(narrow.len() <= wide.len());
        seen16 |= narrow.len() < wide.len();
        assert_eq!(pack::read(&narrow), pack::read(&wide));
    }
    assert!(seen16, "no generated zone fit the 16-bit encoding");
}

#[test]
fn relation_with_stream_matches_unpacked() {
    let mut rng = gen::rng(33);
    for _ in 0..60 {
        let a = gen::generate(&mut rng, 3, 300);
        let b = gen::generate_arg(&mut rng, &a, 300);
        let stream = pack::write(&b, true, true);
        assert_eq!(pack::relation_with(&a, &stream), a.relation(&b));
    }
}

#[test]
fn convex_union_with_stream_matches() {
    let mut rng = gen::rng(34);
    for _ in 0..40 {
        let a = gen::generate(&mut rng, 3, 300);
        let b = gen::generate(&mut rng, 3, 300);
        let stream = pack::write(&b, true, false);

        let mut via_stream = a.clone();
        pack::convex_union_with(&mut via_stream, &stream);
        let mut direct = a.clone();
        direct.convex_union(&b);
        assert_eq!(via_stream, direct);
    }
}

#[test]
fn offsets_shift_the_stream() {
    let mut rng = gen::rng(35);
    for offset in [0usize, 1, 3] {
        let dbm = gen::generate(&mut rng, 3, 200);
        let stream = pack::write_with_offset(&dbm, true, true, offset);
        assert!(stream[..offset].iter().all(|&w| w == 0));
        assert_eq!(pack::read(&stream[offset..]), dbm);
    }
}

#[test]
fn stored_bit_matrix_matches_analysis() {
    let mut rng = gen::rng(36);
    for _ in 0..40 {
        let dbm = gen::generate(&mut rng, 4, 300);
        let direct = dbm.mingraph();
        for (minimize, try16) in [(true, false), (true, true), (false, false)] {
            let stream = pack::write(&dbm, minimize, try16);
            assert_eq!(pack::bit_matrix_of(&stream), direct);
        }
    }
}

#[test]
fn mingraph_regenerates_the_closure() {
    let mut rng = gen::rng(37);
    for dim in 2..6 {
        for _ in 0..40 {
            let dbm = gen::generate(&mut rng, dim, 400);
            let (bits, count) = dbm.mingraph();
            assert_eq!(bits.count(), count);

            let mut sparse = vec![Bound::INFINITY; dim * dim];
            for i in 0..dim {
                sparse[i * dim + i] = Bound::LE_ZERO;
                sparse[i] = Bound::LE_ZERO;
            }
            for (i, j) in bits.edges() {
                sparse[i * dim + j] = dbm.get(i, j).unwrap();
            }
            let rebuilt = Dbm::from_matrix(dim, &sparse);
            assert_eq!(rebuilt, dbm);
        }
    }
}

#[test]
fn process_cache_is_transparent() {
    mingraph::clear_cache();
    let mut rng = gen::rng(38);
    for _ in 0..20 {
        let dbm = gen::generate(&mut rng, 3, 200);
        let first = dbm.mingraph();
        let other = dbm.clone();
        let second = other.mingraph();
        assert_eq!(first, second);
    }
    mingraph::clear_cache();
}
