use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use zonekit_core::gen;
use zonekit_core::mingraph::pack;
use zonekit_core::prelude::*;

fn bench_close(c: &mut Criterion) {
    let mut group = c.benchmark_group("close");
    for dim in [4usize, 8, 16] {
        let mut rng = gen::rng(0xbe7c);
        let zones: Vec<Dbm> = (0..32).map(|_| gen::generate(&mut rng, dim, 1000)).collect();
        group.bench_with_input(BenchmarkId::from_parameter(dim), &zones, |b, zones| {
            b.iter(|| {
                for z in zones {
                    let cells: Vec<Bound> = (0..dim * dim)
                        .map(|k| z.get(k / dim, k % dim).unwrap())
                        .collect();
                    black_box(Dbm::from_matrix(dim, &cells));
                }
            });
        });
    }
    group.finish();
}

fn bench_subtract(c: &mut Criterion) {
    let mut group = c.benchmark_group("subtract");
    for dim in [3usize, 6] {
        let mut rng = gen::rng(0x5b);
        let pairs: Vec<(Federation, Dbm)> = (0..16)
            .map(|_| {
                let fed = gen::generate_federation(&mut rng, dim, 4, 500);
                let hole = gen::generate(&mut rng, dim, 500);
                (fed, hole)
            })
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(dim), &pairs, |b, pairs| {
            b.iter(|| {
                for (fed, hole) in pairs {
                    let mut diff = fed.clone();
                    diff.subtract_dbm(hole);
                    black_box(diff.size());
                }
            });
        });
    }
    group.finish();
}

fn bench_pack(c: &mut Criterion) {
    let mut rng = gen::rng(0xacc);
    let zones: Vec<Dbm> = (0..32).map(|_| gen::generate(&mut rng, 8, 800)).collect();
    c.bench_function("pack_minimized", |b| {
        b.iter(|| {
            for z in &zones {
                black_box(pack::write(z, true, true));
            }
        });
    });
}

criterion_group!(benches, bench_close, bench_subtract, bench_pack);
criterion_main!(benches);
