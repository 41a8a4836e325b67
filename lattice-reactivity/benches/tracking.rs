//! Benchmarks for effect re-runs.
//!
//! Re-running an effect whose read set does not change is the hot path the
//! re-subscription markers exist for: no bucket should be touched beyond
//! setting and clearing its bits.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use lattice_reactivity::observe::{reactive, Raw};
use lattice_reactivity::reactive::{computed, effect};

fn rerun_stable_read_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("rerun_stable_read_set");

    for width in [1usize, 16, 256] {
        let state = reactive(Raw::sequence_from(0..width as i64));
        let reader = state.clone();
        let runner = effect(move || {
            let mut sum = 0.0;
            for index in 0..width {
                sum += reader.get(index).unwrap().as_f64().unwrap_or_default();
            }
            sum
        });

        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| black_box(runner.run()));
        });
    }

    group.finish();
}

fn write_and_propagate(c: &mut Criterion) {
    let state = reactive(Raw::record_from([("n", 0)]));
    let reader = state.clone();
    let doubled = computed(move || reader.get("n").unwrap().as_f64().unwrap_or_default() * 2.0);
    let observer = doubled.clone();
    let _runner = effect(move || black_box(observer.get()));

    let mut n = 0i64;
    c.bench_function("write_and_propagate", |b| {
        b.iter(|| {
            n += 1;
            state.set("n", n).unwrap();
        });
    });
}

criterion_group!(benches, rerun_stable_read_set, write_and_propagate);
criterion_main!(benches);
