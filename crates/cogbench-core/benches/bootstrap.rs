use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use cogbench_core::statistics::bootstrap_ci;

fn bench_bootstrap(c: &mut Criterion) {
    let mut group = c.benchmark_group("bootstrap_ci");
    for n in [50usize, 500, 5000] {
        let values: Vec<f64> = (0..n).map(|i| if i % 3 == 0 { 1.0 } else { 0.0 }).collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &values, |b, values| {
            b.iter(|| bootstrap_ci(black_box(values), 1000, 42, 0.95))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_bootstrap);
criterion_main!(benches);
