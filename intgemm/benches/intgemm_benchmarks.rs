use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use intgemm::{AlignedVec, Int16, Int8};

fn matrix(len: usize, seed: usize) -> AlignedVec<f32> {
    (0..len)
        .map(|i| (((i * 7 + seed) % 1000) as f32 * 0.002 - 1.0))
        .collect()
}

fn bench_prepare_b(c: &mut Criterion) {
    let mut group = c.benchmark_group("prepare_b");
    for &n in &[256, 1024] {
        let b = matrix(n * n, 5);
        let mut out16 = AlignedVec::<i16>::zeroed(n * n);
        let mut out8 = AlignedVec::<i8>::zeroed(n * n);
        group.bench_with_input(BenchmarkId::new(Int16::name(), n), &n, |bench, &n| {
            bench.iter(|| Int16::prepare_b(&b, &mut out16, 1024.0, n, n));
        });
        group.bench_with_input(BenchmarkId::new(Int8::name(), n), &n, |bench, &n| {
            bench.iter(|| Int8::prepare_b(&b, &mut out8, 127.0, n, n));
        });
    }
    group.finish();
}

fn bench_multiply(c: &mut Criterion) {
    let mut group = c.benchmark_group("multiply");
    for &(m, k, n) in &[(1, 256, 256), (8, 512, 512), (64, 1024, 1024)] {
        let a = matrix(m * k, 3);
        let b = matrix(k * n, 11);
        let mut c_mat = AlignedVec::<f32>::zeroed(m * n);
        let label = format!("{m}x{k}x{n}");

        let mut a16 = AlignedVec::<i16>::zeroed(m * k);
        Int16::prepare_a(&a, &mut a16, 1024.0, m, k);
        let b16 = Int16::prepare_b_owned(&b, 1024.0, k, n);
        group.bench_with_input(BenchmarkId::new(Int16::name(), &label), &m, |bench, &m| {
            bench.iter(|| Int16::multiply_prepared(&a16, &b16, &mut c_mat, 1.0 / (1024.0 * 1024.0), m));
        });

        let mut a8 = AlignedVec::<i8>::zeroed(m * k);
        Int8::prepare_a(&a, &mut a8, 127.0, m, k);
        let b8 = Int8::prepare_b_owned(&b, 127.0, k, n);
        group.bench_with_input(BenchmarkId::new(Int8::name(), &label), &m, |bench, &m| {
            bench.iter(|| Int8::multiply_prepared(&a8, &b8, &mut c_mat, 1.0 / (127.0 * 127.0), m));
        });

        let mut a_u = AlignedVec::<u8>::zeroed(m * k);
        Int8::prepare_a_u(&a, &mut a_u, 127.0, m, k);
        let bias = b8.shift_bias(Int8::kernel(), 1.0 / (127.0 * 127.0), &vec![0.0; n]);
        group.bench_with_input(BenchmarkId::new("8-bit shifted", &label), &m, |bench, &m| {
            bench.iter(|| {
                Int8::multiply_shift_prepared(&a_u, &b8, &mut c_mat, 1.0 / (127.0 * 127.0), &bias, m)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_prepare_b, bench_multiply);
criterion_main!(benches);
