// Benchmark suite for Inferir numeric kernels
// Uses Criterion.rs for statistical benchmarking

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use inferir::ops;
use inferir::{QuantizedTensor, Tensor};

fn square(n: usize, seed: f32) -> Tensor {
    let data: Vec<f32> = (0..n * n).map(|i| ((i % 17) as f32) * seed - 1.0).collect();
    Tensor::from_vec(vec![n, n], data).unwrap()
}

fn benchmark_matmul(c: &mut Criterion) {
    let mut group = c.benchmark_group("matmul");

    for size in [32usize, 64, 128, 256] {
        let a = square(size, 0.13);
        let b = square(size, 0.07);

        group.bench_with_input(BenchmarkId::new("naive", size), &size, |bench, _| {
            let mut out = Tensor::default();
            bench.iter(|| {
                ops::matmul(black_box(&a), black_box(&b), &mut out).unwrap();
            });
        });

        group.bench_with_input(BenchmarkId::new("simd", size), &size, |bench, _| {
            let mut out = Tensor::default();
            bench.iter(|| {
                ops::matmul_simd(black_box(&a), black_box(&b), &mut out).unwrap();
            });
        });
    }

    group.finish();
}

fn benchmark_im2col(c: &mut Criterion) {
    let mut group = c.benchmark_group("im2col");

    for size in [28usize, 56, 112] {
        let data: Vec<f32> = (0..3 * size * size).map(|i| (i % 11) as f32).collect();
        let input = Tensor::from_vec(vec![3, size, size], data).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |bench, _| {
            let mut col = Tensor::default();
            bench.iter(|| {
                ops::im2col(black_box(&input), &mut col, 3, 3, 1, 1, 1, 1).unwrap();
            });
        });
    }

    group.finish();
}

fn benchmark_int8_gemm(c: &mut Criterion) {
    let mut group = c.benchmark_group("gemm_int8");

    for size in [32usize, 64, 128] {
        let a = QuantizedTensor::quantize(&square(size, 0.13)).unwrap();
        let b = QuantizedTensor::quantize(&square(size, 0.07)).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |bench, _| {
            let mut out = Tensor::default();
            bench.iter(|| {
                inferir::quantize::gemm_int8(black_box(&a), black_box(&b), &mut out).unwrap();
            });
        });
    }

    group.finish();
}

fn benchmark_softmax(c: &mut Criterion) {
    let logits: Vec<f32> = (0..1000).map(|i| (i % 37) as f32 * 0.3).collect();
    let input = Tensor::from_vec(vec![1000], logits).unwrap();

    c.bench_function("softmax_1k", |bench| {
        let mut out = Tensor::default();
        bench.iter(|| {
            ops::softmax(black_box(&input), &mut out).unwrap();
        });
    });
}

criterion_group!(
    benches,
    benchmark_matmul,
    benchmark_im2col,
    benchmark_int8_gemm,
    benchmark_softmax
);
criterion_main!(benches);
