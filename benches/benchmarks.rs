// benches/benchmarks.rs — CPU reference benchmarks.
//
//   cargo bench --bench benchmarks
//
// The reference stages are sequential; these numbers are the baseline the
// GPU benchmarks in gpu_benchmarks.rs are compared against.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use sobelisk::batch::ImageBatch;
use sobelisk::blur::gaussian_blur;
use sobelisk::gradient::gradient_magnitude;
use sobelisk::grayscale::to_grayscale;
use sobelisk::kernels::DirectionalKernels;
use sobelisk::pipeline::{sobel_filter_reference, SobelConfig};
use sobelisk::tile::TileGeometry;

// ============================================================
// Shared helpers
// ============================================================

fn make_rgb_batch(w: usize, h: usize, batch: usize) -> ImageBatch {
    let mut rng = 0xDECAFu32;
    let mut out = ImageBatch::new(w, h, batch, 3);
    for b in 0..batch {
        for y in 0..h {
            for x in 0..w {
                let mut next = || {
                    rng = rng.wrapping_mul(1664525).wrapping_add(1013904223);
                    (rng >> 24) as u8
                };
                out.set_rgb(b, y, x, [next(), next(), next()]);
            }
        }
    }
    out
}

fn make_luma_batch(w: usize, h: usize, batch: usize) -> ImageBatch {
    let mut rng = 0xFACEu32;
    let mut out = ImageBatch::new(w, h, batch, 1);
    for b in 0..batch {
        for y in 0..h {
            for x in 0..w {
                rng = rng.wrapping_mul(1664525).wrapping_add(1013904223);
                out.set_luma(b, y, x, (rng >> 24) as u8);
            }
        }
    }
    out
}

fn tile() -> TileGeometry {
    TileGeometry::new(16, 8, 2)
}

// ============================================================
// Individual stages
// ============================================================

fn bench_gradient(c: &mut Criterion) {
    let mut group = c.benchmark_group("gradient");
    let kernels = DirectionalKernels::sobel();
    for batch in [1usize, 4, 16] {
        let input = make_luma_batch(640, 480, batch);
        group.bench_function(BenchmarkId::new("cpu_640x480", batch), |b| {
            b.iter(|| gradient_magnitude(&input, &kernels, 3, tile()).unwrap())
        });
    }
    group.finish();
}

fn bench_blur(c: &mut Criterion) {
    let input = make_rgb_batch(640, 480, 4);
    c.bench_function("blur/cpu_640x480x4", |b| {
        b.iter(|| gaussian_blur(&input, 1.0, 3, tile()).unwrap())
    });
}

fn bench_grayscale(c: &mut Criterion) {
    let input = make_rgb_batch(640, 480, 4);
    c.bench_function("grayscale/cpu_640x480x4", |b| {
        b.iter(|| to_grayscale(&input).unwrap())
    });
}

// ============================================================
// Full pipeline
// ============================================================

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(20);
    for batch in [1usize, 8] {
        let input = make_rgb_batch(640, 480, batch);
        group.bench_function(BenchmarkId::new("cpu_640x480", batch), |b| {
            b.iter(|| sobel_filter_reference(&input, &SobelConfig::default(), tile()).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_gradient, bench_blur, bench_grayscale, bench_pipeline);
criterion_main!(benches);
