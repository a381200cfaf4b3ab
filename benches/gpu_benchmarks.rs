// benches/gpu_benchmarks.rs — GPU pipeline benchmarks.
//
//   cargo bench --bench gpu_benchmarks
//
// Requires a Vulkan device. Criterion measures wall time including host
// overhead (buffer writes, bind groups, submit, poll) — the right metric
// here, since the pipeline contract is synchronous: the caller blocks on
// the full run. Warmup is set explicitly because the first iterations pay
// shader JIT costs on some drivers.
//
// The one-shot sobel_filter() entry is benchmarked separately from a held
// SobelPipeline to show what pipeline reuse buys.

use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use sobelisk::batch::ImageBatch;
use sobelisk::gpu::device::GpuDevice;
use sobelisk::gpu::pipeline::{sobel_filter, SobelPipeline};
use sobelisk::pipeline::{sobel_filter_reference, SobelConfig};

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

fn bench_pipeline_gpu_vs_cpu(c: &mut Criterion) {
    let gpu = GpuDevice::new().expect("no Vulkan GPU");
    let mut pipeline = SobelPipeline::new(&gpu);

    let mut group = c.benchmark_group("pipeline");
    group.warm_up_time(Duration::from_secs(2));
    group.sample_size(20);

    for batch in [1usize, 8, 32] {
        let input = make_rgb_batch(640, 480, batch);

        group.bench_function(BenchmarkId::new("gpu_640x480", batch), |b| {
            b.iter(|| pipeline.run(&gpu, &input).unwrap())
        });

        group.bench_function(BenchmarkId::new("cpu_640x480", batch), |b| {
            b.iter(|| {
                sobel_filter_reference(
                    &input,
                    &SobelConfig::default(),
                    gpu.workgroup_size.tile_geometry(),
                )
                .unwrap()
            })
        });
    }
    group.finish();
}

fn bench_one_shot_entry(c: &mut Criterion) {
    let gpu = GpuDevice::new().expect("no Vulkan GPU");
    let input = make_rgb_batch(640, 480, 8);

    let mut group = c.benchmark_group("one_shot");
    group.warm_up_time(Duration::from_secs(2));
    group.sample_size(10);
    group.bench_function("sobel_filter_640x480x8", |b| {
        b.iter(|| sobel_filter(&gpu, &input).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_pipeline_gpu_vs_cpu, bench_one_shot_entry);
criterion_main!(benches);
