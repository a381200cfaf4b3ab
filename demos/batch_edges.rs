// demos/batch_edges.rs — run the batch edge pipeline on synthetic frames.
//
//   cargo run --example batch_edges
//
// Builds a small batch of synthetic color frames (gradient background plus
// bright rectangles), runs the GPU pipeline when a Vulkan device is
// available (CPU reference otherwise), and prints an ASCII rendering of
// the first frame's edge map.

use sobelisk::batch::ImageBatch;
use sobelisk::gpu::device::GpuDevice;
use sobelisk::gpu::pipeline::SobelPipeline;
use sobelisk::pipeline::{sobel_filter_reference, SobelConfig};
use sobelisk::tile::TileGeometry;

const WIDTH: usize = 96;
const HEIGHT: usize = 48;
const BATCH: usize = 4;

fn make_scene(b: usize) -> impl Fn(usize, usize) -> [u8; 3] {
    move |x, y| {
        let base = ((x * 160 / WIDTH) + (y * 60 / HEIGHT) + b * 8) as u8;
        // One bright rectangle per frame, shifted by batch index.
        let rx = 14 + b * 16;
        let ry = 10 + b * 4;
        if (rx..rx + 24).contains(&x) && (ry..ry + 16).contains(&y) {
            [230, 230, 90]
        } else {
            [base, base / 2, 255 - base]
        }
    }
}

fn main() {
    let mut input = ImageBatch::new(WIDTH, HEIGHT, BATCH, 3);
    for b in 0..BATCH {
        let scene = make_scene(b);
        for y in 0..HEIGHT {
            for x in 0..WIDTH {
                input.set_rgb(b, y, x, scene(x, y));
            }
        }
    }

    let edges = match GpuDevice::new() {
        Ok(gpu) => {
            eprintln!("[batch_edges] running on {gpu}");
            let mut pipeline = SobelPipeline::new(&gpu);
            pipeline.run(&gpu, &input).expect("GPU pipeline failed")
        }
        Err(e) => {
            eprintln!("[batch_edges] no GPU ({e}); using the CPU reference");
            sobel_filter_reference(&input, &SobelConfig::default(), TileGeometry::new(16, 8, 2))
                .expect("reference pipeline failed")
        }
    };

    // ASCII edge map of frame 0: stronger magnitude, denser glyph.
    const RAMP: &[u8] = b" .:-=+*#%@";
    println!("frame 0 edge map ({WIDTH}x{HEIGHT}):");
    for y in 0..HEIGHT {
        let mut line = String::with_capacity(WIDTH);
        for x in 0..WIDTH {
            let v = edges.luma(0, y, x) as usize;
            line.push(RAMP[v * (RAMP.len() - 1) / 255] as char);
        }
        println!("{line}");
    }

    for b in 0..BATCH {
        let mean: f64 = edges.image(b).iter().map(|&v| v as f64).sum::<f64>()
            / edges.plane() as f64;
        println!("frame {b}: mean edge strength {mean:.2}");
    }
}
