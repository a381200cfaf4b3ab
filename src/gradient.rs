// gradient.rs — CPU reference for the batched, tiled gradient-magnitude
// stage.
//
// This is the authoritative definition of the convolution engine's
// semantics; the WGSL kernel in gpu/gradient.rs is validated against it
// byte-for-byte. The group/tile structure of the parallel kernel is
// reproduced exactly:
//
//   - the index space (width, height, batch) is cut into groups per
//     TileGeometry;
//   - each group's tile holds one sample per in-range worker;
//   - neighbor offsets are clamped to the tile's POPULATED extent, not
//     the image's global edge. Interior group seams therefore read the
//     tile's own edge column/row instead of the true neighbor pixel.
//     This matches true image clamping only where a group edge falls on
//     an image edge. It is a preserved property of the output, not
//     something to correct here.
//
// The sequential loop makes the tile-load barrier implicit: the populated
// region of a tile is fully determined before any read, which is exactly
// what the group-wide barrier guarantees on the GPU.
//
// Accumulation is i32 — 9 terms of (255 × coefficient in [-2, 2]) cannot
// overflow it.

use crate::batch::{ImageBatch, LUMA_CHANNELS};
use crate::error::PipelineError;
use crate::kernels::{DirectionalKernels, SOBEL_WIDTH};
use crate::tile::TileGeometry;

/// Offset of the kernel-store center; coefficient lookups are relative
/// to it so a narrower `kernel_width` addresses the store's inner cells.
const STORE_RADIUS: isize = (SOBEL_WIDTH as isize - 1) / 2;

/// Validate the requested kernel width against the store and the tile.
///
/// Returns the kernel radius. Called by both the reference and the GPU
/// engine BEFORE any device resource is touched.
pub(crate) fn validate_kernel_width(
    kernel_width: usize,
    tile_width: usize,
    tile_height: usize,
) -> Result<usize, PipelineError> {
    if kernel_width == 0 || kernel_width % 2 == 0 {
        return Err(PipelineError::Configuration {
            detail: format!("kernel width must be odd (got {kernel_width})"),
        });
    }
    if kernel_width > SOBEL_WIDTH {
        return Err(PipelineError::Configuration {
            detail: format!(
                "kernel width {kernel_width} exceeds the {SOBEL_WIDTH}×{SOBEL_WIDTH} kernel store"
            ),
        });
    }
    if kernel_width > tile_width.min(tile_height) {
        return Err(PipelineError::Configuration {
            detail: format!(
                "kernel width {kernel_width} exceeds the {tile_width}×{tile_height} tile margin"
            ),
        });
    }
    Ok((kernel_width - 1) / 2)
}

/// Combined directional gradient magnitude of a single-channel batch.
///
/// For every coordinate (x, y, b):
///
///   out[b,y,x] = clamp(|Σ kx·N| + |Σ ky·N|, 0, 255)
///
/// where N is the `kernel_width × kernel_width` neighborhood read through
/// tile-local clamping as described in the module header.
///
/// # Errors
/// `Configuration` if the input is not single-channel or `kernel_width`
/// is even, wider than the kernel store, or wider than the tile.
pub fn gradient_magnitude(
    input: &ImageBatch,
    kernels: &DirectionalKernels,
    kernel_width: usize,
    tile: TileGeometry,
) -> Result<ImageBatch, PipelineError> {
    if input.channels() != LUMA_CHANNELS {
        return Err(PipelineError::Configuration {
            detail: format!(
                "gradient input must be single-channel (got {} channels)",
                input.channels()
            ),
        });
    }
    let radius = validate_kernel_width(kernel_width, tile.width, tile.height)? as isize;

    let (width, height, batch) = (input.width(), input.height(), input.batch());
    let mut output = ImageBatch::new(width, height, batch, LUMA_CHANNELS);

    for group in tile.groups(width, height) {
        for b in 0..batch {
            for ly in 0..group.populated_h {
                for lx in 0..group.populated_w {
                    let mut sum_x: i32 = 0;
                    let mut sum_y: i32 = 0;
                    for i in -radius..=radius {
                        for j in -radius..=radius {
                            let (cx, cy) = group.clamp_local(lx as isize + j, ly as isize + i);
                            let p = input.luma(b, group.origin_y + cy, group.origin_x + cx) as i32;
                            let row = (STORE_RADIUS + i) as usize;
                            let col = (STORE_RADIUS + j) as usize;
                            sum_x += p * kernels.x[row][col];
                            sum_y += p * kernels.y[row][col];
                        }
                    }
                    let mag = (sum_x.abs() + sum_y.abs()).clamp(0, 255) as u8;
                    output.set_luma(b, group.origin_y + ly, group.origin_x + lx, mag);
                }
            }
        }
    }
    Ok(output)
}
