// blur.rs — CPU reference for the batched Gaussian noise-reduction stage.
//
// Same tiled/batched execution model as gradient.rs, on 3-channel pixels:
// each group stages its own pixels, neighbor offsets clamp to the tile's
// populated extent, and the weight of offset (i, j) is the separable
// product g(|i|)·g(|j|) of the 1-D coefficient table from kernels.rs.
//
// The coefficients are unnormalized; the accumulated color is divided by
// the sum of the weights that were actually applied. With tile-local
// clamping the effective support varies near group edges, so normalizing
// by the applied-weight sum (rather than a precomputed total) is what
// keeps flat regions flat.

use crate::batch::{ImageBatch, RGB_CHANNELS};
use crate::error::PipelineError;
use crate::kernels::{gaussian_kernel_1d, MAX_BLUR_RADIUS};
use crate::tile::TileGeometry;

/// Validate blur parameters shared by the reference and the GPU stage.
pub(crate) fn validate_blur_params(delta: f32, radius: usize) -> Result<(), PipelineError> {
    if !(delta > 0.0) {
        return Err(PipelineError::Configuration {
            detail: format!("blur delta must be positive (got {delta})"),
        });
    }
    if radius > MAX_BLUR_RADIUS {
        return Err(PipelineError::Configuration {
            detail: format!("blur radius {radius} exceeds the maximum of {MAX_BLUR_RADIUS}"),
        });
    }
    Ok(())
}

/// Gaussian-blur a 3-channel batch.
///
/// # Errors
/// `Configuration` if the input is not 3-channel, `delta` is not
/// positive, or `radius` exceeds [`MAX_BLUR_RADIUS`].
pub fn gaussian_blur(
    input: &ImageBatch,
    delta: f32,
    radius: usize,
    tile: TileGeometry,
) -> Result<ImageBatch, PipelineError> {
    if input.channels() != RGB_CHANNELS {
        return Err(PipelineError::Configuration {
            detail: format!("blur input must be 3-channel (got {} channels)", input.channels()),
        });
    }
    validate_blur_params(delta, radius)?;
    let coeffs = gaussian_kernel_1d(radius, delta);
    let r = radius as isize;

    let (width, height, batch) = (input.width(), input.height(), input.batch());
    let mut output = ImageBatch::new(width, height, batch, RGB_CHANNELS);

    for group in tile.groups(width, height) {
        for b in 0..batch {
            for ly in 0..group.populated_h {
                for lx in 0..group.populated_w {
                    let mut acc = [0.0f32; 3];
                    let mut norm = 0.0f32;
                    for i in -r..=r {
                        for j in -r..=r {
                            let (cx, cy) = group.clamp_local(lx as isize + j, ly as isize + i);
                            let px = input.rgb(b, group.origin_y + cy, group.origin_x + cx);
                            let w = coeffs[(r + i) as usize] * coeffs[(r + j) as usize];
                            acc[0] += px[0] as f32 * w;
                            acc[1] += px[1] as f32 * w;
                            acc[2] += px[2] as f32 * w;
                            norm += w;
                        }
                    }
                    let out_px = [
                        (acc[0] / norm).round().clamp(0.0, 255.0) as u8,
                        (acc[1] / norm).round().clamp(0.0, 255.0) as u8,
                        (acc[2] / norm).round().clamp(0.0, 255.0) as u8,
                    ];
                    output.set_rgb(b, group.origin_y + ly, group.origin_x + lx, out_px);
                }
            }
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wide_tile() -> TileGeometry {
        TileGeometry::new(16, 8, 2)
    }

    #[test]
    fn test_constant_batch_unchanged() {
        let mut input = ImageBatch::new(8, 8, 2, 3);
        for b in 0..2 {
            for y in 0..8 {
                for x in 0..8 {
                    input.set_rgb(b, y, x, [100, 150, 200]);
                }
            }
        }
        let out = gaussian_blur(&input, 1.0, 3, wide_tile()).unwrap();
        for b in 0..2 {
            for y in 0..8 {
                for x in 0..8 {
                    assert_eq!(out.rgb(b, y, x), [100, 150, 200], "changed at ({b},{y},{x})");
                }
            }
        }
    }

    #[test]
    fn test_blur_reduces_variance() {
        // Checkerboard: maximal local variance; blurring must lower it.
        let mut input = ImageBatch::new(8, 8, 1, 3);
        for y in 0..8 {
            for x in 0..8 {
                let v = if (x + y) % 2 == 0 { 255 } else { 0 };
                input.set_rgb(0, y, x, [v, v, v]);
            }
        }
        let out = gaussian_blur(&input, 1.0, 3, wide_tile()).unwrap();

        let variance = |batch: &ImageBatch| {
            let n = (batch.plane()) as f32;
            let mean: f32 = (0..8)
                .flat_map(|y| (0..8).map(move |x| (y, x)))
                .map(|(y, x)| batch.rgb(0, y, x)[0] as f32)
                .sum::<f32>()
                / n;
            (0..8)
                .flat_map(|y| (0..8).map(move |x| (y, x)))
                .map(|(y, x)| {
                    let v = batch.rgb(0, y, x)[0] as f32;
                    (v - mean) * (v - mean)
                })
                .sum::<f32>()
                / n
        };
        assert!(variance(&out) < variance(&input), "variance should decrease after blur");
    }

    #[test]
    fn test_zero_radius_is_identity() {
        let mut input = ImageBatch::new(4, 4, 1, 3);
        for y in 0..4 {
            for x in 0..4 {
                input.set_rgb(0, y, x, [(y * 4 + x) as u8, 0, 255]);
            }
        }
        let out = gaussian_blur(&input, 1.0, 0, wide_tile()).unwrap();
        assert_eq!(out.as_slice(), input.as_slice());
    }

    #[test]
    fn test_single_channel_input_rejected() {
        let input = ImageBatch::new(4, 4, 1, 1);
        let err = gaussian_blur(&input, 1.0, 3, wide_tile()).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration { .. }));
    }

    #[test]
    fn test_oversized_radius_rejected() {
        let input = ImageBatch::new(4, 4, 1, 3);
        let err = gaussian_blur(&input, 1.0, 16, wide_tile()).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration { .. }));
    }

    #[test]
    fn test_negative_delta_rejected() {
        let input = ImageBatch::new(4, 4, 1, 3);
        let err = gaussian_blur(&input, -1.0, 3, wide_tile()).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration { .. }));
    }
}
