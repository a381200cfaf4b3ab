// grayscale.rs — CPU reference for the 3-channel → 1-channel luminance
// reduction.
//
// Pure per-pixel transform, no neighborhood access, so no tile staging.
// Weights are the BT.601 luma coefficients used by the GPU stage.

use crate::batch::{ImageBatch, LUMA_CHANNELS, RGB_CHANNELS};
use crate::error::PipelineError;

pub const LUMA_R: f32 = 0.299;
pub const LUMA_G: f32 = 0.587;
pub const LUMA_B: f32 = 0.114;

/// Luminance of one rgb sample, rounded to u8.
#[inline]
pub(crate) fn luminance(rgb: [u8; 3]) -> u8 {
    let lum = LUMA_R * rgb[0] as f32 + LUMA_G * rgb[1] as f32 + LUMA_B * rgb[2] as f32;
    lum.round().clamp(0.0, 255.0) as u8
}

/// Reduce a 3-channel batch to a single-channel luminance batch of the
/// same width, height, and batch count.
///
/// # Errors
/// `Configuration` if the input is not 3-channel.
pub fn to_grayscale(input: &ImageBatch) -> Result<ImageBatch, PipelineError> {
    if input.channels() != RGB_CHANNELS {
        return Err(PipelineError::Configuration {
            detail: format!(
                "grayscale input must be 3-channel (got {} channels)",
                input.channels()
            ),
        });
    }
    let (width, height, batch) = (input.width(), input.height(), input.batch());
    let mut output = ImageBatch::new(width, height, batch, LUMA_CHANNELS);
    for b in 0..batch {
        for y in 0..height {
            for x in 0..width {
                output.set_luma(b, y, x, luminance(input.rgb(b, y, x)));
            }
        }
    }
    Ok(output)
}
