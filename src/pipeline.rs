// pipeline.rs — Stage parameters and the CPU reference pipeline.
//
// The real entry point is gpu::pipeline::sobel_filter; this module holds
// the configuration shared by both paths and a sequential composition of
// the reference stages used for validation and for machines without a
// usable Vulkan device.

use crate::batch::ImageBatch;
use crate::blur::gaussian_blur;
use crate::error::PipelineError;
use crate::gradient::gradient_magnitude;
use crate::grayscale::to_grayscale;
use crate::kernels::DirectionalKernels;
use crate::tile::TileGeometry;

/// Parameters of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SobelConfig {
    /// Gaussian falloff of the noise-reduction stage.
    pub blur_delta: f32,
    /// Blur neighborhood radius.
    pub blur_radius: usize,
    /// Width of the (odd, ≤ 3) gradient kernel window.
    pub kernel_width: usize,
}

impl Default for SobelConfig {
    fn default() -> Self {
        SobelConfig {
            blur_delta: 1.0,
            blur_radius: 3,
            kernel_width: 3,
        }
    }
}

/// Run the full reference pipeline: blur → grayscale → gradient.
///
/// Input must be a 3-channel batch; the result is the single-channel
/// gradient-magnitude batch of the same width, height, and batch count.
///
/// # Errors
/// Propagates the first stage failure; every error is fatal to the run.
pub fn sobel_filter_reference(
    input: &ImageBatch,
    config: &SobelConfig,
    tile: TileGeometry,
) -> Result<ImageBatch, PipelineError> {
    let blurred = gaussian_blur(input, config.blur_delta, config.blur_radius, tile)?;
    let gray = to_grayscale(&blurred)?;
    gradient_magnitude(&gray, &DirectionalKernels::sobel(), config.kernel_width, tile)
}
