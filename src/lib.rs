// Sobelisk: batched Sobel edge-strength pipeline on wgpu compute.
//
// Computes per-pixel gradient magnitude for a batch of same-dimension
// images: Gaussian blur → grayscale reduction → tiled Sobel convolution,
// all on the GPU with one dispatch per stage covering the whole batch.
//
// The CPU implementations in the root modules are the authoritative
// reference — every GPU kernel is validated against them (the gradient
// stage byte-for-byte).

pub mod batch;
pub mod blur;
pub mod error;
pub mod gradient;
pub mod grayscale;
pub mod kernels;
pub mod pipeline;
pub mod tile;

pub mod gpu;

pub use batch::ImageBatch;
pub use error::PipelineError;
pub use kernels::DirectionalKernels;
pub use pipeline::SobelConfig;
pub use tile::TileGeometry;
