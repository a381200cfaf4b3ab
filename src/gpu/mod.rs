// gpu/mod.rs — wgpu compute implementation of the batch pipeline.
//
// Every module here mirrors a CPU reference in the parent crate and is
// validated against it — the gradient stage byte-for-byte, the float
// stages within one quantization step.
//
// Execution model: one compute dispatch per stage over the whole batch.
// Workgroups are tile_width × tile_height × batch_slice invocations; the
// z axis carries a slice of the batch so sibling workers amortize the
// group launch and the tile-load barrier across several images. The host
// blocks on each stage (queue.submit + device.poll(Wait)) before issuing
// the next — stages never overlap within a run.

pub mod batch;
pub mod blur;
pub mod device;
pub mod gradient;
pub mod grayscale;
pub mod pipeline;
