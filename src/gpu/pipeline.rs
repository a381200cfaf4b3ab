// gpu/pipeline.rs — the batch pipeline orchestrator.
//
// Sequences the three stages over device-resident buffers:
//
//   host input ──upload──> raw ──blur──> blurred ──reduce──> gray
//                                                 ──gradient──> out ──readback──> host
//
// Each stage boundary is a full device barrier (submit + poll(Wait));
// stages never overlap within a run. The four stage buffers are acquired
// up front in pipeline order and owned exclusively by the run; if any
// acquisition fails, the ones already acquired are dropped before the
// error propagates, and on every exit path — success or failure — all of
// them are released when the run's scope unwinds. No pooling across
// runs; concurrent runs need independent buffer sets.

use crate::batch::{ImageBatch, LUMA_CHANNELS, RGB_CHANNELS};
use crate::error::PipelineError;
use crate::gpu::batch::GpuBatch;
use crate::gpu::blur::GpuBlurPipeline;
use crate::gpu::device::GpuDevice;
use crate::gpu::gradient::GpuGradientPipeline;
use crate::gpu::grayscale::GpuGrayscalePipeline;
use crate::kernels::DirectionalKernels;
use crate::pipeline::SobelConfig;

// ---------------------------------------------------------------------------
// Stage buffer acquisition
// ---------------------------------------------------------------------------

/// The four per-run device buffers, in acquisition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StageSlot {
    Raw,
    Blurred,
    Grayscale,
    Output,
}

impl StageSlot {
    pub(crate) fn label(self) -> &'static str {
        match self {
            StageSlot::Raw => "raw batch",
            StageSlot::Blurred => "blurred batch",
            StageSlot::Grayscale => "grayscale batch",
            StageSlot::Output => "output batch",
        }
    }

    pub(crate) fn channels(self) -> u32 {
        match self {
            StageSlot::Raw | StageSlot::Blurred => RGB_CHANNELS as u32,
            StageSlot::Grayscale | StageSlot::Output => LUMA_CHANNELS as u32,
        }
    }
}

/// One buffer per pipeline stage.
pub(crate) struct StageBuffers<B> {
    pub raw: B,
    pub blurred: B,
    pub gray: B,
    pub out: B,
}

impl<B> StageBuffers<B> {
    /// Acquire all four buffers in pipeline order. If any acquisition
    /// fails, the buffers acquired before it are dropped (exactly once)
    /// before the error propagates — no leaked device resources on any
    /// exit path.
    pub(crate) fn acquire<E>(
        mut alloc: impl FnMut(StageSlot) -> Result<B, E>,
    ) -> Result<Self, E> {
        Ok(StageBuffers {
            raw: alloc(StageSlot::Raw)?,
            blurred: alloc(StageSlot::Blurred)?,
            gray: alloc(StageSlot::Grayscale)?,
            out: alloc(StageSlot::Output)?,
        })
    }
}

// ---------------------------------------------------------------------------
// SobelPipeline
// ---------------------------------------------------------------------------

/// The compiled three-stage pipeline. Expensive to create (three shader
/// compilations); create once per device and call [`run`] per batch.
///
/// [`run`]: SobelPipeline::run
pub struct SobelPipeline {
    blur: GpuBlurPipeline,
    grayscale: GpuGrayscalePipeline,
    gradient: GpuGradientPipeline,
    kernels: DirectionalKernels,
    config: SobelConfig,
}

impl SobelPipeline {
    /// Compile all three stages with the standard Sobel kernels and
    /// default parameters.
    pub fn new(gpu: &GpuDevice) -> Self {
        Self::with_config(gpu, SobelConfig::default())
    }

    pub fn with_config(gpu: &GpuDevice, config: SobelConfig) -> Self {
        SobelPipeline {
            blur: GpuBlurPipeline::new(gpu),
            grayscale: GpuGrayscalePipeline::new(gpu),
            gradient: GpuGradientPipeline::new(gpu),
            kernels: DirectionalKernels::sobel(),
            config,
        }
    }

    /// Run the full pipeline on a 3-channel host batch and return the
    /// single-channel gradient-magnitude batch.
    ///
    /// Synchronous and blocking: does not return until every stage has
    /// retired on the device. All device buffers acquired by this call
    /// are released before it returns, on success and on every error
    /// path.
    ///
    /// # Errors
    /// `Configuration` for a non-3-channel input or bad stage parameters,
    /// `Allocation` / `Transfer*` / `Launch` for device failures. Every
    /// error is fatal to this run; nothing is retried.
    pub fn run(&mut self, gpu: &GpuDevice, input: &ImageBatch) -> Result<ImageBatch, PipelineError> {
        if input.channels() != RGB_CHANNELS {
            return Err(PipelineError::Configuration {
                detail: format!("pipeline input must be 3-channel (got {})", input.channels()),
            });
        }
        let (width, height, batch) =
            (input.width() as u32, input.height() as u32, input.batch() as u32);

        let bufs = StageBuffers::acquire(|slot| {
            GpuBatch::alloc(gpu, width, height, batch, slot.channels(), slot.label())
        })?;

        bufs.raw.upload(gpu, input)?;
        self.blur.apply(gpu, &bufs.raw, &bufs.blurred, self.config.blur_delta, self.config.blur_radius)?;
        self.grayscale.reduce(gpu, &bufs.blurred, &bufs.gray)?;
        self.gradient.configure(gpu, &self.kernels)?;
        self.gradient.compute(gpu, &bufs.gray, self.config.kernel_width, &bufs.out)?;
        bufs.out.readback(gpu)
        // bufs drops here — all four buffers released, error or not.
    }
}

/// One-shot entry point: compile the pipeline, run it once, release
/// everything. For repeated batches hold a [`SobelPipeline`] instead —
/// shader compilation dominates a single small run.
pub fn sobel_filter(gpu: &GpuDevice, input: &ImageBatch) -> Result<ImageBatch, PipelineError> {
    SobelPipeline::new(gpu).run(gpu, input)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
