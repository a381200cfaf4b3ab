// gpu/blur.rs — GPU batched Gaussian noise-reduction stage.
//
// Mirrors blur::gaussian_blur: same tiling, same populated-extent
// clamping, same separable g(|i|)·g(|j|) weighting normalized by the
// applied-weight sum. Coefficients are computed host-side from
// kernels::gaussian_kernel_1d and carried vec4-packed in the dispatch
// uniform (right half only — the table is symmetric).

use wgpu::util::DeviceExt;

use crate::batch::RGB_CHANNELS;
use crate::blur::validate_blur_params;
use crate::error::PipelineError;
use crate::gpu::batch::GpuBatch;
use crate::gpu::device::GpuDevice;
use crate::kernels::gaussian_kernel_1d;

/// Uniform params (must match BlurParams in blur.wgsl):
///   offset  0: width, height, batch, radius (4 × u32)
///   offset 16: coeffs (4 × vec4<f32>)
///   total:  80 bytes
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct BlurParams {
    width: u32,
    height: u32,
    batch: u32,
    radius: u32,
    /// coeffs[k/4][k%4] = g(k) for offsets 0..=radius.
    coeffs: [[f32; 4]; 4],
}

impl BlurParams {
    fn new(width: u32, height: u32, batch: u32, delta: f32, radius: usize) -> Self {
        // Right half of the symmetric table: offsets 0, 1, ..., radius.
        let kernel = gaussian_kernel_1d(radius, delta);
        let right_half = &kernel[radius..];

        let mut coeffs = [[0.0f32; 4]; 4];
        for (k, &c) in right_half.iter().enumerate() {
            coeffs[k / 4][k % 4] = c;
        }

        BlurParams { width, height, batch, radius: radius as u32, coeffs }
    }
}

/// Compiled Gaussian blur pipeline. Create once, reuse per run.
pub struct GpuBlurPipeline {
    pipeline: wgpu::ComputePipeline,
    bgl: wgpu::BindGroupLayout,
}

impl GpuBlurPipeline {
    pub fn new(gpu: &GpuDevice) -> Self {
        let ws = gpu.workgroup_size;
        let shader_src = include_str!("../shaders/blur.wgsl")
            .replace("{{WG_X}}", &ws.x.to_string())
            .replace("{{WG_Y}}", &ws.y.to_string())
            .replace("{{WG_Z}}", &ws.z.to_string())
            .replace("{{TILE_LEN}}", &ws.tile_len().to_string());

        let shader = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("blur.wgsl"),
            source: wgpu::ShaderSource::Wgsl(shader_src.into()),
        });

        let bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("GpuBlur BGL"),
            entries: &[
                // 0 — packed rgb input
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // 1 — packed rgb output
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // 2 — params uniform
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("GpuBlur pipeline layout"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        let pipeline = gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("gaussian_blur"),
            layout: Some(&layout),
            module: &shader,
            entry_point: "gaussian_blur",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        GpuBlurPipeline { pipeline, bgl }
    }

    /// Blur `input` (3-channel) into `output` (3-channel) and block until
    /// the device retires the dispatch.
    ///
    /// # Errors
    /// `Configuration` on shape/parameter problems, `Launch` if the
    /// device rejects the dispatch.
    pub fn apply(
        &self,
        gpu: &GpuDevice,
        input: &GpuBatch,
        output: &GpuBatch,
        delta: f32,
        radius: usize,
    ) -> Result<(), PipelineError> {
        if input.channels != RGB_CHANNELS as u32 || output.channels != RGB_CHANNELS as u32 {
            return Err(PipelineError::Configuration {
                detail: format!(
                    "blur expects 3-channel input and output (got {} and {})",
                    input.channels, output.channels
                ),
            });
        }
        if (input.width, input.height, input.batch) != (output.width, output.height, output.batch) {
            return Err(PipelineError::Configuration {
                detail: "blur input/output dimensions differ".into(),
            });
        }
        validate_blur_params(delta, radius)?;

        let params = BlurParams::new(input.width, input.height, input.batch, delta, radius);
        let params_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("BlurParams"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("GpuBlur BG"),
            layout: &self.bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: input.buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: output.buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: params_buf.as_entire_binding() },
            ],
        });

        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("GpuBlur") });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("gaussian_blur"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            let (dx, dy, dz) = gpu.dispatch_size(input.width, input.height, input.batch);
            pass.dispatch_workgroups(dx, dy, dz);
        }
        gpu.queue.submit(std::iter::once(encoder.finish()));
        if let Some(e) = pollster::block_on(gpu.device.pop_error_scope()) {
            return Err(PipelineError::Launch { detail: e.to_string() });
        }

        gpu.device.poll(wgpu::Maintain::Wait);
        Ok(())
    }
}
