// gpu/grayscale.rs — GPU 3-channel → 1-channel luminance reduction.
//
// Mirrors grayscale::to_grayscale. Per-pixel transform; the interesting
// parts (dispatch geometry, stage barrier, launch-error capture) are the
// same as the tiled stages, without the tile.

use wgpu::util::DeviceExt;

use crate::batch::{LUMA_CHANNELS, RGB_CHANNELS};
use crate::error::PipelineError;
use crate::gpu::batch::GpuBatch;
use crate::gpu::device::GpuDevice;

/// Uniform params (must match GrayscaleParams in grayscale.wgsl).
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct GrayscaleParams {
    width: u32,
    height: u32,
    batch: u32,
    _pad: u32,
}

/// Compiled luminance-reduction pipeline. Create once, reuse per run.
pub struct GpuGrayscalePipeline {
    pipeline: wgpu::ComputePipeline,
    bgl: wgpu::BindGroupLayout,
}

impl GpuGrayscalePipeline {
    pub fn new(gpu: &GpuDevice) -> Self {
        let ws = gpu.workgroup_size;
        let shader_src = include_str!("../shaders/grayscale.wgsl")
            .replace("{{WG_X}}", &ws.x.to_string())
            .replace("{{WG_Y}}", &ws.y.to_string())
            .replace("{{WG_Z}}", &ws.z.to_string());

        let shader = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("grayscale.wgsl"),
            source: wgpu::ShaderSource::Wgsl(shader_src.into()),
        });

        let bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("GpuGrayscale BGL"),
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
                // 1 — luma output
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
            label: Some("GpuGrayscale pipeline layout"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        let pipeline = gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("to_grayscale"),
            layout: Some(&layout),
            module: &shader,
            entry_point: "to_grayscale",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        GpuGrayscalePipeline { pipeline, bgl }
    }

    /// Reduce `input` (3-channel) into `output` (1-channel) and block
    /// until the device retires the dispatch.
    ///
    /// # Errors
    /// `Configuration` on shape/channel mismatch, `Launch` if the device
    /// rejects the dispatch.
    pub fn reduce(
        &self,
        gpu: &GpuDevice,
        input: &GpuBatch,
        output: &GpuBatch,
    ) -> Result<(), PipelineError> {
        if input.channels != RGB_CHANNELS as u32 || output.channels != LUMA_CHANNELS as u32 {
            return Err(PipelineError::Configuration {
                detail: format!(
                    "grayscale expects 3-channel input and 1-channel output (got {} and {})",
                    input.channels, output.channels
                ),
            });
        }
        if (input.width, input.height, input.batch) != (output.width, output.height, output.batch) {
            return Err(PipelineError::Configuration {
                detail: "grayscale input/output dimensions differ".into(),
            });
        }

        let params = GrayscaleParams {
            width: input.width,
            height: input.height,
            batch: input.batch,
            _pad: 0,
        };
        let params_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("GrayscaleParams"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("GpuGrayscale BG"),
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
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("GpuGrayscale") });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("to_grayscale"),
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

        // Stage barrier: the next stage must see this one fully retired.
        gpu.device.poll(wgpu::Maintain::Wait);
        Ok(())
    }
}
