// gpu/gradient.rs — the batched tiled convolution engine and its
// directional kernel store.
//
// This is the GPU mirror of gradient::gradient_magnitude and must agree
// with it BYTE-FOR-BYTE (integer arithmetic end to end — no float
// tolerance applies here).
//
// KERNEL STORE
// ─────────────
// The two 3×3 directional kernels live in a 96-byte uniform buffer
// created once with the pipeline and written by `configure()` before any
// dispatch — write-once, read-many for the duration of one run; the next
// run may reconfigure. Uniform memory is the broadcast read-only class on
// every backend wgpu targets, which is what the per-access latency of the
// inner convolution loop wants.
//
// DISPATCH
// ─────────
// Workgroups are WG_X × WG_Y × WG_Z invocations; z carries a batch slice.
// Each invocation stages its own pixel into the workgroup tile behind a
// single barrier, then accumulates both directional sums in i32 over
// tile-local clamped coordinates. See gradient.rs for the border-policy
// contract this kernel preserves.

use wgpu::util::DeviceExt;

use crate::batch::LUMA_CHANNELS;
use crate::error::PipelineError;
use crate::gpu::batch::GpuBatch;
use crate::gpu::device::GpuDevice;
use crate::gradient::validate_kernel_width;
use crate::kernels::{DirectionalKernels, SOBEL_WIDTH};

/// Uniform params (must match GradientParams in gradient.wgsl).
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct GradientParams {
    width: u32,
    height: u32,
    batch: u32,
    radius: u32,
}

/// Kernel store image (must match KernelStore in gradient.wgsl):
/// two 3×3 matrices, rows padded to vec4<i32>. 96 bytes.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct KernelStoreRaw {
    kx: [[i32; 4]; SOBEL_WIDTH],
    ky: [[i32; 4]; SOBEL_WIDTH],
}

impl KernelStoreRaw {
    fn from_kernels(kernels: &DirectionalKernels) -> Self {
        let pad = |m: &[[i32; SOBEL_WIDTH]; SOBEL_WIDTH]| {
            let mut out = [[0i32; 4]; SOBEL_WIDTH];
            for (row, src) in out.iter_mut().zip(m.iter()) {
                row[..SOBEL_WIDTH].copy_from_slice(src);
            }
            out
        };
        KernelStoreRaw { kx: pad(&kernels.x), ky: pad(&kernels.y) }
    }
}

/// The compiled gradient-magnitude pipeline plus its kernel store.
///
/// Create once per device, `configure()` once per run, then `compute()`
/// for each gradient dispatch.
pub struct GpuGradientPipeline {
    pipeline: wgpu::ComputePipeline,
    bgl: wgpu::BindGroupLayout,
    /// The directional kernel store. Written by `configure()`, read by
    /// every invocation of every subsequent dispatch.
    kernel_buf: wgpu::Buffer,
    configured: bool,
}

impl GpuGradientPipeline {
    pub fn new(gpu: &GpuDevice) -> Self {
        let ws = gpu.workgroup_size;
        let shader_src = include_str!("../shaders/gradient.wgsl")
            .replace("{{WG_X}}", &ws.x.to_string())
            .replace("{{WG_Y}}", &ws.y.to_string())
            .replace("{{WG_Z}}", &ws.z.to_string())
            .replace("{{TILE_LEN}}", &ws.tile_len().to_string());

        let shader = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("gradient.wgsl"),
            source: wgpu::ShaderSource::Wgsl(shader_src.into()),
        });

        let bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("GpuGradient BGL"),
            entries: &[
                // 0 — luma input
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
                // 1 — magnitude output
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
                // 2 — kernel store uniform
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
                // 3 — dispatch params uniform
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
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
            label: Some("GpuGradient pipeline layout"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        let pipeline = gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("gradient_magnitude"),
            layout: Some(&layout),
            module: &shader,
            entry_point: "gradient_magnitude",
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        let kernel_buf = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("DirectionalKernelStore"),
            size: std::mem::size_of::<KernelStoreRaw>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        GpuGradientPipeline { pipeline, bgl, kernel_buf, configured: false }
    }

    /// Write both directional kernels into the store.
    ///
    /// Must be called before the first `compute()` of a run. There is no
    /// mutation path afterwards — the store is write-once, read-many
    /// until the next run reconfigures it.
    ///
    /// # Errors
    /// `TransferFailed` if the device rejects the store write. Fatal for
    /// the run, not retried.
    pub fn configure(
        &mut self,
        gpu: &GpuDevice,
        kernels: &DirectionalKernels,
    ) -> Result<(), PipelineError> {
        let raw = KernelStoreRaw::from_kernels(kernels);

        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        gpu.queue.write_buffer(&self.kernel_buf, 0, bytemuck::bytes_of(&raw));
        gpu.queue.submit(std::iter::empty());
        if let Some(e) = pollster::block_on(gpu.device.pop_error_scope()) {
            return Err(PipelineError::TransferFailed {
                label: "kernel store",
                detail: e.to_string(),
            });
        }
        gpu.device.poll(wgpu::Maintain::Wait);

        self.configured = true;
        Ok(())
    }

    /// Compute combined gradient magnitude: `input` (1-channel) →
    /// `output` (1-channel), blocking until the device retires the
    /// dispatch.
    ///
    /// All preconditions are checked before any device resource is
    /// created — a malformed `kernel_width` never reaches the device.
    ///
    /// # Errors
    /// `Configuration` for even/oversized kernel width, shape mismatch,
    /// or an unconfigured kernel store; `Launch` if the device rejects
    /// the dispatch.
    pub fn compute(
        &self,
        gpu: &GpuDevice,
        input: &GpuBatch,
        kernel_width: usize,
        output: &GpuBatch,
    ) -> Result<(), PipelineError> {
        let ws = gpu.workgroup_size;
        let radius = validate_kernel_width(kernel_width, ws.x as usize, ws.y as usize)?;
        if !self.configured {
            return Err(PipelineError::Configuration {
                detail: "directional kernel store has not been configured".into(),
            });
        }
        if input.channels != LUMA_CHANNELS as u32 || output.channels != LUMA_CHANNELS as u32 {
            return Err(PipelineError::Configuration {
                detail: format!(
                    "gradient expects single-channel input and output (got {} and {})",
                    input.channels, output.channels
                ),
            });
        }
        if (input.width, input.height, input.batch) != (output.width, output.height, output.batch) {
            return Err(PipelineError::Configuration {
                detail: "gradient input/output dimensions differ".into(),
            });
        }

        let params = GradientParams {
            width: input.width,
            height: input.height,
            batch: input.batch,
            radius: radius as u32,
        };
        let params_buf = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("GradientParams"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("GpuGradient BG"),
            layout: &self.bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: input.buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: output.buffer.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: self.kernel_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: params_buf.as_entire_binding() },
            ],
        });

        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("GpuGradient") });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("gradient_magnitude"),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::ImageBatch;
    use crate::gradient::gradient_magnitude;

    #[test]
    fn test_kernel_store_layout() {
        // Two vec4-padded 3×3 matrices: 2 × 3 × 16 bytes.
        assert_eq!(std::mem::size_of::<KernelStoreRaw>(), 96);
    }

    #[test]
    fn test_kernel_store_row_padding() {
        let raw = KernelStoreRaw::from_kernels(&DirectionalKernels::sobel());
        assert_eq!(raw.kx[0], [-1, 0, 1, 0]);
        assert_eq!(raw.kx[1], [-2, 0, 2, 0]);
        assert_eq!(raw.ky[2], [1, 2, 1, 0]);
    }

    fn run_gpu_test_in_subprocess(test_name: &str) -> String {
        let output = std::process::Command::new("cargo")
            .args(["test", "--lib", "--", test_name, "--exact", "--ignored", "--nocapture"])
            .output()
            .unwrap_or_else(|e| panic!("failed to spawn subprocess for {test_name}: {e}"));
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        print!("{stdout}");
        eprint!("{stderr}");
        stdout + &stderr
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_gpu_matches_cpu_byte_for_byte() {
        // Integer arithmetic end to end: GPU output must be IDENTICAL to
        // the CPU reference, including at tile seams and batch slices.
        let mut rng = 987654u32;
        let mut host = ImageBatch::new(100, 60, 5, 1);
        for b in 0..5 {
            for y in 0..60 {
                for x in 0..100 {
                    rng = rng.wrapping_mul(1664525).wrapping_add(1013904223);
                    host.set_luma(b, y, x, (rng >> 24) as u8);
                }
            }
        }

        let gpu = GpuDevice::new().expect("need Vulkan GPU");
        let kernels = DirectionalKernels::sobel();
        let cpu = gradient_magnitude(&host, &kernels, 3, gpu.workgroup_size.tile_geometry()).unwrap();

        let input = GpuBatch::alloc(&gpu, 100, 60, 5, 1, "gradient in").unwrap();
        let output = GpuBatch::alloc(&gpu, 100, 60, 5, 1, "gradient out").unwrap();
        input.upload(&gpu, &host).unwrap();

        let mut pipeline = GpuGradientPipeline::new(&gpu);
        pipeline.configure(&gpu, &kernels).unwrap();
        pipeline.compute(&gpu, &input, 3, &output).unwrap();
        let result = output.readback(&gpu).unwrap();

        assert_eq!(result.as_slice(), cpu.as_slice(), "GPU and CPU gradient outputs differ");
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_even_kernel_width_rejected_before_dispatch() {
        let gpu = GpuDevice::new().expect("need Vulkan GPU");
        let input = GpuBatch::alloc(&gpu, 8, 8, 1, 1, "in").unwrap();
        let output = GpuBatch::alloc(&gpu, 8, 8, 1, 1, "out").unwrap();
        let mut pipeline = GpuGradientPipeline::new(&gpu);
        pipeline.configure(&gpu, &DirectionalKernels::sobel()).unwrap();
        let err = pipeline.compute(&gpu, &input, 4, &output).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration { .. }));
        // The output buffer was never touched: still all zeros.
        let out = output.readback(&gpu).unwrap();
        assert!(out.as_slice().iter().all(|&v| v == 0));
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_compute_before_configure_rejected() {
        let gpu = GpuDevice::new().expect("need Vulkan GPU");
        let input = GpuBatch::alloc(&gpu, 8, 8, 1, 1, "in").unwrap();
        let output = GpuBatch::alloc(&gpu, 8, 8, 1, 1, "out").unwrap();
        let pipeline = GpuGradientPipeline::new(&gpu);
        let err = pipeline.compute(&gpu, &input, 3, &output).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration { .. }));
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "requires a real Vulkan GPU"]
    fn test_gpu_matches_cpu_byte_for_byte() {
        let out = run_gpu_test_in_subprocess(
            "gpu::gradient::tests::inner_gpu_matches_cpu_byte_for_byte",
        );
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }

    #[test]
    #[ignore = "requires a real Vulkan GPU"]
    fn test_even_kernel_width_rejected_before_dispatch() {
        let out = run_gpu_test_in_subprocess(
            "gpu::gradient::tests::inner_even_kernel_width_rejected_before_dispatch",
        );
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }

    #[test]
    #[ignore = "requires a real Vulkan GPU"]
    fn test_compute_before_configure_rejected() {
        let out = run_gpu_test_in_subprocess(
            "gpu::gradient::tests::inner_compute_before_configure_rejected",
        );
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }
}
