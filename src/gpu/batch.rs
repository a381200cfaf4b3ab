// gpu/batch.rs — Device-resident image batch buffers.
//
// Each pipeline stage owns one storage buffer with ONE u32 element per
// pixel, matching the shaders' `array<u32>` bindings (WGSL has no 8-bit
// scalar type):
//
//   3-channel: r | g << 8 | b << 16   (byte 3 unused)
//   1-channel: sample in the low byte
//
// Element index: b * width * height + y * width + x — identical to the
// host layout, so tile indexing in the shaders lines up with the global
// index arithmetic here.
//
// TRANSFER CONTRACT
// ──────────────────
// Upload checks the host byte count against the buffer's expected count
// before any device traffic (TransferSize), then stages the packed words
// through queue.write_buffer; a device-side write fault surfaces as
// TransferFailed. Readback goes through a MAP_READ buffer and blocks on
// device.poll(Wait), as every readback in this crate does.
//
// Allocation failures are caught with an error scope around buffer
// creation: OutOfMemory → Allocation, and a validation rejection (e.g.
// size over the binding limit) is reported the same way since the caller's
// remedy is identical (shrink the batch).

use crate::batch::{ImageBatch, LUMA_CHANNELS, RGB_CHANNELS};
use crate::error::PipelineError;
use crate::gpu::device::GpuDevice;

/// A single-stage image batch resident on the GPU as a storage buffer.
///
/// Owns its wgpu buffer; dropping it releases the device memory. The
/// orchestrator owns all four stage buffers exclusively for one run.
pub struct GpuBatch {
    pub(crate) buffer: wgpu::Buffer,
    pub width: u32,
    pub height: u32,
    pub batch: u32,
    pub channels: u32,
}

impl GpuBatch {
    /// Pixels across the whole batch (one u32 element each).
    pub fn element_count(&self) -> usize {
        (self.width * self.height * self.batch) as usize
    }

    /// Device buffer size in bytes.
    pub fn byte_size(&self) -> u64 {
        self.element_count() as u64 * 4
    }

    /// Host-side byte count this buffer exchanges with an `ImageBatch`.
    fn host_byte_count(&self) -> usize {
        self.element_count() * self.channels as usize
    }

    /// Allocate a zero-filled device buffer for a batch of the given
    /// shape.
    ///
    /// # Errors
    /// `Allocation` if the device rejects or cannot satisfy the buffer.
    pub fn alloc(
        gpu: &GpuDevice,
        width: u32,
        height: u32,
        batch: u32,
        channels: u32,
        label: &'static str,
    ) -> Result<Self, PipelineError> {
        assert!(
            channels == LUMA_CHANNELS as u32 || channels == RGB_CHANNELS as u32,
            "channels must be 1 or 3 (got {channels})"
        );
        let bytes = (width * height * batch) as u64 * 4;

        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        gpu.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: bytes,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let oom = pollster::block_on(gpu.device.pop_error_scope());
        let validation = pollster::block_on(gpu.device.pop_error_scope());
        if oom.is_some() || validation.is_some() {
            return Err(PipelineError::Allocation { label, bytes });
        }

        Ok(GpuBatch { buffer, width, height, batch, channels })
    }

    /// Copy a host batch into this buffer.
    ///
    /// # Errors
    /// `TransferSize` if the host byte count does not match this buffer's
    /// shape; `TransferFailed` on a device-side write fault.
    pub fn upload(&self, gpu: &GpuDevice, host: &ImageBatch) -> Result<(), PipelineError> {
        let label = "batch upload";
        let expected = self.host_byte_count();
        if host.byte_len() != expected {
            return Err(PipelineError::TransferSize {
                label,
                expected,
                actual: host.byte_len(),
            });
        }
        if host.channels() as u32 != self.channels {
            return Err(PipelineError::Configuration {
                detail: format!(
                    "channel mismatch: host {} vs device {}",
                    host.channels(),
                    self.channels
                ),
            });
        }

        let staging = pack_samples(host.as_slice(), self.channels);

        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        gpu.queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&staging));
        gpu.queue.submit(std::iter::empty());
        if let Some(e) = pollster::block_on(gpu.device.pop_error_scope()) {
            return Err(PipelineError::TransferFailed { label, detail: e.to_string() });
        }
        gpu.device.poll(wgpu::Maintain::Wait);
        Ok(())
    }

    /// Read this buffer back into a host batch.
    ///
    /// Synchronous — stalls the device until the copy retires.
    ///
    /// # Errors
    /// `TransferFailed` if the readback map fails.
    pub fn readback(&self, gpu: &GpuDevice) -> Result<ImageBatch, PipelineError> {
        let label = "batch readback";
        let size = self.byte_size();

        let readback_buf = gpu.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        encoder.copy_buffer_to_buffer(&self.buffer, 0, &readback_buf, 0, size);
        gpu.queue.submit(std::iter::once(encoder.finish()));

        let slice = readback_buf.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |r| {
            let _ = tx.send(r);
        });
        gpu.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| PipelineError::TransferFailed {
                label,
                detail: "map callback never fired".into(),
            })?
            .map_err(|e| PipelineError::TransferFailed { label, detail: e.to_string() })?;

        let mapped = slice.get_mapped_range();
        let words: &[u32] = bytemuck::cast_slice(&mapped);
        let data = unpack_samples(words, self.channels);
        drop(mapped);
        readback_buf.unmap();

        Ok(ImageBatch::from_vec(
            self.width as usize,
            self.height as usize,
            self.batch as usize,
            self.channels as usize,
            data,
        ))
    }
}

// ---------------------------------------------------------------------------
// Packing helpers
// ---------------------------------------------------------------------------

/// Pack interleaved u8 samples into one u32 word per pixel.
fn pack_samples(samples: &[u8], channels: u32) -> Vec<u32> {
    match channels {
        1 => samples.iter().map(|&v| v as u32).collect(),
        3 => samples
            .chunks_exact(3)
            .map(|px| px[0] as u32 | (px[1] as u32) << 8 | (px[2] as u32) << 16)
            .collect(),
        _ => unreachable!("channels validated at alloc"),
    }
}

/// Unpack one u32 word per pixel back into interleaved u8 samples.
fn unpack_samples(words: &[u32], channels: u32) -> Vec<u8> {
    match channels {
        1 => words.iter().map(|&w| (w & 0xff) as u8).collect(),
        3 => {
            let mut out = Vec::with_capacity(words.len() * 3);
            for &w in words {
                out.push((w & 0xff) as u8);
                out.push((w >> 8 & 0xff) as u8);
                out.push((w >> 16 & 0xff) as u8);
            }
            out
        }
        _ => unreachable!("channels validated at alloc"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
