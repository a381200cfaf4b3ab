// error.rs — Pipeline error taxonomy.
//
// Every failure is fatal to the current call: nothing is retried
// internally and no error is downgraded to a degraded-but-successful
// result. Variants are split so a caller can tell "fix your input"
// (Configuration) from "device exhausted" (Allocation) from "transport
// fault" (Transfer*) from "dispatch rejected" (Launch / WorkgroupTooLarge)
// — the corrective action differs for each.

use std::fmt;

/// Errors from device setup, buffer management, and stage dispatch.
#[derive(Debug)]
pub enum PipelineError {
    /// No Vulkan adapter found that passes the non-CPU filter.
    NoSuitableAdapter,
    /// wgpu device request failed (driver issue, unsupported limits).
    DeviceRequest(wgpu::RequestDeviceError),
    /// Device buffer acquisition failed (device memory exhausted or the
    /// buffer rejected by the device).
    Allocation { label: &'static str, bytes: u64 },
    /// Host↔device copy size mismatch.
    TransferSize { label: &'static str, expected: usize, actual: usize },
    /// Host↔device transport fault (write or map failure).
    TransferFailed { label: &'static str, detail: String },
    /// Parallel dispatch rejected by the device.
    Launch { detail: String },
    /// Requested group size exceeds the profile's invocation limit.
    WorkgroupTooLarge { total: u32, max: u32 },
    /// Invalid caller input: bad kernel width, shape mismatch, stage
    /// invoked before configuration.
    Configuration { detail: String },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::NoSuitableAdapter => write!(
                f,
                "no suitable Vulkan adapter found (only CPU/software renderers visible)"
            ),
            PipelineError::DeviceRequest(e) => write!(f, "device request failed: {e}"),
            PipelineError::Allocation { label, bytes } => {
                write!(f, "failed to allocate {label} ({bytes} bytes) on the device")
            }
            PipelineError::TransferSize { label, expected, actual } => write!(
                f,
                "{label} transfer size mismatch: expected {expected} bytes, got {actual}"
            ),
            PipelineError::TransferFailed { label, detail } => {
                write!(f, "{label} transfer failed: {detail}")
            }
            PipelineError::Launch { detail } => write!(f, "dispatch rejected: {detail}"),
            PipelineError::WorkgroupTooLarge { total, max } => write!(
                f,
                "workgroup size {total} exceeds profile limit of {max} invocations"
            ),
            PipelineError::Configuration { detail } => write!(f, "invalid configuration: {detail}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::DeviceRequest(e) => Some(e),
            _ => None,
        }
    }
}
