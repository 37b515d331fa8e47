use std::fmt;

use anyhow::{Context, Result};
use candle_core::Device;
use serde::{Deserialize, Serialize};

/// Compute backend a run is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Cpu,
    Cuda,
    Metal,
}

impl DeviceKind {
    pub fn from_device(device: &Device) -> Self {
        if device.is_cuda() {
            Self::Cuda
        } else if device.is_metal() {
            Self::Metal
        } else {
            Self::Cpu
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda => f.write_str("cuda"),
            Self::Metal => f.write_str("metal"),
        }
    }
}

/// Explicit device selection for a single analysis run.
///
/// The ordinal replaces process-wide GPU masking: it is resolved once into a
/// candle [`Device`] and handed to the model loader, nothing else observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceSelection {
    pub kind: DeviceKind,
    pub ordinal: usize,
}

impl DeviceSelection {
    pub fn cpu() -> Self {
        Self::default()
    }

    pub fn new(kind: DeviceKind, ordinal: usize) -> Self {
        Self { kind, ordinal }
    }
}

impl fmt::Display for DeviceSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DeviceKind::Cpu => write!(f, "cpu"),
            kind => write!(f, "{kind}:{}", self.ordinal),
        }
    }
}

pub fn prepare_device(selection: DeviceSelection) -> Result<Device> {
    match selection.kind {
        DeviceKind::Cpu => Ok(Device::Cpu),
        DeviceKind::Cuda => Device::new_cuda(selection.ordinal)
            .with_context(|| format!("failed to open CUDA device {}", selection.ordinal)),
        DeviceKind::Metal => Device::new_metal(selection.ordinal)
            .with_context(|| format!("failed to open Metal device {}", selection.ordinal)),
    }
}
