//! Compute target selection and memory placement

use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{AppError, Result};

const NVIDIA_DRIVER_PROC: &str = "/proc/driver/nvidia/version";

/// Device the model is placed on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum Device {
    Cpu,
    Cuda(usize),
}

impl Device {
    pub fn is_accelerator(&self) -> bool {
        matches!(self, Device::Cuda(_))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(ordinal) => write!(f, "cuda:{}", ordinal),
        }
    }
}

impl From<Device> for String {
    fn from(device: Device) -> Self {
        device.to_string()
    }
}

/// Configured device request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DevicePreference {
    #[default]
    Auto,
    ForceCpu,
    Cuda(usize),
}

impl FromStr for DevicePreference {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let label = s.trim().to_lowercase();
        match label.as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::ForceCpu),
            "cuda" | "gpu" => Ok(Self::Cuda(0)),
            other => other
                .strip_prefix("cuda:")
                .and_then(|ordinal| ordinal.parse::<usize>().ok())
                .map(Self::Cuda)
                .ok_or_else(|| {
                    AppError::Config(config::ConfigError::Message(format!(
                        "Invalid device '{}'. Must be 'auto', 'cpu', 'cuda' or 'cuda:<n>'",
                        s
                    )))
                }),
        }
    }
}

impl DevicePreference {
    /// Resolve against the accelerators visible to this process
    pub fn resolve(self) -> Result<Device> {
        self.resolve_with(cuda_available())
    }

    pub fn resolve_with(self, cuda_available: bool) -> Result<Device> {
        match self {
            Self::ForceCpu => Ok(Device::Cpu),
            Self::Auto if cuda_available => Ok(Device::Cuda(0)),
            Self::Auto => Ok(Device::Cpu),
            Self::Cuda(ordinal) if cuda_available => Ok(Device::Cuda(ordinal)),
            Self::Cuda(ordinal) => Err(AppError::Load(format!(
                "device cuda:{} requested but no CUDA driver is available",
                ordinal
            ))),
        }
    }
}

/// Whether an NVIDIA driver is present and not masked off for this process
pub fn cuda_available() -> bool {
    let visible = std::env::var("CUDA_VISIBLE_DEVICES").ok();
    cuda_visible(visible.as_deref()) && Path::new(NVIDIA_DRIVER_PROC).exists()
}

fn cuda_visible(visible_devices: Option<&str>) -> bool {
    match visible_devices.map(str::trim) {
        None => true,
        Some("") | Some("-1") | Some("none") | Some("NoDevFiles") => false,
        Some(_) => true,
    }
}

/// Configured offload policy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OffloadPolicy {
    #[default]
    Auto,
    Always,
    Never,
}

impl FromStr for OffloadPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "always" | "true" => Ok(Self::Always),
            "never" | "false" => Ok(Self::Never),
            _ => Err(AppError::Config(config::ConfigError::Message(format!(
                "Invalid offload policy '{}'. Must be 'auto', 'always' or 'never'",
                s
            )))),
        }
    }
}

/// How model weights are kept in memory
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Every component stays resident on the device
    Resident,
    /// Components live in host memory and move to the accelerator on demand
    CpuOffload,
}

impl OffloadPolicy {
    pub fn placement_for(self, device: Device) -> Placement {
        match self {
            Self::Always if device.is_accelerator() => Placement::CpuOffload,
            Self::Auto if device.is_accelerator() => Placement::CpuOffload,
            _ => Placement::Resident,
        }
    }
}
