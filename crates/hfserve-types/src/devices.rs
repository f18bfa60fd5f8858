//! Device and weight precision selection

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::{Result, ServeError};

/// Device the local backend runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Device {
    /// CPU device
    #[default]
    CPU,
    /// NVIDIA CUDA device with device index
    CUDA(usize),
    /// Apple GPU
    Metal,
}

impl Device {
    /// Check if device is GPU-based
    pub fn is_gpu(&self) -> bool {
        matches!(self, Device::CUDA(_) | Device::Metal)
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::CPU => write!(f, "cpu"),
            Device::CUDA(idx) => write!(f, "cuda:{}", idx),
            Device::Metal => write!(f, "metal"),
        }
    }
}

impl FromStr for Device {
    type Err = ServeError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "cpu" => Ok(Device::CPU),
            "metal" | "mps" => Ok(Device::Metal),
            "cuda" => Ok(Device::CUDA(0)),
            other => match other.strip_prefix("cuda:") {
                Some(idx) => idx
                    .parse()
                    .map(Device::CUDA)
                    .map_err(|_| ServeError::config(format!("Invalid CUDA device index: {}", idx))),
                None => Err(ServeError::config(format!(
                    "Device must be one of: cpu, cuda[:N], metal (got {})",
                    other
                ))),
            },
        }
    }
}

/// Precision local weights are loaded in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WeightDType {
    /// Use the precision recorded in the model's config, falling back to f32
    #[default]
    Auto,
    F32,
    F16,
    BF16,
}

impl FromStr for WeightDType {
    type Err = ServeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(WeightDType::Auto),
            "f32" | "float32" => Ok(WeightDType::F32),
            "f16" | "float16" | "half" => Ok(WeightDType::F16),
            "bf16" | "bfloat16" => Ok(WeightDType::BF16),
            other => Err(ServeError::config(format!(
                "Data type must be one of: auto, float32, float16, bfloat16 (got {})",
                other
            ))),
        }
    }
}
