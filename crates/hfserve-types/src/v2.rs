//! Open inference protocol (v2) REST shapes
//!
//! Tensors travel as flat row-major `data` arrays next to their `shape`
//! and `datatype`. The datatype is authoritative: decoding never guesses,
//! it only widens integers to `i64`/`u64` and floats to `f32`/`f64`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::{Result, ServeError};

/// Element datatypes defined by the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TensorDatatype {
    #[serde(rename = "BOOL")]
    Bool,
    #[serde(rename = "UINT8")]
    Uint8,
    #[serde(rename = "UINT16")]
    Uint16,
    #[serde(rename = "UINT32")]
    Uint32,
    #[serde(rename = "UINT64")]
    Uint64,
    #[serde(rename = "INT8")]
    Int8,
    #[serde(rename = "INT16")]
    Int16,
    #[serde(rename = "INT32")]
    Int32,
    #[serde(rename = "INT64")]
    Int64,
    #[serde(rename = "FP16")]
    Fp16,
    #[serde(rename = "FP32")]
    Fp32,
    #[serde(rename = "FP64")]
    Fp64,
    #[serde(rename = "BYTES")]
    Bytes,
}

impl TensorDatatype {
    pub fn as_str(&self) -> &'static str {
        match self {
            TensorDatatype::Bool => "BOOL",
            TensorDatatype::Uint8 => "UINT8",
            TensorDatatype::Uint16 => "UINT16",
            TensorDatatype::Uint32 => "UINT32",
            TensorDatatype::Uint64 => "UINT64",
            TensorDatatype::Int8 => "INT8",
            TensorDatatype::Int16 => "INT16",
            TensorDatatype::Int32 => "INT32",
            TensorDatatype::Int64 => "INT64",
            TensorDatatype::Fp16 => "FP16",
            TensorDatatype::Fp32 => "FP32",
            TensorDatatype::Fp64 => "FP64",
            TensorDatatype::Bytes => "BYTES",
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            TensorDatatype::Fp16 | TensorDatatype::Fp32 | TensorDatatype::Fp64
        )
    }

    pub fn is_signed_int(&self) -> bool {
        matches!(
            self,
            TensorDatatype::Int8 | TensorDatatype::Int16 | TensorDatatype::Int32 | TensorDatatype::Int64
        )
    }

    pub fn is_unsigned_int(&self) -> bool {
        matches!(
            self,
            TensorDatatype::Uint8
                | TensorDatatype::Uint16
                | TensorDatatype::Uint32
                | TensorDatatype::Uint64
        )
    }
}

impl fmt::Display for TensorDatatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TensorDatatype {
    type Err = ServeError;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_value(Value::String(s.to_string())).map_err(|_| {
            ServeError::serialization(format!("unknown tensor datatype {}", s))
        })
    }
}

/// One named tensor in a request or response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub datatype: TensorDatatype,
    /// Flat row-major elements
    pub data: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Map<String, Value>>,
}

impl InferTensor {
    /// Build an INT64 tensor from row-major values
    pub fn int64(name: impl Into<String>, shape: Vec<usize>, data: &[i64]) -> Self {
        Self {
            name: name.into(),
            shape,
            datatype: TensorDatatype::Int64,
            data: data.iter().map(|v| Value::from(*v)).collect(),
            parameters: None,
        }
    }

    /// Build an FP32 tensor from row-major values
    pub fn fp32(name: impl Into<String>, shape: Vec<usize>, data: &[f32]) -> Self {
        Self {
            name: name.into(),
            shape,
            datatype: TensorDatatype::Fp32,
            data: data.iter().map(|v| Value::from(*v as f64)).collect(),
            parameters: None,
        }
    }

    /// Number of elements the shape declares
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Inference request body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub inputs: Vec<InferTensor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Map<String, Value>>,
}

/// Inference response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferResponse {
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub model_version: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    pub outputs: Vec<InferTensor>,
}

/// Error body returned by v2 servers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferErrorBody {
    pub error: String,
}
