//! Host-side tensors exchanged between backends and postprocessing
//!
//! Local backends copy their outputs off the device into a `HostTensor`;
//! the remote predictor decodes v2 response tensors into the same type.
//! Postprocessing only ever sees this representation, which keeps it
//! identical for local and remote inference.

use hfserve_types::v2::{InferTensor, TensorDatatype};
use hfserve_types::{Result, ServeError};
use serde_json::Value;

/// Element storage, widened to one representation per numeric family
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    Bool(Vec<bool>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    Bytes(Vec<String>),
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            TensorData::Bool(v) => v.len(),
            TensorData::I64(v) => v.len(),
            TensorData::U64(v) => v.len(),
            TensorData::F32(v) => v.len(),
            TensorData::F64(v) => v.len(),
            TensorData::Bytes(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Named, row-major tensor living in host memory
#[derive(Debug, Clone, PartialEq)]
pub struct HostTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: TensorData,
}

impl HostTensor {
    /// Create a tensor, checking that `data` fills `shape` exactly
    pub fn new(name: impl Into<String>, shape: Vec<usize>, data: TensorData) -> Result<Self> {
        let name = name.into();
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(ServeError::inference(format!(
                "tensor {} declares shape {:?} ({} elements) but holds {}",
                name,
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { name, shape, data })
    }

    pub fn f32(name: impl Into<String>, shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        Self::new(name, shape, TensorData::F32(data))
    }

    pub fn i64(name: impl Into<String>, shape: Vec<usize>, data: Vec<i64>) -> Result<Self> {
        Self::new(name, shape, TensorData::I64(data))
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Elements as `f32`, widening integer data.
    ///
    /// Booleans and byte strings are not numeric scores and are rejected.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>> {
        match &self.data {
            TensorData::F32(v) => Ok(v.clone()),
            TensorData::F64(v) => Ok(v.iter().map(|x| *x as f32).collect()),
            TensorData::I64(v) => Ok(v.iter().map(|x| *x as f32).collect()),
            TensorData::U64(v) => Ok(v.iter().map(|x| *x as f32).collect()),
            TensorData::Bool(_) | TensorData::Bytes(_) => Err(ServeError::inference(format!(
                "tensor {} has non-numeric data and cannot be scored",
                self.name
            ))),
        }
    }

    /// Split the leading dimension into rows of the remaining size
    pub fn rows_f32(&self) -> Result<Vec<Vec<f32>>> {
        let first = *self.shape.first().ok_or_else(|| {
            ServeError::inference(format!("tensor {} is a scalar", self.name))
        })?;
        let values = self.to_f32_vec()?;
        if first == 0 {
            return Ok(vec![]);
        }
        let row = values.len() / first;
        Ok(values.chunks(row.max(1)).map(|c| c.to_vec()).collect())
    }

    /// Convert into a v2 wire tensor
    pub fn to_infer_tensor(&self) -> InferTensor {
        let (datatype, data): (TensorDatatype, Vec<Value>) = match &self.data {
            TensorData::Bool(v) => (TensorDatatype::Bool, v.iter().map(|x| Value::from(*x)).collect()),
            TensorData::I64(v) => (TensorDatatype::Int64, v.iter().map(|x| Value::from(*x)).collect()),
            TensorData::U64(v) => (TensorDatatype::Uint64, v.iter().map(|x| Value::from(*x)).collect()),
            TensorData::F32(v) => (
                TensorDatatype::Fp32,
                v.iter().map(|x| Value::from(*x as f64)).collect(),
            ),
            TensorData::F64(v) => (TensorDatatype::Fp64, v.iter().map(|x| Value::from(*x)).collect()),
            TensorData::Bytes(v) => (
                TensorDatatype::Bytes,
                v.iter().map(|x| Value::from(x.as_str())).collect(),
            ),
        };
        InferTensor {
            name: self.name.clone(),
            shape: self.shape.clone(),
            datatype,
            data,
            parameters: None,
        }
    }

    /// Decode a v2 wire tensor, interpreting `datatype` exactly
    pub fn from_infer_tensor(tensor: &InferTensor) -> Result<Self> {
        let dt = tensor.datatype;
        let bad = |v: &Value| {
            ServeError::serialization(format!(
                "tensor {} declared {} but holds {}",
                tensor.name, dt, v
            ))
        };
        let data = if dt == TensorDatatype::Bool {
            TensorData::Bool(
                tensor
                    .data
                    .iter()
                    .map(|v| v.as_bool().ok_or_else(|| bad(v)))
                    .collect::<Result<_>>()?,
            )
        } else if dt.is_signed_int() {
            TensorData::I64(
                tensor
                    .data
                    .iter()
                    .map(|v| v.as_i64().ok_or_else(|| bad(v)))
                    .collect::<Result<_>>()?,
            )
        } else if dt.is_unsigned_int() {
            TensorData::U64(
                tensor
                    .data
                    .iter()
                    .map(|v| v.as_u64().ok_or_else(|| bad(v)))
                    .collect::<Result<_>>()?,
            )
        } else if dt == TensorDatatype::Fp64 {
            TensorData::F64(
                tensor
                    .data
                    .iter()
                    .map(|v| v.as_f64().ok_or_else(|| bad(v)))
                    .collect::<Result<_>>()?,
            )
        } else if dt.is_float() {
            TensorData::F32(
                tensor
                    .data
                    .iter()
                    .map(|v| v.as_f64().map(|x| x as f32).ok_or_else(|| bad(v)))
                    .collect::<Result<_>>()?,
            )
        } else {
            TensorData::Bytes(
                tensor
                    .data
                    .iter()
                    .map(|v| v.as_str().map(str::to_string).ok_or_else(|| bad(v)))
                    .collect::<Result<_>>()?,
            )
        };

        let expected = tensor.element_count();
        if expected != data.len() {
            return Err(ServeError::serialization(format!(
                "tensor {} declares shape {:?} ({} elements) but holds {}",
                tensor.name,
                tensor.shape,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            name: tensor.name.clone(),
            shape: tensor.shape.clone(),
            data,
        })
    }
}
