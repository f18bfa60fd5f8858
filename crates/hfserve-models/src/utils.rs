//! Conversions between tokenized batches, candle tensors and host tensors

use candle_core::{DType, Device, Tensor};
use hfserve_interfaces::{HostTensor, TokenizedBatch};
use hfserve_types::{Result, ServeError, TokenId};

/// Map a candle error into an inference error with context
pub(crate) fn candle_err(context: &'static str) -> impl Fn(candle_core::Error) -> ServeError {
    move |e| ServeError::inference(format!("{}: {}", context, e))
}

/// `[batch, seq_len]` u32 tensor from per-row values
pub fn batch_tensor(rows: &[Vec<u32>], seq_len: usize, device: &Device) -> Result<Tensor> {
    let flat: Vec<u32> = rows.iter().flatten().copied().collect();
    Tensor::from_vec(flat, (rows.len(), seq_len), device).map_err(candle_err("Failed to build input tensor"))
}

/// Input ids of a tokenized batch as a `[batch, seq_len]` tensor
pub fn input_ids_tensor(batch: &TokenizedBatch, device: &Device) -> Result<Tensor> {
    let rows: Vec<Vec<u32>> = batch
        .input_ids
        .iter()
        .map(|row| row.iter().map(|t| t.get()).collect())
        .collect();
    batch_tensor(&rows, batch.seq_len, device)
}

/// `[1, len]` tensor for a single token sequence
pub fn sequence_tensor(tokens: &[TokenId], device: &Device) -> Result<Tensor> {
    let ids: Vec<u32> = tokens.iter().map(|t| t.get()).collect();
    Tensor::new(ids.as_slice(), device)
        .and_then(|t| t.unsqueeze(0))
        .map_err(candle_err("Failed to build sequence tensor"))
}

/// Copy a candle tensor to the host as f32
pub fn to_host_tensor(name: &str, tensor: &Tensor) -> Result<HostTensor> {
    let shape = tensor.dims().to_vec();
    let data = tensor
        .to_dtype(DType::F32)
        .and_then(|t| t.flatten_all())
        .and_then(|t| t.to_vec1::<f32>())
        .map_err(candle_err("Failed to copy tensor to host"))?;
    HostTensor::f32(name, shape, data)
}

/// Logits row `[vocab]` (or `[1, vocab]`) as a host vector
pub fn logits_to_vec(logits: &Tensor) -> Result<Vec<f32>> {
    logits
        .to_dtype(DType::F32)
        .and_then(|t| t.flatten_all())
        .and_then(|t| t.to_vec1::<f32>())
        .map_err(candle_err("Failed to read logits"))
}
