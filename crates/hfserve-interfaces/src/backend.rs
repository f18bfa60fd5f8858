//! Forward-pass backends for encoder models
//!
//! A backend is chosen once at load time: either an in-process model or a
//! remote predictor. Both return host tensors so postprocessing does not
//! know which one ran.

use crate::{HostTensor, TokenizedBatch};
use async_trait::async_trait;
use hfserve_types::{RequestHeaders, Result};

/// Produces task-head outputs for a tokenized batch
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Run the forward pass. The first returned tensor is the task output:
    /// `[batch, seq, vocab]` logits for mask fill, `[batch, classes]` for
    /// sequence classification, `[batch, seq, classes]` for token
    /// classification and `[batch, seq, hidden]` (or already pooled
    /// `[batch, hidden]`) states for embeddings.
    async fn forward(&self, batch: &TokenizedBatch, headers: &RequestHeaders)
        -> Result<Vec<HostTensor>>;

    /// Short description used in logs
    fn name(&self) -> &str;

    /// Whether the forward pass leaves the process
    fn is_remote(&self) -> bool {
        false
    }
}
