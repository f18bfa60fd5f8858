//! Batch requests, generation outputs and stream chunks

use crate::{ids::*, ChatMessage, FinishReason, TokenId, TokenUsage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Request headers forwarded to a remote predictor
pub type RequestHeaders = HashMap<String, String>;

/// One unit of batch input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Instance {
    Text(String),
    Messages(Vec<ChatMessage>),
}

impl Instance {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Instance::Text(text) => Some(text),
            Instance::Messages(_) => None,
        }
    }
}

impl From<&str> for Instance {
    fn from(value: &str) -> Self {
        Instance::Text(value.to_string())
    }
}

impl From<String> for Instance {
    fn from(value: String) -> Self {
        Instance::Text(value)
    }
}

/// `{"instances": [...]}` request body. Order is the only correlation key
/// between instances and predictions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub id: RequestId,
    pub instances: Vec<Instance>,
}

impl BatchRequest {
    pub fn new<I, T>(instances: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Instance>,
    {
        Self {
            id: RequestId::new(),
            instances: instances.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// Result of a full (non-streamed) generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutput {
    /// Generated text, stop sequence excluded
    pub text: String,
    /// Generated token IDs
    pub tokens: Vec<TokenId>,
    /// Reason for completion
    pub finish_reason: FinishReason,
    /// Token usage statistics
    pub usage: TokenUsage,
}

/// Streaming generation chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Request ID this chunk corresponds to
    pub request_id: RequestId,
    /// Position of this chunk in the stream
    pub index: usize,
    /// Text delta for this chunk
    pub text: String,
    /// Tokens whose text became visible with this chunk
    pub tokens: Vec<TokenId>,
    /// Set on the final chunk only
    pub finish_reason: Option<FinishReason>,
    /// Token usage (final chunk only)
    pub usage: Option<TokenUsage>,
    /// Chunk creation timestamp
    pub created_at: DateTime<Utc>,
}

impl StreamChunk {
    pub fn delta(request_id: RequestId, index: usize, text: String, tokens: Vec<TokenId>) -> Self {
        Self {
            request_id,
            index,
            text,
            tokens,
            finish_reason: None,
            usage: None,
            created_at: Utc::now(),
        }
    }

    pub fn finish(
        request_id: RequestId,
        index: usize,
        text: String,
        reason: FinishReason,
        usage: TokenUsage,
    ) -> Self {
        Self {
            request_id,
            index,
            text,
            tokens: vec![],
            finish_reason: Some(reason),
            usage: Some(usage),
            created_at: Utc::now(),
        }
    }

    pub fn is_final(&self) -> bool {
        self.finish_reason.is_some()
    }
}
