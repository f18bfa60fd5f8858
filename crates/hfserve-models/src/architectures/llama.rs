//! Llama decoder-only generation using Candle's built-in implementation

use crate::utils::{candle_err, logits_to_vec, sequence_tensor};
use async_trait::async_trait;
use candle_core::{DType, Device as CandleDevice};
use candle_nn::VarBuilder;
use candle_transformers::models::llama as candle_llama;
use hfserve_interfaces::{GenerationSession, TextGenerator};
use hfserve_types::{ArchitectureClass, RequestHeaders, Result, ServeError, TokenId};
use std::sync::Arc;
use tracing::{debug, info};

/// Llama generator; each session owns its own KV cache
pub struct LlamaGenerator {
    model: Arc<candle_llama::Llama>,
    config: candle_llama::Config,
    device: CandleDevice,
    dtype: DType,
    name: String,
}

impl LlamaGenerator {
    /// Create from VarBuilder and the `config.json` layout
    pub fn load(
        vb: VarBuilder,
        config: candle_llama::LlamaConfig,
        dtype: DType,
        name: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        info!(model = %name, "Creating Llama model from weights");
        let config = config.into_config(false);
        debug!(
            "Llama config: hidden={}, layers={}, heads={}, kv_heads={}",
            config.hidden_size,
            config.num_hidden_layers,
            config.num_attention_heads,
            config.num_key_value_heads
        );

        let device = vb.device().clone();
        let model = candle_llama::Llama::load(vb, &config)
            .map_err(|e| ServeError::model(format!("Failed to load Llama model: {}", e)))?;

        Ok(Self {
            model: Arc::new(model),
            config,
            device,
            dtype,
            name,
        })
    }

    pub fn max_position_embeddings(&self) -> usize {
        self.config.max_position_embeddings
    }
}

#[async_trait]
impl TextGenerator for LlamaGenerator {
    async fn start(
        &self,
        prompt: &[TokenId],
        _headers: &RequestHeaders,
    ) -> Result<Box<dyn GenerationSession>> {
        if prompt.is_empty() {
            return Err(ServeError::request_validation("Prompt encodes to no tokens"));
        }
        // Fresh cache per request
        let cache = candle_llama::Cache::new(true, self.dtype, &self.config, &self.device)
            .map_err(|e| ServeError::model(format!("Failed to create cache: {}", e)))?;
        Ok(Box::new(LlamaSession {
            model: Arc::clone(&self.model),
            cache,
            device: self.device.clone(),
            prompt: prompt.to_vec(),
            index_pos: 0,
        }))
    }

    fn architecture(&self) -> ArchitectureClass {
        ArchitectureClass::DecoderOnly
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct LlamaSession {
    model: Arc<candle_llama::Llama>,
    cache: candle_llama::Cache,
    device: CandleDevice,
    /// Consumed by the first (prefill) step
    prompt: Vec<TokenId>,
    index_pos: usize,
}

#[async_trait]
impl GenerationSession for LlamaSession {
    async fn next_logits(&mut self, last: Option<TokenId>) -> Result<Vec<f32>> {
        let step_tokens = match last {
            _ if self.index_pos == 0 => std::mem::take(&mut self.prompt),
            Some(token) => vec![token],
            None => {
                return Err(ServeError::internal(
                    "Decode step requires the previously sampled token",
                ))
            }
        };

        let input = sequence_tensor(&step_tokens, &self.device)?;
        let logits = self
            .model
            .forward(&input, self.index_pos, &mut self.cache)
            .map_err(candle_err("Llama forward failed"))?;
        self.index_pos += step_tokens.len();
        logits_to_vec(&logits)
    }
}
