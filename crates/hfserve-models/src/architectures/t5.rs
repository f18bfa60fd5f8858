//! T5 encoder-decoder generation

use crate::utils::{candle_err, logits_to_vec, sequence_tensor};
use async_trait::async_trait;
use candle_core::{Device as CandleDevice, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::t5;
use hfserve_interfaces::{GenerationSession, TextGenerator};
use hfserve_types::{ArchitectureClass, RequestHeaders, Result, ServeError, TokenId};
use tracing::info;

/// T5 generator; sessions run on a clone of the model so each request
/// has its own decoder cache
pub struct T5Generator {
    model: t5::T5ForConditionalGeneration,
    decoder_start_token_id: u32,
    device: CandleDevice,
    name: String,
}

impl T5Generator {
    pub fn load(vb: VarBuilder, mut config: t5::Config, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        // Steps feed one decoder token at a time
        config.use_cache = true;
        info!(model = %name, "Creating T5 model from weights");
        let decoder_start_token_id = config
            .decoder_start_token_id
            .unwrap_or(config.pad_token_id) as u32;
        let device = vb.device().clone();
        let model = t5::T5ForConditionalGeneration::load(vb, &config)
            .map_err(|e| ServeError::model(format!("Failed to load T5 model: {}", e)))?;

        Ok(Self {
            model,
            decoder_start_token_id,
            device,
            name,
        })
    }
}

#[async_trait]
impl TextGenerator for T5Generator {
    async fn start(
        &self,
        prompt: &[TokenId],
        _headers: &RequestHeaders,
    ) -> Result<Box<dyn GenerationSession>> {
        let mut model = self.model.clone();
        model.clear_kv_cache();

        let input = sequence_tensor(prompt, &self.device)?;
        let encoder_output = model
            .encode(&input)
            .map_err(candle_err("T5 encoder failed"))?;

        Ok(Box::new(T5Session {
            model,
            encoder_output,
            device: self.device.clone(),
            next_input: TokenId::new(self.decoder_start_token_id),
            started: false,
        }))
    }

    fn architecture(&self) -> ArchitectureClass {
        ArchitectureClass::EncoderDecoder
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct T5Session {
    model: t5::T5ForConditionalGeneration,
    encoder_output: Tensor,
    device: CandleDevice,
    /// Decoder input for the next step; the KV cache holds the rest
    next_input: TokenId,
    started: bool,
}

#[async_trait]
impl GenerationSession for T5Session {
    async fn next_logits(&mut self, last: Option<TokenId>) -> Result<Vec<f32>> {
        if self.started {
            self.next_input = last.ok_or_else(|| {
                ServeError::internal("Decode step requires the previously sampled token")
            })?;
        }
        self.started = true;

        let decoder_input = sequence_tensor(&[self.next_input], &self.device)?;
        let logits = self
            .model
            .decode(&decoder_input, &self.encoder_output)
            .map_err(candle_err("T5 decoder failed"))?;
        logits_to_vec(&logits)
    }
}
