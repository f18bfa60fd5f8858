//! Remote predictor over the v2 tensor protocol
//!
//! The predictor stands in for the local forward pass. Encoder models send
//! the tokenized batch once; generators send the running sequence on every
//! step and read the logits of the last position.

use async_trait::async_trait;
use hfserve_interfaces::{
    GenerationSession, HostTensor, InferenceBackend, TextGenerator, TokenizedBatch,
};
use hfserve_types::v2::{InferErrorBody, InferRequest, InferResponse};
use hfserve_types::{
    ArchitectureClass, PredictorConfig, PredictorProtocol, RequestHeaders, Result, ServeError,
    TokenId,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Headers owned by the transport, never forwarded
const HOP_HEADERS: &[&str] = &["host", "content-length", "content-type"];

/// Client for one model on a v2 predictor
#[derive(Debug, Clone)]
pub struct RemotePredictor {
    client: reqwest::Client,
    endpoint: String,
    input_names: Option<Vec<String>>,
}

impl RemotePredictor {
    /// Client for `model_name` on the configured predictor. With
    /// `input_names` only those tensors are sent.
    pub fn new(
        config: &PredictorConfig,
        model_name: &str,
        input_names: Option<Vec<String>>,
    ) -> Result<Self> {
        config.validate()?;
        match config.protocol {
            PredictorProtocol::V2 => {}
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ServeError::network(format!("Failed to build HTTP client: {}", e)))?;
        let endpoint = config.infer_url(model_name);
        debug!(endpoint = %endpoint, "Remote predictor configured");
        Ok(Self {
            client,
            endpoint,
            input_names,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn error(&self, message: impl Into<String>) -> ServeError {
        ServeError::remote_predictor(&self.endpoint, message)
    }

    fn forwarded_headers(&self, headers: &RequestHeaders) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            if HOP_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
                continue;
            }
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    map.insert(name, value);
                }
                _ => warn!(header = %name, "Dropping header that is not valid HTTP"),
            }
        }
        map
    }

    /// Send `inputs`, return the decoded outputs in response order
    #[instrument(skip_all, fields(endpoint = %self.endpoint))]
    pub async fn infer(
        &self,
        inputs: Vec<HostTensor>,
        headers: &RequestHeaders,
    ) -> Result<Vec<HostTensor>> {
        let inputs: Vec<HostTensor> = match &self.input_names {
            Some(names) => inputs
                .into_iter()
                .filter(|t| names.iter().any(|n| *n == t.name))
                .collect(),
            None => inputs,
        };
        if inputs.is_empty() {
            return Err(self.error("No input tensors left to send after name filtering"));
        }

        let body = InferRequest {
            id: Some(uuid::Uuid::new_v4().to_string()),
            inputs: inputs.iter().map(HostTensor::to_infer_tensor).collect(),
            parameters: None,
        };
        debug!(inputs = body.inputs.len(), "Sending inference request");

        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.forwarded_headers(headers))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.error(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<InferErrorBody>(&text)
                .map(|b| b.error)
                .unwrap_or(text);
            return Err(self.error(format!("Predictor returned {}: {}", status, message)));
        }

        let response: InferResponse = response
            .json()
            .await
            .map_err(|e| self.error(format!("Invalid inference response: {}", e)))?;
        if response.outputs.is_empty() {
            return Err(self.error("Inference response has no outputs"));
        }
        response
            .outputs
            .iter()
            .map(|t| HostTensor::from_infer_tensor(t).map_err(|e| self.error(e.to_string())))
            .collect()
    }
}

/// Encoder backend that runs the forward pass on the predictor
pub struct RemoteBackend {
    predictor: Arc<RemotePredictor>,
}

impl RemoteBackend {
    pub fn new(predictor: Arc<RemotePredictor>) -> Self {
        Self { predictor }
    }
}

#[async_trait]
impl InferenceBackend for RemoteBackend {
    async fn forward(
        &self,
        batch: &TokenizedBatch,
        headers: &RequestHeaders,
    ) -> Result<Vec<HostTensor>> {
        self.predictor.infer(batch.to_host_tensors()?, headers).await
    }

    fn name(&self) -> &str {
        self.predictor.endpoint()
    }

    fn is_remote(&self) -> bool {
        true
    }
}

/// Text generator that asks the predictor for every step's logits
pub struct RemoteGenerator {
    predictor: Arc<RemotePredictor>,
    architecture: ArchitectureClass,
    decoder_start: TokenId,
}

impl RemoteGenerator {
    /// `decoder_start` seeds the decoder of encoder-decoder models and is
    /// ignored otherwise
    pub fn new(
        predictor: Arc<RemotePredictor>,
        architecture: ArchitectureClass,
        decoder_start: TokenId,
    ) -> Self {
        Self {
            predictor,
            architecture,
            decoder_start,
        }
    }
}

#[async_trait]
impl TextGenerator for RemoteGenerator {
    async fn start(
        &self,
        prompt: &[TokenId],
        headers: &RequestHeaders,
    ) -> Result<Box<dyn GenerationSession>> {
        let decoder = match self.architecture {
            ArchitectureClass::EncoderDecoder => Some(vec![self.decoder_start]),
            _ => None,
        };
        Ok(Box::new(RemoteSession {
            predictor: Arc::clone(&self.predictor),
            input_ids: prompt.to_vec(),
            decoder_ids: decoder,
            headers: headers.clone(),
        }))
    }

    fn architecture(&self) -> ArchitectureClass {
        self.architecture
    }

    fn name(&self) -> &str {
        self.predictor.endpoint()
    }
}

struct RemoteSession {
    predictor: Arc<RemotePredictor>,
    input_ids: Vec<TokenId>,
    /// Decoder sequence of encoder-decoder models
    decoder_ids: Option<Vec<TokenId>>,
    headers: RequestHeaders,
}

fn sequence_tensor(name: &str, tokens: &[TokenId]) -> Result<HostTensor> {
    HostTensor::i64(
        name,
        vec![1, tokens.len()],
        tokens.iter().map(|t| t.get() as i64).collect(),
    )
}

/// Logits of the last position from `[1, seq, vocab]` or `[1, vocab]`
fn last_position(output: &HostTensor) -> Result<Vec<f32>> {
    let values = output.to_f32_vec()?;
    match output.shape.as_slice() {
        [1, vocab] => Ok(values),
        [1, seq, vocab] if *seq > 0 => Ok(values[(seq - 1) * vocab..].to_vec()),
        shape => Err(ServeError::inference(format!(
            "Output {} has shape {:?}, expected [1, seq, vocab] logits",
            output.name, shape
        ))),
    }
}

#[async_trait]
impl GenerationSession for RemoteSession {
    async fn next_logits(&mut self, last: Option<TokenId>) -> Result<Vec<f32>> {
        let inputs = match &mut self.decoder_ids {
            Some(decoder_ids) => {
                decoder_ids.extend(last);
                vec![
                    sequence_tensor("input_ids", &self.input_ids)?,
                    HostTensor::i64(
                        "attention_mask",
                        vec![1, self.input_ids.len()],
                        vec![1; self.input_ids.len()],
                    )?,
                    sequence_tensor("decoder_input_ids", decoder_ids)?,
                ]
            }
            None => {
                self.input_ids.extend(last);
                vec![
                    sequence_tensor("input_ids", &self.input_ids)?,
                    HostTensor::i64(
                        "attention_mask",
                        vec![1, self.input_ids.len()],
                        vec![1; self.input_ids.len()],
                    )?,
                ]
            }
        };
        let outputs = self.predictor.infer(inputs, &self.headers).await?;
        let logits = outputs
            .first()
            .ok_or_else(|| ServeError::inference("Predictor returned no logits"))?;
        last_position(logits)
    }
}
