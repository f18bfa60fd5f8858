//! BERT-family encoders with task heads, on candle's BERT implementation

use crate::utils::{batch_tensor, candle_err, input_ids_tensor, to_host_tensor};
use async_trait::async_trait;
use candle_core::{Device as CandleDevice, IndexOp, Module, Tensor};
use candle_nn::{LayerNorm, Linear, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig, HiddenAct};
use hfserve_interfaces::{HostTensor, InferenceBackend, TokenizedBatch};
use hfserve_types::{MLTask, RequestHeaders, Result, ServeError};
use tracing::{debug, info};

/// Task head on top of the encoder's last hidden state
enum EncoderHead {
    /// `cls.predictions`: transform + vocabulary projection
    MaskedLm {
        dense: Linear,
        layer_norm: LayerNorm,
        decoder: Linear,
    },
    /// Pooler (tanh over the first token) + classifier
    SequenceClassification { pooler: Linear, classifier: Linear },
    /// Per-token classifier
    TokenClassification { classifier: Linear },
    /// Raw states, pooled downstream
    HiddenStates,
}

/// In-process BERT encoder serving one encoder task
pub struct BertEncoder {
    model: BertModel,
    head: EncoderHead,
    config: BertConfig,
    device: CandleDevice,
    name: String,
}

impl BertEncoder {
    /// Build the encoder and the head `task` needs from a VarBuilder
    pub fn load(
        vb: VarBuilder,
        config: BertConfig,
        task: MLTask,
        num_labels: Option<usize>,
        name: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        info!(model = %name, task = %task, "Creating BERT encoder from weights");
        debug!(
            "BERT config: hidden={}, layers={}, heads={}",
            config.hidden_size, config.num_hidden_layers, config.num_attention_heads,
        );

        let device = vb.device().clone();
        let model = BertModel::load(vb.clone(), &config)
            .map_err(|e| ServeError::model(format!("Failed to create BERT model: {}", e)))?;
        let prefix = config.model_type.clone().unwrap_or_else(|| "bert".to_string());
        let head = load_head(&vb, &config, &prefix, task, num_labels)
            .map_err(|e| ServeError::model(format!("Failed to load {} head: {}", task, e)))?;

        Ok(Self {
            model,
            head,
            config,
            device,
            name,
        })
    }

    pub fn hidden_size(&self) -> usize {
        self.config.hidden_size
    }

    fn activation(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        match self.config.hidden_act {
            HiddenAct::Relu => xs.relu(),
            HiddenAct::GeluApproximate => xs.gelu(),
            _ => xs.gelu_erf(),
        }
    }

    /// Forward a batch through encoder and head, returning the task output
    pub fn run(&self, batch: &TokenizedBatch) -> Result<HostTensor> {
        if batch.batch_size() == 0 {
            return Err(ServeError::request_validation("Cannot run an empty batch"));
        }
        let input_ids = input_ids_tensor(batch, &self.device)?;
        let token_type_ids = batch_tensor(&batch.token_type_ids, batch.seq_len, &self.device)?;
        let attention_mask = batch_tensor(&batch.attention_mask, batch.seq_len, &self.device)?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(candle_err("BERT forward failed"))?;

        let (name, output) = match &self.head {
            EncoderHead::MaskedLm {
                dense,
                layer_norm,
                decoder,
            } => {
                let logits = dense
                    .forward(&hidden)
                    .and_then(|xs| self.activation(&xs))
                    .and_then(|xs| layer_norm.forward(&xs))
                    .and_then(|xs| decoder.forward(&xs))
                    .map_err(candle_err("Masked LM head failed"))?;
                ("logits", logits)
            }
            EncoderHead::SequenceClassification { pooler, classifier } => {
                let logits = hidden
                    .i((.., 0))
                    .and_then(|cls| pooler.forward(&cls))
                    .and_then(|pooled| pooled.tanh())
                    .and_then(|pooled| classifier.forward(&pooled))
                    .map_err(candle_err("Sequence classification head failed"))?;
                ("logits", logits)
            }
            EncoderHead::TokenClassification { classifier } => {
                let logits = classifier
                    .forward(&hidden)
                    .map_err(candle_err("Token classification head failed"))?;
                ("logits", logits)
            }
            EncoderHead::HiddenStates => ("last_hidden_state", hidden),
        };

        to_host_tensor(name, &output)
    }
}

fn load_head(
    vb: &VarBuilder,
    config: &BertConfig,
    prefix: &str,
    task: MLTask,
    num_labels: Option<usize>,
) -> candle_core::Result<EncoderHead> {
    let hidden = config.hidden_size;
    let labels = || {
        num_labels.ok_or_else(|| {
            candle_core::Error::Msg("config.json declares no labels (id2label/num_labels)".into())
        })
    };

    match task {
        MLTask::MaskedLanguageModeling => {
            let transform = vb.pp("cls.predictions.transform");
            let dense = candle_nn::linear(hidden, hidden, transform.pp("dense"))?;
            let layer_norm =
                candle_nn::layer_norm(hidden, config.layer_norm_eps, transform.pp("LayerNorm"))?;
            // Decoder weights are tied to the word embeddings
            let weight = vb
                .pp("cls.predictions.decoder")
                .get((config.vocab_size, hidden), "weight")
                .or_else(|_| {
                    vb.pp(prefix)
                        .pp("embeddings.word_embeddings")
                        .get((config.vocab_size, hidden), "weight")
                })?;
            let bias = vb.pp("cls.predictions").get(config.vocab_size, "bias")?;
            Ok(EncoderHead::MaskedLm {
                dense,
                layer_norm,
                decoder: Linear::new(weight, Some(bias)),
            })
        }
        MLTask::SequenceClassification => Ok(EncoderHead::SequenceClassification {
            pooler: candle_nn::linear(hidden, hidden, vb.pp(prefix).pp("pooler.dense"))?,
            classifier: candle_nn::linear(hidden, labels()?, vb.pp("classifier"))?,
        }),
        MLTask::TokenClassification => Ok(EncoderHead::TokenClassification {
            classifier: candle_nn::linear(hidden, labels()?, vb.pp("classifier"))?,
        }),
        MLTask::TextEmbedding => Ok(EncoderHead::HiddenStates),
        other => Err(candle_core::Error::Msg(format!(
            "{} is not an encoder task",
            other
        ))),
    }
}

#[async_trait]
impl InferenceBackend for BertEncoder {
    async fn forward(
        &self,
        batch: &TokenizedBatch,
        _headers: &RequestHeaders,
    ) -> Result<Vec<HostTensor>> {
        Ok(vec![self.run(batch)?])
    }

    fn name(&self) -> &str {
        &self.name
    }
}
