//! HuggingFace `config.json` / `generation_config.json` parsing
//!
//! Only the fields the serving pipeline needs are typed; the raw JSON is
//! kept so architecture-specific configs (candle's BERT, Llama, T5
//! configs) can be deserialized from the same file.

use hfserve_types::{ArchitectureClass, MLTask, Result, ServeError};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Typed view of a model's `config.json`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HfModelConfig {
    pub architectures: Option<Vec<String>>,
    pub model_type: Option<String>,
    /// Class id (as a string key) to label
    pub id2label: Option<HashMap<String, String>>,
    pub num_labels: Option<usize>,
    pub is_encoder_decoder: Option<bool>,
    pub max_position_embeddings: Option<usize>,
    /// GPT-2 style name for the context length
    pub n_positions: Option<usize>,
    pub max_length: Option<usize>,
    pub vocab_size: Option<usize>,
    pub hidden_size: Option<usize>,
    pub pad_token_id: Option<u32>,
    pub bos_token_id: Option<u32>,
    eos_token_id: Option<Value>,
    pub decoder_start_token_id: Option<u32>,
    pub torch_dtype: Option<String>,
    #[serde(skip)]
    raw: Value,
}

impl HfModelConfig {
    /// Load `config.json` from a model directory
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::from_file(dir.as_ref().join("config.json"))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading model config from: {:?}", path);
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServeError::model(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let raw: Value = serde_json::from_str(content)
            .map_err(|e| ServeError::model(format!("Failed to parse config.json: {}", e)))?;
        let mut config: HfModelConfig = serde_json::from_value(raw.clone())
            .map_err(|e| ServeError::model(format!("Invalid config.json: {}", e)))?;
        config.raw = raw;
        Ok(config)
    }

    /// Re-read the whole file as an architecture-specific config
    pub fn parse_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.raw.clone()).map_err(|e| {
            ServeError::model(format!(
                "config.json does not match the {} config layout: {}",
                self.model_type.as_deref().unwrap_or("model"),
                e
            ))
        })
    }

    /// First declared architecture, e.g. `BertForMaskedLM`
    pub fn architecture(&self) -> Option<&str> {
        self.architectures
            .as_ref()
            .and_then(|a| a.first())
            .map(String::as_str)
    }

    /// Maximum sequence length the position embeddings allow
    pub fn max_sequence_length(&self) -> Option<usize> {
        self.max_position_embeddings.or(self.n_positions)
    }

    /// `eos_token_id` may be a single id or a list
    pub fn eos_token_ids(&self) -> Vec<u32> {
        token_ids(self.eos_token_id.as_ref())
    }

    /// Number of classification labels
    pub fn label_count(&self) -> Option<usize> {
        self.id2label
            .as_ref()
            .map(HashMap::len)
            .filter(|n| *n > 0)
            .or(self.num_labels)
    }

    /// Label of class `id`, `LABEL_{id}` when the config declares none
    pub fn label(&self, id: usize) -> String {
        self.id2label
            .as_ref()
            .and_then(|labels| labels.get(&id.to_string()))
            .cloned()
            .unwrap_or_else(|| format!("LABEL_{}", id))
    }

    /// All labels ordered by class id
    pub fn labels(&self, count: usize) -> Vec<String> {
        (0..count).map(|id| self.label(id)).collect()
    }

    /// Architecture class of a model serving `task`
    pub fn architecture_class(&self, task: MLTask) -> ArchitectureClass {
        match task {
            MLTask::Text2textGeneration => ArchitectureClass::EncoderDecoder,
            MLTask::TextGeneration if self.is_encoder_decoder == Some(true) => {
                ArchitectureClass::EncoderDecoder
            }
            MLTask::TextGeneration => ArchitectureClass::DecoderOnly,
            _ => ArchitectureClass::EncoderOnly,
        }
    }
}

/// `generation_config.json`, optional next to `config.json`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_length: Option<usize>,
    pub max_new_tokens: Option<usize>,
    pub decoder_start_token_id: Option<u32>,
    pub pad_token_id: Option<u32>,
    eos_token_id: Option<Value>,
}

impl GenerationConfig {
    /// Load from a model directory; absent file yields the default
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let path = dir.as_ref().join("generation_config.json");
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| {
            ServeError::model(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            ServeError::model(format!("Invalid generation_config.json: {}", e))
        })
    }

    pub fn eos_token_ids(&self) -> Vec<u32> {
        token_ids(self.eos_token_id.as_ref())
    }
}

fn token_ids(value: Option<&Value>) -> Vec<u32> {
    match value {
        Some(Value::Number(n)) => n.as_u64().map(|id| vec![id as u32]).unwrap_or_default(),
        Some(Value::Array(ids)) => ids
            .iter()
            .filter_map(Value::as_u64)
            .map(|id| id as u32)
            .collect(),
        _ => Vec::new(),
    }
}
