//! Model load configuration

use crate::{Device, MLTask, Result, ServeError, WeightDType};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Everything needed to load and serve one model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelLoadConfig {
    /// Name the model is served under; completion requests must match it
    pub name: String,
    /// Hub model id or local directory
    pub model_id_or_path: String,
    /// Weight revision (branch, tag or commit)
    pub model_revision: Option<String>,
    /// Tokenizer revision, independent of the weight revision
    pub tokenizer_revision: Option<String>,
    /// Explicit task; wins over inference from the architecture
    pub task: Option<MLTask>,
    /// Tokenizer options
    pub tokenizer: TokenizerOptions,
    /// Override of the model's maximum sequence length
    pub max_length: Option<usize>,
    /// Local weight precision
    pub dtype: WeightDType,
    /// Local device
    pub device: Device,
    /// Remote predictor; when set the forward pass is delegated to it
    pub predictor: Option<PredictorConfig>,
    /// Restrict which tokenizer outputs are sent as tensors (remote only)
    pub tensor_input_names: Option<Vec<String>>,
    /// Embedding pooling override
    pub pooling: Option<PoolingStrategy>,
    /// Chat template override, by name (`chatml`, `llama2`, `zephyr`) or inline template
    pub chat_template: Option<String>,
    /// Token classification labels dropped from the output
    pub ignore_labels: Vec<String>,
}

impl Default for ModelLoadConfig {
    fn default() -> Self {
        Self {
            name: "model".to_string(),
            model_id_or_path: String::new(),
            model_revision: None,
            tokenizer_revision: None,
            task: None,
            tokenizer: TokenizerOptions::default(),
            max_length: None,
            dtype: WeightDType::default(),
            device: Device::default(),
            predictor: None,
            tensor_input_names: None,
            pooling: None,
            chat_template: None,
            ignore_labels: vec!["O".to_string()],
        }
    }
}

impl ModelLoadConfig {
    /// Create a config serving `model_id_or_path` under `name`
    pub fn new(name: impl Into<String>, model_id_or_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model_id_or_path: model_id_or_path.into(),
            ..Default::default()
        }
    }

    pub fn with_task(mut self, task: MLTask) -> Self {
        self.task = Some(task);
        self
    }

    pub fn with_model_revision(mut self, revision: impl Into<String>) -> Self {
        self.model_revision = Some(revision.into());
        self
    }

    pub fn with_tokenizer_revision(mut self, revision: impl Into<String>) -> Self {
        self.tokenizer_revision = Some(revision.into());
        self
    }

    pub fn with_tokenizer_options(mut self, options: TokenizerOptions) -> Self {
        self.tokenizer = options;
        self
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn with_dtype(mut self, dtype: WeightDType) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn with_predictor(mut self, predictor: PredictorConfig) -> Self {
        self.predictor = Some(predictor);
        self
    }

    pub fn with_tensor_input_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tensor_input_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_pooling(mut self, pooling: PoolingStrategy) -> Self {
        self.pooling = Some(pooling);
        self
    }

    pub fn with_chat_template(mut self, template: impl Into<String>) -> Self {
        self.chat_template = Some(template.into());
        self
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("HFSERVE_MODEL_NAME") {
            config.name = name;
        }
        if let Ok(model) = std::env::var("HFSERVE_MODEL_ID") {
            config.model_id_or_path = model;
        }
        if let Ok(revision) = std::env::var("HFSERVE_MODEL_REVISION") {
            config.model_revision = Some(revision);
        }
        if let Ok(revision) = std::env::var("HFSERVE_TOKENIZER_REVISION") {
            config.tokenizer_revision = Some(revision);
        }
        if let Ok(task) = std::env::var("HFSERVE_TASK") {
            config.task = Some(MLTask::from_str(&task)?);
        }
        if let Ok(lower) = std::env::var("HFSERVE_DO_LOWER_CASE") {
            config.tokenizer.do_lower_case = Some(
                lower
                    .parse()
                    .map_err(|_| ServeError::config("Invalid do_lower_case flag"))?,
            );
        }
        if let Ok(add) = std::env::var("HFSERVE_ADD_SPECIAL_TOKENS") {
            config.tokenizer.add_special_tokens = add
                .parse()
                .map_err(|_| ServeError::config("Invalid add_special_tokens flag"))?;
        }
        if let Ok(max_length) = std::env::var("HFSERVE_MAX_LENGTH") {
            config.max_length = Some(
                max_length
                    .parse()
                    .map_err(|_| ServeError::config("Invalid max length"))?,
            );
        }
        if let Ok(device) = std::env::var("HFSERVE_DEVICE") {
            config.device = Device::from_str(&device)?;
        }
        if let Ok(dtype) = std::env::var("HFSERVE_DTYPE") {
            config.dtype = WeightDType::from_str(&dtype)?;
        }
        if let Ok(host) = std::env::var("HFSERVE_PREDICTOR_HOST") {
            let mut predictor = PredictorConfig::new(host);
            if let Ok(protocol) = std::env::var("HFSERVE_PREDICTOR_PROTOCOL") {
                predictor.protocol = PredictorProtocol::from_str(&protocol)?;
            }
            if let Ok(use_ssl) = std::env::var("HFSERVE_PREDICTOR_USE_SSL") {
                predictor.use_ssl = use_ssl
                    .parse()
                    .map_err(|_| ServeError::config("Invalid predictor use_ssl flag"))?;
            }
            if let Ok(timeout) = std::env::var("HFSERVE_PREDICTOR_TIMEOUT_SECS") {
                predictor.request_timeout_secs = timeout
                    .parse()
                    .map_err(|_| ServeError::config("Invalid predictor timeout"))?;
            }
            config.predictor = Some(predictor);
        }
        if let Ok(names) = std::env::var("HFSERVE_TENSOR_INPUT_NAMES") {
            config.tensor_input_names = Some(
                names
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            );
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServeError::config(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ServeError::config(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ServeError::config("Model name cannot be empty"));
        }
        if self.model_id_or_path.trim().is_empty() {
            return Err(ServeError::config("Model id or path cannot be empty"));
        }
        if self.max_length == Some(0) {
            return Err(ServeError::config("Max length must be greater than 0"));
        }
        if let Some(predictor) = &self.predictor {
            predictor.validate()?;
        }
        if let Some(names) = &self.tensor_input_names {
            if names.is_empty() {
                return Err(ServeError::config(
                    "tensor_input_names must name at least one input",
                ));
            }
        }
        Ok(())
    }
}

/// Tokenizer behaviour fixed at load time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerOptions {
    /// Lower-case input text; `None` defers to the tokenizer's own config
    pub do_lower_case: Option<bool>,
    /// Add model-specific special tokens (`[CLS]`, `[SEP]`, BOS...)
    pub add_special_tokens: bool,
}

impl Default for TokenizerOptions {
    fn default() -> Self {
        Self {
            do_lower_case: None,
            add_special_tokens: true,
        }
    }
}

/// Remote predictor connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// `host[:port]` of the predictor
    pub host: String,
    /// Wire protocol
    pub protocol: PredictorProtocol,
    /// Use https instead of http
    pub use_ssl: bool,
    /// Per-request timeout
    pub request_timeout_secs: u64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            protocol: PredictorProtocol::V2,
            use_ssl: false,
            request_timeout_secs: 600,
        }
    }
}

impl PredictorConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    pub fn with_ssl(mut self, use_ssl: bool) -> Self {
        self.use_ssl = use_ssl;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Inference endpoint for `model_name`
    pub fn infer_url(&self, model_name: &str) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!(
            "{}://{}/v2/models/{}/infer",
            scheme,
            self.host.trim_end_matches('/'),
            model_name
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ServeError::config("Predictor host cannot be empty"));
        }
        if self.host.contains("://") {
            return Err(ServeError::config(
                "Predictor host must not include a scheme; use use_ssl instead",
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ServeError::config(
                "Predictor request timeout must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Remote predictor wire protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PredictorProtocol {
    /// Open inference protocol v2 over REST/JSON
    #[default]
    #[serde(rename = "v2")]
    V2,
}

impl FromStr for PredictorProtocol {
    type Err = ServeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v2" => Ok(PredictorProtocol::V2),
            other => Err(ServeError::config(format!(
                "Predictor protocol must be v2 (got {})",
                other
            ))),
        }
    }
}

/// How token states are reduced to a sentence embedding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PoolingStrategy {
    /// Attention-mask weighted mean over tokens
    #[default]
    Mean,
    /// First token state
    Cls,
}
