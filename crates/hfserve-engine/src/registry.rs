//! Loading models and owning their lifetime
//!
//! [`ServedModel::load`] turns a load config into a ready model: it
//! resolves files, fixes the task and builds either an encoder or a
//! generative front-end over a local or remote backend. The registry only
//! tracks loaded models by name; it holds no inference logic.

use hfserve_interfaces::{EncodeOptions, InferenceBackend, TextGenerator, Tokenizer};
use hfserve_models::{
    detect_pooling, GenerationConfig, HfModelConfig, LocalModelFactory, ModelFiles, TaskResolver,
};
use hfserve_tokenizer::{HuggingFaceTokenizer, TokenizerSettings};
use hfserve_types::{
    ArchitectureClass, BatchRequest, MLTask, ModelLoadConfig, PoolingStrategy, PredictionResult,
    RequestHeaders, Result, ServeError, TokenId,
};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::encoder::{EncoderCore, EncoderModel};
use crate::generative::{GenerativeCore, GenerativeModel};
use crate::postprocess::{Labels, TaskHandler};
use crate::remote::{RemoteBackend, RemoteGenerator, RemotePredictor};

/// Generation length when nothing else declares one
const DEFAULT_MAX_LENGTH: usize = 20;

/// A loaded model of either kind
pub enum ServedModel {
    Encoder(Arc<EncoderModel>),
    Generative(Arc<GenerativeModel>),
}

impl ServedModel {
    /// Load a model. Weights are only fetched when inference runs locally.
    pub fn load(config: &ModelLoadConfig) -> Result<Self> {
        config.validate()?;
        info!(model = %config.name, source = %config.model_id_or_path, "Loading model");

        let files = ModelFiles::resolve(config, config.predictor.is_none())?;
        let model_config = HfModelConfig::from_dir(&files.model_dir)?;
        let task = TaskResolver::resolve(config.task, &model_config)?;

        let settings = TokenizerSettings::default()
            .with_lower_case(config.tokenizer.do_lower_case)
            .with_chat_template(config.chat_template.clone())
            .with_model_type(model_config.model_type.clone())
            .with_revision(files.tokenizer_revision.clone());
        let tokenizer: Arc<dyn Tokenizer> =
            Arc::new(HuggingFaceTokenizer::from_dir(&files.tokenizer_dir, settings)?);

        let predictor = config
            .predictor
            .as_ref()
            .map(|p| RemotePredictor::new(p, &config.name, config.tensor_input_names.clone()))
            .transpose()?
            .map(Arc::new);

        let loader = Loader {
            config,
            files: &files,
            model_config: &model_config,
            tokenizer,
            predictor,
        };
        let model = if task.is_generative() {
            ServedModel::Generative(Arc::new(loader.generative(task)?))
        } else {
            ServedModel::Encoder(Arc::new(loader.encoder(task)?))
        };
        info!(
            model = %config.name,
            task = %task,
            remote = config.predictor.is_some(),
            "Model loaded"
        );
        Ok(model)
    }

    pub fn name(&self) -> &str {
        match self {
            ServedModel::Encoder(m) => m.name(),
            ServedModel::Generative(m) => m.name(),
        }
    }

    pub fn task(&self) -> MLTask {
        match self {
            ServedModel::Encoder(m) => m.task(),
            ServedModel::Generative(m) => m.task(),
        }
    }

    pub fn architecture(&self) -> ArchitectureClass {
        match self {
            ServedModel::Encoder(_) => ArchitectureClass::EncoderOnly,
            ServedModel::Generative(m) => m.architecture(),
        }
    }

    pub fn is_ready(&self) -> bool {
        match self {
            ServedModel::Encoder(m) => m.is_ready(),
            ServedModel::Generative(m) => m.is_ready(),
        }
    }

    pub fn stop(&self) -> bool {
        match self {
            ServedModel::Encoder(m) => m.stop(),
            ServedModel::Generative(m) => m.stop(),
        }
    }

    pub fn as_encoder(&self) -> Option<&Arc<EncoderModel>> {
        match self {
            ServedModel::Encoder(m) => Some(m),
            ServedModel::Generative(_) => None,
        }
    }

    pub fn as_generative(&self) -> Option<&Arc<GenerativeModel>> {
        match self {
            ServedModel::Generative(m) => Some(m),
            ServedModel::Encoder(_) => None,
        }
    }

    /// Batch predict against whichever kind this is
    pub async fn predict(
        &self,
        request: &BatchRequest,
        headers: &RequestHeaders,
    ) -> Result<PredictionResult> {
        match self {
            ServedModel::Encoder(m) => m.predict(request, headers).await,
            ServedModel::Generative(m) => m.predict(request, headers).await,
        }
    }
}

impl From<EncoderModel> for ServedModel {
    fn from(model: EncoderModel) -> Self {
        ServedModel::Encoder(Arc::new(model))
    }
}

impl From<GenerativeModel> for ServedModel {
    fn from(model: GenerativeModel) -> Self {
        ServedModel::Generative(Arc::new(model))
    }
}

/// Configured pooling, else the sentence-transformers module's, else mean
fn resolve_pooling(config: &ModelLoadConfig, model_dir: &Path) -> Result<PoolingStrategy> {
    match config.pooling {
        Some(pooling) => Ok(pooling),
        None => Ok(detect_pooling(model_dir)?.unwrap_or(PoolingStrategy::Mean)),
    }
}

/// Everything resolved before the model kind is known
struct Loader<'a> {
    config: &'a ModelLoadConfig,
    files: &'a ModelFiles,
    model_config: &'a HfModelConfig,
    tokenizer: Arc<dyn Tokenizer>,
    predictor: Option<Arc<RemotePredictor>>,
}

impl Loader<'_> {
    fn factory(&self) -> LocalModelFactory<'_> {
        LocalModelFactory::new(self.config, self.files, self.model_config)
    }

    fn encoder(self, task: MLTask) -> Result<EncoderModel> {
        let labels = self
            .model_config
            .label_count()
            .map(|n| self.model_config.labels(n))
            .unwrap_or_default();
        let pooling = resolve_pooling(self.config, &self.files.model_dir)?;
        let handler = TaskHandler::for_task(
            task,
            Labels::new(labels),
            self.config.ignore_labels.clone(),
            pooling,
        )?;

        let backend: Arc<dyn InferenceBackend> = match &self.predictor {
            Some(predictor) => Arc::new(RemoteBackend::new(Arc::clone(predictor))),
            None => self.factory().encoder(task)?,
        };

        // An explicit max length wins; otherwise the tighter of the
        // tokenizer's and the position embeddings' limits
        let max_length = self.config.max_length.or_else(|| {
            [
                self.tokenizer.model_max_length(),
                self.model_config.max_sequence_length(),
            ]
            .into_iter()
            .flatten()
            .min()
        });
        debug!(?max_length, ?pooling, backend = backend.name(), "Encoder configured");

        let core = EncoderCore::new(
            self.config.name.clone(),
            Arc::clone(&self.tokenizer),
            backend,
            handler,
        )
        .with_encode_options(EncodeOptions {
            add_special_tokens: self.config.tokenizer.add_special_tokens,
            max_length,
        });
        Ok(EncoderModel::new(core))
    }

    fn generative(self, task: MLTask) -> Result<GenerativeModel> {
        let generation_config = GenerationConfig::from_dir(&self.files.model_dir)?;
        let class = self.model_config.architecture_class(task);

        let generator: Arc<dyn TextGenerator> = match &self.predictor {
            Some(predictor) => {
                let decoder_start = self
                    .model_config
                    .decoder_start_token_id
                    .or(generation_config.decoder_start_token_id)
                    .or(self.model_config.pad_token_id)
                    .unwrap_or(0);
                Arc::new(RemoteGenerator::new(
                    Arc::clone(predictor),
                    class,
                    TokenId::new(decoder_start),
                ))
            }
            None => self.factory().generator(class)?,
        };
        if generator.architecture() != class {
            return Err(ServeError::internal(format!(
                "Generator is {} but the model config declares {}",
                generator.architecture(),
                class
            )));
        }

        let mut eos: Vec<TokenId> = generation_config
            .eos_token_ids()
            .into_iter()
            .chain(self.model_config.eos_token_ids())
            .map(TokenId::new)
            .collect();
        if eos.is_empty() {
            eos.extend(self.tokenizer.special_tokens().eos_token);
        }
        eos.sort();
        eos.dedup();

        let max_length = self
            .config
            .max_length
            .or(generation_config.max_length)
            .or(self.model_config.max_length)
            .unwrap_or(DEFAULT_MAX_LENGTH);
        debug!(%class, max_length, eos = ?eos, "Generator configured");

        let core = GenerativeCore::new(
            self.config.name.clone(),
            task,
            Arc::clone(&self.tokenizer),
            generator,
            eos,
        )
        .with_max_length(max_length)
        .with_add_special_tokens(self.config.tokenizer.add_special_tokens);
        Ok(GenerativeModel::new(core))
    }
}

static GLOBAL: Lazy<ModelRegistry> = Lazy::new(ModelRegistry::new);

/// Loaded models by name
#[derive(Default)]
pub struct ModelRegistry {
    models: RwLock<HashMap<String, Arc<ServedModel>>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry
    pub fn global() -> &'static ModelRegistry {
        &GLOBAL
    }

    /// Add an already loaded model
    pub fn register(&self, model: impl Into<ServedModel>) -> Result<Arc<ServedModel>> {
        let model = Arc::new(model.into());
        let mut models = self.models.write();
        if models.contains_key(model.name()) {
            return Err(ServeError::config(format!(
                "Model {} is already registered",
                model.name()
            )));
        }
        models.insert(model.name().to_string(), Arc::clone(&model));
        info!(model = %model.name(), task = %model.task(), "Model registered");
        Ok(model)
    }

    /// Load and register a model
    pub fn load(&self, config: &ModelLoadConfig) -> Result<Arc<ServedModel>> {
        if self.models.read().contains_key(&config.name) {
            return Err(ServeError::config(format!(
                "Model {} is already registered",
                config.name
            )));
        }
        self.register(ServedModel::load(config)?)
    }

    pub fn get(&self, name: &str) -> Result<Arc<ServedModel>> {
        self.models
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ServeError::not_found(format!("Model {} is not loaded", name)))
    }

    /// Names of the registered models, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Remove a model and stop it. Requests holding it finish; new ones
    /// fail with `ModelNotReady`.
    pub fn unload(&self, name: &str) -> Result<()> {
        let model = self
            .models
            .write()
            .remove(name)
            .ok_or_else(|| ServeError::not_found(format!("Model {} is not loaded", name)))?;
        model.stop();
        info!(model = %name, "Model unloaded");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.read().is_empty()
    }
}
