//! Builds in-process backends for a resolved model

use crate::architectures::{BertEncoder, LlamaGenerator, T5Generator};
use crate::config::HfModelConfig;
use crate::source::ModelFiles;
use crate::weights::{candle_device, candle_dtype, SafeTensorsLoader};
use candle_core::DType;
use candle_nn::VarBuilder;
use hfserve_interfaces::{InferenceBackend, TextGenerator};
use hfserve_types::{ArchitectureClass, MLTask, ModelLoadConfig, Result, ServeError};
use std::sync::Arc;
use tracing::info;

/// Creates local encoder backends and text generators on candle
pub struct LocalModelFactory<'a> {
    load_config: &'a ModelLoadConfig,
    files: &'a ModelFiles,
    model_config: &'a HfModelConfig,
}

impl<'a> LocalModelFactory<'a> {
    pub fn new(
        load_config: &'a ModelLoadConfig,
        files: &'a ModelFiles,
        model_config: &'a HfModelConfig,
    ) -> Self {
        Self {
            load_config,
            files,
            model_config,
        }
    }

    fn model_type(&self) -> &str {
        self.model_config.model_type.as_deref().unwrap_or("unknown")
    }

    fn unsupported(&self, what: &str) -> ServeError {
        ServeError::model(format!(
            "Local {} is not supported for model_type '{}'; configure a remote predictor",
            what,
            self.model_type()
        ))
    }

    fn varbuilder(&self) -> Result<(VarBuilder<'static>, DType)> {
        let device = candle_device(&self.load_config.device)?;
        let dtype = candle_dtype(
            self.load_config.dtype,
            self.model_config.torch_dtype.as_deref(),
            &device,
        );
        let vb = SafeTensorsLoader::new(&self.files.model_dir).load_varbuilder(&device, dtype)?;
        Ok((vb, dtype))
    }

    /// Encoder backend serving `task`
    pub fn encoder(&self, task: MLTask) -> Result<Arc<dyn InferenceBackend>> {
        match self.model_type() {
            "bert" => {
                let (vb, _) = self.varbuilder()?;
                let encoder = BertEncoder::load(
                    vb,
                    self.model_config.parse_as()?,
                    task,
                    self.model_config.label_count(),
                    self.load_config.name.clone(),
                )?;
                info!(model = %self.load_config.name, "Local BERT encoder ready");
                Ok(Arc::new(encoder))
            }
            _ => Err(self.unsupported("encoder inference")),
        }
    }

    /// Text generator of the given architecture class
    pub fn generator(&self, class: ArchitectureClass) -> Result<Arc<dyn TextGenerator>> {
        match (class, self.model_type()) {
            (ArchitectureClass::DecoderOnly, "llama") => {
                let (vb, dtype) = self.varbuilder()?;
                let generator = LlamaGenerator::load(
                    vb,
                    self.model_config.parse_as()?,
                    dtype,
                    self.load_config.name.clone(),
                )?;
                Ok(Arc::new(generator))
            }
            (ArchitectureClass::EncoderDecoder, "t5") => {
                let (vb, _) = self.varbuilder()?;
                let generator = T5Generator::load(
                    vb,
                    self.model_config.parse_as()?,
                    self.load_config.name.clone(),
                )?;
                Ok(Arc::new(generator))
            }
            _ => Err(self.unsupported("generation")),
        }
    }
}
