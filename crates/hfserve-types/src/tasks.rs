//! Machine-learning tasks a served model can perform

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Result, ServeError};

/// Tasks the adapter knows how to serve.
///
/// The set is closed: architectures mapping to anything else are rejected
/// at load time instead of being coerced into one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MLTask {
    /// Fill `[MASK]` positions
    #[serde(alias = "fill_mask")]
    MaskedLanguageModeling,
    SequenceClassification,
    TokenClassification,
    TextEmbedding,
    TextGeneration,
    Text2textGeneration,
}

impl MLTask {
    pub const ALL: [MLTask; 6] = [
        MLTask::MaskedLanguageModeling,
        MLTask::SequenceClassification,
        MLTask::TokenClassification,
        MLTask::TextEmbedding,
        MLTask::TextGeneration,
        MLTask::Text2textGeneration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MLTask::MaskedLanguageModeling => "masked_language_modeling",
            MLTask::SequenceClassification => "sequence_classification",
            MLTask::TokenClassification => "token_classification",
            MLTask::TextEmbedding => "text_embedding",
            MLTask::TextGeneration => "text_generation",
            MLTask::Text2textGeneration => "text2text_generation",
        }
    }

    /// Whether requests for this task go through the generative pipeline
    pub fn is_generative(&self) -> bool {
        matches!(self, MLTask::TextGeneration | MLTask::Text2textGeneration)
    }

    /// Comma separated list used in error messages
    pub fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for MLTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MLTask {
    type Err = ServeError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "masked_language_modeling" | "fill_mask" => Ok(MLTask::MaskedLanguageModeling),
            "sequence_classification" | "text_classification" => {
                Ok(MLTask::SequenceClassification)
            }
            "token_classification" => Ok(MLTask::TokenClassification),
            "text_embedding" | "feature_extraction" => Ok(MLTask::TextEmbedding),
            "text_generation" => Ok(MLTask::TextGeneration),
            "text2text_generation" => Ok(MLTask::Text2textGeneration),
            other => Err(ServeError::unsupported_task(format!(
                "Task {} is not supported. Currently supported tasks are: {}",
                other,
                MLTask::supported_list()
            ))),
        }
    }
}

/// Structural class of a model, which decides which generation
/// parameters are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchitectureClass {
    EncoderOnly,
    EncoderDecoder,
    DecoderOnly,
}

impl ArchitectureClass {
    pub fn is_encoder_decoder(&self) -> bool {
        matches!(self, ArchitectureClass::EncoderDecoder)
    }
}

impl fmt::Display for ArchitectureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchitectureClass::EncoderOnly => write!(f, "encoder-only"),
            ArchitectureClass::EncoderDecoder => write!(f, "encoder-decoder"),
            ArchitectureClass::DecoderOnly => write!(f, "decoder-only"),
        }
    }
}
