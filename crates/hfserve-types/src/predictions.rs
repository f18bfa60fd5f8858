//! Task-specific prediction outputs

use serde::{Deserialize, Serialize};

use crate::{FinishReason, TokenUsage};

/// Predictions for one batch request, one entry per instance in order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionResult {
    /// Decoded mask-fill text per instance
    FillMask(Vec<String>),
    SequenceClassification(Vec<ClassificationResult>),
    /// Ordered entities per instance
    TokenClassification(Vec<Vec<Entity>>),
    /// Pooled, L2-normalised vector per instance
    TextEmbedding(Vec<Vec<f32>>),
    Generation(Vec<GeneratedText>),
}

impl PredictionResult {
    /// Number of instances covered
    pub fn len(&self) -> usize {
        match self {
            PredictionResult::FillMask(v) => v.len(),
            PredictionResult::SequenceClassification(v) => v.len(),
            PredictionResult::TokenClassification(v) => v.len(),
            PredictionResult::TextEmbedding(v) => v.len(),
            PredictionResult::Generation(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PredictionResult::FillMask(_) => "fill_mask",
            PredictionResult::SequenceClassification(_) => "sequence_classification",
            PredictionResult::TokenClassification(_) => "token_classification",
            PredictionResult::TextEmbedding(_) => "text_embedding",
            PredictionResult::Generation(_) => "generation",
        }
    }
}

/// Sequence classification output for one instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Arg-max label
    pub label: String,
    /// Probability of `label`
    pub confidence: f32,
    /// Every class, ordered by label id
    pub probabilities: Vec<LabelProbability>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelProbability {
    pub label: String,
    pub probability: f32,
}

/// A tagged word in token classification output.
///
/// `start`/`end` are character offsets into the original instance text,
/// so `text.chars().skip(start).take(end - start)` yields `word`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity: String,
    pub score: f32,
    /// Position of the word's first token in the tokenized sequence
    pub index: usize,
    pub word: String,
    pub start: usize,
    pub end: usize,
}

/// Generated text for one instance of a generative batch predict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedText {
    pub text: String,
    pub finish_reason: FinishReason,
    pub usage: TokenUsage,
}

/// `{"predictions": [...]}` response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub predictions: PredictionResult,
}

impl From<PredictionResult> for PredictResponse {
    fn from(predictions: PredictionResult) -> Self {
        Self { predictions }
    }
}
