//! Tokenizer interface for batch encoding and decoding
//!
//! Encoders consume a `TokenizedBatch` (padded to the longest member,
//! truncated at the model maximum); generative models use the single
//! sequence `encode`/`decode` pair plus chat templating.

use crate::tensor::HostTensor;
use hfserve_types::{ChatMessage, Result, SpecialTokens, TokenId};
use serde::{Deserialize, Serialize};

/// Per-call encoding options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeOptions {
    /// Add model-specific special tokens
    pub add_special_tokens: bool,
    /// Truncate every sequence to this many tokens (special tokens included)
    pub max_length: Option<usize>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            add_special_tokens: true,
            max_length: None,
        }
    }
}

/// A padded, truncated batch of token sequences.
///
/// All per-token tables are `[batch][seq_len]`. Offsets are byte spans
/// into the original (un-normalised) instance text; padding and special
/// tokens carry `(0, 0)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenizedBatch {
    pub input_ids: Vec<Vec<TokenId>>,
    pub attention_mask: Vec<Vec<u32>>,
    pub token_type_ids: Vec<Vec<u32>>,
    pub special_tokens_mask: Vec<Vec<u32>>,
    pub offsets: Vec<Vec<(usize, usize)>>,
    pub word_ids: Vec<Vec<Option<u32>>>,
    /// Padded sequence length shared by every row
    pub seq_len: usize,
}

impl TokenizedBatch {
    pub fn batch_size(&self) -> usize {
        self.input_ids.len()
    }

    /// Number of real (non-padding) tokens in row `i`
    pub fn sequence_length(&self, i: usize) -> usize {
        self.attention_mask
            .get(i)
            .map(|m| m.iter().filter(|&&v| v != 0).count())
            .unwrap_or(0)
    }

    /// Whether position `j` of row `i` holds an ordinary text token
    pub fn is_content_token(&self, i: usize, j: usize) -> bool {
        self.attention_mask[i][j] != 0 && self.special_tokens_mask[i][j] == 0
    }

    /// Model inputs as named tensors, in the conventional order
    pub fn to_host_tensors(&self) -> Result<Vec<HostTensor>> {
        let shape = vec![self.batch_size(), self.seq_len];
        let flat_ids = self
            .input_ids
            .iter()
            .flat_map(|row| row.iter().map(|t| t.get() as i64))
            .collect();
        let flat = |rows: &Vec<Vec<u32>>| rows.iter().flatten().map(|v| *v as i64).collect();
        Ok(vec![
            HostTensor::i64("input_ids", shape.clone(), flat_ids)?,
            HostTensor::i64("attention_mask", shape.clone(), flat(&self.attention_mask))?,
            HostTensor::i64("token_type_ids", shape, flat(&self.token_type_ids))?,
        ])
    }
}

/// Core tokenizer trait for encoding/decoding operations
pub trait Tokenizer: Send + Sync {
    /// Encode an ordered batch, padding to the longest member
    fn encode_batch(&self, texts: &[&str], options: &EncodeOptions) -> Result<TokenizedBatch>;

    /// Encode one text to token IDs, without padding or truncation
    fn encode(&self, text: &str, add_special: bool) -> Result<Vec<TokenId>>;

    /// Decode token IDs to text
    fn decode(&self, tokens: &[TokenId], skip_special: bool) -> Result<String>;

    /// Get vocabulary size
    fn vocab_size(&self) -> usize;

    /// Get special tokens configuration
    fn special_tokens(&self) -> &SpecialTokens;

    /// Get token ID for a specific text (if exists in vocabulary)
    fn token_id(&self, text: &str) -> Option<TokenId>;

    /// Maximum sequence length declared by the tokenizer config
    fn model_max_length(&self) -> Option<usize>;

    /// Render role-tagged messages into one prompt. With
    /// `add_generation_prompt` the assistant turn is opened at the end.
    fn apply_chat_template(
        &self,
        messages: &[ChatMessage],
        add_generation_prompt: bool,
    ) -> Result<String>;

    /// Get tokenizer information
    fn info(&self) -> TokenizerInfo;
}

/// Tokenizer information and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenizerInfo {
    /// Tokenizer type/algorithm
    pub tokenizer_type: TokenizerType,
    /// Vocabulary size
    pub vocab_size: usize,
    /// Special tokens
    pub special_tokens: SpecialTokens,
    /// Whether inputs are lower-cased before encoding
    pub lower_case: bool,
    /// Maximum token length
    pub max_token_length: Option<usize>,
    /// Revision the tokenizer files were fetched at
    pub revision: Option<String>,
}

/// Tokenizer types/algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenizerType {
    /// Byte-Pair Encoding
    BPE,
    /// WordPiece (BERT-style)
    WordPiece,
    /// Unigram / SentencePiece
    Unigram,
    /// Word-level vocabulary
    WordLevel,
}
