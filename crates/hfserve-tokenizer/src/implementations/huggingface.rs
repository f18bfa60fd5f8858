//! HuggingFace tokenizer implementation

use crate::config::TokenizerFileConfig;
use crate::normalize::LowercasedText;
use crate::templates::{ChatTemplate, CommonTemplates};
use hfserve_interfaces::{EncodeOptions, TokenizedBatch, Tokenizer, TokenizerInfo, TokenizerType};
use hfserve_types::{ChatMessage, Result, ServeError, SpecialTokens, TokenId};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokenizers::models::ModelWrapper;
use tokenizers::{
    Encoding, PaddingDirection, PostProcessor, Tokenizer as HfTokenizer, TruncationDirection,
};
use tracing::{debug, info};

/// Load-time tokenizer settings that are not part of the tokenizer files
#[derive(Debug, Clone, Default)]
pub struct TokenizerSettings {
    /// Lower-case inputs before encoding; falls back to `tokenizer_config.json`
    pub do_lower_case: Option<bool>,
    /// Built-in template name or inline per-message format
    pub chat_template: Option<String>,
    /// `model_type` from `config.json`, used to pick a chat template
    pub model_type: Option<String>,
    /// Revision the files were fetched at, reported in `info()`
    pub revision: Option<String>,
}

impl TokenizerSettings {
    pub fn with_lower_case(mut self, lower_case: Option<bool>) -> Self {
        self.do_lower_case = lower_case;
        self
    }

    pub fn with_chat_template(mut self, template: Option<String>) -> Self {
        self.chat_template = template;
        self
    }

    pub fn with_model_type(mut self, model_type: Option<String>) -> Self {
        self.model_type = model_type;
        self
    }

    pub fn with_revision(mut self, revision: Option<String>) -> Self {
        self.revision = revision;
        self
    }
}

/// HuggingFace tokenizer wrapper
pub struct HuggingFaceTokenizer {
    tokenizer: Arc<HfTokenizer>,
    special_tokens: SpecialTokens,
    /// Id and surface form used to pad batches
    pad: Option<(u32, String)>,
    lower_case: bool,
    /// Special token spellings left untouched by manual lower-casing
    preserved_tokens: Vec<String>,
    model_max_length: Option<usize>,
    chat_template: ChatTemplate,
    info: TokenizerInfo,
}

impl std::fmt::Debug for HuggingFaceTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HuggingFaceTokenizer")
            .field("info", &self.info)
            .field("chat_template", &self.chat_template.name())
            .finish()
    }
}

impl HuggingFaceTokenizer {
    /// Wrap a loaded tokenizer. Padding and truncation baked into
    /// `tokenizer.json` are disabled; the batch pipeline applies its own.
    pub fn new(
        mut tokenizer: HfTokenizer,
        file_config: TokenizerFileConfig,
        settings: TokenizerSettings,
    ) -> Result<Self> {
        tokenizer
            .with_truncation(None)
            .map_err(|e| ServeError::tokenizer(format!("Failed to reset truncation: {}", e)))?;
        tokenizer.with_padding(None);

        let special_tokens = extract_special_tokens(&tokenizer, &file_config);
        let pad = special_tokens
            .pad_token
            .or(special_tokens.eos_token)
            .or(special_tokens.unk_token)
            .and_then(|id| {
                tokenizer
                    .id_to_token(id.get())
                    .map(|token| (id.get(), token))
            });

        let lower_case = settings
            .do_lower_case
            .or(file_config.do_lower_case)
            .unwrap_or(false);
        let model_max_length = file_config.model_max_length();
        let mut preserved_tokens: Vec<String> = tokenizer
            .get_added_tokens_decoder()
            .into_values()
            .filter(|t| t.special)
            .map(|t| t.content)
            .collect();
        // Longest first so overlapping spellings match greedily
        preserved_tokens.sort_by_key(|t| std::cmp::Reverse(t.len()));

        let token_text = |id: Option<TokenId>| id.and_then(|id| tokenizer.id_to_token(id.get()));
        if file_config.has_chat_template() && settings.chat_template.is_none() {
            debug!("tokenizer_config.json ships a Jinja chat template; using the built-in family template");
        }
        let chat_template = CommonTemplates::resolve(
            settings.chat_template.as_deref(),
            settings.model_type.as_deref(),
            token_text(special_tokens.bos_token),
            token_text(special_tokens.eos_token),
        )?;

        let vocab_size = tokenizer.get_vocab_size(true);
        let info = TokenizerInfo {
            tokenizer_type: tokenizer_type(&tokenizer),
            vocab_size,
            special_tokens: special_tokens.clone(),
            lower_case,
            max_token_length: model_max_length,
            revision: settings.revision.clone(),
        };

        debug!(
            vocab_size,
            lower_case,
            template = chat_template.name(),
            "Created HuggingFace tokenizer"
        );

        Ok(Self {
            tokenizer: Arc::new(tokenizer),
            special_tokens,
            pad,
            lower_case,
            preserved_tokens,
            model_max_length,
            chat_template,
            info,
        })
    }

    /// Create from a `tokenizer.json` path
    pub fn from_file<P: AsRef<Path>>(path: P, settings: TokenizerSettings) -> Result<Self> {
        let path = path.as_ref();
        let tokenizer = HfTokenizer::from_file(path).map_err(|e| {
            ServeError::tokenizer(format!(
                "Failed to load tokenizer from {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::new(tokenizer, TokenizerFileConfig::default(), settings)
    }

    /// Create from serialized `tokenizer.json` content
    pub fn from_json(
        json: &str,
        file_config: TokenizerFileConfig,
        settings: TokenizerSettings,
    ) -> Result<Self> {
        let tokenizer = HfTokenizer::from_str(json)
            .map_err(|e| ServeError::tokenizer(format!("Failed to parse tokenizer: {}", e)))?;
        Self::new(tokenizer, file_config, settings)
    }

    /// Load `tokenizer.json` and, when present, `tokenizer_config.json`
    /// from a model directory
    pub fn from_dir<P: AsRef<Path>>(dir: P, settings: TokenizerSettings) -> Result<Self> {
        let dir = dir.as_ref();
        let tokenizer_path = dir.join("tokenizer.json");
        if !tokenizer_path.exists() {
            return Err(ServeError::tokenizer(format!(
                "No tokenizer.json found in {}",
                dir.display()
            )));
        }
        let config_path = dir.join("tokenizer_config.json");
        let file_config = if config_path.exists() {
            TokenizerFileConfig::from_file(&config_path)?
        } else {
            TokenizerFileConfig::default()
        };

        let tokenizer = HfTokenizer::from_file(&tokenizer_path).map_err(|e| {
            ServeError::tokenizer(format!(
                "Failed to load tokenizer from {}: {}",
                tokenizer_path.display(),
                e
            ))
        })?;
        info!("Loaded tokenizer from {}", dir.display());
        Self::new(tokenizer, file_config, settings)
    }

    pub fn lower_case(&self) -> bool {
        self.lower_case
    }

    fn lowercase(&self, text: &str) -> Option<LowercasedText> {
        self.lower_case
            .then(|| LowercasedText::preserving(text, &self.preserved_tokens))
    }

    /// Encode one sequence: special tokens are added after truncating the
    /// content so that `max_length` bounds the final length.
    fn encode_truncated(
        &self,
        text: &str,
        add_special: bool,
        max_length: Option<usize>,
    ) -> Result<Encoding> {
        let mut encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| ServeError::tokenizer(format!("Encoding failed: {}", e)))?;

        if let Some(max_length) = max_length {
            let added = if add_special {
                self.tokenizer
                    .get_post_processor()
                    .map(|p| p.added_tokens(false))
                    .unwrap_or(0)
            } else {
                0
            };
            let budget = max_length.saturating_sub(added);
            if encoding.len() > budget {
                encoding.truncate(budget, 0, TruncationDirection::Right);
            }
        }

        self.tokenizer
            .post_process(encoding, None, add_special)
            .map_err(|e| ServeError::tokenizer(format!("Post-processing failed: {}", e)))
    }
}

impl Tokenizer for HuggingFaceTokenizer {
    fn encode_batch(&self, texts: &[&str], options: &EncodeOptions) -> Result<TokenizedBatch> {
        let max_length = match (options.max_length, self.model_max_length) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let mut rows = Vec::with_capacity(texts.len());
        for text in texts {
            let lowered = self.lowercase(text);
            let input = lowered.as_ref().map_or(*text, |l| l.text.as_str());
            let encoding = self.encode_truncated(input, options.add_special_tokens, max_length)?;
            rows.push((encoding, lowered));
        }

        let seq_len = rows.iter().map(|(e, _)| e.len()).max().unwrap_or(0);
        let mut batch = TokenizedBatch {
            seq_len,
            ..Default::default()
        };

        for (mut encoding, lowered) in rows {
            if encoding.len() < seq_len {
                let (pad_id, pad_token) = self.pad.as_ref().ok_or_else(|| {
                    ServeError::tokenizer(
                        "Batch needs padding but the tokenizer has no pad, eos or unk token",
                    )
                })?;
                encoding.pad(seq_len, *pad_id, 0, pad_token, PaddingDirection::Right);
            }

            let offsets = encoding
                .get_offsets()
                .iter()
                .map(|&span| match &lowered {
                    Some(l) => l.original_span(span),
                    None => span,
                })
                .collect();

            batch
                .input_ids
                .push(encoding.get_ids().iter().map(|&id| TokenId::new(id)).collect());
            batch.attention_mask.push(encoding.get_attention_mask().to_vec());
            batch.token_type_ids.push(encoding.get_type_ids().to_vec());
            batch
                .special_tokens_mask
                .push(encoding.get_special_tokens_mask().to_vec());
            batch.offsets.push(offsets);
            batch.word_ids.push(encoding.get_word_ids().to_vec());
        }

        debug!(
            batch_size = batch.batch_size(),
            seq_len,
            truncate_at = ?max_length,
            "Encoded batch"
        );
        Ok(batch)
    }

    fn encode(&self, text: &str, add_special: bool) -> Result<Vec<TokenId>> {
        let lowered = self.lowercase(text);
        let input = lowered.as_ref().map_or(text, |l| l.text.as_str());
        let encoding = self
            .tokenizer
            .encode(input, add_special)
            .map_err(|e| ServeError::tokenizer(format!("Encoding failed: {}", e)))?;

        Ok(encoding
            .get_ids()
            .iter()
            .map(|&id| TokenId::new(id))
            .collect())
    }

    fn decode(&self, tokens: &[TokenId], skip_special: bool) -> Result<String> {
        let token_ids: Vec<u32> = tokens.iter().map(|t| t.get()).collect();
        self.tokenizer
            .decode(&token_ids, skip_special)
            .map_err(|e| ServeError::tokenizer(format!("Decoding failed: {}", e)))
    }

    fn vocab_size(&self) -> usize {
        self.info.vocab_size
    }

    fn special_tokens(&self) -> &SpecialTokens {
        &self.special_tokens
    }

    fn token_id(&self, text: &str) -> Option<TokenId> {
        self.tokenizer.token_to_id(text).map(TokenId::new)
    }

    fn model_max_length(&self) -> Option<usize> {
        self.model_max_length
    }

    fn apply_chat_template(
        &self,
        messages: &[ChatMessage],
        add_generation_prompt: bool,
    ) -> Result<String> {
        self.chat_template.apply(messages, add_generation_prompt)
    }

    fn info(&self) -> TokenizerInfo {
        self.info.clone()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn tokenizer_type(tokenizer: &HfTokenizer) -> TokenizerType {
    match tokenizer.get_model() {
        ModelWrapper::WordPiece(_) => TokenizerType::WordPiece,
        ModelWrapper::Unigram(_) => TokenizerType::Unigram,
        ModelWrapper::WordLevel(_) => TokenizerType::WordLevel,
        ModelWrapper::BPE(_) => TokenizerType::BPE,
    }
}

/// Special tokens declared in `tokenizer_config.json` win; otherwise fall
/// back to the conventional spellings of each family.
fn extract_special_tokens(tokenizer: &HfTokenizer, config: &TokenizerFileConfig) -> SpecialTokens {
    let lookup = |declared: Option<&str>, fallbacks: &[&str]| {
        declared
            .and_then(|t| tokenizer.token_to_id(t))
            .or_else(|| fallbacks.iter().find_map(|t| tokenizer.token_to_id(t)))
            .map(TokenId::new)
    };

    SpecialTokens {
        bos_token: lookup(config.bos_token(), &["<s>", "[BOS]", "<bos>", "<|endoftext|>"]),
        eos_token: lookup(config.eos_token(), &["</s>", "[EOS]", "<eos>", "<|endoftext|>"]),
        unk_token: lookup(config.unk_token(), &["<unk>", "[UNK]"]),
        pad_token: lookup(config.pad_token(), &["<pad>", "[PAD]"]),
        sep_token: lookup(config.sep_token(), &["[SEP]", "<sep>"]),
        cls_token: lookup(config.cls_token(), &["[CLS]", "<cls>"]),
        mask_token: lookup(config.mask_token(), &["[MASK]", "<mask>"]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{fixture_tokenizer, wordpiece_tokenizer_json};

    #[test]
    fn special_tokens_resolved_from_vocab() {
        let tokenizer = fixture_tokenizer(true);
        let special = tokenizer.special_tokens();
        assert_eq!(special.pad_token, Some(TokenId::new(0)));
        assert_eq!(special.unk_token, Some(TokenId::new(1)));
        assert_eq!(special.cls_token, Some(TokenId::new(2)));
        assert_eq!(special.sep_token, Some(TokenId::new(3)));
        assert_eq!(special.mask_token, Some(TokenId::new(4)));
        assert_eq!(tokenizer.info().tokenizer_type, TokenizerType::WordPiece);
    }

    #[test]
    fn declared_eos_wins_over_fallbacks() {
        let file_config = TokenizerFileConfig::from_json(r#"{"eos_token": "[SEP]"}"#).unwrap();
        let tokenizer = HuggingFaceTokenizer::from_json(
            &wordpiece_tokenizer_json(true),
            file_config,
            TokenizerSettings::default(),
        )
        .unwrap();
        assert_eq!(tokenizer.special_tokens().eos_token, Some(TokenId::new(3)));
    }

    #[test]
    fn batch_is_padded_to_longest_member() {
        let tokenizer = fixture_tokenizer(true);
        let batch = tokenizer
            .encode_batch(&["hello", "my dog is cute"], &EncodeOptions::default())
            .unwrap();

        assert_eq!(batch.batch_size(), 2);
        assert_eq!(batch.seq_len, 6);
        assert_eq!(batch.sequence_length(0), 3);
        assert_eq!(batch.sequence_length(1), 6);
        assert_eq!(batch.input_ids[0][3..], [TokenId::new(0); 3]);
        assert_eq!(batch.attention_mask[0], vec![1, 1, 1, 0, 0, 0]);
        assert_eq!(batch.special_tokens_mask[0][..3], [1, 0, 1]);
    }

    #[test]
    fn truncation_keeps_special_tokens() {
        let tokenizer = fixture_tokenizer(true);
        let options = EncodeOptions {
            add_special_tokens: true,
            max_length: Some(4),
        };
        let batch = tokenizer
            .encode_batch(&["the capital of france is paris"], &options)
            .unwrap();
        assert_eq!(batch.seq_len, 4);
        let ids = &batch.input_ids[0];
        assert_eq!(ids.first(), Some(&TokenId::new(2)));
        assert_eq!(ids.last(), Some(&TokenId::new(3)));
    }

    #[test]
    fn offsets_point_into_original_text_when_lowercasing() {
        // Cased fixture: lower-casing comes from the settings, not the normalizer
        let tokenizer = HuggingFaceTokenizer::from_json(
            &wordpiece_tokenizer_json(false),
            TokenizerFileConfig::default(),
            TokenizerSettings::default().with_lower_case(Some(true)),
        )
        .unwrap();
        let text = "Hello My Dog";
        let batch = tokenizer
            .encode_batch(&[text], &EncodeOptions::default())
            .unwrap();

        let dog = batch.input_ids[0]
            .iter()
            .position(|id| Some(*id) == tokenizer.token_id("dog"))
            .unwrap();
        let (start, end) = batch.offsets[0][dog];
        assert_eq!(&text[start..end], "Dog");
    }

    #[test]
    fn empty_batch_encodes_to_empty() {
        let tokenizer = fixture_tokenizer(true);
        let batch = tokenizer
            .encode_batch(&[], &EncodeOptions::default())
            .unwrap();
        assert_eq!(batch.batch_size(), 0);
        assert_eq!(batch.seq_len, 0);
    }
}
