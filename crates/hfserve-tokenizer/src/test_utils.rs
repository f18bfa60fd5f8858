//! Tiny BERT-style WordPiece tokenizer for tests
//!
//! Ids 0..=4 are `[PAD] [UNK] [CLS] [SEP] [MASK]`; the rest of the
//! vocabulary covers the sentences used across the workspace tests.

use crate::config::TokenizerFileConfig;
use crate::implementations::{HuggingFaceTokenizer, TokenizerSettings};
use serde_json::{json, Map, Value};
use std::path::Path;

pub const SPECIAL_TOKENS: [&str; 5] = ["[PAD]", "[UNK]", "[CLS]", "[SEP]", "[MASK]"];

const WORDS: &[&str] = &[
    "the", "capital", "of", "france", "is", "paris", ".", "hello", "my", "dog", "cute",
    "company", "based", "in", "and", "new", "york", "city", "a", "good", "movie", "bad",
    "wir", "setzen", "worte", "we", "put", "words", "translate", "english", "to", "german",
    ":", ",", "!", "?", "hugging", "##face", "inc", "world", "Hu", "##gging", "##F", "##ace",
    "Paris", "New", "York", "City", "Inc", "France", "The", "My",
];

/// Vocabulary in id order
pub fn vocabulary() -> Vec<&'static str> {
    SPECIAL_TOKENS.iter().chain(WORDS.iter()).copied().collect()
}

/// Serialized `tokenizer.json`; `lowercase` toggles the normalizer
pub fn wordpiece_tokenizer_json(lowercase: bool) -> String {
    let vocab: Map<String, Value> = vocabulary()
        .into_iter()
        .enumerate()
        .map(|(id, token)| (token.to_string(), json!(id)))
        .collect();

    let added_tokens: Vec<Value> = SPECIAL_TOKENS
        .iter()
        .enumerate()
        .map(|(id, token)| {
            json!({
                "id": id,
                "content": token,
                "single_word": false,
                "lstrip": false,
                "rstrip": false,
                "normalized": false,
                "special": true
            })
        })
        .collect();

    json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": added_tokens,
        "normalizer": {
            "type": "BertNormalizer",
            "clean_text": true,
            "handle_chinese_chars": true,
            "strip_accents": null,
            "lowercase": lowercase
        },
        "pre_tokenizer": {"type": "BertPreTokenizer"},
        "post_processor": {
            "type": "BertProcessing",
            "sep": ["[SEP]", 3],
            "cls": ["[CLS]", 2]
        },
        "decoder": {"type": "WordPiece", "prefix": "##", "cleanup": true},
        "model": {
            "type": "WordPiece",
            "unk_token": "[UNK]",
            "continuing_subword_prefix": "##",
            "max_input_chars_per_word": 100,
            "vocab": vocab
        }
    })
    .to_string()
}

/// Fixture tokenizer with `[SEP]` doubling as eos
pub fn fixture_tokenizer(lowercase: bool) -> HuggingFaceTokenizer {
    let file_config = TokenizerFileConfig::from_json(&tokenizer_config_json(lowercase))
        .expect("fixture tokenizer_config.json");
    HuggingFaceTokenizer::from_json(
        &wordpiece_tokenizer_json(lowercase),
        file_config,
        TokenizerSettings::default(),
    )
    .expect("fixture tokenizer.json")
}

fn tokenizer_config_json(lowercase: bool) -> String {
    json!({
        "do_lower_case": lowercase,
        "model_max_length": 512,
        "eos_token": "[SEP]",
        "mask_token": "[MASK]",
        "pad_token": "[PAD]"
    })
    .to_string()
}

/// Write `tokenizer.json` and `tokenizer_config.json` into `dir`
pub fn write_fixture(dir: &Path, lowercase: bool) -> std::io::Result<()> {
    std::fs::write(dir.join("tokenizer.json"), wordpiece_tokenizer_json(lowercase))?;
    std::fs::write(
        dir.join("tokenizer_config.json"),
        tokenizer_config_json(lowercase),
    )
}
