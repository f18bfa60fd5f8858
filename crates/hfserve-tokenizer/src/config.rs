//! `tokenizer_config.json` parsing

use hfserve_types::{Result, ServeError};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// Values above this are the transformers "no limit" sentinel (`1e30`)
const UNBOUNDED_MAX_LENGTH: f64 = 1_000_000.0;

/// The parts of `tokenizer_config.json` the pipeline uses
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TokenizerFileConfig {
    model_max_length: Option<f64>,
    pub do_lower_case: Option<bool>,
    bos_token: Option<Value>,
    eos_token: Option<Value>,
    unk_token: Option<Value>,
    pad_token: Option<Value>,
    sep_token: Option<Value>,
    cls_token: Option<Value>,
    mask_token: Option<Value>,
    pub chat_template: Option<Value>,
    pub tokenizer_class: Option<String>,
}

impl TokenizerFileConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServeError::tokenizer(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| {
            ServeError::tokenizer(format!("Invalid tokenizer_config.json: {}", e))
        })
    }

    /// Declared maximum length, `None` when absent or unbounded
    pub fn model_max_length(&self) -> Option<usize> {
        self.model_max_length
            .filter(|v| *v > 0.0 && *v <= UNBOUNDED_MAX_LENGTH)
            .map(|v| v as usize)
    }

    pub fn bos_token(&self) -> Option<&str> {
        token_content(&self.bos_token)
    }

    pub fn eos_token(&self) -> Option<&str> {
        token_content(&self.eos_token)
    }

    pub fn unk_token(&self) -> Option<&str> {
        token_content(&self.unk_token)
    }

    pub fn pad_token(&self) -> Option<&str> {
        token_content(&self.pad_token)
    }

    pub fn sep_token(&self) -> Option<&str> {
        token_content(&self.sep_token)
    }

    pub fn cls_token(&self) -> Option<&str> {
        token_content(&self.cls_token)
    }

    pub fn mask_token(&self) -> Option<&str> {
        token_content(&self.mask_token)
    }

    /// Whether the model ships its own (Jinja) chat template
    pub fn has_chat_template(&self) -> bool {
        self.chat_template.as_ref().is_some_and(|v| !v.is_null())
    }
}

/// Special tokens are either a plain string or an `AddedToken` object
fn token_content(value: &Option<Value>) -> Option<&str> {
    match value.as_ref()? {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.get("content").and_then(Value::as_str),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_string_and_object_tokens() {
        let config = TokenizerFileConfig::from_json(
            r#"{
                "model_max_length": 512,
                "do_lower_case": true,
                "mask_token": "[MASK]",
                "eos_token": {"content": "</s>", "lstrip": false, "__type": "AddedToken"},
                "pad_token": null
            }"#,
        )
        .unwrap();
        assert_eq!(config.model_max_length(), Some(512));
        assert_eq!(config.do_lower_case, Some(true));
        assert_eq!(config.mask_token(), Some("[MASK]"));
        assert_eq!(config.eos_token(), Some("</s>"));
        assert_eq!(config.pad_token(), None);
        assert!(!config.has_chat_template());
    }

    #[test]
    fn unbounded_max_length_is_none() {
        let config =
            TokenizerFileConfig::from_json(r#"{"model_max_length": 1000000000000000019884624838656}"#)
                .unwrap();
        assert_eq!(config.model_max_length(), None);
    }

    #[test]
    fn invalid_json_is_a_tokenizer_error() {
        let err = TokenizerFileConfig::from_json("{").unwrap_err();
        assert!(matches!(err, ServeError::Tokenizer { .. }));
    }
}
