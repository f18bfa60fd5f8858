//! # hfserve tokenizer
//!
//! HuggingFace `tokenizers` integration implementing the tokenizer
//! interface from `hfserve-interfaces`.
//!
//! ## Features
//!
//! - **Batch encoding**: pad to the longest member, truncate at the model
//!   maximum, offsets into the original text even when lower-casing
//! - **Incremental decoding**: prefix-stable text deltas for streaming
//! - **Chat templates**: built-in family templates for role-tagged messages
//! - **Special tokens**: resolved from `tokenizer_config.json` first

pub mod config;
pub mod implementations;
pub mod incremental;
pub mod normalize;
pub mod templates;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::TokenizerFileConfig;
pub use implementations::*;
pub use incremental::IncrementalDecoder;
pub use normalize::LowercasedText;
pub use templates::{ChatTemplate, CommonTemplates};

pub use hfserve_interfaces::{EncodeOptions, TokenizedBatch, Tokenizer, TokenizerInfo, TokenizerType};
pub use hfserve_types::{Result, SpecialTokens, TokenId};

/// Load a tokenizer from a model directory
pub fn load_from_dir(
    dir: impl AsRef<std::path::Path>,
    settings: TokenizerSettings,
) -> Result<std::sync::Arc<dyn Tokenizer>> {
    Ok(std::sync::Arc::new(HuggingFaceTokenizer::from_dir(dir, settings)?))
}
