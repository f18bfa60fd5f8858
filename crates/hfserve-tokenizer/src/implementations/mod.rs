//! Tokenizer implementations

pub mod huggingface;

pub use huggingface::{HuggingFaceTokenizer, TokenizerSettings};
