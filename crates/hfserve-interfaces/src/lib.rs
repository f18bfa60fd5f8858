//! Interface definitions for hfserve
//!
//! The traits here are the seams of the request pipeline: tokenization,
//! the encoder forward pass, step-wise generation and sampling. Concrete
//! implementations live in `hfserve-tokenizer`, `hfserve-models` and
//! `hfserve-engine`; the engine only ever talks to these traits, so local
//! and remote inference are interchangeable.

pub mod backend;
pub mod generator;
pub mod sampler;
pub mod tensor;
pub mod tokenizer;

pub use backend::InferenceBackend;
pub use generator::{GenerationSession, TextGenerator};
pub use sampler::{LogitsProcessor, Sampler, SamplingContext};
pub use tensor::{HostTensor, TensorData};
pub use tokenizer::{EncodeOptions, TokenizedBatch, Tokenizer, TokenizerInfo, TokenizerType};

pub use hfserve_types::{
    ArchitectureClass, ChatMessage, MLTask, RequestHeaders, Result, SamplingParams, ServeError,
    SpecialTokens, TokenId,
};
