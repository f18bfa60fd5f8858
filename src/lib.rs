//! # hfserve
//!
//! Serve pretrained transformer models behind a uniform inference
//! protocol.
//!
//! A model is loaded from a local directory or the HuggingFace Hub, its
//! task is inferred from `config.json` (or configured), and requests are
//! answered either as batched instance predictions or as OpenAI-style
//! completions and chat completions. The forward pass runs in-process on
//! candle or on a remote predictor speaking the v2 tensor protocol.
//!
//! ```no_run
//! use hfserve::{BatchRequest, ModelLoadConfig, ModelRegistry, RequestHeaders};
//!
//! # async fn run() -> hfserve::Result<()> {
//! let config = ModelLoadConfig::new("bert", "bert-base-uncased");
//! let model = ModelRegistry::global().load(&config)?;
//! let request = BatchRequest::new(["The capital of France is [MASK]."]);
//! let _prediction = model.predict(&request, &RequestHeaders::new()).await?;
//! # Ok(())
//! # }
//! ```

mod logging;

pub use logging::init_logging;

pub use hfserve_engine::{
    ChatCompletionResponse, ChatCompletionStream, CompletionResponse, CompletionStream,
    EncoderModel, GenerativeModel, ModelRegistry, RemotePredictor, ServedModel,
};
pub use hfserve_interfaces::{InferenceBackend, TextGenerator, Tokenizer};
pub use hfserve_models::TaskResolver;
pub use hfserve_tokenizer::HuggingFaceTokenizer;
pub use hfserve_types::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
