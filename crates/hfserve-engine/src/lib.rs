//! # hfserve engine
//!
//! Request pipelines on top of a loaded model.
//!
//! ## Overview
//!
//! - [`EncoderModel`]: tokenize, forward, task-specific postprocess for
//!   mask fill, classification and embeddings
//! - [`GenerativeModel`]: OpenAI completions and chat completions, full or
//!   streamed, with parameter validation against the architecture class
//! - [`RemotePredictor`]: v2 tensor protocol client standing in for the
//!   local forward pass
//! - [`ModelRegistry`]: process-wide ownership of loaded models
//!
//! Every model sits behind a [`ModelHandle`]; stopping the handle turns
//! new requests away with `ModelNotReady` while in-flight ones finish.

pub mod encoder;
pub mod generation;
pub mod generative;
pub mod handle;
pub mod postprocess;
pub mod registry;
pub mod remote;
pub mod sampling;
pub mod stop;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use encoder::{EncoderCore, EncoderModel};
pub use generation::{Generation, GenerationJob};
pub use generative::{
    ChatCompletionResponse, ChatCompletionStream, CompletionResponse, CompletionStream,
    GenerativeCore, GenerativeModel,
};
pub use handle::{HandleState, ModelHandle};
pub use postprocess::{Labels, PostprocessContext, TaskHandler};
pub use registry::{ModelRegistry, ServedModel};
pub use remote::{RemoteBackend, RemoteGenerator, RemotePredictor};
pub use sampling::SamplingPipeline;
pub use stop::StopSequenceMatcher;

pub use hfserve_types::{Result, ServeError};
