//! hfserve model layer
//!
//! Everything that depends on how a model is laid out on disk: the
//! `config.json` view, task inference from the architecture name, Hub or
//! local file resolution (with independent weight/tokenizer revisions),
//! sentence-transformers pooling config and the candle-backed local
//! encoders and generators.

pub mod architectures;
pub mod config;
pub mod factory;
pub mod pooling;
pub mod source;
pub mod task;
pub mod utils;
pub mod weights;

pub use architectures::{BertEncoder, LlamaGenerator, T5Generator};
pub use config::{GenerationConfig, HfModelConfig};
pub use factory::LocalModelFactory;
pub use pooling::detect_pooling;
pub use source::ModelFiles;
pub use task::TaskResolver;
pub use weights::SafeTensorsLoader;

pub use hfserve_types::{MLTask, Result};
