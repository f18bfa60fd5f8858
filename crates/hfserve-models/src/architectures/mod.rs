//! Model architecture implementations

pub mod bert;
pub mod llama;
pub mod t5;

pub use bert::BertEncoder;
pub use llama::LlamaGenerator;
pub use t5::T5Generator;
