//! Core type definitions for hfserve
//!
//! Tasks, load configuration, request and prediction shapes, the OpenAI and
//! v2 tensor wire types, and the shared error type. Every other hfserve
//! crate depends on this one, so it stays free of ML and async dependencies.

pub mod config;
pub mod devices;
pub mod errors;
pub mod ids;
pub mod openai;
pub mod predictions;
pub mod requests;
pub mod sampling;
pub mod tasks;
pub mod v2;

// Re-export commonly used types
pub use config::*;
pub use devices::*;
pub use errors::*;
pub use ids::*;
pub use openai::*;
pub use predictions::*;
pub use requests::*;
pub use sampling::*;
pub use tasks::*;

/// Result type used throughout hfserve
pub type Result<T> = std::result::Result<T, ServeError>;
