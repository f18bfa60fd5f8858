//! Step-wise text generation
//!
//! The generation loop (sampling, stop handling, streaming) lives in the
//! engine; implementations of these traits only turn a token history into
//! next-token logits, locally or over the wire.

use async_trait::async_trait;
use hfserve_types::{ArchitectureClass, RequestHeaders, Result, TokenId};

/// Creates per-request generation sessions
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Start a session for an encoded prompt. For encoder-decoder models
    /// this runs the encoder; for decoder-only models the prompt is the
    /// prefix the first step continues from.
    async fn start(
        &self,
        prompt: &[TokenId],
        headers: &RequestHeaders,
    ) -> Result<Box<dyn GenerationSession>>;

    /// Structural class, used to validate request parameters
    fn architecture(&self) -> ArchitectureClass;

    /// Short description used in logs
    fn name(&self) -> &str;
}

/// State of one in-flight generation
#[async_trait]
pub trait GenerationSession: Send {
    /// Logits over the vocabulary for the next position. `last` is the
    /// token chosen at the previous step and `None` on the first call.
    async fn next_logits(&mut self, last: Option<TokenId>) -> Result<Vec<f32>>;
}
