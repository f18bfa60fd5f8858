//! Scripted backends and generators for tests
//!
//! Nothing here touches model weights: backends compute their output from
//! the tokenized batch and generators replay a fixed token script, so the
//! pipelines around them can be tested exactly.

use async_trait::async_trait;
use hfserve_interfaces::{GenerationSession, HostTensor, InferenceBackend, TextGenerator, TokenizedBatch, Tokenizer};
use hfserve_types::{
    ArchitectureClass, MLTask, PoolingStrategy, RequestHeaders, Result, ServeError, TokenId,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::encoder::{EncoderCore, EncoderModel};
use crate::generative::{GenerativeCore, GenerativeModel};
use crate::postprocess::{Labels, TaskHandler};

pub use hfserve_tokenizer::test_utils::{vocabulary, write_fixture};

/// Lower-casing fixture tokenizer (`[SEP]` is eos)
pub fn fixture_tokenizer() -> Arc<dyn Tokenizer> {
    Arc::new(hfserve_tokenizer::test_utils::fixture_tokenizer(true))
}

/// Case-preserving fixture tokenizer
pub fn cased_fixture_tokenizer() -> Arc<dyn Tokenizer> {
    Arc::new(hfserve_tokenizer::test_utils::fixture_tokenizer(false))
}

/// Vocabulary ids of `tokens`; panics on unknown tokens
pub fn token_ids(tokenizer: &dyn Tokenizer, tokens: &[&str]) -> Vec<TokenId> {
    tokens
        .iter()
        .map(|t| {
            tokenizer
                .token_id(t)
                .unwrap_or_else(|| panic!("{} is not in the fixture vocabulary", t))
        })
        .collect()
}

type Forward = dyn Fn(&TokenizedBatch) -> Result<Vec<HostTensor>> + Send + Sync;

/// Backend whose output is computed by a closure over the batch
pub struct ScriptedBackend {
    forward: Box<Forward>,
    calls: AtomicUsize,
    last_headers: Mutex<Option<RequestHeaders>>,
}

impl ScriptedBackend {
    pub fn new<F>(forward: F) -> Self
    where
        F: Fn(&TokenizedBatch) -> Result<Vec<HostTensor>> + Send + Sync + 'static,
    {
        Self {
            forward: Box::new(forward),
            calls: AtomicUsize::new(0),
            last_headers: Mutex::new(None),
        }
    }

    /// Backend whose forward pass always fails
    pub fn failing(message: &'static str) -> Self {
        Self::new(move |_| Err(ServeError::inference(message)))
    }

    /// `[batch, seq_len, vocab]` logits that put `targets[i]` (in order)
    /// on the mask positions of row `i`
    pub fn mask_filler(mask: TokenId, vocab: usize, targets: Vec<Vec<TokenId>>) -> Self {
        Self::new(move |batch| {
            let mut logits = vec![0.0f32; batch.batch_size() * batch.seq_len * vocab];
            for (i, row) in batch.input_ids.iter().enumerate() {
                let mut next = targets.get(i).into_iter().flatten();
                for (j, id) in row.iter().enumerate() {
                    if *id == mask {
                        if let Some(target) = next.next() {
                            logits[(i * batch.seq_len + j) * vocab + target.get() as usize] = 8.0;
                        }
                    }
                }
            }
            Ok(vec![HostTensor::f32(
                "logits",
                vec![batch.batch_size(), batch.seq_len, vocab],
                logits,
            )?])
        })
    }

    /// `[batch, classes]` logits, the same row for every instance
    pub fn constant_logits(row: Vec<f32>) -> Self {
        Self::new(move |batch| {
            let data = row.iter().copied().cycle().take(row.len() * batch.batch_size()).collect();
            Ok(vec![HostTensor::f32(
                "logits",
                vec![batch.batch_size(), row.len()],
                data,
            )?])
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_headers(&self) -> Option<RequestHeaders> {
        self.last_headers.lock().clone()
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    async fn forward(
        &self,
        batch: &TokenizedBatch,
        headers: &RequestHeaders,
    ) -> Result<Vec<HostTensor>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_headers.lock() = Some(headers.clone());
        (self.forward)(batch)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Generator that replays a token script, one token per step. After the
/// script runs out it keeps producing the last token.
pub struct ScriptedGenerator {
    architecture: ArchitectureClass,
    vocab_size: usize,
    script: Vec<TokenId>,
    repeat: bool,
    fail_at: Mutex<Option<usize>>,
    step_delay: Option<Duration>,
    steps: Arc<AtomicUsize>,
    prompts: Mutex<Vec<Vec<TokenId>>>,
}

impl ScriptedGenerator {
    pub fn new(architecture: ArchitectureClass, vocab_size: usize, script: Vec<TokenId>) -> Self {
        Self {
            architecture,
            vocab_size,
            script,
            repeat: false,
            fail_at: Mutex::new(None),
            step_delay: None,
            steps: Arc::new(AtomicUsize::new(0)),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Generator emitting `token` forever
    pub fn repeating(architecture: ArchitectureClass, vocab_size: usize, token: TokenId) -> Self {
        Self {
            repeat: true,
            ..Self::new(architecture, vocab_size, vec![token])
        }
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = Some(delay);
        self
    }

    /// Make step `step` (0-based) of every later session fail
    pub fn fail_at(&self, step: usize) {
        *self.fail_at.lock() = Some(step);
    }

    /// Steps taken across all sessions
    pub fn steps(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.steps)
    }

    /// Prompts every session was started with
    pub fn prompts(&self) -> Vec<Vec<TokenId>> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn start(
        &self,
        prompt: &[TokenId],
        _headers: &RequestHeaders,
    ) -> Result<Box<dyn GenerationSession>> {
        self.prompts.lock().push(prompt.to_vec());
        Ok(Box::new(ScriptedSession {
            script: self.script.clone(),
            repeat: self.repeat,
            vocab_size: self.vocab_size,
            fail_at: *self.fail_at.lock(),
            step_delay: self.step_delay,
            steps: Arc::clone(&self.steps),
            position: 0,
        }))
    }

    fn architecture(&self) -> ArchitectureClass {
        self.architecture
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedSession {
    script: Vec<TokenId>,
    repeat: bool,
    vocab_size: usize,
    fail_at: Option<usize>,
    step_delay: Option<Duration>,
    steps: Arc<AtomicUsize>,
    position: usize,
}

#[async_trait]
impl GenerationSession for ScriptedSession {
    async fn next_logits(&mut self, _last: Option<TokenId>) -> Result<Vec<f32>> {
        if let Some(delay) = self.step_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_at == Some(self.position) {
            return Err(ServeError::inference("scripted generation failure"));
        }
        self.steps.fetch_add(1, Ordering::SeqCst);

        let index = if self.repeat {
            0
        } else {
            self.position.min(self.script.len().saturating_sub(1))
        };
        self.position += 1;

        let mut logits = vec![0.0f32; self.vocab_size];
        if let Some(token) = self.script.get(index) {
            logits[token.get() as usize] = 10.0;
        }
        Ok(logits)
    }
}

/// Encoder model over the lower-casing fixture tokenizer
pub fn encoder_model(
    task: MLTask,
    labels: Vec<&str>,
    backend: Arc<dyn InferenceBackend>,
) -> Result<EncoderModel> {
    encoder_model_with(fixture_tokenizer(), task, labels, backend)
}

/// Encoder model over any tokenizer
pub fn encoder_model_with(
    tokenizer: Arc<dyn Tokenizer>,
    task: MLTask,
    labels: Vec<&str>,
    backend: Arc<dyn InferenceBackend>,
) -> Result<EncoderModel> {
    let handler = TaskHandler::for_task(
        task,
        Labels::new(labels.into_iter().map(String::from).collect()),
        vec!["O".to_string()],
        PoolingStrategy::Mean,
    )?;
    Ok(EncoderModel::new(EncoderCore::new(
        "test-encoder",
        tokenizer,
        backend,
        handler,
    )))
}

/// Generative model over the lower-casing fixture tokenizer, `[SEP]` as eos
pub fn generative_model(generator: Arc<dyn TextGenerator>) -> GenerativeModel {
    let tokenizer = fixture_tokenizer();
    let task = match generator.architecture() {
        ArchitectureClass::EncoderDecoder => MLTask::Text2textGeneration,
        _ => MLTask::TextGeneration,
    };
    let eos = tokenizer.special_tokens().eos_token.into_iter().collect();
    GenerativeModel::new(GenerativeCore::new(
        "test-generator",
        task,
        tokenizer,
        generator,
        eos,
    ))
}
