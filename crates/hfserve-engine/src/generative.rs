//! OpenAI-style completions and chat completions over a text generator
//!
//! Requests are validated against the model's architecture class before
//! any tokenization happens. Full and streamed responses are assembled from
//! the same [`Generation`] loop.

use futures::future::try_join_all;
use futures::stream::{self, Stream, StreamExt};
use hfserve_interfaces::{TextGenerator, Tokenizer};
use hfserve_types::{
    ArchitectureClass, BatchRequest, ChatChoice, ChatChunkChoice, ChatCompletion,
    ChatCompletionChunk, ChatCompletionRequest, ChatDelta, ChatMessage, Completion,
    CompletionChoice, CompletionRequest, GeneratedText, Instance, MLTask, MessageRole,
    PredictionResult, Prompt, RequestHeaders, RequestId, Result, SamplingParams, ServeError,
    StopSequences, StreamChunk, TokenId, Usage,
};
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::generation::{Generation, GenerationJob};
use crate::handle::ModelHandle;

/// Fallback when neither the load config nor the model declares a length
const DEFAULT_MAX_LENGTH: usize = 20;

/// Prompt tokens kept as decode context for decoder-only streams
const DECODE_CONTEXT_TOKENS: usize = 5;

pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<Completion>> + Send>>;
pub type ChatCompletionStream = Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk>> + Send>>;

/// A completion, in full or as a stream of `text_completion` chunks
pub enum CompletionResponse {
    Full(Completion),
    Stream(CompletionStream),
}

/// A chat completion, in full or as `chat.completion.chunk` objects
pub enum ChatCompletionResponse {
    Full(ChatCompletion),
    Stream(ChatCompletionStream),
}

/// Loaded state of a generative model
pub struct GenerativeCore {
    name: String,
    task: MLTask,
    architecture: ArchitectureClass,
    tokenizer: Arc<dyn Tokenizer>,
    generation: Generation,
    max_length: usize,
    add_special_tokens: bool,
}

impl GenerativeCore {
    pub fn new(
        name: impl Into<String>,
        task: MLTask,
        tokenizer: Arc<dyn Tokenizer>,
        generator: Arc<dyn TextGenerator>,
        eos_tokens: Vec<TokenId>,
    ) -> Self {
        let architecture = generator.architecture();
        Self {
            name: name.into(),
            task,
            architecture,
            generation: Generation::new(generator, Arc::clone(&tokenizer), eos_tokens),
            tokenizer,
            max_length: DEFAULT_MAX_LENGTH,
            add_special_tokens: true,
        }
    }

    /// Length cap applied when a request sets no `max_tokens`
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn with_add_special_tokens(mut self, add_special_tokens: bool) -> Self {
        self.add_special_tokens = add_special_tokens;
        self
    }

    pub fn architecture(&self) -> ArchitectureClass {
        self.architecture
    }

    fn check_model(&self, model: &str) -> Result<()> {
        if model != self.name {
            return Err(ServeError::request_validation(format!(
                "Model {} does not match the served model {}",
                model, self.name
            )));
        }
        Ok(())
    }

    fn encode(&self, text: &str) -> Result<Vec<TokenId>> {
        let tokens = self.tokenizer.encode(text, self.add_special_tokens)?;
        if tokens.is_empty() {
            return Err(ServeError::request_validation("Prompt encodes to no tokens"));
        }
        Ok(tokens)
    }

    /// Prompt tokens and the text echoed back for them
    fn prompt(&self, prompt: Option<&Prompt>) -> Result<(Vec<TokenId>, String)> {
        let single = |n: usize| {
            if n == 1 {
                Ok(())
            } else {
                Err(unsupported("multiple prompts"))
            }
        };
        let from_ids = |ids: &[u32]| -> Result<(Vec<TokenId>, String)> {
            if ids.is_empty() {
                return Err(ServeError::request_validation("'prompt' must not be empty"));
            }
            let vocab_size = self.tokenizer.vocab_size();
            if let Some(id) = ids.iter().find(|&&id| id as usize >= vocab_size) {
                return Err(ServeError::request_validation(format!(
                    "Prompt token {} is outside the vocabulary of {} tokens",
                    id, vocab_size
                )));
            }
            let tokens: Vec<TokenId> = ids.iter().copied().map(TokenId::new).collect();
            let text = self.tokenizer.decode(&tokens, true)?;
            Ok((tokens, text))
        };

        match prompt {
            None => Err(ServeError::request_validation("'prompt' is required")),
            Some(Prompt::Text(text)) => Ok((self.encode(text)?, text.clone())),
            Some(Prompt::Texts(texts)) => {
                single(texts.len())?;
                Ok((self.encode(&texts[0])?, texts[0].clone()))
            }
            Some(Prompt::Tokens(ids)) => from_ids(ids.as_slice()),
            Some(Prompt::TokenBatches(batches)) => {
                single(batches.len())?;
                from_ids(batches[0].as_slice())
            }
        }
    }

    /// Generation budget. Without `max_tokens` the model's `max_length`
    /// applies, counted over prompt plus output for decoder-only models.
    fn max_new_tokens(&self, max_tokens: Option<u32>, prompt_len: usize) -> Result<usize> {
        match max_tokens {
            Some(0) => Err(ServeError::request_validation(
                "'max_tokens' must be at least 1",
            )),
            Some(n) => Ok(n as usize),
            None if self.architecture == ArchitectureClass::EncoderDecoder => Ok(self.max_length),
            None => match self.max_length.checked_sub(prompt_len) {
                Some(n) if n > 0 => Ok(n),
                _ => Err(ServeError::request_validation(format!(
                    "Prompt of {} tokens already reaches the maximum length of {}; set 'max_tokens'",
                    prompt_len, self.max_length
                ))),
            },
        }
    }

    fn sampling_params(
        &self,
        options: &GenerationOptions,
        prompt_len: usize,
    ) -> Result<SamplingParams> {
        let params = SamplingParams {
            max_new_tokens: self.max_new_tokens(options.max_tokens, prompt_len)?,
            temperature: options.temperature.unwrap_or(0.0),
            top_p: options.top_p.unwrap_or(1.0),
            stop_sequences: options
                .stop
                .clone()
                .map(StopSequences::into_vec)
                .unwrap_or_default(),
            seed: options.seed,
        };
        params.validate()?;
        Ok(params)
    }

    fn job(
        &self,
        prompt: Vec<TokenId>,
        params: SamplingParams,
        headers: &RequestHeaders,
    ) -> GenerationJob {
        let decode_context = match self.architecture {
            ArchitectureClass::EncoderDecoder => Vec::new(),
            _ => prompt[prompt.len().saturating_sub(DECODE_CONTEXT_TOKENS)..].to_vec(),
        };
        GenerationJob {
            request_id: RequestId::new(),
            prompt,
            decode_context,
            params,
            headers: headers.clone(),
        }
    }
}

/// Generation knobs shared by both request shapes
#[derive(Debug, Clone, Default)]
struct GenerationOptions {
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    stop: Option<StopSequences>,
    seed: Option<u64>,
}

fn unsupported(param: &str) -> ServeError {
    ServeError::request_validation(format!("'{}' is not supported", param))
}

/// First parameter in `checks` that is set, as a validation error
fn reject_unsupported(checks: &[(&str, bool)]) -> Result<()> {
    match checks.iter().find(|(_, set)| *set) {
        Some((param, _)) => Err(unsupported(param)),
        None => Ok(()),
    }
}

fn nonzero(penalty: Option<f32>) -> bool {
    penalty.map_or(false, |p| p != 0.0)
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Serves completion and chat completion requests
pub struct GenerativeModel {
    handle: ModelHandle<GenerativeCore>,
    task: MLTask,
    architecture: ArchitectureClass,
}

impl GenerativeModel {
    pub fn new(core: GenerativeCore) -> Self {
        let task = core.task;
        let architecture = core.architecture;
        Self {
            handle: ModelHandle::ready(core.name.clone(), core),
            task,
            architecture,
        }
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }

    pub fn task(&self) -> MLTask {
        self.task
    }

    pub fn architecture(&self) -> ArchitectureClass {
        self.architecture
    }

    pub fn is_ready(&self) -> bool {
        self.handle.is_ready()
    }

    /// Stop admitting requests; running generations and streams finish
    pub fn stop(&self) -> bool {
        self.handle.stop()
    }

    #[instrument(skip_all, fields(model = %self.name(), stream = request.is_stream()))]
    pub async fn create_completion(
        &self,
        request: CompletionRequest,
        headers: &RequestHeaders,
    ) -> Result<CompletionResponse> {
        let core = self.handle.acquire()?;
        core.check_model(&request.model)?;
        reject_unsupported(&[
            ("best_of", request.best_of.map_or(false, |b| b > 1)),
            ("n", request.n.map_or(false, |n| n > 1)),
            ("logprobs", request.logprobs.is_some()),
            ("suffix", request.suffix.is_some()),
            ("logit_bias", request.logit_bias.as_ref().map_or(false, |b| !b.is_empty())),
            ("presence_penalty", nonzero(request.presence_penalty)),
            ("frequency_penalty", nonzero(request.frequency_penalty)),
        ])?;
        let echo = request.echo.unwrap_or(false);
        if echo && core.architecture == ArchitectureClass::EncoderDecoder {
            return Err(ServeError::request_validation(
                "'echo' is not supported by encoder-decoder models",
            ));
        }

        let (prompt, prompt_text) = core.prompt(request.prompt.as_ref())?;
        let options = GenerationOptions {
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            stop: request.stop.clone(),
            seed: request.seed,
        };
        let params = core.sampling_params(&options, prompt.len())?;
        let job = core.job(prompt, params, headers);
        let id = format!("cmpl-{}", job.request_id.simple());
        let model = core.name.clone();
        let created = now();
        debug!(request_id = %job.request_id, prompt_tokens = job.prompt.len(), echo, "Completion admitted");

        if !request.is_stream() {
            let output = core.generation.run(job).await?;
            let text = if echo {
                prompt_text + &output.text
            } else {
                output.text
            };
            return Ok(CompletionResponse::Full(Completion {
                id,
                object: "text_completion".to_string(),
                created,
                model,
                choices: vec![CompletionChoice {
                    text,
                    index: 0,
                    logprobs: None,
                    finish_reason: Some(output.finish_reason.as_openai_str().to_string()),
                }],
                usage: Some(Usage::from(output.usage)),
            }));
        }

        let chunk = move |text: String, finish_reason: Option<String>, usage: Option<Usage>| {
            Completion {
                id: id.clone(),
                object: "text_completion".to_string(),
                created,
                model: model.clone(),
                choices: vec![CompletionChoice {
                    text,
                    index: 0,
                    logprobs: None,
                    finish_reason,
                }],
                usage,
            }
        };
        let echoed: Option<Result<Completion>> =
            echo.then(|| Ok(chunk(prompt_text, None, None)));
        let deltas = core.generation.stream(job).map(move |item| {
            item.map(|c: StreamChunk| {
                chunk(
                    c.text,
                    c.finish_reason.map(|r| r.as_openai_str().to_string()),
                    c.usage.map(Usage::from),
                )
            })
        });
        Ok(CompletionResponse::Stream(Box::pin(
            stream::iter(echoed).chain(deltas),
        )))
    }

    #[instrument(skip_all, fields(model = %self.name(), stream = request.is_stream()))]
    pub async fn create_chat_completion(
        &self,
        request: ChatCompletionRequest,
        headers: &RequestHeaders,
    ) -> Result<ChatCompletionResponse> {
        let core = self.handle.acquire()?;
        core.check_model(&request.model)?;
        reject_unsupported(&[
            ("n", request.n.map_or(false, |n| n > 1)),
            ("logprobs", request.logprobs.unwrap_or(false)),
            ("top_logprobs", request.top_logprobs.is_some()),
            ("logit_bias", request.logit_bias.as_ref().map_or(false, |b| !b.is_empty())),
            ("presence_penalty", nonzero(request.presence_penalty)),
            ("frequency_penalty", nonzero(request.frequency_penalty)),
        ])?;
        if request.messages.is_empty() {
            return Err(ServeError::request_validation("'messages' must not be empty"));
        }

        let prompt_text = core.tokenizer.apply_chat_template(&request.messages, true)?;
        let prompt = core.encode(&prompt_text)?;
        let options = GenerationOptions {
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            stop: request.stop.clone(),
            seed: request.seed,
        };
        let params = core.sampling_params(&options, prompt.len())?;
        let job = core.job(prompt, params, headers);
        let id = format!("chatcmpl-{}", job.request_id.simple());
        let model = core.name.clone();
        let created = now();
        debug!(request_id = %job.request_id, messages = request.messages.len(), "Chat completion admitted");

        if !request.is_stream() {
            let output = core.generation.run(job).await?;
            return Ok(ChatCompletionResponse::Full(ChatCompletion {
                id,
                object: "chat.completion".to_string(),
                created,
                model,
                choices: vec![ChatChoice {
                    index: 0,
                    message: ChatMessage::assistant(output.text),
                    finish_reason: Some(output.finish_reason.as_openai_str().to_string()),
                }],
                usage: Some(Usage::from(output.usage)),
            }));
        }

        let mut first = true;
        let chunks = core.generation.stream(job).map(move |item| {
            item.map(|c: StreamChunk| {
                let role = std::mem::take(&mut first).then_some(MessageRole::Assistant);
                ChatCompletionChunk {
                    id: id.clone(),
                    object: "chat.completion.chunk".to_string(),
                    created,
                    model: model.clone(),
                    choices: vec![ChatChunkChoice {
                        index: 0,
                        delta: ChatDelta {
                            role,
                            content: Some(c.text),
                        },
                        finish_reason: c.finish_reason.map(|r| r.as_openai_str().to_string()),
                    }],
                    usage: c.usage.map(Usage::from),
                }
            })
        });
        Ok(ChatCompletionResponse::Stream(Box::pin(chunks)))
    }

    /// Batch predict: each instance runs as a default-parameter completion
    #[instrument(skip_all, fields(model = %self.name(), instances = request.len()))]
    pub async fn predict(
        &self,
        request: &BatchRequest,
        headers: &RequestHeaders,
    ) -> Result<PredictionResult> {
        let core = self.handle.acquire()?;
        if request.is_empty() {
            return Err(ServeError::request_validation(
                "Batch request must contain at least one instance",
            ));
        }

        let jobs = request
            .instances
            .iter()
            .map(|instance| {
                let prompt = match instance {
                    Instance::Text(text) => core.encode(text)?,
                    Instance::Messages(messages) => {
                        core.encode(&core.tokenizer.apply_chat_template(messages, true)?)?
                    }
                };
                let params = core.sampling_params(&GenerationOptions::default(), prompt.len())?;
                Ok(core.job(prompt, params, headers))
            })
            .collect::<Result<Vec<_>>>()?;

        let outputs = try_join_all(jobs.into_iter().map(|job| core.generation.run(job))).await?;
        Ok(PredictionResult::Generation(
            outputs
                .into_iter()
                .map(|output| GeneratedText {
                    text: output.text,
                    finish_reason: output.finish_reason,
                    usage: output.usage,
                })
                .collect(),
        ))
    }
}
