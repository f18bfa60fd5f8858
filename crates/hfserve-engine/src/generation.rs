//! The generation loop shared by full and streamed completions
//!
//! Both modes run the same loop and differ only in where text deltas go,
//! which keeps streamed and non-streamed output identical for identical
//! parameters. Streams are fed by a spawned producer over a bounded
//! channel; the producer stops as soon as the consumer goes away.

use async_trait::async_trait;
use futures::Stream;
use hfserve_interfaces::{TextGenerator, Tokenizer};
use hfserve_tokenizer::IncrementalDecoder;
use hfserve_types::{
    FinishReason, GenerationOutput, RequestHeaders, RequestId, Result, SamplingParams, ServeError,
    StreamChunk, TokenId, TokenUsage,
};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::sampling::SamplingPipeline;
use crate::stop::StopSequenceMatcher;

/// Bound of the per-stream chunk channel
const STREAM_BUFFER: usize = 16;

/// Boxed stream of generation chunks
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// One generation to run
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub request_id: RequestId,
    /// Encoded prompt handed to the generator
    pub prompt: Vec<TokenId>,
    /// Tokens that precede the output in the decoded text. Decoder-only
    /// models pass the tail of the prompt so the first delta keeps its
    /// leading space.
    pub decode_context: Vec<TokenId>,
    /// `max_new_tokens`, stop sequences, temperature, top-p, seed
    pub params: SamplingParams,
    pub headers: RequestHeaders,
}

/// Runs generation jobs against one generator
#[derive(Clone)]
pub struct Generation {
    generator: Arc<dyn TextGenerator>,
    tokenizer: Arc<dyn Tokenizer>,
    eos_tokens: Vec<TokenId>,
}

impl Generation {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        tokenizer: Arc<dyn Tokenizer>,
        eos_tokens: Vec<TokenId>,
    ) -> Self {
        Self {
            generator,
            tokenizer,
            eos_tokens,
        }
    }

    /// Generate to completion
    pub async fn run(&self, job: GenerationJob) -> Result<GenerationOutput> {
        self.drive(job, &mut Discard).await
    }

    /// Generate lazily. Deltas arrive in order; the final chunk carries the
    /// finish reason and usage. A failure ends the stream with the error
    /// instead of a final chunk.
    pub fn stream(&self, job: GenerationJob) -> ChunkStream {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let generation = self.clone();
        let request_id = job.request_id.clone();

        tokio::spawn(async move {
            let mut sink = ChannelSink {
                tx: tx.clone(),
                request_id: request_id.clone(),
                index: 0,
            };
            tokio::select! {
                result = generation.drive(job, &mut sink) => {
                    let message = match result {
                        Ok(output) => Ok(StreamChunk::finish(
                            request_id,
                            sink.index,
                            String::new(),
                            output.finish_reason,
                            output.usage,
                        )),
                        Err(e) => {
                            warn!(request_id = %request_id, error = %e, "Streaming generation failed");
                            Err(e)
                        }
                    };
                    let _ = tx.send(message).await;
                }
                _ = tx.closed() => {
                    debug!(request_id = %request_id, "Stream consumer went away; generation stopped");
                }
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }

    async fn drive<S: DeltaSink>(&self, job: GenerationJob, sink: &mut S) -> Result<GenerationOutput> {
        let tokenizer = self.tokenizer.as_ref();
        let mut session = self.generator.start(&job.prompt, &job.headers).await?;
        let mut sampling = SamplingPipeline::from_params(&job.params);
        let mut decoder = IncrementalDecoder::with_context(&job.decode_context, true);
        let mut stops = StopSequenceMatcher::new(job.params.stop_sequences.clone());

        let mut generated: Vec<TokenId> = Vec::new();
        let mut unreported: Vec<TokenId> = Vec::new();
        let mut text = String::new();
        let mut finish_reason = FinishReason::Length;
        let mut last = None;

        for step in 0..job.params.max_new_tokens {
            let mut logits = session.next_logits(last).await?;
            let token = sampling.next_token(step, &mut logits, &generated)?;
            if self.eos_tokens.contains(&token) {
                finish_reason = FinishReason::EOS;
                break;
            }

            generated.push(token);
            unreported.push(token);
            last = Some(token);

            if let Some(delta) = decoder.push(tokenizer, token)? {
                let check = stops.push(&delta);
                if !check.emit.is_empty() {
                    text.push_str(&check.emit);
                    sink.emit(check.emit, std::mem::take(&mut unreported)).await?;
                }
                if check.stopped {
                    finish_reason = FinishReason::Stop;
                    break;
                }
            }
        }

        if !stops.is_stopped() {
            let mut tail = String::new();
            if let Some(rest) = decoder.flush(tokenizer)? {
                let check = stops.push(&rest);
                tail.push_str(&check.emit);
                if check.stopped {
                    finish_reason = FinishReason::Stop;
                }
            }
            tail.push_str(&stops.finish());
            if !tail.is_empty() {
                text.push_str(&tail);
                sink.emit(tail, std::mem::take(&mut unreported)).await?;
            }
        }

        debug!(
            request_id = %job.request_id,
            generator = self.generator.name(),
            prompt_tokens = job.prompt.len(),
            completion_tokens = generated.len(),
            ?finish_reason,
            "Generation finished"
        );
        Ok(GenerationOutput {
            text,
            usage: TokenUsage::new(job.prompt.len(), generated.len()),
            tokens: generated,
            finish_reason,
        })
    }
}

/// Destination of visible text deltas
#[async_trait]
trait DeltaSink: Send {
    async fn emit(&mut self, text: String, tokens: Vec<TokenId>) -> Result<()>;
}

/// Full generations only need the accumulated text
struct Discard;

#[async_trait]
impl DeltaSink for Discard {
    async fn emit(&mut self, _text: String, _tokens: Vec<TokenId>) -> Result<()> {
        Ok(())
    }
}

struct ChannelSink {
    tx: mpsc::Sender<Result<StreamChunk>>,
    request_id: RequestId,
    index: usize,
}

#[async_trait]
impl DeltaSink for ChannelSink {
    async fn emit(&mut self, text: String, tokens: Vec<TokenId>) -> Result<()> {
        let chunk = StreamChunk::delta(self.request_id.clone(), self.index, text, tokens);
        self.tx
            .send(Ok(chunk))
            .await
            .map_err(|_| ServeError::cancelled("stream consumer dropped"))?;
        self.index += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{fixture_tokenizer, token_ids, ScriptedGenerator};
    use futures::StreamExt;
    use hfserve_types::ArchitectureClass;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn job(params: SamplingParams) -> GenerationJob {
        GenerationJob {
            request_id: RequestId::new(),
            prompt: vec![TokenId::new(2), TokenId::new(3)],
            decode_context: vec![],
            params,
            headers: RequestHeaders::new(),
        }
    }

    fn generation(script: &[&str]) -> (Generation, Arc<ScriptedGenerator>) {
        let tokenizer = fixture_tokenizer();
        let generator = Arc::new(ScriptedGenerator::new(
            ArchitectureClass::EncoderDecoder,
            tokenizer.vocab_size(),
            token_ids(tokenizer.as_ref(), script),
        ));
        let eos = tokenizer.special_tokens().eos_token.into_iter().collect();
        (Generation::new(generator.clone(), tokenizer, eos), generator)
    }

    #[tokio::test]
    async fn stops_at_eos() {
        let (generation, _) = generation(&["wir", "setzen", "worte", "[SEP]"]);
        let output = generation.run(job(SamplingParams::greedy())).await.unwrap();
        assert_eq!(output.text, "wir setzen worte");
        assert_eq!(output.finish_reason, FinishReason::EOS);
        assert_eq!(output.usage, TokenUsage::new(2, 3));
    }

    #[tokio::test]
    async fn stops_at_max_tokens() {
        let (generation, _) = generation(&["wir", "setzen", "worte", "[SEP]"]);
        let output = generation
            .run(job(SamplingParams::greedy().with_max_new_tokens(2)))
            .await
            .unwrap();
        assert_eq!(output.text, "wir setzen");
        assert_eq!(output.finish_reason, FinishReason::Length);
    }

    #[tokio::test]
    async fn stop_sequence_is_excluded() {
        let (generation, _) = generation(&["hello", "world", "!", "my", "dog", "[SEP]"]);
        let params = SamplingParams::greedy().with_stop_sequences(vec!["!".to_string()]);
        let output = generation.run(job(params)).await.unwrap();
        assert_eq!(output.text, "hello world");
        assert_eq!(output.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn streamed_text_matches_full_text() {
        let script = ["hello", "my", "dog", "is", "cute", ".", "[SEP]"];
        let (generation, _) = generation(&script);
        let full = generation.run(job(SamplingParams::greedy())).await.unwrap();

        let chunks: Vec<StreamChunk> = generation
            .stream(job(SamplingParams::greedy()))
            .map(|c| c.unwrap())
            .collect()
            .await;
        let streamed: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(streamed, full.text);

        let finals: Vec<&StreamChunk> = chunks.iter().filter(|c| c.is_final()).collect();
        assert_eq!(finals.len(), 1);
        assert!(chunks.last().unwrap().is_final());
        assert_eq!(finals[0].usage, Some(full.usage));
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
        }
    }

    #[tokio::test]
    async fn failure_ends_stream_without_final_chunk() {
        let (generation, generator) = generation(&["hello", "my", "dog", "[SEP]"]);
        generator.fail_at(2);
        let items: Vec<Result<StreamChunk>> =
            generation.stream(job(SamplingParams::greedy())).collect().await;

        assert!(items.last().unwrap().is_err());
        assert!(items.iter().filter_map(|i| i.as_ref().ok()).all(|c| !c.is_final()));
    }

    #[tokio::test]
    async fn dropping_the_stream_stops_generation() {
        let tokenizer = fixture_tokenizer();
        let generator = Arc::new(
            ScriptedGenerator::repeating(
                ArchitectureClass::DecoderOnly,
                tokenizer.vocab_size(),
                tokenizer.token_id("hello").unwrap(),
            )
            .with_step_delay(Duration::from_millis(5)),
        );
        let generation = Generation::new(generator.clone(), tokenizer, vec![]);
        let params = SamplingParams::greedy().with_max_new_tokens(10_000);

        let mut stream = generation.stream(job(params));
        stream.next().await.unwrap().unwrap();
        drop(stream);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let steps = generator.steps().load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(generator.steps().load(Ordering::SeqCst), steps);
        assert!(steps < 10_000);
    }
}
