//! Encoder request pipeline: tokenize, forward, postprocess

use hfserve_interfaces::{EncodeOptions, InferenceBackend, TokenizedBatch, Tokenizer};
use hfserve_types::{
    BatchRequest, Instance, MLTask, PredictionResult, RequestHeaders, Result, ServeError,
};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::handle::ModelHandle;
use crate::postprocess::{PostprocessContext, TaskHandler};

/// Loaded state of an encoder model
pub struct EncoderCore {
    name: String,
    tokenizer: Arc<dyn Tokenizer>,
    backend: Arc<dyn InferenceBackend>,
    handler: TaskHandler,
    encode_options: EncodeOptions,
}

impl EncoderCore {
    pub fn new(
        name: impl Into<String>,
        tokenizer: Arc<dyn Tokenizer>,
        backend: Arc<dyn InferenceBackend>,
        handler: TaskHandler,
    ) -> Self {
        let encode_options = EncodeOptions {
            add_special_tokens: true,
            max_length: tokenizer.model_max_length(),
        };
        Self {
            name: name.into(),
            tokenizer,
            backend,
            handler,
            encode_options,
        }
    }

    /// Special-token policy and truncation length used for every batch
    pub fn with_encode_options(mut self, options: EncodeOptions) -> Self {
        self.encode_options = options;
        self
    }

    pub fn task(&self) -> MLTask {
        self.handler.task()
    }

    pub fn backend(&self) -> &Arc<dyn InferenceBackend> {
        &self.backend
    }

    /// Text of every instance; rejects requests the task can't serve
    fn instance_texts<'r>(&self, request: &'r BatchRequest) -> Result<Vec<&'r str>> {
        if request.is_empty() {
            return Err(ServeError::request_validation(
                "Batch request must contain at least one instance",
            ));
        }
        request
            .instances
            .iter()
            .enumerate()
            .map(|(i, instance)| match instance {
                Instance::Text(text) => Ok(text.as_str()),
                Instance::Messages(_) => Err(ServeError::request_validation(format!(
                    "Instance {} is a message list; {} expects text instances",
                    i,
                    self.task()
                ))),
            })
            .collect()
    }

    fn check_lengths(&self, batch: &TokenizedBatch) -> Result<()> {
        match (0..batch.batch_size()).find(|&i| batch.sequence_length(i) == 0) {
            Some(i) => Err(ServeError::request_validation(format!(
                "Instance {} encodes to no tokens",
                i
            ))),
            None => Ok(()),
        }
    }

    fn check_masks(&self, batch: &TokenizedBatch) -> Result<()> {
        let mask = self.tokenizer.special_tokens().mask_token.ok_or_else(|| {
            ServeError::request_validation(format!(
                "Model {} has no mask token to fill",
                self.name
            ))
        })?;
        if let Some(i) = batch.input_ids.iter().position(|row| !row.contains(&mask)) {
            return Err(ServeError::request_validation(format!(
                "Instance {} contains no mask token",
                i
            )));
        }
        Ok(())
    }
}

/// Serves mask fill, classification and embedding requests
pub struct EncoderModel {
    handle: ModelHandle<EncoderCore>,
    task: MLTask,
}

impl EncoderModel {
    pub fn new(core: EncoderCore) -> Self {
        let task = core.task();
        Self {
            handle: ModelHandle::ready(core.name.clone(), core),
            task,
        }
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }

    pub fn task(&self) -> MLTask {
        self.task
    }

    pub fn is_ready(&self) -> bool {
        self.handle.is_ready()
    }

    /// Stop admitting requests and release the backend once in-flight
    /// requests finish
    pub fn stop(&self) -> bool {
        self.handle.stop()
    }

    /// One prediction per instance, in request order
    #[instrument(skip_all, fields(model = %self.name(), request_id = %request.id, instances = request.len()))]
    pub async fn predict(
        &self,
        request: &BatchRequest,
        headers: &RequestHeaders,
    ) -> Result<PredictionResult> {
        let core = self.handle.acquire()?;
        let texts = core.instance_texts(request)?;

        let batch = core.tokenizer.encode_batch(&texts, &core.encode_options)?;
        core.check_lengths(&batch)?;
        if core.task() == MLTask::MaskedLanguageModeling {
            core.check_masks(&batch)?;
        }
        debug!(seq_len = batch.seq_len, backend = core.backend.name(), "Running forward pass");

        let outputs = core.backend.forward(&batch, headers).await?;
        let ctx = PostprocessContext {
            batch: &batch,
            texts: &texts,
            tokenizer: core.tokenizer.as_ref(),
        };
        let predictions = core.handler.postprocess(&outputs, &ctx)?;
        if predictions.len() != request.len() {
            return Err(ServeError::inference(format!(
                "Produced {} predictions for {} instances",
                predictions.len(),
                request.len()
            )));
        }
        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postprocess::Labels;
    use crate::test_utils::{encoder_model, fixture_tokenizer, token_ids, ScriptedBackend};
    use hfserve_types::{ChatMessage, PoolingStrategy};

    fn mask_filler(targets: &[&str]) -> Arc<ScriptedBackend> {
        let tokenizer = fixture_tokenizer();
        let mask = tokenizer.special_tokens().mask_token.unwrap();
        let targets = targets
            .iter()
            .map(|t| token_ids(tokenizer.as_ref(), &[t]))
            .collect();
        Arc::new(ScriptedBackend::mask_filler(
            mask,
            tokenizer.vocab_size(),
            targets,
        ))
    }

    #[tokio::test]
    async fn fills_masks_in_request_order() {
        let model =
            encoder_model(MLTask::MaskedLanguageModeling, vec![], mask_filler(&["paris", "france"]))
                .unwrap();
        let request = BatchRequest::new([
            "The capital of France is [MASK].",
            "Paris is the capital of [MASK].",
        ]);
        let predictions = model.predict(&request, &RequestHeaders::new()).await.unwrap();
        assert_eq!(
            predictions,
            PredictionResult::FillMask(vec!["paris".to_string(), "france".to_string()])
        );
    }

    #[tokio::test]
    async fn identical_instances_get_identical_classifications() {
        let backend = Arc::new(ScriptedBackend::constant_logits(vec![-1.0, 2.5]));
        let model = encoder_model(
            MLTask::SequenceClassification,
            vec!["negative", "positive"],
            backend,
        )
        .unwrap();
        let request = BatchRequest::new(["a good movie", "a good movie"]);

        let PredictionResult::SequenceClassification(results) =
            model.predict(&request, &RequestHeaders::new()).await.unwrap()
        else {
            panic!("expected classification results");
        };
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], results[1]);
        assert_eq!(results[0].label, "positive");
        let total: f32 = results[0].probabilities.iter().map(|p| p.probability).sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn empty_batch_is_rejected_before_inference() {
        let backend = Arc::new(ScriptedBackend::constant_logits(vec![0.0, 1.0]));
        let model =
            encoder_model(MLTask::SequenceClassification, vec![], backend.clone()).unwrap();

        let err = model
            .predict(&BatchRequest::new(Vec::<String>::new()), &RequestHeaders::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ServeError::RequestValidation { .. }));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn fill_mask_without_mask_is_rejected_before_inference() {
        let backend = mask_filler(&["paris"]);
        let model =
            encoder_model(MLTask::MaskedLanguageModeling, vec![], backend.clone()).unwrap();
        let request = BatchRequest::new(["The capital of France is [MASK].", "hello world"]);

        let err = model.predict(&request, &RequestHeaders::new()).await.unwrap_err();
        assert!(matches!(err, ServeError::RequestValidation { .. }));
        assert!(err.to_string().contains("Instance 1"));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn message_instances_are_rejected() {
        let backend = Arc::new(ScriptedBackend::constant_logits(vec![0.0, 1.0]));
        let model = encoder_model(MLTask::SequenceClassification, vec![], backend).unwrap();
        let request = BatchRequest {
            id: Default::default(),
            instances: vec![Instance::Messages(vec![ChatMessage::user("hello")])],
        };
        let err = model.predict(&request, &RequestHeaders::new()).await.unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn forward_failure_aborts_the_request() {
        let backend = Arc::new(ScriptedBackend::failing("device lost"));
        let model = encoder_model(MLTask::TextEmbedding, vec![], backend).unwrap();
        let err = model
            .predict(&BatchRequest::new(["hello world"]), &RequestHeaders::new())
            .await
            .unwrap_err();
        assert!(err.is_inference_error());
        assert!(err.to_string().contains("device lost"));
    }

    #[tokio::test]
    async fn headers_reach_the_backend() {
        let backend = Arc::new(ScriptedBackend::constant_logits(vec![0.0, 1.0]));
        let model =
            encoder_model(MLTask::SequenceClassification, vec![], backend.clone()).unwrap();
        let mut headers = RequestHeaders::new();
        headers.insert("x-request-id".to_string(), "abc".to_string());

        model
            .predict(&BatchRequest::new(["hello"]), &headers)
            .await
            .unwrap();
        assert_eq!(backend.last_headers(), Some(headers));
    }

    #[tokio::test]
    async fn stopped_model_turns_requests_away() {
        let backend = Arc::new(ScriptedBackend::constant_logits(vec![0.0, 1.0]));
        let model = encoder_model(MLTask::SequenceClassification, vec![], backend).unwrap();
        assert!(model.stop());
        assert!(!model.is_ready());

        let err = model
            .predict(&BatchRequest::new(["hello"]), &RequestHeaders::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ServeError::ModelNotReady { .. }));
    }

    #[tokio::test]
    async fn instance_without_tokens_is_rejected_before_inference() {
        let backend = Arc::new(ScriptedBackend::constant_logits(vec![0.0, 1.0]));
        let handler = TaskHandler::for_task(
            MLTask::TextEmbedding,
            Labels::default(),
            vec![],
            PoolingStrategy::Cls,
        )
        .unwrap();
        let core = EncoderCore::new("embedder", fixture_tokenizer(), backend.clone(), handler)
            .with_encode_options(EncodeOptions {
                add_special_tokens: false,
                max_length: None,
            });
        let model = EncoderModel::new(core);

        let err = model
            .predict(&BatchRequest::new(["hello world", ""]), &RequestHeaders::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ServeError::RequestValidation { .. }));
        assert!(err.to_string().contains("Instance 1 encodes to no tokens"));
        assert_eq!(backend.calls(), 0);
    }
}
