//! Request flows through the public facade

use futures::StreamExt;
use hfserve::{
    ArchitectureClass, BatchRequest, ChatCompletionRequest, ChatCompletionResponse, ChatMessage,
    CompletionRequest, CompletionResponse, FinishReason, MLTask, ModelLoadConfig, ModelRegistry,
    PredictionResult, PredictorConfig, RequestHeaders, ServeError, ServedModel, StopSequences,
};
use hfserve_engine::test_utils::{
    encoder_model, fixture_tokenizer, generative_model, token_ids, write_fixture, ScriptedBackend,
    ScriptedGenerator,
};
use hfserve_interfaces::HostTensor;
use serde_json::json;
use std::sync::Arc;

fn completer(script: &[&str]) -> Arc<ScriptedGenerator> {
    let tokenizer = fixture_tokenizer();
    Arc::new(ScriptedGenerator::new(
        ArchitectureClass::DecoderOnly,
        tokenizer.vocab_size(),
        token_ids(tokenizer.as_ref(), script),
    ))
}

#[tokio::test]
async fn fill_mask_returns_one_word_per_instance() {
    let tokenizer = fixture_tokenizer();
    let backend = Arc::new(ScriptedBackend::mask_filler(
        tokenizer.special_tokens().mask_token.unwrap(),
        tokenizer.vocab_size(),
        vec![
            token_ids(tokenizer.as_ref(), &["paris"]),
            token_ids(tokenizer.as_ref(), &["france"]),
        ],
    ));
    let registry = ModelRegistry::new();
    let model = registry
        .register(encoder_model(MLTask::MaskedLanguageModeling, vec![], backend).unwrap())
        .unwrap();

    let request = BatchRequest::new([
        "The capital of France is [MASK].",
        "Paris is the capital of [MASK].",
    ]);
    let prediction = model.predict(&request, &RequestHeaders::new()).await.unwrap();
    assert_eq!(
        prediction,
        PredictionResult::FillMask(vec!["paris".into(), "france".into()])
    );
}

#[tokio::test]
async fn token_classification_tags_words_with_character_offsets() {
    let tokenizer = fixture_tokenizer();
    let paris = tokenizer.token_id("paris").unwrap();
    let backend = Arc::new(ScriptedBackend::new(move |batch| {
        let mut logits = Vec::with_capacity(batch.batch_size() * batch.seq_len * 2);
        for row in &batch.input_ids {
            for id in row {
                if *id == paris {
                    logits.extend([0.0, 4.0]);
                } else {
                    logits.extend([4.0, 0.0]);
                }
            }
        }
        Ok(vec![HostTensor::f32(
            "logits",
            vec![batch.batch_size(), batch.seq_len, 2],
            logits,
        )?])
    }));
    let model = encoder_model(MLTask::TokenClassification, vec!["O", "LOC"], backend).unwrap();

    let prediction = model
        .predict(&BatchRequest::new(["my dog is in paris"]), &RequestHeaders::new())
        .await
        .unwrap();
    let PredictionResult::TokenClassification(entities) = prediction else {
        panic!("expected entities");
    };
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].len(), 1);
    let entity = &entities[0][0];
    assert_eq!(entity.entity, "LOC");
    assert_eq!(entity.word, "paris");
    assert_eq!((entity.start, entity.end), (13, 18));
    assert_eq!(entity.index, 5);
}

#[tokio::test]
async fn streamed_completion_matches_the_full_one() {
    let model = generative_model(completer(&["dog", "is", "cute", ".", "[SEP]"]));
    let request = CompletionRequest::new("test-generator", "my dog is").with_max_tokens(10);

    let CompletionResponse::Full(full) = model
        .create_completion(request.clone(), &RequestHeaders::new())
        .await
        .unwrap()
    else {
        panic!("expected a full completion");
    };
    let CompletionResponse::Stream(stream) = model
        .create_completion(request.with_stream(true), &RequestHeaders::new())
        .await
        .unwrap()
    else {
        panic!("expected a stream");
    };
    let chunks: Vec<_> = stream.map(|c| c.unwrap()).collect().await;

    let streamed: String = chunks.iter().map(|c| c.choices[0].text.as_str()).collect();
    assert_eq!(streamed, full.choices[0].text);
    assert_eq!(
        chunks.last().unwrap().choices[0].finish_reason.as_deref(),
        Some(FinishReason::EOS.as_openai_str())
    );
}

#[tokio::test]
async fn stop_sequences_cut_the_output() {
    let model = generative_model(completer(&["dog", "is", "cute", ".", "[SEP]"]));
    let request = CompletionRequest::new("test-generator", "my")
        .with_max_tokens(10)
        .with_stop(StopSequences::One("cute".into()));

    let CompletionResponse::Full(completion) = model
        .create_completion(request, &RequestHeaders::new())
        .await
        .unwrap()
    else {
        panic!("expected a full completion");
    };
    assert!(!completion.choices[0].text.contains("cute"));
    assert!(completion.choices[0].text.starts_with("dog is"));
    assert_eq!(completion.choices[0].finish_reason.as_deref(), Some("stop"));
}

#[tokio::test]
async fn echo_prefixes_decoder_only_output_with_the_prompt() {
    let model = generative_model(completer(&["dog", "is", "cute", "[SEP]"]));
    let request = CompletionRequest::new("test-generator", "hello my")
        .with_max_tokens(10)
        .with_echo(true);

    let CompletionResponse::Full(completion) = model
        .create_completion(request, &RequestHeaders::new())
        .await
        .unwrap()
    else {
        panic!("expected a full completion");
    };
    assert!(completion.choices[0].text.starts_with("hello my"));
    assert!(completion.choices[0].text.ends_with("cute"));
}

#[tokio::test]
async fn chat_completion_answers_as_the_assistant() {
    let model = generative_model(completer(&["hello", "world", "[SEP]"]));
    let request = ChatCompletionRequest::new(
        "test-generator",
        vec![ChatMessage::system("Be brief."), ChatMessage::user("hello")],
    )
    .with_max_tokens(4);

    let ChatCompletionResponse::Full(chat) = model
        .create_chat_completion(request, &RequestHeaders::new())
        .await
        .unwrap()
    else {
        panic!("expected a full chat completion");
    };
    assert_eq!(chat.choices[0].message.content, "hello world");
    assert_eq!(chat.choices[0].finish_reason.as_deref(), Some("stop"));
}

#[tokio::test]
async fn unsupported_parameters_are_client_errors() {
    let model = generative_model(completer(&["dog", "[SEP]"]));
    let mut request = CompletionRequest::new("test-generator", "my dog");
    request.best_of = Some(2);

    let err = model
        .create_completion(request, &RequestHeaders::new())
        .await
        .err()
        .unwrap();
    assert!(err.is_client_error());
    assert!(err.to_string().contains("'best_of' is not supported"));
}

#[tokio::test]
async fn loaded_model_reports_an_unreachable_predictor() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("config.json"),
        json!({
            "architectures": ["BertForSequenceClassification"],
            "model_type": "bert",
            "id2label": {"0": "negative", "1": "positive"}
        })
        .to_string(),
    )
    .unwrap();
    write_fixture(dir.path(), true).unwrap();

    let config = ModelLoadConfig::new("sentiment", dir.path().to_string_lossy())
        .with_predictor(PredictorConfig::new("127.0.0.1:9").with_timeout_secs(2));
    let registry = ModelRegistry::new();
    let model = registry.load(&config).unwrap();
    assert_eq!(model.task(), MLTask::SequenceClassification);
    assert_eq!(registry.list(), vec!["sentiment"]);

    let err = model
        .predict(&BatchRequest::new(["a good movie"]), &RequestHeaders::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ServeError::RemotePredictor { .. }));
    assert!(err.is_inference_error());

    registry.unload("sentiment").unwrap();
    assert!(registry.is_empty());
    assert!(!model.is_ready());
}

#[test]
fn generative_architectures_load_as_generative_models() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("config.json"),
        json!({
            "architectures": ["LlamaForCausalLM"],
            "model_type": "llama",
            "eos_token_id": 3
        })
        .to_string(),
    )
    .unwrap();
    write_fixture(dir.path(), true).unwrap();

    let config = ModelLoadConfig::new("chat", dir.path().to_string_lossy())
        .with_predictor(PredictorConfig::new("127.0.0.1:9"));
    let model = ServedModel::load(&config).unwrap();
    assert_eq!(model.task(), MLTask::TextGeneration);
    assert_eq!(model.architecture(), ArchitectureClass::DecoderOnly);
    assert!(model.as_encoder().is_none());
}
