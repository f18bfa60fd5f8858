//! Resolving a complete local model directory

use hfserve_models::{
    detect_pooling, GenerationConfig, HfModelConfig, LocalModelFactory, ModelFiles, TaskResolver,
};
use hfserve_types::{ArchitectureClass, MLTask, ModelLoadConfig, PoolingStrategy, ServeError};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(dir: &Path, file: &str, content: &str) {
    let path = dir.join(file);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

#[test]
fn sentence_transformer_directory_resolves_to_pooled_embeddings() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "config.json",
        r#"{"architectures": ["BertModel"], "model_type": "bert", "max_position_embeddings": 256}"#,
    );
    write(
        dir.path(),
        "modules.json",
        r#"[{"idx": 0, "name": "0", "path": "", "type": "sentence_transformers.models.Transformer"},
            {"idx": 1, "name": "1", "path": "1_Pooling", "type": "sentence_transformers.models.Pooling"}]"#,
    );
    write(
        dir.path(),
        "1_Pooling/config.json",
        r#"{"word_embedding_dimension": 384, "pooling_mode_cls_token": true}"#,
    );

    let load = ModelLoadConfig::new("embedder", dir.path().to_string_lossy())
        .with_task(MLTask::TextEmbedding);
    let files = ModelFiles::resolve(&load, false).unwrap();
    assert_eq!(files.model_dir, dir.path());
    assert_eq!(files.tokenizer_dir, dir.path());

    let config = HfModelConfig::from_dir(&files.model_dir).unwrap();
    assert_eq!(config.max_sequence_length(), Some(256));
    assert_eq!(
        TaskResolver::resolve(load.task, &config).unwrap(),
        MLTask::TextEmbedding
    );
    assert_eq!(
        detect_pooling(&files.model_dir).unwrap(),
        Some(PoolingStrategy::Cls)
    );
}

#[test]
fn bare_encoder_without_task_cannot_be_served() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "config.json",
        r#"{"architectures": ["BertModel"], "model_type": "bert"}"#,
    );
    let config = HfModelConfig::from_dir(dir.path()).unwrap();
    let err = TaskResolver::resolve(None, &config).unwrap_err();
    assert!(matches!(err, ServeError::UnsupportedTask { .. }));
    assert!(err.to_string().contains("BertModel"));
}

#[test]
fn seq2seq_directory_reads_generation_defaults() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "config.json",
        r#"{"architectures": ["T5ForConditionalGeneration"], "model_type": "t5",
            "is_encoder_decoder": true, "eos_token_id": 1, "pad_token_id": 0}"#,
    );
    write(
        dir.path(),
        "generation_config.json",
        r#"{"max_length": 64, "decoder_start_token_id": 0, "eos_token_id": [1]}"#,
    );

    let config = HfModelConfig::from_dir(dir.path()).unwrap();
    let task = TaskResolver::resolve(None, &config).unwrap();
    assert_eq!(task, MLTask::Text2textGeneration);
    assert_eq!(
        config.architecture_class(task),
        ArchitectureClass::EncoderDecoder
    );

    let generation = GenerationConfig::from_dir(dir.path()).unwrap();
    assert_eq!(generation.max_length, Some(64));
    assert_eq!(generation.decoder_start_token_id, Some(0));
    assert_eq!(generation.eos_token_ids(), vec![1]);
}

#[test]
fn local_inference_without_weights_fails_at_load() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "config.json",
        r#"{"architectures": ["BertForMaskedLM"], "model_type": "bert"}"#,
    );
    let load = ModelLoadConfig::new("bert", dir.path().to_string_lossy());
    let files = ModelFiles::resolve(&load, true).unwrap();
    let config = HfModelConfig::from_dir(&files.model_dir).unwrap();

    let factory = LocalModelFactory::new(&load, &files, &config);
    assert!(factory.encoder(MLTask::MaskedLanguageModeling).is_err());
}

#[test]
fn local_directory_keeps_the_configured_revisions() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "config.json",
        r#"{"architectures": ["BertForMaskedLM"], "model_type": "bert"}"#,
    );
    let load = ModelLoadConfig::new("bert", dir.path().to_string_lossy())
        .with_model_revision("v2.1")
        .with_tokenizer_revision("main");
    let files = ModelFiles::resolve(&load, false).unwrap();
    assert_eq!(files.model_revision.as_deref(), Some("v2.1"));
    assert_eq!(files.tokenizer_revision.as_deref(), Some("main"));
    assert_eq!(files.config_path(), dir.path().join("config.json"));
}
