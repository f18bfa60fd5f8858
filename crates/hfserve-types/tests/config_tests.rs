use hfserve_types::*;
use std::str::FromStr;

#[test]
fn model_load_config_defaults_sane() {
    let cfg = ModelLoadConfig::default();
    assert!(cfg.task.is_none());
    assert!(cfg.tokenizer.add_special_tokens);
    assert!(cfg.tokenizer.do_lower_case.is_none());
    assert_eq!(cfg.ignore_labels, vec!["O".to_string()]);
    assert_eq!(cfg.device, Device::CPU);
    assert!(cfg.predictor.is_none());
}

#[test]
fn model_load_config_validate_checks() {
    assert!(ModelLoadConfig::default().validate().is_err());
    assert!(ModelLoadConfig::new("bert", "bert-base-uncased").validate().is_ok());

    let cfg = ModelLoadConfig::new("bert", "bert-base-uncased").with_max_length(0);
    assert!(cfg.validate().is_err());

    let cfg = ModelLoadConfig::new("bert", "bert-base-uncased")
        .with_predictor(PredictorConfig::new("http://predictor"));
    assert!(cfg.validate().is_err());

    let cfg = ModelLoadConfig::new("bert", "bert-base-uncased")
        .with_tensor_input_names(Vec::<String>::new());
    assert!(cfg.validate().is_err());
}

#[test]
fn predictor_urls_follow_v2_layout() {
    let predictor = PredictorConfig::new("predictor.local:8080");
    assert_eq!(
        predictor.infer_url("bert"),
        "http://predictor.local:8080/v2/models/bert/infer"
    );
    let predictor = predictor.with_ssl(true);
    assert_eq!(
        predictor.infer_url("bert"),
        "https://predictor.local:8080/v2/models/bert/infer"
    );
    assert_eq!(predictor.timeout().as_secs(), 600);
}

#[test]
fn predictor_protocol_parsing() {
    assert_eq!(PredictorProtocol::from_str("v2").unwrap(), PredictorProtocol::V2);
    assert_eq!(PredictorProtocol::from_str(" V2 ").unwrap(), PredictorProtocol::V2);
    assert!(PredictorProtocol::from_str("v1").is_err());
    assert!(PredictorProtocol::from_str("grpc-v2").is_err());
}

#[test]
fn config_deserializes_with_defaults() {
    let cfg: ModelLoadConfig = serde_json::from_str(
        r#"{
            "name": "t5",
            "model_id_or_path": "google-t5/t5-small",
            "task": "text2text_generation",
            "predictor": {"host": "localhost:9000"}
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.task, Some(MLTask::Text2textGeneration));
    let predictor = cfg.predictor.unwrap();
    assert_eq!(predictor.protocol, PredictorProtocol::V2);
    assert!(!predictor.use_ssl);
    assert!(cfg.tokenizer.add_special_tokens);
}

#[test]
fn device_and_dtype_parsing() {
    assert_eq!(Device::from_str("cpu").unwrap(), Device::CPU);
    assert_eq!(Device::from_str("cuda:1").unwrap(), Device::CUDA(1));
    assert_eq!(Device::from_str("mps").unwrap(), Device::Metal);
    assert!(Device::from_str("tpu").is_err());
    assert_eq!(WeightDType::from_str("bfloat16").unwrap(), WeightDType::BF16);
    assert!(WeightDType::from_str("int4").is_err());
}

#[test]
fn config_reads_environment_variables() {
    let vars = [
        ("HFSERVE_MODEL_NAME", "sentiment"),
        ("HFSERVE_MODEL_ID", "distilbert-base-uncased"),
        ("HFSERVE_MODEL_REVISION", "v1.0"),
        ("HFSERVE_TASK", "text-classification"),
        ("HFSERVE_DO_LOWER_CASE", "true"),
        ("HFSERVE_ADD_SPECIAL_TOKENS", "false"),
        ("HFSERVE_MAX_LENGTH", "128"),
        ("HFSERVE_PREDICTOR_HOST", "predictor.local:8080"),
        ("HFSERVE_PREDICTOR_USE_SSL", "true"),
        ("HFSERVE_TENSOR_INPUT_NAMES", "input_ids, attention_mask,"),
    ];
    for (key, value) in vars {
        std::env::set_var(key, value);
    }

    let cfg = ModelLoadConfig::from_env();
    std::env::set_var("HFSERVE_MAX_LENGTH", "many");
    let bad_length = ModelLoadConfig::from_env();
    for (key, _) in vars {
        std::env::remove_var(key);
    }

    let cfg = cfg.unwrap();
    assert_eq!(cfg.name, "sentiment");
    assert_eq!(cfg.model_id_or_path, "distilbert-base-uncased");
    assert_eq!(cfg.model_revision.as_deref(), Some("v1.0"));
    assert!(cfg.tokenizer_revision.is_none());
    assert_eq!(cfg.task, Some(MLTask::SequenceClassification));
    assert_eq!(cfg.tokenizer.do_lower_case, Some(true));
    assert!(!cfg.tokenizer.add_special_tokens);
    assert_eq!(cfg.max_length, Some(128));
    let predictor = cfg.predictor.unwrap();
    assert_eq!(
        predictor.infer_url("sentiment"),
        "https://predictor.local:8080/v2/models/sentiment/infer"
    );
    assert_eq!(
        cfg.tensor_input_names,
        Some(vec!["input_ids".to_string(), "attention_mask".to_string()])
    );

    assert!(matches!(bad_length.unwrap_err(), ServeError::Config { .. }));
}
