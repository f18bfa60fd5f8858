use hfserve_types::*;
use std::str::FromStr;

#[test]
fn task_names_round_trip_through_serde() {
    for task in MLTask::ALL {
        let json = serde_json::to_string(&task).unwrap();
        assert_eq!(json, format!("\"{}\"", task.as_str()));
        let back: MLTask = serde_json::from_str(&json).unwrap();
        assert_eq!(back, task);
    }
}

#[test]
fn task_from_str_accepts_aliases() {
    assert_eq!(
        MLTask::from_str("fill_mask").unwrap(),
        MLTask::MaskedLanguageModeling
    );
    assert_eq!(
        MLTask::from_str("text-generation").unwrap(),
        MLTask::TextGeneration
    );
    let err = MLTask::from_str("table_question_answering").unwrap_err();
    assert!(err
        .to_string()
        .contains("Task table_question_answering is not supported"));
}

#[test]
fn generative_tasks() {
    assert!(MLTask::TextGeneration.is_generative());
    assert!(MLTask::Text2textGeneration.is_generative());
    assert!(!MLTask::TextEmbedding.is_generative());
    assert!(ArchitectureClass::EncoderDecoder.is_encoder_decoder());
    assert!(!ArchitectureClass::DecoderOnly.is_encoder_decoder());
}
