use hfserve_types::*;

#[test]
fn sampling_params_defaults_are_greedy() {
    let d = SamplingParams::default();
    assert!(d.is_greedy());
    assert!(d.top_p <= 1.0 && d.top_p > 0.0);
    assert!(d.stop_sequences.is_empty());
}

#[test]
fn sampling_params_validate_checks() {
    let mut p = SamplingParams::default();
    p.temperature = -0.1;
    assert!(p.validate().is_err());

    let mut p = SamplingParams::default();
    p.top_p = 0.0;
    assert!(p.validate().is_err());

    let mut p = SamplingParams::default();
    p.top_p = 1.5;
    assert!(p.validate().is_err());

    let p = SamplingParams::default().with_stop_sequences(vec![String::new()]);
    assert!(p.validate().is_err());

    let p = SamplingParams::default().with_temperature(0.7);
    assert!(p.validate().is_ok());
    assert!(!p.is_greedy());
}

#[test]
fn finish_reasons_map_to_openai_values() {
    assert_eq!(FinishReason::Length.as_openai_str(), "length");
    assert_eq!(FinishReason::Stop.as_openai_str(), "stop");
    assert_eq!(FinishReason::EOS.as_openai_str(), "stop");
    let usage = TokenUsage::new(5, 7);
    assert_eq!(usage.total_tokens, 12);
}
