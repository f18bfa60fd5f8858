use hfserve_interfaces::*;

fn two_row_batch() -> TokenizedBatch {
    TokenizedBatch {
        input_ids: vec![
            vec![TokenId(2), TokenId(10), TokenId(11), TokenId(3)],
            vec![TokenId(2), TokenId(12), TokenId(3), TokenId(0)],
        ],
        attention_mask: vec![vec![1, 1, 1, 1], vec![1, 1, 1, 0]],
        token_type_ids: vec![vec![0; 4], vec![0; 4]],
        special_tokens_mask: vec![vec![1, 0, 0, 1], vec![1, 0, 1, 1]],
        offsets: vec![
            vec![(0, 0), (0, 5), (6, 11), (0, 0)],
            vec![(0, 0), (0, 2), (0, 0), (0, 0)],
        ],
        word_ids: vec![
            vec![None, Some(0), Some(1), None],
            vec![None, Some(0), None, None],
        ],
        seq_len: 4,
    }
}

#[test]
fn sequence_lengths_ignore_padding() {
    let batch = two_row_batch();
    assert_eq!(batch.batch_size(), 2);
    assert_eq!(batch.sequence_length(0), 4);
    assert_eq!(batch.sequence_length(1), 3);
    assert!(batch.is_content_token(0, 1));
    assert!(!batch.is_content_token(0, 0));
    assert!(!batch.is_content_token(1, 3));
}

#[test]
fn host_tensors_are_named_and_shaped() {
    let tensors = two_row_batch().to_host_tensors().unwrap();
    let names: Vec<_> = tensors.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["input_ids", "attention_mask", "token_type_ids"]);
    for t in &tensors {
        assert_eq!(t.shape, vec![2, 4]);
    }
    assert_eq!(
        tensors[0].data,
        TensorData::I64(vec![2, 10, 11, 3, 2, 12, 3, 0])
    );
}
