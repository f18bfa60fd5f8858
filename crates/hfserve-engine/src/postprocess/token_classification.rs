use super::{argmax, sequence_width, softmax, Labels, PostprocessContext};
use hfserve_interfaces::HostTensor;
use hfserve_types::{Entity, Result, ServeError};

/// Tag every word of every instance.
///
/// Consecutive tokens sharing a word id form one entity: the tag and score
/// come from the word's first token, the span covers all of them. Padding
/// and special tokens are skipped, and words tagged with an ignored label
/// are dropped. Entity offsets are character positions in the original
/// text.
pub fn extract_entities(
    output: &HostTensor,
    ctx: &PostprocessContext<'_>,
    labels: &Labels,
    ignore_labels: &[String],
) -> Result<Vec<Vec<Entity>>> {
    let classes = sequence_width(output, ctx.batch)?;
    if ctx.texts.len() != ctx.batch.batch_size() {
        return Err(ServeError::internal(format!(
            "{} texts for a batch of {}",
            ctx.texts.len(),
            ctx.batch.batch_size()
        )));
    }
    let logits = output.to_f32_vec()?;
    let batch = ctx.batch;

    let mut all = Vec::with_capacity(batch.batch_size());
    for (i, text) in ctx.texts.iter().enumerate() {
        let mut entities = Vec::new();
        let mut j = 0;
        while j < batch.seq_len {
            if !batch.is_content_token(i, j) {
                j += 1;
                continue;
            }

            let word_id = batch.word_ids[i][j];
            let first = j;
            let mut last = j;
            while word_id.is_some()
                && last + 1 < batch.seq_len
                && batch.is_content_token(i, last + 1)
                && batch.word_ids[i][last + 1] == word_id
            {
                last += 1;
            }
            j = last + 1;

            let start = (i * batch.seq_len + first) * classes;
            let probs = softmax(&logits[start..start + classes]);
            let best = argmax(&probs)
                .ok_or_else(|| ServeError::inference("Empty class distribution"))?;
            let label = labels.get(best);
            if ignore_labels.iter().any(|ignored| *ignored == label) {
                continue;
            }

            let (start_byte, _) = batch.offsets[i][first];
            let (_, end_byte) = batch.offsets[i][last];
            let (prefix, word) = text
                .get(..start_byte)
                .zip(text.get(start_byte..end_byte))
                .ok_or_else(|| {
                    ServeError::inference(format!(
                        "Token offsets {}..{} do not fall on character boundaries of instance {}",
                        start_byte, end_byte, i
                    ))
                })?;
            let start_char = prefix.chars().count();

            entities.push(Entity {
                entity: label,
                score: probs[best],
                index: first,
                word: word.to_string(),
                start: start_char,
                end: start_char + word.chars().count(),
            });
        }
        all.push(entities);
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hfserve_interfaces::{EncodeOptions, TokenizedBatch, Tokenizer};
    use hfserve_tokenizer::test_utils::fixture_tokenizer;

    fn labels() -> Labels {
        Labels::new(
            ["O", "B-ORG", "I-ORG", "B-LOC", "I-LOC"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }

    /// Logits that tag each token by its surface form
    fn tag(
        tokenizer: &dyn Tokenizer,
        texts: &[&str],
        tags: &[(&str, usize)],
    ) -> (TokenizedBatch, HostTensor) {
        let batch = tokenizer
            .encode_batch(texts, &EncodeOptions::default())
            .unwrap();
        let classes = 5;
        let mut logits = vec![0.0f32; batch.batch_size() * batch.seq_len * classes];
        for (i, row) in batch.input_ids.iter().enumerate() {
            for (j, id) in row.iter().enumerate() {
                let class = tags
                    .iter()
                    .find(|(token, _)| tokenizer.token_id(token) == Some(*id))
                    .map_or(0, |(_, class)| *class);
                logits[(i * batch.seq_len + j) * classes + class] = 10.0;
            }
        }
        let shape = vec![batch.batch_size(), batch.seq_len, classes];
        (batch, HostTensor::f32("logits", shape, logits).unwrap())
    }

    #[test]
    fn sub_words_collapse_into_one_entity() {
        let tokenizer = fixture_tokenizer(false);
        let texts = ["HuggingFace Inc. is a company based in New York City."];
        // Continuation pieces are tagged O: only the first sub-word counts
        let (batch, output) = tag(
            &tokenizer,
            &texts,
            &[("Hu", 1), ("Inc", 2), ("New", 3), ("York", 4), ("City", 4)],
        );
        let ctx = PostprocessContext {
            batch: &batch,
            texts: &texts,
            tokenizer: &tokenizer,
        };

        let entities = extract_entities(&output, &ctx, &labels(), &["O".to_string()]).unwrap();
        let summary: Vec<(&str, usize, &str, usize, usize)> = entities[0]
            .iter()
            .map(|e| (e.entity.as_str(), e.index, e.word.as_str(), e.start, e.end))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("B-ORG", 1, "HuggingFace", 0, 11),
                ("I-ORG", 5, "Inc", 12, 15),
                ("B-LOC", 12, "New", 39, 42),
                ("I-LOC", 13, "York", 43, 47),
                ("I-LOC", 14, "City", 48, 52),
            ]
        );
        for entity in &entities[0] {
            let word: String = texts[0]
                .chars()
                .skip(entity.start)
                .take(entity.end - entity.start)
                .collect();
            assert_eq!(word, entity.word);
            assert!(entity.score > 0.99);
        }
    }

    #[test]
    fn offsets_are_characters_of_the_original_text() {
        let tokenizer = fixture_tokenizer(true);
        let texts = ["é Paris"];
        let (batch, output) = tag(&tokenizer, &texts, &[("paris", 3)]);
        let ctx = PostprocessContext {
            batch: &batch,
            texts: &texts,
            tokenizer: &tokenizer,
        };
        let entities = extract_entities(&output, &ctx, &labels(), &["O".to_string()]).unwrap();
        assert_eq!(entities[0].len(), 1);
        assert_eq!(entities[0][0].word, "Paris");
        assert_eq!((entities[0][0].start, entities[0][0].end), (2, 7));
    }

    #[test]
    fn nothing_is_ignored_without_ignore_labels() {
        let tokenizer = fixture_tokenizer(true);
        let texts = ["hello world", "hello"];
        let (batch, output) = tag(&tokenizer, &texts, &[]);
        let ctx = PostprocessContext {
            batch: &batch,
            texts: &texts,
            tokenizer: &tokenizer,
        };
        let entities = extract_entities(&output, &ctx, &labels(), &[]).unwrap();
        assert_eq!(entities[0].len(), 2);
        // Padding of the shorter row is skipped
        assert_eq!(entities[1].len(), 1);
        assert_eq!(entities[1][0].entity, "O");
    }
}
