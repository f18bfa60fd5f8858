//! Task-specific postprocessing
//!
//! One handler per encoder task turns the backend's raw output tensor into
//! a [`PredictionResult`]. Handlers only see host tensors, so local and
//! remote inference share this code path.

mod classification;
mod embedding;
mod fill_mask;
mod token_classification;

pub use classification::classify_sequences;
pub use embedding::{l2_normalize, pool_embeddings};
pub use fill_mask::fill_masks;
pub use token_classification::extract_entities;

use hfserve_interfaces::{HostTensor, TokenizedBatch, Tokenizer};
use hfserve_types::{MLTask, PoolingStrategy, PredictionResult, Result, ServeError};
use tracing::debug;

/// Class labels ordered by id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels(Vec<String>);

impl Labels {
    pub fn new(labels: Vec<String>) -> Self {
        Self(labels)
    }

    /// Label of class `id`; `LABEL_{id}` past the declared ones
    pub fn get(&self, id: usize) -> String {
        self.0
            .get(id)
            .cloned()
            .unwrap_or_else(|| format!("LABEL_{}", id))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything besides the raw output a handler may need
pub struct PostprocessContext<'a> {
    pub batch: &'a TokenizedBatch,
    /// Original instance texts, in request order
    pub texts: &'a [&'a str],
    pub tokenizer: &'a dyn Tokenizer,
}

/// Postprocessing dispatch, fixed by the model's task at load time
#[derive(Debug, Clone)]
pub enum TaskHandler {
    FillMask,
    SequenceClassification { labels: Labels },
    TokenClassification {
        labels: Labels,
        ignore_labels: Vec<String>,
    },
    TextEmbedding { pooling: PoolingStrategy },
}

impl TaskHandler {
    /// Handler for an encoder task
    pub fn for_task(
        task: MLTask,
        labels: Labels,
        ignore_labels: Vec<String>,
        pooling: PoolingStrategy,
    ) -> Result<Self> {
        match task {
            MLTask::MaskedLanguageModeling => Ok(TaskHandler::FillMask),
            MLTask::SequenceClassification => Ok(TaskHandler::SequenceClassification { labels }),
            MLTask::TokenClassification => Ok(TaskHandler::TokenClassification {
                labels,
                ignore_labels,
            }),
            MLTask::TextEmbedding => Ok(TaskHandler::TextEmbedding { pooling }),
            MLTask::TextGeneration | MLTask::Text2textGeneration => Err(ServeError::internal(
                format!("{} has no encoder postprocessing", task),
            )),
        }
    }

    pub fn task(&self) -> MLTask {
        match self {
            TaskHandler::FillMask => MLTask::MaskedLanguageModeling,
            TaskHandler::SequenceClassification { .. } => MLTask::SequenceClassification,
            TaskHandler::TokenClassification { .. } => MLTask::TokenClassification,
            TaskHandler::TextEmbedding { .. } => MLTask::TextEmbedding,
        }
    }

    /// Turn backend outputs into predictions, one per instance in order
    pub fn postprocess(
        &self,
        outputs: &[HostTensor],
        ctx: &PostprocessContext<'_>,
    ) -> Result<PredictionResult> {
        let output = outputs
            .first()
            .ok_or_else(|| ServeError::inference("Backend returned no output tensors"))?;
        debug!(
            task = %self.task(),
            output = %output.name,
            shape = ?output.shape,
            "Postprocessing"
        );

        let batch_size = ctx.batch.batch_size();
        if output.shape.first() != Some(&batch_size) {
            return Err(ServeError::inference(format!(
                "Output {} has shape {:?}, expected a leading batch dimension of {}",
                output.name, output.shape, batch_size
            )));
        }

        let predictions = match self {
            TaskHandler::FillMask => PredictionResult::FillMask(fill_masks(output, ctx)?),
            TaskHandler::SequenceClassification { labels } => {
                PredictionResult::SequenceClassification(classify_sequences(output, labels)?)
            }
            TaskHandler::TokenClassification {
                labels,
                ignore_labels,
            } => PredictionResult::TokenClassification(extract_entities(
                output,
                ctx,
                labels,
                ignore_labels,
            )?),
            TaskHandler::TextEmbedding { pooling } => {
                PredictionResult::TextEmbedding(pool_embeddings(output, ctx.batch, *pooling)?)
            }
        };
        Ok(predictions)
    }
}

/// Numerically stable softmax
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        exps.into_iter().map(|x| x / sum).collect()
    } else {
        vec![1.0 / logits.len().max(1) as f32; logits.len()]
    }
}

/// Index of the largest value; the first one wins ties
pub fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Expect a `[batch, seq_len, width]` output and return `width`
pub(crate) fn sequence_width(output: &HostTensor, batch: &TokenizedBatch) -> Result<usize> {
    match output.shape.as_slice() {
        [_, seq, width] if *seq == batch.seq_len => Ok(*width),
        shape => Err(ServeError::inference(format!(
            "Output {} has shape {:?}, expected [{}, {}, _]",
            output.name,
            shape,
            batch.batch_size(),
            batch.seq_len
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn argmax_prefers_first_on_ties() {
        assert_eq!(argmax(&[1.0, 3.0, 3.0]), Some(1));
        assert_eq!(argmax(&[1.0, 1.0]), Some(0));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn labels_fall_back_to_generic_names() {
        let labels = Labels::new(vec!["NEGATIVE".into(), "POSITIVE".into()]);
        assert_eq!(labels.get(1), "POSITIVE");
        assert_eq!(labels.get(2), "LABEL_2");
    }

    #[test]
    fn generative_tasks_have_no_handler() {
        let err = TaskHandler::for_task(
            MLTask::TextGeneration,
            Labels::default(),
            vec![],
            PoolingStrategy::Mean,
        )
        .unwrap_err();
        assert!(matches!(err, ServeError::Internal { .. }));
    }
}
