//! Task inference from model architecture names

use crate::config::HfModelConfig;
use hfserve_types::{MLTask, Result, ServeError};
use tracing::debug;

/// What an architecture suffix maps to
#[derive(Debug, Clone, Copy)]
enum TaskMapping {
    Supported(MLTask),
    /// Recognised, but no postprocessing exists for it
    Unsupported(&'static str),
}

/// Suffix table, checked in order; more specific suffixes come first
const ARCHITECTURE_SUFFIXES: &[(&str, TaskMapping)] = &[
    (
        "TapasForQuestionAnswering",
        TaskMapping::Unsupported("table_question_answering"),
    ),
    (
        "ForQuestionAnswering",
        TaskMapping::Unsupported("question_answering"),
    ),
    ("ForMultipleChoice", TaskMapping::Unsupported("multiple_choice")),
    (
        "ForMaskedLM",
        TaskMapping::Supported(MLTask::MaskedLanguageModeling),
    ),
    (
        "ForSequenceClassification",
        TaskMapping::Supported(MLTask::SequenceClassification),
    ),
    (
        "ForTokenClassification",
        TaskMapping::Supported(MLTask::TokenClassification),
    ),
    ("ForCausalLM", TaskMapping::Supported(MLTask::TextGeneration)),
    (
        "WithLMHeadModel",
        TaskMapping::Supported(MLTask::Text2textGeneration),
    ),
    ("LMHeadModel", TaskMapping::Supported(MLTask::TextGeneration)),
    (
        "ForConditionalGeneration",
        TaskMapping::Supported(MLTask::Text2textGeneration),
    ),
    ("MTModel", TaskMapping::Supported(MLTask::Text2textGeneration)),
    (
        "EncoderDecoderModel",
        TaskMapping::Supported(MLTask::Text2textGeneration),
    ),
];

/// Resolves the one task a model serves
pub struct TaskResolver;

impl TaskResolver {
    /// An explicit task always wins; otherwise infer from `architectures`
    pub fn resolve(task_override: Option<MLTask>, config: &HfModelConfig) -> Result<MLTask> {
        if let Some(task) = task_override {
            debug!(task = %task, "Using configured task");
            return Ok(task);
        }

        let architecture = config.architecture().ok_or_else(|| {
            ServeError::unsupported_task(
                "Task couldn't be inferred: config.json declares no architectures. \
                 Please manually set `task` option.",
            )
        })?;
        let task = Self::infer_from_architecture(architecture)?;
        debug!(architecture, task = %task, "Inferred task from architecture");
        Ok(task)
    }

    /// Map one architecture name to its task by suffix
    pub fn infer_from_architecture(architecture: &str) -> Result<MLTask> {
        let mapping = ARCHITECTURE_SUFFIXES
            .iter()
            .find(|(suffix, _)| architecture.ends_with(suffix))
            .map(|(_, mapping)| *mapping);

        match mapping {
            Some(TaskMapping::Supported(task)) => Ok(task),
            Some(TaskMapping::Unsupported(name)) => Err(ServeError::unsupported_task(format!(
                "Task {} is not supported. Currently supported tasks are: {}",
                name,
                MLTask::supported_list()
            ))),
            None => Err(ServeError::unsupported_task(format!(
                "Task couldn't be inferred from {}. Please manually set `task` option.",
                architecture
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_architectures_map_to_one_task() {
        let cases = [
            ("BertForMaskedLM", MLTask::MaskedLanguageModeling),
            ("DistilBertForSequenceClassification", MLTask::SequenceClassification),
            ("BertForTokenClassification", MLTask::TokenClassification),
            ("BloomForCausalLM", MLTask::TextGeneration),
            ("GPT2LMHeadModel", MLTask::TextGeneration),
            ("T5ForConditionalGeneration", MLTask::Text2textGeneration),
            ("T5WithLMHeadModel", MLTask::Text2textGeneration),
            ("MarianMTModel", MLTask::Text2textGeneration),
            ("EncoderDecoderModel", MLTask::Text2textGeneration),
        ];
        for (architecture, expected) in cases {
            assert_eq!(
                TaskResolver::infer_from_architecture(architecture).unwrap(),
                expected,
                "{}",
                architecture
            );
        }
    }

    #[test]
    fn tapas_is_rejected_by_task_name() {
        let config =
            HfModelConfig::from_json(r#"{"architectures": ["TapasForQuestionAnswering"]}"#)
                .unwrap();
        let err = TaskResolver::resolve(None, &config).unwrap_err();
        assert!(matches!(err, ServeError::UnsupportedTask { .. }));
        assert!(err
            .to_string()
            .contains("Task table_question_answering is not supported"));
    }

    #[test]
    fn other_unsupported_heads() {
        let err = TaskResolver::infer_from_architecture("BertForQuestionAnswering").unwrap_err();
        assert!(err.to_string().contains("Task question_answering is not supported"));
        let err = TaskResolver::infer_from_architecture("RobertaForMultipleChoice").unwrap_err();
        assert!(err.to_string().contains("Task multiple_choice is not supported"));
    }

    #[test]
    fn unknown_architecture_is_named() {
        let err = TaskResolver::infer_from_architecture("BertModel").unwrap_err();
        assert!(err.to_string().contains("BertModel"));
    }

    #[test]
    fn override_wins() {
        let config =
            HfModelConfig::from_json(r#"{"architectures": ["TapasForQuestionAnswering"]}"#)
                .unwrap();
        let task = TaskResolver::resolve(Some(MLTask::TextEmbedding), &config).unwrap();
        assert_eq!(task, MLTask::TextEmbedding);

        let empty = HfModelConfig::default();
        assert!(TaskResolver::resolve(None, &empty).is_err());
    }
}
