use super::{argmax, softmax, Labels};
use hfserve_interfaces::HostTensor;
use hfserve_types::{ClassificationResult, LabelProbability, Result, ServeError};

/// Softmax over `[batch, classes]` logits; the label is the arg-max and
/// every class probability is reported in id order.
pub fn classify_sequences(
    output: &HostTensor,
    labels: &Labels,
) -> Result<Vec<ClassificationResult>> {
    if output.ndim() != 2 || output.shape[1] == 0 {
        return Err(ServeError::inference(format!(
            "Output {} has shape {:?}, expected [batch, classes]",
            output.name, output.shape
        )));
    }

    output
        .rows_f32()?
        .iter()
        .map(|logits| {
            let probs = softmax(logits);
            let best = argmax(&probs)
                .ok_or_else(|| ServeError::inference("Empty class distribution"))?;
            Ok(ClassificationResult {
                label: labels.get(best),
                confidence: probs[best],
                probabilities: probs
                    .iter()
                    .enumerate()
                    .map(|(id, &probability)| LabelProbability {
                        label: labels.get(id),
                        probability,
                    })
                    .collect(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_rows_give_identical_records() {
        let labels = Labels::new(vec!["NEGATIVE".into(), "POSITIVE".into()]);
        let output =
            HostTensor::f32("logits", vec![2, 2], vec![-1.5, 2.0, -1.5, 2.0]).unwrap();
        let results = classify_sequences(&output, &labels).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0], results[1]);
        assert_eq!(results[0].label, "POSITIVE");
        assert_eq!(results[0].probabilities[0].label, "NEGATIVE");
        let total: f32 = results[0].probabilities.iter().map(|p| p.probability).sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert_eq!(results[0].confidence, results[0].probabilities[1].probability);
    }

    #[test]
    fn undeclared_labels_use_generic_names() {
        let output = HostTensor::f32("logits", vec![1, 3], vec![0.0, 0.0, 4.0]).unwrap();
        let results = classify_sequences(&output, &Labels::default()).unwrap();
        assert_eq!(results[0].label, "LABEL_2");
    }

    #[test]
    fn rejects_per_token_logits() {
        let output = HostTensor::f32("logits", vec![1, 1, 2], vec![0.0, 1.0]).unwrap();
        assert!(classify_sequences(&output, &Labels::default()).is_err());
    }
}
