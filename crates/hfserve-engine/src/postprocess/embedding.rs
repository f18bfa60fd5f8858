use hfserve_interfaces::{HostTensor, TokenizedBatch};
use hfserve_types::{PoolingStrategy, Result, ServeError};

/// One L2-normalised vector per instance.
///
/// `[batch, seq_len, hidden]` states are pooled with `pooling`; a
/// `[batch, hidden]` output is taken as already pooled.
pub fn pool_embeddings(
    output: &HostTensor,
    batch: &TokenizedBatch,
    pooling: PoolingStrategy,
) -> Result<Vec<Vec<f32>>> {
    let values = output.to_f32_vec()?;
    let mut vectors = match output.shape.as_slice() {
        [_, hidden] if *hidden > 0 => values
            .chunks(*hidden)
            .map(<[f32]>::to_vec)
            .collect::<Vec<_>>(),
        [rows, seq, hidden] if *seq == batch.seq_len && *hidden > 0 => (0..*rows)
            .map(|i| {
                let states = &values[i * seq * hidden..(i + 1) * seq * hidden];
                pool_row(states, &batch.attention_mask[i], *hidden, pooling)
            })
            .collect::<Result<Vec<_>>>()?,
        shape => {
            return Err(ServeError::inference(format!(
                "Output {} has shape {:?}, expected [batch, hidden] or [batch, {}, hidden]",
                output.name, shape, batch.seq_len
            )))
        }
    };
    vectors.iter_mut().for_each(|v| l2_normalize(v));
    Ok(vectors)
}

fn pool_row(
    states: &[f32],
    mask: &[u32],
    hidden: usize,
    pooling: PoolingStrategy,
) -> Result<Vec<f32>> {
    if states.len() < hidden {
        return Err(ServeError::inference("Hidden states hold no tokens to pool"));
    }
    Ok(match pooling {
        PoolingStrategy::Cls => states[..hidden].to_vec(),
        PoolingStrategy::Mean => {
            let mut sum = vec![0.0f32; hidden];
            let mut count = 0usize;
            for (token, _) in states
                .chunks(hidden)
                .zip(mask)
                .filter(|&(_, &m)| m != 0)
            {
                sum.iter_mut().zip(token).for_each(|(s, x)| *s += x);
                count += 1;
            }
            let count = count.max(1) as f32;
            sum.into_iter().map(|s| s / count).collect()
        }
    })
}

/// Scale to unit length; the zero vector is left as is
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(mask: Vec<Vec<u32>>) -> TokenizedBatch {
        TokenizedBatch {
            seq_len: mask.first().map_or(0, Vec::len),
            attention_mask: mask,
            ..Default::default()
        }
    }

    #[test]
    fn mean_pooling_ignores_padding() {
        let batch = batch(vec![vec![1, 1, 0]]);
        // Padding state would tip the mean towards the second axis
        let states = vec![3.0, 0.0, 1.0, 0.0, 0.0, 100.0];
        let output = HostTensor::f32("last_hidden_state", vec![1, 3, 2], states).unwrap();
        let vectors = pool_embeddings(&output, &batch, PoolingStrategy::Mean).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0]]);
    }

    #[test]
    fn cls_pooling_takes_first_token() {
        let batch = batch(vec![vec![1, 1]]);
        let output =
            HostTensor::f32("last_hidden_state", vec![1, 2, 2], vec![0.0, 2.0, 5.0, 5.0]).unwrap();
        let vectors = pool_embeddings(&output, &batch, PoolingStrategy::Cls).unwrap();
        assert_eq!(vectors, vec![vec![0.0, 1.0]]);
    }

    #[test]
    fn pooled_output_is_only_normalised() {
        let batch = batch(vec![vec![1], vec![1]]);
        let output =
            HostTensor::f32("sentence_embedding", vec![2, 2], vec![3.0, 4.0, 0.0, 0.0]).unwrap();
        let vectors = pool_embeddings(&output, &batch, PoolingStrategy::Mean).unwrap();
        assert_eq!(vectors[0], vec![0.6, 0.8]);
        assert_eq!(vectors[1], vec![0.0, 0.0]);
    }

    #[test]
    fn states_without_tokens_are_an_inference_error() {
        let batch = batch(vec![vec![]]);
        let output = HostTensor::f32("last_hidden_state", vec![1, 0, 4], vec![]).unwrap();
        for pooling in [PoolingStrategy::Cls, PoolingStrategy::Mean] {
            let err = pool_embeddings(&output, &batch, pooling).unwrap_err();
            assert!(err.is_inference_error());
        }
    }
}
