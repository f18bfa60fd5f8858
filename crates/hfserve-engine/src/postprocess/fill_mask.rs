use super::{argmax, sequence_width, PostprocessContext};
use hfserve_interfaces::HostTensor;
use hfserve_types::{Result, ServeError, TokenId};

/// Arg-max vocabulary id at every mask position of an instance, decoded
/// together. Special tokens are kept in the decoded text.
pub fn fill_masks(output: &HostTensor, ctx: &PostprocessContext<'_>) -> Result<Vec<String>> {
    let vocab = sequence_width(output, ctx.batch)?;
    let mask_id = ctx
        .tokenizer
        .special_tokens()
        .mask_token
        .ok_or_else(|| ServeError::inference("Tokenizer has no mask token"))?;
    let logits = output.to_f32_vec()?;

    let mut predictions = Vec::with_capacity(ctx.batch.batch_size());
    for (i, row) in ctx.batch.input_ids.iter().enumerate() {
        let predicted: Vec<TokenId> = row
            .iter()
            .enumerate()
            .filter(|(_, id)| **id == mask_id)
            .filter_map(|(j, _)| {
                let start = (i * ctx.batch.seq_len + j) * vocab;
                argmax(&logits[start..start + vocab]).map(|id| TokenId::new(id as u32))
            })
            .collect();
        if predicted.is_empty() {
            return Err(ServeError::inference(format!(
                "Instance {} has no mask token to fill",
                i
            )));
        }
        predictions.push(ctx.tokenizer.decode(&predicted, false)?);
    }
    Ok(predictions)
}
