//! Incremental decoding for streaming generation
//!
//! Decoding token by token is not prefix-stable for most tokenizers:
//! WordPiece continuations glue onto the previous word, byte-level BPE can
//! split a UTF-8 character across tokens and SentencePiece drops leading
//! spaces at sequence start. The decoder therefore keeps a small window of
//! already-emitted tokens, decodes the window with and without the new
//! tokens and emits only the difference once it is printable.

use hfserve_interfaces::Tokenizer;
use hfserve_types::{Result, TokenId};

/// Streaming decode state for one sequence
#[derive(Debug, Clone)]
pub struct IncrementalDecoder {
    tokens: Vec<TokenId>,
    prefix_offset: usize,
    read_offset: usize,
    skip_special_tokens: bool,
}

impl IncrementalDecoder {
    pub fn new(skip_special_tokens: bool) -> Self {
        Self {
            tokens: Vec::new(),
            prefix_offset: 0,
            read_offset: 0,
            skip_special_tokens,
        }
    }

    /// Seed with tokens that precede the generated ones (e.g. the tail of
    /// a decoder-only prompt) so the first delta keeps its leading space.
    pub fn with_context(context: &[TokenId], skip_special_tokens: bool) -> Self {
        Self {
            tokens: context.to_vec(),
            prefix_offset: 0,
            read_offset: context.len(),
            skip_special_tokens,
        }
    }

    /// Push one token; returns the newly visible text, if any
    pub fn push(&mut self, tokenizer: &dyn Tokenizer, token: TokenId) -> Result<Option<String>> {
        self.tokens.push(token);
        let prefix_text = tokenizer.decode(
            &self.tokens[self.prefix_offset..self.read_offset],
            self.skip_special_tokens,
        )?;
        let new_text = tokenizer.decode(&self.tokens[self.prefix_offset..], self.skip_special_tokens)?;

        if new_text.len() > prefix_text.len() && !new_text.ends_with('\u{FFFD}') {
            if let Some(delta) = new_text.get(prefix_text.len()..) {
                let delta = delta.to_string();
                self.prefix_offset = self.read_offset;
                self.read_offset = self.tokens.len();
                return Ok(Some(delta));
            }
        }
        Ok(None)
    }

    /// Release whatever text is still held back at the end of generation
    pub fn flush(&mut self, tokenizer: &dyn Tokenizer) -> Result<Option<String>> {
        if self.read_offset == self.tokens.len() {
            return Ok(None);
        }
        let prefix_text = tokenizer.decode(
            &self.tokens[self.prefix_offset..self.read_offset],
            self.skip_special_tokens,
        )?;
        let new_text = tokenizer.decode(&self.tokens[self.prefix_offset..], self.skip_special_tokens)?;
        self.prefix_offset = self.read_offset;
        self.read_offset = self.tokens.len();
        Ok(new_text
            .get(prefix_text.len()..)
            .filter(|d| !d.is_empty())
            .map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixture_tokenizer;

    fn ids(tokenizer: &dyn Tokenizer, words: &[&str]) -> Vec<TokenId> {
        words
            .iter()
            .map(|w| tokenizer.token_id(w).unwrap())
            .collect()
    }

    #[test]
    fn deltas_concatenate_to_full_decode() {
        let tokenizer = fixture_tokenizer(false);
        let tokens = ids(&tokenizer, &["Hu", "##gging", "##F", "##ace", "is", "a", "company", "."]);

        let mut decoder = IncrementalDecoder::new(true);
        let mut streamed = String::new();
        for token in &tokens {
            if let Some(delta) = decoder.push(&tokenizer, *token).unwrap() {
                streamed.push_str(&delta);
            }
        }
        if let Some(rest) = decoder.flush(&tokenizer).unwrap() {
            streamed.push_str(&rest);
        }

        assert_eq!(streamed, tokenizer.decode(&tokens, true).unwrap());
        assert_eq!(streamed, "HuggingFace is a company.");
    }

    #[test]
    fn context_keeps_leading_space() {
        let tokenizer = fixture_tokenizer(true);
        let context = ids(&tokenizer, &["hello", "my"]);
        let mut decoder = IncrementalDecoder::with_context(&context, true);

        let delta = decoder
            .push(&tokenizer, tokenizer.token_id("dog").unwrap())
            .unwrap();
        assert_eq!(delta.as_deref(), Some(" dog"));
        assert_eq!(decoder.flush(&tokenizer).unwrap(), None);
    }

    #[test]
    fn skipped_special_tokens_emit_nothing() {
        let tokenizer = fixture_tokenizer(true);
        let mut decoder = IncrementalDecoder::new(true);
        let sep = tokenizer.token_id("[SEP]").unwrap();
        assert_eq!(decoder.push(&tokenizer, sep).unwrap(), None);
    }
}
