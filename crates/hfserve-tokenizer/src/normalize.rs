//! Lower-casing that keeps offsets pointing into the original text

/// Lower-cased copy of a text plus a byte map back to the original
#[derive(Debug, Clone)]
pub struct LowercasedText {
    pub text: String,
    /// `origin[i]` is the original byte offset of lowered byte `i`;
    /// one extra trailing entry maps the end of the text.
    origin: Vec<usize>,
}

impl LowercasedText {
    pub fn new(original: &str) -> Self {
        Self::preserving(original, &[])
    }

    /// Lower-case everything except occurrences of `preserved` strings
    /// (special tokens such as `[MASK]` must keep their spelling).
    pub fn preserving(original: &str, preserved: &[String]) -> Self {
        let mut text = String::with_capacity(original.len());
        let mut origin = Vec::with_capacity(original.len() + 1);
        let mut rest_start = 0;

        for (offset, ch) in original.char_indices() {
            if offset < rest_start {
                continue;
            }
            let verbatim = preserved
                .iter()
                .find(|p| !p.is_empty() && original[offset..].starts_with(p.as_str()));
            if let Some(token) = verbatim {
                text.push_str(token);
                origin.extend(offset..offset + token.len());
                rest_start = offset + token.len();
                continue;
            }
            for lower in ch.to_lowercase() {
                let start = text.len();
                text.push(lower);
                origin.extend(std::iter::repeat(offset).take(text.len() - start));
            }
        }
        origin.push(original.len());
        Self { text, origin }
    }

    /// Map a byte span of the lowered text onto the original text
    pub fn original_span(&self, (start, end): (usize, usize)) -> (usize, usize) {
        let last = self.origin.len() - 1;
        let map = |i: usize| self.origin[i.min(last)];
        if end > start && end <= last {
            // End maps through the last covered byte so a char that grew
            // when lowered still ends after itself
            let (s, e) = (map(start), map(end - 1));
            let end = self.origin[end..]
                .iter()
                .copied()
                .find(|&o| o > e)
                .unwrap_or(self.origin[last]);
            return (s, end);
        }
        (map(start), map(end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_offsets_are_unchanged() {
        let l = LowercasedText::new("Hello World");
        assert_eq!(l.text, "hello world");
        assert_eq!(l.original_span((6, 11)), (6, 11));
    }

    #[test]
    fn length_changing_characters_map_back() {
        // 'İ' (2 bytes) lowercases to "i̇" (3 bytes)
        let original = "İstanbul Paris";
        let l = LowercasedText::new(original);
        let paris = l.text.find("paris").unwrap();
        let (s, e) = l.original_span((paris, paris + 5));
        assert_eq!(&original[s..e], "Paris");

        let (s, e) = l.original_span((0, l.text.find(' ').unwrap()));
        assert_eq!(&original[s..e], "İstanbul");
    }

    #[test]
    fn preserved_tokens_keep_their_case() {
        let l = LowercasedText::preserving("Is [MASK] Here", &["[MASK]".to_string()]);
        assert_eq!(l.text, "is [MASK] here");
        assert_eq!(l.original_span((3, 9)), (3, 9));
    }
}
