use compact_str::CompactString;
use unicode_normalization::UnicodeNormalization;

/// A word of indexed text. `offset` and `length` are byte positions in the
/// original string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: CompactString,
    pub offset: usize,
    pub length: usize,
}

/// NFKC followed by lower casing.
pub fn normalize_token(raw: &str) -> CompactString {
    raw.nfkc().flat_map(char::to_lowercase).collect()
}

fn split(text: &str, keep: impl Fn(char) -> bool) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in text.char_indices() {
        match (keep(c), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

/// Splits content on anything that is not alphanumeric.
pub fn tokenize(text: &str) -> Vec<Token> {
    split(text, char::is_alphanumeric)
        .into_iter()
        .map(|(s, e)| Token { text: normalize_token(&text[s..e]), offset: s, length: e - s })
        .collect()
}

/// Splits search terms; `*` and `?` stay part of a term as wildcards.
pub fn tokenize_query(text: &str) -> Vec<CompactString> {
    split(text, |c| c.is_alphanumeric() || c == '*' || c == '?')
        .into_iter()
        .map(|(s, e)| normalize_token(&text[s..e]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_and_normalizes() {
        let toks = tokenize("Hello, ＷＯＲＬＤ-wide web!");
        let words: Vec<&str> = toks.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words, vec!["hello", "world", "wide", "web"]);
        assert_eq!(toks[0].offset, 0);
        assert_eq!(toks[0].length, 5);
    }

    #[test]
    fn query_keeps_wildcards() {
        assert_eq!(tokenize_query("data* ?ase  Xml"), vec!["data*", "?ase", "xml"]);
        assert!(tokenize_query("  ,; ").is_empty());
    }
}
