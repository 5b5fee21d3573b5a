//! Tokenizing and term matching shared by the full-text expressions and the
//! in-memory index.

mod pattern;
mod tokenizer;

pub use pattern::{PatternCache, TermMatcher, escape_glob, glob_to_regex, is_wildcard};
pub use tokenizer::{Token, normalize_token, tokenize, tokenize_query};
