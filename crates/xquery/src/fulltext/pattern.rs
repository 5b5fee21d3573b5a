use std::num::NonZeroUsize;
use std::rc::Rc;

use compact_str::CompactString;
use fancy_regex::Regex;
use lru::LruCache;

use crate::error::Result;

pub fn is_wildcard(term: &str) -> bool {
    term.contains(['*', '?'])
}

/// Escapes the characters a glob mask treats specially.
pub fn escape_glob(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '*' | '?' | '[' | ']') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Anchored regex for a glob: `*`, `?`, `[...]` classes and backslash
/// escapes.
pub fn glob_to_regex(glob: &str) -> String {
    let mut re = String::with_capacity(glob.len() + 12);
    // Wildcards also span line breaks in multi-line string values.
    re.push_str("(?s)^");
    let mut chars = glob.chars().peekable();
    let mut in_class = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    re.push_str(&fancy_regex::escape(&next.to_string()));
                }
            }
            '*' if !in_class => re.push_str(".*"),
            '?' if !in_class => re.push('.'),
            '[' if !in_class => {
                in_class = true;
                re.push('[');
                if chars.peek() == Some(&'!') {
                    chars.next();
                    re.push('^');
                }
            }
            ']' if in_class => {
                in_class = false;
                re.push(']');
            }
            c if in_class => {
                if matches!(c, '\\' | '^' | '[') {
                    re.push('\\');
                }
                re.push(c);
            }
            c => re.push_str(&fancy_regex::escape(&c.to_string())),
        }
    }
    if in_class {
        re.push(']');
    }
    re.push('$');
    re
}

/// Compiled glob patterns, least recently used evicted first.
pub struct PatternCache {
    inner: LruCache<String, Rc<Regex>>,
}

impl PatternCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { inner: LruCache::new(cap) }
    }

    pub fn get(&mut self, glob: &str) -> Result<Rc<Regex>> {
        if let Some(re) = self.inner.get(glob) {
            return Ok(Rc::clone(re));
        }
        let re = Rc::new(Regex::new(&glob_to_regex(glob))?);
        self.inner.put(glob.to_string(), Rc::clone(&re));
        Ok(re)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// A normalized search term, compared against normalized tokens.
#[derive(Debug, Clone)]
pub enum TermMatcher {
    Exact(CompactString),
    Pattern(CompactString, Rc<Regex>),
}

impl TermMatcher {
    pub fn new(term: &str, cache: &mut PatternCache) -> Result<Self> {
        if is_wildcard(term) {
            Ok(TermMatcher::Pattern(term.into(), cache.get(term)?))
        } else {
            Ok(TermMatcher::Exact(term.into()))
        }
    }

    pub fn term(&self) -> &str {
        match self {
            TermMatcher::Exact(t) | TermMatcher::Pattern(t, _) => t,
        }
    }

    pub fn matches(&self, token: &str) -> Result<bool> {
        match self {
            TermMatcher::Exact(t) => Ok(t == token),
            TermMatcher::Pattern(_, re) => Ok(re.is_match(token)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_translation() {
        let mut cache = PatternCache::new(4);
        let re = cache.get("da?a*").unwrap();
        assert!(re.is_match("database").unwrap());
        assert!(!re.is_match("dbase").unwrap());
        let esc = cache.get(&escape_glob("a*b")).unwrap();
        assert!(esc.is_match("a*b").unwrap());
        assert!(!esc.is_match("axxb").unwrap());
        assert!(cache.get("[bc]at").unwrap().is_match("cat").unwrap());
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn wildcards_span_line_breaks() {
        let mut cache = PatternCache::new(2);
        assert!(cache.get("ab*").unwrap().is_match("ab\ncd").unwrap());
        assert!(cache.get("ab?cd").unwrap().is_match("ab\ncd").unwrap());
        assert!(!cache.get("ab").unwrap().is_match("ab\ncd").unwrap());
    }

    #[test]
    fn matcher_kinds() {
        let mut cache = PatternCache::new(2);
        assert!(TermMatcher::new("xml", &mut cache).unwrap().matches("xml").unwrap());
        let w = TermMatcher::new("x*", &mut cache).unwrap();
        assert!(matches!(w, TermMatcher::Pattern(..)));
        assert!(w.matches("xquery").unwrap());
        assert_eq!(w.term(), "x*");
    }
}
