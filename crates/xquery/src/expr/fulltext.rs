//! Full-text operators: keyword matching (`&=`, `|=`) and `near`.
//!
//! Candidates come from the path operand. Hits come from the full-text index
//! and each one is joined to its nearest containing candidate, which then
//! carries the hit's match spans.

use core::fmt;

use compact_str::CompactString;
use tracing::{debug, trace};

use super::{Expr, ExprId, Expression};
use crate::broker::Broker;
use crate::error::{Error, ErrorCode, Result};
use crate::eval::EvalContext;
use crate::fulltext::{TermMatcher, tokenize, tokenize_query};
use crate::model::{DocumentSet, NodeCollection};
use crate::types::{Dependencies, StaticType};
use crate::xdm::{Item, Sequence};

/// How the hits of several terms combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Every term must occur.
    And,
    /// At least one term must occur.
    Or,
}

impl MatchMode {
    fn operator(self) -> &'static str {
        match self {
            MatchMode::And => "&=",
            MatchMode::Or => "|=",
        }
    }
}

/// Search terms of `terms`: the string values of its items, tokenized.
fn search_terms(
    terms: &Expr,
    ctx: &mut EvalContext<'_>,
    context_seq: Option<&Sequence>,
    context_item: Option<&Item>,
) -> Result<Vec<CompactString>> {
    let values = terms.eval(ctx, context_seq, context_item)?.atomize(ctx.broker)?;
    let text = values.iter().map(|v| v.string_value()).collect::<Vec<_>>().join(" ");
    let out = tokenize_query(&text);
    if out.is_empty() {
        return Err(Error::from_code(ErrorCode::EXQD0002, format!("no search terms in \"{text}\"")));
    }
    Ok(out)
}

/// Terms known before evaluation, if `terms` is a literal.
fn literal_terms(terms: &Expr) -> Option<Vec<CompactString>> {
    terms.as_literal().map(|l| tokenize_query(&l.value().string_value()))
}

/// Index hits of `term`, cached under `id` for the current generation.
fn term_hits(ctx: &mut EvalContext<'_>, id: ExprId, docs: &DocumentSet, term: &str) -> Result<NodeCollection> {
    let generation = ctx.generation();
    if let Some(hit) = ctx.cache.term(id, generation, docs, term) {
        trace!(term, "full-text cache hit");
        return Ok(hit.clone());
    }
    let hits = ctx.broker.find_terms(docs, term)?;
    trace!(term, hits = hits.len(), "full-text lookup");
    ctx.cache.store_term(id, generation, docs, term, hits.clone());
    Ok(hits)
}

/// Candidates containing the terms, combined per `mode`.
fn select_matching(
    ctx: &mut EvalContext<'_>,
    id: ExprId,
    candidates: &NodeCollection,
    terms: &[CompactString],
    mode: MatchMode,
) -> Result<NodeCollection> {
    let docs = ctx.docs.union(&candidates.documents());
    let mut result: Option<NodeCollection> = None;
    for term in terms {
        let hits = term_hits(ctx, id, &docs, term)?;
        let found = candidates.select_containing(&hits);
        result = Some(match (result, mode) {
            (None, _) => found,
            (Some(acc), MatchMode::And) => acc.intersection(&found),
            (Some(acc), MatchMode::Or) => acc.union(&found),
        });
        if mode == MatchMode::And && result.as_ref().is_some_and(NodeCollection::is_empty) {
            break;
        }
    }
    Ok(result.unwrap_or_default())
}

fn candidate_nodes(
    path: &Expr,
    ctx: &mut EvalContext<'_>,
    context_seq: Option<&Sequence>,
    context_item: Option<&Item>,
) -> Result<NodeCollection> {
    path.eval(ctx, context_seq, context_item)?.into_nodes()
}

/// Documents that can hold a match of the literal terms.
fn preselect_terms(
    path: &Expr,
    terms: &Expr,
    mode: MatchMode,
    broker: &dyn Broker,
    docs: &DocumentSet,
) -> Result<DocumentSet> {
    let narrowed = path.preselect(broker, docs)?;
    let Some(list) = literal_terms(terms) else { return Ok(narrowed) };
    let mut acc: Option<DocumentSet> = None;
    for term in &list {
        let found = broker.find_terms(&narrowed, term)?.documents();
        acc = Some(match (acc, mode) {
            (None, _) => found,
            (Some(a), MatchMode::And) => a.intersection(&found),
            (Some(a), MatchMode::Or) => a.union(&found),
        });
    }
    Ok(acc.map_or(narrowed.clone(), |a| a.intersection(&narrowed)))
}

/// `path &= terms` and `path |= terms`.
pub struct KeywordExpr {
    id: ExprId,
    path: Expr,
    terms: Expr,
    mode: MatchMode,
}

impl KeywordExpr {
    pub fn new(path: Expr, terms: Expr, mode: MatchMode) -> Self {
        Self { id: ExprId::fresh(), path, terms, mode }
    }

    pub fn path(&self) -> &Expr {
        &self.path
    }

    pub fn terms(&self) -> &Expr {
        &self.terms
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }
}

impl Expression for KeywordExpr {
    fn eval(&self, ctx: &mut EvalContext<'_>, context_seq: Option<&Sequence>, context_item: Option<&Item>) -> Result<Sequence> {
        let candidates = candidate_nodes(&self.path, ctx, context_seq, context_item)?;
        let terms = search_terms(&self.terms, ctx, context_seq, context_item)?;
        if candidates.is_empty() {
            return Ok(Sequence::empty());
        }
        let found = select_matching(ctx, self.id, &candidates, &terms, self.mode)?;
        debug!(expr = %self, candidates = candidates.len(), result = found.len(), "keyword match");
        Ok(Sequence::Nodes(found))
    }

    fn preselect(&self, broker: &dyn Broker, docs: &DocumentSet) -> Result<DocumentSet> {
        preselect_terms(&self.path, &self.terms, self.mode, broker, docs)
    }

    fn returns_type(&self) -> StaticType {
        StaticType::Node
    }

    fn dependencies(&self) -> Dependencies {
        self.path.dependencies() | self.terms.dependencies()
    }

    fn set_in_predicate(&mut self, on: bool) {
        self.path.set_in_predicate(on);
    }

    fn reset_state(&self, ctx: &mut EvalContext<'_>) {
        ctx.cache.remove(self.id);
        self.path.reset_state(ctx);
        self.terms.reset_state(ctx);
    }
}

impl fmt::Display for KeywordExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.path, self.mode.operator(), self.terms)
    }
}

/// `near(path, terms, distance)`: all terms in the given order, each at
/// most `distance` tokens after the previous one.
pub struct NearExpr {
    id: ExprId,
    path: Expr,
    terms: Expr,
    max_distance: Option<usize>,
}

impl NearExpr {
    pub fn new(path: Expr, terms: Expr) -> Self {
        Self { id: ExprId::fresh(), path, terms, max_distance: None }
    }

    #[must_use]
    pub fn with_distance(mut self, distance: usize) -> Self {
        self.max_distance = Some(distance);
        self
    }

    pub fn path(&self) -> &Expr {
        &self.path
    }

    pub fn terms(&self) -> &Expr {
        &self.terms
    }
}

/// Scans `tokens` for the terms in order. The window restarts when the gap
/// grows beyond `max_distance` or the first term shows up again.
fn ordered_within<'t>(tokens: impl IntoIterator<Item = &'t str>, matchers: &[TermMatcher], max_distance: usize) -> Result<bool> {
    let Some(first) = matchers.first() else { return Ok(false) };
    let mut next = 0;
    let mut last = 0;
    for (pos, tok) in tokens.into_iter().enumerate() {
        if next > 0 && pos - last <= max_distance && matchers[next].matches(tok)? {
            next += 1;
            last = pos;
        } else if first.matches(tok)? {
            next = 1;
            last = pos;
        } else if next > 0 && pos - last > max_distance {
            next = 0;
        }
        if next == matchers.len() {
            return Ok(true);
        }
    }
    Ok(false)
}

impl Expression for NearExpr {
    fn eval(&self, ctx: &mut EvalContext<'_>, context_seq: Option<&Sequence>, context_item: Option<&Item>) -> Result<Sequence> {
        let candidates = candidate_nodes(&self.path, ctx, context_seq, context_item)?;
        let terms = search_terms(&self.terms, ctx, context_seq, context_item)?;
        if candidates.is_empty() {
            return Ok(Sequence::empty());
        }
        let containing = select_matching(ctx, self.id, &candidates, &terms, MatchMode::And)?;
        let max_distance = self.max_distance.unwrap_or(ctx.sctx.config().default_near_distance);
        let matchers = terms
            .iter()
            .map(|t| TermMatcher::new(t, &mut ctx.patterns))
            .collect::<Result<Vec<_>>>()?;
        let mut keep = Vec::new();
        for (i, node) in containing.iter().enumerate() {
            let text = ctx.broker.string_value(node)?;
            let tokens = tokenize(&text);
            if ordered_within(tokens.iter().map(|t| t.text.as_str()), &matchers, max_distance)? {
                keep.push(i);
            }
        }
        debug!(expr = %self, containing = containing.len(), result = keep.len(), "near match");
        Ok(Sequence::Nodes(containing.select_positions(&keep)))
    }

    fn preselect(&self, broker: &dyn Broker, docs: &DocumentSet) -> Result<DocumentSet> {
        preselect_terms(&self.path, &self.terms, MatchMode::And, broker, docs)
    }

    fn returns_type(&self) -> StaticType {
        StaticType::Node
    }

    fn dependencies(&self) -> Dependencies {
        self.path.dependencies() | self.terms.dependencies()
    }

    fn set_in_predicate(&mut self, on: bool) {
        self.path.set_in_predicate(on);
    }

    fn reset_state(&self, ctx: &mut EvalContext<'_>) {
        ctx.cache.remove(self.id);
        self.path.reset_state(ctx);
        self.terms.reset_state(ctx);
    }
}

impl fmt::Display for NearExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max_distance {
            Some(d) => write!(f, "near({}, {}, {d})", self.path, self.terms),
            None => write!(f, "near({}, {})", self.path, self.terms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fulltext::PatternCache;

    fn matchers(terms: &[&str]) -> Vec<TermMatcher> {
        let mut cache = PatternCache::new(4);
        terms.iter().map(|t| TermMatcher::new(t, &mut cache).unwrap()).collect()
    }

    fn words(s: &str) -> Vec<&str> {
        s.split(' ').collect()
    }

    #[test]
    fn adjacent_terms_in_order() {
        let m = matchers(&["native", "database"]);
        assert!(ordered_within(words("a native database system"), &m, 1).unwrap());
        assert!(!ordered_within(words("database native"), &m, 1).unwrap());
    }

    #[test]
    fn distance_bound() {
        let m = matchers(&["native", "database"]);
        let text = words("native xml database");
        assert!(!ordered_within(text.clone(), &m, 1).unwrap());
        assert!(ordered_within(text, &m, 2).unwrap());
    }

    #[test]
    fn first_term_restarts_window() {
        let m = matchers(&["a", "b"]);
        assert!(ordered_within(words("a x x a b"), &m, 1).unwrap());
    }

    #[test]
    fn wildcard_terms() {
        let m = matchers(&["dat*", "sys?em"]);
        assert!(ordered_within(words("data system"), &m, 1).unwrap());
    }
}
