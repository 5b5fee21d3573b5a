//! Dynamic evaluation state threaded through every `eval` call.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use compact_str::CompactString;
use tracing::trace;

use crate::broker::Broker;
use crate::context::StaticContext;
use crate::expr::ExprId;
use crate::fulltext::PatternCache;
use crate::model::{ContextId, DocumentSet, NodeCollection};

/// Position and size of the context item inside the context sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Focus {
    pub position: usize,
    pub size: usize,
}

#[derive(Debug, Clone)]
enum CacheEntry {
    /// Name-index lookup of a location step.
    Names { generation: u64, docs: DocumentSet, nodes: NodeCollection },
    /// Full-text hits of one search term.
    Terms { generation: u64, docs: DocumentSet, hits: HashMap<CompactString, NodeCollection> },
}

/// Intermediate results keyed by expression, valid for one generation and
/// document set.
#[derive(Debug, Default)]
pub struct EvalCache {
    entries: HashMap<ExprId, CacheEntry>,
}

impl EvalCache {
    pub fn names(&self, id: ExprId, generation: u64, docs: &DocumentSet) -> Option<&NodeCollection> {
        match self.entries.get(&id) {
            Some(CacheEntry::Names { generation: g, docs: d, nodes }) if *g == generation && d == docs => Some(nodes),
            _ => None,
        }
    }

    pub fn store_names(&mut self, id: ExprId, generation: u64, docs: DocumentSet, nodes: NodeCollection) {
        self.entries.insert(id, CacheEntry::Names { generation, docs, nodes });
    }

    pub fn term(&self, id: ExprId, generation: u64, docs: &DocumentSet, term: &str) -> Option<&NodeCollection> {
        match self.entries.get(&id) {
            Some(CacheEntry::Terms { generation: g, docs: d, hits }) if *g == generation && d == docs => hits.get(term),
            _ => None,
        }
    }

    pub fn store_term(&mut self, id: ExprId, generation: u64, docs: &DocumentSet, term: &str, nodes: NodeCollection) {
        let entry = self.entries.entry(id).or_insert_with(|| CacheEntry::Terms {
            generation,
            docs: docs.clone(),
            hits: HashMap::new(),
        });
        match entry {
            CacheEntry::Terms { generation: g, docs: d, hits } if *g == generation && d == docs => {
                hits.insert(term.into(), nodes);
            }
            other => {
                let mut hits = HashMap::new();
                hits.insert(CompactString::from(term), nodes);
                *other = CacheEntry::Terms { generation, docs: docs.clone(), hits };
            }
        }
    }

    pub fn remove(&mut self, id: ExprId) {
        self.entries.remove(&id);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything an expression needs while it runs: the broker, the static
/// context, the working document set, caches and the focus.
pub struct EvalContext<'a> {
    pub broker: &'a dyn Broker,
    pub sctx: &'a mut StaticContext,
    pub docs: DocumentSet,
    /// Documents the query was started with, before preselection.
    query_docs: DocumentSet,
    generation: u64,
    pub cache: EvalCache,
    focus: Option<Focus>,
    context_ids: Vec<ContextId>,
    pub patterns: PatternCache,
}

impl<'a> EvalContext<'a> {
    pub fn new(broker: &'a dyn Broker, sctx: &'a mut StaticContext, docs: DocumentSet) -> Self {
        let capacity = sctx.config().pattern_cache_capacity;
        Self {
            broker,
            sctx,
            query_docs: docs.clone(),
            docs,
            generation: 1,
            cache: EvalCache::default(),
            focus: None,
            context_ids: Vec::new(),
            patterns: PatternCache::new(capacity),
        }
    }

    /// Replaces the working document set with its preselected subset.
    #[must_use]
    pub fn narrowed_to(mut self, docs: DocumentSet) -> Self {
        self.docs = docs;
        self
    }

    /// Runs `f` over every document of the query, not only those the
    /// enclosing path was narrowed to.
    pub fn with_query_documents<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let narrowed = std::mem::replace(&mut self.docs, self.query_docs.clone());
        let r = f(self);
        self.docs = narrowed;
        r
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Starts an independent evaluation; cached lookups of earlier
    /// generations are ignored from now on.
    pub fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        trace!(generation = self.generation, "new evaluation generation");
        self.generation
    }

    pub fn focus(&self) -> Option<Focus> {
        self.focus
    }

    /// Runs `f` with the given focus and restores the previous one.
    pub fn with_focus<T>(&mut self, focus: Focus, f: impl FnOnce(&mut Self) -> T) -> T {
        let prev = self.focus.replace(focus);
        let r = f(self);
        self.focus = prev;
        r
    }

    /// Runs `f` without a focus (inside function bodies).
    pub fn without_focus<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let prev = self.focus.take();
        let r = f(self);
        self.focus = prev;
        r
    }

    /// Id under which location steps record their context nodes.
    pub fn context_id(&self) -> Option<ContextId> {
        self.context_ids.last().copied()
    }

    pub fn with_context_id<T>(&mut self, id: ContextId, f: impl FnOnce(&mut Self) -> T) -> T {
        self.context_ids.push(id);
        let r = f(self);
        self.context_ids.pop();
        r
    }

    /// Opens a variable scope closed when the guard drops.
    pub fn enter_scope(&mut self) -> ScopeGuard<'_, 'a> {
        let depth = self.sctx.variables.depth();
        self.sctx.variables.push_scope();
        ScopeGuard { ctx: self, depth }
    }

    /// Scope of a function body: caller locals are not visible.
    pub fn enter_function_scope(&mut self) -> ScopeGuard<'_, 'a> {
        let depth = self.sctx.variables.depth();
        self.sctx.variables.push_function_scope();
        ScopeGuard { ctx: self, depth }
    }
}

/// Open variable scope. Dereferences to the evaluation context; dropping it
/// restores the scope depth seen at creation, on success and error alike.
pub struct ScopeGuard<'g, 'a> {
    ctx: &'g mut EvalContext<'a>,
    depth: usize,
}

impl<'a> Deref for ScopeGuard<'_, 'a> {
    type Target = EvalContext<'a>;

    fn deref(&self) -> &Self::Target {
        &*self.ctx
    }
}

impl DerefMut for ScopeGuard<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.ctx
    }
}

impl Drop for ScopeGuard<'_, '_> {
    fn drop(&mut self) {
        self.ctx.sctx.variables.truncate_to(self.depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memstore::MemoryStore;
    use crate::model::QName;
    use crate::xdm::Sequence;

    #[test]
    fn scope_guard_restores_depth() {
        let store = MemoryStore::new();
        let mut sctx = StaticContext::default();
        let mut ctx = EvalContext::new(&store, &mut sctx, DocumentSet::new());
        {
            let mut g = ctx.enter_scope();
            g.sctx.variables.declare(QName::local("x"), Sequence::integer(1));
            let mut inner = g.enter_scope();
            assert_eq!(inner.sctx.variables.depth(), 2);
            inner.sctx.variables.declare(QName::local("y"), Sequence::empty());
        }
        assert_eq!(ctx.sctx.variables.depth(), 0);
        assert!(ctx.sctx.variables.lookup(&QName::local("x")).is_none());
    }

    #[test]
    fn focus_is_restored() {
        let store = MemoryStore::new();
        let mut sctx = StaticContext::default();
        let mut ctx = EvalContext::new(&store, &mut sctx, DocumentSet::new());
        let seen = ctx.with_focus(Focus { position: 2, size: 3 }, |c| c.focus());
        assert_eq!(seen, Some(Focus { position: 2, size: 3 }));
        assert_eq!(ctx.focus(), None);
    }

    #[test]
    fn cache_respects_generation() {
        let mut cache = EvalCache::default();
        let id = ExprId::fresh();
        let docs = DocumentSet::new();
        cache.store_names(id, 1, docs.clone(), NodeCollection::new());
        assert!(cache.names(id, 1, &docs).is_some());
        assert!(cache.names(id, 2, &docs).is_none());
        cache.store_term(id, 2, &docs, "a", NodeCollection::new());
        assert!(cache.term(id, 2, &docs, "a").is_some());
        assert!(cache.term(id, 2, &docs, "b").is_none());
    }
}
