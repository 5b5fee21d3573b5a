mod common;

use std::cell::Cell;

use common::*;
use rstest::rstest;
use xmldb_xquery::expr::{KeywordExpr, MatchMode};
use xmldb_xquery::memstore::MemoryStore;
use xmldb_xquery::{
    Broker, DocId, DocumentBuilder, DocumentSet, EvalContext, Expr, Expression, IndexCoverage, NodeCollection, NodeHandle,
    NodeKind, QName, Result, StaticContext,
};

/// Memory store that counts structural and full-text index lookups.
struct CountingBroker<'s> {
    store: &'s MemoryStore,
    name_lookups: Cell<usize>,
    term_lookups: Cell<usize>,
}

impl<'s> CountingBroker<'s> {
    fn new(store: &'s MemoryStore) -> Self {
        Self { store, name_lookups: Cell::new(0), term_lookups: Cell::new(0) }
    }
}

impl Broker for CountingBroker<'_> {
    fn documents(&self) -> DocumentSet {
        self.store.documents()
    }

    fn node_name(&self, node: &NodeHandle) -> Result<Option<QName>> {
        self.store.node_name(node)
    }

    fn string_value(&self, node: &NodeHandle) -> Result<String> {
        self.store.string_value(node)
    }

    fn children(&self, node: &NodeHandle) -> Result<Vec<NodeHandle>> {
        self.store.children(node)
    }

    fn attributes(&self, node: &NodeHandle) -> Result<Vec<NodeHandle>> {
        self.store.attributes(node)
    }

    fn next_sibling(&self, node: &NodeHandle) -> Result<Option<NodeHandle>> {
        self.store.next_sibling(node)
    }

    fn previous_sibling(&self, node: &NodeHandle) -> Result<Option<NodeHandle>> {
        self.store.previous_sibling(node)
    }

    fn document_node(&self, doc: DocId) -> Result<NodeHandle> {
        self.store.document_node(doc)
    }

    fn find_by_name(&self, docs: &DocumentSet, kind: NodeKind, name: &QName) -> Result<NodeCollection> {
        self.name_lookups.set(self.name_lookups.get() + 1);
        self.store.find_by_name(docs, kind, name)
    }

    fn documents_containing(&self, docs: &DocumentSet, kind: NodeKind, name: &QName) -> Result<DocumentSet> {
        self.store.documents_containing(docs, kind, name)
    }

    fn find_by_value(&self, docs: &DocumentSet, mask: &str) -> Result<NodeCollection> {
        self.store.find_by_value(docs, mask)
    }

    fn find_terms(&self, docs: &DocumentSet, term: &str) -> Result<NodeCollection> {
        self.term_lookups.set(self.term_lookups.get() + 1);
        self.store.find_terms(docs, term)
    }

    fn index_coverage(&self, doc: DocId) -> Result<IndexCoverage> {
        self.store.index_coverage(doc)
    }

    fn document_builder(&self) -> Result<Box<dyn DocumentBuilder>> {
        self.store.document_builder()
    }
}

#[rstest]
fn name_lookup_is_reused_until_reset_or_next_generation(corpus: Corpus) {
    let broker = CountingBroker::new(&corpus.store);
    let mut sctx = StaticContext::default();
    let mut ctx = EvalContext::new(&broker, &mut sctx, corpus.docs());
    let titles = all("title");

    let first = titles.eval(&mut ctx, None, None).unwrap();
    assert_eq!(corpus.strings(&first).len(), 3);
    assert_eq!(broker.name_lookups.get(), 1);
    assert_eq!(ctx.cache.len(), 1);

    let cached = titles.eval(&mut ctx, None, None).unwrap();
    assert_eq!(broker.name_lookups.get(), 1);
    assert_eq!(corpus.strings(&cached), corpus.strings(&first));

    titles.reset_state(&mut ctx);
    assert!(ctx.cache.is_empty());
    let after_reset = titles.eval(&mut ctx, None, None).unwrap();
    assert_eq!(broker.name_lookups.get(), 2);
    assert_eq!(corpus.strings(&after_reset), corpus.strings(&first));

    ctx.next_generation();
    let next = titles.eval(&mut ctx, None, None).unwrap();
    assert_eq!(broker.name_lookups.get(), 3);
    assert_eq!(ctx.cache.len(), 1);
    assert_eq!(corpus.strings(&next), corpus.strings(&first));
}

#[rstest]
fn term_lookup_is_reused_until_reset_or_next_generation(corpus: Corpus) {
    let broker = CountingBroker::new(&corpus.store);
    let mut sctx = StaticContext::default();
    let mut ctx = EvalContext::new(&broker, &mut sctx, corpus.docs());
    let alpha = Expr::Keyword(Box::new(KeywordExpr::new(all("para"), s("alpha"), MatchMode::And)));

    let first = alpha.eval(&mut ctx, None, None).unwrap();
    assert_eq!(corpus.strings(&first), vec!["alpha beta", "alpha gamma"]);
    assert_eq!(broker.term_lookups.get(), 1);

    alpha.eval(&mut ctx, None, None).unwrap();
    assert_eq!(broker.term_lookups.get(), 1);

    alpha.reset_state(&mut ctx);
    assert!(ctx.cache.is_empty());
    let after_reset = alpha.eval(&mut ctx, None, None).unwrap();
    assert_eq!(broker.term_lookups.get(), 2);
    assert_eq!(corpus.strings(&after_reset), corpus.strings(&first));

    ctx.next_generation();
    let next = alpha.eval(&mut ctx, None, None).unwrap();
    assert_eq!(broker.term_lookups.get(), 3);
    assert_eq!(corpus.strings(&next), corpus.strings(&first));
}
