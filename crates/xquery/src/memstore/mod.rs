//! Reference in-memory broker.
//!
//! Keeps whole documents in memory and answers the index questions by
//! scanning. Used by the test-suite and for prototyping queries without a
//! database behind them.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use fancy_regex::Regex;
use tracing::debug;

use crate::broker::{Broker, DocumentBuilder, IndexCoverage};
use crate::error::{Error, Result};
use crate::fulltext::{PatternCache, TermMatcher, glob_to_regex, normalize_token, tokenize};
use crate::model::{CollectionBuilder, DocId, DocumentSet, MatchSpan, NodeCollection, NodeHandle, NodeKind, QName};

mod builder;
mod tree;

pub use builder::MemoryDocumentBuilder;
pub use tree::{ElementSpec, NodeSpec, comment, elem, elem_ns, pi, text};

use tree::StoredDoc;

#[derive(Debug, Default)]
pub(crate) struct StoreData {
    docs: BTreeMap<DocId, StoredDoc>,
    next_doc: u32,
}

impl StoreData {
    fn allocate(&mut self) -> DocId {
        self.next_doc += 1;
        DocId(self.next_doc)
    }

    pub(crate) fn new_fragment(&mut self) -> DocId {
        let id = self.allocate();
        self.docs.insert(id, StoredDoc::new(id, format!("fragment-{}", id.0), true));
        id
    }

    pub(crate) fn doc(&self, id: DocId) -> Result<&StoredDoc> {
        self.docs.get(&id).ok_or_else(|| Error::storage(format!("unknown document {id}")))
    }

    pub(crate) fn doc_mut(&mut self, id: DocId) -> Result<&mut StoredDoc> {
        self.docs.get_mut(&id).ok_or_else(|| Error::storage(format!("unknown document {id}")))
    }

    fn node(&self, h: &NodeHandle) -> Result<(&StoredDoc, usize)> {
        let doc = self.doc(h.doc)?;
        let idx = doc.lookup(&h.id).ok_or_else(|| Error::storage(format!("unknown node {h}")))?;
        Ok((doc, idx))
    }
}

/// Shared handle to an in-memory corpus. Clones see the same documents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Rc<RefCell<StoreData>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a document whose element root is `root`.
    pub fn add_document(&self, name: &str, root: impl Into<NodeSpec>) -> DocId {
        self.add_document_with_coverage(name, root, IndexCoverage::FULL)
    }

    pub fn add_document_with_coverage(&self, name: &str, root: impl Into<NodeSpec>, coverage: IndexCoverage) -> DocId {
        let mut data = self.data.borrow_mut();
        let id = data.allocate();
        let mut doc = StoredDoc::new(id, name, false);
        doc.coverage = coverage;
        doc.insert_spec(0, &root.into());
        debug!(doc = %id, name, nodes = doc.nodes.len(), "stored document");
        data.docs.insert(id, doc);
        id
    }

    pub fn set_coverage(&self, doc: DocId, coverage: IndexCoverage) -> Result<()> {
        self.data.borrow_mut().doc_mut(doc)?.coverage = coverage;
        Ok(())
    }

    pub fn document_named(&self, name: &str) -> Option<DocId> {
        self.data.borrow().docs.values().find(|d| !d.fragment && d.name == name).map(|d| d.id)
    }

    /// Handle of the document element.
    pub fn root_element(&self, doc: DocId) -> Result<NodeHandle> {
        let data = self.data.borrow();
        let d = data.doc(doc)?;
        let idx = d.nodes[0]
            .children
            .iter()
            .copied()
            .find(|&c| d.nodes[c].kind == NodeKind::Element)
            .ok_or_else(|| Error::storage(format!("{doc} has no document element")))?;
        Ok(d.handle(idx))
    }

    fn scan(&self, docs: &DocumentSet, mut f: impl FnMut(&StoredDoc, usize, &mut CollectionBuilder) -> Result<()>) -> Result<NodeCollection> {
        let data = self.data.borrow();
        let mut out = CollectionBuilder::new();
        for id in docs.iter() {
            let Some(doc) = data.docs.get(&id) else { continue };
            for idx in 0..doc.nodes.len() {
                f(doc, idx, &mut out)?;
            }
        }
        Ok(out.finish())
    }
}

impl Broker for MemoryStore {
    fn documents(&self) -> DocumentSet {
        self.data.borrow().docs.values().filter(|d| !d.fragment).map(|d| d.id).collect()
    }

    fn node_name(&self, node: &NodeHandle) -> Result<Option<QName>> {
        let data = self.data.borrow();
        let (doc, idx) = data.node(node)?;
        Ok(doc.nodes[idx].name.clone())
    }

    fn string_value(&self, node: &NodeHandle) -> Result<String> {
        let data = self.data.borrow();
        let (doc, idx) = data.node(node)?;
        Ok(doc.string_value(idx))
    }

    fn children(&self, node: &NodeHandle) -> Result<Vec<NodeHandle>> {
        let data = self.data.borrow();
        let (doc, idx) = data.node(node)?;
        Ok(doc.nodes[idx].children.iter().map(|&c| doc.handle(c)).collect())
    }

    fn attributes(&self, node: &NodeHandle) -> Result<Vec<NodeHandle>> {
        let data = self.data.borrow();
        let (doc, idx) = data.node(node)?;
        Ok(doc.nodes[idx].attrs.iter().map(|&c| doc.handle(c)).collect())
    }

    fn next_sibling(&self, node: &NodeHandle) -> Result<Option<NodeHandle>> {
        let data = self.data.borrow();
        let (doc, idx) = data.node(node)?;
        let Some(parent) = doc.nodes[idx].parent else { return Ok(None) };
        let sibs = &doc.nodes[parent].children;
        Ok(sibs.iter().position(|&c| c == idx).and_then(|p| sibs.get(p + 1)).map(|&c| doc.handle(c)))
    }

    fn previous_sibling(&self, node: &NodeHandle) -> Result<Option<NodeHandle>> {
        let data = self.data.borrow();
        let (doc, idx) = data.node(node)?;
        let Some(parent) = doc.nodes[idx].parent else { return Ok(None) };
        let sibs = &doc.nodes[parent].children;
        Ok(sibs
            .iter()
            .position(|&c| c == idx)
            .and_then(|p| p.checked_sub(1))
            .map(|p| doc.handle(sibs[p])))
    }

    fn find_by_name(&self, docs: &DocumentSet, kind: NodeKind, name: &QName) -> Result<NodeCollection> {
        self.scan(docs, |doc, idx, out| {
            let n = &doc.nodes[idx];
            if n.kind == kind && n.name.as_ref() == Some(name) {
                out.push(doc.handle(idx));
            }
            Ok(())
        })
    }

    fn find_by_value(&self, docs: &DocumentSet, mask: &str) -> Result<NodeCollection> {
        let re = Regex::new(&glob_to_regex(mask))?;
        self.scan(docs, |doc, idx, out| {
            let kind = doc.nodes[idx].kind;
            if matches!(kind, NodeKind::Element | NodeKind::Attribute) && re.is_match(&doc.string_value(idx))? {
                out.push(doc.handle(idx));
            }
            Ok(())
        })
    }

    fn find_terms(&self, docs: &DocumentSet, term: &str) -> Result<NodeCollection> {
        let mut cache = PatternCache::new(1);
        let matcher = TermMatcher::new(&normalize_token(term), &mut cache)?;
        self.scan(docs, |doc, idx, out| {
            let n = &doc.nodes[idx];
            if !matches!(n.kind, NodeKind::Text | NodeKind::Attribute) {
                return Ok(());
            }
            let handle = doc.handle(idx);
            for tok in tokenize(&n.value) {
                if matcher.matches(&tok.text)? {
                    let span = MatchSpan { node: handle.clone(), offset: tok.offset, length: tok.length, term: matcher.term().into() };
                    out.note_mut(&handle).add_match(span);
                    out.push(handle.clone());
                }
            }
            Ok(())
        })
    }

    fn index_coverage(&self, doc: DocId) -> Result<IndexCoverage> {
        Ok(self.data.borrow().doc(doc)?.coverage)
    }

    fn document_builder(&self) -> Result<Box<dyn DocumentBuilder>> {
        Ok(Box::new(MemoryDocumentBuilder::new(Rc::clone(&self.data))))
    }
}
