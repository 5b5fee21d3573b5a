//! Contracts of the storage layer consumed by the engine.

use crate::error::Result;
use crate::model::{DocId, DocumentSet, NodeCollection, NodeHandle, NodeKind, QName};

/// Per-document indexing configuration relevant to index-backed comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexCoverage {
    /// Element and attribute values are indexed unless configured otherwise.
    pub index_by_default: bool,
    /// Alphanumeric content is not excluded from the value index.
    pub include_alphanumeric: bool,
}

impl IndexCoverage {
    pub const FULL: IndexCoverage = IndexCoverage { index_by_default: true, include_alphanumeric: true };

    /// The value index sees every node of the document.
    pub fn is_full(self) -> bool {
        self.index_by_default && self.include_alphanumeric
    }
}

impl Default for IndexCoverage {
    fn default() -> Self {
        Self::FULL
    }
}

/// Storage and index access.
///
/// All node lists are returned in document order. Implementations must be
/// able to answer traversal questions for any handle they produced,
/// including nodes written through their [`DocumentBuilder`].
pub trait Broker {
    /// Stored documents the caller may see.
    fn documents(&self) -> DocumentSet;

    fn node_name(&self, node: &NodeHandle) -> Result<Option<QName>>;
    fn string_value(&self, node: &NodeHandle) -> Result<String>;

    /// Children excluding attributes.
    fn children(&self, node: &NodeHandle) -> Result<Vec<NodeHandle>>;
    fn attributes(&self, node: &NodeHandle) -> Result<Vec<NodeHandle>>;
    fn next_sibling(&self, node: &NodeHandle) -> Result<Option<NodeHandle>>;
    fn previous_sibling(&self, node: &NodeHandle) -> Result<Option<NodeHandle>>;

    fn document_node(&self, doc: DocId) -> Result<NodeHandle> {
        Ok(NodeHandle::document(doc))
    }

    /// Structural index: every node of `kind` named `name` in `docs`.
    fn find_by_name(&self, docs: &DocumentSet, kind: NodeKind, name: &QName) -> Result<NodeCollection>;

    /// Documents of `docs` containing at least one node of `kind` named
    /// `name`.
    fn documents_containing(&self, docs: &DocumentSet, kind: NodeKind, name: &QName) -> Result<DocumentSet> {
        Ok(self.find_by_name(docs, kind, name)?.documents())
    }

    /// Value index: elements and attributes of `docs` whose string value
    /// matches the glob `mask` (`*`, `?`, `[...]`, backslash escapes).
    fn find_by_value(&self, docs: &DocumentSet, mask: &str) -> Result<NodeCollection>;

    /// Full-text index: text and attribute nodes containing a token matching
    /// `term` (which may use `*` and `?`), annotated with match spans.
    fn find_terms(&self, docs: &DocumentSet, term: &str) -> Result<NodeCollection>;

    fn index_coverage(&self, doc: DocId) -> Result<IndexCoverage>;

    /// Builder for nodes created by constructors.
    fn document_builder(&self) -> Result<Box<dyn DocumentBuilder>>;
}

/// Receives construction events and hands out handles of the built nodes.
///
/// Nodes written at depth zero become top-level nodes of a fragment; the
/// broker that created the builder can read them back.
pub trait DocumentBuilder {
    fn start_element(&mut self, name: &QName) -> Result<NodeHandle>;
    fn end_element(&mut self) -> Result<()>;
    fn attribute(&mut self, name: &QName, value: &str) -> Result<NodeHandle>;
    /// Adjacent character data inside an element merges into one text node.
    fn characters(&mut self, text: &str) -> Result<NodeHandle>;
    fn comment(&mut self, text: &str) -> Result<NodeHandle>;
    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<NodeHandle>;
}
