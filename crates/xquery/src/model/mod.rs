//! Node identities and the node-collection algebra.

use core::fmt;
use std::hash::{Hash, Hasher};

use string_cache::DefaultAtom;

mod annotations;
mod collection;
mod docset;
mod handle;
mod joins;
mod node_id;

pub use annotations::{Annotation, ContextEntry, ContextId, MatchSpan};
pub use collection::{CollectionBuilder, NodeCollection};
pub use docset::DocumentSet;
pub use handle::NodeHandle;
pub use joins::{Recording, SiblingDirection};
pub use node_id::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Document => "document-node()",
            NodeKind::Element => "element()",
            NodeKind::Attribute => "attribute()",
            NodeKind::Text => "text()",
            NodeKind::Comment => "comment()",
            NodeKind::ProcessingInstruction => "processing-instruction()",
        }
    }
}

/// Identifier of a stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocId(pub u32);

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

/// Qualified name. Equality and hashing ignore the prefix.
#[derive(Debug, Clone)]
pub struct QName {
    pub prefix: Option<DefaultAtom>,
    pub local: DefaultAtom,
    pub ns_uri: Option<DefaultAtom>,
}

impl QName {
    pub fn new(ns_uri: Option<&str>, local: &str) -> Self {
        Self { prefix: None, local: DefaultAtom::from(local), ns_uri: ns_uri.map(DefaultAtom::from) }
    }

    /// Name in no namespace.
    pub fn local(local: &str) -> Self {
        Self::new(None, local)
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(DefaultAtom::from(prefix));
        self
    }

    /// Clark notation `{ns}local`, used in diagnostics and function keys.
    pub fn expanded(&self) -> String {
        match &self.ns_uri {
            Some(ns) => format!("{{{ns}}}{}", self.local),
            None => self.local.to_string(),
        }
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.local == other.local && self.ns_uri == other.ns_uri
    }
}

impl Eq for QName {}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.local.hash(state);
        self.ns_uri.hash(state);
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(p) if !p.is_empty() => write!(f, "{p}:{}", self.local),
            _ => f.write_str(&self.local),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qname_equality_ignores_prefix() {
        let a = QName::new(Some("urn:x"), "item").with_prefix("a");
        let b = QName::new(Some("urn:x"), "item").with_prefix("b");
        assert_eq!(a, b);
        assert_ne!(a, QName::local("item"));
        assert_eq!(a.to_string(), "a:item");
        assert_eq!(b.expanded(), "{urn:x}item");
    }
}
