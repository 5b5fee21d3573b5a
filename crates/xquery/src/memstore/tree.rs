//! Stored document representation and a small builder for test trees.
//!
//! ```
//! use xmldb_xquery::memstore::{MemoryStore, elem};
//!
//! // <book id="b1"><title>XML</title></book>
//! let store = MemoryStore::new();
//! let doc = store.add_document("books.xml", elem("book").attr("id", "b1").child(elem("title").text("XML")));
//! assert_eq!(store.document_named("books.xml"), Some(doc));
//! ```

use std::collections::HashMap;

use crate::broker::IndexCoverage;
use crate::model::{DocId, NodeHandle, NodeId, NodeKind, QName};

#[derive(Debug, Clone)]
pub(crate) struct StoredNode {
    pub kind: NodeKind,
    pub name: Option<QName>,
    pub value: String,
    pub id: NodeId,
    pub parent: Option<usize>,
    pub attrs: Vec<usize>,
    pub children: Vec<usize>,
    next_child: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct StoredDoc {
    pub id: DocId,
    pub name: String,
    pub nodes: Vec<StoredNode>,
    pub index: HashMap<NodeId, usize>,
    pub coverage: IndexCoverage,
    /// Holds constructed nodes; not part of the visible corpus.
    pub fragment: bool,
}

impl StoredDoc {
    pub fn new(id: DocId, name: impl Into<String>, fragment: bool) -> Self {
        let root = StoredNode {
            kind: NodeKind::Document,
            name: None,
            value: String::new(),
            id: NodeId::document(),
            parent: None,
            attrs: Vec::new(),
            children: Vec::new(),
            next_child: 0,
        };
        let mut index = HashMap::new();
        index.insert(NodeId::document(), 0);
        Self { id, name: name.into(), nodes: vec![root], index, coverage: IndexCoverage::FULL, fragment }
    }

    /// Appends a node below `parent`. Child numbers are handed out in call
    /// order, so attributes must be appended before content.
    pub fn append(&mut self, parent: usize, kind: NodeKind, name: Option<QName>, value: String) -> usize {
        let p = &mut self.nodes[parent];
        p.next_child += 1;
        let id = p.id.child(p.next_child);
        let idx = self.nodes.len();
        if kind == NodeKind::Attribute {
            self.nodes[parent].attrs.push(idx);
        } else {
            self.nodes[parent].children.push(idx);
        }
        self.index.insert(id.clone(), idx);
        self.nodes.push(StoredNode {
            kind,
            name,
            value,
            id,
            parent: Some(parent),
            attrs: Vec::new(),
            children: Vec::new(),
            next_child: 0,
        });
        idx
    }

    pub fn handle(&self, idx: usize) -> NodeHandle {
        let n = &self.nodes[idx];
        NodeHandle::new(self.id, n.id.clone(), n.kind)
    }

    pub fn lookup(&self, id: &NodeId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn string_value(&self, idx: usize) -> String {
        let n = &self.nodes[idx];
        match n.kind {
            NodeKind::Document | NodeKind::Element => {
                let mut out = String::new();
                self.collect_text(idx, &mut out);
                out
            }
            _ => n.value.clone(),
        }
    }

    fn collect_text(&self, idx: usize, out: &mut String) {
        for &c in &self.nodes[idx].children {
            let child = &self.nodes[c];
            match child.kind {
                NodeKind::Text => out.push_str(&child.value),
                NodeKind::Element => self.collect_text(c, out),
                _ => {}
            }
        }
    }

    pub fn insert_spec(&mut self, parent: usize, spec: &NodeSpec) {
        match spec {
            NodeSpec::Element(e) => {
                let idx = self.append(parent, NodeKind::Element, Some(e.name.clone()), String::new());
                for (name, value) in &e.attrs {
                    self.append(idx, NodeKind::Attribute, Some(name.clone()), value.clone());
                }
                for c in &e.children {
                    self.insert_spec(idx, c);
                }
            }
            NodeSpec::Text(t) => {
                self.append(parent, NodeKind::Text, None, t.clone());
            }
            NodeSpec::Comment(t) => {
                self.append(parent, NodeKind::Comment, None, t.clone());
            }
            NodeSpec::ProcessingInstruction(target, data) => {
                self.append(parent, NodeKind::ProcessingInstruction, Some(QName::local(target)), data.clone());
            }
        }
    }
}

/// Tree description used to populate a [`super::MemoryStore`].
#[derive(Debug, Clone)]
pub enum NodeSpec {
    Element(ElementSpec),
    Text(String),
    Comment(String),
    ProcessingInstruction(String, String),
}

#[derive(Debug, Clone)]
pub struct ElementSpec {
    name: QName,
    attrs: Vec<(QName, String)>,
    children: Vec<NodeSpec>,
}

impl ElementSpec {
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.push((QName::local(name), value.to_string()));
        self
    }

    pub fn attr_ns(mut self, ns: &str, name: &str, value: &str) -> Self {
        self.attrs.push((QName::new(Some(ns), name), value.to_string()));
        self
    }

    pub fn child(mut self, child: impl Into<NodeSpec>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I: IntoIterator<Item = NodeSpec>>(mut self, it: I) -> Self {
        self.children.extend(it);
        self
    }

    pub fn text(mut self, value: &str) -> Self {
        self.children.push(NodeSpec::Text(value.to_string()));
        self
    }
}

impl From<ElementSpec> for NodeSpec {
    fn from(e: ElementSpec) -> Self {
        NodeSpec::Element(e)
    }
}

pub fn elem(name: &str) -> ElementSpec {
    ElementSpec { name: QName::local(name), attrs: Vec::new(), children: Vec::new() }
}

pub fn elem_ns(ns: &str, name: &str) -> ElementSpec {
    ElementSpec { name: QName::new(Some(ns), name), attrs: Vec::new(), children: Vec::new() }
}

pub fn text(value: &str) -> NodeSpec {
    NodeSpec::Text(value.to_string())
}

pub fn comment(value: &str) -> NodeSpec {
    NodeSpec::Comment(value.to_string())
}

pub fn pi(target: &str, data: &str) -> NodeSpec {
    NodeSpec::ProcessingInstruction(target.to_string(), data.to_string())
}
