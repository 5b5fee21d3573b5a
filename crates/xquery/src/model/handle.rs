use core::cmp::Ordering;
use core::fmt;
use std::hash::{Hash, Hasher};

use super::{DocId, NodeId, NodeKind};

/// Value identity of a stored node. Identity, ordering and hashing use the
/// document and the structural position only; the kind is a cached tag.
#[derive(Clone)]
pub struct NodeHandle {
    pub doc: DocId,
    pub id: NodeId,
    pub kind: NodeKind,
}

impl NodeHandle {
    pub fn new(doc: DocId, id: NodeId, kind: NodeKind) -> Self {
        Self { doc, id, kind }
    }

    pub fn document(doc: DocId) -> Self {
        Self { doc, id: NodeId::document(), kind: NodeKind::Document }
    }

    /// Handle of the parent. Only elements and documents own children, so the
    /// kind follows from the position.
    pub fn parent(&self) -> Option<NodeHandle> {
        let pid = self.id.parent_id()?;
        let kind = if pid.is_document() { NodeKind::Document } else { NodeKind::Element };
        Some(NodeHandle { doc: self.doc, id: pid, kind })
    }

    /// Ancestors from the parent upwards.
    pub fn ancestors(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.id.ancestors().map(move |id| {
            let kind = if id.is_document() { NodeKind::Document } else { NodeKind::Element };
            NodeHandle { doc: self.doc, id, kind }
        })
    }

    pub fn is_descendant_of(&self, other: &NodeHandle) -> bool {
        self.doc == other.doc && self.id.is_descendant_of(&other.id)
    }

    pub fn is_child_of(&self, other: &NodeHandle) -> bool {
        self.doc == other.doc && self.id.is_child_of(&other.id)
    }

    pub fn is_attribute(&self) -> bool {
        self.kind == NodeKind::Attribute
    }
}

impl PartialEq for NodeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.doc == other.doc && self.id == other.id
    }
}

impl Eq for NodeHandle {}

impl Hash for NodeHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.doc.hash(state);
        self.id.hash(state);
    }
}

impl PartialOrd for NodeHandle {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeHandle {
    fn cmp(&self, other: &Self) -> Ordering {
        self.doc.cmp(&other.doc).then_with(|| self.id.cmp(&other.id))
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}[{:?}]", self.doc.0, self.id, self.kind)
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.doc, self.id)
    }
}
