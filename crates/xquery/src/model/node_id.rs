use core::fmt;

use smallvec::SmallVec;

/// Structural position of a node inside its document (a dynamic level
/// number such as `1.3.2`).
///
/// The empty id denotes the document node; `1` is the document element.
/// Attributes take the first child numbers of their owner element, before any
/// element or text child. Comparing two ids lexicographically yields document
/// order, ancestors sort before their descendants.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(SmallVec<[u32; 8]>);

impl NodeId {
    pub fn document() -> Self {
        Self(SmallVec::new())
    }

    pub fn from_slice(components: &[u32]) -> Self {
        Self(SmallVec::from_slice(components))
    }

    pub fn components(&self) -> &[u32] {
        &self.0
    }

    pub fn is_document(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of levels below the document node.
    pub fn level(&self) -> usize {
        self.0.len()
    }

    /// Id of the `n`th child (1-based).
    pub fn child(&self, n: u32) -> NodeId {
        let mut c = self.0.clone();
        c.push(n);
        NodeId(c)
    }

    /// Decodes one level. The document node has no parent.
    pub fn parent_id(&self) -> Option<NodeId> {
        if self.0.is_empty() {
            return None;
        }
        Some(NodeId(SmallVec::from_slice(&self.0[..self.0.len() - 1])))
    }

    /// Iterates the ancestors from the parent up to the document node.
    pub fn ancestors(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.0.len()).rev().map(|len| NodeId(SmallVec::from_slice(&self.0[..len])))
    }

    pub fn is_descendant_of(&self, other: &NodeId) -> bool {
        self.0.len() > other.0.len() && self.0.starts_with(&other.0)
    }

    pub fn is_descendant_or_self_of(&self, other: &NodeId) -> bool {
        self.0.starts_with(&other.0)
    }

    pub fn is_child_of(&self, other: &NodeId) -> bool {
        self.0.len() == other.0.len() + 1 && self.0.starts_with(&other.0)
    }

    pub fn is_sibling_of(&self, other: &NodeId) -> bool {
        self != other
            && self.0.len() == other.0.len()
            && !self.0.is_empty()
            && self.0[..self.0.len() - 1] == other.0[..other.0.len() - 1]
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for (i, c) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({self})")
    }
}
