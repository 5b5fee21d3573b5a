use compact_str::CompactString;
use smallvec::SmallVec;

use super::NodeHandle;

/// Identifies the expression (predicate, binding) that introduced a context
/// entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u64);

/// One link of a context chain: `node` produced the annotated handle while
/// expression `id` was evaluating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextEntry {
    pub id: ContextId,
    pub node: NodeHandle,
}

/// A full-text hit inside a text node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSpan {
    pub node: NodeHandle,
    pub offset: usize,
    pub length: usize,
    pub term: CompactString,
}

/// Auxiliary data a collection keeps for one of its handles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotation {
    pub context: SmallVec<[ContextEntry; 2]>,
    pub matches: Vec<MatchSpan>,
}

impl Annotation {
    pub fn with_context(id: ContextId, node: NodeHandle) -> Self {
        let mut a = Annotation::default();
        a.add_context(id, node);
        a
    }

    pub fn is_empty(&self) -> bool {
        self.context.is_empty() && self.matches.is_empty()
    }

    pub fn add_context(&mut self, id: ContextId, node: NodeHandle) {
        if !self.context.iter().any(|e| e.id == id && e.node == node) {
            self.context.push(ContextEntry { id, node });
        }
    }

    pub fn add_match(&mut self, span: MatchSpan) {
        if !self.matches.contains(&span) {
            self.matches.push(span);
        }
    }

    /// Context nodes recorded under `id`.
    pub fn contexts_for(&self, id: ContextId) -> impl Iterator<Item = &NodeHandle> {
        self.context.iter().filter(move |e| e.id == id).map(|e| &e.node)
    }

    pub fn merge(&mut self, other: &Annotation) {
        for e in &other.context {
            self.add_context(e.id, e.node.clone());
        }
        self.merge_matches(other);
    }

    pub fn merge_matches(&mut self, other: &Annotation) {
        for m in &other.matches {
            self.add_match(m.clone());
        }
    }
}
