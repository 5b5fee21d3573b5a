//! Ordered, duplicate-free node collections with an annotation side table.

use std::collections::HashMap;

use itertools::{EitherOrBoth, Itertools};

use super::{Annotation, ContextId, DocId, DocumentSet, MatchSpan, NodeHandle};

/// Node handles in document order without duplicates.
///
/// Context chains and full-text matches are kept next to the handles, keyed
/// by handle, so that equal handles coming from different sources merge
/// their annotations instead of shadowing each other.
#[derive(Debug, Clone, Default)]
pub struct NodeCollection {
    nodes: Vec<NodeHandle>,
    notes: HashMap<NodeHandle, Annotation>,
}

impl NodeCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn singleton(node: NodeHandle) -> Self {
        Self { nodes: vec![node], notes: HashMap::new() }
    }

    /// Sorts and deduplicates arbitrary handles.
    pub fn from_unsorted(nodes: impl IntoIterator<Item = NodeHandle>) -> Self {
        let mut nodes: Vec<NodeHandle> = nodes.into_iter().collect();
        nodes.sort_unstable();
        nodes.dedup();
        Self { nodes, notes: HashMap::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NodeHandle> {
        self.nodes.iter()
    }

    pub fn as_slice(&self) -> &[NodeHandle] {
        &self.nodes
    }

    pub fn get(&self, index: usize) -> Option<&NodeHandle> {
        self.nodes.get(index)
    }

    pub fn first(&self) -> Option<&NodeHandle> {
        self.nodes.first()
    }

    pub fn last(&self) -> Option<&NodeHandle> {
        self.nodes.last()
    }

    pub fn position_of(&self, node: &NodeHandle) -> Option<usize> {
        self.nodes.binary_search(node).ok()
    }

    pub fn contains(&self, node: &NodeHandle) -> bool {
        self.position_of(node).is_some()
    }

    /// The stored handle equal to `node` (the stored kind may be more precise).
    pub fn find(&self, node: &NodeHandle) -> Option<&NodeHandle> {
        self.position_of(node).map(|i| &self.nodes[i])
    }

    /// Inserts keeping order; an existing equal handle keeps its annotation.
    pub fn insert(&mut self, node: NodeHandle) -> bool {
        match self.nodes.binary_search(&node) {
            Ok(_) => false,
            Err(pos) => {
                self.nodes.insert(pos, node);
                true
            }
        }
    }

    pub fn annotation(&self, node: &NodeHandle) -> Option<&Annotation> {
        self.notes.get(node)
    }

    /// Merges `note` into the annotation of `node`. Ignored for handles not in
    /// the collection.
    pub fn annotate(&mut self, node: &NodeHandle, note: &Annotation) {
        if note.is_empty() || !self.contains(node) {
            return;
        }
        self.notes.entry(node.clone()).or_default().merge(note);
    }

    pub fn add_context(&mut self, node: &NodeHandle, id: ContextId, ctx: NodeHandle) {
        if self.contains(node) {
            self.notes.entry(node.clone()).or_default().add_context(id, ctx);
        }
    }

    pub fn add_match(&mut self, node: &NodeHandle, span: MatchSpan) {
        if self.contains(node) {
            self.notes.entry(node.clone()).or_default().add_match(span);
        }
    }

    /// Context nodes recorded for `node` under `id`.
    pub fn contexts_of(&self, node: &NodeHandle, id: ContextId) -> Vec<NodeHandle> {
        self.notes
            .get(node)
            .map(|a| a.contexts_for(id).cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_matches(&self) -> bool {
        self.notes.values().any(|a| !a.matches.is_empty())
    }

    pub fn match_count(&self) -> usize {
        self.notes.values().map(|a| a.matches.len()).sum()
    }

    /// Drops every annotation, keeping the handles.
    pub fn clear_annotations(&mut self) {
        self.notes.clear();
    }

    pub fn documents(&self) -> DocumentSet {
        self.nodes.iter().map(|n| n.doc).dedup().collect()
    }

    /// Handles belonging to `doc`, a contiguous slice.
    pub fn in_document(&self, doc: DocId) -> &[NodeHandle] {
        let start = self.nodes.partition_point(|n| n.doc < doc);
        let end = self.nodes.partition_point(|n| n.doc <= doc);
        &self.nodes[start..end]
    }

    /// Keeps only handles of documents in `docs`.
    #[must_use]
    pub fn restrict_to(&self, docs: &DocumentSet) -> NodeCollection {
        self.filter(|n| docs.contains(n.doc))
    }

    /// Singleton of the stored handle equal to `node`, with its annotation.
    /// Empty if `node` is not in the collection.
    #[must_use]
    pub fn extract(&self, node: &NodeHandle) -> NodeCollection {
        let Some(found) = self.find(node) else { return NodeCollection::new() };
        let mut single = NodeCollection::singleton(found.clone());
        if let Some(a) = self.notes.get(found) {
            single.notes.insert(found.clone(), a.clone());
        }
        single
    }

    /// Handles at the given positions, with their annotations.
    #[must_use]
    pub fn select_positions(&self, positions: &[usize]) -> NodeCollection {
        let nodes: Vec<NodeHandle> = positions.iter().filter_map(|&i| self.nodes.get(i).cloned()).collect();
        let notes = self.carry_notes(&nodes);
        NodeCollection { nodes, notes }
    }

    /// Handles for which `keep` holds, with their annotations.
    #[must_use]
    pub fn filter(&self, mut keep: impl FnMut(&NodeHandle) -> bool) -> NodeCollection {
        let nodes: Vec<NodeHandle> = self.nodes.iter().filter(|n| keep(n)).cloned().collect();
        let notes = self.carry_notes(&nodes);
        NodeCollection { nodes, notes }
    }

    #[must_use]
    pub fn union(&self, other: &NodeCollection) -> NodeCollection {
        let nodes: Vec<NodeHandle> = self
            .nodes
            .iter()
            .merge_join_by(other.nodes.iter(), |a, b| a.cmp(b))
            .map(|e| match e {
                EitherOrBoth::Both(a, _) | EitherOrBoth::Left(a) | EitherOrBoth::Right(a) => a.clone(),
            })
            .collect();
        let mut notes = self.notes.clone();
        for (n, a) in &other.notes {
            notes.entry(n.clone()).or_default().merge(a);
        }
        NodeCollection { nodes, notes }
    }

    #[must_use]
    pub fn intersection(&self, other: &NodeCollection) -> NodeCollection {
        let nodes: Vec<NodeHandle> = self
            .nodes
            .iter()
            .merge_join_by(other.nodes.iter(), |a, b| a.cmp(b))
            .filter_map(|e| match e {
                EitherOrBoth::Both(a, _) => Some(a.clone()),
                _ => None,
            })
            .collect();
        let mut notes = self.carry_notes(&nodes);
        for n in &nodes {
            if let Some(a) = other.notes.get(n) {
                notes.entry(n.clone()).or_default().merge(a);
            }
        }
        NodeCollection { nodes, notes }
    }

    #[must_use]
    pub fn difference(&self, other: &NodeCollection) -> NodeCollection {
        let nodes: Vec<NodeHandle> = self
            .nodes
            .iter()
            .merge_join_by(other.nodes.iter(), |a, b| a.cmp(b))
            .filter_map(|e| match e {
                EitherOrBoth::Left(a) => Some(a.clone()),
                _ => None,
            })
            .collect();
        let notes = self.carry_notes(&nodes);
        NodeCollection { nodes, notes }
    }

    /// Merges `other` into `self` in place.
    pub fn add_all(&mut self, other: &NodeCollection) {
        if other.is_empty() {
            return;
        }
        *self = self.union(other);
    }

    /// Handles that lie strictly below `ancestor`; contiguous in document
    /// order.
    pub fn descendants_of(&self, ancestor: &NodeHandle) -> &[NodeHandle] {
        let start = self.nodes.partition_point(|n| n <= ancestor);
        let len = self.nodes[start..].iter().take_while(|n| n.is_descendant_of(ancestor)).count();
        &self.nodes[start..start + len]
    }

    /// True if some handle of this collection is a descendant of `ancestor`.
    pub fn has_descendant_of(&self, ancestor: &NodeHandle) -> bool {
        !self.descendants_of(ancestor).is_empty()
    }

    /// Nearest handle of this collection that is `node` itself or one of its
    /// ancestors.
    pub fn nearest_ancestor_or_self(&self, node: &NodeHandle) -> Option<&NodeHandle> {
        if let Some(found) = self.find(node) {
            return Some(found);
        }
        node.ancestors().find_map(|a| self.find(&a))
    }

    fn carry_notes(&self, nodes: &[NodeHandle]) -> HashMap<NodeHandle, Annotation> {
        if self.notes.is_empty() {
            return HashMap::new();
        }
        nodes
            .iter()
            .filter_map(|n| self.notes.get(n).map(|a| (n.clone(), a.clone())))
            .collect()
    }
}

impl PartialEq for NodeCollection {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
    }
}

impl<'a> IntoIterator for &'a NodeCollection {
    type Item = &'a NodeHandle;
    type IntoIter = std::slice::Iter<'a, NodeHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

impl FromIterator<NodeHandle> for NodeCollection {
    fn from_iter<T: IntoIterator<Item = NodeHandle>>(iter: T) -> Self {
        NodeCollection::from_unsorted(iter)
    }
}

/// Accumulates handles in any order together with their annotations.
#[derive(Debug, Default)]
pub struct CollectionBuilder {
    nodes: Vec<NodeHandle>,
    notes: HashMap<NodeHandle, Annotation>,
}

impl CollectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self { nodes: Vec::with_capacity(n), notes: HashMap::new() }
    }

    pub fn push(&mut self, node: NodeHandle) {
        self.nodes.push(node);
    }

    pub fn push_annotated(&mut self, node: NodeHandle, note: &Annotation) {
        if !note.is_empty() {
            self.notes.entry(node.clone()).or_default().merge(note);
        }
        self.nodes.push(node);
    }

    /// Adds every handle of `other` together with its annotation.
    pub fn extend_from(&mut self, other: &NodeCollection) {
        for n in other {
            match other.annotation(n) {
                Some(a) => self.push_annotated(n.clone(), a),
                None => self.push(n.clone()),
            }
        }
    }

    pub fn note_mut(&mut self, node: &NodeHandle) -> &mut Annotation {
        self.notes.entry(node.clone()).or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn finish(mut self) -> NodeCollection {
        self.nodes.sort_unstable();
        self.nodes.dedup();
        self.notes.retain(|_, a| !a.is_empty());
        NodeCollection { nodes: self.nodes, notes: self.notes }
    }
}
