//! Structural joins between a context collection and candidate nodes.
//!
//! Candidates usually come from the name index and are already restricted to
//! the principal node kind of the axis. Every join returns a collection in
//! document order; how the produced handles are annotated depends on the
//! [`Recording`] mode.

use std::collections::HashMap;

use tracing::trace;

use super::{Annotation, CollectionBuilder, ContextId, DocId, NodeCollection, NodeHandle, NodeId};

/// How produced handles remember the context node that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recording {
    Off,
    /// Copy the context chain of the producing context node.
    Inherit,
    /// Copy the chain and add the producing context node under the id.
    Record(ContextId),
}

impl Recording {
    pub fn is_off(self) -> bool {
        matches!(self, Recording::Off)
    }

    /// Pushes `node`, produced by `ctx_node` of `context`, into `out`.
    pub fn emit(self, out: &mut CollectionBuilder, node: NodeHandle, context: &NodeCollection, ctx_node: &NodeHandle) {
        let inherited = || match context.annotation(ctx_node) {
            Some(a) if !a.context.is_empty() => Annotation { context: a.context.clone(), matches: Vec::new() },
            _ => Annotation::default(),
        };
        match self {
            Recording::Off => out.push(node),
            Recording::Inherit => {
                let note = inherited();
                out.push_annotated(node, &note);
            }
            Recording::Record(id) => {
                let mut note = inherited();
                note.add_context(id, ctx_node.clone());
                out.push_annotated(node, &note);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiblingDirection {
    Following,
    Preceding,
}

impl NodeCollection {
    /// Candidates whose parent is in this collection (child and attribute
    /// axes).
    pub fn select_children(&self, candidates: &NodeCollection, rec: Recording) -> NodeCollection {
        let mut out = CollectionBuilder::new();
        for c in candidates {
            if let Some(p) = c.parent()
                && let Some(ctx) = self.find(&p)
            {
                rec.emit(&mut out, c.clone(), self, ctx);
            }
        }
        let res = out.finish();
        trace!(context = self.len(), candidates = candidates.len(), result = res.len(), "child join");
        res
    }

    /// Candidates lying below (or, with `include_self`, equal to) a node of
    /// this collection. A candidate below several context nodes records all
    /// of them.
    pub fn select_descendants(&self, candidates: &NodeCollection, include_self: bool, rec: Recording) -> NodeCollection {
        let mut out = CollectionBuilder::new();
        for c in candidates {
            if include_self && let Some(ctx) = self.find(c) {
                rec.emit(&mut out, c.clone(), self, ctx);
                if rec.is_off() {
                    continue;
                }
            }
            for a in c.ancestors() {
                if let Some(ctx) = self.find(&a) {
                    rec.emit(&mut out, c.clone(), self, ctx);
                    if rec.is_off() {
                        break;
                    }
                }
            }
        }
        let res = out.finish();
        trace!(context = self.len(), candidates = candidates.len(), result = res.len(), "descendant join");
        res
    }

    /// Candidates that are the parent of a node of this collection.
    pub fn select_parents(&self, candidates: &NodeCollection, rec: Recording) -> NodeCollection {
        let mut out = CollectionBuilder::new();
        for n in self {
            if let Some(p) = n.parent()
                && let Some(found) = candidates.find(&p)
            {
                rec.emit(&mut out, found.clone(), self, n);
            }
        }
        out.finish()
    }

    /// Candidates that are an ancestor (or self) of a node of this collection.
    /// Ancestry is decoded from the node ids, without a storage lookup.
    pub fn select_ancestors(&self, candidates: &NodeCollection, include_self: bool, rec: Recording) -> NodeCollection {
        let mut out = CollectionBuilder::new();
        for n in self {
            if include_self && let Some(found) = candidates.find(n) {
                rec.emit(&mut out, found.clone(), self, n);
            }
            for a in n.ancestors() {
                if let Some(found) = candidates.find(&a) {
                    rec.emit(&mut out, found.clone(), self, n);
                }
            }
        }
        out.finish()
    }

    /// Candidates that are siblings of a node of this collection in the given
    /// direction. Attributes have no siblings.
    pub fn select_siblings(&self, candidates: &NodeCollection, direction: SiblingDirection, rec: Recording) -> NodeCollection {
        let mut groups: HashMap<(DocId, NodeId), Vec<&NodeHandle>> = HashMap::new();
        for n in self.iter().filter(|n| !n.is_attribute()) {
            if let Some(pid) = n.id.parent_id() {
                groups.entry((n.doc, pid)).or_default().push(n);
            }
        }
        let mut out = CollectionBuilder::new();
        for c in candidates.iter().filter(|c| !c.is_attribute()) {
            let Some(pid) = c.id.parent_id() else { continue };
            let Some(group) = groups.get(&(c.doc, pid)) else { continue };
            for ctx in group {
                let hit = match direction {
                    SiblingDirection::Following => *ctx < c,
                    SiblingDirection::Preceding => *ctx > c,
                };
                if hit {
                    rec.emit(&mut out, c.clone(), self, ctx);
                    if rec.is_off() {
                        break;
                    }
                }
            }
        }
        out.finish()
    }

    /// Candidates after a context node in document order that are not its
    /// descendants.
    pub fn select_following(&self, candidates: &NodeCollection, rec: Recording) -> NodeCollection {
        let mut out = CollectionBuilder::new();
        for c in candidates.iter().filter(|c| !c.is_attribute()) {
            for ctx in self.in_document(c.doc) {
                if ctx < c && !c.is_descendant_of(ctx) {
                    rec.emit(&mut out, c.clone(), self, ctx);
                    if rec.is_off() {
                        break;
                    }
                }
            }
        }
        out.finish()
    }

    /// Candidates before a context node in document order that are not its
    /// ancestors.
    pub fn select_preceding(&self, candidates: &NodeCollection, rec: Recording) -> NodeCollection {
        let mut out = CollectionBuilder::new();
        for c in candidates.iter().filter(|c| !c.is_attribute()) {
            for ctx in self.in_document(c.doc) {
                if ctx > c && !ctx.is_descendant_of(c) {
                    rec.emit(&mut out, c.clone(), self, ctx);
                    if rec.is_off() {
                        break;
                    }
                }
            }
        }
        out.finish()
    }

    /// Nodes of this collection that contain (or are) a hit. Each hit goes to
    /// its nearest containing node only, whose matches absorb the hit's
    /// matches. The containers keep their own annotations.
    pub fn select_containing(&self, hits: &NodeCollection) -> NodeCollection {
        let mut out = CollectionBuilder::new();
        for hit in hits {
            let Some(container) = self.nearest_ancestor_or_self(hit) else { continue };
            if let Some(own) = self.annotation(container) {
                out.push_annotated(container.clone(), own);
            }
            let note = hits.annotation(hit).map(|a| Annotation { context: Default::default(), matches: a.matches.clone() });
            match note {
                Some(n) => out.push_annotated(container.clone(), &n),
                None => out.push(container.clone()),
            }
        }
        let res = out.finish();
        trace!(candidates = self.len(), hits = hits.len(), result = res.len(), "containment join");
        res
    }
}
