//! Axis steps.
//!
//! A step with a concrete name test is answered from the structural index
//! and joined against the context collection. Everything else walks the
//! tree through the broker, one context node at a time.

use core::fmt;

use tracing::{debug, trace};

use super::{Expression, ExprId, Predicate, context_nodes};
use crate::broker::Broker;
use crate::error::Result;
use crate::eval::EvalContext;
use crate::model::{CollectionBuilder, DocumentSet, NodeCollection, NodeHandle, NodeKind, QName, Recording, SiblingDirection};
use crate::types::{Axis, Dependencies, NodeTest, StaticType};
use crate::xdm::{Item, Sequence};

/// How a step annotates what it selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepRecording {
    Off,
    Inherit,
    /// Record the producing context node under the innermost context id.
    Record,
}

pub struct LocationStep {
    id: ExprId,
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Predicate>,
    recording: StepRecording,
}

impl LocationStep {
    pub fn new(axis: Axis, test: NodeTest) -> Self {
        Self { id: ExprId::fresh(), axis, test, predicates: Vec::new(), recording: StepRecording::Off }
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn test(&self) -> &NodeTest {
        &self.test
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub(crate) fn set_recording(&mut self, recording: StepRecording) {
        self.recording = recording;
    }

    fn recording(&self, ctx: &EvalContext<'_>) -> Recording {
        match self.recording {
            StepRecording::Off => Recording::Off,
            StepRecording::Inherit => Recording::Inherit,
            StepRecording::Record => ctx.context_id().map_or(Recording::Inherit, Recording::Record),
        }
    }

    /// Name and kind answerable from the structural index on this axis.
    fn indexable(&self) -> Option<(NodeKind, &QName)> {
        let (kind, name) = self.test.concrete_name(self.axis.principal_kind())?;
        // Attribute candidates on the *-or-self axes may only match as self.
        if kind == NodeKind::Attribute
            && matches!(self.axis, Axis::SelfAxis | Axis::DescendantOrSelf | Axis::AncestorOrSelf)
        {
            return None;
        }
        Some((kind, name))
    }

    fn select(&self, ctx: &mut EvalContext<'_>, context: &NodeCollection, rec: Recording) -> Result<NodeCollection> {
        if let Some((kind, name)) = self.indexable()
            && context.documents().is_subset(&ctx.docs)
        {
            if !admits(self.axis, kind) {
                return Ok(NodeCollection::new());
            }
            let candidates = self.indexed(ctx, kind, name)?;
            return Ok(self.join(context, &candidates, rec));
        }
        self.traverse(ctx.broker, context, rec)
    }

    fn indexed(&self, ctx: &mut EvalContext<'_>, kind: NodeKind, name: &QName) -> Result<NodeCollection> {
        let generation = ctx.generation();
        if let Some(hit) = ctx.cache.names(self.id, generation, &ctx.docs) {
            trace!(step = %self, "name index cache hit");
            return Ok(hit.clone());
        }
        let nodes = ctx.broker.find_by_name(&ctx.docs, kind, name)?;
        debug!(step = %self, candidates = nodes.len(), "name index lookup");
        ctx.cache.store_names(self.id, generation, ctx.docs.clone(), nodes.clone());
        Ok(nodes)
    }

    fn join(&self, context: &NodeCollection, candidates: &NodeCollection, rec: Recording) -> NodeCollection {
        match self.axis {
            Axis::Child | Axis::Attribute => context.select_children(candidates, rec),
            Axis::Descendant | Axis::DescendantAttribute => context.select_descendants(candidates, false, rec),
            Axis::DescendantOrSelf => context.select_descendants(candidates, true, rec),
            Axis::Parent => context.select_parents(candidates, rec),
            Axis::Ancestor => context.select_ancestors(candidates, false, rec),
            Axis::AncestorOrSelf => context.select_ancestors(candidates, true, rec),
            Axis::FollowingSibling => context.select_siblings(candidates, SiblingDirection::Following, rec),
            Axis::PrecedingSibling => context.select_siblings(candidates, SiblingDirection::Preceding, rec),
            Axis::Following => context.select_following(candidates, rec),
            Axis::Preceding => context.select_preceding(candidates, rec),
            Axis::SelfAxis => {
                let mut out = CollectionBuilder::new();
                for n in context {
                    if candidates.contains(n) {
                        rec.emit(&mut out, n.clone(), context, n);
                    }
                }
                out.finish()
            }
        }
    }

    fn traverse(&self, broker: &dyn Broker, context: &NodeCollection, rec: Recording) -> Result<NodeCollection> {
        let principal = self.axis.principal_kind();
        let mut out = CollectionBuilder::new();
        for n in context {
            for cand in axis_nodes(broker, self.axis, n)? {
                if self.test.matches(&cand, broker, principal)? {
                    rec.emit(&mut out, cand, context, n);
                }
            }
        }
        let res = out.finish();
        trace!(step = %self, context = context.len(), result = res.len(), "axis traversal");
        Ok(res)
    }

    fn apply_predicates(&self, ctx: &mut EvalContext<'_>, mut selected: Sequence) -> Result<Sequence> {
        for p in &self.predicates {
            if selected.is_empty() {
                break;
            }
            selected = p.apply(ctx, selected, self.axis.is_reverse())?;
        }
        Ok(selected)
    }
}

/// Whether the axis can reach nodes of `kind` at all.
fn admits(axis: Axis, kind: NodeKind) -> bool {
    match axis {
        Axis::Attribute | Axis::DescendantAttribute => kind == NodeKind::Attribute,
        Axis::SelfAxis | Axis::DescendantOrSelf | Axis::AncestorOrSelf => true,
        Axis::Parent | Axis::Ancestor => matches!(kind, NodeKind::Element | NodeKind::Document),
        _ => kind != NodeKind::Attribute,
    }
}

/// Nodes on `axis` from `node`, in no particular order.
fn axis_nodes(broker: &dyn Broker, axis: Axis, node: &NodeHandle) -> Result<Vec<NodeHandle>> {
    let mut out = Vec::new();
    match axis {
        Axis::Child => out = broker.children(node)?,
        Axis::Attribute => {
            if node.kind == NodeKind::Element {
                out = broker.attributes(node)?;
            }
        }
        Axis::Descendant => descendants(broker, node, &mut out)?,
        Axis::DescendantOrSelf => {
            out.push(node.clone());
            descendants(broker, node, &mut out)?;
        }
        Axis::DescendantAttribute => {
            let mut elements = vec![node.clone()];
            descendants(broker, node, &mut elements)?;
            for e in elements.iter().filter(|e| e.kind == NodeKind::Element) {
                out.extend(broker.attributes(e)?);
            }
        }
        Axis::SelfAxis => out.push(node.clone()),
        Axis::Parent => out.extend(node.parent()),
        Axis::Ancestor => out = node.ancestors().collect(),
        Axis::AncestorOrSelf => {
            out.push(node.clone());
            out.extend(node.ancestors());
        }
        Axis::FollowingSibling => {
            if !node.is_attribute() {
                siblings(broker, node, SiblingDirection::Following, &mut out)?;
            }
        }
        Axis::PrecedingSibling => {
            if !node.is_attribute() {
                siblings(broker, node, SiblingDirection::Preceding, &mut out)?;
            }
        }
        Axis::Following | Axis::Preceding => {
            let dir = if axis == Axis::Following { SiblingDirection::Following } else { SiblingDirection::Preceding };
            // Attributes continue from their owner element.
            let start = match node.parent() {
                Some(owner) if node.is_attribute() => {
                    if dir == SiblingDirection::Following {
                        descendants(broker, &owner, &mut out)?;
                    }
                    owner
                }
                _ => node.clone(),
            };
            let mut chain = vec![start.clone()];
            chain.extend(start.ancestors());
            for a in chain.iter().filter(|a| a.kind != NodeKind::Document) {
                let mut sibs = Vec::new();
                siblings(broker, a, dir, &mut sibs)?;
                for s in sibs {
                    out.push(s.clone());
                    descendants(broker, &s, &mut out)?;
                }
            }
        }
    }
    Ok(out)
}

fn descendants(broker: &dyn Broker, node: &NodeHandle, out: &mut Vec<NodeHandle>) -> Result<()> {
    for c in broker.children(node)? {
        out.push(c.clone());
        descendants(broker, &c, out)?;
    }
    Ok(())
}

fn siblings(broker: &dyn Broker, node: &NodeHandle, dir: SiblingDirection, out: &mut Vec<NodeHandle>) -> Result<()> {
    let mut cur = node.clone();
    loop {
        let next = match dir {
            SiblingDirection::Following => broker.next_sibling(&cur)?,
            SiblingDirection::Preceding => broker.previous_sibling(&cur)?,
        };
        match next {
            Some(n) => {
                out.push(n.clone());
                cur = n;
            }
            None => return Ok(()),
        }
    }
}

impl Expression for LocationStep {
    fn eval(&self, ctx: &mut EvalContext<'_>, context_seq: Option<&Sequence>, context_item: Option<&Item>) -> Result<Sequence> {
        let context = context_nodes(context_seq, context_item, self)?;
        if context.is_empty() {
            return Ok(Sequence::empty());
        }
        let rec = self.recording(ctx);
        if self.predicates.is_empty() {
            return Ok(Sequence::Nodes(self.select(ctx, &context, rec)?));
        }
        if !self.predicates.iter().any(Predicate::is_positional) {
            let selected = Sequence::Nodes(self.select(ctx, &context, rec)?);
            return self.apply_predicates(ctx, selected);
        }
        // Positions are counted per context node.
        let mut out = CollectionBuilder::new();
        for n in &context {
            let single = context.extract(n);
            let selected = Sequence::Nodes(self.select(ctx, &single, rec)?);
            let kept = self.apply_predicates(ctx, selected)?.into_nodes()?;
            out.extend_from(&kept);
        }
        Ok(Sequence::Nodes(out.finish()))
    }

    fn preselect(&self, broker: &dyn Broker, docs: &DocumentSet) -> Result<DocumentSet> {
        match self.test.concrete_name(self.axis.principal_kind()) {
            Some((kind, name)) if self.axis != Axis::SelfAxis => {
                let found = broker.documents_containing(docs, kind, name)?;
                Ok(found.intersection(docs))
            }
            _ => Ok(docs.clone()),
        }
    }

    fn returns_type(&self) -> StaticType {
        StaticType::Node
    }

    fn dependencies(&self) -> Dependencies {
        self.predicates.iter().fold(Dependencies::CONTEXT_SET, |d, p| {
            d | (p.dependencies() & Dependencies::LOCAL_VARS)
        })
    }

    fn set_in_predicate(&mut self, on: bool) {
        self.recording = if on { StepRecording::Record } else { StepRecording::Off };
    }

    fn reset_state(&self, ctx: &mut EvalContext<'_>) {
        ctx.cache.remove(self.id);
        for p in &self.predicates {
            p.reset_state(ctx);
        }
    }
}

impl fmt::Display for LocationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.axis.as_str(), self.test)?;
        for p in &self.predicates {
            write!(f, "{p}")?;
        }
        Ok(())
    }
}
