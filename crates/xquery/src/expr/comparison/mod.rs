//! General (`=`, `<`, ...) and value (`eq`, `lt`, ...) comparisons.
//!
//! Inside a predicate a general comparison with a node-typed left operand
//! acts as a node filter: it returns the left nodes that satisfy the
//! relation. When every document is fully covered by the value index, string
//! equality is answered from that index; otherwise nodes are compared one by
//! one.

use core::cmp::Ordering;
use core::fmt;
use std::collections::HashMap;

use tracing::debug;

use super::{Expr, Expression};
use crate::broker::Broker;
use crate::error::{Error, ErrorCode, Result};
use crate::eval::EvalContext;
use crate::fulltext::escape_glob;
use crate::model::{NodeCollection, NodeHandle, NodeKind};
use crate::types::{Dependencies, StaticType};
use crate::xdm::{AtomicValue, Item, Sequence};

mod coerce;

use coerce::{compare_atomic, compare_truncated, compare_value_atomic};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompOp {
    /// Relation that holds after exchanging the operands.
    #[must_use]
    pub fn flip(self) -> CompOp {
        match self {
            CompOp::Lt => CompOp::Gt,
            CompOp::Gt => CompOp::Lt,
            CompOp::Le => CompOp::Ge,
            CompOp::Ge => CompOp::Le,
            other => other,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompOp::Eq => "=",
            CompOp::Ne => "!=",
            CompOp::Lt => "<",
            CompOp::Le => "<=",
            CompOp::Gt => ">",
            CompOp::Ge => ">=",
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            CompOp::Eq => "eq",
            CompOp::Ne => "ne",
            CompOp::Lt => "lt",
            CompOp::Le => "le",
            CompOp::Gt => "gt",
            CompOp::Ge => "ge",
        }
    }

    /// Applies the relation to an ordering; unordered operands (NaN) only
    /// satisfy `!=`.
    pub fn holds(self, ord: Option<Ordering>) -> bool {
        match ord {
            None => self == CompOp::Ne,
            Some(o) => match self {
                CompOp::Eq => o.is_eq(),
                CompOp::Ne => o.is_ne(),
                CompOp::Lt => o.is_lt(),
                CompOp::Le => o.is_le(),
                CompOp::Gt => o.is_gt(),
                CompOp::Ge => o.is_ge(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonKind {
    /// Existential comparison over sequences of any length.
    General,
    /// Comparison of exactly one item per side.
    Value,
}

/// Wildcard truncation of a string equality: `Right` matches prefixes
/// (`abc*`), `Left` suffixes (`*abc`), `Both` substrings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Truncation {
    #[default]
    None,
    Left,
    Right,
    Both,
}

impl Truncation {
    fn mask(self, value: &str) -> String {
        let escaped = escape_glob(value);
        match self {
            Truncation::None => escaped,
            Truncation::Left => format!("*{escaped}"),
            Truncation::Right => format!("{escaped}*"),
            Truncation::Both => format!("*{escaped}*"),
        }
    }
}

/// Existential general comparison of two atomized sequences.
pub fn compare_general(left: &[AtomicValue], op: CompOp, right: &[AtomicValue], backwards: bool) -> Result<bool> {
    for l in left {
        for r in right {
            if compare_atomic(l, op, r, backwards)? {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Value comparison: `None` if either side is empty.
pub fn compare_value(left: &[AtomicValue], op: CompOp, right: &[AtomicValue]) -> Result<Option<bool>> {
    match (left, right) {
        ([], _) | (_, []) => Ok(None),
        ([l], [r]) => compare_value_atomic(l, op, r).map(Some),
        _ => Err(Error::cardinality(
            ErrorCode::XPTY0004,
            format!("value comparison '{}' requires single items, got {} and {}", op.keyword(), left.len(), right.len()),
        )),
    }
}

pub struct ComparisonExpr {
    kind: ComparisonKind,
    op: CompOp,
    truncation: Truncation,
    left: Expr,
    right: Expr,
    in_predicate: bool,
}

impl ComparisonExpr {
    /// Builds a comparison. A non-node left operand is exchanged with a
    /// node-typed right operand so the node side ends up on the left.
    pub fn new(kind: ComparisonKind, left: Expr, op: CompOp, right: Expr) -> Self {
        let (left, op, right) = if left.returns_type() != StaticType::Node && right.returns_type() == StaticType::Node {
            (right, op.flip(), left)
        } else {
            (left, op, right)
        };
        Self { kind, op, truncation: Truncation::None, left, right, in_predicate: false }
    }

    pub fn general(left: Expr, op: CompOp, right: Expr) -> Self {
        Self::new(ComparisonKind::General, left, op, right)
    }

    pub fn value(left: Expr, op: CompOp, right: Expr) -> Self {
        Self::new(ComparisonKind::Value, left, op, right)
    }

    /// Truncated string match `left = right*` (or `*right`, `*right*`).
    pub fn truncated(left: Expr, truncation: Truncation, right: Expr) -> Self {
        Self { kind: ComparisonKind::General, op: CompOp::Eq, truncation, left, right, in_predicate: false }
    }

    pub fn left(&self) -> &Expr {
        &self.left
    }

    pub fn right(&self) -> &Expr {
        &self.right
    }

    pub fn op(&self) -> CompOp {
        self.op
    }

    pub fn kind(&self) -> ComparisonKind {
        self.kind
    }

    /// True if the comparison filters the left node set instead of producing
    /// a boolean.
    pub fn is_node_filter(&self) -> bool {
        self.in_predicate
            && self.kind == ComparisonKind::General
            && self.left.returns_type() == StaticType::Node
            && !self.left.dependencies().depends_on_item()
            && (!self.right_per_context() || self.left.is_traceable())
    }

    /// True if the right operand navigates from the context, so it is
    /// evaluated once per context node rather than once per collection.
    fn right_per_context(&self) -> bool {
        self.right.dependencies().intersects(Dependencies::CONTEXT_ITEM | Dependencies::CONTEXT_SET)
    }

    fn compare_items(&self, ctx: &EvalContext<'_>, left: &AtomicValue, right: &AtomicValue) -> Result<bool> {
        if self.truncation == Truncation::None {
            compare_atomic(left, self.op, right, ctx.sctx.backwards_compatible())
        } else {
            compare_truncated(left, self.op, self.truncation, right)
        }
    }

    fn any_match(&self, ctx: &EvalContext<'_>, left: &AtomicValue, right: &[AtomicValue]) -> Result<bool> {
        for r in right {
            if self.compare_items(ctx, left, r)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn generic_compare(&self, ctx: &mut EvalContext<'_>, seq: Option<&Sequence>, item: Option<&Item>) -> Result<Sequence> {
        let left = self.left.eval(ctx, seq, item)?.atomize(ctx.broker)?;
        let right = self.right.eval(ctx, seq, item)?.atomize(ctx.broker)?;
        match self.kind {
            ComparisonKind::Value => Ok(compare_value(&left, self.op, &right)?.map_or_else(Sequence::empty, Sequence::boolean)),
            ComparisonKind::General => {
                for l in &left {
                    if self.any_match(ctx, l, &right)? {
                        return Ok(Sequence::boolean(true));
                    }
                }
                Ok(Sequence::boolean(false))
            }
        }
    }

    /// Value-index lookup; `None` if the index cannot answer this comparison.
    fn quick_compare(&self, broker: &dyn Broker, nodes: &NodeCollection, right: &Sequence) -> Result<Option<NodeCollection>> {
        if self.op != CompOp::Eq || right.is_empty() {
            return Ok(None);
        }
        if !nodes.iter().all(|n| matches!(n.kind, NodeKind::Element | NodeKind::Attribute)) {
            return Ok(None);
        }
        let mut keys = Vec::with_capacity(right.len());
        for it in right.iter() {
            match it {
                Item::Node(n) => keys.push(broker.string_value(&n)?),
                Item::Atomic(a) if a.is_string_like() => keys.push(a.string_value()),
                Item::Atomic(_) => return Ok(None),
            }
        }
        let docs = nodes.documents();
        for d in docs.iter() {
            if !broker.index_coverage(d)?.is_full() {
                debug!(doc = %d, "value index does not cover document, comparing node by node");
                return Ok(None);
            }
        }
        let mut hits = NodeCollection::new();
        for key in keys {
            let found = broker.find_by_value(&docs, &self.truncation.mask(&key))?;
            hits = hits.union(&found);
        }
        debug!(comparison = %self, candidates = nodes.len(), hits = hits.len(), "value index comparison");
        Ok(Some(nodes.intersection(&hits)))
    }

    fn node_set_compare(&self, ctx: &mut EvalContext<'_>, nodes: &NodeCollection, right: &[AtomicValue]) -> Result<NodeCollection> {
        let mut keep = Vec::new();
        for (i, n) in nodes.iter().enumerate() {
            let value = Item::Node(n.clone()).atomize(ctx.broker)?;
            if self.any_match(ctx, &value, right)? {
                keep.push(i);
            }
        }
        Ok(nodes.select_positions(&keep))
    }

    /// Node-set comparison with a right operand that depends on the context
    /// item: the right side is evaluated for each context node a left node
    /// was produced from.
    fn node_set_compare_per_context(&self, ctx: &mut EvalContext<'_>, seq: Option<&Sequence>, nodes: &NodeCollection) -> Result<NodeCollection> {
        let Some(id) = ctx.context_id() else {
            return Err(Error::from_code(
                ErrorCode::EXQD0001,
                format!("comparison {self}: no context to evaluate the right operand against"),
            ));
        };
        let mut right_values: HashMap<NodeHandle, Vec<AtomicValue>> = HashMap::new();
        let mut keep = Vec::new();
        for (i, n) in nodes.iter().enumerate() {
            let origins = nodes.contexts_of(n, id);
            if origins.is_empty() {
                return Err(Error::from_code(
                    ErrorCode::EXQD0001,
                    format!("comparison {self}: node {n} has no context"),
                ));
            }
            let value = Item::Node(n.clone()).atomize(ctx.broker)?;
            for origin in origins {
                if !right_values.contains_key(&origin) {
                    let item = Item::Node(origin.clone());
                    let r = self.right.eval(ctx, seq, Some(&item))?.atomize(ctx.broker)?;
                    right_values.insert(origin.clone(), r);
                }
                let matched = match right_values.get(&origin) {
                    Some(r) => self.any_match(ctx, &value, r)?,
                    None => false,
                };
                if matched {
                    keep.push(i);
                    break;
                }
            }
        }
        Ok(nodes.select_positions(&keep))
    }
}

impl Expression for ComparisonExpr {
    fn eval(&self, ctx: &mut EvalContext<'_>, context_seq: Option<&Sequence>, context_item: Option<&Item>) -> Result<Sequence> {
        if !self.is_node_filter() {
            return self.generic_compare(ctx, context_seq, context_item);
        }
        let left = self.left.eval(ctx, context_seq, context_item)?;
        let nodes = match left {
            Sequence::Nodes(c) => c,
            other if other.is_node_sequence() => other.into_nodes()?,
            _ => return Err(Error::type_error(format!("comparison {self}: left operand is not a node sequence"))),
        };
        if nodes.is_empty() {
            return Ok(Sequence::Nodes(nodes));
        }
        if self.right_per_context() {
            debug!(comparison = %self, "node-set comparison per context node");
            return Ok(Sequence::Nodes(self.node_set_compare_per_context(ctx, context_seq, &nodes)?));
        }
        let right = self.right.eval(ctx, context_seq, context_item)?;
        if let Some(found) = self.quick_compare(ctx.broker, &nodes, &right)? {
            return Ok(Sequence::Nodes(found));
        }
        debug!(comparison = %self, "node-set comparison");
        let right = right.atomize(ctx.broker)?;
        Ok(Sequence::Nodes(self.node_set_compare(ctx, &nodes, &right)?))
    }

    fn returns_type(&self) -> StaticType {
        if self.is_node_filter() { StaticType::Node } else { StaticType::Boolean }
    }

    fn dependencies(&self) -> Dependencies {
        if self.is_node_filter() {
            // The right operand is evaluated against recorded context nodes.
            let right = self.right.dependencies().without(Dependencies::CONTEXT_ITEM);
            self.left.dependencies() | right | Dependencies::CONTEXT_SET
        } else {
            self.left.dependencies() | self.right.dependencies()
        }
    }

    fn set_in_predicate(&mut self, on: bool) {
        self.in_predicate = on;
        self.left.set_in_predicate(on && self.left.returns_type() == StaticType::Node);
    }

    fn reset_state(&self, ctx: &mut EvalContext<'_>) {
        self.left.reset_state(ctx);
        self.right.reset_state(ctx);
    }
}

impl fmt::Display for ComparisonExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.kind {
            ComparisonKind::General => self.op.symbol(),
            ComparisonKind::Value => self.op.keyword(),
        };
        match self.truncation {
            Truncation::None => write!(f, "({} {op} {})", self.left, self.right),
            Truncation::Right => write!(f, "({} {op} {}*)", self.left, self.right),
            Truncation::Left => write!(f, "({} {op} *{})", self.left, self.right),
            Truncation::Both => write!(f, "({} {op} *{}*)", self.left, self.right),
        }
    }
}
