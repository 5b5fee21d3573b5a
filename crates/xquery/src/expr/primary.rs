//! Literals, variable references, the context item, the document root,
//! sequence constructors and ranges.

use core::fmt;

use tracing::trace;

use super::{Expr, Expression, context_nodes, write_list};
use crate::broker::Broker;
use crate::error::{Error, ErrorCode, Result};
use crate::eval::EvalContext;
use crate::model::{DocumentSet, NodeCollection, NodeHandle, QName};
use crate::types::{Dependencies, StaticType};
use crate::xdm::{AtomicValue, Item, Sequence};

pub struct Literal {
    value: AtomicValue,
}

impl Literal {
    pub fn new(value: AtomicValue) -> Self {
        Self { value }
    }

    pub fn string(s: &str) -> Self {
        Self::new(AtomicValue::String(s.to_string()))
    }

    pub fn integer(i: i64) -> Self {
        Self::new(AtomicValue::Integer(i))
    }

    pub fn double(d: f64) -> Self {
        Self::new(AtomicValue::Double(d))
    }

    pub fn value(&self) -> &AtomicValue {
        &self.value
    }
}

impl Expression for Literal {
    fn eval(&self, _ctx: &mut EvalContext<'_>, _seq: Option<&Sequence>, _item: Option<&Item>) -> Result<Sequence> {
        Ok(Sequence::atomic(self.value.clone()))
    }

    fn returns_type(&self) -> StaticType {
        match &self.value {
            AtomicValue::Boolean(_) => StaticType::Boolean,
            AtomicValue::String(_) => StaticType::String,
            v if v.is_numeric() => StaticType::Number,
            _ => StaticType::Atomic,
        }
    }

    fn dependencies(&self) -> Dependencies {
        Dependencies::NONE
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// `$name`
pub struct VarRef {
    name: QName,
    static_type: StaticType,
}

impl VarRef {
    pub fn new(name: QName) -> Self {
        Self { name, static_type: StaticType::Item }
    }

    /// Variable whose bound value is known to be of `t`.
    pub fn typed(name: QName, t: StaticType) -> Self {
        Self { name, static_type: t }
    }

    pub fn name(&self) -> &QName {
        &self.name
    }
}

impl Expression for VarRef {
    fn eval(&self, ctx: &mut EvalContext<'_>, _seq: Option<&Sequence>, _item: Option<&Item>) -> Result<Sequence> {
        match ctx.sctx.variables.lookup(&self.name) {
            Some(v) => Ok(v.value.clone()),
            None => Err(Error::from_code(ErrorCode::XPST0008, format!("variable ${} is not declared", self.name))),
        }
    }

    fn returns_type(&self) -> StaticType {
        self.static_type
    }

    fn dependencies(&self) -> Dependencies {
        Dependencies::LOCAL_VARS
    }
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.name)
    }
}

/// `.`
#[derive(Default)]
pub struct ContextItemExpr;

impl ContextItemExpr {
    pub fn new() -> Self {
        ContextItemExpr
    }
}

impl Expression for ContextItemExpr {
    fn eval(&self, _ctx: &mut EvalContext<'_>, seq: Option<&Sequence>, item: Option<&Item>) -> Result<Sequence> {
        match (item, seq) {
            (Some(Item::Node(_)), _) => Ok(Sequence::Nodes(context_nodes(seq, item, self)?)),
            (Some(i), _) => Ok(Sequence::singleton(i.clone())),
            (None, Some(s)) => Ok(s.clone()),
            (None, None) => Err(Error::missing_context("context item is undefined")),
        }
    }

    fn returns_type(&self) -> StaticType {
        StaticType::Item
    }

    fn dependencies(&self) -> Dependencies {
        Dependencies::CONTEXT_ITEM | Dependencies::CONTEXT_SET
    }
}

impl fmt::Display for ContextItemExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(".")
    }
}

/// `/`: the document node of the context, or of every working document
/// when there is no context.
#[derive(Default)]
pub struct RootExpr;

impl RootExpr {
    pub fn new() -> Self {
        RootExpr
    }
}

impl Expression for RootExpr {
    fn eval(&self, ctx: &mut EvalContext<'_>, seq: Option<&Sequence>, item: Option<&Item>) -> Result<Sequence> {
        let roots: Vec<NodeHandle> = match (item, seq) {
            (Some(_), _) | (None, Some(_)) => {
                let nodes = context_nodes(seq, item, self)?;
                nodes.documents().iter().map(|d| ctx.broker.document_node(d)).collect::<Result<_>>()?
            }
            (None, None) => ctx.docs.iter().map(|d| ctx.broker.document_node(d)).collect::<Result<_>>()?,
        };
        trace!(documents = roots.len(), "root");
        Ok(Sequence::Nodes(NodeCollection::from_unsorted(roots)))
    }

    fn returns_type(&self) -> StaticType {
        StaticType::Node
    }

    fn dependencies(&self) -> Dependencies {
        Dependencies::CONTEXT_ITEM
    }
}

impl fmt::Display for RootExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("root()")
    }
}

/// `(a, b, ...)`: concatenation in operand order.
pub struct SequenceExpr {
    items: Vec<Expr>,
}

impl SequenceExpr {
    pub fn new(items: Vec<Expr>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[Expr] {
        &self.items
    }
}

impl Expression for SequenceExpr {
    fn eval(&self, ctx: &mut EvalContext<'_>, seq: Option<&Sequence>, item: Option<&Item>) -> Result<Sequence> {
        match self.items.as_slice() {
            [] => Ok(Sequence::empty()),
            [only] => only.eval(ctx, seq, item),
            items => {
                let mut out = Vec::new();
                for e in items {
                    out.extend(e.eval(ctx, seq, item)?.into_items());
                }
                Ok(Sequence::Items(out))
            }
        }
    }

    /// Union of what each operand keeps: a document is needed if any
    /// operand needs it.
    fn preselect(&self, broker: &dyn Broker, docs: &DocumentSet) -> Result<DocumentSet> {
        if self.items.is_empty() {
            return Ok(docs.clone());
        }
        let mut out = DocumentSet::new();
        for e in &self.items {
            out = out.union(&e.preselect(broker, docs)?);
        }
        Ok(out)
    }

    fn returns_type(&self) -> StaticType {
        self.items.iter().fold(StaticType::Empty, |t, e| t.union(e.returns_type()))
    }

    fn dependencies(&self) -> Dependencies {
        self.items.iter().fold(Dependencies::NONE, |d, e| d | e.dependencies())
    }

    fn reset_state(&self, ctx: &mut EvalContext<'_>) {
        for e in &self.items {
            e.reset_state(ctx);
        }
    }
}

impl fmt::Display for SequenceExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        write_list(f, &self.items, ", ")?;
        f.write_str(")")
    }
}

/// `a to b`
pub struct RangeExpr {
    from: Expr,
    to: Expr,
}

impl RangeExpr {
    pub fn new(from: Expr, to: Expr) -> Self {
        Self { from, to }
    }

    fn bound(ctx: &mut EvalContext<'_>, e: &Expr, seq: Option<&Sequence>, item: Option<&Item>) -> Result<Option<i64>> {
        let values = e.eval(ctx, seq, item)?.atomize(ctx.broker)?;
        match values.as_slice() {
            [] => Ok(None),
            [AtomicValue::Integer(i)] => Ok(Some(*i)),
            [v @ (AtomicValue::UntypedAtomic(_) | AtomicValue::Decimal(_) | AtomicValue::Double(_) | AtomicValue::Float(_))] => {
                crate::expr::cast::to_integer(v).map(Some)
            }
            [v] => Err(Error::type_error(format!("range bound must be an integer, found {}", v.type_name()))),
            _ => Err(Error::cardinality(ErrorCode::XPTY0004, "range bound must be a single integer")),
        }
    }
}

impl Expression for RangeExpr {
    fn eval(&self, ctx: &mut EvalContext<'_>, seq: Option<&Sequence>, item: Option<&Item>) -> Result<Sequence> {
        let (Some(from), Some(to)) = (Self::bound(ctx, &self.from, seq, item)?, Self::bound(ctx, &self.to, seq, item)?) else {
            return Ok(Sequence::empty());
        };
        Ok(Sequence::Items((from..=to).map(|i| Item::Atomic(AtomicValue::Integer(i))).collect()))
    }

    fn returns_type(&self) -> StaticType {
        StaticType::Number
    }

    fn dependencies(&self) -> Dependencies {
        self.from.dependencies() | self.to.dependencies()
    }

    fn reset_state(&self, ctx: &mut EvalContext<'_>) {
        self.from.reset_state(ctx);
        self.to.reset_state(ctx);
    }
}

impl fmt::Display for RangeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.from, self.to)
    }
}
