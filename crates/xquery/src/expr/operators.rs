//! Logical, arithmetic, set and conditional operators.

use core::fmt;

use tracing::debug;

use super::{Expr, Expression};
use crate::broker::Broker;
use crate::error::{Error, ErrorCode, Result};
use crate::eval::EvalContext;
use crate::model::{Annotation, CollectionBuilder, ContextId, DocumentSet, NodeCollection};
use crate::types::{Dependencies, StaticType};
use crate::xdm::{AtomicValue, Item, Sequence, parse_double};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// `and` / `or`.
///
/// In a predicate with node-filtering operands both sides are evaluated
/// against the whole context collection and combined on the context nodes
/// they lead back to.
pub struct LogicalExpr {
    op: LogicalOp,
    left: Expr,
    right: Expr,
    in_predicate: bool,
}

impl LogicalExpr {
    pub fn new(op: LogicalOp, left: Expr, right: Expr) -> Self {
        Self { op, left, right, in_predicate: false }
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Self::new(LogicalOp::And, left, right)
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Self::new(LogicalOp::Or, left, right)
    }

    pub fn left(&self) -> &Expr {
        &self.left
    }

    pub fn right(&self) -> &Expr {
        &self.right
    }

    pub fn is_node_filter(&self) -> bool {
        self.in_predicate
            && self.left.returns_type() == StaticType::Node
            && self.right.returns_type() == StaticType::Node
            && !(self.left.dependencies() | self.right.dependencies()).depends_on_item()
    }

    /// Context nodes that produced `nodes`, each recorded as its own context.
    fn origins(&self, nodes: &NodeCollection, id: ContextId) -> Result<NodeCollection> {
        let mut out = CollectionBuilder::new();
        for n in nodes {
            let origins = nodes.contexts_of(n, id);
            if origins.is_empty() {
                return Err(Error::from_code(ErrorCode::EXQD0001, format!("{self}: node {n} has no context")));
            }
            for o in origins {
                let mut note = Annotation::with_context(id, o.clone());
                if let Some(a) = nodes.annotation(n) {
                    note.merge_matches(a);
                }
                out.push_annotated(o, &note);
            }
        }
        Ok(out.finish())
    }

    fn eval_nodes(&self, ctx: &mut EvalContext<'_>, id: ContextId, seq: Option<&Sequence>, item: Option<&Item>) -> Result<Sequence> {
        let left = self.left.eval(ctx, seq, item)?.into_nodes()?;
        let left = self.origins(&left, id)?;
        if self.op == LogicalOp::And && left.is_empty() {
            return Ok(Sequence::Nodes(left));
        }
        let right = self.right.eval(ctx, seq, item)?.into_nodes()?;
        let right = self.origins(&right, id)?;
        Ok(Sequence::Nodes(match self.op {
            LogicalOp::And => left.intersection(&right),
            LogicalOp::Or => left.union(&right),
        }))
    }
}

impl Expression for LogicalExpr {
    fn eval(&self, ctx: &mut EvalContext<'_>, context_seq: Option<&Sequence>, context_item: Option<&Item>) -> Result<Sequence> {
        if self.is_node_filter()
            && let Some(id) = ctx.context_id()
        {
            debug!(expr = %self, "logical node filter");
            return self.eval_nodes(ctx, id, context_seq, context_item);
        }
        let left = self.left.eval(ctx, context_seq, context_item)?.ebv()?;
        let result = match (self.op, left) {
            (LogicalOp::And, false) => false,
            (LogicalOp::Or, true) => true,
            _ => self.right.eval(ctx, context_seq, context_item)?.ebv()?,
        };
        Ok(Sequence::boolean(result))
    }

    fn returns_type(&self) -> StaticType {
        if self.is_node_filter() { StaticType::Node } else { StaticType::Boolean }
    }

    fn dependencies(&self) -> Dependencies {
        self.left.dependencies() | self.right.dependencies()
    }

    fn set_in_predicate(&mut self, on: bool) {
        self.left.set_in_predicate(on);
        self.right.set_in_predicate(on);
        let both_nodes = self.left.returns_type() == StaticType::Node && self.right.returns_type() == StaticType::Node;
        if on && !both_nodes {
            self.left.set_in_predicate(false);
            self.right.set_in_predicate(false);
        }
        self.in_predicate = on && both_nodes;
    }

    fn reset_state(&self, ctx: &mut EvalContext<'_>) {
        self.left.reset_state(ctx);
        self.right.reset_state(ctx);
    }
}

impl fmt::Display for LogicalExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
        };
        write!(f, "({} {op} {})", self.left, self.right)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
}

impl ArithOp {
    fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "div",
            ArithOp::IDiv => "idiv",
            ArithOp::Mod => "mod",
        }
    }
}

/// Numeric type lattice: integer < decimal < float < double.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum NumKind {
    Integer,
    Decimal,
    Float,
    Double,
}

fn classify(v: &AtomicValue) -> Option<NumKind> {
    match v {
        AtomicValue::Integer(_) => Some(NumKind::Integer),
        AtomicValue::Decimal(_) => Some(NumKind::Decimal),
        AtomicValue::Float(_) => Some(NumKind::Float),
        AtomicValue::Double(_) => Some(NumKind::Double),
        _ => None,
    }
}

/// Operand of an arithmetic operator: untyped values become doubles.
fn numeric_operand(v: AtomicValue, backwards: bool) -> Result<AtomicValue> {
    match v {
        v if v.is_numeric() && !backwards => Ok(v),
        v if backwards => Ok(AtomicValue::Double(v.to_double())),
        AtomicValue::UntypedAtomic(s) => parse_double(&s)
            .map(AtomicValue::Double)
            .ok_or_else(|| Error::from_code(ErrorCode::FORG0001, format!("cannot convert \"{s}\" to a number"))),
        other => Err(Error::type_error(format!("arithmetic on {} is not defined", other.type_name()))),
    }
}

fn overflow() -> Error {
    Error::from_code(ErrorCode::FOAR0002, "integer overflow")
}

fn div_by_zero() -> Error {
    Error::from_code(ErrorCode::FOAR0001, "division by zero")
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub(crate) fn arithmetic(op: ArithOp, a: &AtomicValue, b: &AtomicValue) -> Result<AtomicValue> {
    let (Some(ka), Some(kb)) = (classify(a), classify(b)) else {
        return Err(Error::type_error(format!("arithmetic on {} and {}", a.type_name(), b.type_name())));
    };
    if let (AtomicValue::Integer(x), AtomicValue::Integer(y)) = (a, b) {
        let (x, y) = (*x, *y);
        return Ok(match op {
            ArithOp::Add => AtomicValue::Integer(x.checked_add(y).ok_or_else(overflow)?),
            ArithOp::Sub => AtomicValue::Integer(x.checked_sub(y).ok_or_else(overflow)?),
            ArithOp::Mul => AtomicValue::Integer(x.checked_mul(y).ok_or_else(overflow)?),
            ArithOp::Div => {
                if y == 0 {
                    return Err(div_by_zero());
                }
                AtomicValue::Decimal(x as f64 / y as f64)
            }
            ArithOp::IDiv => AtomicValue::Integer(x.checked_div(y).ok_or_else(div_by_zero)?),
            ArithOp::Mod => AtomicValue::Integer(x.checked_rem(y).ok_or_else(div_by_zero)?),
        });
    }
    let kind = ka.max(kb);
    let (x, y) = (a.to_double(), b.to_double());
    if op == ArithOp::IDiv {
        if y == 0.0 {
            return Err(div_by_zero());
        }
        let q = (x / y).trunc();
        if !q.is_finite() {
            return Err(Error::from_code(ErrorCode::FOAR0002, "idiv result is not finite"));
        }
        return Ok(AtomicValue::Integer(q as i64));
    }
    if kind == NumKind::Decimal && y == 0.0 && matches!(op, ArithOp::Div | ArithOp::Mod) {
        return Err(div_by_zero());
    }
    let r = match op {
        ArithOp::Add => x + y,
        ArithOp::Sub => x - y,
        ArithOp::Mul => x * y,
        ArithOp::Div | ArithOp::IDiv => x / y,
        ArithOp::Mod => x % y,
    };
    Ok(match kind {
        NumKind::Integer | NumKind::Decimal => AtomicValue::Decimal(r),
        NumKind::Float => AtomicValue::Float(r as f32),
        NumKind::Double => AtomicValue::Double(r),
    })
}

/// Atomizes a single optional operand; more than one item is a type error.
fn single_operand(ctx: &mut EvalContext<'_>, e: &Expr, seq: Option<&Sequence>, item: Option<&Item>) -> Result<Option<AtomicValue>> {
    let mut values = e.eval(ctx, seq, item)?.atomize(ctx.broker)?;
    match values.len() {
        0 => Ok(None),
        1 => Ok(values.pop()),
        n => Err(Error::cardinality(ErrorCode::XPTY0004, format!("operand {e} yields {n} items, expected at most one"))),
    }
}

pub struct ArithmeticExpr {
    op: ArithOp,
    left: Expr,
    right: Expr,
}

impl ArithmeticExpr {
    pub fn new(left: Expr, op: ArithOp, right: Expr) -> Self {
        Self { op, left, right }
    }
}

impl Expression for ArithmeticExpr {
    fn eval(&self, ctx: &mut EvalContext<'_>, context_seq: Option<&Sequence>, context_item: Option<&Item>) -> Result<Sequence> {
        let backwards = ctx.sctx.backwards_compatible();
        let Some(a) = single_operand(ctx, &self.left, context_seq, context_item)? else {
            return Ok(Sequence::empty());
        };
        let Some(b) = single_operand(ctx, &self.right, context_seq, context_item)? else {
            return Ok(Sequence::empty());
        };
        let a = numeric_operand(a, backwards)?;
        let b = numeric_operand(b, backwards)?;
        Ok(Sequence::atomic(arithmetic(self.op, &a, &b)?))
    }

    fn returns_type(&self) -> StaticType {
        StaticType::Number
    }

    fn dependencies(&self) -> Dependencies {
        self.left.dependencies() | self.right.dependencies()
    }

    fn reset_state(&self, ctx: &mut EvalContext<'_>) {
        self.left.reset_state(ctx);
        self.right.reset_state(ctx);
    }
}

impl fmt::Display for ArithmeticExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.left, self.op.symbol(), self.right)
    }
}

/// Unary minus.
pub struct NegateExpr {
    operand: Expr,
}

impl NegateExpr {
    pub fn new(operand: Expr) -> Self {
        Self { operand }
    }
}

impl Expression for NegateExpr {
    fn eval(&self, ctx: &mut EvalContext<'_>, context_seq: Option<&Sequence>, context_item: Option<&Item>) -> Result<Sequence> {
        let backwards = ctx.sctx.backwards_compatible();
        let Some(v) = single_operand(ctx, &self.operand, context_seq, context_item)? else {
            return Ok(Sequence::empty());
        };
        Ok(Sequence::atomic(match numeric_operand(v, backwards)? {
            AtomicValue::Integer(i) => AtomicValue::Integer(i.checked_neg().ok_or_else(overflow)?),
            AtomicValue::Decimal(d) => AtomicValue::Decimal(-d),
            AtomicValue::Float(f) => AtomicValue::Float(-f),
            other => AtomicValue::Double(-other.to_double()),
        }))
    }

    fn returns_type(&self) -> StaticType {
        StaticType::Number
    }

    fn dependencies(&self) -> Dependencies {
        self.operand.dependencies()
    }

    fn reset_state(&self, ctx: &mut EvalContext<'_>) {
        self.operand.reset_state(ctx);
    }
}

impl fmt::Display for NegateExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "-{}", self.operand)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    Union,
    Intersect,
    Except,
}

/// `union` / `|`, `intersect`, `except` over node sequences.
pub struct SetExpr {
    op: SetOp,
    left: Expr,
    right: Expr,
}

impl SetExpr {
    pub fn new(left: Expr, op: SetOp, right: Expr) -> Self {
        Self { op, left, right }
    }

    pub fn left(&self) -> &Expr {
        &self.left
    }

    pub fn right(&self) -> &Expr {
        &self.right
    }

    fn operand(&self, ctx: &mut EvalContext<'_>, e: &Expr, seq: Option<&Sequence>, item: Option<&Item>) -> Result<NodeCollection> {
        let s = e.eval(ctx, seq, item)?;
        if !s.is_node_sequence() {
            return Err(Error::type_error(format!("operand of {} is not a node sequence", self.op_name())));
        }
        s.into_nodes()
    }

    fn op_name(&self) -> &'static str {
        match self.op {
            SetOp::Union => "union",
            SetOp::Intersect => "intersect",
            SetOp::Except => "except",
        }
    }
}

impl Expression for SetExpr {
    fn eval(&self, ctx: &mut EvalContext<'_>, context_seq: Option<&Sequence>, context_item: Option<&Item>) -> Result<Sequence> {
        let left = self.operand(ctx, &self.left, context_seq, context_item)?;
        if left.is_empty() && self.op != SetOp::Union {
            return Ok(Sequence::Nodes(left));
        }
        let right = self.operand(ctx, &self.right, context_seq, context_item)?;
        Ok(Sequence::Nodes(match self.op {
            SetOp::Union => left.union(&right),
            SetOp::Intersect => left.intersection(&right),
            SetOp::Except => left.difference(&right),
        }))
    }

    fn preselect(&self, broker: &dyn Broker, docs: &DocumentSet) -> Result<DocumentSet> {
        let left = self.left.preselect(broker, docs)?;
        Ok(match self.op {
            SetOp::Union => left.union(&self.right.preselect(broker, docs)?),
            SetOp::Intersect => left.intersection(&self.right.preselect(broker, docs)?),
            SetOp::Except => left,
        })
    }

    fn returns_type(&self) -> StaticType {
        StaticType::Node
    }

    fn dependencies(&self) -> Dependencies {
        self.left.dependencies() | self.right.dependencies()
    }

    fn set_in_predicate(&mut self, on: bool) {
        self.left.set_in_predicate(on);
        self.right.set_in_predicate(on);
    }

    fn reset_state(&self, ctx: &mut EvalContext<'_>) {
        self.left.reset_state(ctx);
        self.right.reset_state(ctx);
    }
}

impl fmt::Display for SetExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.left, self.op_name(), self.right)
    }
}

/// `if (c) then a else b`
pub struct IfExpr {
    condition: Expr,
    then_branch: Expr,
    else_branch: Expr,
}

impl IfExpr {
    pub fn new(condition: Expr, then_branch: Expr, else_branch: Expr) -> Self {
        Self { condition, then_branch, else_branch }
    }
}

impl Expression for IfExpr {
    fn eval(&self, ctx: &mut EvalContext<'_>, context_seq: Option<&Sequence>, context_item: Option<&Item>) -> Result<Sequence> {
        if self.condition.eval(ctx, context_seq, context_item)?.ebv()? {
            self.then_branch.eval(ctx, context_seq, context_item)
        } else {
            self.else_branch.eval(ctx, context_seq, context_item)
        }
    }

    fn returns_type(&self) -> StaticType {
        self.then_branch.returns_type().union(self.else_branch.returns_type())
    }

    fn dependencies(&self) -> Dependencies {
        self.condition.dependencies() | self.then_branch.dependencies() | self.else_branch.dependencies()
    }

    fn reset_state(&self, ctx: &mut EvalContext<'_>) {
        self.condition.reset_state(ctx);
        self.then_branch.reset_state(ctx);
        self.else_branch.reset_state(ctx);
    }
}

impl fmt::Display for IfExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "if ({}) then {} else {}", self.condition, self.then_branch, self.else_branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic() {
        let r = arithmetic(ArithOp::Add, &AtomicValue::Integer(2), &AtomicValue::Integer(3)).unwrap();
        assert_eq!(r, AtomicValue::Integer(5));
        let r = arithmetic(ArithOp::Div, &AtomicValue::Integer(7), &AtomicValue::Integer(2)).unwrap();
        assert_eq!(r, AtomicValue::Decimal(3.5));
        let r = arithmetic(ArithOp::IDiv, &AtomicValue::Integer(7), &AtomicValue::Integer(2)).unwrap();
        assert_eq!(r, AtomicValue::Integer(3));
    }

    #[test]
    fn division_by_zero() {
        let err = arithmetic(ArithOp::Div, &AtomicValue::Integer(1), &AtomicValue::Integer(0)).unwrap_err();
        assert_eq!(err.code, ErrorCode::FOAR0001);
        let inf = arithmetic(ArithOp::Div, &AtomicValue::Double(1.0), &AtomicValue::Integer(0)).unwrap();
        assert_eq!(inf, AtomicValue::Double(f64::INFINITY));
    }

    #[test]
    fn promotion_picks_widest_kind() {
        let r = arithmetic(ArithOp::Mul, &AtomicValue::Integer(2), &AtomicValue::Float(1.5)).unwrap();
        assert_eq!(r, AtomicValue::Float(3.0));
        let r = arithmetic(ArithOp::Sub, &AtomicValue::Decimal(2.5), &AtomicValue::Integer(1)).unwrap();
        assert_eq!(r, AtomicValue::Decimal(1.5));
    }

    #[test]
    fn overflow_is_reported() {
        let err = arithmetic(ArithOp::Add, &AtomicValue::Integer(i64::MAX), &AtomicValue::Integer(1)).unwrap_err();
        assert_eq!(err.code, ErrorCode::FOAR0002);
    }
}
