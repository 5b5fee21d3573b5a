//! Expression tree and its evaluation protocol.
//!
//! Expressions are a closed set of variants; [`Expr`] forwards every protocol
//! operation to the variant with one `match`. Nodes are immutable during
//! evaluation: cached intermediate results live in the evaluation context,
//! keyed by [`ExprId`].

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::broker::Broker;
use crate::error::Result;
use crate::eval::EvalContext;
use crate::functions::{BuiltinCall, FunctionCall};
use crate::model::{ContextId, DocumentSet, QName};
use crate::types::{Dependencies, StaticType};
use crate::xdm::{Item, Sequence};

mod binding;
mod cast;
mod checks;
mod comparison;
mod constructors;
mod fulltext;
mod operators;
mod path;
mod predicate;
mod primary;
mod step;

pub use binding::{BindingClause, ForExpr, LetExpr, OrderSpec, QuantifiedExpr, Quantifier};
pub use cast::{CastExpr, InstanceOfExpr};
pub(crate) use cast::cast_atomic;
pub(crate) use operators::arithmetic;
pub use checks::{CardinalityCheck, TypeCheck};
pub use comparison::{CompOp, ComparisonExpr, ComparisonKind, Truncation, compare_general, compare_value};
pub use constructors::{ConstructorExpr, ConstructorKind};
pub use fulltext::{KeywordExpr, MatchMode, NearExpr};
pub use operators::{ArithOp, ArithmeticExpr, IfExpr, LogicalExpr, LogicalOp, NegateExpr, SetExpr, SetOp};
pub use path::{FilterExpr, PathExpr};
pub use predicate::Predicate;
pub use primary::{ContextItemExpr, Literal, RangeExpr, RootExpr, SequenceExpr, VarRef};
pub use step::LocationStep;

/// Identity of an expression node, unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(u64);

impl ExprId {
    pub fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ExprId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// The id under which context nodes introduced by this expression are
    /// recorded.
    pub fn as_context(self) -> ContextId {
        ContextId(self.0)
    }
}

/// Evaluation protocol shared by every expression kind.
pub trait Expression: fmt::Display {
    /// Evaluates against an optional context sequence and context item. The
    /// context item, when present, takes precedence for relative steps.
    fn eval(&self, ctx: &mut EvalContext<'_>, context_seq: Option<&Sequence>, context_item: Option<&Item>) -> Result<Sequence>;

    /// Narrows `docs` to those that can contribute to the result. Never adds
    /// documents.
    fn preselect(&self, _broker: &dyn Broker, docs: &DocumentSet) -> Result<DocumentSet> {
        Ok(docs.clone())
    }

    fn returns_type(&self) -> StaticType;

    fn dependencies(&self) -> Dependencies;

    /// Switches predicate behaviour: node results record the context nodes
    /// that produced them.
    fn set_in_predicate(&mut self, _on: bool) {}

    /// Drops cached intermediate results of this subtree.
    fn reset_state(&self, _ctx: &mut EvalContext<'_>) {}
}

pub enum Expr {
    Literal(Literal),
    VarRef(VarRef),
    ContextItem(ContextItemExpr),
    Root(RootExpr),
    Sequence(SequenceExpr),
    Range(Box<RangeExpr>),
    Step(LocationStep),
    Path(PathExpr),
    Filter(Box<FilterExpr>),
    Comparison(Box<ComparisonExpr>),
    Logical(Box<LogicalExpr>),
    Arithmetic(Box<ArithmeticExpr>),
    Negate(Box<NegateExpr>),
    Set(Box<SetExpr>),
    If(Box<IfExpr>),
    Cast(Box<CastExpr>),
    InstanceOf(Box<InstanceOfExpr>),
    For(Box<ForExpr>),
    Let(Box<LetExpr>),
    Quantified(Box<QuantifiedExpr>),
    Builtin(BuiltinCall),
    Call(FunctionCall),
    Keyword(Box<KeywordExpr>),
    Near(Box<NearExpr>),
    Constructor(Box<ConstructorExpr>),
    CardinalityCheck(Box<CardinalityCheck>),
    TypeCheck(Box<TypeCheck>),
}

macro_rules! dispatch {
    ($self:expr, $e:ident => $body:expr) => {
        match $self {
            Expr::Literal($e) => $body,
            Expr::VarRef($e) => $body,
            Expr::ContextItem($e) => $body,
            Expr::Root($e) => $body,
            Expr::Sequence($e) => $body,
            Expr::Range($e) => $body,
            Expr::Step($e) => $body,
            Expr::Path($e) => $body,
            Expr::Filter($e) => $body,
            Expr::Comparison($e) => $body,
            Expr::Logical($e) => $body,
            Expr::Arithmetic($e) => $body,
            Expr::Negate($e) => $body,
            Expr::Set($e) => $body,
            Expr::If($e) => $body,
            Expr::Cast($e) => $body,
            Expr::InstanceOf($e) => $body,
            Expr::For($e) => $body,
            Expr::Let($e) => $body,
            Expr::Quantified($e) => $body,
            Expr::Builtin($e) => $body,
            Expr::Call($e) => $body,
            Expr::Keyword($e) => $body,
            Expr::Near($e) => $body,
            Expr::Constructor($e) => $body,
            Expr::CardinalityCheck($e) => $body,
            Expr::TypeCheck($e) => $body,
        }
    };
}

impl Expression for Expr {
    fn eval(&self, ctx: &mut EvalContext<'_>, context_seq: Option<&Sequence>, context_item: Option<&Item>) -> Result<Sequence> {
        dispatch!(self, e => e.eval(ctx, context_seq, context_item))
    }

    fn preselect(&self, broker: &dyn Broker, docs: &DocumentSet) -> Result<DocumentSet> {
        dispatch!(self, e => e.preselect(broker, docs))
    }

    fn returns_type(&self) -> StaticType {
        dispatch!(self, e => e.returns_type())
    }

    fn dependencies(&self) -> Dependencies {
        dispatch!(self, e => e.dependencies())
    }

    fn set_in_predicate(&mut self, on: bool) {
        dispatch!(self, e => e.set_in_predicate(on));
    }

    fn reset_state(&self, ctx: &mut EvalContext<'_>) {
        dispatch!(self, e => e.reset_state(ctx));
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        dispatch!(self, e => fmt::Display::fmt(e, f))
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expr({self})")
    }
}

impl Expr {
    /// Diagnostic rendering of the compiled tree.
    pub fn pprint(&self) -> String {
        self.to_string()
    }

    /// True if node results of this expression carry context chains that
    /// lead back to the context collection it was evaluated against.
    pub fn is_traceable(&self) -> bool {
        match self {
            Expr::Step(_) => true,
            Expr::Path(p) => p.is_relative(),
            Expr::Filter(f) => f.base().is_traceable(),
            Expr::Comparison(c) => c.is_node_filter() && c.left().is_traceable(),
            Expr::Logical(l) => l.is_node_filter() && l.left().is_traceable() && l.right().is_traceable(),
            Expr::Set(s) => s.left().is_traceable() && s.right().is_traceable(),
            Expr::Keyword(k) => k.path().is_traceable(),
            Expr::Near(n) => n.path().is_traceable(),
            _ => false,
        }
    }

    /// True if node results carry context chains leading back to the items
    /// bound to `$var`.
    pub fn is_rooted_at(&self, var: &QName) -> bool {
        match self {
            Expr::Path(p) => p.is_rooted_at(var),
            Expr::Comparison(c) => c.is_node_filter() && c.left().is_rooted_at(var),
            Expr::Logical(l) => l.is_node_filter() && l.left().is_rooted_at(var) && l.right().is_rooted_at(var),
            Expr::Keyword(k) => k.path().is_rooted_at(var),
            Expr::Near(n) => n.path().is_rooted_at(var),
            _ => false,
        }
    }

    /// True if a node filter reads local variables only at the root of its
    /// paths, so it can run once over every value bound to that root.
    pub fn reads_locals_only_at_root(&self) -> bool {
        fn invariant(e: &Expr) -> bool {
            !e.dependencies().intersects(Dependencies::LOCAL_VARS)
        }
        match self {
            Expr::Path(p) => p.components().iter().skip(1).all(invariant),
            Expr::Comparison(c) => c.left().reads_locals_only_at_root() && invariant(c.right()),
            Expr::Logical(l) => l.left().reads_locals_only_at_root() && l.right().reads_locals_only_at_root(),
            Expr::Keyword(k) => k.path().reads_locals_only_at_root() && invariant(k.terms()),
            Expr::Near(n) => n.path().reads_locals_only_at_root() && invariant(n.terms()),
            _ => false,
        }
    }

    pub fn as_step(&self) -> Option<&LocationStep> {
        match self {
            Expr::Step(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Expr::Literal(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_var_ref(&self) -> Option<&VarRef> {
        match self {
            Expr::VarRef(v) => Some(v),
            _ => None,
        }
    }
}

/// Context nodes for relative navigation: the context item if given,
/// otherwise the context sequence.
pub(crate) fn context_nodes(context_seq: Option<&Sequence>, context_item: Option<&Item>, what: &dyn fmt::Display) -> Result<crate::model::NodeCollection> {
    use crate::error::{Error, ErrorCode};
    use crate::model::NodeCollection;

    match (context_item, context_seq) {
        (Some(Item::Node(n)), seq) => {
            // Keep the annotation the node has in the context sequence.
            if let Some(Sequence::Nodes(c)) = seq
                && let Some(found) = c.find(n)
            {
                let mut single = NodeCollection::singleton(found.clone());
                if let Some(a) = c.annotation(found) {
                    single.annotate(found, a);
                }
                return Ok(single);
            }
            Ok(NodeCollection::singleton(n.clone()))
        }
        (Some(Item::Atomic(a)), _) => Err(Error::from_code(
            ErrorCode::XPTY0019,
            format!("{what}: context item is an atomic value ({})", a.type_name()),
        )),
        (None, Some(seq)) => seq.to_nodes(),
        (None, None) => Err(Error::missing_context(format!("{what}: context item is undefined"))),
    }
}

/// Writes `items` separated by `sep`.
pub(crate) fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T], sep: &str) -> fmt::Result {
    for (i, it) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{it}")?;
    }
    Ok(())
}
