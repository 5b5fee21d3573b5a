//! Dynamic checks wrapped around expressions whose result has a declared
//! type, such as function bodies and typed variable bindings.

use core::fmt;

use super::{Expr, Expression};
use crate::broker::Broker;
use crate::error::{Error, ErrorCode, Result};
use crate::eval::EvalContext;
use crate::model::DocumentSet;
use crate::types::{Dependencies, ItemType, Occurrence, StaticType};
use crate::xdm::{Item, Sequence};

/// Fails with a cardinality error unless the result size fits `occurrence`.
pub struct CardinalityCheck {
    inner: Expr,
    occurrence: Occurrence,
    what: String,
}

impl CardinalityCheck {
    pub fn new(inner: Expr, occurrence: Occurrence, what: impl Into<String>) -> Self {
        Self { inner, occurrence, what: what.into() }
    }
}

impl Expression for CardinalityCheck {
    fn eval(&self, ctx: &mut EvalContext<'_>, context_seq: Option<&Sequence>, context_item: Option<&Item>) -> Result<Sequence> {
        let seq = self.inner.eval(ctx, context_seq, context_item)?;
        if !self.occurrence.allows(seq.len()) {
            let expected = match self.occurrence {
                Occurrence::One => "exactly one item",
                Occurrence::ZeroOrOne => "at most one item",
                Occurrence::OneOrMore => "at least one item",
                Occurrence::ZeroOrMore => "any number of items",
            };
            return Err(Error::cardinality(
                ErrorCode::XPTY0004,
                format!("{}: expected {expected}, got {}", self.what, seq.len()),
            ));
        }
        Ok(seq)
    }

    fn preselect(&self, broker: &dyn Broker, docs: &DocumentSet) -> Result<DocumentSet> {
        self.inner.preselect(broker, docs)
    }

    fn returns_type(&self) -> StaticType {
        self.inner.returns_type()
    }

    fn dependencies(&self) -> Dependencies {
        self.inner.dependencies()
    }

    fn reset_state(&self, ctx: &mut EvalContext<'_>) {
        self.inner.reset_state(ctx);
    }
}

impl fmt::Display for CardinalityCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "check-cardinality({}, {})", self.inner, self.occurrence.suffix())
    }
}

/// Fails with a type error unless every item matches `item_type`.
pub struct TypeCheck {
    inner: Expr,
    item_type: ItemType,
    what: String,
}

impl TypeCheck {
    pub fn new(inner: Expr, item_type: ItemType, what: impl Into<String>) -> Self {
        Self { inner, item_type, what: what.into() }
    }
}

impl Expression for TypeCheck {
    fn eval(&self, ctx: &mut EvalContext<'_>, context_seq: Option<&Sequence>, context_item: Option<&Item>) -> Result<Sequence> {
        let seq = self.inner.eval(ctx, context_seq, context_item)?;
        for item in seq.iter() {
            if !self.item_type.matches(&item, ctx.broker)? {
                let found = match &item {
                    Item::Node(n) => n.kind.as_str().to_string(),
                    Item::Atomic(a) => a.type_name().to_string(),
                };
                return Err(Error::type_error(format!("{}: expected {}, got {found}", self.what, self.item_type)));
            }
        }
        Ok(seq)
    }

    fn preselect(&self, broker: &dyn Broker, docs: &DocumentSet) -> Result<DocumentSet> {
        self.inner.preselect(broker, docs)
    }

    fn returns_type(&self) -> StaticType {
        self.item_type.static_type()
    }

    fn dependencies(&self) -> Dependencies {
        self.inner.dependencies()
    }

    fn reset_state(&self, ctx: &mut EvalContext<'_>) {
        self.inner.reset_state(ctx);
    }
}

impl fmt::Display for TypeCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "check-type({}, {})", self.inner, self.item_type)
    }
}
