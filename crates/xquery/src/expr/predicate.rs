//! Predicates `[...]`.
//!
//! The evaluation mode is fixed when the predicate is built:
//!
//! * node mode: the inner expression yields nodes whose context chains lead
//!   back to the filtered collection, so the whole collection is filtered in
//!   one evaluation;
//! * positional mode: a number independent of the context item selects one
//!   position;
//! * boolean mode: the inner expression runs once per item with the focus
//!   set.

use core::fmt;

use tracing::trace;

use super::{Expr, ExprId, Expression};
use crate::error::{Error, ErrorCode, Result};
use crate::eval::{EvalContext, Focus};
use crate::model::{CollectionBuilder, NodeCollection};
use crate::types::{Dependencies, StaticType};
use crate::xdm::{Item, Sequence};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Node,
    Positional,
    Boolean,
}

pub struct Predicate {
    id: ExprId,
    inner: Expr,
    mode: Mode,
}

impl Predicate {
    pub fn new(mut inner: Expr) -> Self {
        inner.set_in_predicate(true);
        let focus_deps = Dependencies::CONTEXT_ITEM | Dependencies::CONTEXT_POSITION;
        let uses_focus = inner.dependencies().intersects(focus_deps);
        let mode = match inner.returns_type() {
            StaticType::Node if !uses_focus && inner.is_traceable() => Mode::Node,
            StaticType::Number if !uses_focus => Mode::Positional,
            _ => Mode::Boolean,
        };
        if mode != Mode::Node {
            inner.set_in_predicate(false);
        }
        trace!(predicate = %inner, ?mode, "predicate mode");
        Self { id: ExprId::fresh(), inner, mode }
    }

    pub fn inner(&self) -> &Expr {
        &self.inner
    }

    /// True if the result depends on item positions, so the predicate must
    /// see the nodes of one context node at a time.
    pub fn is_positional(&self) -> bool {
        self.mode == Mode::Positional
            || self.inner.dependencies().intersects(Dependencies::CONTEXT_POSITION | Dependencies::CONTEXT_SIZE)
    }

    pub fn dependencies(&self) -> Dependencies {
        self.inner.dependencies()
    }

    pub fn reset_state(&self, ctx: &mut EvalContext<'_>) {
        self.inner.reset_state(ctx);
    }

    /// Filters `context`. Positions count from the end when `reverse` is set.
    pub fn apply(&self, ctx: &mut EvalContext<'_>, context: Sequence, reverse: bool) -> Result<Sequence> {
        if context.is_empty() {
            return Ok(context);
        }
        match (self.mode, &context) {
            (Mode::Node, Sequence::Nodes(nodes)) => self.select_by_nodes(ctx, nodes),
            (Mode::Positional, _) => self.select_by_position(ctx, &context, reverse),
            _ => self.select_by_boolean(ctx, &context, reverse),
        }
    }

    fn select_by_nodes(&self, ctx: &mut EvalContext<'_>, context: &NodeCollection) -> Result<Sequence> {
        let id = self.id.as_context();
        let seq = Sequence::Nodes(context.clone());
        let result = ctx.with_context_id(id, |ctx| self.inner.eval(ctx, Some(&seq), None))?;
        let found = result.into_nodes()?;
        let mut out = CollectionBuilder::new();
        for n in &found {
            let origins = found.contexts_of(n, id);
            if origins.is_empty() {
                return Err(Error::from_code(
                    ErrorCode::EXQD0001,
                    format!("predicate [{}]: node {n} lost its context", self.inner),
                ));
            }
            for origin in origins {
                let Some(orig) = context.find(&origin) else { continue };
                match context.annotation(orig) {
                    Some(a) => out.push_annotated(orig.clone(), a),
                    None => out.push(orig.clone()),
                }
                if let Some(a) = found.annotation(n)
                    && !a.matches.is_empty()
                {
                    out.note_mut(orig).merge_matches(a);
                }
            }
        }
        let res = out.finish();
        trace!(predicate = %self, context = context.len(), result = res.len(), "node-mode predicate");
        Ok(Sequence::Nodes(res))
    }

    fn select_by_position(&self, ctx: &mut EvalContext<'_>, context: &Sequence, reverse: bool) -> Result<Sequence> {
        let size = context.len();
        let focus = Focus { position: 1, size };
        let value = ctx.with_focus(focus, |ctx| self.inner.eval(ctx, Some(context), None))?;
        let values = value.atomize(ctx.broker)?;
        let v = match values.as_slice() {
            [] => return Ok(Sequence::empty()),
            [v] => v,
            _ => {
                return Err(Error::from_code(
                    ErrorCode::FORG0006,
                    format!("predicate [{}] yields more than one number", self.inner),
                ));
            }
        };
        if !v.is_numeric() {
            return Ok(if v.ebv()? { context.clone() } else { Sequence::empty() });
        }
        let p = v.to_double();
        if p.fract() != 0.0 || p < 1.0 || p > size as f64 {
            return Ok(Sequence::empty());
        }
        let mut index = p as usize - 1;
        if reverse {
            index = size - 1 - index;
        }
        Ok(pick(context, &[index]))
    }

    fn select_by_boolean(&self, ctx: &mut EvalContext<'_>, context: &Sequence, reverse: bool) -> Result<Sequence> {
        let id = self.id.as_context();
        let size = context.len();
        let mut keep = Vec::new();
        let mut matched = Vec::new();
        for (i, item) in context.iter().enumerate() {
            let position = if reverse { size - i } else { i + 1 };
            let focus = Focus { position, size };
            let r = ctx.with_context_id(id, |ctx| {
                ctx.with_focus(focus, |ctx| self.inner.eval(ctx, Some(context), Some(&item)))
            })?;
            let hit = match &r {
                Sequence::Items(v) => match v.as_slice() {
                    [Item::Atomic(a)] if a.is_numeric() => a.to_double() == position as f64,
                    _ => r.ebv()?,
                },
                Sequence::Nodes(n) => !n.is_empty(),
            };
            if hit {
                keep.push(i);
                if let (Item::Node(n), Sequence::Nodes(found)) = (&item, &r)
                    && found.has_matches()
                {
                    matched.push((n.clone(), found.clone()));
                }
            }
        }
        let mut out = pick(context, &keep);
        // Full-text matches found below a kept node stay visible on it.
        if let Sequence::Nodes(c) = &mut out {
            for (n, found) in &matched {
                for m in found {
                    if let Some(a) = found.annotation(m) {
                        for span in &a.matches {
                            c.add_match(n, span.clone());
                        }
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Items at the given positions; nodes keep their annotations.
fn pick(context: &Sequence, positions: &[usize]) -> Sequence {
    match context {
        Sequence::Nodes(c) => Sequence::Nodes(c.select_positions(positions)),
        Sequence::Items(v) => Sequence::Items(positions.iter().filter_map(|&i| v.get(i).cloned()).collect()),
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.inner)
    }
}
