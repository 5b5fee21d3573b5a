//! Path expressions `a/b/c` and filter expressions `e[p]`.

use core::fmt;

use super::step::StepRecording;
use super::{Expr, Expression, Predicate, write_list};
use crate::broker::Broker;
use crate::error::{Error, Result};
use crate::eval::{EvalContext, Focus};
use crate::model::{CollectionBuilder, DocumentSet, QName};
use crate::types::{Dependencies, StaticType};
use crate::xdm::{Item, Sequence};

pub struct PathExpr {
    components: Vec<Expr>,
}

impl PathExpr {
    /// Builds a path from at least one component.
    pub fn new(components: Vec<Expr>) -> Self {
        debug_assert!(!components.is_empty());
        Self { components }
    }

    pub fn components(&self) -> &[Expr] {
        &self.components
    }

    /// True if the path starts navigating from the context it is given.
    pub fn is_relative(&self) -> bool {
        match self.components.as_slice() {
            [Expr::Step(_), ..] => true,
            [Expr::ContextItem(_), Expr::Step(_), ..] => true,
            _ => false,
        }
    }

    /// True if the path navigates from `$var` by steps.
    pub fn is_rooted_at(&self, var: &QName) -> bool {
        matches!(self.components.as_slice(), [Expr::VarRef(v), Expr::Step(_), ..] if v.name() == var)
    }

    fn eval_per_item(ctx: &mut EvalContext<'_>, comp: &Expr, input: &Sequence) -> Result<Sequence> {
        let size = input.len();
        let mut nodes = CollectionBuilder::new();
        let mut atomics = Vec::new();
        for (i, item) in input.iter().enumerate() {
            let focus = Focus { position: i + 1, size };
            match ctx.with_focus(focus, |ctx| comp.eval(ctx, Some(input), Some(&item)))? {
                Sequence::Nodes(c) => nodes.extend_from(&c),
                Sequence::Items(v) => {
                    for it in v {
                        match it {
                            Item::Node(n) => nodes.push(n),
                            a @ Item::Atomic(_) => atomics.push(a),
                        }
                    }
                }
            }
        }
        match (nodes.is_empty(), atomics.is_empty()) {
            (_, true) => Ok(Sequence::Nodes(nodes.finish())),
            (true, false) => Ok(Sequence::Items(atomics)),
            (false, false) => Err(Error::type_error(format!(
                "path step {comp} yields both nodes and atomic values"
            ))),
        }
    }
}

impl Expression for PathExpr {
    fn eval(&self, ctx: &mut EvalContext<'_>, context_seq: Option<&Sequence>, context_item: Option<&Item>) -> Result<Sequence> {
        let Some((first, rest)) = self.components.split_first() else {
            return Ok(Sequence::empty());
        };
        let mut current = first.eval(ctx, context_seq, context_item)?;
        for comp in rest {
            if current.is_empty() {
                break;
            }
            current = match comp {
                // Steps work on the whole node set at once.
                Expr::Step(_) => comp.eval(ctx, Some(&current), None)?,
                _ => Self::eval_per_item(ctx, comp, &current)?,
            };
        }
        Ok(current)
    }

    fn preselect(&self, broker: &dyn Broker, docs: &DocumentSet) -> Result<DocumentSet> {
        let mut docs = docs.clone();
        for c in &self.components {
            if docs.is_empty() {
                break;
            }
            docs = c.preselect(broker, &docs)?;
        }
        Ok(docs)
    }

    fn returns_type(&self) -> StaticType {
        self.components.last().map_or(StaticType::Empty, Expression::returns_type)
    }

    fn dependencies(&self) -> Dependencies {
        let mut it = self.components.iter();
        let first = it.next().map_or(Dependencies::NONE, Expression::dependencies);
        it.fold(first, |d, c| d | (c.dependencies() & Dependencies::LOCAL_VARS))
    }

    fn set_in_predicate(&mut self, on: bool) {
        let start = self
            .components
            .iter()
            .position(|c| !matches!(c, Expr::VarRef(_) | Expr::ContextItem(_)))
            .unwrap_or(self.components.len());
        let mut recording = if on { StepRecording::Record } else { StepRecording::Off };
        for c in &mut self.components[start..] {
            match c {
                Expr::Step(s) => {
                    s.set_recording(recording);
                    if on {
                        recording = StepRecording::Inherit;
                    }
                }
                _ => break,
            }
        }
    }

    fn reset_state(&self, ctx: &mut EvalContext<'_>) {
        for c in &self.components {
            c.reset_state(ctx);
        }
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_list(f, &self.components, "/")
    }
}

/// A primary expression followed by predicates.
pub struct FilterExpr {
    base: Expr,
    predicates: Vec<Predicate>,
}

impl FilterExpr {
    pub fn new(base: Expr, predicates: Vec<Predicate>) -> Self {
        Self { base, predicates }
    }

    pub fn base(&self) -> &Expr {
        &self.base
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }
}

impl Expression for FilterExpr {
    fn eval(&self, ctx: &mut EvalContext<'_>, context_seq: Option<&Sequence>, context_item: Option<&Item>) -> Result<Sequence> {
        let mut seq = self.base.eval(ctx, context_seq, context_item)?;
        for p in &self.predicates {
            if seq.is_empty() {
                break;
            }
            seq = p.apply(ctx, seq, false)?;
        }
        Ok(seq)
    }

    fn preselect(&self, broker: &dyn Broker, docs: &DocumentSet) -> Result<DocumentSet> {
        self.base.preselect(broker, docs)
    }

    fn returns_type(&self) -> StaticType {
        self.base.returns_type()
    }

    fn dependencies(&self) -> Dependencies {
        self.predicates
            .iter()
            .fold(self.base.dependencies(), |d, p| d | (p.dependencies() & Dependencies::LOCAL_VARS))
    }

    fn set_in_predicate(&mut self, on: bool) {
        self.base.set_in_predicate(on);
    }

    fn reset_state(&self, ctx: &mut EvalContext<'_>) {
        self.base.reset_state(ctx);
        for p in &self.predicates {
            p.reset_state(ctx);
        }
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.base)?;
        for p in &self.predicates {
            write!(f, "{p}")?;
        }
        Ok(())
    }
}
