//! FLWOR bindings (`for`, `let`, `where`, `order by`) and quantified
//! expressions.
//!
//! Nested `for` / `let` expressions form one FLWOR. When the outermost
//! binding carries order specs, every combination of bindings is collected
//! as a tuple together with its order keys, the tuples are sorted stably and
//! only then is the innermost return clause evaluated per tuple.

use core::cmp::Ordering;
use core::fmt;

use tracing::debug;

use super::{Expr, ExprId, Expression};
use crate::error::{Error, ErrorCode, Result};
use crate::eval::EvalContext;
use crate::model::{CollectionBuilder, NodeCollection, NodeHandle, QName};
use crate::types::{Dependencies, SequenceType, StaticType};
use crate::xdm::{AtomicValue, Item, Sequence};

/// Variable, input and optional filter shared by `for`, `let` and
/// quantified expressions.
pub struct BindingClause {
    var: QName,
    input: Expr,
    declared_type: Option<SequenceType>,
    where_clause: Option<Expr>,
}

impl BindingClause {
    pub fn new(var: QName, input: Expr) -> Self {
        Self { var, input, declared_type: None, where_clause: None }
    }

    pub fn with_type(mut self, t: SequenceType) -> Self {
        self.declared_type = Some(t);
        self
    }

    pub fn var(&self) -> &QName {
        &self.var
    }

    fn check_type(&self, ctx: &EvalContext<'_>, value: &Sequence) -> Result<()> {
        if let Some(t) = &self.declared_type
            && !t.matches(value, ctx.broker)?
        {
            return Err(Error::type_error(format!("value bound to ${} does not match {t}", self.var)));
        }
        Ok(())
    }

    fn dependencies(&self) -> Dependencies {
        let mut d = self.input.dependencies();
        if let Some(w) = &self.where_clause {
            d = d | w.dependencies();
        }
        d
    }

    fn reset_state(&self, ctx: &mut EvalContext<'_>) {
        self.input.reset_state(ctx);
        if let Some(w) = &self.where_clause {
            w.reset_state(ctx);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Ascending,
    Descending,
}

pub struct OrderSpec {
    key: Expr,
    direction: Direction,
    empty_greatest: bool,
}

impl OrderSpec {
    pub fn ascending(key: Expr) -> Self {
        Self { key, direction: Direction::Ascending, empty_greatest: false }
    }

    pub fn descending(key: Expr) -> Self {
        Self { key, direction: Direction::Descending, empty_greatest: false }
    }

    /// `empty greatest`; the default is `empty least`.
    pub fn empty_greatest(mut self) -> Self {
        self.empty_greatest = true;
        self
    }

    fn key(&self, ctx: &mut EvalContext<'_>, seq: Option<&Sequence>, item: Option<&Item>) -> Result<Option<AtomicValue>> {
        let mut values = self.key.eval(ctx, seq, item)?.atomize(ctx.broker)?;
        match values.len() {
            0 | 1 => Ok(values.pop()),
            n => Err(Error::cardinality(ErrorCode::XPTY0004, format!("order key {} yields {n} items", self.key))),
        }
    }

    fn compare(&self, a: Option<&AtomicValue>, b: Option<&AtomicValue>) -> Result<Ordering> {
        let empty_first = if self.empty_greatest { Ordering::Greater } else { Ordering::Less };
        let ord = match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => empty_first,
            (Some(_), None) => empty_first.reverse(),
            (Some(x), Some(y)) => order_values(x, y)?,
        };
        Ok(match self.direction {
            Direction::Ascending => ord,
            Direction::Descending => ord.reverse(),
        })
    }
}

impl fmt::Display for OrderSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)?;
        if self.direction == Direction::Descending {
            f.write_str(" descending")?;
        }
        if self.empty_greatest {
            f.write_str(" empty greatest")?;
        }
        Ok(())
    }
}

/// Ordering of two order keys. Untyped keys sort as strings; NaN sorts
/// before every other number.
fn order_values(a: &AtomicValue, b: &AtomicValue) -> Result<Ordering> {
    use AtomicValue as V;
    let text = |v: &AtomicValue| match v {
        V::String(s) | V::UntypedAtomic(s) | V::AnyUri(s) => Some(s.clone()),
        _ => None,
    };
    if let (V::Integer(x), V::Integer(y)) = (a, b) {
        return Ok(x.cmp(y));
    }
    if a.is_numeric() && b.is_numeric() {
        let (x, y) = (a.to_double(), b.to_double());
        return Ok(match (x.is_nan(), y.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        });
    }
    if let (V::Boolean(x), V::Boolean(y)) = (a, b) {
        return Ok(x.cmp(y));
    }
    match (text(a), text(b)) {
        (Some(x), Some(y)) => Ok(x.cmp(&y)),
        _ => Err(Error::type_error(format!(
            "order keys of type {} and {} are not comparable",
            a.type_name(),
            b.type_name()
        ))),
    }
}

/// One combination of FLWOR bindings with its order keys.
struct Tuple {
    bindings: Vec<(QName, Sequence)>,
    keys: Vec<Option<AtomicValue>>,
}

/// Value bound for the item at `index` of `input`; nodes keep their
/// annotations.
fn item_value(input: &Sequence, index: usize, item: Item) -> Sequence {
    match input {
        Sequence::Nodes(c) => Sequence::Nodes(c.select_positions(&[index])),
        Sequence::Items(_) => Sequence::singleton(item),
    }
}

/// Concatenates per-iteration results in iteration order. Node results stay
/// one collection, annotations included, only while they already follow
/// document order without repeats.
fn concat(parts: Vec<Sequence>) -> Sequence {
    let mut last: Option<&NodeHandle> = None;
    let in_document_order = parts.iter().all(|p| match p {
        Sequence::Nodes(c) => c.iter().all(|n| {
            let follows = last.is_none_or(|l| l < n);
            last = Some(n);
            follows
        }),
        Sequence::Items(_) => false,
    });
    if in_document_order {
        let mut out = CollectionBuilder::new();
        for p in &parts {
            if let Sequence::Nodes(c) = p {
                out.extend_from(c);
            }
        }
        return Sequence::Nodes(out.finish());
    }
    Sequence::Items(parts.into_iter().flat_map(Sequence::into_items).collect())
}

/// The expression evaluated per tuple once the bindings below `ret` are
/// collected.
fn innermost_return(ret: &Expr) -> &Expr {
    match ret {
        Expr::For(f) if f.order.is_empty() => innermost_return(&f.ret),
        Expr::Let(l) if l.order.is_empty() => innermost_return(&l.ret),
        other => other,
    }
}

/// Collects tuples below a binding: descends into nested bindings, or
/// evaluates the order keys when `ret` is the innermost return clause.
fn collect_below(
    ctx: &mut EvalContext<'_>,
    ret: &Expr,
    seq: Option<&Sequence>,
    item: Option<&Item>,
    specs: &[OrderSpec],
    bound: &mut Vec<(QName, Sequence)>,
    out: &mut Vec<Tuple>,
) -> Result<()> {
    match ret {
        Expr::For(f) if f.order.is_empty() => f.collect(ctx, seq, item, specs, bound, out),
        Expr::Let(l) if l.order.is_empty() => l.collect(ctx, seq, item, specs, bound, out),
        _ => {
            let mut keys = Vec::with_capacity(specs.len());
            for s in specs {
                keys.push(s.key(ctx, seq, item)?);
            }
            out.push(Tuple { bindings: bound.clone(), keys });
            Ok(())
        }
    }
}

/// Sorts the tuples and evaluates `ret` once per tuple.
fn return_ordered(
    ctx: &mut EvalContext<'_>,
    ret: &Expr,
    seq: Option<&Sequence>,
    item: Option<&Item>,
    specs: &[OrderSpec],
    mut tuples: Vec<Tuple>,
) -> Result<Sequence> {
    let mut failure = None;
    tuples.sort_by(|a, b| {
        for (i, spec) in specs.iter().enumerate() {
            match spec.compare(a.keys[i].as_ref(), b.keys[i].as_ref()) {
                Ok(Ordering::Equal) => {}
                Ok(ord) => return ord,
                Err(e) => {
                    failure.get_or_insert(e);
                    return Ordering::Equal;
                }
            }
        }
        Ordering::Equal
    });
    if let Some(e) = failure {
        return Err(e);
    }
    debug!(tuples = tuples.len(), "ordered FLWOR tuples");
    let mut parts = Vec::with_capacity(tuples.len());
    for t in tuples {
        let mut g = ctx.enter_scope();
        for (name, value) in t.bindings {
            g.sctx.variables.declare(name, value);
        }
        parts.push(ret.eval(&mut g, seq, item)?);
    }
    Ok(concat(parts))
}

/// `for $v [at $p] in input [where w] [order by ...] return r`
pub struct ForExpr {
    id: ExprId,
    clause: BindingClause,
    position_var: Option<QName>,
    order: Vec<OrderSpec>,
    ret: Expr,
    where_fast: bool,
}

impl ForExpr {
    pub fn new(clause: BindingClause, ret: Expr) -> Self {
        Self { id: ExprId::fresh(), clause, position_var: None, order: Vec::new(), ret, where_fast: false }
    }

    pub fn with_position(mut self, var: QName) -> Self {
        self.position_var = Some(var);
        self.where_fast = false;
        if let Some(w) = &mut self.clause.where_clause {
            w.set_in_predicate(false);
        }
        self
    }

    /// Adds a `where` clause. A clause that filters the bound nodes
    /// structurally is evaluated once over the whole input.
    pub fn with_where(mut self, mut condition: Expr) -> Self {
        condition.set_in_predicate(true);
        let fast = self.position_var.is_none()
            && condition.returns_type() == StaticType::Node
            && condition.is_rooted_at(&self.clause.var)
            && condition.reads_locals_only_at_root()
            && !condition.dependencies().depends_on_item();
        if !fast {
            condition.set_in_predicate(false);
        }
        self.where_fast = fast;
        self.clause.where_clause = Some(condition);
        self
    }

    pub fn with_order(mut self, specs: Vec<OrderSpec>) -> Self {
        self.order = specs;
        self
    }

    /// True if the `where` clause filters the whole input in one evaluation.
    pub fn filters_whole_input(&self) -> bool {
        self.where_fast
    }

    /// Input filtered by the `where` clause in one evaluation, or `None` if
    /// the clause must be tested per binding.
    fn prefilter(&self, ctx: &mut EvalContext<'_>, input: &Sequence, seq: Option<&Sequence>, item: Option<&Item>) -> Result<Option<Sequence>> {
        let (true, Some(w), Sequence::Nodes(nodes)) = (self.where_fast, &self.clause.where_clause, input) else {
            return Ok(None);
        };
        let id = self.id.as_context();
        let found = {
            let mut g = ctx.enter_scope();
            g.sctx.variables.declare(self.clause.var.clone(), Sequence::Nodes(nodes.clone()));
            g.with_context_id(id, |ctx| w.eval(ctx, seq, item))?.into_nodes()?
        };
        let mut keep = NodeCollection::new();
        for n in &found {
            let origins = found.contexts_of(n, id);
            if origins.is_empty() {
                return Err(Error::from_code(
                    ErrorCode::EXQD0001,
                    format!("where clause {w}: node {n} lost its context"),
                ));
            }
            for o in origins {
                keep.insert(o);
            }
        }
        debug!(input = nodes.len(), kept = keep.len(), "where clause evaluated over the whole input");
        Ok(Some(Sequence::Nodes(nodes.filter(|n| keep.contains(n)))))
    }

    /// Binds the variables for one input item in the current scope and
    /// tests the per-binding `where` clause.
    fn bind(&self, ctx: &mut EvalContext<'_>, value: Sequence, position: usize, filtered: bool, seq: Option<&Sequence>, item: Option<&Item>) -> Result<bool> {
        self.clause.check_type(ctx, &value)?;
        ctx.sctx.variables.declare(self.clause.var.clone(), value);
        if let Some(p) = &self.position_var {
            ctx.sctx.variables.declare(p.clone(), Sequence::integer(i64::try_from(position).unwrap_or(i64::MAX)));
        }
        match &self.clause.where_clause {
            Some(w) if !filtered => w.eval(ctx, seq, item)?.ebv(),
            _ => Ok(true),
        }
    }

    fn input(&self, ctx: &mut EvalContext<'_>, seq: Option<&Sequence>, item: Option<&Item>) -> Result<(Sequence, bool)> {
        let input = self.clause.input.eval(ctx, seq, item)?;
        Ok(match self.prefilter(ctx, &input, seq, item)? {
            Some(filtered) => (filtered, true),
            None => (input, false),
        })
    }

    fn collect(
        &self,
        ctx: &mut EvalContext<'_>,
        seq: Option<&Sequence>,
        item: Option<&Item>,
        specs: &[OrderSpec],
        bound: &mut Vec<(QName, Sequence)>,
        out: &mut Vec<Tuple>,
    ) -> Result<()> {
        let (input, filtered) = self.input(ctx, seq, item)?;
        for (i, it) in input.iter().enumerate() {
            let value = item_value(&input, i, it);
            let mut g = ctx.enter_scope();
            if !self.bind(&mut g, value.clone(), i + 1, filtered, seq, item)? {
                continue;
            }
            let mark = bound.len();
            bound.push((self.clause.var.clone(), value));
            if let Some(p) = &self.position_var {
                bound.push((p.clone(), Sequence::integer(i64::try_from(i + 1).unwrap_or(i64::MAX))));
            }
            collect_below(&mut g, &self.ret, seq, item, specs, bound, out)?;
            bound.truncate(mark);
        }
        Ok(())
    }
}

impl Expression for ForExpr {
    fn eval(&self, ctx: &mut EvalContext<'_>, context_seq: Option<&Sequence>, context_item: Option<&Item>) -> Result<Sequence> {
        if !self.order.is_empty() {
            let mut tuples = Vec::new();
            self.collect(ctx, context_seq, context_item, &self.order, &mut Vec::new(), &mut tuples)?;
            return return_ordered(ctx, innermost_return(&self.ret), context_seq, context_item, &self.order, tuples);
        }
        let (input, filtered) = self.input(ctx, context_seq, context_item)?;
        let mut parts = Vec::with_capacity(input.len());
        for (i, it) in input.iter().enumerate() {
            let value = item_value(&input, i, it);
            let mut g = ctx.enter_scope();
            if self.bind(&mut g, value, i + 1, filtered, context_seq, context_item)? {
                parts.push(self.ret.eval(&mut g, context_seq, context_item)?);
            }
        }
        Ok(concat(parts))
    }

    fn returns_type(&self) -> StaticType {
        self.ret.returns_type()
    }

    fn dependencies(&self) -> Dependencies {
        self.order
            .iter()
            .fold(self.clause.dependencies() | self.ret.dependencies(), |d, o| d | o.key.dependencies())
    }

    fn reset_state(&self, ctx: &mut EvalContext<'_>) {
        self.clause.reset_state(ctx);
        self.ret.reset_state(ctx);
        for o in &self.order {
            o.key.reset_state(ctx);
        }
    }
}

fn write_flwor_tail(f: &mut fmt::Formatter<'_>, clause: &BindingClause, order: &[OrderSpec], ret: &Expr) -> fmt::Result {
    if let Some(w) = &clause.where_clause {
        write!(f, " where {w}")?;
    }
    if !order.is_empty() {
        f.write_str(" order by ")?;
        super::write_list(f, order, ", ")?;
    }
    write!(f, " return {ret}")
}

impl fmt::Display for ForExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "for ${}", self.clause.var)?;
        if let Some(p) = &self.position_var {
            write!(f, " at ${p}")?;
        }
        write!(f, " in {}", self.clause.input)?;
        write_flwor_tail(f, &self.clause, &self.order, &self.ret)
    }
}

/// `let $v := input [where w] [order by ...] return r`
pub struct LetExpr {
    clause: BindingClause,
    order: Vec<OrderSpec>,
    ret: Expr,
}

impl LetExpr {
    pub fn new(clause: BindingClause, ret: Expr) -> Self {
        Self { clause, order: Vec::new(), ret }
    }

    pub fn with_where(mut self, condition: Expr) -> Self {
        self.clause.where_clause = Some(condition);
        self
    }

    pub fn with_order(mut self, specs: Vec<OrderSpec>) -> Self {
        self.order = specs;
        self
    }

    /// Binds the variable in the current scope; `false` if the `where`
    /// clause rejects the binding.
    fn bind(&self, ctx: &mut EvalContext<'_>, value: Sequence, seq: Option<&Sequence>, item: Option<&Item>) -> Result<bool> {
        self.clause.check_type(ctx, &value)?;
        match &self.clause.declared_type {
            Some(t) => ctx.sctx.variables.declare_typed(self.clause.var.clone(), value, t.clone()),
            None => ctx.sctx.variables.declare(self.clause.var.clone(), value),
        }
        match &self.clause.where_clause {
            Some(w) => w.eval(ctx, seq, item)?.ebv(),
            None => Ok(true),
        }
    }

    fn collect(
        &self,
        ctx: &mut EvalContext<'_>,
        seq: Option<&Sequence>,
        item: Option<&Item>,
        specs: &[OrderSpec],
        bound: &mut Vec<(QName, Sequence)>,
        out: &mut Vec<Tuple>,
    ) -> Result<()> {
        let value = self.clause.input.eval(ctx, seq, item)?;
        let mut g = ctx.enter_scope();
        if !self.bind(&mut g, value.clone(), seq, item)? {
            return Ok(());
        }
        bound.push((self.clause.var.clone(), value));
        let r = collect_below(&mut g, &self.ret, seq, item, specs, bound, out);
        bound.pop();
        r
    }
}

impl Expression for LetExpr {
    fn eval(&self, ctx: &mut EvalContext<'_>, context_seq: Option<&Sequence>, context_item: Option<&Item>) -> Result<Sequence> {
        if !self.order.is_empty() {
            let mut tuples = Vec::new();
            self.collect(ctx, context_seq, context_item, &self.order, &mut Vec::new(), &mut tuples)?;
            return return_ordered(ctx, innermost_return(&self.ret), context_seq, context_item, &self.order, tuples);
        }
        let value = self.clause.input.eval(ctx, context_seq, context_item)?;
        let mut g = ctx.enter_scope();
        if !self.bind(&mut g, value, context_seq, context_item)? {
            return Ok(Sequence::empty());
        }
        self.ret.eval(&mut g, context_seq, context_item)
    }

    fn returns_type(&self) -> StaticType {
        self.ret.returns_type()
    }

    fn dependencies(&self) -> Dependencies {
        self.order
            .iter()
            .fold(self.clause.dependencies() | self.ret.dependencies(), |d, o| d | o.key.dependencies())
    }

    fn reset_state(&self, ctx: &mut EvalContext<'_>) {
        self.clause.reset_state(ctx);
        self.ret.reset_state(ctx);
        for o in &self.order {
            o.key.reset_state(ctx);
        }
    }
}

impl fmt::Display for LetExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "let ${} := {}", self.clause.var, self.clause.input)?;
        write_flwor_tail(f, &self.clause, &self.order, &self.ret)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Some,
    Every,
}

/// `some|every $v in input satisfies test`
pub struct QuantifiedExpr {
    quantifier: Quantifier,
    clause: BindingClause,
    test: Expr,
}

impl QuantifiedExpr {
    pub fn new(quantifier: Quantifier, clause: BindingClause, test: Expr) -> Self {
        Self { quantifier, clause, test }
    }
}

impl Expression for QuantifiedExpr {
    fn eval(&self, ctx: &mut EvalContext<'_>, context_seq: Option<&Sequence>, context_item: Option<&Item>) -> Result<Sequence> {
        let input = self.clause.input.eval(ctx, context_seq, context_item)?;
        let wanted = self.quantifier == Quantifier::Some;
        for (i, it) in input.iter().enumerate() {
            let value = item_value(&input, i, it);
            self.clause.check_type(ctx, &value)?;
            let mut g = ctx.enter_scope();
            g.sctx.variables.declare(self.clause.var.clone(), value);
            if self.test.eval(&mut g, context_seq, context_item)?.ebv()? == wanted {
                return Ok(Sequence::boolean(wanted));
            }
        }
        Ok(Sequence::boolean(!wanted))
    }

    fn returns_type(&self) -> StaticType {
        StaticType::Boolean
    }

    fn dependencies(&self) -> Dependencies {
        self.clause.dependencies() | self.test.dependencies()
    }

    fn reset_state(&self, ctx: &mut EvalContext<'_>) {
        self.clause.reset_state(ctx);
        self.test.reset_state(ctx);
    }
}

impl fmt::Display for QuantifiedExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let q = match self.quantifier {
            Quantifier::Some => "some",
            Quantifier::Every => "every",
        };
        write!(f, "{q} ${} in {} satisfies {}", self.clause.var, self.clause.input, self.test)
    }
}
