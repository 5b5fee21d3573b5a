//! Function calls.
//!
//! Built-in functions live in a static table keyed by expanded name and
//! looked up when the call is constructed. User functions are declared on
//! the static context, see [`user`].

use core::fmt;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::broker::Broker;
use crate::consts::{FNS, TEXT_NS};
use crate::error::{Error, ErrorCode, Result};
use crate::eval::{EvalContext, Focus};
use crate::expr::{Expr, Expression, write_list};
use crate::model::QName;
use crate::types::{Dependencies, ItemType, Occurrence, SequenceType, StaticType};
use crate::xdm::{AtomicValue, Item, Sequence};

mod boolean;
mod fulltext;
mod nodes;
mod numeric;
mod sequences;
mod strings;
mod user;

pub use user::{FunctionCall, UserFunction, UserFunctionRegistry};

/// What a built-in implementation sees of its caller.
pub(crate) struct CallCtx<'c, 'a> {
    pub(crate) eval: &'c mut EvalContext<'a>,
    pub(crate) context_seq: Option<&'c Sequence>,
    pub(crate) context_item: Option<&'c Item>,
}

impl CallCtx<'_, '_> {
    pub(crate) fn broker(&self) -> &dyn Broker {
        self.eval.broker
    }

    /// The context item; a singleton context sequence stands in for it.
    pub(crate) fn context_item(&self, func: &str) -> Result<Item> {
        if let Some(item) = self.context_item {
            return Ok(item.clone());
        }
        match self.context_seq {
            Some(seq) if seq.len() == 1 => seq.first().ok_or_else(|| missing_focus(func)),
            _ => Err(missing_focus(func)),
        }
    }

    pub(crate) fn focus(&self, func: &str) -> Result<Focus> {
        self.eval.focus().ok_or_else(|| missing_focus(func))
    }
}

fn missing_focus(func: &str) -> Error {
    Error::missing_context(format!("{func}: the context item is undefined"))
}

pub(crate) type BuiltinFn = fn(&mut CallCtx<'_, '_>, &[Sequence]) -> Result<Sequence>;

/// Static description of one built-in function.
pub struct BuiltinDef {
    pub name: QName,
    pub min_arity: usize,
    /// `None` for variadic functions.
    pub max_arity: Option<usize>,
    /// Declared parameter types; the last one repeats for variadic calls.
    params: Vec<SequenceType>,
    pub returns: StaticType,
    pub dependencies: Dependencies,
    func: BuiltinFn,
}

impl BuiltinDef {
    pub fn accepts(&self, arity: usize) -> bool {
        arity >= self.min_arity && self.max_arity.is_none_or(|m| arity <= m)
    }

    pub fn param_type(&self, index: usize) -> Option<&SequenceType> {
        self.params.get(index).or_else(|| if self.max_arity.is_none() { self.params.last() } else { None })
    }
}

impl fmt::Debug for BuiltinDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinDef")
            .field("name", &self.name.expanded())
            .field("min_arity", &self.min_arity)
            .field("max_arity", &self.max_arity)
            .finish_non_exhaustive()
    }
}

pub(crate) fn seq_type(item: ItemType, occ: Occurrence) -> SequenceType {
    SequenceType::new(item, occ)
}

pub(crate) fn any_items() -> SequenceType {
    SequenceType::any()
}

pub(crate) fn opt_string() -> SequenceType {
    seq_type(ItemType::String, Occurrence::ZeroOrOne)
}

pub(crate) fn atomics() -> SequenceType {
    seq_type(ItemType::AnyAtomic, Occurrence::ZeroOrMore)
}

pub(crate) fn opt_numeric() -> SequenceType {
    seq_type(ItemType::Numeric, Occurrence::ZeroOrOne)
}

pub(crate) fn opt_node() -> SequenceType {
    seq_type(ItemType::AnyNode, Occurrence::ZeroOrOne)
}

fn build_registry() -> HashMap<QName, Vec<BuiltinDef>> {
    let mut map: HashMap<QName, Vec<BuiltinDef>> = HashMap::new();
    macro_rules! reg {
        ($ns:expr, $local:expr, $min:expr, $max:expr, $func:expr, $ret:expr, $deps:expr, [$($p:expr),* $(,)?] $(,)?) => {{
            let name = QName::new(Some($ns), $local);
            map.entry(name.clone()).or_default().push(BuiltinDef {
                name,
                min_arity: $min,
                max_arity: $max,
                params: vec![$($p),*],
                returns: $ret,
                dependencies: $deps,
                func: $func,
            });
        }};
    }
    let none = Dependencies::NONE;
    let item = Dependencies::CONTEXT_ITEM;
    use StaticType as T;

    // ===== Booleans =====
    reg!(FNS, "true", 0, Some(0), boolean::fn_true, T::Boolean, none, []);
    reg!(FNS, "false", 0, Some(0), boolean::fn_false, T::Boolean, none, []);
    reg!(FNS, "not", 1, Some(1), boolean::fn_not, T::Boolean, none, [any_items()]);
    reg!(FNS, "boolean", 1, Some(1), boolean::fn_boolean, T::Boolean, none, [any_items()]);

    // ===== Sequences and focus =====
    reg!(FNS, "count", 1, Some(1), sequences::count_fn, T::Number, none, [any_items()]);
    reg!(FNS, "empty", 1, Some(1), sequences::empty_fn, T::Boolean, none, [any_items()]);
    reg!(FNS, "exists", 1, Some(1), sequences::exists_fn, T::Boolean, none, [any_items()]);
    reg!(FNS, "position", 0, Some(0), sequences::position_fn, T::Number, Dependencies::CONTEXT_POSITION, []);
    reg!(FNS, "last", 0, Some(0), sequences::last_fn, T::Number, Dependencies::CONTEXT_SIZE, []);
    reg!(FNS, "data", 0, Some(0), sequences::data_fn, T::Atomic, item, []);
    reg!(FNS, "data", 1, Some(1), sequences::data_fn, T::Atomic, none, [any_items()]);
    reg!(FNS, "distinct-values", 1, Some(1), sequences::distinct_values_fn, T::Atomic, none, [atomics()]);
    reg!(FNS, "reverse", 1, Some(1), sequences::reverse_fn, T::Item, none, [any_items()]);
    reg!(
        FNS,
        "subsequence",
        2,
        Some(3),
        sequences::subsequence_fn,
        T::Item,
        none,
        [any_items(), seq_type(ItemType::Double, Occurrence::One), seq_type(ItemType::Double, Occurrence::One)],
    );
    reg!(FNS, "exactly-one", 1, Some(1), sequences::exactly_one_fn, T::Item, none, [any_items()]);
    reg!(FNS, "zero-or-one", 1, Some(1), sequences::zero_or_one_fn, T::Item, none, [any_items()]);
    reg!(FNS, "one-or-more", 1, Some(1), sequences::one_or_more_fn, T::Item, none, [any_items()]);

    // ===== Strings =====
    reg!(FNS, "string", 0, Some(0), strings::string_fn, T::String, item, []);
    reg!(FNS, "string", 1, Some(1), strings::string_fn, T::String, none, [seq_type(ItemType::AnyItem, Occurrence::ZeroOrOne)]);
    reg!(FNS, "string-length", 0, Some(0), strings::string_length_fn, T::Number, item, []);
    reg!(FNS, "string-length", 1, Some(1), strings::string_length_fn, T::Number, none, [opt_string()]);
    reg!(FNS, "normalize-space", 0, Some(0), strings::normalize_space_fn, T::String, item, []);
    reg!(FNS, "normalize-space", 1, Some(1), strings::normalize_space_fn, T::String, none, [opt_string()]);
    reg!(FNS, "concat", 2, None, strings::concat_fn, T::String, none, [seq_type(ItemType::AnyAtomic, Occurrence::ZeroOrOne)]);
    reg!(FNS, "contains", 2, Some(2), strings::contains_fn, T::Boolean, none, [opt_string(), opt_string()]);
    reg!(FNS, "starts-with", 2, Some(2), strings::starts_with_fn, T::Boolean, none, [opt_string(), opt_string()]);
    reg!(FNS, "ends-with", 2, Some(2), strings::ends_with_fn, T::Boolean, none, [opt_string(), opt_string()]);
    reg!(
        FNS,
        "substring",
        2,
        Some(3),
        strings::substring_fn,
        T::String,
        none,
        [opt_string(), seq_type(ItemType::Double, Occurrence::One), seq_type(ItemType::Double, Occurrence::One)],
    );
    reg!(FNS, "upper-case", 1, Some(1), strings::upper_case_fn, T::String, none, [opt_string()]);
    reg!(FNS, "lower-case", 1, Some(1), strings::lower_case_fn, T::String, none, [opt_string()]);
    reg!(
        FNS,
        "string-join",
        1,
        Some(2),
        strings::string_join_fn,
        T::String,
        none,
        [atomics(), seq_type(ItemType::String, Occurrence::One)],
    );

    // ===== Numbers =====
    reg!(FNS, "number", 0, Some(0), numeric::number_fn, T::Number, item, []);
    reg!(FNS, "number", 1, Some(1), numeric::number_fn, T::Number, none, [seq_type(ItemType::AnyAtomic, Occurrence::ZeroOrOne)]);
    reg!(FNS, "sum", 1, Some(2), numeric::sum_fn, T::Number, none, [atomics(), seq_type(ItemType::AnyAtomic, Occurrence::ZeroOrOne)]);
    reg!(FNS, "avg", 1, Some(1), numeric::avg_fn, T::Number, none, [atomics()]);
    reg!(FNS, "min", 1, Some(1), numeric::min_fn, T::Atomic, none, [atomics()]);
    reg!(FNS, "max", 1, Some(1), numeric::max_fn, T::Atomic, none, [atomics()]);
    reg!(FNS, "round", 1, Some(1), numeric::round_fn, T::Number, none, [opt_numeric()]);
    reg!(FNS, "floor", 1, Some(1), numeric::floor_fn, T::Number, none, [opt_numeric()]);
    reg!(FNS, "ceiling", 1, Some(1), numeric::ceiling_fn, T::Number, none, [opt_numeric()]);
    reg!(FNS, "abs", 1, Some(1), numeric::abs_fn, T::Number, none, [opt_numeric()]);

    // ===== Nodes =====
    reg!(FNS, "name", 0, Some(0), nodes::name_fn, T::String, item, []);
    reg!(FNS, "name", 1, Some(1), nodes::name_fn, T::String, none, [opt_node()]);
    reg!(FNS, "local-name", 0, Some(0), nodes::local_name_fn, T::String, item, []);
    reg!(FNS, "local-name", 1, Some(1), nodes::local_name_fn, T::String, none, [opt_node()]);
    reg!(FNS, "namespace-uri", 0, Some(0), nodes::namespace_uri_fn, T::Atomic, item, []);
    reg!(FNS, "namespace-uri", 1, Some(1), nodes::namespace_uri_fn, T::Atomic, none, [opt_node()]);
    reg!(FNS, "root", 0, Some(0), nodes::root_fn, T::Node, item, []);
    reg!(FNS, "root", 1, Some(1), nodes::root_fn, T::Node, none, [opt_node()]);

    // ===== Full-text helpers =====
    reg!(TEXT_NS, "match-count", 1, Some(1), fulltext::match_count_fn, T::Number, none, [seq_type(ItemType::AnyNode, Occurrence::ZeroOrMore)]);

    map
}

fn registry() -> &'static HashMap<QName, Vec<BuiltinDef>> {
    static REGISTRY: OnceLock<HashMap<QName, Vec<BuiltinDef>>> = OnceLock::new();
    REGISTRY.get_or_init(build_registry)
}

/// Built-in function `name` accepting `arity` arguments.
pub fn lookup_builtin(name: &QName, arity: usize) -> Option<&'static BuiltinDef> {
    registry().get(name)?.iter().find(|d| d.accepts(arity))
}

/// True if a built-in of that name exists for any arity.
pub fn is_builtin(name: &QName) -> bool {
    registry().contains_key(name)
}

/// Atomic value promoted or cast to `target` by the function conversion
/// rules: untyped values are cast, numerics are promoted along
/// integer, decimal, float, double and anyURI is promoted to string.
#[allow(clippy::cast_possible_truncation)]
fn convert_atomic(v: AtomicValue, target: &ItemType, what: &dyn fmt::Display) -> Result<AtomicValue> {
    use AtomicValue as V;
    if target.matches_atomic(&v) {
        return Ok(v);
    }
    let converted = match (&v, target) {
        (V::UntypedAtomic(_), ItemType::Numeric) => V::Double(v.to_double()),
        (V::UntypedAtomic(_), t) => crate::expr::cast_atomic(&v, t)?,
        (V::AnyUri(s), ItemType::String) => V::String(s.clone()),
        (n, ItemType::Double) if n.is_numeric() => V::Double(n.to_double()),
        (V::Integer(_) | V::Decimal(_), ItemType::Float) => V::Float(v.to_double() as f32),
        _ => {
            return Err(Error::type_error(format!(
                "{what}: expected {target}, got {}",
                v.type_name()
            )));
        }
    };
    Ok(converted)
}

/// Applies the function conversion rules for a declared parameter or return
/// type. Node sequences pass through unchanged so their annotations survive.
pub(crate) fn convert_argument(seq: Sequence, ty: &SequenceType, broker: &dyn Broker, what: &dyn fmt::Display) -> Result<Sequence> {
    let (item, occ) = match ty {
        SequenceType::Empty if seq.is_empty() => return Ok(seq),
        SequenceType::Empty => {
            return Err(Error::type_error(format!("{what}: expected empty-sequence(), got {} items", seq.len())));
        }
        SequenceType::Typed { item, occ } => (item, *occ),
    };
    let out = if item.is_atomic() {
        let values = seq.atomize(broker)?;
        let items = values
            .into_iter()
            .map(|v| convert_atomic(v, item, what).map(Item::Atomic))
            .collect::<Result<Vec<_>>>()?;
        Sequence::Items(items)
    } else {
        for it in seq.iter() {
            if !item.matches(&it, broker)? {
                return Err(Error::type_error(format!("{what}: expected {item}, got an atomic value")));
            }
        }
        seq
    };
    if !occ.allows(out.len()) {
        return Err(Error::cardinality(
            ErrorCode::XPTY0004,
            format!("{what}: expected {ty}, got {} items", out.len()),
        ));
    }
    Ok(out)
}

/// Call of a built-in function.
pub struct BuiltinCall {
    def: &'static BuiltinDef,
    args: Vec<Expr>,
}

impl BuiltinCall {
    /// Resolves `name` against the built-in table.
    pub fn new(name: &QName, args: Vec<Expr>) -> Result<Self> {
        match lookup_builtin(name, args.len()) {
            Some(def) => Ok(Self { def, args }),
            None => Err(Error::from_code(
                ErrorCode::XPST0017,
                format!("unknown function {}#{}", name.expanded(), args.len()),
            )),
        }
    }

    pub fn name(&self) -> &QName {
        &self.def.name
    }

    pub fn args(&self) -> &[Expr] {
        &self.args
    }
}

struct ArgLabel<'d> {
    def: &'d BuiltinDef,
    index: usize,
}

impl fmt::Display for ArgLabel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "argument {} of {}", self.index + 1, self.def.name)
    }
}

impl Expression for BuiltinCall {
    fn eval(&self, ctx: &mut EvalContext<'_>, context_seq: Option<&Sequence>, context_item: Option<&Item>) -> Result<Sequence> {
        let mut values = Vec::with_capacity(self.args.len());
        for (index, arg) in self.args.iter().enumerate() {
            let v = arg.eval(ctx, context_seq, context_item)?;
            let v = match self.def.param_type(index) {
                Some(ty) => convert_argument(v, ty, ctx.broker, &ArgLabel { def: self.def, index })?,
                None => v,
            };
            values.push(v);
        }
        let mut call = CallCtx { eval: ctx, context_seq, context_item };
        (self.def.func)(&mut call, &values)
    }

    fn returns_type(&self) -> StaticType {
        self.def.returns
    }

    fn dependencies(&self) -> Dependencies {
        self.args.iter().fold(self.def.dependencies, |d, a| d | a.dependencies())
    }

    fn reset_state(&self, ctx: &mut EvalContext<'_>) {
        for a in &self.args {
            a.reset_state(ctx);
        }
    }
}

impl fmt::Display for BuiltinCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.def.name)?;
        write_list(f, &self.args, ", ")?;
        f.write_str(")")
    }
}

/// The single atomic value of an optional argument.
pub(crate) fn opt_atomic(arg: &Sequence) -> Option<AtomicValue> {
    match arg.first() {
        Some(Item::Atomic(a)) => Some(a),
        _ => None,
    }
}

/// String value of an optional string argument; empty for `()`.
pub(crate) fn opt_str(arg: &Sequence) -> String {
    opt_atomic(arg).map(|a| a.string_value()).unwrap_or_default()
}
