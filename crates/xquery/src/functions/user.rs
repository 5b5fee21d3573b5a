//! User-declared functions.
//!
//! A call made before its function is declared starts out unresolved and is
//! registered as a forward reference; the registry patches it once all
//! declarations are known.

use core::fmt;
use std::cell::OnceCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::trace;

use super::convert_argument;
use crate::error::{Error, ErrorCode, Result};
use crate::eval::EvalContext;
use crate::expr::{CardinalityCheck, Expr, Expression, TypeCheck, write_list};
use crate::model::QName;
use crate::types::{Dependencies, ItemType, Occurrence, SequenceType, StaticType};
use crate::xdm::{Item, Sequence};

pub struct UserFunction {
    name: QName,
    params: Vec<(QName, SequenceType)>,
    return_type: Option<SequenceType>,
    body: OnceCell<Expr>,
}

impl UserFunction {
    pub fn new(name: QName, params: Vec<(QName, SequenceType)>, return_type: Option<SequenceType>) -> Self {
        Self { name, params, return_type, body: OnceCell::new() }
    }

    pub fn name(&self) -> &QName {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn params(&self) -> &[(QName, SequenceType)] {
        &self.params
    }

    pub fn return_type(&self) -> Option<&SequenceType> {
        self.return_type.as_ref()
    }

    /// Installs the body, wrapped in the checks the declared return type
    /// asks for. A body can be set once.
    pub fn set_body(&self, body: Expr) -> Result<()> {
        let mut body = body;
        if let Some(SequenceType::Typed { item, occ }) = &self.return_type {
            let what = format!("return value of {}#{}", self.name, self.arity());
            if *occ != Occurrence::ZeroOrMore {
                body = Expr::CardinalityCheck(Box::new(CardinalityCheck::new(body, *occ, what.clone())));
            }
            if *item != ItemType::AnyItem {
                body = Expr::TypeCheck(Box::new(TypeCheck::new(body, item.clone(), what)));
            }
        }
        self.body
            .set(body)
            .map_err(|_| Error::from_code(ErrorCode::XQST0034, format!("function {}#{} already has a body", self.name, self.arity())))
    }

    pub fn body(&self) -> Option<&Expr> {
        self.body.get()
    }
}

impl fmt::Debug for UserFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserFunction({}#{})", self.name, self.arity())
    }
}

type Slot = Rc<OnceCell<Weak<UserFunction>>>;

/// User functions of one query, keyed by name and arity.
#[derive(Default)]
pub struct UserFunctionRegistry {
    functions: HashMap<(QName, usize), Rc<UserFunction>>,
    pending: Vec<(QName, usize, Slot)>,
}

impl UserFunctionRegistry {
    pub fn declare(&mut self, f: Rc<UserFunction>) -> Result<()> {
        let key = (f.name.clone(), f.arity());
        if self.functions.contains_key(&key) {
            return Err(Error::from_code(
                ErrorCode::XQST0034,
                format!("function {}#{} is declared twice", f.name, f.arity()),
            ));
        }
        self.functions.insert(key, f);
        Ok(())
    }

    pub fn lookup(&self, name: &QName, arity: usize) -> Option<&Rc<UserFunction>> {
        self.functions.get(&(name.clone(), arity))
    }

    /// Builds a call of `name`, resolved now if the function is known and
    /// recorded as a forward reference otherwise.
    pub fn call(&mut self, name: QName, args: Vec<Expr>) -> FunctionCall {
        if let Some(f) = self.lookup(&name, args.len()) {
            return FunctionCall::new(f, args);
        }
        let call = FunctionCall::unresolved(name, args);
        self.add_forward_reference(&call);
        call
    }

    pub fn add_forward_reference(&mut self, call: &FunctionCall) {
        if call.target.get().is_none() {
            self.pending.push((call.name.clone(), call.args.len(), Rc::clone(&call.target)));
        }
    }

    /// Patches every pending call; fails on the first one whose function was
    /// never declared. Returns the number of patched calls.
    pub fn resolve_forward_references(&mut self) -> Result<usize> {
        let mut resolved = 0;
        for (name, arity, slot) in std::mem::take(&mut self.pending) {
            let Some(f) = self.functions.get(&(name.clone(), arity)) else {
                return Err(Error::from_code(
                    ErrorCode::XPST0017,
                    format!("call to undeclared function {}#{arity}", name.expanded()),
                ));
            };
            if slot.set(Rc::downgrade(f)).is_ok() {
                resolved += 1;
            }
            trace!(function = %name, arity, "forward reference resolved");
        }
        Ok(resolved)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Call of a user function.
pub struct FunctionCall {
    name: QName,
    args: Vec<Expr>,
    target: Slot,
}

impl FunctionCall {
    pub fn new(f: &Rc<UserFunction>, args: Vec<Expr>) -> Self {
        let target = Rc::new(OnceCell::new());
        let _ = target.set(Rc::downgrade(f));
        Self { name: f.name.clone(), args, target }
    }

    /// A call whose function is not declared yet; see
    /// [`UserFunctionRegistry::add_forward_reference`].
    pub fn unresolved(name: QName, args: Vec<Expr>) -> Self {
        Self { name, args, target: Rc::new(OnceCell::new()) }
    }

    pub fn name(&self) -> &QName {
        &self.name
    }

    pub fn is_resolved(&self) -> bool {
        self.function().is_some()
    }

    fn function(&self) -> Option<Rc<UserFunction>> {
        self.target.get().and_then(Weak::upgrade)
    }
}

struct ParamLabel<'p> {
    function: &'p QName,
    param: &'p QName,
}

impl fmt::Display for ParamLabel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parameter ${} of {}", self.param, self.function)
    }
}

impl Expression for FunctionCall {
    fn eval(&self, ctx: &mut EvalContext<'_>, context_seq: Option<&Sequence>, context_item: Option<&Item>) -> Result<Sequence> {
        let Some(f) = self.function() else {
            return Err(Error::from_code(
                ErrorCode::XPST0017,
                format!("function {}#{} is not declared", self.name.expanded(), self.args.len()),
            ));
        };
        let Some(body) = f.body() else {
            return Err(Error::from_code(
                ErrorCode::XPST0017,
                format!("function {}#{} has no body", self.name, self.args.len()),
            ));
        };
        let mut values = Vec::with_capacity(self.args.len());
        for (arg, (param, ty)) in self.args.iter().zip(&f.params) {
            let v = arg.eval(ctx, context_seq, context_item)?;
            let label = ParamLabel { function: &f.name, param };
            values.push(convert_argument(v, ty, ctx.broker, &label)?);
        }
        let mut scope = ctx.enter_function_scope();
        for ((param, ty), v) in f.params.iter().zip(values) {
            scope.sctx.variables.declare_typed(param.clone(), v, ty.clone());
        }
        scope.without_focus(|c| c.with_query_documents(|c| body.eval(c, None, None)))
    }

    fn returns_type(&self) -> StaticType {
        self.function()
            .and_then(|f| f.return_type.as_ref().map(SequenceType::static_type))
            .unwrap_or(StaticType::Item)
    }

    fn dependencies(&self) -> Dependencies {
        self.args.iter().fold(Dependencies::NONE, |d, a| d | a.dependencies())
    }

    fn reset_state(&self, ctx: &mut EvalContext<'_>) {
        for a in &self.args {
            a.reset_state(ctx);
        }
    }
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        write_list(f, &self.args, ", ")?;
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Literal, VarRef};

    fn square() -> Rc<UserFunction> {
        let x = QName::local("x");
        Rc::new(UserFunction::new(
            QName::new(Some(crate::consts::LOCAL_NS), "square").with_prefix("local"),
            vec![(x, SequenceType::new(ItemType::Integer, Occurrence::One))],
            None,
        ))
    }

    #[test]
    fn duplicate_declaration() {
        let mut reg = UserFunctionRegistry::default();
        reg.declare(square()).unwrap();
        assert_eq!(reg.declare(square()).unwrap_err().code, ErrorCode::XQST0034);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn forward_reference_is_patched() {
        let mut reg = UserFunctionRegistry::default();
        let f = square();
        let call = reg.call(f.name().clone(), vec![Expr::Literal(Literal::integer(3))]);
        assert!(!call.is_resolved());
        reg.declare(Rc::clone(&f)).unwrap();
        assert_eq!(reg.resolve_forward_references().unwrap(), 1);
        assert!(call.is_resolved());
    }

    #[test]
    fn unresolved_reference_fails() {
        let mut reg = UserFunctionRegistry::default();
        let _call = reg.call(QName::local("missing"), vec![]);
        assert_eq!(reg.resolve_forward_references().unwrap_err().code, ErrorCode::XPST0017);
    }

    #[test]
    fn body_is_set_once() {
        let f = square();
        f.set_body(Expr::VarRef(VarRef::new(QName::local("x")))).unwrap();
        assert!(f.set_body(Expr::Literal(Literal::integer(1))).is_err());
        assert_eq!(f.body().map(ToString::to_string).as_deref(), Some("$x"));
    }
}
