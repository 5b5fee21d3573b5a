//! `cast as`, `castable as` and `instance of`.

use core::fmt;

use super::{Expr, Expression};
use crate::error::{Error, ErrorCode, Result};
use crate::eval::EvalContext;
use crate::types::{Dependencies, ItemType, SequenceType, StaticType};
use crate::xdm::{AtomicValue, Item, Sequence, format_double, parse_double};

use AtomicValue as V;

fn invalid(v: &AtomicValue, target: &ItemType) -> Error {
    Error::from_code(ErrorCode::FORG0001, format!("cannot cast {} \"{}\" to {target}", v.type_name(), v.string_value()))
}

fn parse_integer(s: &str) -> Option<i64> {
    let t = s.trim();
    let digits = t.strip_prefix(['+', '-']).unwrap_or(t);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    t.parse().ok()
}

fn parse_decimal(s: &str) -> Option<f64> {
    let t = s.trim();
    let body = t.strip_prefix(['+', '-']).unwrap_or(t);
    let valid = !body.is_empty()
        && body.bytes().all(|b| b.is_ascii_digit() || b == b'.')
        && body.bytes().filter(|b| *b == b'.').count() <= 1
        && body != ".";
    if valid { t.parse().ok() } else { None }
}

/// Casts an atomic value to an atomic item type.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub(crate) fn cast_atomic(v: &AtomicValue, target: &ItemType) -> Result<AtomicValue> {
    if !target.is_atomic() {
        return Err(Error::type_error(format!("cannot cast to non-atomic type {target}")));
    }
    if target.matches_atomic(v) && !matches!(target, ItemType::Decimal) {
        return Ok(v.clone());
    }
    let text = || match v {
        V::Double(d) => format_double(*d),
        other => other.string_value(),
    };
    Ok(match target {
        ItemType::AnyItem | ItemType::AnyAtomic | ItemType::Numeric if v.is_numeric() => v.clone(),
        ItemType::AnyItem | ItemType::AnyAtomic => v.clone(),
        ItemType::Numeric => V::Double(parse_double(&v.string_value()).ok_or_else(|| invalid(v, target))?),
        ItemType::String => V::String(text()),
        ItemType::UntypedAtomic => V::UntypedAtomic(text()),
        ItemType::AnyUri => match v {
            V::String(s) | V::UntypedAtomic(s) => V::AnyUri(s.trim().to_string()),
            _ => return Err(Error::type_error(format!("cannot cast {} to xs:anyURI", v.type_name()))),
        },
        ItemType::Boolean => match v {
            V::String(s) | V::UntypedAtomic(s) => match s.trim() {
                "true" | "1" => V::Boolean(true),
                "false" | "0" => V::Boolean(false),
                _ => return Err(invalid(v, target)),
            },
            n if n.is_numeric() => V::Boolean(n.ebv()?),
            _ => return Err(Error::type_error(format!("cannot cast {} to xs:boolean", v.type_name()))),
        },
        ItemType::Integer => match v {
            V::String(s) | V::UntypedAtomic(s) => V::Integer(parse_integer(s).ok_or_else(|| invalid(v, target))?),
            V::Boolean(b) => V::Integer(i64::from(*b)),
            n if n.is_numeric() => {
                let d = n.to_double();
                if !d.is_finite() {
                    return Err(invalid(v, target));
                }
                V::Integer(d.trunc() as i64)
            }
            _ => return Err(Error::type_error(format!("cannot cast {} to xs:integer", v.type_name()))),
        },
        ItemType::Decimal => match v {
            V::Decimal(_) => v.clone(),
            V::Integer(i) => V::Decimal(*i as f64),
            V::String(s) | V::UntypedAtomic(s) => V::Decimal(parse_decimal(s).ok_or_else(|| invalid(v, target))?),
            V::Boolean(b) => V::Decimal(if *b { 1.0 } else { 0.0 }),
            n if n.is_numeric() => {
                let d = n.to_double();
                if !d.is_finite() {
                    return Err(invalid(v, target));
                }
                V::Decimal(d)
            }
            _ => return Err(Error::type_error(format!("cannot cast {} to xs:decimal", v.type_name()))),
        },
        ItemType::Double | ItemType::Float => {
            let d = match v {
                V::String(s) | V::UntypedAtomic(s) => parse_double(s).ok_or_else(|| invalid(v, target))?,
                V::AnyUri(_) => return Err(Error::type_error(format!("cannot cast xs:anyURI to {target}"))),
                other => other.to_double(),
            };
            if *target == ItemType::Float { V::Float(d as f32) } else { V::Double(d) }
        }
        ItemType::AnyNode | ItemType::Kind(_) => return Err(Error::type_error(format!("cannot cast to {target}"))),
    })
}

/// Integer operand of a range or position argument.
pub(crate) fn to_integer(v: &AtomicValue) -> Result<i64> {
    match v {
        V::Integer(i) => Ok(*i),
        V::UntypedAtomic(s) => parse_integer(s).ok_or_else(|| invalid(v, &ItemType::Integer)),
        n if n.is_numeric() && n.to_double().fract() == 0.0 => match cast_atomic(n, &ItemType::Integer)? {
            V::Integer(i) => Ok(i),
            _ => Err(invalid(v, &ItemType::Integer)),
        },
        _ => Err(Error::type_error(format!("expected xs:integer, found {}", v.type_name()))),
    }
}

/// `e cast as T?` and `e castable as T?`.
pub struct CastExpr {
    operand: Expr,
    target: ItemType,
    allow_empty: bool,
    castable: bool,
}

impl CastExpr {
    pub fn new(operand: Expr, target: ItemType, allow_empty: bool) -> Self {
        Self { operand, target, allow_empty, castable: false }
    }

    pub fn castable(operand: Expr, target: ItemType, allow_empty: bool) -> Self {
        Self { operand, target, allow_empty, castable: true }
    }

    fn cast(&self, ctx: &mut EvalContext<'_>, seq: Option<&Sequence>, item: Option<&Item>) -> Result<Sequence> {
        let values = self.operand.eval(ctx, seq, item)?.atomize(ctx.broker)?;
        match values.as_slice() {
            [] if self.allow_empty => Ok(Sequence::empty()),
            [v] => Ok(Sequence::atomic(cast_atomic(v, &self.target)?)),
            other => Err(Error::cardinality(
                ErrorCode::XPTY0004,
                format!("cast to {} expects one item, got {}", self.target, other.len()),
            )),
        }
    }
}

impl Expression for CastExpr {
    fn eval(&self, ctx: &mut EvalContext<'_>, context_seq: Option<&Sequence>, context_item: Option<&Item>) -> Result<Sequence> {
        if !self.castable {
            return self.cast(ctx, context_seq, context_item);
        }
        match self.cast(ctx, context_seq, context_item) {
            Ok(_) => Ok(Sequence::boolean(true)),
            Err(e) if matches!(e.code, ErrorCode::FORG0001 | ErrorCode::XPTY0004) => Ok(Sequence::boolean(false)),
            Err(e) => Err(e),
        }
    }

    fn returns_type(&self) -> StaticType {
        if self.castable { StaticType::Boolean } else { self.target.static_type() }
    }

    fn dependencies(&self) -> Dependencies {
        self.operand.dependencies()
    }

    fn reset_state(&self, ctx: &mut EvalContext<'_>) {
        self.operand.reset_state(ctx);
    }
}

impl fmt::Display for CastExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kw = if self.castable { "castable" } else { "cast" };
        let q = if self.allow_empty { "?" } else { "" };
        write!(f, "({} {kw} as {}{q})", self.operand, self.target)
    }
}

/// `e instance of T`
pub struct InstanceOfExpr {
    operand: Expr,
    target: SequenceType,
}

impl InstanceOfExpr {
    pub fn new(operand: Expr, target: SequenceType) -> Self {
        Self { operand, target }
    }
}

impl Expression for InstanceOfExpr {
    fn eval(&self, ctx: &mut EvalContext<'_>, context_seq: Option<&Sequence>, context_item: Option<&Item>) -> Result<Sequence> {
        let seq = self.operand.eval(ctx, context_seq, context_item)?;
        Ok(Sequence::boolean(self.target.matches(&seq, ctx.broker)?))
    }

    fn returns_type(&self) -> StaticType {
        StaticType::Boolean
    }

    fn dependencies(&self) -> Dependencies {
        self.operand.dependencies()
    }

    fn reset_state(&self, ctx: &mut EvalContext<'_>) {
        self.operand.reset_state(ctx);
    }
}

impl fmt::Display for InstanceOfExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} instance of {})", self.operand, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_casts() {
        assert_eq!(cast_atomic(&V::String(" 42 ".into()), &ItemType::Integer).unwrap(), V::Integer(42));
        assert_eq!(cast_atomic(&V::String("1.5".into()), &ItemType::Double).unwrap(), V::Double(1.5));
        assert_eq!(cast_atomic(&V::UntypedAtomic("true".into()), &ItemType::Boolean).unwrap(), V::Boolean(true));
        assert_eq!(cast_atomic(&V::Integer(7), &ItemType::String).unwrap(), V::String("7".into()));
    }

    #[test]
    fn invalid_lexical_form() {
        let err = cast_atomic(&V::String("1.5".into()), &ItemType::Integer).unwrap_err();
        assert_eq!(err.code, ErrorCode::FORG0001);
        assert!(cast_atomic(&V::String("INF".into()), &ItemType::Decimal).is_err());
    }

    #[test]
    fn numeric_to_integer_truncates() {
        assert_eq!(cast_atomic(&V::Double(-2.7), &ItemType::Integer).unwrap(), V::Integer(-2));
        assert!(cast_atomic(&V::Double(f64::NAN), &ItemType::Integer).is_err());
    }

    #[test]
    fn range_bounds() {
        assert_eq!(to_integer(&V::UntypedAtomic("3".into())).unwrap(), 3);
        assert_eq!(to_integer(&V::Double(4.0)).unwrap(), 4);
        assert!(to_integer(&V::Double(4.5)).is_err());
        assert!(to_integer(&V::String("3".into())).is_err());
    }
}
