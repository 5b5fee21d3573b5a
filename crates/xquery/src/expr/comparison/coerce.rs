//! Pairwise atomic comparison with XPath type promotion.

use core::cmp::Ordering;

use super::{CompOp, Truncation};
use crate::error::{Error, ErrorCode, Result};
use crate::xdm::{AtomicValue, parse_double};

use AtomicValue as V;

/// Operands after promotion to a common comparable type.
#[derive(Debug, PartialEq)]
enum Promoted<'a> {
    Integer(i64, i64),
    Double(f64, f64),
    Str(&'a str, &'a str),
    Boolean(bool, bool),
}

fn untyped_to_double(s: &str) -> Result<f64> {
    parse_double(s).ok_or_else(|| Error::from_code(ErrorCode::FORG0001, format!("cannot convert \"{s}\" to xs:double")))
}

fn untyped_to_boolean(s: &str) -> Result<bool> {
    match s.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(Error::from_code(ErrorCode::FORG0001, format!("cannot convert \"{s}\" to xs:boolean"))),
    }
}

fn text(v: &AtomicValue) -> Option<&str> {
    match v {
        V::String(s) | V::UntypedAtomic(s) | V::AnyUri(s) => Some(s),
        _ => None,
    }
}

/// General comparison promotion: an untyped operand takes the type of the
/// other side; two untyped operands compare as strings.
fn promote<'a>(a: &'a AtomicValue, b: &'a AtomicValue, backwards: bool) -> Result<Promoted<'a>> {
    if backwards && (a.is_numeric() || b.is_numeric()) {
        return Ok(Promoted::Double(a.to_double(), b.to_double()));
    }
    Ok(match (a, b) {
        (V::Integer(x), V::Integer(y)) => Promoted::Integer(*x, *y),
        (x, y) if x.is_numeric() && y.is_numeric() => Promoted::Double(x.to_double(), y.to_double()),
        (V::UntypedAtomic(s), y) if y.is_numeric() => Promoted::Double(untyped_to_double(s)?, y.to_double()),
        (x, V::UntypedAtomic(s)) if x.is_numeric() => Promoted::Double(x.to_double(), untyped_to_double(s)?),
        (V::Boolean(x), V::Boolean(y)) => Promoted::Boolean(*x, *y),
        (V::UntypedAtomic(s), V::Boolean(y)) => Promoted::Boolean(untyped_to_boolean(s)?, *y),
        (V::Boolean(x), V::UntypedAtomic(s)) => Promoted::Boolean(*x, untyped_to_boolean(s)?),
        (x, y) => match (text(x), text(y)) {
            (Some(l), Some(r)) => Promoted::Str(l, r),
            _ => {
                return Err(Error::type_error(format!(
                    "cannot compare {} with {}",
                    a.type_name(),
                    b.type_name()
                )));
            }
        },
    })
}

fn ordering(p: &Promoted<'_>) -> Option<Ordering> {
    match p {
        Promoted::Integer(a, b) => Some(a.cmp(b)),
        Promoted::Double(a, b) => a.partial_cmp(b),
        Promoted::Str(a, b) => Some(a.cmp(b)),
        Promoted::Boolean(a, b) => Some(a.cmp(b)),
    }
}

/// Compares two atomic values under general comparison rules.
pub(crate) fn compare_atomic(a: &AtomicValue, op: CompOp, b: &AtomicValue, backwards: bool) -> Result<bool> {
    let p = promote(a, b, backwards)?;
    Ok(op.holds(ordering(&p)))
}

/// Truncated string match of `a` against `b`; only `=` and `!=` apply.
pub(crate) fn compare_truncated(a: &AtomicValue, op: CompOp, trunc: Truncation, b: &AtomicValue) -> Result<bool> {
    let l = a.string_value();
    let r = b.string_value();
    let hit = match trunc {
        Truncation::None => l == r,
        Truncation::Right => l.starts_with(&r),
        Truncation::Left => l.ends_with(&r),
        Truncation::Both => l.contains(&r),
    };
    match op {
        CompOp::Eq => Ok(hit),
        CompOp::Ne => Ok(!hit),
        _ => Err(Error::type_error(format!("truncated match does not support {}", op.symbol()))),
    }
}

/// Value comparison: untyped operands are treated as strings and the
/// operand types must be comparable.
pub(crate) fn compare_value_atomic(a: &AtomicValue, op: CompOp, b: &AtomicValue) -> Result<bool> {
    let as_string = |v: &AtomicValue| match v {
        V::UntypedAtomic(s) => V::String(s.clone()),
        other => other.clone(),
    };
    let (a, b) = (as_string(a), as_string(b));
    let p = promote(&a, &b, false)?;
    Ok(op.holds(ordering(&p)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untyped_takes_numeric_type() {
        let ten = V::UntypedAtomic("10".into());
        assert!(compare_atomic(&ten, CompOp::Gt, &V::Integer(9), false).unwrap());
        // As strings "10" < "9".
        assert!(!compare_atomic(&ten, CompOp::Gt, &V::UntypedAtomic("9".into()), false).unwrap());
    }

    #[test]
    fn untyped_non_number_against_number_fails() {
        let err = compare_atomic(&V::UntypedAtomic("abc".into()), CompOp::Eq, &V::Integer(1), false).unwrap_err();
        assert_eq!(err.code, ErrorCode::FORG0001);
    }

    #[test]
    fn backwards_mode_goes_through_double() {
        assert!(compare_atomic(&V::Integer(1), CompOp::Eq, &V::String("1".into()), true).unwrap());
        assert!(compare_atomic(&V::Integer(1), CompOp::Eq, &V::Boolean(true), true).unwrap());
        assert!(compare_atomic(&V::Integer(1), CompOp::Eq, &V::String("1".into()), false).is_err());
    }

    #[test]
    fn nan_is_unordered() {
        let nan = V::Double(f64::NAN);
        assert!(!compare_atomic(&nan, CompOp::Eq, &nan, false).unwrap());
        assert!(compare_atomic(&nan, CompOp::Ne, &nan, false).unwrap());
        assert!(!compare_atomic(&nan, CompOp::Lt, &V::Integer(1), false).unwrap());
    }

    #[test]
    fn value_comparison_treats_untyped_as_string() {
        let err = compare_value_atomic(&V::UntypedAtomic("10".into()), CompOp::Gt, &V::Integer(9)).unwrap_err();
        assert_eq!(err.code, ErrorCode::XPTY0004);
        assert!(compare_value_atomic(&V::UntypedAtomic("b".into()), CompOp::Gt, &V::String("a".into())).unwrap());
    }

    #[test]
    fn truncation() {
        let v = V::String("database".into());
        assert!(compare_truncated(&v, CompOp::Eq, Truncation::Right, &V::String("data".into())).unwrap());
        assert!(compare_truncated(&v, CompOp::Eq, Truncation::Left, &V::String("base".into())).unwrap());
        assert!(compare_truncated(&v, CompOp::Eq, Truncation::Both, &V::String("tab".into())).unwrap());
        assert!(compare_truncated(&v, CompOp::Ne, Truncation::Right, &V::String("base".into())).unwrap());
    }
}
