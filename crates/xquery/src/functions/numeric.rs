use core::cmp::Ordering;

use super::{CallCtx, opt_atomic};
use crate::error::{Error, ErrorCode, Result};
use crate::expr::{ArithOp, arithmetic};
use crate::xdm::{AtomicValue, Item, Sequence};

use AtomicValue as V;

/// XPath rounding: halves round towards positive infinity.
pub(super) fn xpath_round(d: f64) -> f64 {
    (d + 0.5).floor()
}

pub(super) fn number_fn(ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    let value = match args.first() {
        Some(seq) => opt_atomic(seq),
        None => Some(ctx.context_item("number()")?.atomize(ctx.broker())?),
    };
    Ok(Sequence::double(value.map_or(f64::NAN, |v| v.to_double())))
}

/// Numeric operand of an aggregate; untyped values count as doubles.
fn aggregate_operand(v: AtomicValue, func: &str) -> Result<AtomicValue> {
    match v {
        V::UntypedAtomic(_) => Ok(V::Double(v.to_double())),
        n if n.is_numeric() => Ok(n),
        other => Err(Error::from_code(
            ErrorCode::FORG0006,
            format!("{func}: {} is not a number", other.type_name()),
        )),
    }
}

fn atomics_of(seq: &Sequence) -> Vec<AtomicValue> {
    seq.iter()
        .filter_map(|i| match i {
            Item::Atomic(a) => Some(a),
            Item::Node(_) => None,
        })
        .collect()
}

fn total(values: Vec<AtomicValue>, func: &str) -> Result<Option<AtomicValue>> {
    let mut acc: Option<AtomicValue> = None;
    for v in values {
        let v = aggregate_operand(v, func)?;
        acc = Some(match acc {
            None => v,
            Some(a) => arithmetic(ArithOp::Add, &a, &v)?,
        });
    }
    Ok(acc)
}

pub(super) fn sum_fn(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    match total(atomics_of(&args[0]), "sum()")? {
        Some(v) => Ok(Sequence::atomic(v)),
        None => match args.get(1) {
            Some(zero) => Ok(zero.clone()),
            None => Ok(Sequence::integer(0)),
        },
    }
}

#[allow(clippy::cast_possible_wrap)]
pub(super) fn avg_fn(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    let values = atomics_of(&args[0]);
    let count = values.len() as i64;
    match total(values, "avg()")? {
        Some(sum) => Ok(Sequence::atomic(arithmetic(ArithOp::Div, &sum, &V::Integer(count))?)),
        None => Ok(Sequence::empty()),
    }
}

/// Ordering used by `min` and `max`: numbers by value, strings by code
/// point, booleans false first.
fn extreme(values: Vec<AtomicValue>, want: Ordering, func: &str) -> Result<Option<AtomicValue>> {
    let mut best: Option<AtomicValue> = None;
    let mut widen = false;
    for v in values {
        let v = match v {
            V::UntypedAtomic(_) => V::Double(v.to_double()),
            other => other,
        };
        if v.is_numeric() && v.to_double().is_nan() {
            return Ok(Some(V::Double(f64::NAN)));
        }
        let Some(current) = &best else {
            best = Some(v);
            continue;
        };
        let ord = match (current, &v) {
            (a, b) if a.is_numeric() && b.is_numeric() => {
                widen |= core::mem::discriminant(a) != core::mem::discriminant(b);
                b.to_double().partial_cmp(&a.to_double()).unwrap_or(Ordering::Equal)
            }
            (V::Boolean(a), V::Boolean(b)) => b.cmp(a),
            (a, b) if a.is_string_like() && b.is_string_like() => b.string_value().cmp(&a.string_value()),
            (a, b) => {
                return Err(Error::from_code(
                    ErrorCode::FORG0006,
                    format!("{func}: cannot compare {} with {}", a.type_name(), b.type_name()),
                ));
            }
        };
        if ord == want {
            best = Some(v);
        }
    }
    Ok(best.map(|b| if widen && b.is_numeric() { V::Double(b.to_double()) } else { b }))
}

pub(super) fn min_fn(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    Ok(extreme(atomics_of(&args[0]), Ordering::Less, "min()")?.map_or_else(Sequence::empty, Sequence::atomic))
}

pub(super) fn max_fn(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    Ok(extreme(atomics_of(&args[0]), Ordering::Greater, "max()")?.map_or_else(Sequence::empty, Sequence::atomic))
}

/// Applies `f` to a non-integer numeric argument, keeping its type.
#[allow(clippy::cast_possible_truncation)]
fn unary(args: &[Sequence], int: impl Fn(i64) -> Result<i64>, f: impl Fn(f64) -> f64) -> Result<Sequence> {
    let Some(v) = opt_atomic(&args[0]) else { return Ok(Sequence::empty()) };
    Ok(Sequence::atomic(match v {
        V::Integer(i) => V::Integer(int(i)?),
        V::Decimal(d) => V::Decimal(f(d)),
        V::Float(x) => V::Float(f(f64::from(x)) as f32),
        other => V::Double(f(other.to_double())),
    }))
}

pub(super) fn round_fn(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    unary(args, Ok, |d| if d.is_finite() { xpath_round(d) } else { d })
}

pub(super) fn floor_fn(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    unary(args, Ok, f64::floor)
}

pub(super) fn ceiling_fn(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    unary(args, Ok, f64::ceil)
}

pub(super) fn abs_fn(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    unary(
        args,
        |i| i.checked_abs().ok_or_else(|| Error::from_code(ErrorCode::FOAR0002, "integer overflow in abs()")),
        f64::abs,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_halves_up() {
        assert_eq!(xpath_round(1.5), 2.0);
        assert_eq!(xpath_round(-1.5), -1.0);
        assert_eq!(xpath_round(2.4), 2.0);
    }

    #[test]
    fn extremes() {
        let vals = vec![V::Integer(3), V::UntypedAtomic("7".into()), V::Integer(1)];
        assert_eq!(extreme(vals.clone(), Ordering::Greater, "max()").unwrap(), Some(V::Double(7.0)));
        assert_eq!(extreme(vals, Ordering::Less, "min()").unwrap(), Some(V::Double(1.0)));
        let strings = vec![V::String("b".into()), V::String("a".into())];
        assert_eq!(extreme(strings, Ordering::Less, "min()").unwrap(), Some(V::String("a".into())));
        let mixed = vec![V::String("b".into()), V::Integer(1)];
        assert_eq!(extreme(mixed, Ordering::Less, "min()").unwrap_err().code, ErrorCode::FORG0006);
    }

    #[test]
    fn totals() {
        assert_eq!(total(vec![V::Integer(2), V::Integer(3)], "sum()").unwrap(), Some(V::Integer(5)));
        assert_eq!(total(vec![V::Integer(2), V::Double(0.5)], "sum()").unwrap(), Some(V::Double(2.5)));
        assert!(total(vec![V::String("x".into())], "sum()").is_err());
    }
}
