use std::collections::HashSet;

use super::numeric::xpath_round;
use super::{CallCtx, opt_atomic};
use crate::error::{Error, ErrorCode, Result};
use crate::xdm::{AtomicValue, Item, Sequence};

#[allow(clippy::cast_possible_wrap)]
fn count_of(seq: &Sequence) -> Sequence {
    Sequence::integer(seq.len() as i64)
}

pub(super) fn count_fn(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    Ok(count_of(&args[0]))
}

pub(super) fn empty_fn(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    Ok(Sequence::boolean(args[0].is_empty()))
}

pub(super) fn exists_fn(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    Ok(Sequence::boolean(!args[0].is_empty()))
}

#[allow(clippy::cast_possible_wrap)]
pub(super) fn position_fn(ctx: &mut CallCtx<'_, '_>, _args: &[Sequence]) -> Result<Sequence> {
    Ok(Sequence::integer(ctx.focus("position()")?.position as i64))
}

#[allow(clippy::cast_possible_wrap)]
pub(super) fn last_fn(ctx: &mut CallCtx<'_, '_>, _args: &[Sequence]) -> Result<Sequence> {
    Ok(Sequence::integer(ctx.focus("last()")?.size as i64))
}

pub(super) fn data_fn(ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    let values = match args.first() {
        Some(seq) => seq.atomize(ctx.broker())?,
        None => vec![ctx.context_item("data()")?.atomize(ctx.broker())?],
    };
    Ok(Sequence::Items(values.into_iter().map(Item::Atomic).collect()))
}

/// Equality key of `distinct-values`: numbers by value, untyped and
/// strings by their text.
#[derive(PartialEq, Eq, Hash)]
enum DistinctKey {
    Number(u64),
    Text(String),
    Boolean(bool),
}

impl DistinctKey {
    fn of(v: &AtomicValue) -> Self {
        match v {
            AtomicValue::Boolean(b) => DistinctKey::Boolean(*b),
            n if n.is_numeric() => {
                let d = n.to_double();
                let d = if d.is_nan() { f64::NAN } else if d == 0.0 { 0.0 } else { d };
                DistinctKey::Number(d.to_bits())
            }
            other => DistinctKey::Text(other.string_value()),
        }
    }
}

pub(super) fn distinct_values_fn(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in args[0].iter() {
        if let Item::Atomic(a) = item
            && seen.insert(DistinctKey::of(&a))
        {
            out.push(Item::Atomic(a));
        }
    }
    Ok(Sequence::Items(out))
}

pub(super) fn reverse_fn(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    let mut items = args[0].clone().into_items();
    items.reverse();
    Ok(Sequence::Items(items))
}

#[allow(clippy::cast_precision_loss)]
pub(super) fn subsequence_fn(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    let seq = &args[0];
    let start = opt_atomic(&args[1]).map_or(f64::NAN, |a| xpath_round(a.to_double()));
    let end = match args.get(2) {
        Some(len) => start + opt_atomic(len).map_or(f64::NAN, |a| xpath_round(a.to_double())),
        None => f64::INFINITY,
    };
    let keep: Vec<usize> = (0..seq.len())
        .filter(|i| {
            let p = (*i + 1) as f64;
            p >= start && p < end
        })
        .collect();
    Ok(match seq {
        Sequence::Nodes(c) => Sequence::Nodes(c.select_positions(&keep)),
        Sequence::Items(v) => Sequence::Items(keep.iter().filter_map(|&i| v.get(i).cloned()).collect()),
    })
}

pub(super) fn exactly_one_fn(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    if args[0].len() != 1 {
        return Err(Error::from_code(
            ErrorCode::FORG0005,
            format!("exactly-one() called with a sequence of {} items", args[0].len()),
        ));
    }
    Ok(args[0].clone())
}

pub(super) fn zero_or_one_fn(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    if args[0].len() > 1 {
        return Err(Error::from_code(
            ErrorCode::FORG0003,
            format!("zero-or-one() called with a sequence of {} items", args[0].len()),
        ));
    }
    Ok(args[0].clone())
}

pub(super) fn one_or_more_fn(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    if args[0].is_empty() {
        return Err(Error::from_code(ErrorCode::FORG0004, "one-or-more() called with an empty sequence"));
    }
    Ok(args[0].clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_keys_unify_numbers() {
        assert!(DistinctKey::of(&AtomicValue::Integer(1)) == DistinctKey::of(&AtomicValue::Double(1.0)));
        assert!(DistinctKey::of(&AtomicValue::Double(f64::NAN)) == DistinctKey::of(&AtomicValue::Float(f32::NAN)));
        assert!(DistinctKey::of(&AtomicValue::UntypedAtomic("a".into())) == DistinctKey::of(&AtomicValue::String("a".into())));
        assert!(DistinctKey::of(&AtomicValue::String("1".into())) != DistinctKey::of(&AtomicValue::Integer(1)));
    }
}
