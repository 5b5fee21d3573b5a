use super::numeric::xpath_round;
use super::{CallCtx, opt_atomic, opt_str};
use crate::error::Result;
use crate::xdm::{Item, Sequence};

/// String value of the single argument, or of the context item.
fn string_arg(ctx: &mut CallCtx<'_, '_>, args: &[Sequence], func: &str) -> Result<String> {
    match args.first() {
        Some(seq) => match seq.first() {
            Some(item) => item.string_value(ctx.broker()),
            None => Ok(String::new()),
        },
        None => ctx.context_item(func)?.string_value(ctx.broker()),
    }
}

pub(super) fn string_fn(ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    Ok(Sequence::string(string_arg(ctx, args, "string()")?))
}

#[allow(clippy::cast_possible_wrap)]
pub(super) fn string_length_fn(ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    let s = string_arg(ctx, args, "string-length()")?;
    Ok(Sequence::integer(s.chars().count() as i64))
}

pub(super) fn normalize_space_fn(ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    let s = string_arg(ctx, args, "normalize-space()")?;
    Ok(Sequence::string(s.split_whitespace().collect::<Vec<_>>().join(" ")))
}

pub(super) fn concat_fn(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    let mut out = String::new();
    for a in args {
        if let Some(v) = opt_atomic(a) {
            out.push_str(&v.string_value());
        }
    }
    Ok(Sequence::string(out))
}

pub(super) fn contains_fn(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    Ok(Sequence::boolean(opt_str(&args[0]).contains(opt_str(&args[1]).as_str())))
}

pub(super) fn starts_with_fn(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    Ok(Sequence::boolean(opt_str(&args[0]).starts_with(opt_str(&args[1]).as_str())))
}

pub(super) fn ends_with_fn(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    Ok(Sequence::boolean(opt_str(&args[0]).ends_with(opt_str(&args[1]).as_str())))
}

/// Characters at positions `p` with `round(start) <= p < round(start) + round(len)`.
#[allow(clippy::cast_precision_loss)]
pub(super) fn substring_fn(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    let s = opt_str(&args[0]);
    let start = opt_atomic(&args[1]).map_or(f64::NAN, |a| xpath_round(a.to_double()));
    let end = match args.get(2) {
        Some(len) => start + opt_atomic(len).map_or(f64::NAN, |a| xpath_round(a.to_double())),
        None => f64::INFINITY,
    };
    let out: String = s
        .chars()
        .enumerate()
        .filter(|(i, _)| {
            let p = (*i + 1) as f64;
            p >= start && p < end
        })
        .map(|(_, c)| c)
        .collect();
    Ok(Sequence::string(out))
}

pub(super) fn upper_case_fn(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    Ok(Sequence::string(opt_str(&args[0]).to_uppercase()))
}

pub(super) fn lower_case_fn(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    Ok(Sequence::string(opt_str(&args[0]).to_lowercase()))
}

pub(super) fn string_join_fn(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    let sep = args.get(1).map(opt_str).unwrap_or_default();
    let parts: Vec<String> = args[0]
        .iter()
        .filter_map(|i| match i {
            Item::Atomic(a) => Some(a.string_value()),
            Item::Node(_) => None,
        })
        .collect();
    Ok(Sequence::string(parts.join(&sep)))
}
