use super::CallCtx;
use crate::error::Result;
use crate::xdm::Sequence;

pub(super) fn fn_true(_ctx: &mut CallCtx<'_, '_>, _args: &[Sequence]) -> Result<Sequence> {
    Ok(Sequence::boolean(true))
}

pub(super) fn fn_false(_ctx: &mut CallCtx<'_, '_>, _args: &[Sequence]) -> Result<Sequence> {
    Ok(Sequence::boolean(false))
}

pub(super) fn fn_not(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    Ok(Sequence::boolean(!args[0].ebv()?))
}

pub(super) fn fn_boolean(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    Ok(Sequence::boolean(args[0].ebv()?))
}
