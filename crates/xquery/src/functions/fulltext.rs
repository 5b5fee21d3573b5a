use super::CallCtx;
use crate::error::Result;
use crate::xdm::Sequence;

/// `text:match-count($nodes)`: full-text match spans recorded on the nodes.
#[allow(clippy::cast_possible_wrap)]
pub(super) fn match_count_fn(_ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    let count = args[0].as_nodes().map_or(0, |c| c.match_count());
    Ok(Sequence::integer(count as i64))
}
