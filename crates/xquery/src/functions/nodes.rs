use super::CallCtx;
use crate::error::{Error, Result};
use crate::model::{NodeHandle, QName};
use crate::xdm::{AtomicValue, Item, Sequence};

/// Node argument, or the context item for the zero-argument form. `None`
/// for an empty argument.
fn node_arg(ctx: &CallCtx<'_, '_>, args: &[Sequence], func: &str) -> Result<Option<NodeHandle>> {
    let item = match args.first() {
        Some(seq) => seq.first(),
        None => Some(ctx.context_item(func)?),
    };
    match item {
        None => Ok(None),
        Some(Item::Node(n)) => Ok(Some(n)),
        Some(Item::Atomic(a)) => Err(Error::type_error(format!("{func}: expected a node, got {}", a.type_name()))),
    }
}

fn node_name(ctx: &CallCtx<'_, '_>, args: &[Sequence], func: &str) -> Result<Option<QName>> {
    match node_arg(ctx, args, func)? {
        Some(n) => ctx.broker().node_name(&n),
        None => Ok(None),
    }
}

pub(super) fn name_fn(ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    let name = node_name(ctx, args, "name()")?;
    Ok(Sequence::string(name.map(|q| q.to_string()).unwrap_or_default()))
}

pub(super) fn local_name_fn(ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    let name = node_name(ctx, args, "local-name()")?;
    Ok(Sequence::string(name.map(|q| q.local.to_string()).unwrap_or_default()))
}

pub(super) fn namespace_uri_fn(ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    let name = node_name(ctx, args, "namespace-uri()")?;
    let uri = name.and_then(|q| q.ns_uri.map(|u| u.to_string())).unwrap_or_default();
    Ok(Sequence::atomic(AtomicValue::AnyUri(uri)))
}

pub(super) fn root_fn(ctx: &mut CallCtx<'_, '_>, args: &[Sequence]) -> Result<Sequence> {
    match node_arg(ctx, args, "root()")? {
        Some(n) => Ok(Sequence::singleton(Item::Node(ctx.broker().document_node(n.doc)?))),
        None => Ok(Sequence::empty()),
    }
}
