//! Expression evaluation for a native XML database.
//!
//! Compiled query expressions are evaluated set-at-a-time over
//! [`NodeCollection`]s: location steps are answered from the structural
//! index and joined against their context, predicates filter whole
//! collections by following context chains, and comparisons and full-text
//! operators fall back to the value and full-text indexes where they can.
//! Storage is reached only through the [`Broker`] trait; [`memstore`]
//! provides an in-memory implementation.

pub mod broker;
pub mod config;
pub mod consts;
pub mod context;
pub mod error;
pub mod eval;
pub mod expr;
pub mod fulltext;
pub mod functions;
pub mod memstore;
pub mod model;
pub mod types;
pub mod xdm;

use tracing::debug;

pub use broker::{Broker, DocumentBuilder, IndexCoverage};
pub use config::{QueryConfig, QueryConfigBuilder};
pub use context::{StaticContext, StaticContextBuilder};
pub use error::{Error, ErrorCode, ErrorKind, Result};
pub use eval::EvalContext;
pub use expr::{Expr, Expression};
pub use model::{DocId, DocumentSet, NodeCollection, NodeHandle, NodeKind, QName};
pub use xdm::{AtomicValue, Item, Sequence};

/// Evaluates `expr` against `docs`.
///
/// The document set is first narrowed by [`Expression::preselect`]; the
/// expression then runs with no context item, so rooted paths start at the
/// document nodes of the narrowed set. Function bodies see the whole of
/// `docs`.
pub fn evaluate(expr: &Expr, broker: &dyn Broker, static_ctx: &mut StaticContext, docs: &DocumentSet) -> Result<Sequence> {
    let narrowed = expr.preselect(broker, docs)?;
    debug!(expr = %expr, documents = docs.len(), preselected = narrowed.len(), "evaluating");
    let mut ctx = EvalContext::new(broker, static_ctx, docs.clone()).narrowed_to(narrowed);
    expr.eval(&mut ctx, None, None)
}
