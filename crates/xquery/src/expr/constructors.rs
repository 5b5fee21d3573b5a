//! Computed and direct node constructors.
//!
//! Content is evaluated before anything is written, then copied into the
//! query's document builder. Nodes in the content are copied deeply, so the
//! constructed tree never shares nodes with its input.

use core::fmt;

use tracing::trace;

use super::{Expr, Expression, write_list};
use crate::broker::{Broker, DocumentBuilder};
use crate::error::{Error, Result};
use crate::eval::EvalContext;
use crate::model::{NodeHandle, NodeKind, QName};
use crate::types::{Dependencies, StaticType};
use crate::xdm::{Item, Sequence};

/// What a constructor builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstructorKind {
    Element(QName),
    Attribute(QName),
    Text,
    Comment,
    ProcessingInstruction(String),
}

pub struct ConstructorExpr {
    kind: ConstructorKind,
    content: Vec<Expr>,
}

impl ConstructorExpr {
    pub fn new(kind: ConstructorKind, content: Vec<Expr>) -> Self {
        Self { kind, content }
    }

    pub fn element(name: QName, content: Vec<Expr>) -> Self {
        Self::new(ConstructorKind::Element(name), content)
    }

    pub fn attribute(name: QName, value: Expr) -> Self {
        Self::new(ConstructorKind::Attribute(name), vec![value])
    }

    pub fn kind(&self) -> &ConstructorKind {
        &self.kind
    }

    fn content_items(&self, ctx: &mut EvalContext<'_>, context_seq: Option<&Sequence>, context_item: Option<&Item>) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        for e in &self.content {
            items.extend(e.eval(ctx, context_seq, context_item)?.iter());
        }
        Ok(items)
    }

    /// String value of the content: atomized items joined by a space.
    fn content_text(&self, ctx: &mut EvalContext<'_>, context_seq: Option<&Sequence>, context_item: Option<&Item>) -> Result<Option<String>> {
        let items = self.content_items(ctx, context_seq, context_item)?;
        if items.is_empty() {
            return Ok(None);
        }
        let parts = items
            .iter()
            .map(|i| i.atomize(ctx.broker).map(|v| v.string_value()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(parts.join(" ")))
    }
}

fn required_name(broker: &dyn Broker, node: &NodeHandle) -> Result<QName> {
    broker
        .node_name(node)?
        .ok_or_else(|| Error::storage(format!("{} {node} has no name", node.kind.as_str())))
}

/// Writes a deep copy of `node` at the builder's current position.
fn copy_node(b: &mut dyn DocumentBuilder, broker: &dyn Broker, node: &NodeHandle) -> Result<()> {
    match node.kind {
        NodeKind::Document => {
            for child in broker.children(node)? {
                copy_node(b, broker, &child)?;
            }
        }
        NodeKind::Element => {
            b.start_element(&required_name(broker, node)?)?;
            for attr in broker.attributes(node)? {
                copy_node(b, broker, &attr)?;
            }
            for child in broker.children(node)? {
                copy_node(b, broker, &child)?;
            }
            b.end_element()?;
        }
        NodeKind::Attribute => {
            b.attribute(&required_name(broker, node)?, &broker.string_value(node)?)?;
        }
        NodeKind::Text => {
            let text = broker.string_value(node)?;
            if !text.is_empty() {
                b.characters(&text)?;
            }
        }
        NodeKind::Comment => {
            b.comment(&broker.string_value(node)?)?;
        }
        NodeKind::ProcessingInstruction => {
            let target = required_name(broker, node)?;
            b.processing_instruction(&target.local, &broker.string_value(node)?)?;
        }
    }
    Ok(())
}

/// Writes element content. Runs of adjacent atomic values become one text
/// node with the values separated by spaces.
fn write_content(b: &mut dyn DocumentBuilder, broker: &dyn Broker, items: &[Item]) -> Result<()> {
    let mut run: Vec<String> = Vec::new();
    for item in items {
        match item {
            Item::Atomic(a) => run.push(a.string_value()),
            Item::Node(n) => {
                if !run.is_empty() {
                    b.characters(&run.join(" "))?;
                    run.clear();
                }
                copy_node(b, broker, n)?;
            }
        }
    }
    if !run.is_empty() {
        b.characters(&run.join(" "))?;
    }
    Ok(())
}

impl Expression for ConstructorExpr {
    fn eval(&self, ctx: &mut EvalContext<'_>, context_seq: Option<&Sequence>, context_item: Option<&Item>) -> Result<Sequence> {
        let broker = ctx.broker;
        let node = match &self.kind {
            ConstructorKind::Element(name) => {
                let items = self.content_items(ctx, context_seq, context_item)?;
                let b = ctx.sctx.document_builder(broker)?;
                let el = b.start_element(name)?;
                write_content(b, broker, &items)?;
                b.end_element()?;
                el
            }
            ConstructorKind::Attribute(name) => {
                let value = self.content_text(ctx, context_seq, context_item)?.unwrap_or_default();
                ctx.sctx.document_builder(broker)?.attribute(name, &value)?
            }
            ConstructorKind::Text => {
                let Some(text) = self.content_text(ctx, context_seq, context_item)? else {
                    return Ok(Sequence::empty());
                };
                ctx.sctx.document_builder(broker)?.characters(&text)?
            }
            ConstructorKind::Comment => {
                let text = self.content_text(ctx, context_seq, context_item)?.unwrap_or_default();
                ctx.sctx.document_builder(broker)?.comment(&text)?
            }
            ConstructorKind::ProcessingInstruction(target) => {
                let data = self.content_text(ctx, context_seq, context_item)?.unwrap_or_default();
                ctx.sctx.document_builder(broker)?.processing_instruction(target, data.trim_start())?
            }
        };
        trace!(node = %node, kind = node.kind.as_str(), "constructed node");
        Ok(Sequence::singleton(Item::Node(node)))
    }

    fn returns_type(&self) -> StaticType {
        StaticType::Node
    }

    fn dependencies(&self) -> Dependencies {
        self.content.iter().fold(Dependencies::NONE, |d, e| d | e.dependencies())
    }

    fn reset_state(&self, ctx: &mut EvalContext<'_>) {
        for e in &self.content {
            e.reset_state(ctx);
        }
    }
}

impl fmt::Display for ConstructorExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConstructorKind::Element(name) => write!(f, "element {name} {{ ")?,
            ConstructorKind::Attribute(name) => write!(f, "attribute {name} {{ ")?,
            ConstructorKind::Text => f.write_str("text { ")?,
            ConstructorKind::Comment => f.write_str("comment { ")?,
            ConstructorKind::ProcessingInstruction(target) => write!(f, "processing-instruction {target} {{ ")?,
        }
        write_list(f, &self.content, ", ")?;
        f.write_str(" }")
    }
}
