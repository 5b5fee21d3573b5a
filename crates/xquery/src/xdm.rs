//! Sequences, items and atomic values.

use core::fmt;

use crate::broker::Broker;
use crate::error::{Error, ErrorCode, Result};
use crate::model::{NodeCollection, NodeHandle, NodeKind};

#[derive(Debug, Clone, PartialEq)]
pub enum AtomicValue {
    Boolean(bool),
    String(String),
    UntypedAtomic(String),
    AnyUri(String),
    Integer(i64),
    /// Decimal kept as a double; precision beyond `f64` is not modelled.
    Decimal(f64),
    Double(f64),
    Float(f32),
}

impl AtomicValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            AtomicValue::Boolean(_) => "xs:boolean",
            AtomicValue::String(_) => "xs:string",
            AtomicValue::UntypedAtomic(_) => "xs:untypedAtomic",
            AtomicValue::AnyUri(_) => "xs:anyURI",
            AtomicValue::Integer(_) => "xs:integer",
            AtomicValue::Decimal(_) => "xs:decimal",
            AtomicValue::Double(_) => "xs:double",
            AtomicValue::Float(_) => "xs:float",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            AtomicValue::Integer(_) | AtomicValue::Decimal(_) | AtomicValue::Double(_) | AtomicValue::Float(_)
        )
    }

    pub fn is_untyped(&self) -> bool {
        matches!(self, AtomicValue::UntypedAtomic(_))
    }

    /// String, untypedAtomic and anyURI.
    pub fn is_string_like(&self) -> bool {
        matches!(self, AtomicValue::String(_) | AtomicValue::UntypedAtomic(_) | AtomicValue::AnyUri(_))
    }

    pub fn string_value(&self) -> String {
        match self {
            AtomicValue::Boolean(b) => b.to_string(),
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => s.clone(),
            AtomicValue::Integer(i) => i.to_string(),
            AtomicValue::Decimal(d) => format_decimal(*d),
            AtomicValue::Double(d) => format_double(*d),
            AtomicValue::Float(f) => format_double(f64::from(*f)),
        }
    }

    /// `fn:number` semantics: NaN for anything not convertible.
    #[allow(clippy::cast_precision_loss)]
    pub fn to_double(&self) -> f64 {
        match self {
            AtomicValue::Integer(i) => *i as f64,
            AtomicValue::Decimal(d) | AtomicValue::Double(d) => *d,
            AtomicValue::Float(f) => f64::from(*f),
            AtomicValue::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => parse_double(s).unwrap_or(f64::NAN),
        }
    }

    pub fn ebv(&self) -> Result<bool> {
        Ok(match self {
            AtomicValue::Boolean(b) => *b,
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) | AtomicValue::AnyUri(s) => !s.is_empty(),
            AtomicValue::Integer(i) => *i != 0,
            AtomicValue::Decimal(d) | AtomicValue::Double(d) => *d != 0.0 && !d.is_nan(),
            AtomicValue::Float(f) => *f != 0.0 && !f.is_nan(),
        })
    }
}

impl fmt::Display for AtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtomicValue::String(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            other => f.write_str(&other.string_value()),
        }
    }
}

/// Parses a double the way `xs:double` casting does (surrounding whitespace
/// allowed, `INF`, `-INF` and `NaN` literals).
pub fn parse_double(s: &str) -> Option<f64> {
    let t = s.trim();
    match t {
        "INF" | "+INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        "" => None,
        _ if t.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')) => t.parse().ok(),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
pub fn format_double(d: f64) -> String {
    if d.is_nan() {
        "NaN".to_string()
    } else if d.is_infinite() {
        if d > 0.0 { "INF".to_string() } else { "-INF".to_string() }
    } else if d == 0.0 {
        if d.is_sign_negative() { "-0".to_string() } else { "0".to_string() }
    } else if d.fract() == 0.0 && d.abs() < 1e15 {
        format!("{}", d as i64)
    } else {
        format!("{d}")
    }
}

fn format_decimal(d: f64) -> String {
    if d.fract() == 0.0 && d.is_finite() { format_double(d) } else { format!("{d}") }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Node(NodeHandle),
    Atomic(AtomicValue),
}

impl Item {
    pub fn is_node(&self) -> bool {
        matches!(self, Item::Node(_))
    }

    pub fn as_node(&self) -> Option<&NodeHandle> {
        match self {
            Item::Node(n) => Some(n),
            Item::Atomic(_) => None,
        }
    }

    pub fn string_value(&self, broker: &dyn Broker) -> Result<String> {
        match self {
            Item::Node(n) => broker.string_value(n),
            Item::Atomic(a) => Ok(a.string_value()),
        }
    }

    /// Typed value: untyped for stored nodes, string for comments and
    /// processing instructions.
    pub fn atomize(&self, broker: &dyn Broker) -> Result<AtomicValue> {
        match self {
            Item::Atomic(a) => Ok(a.clone()),
            Item::Node(n) => {
                let s = broker.string_value(n)?;
                Ok(match n.kind {
                    NodeKind::Comment | NodeKind::ProcessingInstruction => AtomicValue::String(s),
                    _ => AtomicValue::UntypedAtomic(s),
                })
            }
        }
    }
}

impl From<AtomicValue> for Item {
    fn from(a: AtomicValue) -> Self {
        Item::Atomic(a)
    }
}

impl From<NodeHandle> for Item {
    fn from(n: NodeHandle) -> Self {
        Item::Node(n)
    }
}

/// Result of evaluating an expression.
///
/// `Nodes` is always in document order without duplicates; `Items` keeps
/// whatever order the expression produced.
#[derive(Debug, Clone)]
pub enum Sequence {
    Nodes(NodeCollection),
    Items(Vec<Item>),
}

impl Default for Sequence {
    fn default() -> Self {
        Sequence::Items(Vec::new())
    }
}

impl Sequence {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn singleton(item: Item) -> Self {
        match item {
            Item::Node(n) => Sequence::Nodes(NodeCollection::singleton(n)),
            a @ Item::Atomic(_) => Sequence::Items(vec![a]),
        }
    }

    pub fn atomic(value: AtomicValue) -> Self {
        Sequence::Items(vec![Item::Atomic(value)])
    }

    pub fn boolean(b: bool) -> Self {
        Self::atomic(AtomicValue::Boolean(b))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::atomic(AtomicValue::String(s.into()))
    }

    pub fn integer(i: i64) -> Self {
        Self::atomic(AtomicValue::Integer(i))
    }

    pub fn double(d: f64) -> Self {
        Self::atomic(AtomicValue::Double(d))
    }

    /// Node-only item lists become a document-ordered node collection.
    pub fn from_items(items: Vec<Item>) -> Self {
        if !items.is_empty() && items.iter().all(Item::is_node) {
            return Sequence::Nodes(items.into_iter().filter_map(|i| match i {
                Item::Node(n) => Some(n),
                Item::Atomic(_) => None,
            }).collect());
        }
        Sequence::Items(items)
    }

    pub fn len(&self) -> usize {
        match self {
            Sequence::Nodes(c) => c.len(),
            Sequence::Items(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> SeqIter<'_> {
        match self {
            Sequence::Nodes(c) => SeqIter::Nodes(c.iter()),
            Sequence::Items(v) => SeqIter::Items(v.iter()),
        }
    }

    pub fn item_at(&self, index: usize) -> Option<Item> {
        match self {
            Sequence::Nodes(c) => c.get(index).cloned().map(Item::Node),
            Sequence::Items(v) => v.get(index).cloned(),
        }
    }

    pub fn first(&self) -> Option<Item> {
        self.item_at(0)
    }

    pub fn into_items(self) -> Vec<Item> {
        match self {
            Sequence::Nodes(c) => c.iter().cloned().map(Item::Node).collect(),
            Sequence::Items(v) => v,
        }
    }

    pub fn as_nodes(&self) -> Option<&NodeCollection> {
        match self {
            Sequence::Nodes(c) => Some(c),
            Sequence::Items(_) => None,
        }
    }

    /// True if every item is a node (the empty sequence qualifies).
    pub fn is_node_sequence(&self) -> bool {
        match self {
            Sequence::Nodes(_) => true,
            Sequence::Items(v) => v.iter().all(Item::is_node),
        }
    }

    /// Node collection view; atomic items are a type error.
    pub fn to_nodes(&self) -> Result<NodeCollection> {
        match self {
            Sequence::Nodes(c) => Ok(c.clone()),
            Sequence::Items(v) => {
                let mut nodes = Vec::with_capacity(v.len());
                for item in v {
                    match item {
                        Item::Node(n) => nodes.push(n.clone()),
                        Item::Atomic(a) => {
                            return Err(Error::from_code(
                                ErrorCode::XPTY0019,
                                format!("expected a node sequence, found {}", a.type_name()),
                            ));
                        }
                    }
                }
                Ok(NodeCollection::from_unsorted(nodes))
            }
        }
    }

    pub fn into_nodes(self) -> Result<NodeCollection> {
        match self {
            Sequence::Nodes(c) => Ok(c),
            other => other.to_nodes(),
        }
    }

    pub fn ebv(&self) -> Result<bool> {
        match self {
            Sequence::Nodes(c) => Ok(!c.is_empty()),
            Sequence::Items(v) => match v.as_slice() {
                [] => Ok(false),
                [Item::Node(_), ..] => Ok(true),
                [Item::Atomic(a)] => a.ebv(),
                [Item::Atomic(_), ..] => Err(Error::from_code(
                    ErrorCode::FORG0006,
                    "effective boolean value is not defined for a sequence of two or more atomic values",
                )),
            },
        }
    }

    pub fn atomize(&self, broker: &dyn Broker) -> Result<Vec<AtomicValue>> {
        self.iter().map(|i| i.atomize(broker)).collect()
    }
}

pub enum SeqIter<'a> {
    Nodes(std::slice::Iter<'a, NodeHandle>),
    Items(std::slice::Iter<'a, Item>),
}

impl Iterator for SeqIter<'_> {
    type Item = Item;

    fn next(&mut self) -> Option<Item> {
        match self {
            SeqIter::Nodes(it) => it.next().cloned().map(Item::Node),
            SeqIter::Items(it) => it.next().cloned(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            SeqIter::Nodes(it) => it.size_hint(),
            SeqIter::Items(it) => it.size_hint(),
        }
    }
}

impl From<NodeCollection> for Sequence {
    fn from(c: NodeCollection) -> Self {
        Sequence::Nodes(c)
    }
}
