//! Static type tags, sequence types, axes and node tests.

use core::fmt;
use std::ops::{BitAnd, BitOr};

use string_cache::DefaultAtom;

use crate::broker::Broker;
use crate::error::Result;
use crate::model::{NodeHandle, NodeKind, QName};
use crate::xdm::{AtomicValue, Item, Sequence};

/// Coarse static result type used to pick evaluation strategies without
/// evaluating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaticType {
    Node,
    Boolean,
    Number,
    String,
    Atomic,
    Item,
    Empty,
}

impl StaticType {
    pub fn is_node(self) -> bool {
        self == StaticType::Node
    }

    pub fn is_atomic(self) -> bool {
        matches!(self, StaticType::Boolean | StaticType::Number | StaticType::String | StaticType::Atomic)
    }

    /// Least common type of two branches.
    pub fn union(self, other: StaticType) -> StaticType {
        match (self, other) {
            (a, b) if a == b => a,
            (StaticType::Empty, x) | (x, StaticType::Empty) => x,
            (a, b) if a.is_atomic() && b.is_atomic() => StaticType::Atomic,
            _ => StaticType::Item,
        }
    }
}

impl fmt::Display for StaticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StaticType::Node => "node()",
            StaticType::Boolean => "xs:boolean",
            StaticType::Number => "numeric",
            StaticType::String => "xs:string",
            StaticType::Atomic => "xs:anyAtomicType",
            StaticType::Item => "item()",
            StaticType::Empty => "empty-sequence()",
        })
    }
}

/// What parts of the dynamic context an expression reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Dependencies(u8);

impl Dependencies {
    pub const NONE: Dependencies = Dependencies(0);
    pub const CONTEXT_SET: Dependencies = Dependencies(1);
    pub const CONTEXT_ITEM: Dependencies = Dependencies(1 << 1);
    pub const CONTEXT_POSITION: Dependencies = Dependencies(1 << 2);
    pub const CONTEXT_SIZE: Dependencies = Dependencies(1 << 3);
    pub const LOCAL_VARS: Dependencies = Dependencies(1 << 4);

    pub fn contains(self, other: Dependencies) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Dependencies) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub fn without(self, other: Dependencies) -> Dependencies {
        Dependencies(self.0 & !other.0)
    }

    pub fn depends_on_item(self) -> bool {
        self.intersects(Dependencies::CONTEXT_ITEM)
    }
}

impl BitAnd for Dependencies {
    type Output = Dependencies;

    fn bitand(self, rhs: Dependencies) -> Dependencies {
        Dependencies(self.0 & rhs.0)
    }
}

impl BitOr for Dependencies {
    type Output = Dependencies;

    fn bitor(self, rhs: Dependencies) -> Dependencies {
        Dependencies(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occurrence {
    One,
    ZeroOrOne,
    ZeroOrMore,
    OneOrMore,
}

impl Occurrence {
    pub fn allows(self, count: usize) -> bool {
        match self {
            Occurrence::One => count == 1,
            Occurrence::ZeroOrOne => count <= 1,
            Occurrence::ZeroOrMore => true,
            Occurrence::OneOrMore => count >= 1,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Occurrence::One => "",
            Occurrence::ZeroOrOne => "?",
            Occurrence::ZeroOrMore => "*",
            Occurrence::OneOrMore => "+",
        }
    }
}

/// Item type of a declared sequence type.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemType {
    AnyItem,
    AnyNode,
    Kind(NodeTest),
    AnyAtomic,
    Boolean,
    String,
    UntypedAtomic,
    AnyUri,
    Numeric,
    Integer,
    Decimal,
    Double,
    Float,
}

impl ItemType {
    pub fn matches(&self, item: &Item, broker: &dyn Broker) -> Result<bool> {
        Ok(match (self, item) {
            (ItemType::AnyItem, _) => true,
            (ItemType::AnyNode, Item::Node(_)) => true,
            (ItemType::Kind(test), Item::Node(n)) => test.matches(n, broker, NodeKind::Element)?,
            (_, Item::Node(_)) => false,
            (ItemType::AnyNode | ItemType::Kind(_), Item::Atomic(_)) => false,
            (t, Item::Atomic(a)) => t.matches_atomic(a),
        })
    }

    pub fn matches_atomic(&self, a: &AtomicValue) -> bool {
        use AtomicValue as V;
        match self {
            ItemType::AnyItem | ItemType::AnyAtomic => true,
            ItemType::Boolean => matches!(a, V::Boolean(_)),
            ItemType::String => matches!(a, V::String(_)),
            ItemType::UntypedAtomic => matches!(a, V::UntypedAtomic(_)),
            ItemType::AnyUri => matches!(a, V::AnyUri(_)),
            ItemType::Numeric => a.is_numeric(),
            ItemType::Integer => matches!(a, V::Integer(_)),
            ItemType::Decimal => matches!(a, V::Integer(_) | V::Decimal(_)),
            ItemType::Double => matches!(a, V::Double(_)),
            ItemType::Float => matches!(a, V::Float(_)),
            ItemType::AnyNode | ItemType::Kind(_) => false,
        }
    }

    /// Atomic item types whose values can be produced by casting.
    pub fn is_atomic(&self) -> bool {
        !matches!(self, ItemType::AnyItem | ItemType::AnyNode | ItemType::Kind(_))
    }

    pub fn static_type(&self) -> StaticType {
        match self {
            ItemType::AnyItem => StaticType::Item,
            ItemType::AnyNode | ItemType::Kind(_) => StaticType::Node,
            ItemType::Boolean => StaticType::Boolean,
            ItemType::String => StaticType::String,
            ItemType::Numeric | ItemType::Integer | ItemType::Decimal | ItemType::Double | ItemType::Float => StaticType::Number,
            ItemType::AnyAtomic | ItemType::UntypedAtomic | ItemType::AnyUri => StaticType::Atomic,
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemType::AnyItem => f.write_str("item()"),
            ItemType::AnyNode => f.write_str("node()"),
            ItemType::Kind(t) => write!(f, "{t}"),
            ItemType::AnyAtomic => f.write_str("xs:anyAtomicType"),
            ItemType::Boolean => f.write_str("xs:boolean"),
            ItemType::String => f.write_str("xs:string"),
            ItemType::UntypedAtomic => f.write_str("xs:untypedAtomic"),
            ItemType::AnyUri => f.write_str("xs:anyURI"),
            ItemType::Numeric => f.write_str("xs:numeric"),
            ItemType::Integer => f.write_str("xs:integer"),
            ItemType::Decimal => f.write_str("xs:decimal"),
            ItemType::Double => f.write_str("xs:double"),
            ItemType::Float => f.write_str("xs:float"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SequenceType {
    Empty,
    Typed { item: ItemType, occ: Occurrence },
}

impl SequenceType {
    pub fn new(item: ItemType, occ: Occurrence) -> Self {
        SequenceType::Typed { item, occ }
    }

    pub fn any() -> Self {
        SequenceType::Typed { item: ItemType::AnyItem, occ: Occurrence::ZeroOrMore }
    }

    pub fn occurrence(&self) -> Occurrence {
        match self {
            SequenceType::Empty => Occurrence::ZeroOrOne,
            SequenceType::Typed { occ, .. } => *occ,
        }
    }

    /// Checks cardinality and the type of every item.
    pub fn matches(&self, seq: &Sequence, broker: &dyn Broker) -> Result<bool> {
        match self {
            SequenceType::Empty => Ok(seq.is_empty()),
            SequenceType::Typed { item, occ } => {
                if !occ.allows(seq.len()) {
                    return Ok(false);
                }
                for it in seq.iter() {
                    if !item.matches(&it, broker)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    pub fn static_type(&self) -> StaticType {
        match self {
            SequenceType::Empty => StaticType::Empty,
            SequenceType::Typed { item, .. } => item.static_type(),
        }
    }
}

impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceType::Empty => f.write_str("empty-sequence()"),
            SequenceType::Typed { item, occ } => write!(f, "{item}{}", occ.suffix()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Attribute,
    DescendantAttribute,
    SelfAxis,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
}

impl Axis {
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Parent | Axis::Ancestor | Axis::AncestorOrSelf | Axis::PrecedingSibling | Axis::Preceding
        )
    }

    /// Kind selected by a plain name test on this axis.
    pub fn principal_kind(self) -> NodeKind {
        match self {
            Axis::Attribute | Axis::DescendantAttribute => NodeKind::Attribute,
            _ => NodeKind::Element,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Axis::Child => "child",
            Axis::Descendant => "descendant",
            Axis::DescendantOrSelf => "descendant-or-self",
            Axis::Attribute => "attribute",
            Axis::DescendantAttribute => "descendant-attribute",
            Axis::SelfAxis => "self",
            Axis::Parent => "parent",
            Axis::Ancestor => "ancestor",
            Axis::AncestorOrSelf => "ancestor-or-self",
            Axis::FollowingSibling => "following-sibling",
            Axis::PrecedingSibling => "preceding-sibling",
            Axis::Following => "following",
            Axis::Preceding => "preceding",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    /// Principal node kind with the given name.
    Name(QName),
    /// `*`
    Wildcard,
    /// `prefix:*`
    NsWildcard(DefaultAtom),
    /// `*:local`
    LocalWildcard(DefaultAtom),
    /// `node()`
    AnyKind,
    Text,
    Comment,
    ProcessingInstruction(Option<String>),
    Document,
    Element(Option<QName>),
    Attribute(Option<QName>),
}

impl NodeTest {
    /// Name usable for an index lookup together with the kind it applies to.
    pub fn concrete_name(&self, principal: NodeKind) -> Option<(NodeKind, &QName)> {
        match self {
            NodeTest::Name(q) => Some((principal, q)),
            NodeTest::Element(Some(q)) => Some((NodeKind::Element, q)),
            NodeTest::Attribute(Some(q)) => Some((NodeKind::Attribute, q)),
            _ => None,
        }
    }

    pub fn matches(&self, node: &NodeHandle, broker: &dyn Broker, principal: NodeKind) -> Result<bool> {
        let kind = node.kind;
        Ok(match self {
            NodeTest::AnyKind => true,
            NodeTest::Text => kind == NodeKind::Text,
            NodeTest::Comment => kind == NodeKind::Comment,
            NodeTest::Document => kind == NodeKind::Document,
            NodeTest::Wildcard => kind == principal,
            NodeTest::Element(None) => kind == NodeKind::Element,
            NodeTest::Attribute(None) => kind == NodeKind::Attribute,
            NodeTest::ProcessingInstruction(target) => {
                kind == NodeKind::ProcessingInstruction
                    && match target {
                        None => true,
                        Some(t) => broker.node_name(node)?.is_some_and(|q| &*q.local == t.as_str()),
                    }
            }
            NodeTest::Name(q) => kind == principal && broker.node_name(node)?.as_ref() == Some(q),
            NodeTest::Element(Some(q)) => kind == NodeKind::Element && broker.node_name(node)?.as_ref() == Some(q),
            NodeTest::Attribute(Some(q)) => kind == NodeKind::Attribute && broker.node_name(node)?.as_ref() == Some(q),
            NodeTest::NsWildcard(ns) => {
                kind == principal && broker.node_name(node)?.is_some_and(|q| q.ns_uri.as_ref() == Some(ns))
            }
            NodeTest::LocalWildcard(local) => kind == principal && broker.node_name(node)?.is_some_and(|q| &q.local == local),
        })
    }
}

impl fmt::Display for NodeTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeTest::Name(q) => write!(f, "{q}"),
            NodeTest::Wildcard => f.write_str("*"),
            NodeTest::NsWildcard(ns) => write!(f, "Q{{{ns}}}*"),
            NodeTest::LocalWildcard(l) => write!(f, "*:{l}"),
            NodeTest::AnyKind => f.write_str("node()"),
            NodeTest::Text => f.write_str("text()"),
            NodeTest::Comment => f.write_str("comment()"),
            NodeTest::ProcessingInstruction(None) => f.write_str("processing-instruction()"),
            NodeTest::ProcessingInstruction(Some(t)) => write!(f, "processing-instruction({t})"),
            NodeTest::Document => f.write_str("document-node()"),
            NodeTest::Element(None) => f.write_str("element()"),
            NodeTest::Element(Some(q)) => write!(f, "element({q})"),
            NodeTest::Attribute(None) => f.write_str("attribute()"),
            NodeTest::Attribute(Some(q)) => write!(f, "attribute({q})"),
        }
    }
}
