#![allow(dead_code)]

use rstest::fixture;
use xmldb_xquery::consts::{FNS, TEXT_NS};
use xmldb_xquery::expr::{Literal, LocationStep, PathExpr, Predicate, RootExpr, VarRef};
use xmldb_xquery::functions::BuiltinCall;
use xmldb_xquery::memstore::{MemoryStore, elem, text};
use xmldb_xquery::types::{Axis, NodeTest};
use xmldb_xquery::{Broker, DocumentSet, Expr, QName, Result, Sequence, StaticContext, evaluate};

pub struct Corpus {
    pub store: MemoryStore,
}

impl Corpus {
    pub fn docs(&self) -> DocumentSet {
        self.store.documents()
    }

    pub fn doc(&self, name: &str) -> DocumentSet {
        self.store.document_named(name).into_iter().collect()
    }

    pub fn run(&self, expr: &Expr) -> Result<Sequence> {
        let mut sctx = StaticContext::default();
        evaluate(expr, &self.store, &mut sctx, &self.docs())
    }

    pub fn run_with(&self, expr: &Expr, sctx: &mut StaticContext) -> Result<Sequence> {
        evaluate(expr, &self.store, sctx, &self.docs())
    }

    /// String values of the result items, in result order.
    pub fn strings(&self, seq: &Sequence) -> Vec<String> {
        seq.iter().map(|i| i.string_value(&self.store).unwrap()).collect()
    }

    /// Local names of the result nodes.
    pub fn names(&self, seq: &Sequence) -> Vec<String> {
        seq.iter()
            .map(|i| {
                let n = i.as_node().expect("node item").clone();
                self.store.node_name(&n).unwrap().map(|q| q.local.to_string()).unwrap_or_default()
            })
            .collect()
    }
}

/// Books, a play, a match-count sample and two short articles for keyword
/// tests.
#[fixture]
pub fn corpus() -> Corpus {
    let store = MemoryStore::new();
    store.add_document(
        "books.xml",
        elem("library")
            .child(
                elem("book")
                    .attr("id", "b1")
                    .attr("year", "1999")
                    .child(elem("title").text("Native XML Databases"))
                    .child(elem("author").text("Smith"))
                    .child(elem("price").text("30")),
            )
            .child(
                elem("book")
                    .attr("id", "b2")
                    .attr("year", "2005")
                    .child(elem("title").text("Query Processing"))
                    .child(elem("author").text("Jones"))
                    .child(elem("author").text("Smith"))
                    .child(elem("price").text("45")),
            )
            .child(
                elem("book")
                    .attr("id", "b3")
                    .attr("year", "2011")
                    .child(elem("title").text("Full Text Search"))
                    .child(elem("author").text("Brown"))
                    .child(elem("price").text("10")),
            ),
    );
    store.add_document(
        "play.xml",
        elem("play").child(
            elem("act").attr("n", "1").child(
                elem("scene")
                    .child(
                        elem("speech")
                            .child(elem("speaker").text("Hamlet"))
                            .child(elem("line").text("to be or not to be")),
                    )
                    .child(
                        elem("speech")
                            .child(elem("speaker").text("Horatio"))
                            .child(elem("line").text("a native xml database system")),
                    ),
            ),
        ),
    );
    store.add_document(
        "match.xml",
        elem("doc")
            .child(text(" term term "))
            .child(elem("level1").text("term term"))
            .child(elem("level1").text("term").child(elem("level2").text("term"))),
    );
    store.add_document("ft1.xml", elem("article").child(elem("para").text("alpha beta")));
    store.add_document("ft2.xml", elem("article").child(elem("para").text("alpha gamma")));
    Corpus { store }
}

pub fn step(axis: Axis, name: &str) -> LocationStep {
    LocationStep::new(axis, NodeTest::Name(QName::local(name)))
}

pub fn child(name: &str) -> Expr {
    Expr::Step(step(Axis::Child, name))
}

pub fn descendant(name: &str) -> Expr {
    Expr::Step(step(Axis::Descendant, name))
}

pub fn attribute(name: &str) -> Expr {
    Expr::Step(LocationStep::new(Axis::Attribute, NodeTest::Name(QName::local(name))))
}

pub fn root() -> Expr {
    Expr::Root(RootExpr::new())
}

/// `//name`
pub fn all(name: &str) -> Expr {
    path(vec![root(), descendant(name)])
}

pub fn path(parts: Vec<Expr>) -> Expr {
    Expr::Path(PathExpr::new(parts))
}

pub fn pred(inner: Expr) -> Predicate {
    Predicate::new(inner)
}

pub fn s(v: &str) -> Expr {
    Expr::Literal(Literal::string(v))
}

pub fn i(v: i64) -> Expr {
    Expr::Literal(Literal::integer(v))
}

pub fn var(name: &str) -> Expr {
    Expr::VarRef(VarRef::new(QName::local(name)))
}

pub fn call(name: &str, args: Vec<Expr>) -> Expr {
    Expr::Builtin(BuiltinCall::new(&QName::new(Some(FNS), name), args).unwrap())
}

pub fn match_count(arg: Expr) -> Expr {
    Expr::Builtin(BuiltinCall::new(&QName::new(Some(TEXT_NS), "match-count"), vec![arg]).unwrap())
}
