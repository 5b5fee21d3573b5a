mod common;

use common::*;
use rstest::rstest;
use xmldb_xquery::expr::{ConstructorExpr, ConstructorKind, FilterExpr, SequenceExpr};
use xmldb_xquery::{Broker, ErrorCode, Expr, NodeKind, QName};

fn element(name: &str, content: Vec<Expr>) -> Expr {
    Expr::Constructor(Box::new(ConstructorExpr::element(QName::local(name), content)))
}

fn attr(name: &str, value: Expr) -> Expr {
    Expr::Constructor(Box::new(ConstructorExpr::attribute(QName::local(name), value)))
}

fn node(kind: ConstructorKind, content: Vec<Expr>) -> Expr {
    Expr::Constructor(Box::new(ConstructorExpr::new(kind, content)))
}

#[rstest]
fn element_with_attribute_and_content(corpus: Corpus) {
    let e = element("entry", vec![attr("id", s("x1")), s("hello")]);
    let out = corpus.run(&e).unwrap();
    assert_eq!(corpus.names(&out), vec!["entry"]);
    assert_eq!(corpus.strings(&out), vec!["hello"]);

    let id = corpus.run(&path(vec![e, attribute("id")])).unwrap();
    assert_eq!(corpus.strings(&id), vec!["x1"]);
}

#[rstest]
fn adjacent_atomics_are_joined_by_a_space(corpus: Corpus) {
    let e = element("p", vec![s("a"), i(1), element("br", vec![]), s("c")]);
    let out = corpus.run(&e).unwrap();
    assert_eq!(corpus.strings(&out), vec!["a 1c"]);
    let children = corpus.run(&path(vec![e, Expr::Step(step(xmldb_xquery::types::Axis::Child, "br"))])).unwrap();
    assert_eq!(children.len(), 1);
}

#[rstest]
fn stored_nodes_are_copied_deeply(corpus: Corpus) {
    let first_book = Expr::Filter(Box::new(FilterExpr::new(all("book"), vec![pred(i(1))])));
    let wrapped = element("shelf", vec![first_book]);
    let titles = corpus.run(&path(vec![wrapped, child("book"), child("title")])).unwrap();
    assert_eq!(corpus.strings(&titles), vec!["Native XML Databases"]);

    let copy = titles.first().unwrap().as_node().unwrap().clone();
    let stored = corpus.run(&all("title")).unwrap();
    assert!(stored.iter().all(|t| t.as_node().unwrap().doc != copy.doc));
}

#[rstest]
fn copied_attributes_keep_their_values(corpus: Corpus) {
    let years = path(vec![all("book"), attribute("year")]);
    let e = element("years", vec![Expr::Filter(Box::new(FilterExpr::new(years, vec![pred(i(2))])))]);
    let out = corpus.run(&path(vec![e, attribute("year")])).unwrap();
    assert_eq!(corpus.strings(&out), vec!["2005"]);
}

#[rstest]
#[case::text(ConstructorKind::Text, NodeKind::Text, "x 1")]
#[case::comment(ConstructorKind::Comment, NodeKind::Comment, "x 1")]
#[case::pi(ConstructorKind::ProcessingInstruction("app".into()), NodeKind::ProcessingInstruction, "x 1")]
fn leaf_constructors(corpus: Corpus, #[case] kind: ConstructorKind, #[case] expected: NodeKind, #[case] value: &str) {
    let out = corpus.run(&node(kind, vec![s("x"), i(1)])).unwrap();
    let n = out.first().unwrap().as_node().unwrap().clone();
    assert_eq!(n.kind, expected);
    assert_eq!(corpus.store.string_value(&n).unwrap(), value);
}

#[rstest]
fn empty_text_constructor_yields_nothing(corpus: Corpus) {
    let out = corpus.run(&node(ConstructorKind::Text, vec![Expr::Sequence(SequenceExpr::new(vec![]))])).unwrap();
    assert!(out.is_empty());
}

#[rstest]
fn top_level_text_nodes_stay_separate(corpus: Corpus) {
    let both = Expr::Sequence(SequenceExpr::new(vec![
        node(ConstructorKind::Text, vec![s("a")]),
        node(ConstructorKind::Text, vec![s("b")]),
    ]));
    let out = corpus.run(&both).unwrap();
    assert_eq!(corpus.strings(&out), vec!["a", "b"]);
}

#[rstest]
fn duplicate_attribute_is_rejected(corpus: Corpus) {
    let e = element("e", vec![attr("a", s("1")), attr("a", s("2"))]);
    let err = corpus.run(&e).unwrap_err();
    assert_eq!(err.code, ErrorCode::XQDY0025);
}

#[rstest]
fn constructed_nodes_are_not_stored_documents(corpus: Corpus) {
    let before = corpus.store.documents();
    corpus.run(&element("scratch", vec![s("tmp")])).unwrap();
    assert_eq!(corpus.store.documents(), before);
    assert!(corpus.run(&all("scratch")).unwrap().is_empty());
}
