mod common;

use common::*;
use rstest::rstest;
use xmldb_xquery::expr::{ComparisonExpr, CompOp, ContextItemExpr, FilterExpr, Literal, LocationStep, SequenceExpr, Truncation};
use xmldb_xquery::memstore::elem;
use xmldb_xquery::types::{Axis, NodeTest};
use xmldb_xquery::{AtomicValue, ErrorCode, ErrorKind, Expr, IndexCoverage, QueryConfig, StaticContext};

fn filter(base: Expr, inner: Expr) -> Expr {
    Expr::Filter(Box::new(FilterExpr::new(base, vec![pred(inner)])))
}

fn books_where(inner: Expr) -> Expr {
    let step = LocationStep::new(Axis::Descendant, NodeTest::Name(xmldb_xquery::QName::local("book"))).with_predicate(pred(inner));
    path(vec![root(), Expr::Step(step), attribute("id")])
}

fn eq(left: Expr, right: Expr) -> Expr {
    Expr::Comparison(Box::new(ComparisonExpr::general(left, CompOp::Eq, right)))
}

fn dot() -> Expr {
    Expr::ContextItem(ContextItemExpr::new())
}

fn untyped(v: &str) -> Expr {
    Expr::Literal(Literal::new(AtomicValue::UntypedAtomic(v.into())))
}

#[rstest]
#[case(2, vec!["b"])]
#[case(1, vec!["a"])]
#[case(0, vec![])]
#[case(4, vec![])]
fn numeric_predicate_selects_one_position(corpus: Corpus, #[case] pos: i64, #[case] expected: Vec<&str>) {
    let seq = Expr::Sequence(SequenceExpr::new(vec![s("a"), s("b"), s("c")]));
    let out = corpus.run(&filter(seq, i(pos))).unwrap();
    assert_eq!(corpus.strings(&out), expected);
}

#[rstest]
fn positions_count_per_context_node(corpus: Corpus) {
    let first_author = Expr::Step(step(Axis::Child, "author").with_predicate(pred(i(1))));
    let e = path(vec![root(), child("library"), child("book"), first_author]);
    let out = corpus.run(&e).unwrap();
    assert_eq!(corpus.strings(&out), vec!["Smith", "Jones", "Brown"]);
}

#[rstest]
fn position_function_in_boolean_mode(corpus: Corpus) {
    let second = eq(call("position", vec![]), i(2));
    let out = corpus.run(&books_where(second)).unwrap();
    assert_eq!(corpus.strings(&out), vec!["b2"]);
}

#[rstest]
#[case::value_index(IndexCoverage::FULL)]
#[case::node_by_node(IndexCoverage { index_by_default: true, include_alphanumeric: false })]
fn string_equality_filters_by_child(corpus: Corpus, #[case] coverage: IndexCoverage) {
    let books = corpus.store.document_named("books.xml").unwrap();
    corpus.store.set_coverage(books, coverage).unwrap();
    let out = corpus.run(&books_where(eq(child("title"), s("Query Processing")))).unwrap();
    assert_eq!(corpus.strings(&out), vec!["b2"]);
    let out = corpus.run(&books_where(eq(child("author"), s("Smith")))).unwrap();
    assert_eq!(corpus.strings(&out), vec!["b1", "b2"]);
}

#[rstest]
fn untyped_children_compare_as_numbers(corpus: Corpus) {
    let expensive = Expr::Comparison(Box::new(ComparisonExpr::general(child("price"), CompOp::Gt, i(20))));
    let out = corpus.run(&books_where(expensive)).unwrap();
    assert_eq!(corpus.strings(&out), vec!["b1", "b2"]);
}

#[rstest]
fn literal_on_the_left_is_swapped(corpus: Corpus) {
    let cheap = Expr::Comparison(Box::new(ComparisonExpr::general(i(20), CompOp::Gt, child("price"))));
    let out = corpus.run(&books_where(cheap)).unwrap();
    assert_eq!(corpus.strings(&out), vec!["b3"]);
}

#[rstest]
fn context_item_predicate(corpus: Corpus) {
    let e = filter(all("price"), Expr::Comparison(Box::new(ComparisonExpr::general(dot(), CompOp::Ge, i(30)))));
    let out = corpus.run(&e).unwrap();
    assert_eq!(corpus.strings(&out), vec!["30", "45"]);
}

#[rstest]
fn existence_predicate(corpus: Corpus) {
    let out = corpus.run(&filter(all("level1"), child("level2"))).unwrap();
    assert_eq!(corpus.strings(&out), vec!["termterm"]);
}

#[rstest]
fn nested_predicates(corpus: Corpus) {
    let jones = Expr::Step(step(Axis::Child, "author").with_predicate(pred(eq(dot(), s("Jones")))));
    let out = corpus.run(&books_where(jones)).unwrap();
    assert_eq!(corpus.strings(&out), vec!["b2"]);
}

#[rstest]
fn attribute_value_comparison(corpus: Corpus) {
    let newer = Expr::Comparison(Box::new(ComparisonExpr::value(attribute("id"), CompOp::Eq, s("b3"))));
    let out = corpus.run(&books_where(newer)).unwrap();
    assert_eq!(corpus.strings(&out), vec!["b3"]);
}

#[rstest]
fn truncated_match(corpus: Corpus) {
    let prefix = Expr::Comparison(Box::new(ComparisonExpr::truncated(child("title"), Truncation::Right, s("Full"))));
    let out = corpus.run(&books_where(prefix)).unwrap();
    assert_eq!(corpus.strings(&out), vec!["b3"]);
}

#[rstest]
fn untyped_against_number_coerces(corpus: Corpus) {
    let gt = |l, r| Expr::Comparison(Box::new(ComparisonExpr::general(l, CompOp::Gt, r)));
    let out = corpus.run(&gt(untyped("10"), i(9))).unwrap();
    assert_eq!(out.first(), Some(xmldb_xquery::Item::Atomic(AtomicValue::Boolean(true))));
    // Two untyped values compare as strings.
    let out = corpus.run(&gt(untyped("10"), untyped("9"))).unwrap();
    assert_eq!(out.first(), Some(xmldb_xquery::Item::Atomic(AtomicValue::Boolean(false))));
}

#[rstest]
fn backwards_compatible_mode_compares_as_doubles(corpus: Corpus) {
    let e = eq(i(1), s("1"));
    let err = corpus.run(&e).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPTY0004);

    let config = QueryConfig::builder().with_backwards_compatible(true).build();
    let mut sctx = StaticContext::new(config);
    let out = corpus.run_with(&e, &mut sctx).unwrap();
    assert_eq!(out.first(), Some(xmldb_xquery::Item::Atomic(AtomicValue::Boolean(true))));
}

#[rstest]
fn value_comparison_requires_single_items(corpus: Corpus) {
    let many = Expr::Sequence(SequenceExpr::new(vec![i(1), i(2)]));
    let e = Expr::Comparison(Box::new(ComparisonExpr::value(many, CompOp::Eq, i(1))));
    let err = corpus.run(&e).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPTY0004);
    assert_eq!(err.kind, ErrorKind::Cardinality);

    let none = Expr::Comparison(Box::new(ComparisonExpr::value(Expr::Sequence(SequenceExpr::new(vec![])), CompOp::Eq, i(1))));
    assert!(corpus.run(&none).unwrap().is_empty());
}

/// Pairs whose `a` and `b` attributes agree only on `p3`.
fn add_pairs(corpus: &Corpus) {
    corpus.store.add_document(
        "pairs.xml",
        elem("pairs")
            .child(elem("pair").attr("id", "p1").attr("a", "1").attr("b", "2"))
            .child(elem("pair").attr("id", "p2").attr("a", "2").attr("b", "1"))
            .child(elem("pair").attr("id", "p3").attr("a", "3").attr("b", "3")),
    );
}

fn pairs_where(inner: Expr) -> Expr {
    let step = LocationStep::new(Axis::Descendant, NodeTest::Name(xmldb_xquery::QName::local("pair"))).with_predicate(pred(inner));
    path(vec![root(), Expr::Step(step), attribute("id")])
}

#[rstest]
#[case::equal(CompOp::Eq, vec!["p3"])]
#[case::not_equal(CompOp::Ne, vec!["p1", "p2"])]
#[case::less(CompOp::Lt, vec!["p1"])]
fn both_operands_relative_to_each_context_node(corpus: Corpus, #[case] op: CompOp, #[case] expected: Vec<&str>) {
    add_pairs(&corpus);
    let cmp = Expr::Comparison(Box::new(ComparisonExpr::general(attribute("a"), op, attribute("b"))));
    let out = corpus.run(&pairs_where(cmp)).unwrap();
    assert_eq!(corpus.strings(&out), expected);
}

#[rstest]
fn right_operand_path_is_relative_to_each_context_node(corpus: Corpus) {
    let later = path(vec![Expr::Step(step(Axis::FollowingSibling, "book")), child("author")]);
    let shared = Expr::Comparison(Box::new(ComparisonExpr::general(child("author"), CompOp::Eq, later)));
    assert_eq!(corpus.strings(&corpus.run(&books_where(shared)).unwrap()), vec!["b1"]);

    let own = Expr::Comparison(Box::new(ComparisonExpr::general(child("author"), CompOp::Eq, path(vec![dot(), child("author")]))));
    assert_eq!(corpus.strings(&corpus.run(&books_where(own)).unwrap()), vec!["b1", "b2", "b3"]);
}

#[rstest]
#[case::value_index(IndexCoverage::FULL)]
#[case::node_by_node(IndexCoverage { index_by_default: true, include_alphanumeric: false })]
fn truncated_match_spans_line_breaks(corpus: Corpus, #[case] coverage: IndexCoverage) {
    let notes = corpus.store.add_document("notes.xml", elem("notes").child(elem("r").child(elem("t").text("ab\ncd"))));
    corpus.store.set_coverage(notes, coverage).unwrap();
    let prefix = Expr::Comparison(Box::new(ComparisonExpr::truncated(child("t"), Truncation::Right, s("ab"))));
    let step = LocationStep::new(Axis::Descendant, NodeTest::Name(xmldb_xquery::QName::local("r"))).with_predicate(pred(prefix));
    let out = corpus.run(&path(vec![root(), Expr::Step(step)])).unwrap();
    assert_eq!(out.len(), 1);
}
