mod common;

use common::*;
use rstest::rstest;
use xmldb_xquery::expr::{
    BindingClause, ComparisonExpr, CompOp, ForExpr, LetExpr, OrderSpec, QuantifiedExpr, Quantifier, SequenceExpr,
};
use xmldb_xquery::types::Axis;
use xmldb_xquery::{ErrorCode, Expr, QName, StaticContext};

fn seq(items: Vec<Expr>) -> Expr {
    Expr::Sequence(SequenceExpr::new(items))
}

fn clause(v: &str, input: Expr) -> BindingClause {
    BindingClause::new(QName::local(v), input)
}

fn var_path(v: &str, rest: Vec<Expr>) -> Expr {
    let mut parts = vec![var(v)];
    parts.extend(rest);
    path(parts)
}

#[rstest]
fn order_by_sorts_atomics(corpus: Corpus) {
    let e = ForExpr::new(clause("x", seq(vec![i(3), i(1), i(2)])), var("x")).with_order(vec![OrderSpec::ascending(var("x"))]);
    let out = corpus.run(&Expr::For(Box::new(e))).unwrap();
    assert_eq!(corpus.strings(&out), vec!["1", "2", "3"]);
}

#[rstest]
fn equal_keys_keep_input_order(corpus: Corpus) {
    let e = ForExpr::new(clause("x", seq(vec![s("b"), s("a"), s("c"), s("dd")])), var("x"))
        .with_order(vec![OrderSpec::ascending(call("string-length", vec![var("x")]))]);
    let out = corpus.run(&Expr::For(Box::new(e))).unwrap();
    assert_eq!(corpus.strings(&out), vec!["b", "a", "c", "dd"]);
}

#[rstest]
fn descending_order_over_nodes(corpus: Corpus) {
    let e = ForExpr::new(clause("b", all("book")), var_path("b", vec![attribute("id")]))
        .with_order(vec![OrderSpec::descending(call("number", vec![var_path("b", vec![child("price")])]))]);
    let out = corpus.run(&Expr::For(Box::new(e))).unwrap();
    assert_eq!(corpus.strings(&out), vec!["b2", "b1", "b3"]);
}

#[rstest]
#[case::empty_least(false, vec!["b1", "b3", "b2"])]
#[case::empty_greatest(true, vec!["b2", "b1", "b3"])]
fn empty_order_keys(corpus: Corpus, #[case] greatest: bool, #[case] expected: Vec<&str>) {
    let second_author = Expr::Step(step(Axis::Child, "author").with_predicate(pred(i(2))));
    let mut spec = OrderSpec::ascending(var_path("b", vec![second_author]));
    if greatest {
        spec = spec.empty_greatest();
    }
    let e = ForExpr::new(clause("b", all("book")), var_path("b", vec![attribute("id")])).with_order(vec![spec]);
    let out = corpus.run(&Expr::For(Box::new(e))).unwrap();
    assert_eq!(corpus.strings(&out), expected);
}

#[rstest]
fn where_clause_over_whole_input_and_per_binding_agree(corpus: Corpus) {
    let cond = || {
        Expr::Comparison(Box::new(ComparisonExpr::general(
            var_path("b", vec![child("title")]),
            CompOp::Eq,
            s("Query Processing"),
        )))
    };
    let fast = ForExpr::new(clause("b", all("book")), var_path("b", vec![attribute("id")])).with_where(cond());
    let out = corpus.run(&Expr::For(Box::new(fast))).unwrap();
    assert_eq!(corpus.strings(&out), vec!["b2"]);

    let slow = ForExpr::new(clause("b", all("book")), var_path("b", vec![attribute("id")]))
        .with_position(QName::local("p"))
        .with_where(cond());
    let out = corpus.run(&Expr::For(Box::new(slow))).unwrap();
    assert_eq!(corpus.strings(&out), vec!["b2"]);
}

#[rstest]
fn positional_variable_counts_from_one(corpus: Corpus) {
    let e = ForExpr::new(clause("x", seq(vec![s("a"), s("b")])), var("p")).with_position(QName::local("p"));
    let out = corpus.run(&Expr::For(Box::new(e))).unwrap();
    assert_eq!(corpus.strings(&out), vec!["1", "2"]);
}

#[rstest]
fn let_binds_whole_sequence(corpus: Corpus) {
    let e = LetExpr::new(clause("prices", all("price")), call("sum", vec![var("prices")]));
    let out = corpus.run(&Expr::Let(Box::new(e))).unwrap();
    assert_eq!(corpus.strings(&out), vec!["85"]);
}

#[rstest]
fn let_where_can_reject(corpus: Corpus) {
    let e = LetExpr::new(clause("n", call("count", vec![all("book")])), var("n"))
        .with_where(Expr::Comparison(Box::new(ComparisonExpr::general(var("n"), CompOp::Gt, i(5)))));
    assert!(corpus.run(&Expr::Let(Box::new(e))).unwrap().is_empty());
}

#[rstest]
#[case(Quantifier::Some, 40, true)]
#[case(Quantifier::Every, 40, false)]
#[case(Quantifier::Every, 5, true)]
fn quantified_over_prices(corpus: Corpus, #[case] q: Quantifier, #[case] limit: i64, #[case] expected: bool) {
    let test = Expr::Comparison(Box::new(ComparisonExpr::general(var("p"), CompOp::Gt, i(limit))));
    let e = QuantifiedExpr::new(q, clause("p", all("price")), test);
    let out = corpus.run(&Expr::Quantified(Box::new(e))).unwrap();
    assert_eq!(corpus.strings(&out), vec![expected.to_string()]);
}

#[rstest]
fn failed_binding_leaves_scopes_balanced(corpus: Corpus) {
    let mut sctx = StaticContext::default();
    let before = sctx.variables.depth();
    let e = LetExpr::new(clause("x", i(1)), var("nope"));
    let err = corpus.run_with(&Expr::Let(Box::new(e)), &mut sctx).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPST0008);
    assert_eq!(sctx.variables.depth(), before);

    let e = ForExpr::new(clause("x", seq(vec![i(1), i(2)])), var("nope"));
    assert!(corpus.run_with(&Expr::For(Box::new(e)), &mut sctx).is_err());
    assert_eq!(sctx.variables.depth(), before);
}

#[rstest]
fn nested_for_orders_all_tuples(corpus: Corpus) {
    let inner = ForExpr::new(
        clause("y", seq(vec![i(10), i(20)])),
        Expr::Arithmetic(Box::new(xmldb_xquery::expr::ArithmeticExpr::new(
            var("x"),
            xmldb_xquery::expr::ArithOp::Add,
            var("y"),
        ))),
    );
    let outer = ForExpr::new(clause("x", seq(vec![i(2), i(1)])), Expr::For(Box::new(inner)))
        .with_order(vec![OrderSpec::descending(var("y")), OrderSpec::ascending(var("x"))]);
    let out = corpus.run(&Expr::For(Box::new(outer))).unwrap();
    assert_eq!(corpus.strings(&out), vec!["21", "22", "11", "12"]);
}

#[rstest]
fn where_comparing_two_paths_of_the_variable_tests_each_binding(corpus: Corpus) {
    corpus.store.add_document(
        "pairs.xml",
        xmldb_xquery::memstore::elem("pairs")
            .child(xmldb_xquery::memstore::elem("pair").attr("id", "p1").attr("a", "1").attr("b", "2"))
            .child(xmldb_xquery::memstore::elem("pair").attr("id", "p2").attr("a", "2").attr("b", "1"))
            .child(xmldb_xquery::memstore::elem("pair").attr("id", "p3").attr("a", "3").attr("b", "3")),
    );
    let same = Expr::Comparison(Box::new(ComparisonExpr::general(
        var_path("x", vec![attribute("a")]),
        CompOp::Eq,
        var_path("x", vec![attribute("b")]),
    )));
    let e = ForExpr::new(clause("x", all("pair")), var_path("x", vec![attribute("id")])).with_where(same);
    assert!(!e.filters_whole_input());
    let out = corpus.run(&Expr::For(Box::new(e))).unwrap();
    assert_eq!(corpus.strings(&out), vec!["p3"]);

    let literal = Expr::Comparison(Box::new(ComparisonExpr::general(var_path("x", vec![attribute("a")]), CompOp::Eq, s("2"))));
    let e = ForExpr::new(clause("x", all("pair")), var_path("x", vec![attribute("id")])).with_where(literal);
    assert!(e.filters_whole_input());
    assert_eq!(corpus.strings(&corpus.run(&Expr::For(Box::new(e))).unwrap()), vec!["p2"]);
}

#[rstest]
fn return_values_repeat_per_iteration(corpus: Corpus) {
    let ids = path(vec![root(), descendant("book"), attribute("id")]);
    let e = ForExpr::new(clause("i", seq(vec![i(1), i(2)])), ids);
    let out = corpus.run(&Expr::For(Box::new(e))).unwrap();
    assert_eq!(corpus.strings(&out), vec!["b1", "b2", "b3", "b1", "b2", "b3"]);
}

#[rstest]
fn results_follow_iteration_order_not_document_order(corpus: Corpus) {
    let e = ForExpr::new(clause("x", seq(vec![all("title"), all("author")])), var("x"));
    let out = corpus.run(&Expr::For(Box::new(e))).unwrap();
    assert_eq!(corpus.names(&out), vec!["title", "title", "title", "author", "author", "author", "author"]);
}

#[rstest]
fn results_already_in_document_order_stay_a_node_collection(corpus: Corpus) {
    let e = ForExpr::new(clause("b", all("book")), var_path("b", vec![child("title")]));
    let out = corpus.run(&Expr::For(Box::new(e))).unwrap();
    assert!(out.as_nodes().is_some());
    assert_eq!(out.len(), 3);
}
