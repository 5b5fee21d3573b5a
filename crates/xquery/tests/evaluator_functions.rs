mod common;

use std::rc::Rc;

use common::*;
use rstest::rstest;
use xmldb_xquery::consts::{FNS, LOCAL_NS};
use xmldb_xquery::expr::{ArithOp, ArithmeticExpr, ComparisonExpr, CompOp, FilterExpr, IfExpr, Literal, SequenceExpr};
use xmldb_xquery::functions::{BuiltinCall, UserFunction};
use xmldb_xquery::types::{ItemType, Occurrence, SequenceType};
use xmldb_xquery::{ErrorCode, ErrorKind, Expr, QName, StaticContext};

fn seq(items: Vec<Expr>) -> Expr {
    Expr::Sequence(SequenceExpr::new(items))
}

fn arith(l: Expr, op: ArithOp, r: Expr) -> Expr {
    Expr::Arithmetic(Box::new(ArithmeticExpr::new(l, op, r)))
}

fn local(name: &str) -> QName {
    QName::new(Some(LOCAL_NS), name).with_prefix("local")
}

fn integer_param(name: &str) -> (QName, SequenceType) {
    (QName::local(name), SequenceType::new(ItemType::Integer, Occurrence::One))
}

fn first(e: Expr) -> Expr {
    Expr::Filter(Box::new(FilterExpr::new(e, vec![pred(i(1))])))
}

#[rstest]
#[case::count(call("count", vec![all("author")]), "4")]
#[case::string_length(call("string-length", vec![s("native")]), "6")]
#[case::concat(call("concat", vec![s("a"), i(1), s("b")]), "a1b")]
#[case::substring(call("substring", vec![s("database"), i(5), i(3)]), "bas")]
#[case::sum(call("sum", vec![all("price")]), "85")]
#[case::avg(call("avg", vec![seq(vec![i(2), i(4)])]), "3")]
#[case::min(call("min", vec![all("price")]), "10")]
#[case::max(call("max", vec![seq(vec![s("pear"), s("apple")])]), "pear")]
#[case::round_half_up(call("round", vec![Expr::Literal(Literal::double(2.5))]), "3")]
#[case::round_negative(call("round", vec![Expr::Literal(Literal::double(-2.5))]), "-2")]
#[case::upper(call("upper-case", vec![s("xml")]), "XML")]
#[case::name(call("name", vec![first(all("speaker"))]), "speaker")]
#[case::local_name(call("local-name", vec![first(all("book"))]), "book")]
fn builtins_produce_single_values(corpus: Corpus, #[case] e: Expr, #[case] expected: &str) {
    let out = corpus.run(&e).unwrap();
    assert_eq!(corpus.strings(&out), vec![expected.to_string()]);
}

#[rstest]
fn distinct_values_keep_first_occurrence(corpus: Corpus) {
    let authors = path(vec![all("author"), call("string", vec![])]);
    let out = corpus.run(&call("distinct-values", vec![authors])).unwrap();
    assert_eq!(corpus.strings(&out), vec!["Smith", "Jones", "Brown"]);
}

#[rstest]
fn root_returns_the_document_node(corpus: Corpus) {
    let out = corpus.run(&call("root", vec![first(all("speaker"))])).unwrap();
    assert_eq!(out.len(), 1);
    let node = out.first().unwrap();
    assert_eq!(node.as_node().unwrap().kind, xmldb_xquery::NodeKind::Document);
}

#[rstest]
#[case::exactly_one_empty("exactly-one", seq(vec![]), ErrorCode::FORG0005)]
#[case::exactly_one_many("exactly-one", all("book"), ErrorCode::FORG0005)]
#[case::zero_or_one_many("zero-or-one", all("book"), ErrorCode::FORG0003)]
#[case::one_or_more_empty("one-or-more", seq(vec![]), ErrorCode::FORG0004)]
fn cardinality_functions(corpus: Corpus, #[case] name: &str, #[case] arg: Expr, #[case] code: ErrorCode) {
    let err = corpus.run(&call(name, vec![arg])).unwrap_err();
    assert_eq!(err.code, code);
}

#[rstest]
fn unknown_builtin_is_a_static_error() {
    let err = BuiltinCall::new(&QName::new(Some(FNS), "frobnicate"), vec![]).err().unwrap();
    assert_eq!(err.code, ErrorCode::XPST0017);
    let wrong_arity = BuiltinCall::new(&QName::new(Some(FNS), "count"), vec![]).err().unwrap();
    assert_eq!(wrong_arity.code, ErrorCode::XPST0017);
}

#[rstest]
fn forward_reference_resolves_after_declaration(corpus: Corpus) {
    let mut sctx = StaticContext::default();
    let call = sctx.functions.call(local("double"), vec![i(21)]);

    let f = Rc::new(UserFunction::new(
        local("double"),
        vec![integer_param("n")],
        Some(SequenceType::new(ItemType::Integer, Occurrence::One)),
    ));
    f.set_body(arith(var("n"), ArithOp::Mul, i(2))).unwrap();
    sctx.declare_function(Rc::clone(&f)).unwrap();
    sctx.resolve_forward_references().unwrap();

    let out = corpus.run_with(&Expr::Call(call), &mut sctx).unwrap();
    assert_eq!(corpus.strings(&out), vec!["42"]);
}

#[rstest]
fn untyped_argument_is_cast_to_the_parameter_type(corpus: Corpus) {
    let mut sctx = StaticContext::default();
    let f = Rc::new(UserFunction::new(local("double"), vec![integer_param("n")], None));
    f.set_body(arith(var("n"), ArithOp::Mul, i(2))).unwrap();
    sctx.declare_function(Rc::clone(&f)).unwrap();
    let call = sctx.functions.call(local("double"), vec![first(all("price"))]);
    let out = corpus.run_with(&Expr::Call(call), &mut sctx).unwrap();
    assert_eq!(corpus.strings(&out), vec!["60"]);
}

#[rstest]
fn recursive_function(corpus: Corpus) {
    let mut sctx = StaticContext::default();
    let recurse = sctx.functions.call(local("fact"), vec![arith(var("n"), ArithOp::Sub, i(1))]);
    let body = Expr::If(Box::new(IfExpr::new(
        Expr::Comparison(Box::new(ComparisonExpr::value(var("n"), CompOp::Le, i(1)))),
        i(1),
        arith(var("n"), ArithOp::Mul, Expr::Call(recurse)),
    )));
    let f = Rc::new(UserFunction::new(local("fact"), vec![integer_param("n")], None));
    f.set_body(body).unwrap();
    sctx.declare_function(Rc::clone(&f)).unwrap();
    sctx.resolve_forward_references().unwrap();

    let call = sctx.functions.call(local("fact"), vec![i(5)]);
    let out = corpus.run_with(&Expr::Call(call), &mut sctx).unwrap();
    assert_eq!(corpus.strings(&out), vec!["120"]);
}

#[rstest]
fn unresolved_reference_fails(corpus: Corpus) {
    let mut sctx = StaticContext::default();
    let call = sctx.functions.call(local("missing"), vec![]);
    assert_eq!(sctx.resolve_forward_references().unwrap_err().code, ErrorCode::XPST0017);
    let err = corpus.run_with(&Expr::Call(call), &mut sctx).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPST0017);
}

#[rstest]
fn return_cardinality_is_checked(corpus: Corpus) {
    let mut sctx = StaticContext::default();
    let f = Rc::new(UserFunction::new(
        local("two"),
        vec![],
        Some(SequenceType::new(ItemType::Integer, Occurrence::One)),
    ));
    f.set_body(seq(vec![i(1), i(2)])).unwrap();
    sctx.declare_function(Rc::clone(&f)).unwrap();
    let call = sctx.functions.call(local("two"), vec![]);
    let err = corpus.run_with(&Expr::Call(call), &mut sctx).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPTY0004);
    assert_eq!(err.kind, ErrorKind::Cardinality);
}

#[rstest]
fn function_body_cannot_see_caller_locals(corpus: Corpus) {
    use xmldb_xquery::expr::{BindingClause, LetExpr};
    let mut sctx = StaticContext::default();
    let f = Rc::new(UserFunction::new(local("peek"), vec![], None));
    f.set_body(var("secret")).unwrap();
    sctx.declare_function(Rc::clone(&f)).unwrap();
    let call = sctx.functions.call(local("peek"), vec![]);
    let e = LetExpr::new(BindingClause::new(QName::local("secret"), i(7)), Expr::Call(call));
    let err = corpus.run_with(&Expr::Let(Box::new(e)), &mut sctx).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPST0008);
}

#[rstest]
fn wrong_argument_type_is_rejected(corpus: Corpus) {
    let mut sctx = StaticContext::default();
    let f = Rc::new(UserFunction::new(local("double"), vec![integer_param("n")], None));
    f.set_body(arith(var("n"), ArithOp::Mul, i(2))).unwrap();
    sctx.declare_function(Rc::clone(&f)).unwrap();
    let call = sctx.functions.call(local("double"), vec![Expr::Comparison(Box::new(ComparisonExpr::general(i(1), CompOp::Eq, i(1))))]);
    let err = corpus.run_with(&Expr::Call(call), &mut sctx).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Type);
}

#[rstest]
fn function_body_sees_documents_outside_the_calling_path(corpus: Corpus) {
    let mut sctx = StaticContext::default();
    let f = Rc::new(UserFunction::new(local("ids"), vec![], None));
    f.set_body(path(vec![root(), descendant("book"), attribute("id")])).unwrap();
    sctx.declare_function(Rc::clone(&f)).unwrap();
    let call = sctx.functions.call(local("ids"), vec![]);
    let e = path(vec![root(), descendant("speech"), Expr::Call(call)]);
    let out = corpus.run_with(&e, &mut sctx).unwrap();
    assert_eq!(corpus.strings(&out), vec!["b1", "b2", "b3"]);
}
