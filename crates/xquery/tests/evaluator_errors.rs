mod common;

use common::*;
use rstest::rstest;
use xmldb_xquery::expr::{ArithOp, ArithmeticExpr, IfExpr, Literal, SequenceExpr};
use xmldb_xquery::{AtomicValue, ErrorCode, ErrorKind, Expr};

fn arith(l: Expr, op: ArithOp, r: Expr) -> Expr {
    Expr::Arithmetic(Box::new(ArithmeticExpr::new(l, op, r)))
}

#[rstest]
#[case::undeclared_variable(var("missing"), ErrorCode::XPST0008)]
#[case::step_on_atomic(path(vec![s("text"), child("a")]), ErrorCode::XPTY0019)]
#[case::step_without_context(child("title"), ErrorCode::XPDY0002)]
#[case::position_without_focus(call("position", vec![]), ErrorCode::XPDY0002)]
#[case::integer_division_by_zero(arith(i(1), ArithOp::Div, i(0)), ErrorCode::FOAR0001)]
#[case::idiv_by_zero(arith(i(7), ArithOp::IDiv, i(0)), ErrorCode::FOAR0001)]
#[case::modulo_by_zero(arith(i(7), ArithOp::Mod, i(0)), ErrorCode::FOAR0001)]
#[case::overflow(arith(i(i64::MAX), ArithOp::Add, i(1)), ErrorCode::FOAR0002)]
#[case::string_arithmetic(arith(s("a"), ArithOp::Add, i(1)), ErrorCode::XPTY0004)]
#[case::untyped_not_a_number(
    arith(Expr::Literal(Literal::new(AtomicValue::UntypedAtomic("abc".into()))), ArithOp::Add, i(1)),
    ErrorCode::FORG0001
)]
#[case::ebv_of_many_atomics(
    Expr::If(Box::new(IfExpr::new(Expr::Sequence(SequenceExpr::new(vec![i(1), i(2)])), i(1), i(0)))),
    ErrorCode::FORG0006
)]
#[case::sum_of_strings(call("sum", vec![s("x")]), ErrorCode::FORG0006)]
fn dynamic_errors(corpus: Corpus, #[case] e: Expr, #[case] code: ErrorCode) {
    let err = corpus.run(&e).unwrap_err();
    assert_eq!(err.code, code, "{err}");
}

#[rstest]
fn double_division_by_zero_is_infinite(corpus: Corpus) {
    let e = arith(Expr::Literal(Literal::double(1.0)), ArithOp::Div, i(0));
    let out = corpus.run(&e).unwrap();
    assert_eq!(corpus.strings(&out), vec!["INF"]);
}

#[rstest]
fn empty_operand_gives_empty_result(corpus: Corpus) {
    let e = arith(Expr::Sequence(SequenceExpr::new(vec![])), ArithOp::Add, i(1));
    assert!(corpus.run(&e).unwrap().is_empty());
}

#[rstest]
fn arithmetic_on_many_items_is_a_cardinality_error(corpus: Corpus) {
    let err = corpus.run(&arith(all("price"), ArithOp::Add, i(1))).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPTY0004);
    assert_eq!(err.kind, ErrorKind::Cardinality);
}

#[rstest]
fn error_codes_render_with_their_prefix() {
    assert_eq!(ErrorCode::XPST0008.to_string(), "err:XPST0008");
    assert_eq!(ErrorCode::EXQD0002.to_string(), "xmldb:EXQD0002");
    assert_eq!(ErrorCode::from_code("FORG0001"), Some(ErrorCode::FORG0001));
}
