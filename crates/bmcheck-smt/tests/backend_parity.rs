//! Backend parity tests: Z3 and cvc5 must agree on verdicts and model values
//! for encoded IR expressions.
//!
//! cvc5 tests are gated behind `#[ignore]` so they can be skipped in CI when
//! cvc5 is not installed. Run with `cargo test -- --ignored` to include them.

use bmcheck_ir::expr::{BinaryOp, Expr};
use bmcheck_ir::types::{Component, Type, TypeTable};
use bmcheck_smt::backends::cvc5_backend::Cvc5Solver;
use bmcheck_smt::backends::z3_backend::Z3Solver;
use bmcheck_smt::expr_encoding::{ExprEncoder, Translation};
use bmcheck_smt::solver::{ModelValue, SatResult, SmtSolver};
use bmcheck_smt::struct_encoding::StructEncoder;

fn load<S: SmtSolver>(solver: &mut S, translations: &[Translation]) {
    for t in translations {
        for (name, sort) in &t.declarations {
            solver.declare_var(name, sort).unwrap();
        }
        solver.assert(&t.term).unwrap();
    }
}

fn s8(name: &str) -> Expr {
    Expr::symbol(name, Type::Signed(8))
}

fn c8(v: i64) -> Expr {
    Expr::signed(v, Type::Signed(8))
}

/// x > 0 && x + 1 < 0, satisfied only by x = 127.
fn overflow_formula() -> Vec<Translation> {
    let types = TypeTable::new();
    let structs = StructEncoder::new(&types);
    let enc = ExprEncoder::new(&structs);
    let positive = Expr::binary(BinaryOp::Gt, s8("x"), c8(0));
    let wraps = Expr::binary(
        BinaryOp::Lt,
        Expr::binary(BinaryOp::Add, s8("x"), c8(1)),
        c8(0),
    );
    vec![
        enc.translate_bool(&positive).unwrap(),
        enc.translate_bool(&wraps).unwrap(),
    ]
}

/// Member b of a {u8 a; s16 b} struct is written then read back unchanged.
fn struct_update_formula() -> Vec<Translation> {
    let mut types = TypeTable::new();
    let pair = types
        .insert(
            "pair",
            vec![
                Component::new("a", Type::Unsigned(8)),
                Component::new("b", Type::Signed(16)),
            ],
        )
        .unwrap();
    let structs = StructEncoder::new(&types);
    let enc = ExprEncoder::new(&structs);
    let p0 = Expr::symbol("p!0", Type::Struct(pair));
    let p1 = Expr::symbol("p!1", Type::Struct(pair));
    let write = Expr::binary(
        BinaryOp::Eq,
        p1.clone(),
        Expr::with_member(p0, "b", Expr::signed(-5, Type::Signed(16))),
    );
    let read_differs = Expr::binary(
        BinaryOp::NotEq,
        Expr::member(p1, "b", Type::Signed(16)),
        Expr::signed(-5, Type::Signed(16)),
    );
    vec![
        enc.translate_bool(&write).unwrap(),
        enc.translate_bool(&read_differs).unwrap(),
    ]
}

#[test]
fn z3_overflow_witness() {
    let mut solver = Z3Solver::with_default_config();
    load(&mut solver, &overflow_formula());
    assert_eq!(solver.check_sat().unwrap(), SatResult::Sat);
    let x = bmcheck_smt::terms::SmtTerm::var("x");
    assert_eq!(
        solver.get_value(&x).unwrap(),
        Some(ModelValue::BitVec {
            value: 127,
            width: 8
        })
    );
}

#[test]
fn z3_struct_update_is_consistent() {
    let mut solver = Z3Solver::with_default_config();
    load(&mut solver, &struct_update_formula());
    assert_eq!(solver.check_sat().unwrap(), SatResult::Unsat);
}

// ---- cvc5 parity tests (ignored by default) ----

fn cvc5_available() -> bool {
    Cvc5Solver::new().is_ok()
}

#[test]
#[ignore = "requires cvc5 binary"]
fn cvc5_overflow_witness_matches_z3() {
    if !cvc5_available() {
        return;
    }
    let mut cvc5 = Cvc5Solver::new().expect("cvc5 should be available");
    load(&mut cvc5, &overflow_formula());
    assert_eq!(cvc5.check_sat().unwrap(), SatResult::Sat);
    let x = bmcheck_smt::terms::SmtTerm::var("x");
    assert_eq!(
        cvc5.get_value(&x).unwrap(),
        Some(ModelValue::BitVec {
            value: 127,
            width: 8
        })
    );
}

#[test]
#[ignore = "requires cvc5 binary"]
fn cvc5_z3_parity_unsat() {
    if !cvc5_available() {
        return;
    }
    let formula = struct_update_formula();
    let mut z3 = Z3Solver::with_default_config();
    load(&mut z3, &formula);
    let mut cvc5 = Cvc5Solver::new().expect("cvc5 should be available");
    load(&mut cvc5, &formula);
    assert_eq!(
        z3.check_sat().unwrap(),
        cvc5.check_sat().unwrap(),
        "Z3 and cvc5 should agree on UNSAT"
    );
}
