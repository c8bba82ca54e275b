//! Randomized straight-line programs: slicing never changes a verdict and
//! executor output is always well-formed SSA.

mod common;

use bmcheck_engine::equation::Equation;
use bmcheck_engine::postprocess::validate::validate;
use bmcheck_engine::symex::{SymbolicExecutor, SymexOutcome};
use bmcheck_engine::CheckerOptions;
use bmcheck_ir::builder::FunctionBuilder;
use bmcheck_ir::expr::{BinaryOp, Expr};
use bmcheck_ir::program::Program;
use common::*;
use proptest::prelude::*;

const VARS: [&str; 4] = ["a", "b", "c", "d"];

#[derive(Debug, Clone)]
enum Operand {
    Var(usize),
    Const(u8),
}

#[derive(Debug, Clone)]
struct Update {
    target: usize,
    op: BinaryOp,
    lhs: usize,
    rhs: Operand,
    guarded: bool,
}

fn operand() -> impl Strategy<Value = Operand> {
    prop_oneof![
        (0..VARS.len()).prop_map(Operand::Var),
        any::<u8>().prop_map(Operand::Const),
    ]
}

fn update() -> impl Strategy<Value = Update> {
    (
        0..VARS.len(),
        prop_oneof![
            Just(BinaryOp::Add),
            Just(BinaryOp::Sub),
            Just(BinaryOp::BitAnd),
            Just(BinaryOp::BitXor),
        ],
        0..VARS.len(),
        operand(),
        any::<bool>(),
    )
        .prop_map(|(target, op, lhs, rhs, guarded)| Update {
            target,
            op,
            lhs,
            rhs,
            guarded,
        })
}

fn expr_of(operand: &Operand) -> Expr {
    match operand {
        Operand::Var(i) => var(VARS[*i]),
        Operand::Const(v) => c(u64::from(*v)),
    }
}

/// Inputs are nondeterministic; guarded updates are skipped when `a` is odd.
fn build(updates: &[Update], checked: usize, bound: u8) -> Program {
    let mut b = FunctionBuilder::new("main");
    for name in VARS {
        b = b.local(name, U8);
    }
    for name in VARS {
        b.assign(var(name), Expr::nondet(U8));
    }
    for (n, u) in updates.iter().enumerate() {
        let rhs = bin(u.op, var(VARS[u.lhs]), expr_of(&u.rhs));
        if u.guarded {
            let label = format!("skip{n}");
            let odd = Expr::eq(bin(BinaryOp::BitAnd, var("a"), c(1)), c(1));
            b.goto(label.clone(), odd)
                .assign(var(VARS[u.target]), rhs)
                .label(label);
        } else {
            b.assign(var(VARS[u.target]), rhs);
        }
    }
    b.assert(
        "main.bounded",
        bin(BinaryOp::Le, var(VARS[checked]), c(u64::from(bound))),
    );
    b.assert("main.tautology", Expr::eq(var("d"), var("d")));
    program(vec![b.build().expect("generated program")], vec![])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn slicing_preserves_verdicts(
        updates in prop::collection::vec(update(), 1..6),
        checked in 0..VARS.len(),
        bound in any::<u8>(),
    ) {
        let prog = build(&updates, checked, bound);
        let sliced = run(&prog, &with_unwind(1));
        let unsliced = run(&prog, &CheckerOptions { slice_formula: false, ..with_unwind(1) });
        for id in ["main.bounded", "main.tautology"] {
            prop_assert_eq!(sliced.status_of(id), unsliced.status_of(id), "{}", id);
        }
    }

    #[test]
    fn executor_output_is_well_formed_ssa(
        updates in prop::collection::vec(update(), 1..8),
        checked in 0..VARS.len(),
    ) {
        let prog = build(&updates, checked, 7);
        let mut equation = Equation::new();
        let mut executor = SymbolicExecutor::new(&prog, &with_unwind(1));
        let outcome = executor.run(&mut equation);
        prop_assert!(matches!(outcome, Ok(SymexOutcome::Finished)));
        prop_assert!(validate(&equation).is_ok());
    }
}
