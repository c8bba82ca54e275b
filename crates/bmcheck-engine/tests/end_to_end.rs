//! Whole-pipeline checks through the Z3 backend.

mod common;

use bmcheck_engine::properties::PropertyStatus;
use bmcheck_engine::trace::TraceEventKind;
use bmcheck_engine::options::EquationView;
use bmcheck_engine::{check_with_solver, show_equation, CheckerOptions, Verdict};
use bmcheck_ir::builder::FunctionBuilder;
use bmcheck_ir::expr::{BinaryOp, Expr};
use bmcheck_ir::program::Function;
use bmcheck_ir::types::Type;
use bmcheck_smt::backends::z3_backend::Z3Solver;
use bmcheck_smt::solver::{Model, ModelValue, SatResult, SmtSolver};
use bmcheck_smt::sorts::SmtSort;
use bmcheck_smt::terms::SmtTerm;
use common::*;

/// i = 0; while (i < 3) i = i + 1; assert(i == 3)
fn counting_loop() -> Function {
    let mut b = FunctionBuilder::new("main").local("i", U8);
    b.assign(var("i"), c(0))
        .label("head")
        .goto("exit", Expr::not(bin(BinaryOp::Lt, var("i"), c(3))))
        .assign(var("i"), bin(BinaryOp::Add, var("i"), c(1)))
        .goto("head", Expr::bool(true))
        .label("exit")
        .assert("main.done", Expr::eq(var("i"), c(3)));
    b.build().expect("build")
}

#[test]
fn loop_within_bound_passes() {
    let report = run(&program(vec![counting_loop()], vec![]), &with_unwind(4));
    assert_eq!(report.status_of("main.done"), Some(PropertyStatus::Pass));
    assert_eq!(report.verdict(), Verdict::Pass);
    assert_eq!(report.rounds, 1);
    assert!(report.summary().contains("unwinding bound 4"));
}

#[test]
fn insufficient_unwinding_fails_the_unwinding_assertion() {
    let report = run(&program(vec![counting_loop()], vec![]), &with_unwind(2));
    assert_eq!(report.status_of("main.0.unwind"), Some(PropertyStatus::Fail));
    // Never reached under the bound, so it holds vacuously.
    assert_eq!(report.status_of("main.done"), Some(PropertyStatus::Pass));
    assert_eq!(report.verdict(), Verdict::Fail);
}

#[test]
fn disabled_unwinding_assertions_hide_the_cut() {
    let options = CheckerOptions {
        unwinding_assertions: false,
        ..with_unwind(2)
    };
    let report = run(&program(vec![counting_loop()], vec![]), &options);
    assert_eq!(report.status_of("main.0.unwind"), None);
    assert_eq!(report.verdict(), Verdict::Pass);
}

#[test]
fn both_loop_policies_report_the_cut_and_keep_going() {
    let options = CheckerOptions {
        partial_loops: true,
        ..with_unwind(2)
    };
    let report = run(&program(vec![counting_loop()], vec![]), &options);
    assert_eq!(report.status_of("main.0.unwind"), Some(PropertyStatus::Fail));
    // The partial path reaches the final assertion with i == 2.
    assert_eq!(report.status_of("main.done"), Some(PropertyStatus::Fail));
}

#[test]
fn depth_limit_leaves_the_loop_exit_unexplored() {
    let options = CheckerOptions {
        depth: Some(3),
        ..with_unwind(4)
    };
    let report = run(&program(vec![counting_loop()], vec![]), &options);
    assert_eq!(report.execution.depth_cutoffs.len(), 1);
    assert_eq!(report.status_of("main.0.unwind"), None);
    assert_eq!(report.status_of("main.done"), Some(PropertyStatus::Pass));

    let generous = CheckerOptions {
        depth: Some(100),
        ..with_unwind(4)
    };
    let report = run(&program(vec![counting_loop()], vec![]), &generous);
    assert!(report.execution.depth_cutoffs.is_empty());
    assert_eq!(report.status_of("main.done"), Some(PropertyStatus::Pass));
}

#[test]
fn equation_views_render_without_deciding() {
    let prog = program(vec![counting_loop()], vec![]);
    let options = with_unwind(2);

    let listing = show_equation(&prog, &options, EquationView::Program).expect("program view");
    assert!(listing.contains("ASSERT main.0.unwind#1"), "{listing}");

    let vccs = show_equation(&prog, &options, EquationView::Vccs).expect("vcc view");
    assert!(vccs.contains("VCC main.0.unwind#1"), "{vccs}");
    assert!(vccs.contains("|--------------------------"), "{vccs}");
}

#[test]
fn wraparound_is_found_with_a_concrete_trace() {
    let mut b = FunctionBuilder::new("main").local("x", U8).local("y", U8);
    b.assign(var("x"), Expr::nondet(U8))
        .assume(bin(BinaryOp::Gt, var("x"), c(0)))
        .assign(var("y"), bin(BinaryOp::Add, var("x"), c(1)))
        .assert("main.grows", bin(BinaryOp::Gt, var("y"), var("x")));
    let report = run(&program(vec![b.build().expect("build")], vec![]), &with_unwind(1));
    assert_eq!(report.status_of("main.grows"), Some(PropertyStatus::Fail));

    let trace = report.trace_for("main.grows").expect("trace");
    let last = trace.failed_assertion().expect("violation event");
    assert_eq!(last.location.line, 4);
    let descriptions: Vec<_> = trace
        .events
        .iter()
        .filter(|e| e.kind == TraceEventKind::Assignment)
        .map(|e| e.description.as_str())
        .collect();
    assert_eq!(descriptions, vec!["x = 255", "y = 0"]);
}

#[test]
fn assumptions_only_constrain_later_assertions() {
    let mut guarded = FunctionBuilder::new("main").local("x", U8);
    guarded
        .assign(var("x"), Expr::nondet(U8))
        .assume(bin(BinaryOp::Lt, var("x"), c(10)))
        .assert("main.small", bin(BinaryOp::Lt, var("x"), c(10)));
    let report = run(&program(vec![guarded.build().expect("build")], vec![]), &with_unwind(1));
    assert_eq!(report.status_of("main.small"), Some(PropertyStatus::Pass));

    let mut late = FunctionBuilder::new("main").local("x", U8);
    late.assign(var("x"), Expr::nondet(U8))
        .assert("main.small", bin(BinaryOp::Lt, var("x"), c(10)))
        .assume(bin(BinaryOp::Lt, var("x"), c(10)));
    let report = run(&program(vec![late.build().expect("build")], vec![]), &with_unwind(1));
    assert_eq!(report.status_of("main.small"), Some(PropertyStatus::Fail));
}

#[test]
fn branches_merge_and_either_side_can_fail() {
    let mut b = FunctionBuilder::new("main")
        .local("x", U8)
        .local("flag", Type::Bool);
    let flag = Expr::symbol("flag", Type::Bool);
    b.assign(flag.clone(), Expr::nondet(Type::Bool))
        .goto("other", flag)
        .assign(var("x"), c(1))
        .goto("end", Expr::bool(true))
        .label("other")
        .assign(var("x"), c(2))
        .label("end")
        .assert("main.one", Expr::eq(var("x"), c(1)))
        .assert("main.positive", bin(BinaryOp::Gt, var("x"), c(0)));
    let report = run(&program(vec![b.build().expect("build")], vec![]), &with_unwind(1));
    assert_eq!(report.status_of("main.one"), Some(PropertyStatus::Fail));
    assert_eq!(report.status_of("main.positive"), Some(PropertyStatus::Pass));
}

#[test]
fn a_variable_assigned_on_one_branch_only_can_still_differ() {
    let mut b = FunctionBuilder::new("main")
        .local("x", U8)
        .local("flag", Type::Bool);
    let flag = Expr::symbol("flag", Type::Bool);
    b.assign(flag.clone(), Expr::nondet(Type::Bool))
        .goto("skip", flag)
        .assign(var("x"), c(1))
        .label("skip")
        .assert("main.one", Expr::eq(var("x"), c(1)));
    let report = run(&program(vec![b.build().expect("build")], vec![]), &with_unwind(1));
    assert_eq!(report.status_of("main.one"), Some(PropertyStatus::Fail));
}

#[test]
fn bodiless_functions_return_anything() {
    let input = Function {
        name: "input".into(),
        parameters: Vec::new(),
        locals: Vec::new(),
        return_type: Some(U8),
        body: None,
    };
    let mut main = FunctionBuilder::new("main").local("x", U8);
    main.call(Some(var("x")), "input", vec![])
        .assert("main.zero", Expr::eq(var("x"), c(0)));
    let report = run(
        &program(vec![main.build().expect("main"), input], vec![]),
        &with_unwind(1),
    );
    assert_eq!(report.status_of("main.zero"), Some(PropertyStatus::Fail));
    let trace = report.trace_for("main.zero").expect("trace");
    assert!(trace.events.iter().any(|e| e.kind == TraceEventKind::Call));
}

#[test]
fn recursion_beyond_the_bound_is_reported() {
    let mut down = FunctionBuilder::new("down").param("n", U8);
    down.goto("done", Expr::eq(var("n"), c(0)))
        .call(None, "down", vec![bin(BinaryOp::Sub, var("n"), c(1))])
        .label("done")
        .ret(None);
    let mut main = FunctionBuilder::new("main");
    main.call(None, "down", vec![c(5)]);
    let prog = program(vec![main.build().expect("main"), down.build().expect("down")], vec![]);

    let shallow = run(&prog, &with_unwind(3));
    assert_eq!(shallow.status_of("down.recursion"), Some(PropertyStatus::Fail));
    let deep = run(&prog, &with_unwind(7));
    assert_eq!(deep.status_of("down.recursion"), None);
    assert_eq!(deep.verdict(), Verdict::Pass);
}

#[test]
fn checked_mode_accepts_executor_output() {
    let options = CheckerOptions {
        validate_ssa: true,
        ..with_unwind(4)
    };
    let report = run(&program(vec![counting_loop()], vec![]), &options);
    assert_eq!(report.verdict(), Verdict::Pass);
}

/// Z3 that reports a crash on every satisfiability check.
struct CrashingSolver(Z3Solver);

impl SmtSolver for CrashingSolver {
    type Error = std::io::Error;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Self::Error> {
        self.0.declare_var(name, sort).map_err(std::io::Error::other)
    }
    fn assert(&mut self, term: &SmtTerm) -> Result<(), Self::Error> {
        self.0.assert(term).map_err(std::io::Error::other)
    }
    fn push(&mut self) -> Result<(), Self::Error> {
        self.0.push().map_err(std::io::Error::other)
    }
    fn pop(&mut self) -> Result<(), Self::Error> {
        self.0.pop().map_err(std::io::Error::other)
    }
    fn check_sat(&mut self) -> Result<SatResult, Self::Error> {
        Err(std::io::Error::other("solver crashed"))
    }
    fn check_sat_with_model(
        &mut self,
        _vars: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Self::Error> {
        Err(std::io::Error::other("solver crashed"))
    }
    fn get_value(&mut self, _term: &SmtTerm) -> Result<Option<ModelValue>, Self::Error> {
        Ok(None)
    }
    fn reset(&mut self) -> Result<(), Self::Error> {
        self.0.reset().map_err(std::io::Error::other)
    }
}

#[test]
fn solver_failures_become_error_and_the_run_continues() {
    let mut b = FunctionBuilder::new("main").local("x", U8);
    b.assign(var("x"), Expr::nondet(U8))
        .assert("main.a", bin(BinaryOp::Lt, var("x"), c(10)))
        .assert("main.b", Expr::bool(true));
    let prog = program(vec![b.build().expect("build")], vec![]);
    let report = check_with_solver(&prog, &with_unwind(1), CrashingSolver(Z3Solver::new()))
        .expect("run completes");
    assert_eq!(report.status_of("main.a"), Some(PropertyStatus::Error));
    assert_eq!(report.status_of("main.b"), Some(PropertyStatus::Pass));
    assert_eq!(report.verdict(), Verdict::Error);
    assert!(report.summary().contains("solver crashed"));
}
