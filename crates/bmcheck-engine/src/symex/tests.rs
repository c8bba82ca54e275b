use bmcheck_ir::builder::FunctionBuilder;
use bmcheck_ir::expr::{BinaryOp, Expr};
use bmcheck_ir::program::{Function, Global, Program};
use bmcheck_ir::types::{Type, TypeTable};
use indexmap::IndexMap;

use super::*;

const U8: Type = Type::Unsigned(8);

fn var(name: &str) -> Expr {
    Expr::symbol(name, U8)
}

fn c(v: u64) -> Expr {
    Expr::constant(v, U8)
}

fn program(functions: Vec<Function>, globals: Vec<Global>) -> Program {
    let mut map = IndexMap::new();
    for f in functions {
        map.insert(f.name.clone(), f);
    }
    Program {
        types: TypeTable::new(),
        globals,
        functions: map,
        entry: "main".into(),
    }
}

fn execute(program: &Program, options: &CheckerOptions) -> (Equation, ExecutionReport) {
    let mut equation = Equation::new();
    let mut symex = SymbolicExecutor::new(program, options);
    let outcome = symex.run(&mut equation).expect("symbolic execution");
    assert_eq!(outcome, SymexOutcome::Finished);
    (equation, symex.report().clone())
}

fn asserts<'a>(eq: &'a Equation, property: &'a str) -> Vec<&'a Expr> {
    eq.steps()
        .iter()
        .filter_map(|s| match &s.kind {
            StepKind::Assert {
                condition,
                property: p,
                ..
            } if p == property => Some(condition),
            _ => None,
        })
        .collect()
}

/// i = 0; while (i < 3) i = i + 1; assert(i == 3)
fn counting_loop() -> Function {
    let mut b = FunctionBuilder::new("main").local("i", U8);
    b.assign(var("i"), c(0))
        .label("head")
        .goto("exit", Expr::not(Expr::binary(BinaryOp::Lt, var("i"), c(3))))
        .assign(var("i"), Expr::binary(BinaryOp::Add, var("i"), c(1)))
        .goto("head", Expr::bool(true))
        .label("exit")
        .assert("main.done", Expr::eq(var("i"), c(3)));
    b.build().expect("build")
}

#[test]
fn constants_propagate_into_assertions() {
    let mut b = FunctionBuilder::new("main").local("x", U8);
    b.assign(var("x"), c(3))
        .assign(var("x"), Expr::binary(BinaryOp::Add, var("x"), c(2)))
        .assert("main.x", Expr::eq(var("x"), c(5)));
    let prog = program(vec![b.build().expect("build")], vec![]);
    let (eq, _) = execute(&prog, &CheckerOptions::default());
    assert_eq!(asserts(&eq, "main.x"), vec![&Expr::bool(true)]);
    let lhs: Vec<_> = eq
        .steps()
        .iter()
        .filter_map(|s| s.kind.defined_symbol().map(|(n, _)| n.to_string()))
        .collect();
    assert_eq!(lhs, vec!["x@1!1", "x@1!2"]);
}

#[test]
fn branches_merge_through_phi() {
    let mut b = FunctionBuilder::new("main").local("x", U8).local("c", Type::Bool);
    b.goto("else", Expr::symbol("c", Type::Bool))
        .assign(var("x"), c(1))
        .goto("end", Expr::bool(true))
        .label("else")
        .assign(var("x"), c(2))
        .label("end")
        .assert("main.pos", Expr::binary(BinaryOp::Gt, var("x"), c(0)));
    let prog = program(vec![b.build().expect("build")], vec![]);
    let (eq, _) = execute(&prog, &CheckerOptions::default());
    let phis: Vec<_> = eq
        .steps()
        .iter()
        .filter(|s| {
            matches!(
                s.kind,
                StepKind::Assignment {
                    kind: AssignmentKind::Phi,
                    ..
                }
            )
        })
        .collect();
    assert_eq!(phis.len(), 1);
    let conditions = asserts(&eq, "main.pos");
    assert_eq!(conditions.len(), 1);
    // After the merge the guard is true again.
    let assert_step = eq.steps().iter().find(|s| s.is_assert()).expect("assert");
    assert!(assert_step.guard.is_true(), "guard {}", assert_step.guard);
}

fn phi_targets(eq: &Equation) -> Vec<String> {
    eq.steps()
        .iter()
        .filter_map(|s| match &s.kind {
            StepKind::Assignment {
                lhs,
                kind: AssignmentKind::Phi,
                ..
            } => Some(lhs.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn assignment_on_one_branch_merges_with_an_arbitrary_value() {
    let flag = Expr::symbol("flag", Type::Bool);
    let mut b = FunctionBuilder::new("main")
        .local("x", U8)
        .local("flag", Type::Bool);
    b.assign(flag.clone(), Expr::nondet(Type::Bool))
        .goto("skip", flag)
        .assign(var("x"), c(1))
        .label("skip")
        .assert("main.one", Expr::eq(var("x"), c(1)));
    let prog = program(vec![b.build().expect("build")], vec![]);
    let (eq, _) = execute(&prog, &CheckerOptions::default());
    let conditions = asserts(&eq, "main.one");
    assert_eq!(conditions.len(), 1);
    assert!(!conditions[0].is_true(), "condition {}", conditions[0]);
    assert_eq!(phi_targets(&eq), vec!["x@1!2"]);
}

#[test]
fn dead_on_one_branch_forgets_the_value_there() {
    let flag = Expr::symbol("flag", Type::Bool);
    let mut b = FunctionBuilder::new("main")
        .local("x", U8)
        .local("flag", Type::Bool);
    b.assign(var("x"), c(1))
        .goto("skip", flag)
        .dead("x")
        .label("skip")
        .assert("main.one", Expr::eq(var("x"), c(1)));
    let prog = program(vec![b.build().expect("build")], vec![]);
    let (eq, _) = execute(&prog, &CheckerOptions::default());
    assert!(!asserts(&eq, "main.one")[0].is_true());
    assert_eq!(phi_targets(&eq), vec!["x@1!2"]);
}

#[test]
fn loop_within_bound_needs_no_unwinding_assertion() {
    let prog = program(vec![counting_loop()], vec![]);
    let options = CheckerOptions {
        unwind: Some(4),
        ..CheckerOptions::default()
    };
    let (eq, report) = execute(&prog, &options);
    assert!(report.unwinding_limit_hits.is_empty());
    assert!(asserts(&eq, "main.0.unwind").is_empty());
    assert_eq!(asserts(&eq, "main.done"), vec![&Expr::bool(true)]);
}

#[test]
fn loop_beyond_bound_emits_unwinding_assertion_and_assumption() {
    let prog = program(vec![counting_loop()], vec![]);
    let options = CheckerOptions {
        unwind: Some(2),
        ..CheckerOptions::default()
    };
    let (eq, report) = execute(&prog, &options);
    assert_eq!(report.unwinding_limit_hits.get("main.0"), Some(&1));
    assert_eq!(asserts(&eq, "main.0.unwind"), vec![&Expr::bool(false)]);
    assert_eq!(eq.count_kind("ASSUME"), 1);
    // The path past the bound is cut off, so the final assertion is never
    // reached.
    assert!(asserts(&eq, "main.done").is_empty());
}

#[test]
fn partial_loops_keep_the_assertion_but_drop_the_assumption() {
    let prog = program(vec![counting_loop()], vec![]);
    let options = CheckerOptions {
        unwind: Some(2),
        partial_loops: true,
        ..CheckerOptions::default()
    };
    let (eq, _) = execute(&prog, &options);
    assert_eq!(asserts(&eq, "main.0.unwind").len(), 1);
    assert_eq!(eq.count_kind("ASSUME"), 0);
    assert_eq!(asserts(&eq, "main.done").len(), 1);
}

#[test]
fn self_loop_becomes_assumption() {
    let mut b = FunctionBuilder::new("main").local("x", U8);
    b.label("spin")
        .goto("spin", Expr::eq(var("x"), c(0)))
        .assert("main.nz", Expr::not(Expr::eq(var("x"), c(0))));
    let prog = program(vec![b.build().expect("build")], vec![]);
    let (eq, report) = execute(&prog, &CheckerOptions::default());
    assert_eq!(eq.count_kind("ASSUME"), 1);
    assert!(report.unwinding_limit_hits.is_empty());
}

#[test]
fn calls_rename_locals_per_instance_and_return_values() {
    let mut inc = FunctionBuilder::new("inc")
        .param("v", U8)
        .returns(U8);
    inc.ret(Some(Expr::binary(BinaryOp::Add, var("v"), c(1))));
    let mut main = FunctionBuilder::new("main").local("x", U8).local("y", U8);
    main.call(Some(var("x")), "inc", vec![var("y")])
        .call(Some(var("x")), "inc", vec![var("x")]);
    let prog = program(
        vec![main.build().expect("main"), inc.build().expect("inc")],
        vec![],
    );
    let (eq, _) = execute(&prog, &CheckerOptions::default());
    let params: Vec<_> = eq
        .steps()
        .iter()
        .filter_map(|s| match &s.kind {
            StepKind::Assignment {
                lhs,
                kind: AssignmentKind::Parameter,
                ..
            } => Some(lhs.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(params, vec!["v@2!1", "v@3!1"]);
    assert_eq!(eq.count_kind("FUNCTION-CALL"), 2);
    assert_eq!(eq.count_kind("FUNCTION-RETURN"), 2);
    assert!(!eq.steps().iter().any(
        |s| matches!(&s.kind, StepKind::FunctionReturn { function } if function == "main")
    ));
    assert!(eq
        .steps()
        .iter()
        .any(|s| matches!(&s.kind, StepKind::Assignment { lhs, .. } if lhs == "inc#return_value!1")));
}

#[test]
fn recursion_bound_stops_nested_calls() {
    let mut rec = FunctionBuilder::new("rec");
    rec.call(None, "rec", vec![]);
    let mut main = FunctionBuilder::new("main");
    main.call(None, "rec", vec![]);
    let prog = program(
        vec![main.build().expect("main"), rec.build().expect("rec")],
        vec![],
    );
    let options = CheckerOptions {
        recursion_bound: Some(2),
        ..CheckerOptions::default()
    };
    let (eq, report) = execute(&prog, &options);
    assert_eq!(report.unwinding_limit_hits.get("rec.recursion"), Some(&1));
    assert_eq!(asserts(&eq, "rec.recursion"), vec![&Expr::bool(false)]);
    assert_eq!(eq.count_kind("FUNCTION-CALL"), 3);
}

#[test]
fn threads_produce_shared_events() {
    let mut worker = FunctionBuilder::new("worker");
    worker.assign(var("g"), c(1));
    let mut main = FunctionBuilder::new("main");
    main.start_thread("worker")
        .assert("main.g", Expr::eq(var("g"), c(0)));
    let prog = program(
        vec![main.build().expect("main"), worker.build().expect("worker")],
        vec![Global {
            name: "g".into(),
            ty: U8,
            init: Some(c(0)),
        }],
    );
    let (eq, report) = execute(&prog, &CheckerOptions::default());
    assert_eq!(eq.thread_count(), 2);
    assert_eq!(report.threads, 2);
    assert_eq!(eq.count_kind("SPAWN"), 1);
    assert_eq!(eq.count_kind("SHARED-WRITE"), 2);
    assert_eq!(eq.count_kind("SHARED-READ"), 1);
    let worker_write = eq
        .steps()
        .iter()
        .find(|s| s.thread == 1 && matches!(s.kind, StepKind::SharedWrite { .. }));
    assert!(worker_write.is_some());
    // The assertion reads a shared symbol, so it is not folded.
    assert!(!asserts(&eq, "main.g")[0].is_true());
}

#[test]
fn cached_dereferences_share_one_read_per_instruction() {
    let mut main = FunctionBuilder::new("main");
    main.start_thread("main_worker").assert(
        "main.twice",
        Expr::eq(Expr::binary(BinaryOp::Add, var("g"), var("g")), c(2)),
    );
    let worker = FunctionBuilder::new("main_worker");
    let build = |cache| {
        let prog = program(
            vec![main.build().expect("main"), worker.build().expect("worker")],
            vec![Global {
                name: "g".into(),
                ty: U8,
                init: None,
            }],
        );
        let options = CheckerOptions {
            cache_dereferences: cache,
            ..CheckerOptions::default()
        };
        execute(&prog, &options).0.count_kind("SHARED-READ")
    };
    assert_eq!(build(false), 2);
    assert_eq!(build(true), 1);
}

#[test]
fn incremental_loop_pauses_each_iteration() {
    let mut b = FunctionBuilder::new("main").local("i", U8);
    b.assign(var("i"), c(0))
        .label("head")
        .assign(var("i"), Expr::binary(BinaryOp::Add, var("i"), c(1)))
        .assert("main.i", Expr::not(Expr::eq(var("i"), c(3))))
        .goto("head", Expr::bool(true));
    let prog = program(vec![b.build().expect("build")], vec![]);
    let options = CheckerOptions {
        incremental_loop: Some("main.0".into()),
        unwind_min: 2,
        unwind_max: Some(4),
        ..CheckerOptions::default()
    };
    let mut eq = Equation::new();
    let mut symex = SymbolicExecutor::new(&prog, &options);
    let mut pauses = Vec::new();
    loop {
        match symex.run(&mut eq).expect("symex") {
            SymexOutcome::Paused { iteration } => {
                pauses.push((iteration, asserts(&eq, "main.i").len()))
            }
            SymexOutcome::Finished => break,
        }
    }
    assert_eq!(pauses, vec![(2, 2), (3, 3), (4, 4)]);
    assert!(symex.is_finished());
    assert_eq!(asserts(&eq, "main.0.unwind").len(), 1);
}

#[test]
fn assertions_before_unwind_min_can_be_ignored() {
    let mut b = FunctionBuilder::new("main").local("i", U8);
    b.label("head")
        .assert("main.any", Expr::bool(true))
        .goto("head", Expr::bool(true));
    let prog = program(vec![b.build().expect("build")], vec![]);
    let options = CheckerOptions {
        incremental_loop: Some("main.0".into()),
        unwind_min: 3,
        unwind_max: Some(4),
        ignore_properties_before_unwind_min: true,
        ..CheckerOptions::default()
    };
    let mut eq = Equation::new();
    let mut symex = SymbolicExecutor::new(&prog, &options);
    while symex.run(&mut eq).expect("symex") != SymexOutcome::Finished {}
    assert_eq!(symex.report().ignored_assertions, 3);
    assert_eq!(asserts(&eq, "main.any").len(), 1);
}

#[test]
fn depth_limit_cuts_the_path_off_before_the_back_edge() {
    let prog = program(vec![counting_loop()], vec![]);
    let options = CheckerOptions {
        unwind: Some(4),
        depth: Some(3),
        ..CheckerOptions::default()
    };
    let (eq, report) = execute(&prog, &options);
    assert!(asserts(&eq, "main.done").is_empty());
    assert!(asserts(&eq, "main.0.unwind").is_empty());
    let lines: Vec<u32> = report.depth_cutoffs.iter().map(|l| l.line).collect();
    assert_eq!(lines, vec![4]);
}

#[test]
fn merged_paths_keep_the_shorter_depth() {
    let flag = Expr::symbol("flag", Type::Bool);
    let mut b = FunctionBuilder::new("main")
        .local("x", U8)
        .local("flag", Type::Bool);
    b.assign(flag.clone(), Expr::nondet(Type::Bool))
        .goto("skip", flag)
        .assign(var("x"), c(1))
        .assign(var("x"), c(2))
        .label("skip")
        .assert("main.end", Expr::bool(true));
    let prog = program(vec![b.build().expect("build")], vec![]);
    let options = CheckerOptions {
        depth: Some(4),
        ..CheckerOptions::default()
    };
    let (eq, report) = execute(&prog, &options);
    assert_eq!(asserts(&eq, "main.end").len(), 1);
    assert!(report.depth_cutoffs.is_empty());
}

#[test]
fn complexity_limit_abandons_paths_and_blacklists_loops() {
    let mut b = FunctionBuilder::new("main");
    b.label("head")
        .skip()
        .goto("head", Expr::nondet(Type::Bool))
        .assert("main.after", Expr::bool(true));
    let prog = program(vec![b.build().expect("build")], vec![]);
    let options = CheckerOptions {
        complexity_limit: Some(3),
        complexity_failed_child_loops_limit: 1,
        ..CheckerOptions::default()
    };
    let (_, report) = execute(&prog, &options);
    let in_loop: Vec<_> = report
        .abandoned_paths
        .iter()
        .filter(|p| p.loop_id.as_deref() == Some("main.0"))
        .collect();
    assert_eq!(in_loop.len(), 1);
    assert!(in_loop[0].guard_size > 3);
    assert_eq!(report.blacklisted_loops, vec!["main.0".to_string()]);
}

#[test]
fn uninitialised_reads_become_free_inputs() {
    let mut b = FunctionBuilder::new("main").local("x", U8).local("y", U8);
    b.assign(var("y"), var("x"))
        .assign(var("y"), Expr::binary(BinaryOp::Add, var("x"), var("y")));
    let prog = program(vec![b.build().expect("build")], vec![]);
    let (eq, report) = execute(&prog, &CheckerOptions::default());
    assert_eq!(eq.free_inputs().len(), 1);
    assert_eq!(report.reached.len(), 2);
}
