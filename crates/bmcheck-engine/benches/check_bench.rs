use criterion::{black_box, criterion_group, criterion_main, Criterion};

use bmcheck_engine::equation::Equation;
use bmcheck_engine::symex::SymbolicExecutor;
use bmcheck_engine::{check, CheckerOptions};
use bmcheck_ir::builder::FunctionBuilder;
use bmcheck_ir::expr::{BinaryOp, Expr};
use bmcheck_ir::program::Program;
use bmcheck_ir::types::{Type, TypeTable};
use indexmap::IndexMap;

const U8: Type = Type::Unsigned(8);

/// sum = 0; for (i = 0; i < n; i++) if (nondet) sum += i; assert(sum <= 45)
fn summing_loop() -> Program {
    let var = |name: &str| Expr::symbol(name, U8);
    let c = |v: u64| Expr::constant(v, U8);
    let mut b = FunctionBuilder::new("main").local("i", U8).local("sum", U8);
    b.assign(var("sum"), c(0))
        .assign(var("i"), c(0))
        .label("head")
        .goto("exit", Expr::not(Expr::binary(BinaryOp::Lt, var("i"), c(10))))
        .goto("skip", Expr::nondet(Type::Bool))
        .assign(var("sum"), Expr::binary(BinaryOp::Add, var("sum"), var("i")))
        .label("skip")
        .assign(var("i"), Expr::binary(BinaryOp::Add, var("i"), c(1)))
        .goto("head", Expr::bool(true))
        .label("exit")
        .assert("main.sum", Expr::binary(BinaryOp::Le, var("sum"), c(45)));
    let main = b.build().unwrap();
    let mut functions = IndexMap::new();
    functions.insert(main.name.clone(), main);
    Program {
        types: TypeTable::new(),
        globals: Vec::new(),
        functions,
        entry: "main".into(),
    }
}

fn options() -> CheckerOptions {
    CheckerOptions {
        unwind: Some(11),
        ..CheckerOptions::default()
    }
}

fn bench_symex(c: &mut Criterion) {
    let program = summing_loop();
    let options = options();
    c.bench_function("symex_summing_loop", |b| {
        b.iter(|| {
            let mut equation = Equation::new();
            let mut executor = SymbolicExecutor::new(black_box(&program), &options);
            executor.run(&mut equation).unwrap();
            equation.len()
        })
    });
}

fn bench_check(c: &mut Criterion) {
    let program = summing_loop();
    let options = options();
    c.bench_function("check_summing_loop", |b| {
        b.iter(|| check(black_box(&program), &options).unwrap())
    });
}

criterion_group!(benches, bench_symex, bench_check);
criterion_main!(benches);
