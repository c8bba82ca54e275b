#![allow(dead_code)]

use bmcheck_engine::{check, CheckReport, CheckerOptions};
use bmcheck_ir::expr::{BinaryOp, Expr};
use bmcheck_ir::program::{Function, Global, Program};
use bmcheck_ir::types::{Type, TypeTable};
use indexmap::IndexMap;

pub const U8: Type = Type::Unsigned(8);

pub fn var(name: &str) -> Expr {
    Expr::symbol(name, U8)
}

pub fn c(v: u64) -> Expr {
    Expr::constant(v, U8)
}

pub fn bin(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::binary(op, lhs, rhs)
}

pub fn program(functions: Vec<Function>, globals: Vec<Global>) -> Program {
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

pub fn global(name: &str, init: Option<u64>) -> Global {
    Global {
        name: name.into(),
        ty: U8,
        init: init.map(c),
    }
}

pub fn with_unwind(unwind: u32) -> CheckerOptions {
    CheckerOptions {
        unwind: Some(unwind),
        ..CheckerOptions::default()
    }
}

pub fn run(program: &Program, options: &CheckerOptions) -> CheckReport {
    check(program, options).unwrap_or_else(|e| panic!("check failed: {e}"))
}
