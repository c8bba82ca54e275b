//! Well-formedness check of the SSA equation.

use std::collections::HashSet;

use bmcheck_ir::expr::Expr;

use crate::equation::{Equation, StepKind};
use crate::error::CheckerError;

fn check_bool(expr: &Expr, what: &str, index: usize) -> Result<(), CheckerError> {
    if expr.ty().is_bool() {
        return Ok(());
    }
    Err(CheckerError::inconsistent(format!(
        "step {index}: {what} `{expr}` has type {} instead of bool",
        expr.ty()
    )))
}

fn check_defined(
    expr: &Expr,
    defined: &HashSet<String>,
    index: usize,
) -> Result<(), CheckerError> {
    let mut missing = None;
    expr.for_each_symbol(&mut |name, _| {
        if missing.is_none() && !defined.contains(name) {
            missing = Some(name.to_string());
        }
    });
    match missing {
        None => Ok(()),
        Some(name) => Err(CheckerError::inconsistent(format!(
            "step {index}: symbol `{name}` is used before it is defined"
        ))),
    }
}

/// Every symbol is defined once, live steps only read symbols defined by
/// earlier live steps or free inputs, and types agree.
pub fn validate(equation: &Equation) -> Result<(), CheckerError> {
    let mut defined_anywhere: HashSet<&str> = HashSet::new();
    for (index, step) in equation.steps().iter().enumerate() {
        if let Some((name, _)) = step.kind.defined_symbol() {
            if !defined_anywhere.insert(name) || equation.is_free_input(name) {
                return Err(CheckerError::inconsistent(format!(
                    "step {index}: symbol `{name}` is defined more than once"
                )));
            }
        }
    }

    let mut defined: HashSet<String> = equation.free_inputs().keys().cloned().collect();
    // Memory-model constraints may mention reads issued later in the
    // equation, so shared-read symbols count as defined up front.
    for step in equation.steps() {
        if let StepKind::SharedRead { symbol, .. } = &step.kind {
            defined.insert(symbol.clone());
        }
    }

    for (index, step) in equation.live_steps() {
        match &step.kind {
            StepKind::Assignment { lhs, ty, rhs, .. } => {
                check_bool(&step.guard, "guard", index)?;
                check_defined(&step.guard, &defined, index)?;
                check_defined(rhs, &defined, index)?;
                if rhs.ty() != ty {
                    return Err(CheckerError::inconsistent(format!(
                        "step {index}: `{lhs}` has type {ty} but is assigned {}",
                        rhs.ty()
                    )));
                }
                defined.insert(lhs.clone());
            }
            StepKind::Assume { condition }
            | StepKind::Assert { condition, .. }
            | StepKind::Constraint { condition, .. } => {
                check_bool(&step.guard, "guard", index)?;
                check_bool(condition, "condition", index)?;
                check_defined(&step.guard, &defined, index)?;
                check_defined(condition, &defined, index)?;
            }
            _ => {}
        }
    }
    Ok(())
}
