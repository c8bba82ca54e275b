//! Backward slicing by symbol dependencies.
//!
//! Steps are never removed; slicing only sets their `ignored` flag, and each
//! pass recomputes it from scratch so later rounds may revive steps.

use std::collections::HashSet;

use bmcheck_ir::expr::Expr;
use serde::Serialize;
use tracing::debug;

use crate::equation::{Equation, StepKind};
use crate::properties::PropertyRegistry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SliceStats {
    pub kept: usize,
    pub ignored: usize,
}

fn collect(expr: &Expr, into: &mut HashSet<String>) {
    expr.for_each_symbol(&mut |name, _| {
        into.insert(name.to_string());
    });
}

/// Keep the assignments the open properties, assumptions and constraints
/// depend on. Assertions of resolved properties are ignored.
pub fn slice(equation: &mut Equation, registry: &PropertyRegistry) -> SliceStats {
    let steps = equation.steps();
    let mut needed = HashSet::new();
    let mut keep = vec![true; steps.len()];

    for (i, step) in steps.iter().enumerate() {
        match &step.kind {
            StepKind::Assert {
                condition,
                property,
                ..
            } => {
                if registry.is_resolved(property) {
                    keep[i] = false;
                } else {
                    collect(condition, &mut needed);
                    collect(&step.guard, &mut needed);
                }
            }
            StepKind::Assume { condition } => {
                collect(condition, &mut needed);
                collect(&step.guard, &mut needed);
            }
            StepKind::Constraint { condition, .. } if !step.ignored => {
                collect(condition, &mut needed);
            }
            StepKind::SharedWrite { symbol, .. } => {
                needed.insert(symbol.clone());
                collect(&step.guard, &mut needed);
            }
            StepKind::SharedRead { .. } => collect(&step.guard, &mut needed),
            _ => {}
        }
    }

    for (i, step) in steps.iter().enumerate().rev() {
        let StepKind::Assignment { lhs, rhs, .. } = &step.kind else {
            continue;
        };
        // Constant assignments cost nothing and keep traces readable.
        if needed.contains(lhs) || rhs.as_constant().is_some() {
            collect(rhs, &mut needed);
            collect(&step.guard, &mut needed);
        } else {
            keep[i] = false;
        }
    }

    let mut stats = SliceStats::default();
    for (i, kept) in keep.into_iter().enumerate() {
        let is_constraint = equation
            .step(i)
            .is_some_and(|s| matches!(s.kind, StepKind::Constraint { .. }));
        if is_constraint {
            continue;
        }
        equation.set_ignored(i, !kept);
        if kept {
            stats.kept += 1;
        } else {
            stats.ignored += 1;
        }
    }
    debug!(kept = stats.kept, ignored = stats.ignored, "sliced equation");
    stats
}
