//! Partial-order constraints over the shared-memory events of a concurrent
//! equation.
//!
//! Every shared read or write gets a 32-bit clock. Program order, thread
//! creation and the read-from choice of each read are expressed as clock
//! comparisons. A read picks exactly the value of some active write that
//! precedes it with no other active write in between.

use std::collections::BTreeMap;

use bmcheck_ir::expr::{BinaryOp, Expr};
use bmcheck_ir::types::Type;
use serde::Serialize;
use tracing::debug;

use crate::equation::{ConstraintOrigin, Equation, Step, StepKind, ThreadId};
use crate::options::MemoryModel;

const CLOCK: Type = Type::Unsigned(32);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryModelStats {
    pub events: usize,
    pub constraints: usize,
    pub retracted: usize,
}

#[derive(Debug, Clone)]
struct Event {
    step: usize,
    thread: ThreadId,
    is_write: bool,
    variable: String,
    symbol: Expr,
    guard: Expr,
}

fn clock_name(event: &Event) -> String {
    format!("clock!{}", event.step)
}

fn clock(event: &Event) -> Expr {
    Expr::symbol(clock_name(event), CLOCK)
}

fn before(a: &Event, b: &Event) -> Expr {
    Expr::binary(BinaryOp::Lt, clock(a), clock(b))
}

fn collect_events(equation: &Equation) -> Vec<Event> {
    equation
        .steps()
        .iter()
        .enumerate()
        .filter_map(|(step, s)| {
            let (symbol, ty, variable, is_write) = match &s.kind {
                StepKind::SharedRead {
                    symbol,
                    ty,
                    variable,
                } => (symbol, ty, variable, false),
                StepKind::SharedWrite {
                    symbol,
                    ty,
                    variable,
                } => (symbol, ty, variable, true),
                _ => return None,
            };
            Some(Event {
                step,
                thread: s.thread,
                is_write,
                variable: variable.clone(),
                symbol: Expr::symbol(symbol.clone(), ty.clone()),
                guard: s.guard.clone(),
            })
        })
        .collect()
}

/// Whether program order between `earlier` and `later` of one thread is
/// kept by `model`.
fn keeps_order(model: MemoryModel, earlier: &Event, later: &Event) -> bool {
    match model {
        MemoryModel::SequentialConsistency => true,
        MemoryModel::TotalStoreOrder => {
            !(earlier.is_write && !later.is_write && earlier.variable != later.variable)
        }
    }
}

/// Add ordering constraints for all shared events. Constraints from an
/// earlier pass are retracted first when new events appeared since.
pub fn apply(equation: &mut Equation, model: MemoryModel) -> MemoryModelStats {
    let events = collect_events(equation);
    let mut stats = MemoryModelStats {
        events: events.len(),
        ..MemoryModelStats::default()
    };
    if events.len() == equation.ordered_events() {
        return stats;
    }

    let previous: Vec<usize> = equation
        .live_steps()
        .filter(|(_, s)| {
            matches!(
                s.kind,
                StepKind::Constraint {
                    origin: ConstraintOrigin::MemoryModel,
                    ..
                }
            )
        })
        .map(|(i, _)| i)
        .collect();
    for index in &previous {
        equation.set_ignored(*index, true);
    }
    stats.retracted = previous.len();

    let mut constraints: Vec<(usize, Expr)> = Vec::new();
    let mut by_thread: BTreeMap<ThreadId, Vec<&Event>> = BTreeMap::new();
    for event in &events {
        equation.add_free_input(clock_name(event), CLOCK);
        by_thread.entry(event.thread).or_default().push(event);
    }

    for thread_events in by_thread.values() {
        match model {
            MemoryModel::SequentialConsistency => {
                for pair in thread_events.windows(2) {
                    constraints.push((pair[1].step, before(pair[0], pair[1])));
                }
            }
            MemoryModel::TotalStoreOrder => {
                for (i, earlier) in thread_events.iter().enumerate() {
                    for later in &thread_events[i + 1..] {
                        if keeps_order(model, earlier, later) {
                            constraints.push((later.step, before(earlier, later)));
                        }
                    }
                }
            }
        }
    }

    for (spawn_step, step) in equation.steps().iter().enumerate() {
        let StepKind::Spawn { child } = step.kind else {
            continue;
        };
        let parent_last = events
            .iter()
            .filter(|e| e.thread == step.thread && e.step < spawn_step)
            .last();
        let child_first = events.iter().find(|e| e.thread == child);
        if let (Some(parent), Some(first)) = (parent_last, child_first) {
            constraints.push((first.step, before(parent, first)));
        }
    }

    for read in events.iter().filter(|e| !e.is_write) {
        let writes: Vec<&Event> = events
            .iter()
            .filter(|w| w.is_write && w.variable == read.variable)
            .collect();
        let mut choices = Vec::with_capacity(writes.len());
        for write in &writes {
            let name = format!("rf!{}!{}", read.step, write.step);
            equation.add_free_input(name.clone(), Type::Bool);
            let choice = Expr::symbol(name, Type::Bool);
            constraints.push((
                read.step,
                Expr::implies(
                    choice.clone(),
                    Expr::and(vec![
                        write.guard.clone(),
                        Expr::eq(read.symbol.clone(), write.symbol.clone()),
                        before(write, read),
                    ]),
                ),
            ));
            for other in writes.iter().filter(|o| o.step != write.step) {
                constraints.push((
                    read.step,
                    Expr::implies(
                        Expr::and(vec![choice.clone(), other.guard.clone()]),
                        Expr::or(vec![before(other, write), before(read, other)]),
                    ),
                ));
            }
            choices.push(choice);
        }
        constraints.push((
            read.step,
            Expr::implies(read.guard.clone(), Expr::or(choices)),
        ));
    }

    stats.constraints = constraints.len();
    for (anchor, condition) in constraints {
        let location = equation
            .step(anchor)
            .map(|s| s.location.clone())
            .unwrap_or_default();
        equation.push(Step::new(
            StepKind::Constraint {
                condition,
                origin: ConstraintOrigin::MemoryModel,
            },
            Expr::bool(true),
            location,
            0,
        ));
    }
    equation.set_ordered_events(events.len());
    debug!(
        events = stats.events,
        constraints = stats.constraints,
        retracted = stats.retracted,
        ?model,
        "memory model constraints added"
    );
    stats
}
