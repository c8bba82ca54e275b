//! The equation: a list of guarded SSA steps produced by symbolic execution.
//!
//! Steps are only ever appended. Post-processing may add constraint steps and
//! toggle the `ignored` flag, which hides a step from encoding without
//! removing it.

use std::collections::HashSet;
use std::fmt;

use bmcheck_ir::expr::Expr;
use bmcheck_ir::program::SourceLocation;
use bmcheck_ir::types::Type;
use indexmap::IndexMap;
use serde::Serialize;

pub type ThreadId = usize;

/// Why an assignment exists. Only state, parameter and return assignments
/// are shown in counterexample traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentKind {
    State,
    Phi,
    Hidden,
    Parameter,
    Return,
    NondetInit,
}

impl AssignmentKind {
    pub fn is_visible(self) -> bool {
        matches!(
            self,
            AssignmentKind::State | AssignmentKind::Parameter | AssignmentKind::Return
        )
    }
}

/// Where a constraint step came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintOrigin {
    MemoryModel,
    User,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    /// `lhs = rhs` where `lhs` is a fresh SSA symbol.
    Assignment {
        lhs: String,
        ty: Type,
        rhs: Expr,
        kind: AssignmentKind,
        /// Name of the program variable the symbol is a version of.
        source: String,
    },
    Assume {
        condition: Expr,
    },
    Assert {
        condition: Expr,
        property: String,
        /// Distinguishes repeated executions of the same assertion.
        instance: u32,
        message: String,
    },
    /// Read of a shared variable into the fresh symbol `symbol`.
    SharedRead {
        symbol: String,
        ty: Type,
        variable: String,
    },
    /// Write of the symbol `symbol` to a shared variable.
    SharedWrite {
        symbol: String,
        ty: Type,
        variable: String,
    },
    FunctionCall {
        function: String,
        arguments: Vec<Expr>,
    },
    FunctionReturn {
        function: String,
    },
    Constraint {
        condition: Expr,
        origin: ConstraintOrigin,
    },
    Spawn {
        child: ThreadId,
    },
    Output {
        label: String,
        values: Vec<Expr>,
    },
    Location,
}

impl StepKind {
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Assignment { .. } => "ASSIGNMENT",
            StepKind::Assume { .. } => "ASSUME",
            StepKind::Assert { .. } => "ASSERT",
            StepKind::SharedRead { .. } => "SHARED-READ",
            StepKind::SharedWrite { .. } => "SHARED-WRITE",
            StepKind::FunctionCall { .. } => "FUNCTION-CALL",
            StepKind::FunctionReturn { .. } => "FUNCTION-RETURN",
            StepKind::Constraint { .. } => "CONSTRAINT",
            StepKind::Spawn { .. } => "SPAWN",
            StepKind::Output { .. } => "OUTPUT",
            StepKind::Location => "LOCATION",
        }
    }

    /// Symbol defined by this step, if any.
    pub fn defined_symbol(&self) -> Option<(&str, &Type)> {
        match self {
            StepKind::Assignment { lhs, ty, .. } => Some((lhs, ty)),
            StepKind::SharedRead { symbol, ty, .. } => Some((symbol, ty)),
            _ => None,
        }
    }

    /// Expressions read by this step, excluding its guard.
    pub fn operands(&self) -> Vec<&Expr> {
        match self {
            StepKind::Assignment { rhs, .. } => vec![rhs],
            StepKind::Assume { condition }
            | StepKind::Assert { condition, .. }
            | StepKind::Constraint { condition, .. } => vec![condition],
            StepKind::FunctionCall { arguments, .. } => arguments.iter().collect(),
            StepKind::Output { values, .. } => values.iter().collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub kind: StepKind,
    /// Path condition under which the step happens.
    pub guard: Expr,
    pub location: SourceLocation,
    pub thread: ThreadId,
    pub ignored: bool,
}

impl Step {
    pub fn new(kind: StepKind, guard: Expr, location: SourceLocation, thread: ThreadId) -> Self {
        Self {
            kind,
            guard,
            location,
            thread,
            ignored: false,
        }
    }

    pub fn is_assert(&self) -> bool {
        matches!(self.kind, StepKind::Assert { .. })
    }

    pub fn property(&self) -> Option<&str> {
        match &self.kind {
            StepKind::Assert { property, .. } => Some(property),
            _ => None,
        }
    }

    pub fn is_shared_access(&self) -> bool {
        matches!(
            self.kind,
            StepKind::SharedRead { .. } | StepKind::SharedWrite { .. }
        )
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[t{}] {} ", self.thread, self.kind.name())?;
        match &self.kind {
            StepKind::Assignment { lhs, rhs, .. } => write!(f, "{lhs} = {rhs}")?,
            StepKind::Assume { condition } | StepKind::Constraint { condition, .. } => {
                write!(f, "{condition}")?
            }
            StepKind::Assert {
                condition,
                property,
                instance,
                ..
            } => write!(f, "{property}#{instance}: {condition}")?,
            StepKind::SharedRead {
                symbol, variable, ..
            } => write!(f, "{symbol} <- {variable}")?,
            StepKind::SharedWrite {
                symbol, variable, ..
            } => write!(f, "{variable} <- {symbol}")?,
            StepKind::FunctionCall { function, .. } => write!(f, "{function}")?,
            StepKind::FunctionReturn { function } => write!(f, "{function}")?,
            StepKind::Spawn { child } => write!(f, "t{child}")?,
            StepKind::Output { label, .. } => write!(f, "{label}")?,
            StepKind::Location => {}
        }
        write!(f, " if {}", self.guard)?;
        if self.ignored {
            write!(f, " (ignored)")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Equation {
    steps: Vec<Step>,
    /// Unconstrained symbols: nondeterministic values, uninitialised reads
    /// and memory-model clocks/choices.
    free_inputs: IndexMap<String, Type>,
    threads: usize,
    /// Shared events covered by the last memory-model pass.
    ordered_events: usize,
}

impl Equation {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            free_inputs: IndexMap::new(),
            threads: 1,
            ordered_events: 0,
        }
    }

    /// Append a step and return its index.
    pub fn push(&mut self, step: Step) -> usize {
        if let StepKind::Spawn { child } = step.kind {
            self.threads = self.threads.max(child + 1);
        }
        self.steps.push(step);
        self.steps.len() - 1
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Non-ignored steps with their indices.
    pub fn live_steps(&self) -> impl Iterator<Item = (usize, &Step)> {
        self.steps.iter().enumerate().filter(|(_, s)| !s.ignored)
    }

    pub fn set_ignored(&mut self, index: usize, ignored: bool) {
        if let Some(step) = self.steps.get_mut(index) {
            step.ignored = ignored;
        }
    }

    pub fn add_free_input(&mut self, name: impl Into<String>, ty: Type) {
        self.free_inputs.insert(name.into(), ty);
    }

    pub fn free_inputs(&self) -> &IndexMap<String, Type> {
        &self.free_inputs
    }

    pub fn is_free_input(&self, name: &str) -> bool {
        self.free_inputs.contains_key(name)
    }

    pub fn thread_count(&self) -> usize {
        self.threads
    }

    pub(crate) fn ordered_events(&self) -> usize {
        self.ordered_events
    }

    pub(crate) fn set_ordered_events(&mut self, count: usize) {
        self.ordered_events = count;
    }

    /// Property ids of all assertion steps in first-occurrence order.
    pub fn property_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.steps
            .iter()
            .filter_map(Step::property)
            .filter(|p| seen.insert(*p))
            .collect()
    }

    /// Live assertion steps of `property`.
    pub fn instances_of<'a>(&'a self, property: &'a str) -> impl Iterator<Item = (usize, &'a Step)> {
        self.live_steps()
            .filter(move |(_, s)| s.property() == Some(property))
    }

    pub fn count_kind(&self, name: &str) -> usize {
        self.steps.iter().filter(|s| s.kind.name() == name).count()
    }
}

impl Default for Equation {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Equation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            writeln!(f, "{i:>4}: {step}")?;
        }
        Ok(())
    }
}

impl Equation {
    /// The steps left after post-processing, one per line.
    pub fn render_program(&self) -> String {
        let mut out = String::new();
        for (i, step) in self.live_steps() {
            out.push_str(&format!("{i:>4}: {step}\n"));
        }
        out
    }

    /// One verification condition per live assertion: the assignments,
    /// assumptions and constraints before it, then the goal it must prove.
    pub fn render_vccs(&self) -> String {
        let mut out = String::new();
        let mut premises: Vec<String> = Vec::new();
        for (_, step) in self.live_steps() {
            match &step.kind {
                StepKind::Assignment { lhs, rhs, .. } => premises.push(format!("{lhs} = {rhs}")),
                StepKind::Assume { condition } | StepKind::Constraint { condition, .. } => {
                    premises.push(guarded(&step.guard, condition))
                }
                StepKind::Assert {
                    condition,
                    property,
                    instance,
                    ..
                } => {
                    out.push_str(&format!("VCC {property}#{instance} ({})\n", step.location));
                    for (n, premise) in premises.iter().enumerate() {
                        out.push_str(&format!("{{-{}}} {premise}\n", n + 1));
                    }
                    out.push_str("|--------------------------\n");
                    out.push_str(&format!("{{1}} {}\n\n", guarded(&step.guard, condition)));
                }
                _ => {}
            }
        }
        out
    }
}

fn guarded(guard: &Expr, condition: &Expr) -> String {
    if guard.is_true() {
        condition.to_string()
    } else {
        format!("{guard} => {condition}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_step(property: &str, instance: u32) -> Step {
        Step::new(
            StepKind::Assert {
                condition: Expr::bool(true),
                property: property.into(),
                instance,
                message: String::new(),
            },
            Expr::bool(true),
            SourceLocation::default(),
            0,
        )
    }

    #[test]
    fn property_ids_are_deduplicated_in_order() {
        let mut eq = Equation::new();
        eq.push(assert_step("main.b", 1));
        eq.push(assert_step("main.a", 1));
        eq.push(assert_step("main.b", 2));
        assert_eq!(eq.property_ids(), vec!["main.b", "main.a"]);
        assert_eq!(eq.instances_of("main.b").count(), 2);
    }

    #[test]
    fn ignored_steps_are_not_live() {
        let mut eq = Equation::new();
        let i = eq.push(assert_step("p", 1));
        eq.push(assert_step("p", 2));
        eq.set_ignored(i, true);
        assert_eq!(eq.live_steps().count(), 1);
        assert_eq!(eq.len(), 2);
    }

    #[test]
    fn spawn_raises_thread_count() {
        let mut eq = Equation::new();
        assert_eq!(eq.thread_count(), 1);
        eq.push(Step::new(
            StepKind::Spawn { child: 2 },
            Expr::bool(true),
            SourceLocation::default(),
            0,
        ));
        assert_eq!(eq.thread_count(), 3);
    }

    #[test]
    fn display_marks_ignored_steps() {
        let mut eq = Equation::new();
        let i = eq.push(Step::new(
            StepKind::Assignment {
                lhs: "x!1".into(),
                ty: Type::Unsigned(8),
                rhs: Expr::constant(3, Type::Unsigned(8)),
                kind: AssignmentKind::State,
                source: "x".into(),
            },
            Expr::bool(true),
            SourceLocation::default(),
            0,
        ));
        eq.set_ignored(i, true);
        let text = eq.to_string();
        assert!(text.contains("ASSIGNMENT x!1 = "), "{text}");
        assert!(text.contains("(ignored)"), "{text}");
    }

    fn assignment(lhs: &str, value: u64) -> Step {
        Step::new(
            StepKind::Assignment {
                lhs: lhs.into(),
                ty: Type::Unsigned(8),
                rhs: Expr::constant(value, Type::Unsigned(8)),
                kind: AssignmentKind::State,
                source: "x".into(),
            },
            Expr::bool(true),
            SourceLocation::default(),
            0,
        )
    }

    #[test]
    fn rendered_program_skips_ignored_steps() {
        let mut eq = Equation::new();
        eq.push(assignment("x!1", 3));
        let dropped = eq.push(assignment("x!2", 4));
        eq.set_ignored(dropped, true);
        let text = eq.render_program();
        assert!(text.contains("ASSIGNMENT x!1 = 3"), "{text}");
        assert!(!text.contains("x!2"), "{text}");
    }

    #[test]
    fn each_assertion_gets_a_condition_over_the_steps_before_it() {
        let mut eq = Equation::new();
        eq.push(assignment("x!1", 3));
        eq.push(Step::new(
            StepKind::Assume {
                condition: Expr::symbol("c", Type::Bool),
            },
            Expr::symbol("g", Type::Bool),
            SourceLocation::default(),
            0,
        ));
        eq.push(Step::new(
            StepKind::Assert {
                condition: Expr::symbol("ok", Type::Bool),
                property: "main.first".into(),
                instance: 1,
                message: String::new(),
            },
            Expr::bool(true),
            SourceLocation::default(),
            0,
        ));
        eq.push(assignment("x!2", 4));
        eq.push(assert_step("main.second", 1));

        let text = eq.render_vccs();
        let blocks: Vec<&str> = text.split("\n\n").filter(|b| !b.is_empty()).collect();
        assert_eq!(blocks.len(), 2, "{text}");
        assert!(blocks[0].starts_with("VCC main.first#1"), "{text}");
        assert!(blocks[0].contains("{-1} x!1 = 3"), "{text}");
        assert!(blocks[0].contains("{-2} g => c"), "{text}");
        assert!(blocks[0].ends_with("{1} ok"), "{text}");
        assert!(!blocks[0].contains("x!2"), "{text}");
        assert!(blocks[1].contains("{-3} x!2 = 4"), "{text}");
    }
}
