//! Checker configuration.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordering model applied to shared-memory events of concurrent programs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryModel {
    /// Sequential consistency: program order is preserved between every pair
    /// of events of one thread.
    #[default]
    SequentialConsistency,
    /// Total store order: a read may overtake an earlier write of the same
    /// thread to a different variable.
    TotalStoreOrder,
}

/// What an UNSAT answer means while the incremental loop is still unrolling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncrementalTrust {
    /// Properties stay open until the final round; a later unrolling may
    /// still reach new violating instances.
    #[default]
    Recheck,
    /// UNSAT at a shallower bound is taken as PASS immediately.
    TrustShallowerBounds,
}

/// Which SMT solver backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverChoice {
    #[default]
    Z3,
    Cvc5,
}

impl std::fmt::Display for SolverChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolverChoice::Z3 => write!(f, "z3"),
            SolverChoice::Cvc5 => write!(f, "cvc5"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerOptions {
    /// Default loop unwinding bound. `None` unrolls until the loop condition
    /// becomes false.
    pub unwind: Option<u32>,
    /// Per-loop bounds keyed by loop id (`"<function>.<n>"`).
    pub unwind_set: IndexMap<String, u32>,
    /// Bound on nested activations of one function. Falls back to `unwind`.
    pub recursion_bound: Option<u32>,
    pub unwinding_assertions: bool,
    pub partial_loops: bool,
    pub self_loops_to_assumptions: bool,
    pub memory_model: MemoryModel,
    pub slice_formula: bool,
    /// Largest guard (in expression nodes) a path may carry before it is
    /// abandoned.
    pub complexity_limit: Option<usize>,
    /// Abandoned paths inside one loop before the loop is blacklisted.
    pub complexity_failed_child_loops_limit: usize,
    /// Instructions a single path may execute before it is cut off.
    pub depth: Option<u32>,
    /// Loop id that is unrolled one iteration per checking round.
    pub incremental_loop: Option<String>,
    pub unwind_min: u32,
    pub unwind_max: Option<u32>,
    pub ignore_properties_before_unwind_min: bool,
    pub incremental_trust: IncrementalTrust,
    pub cache_dereferences: bool,
    pub validate_ssa: bool,
    pub solver: SolverChoice,
    /// Per-check solver timeout; 0 disables it.
    pub timeout_secs: u64,
    pub stop_on_fail: bool,
    pub graphml_witness: Option<PathBuf>,
    pub coverage_report: Option<PathBuf>,
}

impl Default for CheckerOptions {
    fn default() -> Self {
        Self {
            unwind: None,
            unwind_set: IndexMap::new(),
            recursion_bound: None,
            unwinding_assertions: true,
            partial_loops: false,
            self_loops_to_assumptions: true,
            memory_model: MemoryModel::default(),
            slice_formula: true,
            complexity_limit: None,
            complexity_failed_child_loops_limit: 2,
            depth: None,
            incremental_loop: None,
            unwind_min: 0,
            unwind_max: None,
            ignore_properties_before_unwind_min: false,
            incremental_trust: IncrementalTrust::default(),
            cache_dereferences: false,
            validate_ssa: false,
            solver: SolverChoice::default(),
            timeout_secs: 0,
            stop_on_fail: false,
            graphml_witness: None,
            coverage_report: None,
        }
    }
}

impl CheckerOptions {
    /// Bound for the loop `loop_id`. The incremental loop is bounded by
    /// `unwind_max` only.
    pub fn loop_bound(&self, loop_id: &str) -> Option<u32> {
        if self.incremental_loop.as_deref() == Some(loop_id) {
            return self.unwind_max;
        }
        self.unwind_set.get(loop_id).copied().or(self.unwind)
    }

    pub fn recursion_limit(&self) -> Option<u32> {
        self.recursion_bound.or(self.unwind)
    }

    pub fn is_incremental(&self) -> bool {
        self.incremental_loop.is_some()
    }
}

/// What to print instead of deciding properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EquationView {
    /// The steps left after post-processing.
    Program,
    /// One verification condition per assertion.
    Vccs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let opts = CheckerOptions::default();
        assert!(opts.unwinding_assertions);
        assert!(opts.self_loops_to_assumptions);
        assert!(opts.slice_formula);
        assert!(!opts.partial_loops);
        assert_eq!(opts.complexity_failed_child_loops_limit, 2);
        assert_eq!(opts.depth, None);
        assert_eq!(opts.solver, SolverChoice::Z3);
        assert_eq!(opts.memory_model, MemoryModel::SequentialConsistency);
    }

    #[test]
    fn per_loop_bound_overrides_default() {
        let mut opts = CheckerOptions {
            unwind: Some(3),
            ..CheckerOptions::default()
        };
        opts.unwind_set.insert("main.1".into(), 7);
        assert_eq!(opts.loop_bound("main.0"), Some(3));
        assert_eq!(opts.loop_bound("main.1"), Some(7));
        assert_eq!(opts.recursion_limit(), Some(3));
    }

    #[test]
    fn incremental_loop_uses_unwind_max() {
        let opts = CheckerOptions {
            unwind: Some(2),
            incremental_loop: Some("main.0".into()),
            unwind_max: Some(9),
            ..CheckerOptions::default()
        };
        assert_eq!(opts.loop_bound("main.0"), Some(9));
        assert_eq!(opts.loop_bound("main.1"), Some(2));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: CheckerOptions =
            serde_json::from_str(r#"{"unwind": 4, "memory_model": "total_store_order"}"#)
                .expect("parse options");
        assert_eq!(opts.unwind, Some(4));
        assert_eq!(opts.memory_model, MemoryModel::TotalStoreOrder);
        assert!(opts.unwinding_assertions);
    }
}
