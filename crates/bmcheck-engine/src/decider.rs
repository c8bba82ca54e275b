//! Incremental decision of properties over a growing equation.
//!
//! One solver instance lives across all rounds of a run. Each round encodes
//! the steps that became live since the previous round; the query for a
//! property is a push/assert/check/pop on top of that base.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use bmcheck_ir::expr::Expr;
use bmcheck_ir::types::{Type, TypeTable};
use bmcheck_smt::backends::smtlib_printer::to_smtlib;
use bmcheck_smt::expr_encoding::{ExprEncoder, Translation};
use bmcheck_smt::solver::{ModelValue, SatResult, SmtSolver};
use bmcheck_smt::sorts::SmtSort;
use bmcheck_smt::struct_encoding::StructEncoder;
use bmcheck_smt::terms::SmtTerm;
use bmcheck_smt::EncodingError;
use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::equation::{Equation, Step, StepKind};
use crate::properties::{PropertyRegistry, PropertyStatus};
use crate::trace::{build_trace, ConcreteValue, ModelQuery, Trace};

/// Why the base encoding of a round could not be loaded.
#[derive(Debug)]
enum BaseFailure {
    Encoding(EncodingError),
    Solver(String),
}

impl std::fmt::Display for BaseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BaseFailure::Encoding(e) => write!(f, "{e}"),
            BaseFailure::Solver(e) => write!(f, "solver failure while encoding: {e}"),
        }
    }
}

impl From<EncodingError> for BaseFailure {
    fn from(err: EncodingError) -> Self {
        BaseFailure::Encoding(err)
    }
}

/// Outcome of one [`PropertyDecider::decide`] call.
#[derive(Debug, Clone, Default)]
pub struct DecisionRound {
    /// Properties handed to the solver or resolved syntactically.
    pub checked: usize,
    pub traces: Vec<Trace>,
    pub solver_time: Duration,
}

pub struct PropertyDecider<'t, S: SmtSolver> {
    solver: S,
    structs: StructEncoder<'t>,
    declared: HashSet<String>,
    asserted: HashSet<String>,
    /// Steps whose encoding is loaded in the solver.
    encoded: Vec<bool>,
    /// Constraint steps loaded in the solver.
    encoded_constraints: Vec<usize>,
    /// Current assumption chain symbol and the number of links so far.
    chain: SmtTerm,
    chain_links: usize,
    violations: IndexMap<String, Vec<SmtTerm>>,
    needs_rebuild: bool,
    solver_time: Duration,
}

impl<'t, S: SmtSolver> PropertyDecider<'t, S> {
    pub fn new(solver: S, types: &'t TypeTable) -> Self {
        Self {
            solver,
            structs: StructEncoder::new(types),
            declared: HashSet::new(),
            asserted: HashSet::new(),
            encoded: Vec::new(),
            encoded_constraints: Vec::new(),
            chain: SmtTerm::bool(true),
            chain_links: 0,
            violations: IndexMap::new(),
            needs_rebuild: true,
            solver_time: Duration::ZERO,
        }
    }

    /// Total time spent in satisfiability checks so far.
    pub fn solver_time(&self) -> Duration {
        self.solver_time
    }

    pub fn into_solver(self) -> S {
        self.solver
    }

    fn clear(&mut self) -> Result<(), S::Error> {
        self.solver.reset()?;
        self.declared.clear();
        self.asserted.clear();
        self.encoded.clear();
        self.encoded_constraints.clear();
        self.chain = SmtTerm::bool(true);
        self.chain_links = 0;
        self.violations.clear();
        self.needs_rebuild = false;
        Ok(())
    }

    fn declare(&mut self, declarations: &[(String, SmtSort)]) -> Result<(), S::Error> {
        for (name, sort) in declarations {
            if self.declared.insert(name.clone()) {
                self.solver.declare_var(name, sort)?;
            }
        }
        Ok(())
    }

    fn load(&mut self, translation: Translation) -> Result<(), S::Error> {
        self.declare(&translation.declarations)?;
        if self.asserted.insert(to_smtlib(&translation.term)) {
            self.solver.assert(&translation.term)?;
        }
        Ok(())
    }

    fn translate_bool(&self, expr: &Expr) -> Result<Translation, EncodingError> {
        ExprEncoder::new(&self.structs).translate_bool(expr)
    }

    /// Load every live step not yet in the solver.
    fn encode_new_steps(&mut self, equation: &Equation) -> Result<usize, BaseFailure> {
        let retracted = self
            .encoded_constraints
            .iter()
            .any(|&i| equation.step(i).map_or(true, |s| s.ignored));
        if retracted || self.needs_rebuild {
            debug!(retracted, "rebuilding solver state");
            self.clear()
                .map_err(|e| BaseFailure::Solver(e.to_string()))?;
        }
        self.encoded.resize(equation.len(), false);

        let mut fresh = 0usize;
        for (index, step) in equation.live_steps() {
            if self.encoded[index] {
                continue;
            }
            self.encode_step(index, step)?;
            self.encoded[index] = true;
            fresh += 1;
        }
        Ok(fresh)
    }

    fn encode_step(&mut self, index: usize, step: &Step) -> Result<(), BaseFailure> {
        let solver_err = |e: S::Error| BaseFailure::Solver(e.to_string());
        match &step.kind {
            StepKind::Assignment { lhs, ty, rhs, .. } => {
                let definition = Expr::eq(Expr::symbol(lhs.clone(), ty.clone()), rhs.clone());
                let translation = self.translate_bool(&definition)?;
                self.load(translation).map_err(solver_err)?;
            }
            StepKind::Assume { condition } => {
                let link = self.translate_bool(&Expr::implies(step.guard.clone(), condition.clone()))?;
                self.chain_links += 1;
                let name = format!("assume!{}", self.chain_links);
                let next = SmtTerm::var(name.clone());
                self.declare(&link.declarations).map_err(solver_err)?;
                self.declare(&[(name, SmtSort::Bool)])
                    .map_err(solver_err)?;
                let definition = next
                    .clone()
                    .eq(SmtTerm::and(vec![self.chain.clone(), link.term]));
                self.load(Translation {
                    term: definition,
                    declarations: Vec::new(),
                })
                .map_err(solver_err)?;
                self.chain = next;
            }
            StepKind::Assert {
                condition,
                property,
                ..
            } => {
                let violated = Expr::and(vec![step.guard.clone(), Expr::not(condition.clone())]);
                if violated.is_false() {
                    return Ok(());
                }
                let translation = self.translate_bool(&violated)?;
                self.declare(&translation.declarations).map_err(solver_err)?;
                let term = SmtTerm::and(vec![self.chain.clone(), translation.term]);
                self.violations
                    .entry(property.clone())
                    .or_default()
                    .push(term);
            }
            StepKind::Constraint { condition, .. } => {
                let constraint = Expr::implies(step.guard.clone(), condition.clone());
                let translation = self.translate_bool(&constraint)?;
                self.load(translation).map_err(solver_err)?;
                self.encoded_constraints.push(index);
            }
            StepKind::SharedRead { symbol, ty, .. } => {
                let sort = self.structs.sort_of(ty)?;
                self.declare(&[(symbol.clone(), sort)]).map_err(solver_err)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Decide every UNKNOWN property on the current equation.
    ///
    /// UNSAT only yields PASS when `set_pass` is set; otherwise the property
    /// stays UNKNOWN for a later, deeper round.
    pub fn decide(
        &mut self,
        equation: &Equation,
        registry: &mut PropertyRegistry,
        set_pass: bool,
    ) -> DecisionRound {
        let mut round = DecisionRound::default();
        let open = registry.ids_with_status(PropertyStatus::Unknown);
        if open.is_empty() {
            return round;
        }

        match self.encode_new_steps(equation) {
            Ok(fresh) => debug!(fresh, steps = equation.len(), "encoded equation"),
            Err(failure) => {
                warn!(error = %failure, "could not encode equation; open properties are ERROR");
                for id in &open {
                    registry.mark_error(id, failure.to_string());
                }
                round.checked = open.len();
                self.needs_rebuild = true;
                return round;
            }
        }

        for id in open {
            round.checked += 1;
            let violations = self.violations.get(&id).cloned().unwrap_or_default();
            if violations.is_empty() {
                if set_pass {
                    info!(property = %id, "property holds trivially");
                    registry.set_status(&id, PropertyStatus::Pass);
                }
                continue;
            }
            let query = if violations.len() == 1 {
                violations.into_iter().next().unwrap_or(SmtTerm::bool(false))
            } else {
                SmtTerm::or(violations)
            };
            self.check_property(equation, registry, &id, &query, set_pass, &mut round);
        }
        round
    }

    fn check_property(
        &mut self,
        equation: &Equation,
        registry: &mut PropertyRegistry,
        id: &str,
        query: &SmtTerm,
        set_pass: bool,
        round: &mut DecisionRound,
    ) {
        if let Err(e) = self.solver.push() {
            warn!(property = id, error = %e, "solver push failed");
            registry.mark_error(id, e.to_string());
            self.needs_rebuild = true;
            return;
        }
        let started = Instant::now();
        let result = self
            .solver
            .assert(query)
            .and_then(|()| self.solver.check_sat());
        let elapsed = started.elapsed();
        self.solver_time += elapsed;
        round.solver_time += elapsed;

        match result {
            Ok(SatResult::Sat) => {
                info!(property = id, "property violated - counterexample found");
                registry.set_status(id, PropertyStatus::Fail);
                let trace = {
                    let mut model = SolverModel {
                        solver: &mut self.solver,
                        structs: &self.structs,
                        declared: &self.declared,
                    };
                    build_trace(equation, &mut model, id)
                };
                if trace.failed_assertion().is_none() {
                    warn!(property = id, "model does not show the violated assertion");
                }
                round.traces.push(trace);
            }
            Ok(SatResult::Unsat) => {
                if set_pass {
                    info!(property = id, "property holds");
                    registry.set_status(id, PropertyStatus::Pass);
                } else {
                    debug!(property = id, "no violation at this bound");
                }
            }
            Ok(SatResult::Unknown(reason)) => {
                info!(property = id, %reason, "solver returned unknown");
                registry.mark_error(id, reason);
            }
            Err(e) => {
                warn!(property = id, error = %e, "solver error");
                registry.mark_error(id, e.to_string());
            }
        }

        if let Err(e) = self.solver.pop() {
            warn!(error = %e, "solver pop failed; solver state will be rebuilt");
            self.needs_rebuild = true;
        }
    }
}

/// Model access through the solver while a SAT result is current.
struct SolverModel<'a, 't, S: SmtSolver> {
    solver: &'a mut S,
    structs: &'a StructEncoder<'t>,
    declared: &'a HashSet<String>,
}

impl<S: SmtSolver> ModelQuery for SolverModel<'_, '_, S> {
    fn scalar_value(&mut self, expr: &Expr) -> Option<ConcreteValue> {
        let translation = ExprEncoder::new(self.structs).translate(expr).ok()?;
        if translation
            .declarations
            .iter()
            .any(|(name, _)| !self.declared.contains(name))
        {
            return None;
        }
        match self.solver.get_value(&translation.term) {
            Ok(Some(ModelValue::Bool(b))) => Some(ConcreteValue::Bool(b)),
            Ok(Some(ModelValue::BitVec { value, .. })) => match expr.ty() {
                Type::Struct(_) => None,
                ty => ConcreteValue::from_bits(ty, value),
            },
            Ok(None) => None,
            Err(e) => {
                debug!(error = %e, "model query failed");
                None
            }
        }
    }

    fn types(&self) -> &TypeTable {
        self.structs.types()
    }
}
