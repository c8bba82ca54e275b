//! Orchestration of a checking run: execute, post-process, decide, repeat
//! for incremental unwinding, then report.

use bmcheck_ir::program::Program;
use bmcheck_ir::validation::validate_program;
use bmcheck_smt::backends::cvc5_backend::Cvc5Solver;
use bmcheck_smt::backends::z3_backend::Z3Solver;
use bmcheck_smt::solver::SmtSolver;
use tracing::{info, warn};

use crate::decider::PropertyDecider;
use crate::equation::{Equation, StepKind};
use crate::error::CheckerError;
use crate::options::{CheckerOptions, EquationView, IncrementalTrust, SolverChoice};
use crate::postprocess::{postprocess, PostprocessStats};
use crate::properties::{PropertyRegistry, PropertyStatus};
use crate::report::{self, CheckReport};
use crate::symex::{SymbolicExecutor, SymexOutcome};

/// Check `program` with the solver selected in `options`.
pub fn check(program: &Program, options: &CheckerOptions) -> Result<CheckReport, CheckerError> {
    info!(solver = %options.solver, "starting bounded model check");
    match options.solver {
        SolverChoice::Z3 => check_with_solver(
            program,
            options,
            Z3Solver::with_timeout_secs(options.timeout_secs),
        ),
        SolverChoice::Cvc5 => {
            let solver = Cvc5Solver::with_timeout_secs(options.timeout_secs)
                .map_err(|e| CheckerError::Solver(e.to_string()))?;
            check_with_solver(program, options, solver)
        }
    }
}

/// Properties created during execution (unwinding and recursion checks)
/// are registered the first time one of their instances shows up.
fn register_generated_properties(equation: &Equation, registry: &mut PropertyRegistry) {
    for step in equation.steps() {
        if let StepKind::Assert {
            property, message, ..
        } = &step.kind
        {
            registry.register(property, message, step.location.clone());
        }
    }
}

/// Execute `program` to completion and render the post-processed equation
/// without asking a solver about it.
pub fn show_equation(
    program: &Program,
    options: &CheckerOptions,
    view: EquationView,
) -> Result<String, CheckerError> {
    validate_program(program)?;

    let mut registry = PropertyRegistry::new();
    for (id, description, location) in program.assertions() {
        registry.register(id, description, location.clone());
    }

    let mut equation = Equation::new();
    let mut executor = SymbolicExecutor::new(program, options);
    while executor.run(&mut equation)? != SymexOutcome::Finished {}

    register_generated_properties(&equation, &mut registry);
    for id in equation.property_ids() {
        registry.include(id);
    }
    postprocess(&mut equation, &registry, options)?;
    info!(
        steps = equation.len(),
        live = equation.live_steps().count(),
        ?view,
        "equation ready; skipping the decision procedure"
    );

    Ok(match view {
        EquationView::Program => equation.render_program(),
        EquationView::Vccs => equation.render_vccs(),
    })
}

pub fn check_with_solver<S: SmtSolver>(
    program: &Program,
    options: &CheckerOptions,
    solver: S,
) -> Result<CheckReport, CheckerError> {
    validate_program(program)?;

    let mut registry = PropertyRegistry::new();
    for (id, description, location) in program.assertions() {
        registry.register(id, description, location.clone());
    }

    let mut equation = Equation::new();
    let mut executor = SymbolicExecutor::new(program, options);
    let mut decider = PropertyDecider::new(solver, &program.types);
    let trusting = options.incremental_trust == IncrementalTrust::TrustShallowerBounds;
    let mut rounds = 0usize;
    let mut traces = Vec::new();
    let mut postprocess_stats: PostprocessStats;

    loop {
        let outcome = executor.run(&mut equation)?;
        rounds += 1;
        let finished = outcome == SymexOutcome::Finished;

        register_generated_properties(&equation, &mut registry);
        for id in equation.property_ids() {
            registry.include(id);
        }
        postprocess_stats = postprocess(&mut equation, &registry, options)?;

        info!(
            round = rounds,
            steps = equation.len(),
            ?outcome,
            "BMC: deciding properties"
        );
        let decision = decider.decide(&equation, &mut registry, finished || trusting);
        info!(
            round = rounds,
            checked = decision.checked,
            solver_ms = decision.solver_time.as_millis() as u64,
            "BMC: round complete"
        );
        traces.extend(decision.traces);

        if finished {
            break;
        }
        if options.stop_on_fail && registry.any_with_status(PropertyStatus::Fail) {
            info!(round = rounds, "BMC: stopping at first failure");
            break;
        }
    }

    registry.finalize_unreached();
    for id in registry.ids_with_status(PropertyStatus::Error) {
        warn!(property = %id, "property could not be decided");
    }

    let bound = if options.is_incremental() {
        options.unwind_max
    } else {
        options.unwind
    };
    let check_report = CheckReport {
        verdicts: CheckReport::verdicts_from(&registry),
        traces,
        solver_seconds: decider.solver_time().as_secs_f64(),
        rounds,
        equation_steps: equation.len(),
        bound,
        postprocess: postprocess_stats,
        execution: executor.report().clone(),
    };

    if let Some(path) = &options.graphml_witness {
        match check_report.traces.first() {
            Some(trace) => {
                report::write_graphml(path, trace)?;
                info!(path = %path.display(), "violation witness written");
            }
            None => info!("no violation; witness not written"),
        }
    }
    if let Some(path) = &options.coverage_report {
        let coverage = report::coverage_report(program, &equation, executor.report());
        report::write_coverage(path, &coverage)?;
        info!(path = %path.display(), "coverage report written");
    }

    info!(verdict = %check_report.verdict(), "bounded model check finished");
    Ok(check_report)
}
