#![doc = include_str!("../README.md")]

use std::fs;
use std::path::{Path, PathBuf};

use bmcheck_engine::options::{
    CheckerOptions, EquationView, IncrementalTrust, MemoryModel, SolverChoice,
};
use bmcheck_engine::trace::format_trace;
use bmcheck_engine::{check, show_equation, CheckReport, Verdict};
use bmcheck_ir::program::Program;
use clap::Parser;
use indexmap::IndexMap;
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

const EXIT_FAIL: i32 = 10;
const EXIT_ERROR: i32 = 1;

#[derive(Parser, Debug)]
#[command(
    name = "bmcheck",
    about = "Bounded model checker for goto programs",
    version
)]
struct Cli {
    /// Program to check, in JSON form
    file: PathBuf,

    /// Default unwinding bound for every loop and recursive call
    #[arg(long)]
    unwind: Option<u32>,

    /// Per-loop bounds as LOOP:N pairs, e.g. main.0:10,worker.1:3
    #[arg(long)]
    unwindset: Option<String>,

    /// Bound on nested activations of one function (defaults to --unwind)
    #[arg(long)]
    depth_recursion: Option<u32>,

    /// Instructions one path may execute before it is cut off
    #[arg(long)]
    depth: Option<u32>,

    /// Do not assert that loops are fully unwound
    #[arg(long)]
    no_unwinding_assertions: bool,

    /// Let paths continue past the unwinding bound without an assumption
    #[arg(long)]
    partial_loops: bool,

    /// Keep unwinding self-loops instead of turning them into assumptions
    #[arg(long)]
    no_self_loops_to_assumptions: bool,

    /// Memory model for concurrent programs: sc or tso
    #[arg(long = "mm", default_value = "sc")]
    memory_model: String,

    /// Keep steps that no property depends on
    #[arg(long)]
    no_slice_formula: bool,

    /// Abandon paths whose guard grows beyond this many nodes
    #[arg(long)]
    symex_complexity_limit: Option<usize>,

    /// Abandoned paths in one loop before the loop is no longer unwound
    #[arg(long, default_value_t = 2)]
    symex_complexity_failed_child_loops_limit: usize,

    /// Loop to unwind one iteration per checking round
    #[arg(long)]
    incremental_loop: Option<String>,

    /// Iterations of the incremental loop before the first check
    #[arg(long, default_value_t = 0, requires = "incremental_loop")]
    unwind_min: u32,

    /// Largest unwinding of the incremental loop
    #[arg(long, requires = "incremental_loop")]
    unwind_max: Option<u32>,

    /// Skip assertions reached before --unwind-min iterations
    #[arg(long, requires = "incremental_loop")]
    ignore_properties_before_unwind_min: bool,

    /// Treat an UNSAT answer at a shallower bound as PASS
    #[arg(long, requires = "incremental_loop")]
    trust_shallower_bounds: bool,

    /// Reuse reads of shared state within one instruction
    #[arg(long)]
    symex_cache_dereferences: bool,

    /// Check the generated equation for SSA well-formedness
    #[arg(long)]
    validate_ssa: bool,

    /// Solver backend: z3 or cvc5
    #[arg(long, default_value = "z3")]
    solver: String,

    /// Per-query solver timeout in seconds (0 = none)
    #[arg(long, default_value_t = 0)]
    timeout: u64,

    /// Stop after the first failing property
    #[arg(long)]
    stop_on_fail: bool,

    /// Write a GraphML violation witness for the first failure
    #[arg(long)]
    graphml_witness: Option<PathBuf>,

    /// Write a JSON coverage report
    #[arg(long)]
    coverage: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Print the verification conditions instead of checking them
    #[arg(long, conflicts_with = "program_only")]
    show_vcc: bool,

    /// Print the post-processed equation instead of checking it
    #[arg(long)]
    program_only: bool,
}

impl Cli {
    fn equation_view(&self) -> Option<EquationView> {
        if self.show_vcc {
            Some(EquationView::Vccs)
        } else if self.program_only {
            Some(EquationView::Program)
        } else {
            None
        }
    }
}

fn parse_memory_model(raw: &str) -> miette::Result<MemoryModel> {
    match raw {
        "sc" => Ok(MemoryModel::SequentialConsistency),
        "tso" => Ok(MemoryModel::TotalStoreOrder),
        other => miette::bail!("Unknown memory model: {other}. Use 'sc' or 'tso'."),
    }
}

fn parse_solver(raw: &str) -> miette::Result<SolverChoice> {
    match raw {
        "z3" => Ok(SolverChoice::Z3),
        "cvc5" => Ok(SolverChoice::Cvc5),
        other => miette::bail!("Unknown solver: {other}. Use 'z3' or 'cvc5'."),
    }
}

fn parse_unwindset(raw: &str) -> miette::Result<IndexMap<String, u32>> {
    let mut bounds = IndexMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((loop_id, bound)) = entry.rsplit_once(':') else {
            miette::bail!("Invalid --unwindset entry '{entry}': expected LOOP:N");
        };
        let bound: u32 = bound
            .parse()
            .map_err(|_| miette::miette!("Invalid bound in --unwindset entry '{entry}'"))?;
        if loop_id.is_empty() {
            miette::bail!("Invalid --unwindset entry '{entry}': missing loop id");
        }
        bounds.insert(loop_id.to_string(), bound);
    }
    Ok(bounds)
}

fn options_from_cli(cli: &Cli) -> miette::Result<CheckerOptions> {
    let unwind_set = match &cli.unwindset {
        Some(raw) => parse_unwindset(raw)?,
        None => IndexMap::new(),
    };
    if let (Some(max), true) = (cli.unwind_max, cli.incremental_loop.is_some()) {
        if max < cli.unwind_min {
            miette::bail!(
                "--unwind-max ({max}) must not be below --unwind-min ({})",
                cli.unwind_min
            );
        }
    }
    Ok(CheckerOptions {
        unwind: cli.unwind,
        unwind_set,
        recursion_bound: cli.depth_recursion,
        unwinding_assertions: !cli.no_unwinding_assertions,
        partial_loops: cli.partial_loops,
        self_loops_to_assumptions: !cli.no_self_loops_to_assumptions,
        memory_model: parse_memory_model(&cli.memory_model)?,
        slice_formula: !cli.no_slice_formula,
        complexity_limit: cli.symex_complexity_limit,
        complexity_failed_child_loops_limit: cli.symex_complexity_failed_child_loops_limit,
        depth: cli.depth,
        incremental_loop: cli.incremental_loop.clone(),
        unwind_min: cli.unwind_min,
        unwind_max: cli.unwind_max,
        ignore_properties_before_unwind_min: cli.ignore_properties_before_unwind_min,
        incremental_trust: if cli.trust_shallower_bounds {
            IncrementalTrust::TrustShallowerBounds
        } else {
            IncrementalTrust::Recheck
        },
        cache_dereferences: cli.symex_cache_dereferences,
        validate_ssa: cli.validate_ssa,
        solver: parse_solver(&cli.solver)?,
        timeout_secs: cli.timeout,
        stop_on_fail: cli.stop_on_fail,
        graphml_witness: cli.graphml_witness.clone(),
        coverage_report: cli.coverage.clone(),
    })
}

fn load_program(path: &Path) -> miette::Result<Program> {
    let source = fs::read_to_string(path)
        .map_err(|e| miette::miette!("Cannot read {}: {e}", path.display()))?;
    serde_json::from_str(&source)
        .map_err(|e| miette::miette!("Malformed program {}: {e}", path.display()))
}

fn render_text(report: &CheckReport) -> String {
    let mut out = String::new();
    for trace in &report.traces {
        out.push_str(&format_trace(trace));
        out.push('\n');
    }
    out.push_str(&report.summary());
    out
}

fn exit_code(verdict: Verdict) -> i32 {
    match verdict {
        Verdict::Pass => 0,
        Verdict::Fail => EXIT_FAIL,
        Verdict::Error => EXIT_ERROR,
    }
}

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let options = options_from_cli(&cli)?;
    let program = load_program(&cli.file)?;
    info!(file = %cli.file.display(), functions = program.functions.len(), "loaded program");

    if let Some(view) = cli.equation_view() {
        let text = show_equation(&program, &options, view).map_err(|e| miette::miette!("{e}"))?;
        print!("{text}");
        return Ok(());
    }

    let report = check(&program, &options).map_err(|e| miette::miette!("{e}"))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
    } else {
        println!("{}", render_text(&report));
    }

    let code = exit_code(report.verdict());
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
