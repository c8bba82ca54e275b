//! Symbolic execution of a program into an [`Equation`].
//!
//! Execution follows the instruction order of each function. Forward gotos
//! queue the taken state at their target, where it is merged back into the
//! running state with phi assignments. Backward gotos unroll loops up to
//! their bound; function calls are inlined with locals renamed per call
//! instance. Spawned threads run after the thread that created them.
//!
//! With an incremental loop configured, [`SymbolicExecutor::run`] pauses at
//! that loop's back-edge so the caller can decide properties on the equation
//! built so far, then resumes where it stopped.

mod guard;
mod state;
#[cfg(test)]
mod tests;

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use bmcheck_ir::expr::Expr;
use bmcheck_ir::program::{Function, Instruction, InstructionKind, Program, SourceLocation};
use bmcheck_ir::types::Type;
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::equation::{AssignmentKind, Equation, Step, StepKind, ThreadId};
use crate::error::CheckerError;
use crate::options::CheckerOptions;

pub use guard::Guard;
pub use state::PathState;
use state::{Frame, LoopInfo, PendingThread};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymexOutcome {
    /// Stopped at the incremental loop after `iteration` unrollings.
    Paused { iteration: u32 },
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AbandonedPath {
    pub location: SourceLocation,
    pub loop_id: Option<String>,
    pub guard_size: usize,
}

/// What happened during execution besides the equation itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub abandoned_paths: Vec<AbandonedPath>,
    pub blacklisted_loops: Vec<String>,
    /// Executed instructions as `(function, pc)`.
    pub reached: IndexSet<(String, usize)>,
    /// Times each loop (or `<function>.recursion`) hit its bound.
    pub unwinding_limit_hits: IndexMap<String, u32>,
    pub ignored_assertions: usize,
    pub threads: usize,
    /// Where paths were cut off by the depth limit.
    pub depth_cutoffs: Vec<SourceLocation>,
}

pub struct SymbolicExecutor<'p> {
    program: &'p Program,
    options: CheckerOptions,
    state: PathState,
    frames: Vec<Frame>,
    threads: VecDeque<PendingThread>,
    thread: ThreadId,
    last_thread: ThreadId,
    concurrent: bool,
    versions: HashMap<String, u32>,
    next_instance: u32,
    next_nondet: u32,
    assertion_instances: HashMap<String, u32>,
    loops: HashMap<String, Vec<LoopInfo>>,
    failed_children: HashMap<String, usize>,
    blacklist: HashSet<String>,
    /// Shared reads already made by the current instruction.
    read_cache: HashMap<String, Expr>,
    /// Renamed condition of the back-edge execution paused at.
    resume_condition: Option<Expr>,
    unwind_min_reached: bool,
    started: bool,
    finished: bool,
    report: ExecutionReport,
}

/// The L1 name an assignment writes, with how it is recorded.
struct Definition<'a> {
    l1: &'a str,
    ty: &'a Type,
    kind: AssignmentKind,
    shared: bool,
}

fn return_symbol(function: &str) -> String {
    format!("{function}#return_value")
}

/// Program-level name of an L1 name (`x@3` -> `x`).
fn source_name(l1: &str) -> &str {
    l1.split('@').next().unwrap_or(l1)
}

fn loops_of(function: &Function) -> Vec<LoopInfo> {
    let body = function.instructions();
    function
        .loop_ids()
        .into_iter()
        .filter_map(|(back_edge, id)| match body.get(back_edge).map(|i| &i.kind) {
            Some(InstructionKind::Goto { target, .. }) => Some(LoopInfo {
                head: *target,
                back_edge,
                id,
            }),
            _ => None,
        })
        .collect()
}

impl<'p> SymbolicExecutor<'p> {
    pub fn new(program: &'p Program, options: &CheckerOptions) -> Self {
        let loops = program
            .functions
            .values()
            .map(|f| (f.name.clone(), loops_of(f)))
            .collect();
        let concurrent = program
            .functions
            .values()
            .flat_map(|f| f.instructions())
            .any(|i| matches!(i.kind, InstructionKind::StartThread { .. }));
        Self {
            program,
            options: options.clone(),
            state: PathState::new(),
            frames: Vec::new(),
            threads: VecDeque::new(),
            thread: 0,
            last_thread: 0,
            concurrent,
            versions: HashMap::new(),
            next_instance: 0,
            next_nondet: 0,
            assertion_instances: HashMap::new(),
            loops,
            failed_children: HashMap::new(),
            blacklist: HashSet::new(),
            read_cache: HashMap::new(),
            resume_condition: None,
            unwind_min_reached: options.unwind_min == 0,
            started: false,
            finished: false,
            report: ExecutionReport::default(),
        }
    }

    pub fn report(&self) -> &ExecutionReport {
        &self.report
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Execute until the program is exhausted or the incremental loop asks
    /// for a decision round.
    pub fn run(&mut self, equation: &mut Equation) -> Result<SymexOutcome, CheckerError> {
        if self.finished {
            return Ok(SymexOutcome::Finished);
        }
        if !self.started {
            self.start(equation)?;
        }
        loop {
            if self.frames.is_empty() {
                if self.start_next_thread(equation)? {
                    continue;
                }
                self.finished = true;
                self.report.threads = self.last_thread + 1;
                info!(steps = equation.len(), "symbolic execution finished");
                return Ok(SymexOutcome::Finished);
            }
            if let Some(iteration) = self.step(equation)? {
                info!(
                    iteration,
                    steps = equation.len(),
                    "symbolic execution paused at incremental loop"
                );
                return Ok(SymexOutcome::Paused { iteration });
            }
        }
    }

    fn start(&mut self, equation: &mut Equation) -> Result<(), CheckerError> {
        self.started = true;
        let program = self.program;
        let entry = program.function(&program.entry).ok_or_else(|| {
            CheckerError::inconsistent(format!("entry function `{}` not found", program.entry))
        })?;
        let init = SourceLocation::new("<built-in>", "<initialisation>", 0);
        for global in &program.globals {
            let (value, kind) = match &global.init {
                Some(init_value) => (self.rename(init_value, equation, &init), AssignmentKind::State),
                None => (
                    self.fresh_nondet(&global.ty, equation),
                    AssignmentKind::NondetInit,
                ),
            };
            self.assign_symbol(&global.name, &global.ty, value, kind, &init, equation);
        }
        let arguments = entry
            .parameters
            .iter()
            .map(|p| self.fresh_nondet(&p.ty, equation))
            .collect();
        let location = entry
            .instructions()
            .first()
            .map(|i| i.location.clone())
            .unwrap_or_default();
        debug!(entry = %entry.name, concurrent = self.concurrent, "starting symbolic execution");
        self.enter_function(entry, None, arguments, &location, equation)
    }

    fn start_next_thread(&mut self, equation: &mut Equation) -> Result<bool, CheckerError> {
        let Some(pending) = self.threads.pop_front() else {
            return Ok(false);
        };
        let program = self.program;
        let function = program.function(&pending.function).ok_or_else(|| {
            CheckerError::inconsistent(format!("thread function `{}` not found", pending.function))
        })?;
        debug!(thread = pending.id, function = %function.name, "starting thread");
        self.thread = pending.id;
        self.state = PathState::with_guard(pending.guard);
        let location = function
            .instructions()
            .first()
            .map(|i| i.location.clone())
            .unwrap_or_default();
        self.enter_function(function, None, Vec::new(), &location, equation)?;
        Ok(true)
    }

    fn step(&mut self, equation: &mut Equation) -> Result<Option<u32>, CheckerError> {
        let program = self.program;
        let Some(frame) = self.frames.last() else {
            return Ok(None);
        };
        let pc = frame.pc;
        let function = program.function(&frame.function).ok_or_else(|| {
            CheckerError::inconsistent(format!("function `{}` not found", frame.function))
        })?;
        let body = function.instructions();
        let location = body
            .get(pc)
            .or_else(|| body.last())
            .map(|i| i.location.clone())
            .unwrap_or_default();
        self.merge_pending(pc, &location, equation);

        if pc >= body.len() {
            self.leave_function(&location, equation)?;
            return Ok(None);
        }
        if self.state.is_unreachable() {
            if let Some(frame) = self.frames.last_mut() {
                frame.pc = frame.next_pending_target().unwrap_or(body.len());
            }
            return Ok(None);
        }

        let instruction = &body[pc];
        self.report.reached.insert((function.name.clone(), pc));
        self.read_cache.clear();
        self.forget_finished_loops(&function.name, pc);
        if self.exceeds_depth(&instruction.location)
            || self.exceeds_complexity(&function.name, pc, &instruction.location)
        {
            return Ok(None);
        }
        self.execute(function, pc, instruction, equation)
    }

    fn execute(
        &mut self,
        function: &'p Function,
        pc: usize,
        instruction: &'p Instruction,
        equation: &mut Equation,
    ) -> Result<Option<u32>, CheckerError> {
        let location = &instruction.location;
        match &instruction.kind {
            InstructionKind::Skip => {
                self.emit(equation, StepKind::Location, location);
            }
            InstructionKind::Decl { name } => {
                let ty = function
                    .variable(name)
                    .map(|v| v.ty.clone())
                    .ok_or_else(|| {
                        CheckerError::inconsistent(format!("{location}: `{name}` is not a local"))
                    })?;
                let value = self.fresh_nondet(&ty, equation);
                self.assign_symbol(name, &ty, value, AssignmentKind::NondetInit, location, equation);
            }
            InstructionKind::Dead { name } => {
                let l1 = self.l1_name(name);
                self.state.values.remove(&l1);
            }
            InstructionKind::Assign { lhs, rhs } => {
                let value = self.rename(rhs, equation, location);
                self.assign_lvalue(lhs, value, AssignmentKind::State, location, equation)?;
            }
            InstructionKind::Assume { condition } => {
                let condition = self.rename(condition, equation, location);
                self.assume(condition, location, equation);
            }
            InstructionKind::Assert {
                condition,
                property,
                description,
            } => {
                if self.ignoring_properties() {
                    debug!(property = %property, "assertion ignored before unwind_min");
                    self.report.ignored_assertions += 1;
                } else {
                    let condition = self.rename(condition, equation, location);
                    self.emit_assertion(condition, property, description, location, equation);
                }
            }
            InstructionKind::Goto { target, condition } => {
                return self.goto(function, pc, *target, condition, location, equation);
            }
            InstructionKind::Call {
                lhs,
                function: callee,
                arguments,
            } => {
                self.set_pc(pc + 1);
                self.call(lhs.as_ref(), callee, arguments, location, equation)?;
                return Ok(None);
            }
            InstructionKind::Return { value } => {
                if let Some(value) = value {
                    let value = self.rename(value, equation, location);
                    let l1 = return_symbol(&function.name);
                    let ty = value.ty().clone();
                    let target = Definition {
                        l1: &l1,
                        ty: &ty,
                        kind: AssignmentKind::Return,
                        shared: false,
                    };
                    self.define(target, value, location, equation);
                }
                let returning = std::mem::replace(&mut self.state, PathState::unreachable());
                if let Some(frame) = self.frames.last_mut() {
                    frame.queue(function.instructions().len(), returning);
                }
            }
            InstructionKind::StartThread { function: child } => {
                self.spawn(child, location, equation)?;
            }
            InstructionKind::Output { label, values } => {
                let values = values
                    .iter()
                    .map(|v| self.rename(v, equation, location))
                    .collect();
                self.emit(
                    equation,
                    StepKind::Output {
                        label: label.clone(),
                        values,
                    },
                    location,
                );
            }
        }
        self.set_pc(pc + 1);
        Ok(None)
    }

    // ---- control flow ----

    fn goto(
        &mut self,
        function: &'p Function,
        pc: usize,
        target: usize,
        condition: &Expr,
        location: &SourceLocation,
        equation: &mut Equation,
    ) -> Result<Option<u32>, CheckerError> {
        let cond = match self.resume_condition.take() {
            Some(cond) => cond,
            None => self.rename(condition, equation, location),
        };
        if target > pc {
            if !cond.is_false() {
                let taken = self.state.with_condition(cond.clone());
                if let Some(frame) = self.frames.last_mut() {
                    frame.queue(target, taken);
                }
            }
            self.state.guard.add(Expr::not(cond));
            self.set_pc(pc + 1);
            return Ok(None);
        }
        if target == pc && self.options.self_loops_to_assumptions {
            self.assume(Expr::not(cond), location, equation);
            self.set_pc(pc + 1);
            return Ok(None);
        }
        self.back_edge(function, pc, target, cond, location, equation)
    }

    fn back_edge(
        &mut self,
        function: &'p Function,
        pc: usize,
        target: usize,
        cond: Expr,
        location: &SourceLocation,
        equation: &mut Equation,
    ) -> Result<Option<u32>, CheckerError> {
        if cond.is_false() {
            self.reset_loop(pc);
            self.set_pc(pc + 1);
            return Ok(None);
        }
        let loop_id = self.loop_id(&function.name, pc);
        let count = match self.frames.last_mut() {
            Some(frame) => {
                let count = frame.loop_counts.entry(pc).or_insert(0);
                *count += 1;
                *count
            }
            None => return Ok(None),
        };

        if self.options.incremental_loop.as_deref() == Some(loop_id.as_str())
            && count >= self.options.unwind_min
        {
            if self.paused_here(pc) {
                self.clear_pause(pc);
            } else {
                // Undo the increment: the back-edge is executed again on resume.
                if let Some(frame) = self.frames.last_mut() {
                    frame.loop_counts.insert(pc, count - 1);
                    frame.paused_at = Some(pc);
                }
                self.unwind_min_reached = true;
                self.resume_condition = Some(cond);
                return Ok(Some(count));
            }
        }

        let within_bound = self
            .options
            .loop_bound(&loop_id)
            .map_or(true, |bound| count < bound);
        if within_bound && !self.blacklist.contains(&loop_id) {
            let not_taken = self.state.with_condition(Expr::not(cond.clone()));
            if let Some(frame) = self.frames.last_mut() {
                frame.queue(pc + 1, not_taken);
            }
            self.state.guard.add(cond);
            self.set_pc(target);
            return Ok(None);
        }

        debug!(loop_id = %loop_id, count, "loop unwinding bound reached");
        *self
            .report
            .unwinding_limit_hits
            .entry(loop_id.clone())
            .or_insert(0) += 1;
        let property = format!("{loop_id}.unwind");
        let message = format!("unwinding assertion loop {}", loop_number(&loop_id));
        self.stop_unwinding(&property, &message, Expr::not(cond), location, equation);
        self.reset_loop(pc);
        self.set_pc(pc + 1);
        Ok(None)
    }

    fn paused_here(&self, pc: usize) -> bool {
        self.frames
            .last()
            .is_some_and(|frame| frame.paused_at == Some(pc))
    }

    fn clear_pause(&mut self, pc: usize) {
        if let Some(frame) = self.frames.last_mut() {
            if frame.paused_at == Some(pc) {
                frame.paused_at = None;
            }
        }
    }

    /// Assertion and/or assumption that no further unrolling is possible.
    fn stop_unwinding(
        &mut self,
        property: &str,
        message: &str,
        exhausted: Expr,
        location: &SourceLocation,
        equation: &mut Equation,
    ) {
        if self.options.unwinding_assertions {
            self.emit_assertion(exhausted.clone(), property, message, location, equation);
        }
        if !self.options.partial_loops {
            self.assume(exhausted, location, equation);
        }
    }

    fn call(
        &mut self,
        lhs: Option<&'p Expr>,
        callee: &str,
        arguments: &'p [Expr],
        location: &SourceLocation,
        equation: &mut Equation,
    ) -> Result<(), CheckerError> {
        let program = self.program;
        let function = program.function(callee).ok_or_else(|| {
            CheckerError::inconsistent(format!("{location}: call to unknown function `{callee}`"))
        })?;
        let arguments: Vec<Expr> = arguments
            .iter()
            .map(|a| self.rename(a, equation, location))
            .collect();
        self.emit(
            equation,
            StepKind::FunctionCall {
                function: function.name.clone(),
                arguments: arguments.clone(),
            },
            location,
        );

        if function.body.is_none() {
            if let Some(lhs) = lhs {
                let value = self.fresh_nondet(lhs.ty(), equation);
                self.assign_lvalue(lhs, value, AssignmentKind::State, location, equation)?;
            }
            self.emit(
                equation,
                StepKind::FunctionReturn {
                    function: function.name.clone(),
                },
                location,
            );
            return Ok(());
        }

        let active = self.frames.iter().filter(|f| f.function == function.name).count();
        if let Some(limit) = self.options.recursion_limit() {
            if active > 0 && active as u64 >= u64::from(limit) {
                let property = format!("{}.recursion", function.name);
                debug!(function = %function.name, active, "recursion bound reached");
                *self
                    .report
                    .unwinding_limit_hits
                    .entry(property.clone())
                    .or_insert(0) += 1;
                let message = format!("recursion unwinding assertion {}", function.name);
                self.stop_unwinding(&property, &message, Expr::bool(false), location, equation);
                if let Some(lhs) = lhs {
                    if !self.state.is_unreachable() {
                        let value = self.fresh_nondet(lhs.ty(), equation);
                        self.assign_lvalue(lhs, value, AssignmentKind::State, location, equation)?;
                    }
                }
                return Ok(());
            }
        }
        self.enter_function(function, lhs.cloned(), arguments, location, equation)
    }

    fn enter_function(
        &mut self,
        function: &'p Function,
        return_lhs: Option<Expr>,
        arguments: Vec<Expr>,
        location: &SourceLocation,
        equation: &mut Equation,
    ) -> Result<(), CheckerError> {
        if arguments.len() != function.parameters.len() {
            return Err(CheckerError::inconsistent(format!(
                "{location}: `{}` expects {} arguments, got {}",
                function.name,
                function.parameters.len(),
                arguments.len()
            )));
        }
        self.next_instance += 1;
        self.frames.push(Frame::new(
            function.name.clone(),
            self.next_instance,
            return_lhs,
            location.clone(),
        ));
        for (parameter, value) in function.parameters.iter().zip(arguments) {
            self.assign_symbol(
                &parameter.name,
                &parameter.ty,
                value,
                AssignmentKind::Parameter,
                location,
                equation,
            );
        }
        Ok(())
    }

    fn leave_function(
        &mut self,
        location: &SourceLocation,
        equation: &mut Equation,
    ) -> Result<(), CheckerError> {
        let Some(frame) = self.frames.pop() else {
            return Ok(());
        };
        let suffix = format!("@{}", frame.instance);
        let returned = self.state.values.remove(&return_symbol(&frame.function));
        self.state.values.retain(|name, _| !name.ends_with(&suffix));
        // Thread entry functions were never called, so they do not return.
        if self.state.is_unreachable() || self.frames.is_empty() {
            return Ok(());
        }
        self.emit(
            equation,
            StepKind::FunctionReturn {
                function: frame.function.clone(),
            },
            location,
        );
        if let Some(lhs) = &frame.return_lhs {
            let value = match returned {
                Some(value) => value,
                None => self.fresh_nondet(lhs.ty(), equation),
            };
            self.assign_lvalue(
                lhs,
                value,
                AssignmentKind::State,
                &frame.call_location,
                equation,
            )?;
        }
        Ok(())
    }

    fn spawn(
        &mut self,
        child: &str,
        location: &SourceLocation,
        equation: &mut Equation,
    ) -> Result<(), CheckerError> {
        let program = self.program;
        let function = program.function(child).ok_or_else(|| {
            CheckerError::inconsistent(format!("{location}: unknown thread function `{child}`"))
        })?;
        self.last_thread += 1;
        let id = self.last_thread;
        self.emit(equation, StepKind::Spawn { child: id }, location);
        self.threads.push_back(PendingThread {
            id,
            function: function.name.clone(),
            guard: self.state.guard.clone(),
        });
        Ok(())
    }

    /// Fold the states waiting at `pc` into the running state.
    fn merge_pending(&mut self, pc: usize, location: &SourceLocation, equation: &mut Equation) {
        let Some(incoming) = self.frames.last_mut().and_then(|f| f.pending.remove(&pc)) else {
            return;
        };
        for state in incoming {
            self.merge_state(state, location, equation);
        }
    }

    fn merge_state(&mut self, incoming: PathState, location: &SourceLocation, equation: &mut Equation) {
        if incoming.is_unreachable() {
            return;
        }
        if self.state.is_unreachable() {
            self.state = incoming;
            return;
        }
        let select_incoming = incoming.guard.difference(&self.state.guard);
        let merged = self.state.guard.merge(&incoming.guard);
        let mut names: BTreeSet<String> = self.state.values.keys().cloned().collect();
        names.extend(incoming.values.keys().cloned());
        let mut phis = Vec::new();
        for name in names {
            // A name without a value on one side holds an arbitrary value
            // there.
            let sides = (
                incoming.values.get(&name).cloned(),
                self.state.values.get(&name).cloned(),
            );
            let (value, current) = match sides {
                (Some(value), Some(current)) if value == current => continue,
                (Some(value), Some(current)) => (value, current),
                (Some(value), None) => {
                    let current = self.fresh_nondet(value.ty(), equation);
                    (value, current)
                }
                (None, Some(current)) => (self.fresh_nondet(current.ty(), equation), current),
                (None, None) => continue,
            };
            phis.push((name, value, current));
        }
        self.state.guard = merged;
        self.state.depth = self.state.depth.min(incoming.depth);
        for (name, value, current) in phis {
            let rhs = Expr::ite(select_incoming.clone(), value, current);
            let ty = rhs.ty().clone();
            let target = Definition {
                l1: &name,
                ty: &ty,
                kind: AssignmentKind::Phi,
                shared: false,
            };
            self.define(target, rhs, location, equation);
        }
    }

    // ---- loops ----

    fn loop_id(&self, function: &str, back_edge: usize) -> String {
        self.loops
            .get(function)
            .and_then(|loops| loops.iter().find(|l| l.back_edge == back_edge))
            .map(|l| l.id.clone())
            .unwrap_or_else(|| format!("{function}.{back_edge}"))
    }

    fn innermost_loop(&self, function: &str, pc: usize) -> Option<String> {
        self.loops
            .get(function)?
            .iter()
            .filter(|l| l.contains(pc))
            .min_by_key(|l| l.back_edge - l.head)
            .map(|l| l.id.clone())
    }

    /// Drop the iteration counts of loops whose body `pc` is outside.
    fn forget_finished_loops(&mut self, function: &str, pc: usize) {
        let (Some(loops), Some(frame)) = (self.loops.get(function), self.frames.last_mut()) else {
            return;
        };
        frame.loop_counts.retain(|back_edge, _| {
            loops
                .iter()
                .any(|l| l.back_edge == *back_edge && l.contains(pc))
        });
    }

    fn reset_loop(&mut self, back_edge: usize) {
        if let Some(frame) = self.frames.last_mut() {
            frame.loop_counts.remove(&back_edge);
        }
    }

    /// Count one more instruction on the current path, cutting the path off
    /// once the depth limit is used up.
    fn exceeds_depth(&mut self, location: &SourceLocation) -> bool {
        let Some(limit) = self.options.depth else {
            return false;
        };
        if self.state.depth < limit {
            self.state.depth += 1;
            return false;
        }
        debug!(%location, limit, "path cut off at depth limit");
        self.report.depth_cutoffs.push(location.clone());
        self.state = PathState::unreachable();
        true
    }

    fn exceeds_complexity(&mut self, function: &str, pc: usize, location: &SourceLocation) -> bool {
        let Some(limit) = self.options.complexity_limit else {
            return false;
        };
        let guard_size = self.state.guard.size();
        if guard_size <= limit {
            return false;
        }
        let loop_id = self.innermost_loop(function, pc);
        warn!(%location, guard_size, limit, "path abandoned: guard exceeds complexity limit");
        self.report.abandoned_paths.push(AbandonedPath {
            location: location.clone(),
            loop_id: loop_id.clone(),
            guard_size,
        });
        self.state = PathState::unreachable();
        if let Some(loop_id) = loop_id {
            let failed = self.failed_children.entry(loop_id.clone()).or_insert(0);
            *failed += 1;
            if *failed >= self.options.complexity_failed_child_loops_limit
                && self.blacklist.insert(loop_id.clone())
            {
                warn!(loop_id = %loop_id, "loop blacklisted after repeated path abandonment");
                self.report.blacklisted_loops.push(loop_id);
            }
        }
        true
    }

    fn ignoring_properties(&self) -> bool {
        self.options.ignore_properties_before_unwind_min
            && self.options.is_incremental()
            && !self.unwind_min_reached
    }

    // ---- data ----

    fn set_pc(&mut self, pc: usize) {
        if let Some(frame) = self.frames.last_mut() {
            frame.pc = pc;
        }
    }

    fn emit(&self, equation: &mut Equation, kind: StepKind, location: &SourceLocation) -> usize {
        equation.push(Step::new(
            kind,
            self.state.guard.as_expr(),
            location.clone(),
            self.thread,
        ))
    }

    fn emit_assertion(
        &mut self,
        condition: Expr,
        property: &str,
        message: &str,
        location: &SourceLocation,
        equation: &mut Equation,
    ) {
        let counter = self
            .assertion_instances
            .entry(property.to_string())
            .or_insert(0);
        *counter += 1;
        let instance = *counter;
        self.emit(
            equation,
            StepKind::Assert {
                condition,
                property: property.to_string(),
                instance,
                message: message.to_string(),
            },
            location,
        );
    }

    fn assume(&mut self, condition: Expr, location: &SourceLocation, equation: &mut Equation) {
        if condition.is_true() {
            return;
        }
        let infeasible = condition.is_false();
        self.emit(equation, StepKind::Assume { condition }, location);
        if infeasible {
            self.state = PathState::unreachable();
        }
    }

    fn is_local(&self, name: &str) -> bool {
        self.frames
            .last()
            .and_then(|frame| self.program.function(&frame.function))
            .is_some_and(|function| function.variable(name).is_some())
    }

    fn is_shared(&self, name: &str) -> bool {
        self.concurrent && !self.is_local(name) && self.program.global(name).is_some()
    }

    fn l1_name(&self, name: &str) -> String {
        match self.frames.last() {
            Some(frame) if self.is_local(name) => format!("{name}@{}", frame.instance),
            _ => name.to_string(),
        }
    }

    fn fresh_version(&mut self, l1: &str) -> String {
        let version = self.versions.entry(l1.to_string()).or_insert(0);
        *version += 1;
        format!("{l1}!{version}")
    }

    fn fresh_nondet(&mut self, ty: &Type, equation: &mut Equation) -> Expr {
        self.next_nondet += 1;
        let name = format!("nondet!{}", self.next_nondet);
        equation.add_free_input(name.clone(), ty.clone());
        Expr::symbol(name, ty.clone())
    }

    fn read(
        &mut self,
        name: &str,
        ty: &Type,
        equation: &mut Equation,
        location: &SourceLocation,
    ) -> Expr {
        if self.is_shared(name) {
            if self.options.cache_dereferences {
                if let Some(cached) = self.read_cache.get(name) {
                    return cached.clone();
                }
            }
            let symbol = self.fresh_version(name);
            self.emit(
                equation,
                StepKind::SharedRead {
                    symbol: symbol.clone(),
                    ty: ty.clone(),
                    variable: name.to_string(),
                },
                location,
            );
            let value = Expr::symbol(symbol, ty.clone());
            if self.options.cache_dereferences {
                self.read_cache.insert(name.to_string(), value.clone());
            }
            return value;
        }
        let l1 = self.l1_name(name);
        if let Some(value) = self.state.values.get(&l1) {
            return value.clone();
        }
        let value = self.fresh_nondet(ty, equation);
        self.state.values.insert(l1, value.clone());
        value
    }

    /// Replace program variables by their current values and nondet
    /// expressions by fresh free symbols.
    fn rename(&mut self, expr: &Expr, equation: &mut Equation, location: &SourceLocation) -> Expr {
        expr.rewrite(&mut |e| match e {
            Expr::Symbol { name, ty } => Some(self.read(name, ty, equation, location)),
            Expr::Nondet { ty } => Some(self.fresh_nondet(ty, equation)),
            _ => None,
        })
    }

    /// Assign to a symbol, member or element by rewriting the whole object.
    fn assign_lvalue(
        &mut self,
        lhs: &Expr,
        value: Expr,
        kind: AssignmentKind,
        location: &SourceLocation,
        equation: &mut Equation,
    ) -> Result<(), CheckerError> {
        match lhs {
            Expr::Symbol { name, ty } => {
                self.assign_symbol(name, ty, value, kind, location, equation);
                Ok(())
            }
            Expr::Member {
                compound,
                component,
                ..
            } => {
                let current = self.rename(compound, equation, location);
                let updated = Expr::with_member(current, component.clone(), value);
                self.assign_lvalue(compound, updated, kind, location, equation)
            }
            Expr::Index { array, index, .. } => {
                let current = self.rename(array, equation, location);
                let index = self.rename(index, equation, location);
                let updated = Expr::with_index(current, index, value);
                self.assign_lvalue(array, updated, kind, location, equation)
            }
            other => Err(CheckerError::inconsistent(format!(
                "{location}: `{other}` cannot be assigned to"
            ))),
        }
    }

    fn assign_symbol(
        &mut self,
        name: &str,
        ty: &Type,
        value: Expr,
        kind: AssignmentKind,
        location: &SourceLocation,
        equation: &mut Equation,
    ) {
        let l1 = self.l1_name(name);
        let target = Definition {
            l1: &l1,
            ty,
            kind,
            shared: self.is_shared(name),
        };
        self.define(target, value, location, equation);
    }

    /// Emit `l1!n = value` and make it the current value of `l1`.
    fn define(
        &mut self,
        target: Definition<'_>,
        value: Expr,
        location: &SourceLocation,
        equation: &mut Equation,
    ) {
        let Definition {
            l1,
            ty,
            kind,
            shared,
        } = target;
        let lhs = self.fresh_version(l1);
        let source = source_name(l1).to_string();
        let propagate = !shared && value.as_constant().is_some();
        self.emit(
            equation,
            StepKind::Assignment {
                lhs: lhs.clone(),
                ty: ty.clone(),
                rhs: value.clone(),
                kind,
                source: source.clone(),
            },
            location,
        );
        if shared {
            self.emit(
                equation,
                StepKind::SharedWrite {
                    symbol: lhs,
                    ty: ty.clone(),
                    variable: source.clone(),
                },
                location,
            );
            self.read_cache.remove(&source);
            return;
        }
        let current = if propagate {
            value
        } else {
            Expr::symbol(lhs, ty.clone())
        };
        self.state.values.insert(l1.to_string(), current);
    }
}

/// The `<n>` of a `<function>.<n>` loop id.
fn loop_number(loop_id: &str) -> &str {
    loop_id.rsplit('.').next().unwrap_or(loop_id)
}
