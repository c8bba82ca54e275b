use std::collections::{BTreeMap, HashMap};

use bmcheck_ir::expr::Expr;
use bmcheck_ir::program::SourceLocation;

use super::guard::Guard;
use crate::equation::ThreadId;

/// Guard plus the current value of every L1 name on one path.
///
/// A value is either the latest SSA symbol of the name or, after constant
/// propagation, a constant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathState {
    pub guard: Guard,
    pub values: BTreeMap<String, Expr>,
    /// Instructions executed on this path.
    pub depth: u32,
}

impl PathState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unreachable() -> Self {
        Self {
            guard: Guard::unreachable(),
            ..Self::default()
        }
    }

    pub fn with_guard(guard: Guard) -> Self {
        Self {
            guard,
            ..Self::default()
        }
    }

    pub fn is_unreachable(&self) -> bool {
        self.guard.is_false()
    }

    /// Copy of this state continuing under `condition`.
    pub fn with_condition(&self, condition: Expr) -> Self {
        Self {
            guard: self.guard.with(condition),
            values: self.values.clone(),
            depth: self.depth,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct LoopInfo {
    pub head: usize,
    pub back_edge: usize,
    pub id: String,
}

impl LoopInfo {
    pub fn contains(&self, pc: usize) -> bool {
        self.head <= pc && pc <= self.back_edge
    }
}

/// One activation of a function.
#[derive(Debug)]
pub(crate) struct Frame {
    pub function: String,
    pub pc: usize,
    /// Call-instance number used to rename locals to `name@instance`.
    pub instance: u32,
    /// States waiting to be merged at a forward target, keyed by pc.
    pub pending: BTreeMap<usize, Vec<PathState>>,
    /// Iterations taken per back-edge pc.
    pub loop_counts: HashMap<usize, u32>,
    pub return_lhs: Option<Expr>,
    pub call_location: SourceLocation,
    /// Back-edge pc execution paused at, re-executed on resume.
    pub paused_at: Option<usize>,
}

impl Frame {
    pub fn new(
        function: impl Into<String>,
        instance: u32,
        return_lhs: Option<Expr>,
        call_location: SourceLocation,
    ) -> Self {
        Self {
            function: function.into(),
            pc: 0,
            instance,
            pending: BTreeMap::new(),
            loop_counts: HashMap::new(),
            return_lhs,
            call_location,
            paused_at: None,
        }
    }

    pub fn queue(&mut self, target: usize, state: PathState) {
        if state.is_unreachable() {
            return;
        }
        self.pending.entry(target).or_default().push(state);
    }

    pub fn next_pending_target(&self) -> Option<usize> {
        self.pending.keys().next().copied()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PendingThread {
    pub id: ThreadId,
    pub function: String,
    pub guard: Guard,
}
