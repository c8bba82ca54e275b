//! Passes run over the equation between symbolic execution and decision:
//! memory-model constraints (concurrent programs only), slicing, and
//! optional SSA validation, in that order.

pub mod memory_model;
pub mod slice;
pub mod validate;

use serde::Serialize;
use tracing::debug;

use crate::equation::Equation;
use crate::error::CheckerError;
use crate::options::CheckerOptions;
use crate::properties::PropertyRegistry;

pub use memory_model::MemoryModelStats;
pub use slice::SliceStats;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PostprocessStats {
    pub memory_model: Option<MemoryModelStats>,
    pub slice: Option<SliceStats>,
}

pub fn postprocess(
    equation: &mut Equation,
    registry: &PropertyRegistry,
    options: &CheckerOptions,
) -> Result<PostprocessStats, CheckerError> {
    let memory_model = (equation.thread_count() > 1)
        .then(|| memory_model::apply(equation, options.memory_model));
    let slice = options
        .slice_formula
        .then(|| slice::slice(equation, registry));
    if options.validate_ssa {
        validate::validate(equation)?;
        debug!(steps = equation.len(), "SSA validation passed");
    }
    Ok(PostprocessStats {
        memory_model,
        slice,
    })
}
