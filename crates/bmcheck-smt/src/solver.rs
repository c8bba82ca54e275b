//! Solver-facing interface shared by every backend.

use std::collections::HashMap;

use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

#[derive(Debug, Clone, PartialEq)]
pub enum SatResult {
    Sat,
    Unsat,
    /// Timeout, resource limit or incompleteness, with the solver's reason.
    Unknown(String),
}

/// Values of selected variables after a SAT answer.
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub values: HashMap<String, ModelValue>,
}

/// A scalar model value. Bit-vectors are returned zero-extended; signedness
/// is applied by the caller from the IR type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelValue {
    Bool(bool),
    BitVec { value: u64, width: u32 },
}

impl ModelValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ModelValue::Bool(b) => Some(*b),
            ModelValue::BitVec { .. } => None,
        }
    }

    pub fn as_bits(&self) -> Option<u64> {
        match self {
            ModelValue::BitVec { value, .. } => Some(*value),
            ModelValue::Bool(_) => None,
        }
    }
}

impl Model {
    pub fn get_bits(&self, name: &str) -> Option<u64> {
        self.values.get(name).and_then(ModelValue::as_bits)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(ModelValue::as_bool)
    }
}

/// The narrow interface the checker needs from a decision procedure.
///
/// Scopes nest: everything asserted after a `push` is dropped by the
/// matching `pop`. Declarations are global and survive `pop`, so callers
/// may declare each symbol once per `reset`.
pub trait SmtSolver {
    type Error: std::error::Error;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Self::Error>;

    fn assert(&mut self, term: &SmtTerm) -> Result<(), Self::Error>;

    fn push(&mut self) -> Result<(), Self::Error>;

    fn pop(&mut self) -> Result<(), Self::Error>;

    fn check_sat(&mut self) -> Result<SatResult, Self::Error>;

    /// Check, then read back the listed variables when SAT.
    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Self::Error>;

    /// Evaluate a Bool or bit-vector term in the model of the last SAT check.
    ///
    /// `None` when there is no model or the term has array sort.
    fn get_value(&mut self, term: &SmtTerm) -> Result<Option<ModelValue>, Self::Error>;

    /// Drop all declarations, assertions and scopes.
    fn reset(&mut self) -> Result<(), Self::Error>;
}
