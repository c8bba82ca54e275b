#![doc = include_str!("../README.md")]

//! Entry points are [`checker::check`] and [`checker::check_with_solver`];
//! [`checker::show_equation`] stops before the solver.
//! The remaining modules are the pipeline stages they drive, exposed for
//! callers that want to run stages individually.

pub mod checker;
pub mod decider;
pub mod equation;
pub mod error;
pub mod options;
pub mod postprocess;
pub mod properties;
pub mod report;
pub mod symex;
pub mod trace;

pub use checker::{check, check_with_solver, show_equation};
pub use error::CheckerError;
pub use options::CheckerOptions;
pub use report::{CheckReport, Verdict};
