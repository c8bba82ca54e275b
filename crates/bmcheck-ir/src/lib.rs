#![doc = include_str!("../README.md")]

//! Program representation for bounded model checking.
//!
//! Programs arrive already type-checked. This crate only defines the data
//! types, a convenience builder, and [`validation::validate_program`], which
//! enforces the structural contract (operand types, call arity, goto targets)
//! that the symbolic executor relies on.

pub mod builder;
pub mod expr;
pub mod program;
pub mod types;
pub mod validation;
