#![doc = include_str!("../README.md")]

//! Struct values are flattened into single bit-vectors (first member in the
//! most significant bits) and arrays become SMT arrays indexed by bit-vectors,
//! so every encoded formula lives in `QF_ABV`.

pub mod backends;
pub mod error;
pub mod expr_encoding;
pub mod solver;
pub mod sorts;
pub mod struct_encoding;
pub mod terms;

pub use error::EncodingError;
