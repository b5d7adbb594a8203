//! Provider-issued token sets.

pub mod set;

pub use set::*;
