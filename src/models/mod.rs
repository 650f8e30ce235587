//! Domain model module declarations.

pub mod results;
pub mod suite;
