//! CLI command implementations.

pub mod common;
pub mod objects;
pub mod play;
pub mod serve;
