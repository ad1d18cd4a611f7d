//! CLI command implementations.

pub mod common;
pub mod run;
pub mod run_array;
pub mod version;
