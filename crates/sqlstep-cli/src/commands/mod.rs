//! CLI command implementations

pub mod check;
pub mod completions;
pub mod config;
pub mod migrate;
pub mod status;
