//! Command-line interface for catalog-audit.
//!
//! Provides the `run` (full reconciliation pass) and `check` (single product)
//! commands.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
