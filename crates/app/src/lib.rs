//! Command-line surface for the knowledge-base agent: `chat`, `weather` and
//! `probe` subcommands.

pub mod cli;
