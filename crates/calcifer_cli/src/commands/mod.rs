//! CLI command definitions.
//!
//! Each subcommand loads declarative rule files and hands them to the
//! policy engine.

use clap::{Parser, Subcommand};

pub mod run;
pub mod validate;

/// Calcifer - non-deterministic policy evaluation
#[derive(Parser)]
#[command(name = "calcifer")]
#[command(version, about = "Calcifer - non-deterministic policy evaluation")]
#[command(long_about = r#"
Calcifer runs declarative policy rules against JSON or YAML documents. Every
branch a policy explores is evaluated; surviving branches are merged into one
document and every forbidden branch contributes an error record.

COMMANDS:
  run       → Run rules against a document and print the merged result
  validate  → Check that rule files parse and compile

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Policy errors present
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run rules against a document
    Run(run::RunArgs),

    /// Validate rule files
    Validate(validate::ValidateArgs),
}
