//! Calcifer CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Policy errors present

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use calcifer_policy::PolicyError;

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const POLICY_ERRORS: u8 = 3;
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Targets match by prefix, so this covers every calcifer_* crate.
    let default_directive = if cli.verbose {
        "calcifer=debug"
    } else {
        "calcifer=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let log_result = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    let invalid_input = e.chain().any(|cause| {
        if let Some(policy_error) = cause.downcast_ref::<PolicyError>() {
            return matches!(
                policy_error,
                PolicyError::InvalidRule { .. }
                    | PolicyError::InvalidConfiguration(_)
                    | PolicyError::Yaml(_)
                    | PolicyError::Toml(_)
            );
        }
        if let Some(io_error) = cause.downcast_ref::<std::io::Error>() {
            return io_error.kind() == std::io::ErrorKind::NotFound;
        }
        cause.is::<serde_json::Error>() || cause.is::<serde_yaml::Error>()
    });

    if invalid_input {
        ExitCodes::INVALID_ARGS
    } else {
        ExitCodes::GENERAL_ERROR
    }
}
