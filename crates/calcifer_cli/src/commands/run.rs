//! Run command - Evaluate rules against a document.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use tracing::info;

use calcifer_core::Document;
use calcifer_policy::{EvaluatorConfig, PolicyEvaluator, RuleSet};

use crate::ExitCodes;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Args)]
pub struct RunArgs {
    /// Rule file or directory of rule files
    #[arg(short, long)]
    rules: PathBuf,

    /// Document to evaluate (JSON or YAML)
    #[arg(short, long)]
    document: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Evaluator configuration (YAML or TOML)
    #[arg(short, long, env = "CALCIFER_CONFIG")]
    config: Option<PathBuf>,
}

pub fn execute(args: RunArgs) -> Result<u8> {
    info!("Running rules {:?} against {:?}", args.rules, args.document);

    let config = match &args.config {
        Some(path) => EvaluatorConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EvaluatorConfig::default(),
    };

    let rules = RuleSet::load(&args.rules)
        .with_context(|| format!("Failed to load rules from {}", args.rules.display()))?;
    let policy = rules.to_builder()?.finalize();
    let document = load_document(&args.document)?;

    let outcome = PolicyEvaluator::new(config)
        .run(&policy, document)
        .context("Policy run failed")?;

    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&outcome.to_value())
                .context("Failed to serialize result")?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            println!("{}", outcome.report());
            println!();
            println!("Result:");
            println!(
                "{}",
                serde_yaml::to_string(&outcome.document).context("Failed to render document")?
            );
        }
    }

    if outcome.accepted() {
        Ok(ExitCodes::SUCCESS)
    } else {
        Ok(ExitCodes::POLICY_ERRORS)
    }
}

/// Read a document, choosing the parser by extension.
pub fn load_document(path: &Path) -> Result<Document> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read document {}", path.display()))?;

    let value: serde_json::Value = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid YAML in {}", path.display()))?,
        _ => serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?,
    };
    Ok(Document::from(value))
}
