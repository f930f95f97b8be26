//! Validate command - Check that rule files parse and compile.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use calcifer_policy::RuleSet;

use crate::ExitCodes;

#[derive(Args)]
pub struct ValidateArgs {
    /// Rule file or directory of rule files
    #[arg(short, long)]
    rules: PathBuf,
}

pub fn execute(args: ValidateArgs) -> Result<u8> {
    info!("Validating rules: {:?}", args.rules);

    let rules = RuleSet::load(&args.rules)
        .with_context(|| format!("Failed to load rules from {}", args.rules.display()))?;

    if rules.is_empty() {
        println!("⚠️  No rule files found in {}", args.rules.display());
        return Ok(ExitCodes::SUCCESS);
    }

    println!("🔒 Validating {} rule(s)...", rules.len());
    for rule in &rules.rules {
        let op = rule
            .to_op()
            .with_context(|| format!("Rule '{}' does not compile", rule.id))?;
        println!("   ✅ {} ({})", rule.name, rule.id);
        if !rule.description.is_empty() {
            println!("      {}", rule.description);
        }
        println!("      {}", op);
    }

    Ok(ExitCodes::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_validate_directory() {
        let temp = tempdir().unwrap();
        fs::write(
            temp.path().join("a.yaml"),
            "id: a\nname: A\nsteps:\n  - op: each\n",
        )
        .unwrap();

        let code = execute(ValidateArgs {
            rules: temp.path().to_path_buf(),
        })
        .unwrap();
        assert_eq!(code, ExitCodes::SUCCESS);
    }

    #[test]
    fn test_validate_rejects_bad_pattern() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("bad.yaml");
        fs::write(
            &path,
            "id: bad\nname: Bad\nsteps:\n  - op: match_pattern\n    pattern: \"[\"\n",
        )
        .unwrap();

        assert!(execute(ValidateArgs { rules: path }).is_err());
    }
}
