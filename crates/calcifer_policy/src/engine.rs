//! Policy evaluation engine.
//!
//! This module runs a finalized policy from a seed document, enumerates
//! every branch, merges the surviving documents and gathers the error
//! records of all branches into a [`RunOutcome`].

use std::collections::HashSet;
use std::path::Path as FsPath;
use std::sync::Arc;

use calcifer_core::{
    ConflictPolicy, Context, Document, ErrorRecord, MergeRule, Merger, Path,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{PolicyError, PolicyResult};
use crate::policy::Policy;

fn default_errors_key() -> String {
    "errors".to_string()
}

fn default_branch_warning_threshold() -> usize {
    10_000
}

/// Configuration for the policy evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Output key holding the error records
    #[serde(default = "default_errors_key")]
    pub errors_key: String,
    /// What to do when surviving branches disagree
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    /// Branch count above which a warning is logged
    #[serde(default = "default_branch_warning_threshold")]
    pub branch_warning_threshold: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            errors_key: default_errors_key(),
            conflict_policy: ConflictPolicy::default(),
            branch_warning_threshold: default_branch_warning_threshold(),
        }
    }
}

impl EvaluatorConfig {
    /// Load configuration from a YAML or TOML file, chosen by extension.
    pub fn from_file(path: &FsPath) -> PolicyResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&content)?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            other => {
                return Err(PolicyError::InvalidConfiguration(format!(
                    "unsupported config format: {}",
                    other.unwrap_or("<none>")
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PolicyResult<()> {
        if self.errors_key.is_empty() {
            return Err(PolicyError::InvalidConfiguration(
                "errors_key must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_errors_key(mut self, key: impl Into<String>) -> Self {
        self.errors_key = key.into();
        self
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    pub fn with_branch_warning_threshold(mut self, threshold: usize) -> Self {
        self.branch_warning_threshold = threshold;
        self
    }
}

/// Branch statistics for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_branches: usize,
    pub surviving_branches: usize,
    pub forbidden_branches: usize,
    pub error_count: usize,
    pub merge_conflicts: usize,
}

/// Result of running a policy against a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Unique id of this run
    pub run_id: Uuid,
    /// Merged document of every surviving branch
    pub document: Document,
    /// Error records of every branch, in branch order
    pub errors: Vec<ErrorRecord>,
    /// Summary statistics
    pub summary: RunSummary,
    /// Key under which `to_value` places the errors
    pub errors_key: String,
    /// Timestamp when the run started
    pub started_at: DateTime<Utc>,
    /// Timestamp when the run completed
    pub completed_at: DateTime<Utc>,
}

impl RunOutcome {
    /// True when no branch recorded an error.
    pub fn accepted(&self) -> bool {
        self.errors.is_empty()
    }

    /// Top-level field of the merged document.
    pub fn get(&self, key: &str) -> Option<&Document> {
        self.document.get(key)
    }

    /// The output mapping: the merged document's top-level fields plus the
    /// error list under `errors_key`. A non-mapping document is placed under
    /// `value`.
    pub fn to_value(&self) -> Value {
        let mut out = match Value::from(&self.document) {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        let errors = self
            .errors
            .iter()
            .map(|record| {
                serde_json::json!({
                    "message": record.message,
                    "annotation_path": record.annotation_path,
                    "document_path": record.document_path.to_string(),
                })
            })
            .collect();
        out.insert(self.errors_key.clone(), Value::Array(errors));
        Value::Object(out)
    }

    /// Generate a human-readable report.
    pub fn report(&self) -> String {
        let mut report = String::new();

        report.push_str(&format!("Run: {}\n", self.run_id));
        report.push_str(&format!(
            "Status: {}\n",
            if self.accepted() { "✅ ACCEPTED" } else { "❌ REJECTED" }
        ));
        report.push_str(&format!(
            "Branches: {} explored, {} surviving, {} forbidden\n",
            self.summary.total_branches,
            self.summary.surviving_branches,
            self.summary.forbidden_branches
        ));

        if !self.errors.is_empty() {
            report.push_str("\nErrors:\n");
            for record in &self.errors {
                report.push_str(&format!("  ❌ {}\n", record.message));
                report.push_str(&format!("     at {}", record.document_path));
                if !record.annotation_path.is_empty() {
                    report.push_str(&format!(" ({})", record.annotation_path.join(" > ")));
                }
                report.push('\n');
            }
        }

        report.push_str(&format!("\nSummary: {} error(s)", self.summary.error_count));
        report
    }
}

/// Runs policies and assembles their outcomes.
#[derive(Default)]
pub struct PolicyEvaluator {
    config: EvaluatorConfig,
    merge_rules: Vec<(Path, Arc<dyn MergeRule>)>,
}

impl PolicyEvaluator {
    /// Create a new evaluator with configuration.
    pub fn new(config: EvaluatorConfig) -> Self {
        Self {
            config,
            merge_rules: Vec::new(),
        }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Merge the node at `path` with `rule` instead of the default rule.
    pub fn with_merge_rule(mut self, path: Path, rule: Arc<dyn MergeRule>) -> Self {
        self.merge_rules.push((path, rule));
        self
    }

    /// Enumerate every branch without merging.
    pub fn explore(&self, policy: &Policy, document: impl Into<Document>) -> PolicyResult<Vec<Context>> {
        let branches = policy.run(Context::seed(document.into()))?;
        if branches.len() > self.config.branch_warning_threshold {
            warn!(
                "Policy produced {} branches (threshold {})",
                branches.len(),
                self.config.branch_warning_threshold
            );
        }
        Ok(branches)
    }

    /// Run `policy` against `document`.
    pub fn run(&self, policy: &Policy, document: impl Into<Document>) -> PolicyResult<RunOutcome> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let seed = document.into();

        if seed.get(&self.config.errors_key).is_some() {
            warn!(
                "Document already has a top-level '{}' field; it will be shadowed in the output",
                self.config.errors_key
            );
        }

        info!("Running policy {} ({})", policy.label(), run_id);
        let branches = self.explore(policy, seed.clone())?;

        let (forbidden, surviving): (Vec<&Context>, Vec<&Context>) =
            branches.iter().partition(|branch| branch.is_terminal());
        debug!(
            "Explored {} branches: {} surviving, {} forbidden",
            branches.len(),
            surviving.len(),
            forbidden.len()
        );

        let mut merger = Merger::new(self.config.conflict_policy);
        for (path, rule) in &self.merge_rules {
            merger = merger.with_rule(path.clone(), Arc::clone(rule));
        }
        let document = merger.merge_all(&seed, surviving.iter().copied().map(Context::root))?;

        let mut errors = collect_errors(&branches);
        let conflicts = merger.take_conflicts();
        let merge_conflicts = conflicts.len();
        for conflict in conflicts {
            errors.push(ErrorRecord::new(
                conflict.to_string(),
                Vec::new(),
                conflict.path.clone(),
            ));
        }

        let summary = RunSummary {
            total_branches: branches.len(),
            surviving_branches: surviving.len(),
            forbidden_branches: forbidden.len(),
            error_count: errors.len(),
            merge_conflicts,
        };

        info!(
            "Policy run complete: {} - {} error(s)",
            run_id, summary.error_count
        );

        Ok(RunOutcome {
            run_id,
            document,
            errors,
            summary,
            errors_key: self.config.errors_key.clone(),
            started_at,
            completed_at: Utc::now(),
        })
    }
}

/// Concatenate error records in branch order. Records inherited from a
/// common ancestor are the same allocation and are kept once.
fn collect_errors(branches: &[Context]) -> Vec<ErrorRecord> {
    let mut seen = HashSet::new();
    let mut errors = Vec::new();
    for branch in branches {
        for record in branch.shared_errors() {
            if seen.insert(Arc::as_ptr(record)) {
                errors.push(record.as_ref().clone());
            }
        }
    }
    errors
}

/// Run `policy` against `document` with the default configuration.
pub fn run_policy(policy: &Policy, document: impl Into<Document>) -> PolicyResult<RunOutcome> {
    PolicyEvaluator::default().run(policy, document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::PolicyBuilder;
    use crate::policy::Arg;
    use crate::operators::unit;
    use calcifer_core::KeepFirst;
    use serde_json::json;

    #[test]
    fn test_unit_returns_document() {
        let outcome = run_policy(&unit(), json!({"a": 1, "b": [1, 2]})).unwrap();
        assert!(outcome.accepted());
        assert_eq!(
            outcome.to_value(),
            json!({"a": 1, "b": [1, 2], "errors": []})
        );
    }

    #[test]
    fn test_fan_out_edits_merge() {
        let policy = PolicyBuilder::new()
            .select("/flags")
            .each()
            .define_as("flag")
            .select("/seen")
            .append_value(Arg::bound("flag"))
            .finalize();
        let outcome = run_policy(&policy, json!({"flags": ["x", "y"], "seen": []})).unwrap();
        assert_eq!(outcome.summary.total_branches, 2);
        assert_eq!(outcome.get("seen"), Some(&Document::from(json!(["x", "y"]))));
        assert!(outcome.accepted());
    }

    #[test]
    fn test_conflict_fails_by_default() {
        let policy = PolicyBuilder::new()
            .select("/pick")
            .choose([Document::from("x"), Document::from("y")])
            .finalize();
        let err = run_policy(&policy, json!({"pick": null})).unwrap_err();
        assert!(matches!(err, PolicyError::MergeConflict(_)));
    }

    #[test]
    fn test_conflict_report_mode() {
        let policy = PolicyBuilder::new()
            .select("/pick")
            .choose([Document::from("x"), Document::from("y")])
            .finalize();
        let evaluator = PolicyEvaluator::new(
            EvaluatorConfig::default().with_conflict_policy(ConflictPolicy::Report),
        );
        let outcome = evaluator.run(&policy, json!({"pick": null})).unwrap();
        assert_eq!(outcome.get("pick"), Some(&Document::from("x")));
        assert_eq!(outcome.summary.merge_conflicts, 1);
        assert_eq!(outcome.errors[0].document_path.to_string(), "/pick");
    }

    #[test]
    fn test_merge_rule_override() {
        let policy = PolicyBuilder::new()
            .select("/pick")
            .choose([Document::from("x"), Document::from("y")])
            .finalize();
        let evaluator = PolicyEvaluator::default()
            .with_merge_rule(Path::parse("/pick").unwrap(), Arc::new(KeepFirst));
        let outcome = evaluator.run(&policy, json!({"pick": null})).unwrap();
        assert_eq!(outcome.get("pick"), Some(&Document::from("x")));
        assert!(outcome.accepted());
    }

    #[test]
    fn test_all_forbidden_yields_seed() {
        let policy = PolicyBuilder::new().select("/x").set_value(1).fail("never").finalize();
        let outcome = run_policy(&policy, json!({"x": 0})).unwrap();
        assert_eq!(outcome.get("x"), Some(&Document::from(0)));
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.summary.forbidden_branches, 1);
    }

    #[test]
    fn test_shared_errors_reported_once() {
        let policy = PolicyBuilder::new()
            .attempt(PolicyBuilder::new().select("/n/0"))
            .select("/xs")
            .each()
            .finalize();
        let outcome = run_policy(&policy, json!({"n": null, "xs": [1, 2, 3]})).unwrap();
        assert_eq!(outcome.summary.total_branches, 3);
        assert_eq!(outcome.errors.len(), 1);
    }

    #[test]
    fn test_fault_aborts_run() {
        let policy = PolicyBuilder::new().pop_context().finalize();
        let err = run_policy(&policy, json!({})).unwrap_err();
        assert!(matches!(err, PolicyError::Fault(_)));
    }

    #[test]
    fn test_custom_errors_key_and_report() {
        let policy = PolicyBuilder::new()
            .wrap_context("limits", PolicyBuilder::new().select("/x").forbid_value(5))
            .finalize();
        let evaluator = PolicyEvaluator::new(EvaluatorConfig::default().with_errors_key("problems"));
        let outcome = evaluator.run(&policy, json!({"x": 5})).unwrap();

        let value = outcome.to_value();
        assert_eq!(value["problems"][0]["document_path"], json!("/x"));
        assert_eq!(value["problems"][0]["annotation_path"], json!(["limits"]));

        let report = outcome.report();
        assert!(report.contains("REJECTED"));
        assert!(report.contains("at /x (limits)"));
    }

    #[test]
    fn test_config_from_files() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("calcifer.yaml");
        std::fs::write(&yaml, "conflict_policy: report\nbranch_warning_threshold: 5\n").unwrap();
        let config = EvaluatorConfig::from_file(&yaml).unwrap();
        assert_eq!(config.conflict_policy, ConflictPolicy::Report);
        assert_eq!(config.branch_warning_threshold, 5);
        assert_eq!(config.errors_key, "errors");

        let toml_path = dir.path().join("calcifer.toml");
        std::fs::write(&toml_path, "errors_key = \"issues\"\n").unwrap();
        let config = EvaluatorConfig::from_file(&toml_path).unwrap();
        assert_eq!(config.errors_key, "issues");
        assert_eq!(config.conflict_policy, ConflictPolicy::Fail);

        let bad = dir.path().join("calcifer.ini");
        std::fs::write(&bad, "").unwrap();
        assert!(matches!(
            EvaluatorConfig::from_file(&bad),
            Err(PolicyError::InvalidConfiguration(_))
        ));
    }
}
