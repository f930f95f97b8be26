//! Declarative rule files.
//!
//! A rule file is YAML describing a chain of closure-free operators:
//!
//! ```yaml
//! id: no-threes
//! name: No threes
//! description: Items must not be 3
//! steps:
//!   - op: select
//!     path: /items
//!   - op: each
//!   - op: forbid_value
//!     value: 3
//! ```

use std::path::Path;

use calcifer_core::Document;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::builder::{Op, PolicyBuilder};
use crate::error::{PolicyError, PolicyResult};
use crate::policy::{Arg, Criterion};

/// One operator in a rule file, tagged by `op`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Select {
        path: String,
    },
    SetValue {
        #[serde(default)]
        value: Document,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bound: Option<String>,
    },
    AppendValue {
        #[serde(default)]
        value: Document,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bound: Option<String>,
    },
    DefineAs {
        name: String,
    },
    Children,
    Each,
    ForEach {
        steps: Vec<Step>,
    },
    Regarding {
        path: String,
        steps: Vec<Step>,
    },
    Given {
        path: String,
        steps: Vec<Step>,
    },
    Match {
        value: Document,
    },
    MatchPattern {
        pattern: String,
    },
    PermitValues {
        values: Vec<Document>,
    },
    Choose {
        values: Vec<Document>,
    },
    /// Checks the cursor unless `from` or `bound` names another value.
    RequireValue {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bound: Option<String>,
    },
    ForbidValue {
        #[serde(default)]
        value: Document,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bound: Option<String>,
    },
    Fail {
        message: String,
    },
    UnlessErrors {
        steps: Vec<Step>,
    },
    Attempt {
        steps: Vec<Step>,
        /// Steps run on the input branch when `steps` fault or prune.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        catch: Option<Vec<Step>>,
    },
    Optional {
        steps: Vec<Step>,
    },
    PushContext {
        label: String,
    },
    PopContext,
    WrapContext {
        label: String,
        steps: Vec<Step>,
    },
    Trace {
        label: String,
    },
}

fn arg_of(value: &Document, from: &Option<String>, bound: &Option<String>) -> Arg {
    match (bound, from) {
        (Some(name), _) => Arg::Bound(name.clone()),
        (None, Some(selector)) => Arg::At(selector.clone()),
        (None, None) => Arg::Value(value.clone()),
    }
}

fn lower_steps(rule: &str, steps: &[Step]) -> PolicyResult<Op> {
    let ops = steps
        .iter()
        .map(|step| step.to_op(rule))
        .collect::<PolicyResult<Vec<_>>>()?;
    Ok(Op::Collect(ops))
}

impl Step {
    /// Lower this step to an operator. `rule` names the owning rule in
    /// error messages.
    pub fn to_op(&self, rule: &str) -> PolicyResult<Op> {
        let op = match self {
            Step::Select { path } => Op::Select {
                selector: path.clone(),
            },
            Step::SetValue { value, from, bound } => Op::SetValue(arg_of(value, from, bound)),
            Step::AppendValue { value, from, bound } => Op::AppendValue(arg_of(value, from, bound)),
            Step::DefineAs { name } => Op::DefineAs(name.clone()),
            Step::Children => Op::Children,
            Step::Each => Op::Each,
            Step::ForEach { steps } => Op::ForEach(Box::new(lower_steps(rule, steps)?)),
            Step::Regarding { path, steps } => Op::Regarding {
                selector: path.clone(),
                body: Box::new(lower_steps(rule, steps)?),
            },
            Step::Given { path, steps } => Op::Given {
                selector: path.clone(),
                body: Box::new(lower_steps(rule, steps)?),
            },
            Step::Match { value } => Op::Match(Criterion::Equals(value.clone())),
            Step::MatchPattern { pattern } => {
                let regex = Regex::new(pattern).map_err(|e| PolicyError::InvalidRule {
                    rule: rule.to_string(),
                    message: format!("invalid pattern '{}': {}", pattern, e),
                })?;
                Op::Match(Criterion::Pattern(regex))
            }
            Step::PermitValues { values } => Op::PermitValues(values.clone()),
            Step::Choose { values } => Op::Choose(values.clone()),
            Step::RequireValue { from, bound } => {
                let arg = match (bound, from) {
                    (None, None) => Arg::Cursor,
                    _ => arg_of(&Document::Null, from, bound),
                };
                Op::RequireValue(arg)
            }
            Step::ForbidValue { value, from, bound } => Op::ForbidValue(arg_of(value, from, bound)),
            Step::Fail { message } => Op::Fail(message.clone()),
            Step::UnlessErrors { steps } => Op::UnlessErrors(Box::new(lower_steps(rule, steps)?)),
            Step::Attempt { steps, catch } => Op::Attempt {
                body: Box::new(lower_steps(rule, steps)?),
                catch: catch
                    .as_deref()
                    .map(|handler| lower_steps(rule, handler))
                    .transpose()?
                    .map(Box::new),
            },
            Step::Optional { steps } => Op::Optional(Box::new(lower_steps(rule, steps)?)),
            Step::PushContext { label } => Op::PushContext(label.clone()),
            Step::PopContext => Op::PopContext,
            Step::WrapContext { label, steps } => Op::WrapContext {
                label: label.clone(),
                body: Box::new(lower_steps(rule, steps)?),
            },
            Step::Trace { label } => Op::Trace(label.clone()),
        };
        Ok(op)
    }
}

/// A rule loaded from YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleFile {
    /// Unique identifier, also the annotation on the rule's errors
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Description of the rule
    #[serde(default)]
    pub description: String,
    /// Operators, run from the document root
    pub steps: Vec<Step>,
}

impl RuleFile {
    /// Load a rule from a YAML file.
    pub fn from_file(path: &Path) -> PolicyResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a rule from a YAML string.
    pub fn from_yaml(yaml: &str) -> PolicyResult<Self> {
        let rule: Self = serde_yaml::from_str(yaml)?;
        if rule.id.trim().is_empty() {
            return Err(PolicyError::InvalidRule {
                rule: rule.name.clone(),
                message: "rule id must not be empty".to_string(),
            });
        }
        Ok(rule)
    }

    /// Serialize the rule to YAML.
    pub fn to_yaml(&self) -> PolicyResult<String> {
        serde_yaml::to_string(self).map_err(PolicyError::from)
    }

    /// The rule as one operator: its steps, annotated with the rule id and
    /// started from the document root.
    pub fn to_op(&self) -> PolicyResult<Op> {
        let body = lower_steps(&self.id, &self.steps)?;
        Ok(Op::Regarding {
            selector: "/".to_string(),
            body: Box::new(Op::WrapContext {
                label: self.id.clone(),
                body: Box::new(body),
            }),
        })
    }

    pub fn to_builder(&self) -> PolicyResult<PolicyBuilder> {
        Ok(PolicyBuilder::new().then(self.to_op()?))
    }
}

/// An ordered collection of rules, applied one after another.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub rules: Vec<RuleFile>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule, rejecting duplicate ids.
    pub fn add(&mut self, rule: RuleFile) -> PolicyResult<()> {
        if self.rules.iter().any(|r| r.id == rule.id) {
            return Err(PolicyError::InvalidRule {
                rule: rule.id,
                message: "duplicate rule id".to_string(),
            });
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Load every `*.yaml` / `*.yml` file under `path`, in file name order.
    pub fn from_directory(path: &Path) -> PolicyResult<Self> {
        let mut set = Self::new();
        let mut files = Vec::new();
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.map_err(|e| PolicyError::Io(e.into()))?;
            let file = entry.path();
            if entry.file_type().is_file()
                && file
                    .extension()
                    .is_some_and(|e| e == "yaml" || e == "yml")
            {
                files.push(file.to_path_buf());
            }
        }
        for file in files {
            debug!("Loading rule file: {}", file.display());
            let rule = RuleFile::from_file(&file).map_err(|e| PolicyError::InvalidRule {
                rule: file.display().to_string(),
                message: e.to_string(),
            })?;
            set.add(rule)?;
        }
        Ok(set)
    }

    /// Load a single rule file or a directory of them.
    pub fn load(path: &Path) -> PolicyResult<Self> {
        if path.is_dir() {
            return Self::from_directory(path);
        }
        let mut set = Self::new();
        set.add(RuleFile::from_file(path)?)?;
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn to_builder(&self) -> PolicyResult<PolicyBuilder> {
        self.rules
            .iter()
            .try_fold(PolicyBuilder::new(), |builder, rule| Ok(builder.then(rule.to_op()?)))
    }
}
