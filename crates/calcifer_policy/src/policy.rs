//! The policy function type and the values operators are parameterised by.

use std::fmt;
use std::sync::Arc;

use calcifer_core::{Context, CoreResult, Document, Fault};
use regex::Regex;

use crate::builder::Op;

type PolicyFn = dyn Fn(Context) -> CoreResult<Vec<Context>> + Send + Sync;

/// A compiled policy: one branch in, zero or more branches out.
///
/// Terminal (forbidden) branches pass through every policy unchanged.
#[derive(Clone)]
pub struct Policy {
    label: Arc<str>,
    run: Arc<PolicyFn>,
}

impl Policy {
    pub fn new<F>(label: impl Into<String>, run: F) -> Self
    where
        F: Fn(Context) -> CoreResult<Vec<Context>> + Send + Sync + 'static,
    {
        Self {
            label: Arc::from(label.into()),
            run: Arc::new(run),
        }
    }

    /// Short description used in log lines.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn run(&self, ctx: Context) -> CoreResult<Vec<Context>> {
        if ctx.is_terminal() {
            return Ok(vec![ctx]);
        }
        (self.run)(ctx)
    }

    /// Run over several branches, flattening results in order.
    pub fn run_all(&self, branches: Vec<Context>) -> CoreResult<Vec<Context>> {
        let mut out = Vec::with_capacity(branches.len());
        for branch in branches {
            out.extend(self.run(branch)?);
        }
        Ok(out)
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Policy({})", self.label)
    }
}

/// Callback for `apply`.
pub type ApplyFn = Arc<dyn Fn(&[Document]) -> Result<Document, Fault> + Send + Sync>;

/// Predicate for `check`.
pub type CheckFn = Arc<dyn Fn(&[Document]) -> Result<bool, Fault> + Send + Sync>;

/// Builds the rest of a chain from the current result, for `with_value`.
pub type BindFn = Arc<dyn Fn(&Document) -> Result<Op, Fault> + Send + Sync>;

/// An operator argument, resolved against the branch when it runs.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// A literal document.
    Value(Document),
    /// The node under the cursor.
    Cursor,
    /// The node at a selector, relative to the cursor. Absent nodes read as null.
    At(String),
    /// A name bound by `define_as`.
    Bound(String),
    /// The branch result.
    Result,
}

impl Arg {
    pub fn value(value: impl Into<Document>) -> Self {
        Arg::Value(value.into())
    }

    pub fn at(selector: impl Into<String>) -> Self {
        Arg::At(selector.into())
    }

    pub fn bound(name: impl Into<String>) -> Self {
        Arg::Bound(name.into())
    }

    pub fn resolve(&self, ctx: &Context) -> CoreResult<Document> {
        match self {
            Arg::Value(value) => Ok(value.clone()),
            Arg::Cursor => Ok(ctx.current().clone()),
            Arg::At(selector) => {
                let path = ctx.cursor().resolve(selector)?;
                Ok(ctx.root().node(&path).cloned().unwrap_or_default())
            }
            Arg::Bound(name) => ctx.binding(name).cloned(),
            Arg::Result => Ok(ctx.result().clone()),
        }
    }

    pub fn resolve_all(args: &[Arg], ctx: &Context) -> CoreResult<Vec<Document>> {
        args.iter().map(|arg| arg.resolve(ctx)).collect()
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Value(value) => write!(f, "{}", value),
            Arg::Cursor => write!(f, "cursor"),
            Arg::At(selector) => write!(f, "at({:?})", selector),
            Arg::Bound(name) => write!(f, "bound({:?})", name),
            Arg::Result => write!(f, "result"),
        }
    }
}

impl From<Document> for Arg {
    fn from(value: Document) -> Self {
        Arg::Value(value)
    }
}

impl From<serde_json::Value> for Arg {
    fn from(value: serde_json::Value) -> Self {
        Arg::Value(value.into())
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Value(value.into())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Value(value.into())
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Arg::Value(value.into())
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Arg::Value(value.into())
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Arg::Value(value.into())
    }
}

/// What `match` compares the cursor value against.
#[derive(Clone)]
pub enum Criterion {
    Equals(Document),
    Satisfies {
        name: String,
        predicate: Arc<dyn Fn(&Document) -> bool + Send + Sync>,
    },
    /// Matches string values only.
    Pattern(Regex),
}

impl Criterion {
    pub fn equals(value: impl Into<Document>) -> Self {
        Criterion::Equals(value.into())
    }

    pub fn satisfies<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Document) -> bool + Send + Sync + 'static,
    {
        Criterion::Satisfies {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Criterion::Pattern)
    }

    pub fn matches(&self, value: &Document) -> bool {
        match self {
            Criterion::Equals(expected) => expected == value,
            Criterion::Satisfies { predicate, .. } => predicate(value),
            Criterion::Pattern(regex) => value.as_str().is_some_and(|s| regex.is_match(s)),
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Criterion::Equals(value) => write!(f, "{}", value),
            Criterion::Satisfies { name, .. } => write!(f, "{}", name),
            Criterion::Pattern(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

impl fmt::Debug for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Criterion({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Context {
        Context::seed(Document::from(json!({"a": {"b": 2}, "c": "text"})))
            .select("/a")
            .unwrap()
            .bind("name", Document::from("bound"))
            .with_result(Document::from(7))
    }

    #[test]
    fn test_arg_resolution() {
        let ctx = ctx();
        assert_eq!(Arg::value(1).resolve(&ctx).unwrap(), Document::from(1));
        assert_eq!(Arg::Cursor.resolve(&ctx).unwrap(), Document::from(json!({"b": 2})));
        assert_eq!(Arg::at("b").resolve(&ctx).unwrap(), Document::from(2));
        assert_eq!(Arg::at("/c").resolve(&ctx).unwrap(), Document::from("text"));
        assert_eq!(Arg::at("missing").resolve(&ctx).unwrap(), Document::Null);
        assert_eq!(Arg::bound("name").resolve(&ctx).unwrap(), Document::from("bound"));
        assert_eq!(Arg::Result.resolve(&ctx).unwrap(), Document::from(7));
        assert!(Arg::bound("nope").resolve(&ctx).is_err());
    }

    #[test]
    fn test_criterion() {
        assert!(Criterion::equals(3).matches(&Document::from(3)));
        assert!(!Criterion::equals(3).matches(&Document::from(4)));

        let even = Criterion::satisfies("even", |d| d.as_i64().is_some_and(|n| n % 2 == 0));
        assert!(even.matches(&Document::from(4)));
        assert_eq!(even.to_string(), "even");

        let pattern = Criterion::pattern("^ab+$").unwrap();
        assert!(pattern.matches(&Document::from("abbb")));
        assert!(!pattern.matches(&Document::from(1)));
        assert!(Criterion::pattern("(").is_err());
    }

    #[test]
    fn test_terminal_passes_through() {
        let policy = Policy::new("drop", |_| Ok(Vec::new()));
        let forbidden = Context::seed(Document::Null).forbid("stop");
        let out = policy.run(forbidden).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].is_terminal());
    }
}
