//! # calcifer_policy
//!
//! Policy construction and evaluation for Calcifer.
//!
//! This crate provides:
//! - The operator library ([`operators`])
//! - A fluent, immutable [`PolicyBuilder`] and its [`Op`] tree
//! - The evaluator ([`PolicyEvaluator`], [`run_policy`]) which enumerates
//!   branches, merges survivors and aggregates error records
//! - Declarative YAML rule files ([`RuleFile`], [`RuleSet`])

pub mod builder;
pub mod engine;
pub mod error;
pub mod operators;
pub mod policy;
pub mod rules;

pub use builder::{Op, PolicyBuilder};
pub use engine::{run_policy, EvaluatorConfig, PolicyEvaluator, RunOutcome, RunSummary};
pub use error::{PolicyError, PolicyResult};
pub use policy::{ApplyFn, Arg, BindFn, CheckFn, Criterion, Policy};
pub use rules::{RuleFile, RuleSet, Step};

pub use calcifer_core::{ConflictPolicy, Context, Document, ErrorRecord, Fault, Path};
