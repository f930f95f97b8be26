//! # calcifer_core
//!
//! Data model for the Calcifer policy engine.
//!
//! This crate provides:
//! - The [`Document`] tree with structural sharing
//! - [`Path`] addressing and selector resolution
//! - The per-branch [`Context`] and its [`ErrorRecord`]s
//! - Branch merging ([`Mergeable`], [`MergeRule`], [`Merger`])

pub mod context;
pub mod document;
pub mod error;
pub mod merge;
pub mod path;

pub use context::{CheckOutcome, Context, ErrorRecord};
pub use document::{Document, Mapping};
pub use error::{CoreError, CoreResult, Fault};
pub use merge::{ConflictPolicy, KeepFirst, MergeConflict, MergeRule, Mergeable, Merger, Union};
pub use path::{Path, Segment};
