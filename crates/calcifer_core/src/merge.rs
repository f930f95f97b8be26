//! Merging the documents of surviving branches.
//!
//! Branches start from the same seed, so merging is three-way: a node one
//! branch left equal to the seed yields to the other branch's edit. Only
//! nodes edited by both sides are combined, either by a [`MergeRule`]
//! registered for that exact path or by the [`Mergeable`] rule of the node.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::document::{Document, Mapping};
use crate::path::{Path, Segment};

/// Two branches disagree on the value at `path`.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Merge conflict at {path}: {left} != {right}")]
pub struct MergeConflict {
    pub path: Path,
    pub left: Document,
    pub right: Document,
}

/// What to do when two branches disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Abort the run.
    #[default]
    Fail,
    /// Keep the first value and report the conflict as an error record.
    Report,
}

/// Two-way combination of values edited by two branches.
pub trait Mergeable: Sized {
    fn merge(&self, other: &Self, at: &Path) -> Result<Self, MergeConflict>;
}

impl Mergeable for Document {
    fn merge(&self, other: &Self, at: &Path) -> Result<Self, MergeConflict> {
        if self == other {
            return Ok(self.clone());
        }
        match (self, other) {
            // Unknown yields to known.
            (Document::Null, known) | (known, Document::Null) => Ok(known.clone()),
            (Document::Mapping(left), Document::Mapping(right)) => {
                let mut merged = left.as_ref().clone();
                for (key, value) in right.iter() {
                    let combined = match left.get(key) {
                        Some(existing) => existing.merge(value, &at.child(Segment::from_token(key)))?,
                        None => value.clone(),
                    };
                    merged.insert(key.clone(), combined);
                }
                Ok(Document::from(merged))
            }
            (Document::Sequence(left), Document::Sequence(right)) => Ok(union(left, right)),
            _ => Err(MergeConflict {
                path: at.clone(),
                left: self.clone(),
                right: other.clone(),
            }),
        }
    }
}

fn union(left: &[Document], right: &[Document]) -> Document {
    Document::from(union_items(left, right))
}

fn union_items(left: &[Document], right: &[Document]) -> Vec<Document> {
    let mut items = left.to_vec();
    for item in right {
        if !items.contains(item) {
            items.push(item.clone());
        }
    }
    items
}

/// A merge strategy for one subtree, overriding [`Mergeable`].
#[cfg_attr(test, mockall::automock)]
pub trait MergeRule: Send + Sync {
    fn merge(&self, at: &Path, left: &Document, right: &Document) -> Result<Document, MergeConflict>;
}

/// Keeps the value of the earlier branch.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepFirst;

impl MergeRule for KeepFirst {
    fn merge(&self, _at: &Path, left: &Document, _right: &Document) -> Result<Document, MergeConflict> {
        Ok(left.clone())
    }
}

/// Unions sequences; any other pair of values becomes a two-element
/// sequence union.
#[derive(Debug, Clone, Copy, Default)]
pub struct Union;

impl MergeRule for Union {
    fn merge(&self, _at: &Path, left: &Document, right: &Document) -> Result<Document, MergeConflict> {
        let as_items = |doc: &Document| match doc {
            Document::Sequence(items) => items.as_ref().clone(),
            Document::Null => Vec::new(),
            other => vec![other.clone()],
        };
        Ok(union(&as_items(left), &as_items(right)))
    }
}

/// Folds branch documents into one, relative to a shared base.
pub struct Merger {
    policy: ConflictPolicy,
    rules: Vec<(Path, Arc<dyn MergeRule>)>,
    conflicts: Vec<MergeConflict>,
}

impl Merger {
    pub fn new(policy: ConflictPolicy) -> Self {
        Self {
            policy,
            rules: Vec::new(),
            conflicts: Vec::new(),
        }
    }

    /// Register a rule for the node at exactly `path`.
    pub fn with_rule(mut self, path: Path, rule: Arc<dyn MergeRule>) -> Self {
        self.rules.push((path, rule));
        self
    }

    /// Merge branch documents in order. With no branches the base is
    /// returned.
    pub fn merge_all<'a>(
        &mut self,
        base: &Document,
        branches: impl IntoIterator<Item = &'a Document>,
    ) -> Result<Document, MergeConflict> {
        let mut merged: Option<Document> = None;
        for branch in branches {
            merged = Some(match merged {
                None => branch.clone(),
                Some(acc) => self.merge3(Some(base), &acc, branch, &Path::root())?,
            });
        }
        Ok(merged.unwrap_or_else(|| base.clone()))
    }

    /// Conflicts kept under [`ConflictPolicy::Report`].
    pub fn take_conflicts(&mut self) -> Vec<MergeConflict> {
        std::mem::take(&mut self.conflicts)
    }

    fn merge3(
        &mut self,
        base: Option<&Document>,
        left: &Document,
        right: &Document,
        at: &Path,
    ) -> Result<Document, MergeConflict> {
        if left == right {
            return Ok(left.clone());
        }
        if let Some(base) = base {
            if base == left {
                return Ok(right.clone());
            }
            if base == right {
                return Ok(left.clone());
            }
        }
        if left.is_null() {
            return Ok(right.clone());
        }
        if right.is_null() {
            return Ok(left.clone());
        }

        if let Some(rule) = self.rule_for(at) {
            let outcome = rule.merge(at, left, right);
            return self.resolve(outcome, left);
        }

        match (left, right) {
            (Document::Mapping(l), Document::Mapping(r)) => {
                let base_map = base.and_then(Document::as_mapping);
                let keys: BTreeSet<&String> = l.keys().chain(r.keys()).collect();
                let mut merged = Mapping::new();
                for key in keys {
                    let child_at = at.child(Segment::from_token(key));
                    let child_base = base_map.and_then(|m| m.get(key.as_str()));
                    let value = match (l.get(key.as_str()), r.get(key.as_str())) {
                        (Some(a), Some(b)) => self.merge3(child_base, a, b, &child_at)?,
                        (Some(only), None) | (None, Some(only)) => {
                            // Removed on one side and untouched on the other.
                            if child_base == Some(only) {
                                continue;
                            }
                            only.clone()
                        }
                        (None, None) => continue,
                    };
                    merged.insert(key.clone(), value);
                }
                Ok(Document::from(merged))
            }
            // Neither side shrank the base: the base's slots merge by index,
            // items appended past it union.
            (Document::Sequence(l), Document::Sequence(r))
                if base
                    .and_then(Document::as_sequence)
                    .is_some_and(|b| l.len() >= b.len() && r.len() >= b.len()) =>
            {
                let base_items = base.and_then(Document::as_sequence).unwrap_or_default();
                let shared = base_items.len();
                let mut merged = Vec::with_capacity(l.len().max(r.len()));
                for (index, base_item) in base_items.iter().enumerate() {
                    let child_at = at.child(Segment::Index(index));
                    merged.push(self.merge3(Some(base_item), &l[index], &r[index], &child_at)?);
                }
                merged.extend(union_items(&l[shared..], &r[shared..]));
                Ok(Document::from(merged))
            }
            _ => {
                let outcome = left.merge(right, at);
                self.resolve(outcome, left)
            }
        }
    }

    fn rule_for(&self, at: &Path) -> Option<Arc<dyn MergeRule>> {
        self.rules
            .iter()
            .find(|(path, _)| path == at)
            .map(|(_, rule)| Arc::clone(rule))
    }

    fn resolve(
        &mut self,
        outcome: Result<Document, MergeConflict>,
        left: &Document,
    ) -> Result<Document, MergeConflict> {
        match outcome {
            Ok(doc) => Ok(doc),
            Err(conflict) => match self.policy {
                ConflictPolicy::Fail => Err(conflict),
                ConflictPolicy::Report => {
                    warn!("{}; keeping first value", conflict);
                    self.conflicts.push(conflict);
                    Ok(left.clone())
                }
            },
        }
    }
}
