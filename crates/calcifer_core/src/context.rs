//! Per-branch evaluation state.
//!
//! A [`Context`] is a value: every operator that changes it consumes the
//! input and returns a new one. Sibling branches therefore never observe
//! each other's edits. The document, the error log and the bindings are all
//! reference counted so forking a branch costs a handful of pointer copies.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::Document;
use crate::error::{CoreError, CoreResult};
use crate::path::Path;

/// A diagnostic produced by a forbidden branch or a recovered fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    pub annotation_path: Vec<String>,
    pub document_path: Path,
}

impl ErrorRecord {
    pub fn new(message: impl Into<String>, annotation_path: Vec<String>, document_path: Path) -> Self {
        Self {
            message: message.into(),
            annotation_path,
            document_path,
        }
    }
}

/// Outcome of the most recent `check`, consumed by `forbid` and `require`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub name: String,
    pub held: bool,
}

/// Execution state of one branch.
#[derive(Debug, Clone)]
pub struct Context {
    cursor: Path,
    root: Document,
    errors: Vec<Arc<ErrorRecord>>,
    annotations: Vec<String>,
    terminal: bool,
    result: Document,
    bindings: Arc<BTreeMap<String, Document>>,
    last_check: Option<CheckOutcome>,
}

impl Context {
    /// The initial branch: cursor at the root, no errors, empty stack.
    pub fn seed(root: Document) -> Self {
        Self {
            cursor: Path::root(),
            root,
            errors: Vec::new(),
            annotations: Vec::new(),
            terminal: false,
            result: Document::Null,
            bindings: Arc::new(BTreeMap::new()),
            last_check: None,
        }
    }

    pub fn cursor(&self) -> &Path {
        &self.cursor
    }

    pub fn root(&self) -> &Document {
        &self.root
    }

    /// The node under the cursor.
    pub fn current(&self) -> &Document {
        const NULL: &Document = &Document::Null;
        self.root.node(&self.cursor).unwrap_or(NULL)
    }

    pub fn result(&self) -> &Document {
        &self.result
    }

    pub fn annotations(&self) -> &[String] {
        &self.annotations
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn last_check(&self) -> Option<&CheckOutcome> {
        self.last_check.as_ref()
    }

    pub fn binding(&self, name: &str) -> CoreResult<&Document> {
        self.bindings
            .get(name)
            .ok_or_else(|| CoreError::UnboundName(name.to_string()))
    }

    /// Error records with their identity preserved, for de-duplication.
    pub fn shared_errors(&self) -> &[Arc<ErrorRecord>] {
        &self.errors
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Move the cursor to an absolute path, creating missing mapping keys.
    pub fn with_cursor(mut self, path: Path) -> CoreResult<Self> {
        self.root = self.root.materialize(&path)?;
        self.cursor = path;
        Ok(self)
    }

    /// Move the cursor by selector, relative to the current cursor.
    pub fn select(self, selector: &str) -> CoreResult<Self> {
        let path = self.cursor.resolve(selector)?;
        self.with_cursor(path)
    }

    /// Replace the cursor node.
    pub fn set_value(mut self, value: Document) -> CoreResult<Self> {
        self.root = self.root.with_node(&self.cursor, value)?;
        Ok(self)
    }

    /// Union `value` into the sequence under the cursor.
    pub fn append_value(mut self, value: Document) -> CoreResult<Self> {
        self.root = self.root.with_appended(&self.cursor, value)?;
        Ok(self)
    }

    /// Replace the whole document, keeping the cursor.
    pub fn with_root(mut self, root: Document) -> CoreResult<Self> {
        self.root = root.materialize(&self.cursor)?;
        Ok(self)
    }

    pub fn with_result(mut self, result: Document) -> Self {
        self.result = result;
        self
    }

    pub fn bind(mut self, name: impl Into<String>, value: Document) -> Self {
        Arc::make_mut(&mut self.bindings).insert(name.into(), value);
        self
    }

    pub fn with_check(mut self, name: impl Into<String>, held: bool) -> Self {
        self.last_check = Some(CheckOutcome {
            name: name.into(),
            held,
        });
        self
    }

    /// Consume the outcome of the preceding check.
    pub fn take_check(mut self) -> (Self, Option<CheckOutcome>) {
        let check = self.last_check.take();
        (self, check)
    }

    pub fn push_annotation(mut self, label: impl Into<String>) -> Self {
        self.annotations.push(label.into());
        self
    }

    pub fn pop_annotation(mut self) -> CoreResult<Self> {
        if self.annotations.pop().is_none() {
            return Err(CoreError::AnnotationUnderflow {
                path: self.cursor.to_string(),
            });
        }
        Ok(self)
    }

    /// Replace the annotation stack with a saved one.
    pub fn with_annotations(mut self, annotations: Vec<String>) -> Self {
        self.annotations = annotations;
        self
    }

    /// Append an error record without ending the branch.
    pub fn record_error(mut self, message: impl Into<String>) -> Self {
        let record = ErrorRecord::new(message, self.annotations.clone(), self.cursor.clone());
        self.errors.push(Arc::new(record));
        self
    }

    /// End the branch with an error. Its edits are dropped from the merge.
    pub fn forbid(self, message: impl Into<String>) -> Self {
        let mut forbidden = self.record_error(message);
        forbidden.terminal = true;
        if let Some(record) = forbidden.errors.last() {
            debug!(
                "Branch forbidden at {}: {}",
                record.document_path, record.message
            );
        }
        forbidden
    }

    /// One branch per immediate child of the cursor node.
    pub fn children(&self) -> Vec<Context> {
        self.current()
            .children()
            .into_iter()
            .map(|(segment, _)| {
                let mut child = self.clone();
                child.cursor = self.cursor.child(segment);
                child
            })
            .collect()
    }
}
