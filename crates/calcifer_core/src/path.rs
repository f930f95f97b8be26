//! Document paths and selector resolution.
//!
//! Paths are absolute, root-relative sequences of segments. Their textual
//! form follows JSON-pointer escaping (`~0` for `~`, `~1` for `/`). Selectors
//! handed to operators may be relative: they are resolved against the
//! cursor, with `..` stepping to the parent and `.` or `""` staying put.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// A single path step: a mapping key or a sequence index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl Segment {
    /// Classify a raw (already unescaped) token.
    ///
    /// Canonical decimal integers become indices; everything else is a key.
    pub fn from_token(token: &str) -> Self {
        let canonical = token == "0" || (!token.starts_with('0') && !token.is_empty());
        if canonical && token.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(index) = token.parse::<usize>() {
                return Segment::Index(index);
            }
        }
        Segment::Key(token.to_string())
    }

    /// The segment as a mapping key.
    pub fn as_key(&self) -> String {
        match self {
            Segment::Key(key) => key.clone(),
            Segment::Index(index) => index.to_string(),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => write!(f, "{}", key.replace('~', "~0").replace('/', "~1")),
            Segment::Index(index) => write!(f, "{}", index),
        }
    }
}

impl From<&str> for Segment {
    fn from(token: &str) -> Self {
        Segment::from_token(token)
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Segment::Index(index)
    }
}

/// An absolute location inside a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: impl IntoIterator<Item = Segment>) -> Self {
        Self {
            segments: segments.into_iter().collect(),
        }
    }

    /// Parse an absolute path such as `/a/b/0`.
    pub fn parse(text: &str) -> CoreResult<Self> {
        if !text.is_empty() && !text.starts_with('/') {
            return Err(CoreError::InvalidPath {
                path: text.to_string(),
                reason: "absolute paths must start with '/'".to_string(),
            });
        }
        Self::root().resolve(text)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }

    pub fn child(&self, segment: impl Into<Segment>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let mut segments = self.segments.clone();
        segments.pop();
        Some(Self { segments })
    }

    /// The first `len` segments of this path.
    pub fn prefix(&self, len: usize) -> Self {
        Self {
            segments: self.segments[..len.min(self.segments.len())].to_vec(),
        }
    }

    pub fn starts_with(&self, other: &Path) -> bool {
        self.segments.starts_with(&other.segments)
    }

    /// Resolve a selector against this path.
    ///
    /// A leading `/` makes the selector absolute. Empty tokens are skipped
    /// so `"/"` and `"a/"` behave like `""` and `"a"`.
    pub fn resolve(&self, selector: &str) -> CoreResult<Self> {
        let (mut segments, rest) = match selector.strip_prefix('/') {
            Some(rest) => (Vec::new(), rest),
            None => (self.segments.clone(), selector),
        };

        for token in rest.split('/') {
            match token {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(CoreError::InvalidPath {
                            path: selector.to_string(),
                            reason: format!("'..' escapes the root from {}", self),
                        });
                    }
                }
                raw => segments.push(Segment::from_token(&unescape(selector, raw)?)),
            }
        }

        Ok(Self { segments })
    }
}

fn unescape(selector: &str, token: &str) -> CoreResult<String> {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => {
                return Err(CoreError::InvalidPath {
                    path: selector.to_string(),
                    reason: "'~' must be followed by '0' or '1'".to_string(),
                })
            }
        }
    }
    Ok(out)
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Path {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        path.to_string()
    }
}
