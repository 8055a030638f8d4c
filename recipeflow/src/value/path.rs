//! Dotted/bracketed paths into values (`foo.bar[0]["baz-qux"]`).

use std::fmt;
use thiserror::Error;

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Map key.
    Key(String),
    /// Array index.
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => write!(f, "{k}"),
            Self::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// Errors raised when parsing or following a path.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    /// The path text is malformed.
    #[error("invalid path '{path}': {reason}")]
    Syntax {
        /// The raw path.
        path: String,
        /// What went wrong.
        reason: &'static str,
    },

    /// Map lookup failed.
    #[error("key '{0}' not found")]
    KeyNotFound(String),

    /// Array lookup failed.
    #[error("index {index} out of bounds (length {len})")]
    IndexOutOfBounds {
        /// Requested index.
        index: usize,
        /// Array length.
        len: usize,
    },

    /// Key applied to a non-map.
    #[error("cannot look up key '{key}' in {found}")]
    NotAMap {
        /// Requested key.
        key: String,
        /// Type actually found.
        found: &'static str,
    },

    /// Index applied to a non-array.
    #[error("cannot index {found} with [{index}]")]
    NotAnArray {
        /// Requested index.
        index: usize,
        /// Type actually found.
        found: &'static str,
    },
}

/// A parsed path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Path {
    segments: Vec<PathSegment>,
}

impl Path {
    /// Parses a path. The empty string is the root path.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let syntax = |reason| PathError::Syntax {
            path: raw.to_string(),
            reason,
        };

        let text = raw.trim();
        let bytes = text.as_bytes();
        let mut segments = Vec::new();
        let mut pos = 0;
        let mut expect_key = true;

        while pos < bytes.len() {
            match bytes[pos] {
                b'.' => {
                    if expect_key {
                        return Err(syntax("empty segment"));
                    }
                    pos += 1;
                    expect_key = true;
                    if pos == bytes.len() {
                        return Err(syntax("trailing '.'"));
                    }
                }
                b'[' => {
                    let close = text[pos..]
                        .find(']')
                        .map(|i| pos + i)
                        .ok_or_else(|| syntax("unclosed '['"))?;
                    let inner = text[pos + 1..close].trim();
                    segments.push(parse_bracket(inner).ok_or_else(|| syntax("invalid index"))?);
                    pos = close + 1;
                    expect_key = false;
                }
                _ => {
                    if !expect_key {
                        return Err(syntax("expected '.' or '['"));
                    }
                    let end = text[pos..]
                        .find(['.', '['])
                        .map_or(bytes.len(), |i| pos + i);
                    let key = text[pos..end].trim();
                    if key.is_empty() {
                        return Err(syntax("empty segment"));
                    }
                    segments.push(PathSegment::Key(key.to_string()));
                    pos = end;
                    expect_key = false;
                }
            }
        }

        Ok(Self { segments })
    }

    /// Creates a path from segments.
    #[must_use]
    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    /// Returns the segments.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Returns the first segment, if any.
    #[must_use]
    pub fn first(&self) -> Option<&PathSegment> {
        self.segments.first()
    }

    /// Returns the path without its first segment.
    #[must_use]
    pub fn rest(&self) -> Self {
        Self {
            segments: self.segments.iter().skip(1).cloned().collect(),
        }
    }

    /// Returns true for the root path.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Key(k) if i > 0 => write!(f, ".{k}")?,
                other => write!(f, "{other}")?,
            }
        }
        Ok(())
    }
}

fn parse_bracket(inner: &str) -> Option<PathSegment> {
    let quoted = (inner.starts_with('"') && inner.ends_with('"'))
        || (inner.starts_with('\'') && inner.ends_with('\''));
    if quoted && inner.len() >= 2 {
        return Some(PathSegment::Key(inner[1..inner.len() - 1].to_string()));
    }
    inner.parse::<usize>().ok().map(PathSegment::Index)
}
