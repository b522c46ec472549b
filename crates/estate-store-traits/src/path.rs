//! Validated paths into the tree

use std::fmt;

use crate::StoreError;

const FORBIDDEN: &[char] = &['.', '#', '$', '[', ']', '/'];

/// Slash-separated location of a node in the tree.
///
/// Segments are non-empty and never contain `. # $ [ ]` or control
/// characters, which realtime databases reject as keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    /// The tree root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a slash-separated path. Leading and trailing slashes are ignored.
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        Self::root().join(raw)
    }

    /// Append one segment.
    pub fn child(&self, segment: &str) -> Result<Self, StoreError> {
        validate_segment(segment)?;
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(Self { segments })
    }

    /// Append a slash-separated relative path.
    pub fn join(&self, relative: &str) -> Result<Self, StoreError> {
        let trimmed = relative.trim_matches('/');
        let mut segments = self.segments.clone();
        if trimmed.is_empty() {
            return Ok(Self { segments });
        }
        for segment in trimmed.split('/') {
            validate_segment(segment)?;
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    /// Path segments from the root.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether this is the root path.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Last segment, `None` for the root.
    pub fn key(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Parent path, `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Whether `self` equals `other` or lies below it.
    pub fn starts_with(&self, other: &StorePath) -> bool {
        self.segments.starts_with(&other.segments)
    }

    /// Whether a write at one of the two paths can change the node at the other.
    pub fn overlaps(&self, other: &StorePath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }

    /// Segments of `self` below `ancestor`, or `None` when `ancestor` is not a prefix.
    pub fn strip_prefix(&self, ancestor: &StorePath) -> Option<&[String]> {
        self.segments.strip_prefix(ancestor.segments.as_slice())
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

fn validate_segment(segment: &str) -> Result<(), StoreError> {
    if segment.is_empty() {
        return Err(StoreError::InvalidPath("empty path segment".to_string()));
    }
    if segment
        .chars()
        .any(|c| FORBIDDEN.contains(&c) || c.is_control())
    {
        return Err(StoreError::InvalidPath(format!(
            "segment '{segment}' contains a forbidden character"
        )));
    }
    Ok(())
}
