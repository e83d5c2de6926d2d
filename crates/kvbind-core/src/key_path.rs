#![forbid(unsafe_code)]

//! Parsed key paths.
//!
//! A key path is a non-empty sequence of attribute names joined by
//! [`KeyPath::SEPARATOR`]. `"user.name"` reads the `user` attribute of the
//! root object, then the `name` attribute of whatever object that yields.
//!
//! # Invariants
//!
//! 1. A parsed path has at least one segment.
//! 2. No segment is empty or contains whitespace.
//! 3. `KeyPath::parse(p.as_str()) == Ok(p)` for every parsed `p`.

use std::fmt;
use std::str::FromStr;

use crate::error::KeyPathError;

/// A validated, dot-separated attribute path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyPath {
    raw: String,
    segments: Vec<String>,
}

impl KeyPath {
    pub const SEPARATOR: char = '.';

    /// Parse and validate a key path.
    pub fn parse(raw: &str) -> Result<Self, KeyPathError> {
        if raw.is_empty() {
            return Err(KeyPathError::Empty);
        }
        let mut segments = Vec::new();
        for (position, segment) in raw.split(Self::SEPARATOR).enumerate() {
            if segment.is_empty() {
                return Err(KeyPathError::EmptySegment { position });
            }
            if let Some(ch) = segment.chars().find(|c| c.is_whitespace()) {
                return Err(KeyPathError::InvalidCharacter {
                    segment: segment.to_owned(),
                    ch,
                });
            }
            segments.push(segment.to_owned());
        }
        Ok(Self {
            raw: raw.to_owned(),
            segments,
        })
    }

    /// The path as originally written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.segments.iter().map(String::as_str)
    }

    /// Number of segments; always at least 1.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false; kept for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> &str {
        &self.segments[0]
    }

    #[must_use]
    pub fn last(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    /// Whether the path is a single attribute name.
    #[must_use]
    pub fn is_simple(&self) -> bool {
        self.segments.len() == 1
    }

    /// The path without its last segment, or `None` for a simple path.
    #[must_use]
    pub fn parent(&self) -> Option<KeyPath> {
        if self.is_simple() {
            return None;
        }
        let segments = self.segments[..self.segments.len() - 1].to_vec();
        let raw = segments.join(".");
        Some(Self { raw, segments })
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for KeyPath {
    type Err = KeyPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for KeyPath {
    type Error = KeyPathError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}
