//! Addressable paths into the hierarchical device configuration model.
//!
//! A [`NodePath`] is an ordered list of (container, optional key) segments,
//! e.g. `interfaces/interface[ethernet 1/3]/config`. Paths address at most one
//! logical configuration object; keys are unique among siblings of one list
//! container.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::TranslateError;

/// Key identifying one entry of a list container (e.g. a VLAN id, an
/// interface name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct NodeKey(pub String);

impl NodeKey {
    pub fn new(key: impl Into<String>) -> Self {
        NodeKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeKey {
    fn from(key: &str) -> Self {
        NodeKey(key.to_string())
    }
}

/// One step of a [`NodePath`]: a container name with an optional list key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct PathSegment {
    pub name: String,
    pub key: Option<NodeKey>,
}

impl PathSegment {
    pub fn container(name: impl Into<String>) -> Self {
        PathSegment {
            name: name.into(),
            key: None,
        }
    }

    pub fn entry(name: impl Into<String>, key: impl Into<String>) -> Self {
        PathSegment {
            name: name.into(),
            key: Some(NodeKey::new(key)),
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}[{}]", self.name, key),
            None => f.write_str(&self.name),
        }
    }
}

/// An addressable point in the hierarchical configuration tree.
///
/// Paths are immutable values; derived paths (`child`, `entry`, `parent`)
/// return new instances.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize, JsonSchema,
)]
pub struct NodePath {
    segments: Vec<PathSegment>,
}

impl NodePath {
    /// The empty path (tree root).
    pub fn root() -> Self {
        NodePath::default()
    }

    /// Builds a path from plain container names, no keys.
    pub fn of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        NodePath {
            segments: names.into_iter().map(PathSegment::container).collect(),
        }
    }

    /// Parses the `a/b[key]/c` textual form.
    ///
    /// Keys may contain any character except `]`. Empty segment names are
    /// rejected.
    pub fn parse(text: &str) -> Result<Self, TranslateError> {
        let mut segments = Vec::new();
        let trimmed = text.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Ok(NodePath::root());
        }
        for part in trimmed.split('/') {
            let segment = if let Some(open) = part.find('[') {
                let name = &part[..open];
                let rest = &part[open + 1..];
                let close = rest.rfind(']').ok_or_else(|| {
                    TranslateError::InternalError(format!("unterminated key in path segment '{part}'"))
                })?;
                PathSegment {
                    name: name.to_string(),
                    key: Some(NodeKey::new(&rest[..close])),
                }
            } else {
                PathSegment::container(part)
            };
            if segment.name.is_empty() {
                return Err(TranslateError::InternalError(format!(
                    "empty segment name in path '{text}'"
                )));
            }
            segments.push(segment);
        }
        Ok(NodePath { segments })
    }

    /// Appends a keyless container segment.
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::container(name));
        NodePath { segments }
    }

    /// Appends a keyed list-entry segment.
    pub fn entry(&self, name: impl Into<String>, key: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::entry(name, key));
        NodePath { segments }
    }

    /// Returns the path without its last segment, or `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(NodePath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Returns this path with every list key removed.
    ///
    /// Handlers are registered against keyless paths; runtime requests carry
    /// keyed paths. `schema()` maps one onto the other.
    pub fn schema(&self) -> Self {
        NodePath {
            segments: self
                .segments
                .iter()
                .map(|s| PathSegment::container(s.name.clone()))
                .collect(),
        }
    }

    /// The key of the last keyed segment, if any.
    pub fn last_key(&self) -> Option<&NodeKey> {
        self.segments.iter().rev().find_map(|s| s.key.as_ref())
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// True when `prefix` is a (not necessarily proper) leading sub-path.
    pub fn starts_with(&self, prefix: &NodePath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            if !first {
                f.write_str("/")?;
            }
            write!(f, "{segment}")?;
            first = false;
        }
        Ok(())
    }
}
