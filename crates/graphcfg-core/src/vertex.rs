//! Vertex IDs: dot-separated paths that are both identifier and locator.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A dot-separated vertex identifier, e.g. `root.module.web.file.index`.
///
/// The first segment is always `root`; every segment matches
/// `[A-Za-z0-9_-]+`. IDs are validated once at construction and are cheap
/// to clone, compare, and hash thereafter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VertexId(String);

/// A vertex ID failed segment validation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid vertex id {0:?}: {1}")]
pub struct InvalidVertexId(String, &'static str);

impl VertexId {
    /// Parse and validate a dotted path into a `VertexId`.
    pub fn parse(s: impl Into<String>) -> Result<Self, InvalidVertexId> {
        let s = s.into();
        if s.is_empty() {
            return Err(InvalidVertexId(s, "id must not be empty"));
        }
        let mut segments = s.split('.');
        match segments.next() {
            Some("root") => {}
            _ => return Err(InvalidVertexId(s, "id must start with the `root` segment")),
        }
        for segment in segments {
            if segment.is_empty() {
                return Err(InvalidVertexId(s, "segments must not be empty"));
            }
            if !segment
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
            {
                return Err(InvalidVertexId(
                    s,
                    "segments must match [A-Za-z0-9_-]+",
                ));
            }
        }
        Ok(Self(s))
    }

    /// Construct a `VertexId` without validating it. Callers must ensure
    /// the value already conforms to the normative format; used for
    /// IDs derived from an already-valid parent (`parent`, `sibling`).
    fn new_unchecked(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` iff this ID is exactly `root`.
    pub fn is_root(&self) -> bool {
        self.0 == "root"
    }

    /// The dotted segments of this ID, in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// The last segment (the vertex's "leaf" name).
    pub fn leaf(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(&self.0)
    }

    /// `ParentID(v)`: drop the last segment. `None` for `root`.
    pub fn parent(&self) -> Option<VertexId> {
        self.0
            .rsplit_once('.')
            .map(|(prefix, _)| VertexId::new_unchecked(prefix.to_string()))
    }

    /// `SiblingID(v, name)` = `ParentID(v) + "." + name`.
    ///
    /// For `root` itself (which has no parent), the sibling is `root.name`.
    pub fn sibling(&self, name: &str) -> VertexId {
        match self.parent() {
            Some(parent) => VertexId::new_unchecked(format!("{}.{name}", parent.0)),
            None => VertexId::new_unchecked(format!("{}.{name}", self.0)),
        }
    }

    /// Append a child segment: `self.name`.
    pub fn child(&self, name: &str) -> VertexId {
        VertexId::new_unchecked(format!("{}.{name}", self.0))
    }

    /// All dotted prefixes of this ID, longest first.
    pub fn prefixes(&self) -> Vec<&str> {
        prefixes(&self.0)
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for VertexId {
    type Err = InvalidVertexId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VertexId::parse(s)
    }
}

impl std::borrow::Borrow<str> for VertexId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// `Prefixes("a.b.c.d") = ["a.b.c.d", "a.b.c", "a.b", "a"]`.
///
/// Operates on any dotted string, not just validated `VertexId`s, because
/// the Resolver applies it to raw directive text before a prefix is known
/// to exist in the graph.
pub fn prefixes(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = s;
    loop {
        out.push(rest);
        match rest.rfind('.') {
            Some(idx) => rest = &rest[..idx],
            None => break,
        }
    }
    out
}
