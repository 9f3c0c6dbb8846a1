//! # Hierarchical unique identifiers.
//!
//! Every descriptor carries a [`UniqueId`]: an ordered sequence of
//! `(kind, value)` segments rendered `[kind:value]` and joined with `/`,
//! e.g. `[engine:demo]/[suite:alpha]/[test:one]`.
//!
//! ## Rules
//! - **Round-trip**: `UniqueId::parse(id.to_string()) == id`, exactly.
//! - **Reserved characters** are rejected at construction time, never
//!   discovered later: `[`, `]` and `/` anywhere; `:` additionally in
//!   segment kinds (values may contain `:`, the first one in a rendered
//!   segment is the separator).
//! - **Prefix**: a child id's segment sequence is always a proper
//!   extension of its parent's; ids are immutable, created once at
//!   discovery time.
//! - Equality and hashing are structural (segment-sequence equality).

use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// One `(kind, value)` element of a [`UniqueId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    kind: String,
    value: String,
}

impl Segment {
    /// Creates a segment, rejecting reserved characters.
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Result<Self, EngineError> {
        let kind = kind.into();
        let value = value.into();
        if kind.is_empty() {
            return Err(malformed(&kind, "segment kind must not be empty"));
        }
        if value.is_empty() {
            return Err(malformed(&value, "segment value must not be empty"));
        }
        for ch in ['[', ']', '/', ':'] {
            if kind.contains(ch) {
                return Err(malformed(
                    &kind,
                    format!("reserved character {ch:?} in segment kind"),
                ));
            }
        }
        for ch in ['[', ']', '/'] {
            if value.contains(ch) {
                return Err(malformed(
                    &value,
                    format!("reserved character {ch:?} in segment value"),
                ));
            }
        }
        Ok(Self { kind, value })
    }

    /// The segment kind, e.g. `"suite"`.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The segment value, e.g. `"alpha"`.
    pub fn value(&self) -> &str {
        &self.value
    }
}

fn malformed(text: &str, reason: impl Into<String>) -> EngineError {
    EngineError::MalformedId {
        text: text.to_string(),
        reason: reason.into(),
    }
}

/// # Hierarchical, string-parseable identity of a descriptor.
///
/// Immutable; [`append`](Self::append) returns a new id. Comparison and
/// hashing are structural over the full segment sequence.
///
/// # Example
/// ```
/// use testvisor::UniqueId;
///
/// let id = UniqueId::root("engine", "demo")
///     .unwrap()
///     .append("suite", "alpha")
///     .unwrap();
/// assert_eq!(id.to_string(), "[engine:demo]/[suite:alpha]");
/// assert_eq!(UniqueId::parse(&id.to_string()).unwrap(), id);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniqueId {
    segments: Vec<Segment>,
}

impl UniqueId {
    /// Creates a single-segment id.
    pub fn root(kind: impl Into<String>, value: impl Into<String>) -> Result<Self, EngineError> {
        Ok(Self {
            segments: vec![Segment::new(kind, value)?],
        })
    }

    /// Returns a new id with one more segment; `self` is unchanged.
    pub fn append(
        &self,
        kind: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, EngineError> {
        let mut segments = self.segments.clone();
        segments.push(Segment::new(kind, value)?);
        Ok(Self { segments })
    }

    /// The segment sequence, outermost first.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The innermost segment.
    pub fn last(&self) -> &Segment {
        self.segments.last().expect("a UniqueId has at least one segment")
    }

    /// True if `self`'s segments are a proper prefix of `other`'s.
    pub fn is_ancestor_of(&self, other: &UniqueId) -> bool {
        other.segments.len() > self.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }

    /// Parses the exact output of [`Display`](fmt::Display).
    pub fn parse(text: &str) -> Result<Self, EngineError> {
        if text.is_empty() {
            return Err(malformed(text, "empty identifier"));
        }
        let mut segments = Vec::new();
        for raw in text.split('/') {
            let inner = raw
                .strip_prefix('[')
                .and_then(|s| s.strip_suffix(']'))
                .ok_or_else(|| malformed(text, format!("segment {raw:?} not wrapped in [..]")))?;
            let (kind, value) = inner
                .split_once(':')
                .ok_or_else(|| malformed(text, format!("segment {raw:?} has no ':' separator")))?;
            segments.push(Segment::new(kind, value)?);
        }
        Ok(Self { segments })
    }

    /// Deterministic, filesystem-safe rendering for per-node output
    /// directories: segment values joined with `_`, with characters
    /// outside `[A-Za-z0-9_.-]` replaced by `-`.
    pub fn to_path_component(&self) -> String {
        let joined = self
            .segments
            .iter()
            .map(|s| s.value.as_str())
            .collect::<Vec<_>>()
            .join("_");
        joined
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                    c
                } else {
                    '-'
                }
            })
            .collect()
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "[{}:{}]", seg.kind, seg.value)?;
        }
        Ok(())
    }
}

impl FromStr for UniqueId {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UniqueId::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo_id() -> UniqueId {
        UniqueId::root("engine", "demo")
            .unwrap()
            .append("suite", "alpha")
            .unwrap()
            .append("test", "one")
            .unwrap()
    }

    #[test]
    fn test_display_parse_round_trip() {
        let id = demo_id();
        let text = id.to_string();
        assert_eq!(text, "[engine:demo]/[suite:alpha]/[test:one]");
        assert_eq!(UniqueId::parse(&text).unwrap(), id);
    }

    #[test]
    fn test_value_may_contain_colon() {
        let id = UniqueId::root("test", "fn:call()").unwrap();
        let round = UniqueId::parse(&id.to_string()).unwrap();
        assert_eq!(round, id);
        assert_eq!(round.last().value(), "fn:call()");
    }

    #[test]
    fn test_reserved_characters_rejected_at_construction() {
        assert!(UniqueId::root("en/gine", "demo").is_err());
        assert!(UniqueId::root("engine", "de]mo").is_err());
        assert!(UniqueId::root("en:gine", "demo").is_err());
        let base = UniqueId::root("engine", "demo").unwrap();
        assert!(base.append("suite", "al/pha").is_err());
    }

    #[test]
    fn test_append_is_pure_and_extends() {
        let parent = UniqueId::root("engine", "demo").unwrap();
        let child = parent.append("suite", "alpha").unwrap();
        assert_eq!(parent.segments().len(), 1);
        assert!(parent.is_ancestor_of(&child));
        assert!(!child.is_ancestor_of(&parent));
        assert!(!parent.is_ancestor_of(&parent));
    }

    #[test]
    fn test_parse_rejects_malformed_text() {
        assert!(UniqueId::parse("").is_err());
        assert!(UniqueId::parse("engine:demo").is_err());
        assert!(UniqueId::parse("[engine-demo]").is_err());
        assert!(UniqueId::parse("[engine:demo]/suite:alpha").is_err());
    }

    #[test]
    fn test_path_component_replaces_unsafe_characters() {
        let id = UniqueId::root("engine", "demo")
            .unwrap()
            .append("test", "weird name (1)")
            .unwrap();
        assert_eq!(id.to_path_component(), "demo_weird-name--1-");
    }

    #[test]
    fn test_structural_equality_and_hash() {
        use std::collections::HashSet;
        let a = demo_id();
        let b = demo_id();
        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }
}
