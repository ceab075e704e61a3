//! Work item relations and hierarchy-kind normalization.
//!
//! The tracking API reports the same hierarchy link under several spellings
//! (`System.LinkTypes.Hierarchy-Reverse`, a bare `Parent`, or only an
//! attribute name such as "Parent"). Everything is folded into
//! [`RelationKind`] here so the rest of the crate matches on an enum.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Relation kind strings that mean "the target is my parent".
const PARENT_KINDS: &[&str] = &[
    "system.linktypes.hierarchy-reverse",
    "hierarchy-reverse",
    "parent",
];

/// Relation kind strings that mean "the target is my child".
const CHILD_KINDS: &[&str] = &[
    "system.linktypes.hierarchy-forward",
    "hierarchy-forward",
    "child",
];

/// Normalized direction of a relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    /// Target is the parent of the owning item.
    Parent,
    /// Target is a child of the owning item.
    Child,
    /// Any other link (related, attachment, hyperlink, ...).
    Other,
}

impl RelationKind {
    /// Classify a raw relation.
    ///
    /// The `rel` string is compared case-insensitively against the known
    /// hierarchy kinds first. Only when it is not a known hierarchy kind is
    /// the free-text attribute name consulted, where any name containing
    /// "parent" (checked first) or "child" counts.
    pub fn classify(rel: &str, attribute_name: Option<&str>) -> Self {
        let rel = rel.trim().to_ascii_lowercase();
        if PARENT_KINDS.contains(&rel.as_str()) {
            return Self::Parent;
        }
        if CHILD_KINDS.contains(&rel.as_str()) {
            return Self::Child;
        }

        if let Some(name) = attribute_name {
            let name = name.to_ascii_lowercase();
            if name.contains("parent") {
                return Self::Parent;
            }
            if name.contains("child") {
                return Self::Child;
            }
        }

        Self::Other
    }
}

/// A link from one work item to another resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// Raw relation kind as reported by the API.
    pub rel: String,
    /// URL of the linked resource.
    pub url: String,
    /// Optional attribute bag (`name`, `isLocked`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Map<String, Value>>,
}

impl Relation {
    pub fn new(rel: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            rel: rel.into(),
            url: url.into(),
            attributes: None,
        }
    }

    /// Attach a `name` attribute.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.attributes
            .get_or_insert_with(Map::new)
            .insert("name".to_string(), Value::String(name.into()));
        self
    }

    /// The free-text `name` attribute, if present.
    pub fn attribute_name(&self) -> Option<&str> {
        self.attributes
            .as_ref()?
            .get("name")
            .and_then(Value::as_str)
    }

    pub fn kind(&self) -> RelationKind {
        RelationKind::classify(&self.rel, self.attribute_name())
    }

    /// Numeric id taken from the trailing path segment of the target URL.
    pub fn target_id(&self) -> Option<u64> {
        target_id_from_url(&self.url)
    }
}

/// Extract the numeric id from a URL such as `.../_apis/wit/workItems/50`.
pub fn target_id_from_url(url: &str) -> Option<u64> {
    let path = url.split(['?', '#']).next()?;
    let segment = path.trim_end_matches('/').rsplit('/').next()?;
    segment.trim().parse().ok()
}
