//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`WorkspaceName`] - Validated workspace name
//! - [`ContentStreamId`] - Identity of a content stream
//! - [`NodeAggregateId`] - Identity of a node aggregate
//! - [`NodeTypeName`] - Name of a node type in the schema
//! - [`NodeName`] - Name of a node below its parent
//! - [`StreamVersion`] - Position in a content stream's event log
//!
//! # Validation
//!
//! Named types enforce validity at construction time. Invalid values
//! cannot be represented, preventing entire classes of bugs.
//!
//! # Examples
//!
//! ```
//! use folio::core::types::{WorkspaceName, NodeTypeName};
//!
//! let ws = WorkspaceName::new("user-alice").unwrap();
//! assert_eq!(ws.as_str(), "user-alice");
//!
//! let ty = NodeTypeName::new("Acme.Site:Document").unwrap();
//! assert_eq!(ty.as_str(), "Acme.Site:Document");
//!
//! assert!(WorkspaceName::new("").is_err());
//! assert!(NodeTypeName::new("has space").is_err());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid workspace name: {0}")]
    InvalidWorkspaceName(String),

    #[error("invalid node type name: {0}")]
    InvalidNodeTypeName(String),

    #[error("invalid node name: {0}")]
    InvalidNodeName(String),
}

/// A validated workspace name.
///
/// Workspace names identify a workspace globally and double as part of the
/// workspace's event stream name, so they follow stream-name rules:
/// - Cannot be empty or longer than 200 characters
/// - Cannot contain whitespace, `:`, or ASCII control characters
///
/// # Example
///
/// ```
/// use folio::core::types::WorkspaceName;
///
/// let name = WorkspaceName::new("user-alice").unwrap();
/// assert_eq!(name.as_str(), "user-alice");
///
/// assert!(WorkspaceName::new("").is_err());
/// assert!(WorkspaceName::new("has space").is_err());
/// assert!(WorkspaceName::new("a:b").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkspaceName(String);

impl WorkspaceName {
    /// Create a new validated workspace name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidWorkspaceName` if the name violates the
    /// rules above.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        if name.is_empty() {
            return Err(TypeError::InvalidWorkspaceName(
                "workspace name cannot be empty".into(),
            ));
        }
        if name.len() > 200 {
            return Err(TypeError::InvalidWorkspaceName(
                "workspace name cannot exceed 200 characters".into(),
            ));
        }
        for c in name.chars() {
            if c.is_whitespace() || c.is_ascii_control() || c == ':' {
                return Err(TypeError::InvalidWorkspaceName(format!(
                    "workspace name cannot contain {c:?}"
                )));
            }
        }
        Ok(())
    }

    /// Get the workspace name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for WorkspaceName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<WorkspaceName> for String {
    fn from(name: WorkspaceName) -> Self {
        name.0
    }
}

impl AsRef<str> for WorkspaceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkspaceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a content stream.
///
/// Opaque. Freshly created streams get a UUID; fixtures may use any
/// non-empty string via [`ContentStreamId::from_string`].
///
/// # Example
///
/// ```
/// use folio::core::types::ContentStreamId;
///
/// let a = ContentStreamId::new();
/// let b = ContentStreamId::new();
/// assert_ne!(a, b);
///
/// let fixed = ContentStreamId::from_string("cs-live");
/// assert_eq!(fixed.as_str(), "cs-live");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentStreamId(String);

impl ContentStreamId {
    /// Generate a new unique content stream id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a ContentStreamId from an existing string.
    ///
    /// Used when reading events back from the store and in test fixtures.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ContentStreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContentStreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a node aggregate.
///
/// Scoped to a content stream; stable across forks and publishes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeAggregateId(String);

impl NodeAggregateId {
    /// Generate a new unique node aggregate id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a NodeAggregateId from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NodeAggregateId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeAggregateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated node type name.
///
/// Node type names reference entries in the injected node-type schema,
/// conventionally `Vendor.Package:TypeName`.
///
/// - Cannot be empty
/// - Cannot contain whitespace or ASCII control characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeTypeName(String);

impl NodeTypeName {
    /// Create a new validated node type name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidNodeTypeName` on empty names or names
    /// containing whitespace/control characters.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if name.is_empty() {
            return Err(TypeError::InvalidNodeTypeName(
                "node type name cannot be empty".into(),
            ));
        }
        for c in name.chars() {
            if c.is_whitespace() || c.is_ascii_control() {
                return Err(TypeError::InvalidNodeTypeName(format!(
                    "node type name cannot contain {c:?}"
                )));
            }
        }
        Ok(Self(name))
    }

    /// Get the node type name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NodeTypeName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<NodeTypeName> for String {
    fn from(name: NodeTypeName) -> Self {
        name.0
    }
}

impl std::fmt::Display for NodeTypeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated node name.
///
/// Node names are unique among siblings sharing dimension coverage and are
/// also used to bind tethered children to their declared slot.
///
/// - Cannot be empty
/// - Lowercase ASCII letters, digits, and `-` only
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeName(String);

impl NodeName {
    /// Create a new validated node name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidNodeName` if the name is empty or contains
    /// characters outside `[a-z0-9-]`.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if name.is_empty() {
            return Err(TypeError::InvalidNodeName(
                "node name cannot be empty".into(),
            ));
        }
        for c in name.chars() {
            if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
                return Err(TypeError::InvalidNodeName(format!(
                    "node name cannot contain {c:?}"
                )));
            }
        }
        Ok(Self(name))
    }

    /// Get the node name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NodeName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<NodeName> for String {
    fn from(name: NodeName) -> Self {
        name.0
    }
}

impl std::fmt::Display for NodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position in a content stream's event log.
///
/// Versions count events: a stream with N events is at version N, and an
/// empty (non-existent) stream is at version 0. Versions advance only
/// through conditional append.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct StreamVersion(u64);

impl StreamVersion {
    /// Version of a stream with no events.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Create a version from a raw event count.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw event count.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The version after one more event.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// The version after `count` more events.
    pub fn advanced_by(&self, count: u64) -> Self {
        Self(self.0 + count)
    }
}

impl std::fmt::Display for StreamVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
