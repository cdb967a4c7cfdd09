//! core::naming
//!
//! Deterministic event-stream naming.
//!
//! Every event log lives under a name derived from the identity it belongs
//! to: content streams as `ContentStream:<id>`, workspaces as
//! `Workspace:<name>`. Derivation is deterministic so that any component
//! holding an identity can address its log without coordination.

use serde::{Deserialize, Serialize};

use crate::core::types::{ContentStreamId, WorkspaceName};

/// Prefix for content stream event logs.
const CONTENT_STREAM_PREFIX: &str = "ContentStream:";

/// Prefix for workspace event logs.
const WORKSPACE_PREFIX: &str = "Workspace:";

/// Name of an event log in the store.
///
/// # Example
///
/// ```
/// use folio::core::naming::EventStreamName;
/// use folio::core::types::{ContentStreamId, WorkspaceName};
///
/// let cs = EventStreamName::for_content_stream(&ContentStreamId::from_string("cs-1"));
/// assert_eq!(cs.as_str(), "ContentStream:cs-1");
///
/// let ws = EventStreamName::for_workspace(&WorkspaceName::new("live").unwrap());
/// assert_eq!(ws.as_str(), "Workspace:live");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventStreamName(String);

impl EventStreamName {
    /// Derive the event stream name for a content stream.
    pub fn for_content_stream(id: &ContentStreamId) -> Self {
        Self(format!("{CONTENT_STREAM_PREFIX}{id}"))
    }

    /// Derive the event stream name for a workspace.
    pub fn for_workspace(name: &WorkspaceName) -> Self {
        Self(format!("{WORKSPACE_PREFIX}{name}"))
    }

    /// Check if this names a content stream log.
    pub fn is_content_stream(&self) -> bool {
        self.0.starts_with(CONTENT_STREAM_PREFIX)
    }

    /// Check if this names a workspace log.
    pub fn is_workspace(&self) -> bool {
        self.0.starts_with(WORKSPACE_PREFIX)
    }

    /// Get the stream name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EventStreamName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
