//! event::payload
//!
//! The domain event set.
//!
//! Events are stored as tagged JSON payloads. Node-structural events carry
//! the "publishable across streams" capability: publish copies them from a
//! workspace's stream onto its base verbatim. Stream and workspace lifecycle
//! events stay in the log they were appended to.

use serde::{Deserialize, Serialize};

use crate::core::types::{
    ContentStreamId, NodeAggregateId, NodeName, NodeTypeName, StreamVersion, WorkspaceName,
};
use crate::dimension::{DimensionSpacePoint, DimensionSpacePointSet, OriginDimensionSpacePoint};
use crate::node::{NodeAggregateClassification, PropertyValues};
use crate::stream::StreamState;

/// A domain event, as persisted in an event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    // ------------------------------------------------------------------
    // Content stream lifecycle
    // ------------------------------------------------------------------
    /// A content stream came into existence from scratch.
    ContentStreamWasCreated { id: ContentStreamId },

    /// A content stream was forked off another stream.
    ///
    /// `source_version` records the source's version at fork time; publish
    /// later uses it as the optimistic-concurrency expectation against the
    /// source.
    ContentStreamWasForked {
        id: ContentStreamId,
        source_id: ContentStreamId,
        source_version: StreamVersion,
    },

    /// The stream no longer accepts appends until reopened.
    ContentStreamWasClosed { id: ContentStreamId },

    /// The stream accepts appends again, restored to `previous_state`.
    ContentStreamWasReopened {
        id: ContentStreamId,
        previous_state: StreamState,
    },

    /// Tombstone: the stream is no longer in use. History stays queryable.
    ContentStreamWasRemoved { id: ContentStreamId },

    // ------------------------------------------------------------------
    // Workspace lifecycle
    // ------------------------------------------------------------------
    /// A root workspace (no base) came into existence.
    RootWorkspaceWasCreated {
        name: WorkspaceName,
        content_stream_id: ContentStreamId,
    },

    /// A workspace based on another workspace came into existence.
    WorkspaceWasCreated {
        name: WorkspaceName,
        base: WorkspaceName,
        content_stream_id: ContentStreamId,
    },

    /// The workspace's changes were published to its base.
    WorkspaceWasPublished {
        name: WorkspaceName,
        previous_content_stream_id: ContentStreamId,
        new_content_stream_id: ContentStreamId,
    },

    /// The workspace was rebased onto its base's latest state.
    WorkspaceWasRebased {
        name: WorkspaceName,
        previous_content_stream_id: ContentStreamId,
        new_content_stream_id: ContentStreamId,
    },

    /// A node-id selection of the workspace's changes was published.
    WorkspaceWasPartiallyPublished {
        name: WorkspaceName,
        previous_content_stream_id: ContentStreamId,
        new_content_stream_id: ContentStreamId,
        published_nodes: Vec<NodeAggregateId>,
    },

    /// A node-id selection of the workspace's changes was dropped.
    WorkspaceWasPartiallyDiscarded {
        name: WorkspaceName,
        previous_content_stream_id: ContentStreamId,
        new_content_stream_id: ContentStreamId,
        discarded_nodes: Vec<NodeAggregateId>,
    },

    /// All of the workspace's changes were dropped.
    WorkspaceWasDiscarded {
        name: WorkspaceName,
        previous_content_stream_id: ContentStreamId,
        new_content_stream_id: ContentStreamId,
    },

    /// The workspace now builds on a different base workspace.
    WorkspaceBaseWasChanged {
        name: WorkspaceName,
        new_base: WorkspaceName,
        previous_content_stream_id: ContentStreamId,
        new_content_stream_id: ContentStreamId,
    },

    /// Tombstone: the workspace was deleted.
    WorkspaceWasRemoved { name: WorkspaceName },

    // ------------------------------------------------------------------
    // Node structure (publishable across streams)
    // ------------------------------------------------------------------
    /// A parentless entry point covering the whole dimension space.
    RootNodeAggregateWithNodeWasCreated {
        node_aggregate_id: NodeAggregateId,
        node_type_name: NodeTypeName,
        covered: DimensionSpacePointSet,
    },

    /// A node aggregate gained its first variant below a parent.
    NodeAggregateWithNodeWasCreated {
        node_aggregate_id: NodeAggregateId,
        node_type_name: NodeTypeName,
        parent_node_aggregate_id: NodeAggregateId,
        origin: OriginDimensionSpacePoint,
        covered: DimensionSpacePointSet,
        node_name: Option<NodeName>,
        #[serde(default)]
        initial_property_values: PropertyValues,
        classification: NodeAggregateClassification,
    },

    /// Property values were set on the variant at `origin`.
    NodePropertiesWereSet {
        node_aggregate_id: NodeAggregateId,
        origin: OriginDimensionSpacePoint,
        property_values: PropertyValues,
    },

    /// Variants at the affected points were removed.
    NodeAggregateWasRemoved {
        node_aggregate_id: NodeAggregateId,
        affected_occupied: Vec<OriginDimensionSpacePoint>,
        affected_covered: DimensionSpacePointSet,
    },

    /// A more specific variant of an existing node was created.
    NodeSpecializationVariantWasCreated {
        node_aggregate_id: NodeAggregateId,
        source_origin: OriginDimensionSpacePoint,
        specialization_origin: OriginDimensionSpacePoint,
        specialization_coverage: DimensionSpacePointSet,
    },

    /// A more general variant of an existing node was created.
    NodeGeneralizationVariantWasCreated {
        node_aggregate_id: NodeAggregateId,
        source_origin: OriginDimensionSpacePoint,
        generalization_origin: OriginDimensionSpacePoint,
        generalization_coverage: DimensionSpacePointSet,
    },

    /// A peer variant of an existing node was created.
    NodePeerVariantWasCreated {
        node_aggregate_id: NodeAggregateId,
        source_origin: OriginDimensionSpacePoint,
        peer_origin: OriginDimensionSpacePoint,
        peer_coverage: DimensionSpacePointSet,
    },

    /// The aggregate's node type changed.
    NodeAggregateTypeWasChanged {
        node_aggregate_id: NodeAggregateId,
        new_node_type_name: NodeTypeName,
    },
}

impl DomainEvent {
    /// Whether publish may copy this event onto another content stream.
    ///
    /// Only node-structural events are publishable; stream and workspace
    /// lifecycle events belong to exactly one log.
    pub fn is_publishable(&self) -> bool {
        matches!(
            self,
            Self::RootNodeAggregateWithNodeWasCreated { .. }
                | Self::NodeAggregateWithNodeWasCreated { .. }
                | Self::NodePropertiesWereSet { .. }
                | Self::NodeAggregateWasRemoved { .. }
                | Self::NodeSpecializationVariantWasCreated { .. }
                | Self::NodeGeneralizationVariantWasCreated { .. }
                | Self::NodePeerVariantWasCreated { .. }
                | Self::NodeAggregateTypeWasChanged { .. }
        )
    }

    /// The fork record, if this is a fork event.
    pub fn as_fork(&self) -> Option<(&ContentStreamId, &ContentStreamId, StreamVersion)> {
        match self {
            Self::ContentStreamWasForked {
                id,
                source_id,
                source_version,
            } => Some((id, source_id, *source_version)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_events_are_not_publishable() {
        let events = [
            DomainEvent::ContentStreamWasCreated {
                id: ContentStreamId::from_string("cs"),
            },
            DomainEvent::ContentStreamWasForked {
                id: ContentStreamId::from_string("cs2"),
                source_id: ContentStreamId::from_string("cs"),
                source_version: StreamVersion::new(3),
            },
            DomainEvent::ContentStreamWasClosed {
                id: ContentStreamId::from_string("cs"),
            },
            DomainEvent::WorkspaceWasRemoved {
                name: WorkspaceName::new("w").unwrap(),
            },
        ];
        for event in events {
            assert!(!event.is_publishable(), "{event:?}");
        }
    }

    #[test]
    fn node_events_are_publishable() {
        let event = DomainEvent::NodePropertiesWereSet {
            node_aggregate_id: NodeAggregateId::from_string("a"),
            origin: OriginDimensionSpacePoint::from_pairs([("language", "en")]),
            property_values: PropertyValues::new(),
        };
        assert!(event.is_publishable());
    }

    #[test]
    fn fork_accessor() {
        let fork = DomainEvent::ContentStreamWasForked {
            id: ContentStreamId::from_string("cs2"),
            source_id: ContentStreamId::from_string("cs"),
            source_version: StreamVersion::new(7),
        };
        let (id, source, version) = fork.as_fork().unwrap();
        assert_eq!(id.as_str(), "cs2");
        assert_eq!(source.as_str(), "cs");
        assert_eq!(version, StreamVersion::new(7));

        let other = DomainEvent::ContentStreamWasClosed {
            id: ContentStreamId::from_string("cs"),
        };
        assert!(other.as_fork().is_none());
    }

    #[test]
    fn json_has_type_tag() {
        let event = DomainEvent::ContentStreamWasCreated {
            id: ContentStreamId::from_string("cs"),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\""));
        assert!(json.contains("\"content_stream_was_created\""));
    }

    #[test]
    fn json_roundtrip() {
        let event = DomainEvent::NodeAggregateWithNodeWasCreated {
            node_aggregate_id: NodeAggregateId::from_string("a"),
            node_type_name: NodeTypeName::new("Acme.Site:Document").unwrap(),
            parent_node_aggregate_id: NodeAggregateId::from_string("root"),
            origin: OriginDimensionSpacePoint::from_pairs([("language", "en")]),
            covered: [DimensionSpacePoint::from_pairs([("language", "en")])]
                .into_iter()
                .collect(),
            node_name: Some(NodeName::new("home").unwrap()),
            initial_property_values: PropertyValues::new(),
            classification: NodeAggregateClassification::Regular,
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: DomainEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, parsed);
    }
}
