//! command
//!
//! The rebasable command set.
//!
//! # Design
//!
//! Every node-structural change enters the core as a [`RebasableCommand`].
//! The serde tag doubles as the persisted `{kind, payload}` registry: a
//! command recorded as event metadata at write time is reconstructed from
//! its tag on replay, with no reflection involved. Adding a variant here is
//! all that is needed to make a new command rebasable.
//!
//! Commands know which node aggregates they affect
//! ([`RebasableCommand::affected_node_aggregate_ids`]); partial publish and
//! partial discard use that matcher to split a workspace's recorded history
//! by node selection.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::core::types::{NodeAggregateId, NodeName, NodeTypeName};
use crate::dimension::{DimensionSpacePoint, OriginDimensionSpacePoint};
use crate::node::PropertyValues;

/// A recorded, replayable node-structural command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RebasableCommand {
    /// Create a parentless entry point covering the whole dimension space.
    CreateRootNodeAggregate {
        node_aggregate_id: NodeAggregateId,
        node_type_name: NodeTypeName,
    },

    /// Create a node aggregate with its first variant below a parent.
    ///
    /// Tethered children declared by the node type are auto-created with it.
    CreateNodeAggregateWithNode {
        node_aggregate_id: NodeAggregateId,
        node_type_name: NodeTypeName,
        parent_node_aggregate_id: NodeAggregateId,
        origin: OriginDimensionSpacePoint,
        node_name: Option<NodeName>,
        #[serde(default)]
        initial_property_values: PropertyValues,
    },

    /// Set property values on the variant at `origin`.
    SetNodeProperties {
        node_aggregate_id: NodeAggregateId,
        origin: OriginDimensionSpacePoint,
        property_values: PropertyValues,
    },

    /// Create a variant of an existing node at a new coordinate point.
    ///
    /// The variant kind (specialization, generalization, peer) is classified
    /// by the variation graph, and the variant fans out to every tethered
    /// descendant.
    CreateNodeVariant {
        node_aggregate_id: NodeAggregateId,
        source_origin: OriginDimensionSpacePoint,
        target_origin: OriginDimensionSpacePoint,
    },

    /// Remove the aggregate's variants at `point` and its specializations.
    RemoveNodeAggregate {
        node_aggregate_id: NodeAggregateId,
        point: DimensionSpacePoint,
    },

    /// Change the aggregate's node type.
    ChangeNodeAggregateType {
        node_aggregate_id: NodeAggregateId,
        new_node_type_name: NodeTypeName,
    },
}

impl RebasableCommand {
    /// Stable command kind, matching the serde tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateRootNodeAggregate { .. } => "create_root_node_aggregate",
            Self::CreateNodeAggregateWithNode { .. } => "create_node_aggregate_with_node",
            Self::SetNodeProperties { .. } => "set_node_properties",
            Self::CreateNodeVariant { .. } => "create_node_variant",
            Self::RemoveNodeAggregate { .. } => "remove_node_aggregate",
            Self::ChangeNodeAggregateType { .. } => "change_node_aggregate_type",
        }
    }

    /// The node aggregates this command directly affects.
    ///
    /// This is the matcher capability behind partial publish/discard: a
    /// command matches a selection when any affected id is selected.
    pub fn affected_node_aggregate_ids(&self) -> Vec<&NodeAggregateId> {
        match self {
            Self::CreateRootNodeAggregate {
                node_aggregate_id, ..
            }
            | Self::CreateNodeAggregateWithNode {
                node_aggregate_id, ..
            }
            | Self::SetNodeProperties {
                node_aggregate_id, ..
            }
            | Self::CreateNodeVariant {
                node_aggregate_id, ..
            }
            | Self::RemoveNodeAggregate {
                node_aggregate_id, ..
            }
            | Self::ChangeNodeAggregateType {
                node_aggregate_id, ..
            } => vec![node_aggregate_id],
        }
    }

    /// Whether this command affects any of the selected node aggregates.
    pub fn matches_any(&self, selection: &BTreeSet<NodeAggregateId>) -> bool {
        self.affected_node_aggregate_ids()
            .iter()
            .any(|id| selection.contains(id))
    }
}
