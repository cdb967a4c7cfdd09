//! node::handler
//!
//! Derives node-structural events from rebasable commands.
//!
//! # Design
//!
//! The handler is pure: it reads a [`ContentGraph`], the schema registry,
//! and the variation graph, and either returns the full event sequence a
//! command produces or the first violated constraint. It never touches an
//! event store; callers (the simulator, the workspace workflows) decide
//! where the events land.
//!
//! Tethered children are the one place a command fans out: creating a node
//! whose type declares tethered slots also creates those children, and
//! creating a variant of a node carries every tethered descendant along.
//! Tethered ids are derived from the parent id and slot name, so replaying
//! the same command against the same state yields byte-identical payloads.

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::trace;

use crate::command::RebasableCommand;
use crate::constraint::{self, ConstraintError};
use crate::core::types::{NodeAggregateId, NodeName, NodeTypeName};
use crate::dimension::{
    DimensionSpacePoint, DimensionSpacePointSet, OriginDimensionSpacePoint, VariantType,
    VariationGraph,
};
use crate::event::payload::DomainEvent;
use crate::graph::{ContentGraph, GraphError};
use crate::node::{NodeAggregate, NodeAggregateClassification};
use crate::nodetype::NodeTypeRegistry;

/// Errors from node command handling.
#[derive(Debug, Error)]
pub enum NodeCommandError {
    /// A structural constraint was violated.
    #[error(transparent)]
    Constraint(#[from] ConstraintError),

    /// The graph projection could not answer a lookup.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Validates node commands against a content graph and derives their events.
pub struct NodeCommandHandler<'a> {
    graph: &'a dyn ContentGraph,
    registry: &'a dyn NodeTypeRegistry,
    variation: &'a VariationGraph,
}

impl<'a> NodeCommandHandler<'a> {
    /// Create a handler over the given collaborators.
    pub fn new(
        graph: &'a dyn ContentGraph,
        registry: &'a dyn NodeTypeRegistry,
        variation: &'a VariationGraph,
    ) -> Self {
        Self {
            graph,
            registry,
            variation,
        }
    }

    /// Handle one command: all checks first, then the full event sequence.
    ///
    /// # Errors
    ///
    /// The first violated constraint; no events are derived on failure.
    pub fn handle(
        &self,
        command: &RebasableCommand,
    ) -> Result<Vec<DomainEvent>, NodeCommandError> {
        trace!(kind = command.kind(), "handling node command");
        match command {
            RebasableCommand::CreateRootNodeAggregate {
                node_aggregate_id,
                node_type_name,
            } => self.create_root(node_aggregate_id, node_type_name),

            RebasableCommand::CreateNodeAggregateWithNode {
                node_aggregate_id,
                node_type_name,
                parent_node_aggregate_id,
                origin,
                node_name,
                initial_property_values,
            } => self.create_node(
                node_aggregate_id,
                node_type_name,
                parent_node_aggregate_id,
                origin,
                node_name.as_ref(),
                initial_property_values,
            ),

            RebasableCommand::SetNodeProperties {
                node_aggregate_id,
                origin,
                property_values,
            } => self.set_properties(node_aggregate_id, origin, property_values),

            RebasableCommand::CreateNodeVariant {
                node_aggregate_id,
                source_origin,
                target_origin,
            } => self.create_variant(node_aggregate_id, source_origin, target_origin),

            RebasableCommand::RemoveNodeAggregate {
                node_aggregate_id,
                point,
            } => self.remove(node_aggregate_id, point),

            RebasableCommand::ChangeNodeAggregateType {
                node_aggregate_id,
                new_node_type_name,
            } => self.change_type(node_aggregate_id, new_node_type_name),
        }
    }

    /// Graph lookup with ambiguity reported as the constraint violation it
    /// is from a command's point of view.
    fn node_by_id(
        &self,
        id: &NodeAggregateId,
    ) -> Result<Option<&NodeAggregate>, NodeCommandError> {
        match self.graph.node_by_id(id) {
            Err(GraphError::Ambiguous(id)) => {
                Err(ConstraintError::NodeAggregateIsAmbiguous(id).into())
            }
            other => Ok(other?),
        }
    }

    /// Derive a stable id for a tethered child from its parent and slot.
    ///
    /// Determinism matters: rebase replays commands against rebuilt state,
    /// and randomly generated tethered ids would make every replay diverge.
    fn tethered_id(parent: &NodeAggregateId, slot: &NodeName) -> NodeAggregateId {
        let mut hasher = Sha256::new();
        hasher.update(parent.as_str().as_bytes());
        hasher.update(b"/");
        hasher.update(slot.as_str().as_bytes());
        let digest = hex::encode(hasher.finalize());
        NodeAggregateId::from_string(&digest[..32])
    }

    fn create_root(
        &self,
        id: &NodeAggregateId,
        node_type: &NodeTypeName,
    ) -> Result<Vec<DomainEvent>, NodeCommandError> {
        constraint::require_absent(self.node_by_id(id)?, id)?;
        constraint::require_node_type_declared(self.registry, node_type)?;

        let covered = self.variation.allowed_points().clone();
        let mut events = vec![DomainEvent::RootNodeAggregateWithNodeWasCreated {
            node_aggregate_id: id.clone(),
            node_type_name: node_type.clone(),
            covered: covered.clone(),
        }];

        self.append_tethered_descendants(
            &mut events,
            id,
            node_type,
            &OriginDimensionSpacePoint::root(),
            &covered,
        )?;
        Ok(events)
    }

    fn create_node(
        &self,
        id: &NodeAggregateId,
        node_type: &NodeTypeName,
        parent_id: &NodeAggregateId,
        origin: &OriginDimensionSpacePoint,
        name: Option<&NodeName>,
        initial_properties: &crate::node::PropertyValues,
    ) -> Result<Vec<DomainEvent>, NodeCommandError> {
        constraint::require_absent(self.node_by_id(id)?, id)?;
        constraint::require_node_type_declared(self.registry, node_type)?;
        constraint::require_point_allowed(self.variation, origin.as_point())?;

        let parent = constraint::require_present(self.node_by_id(parent_id)?, parent_id)?;
        constraint::require_parent_covers(parent, origin)?;
        self.require_child_allowed(parent, node_type)?;

        let covered = self
            .variation
            .specialization_set(origin.as_point())
            .intersect(&parent.covered);

        if let Some(name) = name {
            constraint::require_name_available(
                self.graph.children_of(parent_id),
                parent_id,
                name,
                &covered,
            )?;
        }

        let mut events = vec![DomainEvent::NodeAggregateWithNodeWasCreated {
            node_aggregate_id: id.clone(),
            node_type_name: node_type.clone(),
            parent_node_aggregate_id: parent_id.clone(),
            origin: origin.clone(),
            covered: covered.clone(),
            node_name: name.cloned(),
            initial_property_values: initial_properties.clone(),
            classification: NodeAggregateClassification::Regular,
        }];

        self.append_tethered_descendants(&mut events, id, node_type, origin, &covered)?;
        Ok(events)
    }

    /// Depth-first auto-creation of the tethered subtree a type declares.
    fn append_tethered_descendants(
        &self,
        events: &mut Vec<DomainEvent>,
        parent_id: &NodeAggregateId,
        parent_type: &NodeTypeName,
        origin: &OriginDimensionSpacePoint,
        covered: &DimensionSpacePointSet,
    ) -> Result<(), NodeCommandError> {
        let mut queue = vec![(parent_id.clone(), parent_type.clone())];
        while let Some((parent_id, parent_type)) = queue.pop() {
            for (slot, slot_type) in self.registry.tethered_children(&parent_type) {
                constraint::require_node_type_declared(self.registry, &slot_type)?;
                let child_id = Self::tethered_id(&parent_id, &slot);
                events.push(DomainEvent::NodeAggregateWithNodeWasCreated {
                    node_aggregate_id: child_id.clone(),
                    node_type_name: slot_type.clone(),
                    parent_node_aggregate_id: parent_id.clone(),
                    origin: origin.clone(),
                    covered: covered.clone(),
                    node_name: Some(slot),
                    initial_property_values: crate::node::PropertyValues::new(),
                    classification: NodeAggregateClassification::Tethered,
                });
                queue.push((child_id, slot_type));
            }
        }
        Ok(())
    }

    fn require_child_allowed(
        &self,
        parent: &NodeAggregate,
        child_type: &NodeTypeName,
    ) -> Result<(), NodeCommandError> {
        // Constraints for children of tethered nodes live on the
        // grandparent's schema.
        let allowed = if parent.is_tethered() {
            let grandparent = parent
                .parent
                .as_ref()
                .and_then(|gp| self.node_by_id(gp).transpose())
                .transpose()?;
            match (grandparent, parent.name.as_ref()) {
                (Some(grandparent), Some(slot)) => self.registry.allows_child_of_tethered(
                    &grandparent.node_type,
                    slot,
                    &parent.node_type,
                    child_type,
                ),
                _ => self.registry.allows_child(&parent.node_type, child_type),
            }
        } else {
            self.registry.allows_child(&parent.node_type, child_type)
        };

        if allowed {
            Ok(())
        } else {
            Err(ConstraintError::NodeTypeNotAllowedAsChild {
                parent: parent.node_type.clone(),
                child: child_type.clone(),
            }
            .into())
        }
    }

    fn set_properties(
        &self,
        id: &NodeAggregateId,
        origin: &OriginDimensionSpacePoint,
        values: &crate::node::PropertyValues,
    ) -> Result<Vec<DomainEvent>, NodeCommandError> {
        let aggregate = constraint::require_present(self.node_by_id(id)?, id)?;
        constraint::require_occupies(aggregate, origin)?;

        Ok(vec![DomainEvent::NodePropertiesWereSet {
            node_aggregate_id: id.clone(),
            origin: origin.clone(),
            property_values: values.clone(),
        }])
    }

    fn create_variant(
        &self,
        id: &NodeAggregateId,
        source: &OriginDimensionSpacePoint,
        target: &OriginDimensionSpacePoint,
    ) -> Result<Vec<DomainEvent>, NodeCommandError> {
        let aggregate = constraint::require_present(self.node_by_id(id)?, id)?;
        if aggregate.is_root() {
            return Err(ConstraintError::RootNodeAggregateCannotBeVaried(id.clone()).into());
        }
        constraint::require_point_allowed(self.variation, source.as_point())?;
        constraint::require_point_allowed(self.variation, target.as_point())?;
        if source == target {
            return Err(ConstraintError::SourceAndTargetOriginAreEqual(source.clone()).into());
        }
        constraint::require_occupies(aggregate, source)?;
        constraint::require_does_not_occupy(aggregate, target)?;

        let mut events = Vec::new();
        self.push_variant_event(&mut events, aggregate, source, target);

        // Tethered descendants vary with their anchor.
        let mut queue = vec![id.clone()];
        while let Some(current) = queue.pop() {
            for child in self.graph.tethered_children_of(&current) {
                if child.occupies(source) && !child.occupies(target) {
                    self.push_variant_event(&mut events, child, source, target);
                }
                queue.push(child.id.clone());
            }
        }
        Ok(events)
    }

    fn push_variant_event(
        &self,
        events: &mut Vec<DomainEvent>,
        aggregate: &NodeAggregate,
        source: &OriginDimensionSpacePoint,
        target: &OriginDimensionSpacePoint,
    ) {
        let target_closure = self.variation.specialization_set(target.as_point());
        match self
            .variation
            .variant_type(target.as_point(), source.as_point())
        {
            Some(VariantType::Specialization) => {
                events.push(DomainEvent::NodeSpecializationVariantWasCreated {
                    node_aggregate_id: aggregate.id.clone(),
                    source_origin: source.clone(),
                    specialization_origin: target.clone(),
                    specialization_coverage: target_closure,
                });
            }
            Some(VariantType::Generalization) => {
                // Existing variants keep the points they already cover.
                events.push(DomainEvent::NodeGeneralizationVariantWasCreated {
                    node_aggregate_id: aggregate.id.clone(),
                    source_origin: source.clone(),
                    generalization_origin: target.clone(),
                    generalization_coverage: target_closure.difference(&aggregate.covered),
                });
            }
            _ => {
                events.push(DomainEvent::NodePeerVariantWasCreated {
                    node_aggregate_id: aggregate.id.clone(),
                    source_origin: source.clone(),
                    peer_origin: target.clone(),
                    peer_coverage: target_closure.difference(&aggregate.covered),
                });
            }
        }
    }

    fn remove(
        &self,
        id: &NodeAggregateId,
        point: &DimensionSpacePoint,
    ) -> Result<Vec<DomainEvent>, NodeCommandError> {
        let aggregate = constraint::require_present(self.node_by_id(id)?, id)?;
        constraint::require_not_tethered_for_removal(aggregate)?;
        constraint::require_point_allowed(self.variation, point)?;
        constraint::require_covers(aggregate, point)?;

        // Removal at a point takes the point and all its specializations.
        let affected_covered = self
            .variation
            .specialization_set(point)
            .intersect(&aggregate.covered);
        let affected_occupied: Vec<OriginDimensionSpacePoint> = aggregate
            .occupied
            .iter()
            .filter(|origin| affected_covered.contains(origin.as_point()))
            .cloned()
            .collect();

        Ok(vec![DomainEvent::NodeAggregateWasRemoved {
            node_aggregate_id: id.clone(),
            affected_occupied,
            affected_covered,
        }])
    }

    fn change_type(
        &self,
        id: &NodeAggregateId,
        new_type: &NodeTypeName,
    ) -> Result<Vec<DomainEvent>, NodeCommandError> {
        let aggregate = constraint::require_present(self.node_by_id(id)?, id)?;
        constraint::require_not_tethered_for_retype(aggregate)?;
        constraint::require_node_type_declared(self.registry, new_type)?;

        // The new type must fit both directions: below the parent, and
        // above the existing children.
        if let Some(parent_id) = &aggregate.parent {
            if let Some(parent) = self.node_by_id(parent_id)? {
                self.require_child_allowed(parent, new_type)?;
            }
        }
        for child in self.graph.children_of(id) {
            if !child.is_tethered() && !self.registry.allows_child(new_type, &child.node_type) {
                return Err(ConstraintError::NodeTypeNotAllowedAsChild {
                    parent: new_type.clone(),
                    child: child.node_type.clone(),
                }
                .into());
            }
        }

        Ok(vec![DomainEvent::NodeAggregateTypeWasChanged {
            node_aggregate_id: id.clone(),
            new_node_type_name: new_type.clone(),
        }])
    }
}
