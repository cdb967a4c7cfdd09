//! graph
//!
//! The write-side content graph projection.
//!
//! # Design
//!
//! Command handlers never read event logs directly; they read a
//! [`ContentGraph`], the minimal materialized view of one content stream's
//! node-structural history. [`InMemoryContentGraph`] folds that view from an
//! event store, following fork chains: a forked stream's state is its
//! source's state up to the recorded fork version plus the stream's own
//! events.
//!
//! The projection is deliberately write-side-minimal. It answers exactly the
//! questions the constraint checks ask (existence, parentage, occupation,
//! coverage, names); read-side concerns like subtree queries or ordering
//! live elsewhere.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::core::naming::EventStreamName;
use crate::core::types::{ContentStreamId, NodeAggregateId, NodeName};
use crate::dimension::OriginDimensionSpacePoint;
use crate::event::payload::DomainEvent;
use crate::event::store::{EventStore, StoreError};
use crate::node::{NodeAggregate, NodeAggregateClassification};

/// Errors from graph projection and lookup.
#[derive(Debug, Error)]
pub enum GraphError {
    /// One node aggregate id resolves to more than one creation.
    ///
    /// Indicates corrupted history, typically a selection-based publish that
    /// tore a creation apart. Lookups on such ids fail until the history is
    /// repaired.
    #[error("node aggregate {0} is ambiguous")]
    Ambiguous(NodeAggregateId),

    /// A fork chain does not terminate in a created stream.
    #[error("content stream {0} has no creation event")]
    UnrootedForkChain(ContentStreamId),

    /// The event store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Read access to the materialized node structure of one content stream.
pub trait ContentGraph {
    /// Resolve an aggregate by id.
    ///
    /// # Errors
    ///
    /// `GraphError::Ambiguous` when the id resolves to more than one
    /// aggregate.
    fn node_by_id(&self, id: &NodeAggregateId)
        -> Result<Option<&NodeAggregate>, GraphError>;

    /// All direct children of an aggregate.
    fn children_of(&self, parent: &NodeAggregateId) -> Vec<&NodeAggregate>;

    /// The named child of an aggregate, if any.
    fn child_by_name(
        &self,
        parent: &NodeAggregateId,
        name: &NodeName,
    ) -> Option<&NodeAggregate>;

    /// Direct children tethered to an aggregate.
    fn tethered_children_of(&self, parent: &NodeAggregateId) -> Vec<&NodeAggregate> {
        self.children_of(parent)
            .into_iter()
            .filter(|child| child.is_tethered())
            .collect()
    }
}

/// In-memory [`ContentGraph`], folded from domain events.
#[derive(Debug, Clone, Default)]
pub struct InMemoryContentGraph {
    aggregates: BTreeMap<NodeAggregateId, NodeAggregate>,
    ambiguous: BTreeSet<NodeAggregateId>,
}

impl InMemoryContentGraph {
    /// An empty graph.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Project the graph of a content stream from the store.
    ///
    /// Walks the fork chain: the source's events up to the recorded fork
    /// version are applied before the stream's own, recursively down to the
    /// originally created stream.
    pub fn for_content_stream(
        store: &dyn EventStore,
        id: &ContentStreamId,
    ) -> Result<Self, GraphError> {
        // Collect (log, take-first-n) pairs from the head of the chain down
        // to the root, then fold oldest-first.
        let mut segments: Vec<(Vec<crate::event::EventEnvelope>, usize)> = Vec::new();
        let mut current = id.clone();
        let mut limit: Option<usize> = None;

        loop {
            let envelopes = store.load(&EventStreamName::for_content_stream(&current))?;
            if envelopes.is_empty() {
                // Unknown streams project as empty only at the head.
                if segments.is_empty() {
                    return Ok(Self::empty());
                }
                return Err(GraphError::UnrootedForkChain(current));
            }

            let fork = envelopes.first().and_then(|e| e.payload.as_fork()).map(
                |(_, source, version)| (source.clone(), version.value() as usize),
            );
            let take = limit.unwrap_or(envelopes.len());
            segments.push((envelopes, take));

            match fork {
                Some((source, version)) => {
                    current = source;
                    limit = Some(version);
                }
                None => break,
            }
        }

        let mut graph = Self::empty();
        for (envelopes, take) in segments.into_iter().rev() {
            for envelope in envelopes.iter().take(take) {
                graph.apply(&envelope.payload);
            }
        }
        Ok(graph)
    }

    /// Fold one event into the projection.
    ///
    /// Non-structural events are ignored, so callers can feed whole logs.
    pub fn apply(&mut self, event: &DomainEvent) {
        match event {
            DomainEvent::RootNodeAggregateWithNodeWasCreated {
                node_aggregate_id,
                node_type_name,
                covered,
            } => {
                let aggregate = NodeAggregate {
                    id: node_aggregate_id.clone(),
                    node_type: node_type_name.clone(),
                    classification: NodeAggregateClassification::Root,
                    parent: None,
                    name: None,
                    occupied: vec![OriginDimensionSpacePoint::root()],
                    covered: covered.clone(),
                    properties: [(OriginDimensionSpacePoint::root(), BTreeMap::new())]
                        .into_iter()
                        .collect(),
                };
                self.insert(aggregate);
            }

            DomainEvent::NodeAggregateWithNodeWasCreated {
                node_aggregate_id,
                node_type_name,
                parent_node_aggregate_id,
                origin,
                covered,
                node_name,
                initial_property_values,
                classification,
            } => {
                let aggregate = NodeAggregate {
                    id: node_aggregate_id.clone(),
                    node_type: node_type_name.clone(),
                    classification: *classification,
                    parent: Some(parent_node_aggregate_id.clone()),
                    name: node_name.clone(),
                    occupied: vec![origin.clone()],
                    covered: covered.clone(),
                    properties: [(origin.clone(), initial_property_values.clone())]
                        .into_iter()
                        .collect(),
                };
                self.insert(aggregate);
            }

            DomainEvent::NodePropertiesWereSet {
                node_aggregate_id,
                origin,
                property_values,
            } => {
                if let Some(aggregate) = self.aggregates.get_mut(node_aggregate_id) {
                    let values = aggregate.properties.entry(origin.clone()).or_default();
                    for (key, value) in property_values {
                        // Null unsets a property.
                        if value.is_null() {
                            values.remove(key);
                        } else {
                            values.insert(key.clone(), value.clone());
                        }
                    }
                }
            }

            DomainEvent::NodeAggregateWasRemoved {
                node_aggregate_id,
                affected_occupied,
                affected_covered,
            } => {
                let fully_removed = match self.aggregates.get_mut(node_aggregate_id) {
                    Some(aggregate) => {
                        aggregate
                            .occupied
                            .retain(|origin| !affected_occupied.contains(origin));
                        aggregate
                            .properties
                            .retain(|origin, _| !affected_occupied.contains(origin));
                        aggregate.covered = aggregate.covered.difference(affected_covered);
                        aggregate.occupied.is_empty()
                    }
                    None => false,
                };
                if fully_removed {
                    self.remove_subtree(node_aggregate_id);
                }
            }

            DomainEvent::NodeSpecializationVariantWasCreated {
                node_aggregate_id,
                source_origin,
                specialization_origin,
                specialization_coverage,
            } => self.add_variant(
                node_aggregate_id,
                source_origin,
                specialization_origin,
                specialization_coverage,
            ),

            DomainEvent::NodeGeneralizationVariantWasCreated {
                node_aggregate_id,
                source_origin,
                generalization_origin,
                generalization_coverage,
            } => self.add_variant(
                node_aggregate_id,
                source_origin,
                generalization_origin,
                generalization_coverage,
            ),

            DomainEvent::NodePeerVariantWasCreated {
                node_aggregate_id,
                source_origin,
                peer_origin,
                peer_coverage,
            } => self.add_variant(node_aggregate_id, source_origin, peer_origin, peer_coverage),

            DomainEvent::NodeAggregateTypeWasChanged {
                node_aggregate_id,
                new_node_type_name,
            } => {
                if let Some(aggregate) = self.aggregates.get_mut(node_aggregate_id) {
                    aggregate.node_type = new_node_type_name.clone();
                }
            }

            _ => {}
        }
    }

    fn insert(&mut self, aggregate: NodeAggregate) {
        if self.aggregates.contains_key(&aggregate.id) {
            self.ambiguous.insert(aggregate.id.clone());
        } else {
            self.aggregates.insert(aggregate.id.clone(), aggregate);
        }
    }

    fn add_variant(
        &mut self,
        id: &NodeAggregateId,
        source_origin: &OriginDimensionSpacePoint,
        target_origin: &OriginDimensionSpacePoint,
        coverage: &crate::dimension::DimensionSpacePointSet,
    ) {
        if let Some(aggregate) = self.aggregates.get_mut(id) {
            if !aggregate.occupied.contains(target_origin) {
                aggregate.occupied.push(target_origin.clone());
            }
            aggregate.covered = aggregate.covered.union(coverage);
            // The new variant starts with the source variant's values.
            let inherited = aggregate
                .properties
                .get(source_origin)
                .cloned()
                .unwrap_or_default();
            aggregate
                .properties
                .entry(target_origin.clone())
                .or_insert(inherited);
        }
    }

    fn remove_subtree(&mut self, root: &NodeAggregateId) {
        let mut queue = vec![root.clone()];
        while let Some(id) = queue.pop() {
            self.aggregates.remove(&id);
            self.ambiguous.remove(&id);
            queue.extend(
                self.aggregates
                    .values()
                    .filter(|a| a.parent.as_ref() == Some(&id))
                    .map(|a| a.id.clone()),
            );
        }
    }

    /// Number of live aggregates.
    pub fn len(&self) -> usize {
        self.aggregates.len()
    }

    /// Whether the graph holds no aggregates.
    pub fn is_empty(&self) -> bool {
        self.aggregates.is_empty()
    }
}

impl ContentGraph for InMemoryContentGraph {
    fn node_by_id(
        &self,
        id: &NodeAggregateId,
    ) -> Result<Option<&NodeAggregate>, GraphError> {
        if self.ambiguous.contains(id) {
            return Err(GraphError::Ambiguous(id.clone()));
        }
        Ok(self.aggregates.get(id))
    }

    fn children_of(&self, parent: &NodeAggregateId) -> Vec<&NodeAggregate> {
        self.aggregates
            .values()
            .filter(|aggregate| aggregate.parent.as_ref() == Some(parent))
            .collect()
    }

    fn child_by_name(
        &self,
        parent: &NodeAggregateId,
        name: &NodeName,
    ) -> Option<&NodeAggregate> {
        self.aggregates.values().find(|aggregate| {
            aggregate.parent.as_ref() == Some(parent) && aggregate.name.as_ref() == Some(name)
        })
    }
}
