//! constraint
//!
//! Structural constraint checks shared by the node command handler.
//!
//! Every check is a pure function over already-materialized state: it takes
//! aggregates, the schema registry, or the variation graph, and answers with
//! `Ok(())` or the one [`ConstraintError`] naming what was violated. Handlers
//! run all applicable checks before deriving a single event, so a rejected
//! command never leaves a partial write behind.

use thiserror::Error;

use crate::core::types::{NodeAggregateId, NodeName, NodeTypeName};
use crate::dimension::{DimensionSpacePoint, OriginDimensionSpacePoint, VariationGraph};
use crate::node::NodeAggregate;
use crate::nodetype::NodeTypeRegistry;

/// A violated structural constraint.
#[derive(Debug, Error, PartialEq)]
pub enum ConstraintError {
    /// The target id is already taken in this content stream.
    #[error("node aggregate {0} currently exists")]
    NodeAggregateCurrentlyExists(NodeAggregateId),

    /// The referenced aggregate does not exist in this content stream.
    #[error("node aggregate {0} does not currently exist")]
    NodeAggregateDoesNotExist(NodeAggregateId),

    /// One node aggregate id resolves to more than one aggregate.
    ///
    /// Indicates corrupted history; never produced by valid command
    /// execution.
    #[error("node aggregate {0} is ambiguous")]
    NodeAggregateIsAmbiguous(NodeAggregateId),

    /// The schema does not declare this node type.
    #[error("node type {0} was not found")]
    NodeTypeNotFound(NodeTypeName),

    /// The schema forbids this parent/child pairing.
    #[error("node type {child} is not allowed below {parent}")]
    NodeTypeNotAllowedAsChild {
        parent: NodeTypeName,
        child: NodeTypeName,
    },

    /// The coordinate tuple is not part of the dimension space.
    #[error("dimension space point {0} is not part of the dimension space")]
    PointNotInDimensionSpace(DimensionSpacePoint),

    /// The parent has no visible variant at the requested origin.
    #[error("parent {parent} does not cover {origin}")]
    ParentDoesNotCoverOrigin {
        parent: NodeAggregateId,
        origin: OriginDimensionSpacePoint,
    },

    /// A variant already exists at the requested origin.
    #[error("node aggregate {id} already occupies {origin}")]
    AlreadyOccupiesOrigin {
        id: NodeAggregateId,
        origin: OriginDimensionSpacePoint,
    },

    /// No variant exists at the requested origin.
    #[error("node aggregate {id} does not occupy {origin}")]
    DoesNotOccupyOrigin {
        id: NodeAggregateId,
        origin: OriginDimensionSpacePoint,
    },

    /// No variant of the aggregate is visible at the requested point.
    #[error("node aggregate {id} does not cover {point}")]
    DoesNotCoverPoint {
        id: NodeAggregateId,
        point: DimensionSpacePoint,
    },

    /// A sibling with overlapping coverage already uses this name.
    #[error("node name {name} is already taken below {parent}")]
    NodeNameAlreadyTaken {
        parent: NodeAggregateId,
        name: NodeName,
    },

    /// Tethered aggregates exist and vanish with their parent only.
    #[error("node aggregate {0} is tethered and cannot be removed directly")]
    TetheredNodeAggregateCannotBeRemoved(NodeAggregateId),

    /// Tethered aggregates keep the type their parent's schema declares.
    #[error("node aggregate {0} is tethered and cannot change its type")]
    TetheredNodeAggregateCannotBeRetyped(NodeAggregateId),

    /// Roots have no parent to vary below; they cover everything already.
    #[error("node aggregate {0} is a root and cannot be varied")]
    RootNodeAggregateCannotBeVaried(NodeAggregateId),

    /// Varying a node onto its own origin is meaningless.
    #[error("source and target origin are both {0}")]
    SourceAndTargetOriginAreEqual(OriginDimensionSpacePoint),
}

/// The target id must be free.
pub fn require_absent(
    existing: Option<&NodeAggregate>,
    id: &NodeAggregateId,
) -> Result<(), ConstraintError> {
    match existing {
        Some(_) => Err(ConstraintError::NodeAggregateCurrentlyExists(id.clone())),
        None => Ok(()),
    }
}

/// The referenced aggregate must exist.
pub fn require_present<'a>(
    existing: Option<&'a NodeAggregate>,
    id: &NodeAggregateId,
) -> Result<&'a NodeAggregate, ConstraintError> {
    existing.ok_or_else(|| ConstraintError::NodeAggregateDoesNotExist(id.clone()))
}

/// The node type must be declared by the schema.
pub fn require_node_type_declared(
    registry: &dyn NodeTypeRegistry,
    name: &NodeTypeName,
) -> Result<(), ConstraintError> {
    if registry.has_node_type(name) {
        Ok(())
    } else {
        Err(ConstraintError::NodeTypeNotFound(name.clone()))
    }
}

/// The point must exist in the dimension space.
pub fn require_point_allowed(
    variation: &VariationGraph,
    point: &DimensionSpacePoint,
) -> Result<(), ConstraintError> {
    if variation.contains(point) {
        Ok(())
    } else {
        Err(ConstraintError::PointNotInDimensionSpace(point.clone()))
    }
}

/// The parent must cover the origin the child is created in.
pub fn require_parent_covers(
    parent: &NodeAggregate,
    origin: &OriginDimensionSpacePoint,
) -> Result<(), ConstraintError> {
    if parent.covers(origin.as_point()) {
        Ok(())
    } else {
        Err(ConstraintError::ParentDoesNotCoverOrigin {
            parent: parent.id.clone(),
            origin: origin.clone(),
        })
    }
}

/// The aggregate must occupy the origin.
pub fn require_occupies(
    aggregate: &NodeAggregate,
    origin: &OriginDimensionSpacePoint,
) -> Result<(), ConstraintError> {
    if aggregate.occupies(origin) {
        Ok(())
    } else {
        Err(ConstraintError::DoesNotOccupyOrigin {
            id: aggregate.id.clone(),
            origin: origin.clone(),
        })
    }
}

/// The aggregate must not occupy the origin yet.
pub fn require_does_not_occupy(
    aggregate: &NodeAggregate,
    origin: &OriginDimensionSpacePoint,
) -> Result<(), ConstraintError> {
    if aggregate.occupies(origin) {
        Err(ConstraintError::AlreadyOccupiesOrigin {
            id: aggregate.id.clone(),
            origin: origin.clone(),
        })
    } else {
        Ok(())
    }
}

/// The aggregate must cover the point.
pub fn require_covers(
    aggregate: &NodeAggregate,
    point: &DimensionSpacePoint,
) -> Result<(), ConstraintError> {
    if aggregate.covers(point) {
        Ok(())
    } else {
        Err(ConstraintError::DoesNotCoverPoint {
            id: aggregate.id.clone(),
            point: point.clone(),
        })
    }
}

/// No sibling with overlapping coverage may already use the name.
///
/// `coverage` is the set of points the new variant will cover.
pub fn require_name_available<'a, I>(
    siblings: I,
    parent: &NodeAggregateId,
    name: &NodeName,
    coverage: &crate::dimension::DimensionSpacePointSet,
) -> Result<(), ConstraintError>
where
    I: IntoIterator<Item = &'a NodeAggregate>,
{
    for sibling in siblings {
        if sibling.name.as_ref() == Some(name) && sibling.covered.overlaps(coverage) {
            return Err(ConstraintError::NodeNameAlreadyTaken {
                parent: parent.clone(),
                name: name.clone(),
            });
        }
    }
    Ok(())
}

/// The aggregate must not be tethered (for direct removal).
pub fn require_not_tethered_for_removal(
    aggregate: &NodeAggregate,
) -> Result<(), ConstraintError> {
    if aggregate.is_tethered() {
        Err(ConstraintError::TetheredNodeAggregateCannotBeRemoved(
            aggregate.id.clone(),
        ))
    } else {
        Ok(())
    }
}

/// The aggregate must not be tethered (for type changes).
pub fn require_not_tethered_for_retype(
    aggregate: &NodeAggregate,
) -> Result<(), ConstraintError> {
    if aggregate.is_tethered() {
        Err(ConstraintError::TetheredNodeAggregateCannotBeRetyped(
            aggregate.id.clone(),
        ))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimension::{ContentDimension, DimensionSpacePointSet};
    use crate::node::NodeAggregateClassification;
    use crate::nodetype::InMemoryNodeTypeRegistry;
    use std::collections::BTreeMap;

    fn aggregate(id: &str, classification: NodeAggregateClassification) -> NodeAggregate {
        let origin = OriginDimensionSpacePoint::from_pairs([("language", "en")]);
        NodeAggregate {
            id: NodeAggregateId::from_string(id),
            node_type: NodeTypeName::new("Acme:Document").unwrap(),
            classification,
            parent: Some(NodeAggregateId::from_string("root")),
            name: Some(NodeName::new("home").unwrap()),
            occupied: vec![origin.clone()],
            covered: [origin.into_point()].into_iter().collect(),
            properties: BTreeMap::new(),
        }
    }

    #[test]
    fn existence_checks() {
        let a = aggregate("a", NodeAggregateClassification::Regular);
        let id = NodeAggregateId::from_string("a");

        assert!(require_absent(None, &id).is_ok());
        assert_eq!(
            require_absent(Some(&a), &id),
            Err(ConstraintError::NodeAggregateCurrentlyExists(id.clone()))
        );
        assert!(require_present(Some(&a), &id).is_ok());
        assert_eq!(
            require_present(None, &id).unwrap_err(),
            ConstraintError::NodeAggregateDoesNotExist(id)
        );
    }

    #[test]
    fn node_type_must_be_declared() {
        let registry = InMemoryNodeTypeRegistry::new();
        let name = NodeTypeName::new("Acme:Missing").unwrap();
        assert_eq!(
            require_node_type_declared(&registry, &name),
            Err(ConstraintError::NodeTypeNotFound(name))
        );
    }

    #[test]
    fn point_must_be_in_the_space() {
        let variation =
            VariationGraph::new(vec![ContentDimension::new("language").value("en", None)]);
        let en = DimensionSpacePoint::from_pairs([("language", "en")]);
        let fr = DimensionSpacePoint::from_pairs([("language", "fr")]);

        assert!(require_point_allowed(&variation, &en).is_ok());
        assert_eq!(
            require_point_allowed(&variation, &fr),
            Err(ConstraintError::PointNotInDimensionSpace(fr))
        );
    }

    #[test]
    fn occupation_checks() {
        let a = aggregate("a", NodeAggregateClassification::Regular);
        let en = OriginDimensionSpacePoint::from_pairs([("language", "en")]);
        let de = OriginDimensionSpacePoint::from_pairs([("language", "de")]);

        assert!(require_occupies(&a, &en).is_ok());
        assert!(require_occupies(&a, &de).is_err());
        assert!(require_does_not_occupy(&a, &de).is_ok());
        assert!(require_does_not_occupy(&a, &en).is_err());
    }

    #[test]
    fn coverage_checks() {
        let a = aggregate("a", NodeAggregateClassification::Regular);
        let en = DimensionSpacePoint::from_pairs([("language", "en")]);
        let de = DimensionSpacePoint::from_pairs([("language", "de")]);

        assert!(require_covers(&a, &en).is_ok());
        assert!(require_parent_covers(&a, &OriginDimensionSpacePoint::new(en)).is_ok());
        assert_eq!(
            require_covers(&a, &de),
            Err(ConstraintError::DoesNotCoverPoint {
                id: a.id.clone(),
                point: de,
            })
        );
    }

    #[test]
    fn name_uniqueness_respects_coverage_overlap() {
        let sibling = aggregate("a", NodeAggregateClassification::Regular);
        let parent = NodeAggregateId::from_string("root");
        let name = NodeName::new("home").unwrap();

        let overlapping: DimensionSpacePointSet =
            [DimensionSpacePoint::from_pairs([("language", "en")])].into_iter().collect();
        assert!(require_name_available([&sibling], &parent, &name, &overlapping).is_err());

        // The same name in disjoint coverage is fine.
        let disjoint: DimensionSpacePointSet =
            [DimensionSpacePoint::from_pairs([("language", "de")])].into_iter().collect();
        assert!(require_name_available([&sibling], &parent, &name, &disjoint).is_ok());

        let other = NodeName::new("about").unwrap();
        assert!(require_name_available([&sibling], &parent, &other, &overlapping).is_ok());
    }

    #[test]
    fn tethered_aggregates_are_protected() {
        let tethered = aggregate("t", NodeAggregateClassification::Tethered);
        let regular = aggregate("r", NodeAggregateClassification::Regular);

        assert!(require_not_tethered_for_removal(&tethered).is_err());
        assert!(require_not_tethered_for_removal(&regular).is_ok());
        assert!(require_not_tethered_for_retype(&tethered).is_err());
        assert!(require_not_tethered_for_retype(&regular).is_ok());
    }
}
