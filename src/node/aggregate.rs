//! node::aggregate
//!
//! The versioned identity of a content node across the dimension space.
//!
//! A node aggregate bundles every variant of one node: the origin points it
//! genuinely occupies and the points those variants cover. Aggregates are
//! never mutated by command handlers directly; they are folded from domain
//! events by the graph projection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::types::{NodeAggregateId, NodeName, NodeTypeName};
use crate::dimension::{DimensionSpacePoint, DimensionSpacePointSet, OriginDimensionSpacePoint};

/// Property values of one node variant, keyed by property name.
///
/// Property serialization and conversion are a collaborator concern; the
/// core carries values as opaque JSON.
pub type PropertyValues = BTreeMap<String, serde_json::Value>;

/// How a node aggregate came into being and what may be done to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeAggregateClassification {
    /// A parentless entry point of the content graph.
    Root,
    /// An ordinary, explicitly created node.
    Regular,
    /// Auto-created, name-bound child. Cannot be freely removed or retyped.
    Tethered,
}

impl NodeAggregateClassification {
    /// Whether this aggregate is a root.
    pub fn is_root(&self) -> bool {
        matches!(self, Self::Root)
    }

    /// Whether this aggregate is tethered to its parent.
    pub fn is_tethered(&self) -> bool {
        matches!(self, Self::Tethered)
    }
}

/// One node aggregate as materialized by the graph projection.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeAggregate {
    /// Identity, scoped to the content stream the projection is bound to.
    pub id: NodeAggregateId,
    /// The aggregate's node type.
    pub node_type: NodeTypeName,
    /// Root, regular, or tethered.
    pub classification: NodeAggregateClassification,
    /// Parent aggregate; `None` only for roots.
    pub parent: Option<NodeAggregateId>,
    /// Name below the parent, unique among siblings with overlapping coverage.
    pub name: Option<NodeName>,
    /// Origin points where a variant genuinely exists.
    pub occupied: Vec<OriginDimensionSpacePoint>,
    /// Points where some variant is visible.
    pub covered: DimensionSpacePointSet,
    /// Per-origin property values.
    pub properties: BTreeMap<OriginDimensionSpacePoint, PropertyValues>,
}

impl NodeAggregate {
    /// Whether a variant exists at exactly this origin.
    pub fn occupies(&self, origin: &OriginDimensionSpacePoint) -> bool {
        self.occupied.contains(origin)
    }

    /// Whether some variant is visible at this point.
    pub fn covers(&self, point: &DimensionSpacePoint) -> bool {
        self.covered.contains(point)
    }

    /// Property values of the variant at `origin`, if occupied.
    pub fn properties_at(&self, origin: &OriginDimensionSpacePoint) -> Option<&PropertyValues> {
        self.properties.get(origin)
    }

    /// Whether this aggregate is tethered to its parent.
    pub fn is_tethered(&self) -> bool {
        self.classification.is_tethered()
    }

    /// Whether this aggregate is a root.
    pub fn is_root(&self) -> bool {
        self.classification.is_root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregate() -> NodeAggregate {
        let origin = OriginDimensionSpacePoint::from_pairs([("language", "en")]);
        let mut properties = BTreeMap::new();
        properties.insert(origin.clone(), {
            let mut values = PropertyValues::new();
            values.insert("title".into(), serde_json::json!("Home"));
            values
        });
        NodeAggregate {
            id: NodeAggregateId::from_string("a"),
            node_type: NodeTypeName::new("Acme.Site:Document").unwrap(),
            classification: NodeAggregateClassification::Regular,
            parent: Some(NodeAggregateId::from_string("root")),
            name: Some(NodeName::new("home").unwrap()),
            occupied: vec![origin.clone()],
            covered: [origin.as_point().clone()].into_iter().collect(),
            properties,
        }
    }

    #[test]
    fn occupation_and_coverage() {
        let aggregate = aggregate();
        let origin = OriginDimensionSpacePoint::from_pairs([("language", "en")]);
        let elsewhere = OriginDimensionSpacePoint::from_pairs([("language", "de")]);

        assert!(aggregate.occupies(&origin));
        assert!(!aggregate.occupies(&elsewhere));
        assert!(aggregate.covers(origin.as_point()));
        assert!(!aggregate.covers(elsewhere.as_point()));
    }

    #[test]
    fn properties_per_origin() {
        let aggregate = aggregate();
        let origin = OriginDimensionSpacePoint::from_pairs([("language", "en")]);
        assert_eq!(
            aggregate.properties_at(&origin).unwrap()["title"],
            serde_json::json!("Home")
        );
        assert!(aggregate
            .properties_at(&OriginDimensionSpacePoint::from_pairs([("language", "de")]))
            .is_none());
    }

    #[test]
    fn classification_predicates() {
        assert!(NodeAggregateClassification::Root.is_root());
        assert!(!NodeAggregateClassification::Root.is_tethered());
        assert!(NodeAggregateClassification::Tethered.is_tethered());
        assert!(!NodeAggregateClassification::Regular.is_tethered());
    }
}
