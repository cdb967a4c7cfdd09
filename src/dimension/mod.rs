//! dimension
//!
//! The multi-dimensional coordinate system content varies over.
//!
//! # Model
//!
//! A [`DimensionSpacePoint`] is an immutable coordinate tuple (dimension id
//! to dimension value, e.g. `{language: "en", site: "b2b"}`). The
//! [`VariationGraph`] is built once from the declared [`ContentDimension`]s
//! and injected into the core; it is consumed, never mutated.
//!
//! Within one dimension, values form a specialization forest: `en-gb`
//! specializes `en`. Across the whole space, point B specializes point A
//! when every coordinate of B is equal to or a descendant of A's coordinate
//! (and at least one differs). The inverse is a generalization; two points
//! that are neither are peers.
//!
//! # Example
//!
//! ```
//! use folio::dimension::{ContentDimension, DimensionSpacePoint, VariantType, VariationGraph};
//!
//! let graph = VariationGraph::new(vec![ContentDimension::new("language")
//!     .value("en", None)
//!     .value("en-gb", Some("en"))
//!     .value("de", None)]);
//!
//! let en = DimensionSpacePoint::from_pairs([("language", "en")]);
//! let en_gb = DimensionSpacePoint::from_pairs([("language", "en-gb")]);
//! let de = DimensionSpacePoint::from_pairs([("language", "de")]);
//!
//! assert_eq!(graph.variant_type(&en_gb, &en), Some(VariantType::Specialization));
//! assert_eq!(graph.variant_type(&en, &en_gb), Some(VariantType::Generalization));
//! assert_eq!(graph.variant_type(&de, &en), Some(VariantType::Peer));
//! assert!(graph.specialization_set(&en).contains(&en_gb));
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// An immutable coordinate tuple in the dimension space.
///
/// The empty point is the single point of a zero-dimensional space and the
/// origin occupied by root node aggregates.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct DimensionSpacePoint {
    coordinates: BTreeMap<String, String>,
}

impl DimensionSpacePoint {
    /// The empty coordinate tuple.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a point from a coordinate map.
    pub fn new(coordinates: BTreeMap<String, String>) -> Self {
        Self { coordinates }
    }

    /// Create a point from (dimension, value) pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            coordinates: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Get the value for one dimension, if present.
    pub fn coordinate(&self, dimension: &str) -> Option<&str> {
        self.coordinates.get(dimension).map(String::as_str)
    }

    /// All coordinates, ordered by dimension id.
    pub fn coordinates(&self) -> &BTreeMap<String, String> {
        &self.coordinates
    }

    /// Whether this is the empty tuple.
    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }
}

impl std::fmt::Display for DimensionSpacePoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.coordinates.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}: {v}")?;
        }
        write!(f, "}}")
    }
}

/// The origin coordinate of a node variant: the point it was created in,
/// as opposed to the points it merely covers.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct OriginDimensionSpacePoint(DimensionSpacePoint);

impl OriginDimensionSpacePoint {
    /// Wrap a point as an origin.
    pub fn new(point: DimensionSpacePoint) -> Self {
        Self(point)
    }

    /// The origin of root aggregates: the empty tuple.
    pub fn root() -> Self {
        Self(DimensionSpacePoint::empty())
    }

    /// Create an origin from (dimension, value) pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(DimensionSpacePoint::from_pairs(pairs))
    }

    /// View as a plain dimension space point.
    pub fn as_point(&self) -> &DimensionSpacePoint {
        &self.0
    }

    /// Convert into a plain dimension space point.
    pub fn into_point(self) -> DimensionSpacePoint {
        self.0
    }
}

impl From<DimensionSpacePoint> for OriginDimensionSpacePoint {
    fn from(point: DimensionSpacePoint) -> Self {
        Self(point)
    }
}

impl std::fmt::Display for OriginDimensionSpacePoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ordered set of dimension space points.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct DimensionSpacePointSet {
    points: BTreeSet<DimensionSpacePoint>,
}

impl DimensionSpacePointSet {
    /// The empty set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check membership.
    pub fn contains(&self, point: &DimensionSpacePoint) -> bool {
        self.points.contains(point)
    }

    /// Insert a point.
    pub fn insert(&mut self, point: DimensionSpacePoint) {
        self.points.insert(point);
    }

    /// Remove a point.
    pub fn remove(&mut self, point: &DimensionSpacePoint) {
        self.points.remove(point);
    }

    /// Points present in both sets.
    pub fn intersect(&self, other: &Self) -> Self {
        Self {
            points: self.points.intersection(&other.points).cloned().collect(),
        }
    }

    /// Points present in either set.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            points: self.points.union(&other.points).cloned().collect(),
        }
    }

    /// Points of this set absent from `other`.
    pub fn difference(&self, other: &Self) -> Self {
        Self {
            points: self.points.difference(&other.points).cloned().collect(),
        }
    }

    /// Whether any point is shared with `other`.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.points.iter().any(|p| other.contains(p))
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterate in dimension order.
    pub fn iter(&self) -> impl Iterator<Item = &DimensionSpacePoint> {
        self.points.iter()
    }
}

impl FromIterator<DimensionSpacePoint> for DimensionSpacePointSet {
    fn from_iter<I: IntoIterator<Item = DimensionSpacePoint>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for DimensionSpacePointSet {
    type Item = DimensionSpacePoint;
    type IntoIter = std::collections::btree_set::IntoIter<DimensionSpacePoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}

/// How one point relates to another in the variation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantType {
    /// The points are equal.
    Same,
    /// The first point specializes the second (is more specific).
    Specialization,
    /// The first point generalizes the second (is more general).
    Generalization,
    /// Neither specializes the other.
    Peer,
}

/// One declared content dimension: an id plus a specialization forest of
/// values.
///
/// Declaration order of values does not matter, but a value's parent must
/// also be declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDimension {
    id: String,
    values: Vec<(String, Option<String>)>,
}

impl ContentDimension {
    /// Start declaring a dimension.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            values: Vec::new(),
        }
    }

    /// Declare a value, optionally specializing a parent value.
    pub fn value(mut self, value: impl Into<String>, parent: Option<&str>) -> Self {
        self.values
            .push((value.into(), parent.map(str::to_string)));
        self
    }

    /// The dimension id.
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// The injected, read-only model of the dimension space: which points are
/// allowed and how any two relate.
///
/// Built once at startup from the declared dimensions; the allowed points
/// are the cartesian product of each dimension's values.
#[derive(Debug, Clone)]
pub struct VariationGraph {
    dimensions: Vec<String>,
    /// Per dimension: value -> set of equal-or-more-specialized values.
    descendants: HashMap<String, HashMap<String, HashSet<String>>>,
    allowed: DimensionSpacePointSet,
}

impl VariationGraph {
    /// Build the variation graph from declared dimensions.
    ///
    /// A zero-dimensional declaration yields a space with exactly the empty
    /// point.
    pub fn new(dimensions: Vec<ContentDimension>) -> Self {
        let mut descendants: HashMap<String, HashMap<String, HashSet<String>>> = HashMap::new();
        let mut dimension_ids = Vec::with_capacity(dimensions.len());

        for dimension in &dimensions {
            dimension_ids.push(dimension.id.clone());
            let mut parents: HashMap<&str, Option<&str>> = HashMap::new();
            for (value, parent) in &dimension.values {
                parents.insert(value.as_str(), parent.as_deref());
            }

            let mut per_value: HashMap<String, HashSet<String>> = HashMap::new();
            for (value, _) in &dimension.values {
                // Walk from each value up its ancestor chain; the value is a
                // descendant of every ancestor and of itself.
                let mut current: Option<&str> = Some(value.as_str());
                while let Some(v) = current {
                    per_value
                        .entry(v.to_string())
                        .or_default()
                        .insert(value.clone());
                    current = parents.get(v).copied().flatten();
                }
            }
            descendants.insert(dimension.id.clone(), per_value);
        }

        let allowed = Self::cartesian(&dimensions);

        Self {
            dimensions: dimension_ids,
            descendants,
            allowed,
        }
    }

    fn cartesian(dimensions: &[ContentDimension]) -> DimensionSpacePointSet {
        let mut points = vec![BTreeMap::new()];
        for dimension in dimensions {
            let mut next = Vec::with_capacity(points.len() * dimension.values.len());
            for point in &points {
                for (value, _) in &dimension.values {
                    let mut extended: BTreeMap<String, String> = point.clone();
                    extended.insert(dimension.id.clone(), value.clone());
                    next.push(extended);
                }
            }
            points = next;
        }
        points.into_iter().map(DimensionSpacePoint::new).collect()
    }

    /// All points of the dimension space.
    pub fn allowed_points(&self) -> &DimensionSpacePointSet {
        &self.allowed
    }

    /// Whether the point exists in the dimension space.
    pub fn contains(&self, point: &DimensionSpacePoint) -> bool {
        self.allowed.contains(point)
    }

    /// Classify how `a` relates to `b`.
    ///
    /// Returns `None` if either point is not part of the dimension space.
    pub fn variant_type(
        &self,
        a: &DimensionSpacePoint,
        b: &DimensionSpacePoint,
    ) -> Option<VariantType> {
        if !self.contains(a) || !self.contains(b) {
            return None;
        }
        if a == b {
            return Some(VariantType::Same);
        }
        if self.is_specialization(a, b) {
            return Some(VariantType::Specialization);
        }
        if self.is_specialization(b, a) {
            return Some(VariantType::Generalization);
        }
        Some(VariantType::Peer)
    }

    /// Whether every coordinate of `a` is equal to or a descendant of the
    /// matching coordinate of `b`.
    fn is_specialization(&self, a: &DimensionSpacePoint, b: &DimensionSpacePoint) -> bool {
        self.dimensions.iter().all(|dimension| {
            let (Some(va), Some(vb)) = (a.coordinate(dimension), b.coordinate(dimension)) else {
                return false;
            };
            self.descendants
                .get(dimension)
                .and_then(|d| d.get(vb))
                .is_some_and(|set| set.contains(va))
        })
    }

    /// The closure of points reachable from `point` by specialization,
    /// including the point itself.
    ///
    /// Returns the empty set for points outside the dimension space.
    pub fn specialization_set(&self, point: &DimensionSpacePoint) -> DimensionSpacePointSet {
        if !self.contains(point) {
            return DimensionSpacePointSet::empty();
        }
        self.allowed
            .iter()
            .filter(|candidate| {
                *candidate == point || self.is_specialization(candidate, point)
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn language_graph() -> VariationGraph {
        VariationGraph::new(vec![ContentDimension::new("language")
            .value("en", None)
            .value("en-gb", Some("en"))
            .value("en-us", Some("en"))
            .value("de", None)])
    }

    fn two_dimensional_graph() -> VariationGraph {
        VariationGraph::new(vec![
            ContentDimension::new("language")
                .value("en", None)
                .value("en-gb", Some("en")),
            ContentDimension::new("site").value("retail", None).value("b2b", None),
        ])
    }

    fn point(pairs: &[(&str, &str)]) -> DimensionSpacePoint {
        DimensionSpacePoint::from_pairs(pairs.iter().copied())
    }

    mod points {
        use super::*;

        #[test]
        fn empty_point() {
            assert!(DimensionSpacePoint::empty().is_empty());
            assert_eq!(DimensionSpacePoint::empty().to_string(), "{}");
        }

        #[test]
        fn coordinate_lookup() {
            let p = point(&[("language", "en")]);
            assert_eq!(p.coordinate("language"), Some("en"));
            assert_eq!(p.coordinate("site"), None);
        }

        #[test]
        fn equality_ignores_declaration_order() {
            let a = point(&[("language", "en"), ("site", "b2b")]);
            let b = point(&[("site", "b2b"), ("language", "en")]);
            assert_eq!(a, b);
        }

        #[test]
        fn serde_roundtrip() {
            let p = point(&[("language", "en-gb")]);
            let json = serde_json::to_string(&p).unwrap();
            let parsed: DimensionSpacePoint = serde_json::from_str(&json).unwrap();
            assert_eq!(p, parsed);
        }
    }

    mod point_set {
        use super::*;

        #[test]
        fn set_operations() {
            let a: DimensionSpacePointSet =
                [point(&[("l", "en")]), point(&[("l", "de")])].into_iter().collect();
            let b: DimensionSpacePointSet =
                [point(&[("l", "de")]), point(&[("l", "fr")])].into_iter().collect();

            assert_eq!(a.intersect(&b).len(), 1);
            assert_eq!(a.union(&b).len(), 3);
            assert_eq!(a.difference(&b).len(), 1);
            assert!(a.overlaps(&b));
            assert!(a.difference(&b).contains(&point(&[("l", "en")])));
        }

        #[test]
        fn empty_set() {
            let empty = DimensionSpacePointSet::empty();
            assert!(empty.is_empty());
            assert!(!empty.overlaps(&empty));
        }
    }

    mod variation_graph {
        use super::*;

        #[test]
        fn zero_dimensions_yields_the_empty_point() {
            let graph = VariationGraph::new(vec![]);
            assert_eq!(graph.allowed_points().len(), 1);
            assert!(graph.contains(&DimensionSpacePoint::empty()));
        }

        #[test]
        fn allowed_points_are_cartesian_product() {
            let graph = two_dimensional_graph();
            assert_eq!(graph.allowed_points().len(), 4);
            assert!(graph.contains(&point(&[("language", "en-gb"), ("site", "b2b")])));
            assert!(!graph.contains(&point(&[("language", "fr"), ("site", "b2b")])));
        }

        #[test]
        fn classifies_specialization() {
            let graph = language_graph();
            assert_eq!(
                graph.variant_type(&point(&[("language", "en-gb")]), &point(&[("language", "en")])),
                Some(VariantType::Specialization)
            );
        }

        #[test]
        fn classifies_generalization() {
            let graph = language_graph();
            assert_eq!(
                graph.variant_type(&point(&[("language", "en")]), &point(&[("language", "en-gb")])),
                Some(VariantType::Generalization)
            );
        }

        #[test]
        fn classifies_peer() {
            let graph = language_graph();
            assert_eq!(
                graph.variant_type(&point(&[("language", "de")]), &point(&[("language", "en")])),
                Some(VariantType::Peer)
            );
            // Siblings under a shared generalization are peers, not variants.
            assert_eq!(
                graph.variant_type(
                    &point(&[("language", "en-gb")]),
                    &point(&[("language", "en-us")])
                ),
                Some(VariantType::Peer)
            );
        }

        #[test]
        fn classifies_same() {
            let graph = language_graph();
            assert_eq!(
                graph.variant_type(&point(&[("language", "en")]), &point(&[("language", "en")])),
                Some(VariantType::Same)
            );
        }

        #[test]
        fn unknown_points_are_unclassified() {
            let graph = language_graph();
            assert_eq!(
                graph.variant_type(&point(&[("language", "fr")]), &point(&[("language", "en")])),
                None
            );
        }

        #[test]
        fn specialization_set_includes_self_and_descendants() {
            let graph = language_graph();
            let set = graph.specialization_set(&point(&[("language", "en")]));
            assert_eq!(set.len(), 3);
            assert!(set.contains(&point(&[("language", "en")])));
            assert!(set.contains(&point(&[("language", "en-gb")])));
            assert!(set.contains(&point(&[("language", "en-us")])));
            assert!(!set.contains(&point(&[("language", "de")])));
        }

        #[test]
        fn specialization_set_of_leaf_is_singleton() {
            let graph = language_graph();
            let set = graph.specialization_set(&point(&[("language", "en-gb")]));
            assert_eq!(set.len(), 1);
        }

        #[test]
        fn specialization_set_spans_dimensions() {
            let graph = two_dimensional_graph();
            let set = graph.specialization_set(&point(&[("language", "en"), ("site", "b2b")]));
            assert_eq!(set.len(), 2);
            assert!(set.contains(&point(&[("language", "en-gb"), ("site", "b2b")])));
            assert!(!set.contains(&point(&[("language", "en-gb"), ("site", "retail")])));
        }

        #[test]
        fn specialization_set_of_unknown_point_is_empty() {
            let graph = language_graph();
            assert!(graph
                .specialization_set(&point(&[("language", "fr")]))
                .is_empty());
        }
    }
}
