//! Property tests for the variation graph classification.

use folio::dimension::{ContentDimension, DimensionSpacePoint, VariantType, VariationGraph};
use proptest::prelude::*;

/// A random specialization forest: value `i` optionally specializes an
/// earlier value.
fn forest() -> impl Strategy<Value = Vec<Option<usize>>> {
    prop::collection::vec(prop::option::of(0usize..8), 1..8)
}

fn build(parents: &[Option<usize>]) -> (VariationGraph, Vec<DimensionSpacePoint>) {
    let mut dimension = ContentDimension::new("d");
    for (i, parent) in parents.iter().enumerate() {
        let parent_name = parent.filter(|_| i > 0).map(|p| format!("v{}", p % i));
        dimension = dimension.value(format!("v{i}"), parent_name.as_deref());
    }
    let points = (0..parents.len())
        .map(|i| DimensionSpacePoint::from_pairs([("d", format!("v{i}"))]))
        .collect();
    (VariationGraph::new(vec![dimension]), points)
}

proptest! {
    #[test]
    fn specialization_set_agrees_with_classification(parents in forest()) {
        let (graph, points) = build(&parents);
        for b in &points {
            let set = graph.specialization_set(b);
            for a in &points {
                let classified = graph.variant_type(a, b);
                let in_set = set.contains(a);
                let is_equal_or_specialization = matches!(
                    classified,
                    Some(VariantType::Same) | Some(VariantType::Specialization)
                );
                prop_assert_eq!(in_set, is_equal_or_specialization);
            }
        }
    }

    #[test]
    fn specialization_set_contains_the_point_itself(parents in forest()) {
        let (graph, points) = build(&parents);
        for point in &points {
            prop_assert!(graph.specialization_set(point).contains(point));
        }
    }

    #[test]
    fn specialization_and_generalization_are_inverse(parents in forest()) {
        let (graph, points) = build(&parents);
        for a in &points {
            for b in &points {
                let forward = graph.variant_type(a, b);
                let backward = graph.variant_type(b, a);
                match forward {
                    Some(VariantType::Specialization) => {
                        prop_assert_eq!(backward, Some(VariantType::Generalization));
                    }
                    Some(VariantType::Generalization) => {
                        prop_assert_eq!(backward, Some(VariantType::Specialization));
                    }
                    Some(VariantType::Peer) => {
                        prop_assert_eq!(backward, Some(VariantType::Peer));
                    }
                    Some(VariantType::Same) => {
                        prop_assert_eq!(a, b);
                    }
                    None => prop_assert!(false, "declared points must classify"),
                }
            }
        }
    }

    #[test]
    fn specialization_is_transitive(parents in forest()) {
        let (graph, points) = build(&parents);
        for a in &points {
            for b in &points {
                for c in &points {
                    if graph.variant_type(a, b) == Some(VariantType::Specialization)
                        && graph.variant_type(b, c) == Some(VariantType::Specialization)
                    {
                        prop_assert_eq!(
                            graph.variant_type(a, c),
                            Some(VariantType::Specialization)
                        );
                    }
                }
            }
        }
    }
}
