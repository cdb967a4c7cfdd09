//! nodetype
//!
//! The node-type schema boundary.
//!
//! # Design
//!
//! Schema validation rules live outside the core; command handlers consume
//! them through the [`NodeTypeRegistry`] trait, which answers exactly the
//! questions the constraint engine asks: does a type exist, may it appear
//! below a parent type, and which tethered children does it declare.
//!
//! [`InMemoryNodeTypeRegistry`] is the reference implementation used by
//! tests and embedders without an external schema source.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::core::types::{NodeName, NodeTypeName};

/// Read-only view of the node-type schema.
pub trait NodeTypeRegistry {
    /// Whether the schema declares this node type.
    fn has_node_type(&self, name: &NodeTypeName) -> bool;

    /// Whether `child` may appear directly below `parent`.
    ///
    /// Only called for declared types.
    fn allows_child(&self, parent: &NodeTypeName, child: &NodeTypeName) -> bool;

    /// Whether `child` may appear below the tethered child `tethered_name`
    /// of `grandparent`.
    ///
    /// Constraints for children of tethered nodes are declared on the
    /// grandparent; absent a declaration, the tethered type's own child
    /// constraints apply (which is what the default implementation does not
    /// know, so registries must override when they support slot
    /// constraints).
    fn allows_child_of_tethered(
        &self,
        grandparent: &NodeTypeName,
        tethered_name: &NodeName,
        tethered_type: &NodeTypeName,
        child: &NodeTypeName,
    ) -> bool {
        let _ = (grandparent, tethered_name);
        self.allows_child(tethered_type, child)
    }

    /// Tethered children declared by this type, as (name, type) pairs.
    fn tethered_children(&self, of: &NodeTypeName) -> Vec<(NodeName, NodeTypeName)>;
}

/// One node type's declaration.
#[derive(Debug, Clone, Default)]
pub struct NodeTypeDefinition {
    /// Allowed direct child types; `None` allows all declared types.
    allowed_children: Option<BTreeSet<NodeTypeName>>,
    /// Declared tethered children by slot name.
    tethered: BTreeMap<NodeName, NodeTypeName>,
    /// Per-slot child constraints overriding the tethered type's own.
    tethered_child_constraints: BTreeMap<NodeName, BTreeSet<NodeTypeName>>,
}

impl NodeTypeDefinition {
    /// A type with no constraints and no tethered children.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict direct children to the given types.
    pub fn allowing_children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = NodeTypeName>,
    {
        self.allowed_children = Some(children.into_iter().collect());
        self
    }

    /// Declare a tethered child slot.
    pub fn with_tethered_child(mut self, name: NodeName, node_type: NodeTypeName) -> Self {
        self.tethered.insert(name, node_type);
        self
    }

    /// Constrain what may appear below one tethered child slot.
    pub fn constraining_tethered_children<I>(mut self, slot: NodeName, children: I) -> Self
    where
        I: IntoIterator<Item = NodeTypeName>,
    {
        self.tethered_child_constraints
            .insert(slot, children.into_iter().collect());
        self
    }
}

/// In-memory [`NodeTypeRegistry`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryNodeTypeRegistry {
    types: BTreeMap<NodeTypeName, NodeTypeDefinition>,
}

impl InMemoryNodeTypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a node type.
    pub fn with_type(mut self, name: NodeTypeName, definition: NodeTypeDefinition) -> Self {
        self.types.insert(name, definition);
        self
    }
}

impl NodeTypeRegistry for InMemoryNodeTypeRegistry {
    fn has_node_type(&self, name: &NodeTypeName) -> bool {
        self.types.contains_key(name)
    }

    fn allows_child(&self, parent: &NodeTypeName, child: &NodeTypeName) -> bool {
        match self.types.get(parent) {
            Some(definition) => match &definition.allowed_children {
                Some(allowed) => allowed.contains(child),
                None => true,
            },
            None => false,
        }
    }

    fn allows_child_of_tethered(
        &self,
        grandparent: &NodeTypeName,
        tethered_name: &NodeName,
        tethered_type: &NodeTypeName,
        child: &NodeTypeName,
    ) -> bool {
        if let Some(definition) = self.types.get(grandparent) {
            if let Some(constraint) = definition.tethered_child_constraints.get(tethered_name) {
                return constraint.contains(child);
            }
        }
        self.allows_child(tethered_type, child)
    }

    fn tethered_children(&self, of: &NodeTypeName) -> Vec<(NodeName, NodeTypeName)> {
        self.types
            .get(of)
            .map(|definition| {
                definition
                    .tethered
                    .iter()
                    .map(|(name, ty)| (name.clone(), ty.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(name: &str) -> NodeTypeName {
        NodeTypeName::new(name).unwrap()
    }

    fn name(n: &str) -> NodeName {
        NodeName::new(n).unwrap()
    }

    fn registry() -> InMemoryNodeTypeRegistry {
        InMemoryNodeTypeRegistry::new()
            .with_type(
                ty("Acme:Document"),
                NodeTypeDefinition::new()
                    .allowing_children([ty("Acme:Document"), ty("Acme:Content")])
                    .with_tethered_child(name("main"), ty("Acme:ContentCollection")),
            )
            .with_type(
                ty("Acme:ContentCollection"),
                NodeTypeDefinition::new().allowing_children([ty("Acme:Content")]),
            )
            .with_type(ty("Acme:Content"), NodeTypeDefinition::new())
    }

    #[test]
    fn declared_types_are_known() {
        let registry = registry();
        assert!(registry.has_node_type(&ty("Acme:Document")));
        assert!(!registry.has_node_type(&ty("Acme:Missing")));
    }

    #[test]
    fn child_constraints_apply() {
        let registry = registry();
        assert!(registry.allows_child(&ty("Acme:Document"), &ty("Acme:Content")));
        assert!(!registry.allows_child(&ty("Acme:Document"), &ty("Acme:ContentCollection")));
    }

    #[test]
    fn unconstrained_type_allows_everything() {
        let registry = registry();
        assert!(registry.allows_child(&ty("Acme:Content"), &ty("Acme:Document")));
    }

    #[test]
    fn tethered_children_are_declared() {
        let registry = registry();
        let tethered = registry.tethered_children(&ty("Acme:Document"));
        assert_eq!(
            tethered,
            vec![(name("main"), ty("Acme:ContentCollection"))]
        );
        assert!(registry.tethered_children(&ty("Acme:Content")).is_empty());
    }

    #[test]
    fn tethered_slot_falls_back_to_tethered_types_constraints() {
        let registry = registry();
        // No slot constraint declared: the collection's own rules apply.
        assert!(registry.allows_child_of_tethered(
            &ty("Acme:Document"),
            &name("main"),
            &ty("Acme:ContentCollection"),
            &ty("Acme:Content"),
        ));
        assert!(!registry.allows_child_of_tethered(
            &ty("Acme:Document"),
            &name("main"),
            &ty("Acme:ContentCollection"),
            &ty("Acme:Document"),
        ));
    }

    #[test]
    fn tethered_slot_constraint_overrides() {
        let registry = InMemoryNodeTypeRegistry::new()
            .with_type(
                ty("Acme:Document"),
                NodeTypeDefinition::new()
                    .with_tethered_child(name("main"), ty("Acme:ContentCollection"))
                    .constraining_tethered_children(name("main"), [ty("Acme:Document")]),
            )
            .with_type(
                ty("Acme:ContentCollection"),
                NodeTypeDefinition::new().allowing_children([ty("Acme:Content")]),
            )
            .with_type(ty("Acme:Content"), NodeTypeDefinition::new());

        // The grandparent's slot constraint wins over the collection's own.
        assert!(registry.allows_child_of_tethered(
            &ty("Acme:Document"),
            &name("main"),
            &ty("Acme:ContentCollection"),
            &ty("Acme:Document"),
        ));
        assert!(!registry.allows_child_of_tethered(
            &ty("Acme:Document"),
            &name("main"),
            &ty("Acme:ContentCollection"),
            &ty("Acme:Content"),
        ));
    }
}
