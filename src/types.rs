//! # Type tags and the explicit supertype registry.
//!
//! Rust has no runtime subtype relation, so covariant matching is driven by
//! an explicit registry: each type may declare one parent (its "superclass")
//! and any number of interface-like supertypes. Assignability is a transitive
//! walk over that graph.
//!
//! ## Architecture
//! ```text
//! TypeRelations::builder()
//!     .extends::<IntegerEvent, NumberEvent>()      // single parent
//!     .implements::<StringProducer, CharSeq>()     // any number of interfaces
//!     .build()
//!
//! is_assignable(declared, actual):
//!     actual == declared
//!     or declared ∈ ancestors(actual)    (parents + interfaces, transitive)
//! ```
//!
//! ## Rules
//! - Unregistered types have no ancestors; they match only themselves.
//! - Interface types may themselves declare parents/interfaces; the walk is
//!   transitive over the whole graph.
//! - The registry is immutable once built and is shared as an `Arc` between
//!   descriptor construction and the dispatcher.

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};

/// Identity of a type participating in matching: its `TypeId` plus a
/// human-readable name for error reports.
#[derive(Clone, Copy, Debug)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    /// Returns the tag for a concrete type.
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The underlying `TypeId`.
    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// The type's name as produced by `std::any::type_name`.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl std::hash::Hash for TypeTag {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Declared supertypes of one registered type.
#[derive(Default)]
struct Node {
    parent: Option<TypeTag>,
    interfaces: Vec<TypeTag>,
}

/// Immutable registry of declared supertype relations.
///
/// Replaces reflection-based `isAssignableFrom` checks with an explicit
/// ancestor walk maintained by the application.
#[derive(Default)]
pub struct TypeRelations {
    nodes: HashMap<TypeId, Node>,
}

impl TypeRelations {
    /// Starts building a relation registry.
    pub fn builder() -> TypeRelationsBuilder {
        TypeRelationsBuilder {
            nodes: HashMap::new(),
        }
    }

    /// A registry with no relations: every type matches only itself.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the declared parent of `ty`, if any.
    pub fn parent(&self, ty: TypeId) -> Option<TypeTag> {
        self.nodes.get(&ty).and_then(|n| n.parent)
    }

    /// Returns the interfaces declared directly on `ty`.
    pub fn interfaces(&self, ty: TypeId) -> &[TypeTag] {
        self.nodes.get(&ty).map_or(&[], |n| n.interfaces.as_slice())
    }

    /// True if a value of runtime type `actual` may be handed to a handler
    /// declared for `declared` (covariance: `declared` is `actual` itself or
    /// one of its transitive ancestors).
    pub fn is_assignable(&self, declared: TypeTag, actual: TypeId) -> bool {
        if declared.id == actual {
            return true;
        }

        let mut visited: HashSet<TypeId> = HashSet::new();
        let mut pending: Vec<TypeId> = vec![actual];

        while let Some(current) = pending.pop() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(&current) {
                for ancestor in node.parent.iter().chain(node.interfaces.iter()) {
                    if ancestor.id == declared.id {
                        return true;
                    }
                    pending.push(ancestor.id);
                }
            }
        }

        false
    }
}

/// Builder for [`TypeRelations`].
pub struct TypeRelationsBuilder {
    nodes: HashMap<TypeId, Node>,
}

impl TypeRelationsBuilder {
    /// Declares `Sub`'s parent to be `Super`. A later call for the same `Sub`
    /// replaces the parent.
    pub fn extends<Sub: Any, Super: Any>(mut self) -> Self {
        self.nodes.entry(TypeId::of::<Sub>()).or_default().parent = Some(TypeTag::of::<Super>());
        self
    }

    /// Declares that `T` implements the interface-like type `Iface`.
    pub fn implements<T: Any, Iface: Any>(mut self) -> Self {
        self.nodes
            .entry(TypeId::of::<T>())
            .or_default()
            .interfaces
            .push(TypeTag::of::<Iface>());
        self
    }

    /// Finishes the registry.
    pub fn build(self) -> TypeRelations {
        TypeRelations { nodes: self.nodes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Animal;
    struct Mammal;
    struct Dog;
    struct Pet;
    struct Rock;

    fn zoo() -> TypeRelations {
        TypeRelations::builder()
            .extends::<Mammal, Animal>()
            .extends::<Dog, Mammal>()
            .implements::<Dog, Pet>()
            .build()
    }

    #[test]
    fn test_exact_type_is_assignable() {
        let rel = TypeRelations::empty();
        assert!(rel.is_assignable(TypeTag::of::<Rock>(), TypeId::of::<Rock>()));
    }

    #[test]
    fn test_direct_and_transitive_parents() {
        let rel = zoo();
        assert!(rel.is_assignable(TypeTag::of::<Mammal>(), TypeId::of::<Dog>()));
        assert!(rel.is_assignable(TypeTag::of::<Animal>(), TypeId::of::<Dog>()));
        assert!(!rel.is_assignable(TypeTag::of::<Dog>(), TypeId::of::<Animal>()));
    }

    #[test]
    fn test_interfaces_are_assignable() {
        let rel = zoo();
        assert!(rel.is_assignable(TypeTag::of::<Pet>(), TypeId::of::<Dog>()));
        assert!(!rel.is_assignable(TypeTag::of::<Pet>(), TypeId::of::<Mammal>()));
    }

    #[test]
    fn test_unrelated_types_do_not_match() {
        let rel = zoo();
        assert!(!rel.is_assignable(TypeTag::of::<Animal>(), TypeId::of::<Rock>()));
    }

    #[test]
    fn test_walk_handles_cycles() {
        // Nonsense declaration, but the walk must still terminate.
        let rel = TypeRelations::builder()
            .extends::<Animal, Mammal>()
            .extends::<Mammal, Animal>()
            .build();
        assert!(!rel.is_assignable(TypeTag::of::<Rock>(), TypeId::of::<Animal>()));
        assert!(rel.is_assignable(TypeTag::of::<Mammal>(), TypeId::of::<Animal>()));
    }
}
