//! # Handler discovery seam.
//!
//! The bus does not care where descriptors come from; it consumes them
//! through the [`HandlerScanner`] contract, invoked at most once per distinct
//! consumer type (the [`ConsumerIndex`](super::ConsumerIndex) memoizes the
//! result).
//!
//! The shipped implementation, [`HandlerRegistry`], is explicit registration:
//! applications list each consumer type's descriptors up front. Annotation or
//! macro driven discovery can be layered on by implementing the trait.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use crate::handlers::HandlerDescriptor;

/// Supplies the handler descriptors for a consumer type.
///
/// Implementations must be pure per type: the result is cached process-wide
/// and the scanner is never asked about the same type twice.
pub trait HandlerScanner: Send + Sync + 'static {
    /// Returns the descriptors for `consumer_type`, in declaration order.
    /// An empty list means the type cannot consume events; binding such a
    /// consumer is rejected.
    fn scan(&self, consumer_type: TypeId) -> Vec<HandlerDescriptor>;
}

/// Explicit, map-backed [`HandlerScanner`].
#[derive(Default)]
pub struct HandlerRegistry {
    by_type: HashMap<TypeId, Vec<HandlerDescriptor>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers descriptors for consumer type `C`, appending to any already
    /// registered. Declaration order is preserved.
    pub fn register<C: Any>(&mut self, descriptors: Vec<HandlerDescriptor>) -> &mut Self {
        self.by_type
            .entry(TypeId::of::<C>())
            .or_default()
            .extend(descriptors);
        self
    }

    /// Number of consumer types registered.
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    /// True if nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

impl HandlerScanner for HandlerRegistry {
    fn scan(&self, consumer_type: TypeId) -> Vec<HandlerDescriptor> {
        self.by_type.get(&consumer_type).cloned().unwrap_or_default()
    }
}
