//! # Weak, identity-based handles to producers and consumers.
//!
//! The registry must never keep a producer or consumer alive, so both sides
//! are tracked through [`WeakHandle`]s over type-erased `Arc`s. Identity is
//! the `Arc` allocation pointer, captured at creation:
//!
//! - the hash never changes, even after the referent is dropped;
//! - equality compares allocation pointers, so a handle stays usable as a
//!   registry key for removal after its referent is gone;
//! - the weak count keeps the allocation address stable for the handle's
//!   lifetime, so a recycled address can never alias a live handle.
//!
//! Rust has no GC reference queue; reclamation is observed by the dispatcher's
//! liveness scan (`upgrade` returning `None`) after each processed action.

use std::any::Any;
use std::sync::{Arc, Weak};

/// Shared handle to an arbitrary producer, consumer, or event object.
pub type AnyArc = Arc<dyn Any + Send + Sync>;

/// Weak handle with identity semantics, used as registry key and subscriber
/// entry.
#[derive(Clone)]
pub struct WeakHandle {
    referent: Weak<dyn Any + Send + Sync>,
    /// Allocation pointer captured at creation; stable across the handle's
    /// whole lifetime.
    identity: usize,
}

impl WeakHandle {
    /// Creates a handle tracking `referent` without keeping it alive.
    pub fn new(referent: &AnyArc) -> Self {
        Self {
            referent: Arc::downgrade(referent),
            identity: Arc::as_ptr(referent) as *const () as usize,
        }
    }

    /// Upgrades to a strong reference, or `None` once the referent has been
    /// dropped.
    pub fn get(&self) -> Option<AnyArc> {
        self.referent.upgrade()
    }

    /// True while the referent is still alive.
    pub fn is_alive(&self) -> bool {
        self.referent.strong_count() > 0
    }

    /// True if this handle tracks exactly the given object (pointer identity).
    pub fn refers_to(&self, object: &AnyArc) -> bool {
        self.identity == Arc::as_ptr(object) as *const () as usize
    }
}

impl PartialEq for WeakHandle {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for WeakHandle {}

impl std::hash::Hash for WeakHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_usize(self.identity);
    }
}

impl std::fmt::Debug for WeakHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakHandle")
            .field("identity", &(self.identity as *const ()))
            .field("alive", &self.is_alive())
            .finish()
    }
}
