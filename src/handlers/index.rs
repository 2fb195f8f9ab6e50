//! # Memoized per-consumer-type descriptor cache.
//!
//! The scanner is consulted at most once per distinct consumer type; the
//! result is frozen into an `Arc` slice and served from the cache forever
//! after. The cache is written from the dispatcher task only, but the
//! compute-once guard makes it safe to share.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::handlers::{HandlerDescriptor, HandlerScanner};

/// Compute-once cache in front of a [`HandlerScanner`].
pub(crate) struct ConsumerIndex {
    scanner: Arc<dyn HandlerScanner>,
    cache: Mutex<HashMap<TypeId, Arc<[HandlerDescriptor]>>>,
}

impl ConsumerIndex {
    pub(crate) fn new(scanner: Arc<dyn HandlerScanner>) -> Self {
        Self {
            scanner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the descriptor list for `consumer_type`, scanning on first
    /// use. An empty slice means the type cannot consume events.
    pub(crate) fn descriptors(&self, consumer_type: TypeId) -> Arc<[HandlerDescriptor]> {
        let mut cache = self.cache.lock().expect("descriptor cache poisoned");
        cache
            .entry(consumer_type)
            .or_insert_with(|| self.scanner.scan(consumer_type).into())
            .clone()
    }
}
