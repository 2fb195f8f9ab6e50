//! Runtime core: the serialized action processor.
//!
//! Internal modules:
//! - [`action`]: pending actions and registry stats;
//! - [`queue`]: many-producer/single-consumer delay-aware action queue;
//! - [`dispatcher`]: the single worker owning the registry;
//! - [`subscribers`]: per-producer subscriber sets and fan-out delivery;
//! - [`suppress`]: per-thread suppression counters.
//!
//! The only public item from this module is [`BusStats`].

pub(crate) mod action;
pub(crate) mod dispatcher;
pub(crate) mod queue;
pub(crate) mod subscribers;
pub(crate) mod suppress;

pub use action::BusStats;
