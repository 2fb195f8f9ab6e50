//! Handler descriptors, discovery, and the per-type cache.
//!
//! ## Contents
//! - [`HandlerDescriptor`] — matching predicate + invocation capability for
//!   one consumer handler, built through [`DescriptorBuilder`];
//! - [`HandlerScanner`] / [`HandlerRegistry`] — the discovery seam and the
//!   shipped explicit-registration implementation;
//! - `ConsumerIndex` — internal memoized per-consumer-type cache.

mod descriptor;
mod index;
mod scanner;

pub use descriptor::{DescriptorBuilder, HandlerDescriptor, HandlerOutcome, InvokeMode};
pub use scanner::{HandlerRegistry, HandlerScanner};

pub(crate) use descriptor::{run_call, HandlerCall};
pub(crate) use index::ConsumerIndex;
