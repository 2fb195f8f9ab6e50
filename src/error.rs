//! Error types used by the bus runtime and handler invocation.
//!
//! This module defines three error enums:
//!
//! - [`BusError`] — errors surfaced by the bus itself (synchronous argument
//!   checks and deferred bind validation).
//! - [`DescriptorError`] — construction-time validation failures for
//!   [`HandlerDescriptor`](crate::HandlerDescriptor) builders.
//! - [`HandlerError`] — per-invocation failures raised while calling a handler.
//!
//! All types provide `as_label()` for stable snake_case labels in logs/metrics.

use thiserror::Error;

/// # Errors produced by the bus runtime.
///
/// Synchronous checks (`enable()` without a prior `disable()`) return these
/// directly. Failures discovered only once an action reaches the dispatcher
/// (a bind for a consumer type with no handlers) are routed to the
/// [`ErrorHandler`](crate::ErrorHandler) instead, since the caller has
/// already returned.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BusError {
    /// `enable()` was called on a thread whose suppression counter is zero.
    #[error("events are not disabled for the current thread")]
    NotDisabled,

    /// A bind named a consumer whose type yields zero handler descriptors.
    #[error("no event handler found for consumer type {type_name}")]
    NoHandlerFound {
        /// Best-effort name of the offending consumer type.
        type_name: String,
    },
}

impl BusError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::NotDisabled => "events_not_disabled",
            BusError::NoHandlerFound { .. } => "no_handler_found",
        }
    }
}

/// # Construction-time validation failures for handler descriptors.
///
/// A descriptor that would only fail at delivery time in a dynamic language
/// is rejected when it is built: explicit event/producer overrides must be
/// assignable to the declared parameter type, and the event type set must
/// never be empty.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DescriptorError {
    /// An explicit event override is not assignable to the declared event
    /// parameter type.
    #[error("handler {handler}: event override {requested} is not assignable to {declared}")]
    EventNotAssignable {
        handler: &'static str,
        declared: &'static str,
        requested: &'static str,
    },

    /// An explicit producer override is not assignable to the declared
    /// producer parameter type.
    #[error("handler {handler}: producer override {requested} is not assignable to {declared}")]
    ProducerNotAssignable {
        handler: &'static str,
        declared: &'static str,
        requested: &'static str,
    },

    /// A dynamically-typed handler was built without declaring any event type.
    #[error("handler {handler} declares no event types")]
    NoEventTypes { handler: &'static str },
}

impl DescriptorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DescriptorError::EventNotAssignable { .. } => "event_not_assignable",
            DescriptorError::ProducerNotAssignable { .. } => "producer_not_assignable",
            DescriptorError::NoEventTypes { .. } => "no_event_types",
        }
    }
}

/// # Failures raised while calling one handler.
///
/// Returned by the bound call capability of a
/// [`HandlerDescriptor`](crate::HandlerDescriptor); never propagated past the
/// dispatcher. The dispatcher (or a pool worker) classifies and reports these
/// through the [`ErrorHandler`](crate::ErrorHandler) contract.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum HandlerError {
    /// A producer, consumer, or event payload did not downcast to the type
    /// the handler was bound with.
    #[error("payload is not a {expected}")]
    InvalidArgument {
        /// Name of the concrete type the handler expected.
        expected: &'static str,
    },

    /// The handler body ran and returned an error.
    #[error(transparent)]
    Failed(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            HandlerError::InvalidArgument { .. } => "invalid_argument",
            HandlerError::Failed(_) => "invocation_failed",
        }
    }
}
