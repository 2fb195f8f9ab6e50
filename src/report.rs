//! # Error reporting contract for asynchronous failures.
//!
//! Everything that happens after an action is enqueued is only observable
//! through the [`ErrorHandler`] collaborator: handler invocation failures,
//! deferred bind rejections, and dispatcher interruption. Implementations are
//! called from the dispatcher task and from pool workers; they must never
//! panic.
//!
//! The default implementation, [`LogErrorHandler`], writes structured records
//! through `tracing`.

use async_trait::async_trait;

use crate::handle::AnyArc;

/// Classification of a failed handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A payload did not downcast to the type the handler was bound with.
    InvalidArgument,
    /// The handler body ran and returned an error.
    InvocationFailure,
    /// The handler body panicked.
    Unhandled,
}

impl FailureKind {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            FailureKind::InvalidArgument => "invalid_argument",
            FailureKind::InvocationFailure => "invocation_failure",
            FailureKind::Unhandled => "unhandled",
        }
    }
}

/// Everything known about one failed handler invocation.
///
/// The producer/consumer/event references are the same `Arc`s the dispatcher
/// delivered with, so sinks may downcast them for richer reports.
pub struct InvocationFailure {
    /// Name the descriptor was registered under.
    pub handler: &'static str,
    /// Failure classification.
    pub kind: FailureKind,
    /// Human-readable failure detail (error display or panic message).
    pub detail: String,
    /// Producer the event was fired from.
    pub producer: AnyArc,
    /// Consumer whose handler failed.
    pub consumer: AnyArc,
    /// The event being delivered.
    pub event: AnyArc,
}

/// Contract for failure sinks.
///
/// Called from the dispatcher task (inline handlers, deferred bind failures,
/// interruption) and from pool workers (pooled handlers).
#[async_trait]
pub trait ErrorHandler: Send + Sync + 'static {
    /// A handler invocation failed; the failure was caught and classified.
    async fn invocation_failed(&self, failure: InvocationFailure);

    /// A failure occurred while processing an action, outside any handler
    /// body (e.g. a deferred bind for a consumer type with no handlers).
    async fn unhandled(&self, message: &str, detail: &str);

    /// The dispatcher received the cancellation signal and is terminating.
    /// The bus will not deliver any further events.
    async fn interrupted(&self);
}

/// Default sink: structured records via `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorHandler;

#[async_trait]
impl ErrorHandler for LogErrorHandler {
    async fn invocation_failed(&self, failure: InvocationFailure) {
        tracing::error!(
            handler = failure.handler,
            kind = failure.kind.as_label(),
            detail = %failure.detail,
            "event handler invocation failed"
        );
    }

    async fn unhandled(&self, message: &str, detail: &str) {
        tracing::error!(%detail, "{message}");
    }

    async fn interrupted(&self) {
        tracing::warn!("event dispatcher interrupted; bus will no longer deliver events");
    }
}
