//! # Pending actions: the units the dispatcher processes.
//!
//! Every public call turns into one [`PendingAction`] enqueued for the
//! dispatcher. Producer and payload are owned `Arc`s; the strong references
//! live only until the action is consumed, so enqueued objects are kept
//! alive just long enough to be processed.

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::handle::AnyArc;

/// Registry counters returned by [`EventBus::stats`](crate::EventBus::stats).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusStats {
    /// Producers currently holding a subscriber set.
    pub producers: usize,
    /// Live subscriptions across all producers.
    pub subscribers: usize,
}

/// One queued request, consumed exactly once by the dispatcher.
pub(crate) enum PendingAction {
    /// Associate `consumer` with `producer`.
    Bind {
        producer: AnyArc,
        consumer: AnyArc,
        /// Consumer's type name, captured at submission for error reports.
        consumer_type: &'static str,
    },
    /// Dissolve the association; no-op if absent.
    Unbind { producer: AnyArc, consumer: AnyArc },
    /// Deliver `event` to every matching consumer bound to `producer`.
    Fire {
        producer: AnyArc,
        event: AnyArc,
        tags: Box<[Box<str>]>,
        /// Earliest instant the dispatcher may process this action.
        not_before: Option<Instant>,
    },
    /// Barrier: acknowledged once every earlier action has been processed.
    Flush { ack: oneshot::Sender<()> },
    /// Registry introspection.
    Stats { reply: oneshot::Sender<BusStats> },
}

impl PendingAction {
    /// The delay gate, if any. Only `Fire` actions can be deferred.
    pub(crate) fn not_before(&self) -> Option<Instant> {
        match self {
            PendingAction::Fire { not_before, .. } => *not_before,
            _ => None,
        }
    }

    /// Short label for trace output.
    pub(crate) fn kind_label(&self) -> &'static str {
        match self {
            PendingAction::Bind { .. } => "bind",
            PendingAction::Unbind { .. } => "unbind",
            PendingAction::Fire { .. } => "fire",
            PendingAction::Flush { .. } => "flush",
            PendingAction::Stats { .. } => "stats",
        }
    }
}
