//! # Dispatcher: the single mutating worker.
//!
//! One long-lived task owns the producer→subscriber registry outright; no
//! locks guard it because nothing else may touch it. The loop drains the
//! action queue one item at a time, applies it, and then runs a cleanup pass
//! that prunes handles whose referents have been reclaimed.
//!
//! ## State machine
//! ```text
//! Running ──(action drained)──► Running      process + cleanup pass
//! Running ──(cancel signal)───► Interrupted  report via ErrorHandler
//! Running ──(queue closed)────► Terminated   bus dropped; silent exit
//! Interrupted ────────────────► Terminated   never restarted
//! ```
//!
//! ## Cleanup pass
//! After every processed action: registry entries whose producer is gone are
//! removed whole; dead consumer handles are pruned from every set; sets left
//! empty are removed. This is the liveness-scan substitute for a GC
//! reference queue.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::handle::WeakHandle;
use crate::handlers::ConsumerIndex;
use crate::pool::InvocationPool;
use crate::report::ErrorHandler;
use crate::types::TypeRelations;

use super::action::{BusStats, PendingAction};
use super::queue::{ActionReceiver, Drained};
use super::subscribers::SubscriberSet;

/// Immutable collaborators shared by delivery code.
pub(crate) struct DispatchContext {
    pub(crate) index: ConsumerIndex,
    pub(crate) relations: Arc<TypeRelations>,
    pub(crate) pool: Arc<dyn InvocationPool>,
    pub(crate) errors: Arc<dyn ErrorHandler>,
}

/// Owns the registry and processes actions until cancellation or queue
/// exhaustion.
pub(crate) struct Dispatcher {
    registry: HashMap<WeakHandle, SubscriberSet>,
    ctx: DispatchContext,
}

impl Dispatcher {
    pub(crate) fn new(ctx: DispatchContext) -> Self {
        Self {
            registry: HashMap::new(),
            ctx,
        }
    }

    /// The worker loop. Runs until the cancellation signal (reported as an
    /// interruption, after which the bus is permanently silent) or until
    /// every submitter is gone.
    pub(crate) async fn run(mut self, mut actions: ActionReceiver, cancel: CancellationToken) {
        loop {
            match actions.next(&cancel).await {
                Drained::Action(action) => {
                    tracing::trace!(kind = action.kind_label(), "processing action");
                    self.process(action).await;
                    self.cleanup();
                }
                Drained::Cancelled => {
                    self.ctx.errors.interrupted().await;
                    break;
                }
                Drained::Closed => break,
            }
        }
    }

    async fn process(&mut self, action: PendingAction) {
        match action {
            PendingAction::Bind {
                producer,
                consumer,
                consumer_type,
            } => {
                let handle = WeakHandle::new(&producer);
                let set = self.registry.entry(handle).or_insert_with(SubscriberSet::new);
                if set.add(&consumer, &self.ctx).is_err() {
                    // The caller has long since returned; route the rejection
                    // to the error sink instead.
                    let err = crate::error::BusError::NoHandlerFound {
                        type_name: consumer_type.to_string(),
                    };
                    self.ctx.errors.unhandled("bind rejected", &err.to_string()).await;
                }
            }
            PendingAction::Unbind { producer, consumer } => {
                if let Some(set) = self.registry.get_mut(&WeakHandle::new(&producer)) {
                    set.remove(&consumer);
                }
            }
            PendingAction::Fire {
                producer,
                event,
                tags,
                ..
            } => {
                if let Some(set) = self.registry.get(&WeakHandle::new(&producer)) {
                    set.fire(&producer, &event, &tags, &self.ctx).await;
                }
            }
            PendingAction::Flush { ack } => {
                let _ = ack.send(());
            }
            PendingAction::Stats { reply } => {
                let stats = BusStats {
                    producers: self.registry.len(),
                    subscribers: self.registry.values().map(SubscriberSet::len).sum(),
                };
                let _ = reply.send(stats);
            }
        }
    }

    /// Prunes reclaimed producers and consumers; removes sets left empty.
    fn cleanup(&mut self) {
        self.registry.retain(|producer, set| {
            if !producer.is_alive() {
                return false;
            }
            set.prune();
            !set.is_empty()
        });
    }
}
