//! # SubscriberSet: the consumers bound to one producer.
//!
//! Insertion-ordered weak handles. Admission requires the consumer's type to
//! yield at least one handler descriptor; re-adding a present consumer is a
//! no-op. Delivery walks members in insertion order and, per consumer, the
//! event's declared type hierarchy:
//!
//! ```text
//! for each alive consumer (insertion order):
//!     level = event's runtime type
//!     loop:
//!         fire every descriptor matching at `level`     ─ any fired? stop
//!         else try each declared interface of `level`   ─ any fired? stop
//!         else level = declared parent of `level`       ─ none? stop
//! ```
//!
//! The first level that yields any match wins, and every descriptor matching
//! at that level fires; one event can still trigger several handlers on the
//! same consumer. Descriptors match a level by exact event type, so the walk
//! itself is what carries covariance and the early stop is observable: a
//! consumer handling both a subtype and its supertype sees a subtype fire
//! once, at the subtype level.

use std::any::TypeId;

use crate::handle::{AnyArc, WeakHandle};
use crate::handlers::HandlerDescriptor;

use super::dispatcher::DispatchContext;

/// Raised by [`SubscriberSet::add`] when the consumer cannot handle events.
pub(crate) struct NoHandlers;

/// Insertion-ordered set of consumer handles bound to one producer.
#[derive(Default)]
pub(crate) struct SubscriberSet {
    members: Vec<WeakHandle>,
}

impl SubscriberSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Admits `consumer` if its type yields at least one descriptor.
    /// Idempotent: an already-present consumer (by identity) is left alone.
    pub(crate) fn add(&mut self, consumer: &AnyArc, ctx: &DispatchContext) -> Result<(), NoHandlers> {
        let descriptors = ctx.index.descriptors((**consumer).type_id());
        if descriptors.is_empty() {
            return Err(NoHandlers);
        }
        if !self.members.iter().any(|member| member.refers_to(consumer)) {
            self.members.push(WeakHandle::new(consumer));
        }
        Ok(())
    }

    /// Removes `consumer` by identity; no-op if absent.
    pub(crate) fn remove(&mut self, consumer: &AnyArc) {
        self.members.retain(|member| !member.refers_to(consumer));
    }

    /// Drops members whose referent has been reclaimed.
    pub(crate) fn prune(&mut self) {
        self.members.retain(WeakHandle::is_alive);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.members.len()
    }

    /// Fan-out delivery of one event, in insertion order.
    pub(crate) async fn fire(
        &self,
        producer: &AnyArc,
        event: &AnyArc,
        tags: &[Box<str>],
        ctx: &DispatchContext,
    ) {
        let producer_type = (**producer).type_id();

        for member in &self.members {
            let Some(consumer) = member.get() else {
                continue;
            };
            let descriptors = ctx.index.descriptors((*consumer).type_id());
            if descriptors.is_empty() {
                continue;
            }

            self.fire_walk(
                producer,
                producer_type,
                &consumer,
                &descriptors,
                event,
                tags,
                ctx,
            )
            .await;
        }
    }

    /// Walks the event's declared hierarchy for one consumer: the runtime
    /// type, its interfaces, then the parent chain; the first level with any
    /// match wins.
    #[allow(clippy::too_many_arguments)]
    async fn fire_walk(
        &self,
        producer: &AnyArc,
        producer_type: TypeId,
        consumer: &AnyArc,
        descriptors: &[HandlerDescriptor],
        event: &AnyArc,
        tags: &[Box<str>],
        ctx: &DispatchContext,
    ) {
        let mut level = Some((**event).type_id());

        while let Some(current) = level {
            if self
                .fire_level(producer, producer_type, consumer, descriptors, event, current, tags, ctx)
                .await
            {
                return;
            }

            for interface in ctx.relations.interfaces(current) {
                if self
                    .fire_level(
                        producer,
                        producer_type,
                        consumer,
                        descriptors,
                        event,
                        interface.id(),
                        tags,
                        ctx,
                    )
                    .await
                {
                    return;
                }
            }

            level = ctx.relations.parent(current).map(|parent| parent.id());
        }
    }

    /// Fires every descriptor matching the event at one candidate type.
    /// Returns true if any matched.
    #[allow(clippy::too_many_arguments)]
    async fn fire_level(
        &self,
        producer: &AnyArc,
        producer_type: TypeId,
        consumer: &AnyArc,
        descriptors: &[HandlerDescriptor],
        event: &AnyArc,
        candidate: TypeId,
        tags: &[Box<str>],
        ctx: &DispatchContext,
    ) -> bool {
        let mut matched = false;
        for descriptor in descriptors {
            if descriptor.matches(producer_type, candidate, tags, &ctx.relations) {
                matched = true;
                descriptor
                    .invoke(producer, consumer, event, &ctx.pool, &ctx.errors)
                    .await;
            }
        }
        matched
    }
}
