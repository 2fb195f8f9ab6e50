//! # Handler descriptors: matching predicate and invocation capability.
//!
//! A [`HandlerDescriptor`] is the immutable description of one consumer
//! handler: which producer types it accepts (empty = any), which event types
//! it accepts (never empty), optional tag filters, and whether it runs inline
//! on the dispatcher or on the invocation pool.
//!
//! ## Matching
//! ```text
//! matches(producer_type, event_type, tags):
//!   producer check: producer_types empty, or some member is an ancestor
//!                   of the runtime producer type (covariant)
//!   event check:    some member is exactly the candidate type; covariance
//!                   over events comes from the delivery walk, one level
//!                   at a time
//!   tag check:      any_tags (if set) intersects the supplied tags
//!                   each_tags (if set) is a subset of the supplied tags
//! ```
//!
//! ## Construction
//! Descriptors are built, not scanned: typed constructors bind a closure over
//! concrete parameter types, `dyn` constructors hand the handler the erased
//! `Arc` so covariant handlers can inspect subtypes themselves. Explicit
//! event/producer overrides are validated against the declared parameter type
//! when the builder finishes; invalid combinations are build-time errors.
//!
//! ## Rules
//! - A typed handler bound with event type `E` only downcasts events that are
//!   exactly `E`; deliveries routed to it through a declared subtype relation
//!   are reported as `InvalidArgument`. Use a `dyn` constructor for handlers
//!   that accept a declared supertype.
//! - Failures never escape: handler errors and panics are caught, classified,
//!   and reported through the [`ErrorHandler`](crate::ErrorHandler).

use std::any::{Any, TypeId};
use std::collections::HashSet;
use std::sync::Arc;

use futures::FutureExt;

use crate::error::{DescriptorError, HandlerError};
use crate::handle::AnyArc;
use crate::pool::{InvocationJob, InvocationPool};
use crate::report::{ErrorHandler, FailureKind, InvocationFailure};
use crate::types::{TypeRelations, TypeTag};

/// How a matched handler is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvokeMode {
    /// On the dispatcher task; a slow handler stalls the whole bus.
    #[default]
    Inline,
    /// Submitted to the invocation pool; the dispatcher moves on immediately.
    Pooled,
}

/// Type-erased call capability bound to one consumer handler.
///
/// Arguments are `(producer, consumer, event)`.
pub(crate) type HandlerCall =
    Arc<dyn Fn(&AnyArc, &AnyArc, &AnyArc) -> Result<(), HandlerError> + Send + Sync>;

/// Return-type adapter for handler closures: infallible handlers return `()`,
/// fallible ones return a boxed error `Result`.
pub trait HandlerOutcome {
    fn into_handler_result(self) -> Result<(), HandlerError>;
}

impl HandlerOutcome for () {
    fn into_handler_result(self) -> Result<(), HandlerError> {
        Ok(())
    }
}

impl HandlerOutcome for Result<(), Box<dyn std::error::Error + Send + Sync>> {
    fn into_handler_result(self) -> Result<(), HandlerError> {
        self.map_err(HandlerError::Failed)
    }
}

/// Immutable description of one consumer handler.
#[derive(Clone)]
pub struct HandlerDescriptor {
    name: &'static str,
    /// Accepted producer types; empty means any producer.
    producer_types: Vec<TypeTag>,
    /// Accepted event types; never empty.
    event_types: Vec<TypeTag>,
    /// If present, the fired tag set must intersect this set.
    any_tags: Option<HashSet<Box<str>>>,
    /// If present, the fired tag set must contain every member.
    each_tags: Option<HashSet<Box<str>>>,
    mode: InvokeMode,
    call: HandlerCall,
}

impl HandlerDescriptor {
    /// Binds a handler over concrete consumer and event types. The declared
    /// event type defaults the descriptor's event set.
    pub fn on<C, E, F, R>(name: &'static str, handler: F) -> DescriptorBuilder
    where
        C: Any + Send + Sync,
        E: Any + Send + Sync,
        R: HandlerOutcome,
        F: Fn(&C, &E) -> R + Send + Sync + 'static,
    {
        let call: HandlerCall = Arc::new(move |_producer, consumer, event| {
            let consumer = downcast::<C>(consumer)?;
            let event = downcast::<E>(event)?;
            handler(consumer, event).into_handler_result()
        });
        DescriptorBuilder::new(name, call, Some(TypeTag::of::<E>()), None)
    }

    /// Like [`HandlerDescriptor::on`], with the producer as an additional
    /// typed parameter. The declared producer type defaults the descriptor's
    /// producer set.
    pub fn on_with_producer<C, P, E, F, R>(name: &'static str, handler: F) -> DescriptorBuilder
    where
        C: Any + Send + Sync,
        P: Any + Send + Sync,
        E: Any + Send + Sync,
        R: HandlerOutcome,
        F: Fn(&C, &P, &E) -> R + Send + Sync + 'static,
    {
        let call: HandlerCall = Arc::new(move |producer, consumer, event| {
            let consumer = downcast::<C>(consumer)?;
            let producer = downcast::<P>(producer)?;
            let event = downcast::<E>(event)?;
            handler(consumer, producer, event).into_handler_result()
        });
        DescriptorBuilder::new(
            name,
            call,
            Some(TypeTag::of::<E>()),
            Some(TypeTag::of::<P>()),
        )
    }

    /// Binds a handler that receives the event as an erased `Arc`, for
    /// handlers declared over a supertype of several concrete event types.
    /// At least one `event::<T>()` declaration is required before `build`.
    pub fn on_dyn<C, F, R>(name: &'static str, handler: F) -> DescriptorBuilder
    where
        C: Any + Send + Sync,
        R: HandlerOutcome,
        F: Fn(&C, &AnyArc) -> R + Send + Sync + 'static,
    {
        let call: HandlerCall = Arc::new(move |_producer, consumer, event| {
            let consumer = downcast::<C>(consumer)?;
            handler(consumer, event).into_handler_result()
        });
        DescriptorBuilder::new(name, call, None, None)
    }

    /// Like [`HandlerDescriptor::on_dyn`], with the producer passed as an
    /// erased `Arc` as well.
    pub fn on_dyn_with_producer<C, F, R>(name: &'static str, handler: F) -> DescriptorBuilder
    where
        C: Any + Send + Sync,
        R: HandlerOutcome,
        F: Fn(&C, &AnyArc, &AnyArc) -> R + Send + Sync + 'static,
    {
        let call: HandlerCall = Arc::new(move |producer, consumer, event| {
            let consumer = downcast::<C>(consumer)?;
            handler(consumer, producer, event).into_handler_result()
        });
        DescriptorBuilder::new(name, call, None, None)
    }

    /// Name the descriptor was registered under.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Invocation mode.
    #[inline]
    pub fn mode(&self) -> InvokeMode {
        self.mode
    }

    /// Accepted event types.
    pub fn event_types(&self) -> &[TypeTag] {
        &self.event_types
    }

    /// Accepted producer types; empty means any producer.
    pub fn producer_types(&self) -> &[TypeTag] {
        &self.producer_types
    }

    /// The three-way matching predicate: producer assignability, exact event
    /// type, and tag filters must all hold. `event_type` is one candidate
    /// level of the delivery walk, which is what supplies event covariance;
    /// matching it loosely here would let ancestor-level descriptors fire at
    /// every level at once.
    pub fn matches(
        &self,
        producer_type: TypeId,
        event_type: TypeId,
        tags: &[Box<str>],
        relations: &TypeRelations,
    ) -> bool {
        self.producer_matches(producer_type, relations)
            && self.event_matches(event_type)
            && self.tags_match(tags)
    }

    fn producer_matches(&self, producer_type: TypeId, relations: &TypeRelations) -> bool {
        self.producer_types.is_empty()
            || self
                .producer_types
                .iter()
                .any(|declared| relations.is_assignable(*declared, producer_type))
    }

    fn event_matches(&self, event_type: TypeId) -> bool {
        self.event_types
            .iter()
            .any(|declared| declared.id() == event_type)
    }

    fn tags_match(&self, tags: &[Box<str>]) -> bool {
        if let Some(any) = &self.any_tags {
            if !tags.iter().any(|tag| any.contains(tag.as_ref())) {
                return false;
            }
        }
        if let Some(each) = &self.each_tags {
            if !each
                .iter()
                .all(|needed| tags.iter().any(|tag| tag == needed))
            {
                return false;
            }
        }
        true
    }

    /// Runs the handler inline, or submits it to the pool for `Pooled` mode.
    pub(crate) async fn invoke(
        &self,
        producer: &AnyArc,
        consumer: &AnyArc,
        event: &AnyArc,
        pool: &Arc<dyn InvocationPool>,
        errors: &Arc<dyn ErrorHandler>,
    ) {
        match self.mode {
            InvokeMode::Pooled => pool.submit(InvocationJob::new(
                self.name,
                self.call.clone(),
                producer.clone(),
                consumer.clone(),
                event.clone(),
                errors.clone(),
            )),
            InvokeMode::Inline => {
                run_call(self.name, &self.call, producer, consumer, event, errors).await;
            }
        }
    }
}

impl std::fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("name", &self.name)
            .field("producer_types", &self.producer_types)
            .field("event_types", &self.event_types)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

fn downcast<'a, T: Any>(payload: &'a AnyArc) -> Result<&'a T, HandlerError> {
    (**payload)
        .downcast_ref::<T>()
        .ok_or(HandlerError::InvalidArgument {
            expected: std::any::type_name::<T>(),
        })
}

/// Calls the capability with panic isolation and reports any failure.
/// Shared by inline invocation and the pool workers.
pub(crate) async fn run_call(
    name: &'static str,
    call: &HandlerCall,
    producer: &AnyArc,
    consumer: &AnyArc,
    event: &AnyArc,
    errors: &Arc<dyn ErrorHandler>,
) {
    let outcome = std::panic::AssertUnwindSafe(async { call(producer, consumer, event) })
        .catch_unwind()
        .await;

    let (kind, detail) = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(err @ HandlerError::InvalidArgument { .. })) => {
            (FailureKind::InvalidArgument, err.to_string())
        }
        Ok(Err(err)) => (FailureKind::InvocationFailure, err.to_string()),
        Err(panic) => (FailureKind::Unhandled, panic_message(&panic)),
    };

    errors
        .invocation_failed(InvocationFailure {
            handler: name,
            kind,
            detail,
            producer: producer.clone(),
            consumer: consumer.clone(),
            event: event.clone(),
        })
        .await;
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// Builder for [`HandlerDescriptor`]; finished with
/// [`DescriptorBuilder::build`], which validates overrides against the
/// declared parameter types.
pub struct DescriptorBuilder {
    name: &'static str,
    call: HandlerCall,
    declared_event: Option<TypeTag>,
    declared_producer: Option<TypeTag>,
    event_overrides: Vec<TypeTag>,
    producer_overrides: Vec<TypeTag>,
    any_tags: Vec<Box<str>>,
    each_tags: Vec<Box<str>>,
    mode: InvokeMode,
}

impl DescriptorBuilder {
    fn new(
        name: &'static str,
        call: HandlerCall,
        declared_event: Option<TypeTag>,
        declared_producer: Option<TypeTag>,
    ) -> Self {
        Self {
            name,
            call,
            declared_event,
            declared_producer,
            event_overrides: Vec::new(),
            producer_overrides: Vec::new(),
            any_tags: Vec::new(),
            each_tags: Vec::new(),
            mode: InvokeMode::Inline,
        }
    }

    /// Declares an accepted event type. For typed handlers this overrides the
    /// parameter type and must be assignable to it.
    pub fn event<T: Any>(mut self) -> Self {
        push_unique(&mut self.event_overrides, TypeTag::of::<T>());
        self
    }

    /// Declares an accepted producer type. For handlers with a typed producer
    /// parameter this overrides it and must be assignable to it.
    pub fn producer<T: Any>(mut self) -> Self {
        push_unique(&mut self.producer_overrides, TypeTag::of::<T>());
        self
    }

    /// Requires the fired tag set to contain at least one of the tags added
    /// through this method.
    pub fn any_tag(mut self, tag: impl Into<String>) -> Self {
        self.any_tags.push(tag.into().into_boxed_str());
        self
    }

    /// Requires the fired tag set to contain every tag added through this
    /// method.
    pub fn each_tag(mut self, tag: impl Into<String>) -> Self {
        self.each_tags.push(tag.into().into_boxed_str());
        self
    }

    /// Marks the handler for pooled execution.
    pub fn pooled(mut self) -> Self {
        self.mode = InvokeMode::Pooled;
        self
    }

    /// Validates the declaration and produces the descriptor.
    pub fn build(self, relations: &TypeRelations) -> Result<HandlerDescriptor, DescriptorError> {
        let event_types = if self.event_overrides.is_empty() {
            vec![self
                .declared_event
                .ok_or(DescriptorError::NoEventTypes { handler: self.name })?]
        } else {
            if let Some(declared) = self.declared_event {
                for requested in &self.event_overrides {
                    if !relations.is_assignable(declared, requested.id()) {
                        return Err(DescriptorError::EventNotAssignable {
                            handler: self.name,
                            declared: declared.name(),
                            requested: requested.name(),
                        });
                    }
                }
            }
            self.event_overrides
        };

        let producer_types = if self.producer_overrides.is_empty() {
            self.declared_producer.into_iter().collect()
        } else {
            if let Some(declared) = self.declared_producer {
                for requested in &self.producer_overrides {
                    if !relations.is_assignable(declared, requested.id()) {
                        return Err(DescriptorError::ProducerNotAssignable {
                            handler: self.name,
                            declared: declared.name(),
                            requested: requested.name(),
                        });
                    }
                }
            }
            self.producer_overrides
        };

        Ok(HandlerDescriptor {
            name: self.name,
            producer_types,
            event_types,
            any_tags: to_tag_set(self.any_tags),
            each_tags: to_tag_set(self.each_tags),
            mode: self.mode,
            call: self.call,
        })
    }
}

fn push_unique(tags: &mut Vec<TypeTag>, tag: TypeTag) {
    if !tags.contains(&tag) {
        tags.push(tag);
    }
}

fn to_tag_set(tags: Vec<Box<str>>) -> Option<HashSet<Box<str>>> {
    if tags.is_empty() {
        None
    } else {
        Some(tags.into_iter().collect())
    }
}
