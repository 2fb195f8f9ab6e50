//! # EventBus: the public facade.
//!
//! An [`EventBus`] owns one dispatcher task and one invocation pool. Every
//! public call is turned into an action and enqueued; the dispatcher applies
//! actions strictly one at a time, so callers never contend on the registry
//! and never observe it mid-mutation.
//!
//! ## Architecture
//! ```text
//!   bind / unbind / fire ──► [action queue] ──► dispatcher task
//!   (any thread, non-blocking)                    │    owns registry
//!                                                 │    walks hierarchy
//!                                                 ▼
//!                                   inline handlers │ pooled handlers
//!                                   (on dispatcher) │ (worker pool)
//! ```
//!
//! ## Rules
//! - The bus holds producers and consumers weakly; dropping the last outside
//!   `Arc` unsubscribes the object, no unbind call required.
//! - `bind`/`unbind`/`fire` return before the action is processed. Failures
//!   surface through the configured [`ErrorHandler`], never at the call site.
//! - `fire` variants return the producer reference so calls can be chained.
//! - [`EventBus::disable`] suppresses fires from the current thread only, and
//!   is reentrant; each `disable` needs a matching [`EventBus::enable`].
//! - After [`EventBus::shutdown`] the bus is permanently silent.

use std::any::Any;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::action::{BusStats, PendingAction};
use crate::core::dispatcher::{DispatchContext, Dispatcher};
use crate::core::queue::{self, ActionQueue};
use crate::core::suppress;
use crate::error::BusError;
use crate::handle::AnyArc;
use crate::handlers::{ConsumerIndex, HandlerScanner};
use crate::pool::{InvocationPool, WorkerPool};
use crate::report::{ErrorHandler, LogErrorHandler};
use crate::types::TypeRelations;

/// Asynchronous publish/subscribe bus with weak registration.
///
/// Create one with [`EventBus::builder`]; drop it (or call
/// [`EventBus::shutdown`]) to stop delivery. The bus is `Send + Sync` and is
/// typically shared behind an `Arc`.
pub struct EventBus {
    queue: ActionQueue,
    cancel: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl EventBus {
    /// Starts configuring a bus around a handler scanner.
    pub fn builder(scanner: impl HandlerScanner) -> EventBusBuilder {
        EventBusBuilder {
            scanner: Arc::new(scanner),
            relations: None,
            errors: None,
            pool: None,
            workers: WorkerPool::DEFAULT_WORKERS,
        }
    }

    /// Associates `consumer` with `producer`: events fired from `producer`
    /// are delivered to `consumer`'s matching handlers until either side is
    /// dropped or [`EventBus::unbind`] is called.
    ///
    /// Both references are held weakly. Binding the same pair twice is a
    /// no-op; binding a consumer whose type yields no handler descriptors is
    /// reported through the error handler.
    pub fn bind<'a, P, C>(&self, producer: &'a Arc<P>, consumer: &Arc<C>) -> &'a Arc<P>
    where
        P: Any + Send + Sync,
        C: Any + Send + Sync,
    {
        self.submit(PendingAction::Bind {
            producer: producer.clone(),
            consumer: consumer.clone(),
            consumer_type: std::any::type_name::<C>(),
        });
        producer
    }

    /// Dissolves the association; a no-op if the pair was never bound.
    pub fn unbind<'a, P, C>(&self, producer: &'a Arc<P>, consumer: &Arc<C>) -> &'a Arc<P>
    where
        P: Any + Send + Sync,
        C: Any + Send + Sync,
    {
        self.submit(PendingAction::Unbind {
            producer: producer.clone(),
            consumer: consumer.clone(),
        });
        producer
    }

    /// Fires `event` from `producer`, delivering to every bound consumer with
    /// a matching handler. Returns immediately; delivery is asynchronous.
    ///
    /// Dropped silently while the current thread is disabled.
    pub fn fire<'a, P, E>(&self, producer: &'a Arc<P>, event: E) -> &'a Arc<P>
    where
        P: Any + Send + Sync,
        E: Any + Send + Sync,
    {
        self.fire_erased(producer, Arc::new(event), Box::new([]), None);
        producer
    }

    /// Like [`EventBus::fire`], additionally carrying tags for handlers with
    /// tag filters. Handlers without filters still receive the event.
    pub fn fire_tagged<'a, P, E>(&self, producer: &'a Arc<P>, event: E, tags: &[&str]) -> &'a Arc<P>
    where
        P: Any + Send + Sync,
        E: Any + Send + Sync,
    {
        self.fire_erased(producer, Arc::new(event), collect_tags(tags), None);
        producer
    }

    /// Fires `event` no earlier than `delay` from now. Suppression is checked
    /// at this call, not at the trigger time.
    pub fn fire_later<'a, P, E>(&self, producer: &'a Arc<P>, event: E, delay: Duration) -> &'a Arc<P>
    where
        P: Any + Send + Sync,
        E: Any + Send + Sync,
    {
        self.fire_erased(
            producer,
            Arc::new(event),
            Box::new([]),
            Some(Instant::now() + delay),
        );
        producer
    }

    fn fire_erased(
        &self,
        producer: &Arc<impl Any + Send + Sync>,
        event: AnyArc,
        tags: Box<[Box<str>]>,
        not_before: Option<Instant>,
    ) {
        if suppress::is_disabled() {
            tracing::trace!("events disabled on this thread; fire dropped");
            return;
        }
        self.submit(PendingAction::Fire {
            producer: producer.clone(),
            event,
            tags,
            not_before,
        });
    }

    /// Suppresses all fires submitted from the current thread. Reentrant:
    /// each call needs a matching [`EventBus::enable`].
    pub fn disable() {
        suppress::disable();
    }

    /// Lifts one level of suppression on the current thread.
    ///
    /// # Errors
    /// [`BusError::NotDisabled`] if events are not disabled on this thread.
    pub fn enable() -> Result<(), BusError> {
        suppress::enable()
    }

    /// True while events are disabled on the current thread.
    pub fn is_disabled() -> bool {
        suppress::is_disabled()
    }

    /// Waits until every action submitted before this call has been
    /// processed. Delayed fires not yet due are not waited for.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.submit(PendingAction::Flush { ack }) {
            let _ = done.await;
        }
    }

    /// Snapshot of the registry counters. Like every other call this is an
    /// enqueued action; pair it with [`EventBus::flush`] when the snapshot
    /// must reflect earlier submissions.
    pub async fn stats(&self) -> BusStats {
        let (reply, received) = oneshot::channel();
        if self.submit(PendingAction::Stats { reply }) {
            if let Ok(stats) = received.await {
                return stats;
            }
        }
        BusStats {
            producers: 0,
            subscribers: 0,
        }
    }

    /// Stops the dispatcher and waits for it to exit. Actions still queued
    /// are discarded; the interruption is reported through the error handler.
    /// Subsequent calls on the bus are silently dropped.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self
            .dispatcher
            .lock()
            .expect("dispatcher handle poisoned")
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    fn submit(&self, action: PendingAction) -> bool {
        let accepted = self.queue.submit(action);
        if !accepted {
            tracing::debug!("bus is shut down; action dropped");
        }
        accepted
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn collect_tags(tags: &[&str]) -> Box<[Box<str>]> {
    tags.iter().map(|tag| Box::from(*tag)).collect()
}

/// Configures and starts an [`EventBus`].
pub struct EventBusBuilder {
    scanner: Arc<dyn HandlerScanner>,
    relations: Option<Arc<TypeRelations>>,
    errors: Option<Arc<dyn ErrorHandler>>,
    pool: Option<Arc<dyn InvocationPool>>,
    workers: usize,
}

impl EventBusBuilder {
    /// Supertype relations used for covariant matching. Defaults to the empty
    /// registry (exact-type matching only).
    pub fn relations(mut self, relations: Arc<TypeRelations>) -> Self {
        self.relations = Some(relations);
        self
    }

    /// Sink for asynchronous failures. Defaults to [`LogErrorHandler`].
    pub fn error_handler(mut self, errors: impl ErrorHandler) -> Self {
        self.errors = Some(Arc::new(errors));
        self
    }

    /// Custom executor for handlers marked `Pooled`. Replaces the built-in
    /// worker pool.
    pub fn pool(mut self, pool: Arc<dyn InvocationPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Worker count for the built-in pool. Ignored when a custom pool is
    /// supplied.
    pub fn pool_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Spawns the dispatcher (and the built-in pool, unless replaced) and
    /// returns the running bus. Requires a Tokio runtime.
    pub fn build(self) -> EventBus {
        let relations = self.relations.unwrap_or_else(|| Arc::new(TypeRelations::empty()));
        let errors = self
            .errors
            .unwrap_or_else(|| Arc::new(LogErrorHandler) as Arc<dyn ErrorHandler>);
        let pool = self
            .pool
            .unwrap_or_else(|| Arc::new(WorkerPool::spawn(self.workers)) as Arc<dyn InvocationPool>);

        let (queue, receiver) = queue::channel();
        let cancel = CancellationToken::new();

        let dispatcher = Dispatcher::new(DispatchContext {
            index: ConsumerIndex::new(self.scanner),
            relations,
            pool,
            errors,
        });
        let handle = tokio::spawn(dispatcher.run(receiver, cancel.clone()));

        EventBus {
            queue,
            cancel,
            dispatcher: Mutex::new(Some(handle)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{HandlerDescriptor, HandlerRegistry};
    use crate::report::InvocationFailure;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct Recorder {
        seen: StdMutex<Vec<String>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: StdMutex::new(Vec::new()),
            })
        }

        fn record(&self, entry: impl Into<String>) {
            self.seen.lock().unwrap().push(entry.into());
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    fn string_recorder_bus() -> EventBus {
        let rel = TypeRelations::empty();
        let mut registry = HandlerRegistry::new();
        registry.register::<Recorder>(vec![HandlerDescriptor::on::<Recorder, String, _, _>(
            "on_string",
            |c: &Recorder, e: &String| c.record(e.clone()),
        )
        .build(&rel)
        .unwrap()]);
        EventBus::builder(registry).build()
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_only_matching_event_types_are_delivered() {
        let bus = string_recorder_bus();
        let producer = Arc::new(());
        let consumer = Recorder::new();

        bus.bind(&producer, &consumer);
        bus.fire(&producer, 42u32);
        bus.fire(&producer, String::from("kaboom"));
        bus.flush().await;

        assert_eq!(consumer.seen(), vec!["kaboom"]);
        bus.shutdown().await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_bind_is_idempotent() {
        let bus = string_recorder_bus();
        let producer = Arc::new(());
        let consumer = Recorder::new();

        bus.bind(&producer, &consumer);
        bus.bind(&producer, &consumer);
        bus.fire(&producer, String::from("once"));
        bus.flush().await;

        assert_eq!(consumer.seen(), vec!["once"]);
        assert_eq!(
            bus.stats().await,
            BusStats {
                producers: 1,
                subscribers: 1
            }
        );
        bus.shutdown().await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_actions_apply_in_submission_order() {
        let bus = string_recorder_bus();
        let producer = Arc::new(());
        let early = Recorder::new();
        let late = Recorder::new();

        bus.bind(&producer, &early);
        bus.fire(&producer, String::from("first"));
        bus.bind(&producer, &late);
        bus.fire(&producer, String::from("second"));
        bus.flush().await;

        assert_eq!(early.seen(), vec!["first", "second"]);
        assert_eq!(late.seen(), vec!["second"]);
        bus.shutdown().await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_unbind_stops_delivery() {
        let bus = string_recorder_bus();
        let producer = Arc::new(());
        let consumer = Recorder::new();

        bus.bind(&producer, &consumer);
        bus.fire(&producer, String::from("kept"));
        bus.unbind(&producer, &consumer);
        bus.fire(&producer, String::from("dropped"));
        bus.flush().await;

        assert_eq!(consumer.seen(), vec!["kept"]);
        bus.shutdown().await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_dropped_consumer_is_pruned() {
        let bus = string_recorder_bus();
        let producer = Arc::new(());
        let consumer = Recorder::new();

        bus.bind(&producer, &consumer);
        bus.flush().await;
        assert_eq!(
            bus.stats().await,
            BusStats {
                producers: 1,
                subscribers: 1
            }
        );

        drop(consumer);
        // Any processed action triggers the cleanup pass.
        bus.flush().await;
        assert_eq!(
            bus.stats().await,
            BusStats {
                producers: 0,
                subscribers: 0
            }
        );
        bus.shutdown().await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_dropped_producer_releases_its_set() {
        let bus = string_recorder_bus();
        let producer = Arc::new(());
        let consumer = Recorder::new();

        bus.bind(&producer, &consumer);
        bus.flush().await;
        drop(producer);
        bus.flush().await;

        assert_eq!(
            bus.stats().await,
            BusStats {
                producers: 0,
                subscribers: 0
            }
        );
        bus.shutdown().await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_disable_suppresses_fires_on_this_thread() {
        let bus = string_recorder_bus();
        let producer = Arc::new(());
        let consumer = Recorder::new();
        bus.bind(&producer, &consumer);

        EventBus::disable();
        assert!(EventBus::is_disabled());
        bus.fire(&producer, String::from("silenced"));

        EventBus::disable();
        EventBus::enable().unwrap();
        // Still one level deep.
        bus.fire(&producer, String::from("also silenced"));
        EventBus::enable().unwrap();
        assert!(!EventBus::is_disabled());

        bus.fire(&producer, String::from("audible"));
        bus.flush().await;

        assert_eq!(consumer.seen(), vec!["audible"]);
        assert!(matches!(EventBus::enable(), Err(BusError::NotDisabled)));
        bus.shutdown().await;
    }

    struct NumberEvent;
    struct IntegerEvent;
    struct DoubleEvent;

    #[tokio::test(flavor = "current_thread")]
    async fn test_declared_subtypes_reach_supertype_handlers() {
        let relations = Arc::new(
            TypeRelations::builder()
                .extends::<IntegerEvent, NumberEvent>()
                .extends::<DoubleEvent, NumberEvent>()
                .build(),
        );
        let mut registry = HandlerRegistry::new();
        registry.register::<Recorder>(vec![HandlerDescriptor::on_dyn::<Recorder, _, _>(
            "on_number",
            |c: &Recorder, event: &AnyArc| {
                let label = if (**event).is::<IntegerEvent>() {
                    "integer"
                } else if (**event).is::<DoubleEvent>() {
                    "double"
                } else {
                    "number"
                };
                c.record(label);
            },
        )
        .event::<NumberEvent>()
        .build(&relations)
        .unwrap()]);

        let bus = EventBus::builder(registry).relations(relations).build();
        let producer = Arc::new(());
        let consumer = Recorder::new();

        bus.bind(&producer, &consumer);
        bus.fire(&producer, IntegerEvent);
        bus.fire(&producer, DoubleEvent);
        bus.fire(&producer, NumberEvent);
        bus.fire(&producer, String::from("unrelated"));
        bus.flush().await;

        assert_eq!(consumer.seen(), vec!["integer", "double", "number"]);
        bus.shutdown().await;
    }

    struct ExactEvent;
    struct ParentEvent;

    #[tokio::test(flavor = "current_thread")]
    async fn test_exact_type_level_beats_parent_level() {
        let relations = Arc::new(
            TypeRelations::builder()
                .extends::<ExactEvent, ParentEvent>()
                .build(),
        );
        let mut registry = HandlerRegistry::new();
        registry.register::<Recorder>(vec![
            HandlerDescriptor::on::<Recorder, ExactEvent, _, _>("exact", |c: &Recorder, _e| {
                c.record("exact")
            })
            .build(&relations)
            .unwrap(),
            HandlerDescriptor::on::<Recorder, ParentEvent, _, _>("parent", |c: &Recorder, _e| {
                c.record("parent")
            })
            .build(&relations)
            .unwrap(),
        ]);

        let errors = RecordingErrors::new();
        let bus = EventBus::builder(registry)
            .relations(relations)
            .error_handler(errors.clone())
            .build();
        let producer = Arc::new(());
        let consumer = Recorder::new();

        bus.bind(&producer, &consumer);
        bus.fire(&producer, ExactEvent);
        bus.flush().await;

        // The exact type level fired first, which settles the walk for this
        // consumer; the parent handler is never invoked, so it cannot fail
        // its downcast either.
        assert_eq!(consumer.seen(), vec!["exact"]);
        assert!(errors.entries().is_empty());
        bus.shutdown().await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_subtype_fire_reaches_only_the_subtype_level() {
        let relations = Arc::new(
            TypeRelations::builder()
                .extends::<ExactEvent, ParentEvent>()
                .build(),
        );
        // Dynamically-typed handlers: both would deliver fine at any level,
        // so only the walk's early stop keeps the parent one quiet.
        let mut registry = HandlerRegistry::new();
        registry.register::<Recorder>(vec![
            HandlerDescriptor::on_dyn::<Recorder, _, _>("exact", |c: &Recorder, _e: &AnyArc| {
                c.record("exact")
            })
            .event::<ExactEvent>()
            .build(&relations)
            .unwrap(),
            HandlerDescriptor::on_dyn::<Recorder, _, _>("parent", |c: &Recorder, _e: &AnyArc| {
                c.record("parent")
            })
            .event::<ParentEvent>()
            .build(&relations)
            .unwrap(),
        ]);

        let errors = RecordingErrors::new();
        let bus = EventBus::builder(registry)
            .relations(relations)
            .error_handler(errors.clone())
            .build();
        let producer = Arc::new(());
        let consumer = Recorder::new();

        bus.bind(&producer, &consumer);
        bus.fire(&producer, ExactEvent);
        bus.fire(&producer, ParentEvent);
        bus.flush().await;

        assert_eq!(consumer.seen(), vec!["exact", "parent"]);
        assert!(errors.entries().is_empty());
        bus.shutdown().await;
    }

    struct StationA;
    struct StationB;

    #[tokio::test(flavor = "current_thread")]
    async fn test_producer_filter_restricts_delivery() {
        let rel = TypeRelations::empty();
        let mut registry = HandlerRegistry::new();
        registry.register::<Recorder>(vec![HandlerDescriptor::on_with_producer::<
            Recorder,
            StationA,
            String,
            _,
            _,
        >("from_a", |c: &Recorder, _p: &StationA, e: &String| {
            c.record(format!("a:{e}"))
        })
        .build(&rel)
        .unwrap()]);

        let bus = EventBus::builder(registry).build();
        let a = Arc::new(StationA);
        let b = Arc::new(StationB);
        let consumer = Recorder::new();

        bus.bind(&a, &consumer);
        bus.bind(&b, &consumer);
        bus.fire(&a, String::from("hello"));
        bus.fire(&b, String::from("ignored"));
        bus.flush().await;

        assert_eq!(consumer.seen(), vec!["a:hello"]);
        bus.shutdown().await;
    }

    struct TextSource;
    struct ConsoleSource;
    struct SocketSource;

    #[tokio::test(flavor = "current_thread")]
    async fn test_producer_matching_is_covariant() {
        let relations = Arc::new(
            TypeRelations::builder()
                .implements::<ConsoleSource, TextSource>()
                .build(),
        );
        let mut registry = HandlerRegistry::new();
        registry.register::<Recorder>(vec![HandlerDescriptor::on::<Recorder, String, _, _>(
            "from_text",
            |c: &Recorder, e: &String| c.record(e.clone()),
        )
        .producer::<TextSource>()
        .build(&relations)
        .unwrap()]);

        let bus = EventBus::builder(registry).relations(relations).build();
        let console = Arc::new(ConsoleSource);
        let socket = Arc::new(SocketSource);
        let consumer = Recorder::new();

        // ConsoleSource declares TextSource as a supertype; SocketSource is
        // unrelated and must not reach the handler.
        bus.bind(&console, &consumer);
        bus.bind(&socket, &consumer);
        bus.fire(&console, String::from("line"));
        bus.fire(&socket, String::from("packet"));
        bus.flush().await;

        assert_eq!(consumer.seen(), vec!["line"]);
        bus.shutdown().await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_tag_filters_gate_delivery() {
        let rel = TypeRelations::empty();
        let mut registry = HandlerRegistry::new();
        registry.register::<Recorder>(vec![
            HandlerDescriptor::on::<Recorder, String, _, _>("any_ab", |c: &Recorder, e: &String| {
                c.record(format!("any:{e}"))
            })
            .any_tag("a")
            .any_tag("b")
            .build(&rel)
            .unwrap(),
            HandlerDescriptor::on::<Recorder, String, _, _>("each_ab", |c: &Recorder, e: &String| {
                c.record(format!("each:{e}"))
            })
            .each_tag("a")
            .each_tag("b")
            .build(&rel)
            .unwrap(),
        ]);

        let bus = EventBus::builder(registry).build();
        let producer = Arc::new(());
        let consumer = Recorder::new();

        bus.bind(&producer, &consumer);
        bus.fire_tagged(&producer, String::from("one"), &["b"]);
        bus.fire_tagged(&producer, String::from("two"), &["a", "b", "c"]);
        bus.fire_tagged(&producer, String::from("three"), &["c"]);
        bus.fire(&producer, String::from("four"));
        bus.flush().await;

        assert_eq!(consumer.seen(), vec!["any:one", "any:two", "each:two"]);
        bus.shutdown().await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_all_matching_handlers_on_one_consumer_fire() {
        let rel = TypeRelations::empty();
        let mut registry = HandlerRegistry::new();
        registry.register::<Recorder>(vec![
            HandlerDescriptor::on::<Recorder, String, _, _>("first", |c: &Recorder, e: &String| {
                c.record(format!("first:{e}"))
            })
            .build(&rel)
            .unwrap(),
            HandlerDescriptor::on::<Recorder, String, _, _>("second", |c: &Recorder, e: &String| {
                c.record(format!("second:{e}"))
            })
            .build(&rel)
            .unwrap(),
        ]);

        let bus = EventBus::builder(registry).build();
        let producer = Arc::new(());
        let consumer = Recorder::new();

        bus.bind(&producer, &consumer);
        bus.fire(&producer, String::from("x"));
        bus.flush().await;

        assert_eq!(consumer.seen(), vec!["first:x", "second:x"]);
        bus.shutdown().await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_pooled_handler_runs_off_the_dispatcher() {
        let rel = TypeRelations::empty();
        let mut registry = HandlerRegistry::new();
        registry.register::<Recorder>(vec![HandlerDescriptor::on::<Recorder, String, _, _>(
            "pooled",
            |c: &Recorder, e: &String| c.record(e.clone()),
        )
        .pooled()
        .build(&rel)
        .unwrap()]);

        let bus = EventBus::builder(registry).pool_workers(2).build();
        let producer = Arc::new(());
        let consumer = Recorder::new();

        bus.bind(&producer, &consumer);
        bus.fire(&producer, String::from("job"));
        bus.flush().await;

        // The flush only proves submission to the pool; poll for completion.
        for _ in 0..200 {
            if consumer.seen() == vec!["job"] {
                bus.shutdown().await;
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("pooled handler never ran");
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn test_delayed_fire_waits_for_its_trigger_time() {
        let bus = string_recorder_bus();
        let producer = Arc::new(());
        let consumer = Recorder::new();

        bus.bind(&producer, &consumer);
        bus.fire_later(&producer, String::from("late"), Duration::from_secs(5));
        bus.fire(&producer, String::from("now"));
        bus.flush().await;
        assert_eq!(consumer.seen(), vec!["now"]);

        tokio::time::sleep(Duration::from_secs(6)).await;
        bus.flush().await;
        assert_eq!(consumer.seen(), vec!["now", "late"]);
        bus.shutdown().await;
    }

    struct RecordingErrors {
        entries: StdMutex<Vec<String>>,
    }

    impl RecordingErrors {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                entries: StdMutex::new(Vec::new()),
            })
        }

        fn entries(&self) -> Vec<String> {
            self.entries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ErrorHandler for Arc<RecordingErrors> {
        async fn invocation_failed(&self, failure: InvocationFailure) {
            self.entries
                .lock()
                .unwrap()
                .push(format!("{}:{}", failure.kind.as_label(), failure.handler));
        }

        async fn unhandled(&self, message: &str, detail: &str) {
            self.entries
                .lock()
                .unwrap()
                .push(format!("unhandled:{message}:{detail}"));
        }

        async fn interrupted(&self) {
            self.entries.lock().unwrap().push("interrupted".into());
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_bind_without_handlers_reports_through_error_handler() {
        let errors = RecordingErrors::new();
        let bus = EventBus::builder(HandlerRegistry::new())
            .error_handler(errors.clone())
            .build();
        let producer = Arc::new(());
        let consumer = Arc::new(String::from("no handlers"));

        bus.bind(&producer, &consumer);
        bus.flush().await;

        let entries = errors.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].starts_with("unhandled:bind rejected"));
        // The report names the rejected consumer's type.
        assert!(entries[0].contains("String"), "entry: {}", entries[0]);
        assert_eq!(
            bus.stats().await,
            BusStats {
                producers: 0,
                subscribers: 0
            }
        );
        bus.shutdown().await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_handler_failures_are_classified() {
        let relations = Arc::new(
            TypeRelations::builder()
                .extends::<IntegerEvent, NumberEvent>()
                .build(),
        );
        let mut registry = HandlerRegistry::new();
        registry.register::<Recorder>(vec![
            // Panicking body infers `!`; pin the outcome type to `()`.
            HandlerDescriptor::on::<Recorder, String, _, ()>("panics", |_c: &Recorder, _e| {
                panic!("boom")
            })
            .build(&relations)
            .unwrap(),
            HandlerDescriptor::on::<Recorder, u32, _, _>("fails", |_c: &Recorder, _e| {
                Err::<(), Box<dyn std::error::Error + Send + Sync>>("nope".into())
            })
            .build(&relations)
            .unwrap(),
            // Typed over the parent but declared for the subtype: the
            // delivered IntegerEvent cannot downcast to NumberEvent.
            HandlerDescriptor::on::<Recorder, NumberEvent, _, _>("mistyped", |_c: &Recorder, _e| {})
                .event::<IntegerEvent>()
                .build(&relations)
                .unwrap(),
        ]);

        let errors = RecordingErrors::new();
        let bus = EventBus::builder(registry)
            .relations(relations)
            .error_handler(errors.clone())
            .build();
        let producer = Arc::new(());
        let consumer = Recorder::new();

        bus.bind(&producer, &consumer);
        bus.fire(&producer, String::from("panic trigger"));
        bus.fire(&producer, 7u32);
        bus.fire(&producer, IntegerEvent);
        bus.flush().await;

        assert_eq!(
            errors.entries(),
            vec![
                "unhandled:panics",
                "invocation_failure:fails",
                "invalid_argument:mistyped",
            ]
        );
        // A panicking handler takes down neither the dispatcher nor later
        // deliveries.
        bus.fire(&producer, 7u32);
        bus.flush().await;
        assert_eq!(errors.entries().len(), 4);
        bus.shutdown().await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_shutdown_reports_interruption_and_silences_the_bus() {
        let errors = RecordingErrors::new();
        let bus = EventBus::builder(HandlerRegistry::new())
            .error_handler(errors.clone())
            .build();

        bus.shutdown().await;
        assert_eq!(errors.entries(), vec!["interrupted"]);

        // Post-shutdown calls are dropped; flush does not hang.
        let producer = Arc::new(());
        bus.fire(&producer, String::from("void"));
        bus.flush().await;
        assert_eq!(
            bus.stats().await,
            BusStats {
                producers: 0,
                subscribers: 0
            }
        );
    }
}
