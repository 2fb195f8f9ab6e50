//! # emberbus
//!
//! **Emberbus** is an asynchronous publish/subscribe event bus with weak
//! registration for Rust.
//!
//! Producers and consumers are plain `Arc`-held objects; the bus associates
//! them without keeping them alive, so dropping the last outside reference
//! unsubscribes an object automatically. Event routing is covariant over an
//! explicit type-relation registry, and all registry mutation is serialized
//! through a single dispatcher task, so no public call ever blocks.
//!
//! ## Architecture
//! ```text
//!     ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//!     │  caller #1   │     │  caller #2   │     │  caller #N   │
//!     │ bind / fire  │     │ fire_tagged  │     │  fire_later  │
//!     └──────┬───────┘     └──────┬───────┘     └──────┬───────┘
//!            ▼                    ▼                    ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │  ActionQueue (unbounded MPSC + delay heap)                    │
//! └──────────────────────────────┬────────────────────────────────┘
//!                                ▼  one action at a time
//! ┌───────────────────────────────────────────────────────────────┐
//! │  Dispatcher (single task)                                     │
//! │  - registry: WeakHandle(producer) ──► SubscriberSet           │
//! │  - ConsumerIndex (memoized HandlerScanner results)            │
//! │  - TypeRelations (covariant matching)                         │
//! │  - cleanup pass after every action (weak-liveness scan)       │
//! └───────┬──────────────────────────────────────┬────────────────┘
//!         │ Inline handlers                      │ Pooled handlers
//!         ▼                                      ▼
//!   run on the dispatcher              ┌──────────────────────┐
//!   (ordered, can stall the bus)       │ InvocationPool       │
//!                                      │  worker1 .. workerN  │
//!                                      └──────────────────────┘
//!
//!   failures (errors, panics, rejected binds) ──► ErrorHandler
//! ```
//!
//! ## Features
//! | Area              | Description                                                           | Key types / traits                          |
//! |-------------------|-----------------------------------------------------------------------|---------------------------------------------|
//! | **Bus**           | Bind, unbind, fire (immediate, tagged, delayed), flush, shutdown.     | [`EventBus`], [`EventBusBuilder`]           |
//! | **Handlers**      | Describe which events a consumer type handles and how.                | [`HandlerDescriptor`], [`DescriptorBuilder`]|
//! | **Discovery**     | Supply descriptors per consumer type; explicit registry shipped.      | [`HandlerScanner`], [`HandlerRegistry`]     |
//! | **Type relations**| Declared supertype graph driving covariant matching.                  | [`TypeRelations`], [`TypeTag`]              |
//! | **Pooling**       | Off-dispatcher execution for slow handlers.                           | [`InvocationPool`], [`WorkerPool`]          |
//! | **Reporting**     | Asynchronous failure sink; `tracing`-backed default.                  | [`ErrorHandler`], [`LogErrorHandler`]       |
//! | **Errors**        | Typed errors for bus misuse and descriptor construction.              | [`BusError`], [`DescriptorError`]           |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use emberbus::{EventBus, HandlerDescriptor, HandlerRegistry, TypeRelations};
//!
//! struct Greeter;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let relations = TypeRelations::empty();
//!     let mut registry = HandlerRegistry::new();
//!     registry.register::<Greeter>(vec![
//!         HandlerDescriptor::on::<Greeter, String, _, _>("greet", |_g: &Greeter, msg: &String| {
//!             println!("received: {msg}");
//!         })
//!         .build(&relations)
//!         .unwrap(),
//!     ]);
//!
//!     let bus = EventBus::builder(registry).build();
//!     let producer = Arc::new(());
//!     let consumer = Arc::new(Greeter);
//!
//!     bus.bind(&producer, &consumer);
//!     bus.fire(&producer, String::from("hello"));
//!     bus.flush().await;
//!     bus.shutdown().await;
//! }
//! ```
mod bus;
mod core;
mod error;
mod handle;
mod handlers;
mod pool;
mod report;
mod types;

// ---- Public re-exports ----

pub use bus::{EventBus, EventBusBuilder};
pub use core::BusStats;
pub use error::{BusError, DescriptorError, HandlerError};
pub use handle::{AnyArc, WeakHandle};
pub use handlers::{
    DescriptorBuilder, HandlerDescriptor, HandlerOutcome, HandlerRegistry, HandlerScanner,
    InvokeMode,
};
pub use pool::{InvocationJob, InvocationPool, WorkerPool};
pub use report::{ErrorHandler, FailureKind, InvocationFailure, LogErrorHandler};
pub use types::{TypeRelations, TypeRelationsBuilder, TypeTag};
