//! # Invocation pool for handlers marked `Pooled`.
//!
//! Pooled handlers must not stall the dispatcher, so their invocations are
//! packaged as [`InvocationJob`]s and handed to an [`InvocationPool`]. The
//! shipped implementation, [`WorkerPool`], runs a fixed number of worker
//! tasks over one shared queue.
//!
//! ## Diagram
//! ```text
//!    Dispatcher ── submit(job) ──► [shared queue] ─► worker 1 ─► job.run()
//!                                                 ─► worker 2 ─► job.run()
//!                                                 ─► worker N ─► job.run()
//! ```
//!
//! ## Rules
//! - `submit` never blocks the dispatcher (unbounded queue, bounded workers).
//! - Jobs may block or run long; they only occupy their worker.
//! - Failures (errors, panics) are reported asynchronously through the same
//!   [`ErrorHandler`] contract inline handlers use.
//! - Workers exit when the pool is dropped and the queue drains.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::handle::AnyArc;
use crate::handlers::{run_call, HandlerCall};
use crate::report::ErrorHandler;

/// One pooled handler invocation, ready to run on any worker.
pub struct InvocationJob {
    handler: &'static str,
    call: HandlerCall,
    producer: AnyArc,
    consumer: AnyArc,
    event: AnyArc,
    errors: Arc<dyn ErrorHandler>,
}

impl InvocationJob {
    pub(crate) fn new(
        handler: &'static str,
        call: HandlerCall,
        producer: AnyArc,
        consumer: AnyArc,
        event: AnyArc,
        errors: Arc<dyn ErrorHandler>,
    ) -> Self {
        Self {
            handler,
            call,
            producer,
            consumer,
            event,
            errors,
        }
    }

    /// Runs the handler with panic isolation, reporting failures through the
    /// error handler the job was created with.
    pub async fn run(self) {
        run_call(
            self.handler,
            &self.call,
            &self.producer,
            &self.consumer,
            &self.event,
            &self.errors,
        )
        .await;
    }
}

/// Contract for pooled handler execution.
pub trait InvocationPool: Send + Sync + 'static {
    /// Accepts a job for execution. Must not block the caller.
    fn submit(&self, job: InvocationJob);
}

/// Fixed-size worker pool over a shared queue.
pub struct WorkerPool {
    tx: mpsc::UnboundedSender<InvocationJob>,
}

impl WorkerPool {
    /// Default worker count, mirroring the fixed pool the bus starts with
    /// when no custom pool is configured.
    pub const DEFAULT_WORKERS: usize = 4;

    /// Spawns `workers` tasks sharing one queue. Requires a Tokio runtime.
    pub fn spawn(workers: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<InvocationJob>();
        let rx = Arc::new(Mutex::new(rx));

        for _ in 0..workers.max(1) {
            let rx = Arc::clone(&rx);
            tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    match job {
                        Some(job) => job.run().await,
                        None => break,
                    }
                }
            });
        }

        Self { tx }
    }
}

impl InvocationPool for WorkerPool {
    fn submit(&self, job: InvocationJob) {
        if self.tx.send(job).is_err() {
            tracing::warn!("invocation pool is shut down; pooled handler dropped");
        }
    }
}
