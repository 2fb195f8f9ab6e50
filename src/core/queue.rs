//! # Action queue: many submitters, one drain, delay-aware.
//!
//! [`ActionQueue`] is the submission side handed to every caller thread;
//! `submit` never blocks (unbounded MPSC). [`ActionReceiver`] is the drain
//! side owned by the dispatcher: immediate actions come out in arrival
//! order, delayed ones sit in a min-heap and are released only once due,
//! earliest first.
//!
//! ## Diagram
//! ```text
//!  callers (any thread)             dispatcher (single task)
//!    submit(action) ──► [mpsc] ──► next():
//!                                    ├─ due scheduled action?  pop it
//!                                    ├─ recv immediate action? return it
//!                                    ├─ recv delayed action?   park in heap
//!                                    └─ cancellation signal?   Cancelled
//! ```

use std::collections::BinaryHeap;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::action::PendingAction;

/// Submission handle; cheap to clone, safe from any thread.
#[derive(Clone)]
pub(crate) struct ActionQueue {
    tx: mpsc::UnboundedSender<PendingAction>,
}

impl ActionQueue {
    /// Enqueues without blocking. Returns `false` if the dispatcher is gone.
    pub(crate) fn submit(&self, action: PendingAction) -> bool {
        self.tx.send(action).is_ok()
    }
}

/// Outcome of one [`ActionReceiver::next`] wait.
pub(crate) enum Drained {
    /// An action became eligible.
    Action(PendingAction),
    /// The cancellation signal fired while waiting.
    Cancelled,
    /// Every submitter is gone and nothing remains scheduled.
    Closed,
}

/// A delayed action parked until its trigger time.
struct Scheduled {
    due: Instant,
    seq: u64,
    action: PendingAction,
}

// BinaryHeap is a max-heap; invert the ordering so the earliest due (and,
// for ties, lowest sequence) is popped first.
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

/// Drain side; owned by the dispatcher task.
pub(crate) struct ActionReceiver {
    rx: mpsc::UnboundedReceiver<PendingAction>,
    delayed: BinaryHeap<Scheduled>,
    next_seq: u64,
    closed: bool,
}

/// Creates a connected submission/drain pair.
pub(crate) fn channel() -> (ActionQueue, ActionReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ActionQueue { tx },
        ActionReceiver {
            rx,
            delayed: BinaryHeap::new(),
            next_seq: 0,
            closed: false,
        },
    )
}

impl ActionReceiver {
    /// Waits for the next eligible action, the cancellation signal, or queue
    /// exhaustion. Delayed actions are never released before their trigger
    /// time; among several parked actions the earliest due wins.
    pub(crate) async fn next(&mut self, cancel: &CancellationToken) -> Drained {
        loop {
            if let Some(scheduled) = self.delayed.peek() {
                if scheduled.due <= Instant::now() {
                    let scheduled = self.delayed.pop().expect("peeked entry vanished");
                    return Drained::Action(scheduled.action);
                }
            } else if self.closed {
                return Drained::Closed;
            }

            let wake_at = self.delayed.peek().map(|s| s.due);

            tokio::select! {
                _ = cancel.cancelled() => return Drained::Cancelled,
                _ = tokio::time::sleep_until(wake_at.unwrap_or_else(Instant::now)),
                        if wake_at.is_some() => {
                    // Loop around; the due entry is popped at the top.
                }
                received = self.rx.recv(), if !self.closed => {
                    match received {
                        None => self.closed = true,
                        Some(action) => match action.not_before() {
                            Some(due) if due > Instant::now() => self.park(due, action),
                            _ => return Drained::Action(action),
                        },
                    }
                }
            }
        }
    }

    fn park(&mut self, due: Instant, action: PendingAction) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.delayed.push(Scheduled { due, seq, action });
    }
}
