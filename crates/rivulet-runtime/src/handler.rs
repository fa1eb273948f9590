//! Input-port handler chain.
//!
//! Every input port is a chain of [`MessageHandler`]s. Innermost is the
//! operator delivery primitive (optionally behind a bounded FIFO queue
//! serviced by its own task); the completion tracker's end-of-stream
//! watcher and the fan-in aggregator wrap it from the outside.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::GraphError;
use crate::graph::{CongestionPolicy, ThreadedPort};
use crate::message::Message;
use crate::operator::{Operator, OperatorContext};

/// A sink for stream messages. Implemented by the engine's handler chain
/// and by external observers attached through the test interface.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message) -> Result<(), GraphError>;
}

/// Innermost handler: delivers messages to the operator's
/// `process`/`process_marker` hooks under the operator lock.
pub(crate) struct OperatorInput {
    pub(crate) operator: Arc<tokio::sync::Mutex<Box<dyn Operator>>>,
    pub(crate) ctx: Arc<OperatorContext>,
    pub(crate) port: usize,
}

#[async_trait]
impl MessageHandler for OperatorInput {
    async fn handle(&self, message: Message) -> Result<(), GraphError> {
        let mut operator = self.operator.lock().await;
        let result = match message {
            Message::Tuple(tuple) => operator.process(self.port, tuple, &self.ctx).await,
            Message::Marker(marker) => operator.process_marker(self.port, marker, &self.ctx).await,
        };
        result.map_err(|err| GraphError::from_hook(self.ctx.name(), err))
    }
}

struct QueueItem {
    message: Message,
    /// Present for synchronously delivered items: notified once the pump
    /// has finished processing the item.
    done: Option<Arc<Notify>>,
}

struct PortState {
    queue: VecDeque<QueueItem>,
    /// Set when the pump dies; reported to every later enqueue attempt.
    failed: Option<GraphError>,
}

/// A bounded FIFO queue in front of an inner handler, drained by a
/// dedicated task.
///
/// Tuples obey the port's congestion policy when the queue is full.
/// Markers are never dropped: window markers wait for room, and final
/// markers are delivered synchronously — the enqueueing side blocks until
/// the marker (and therefore everything queued ahead of it) has been
/// processed, so end-of-stream accounting cannot overtake queued tuples.
pub(crate) struct QueuedInput {
    port_label: String,
    config: ThreadedPort,
    state: Mutex<PortState>,
    data: Notify,
    space: Notify,
    dropped: AtomicU64,
}

impl QueuedInput {
    /// Creates the queue and spawns its pump task. The task runs until the
    /// inner handler fails or the executor tears it down.
    pub(crate) fn spawn(
        port_label: String,
        config: ThreadedPort,
        inner: Arc<dyn MessageHandler>,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let queued = Arc::new(Self {
            port_label,
            config,
            state: Mutex::new(PortState {
                queue: VecDeque::with_capacity(config.queue_size),
                failed: None,
            }),
            data: Notify::new(),
            space: Notify::new(),
            dropped: AtomicU64::new(0),
        });
        let pump = Arc::clone(&queued);
        let handle = tokio::spawn(async move { pump.run(inner).await });
        (queued, handle)
    }

    /// Tuples dropped so far under `DropFirst`/`DropLast` congestion.
    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    async fn run(self: Arc<Self>, inner: Arc<dyn MessageHandler>) {
        loop {
            let item = loop {
                {
                    let mut state = self.state.lock().expect("port queue poisoned");
                    if let Some(item) = state.queue.pop_front() {
                        self.space.notify_one();
                        break item;
                    }
                }
                self.data.notified().await;
            };
            let result = inner.handle(item.message).await;
            if let Some(done) = item.done {
                done.notify_one();
            }
            if let Err(err) = result {
                error!(port = %self.port_label, %err, "queued port delivery failed");
                let mut state = self.state.lock().expect("port queue poisoned");
                state.failed = Some(err);
                // Wake waiters of synchronous items still queued so nobody
                // blocks on a queue that will never drain.
                for item in state.queue.drain(..) {
                    if let Some(done) = item.done {
                        done.notify_one();
                    }
                }
                return;
            }
        }
    }

    fn failure(&self) -> Option<GraphError> {
        self.state
            .lock()
            .expect("port queue poisoned")
            .failed
            .clone()
    }

    /// Enqueues waiting for room; used for markers and the `Wait` policy.
    async fn put_waiting(&self, item: QueueItem) -> Result<(), GraphError> {
        let mut item = Some(item);
        loop {
            {
                let mut state = self.state.lock().expect("port queue poisoned");
                if let Some(err) = &state.failed {
                    return Err(err.clone());
                }
                if state.queue.len() < self.config.queue_size {
                    state
                        .queue
                        .push_back(item.take().expect("item consumed twice"));
                    self.data.notify_one();
                    return Ok(());
                }
            }
            self.space.notified().await;
        }
    }
}

#[async_trait]
impl MessageHandler for QueuedInput {
    async fn handle(&self, message: Message) -> Result<(), GraphError> {
        if message.is_final() {
            let done = Arc::new(Notify::new());
            self.put_waiting(QueueItem {
                message,
                done: Some(done.clone()),
            })
            .await?;
            done.notified().await;
            return match self.failure() {
                Some(err) => Err(err),
                None => Ok(()),
            };
        }

        if matches!(message, Message::Marker(_)) {
            return self.put_waiting(QueueItem { message, done: None }).await;
        }

        match self.config.congestion {
            CongestionPolicy::Wait => {
                self.put_waiting(QueueItem { message, done: None }).await
            }
            CongestionPolicy::DropFirst => {
                let mut state = self.state.lock().expect("port queue poisoned");
                if let Some(err) = &state.failed {
                    return Err(err.clone());
                }
                if state.queue.len() >= self.config.queue_size {
                    // Discard the oldest queued tuple to make room. Markers
                    // stay queued: skip past them to the first tuple.
                    if let Some(pos) = state
                        .queue
                        .iter()
                        .position(|item| matches!(item.message, Message::Tuple(_)))
                    {
                        let _ = state.queue.remove(pos);
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        debug!(port = %self.port_label, "dropped oldest tuple (queue full)");
                    }
                }
                state.queue.push_back(QueueItem { message, done: None });
                self.data.notify_one();
                Ok(())
            }
            CongestionPolicy::DropLast => {
                let mut state = self.state.lock().expect("port queue poisoned");
                if let Some(err) = &state.failed {
                    return Err(err.clone());
                }
                if state.queue.len() >= self.config.queue_size {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    debug!(port = %self.port_label, "dropped incoming tuple (queue full)");
                    return Ok(());
                }
                state.queue.push_back(QueueItem { message, done: None });
                self.data.notify_one();
                Ok(())
            }
        }
    }
}
