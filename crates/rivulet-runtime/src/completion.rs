//! End-of-stream completion tracking.
//!
//! Two pieces of accounting keep final markers honest across the graph:
//! the per-operator [`FinalMarkerTracker`] counts ended input ports and
//! broadcasts end-of-stream downstream exactly once, and the per-port
//! [`FanInHandler`] collapses the final markers of N upstream connections
//! into one. Both are touched from arbitrary worker tasks, so their
//! counters sit behind a mutex.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::GraphError;
use crate::forwarder::OutputForwarder;
use crate::handler::MessageHandler;
use crate::message::{Marker, Message};

/// Tracks end-of-stream across one operator's input ports.
///
/// Constructed with the number of input ports. Each time an input port
/// observes a final marker the count drops by one; when it reaches zero a
/// final marker is emitted on every output port exactly once and the
/// tracker signals completion.
pub struct FinalMarkerTracker {
    operator: Arc<str>,
    remaining: Mutex<usize>,
    outputs: Vec<Arc<OutputForwarder>>,
    done_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
}

impl FinalMarkerTracker {
    pub(crate) fn new(
        operator: Arc<str>,
        expected: usize,
        outputs: Vec<Arc<OutputForwarder>>,
    ) -> Arc<Self> {
        let (done_tx, done_rx) = watch::channel(false);
        Arc::new(Self {
            operator,
            remaining: Mutex::new(expected),
            outputs,
            done_tx,
            done_rx,
        })
    }

    /// Records one input port reaching end of stream.
    ///
    /// The contract is one final per input port; a surplus final is logged
    /// and ignored rather than corrupting the count.
    pub async fn note_final(&self) -> Result<(), GraphError> {
        let finished = {
            let mut remaining = self.remaining.lock().expect("final tracker poisoned");
            if *remaining == 0 {
                warn!(
                    operator = %self.operator,
                    "surplus final marker after all inputs ended"
                );
                return Ok(());
            }
            *remaining -= 1;
            *remaining == 0
        };
        if finished {
            debug!(operator = %self.operator, "all inputs ended, broadcasting final marker");
            for output in &self.outputs {
                output.forward(Message::Marker(Marker::Final)).await?;
            }
            let _ = self.done_tx.send(true);
        }
        Ok(())
    }

    /// A receiver resolving to `true` once every input has ended.
    pub fn completed(&self) -> watch::Receiver<bool> {
        self.done_rx.clone()
    }

    pub fn is_complete(&self) -> bool {
        *self.done_rx.borrow()
    }
}

/// Watches one input port for end-of-stream on behalf of the tracker.
///
/// The marker is forwarded inward before the tracker is notified, so in an
/// unqueued chain the operator sees the final on its port before any
/// downstream final can fire.
pub(crate) struct FinalWatchHandler {
    pub(crate) inner: Arc<dyn MessageHandler>,
    pub(crate) tracker: Arc<FinalMarkerTracker>,
}

#[async_trait]
impl MessageHandler for FinalWatchHandler {
    async fn handle(&self, message: Message) -> Result<(), GraphError> {
        let is_final = message.is_final();
        self.inner.handle(message).await?;
        if is_final {
            self.tracker.note_final().await?;
        }
        Ok(())
    }
}

/// Collapses the final markers of N upstream connections into one.
///
/// Ordinary messages (tuples and window markers) pass through untouched
/// and uncounted; the final marker is only forwarded once the last
/// remaining upstream connection has delivered its own.
pub struct FanInHandler {
    port_label: String,
    inner: Arc<dyn MessageHandler>,
    remaining: Mutex<usize>,
}

impl FanInHandler {
    pub(crate) fn new(port_label: String, connections: usize, inner: Arc<dyn MessageHandler>) -> Self {
        Self {
            port_label,
            inner,
            remaining: Mutex::new(connections),
        }
    }
}

#[async_trait]
impl MessageHandler for FanInHandler {
    async fn handle(&self, message: Message) -> Result<(), GraphError> {
        if !message.is_final() {
            return self.inner.handle(message).await;
        }
        let forward = {
            let mut remaining = self.remaining.lock().expect("fan-in counter poisoned");
            if *remaining == 0 {
                warn!(port = %self.port_label, "surplus final marker on fan-in port");
                return Ok(());
            }
            *remaining -= 1;
            *remaining == 0
        };
        if forward {
            self.inner.handle(message).await
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FinalCounter(AtomicUsize);

    #[async_trait]
    impl MessageHandler for FinalCounter {
        async fn handle(&self, message: Message) -> Result<(), GraphError> {
            if message.is_final() {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_fan_in_counts_down_to_zero() {
        let sink = Arc::new(FinalCounter(AtomicUsize::new(0)));
        let fan_in = FanInHandler::new("c.in".into(), 3, sink.clone());

        fan_in.handle(Message::Marker(Marker::Final)).await.unwrap();
        fan_in.handle(Message::Marker(Marker::Final)).await.unwrap();
        assert_eq!(sink.0.load(Ordering::SeqCst), 0);

        fan_in.handle(Message::Marker(Marker::Final)).await.unwrap();
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fan_in_surplus_final_ignored() {
        let sink = Arc::new(FinalCounter(AtomicUsize::new(0)));
        let fan_in = FanInHandler::new("c.in".into(), 1, sink.clone());
        fan_in.handle(Message::Marker(Marker::Final)).await.unwrap();
        fan_in.handle(Message::Marker(Marker::Final)).await.unwrap();
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fan_in_passes_window_markers_uncounted() {
        let sink = Arc::new(FinalCounter(AtomicUsize::new(0)));
        let fan_in = FanInHandler::new("c.in".into(), 2, sink.clone());
        for _ in 0..5 {
            fan_in.handle(Message::Marker(Marker::Window)).await.unwrap();
        }
        fan_in.handle(Message::Marker(Marker::Final)).await.unwrap();
        fan_in.handle(Message::Marker(Marker::Final)).await.unwrap();
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tracker_fires_once_at_zero() {
        let out = Arc::new(OutputForwarder::new("op".into(), 0));
        let sink = Arc::new(FinalCounter(AtomicUsize::new(0)));
        out.bind(sink.clone());

        let tracker = FinalMarkerTracker::new("op".into(), 2, vec![out]);
        assert!(!tracker.is_complete());

        tracker.note_final().await.unwrap();
        assert!(!tracker.is_complete());
        assert_eq!(sink.0.load(Ordering::SeqCst), 0);

        tracker.note_final().await.unwrap();
        assert!(tracker.is_complete());
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);

        // Surplus finals neither underflow nor re-fire.
        tracker.note_final().await.unwrap();
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tracker_race_free_under_concurrent_finals() {
        let out = Arc::new(OutputForwarder::new("op".into(), 0));
        let sink = Arc::new(FinalCounter(AtomicUsize::new(0)));
        out.bind(sink.clone());
        let tracker = FinalMarkerTracker::new("op".into(), 16, vec![out]);

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let tracker = Arc::clone(&tracker);
            tasks.push(tokio::spawn(async move {
                tracker.note_final().await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert!(tracker.is_complete());
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
    }
}
