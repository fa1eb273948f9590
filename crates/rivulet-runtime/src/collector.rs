//! Handlers for observing streams in tests and embeddings.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rivulet_core::Tuple;

use crate::error::GraphError;
use crate::handler::MessageHandler;
use crate::message::{Marker, Message};

/// Collects every message delivered to it. Bind to an output port (or use
/// as a fake downstream) to assert on what an operator emitted.
#[derive(Default)]
pub struct StreamCollector {
    messages: Mutex<Vec<Message>>,
}

impl StreamCollector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().expect("collector poisoned").clone()
    }

    pub fn tuples(&self) -> Vec<Tuple> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                Message::Tuple(t) => Some(t),
                Message::Marker(_) => None,
            })
            .collect()
    }

    pub fn marker_count(&self, marker: Marker) -> usize {
        self.messages()
            .iter()
            .filter(|m| matches!(m, Message::Marker(x) if *x == marker))
            .count()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().expect("collector poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.messages.lock().expect("collector poisoned").clear();
    }
}

#[async_trait]
impl MessageHandler for StreamCollector {
    async fn handle(&self, message: Message) -> Result<(), GraphError> {
        self.messages
            .lock()
            .expect("collector poisoned")
            .push(message);
        Ok(())
    }
}

/// Counts messages without retaining them.
#[derive(Default)]
pub struct StreamCounter {
    tuples: AtomicU64,
    window_markers: AtomicU64,
    final_markers: AtomicU64,
}

impl StreamCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn tuple_count(&self) -> u64 {
        self.tuples.load(Ordering::SeqCst)
    }

    pub fn window_marker_count(&self) -> u64 {
        self.window_markers.load(Ordering::SeqCst)
    }

    pub fn final_marker_count(&self) -> u64 {
        self.final_markers.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageHandler for StreamCounter {
    async fn handle(&self, message: Message) -> Result<(), GraphError> {
        match message {
            Message::Tuple(_) => self.tuples.fetch_add(1, Ordering::SeqCst),
            Message::Marker(Marker::Window) => self.window_markers.fetch_add(1, Ordering::SeqCst),
            Message::Marker(Marker::Final) => self.final_markers.fetch_add(1, Ordering::SeqCst),
        };
        Ok(())
    }
}
