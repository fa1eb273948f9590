//! Redirectable multicast sinks for output ports.

use std::fmt;
use std::sync::{Arc, Mutex};

use smallvec::SmallVec;

use crate::error::GraphError;
use crate::handler::MessageHandler;
use crate::message::Message;

/// The sink behind one output port.
///
/// Starts out unbound, discarding everything submitted to it. Binding a
/// handler redirects the output; binding further handlers adds them to a
/// broadcast group — every message is delivered to all bound handlers, and
/// a later bind never replaces an earlier one. Binding is synchronized
/// against concurrent binds and concurrent delivery.
pub struct OutputForwarder {
    operator: Arc<str>,
    port: usize,
    targets: Mutex<SmallVec<[Arc<dyn MessageHandler>; 2]>>,
}

impl OutputForwarder {
    pub(crate) fn new(operator: Arc<str>, port: usize) -> Self {
        Self {
            operator,
            port,
            targets: Mutex::new(SmallVec::new()),
        }
    }

    /// Adds a handler to the broadcast group.
    pub fn bind(&self, handler: Arc<dyn MessageHandler>) {
        self.targets
            .lock()
            .expect("forwarder bind lock poisoned")
            .push(handler);
    }

    /// Whether any handler is bound.
    pub fn is_bound(&self) -> bool {
        !self
            .targets
            .lock()
            .expect("forwarder bind lock poisoned")
            .is_empty()
    }

    pub fn bound_count(&self) -> usize {
        self.targets
            .lock()
            .expect("forwarder bind lock poisoned")
            .len()
    }

    /// Delivers a message to every bound handler; a no-op while unbound.
    ///
    /// The bind list is snapshotted up front so delivery never holds the
    /// lock across a handler call.
    pub async fn forward(&self, message: Message) -> Result<(), GraphError> {
        let targets: SmallVec<[Arc<dyn MessageHandler>; 2]> = self
            .targets
            .lock()
            .expect("forwarder bind lock poisoned")
            .clone();
        match targets.split_last() {
            None => Ok(()),
            Some((last, rest)) => {
                for target in rest {
                    target.handle(message.clone()).await?;
                }
                last.handle(message).await
            }
        }
    }
}

impl fmt::Debug for OutputForwarder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputForwarder")
            .field("operator", &self.operator)
            .field("port", &self.port)
            .field("bound", &self.bound_count())
            .finish()
    }
}
