//! Stream items delivered to input ports and forwarded by output ports

use rivulet_core::Tuple;
use serde::{Deserialize, Serialize};

/// Control signal travelling a stream alongside tuples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Marker {
    /// Window punctuation: delimits groups of tuples for punctuation-evicted
    /// windows. Passes through fan-in aggregation untouched and uncounted.
    Window,
    /// End of stream: no more tuples will arrive on this connection.
    Final,
}

/// The unit of delivery between ports.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Tuple(Tuple),
    Marker(Marker),
}

impl Message {
    pub fn is_final(&self) -> bool {
        matches!(self, Message::Marker(Marker::Final))
    }

    pub fn as_tuple(&self) -> Option<&Tuple> {
        match self {
            Message::Tuple(t) => Some(t),
            Message::Marker(_) => None,
        }
    }
}

impl From<Tuple> for Message {
    fn from(tuple: Tuple) -> Self {
        Message::Tuple(tuple)
    }
}

impl From<Marker> for Message {
    fn from(marker: Marker) -> Self {
        Message::Marker(marker)
    }
}
