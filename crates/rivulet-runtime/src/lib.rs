//! # Rivulet Runtime
//!
//! Embedded execution engine for graphs of data-processing operators
//! connected by typed, schema-described streams.
//!
//! A graph is assembled declaratively — operators, ports, windows,
//! connections — and then driven through a strict multi-phase lifecycle:
//!
//! ```text
//! Uninitialized → Initializing → Initialized → ConnectingAndNotifying
//!     → Ready → Completing → Completed → ShuttingDown → Shutdown
//! ```
//!
//! Each phase resolves a cached, shareable completion handle; hooks of
//! different operators run concurrently on the shared tokio runtime, and
//! any failure tears the whole graph down. End-of-stream markers are
//! tracked across fan-in connections and broadcast downstream exactly
//! once per operator.
//!
//! ## Modules
//!
//! - [`graph`]: declarative graph builder (operators, ports, connections)
//! - [`window`]: window-policy configuration for input ports
//! - [`operator`]: the [`Operator`](operator::Operator) trait and context
//! - [`exec`]: the phased [`GraphExecutor`](exec::GraphExecutor)
//! - [`completion`]: end-of-stream tracking and fan-in aggregation
//! - [`handler`]: input handler chains, queued ports
//! - [`forwarder`]: multicast output forwarders
//! - [`codec`]: schema-driven tuple encoding
//! - [`collector`]: stream observers for tests and embeddings
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rivulet_core::{Schema, Type};
//! use rivulet_runtime::{GraphExecutor, OperatorGraph};
//!
//! let schema = Schema::new([("v", Type::Int)])?;
//! let mut graph = OperatorGraph::new();
//! let src = graph.add_operator("numbers", Box::new(MySource))?;
//! let out = graph.add_output(src, "out", schema.clone())?;
//! let snk = graph.add_operator("collect", Box::new(MySink))?;
//! let inp = graph.add_input(snk, "in", schema)?;
//! graph.connect(inp, [out])?;
//!
//! let executor = GraphExecutor::new(graph)?;
//! executor.execute_to_completion().await?;
//! ```

pub mod codec;
pub mod collector;
pub mod completion;
pub mod error;
pub mod exec;
pub mod forwarder;
pub mod graph;
pub mod handler;
pub mod message;
pub mod operator;
pub mod window;

pub use collector::{StreamCollector, StreamCounter};
pub use completion::{FanInHandler, FinalMarkerTracker};
pub use error::{GraphError, OperatorError};
pub use exec::{CompletionHandle, GraphExecutor, Phase};
pub use forwarder::OutputForwarder;
pub use graph::{
    CongestionPolicy, Connection, ConnectionRegistry, InPortId, OpId, OperatorGraph, OutPortId,
};
pub use handler::MessageHandler;
pub use message::{Marker, Message};
pub use operator::{Operator, OperatorContext, PassThrough};
pub use window::{PartitionEviction, WindowError, WindowMode, WindowPolicy, WindowSpec};
