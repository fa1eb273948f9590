//! The operator trait and its invocation context.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use rivulet_core::{Schema, Tuple, Value};

use crate::error::{GraphError, OperatorError};
use crate::forwarder::OutputForwarder;
use crate::message::{Marker, Message};
use crate::window::WindowSpec;

/// One data-processing operator.
///
/// Hooks are invoked by the graph executor through the phased lifecycle:
/// `initialize` during the Initializing phase, `all_ports_ready` once the
/// static connections are in place, `process`/`process_marker` for every
/// message arriving on an input port, `complete` during the Completing
/// phase (a source operator produces its whole stream here), and
/// `shutdown` last. Every hook has a no-op default; implement what the
/// operator needs.
///
/// A failed hook tears down the entire graph and surfaces through the
/// phase's completion handle.
#[async_trait]
pub trait Operator: Send + 'static {
    async fn initialize(&mut self, _ctx: &OperatorContext) -> Result<(), OperatorError> {
        Ok(())
    }

    async fn all_ports_ready(&mut self, _ctx: &OperatorContext) -> Result<(), OperatorError> {
        Ok(())
    }

    /// Handles one tuple arriving on the given input port.
    async fn process(
        &mut self,
        _port: usize,
        _tuple: Tuple,
        _ctx: &OperatorContext,
    ) -> Result<(), OperatorError> {
        Ok(())
    }

    /// Handles a marker arriving on the given input port. A `Final` marker
    /// is delivered here after fan-in aggregation, once per port.
    async fn process_marker(
        &mut self,
        _port: usize,
        _marker: Marker,
        _ctx: &OperatorContext,
    ) -> Result<(), OperatorError> {
        Ok(())
    }

    /// Run-to-completion hook. A source operator emits its stream here;
    /// for operators with inputs this returns once any pre-completion work
    /// is done — the executor then waits for end-of-stream on every input.
    async fn complete(&mut self, _ctx: &OperatorContext) -> Result<(), OperatorError> {
        Ok(())
    }

    async fn shutdown(&mut self, _ctx: &OperatorContext) -> Result<(), OperatorError> {
        Ok(())
    }
}

/// Trivial operator forwarding every message from input port `i` to output
/// port `i` (when such an output exists). Handy as a relay in tests and
/// simple topologies.
pub struct PassThrough;

#[async_trait]
impl Operator for PassThrough {
    async fn process(
        &mut self,
        port: usize,
        tuple: Tuple,
        ctx: &OperatorContext,
    ) -> Result<(), OperatorError> {
        if port < ctx.output_count() {
            ctx.submit(port, tuple).await?;
        }
        Ok(())
    }

    async fn process_marker(
        &mut self,
        port: usize,
        marker: Marker,
        ctx: &OperatorContext,
    ) -> Result<(), OperatorError> {
        // Final markers are forwarded by the completion tracker, not here.
        if marker == Marker::Window && port < ctx.output_count() {
            ctx.punctuate(port, marker).await?;
        }
        Ok(())
    }
}

/// Per-invocation context handed to every operator hook: identity,
/// parameters, input-port window descriptions and output submission.
pub struct OperatorContext {
    index: usize,
    name: Arc<str>,
    params: IndexMap<String, Value>,
    outputs: Vec<Arc<OutputForwarder>>,
    output_schemas: Vec<Schema>,
    input_windows: Vec<WindowSpec>,
}

impl OperatorContext {
    pub(crate) fn new(
        index: usize,
        name: Arc<str>,
        params: IndexMap<String, Value>,
        outputs: Vec<Arc<OutputForwarder>>,
        output_schemas: Vec<Schema>,
        input_windows: Vec<WindowSpec>,
    ) -> Self {
        Self {
            index,
            name,
            params,
            outputs,
            output_schemas,
            input_windows,
        }
    }

    /// Index of this operator within its graph.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    pub fn parameters(&self) -> &IndexMap<String, Value> {
        &self.params
    }

    pub fn input_count(&self) -> usize {
        self.input_windows.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Window-policy description of an input port.
    pub fn input_window(&self, port: usize) -> Option<&WindowSpec> {
        self.input_windows.get(port)
    }

    pub fn output_schema(&self, port: usize) -> Option<&Schema> {
        self.output_schemas.get(port)
    }

    /// Submits a tuple on an output port. The tuple's schema must be the
    /// port's schema.
    pub async fn submit(&self, port: usize, tuple: Tuple) -> Result<(), GraphError> {
        let forwarder = self.output(port)?;
        let expected = &self.output_schemas[port];
        if tuple.schema() != expected {
            return Err(GraphError::SubmitSchemaMismatch {
                operator: self.name.to_string(),
                port,
                expected: expected.to_string(),
                actual: tuple.schema().to_string(),
            });
        }
        forwarder.forward(Message::Tuple(tuple)).await
    }

    /// Submits a marker on an output port.
    pub async fn punctuate(&self, port: usize, marker: Marker) -> Result<(), GraphError> {
        self.output(port)?.forward(Message::Marker(marker)).await
    }

    fn output(&self, port: usize) -> Result<&Arc<OutputForwarder>, GraphError> {
        self.outputs.get(port).ok_or(GraphError::UnknownPort {
            operator: self.name.to_string(),
            direction: "output",
            port,
        })
    }
}
