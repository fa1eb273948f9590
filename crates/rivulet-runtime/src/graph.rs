//! Declarative operator-graph model.
//!
//! An [`OperatorGraph`] is a mutable builder: operators are added by name,
//! ports are declared per operator with a schema, and connections wire
//! output ports to input ports. Once a [`GraphExecutor`](crate::exec::GraphExecutor)
//! is built from the graph, the structure is frozen.

use std::fmt;

use rivulet_core::{Schema, Value};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::operator::Operator;
use crate::window::WindowSpec;

/// Identifier of an operator invocation within its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpId(pub(crate) usize);

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// Identifier of an input port: operator plus index within its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InPortId {
    pub op: OpId,
    pub port: usize,
}

/// Identifier of an output port: operator plus index within its outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutPortId {
    pub op: OpId,
    pub port: usize,
}

/// Congestion policy of a queued (threaded) input port.
///
/// Markers are never dropped regardless of policy; the enqueueing side
/// waits for room instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CongestionPolicy {
    /// Block the producer until there is room.
    Wait,
    /// Drop the oldest queued tuple to make room.
    DropFirst,
    /// Drop the incoming tuple.
    DropLast,
}

/// Pass-through configuration of a queued input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadedPort {
    pub congestion: CongestionPolicy,
    pub queue_size: usize,
}

/// A declared input port: name, schema, window state and optional
/// threading configuration.
#[derive(Debug)]
pub struct InputPortDecl {
    name: String,
    schema: Schema,
    index: usize,
    window: WindowSpec,
    threading: Option<ThreadedPort>,
}

impl InputPortDecl {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Window-policy state of this port.
    pub fn window(&mut self) -> &mut WindowSpec {
        &mut self.window
    }

    pub fn window_spec(&self) -> &WindowSpec {
        &self.window
    }

    /// Backs this port with a bounded FIFO queue serviced by its own task.
    /// Queue depth and congestion policy are pass-through configuration.
    pub fn threaded(&mut self, congestion: CongestionPolicy, queue_size: usize) -> &mut Self {
        self.threading = Some(ThreadedPort {
            congestion,
            queue_size: queue_size.max(1),
        });
        self
    }

    pub fn threading(&self) -> Option<ThreadedPort> {
        self.threading
    }
}

/// A declared output port.
#[derive(Debug)]
pub struct OutputPortDecl {
    name: String,
    schema: Schema,
    index: usize,
}

impl OutputPortDecl {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// One configured operator invocation: identity, ports and parameters.
pub struct OperatorDecl {
    id: OpId,
    name: String,
    pub(crate) operator: Option<Box<dyn Operator>>,
    pub(crate) inputs: Vec<InputPortDecl>,
    pub(crate) outputs: Vec<OutputPortDecl>,
    pub(crate) params: indexmap::IndexMap<String, Value>,
}

impl OperatorDecl {
    pub fn id(&self) -> OpId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn input(&self, port: usize) -> Option<&InputPortDecl> {
        self.inputs.get(port)
    }

    pub fn output(&self, port: usize) -> Option<&OutputPortDecl> {
        self.outputs.get(port)
    }
}

impl fmt::Debug for OperatorDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorDecl")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .finish_non_exhaustive()
    }
}

/// A directed edge from an output port to an input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    pub source: OutPortId,
    pub target: InPortId,
}

/// Deduplicated set of static intra-graph connections.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    edges: Vec<Connection>,
    seen: FxHashSet<Connection>,
}

impl ConnectionRegistry {
    /// Records a connection. Returns false if it was already present.
    pub(crate) fn add(&mut self, connection: Connection) -> bool {
        if !self.seen.insert(connection) {
            return false;
        }
        self.edges.push(connection);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.edges.iter()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Number of distinct upstream connections feeding an input port.
    pub fn fan_in(&self, target: InPortId) -> usize {
        self.edges.iter().filter(|c| c.target == target).count()
    }

    /// Number of distinct downstream connections fed by an output port.
    pub fn fan_out(&self, source: OutPortId) -> usize {
        self.edges.iter().filter(|c| c.source == source).count()
    }
}

/// Mutable builder for an operator graph.
pub struct OperatorGraph {
    ops: Vec<OperatorDecl>,
    name_index: FxHashMap<String, OpId>,
    connections: ConnectionRegistry,
}

impl OperatorGraph {
    pub fn new() -> Self {
        Self {
            ops: Vec::new(),
            name_index: FxHashMap::default(),
            connections: ConnectionRegistry::default(),
        }
    }

    /// Adds an operator invocation to the graph.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateOperator`] when the name is taken.
    pub fn add_operator(
        &mut self,
        name: impl Into<String>,
        operator: Box<dyn Operator>,
    ) -> Result<OpId, GraphError> {
        let name = name.into();
        if self.name_index.contains_key(&name) {
            return Err(GraphError::DuplicateOperator(name));
        }
        let id = OpId(self.ops.len());
        self.name_index.insert(name.clone(), id);
        self.ops.push(OperatorDecl {
            id,
            name,
            operator: Some(operator),
            inputs: Vec::new(),
            outputs: Vec::new(),
            params: indexmap::IndexMap::new(),
        });
        Ok(id)
    }

    /// Declares the next input port of an operator.
    pub fn add_input(
        &mut self,
        op: OpId,
        name: impl Into<String>,
        schema: Schema,
    ) -> Result<InPortId, GraphError> {
        let decl = self.op_mut(op)?;
        let index = decl.inputs.len();
        let name = name.into();
        let window = WindowSpec::new(name.clone(), schema.clone());
        decl.inputs.push(InputPortDecl {
            name,
            schema,
            index,
            window,
            threading: None,
        });
        Ok(InPortId { op, port: index })
    }

    /// Declares the next output port of an operator.
    pub fn add_output(
        &mut self,
        op: OpId,
        name: impl Into<String>,
        schema: Schema,
    ) -> Result<OutPortId, GraphError> {
        let decl = self.op_mut(op)?;
        let index = decl.outputs.len();
        decl.outputs.push(OutputPortDecl {
            name: name.into(),
            schema,
            index,
        });
        Ok(OutPortId { op, port: index })
    }

    /// Connects output ports to an input port.
    ///
    /// Schemas must match (strictly or with optional lifting). Repeating an
    /// existing connection is a no-op; connecting several distinct outputs
    /// to one input is legal fan-in and raises the port's fan-in count.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::SchemaMismatch`] on a schema difference and
    /// [`GraphError::SelfLoop`] when an operator would feed itself.
    pub fn connect(
        &mut self,
        input: InPortId,
        outputs: impl IntoIterator<Item = OutPortId>,
    ) -> Result<(), GraphError> {
        let input_schema = self.input_decl(input)?.schema.clone();
        let outputs: Vec<OutPortId> = outputs.into_iter().collect();

        // Verify all schemas before recording anything.
        for &output in &outputs {
            if output.op == input.op {
                return Err(GraphError::SelfLoop(self.op_ref(input.op)?.name.clone()));
            }
            let out_decl = self.output_decl(output)?;
            if !out_decl.schema.matches_or_optional(&input_schema) {
                return Err(GraphError::SchemaMismatch {
                    output: self.port_label(output.op, out_decl.name.clone()),
                    input: self.port_label(input.op, self.input_decl(input)?.name.clone()),
                    output_schema: out_decl.schema.to_string(),
                    input_schema: input_schema.to_string(),
                });
            }
        }
        for output in outputs {
            self.connections.add(Connection {
                source: output,
                target: input,
            });
        }
        Ok(())
    }

    /// Sets a parameter on an operator's parameter bag.
    pub fn set_param(
        &mut self,
        op: OpId,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), GraphError> {
        self.op_mut(op)?.params.insert(name.into(), value.into());
        Ok(())
    }

    /// Mutable access to an input port declaration, for window and
    /// threading configuration.
    pub fn input_mut(&mut self, port: InPortId) -> Result<&mut InputPortDecl, GraphError> {
        let name = self.op_ref(port.op)?.name.clone();
        self.ops[port.op.0]
            .inputs
            .get_mut(port.port)
            .ok_or(GraphError::UnknownPort {
                operator: name,
                direction: "input",
                port: port.port,
            })
    }

    pub fn operator(&self, op: OpId) -> Option<&OperatorDecl> {
        self.ops.get(op.0)
    }

    pub fn operator_named(&self, name: &str) -> Option<&OperatorDecl> {
        self.name_index.get(name).map(|id| &self.ops[id.0])
    }

    pub fn operator_count(&self) -> usize {
        self.ops.len()
    }

    pub fn operators(&self) -> impl Iterator<Item = &OperatorDecl> {
        self.ops.iter()
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Whether the input port has at least one upstream connection.
    pub fn is_input_connected(&self, port: InPortId) -> bool {
        self.connections.fan_in(port) > 0
    }

    /// Whether the output port feeds at least one downstream port.
    pub fn is_output_connected(&self, port: OutPortId) -> bool {
        self.connections.fan_out(port) > 0
    }

    /// Checks the graph is runnable: every windowed port carries a complete
    /// window configuration.
    pub fn validate(&self) -> Result<(), GraphError> {
        for op in &self.ops {
            for input in &op.inputs {
                input.window.validate_complete()?;
            }
        }
        Ok(())
    }

    pub(crate) fn into_parts(self) -> (Vec<OperatorDecl>, ConnectionRegistry) {
        (self.ops, self.connections)
    }

    fn op_ref(&self, op: OpId) -> Result<&OperatorDecl, GraphError> {
        self.ops
            .get(op.0)
            .ok_or_else(|| GraphError::UnknownOperator(op.to_string()))
    }

    fn op_mut(&mut self, op: OpId) -> Result<&mut OperatorDecl, GraphError> {
        self.ops
            .get_mut(op.0)
            .ok_or_else(|| GraphError::UnknownOperator(op.to_string()))
    }

    fn input_decl(&self, port: InPortId) -> Result<&InputPortDecl, GraphError> {
        let op = self.op_ref(port.op)?;
        op.inputs.get(port.port).ok_or(GraphError::UnknownPort {
            operator: op.name.clone(),
            direction: "input",
            port: port.port,
        })
    }

    fn output_decl(&self, port: OutPortId) -> Result<&OutputPortDecl, GraphError> {
        let op = self.op_ref(port.op)?;
        op.outputs.get(port.port).ok_or(GraphError::UnknownPort {
            operator: op.name.clone(),
            direction: "output",
            port: port.port,
        })
    }

    fn port_label(&self, op: OpId, port_name: String) -> String {
        match self.ops.get(op.0) {
            Some(decl) => format!("{}.{}", decl.name, port_name),
            None => format!("{}.{}", op, port_name),
        }
    }
}

impl Default for OperatorGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OperatorGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorGraph")
            .field("operators", &self.ops.len())
            .field("connections", &self.connections.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::PassThrough;
    use rivulet_core::Type;

    fn schema() -> Schema {
        Schema::new([("v", Type::Int)]).unwrap()
    }

    fn pass() -> Box<dyn Operator> {
        Box::new(PassThrough)
    }

    #[test]
    fn test_duplicate_operator_name() {
        let mut g = OperatorGraph::new();
        g.add_operator("a", pass()).unwrap();
        assert_eq!(
            g.add_operator("a", pass()).unwrap_err(),
            GraphError::DuplicateOperator("a".into())
        );
    }

    #[test]
    fn test_port_indices_are_positional() {
        let mut g = OperatorGraph::new();
        let op = g.add_operator("a", pass()).unwrap();
        let i0 = g.add_input(op, "in0", schema()).unwrap();
        let i1 = g.add_input(op, "in1", schema()).unwrap();
        let o0 = g.add_output(op, "out0", schema()).unwrap();
        assert_eq!(i0.port, 0);
        assert_eq!(i1.port, 1);
        assert_eq!(o0.port, 0);
        assert_eq!(g.operator(op).unwrap().input_count(), 2);
    }

    #[test]
    fn test_connect_schema_mismatch() {
        let mut g = OperatorGraph::new();
        let a = g.add_operator("a", pass()).unwrap();
        let b = g.add_operator("b", pass()).unwrap();
        let out = g
            .add_output(a, "out", Schema::new([("v", Type::Str)]).unwrap())
            .unwrap();
        let inp = g.add_input(b, "in", schema()).unwrap();
        assert!(matches!(
            g.connect(inp, [out]).unwrap_err(),
            GraphError::SchemaMismatch { .. }
        ));
        assert!(g.connections().is_empty());
    }

    #[test]
    fn test_connect_optional_lifted_schema() {
        let mut g = OperatorGraph::new();
        let a = g.add_operator("a", pass()).unwrap();
        let b = g.add_operator("b", pass()).unwrap();
        let lifted = Schema::new([("v", Type::Optional(Box::new(Type::Int)))]).unwrap();
        let out = g.add_output(a, "out", schema()).unwrap();
        let inp = g.add_input(b, "in", lifted).unwrap();
        assert!(g.connect(inp, [out]).is_ok());
    }

    #[test]
    fn test_self_loop_rejected() {
        let mut g = OperatorGraph::new();
        let a = g.add_operator("a", pass()).unwrap();
        let out = g.add_output(a, "out", schema()).unwrap();
        let inp = g.add_input(a, "in", schema()).unwrap();
        assert_eq!(
            g.connect(inp, [out]).unwrap_err(),
            GraphError::SelfLoop("a".into())
        );
    }

    #[test]
    fn test_fan_in_counting_and_dedup() {
        let mut g = OperatorGraph::new();
        let a = g.add_operator("a", pass()).unwrap();
        let b = g.add_operator("b", pass()).unwrap();
        let c = g.add_operator("c", pass()).unwrap();
        let out_a = g.add_output(a, "out", schema()).unwrap();
        let out_b = g.add_output(b, "out", schema()).unwrap();
        let inp = g.add_input(c, "in", schema()).unwrap();

        g.connect(inp, [out_a]).unwrap();
        g.connect(inp, [out_b]).unwrap();
        // Repeating a connection does not raise fan-in.
        g.connect(inp, [out_a]).unwrap();

        assert_eq!(g.connections().fan_in(inp), 2);
        assert_eq!(g.connections().fan_out(out_a), 1);
        assert!(g.is_input_connected(inp));
        assert!(g.is_output_connected(out_b));
    }

    #[test]
    fn test_validate_flags_incomplete_window() {
        let mut g = OperatorGraph::new();
        let a = g.add_operator("a", pass()).unwrap();
        let inp = g.add_input(a, "in", schema()).unwrap();
        g.input_mut(inp).unwrap().window().sliding();
        assert!(matches!(g.validate().unwrap_err(), GraphError::Window(_)));

        g.input_mut(inp)
            .unwrap()
            .window()
            .sliding()
            .evict_count(10)
            .unwrap()
            .trigger_count(2)
            .unwrap();
        assert!(g.validate().is_ok());
    }

    #[test]
    fn test_set_param() {
        let mut g = OperatorGraph::new();
        let a = g.add_operator("a", pass()).unwrap();
        g.set_param(a, "threshold", 5i64).unwrap();
        assert_eq!(
            g.operator(a).unwrap().params.get("threshold"),
            Some(&Value::Int(5))
        );
    }
}
