//! Error types for graph construction and execution

use rivulet_core::SchemaError;

use crate::window::WindowError;

/// Errors surfaced by the graph builder and the graph executor.
///
/// Cloneable so a single phase failure can be broadcast to every holder of
/// that phase's completion handle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// Operator names are unique within a graph.
    #[error("duplicate operator name: {0}")]
    DuplicateOperator(String),

    /// The referenced operator does not exist.
    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    /// The referenced port does not exist on the operator.
    #[error("operator '{operator}' has no {direction} port {port}")]
    UnknownPort {
        /// Operator name.
        operator: String,
        /// "input" or "output".
        direction: &'static str,
        /// Port index within its direction.
        port: usize,
    },

    /// Connected ports carry different schemas.
    #[error("schema mismatch connecting '{output}' to '{input}': {output_schema} vs {input_schema}")]
    SchemaMismatch {
        /// Source port, `operator.port` form.
        output: String,
        /// Destination port, `operator.port` form.
        input: String,
        /// Source schema rendering.
        output_schema: String,
        /// Destination schema rendering.
        input_schema: String,
    },

    /// An operator's output may not feed its own input.
    #[error("connection would create a self-loop on operator '{0}'")]
    SelfLoop(String),

    /// A tuple submitted on an output port does not carry the port's schema.
    #[error("operator '{operator}' output {port} expects schema ({expected}), got ({actual})")]
    SubmitSchemaMismatch {
        /// Operator name.
        operator: String,
        /// Output port index.
        port: usize,
        /// Declared port schema.
        expected: String,
        /// Schema of the submitted tuple.
        actual: String,
    },

    /// Invalid window-policy configuration.
    #[error(transparent)]
    Window(#[from] WindowError),

    /// Schema/tuple construction failure.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A later phase was requested before `initialize` succeeded.
    #[error("graph is not initialized: {0}")]
    NotInitialized(String),

    /// A later phase was requested before the graph became ready.
    #[error("graph is not ready: {0}")]
    NotReady(String),

    /// An operator hook failed; the whole graph is torn down.
    #[error("operator '{operator}' failed: {message}")]
    OperatorFailed {
        /// Operator name.
        operator: String,
        /// Rendered root cause.
        message: String,
    },

    /// An unrecoverable operator fault. Never downgraded to
    /// [`GraphError::OperatorFailed`] while propagating.
    #[error("operator '{operator}' fatal error: {message}")]
    Fatal {
        /// Operator name.
        operator: String,
        /// Rendered root cause.
        message: String,
    },

    /// The awaited phase was abandoned without resolving.
    #[error("phase canceled")]
    Canceled,

    /// The graph executor has been torn down.
    #[error("graph executor is shut down")]
    TornDown,

    /// Tuple encode/decode failure.
    #[error("codec error: {0}")]
    Codec(String),
}

impl GraphError {
    /// Wraps an operator hook failure, preserving the fatal distinction.
    pub(crate) fn from_hook(operator: &str, err: OperatorError) -> GraphError {
        match err {
            OperatorError::Fatal(message) => GraphError::Fatal {
                operator: operator.to_string(),
                message,
            },
            OperatorError::Failed(cause) => {
                // Unwrap a graph error raised by a context call inside the
                // hook instead of double-wrapping it.
                match cause.downcast::<GraphError>() {
                    Ok(graph_err) => graph_err,
                    Err(cause) => GraphError::OperatorFailed {
                        operator: operator.to_string(),
                        message: format!("{cause:#}"),
                    },
                }
            }
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, GraphError::Fatal { .. })
    }
}

/// Failure raised from an operator lifecycle hook.
#[derive(Debug, thiserror::Error)]
pub enum OperatorError {
    /// Ordinary failure; carries any error the operator produced.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),

    /// Unrecoverable fault. Propagates as [`GraphError::Fatal`] without
    /// being downgraded.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl OperatorError {
    /// Ordinary failure from a message.
    pub fn failed(message: impl Into<String>) -> Self {
        OperatorError::Failed(anyhow::anyhow!(message.into()))
    }

    /// Unrecoverable fault from a message.
    pub fn fatal(message: impl Into<String>) -> Self {
        OperatorError::Fatal(message.into())
    }
}

impl From<GraphError> for OperatorError {
    fn from(err: GraphError) -> Self {
        OperatorError::Failed(err.into())
    }
}
