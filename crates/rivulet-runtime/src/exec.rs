//! Graph execution: per-operator executors and the phased graph executor.
//!
//! A [`GraphExecutor`] is built from a finished [`OperatorGraph`] and
//! drives every operator through the lifecycle
//! `initialize → connect/notify → run-to-completion → shutdown`. Each
//! phase runs its per-operator hooks concurrently on the shared tokio
//! runtime and resolves a cached, shareable [`CompletionHandle`]; phases
//! are strictly ordered and any failure tears the whole graph down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::completion::{FanInHandler, FinalMarkerTracker, FinalWatchHandler};
use crate::error::GraphError;
use crate::forwarder::OutputForwarder;
use crate::graph::{ConnectionRegistry, InPortId, OperatorGraph, OutPortId};
use crate::handler::{MessageHandler, OperatorInput, QueuedInput};
use crate::message::{Marker, Message};
use crate::operator::{Operator, OperatorContext};

/// Lifecycle state of a graph executor, derived from its phase handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Initializing,
    Initialized,
    ConnectingAndNotifying,
    Ready,
    Completing,
    Completed,
    ShuttingDown,
    Shutdown,
}

type PhaseResult = Option<Result<(), GraphError>>;

/// Shareable, awaitable handle to the eventual outcome of a phase.
///
/// Clones observe the same resolution; awaiting an already-resolved handle
/// returns the cached outcome immediately. Dropping an awaiting future
/// does not disturb the phase.
#[derive(Clone)]
pub struct CompletionHandle {
    rx: watch::Receiver<PhaseResult>,
}

impl CompletionHandle {
    fn pending() -> (watch::Sender<PhaseResult>, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self { rx })
    }

    fn immediate(result: Result<(), GraphError>) -> Self {
        let (_tx, rx) = watch::channel(Some(result));
        Self { rx }
    }

    /// Waits for the phase to resolve.
    pub async fn wait(&self) -> Result<(), GraphError> {
        let mut rx = self.rx.clone();
        loop {
            {
                let current = rx.borrow_and_update();
                if let Some(result) = current.as_ref() {
                    return result.clone();
                }
            }
            if rx.changed().await.is_err() {
                // The phase task vanished without resolving.
                let current = rx.borrow();
                return current.clone().unwrap_or(Err(GraphError::Canceled));
            }
        }
    }

    /// The outcome, if the phase has resolved.
    pub fn try_result(&self) -> Option<Result<(), GraphError>> {
        self.rx.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.rx.borrow().is_some()
    }

    fn is_ok(&self) -> bool {
        matches!(*self.rx.borrow(), Some(Ok(())))
    }
}

/// Execution adapter around one operator invocation: owns the operator
/// instance, its input handler chains, output forwarders and end-of-stream
/// tracker.
pub(crate) struct OperatorExecutor {
    name: Arc<str>,
    operator: Arc<tokio::sync::Mutex<Box<dyn Operator>>>,
    ctx: Arc<OperatorContext>,
    forwarders: Vec<Arc<OutputForwarder>>,
    inputs: Vec<Arc<dyn MessageHandler>>,
    tracker: Option<Arc<FinalMarkerTracker>>,
    /// Pump tasks of queued ports, aborted at teardown.
    pumps: Mutex<Vec<JoinHandle<()>>>,
}

impl OperatorExecutor {
    fn build(
        decl: crate::graph::OperatorDecl,
        connections: &ConnectionRegistry,
    ) -> Arc<OperatorExecutor> {
        let id = decl.id();
        let name: Arc<str> = Arc::from(decl.name());
        let forwarders: Vec<Arc<OutputForwarder>> = decl
            .outputs
            .iter()
            .map(|out| Arc::new(OutputForwarder::new(Arc::clone(&name), out.index())))
            .collect();
        let output_schemas = decl.outputs.iter().map(|o| o.schema().clone()).collect();
        let input_windows = decl
            .inputs
            .iter()
            .map(|i| i.window_spec().clone())
            .collect();

        let ctx = Arc::new(OperatorContext::new(
            id.0,
            Arc::clone(&name),
            decl.params.clone(),
            forwarders.clone(),
            output_schemas,
            input_windows,
        ));

        let mut decl = decl;
        let operator = Arc::new(tokio::sync::Mutex::new(
            decl.operator.take().expect("operator instance already taken"),
        ));

        // The tracker must exist before the input handlers so they can be
        // wrapped by it. Sinks get one too: completion of any operator
        // with inputs is gated on end-of-stream of all of them.
        let tracker = (!decl.inputs.is_empty()).then(|| {
            FinalMarkerTracker::new(Arc::clone(&name), decl.inputs.len(), forwarders.clone())
        });

        let mut pumps = Vec::new();
        let inputs: Vec<Arc<dyn MessageHandler>> = decl
            .inputs
            .iter()
            .map(|input| {
                let port_label = format!("{}.{}", name, input.name());
                let mut handler: Arc<dyn MessageHandler> = Arc::new(OperatorInput {
                    operator: Arc::clone(&operator),
                    ctx: Arc::clone(&ctx),
                    port: input.index(),
                });
                if let Some(config) = input.threading() {
                    let (queued, pump) = QueuedInput::spawn(port_label.clone(), config, handler);
                    pumps.push(pump);
                    handler = queued;
                }
                if let Some(tracker) = &tracker {
                    handler = Arc::new(FinalWatchHandler {
                        inner: handler,
                        tracker: Arc::clone(tracker),
                    });
                }
                let fan_in = connections.fan_in(InPortId {
                    op: id,
                    port: input.index(),
                });
                if fan_in > 1 {
                    handler = Arc::new(FanInHandler::new(port_label, fan_in, handler));
                }
                handler
            })
            .collect();

        Arc::new(OperatorExecutor {
            name,
            operator,
            ctx,
            forwarders,
            inputs,
            tracker,
            pumps: Mutex::new(pumps),
        })
    }

    /// Completion probe: run the operator's completion hook, then either
    /// broadcast end-of-stream (sources) or wait for every input to end.
    async fn complete_probe(self: Arc<Self>) -> Result<(), GraphError> {
        {
            let mut operator = self.operator.lock().await;
            operator
                .complete(&self.ctx)
                .await
                .map_err(|err| GraphError::from_hook(&self.name, err))?;
        }
        match &self.tracker {
            None => {
                for forwarder in &self.forwarders {
                    forwarder.forward(Message::Marker(Marker::Final)).await?;
                }
                debug!(operator = %self.name, "source completed");
                Ok(())
            }
            Some(tracker) => {
                let mut done = tracker.completed();
                while !*done.borrow_and_update() {
                    if done.changed().await.is_err() {
                        return Err(GraphError::Canceled);
                    }
                }
                debug!(operator = %self.name, "completed");
                Ok(())
            }
        }
    }

    fn abort_pumps(&self) {
        let mut pumps = self.pumps.lock().expect("pump list poisoned");
        for pump in pumps.drain(..) {
            pump.abort();
        }
    }
}

#[derive(Default)]
struct Phases {
    initialize: Option<CompletionHandle>,
    connect: Option<CompletionHandle>,
    complete: Option<CompletionHandle>,
    run: Option<CompletionHandle>,
    shutdown: Option<CompletionHandle>,
}

struct ExecCore {
    executors: Vec<Arc<OperatorExecutor>>,
    connections: ConnectionRegistry,
    phases: Mutex<Phases>,
    torn_down: AtomicBool,
}

/// Orchestrates the phased lifecycle across all operator executors.
///
/// Cheap to clone; clones drive the same graph. Phase requests are
/// idempotent — the first caller wins and everyone receives the same
/// [`CompletionHandle`]. Must be used inside a tokio runtime.
#[derive(Clone)]
pub struct GraphExecutor {
    core: Arc<ExecCore>,
}

impl GraphExecutor {
    /// Builds an executor from a graph, materializing one operator
    /// executor per invocation.
    ///
    /// # Errors
    ///
    /// Returns a [`GraphError::Window`] when any input port carries an
    /// incomplete window configuration.
    pub fn new(graph: OperatorGraph) -> Result<Self, GraphError> {
        graph.validate()?;
        let (decls, connections) = graph.into_parts();
        let executors = decls
            .into_iter()
            .map(|decl| OperatorExecutor::build(decl, &connections))
            .collect();
        Ok(Self {
            core: Arc::new(ExecCore {
                executors,
                connections,
                phases: Mutex::new(Phases::default()),
                torn_down: AtomicBool::new(false),
            }),
        })
    }

    /// Current lifecycle state, derived from the phase handles.
    pub fn phase(&self) -> Phase {
        let phases = self.core.phases.lock().expect("phase table poisoned");
        if let Some(shutdown) = &phases.shutdown {
            return if shutdown.is_finished() {
                Phase::Shutdown
            } else {
                Phase::ShuttingDown
            };
        }
        if let Some(complete) = &phases.complete {
            return if complete.is_ok() {
                Phase::Completed
            } else {
                Phase::Completing
            };
        }
        if let Some(connect) = &phases.connect {
            return if connect.is_ok() {
                Phase::Ready
            } else {
                Phase::ConnectingAndNotifying
            };
        }
        if let Some(initialize) = &phases.initialize {
            return if initialize.is_ok() {
                Phase::Initialized
            } else {
                Phase::Initializing
            };
        }
        Phase::Uninitialized
    }

    /// Requests the Initializing phase: every operator's `initialize` hook
    /// runs concurrently, in no particular order across operators.
    pub fn initialize(&self) -> CompletionHandle {
        let mut phases = self.core.phases.lock().expect("phase table poisoned");
        if let Some(handle) = &phases.initialize {
            return handle.clone();
        }
        if self.core.torn_down.load(Ordering::SeqCst) {
            return CompletionHandle::immediate(Err(GraphError::TornDown));
        }
        let (tx, handle) = CompletionHandle::pending();
        phases.initialize = Some(handle.clone());
        drop(phases);

        let core = Arc::clone(&self.core);
        tokio::spawn(async move {
            let result = core.initialize_all().await;
            if let Err(err) = &result {
                error!(%err, "initialize failed, tearing down");
                core.teardown();
            }
            let _ = tx.send(Some(result));
        });
        handle
    }

    /// Requests the ConnectingAndNotifying phase: static connections are
    /// bound first, then every operator's `all_ports_ready` hook runs.
    pub fn connect_and_notify(&self) -> CompletionHandle {
        self.gated_phase(
            "connect",
            |phases| phases.connect.clone(),
            |phases, handle| phases.connect = Some(handle),
            |phases| {
                Self::require_ok("initialize", &phases.initialize)
                    .map_err(GraphError::NotInitialized)
            },
            |core| async move { core.connect_all().await },
        )
    }

    /// Requests the Completing phase: one completion probe per operator,
    /// all concurrent; resolves when every operator has completed.
    pub fn complete(&self) -> CompletionHandle {
        self.gated_phase(
            "complete",
            |phases| phases.complete.clone(),
            |phases, handle| phases.complete = Some(handle),
            |phases| {
                Self::require_ok("connect-and-notify", &phases.connect)
                    .map_err(GraphError::NotReady)
            },
            |core| async move { core.complete_all().await },
        )
    }

    /// Chains initialize → connect/notify → completion, resolving when the
    /// whole graph has run to completion.
    pub fn run_to_completion(&self) -> CompletionHandle {
        let mut phases = self.core.phases.lock().expect("phase table poisoned");
        if let Some(handle) = &phases.run {
            return handle.clone();
        }
        if self.core.torn_down.load(Ordering::SeqCst) {
            return CompletionHandle::immediate(Err(GraphError::TornDown));
        }
        let (tx, handle) = CompletionHandle::pending();
        phases.run = Some(handle.clone());
        drop(phases);

        let this = self.clone();
        tokio::spawn(async move {
            let result = async {
                this.initialize().wait().await?;
                this.connect_and_notify().wait().await?;
                this.complete().wait().await
            }
            .await;
            let _ = tx.send(Some(result));
        });
        handle
    }

    /// Requests the ShuttingDown phase. Shutdown hooks never overtake an
    /// in-flight phase: whatever has been requested resolves first. The
    /// executor is torn down unconditionally afterwards, even when a hook
    /// fails.
    pub fn shutdown(&self) -> CompletionHandle {
        let mut phases = self.core.phases.lock().expect("phase table poisoned");
        if let Some(handle) = &phases.shutdown {
            return handle.clone();
        }
        let (tx, handle) = CompletionHandle::pending();
        phases.shutdown = Some(handle.clone());
        let in_flight: Vec<CompletionHandle> = [
            phases.run.as_ref(),
            phases.complete.as_ref(),
            phases.connect.as_ref(),
            phases.initialize.as_ref(),
        ]
        .into_iter()
        .flatten()
        .cloned()
        .collect();
        drop(phases);

        let core = Arc::clone(&self.core);
        tokio::spawn(async move {
            for prior in in_flight {
                let _ = prior.wait().await;
            }
            let result = core.shutdown_all().await;
            core.teardown();
            let _ = tx.send(Some(result));
        });
        handle
    }

    /// Runs the full sequence — initialize, connect/notify, completion,
    /// shutdown — and surfaces the first underlying error.
    ///
    /// Cancel-safe: dropping this future mid-run still issues shutdown
    /// asynchronously instead of leaving operators running.
    pub async fn execute_to_completion(&self) -> Result<(), GraphError> {
        struct ShutdownOnDrop(Option<GraphExecutor>);
        impl Drop for ShutdownOnDrop {
            fn drop(&mut self) {
                if let Some(executor) = self.0.take() {
                    if tokio::runtime::Handle::try_current().is_ok() {
                        let _ = executor.shutdown();
                    }
                }
            }
        }

        let mut guard = ShutdownOnDrop(Some(self.clone()));
        let run = self.run_to_completion().wait().await;
        guard.0 = None;
        let shutdown = self.shutdown().wait().await;
        run.and(shutdown)
    }

    /// Direct injector for an input port: the outermost handler of its
    /// chain, exactly as an upstream connection would see it. Lets tests
    /// push tuples and markers without a real upstream operator.
    pub fn input_injector(
        &self,
        port: InPortId,
    ) -> Result<Arc<dyn MessageHandler>, GraphError> {
        let executor = self
            .core
            .executors
            .get(port.op.0)
            .ok_or_else(|| GraphError::UnknownOperator(port.op.to_string()))?;
        executor
            .inputs
            .get(port.port)
            .cloned()
            .ok_or(GraphError::UnknownPort {
                operator: executor.name.to_string(),
                direction: "input",
                port: port.port,
            })
    }

    /// Attaches an additional observer to an output port. Existing
    /// bindings are kept: the output multicasts to all of them.
    pub fn bind_output(
        &self,
        port: OutPortId,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), GraphError> {
        let executor = self
            .core
            .executors
            .get(port.op.0)
            .ok_or_else(|| GraphError::UnknownOperator(port.op.to_string()))?;
        let forwarder = executor
            .forwarders
            .get(port.port)
            .ok_or(GraphError::UnknownPort {
                operator: executor.name.to_string(),
                direction: "output",
                port: port.port,
            })?;
        forwarder.bind(handler);
        Ok(())
    }

    /// Fan-in count the executor derived for an input port.
    pub fn fan_in(&self, port: InPortId) -> usize {
        self.core.connections.fan_in(port)
    }

    pub fn operator_count(&self) -> usize {
        self.core.executors.len()
    }

    /// Requests a phase behind its predecessor gate, with idempotent
    /// handle caching and teardown on gate violation or phase failure.
    fn gated_phase<G, S, C, F, Fut>(
        &self,
        label: &'static str,
        get: G,
        set: S,
        check: C,
        run: F,
    ) -> CompletionHandle
    where
        G: Fn(&Phases) -> Option<CompletionHandle>,
        S: Fn(&mut Phases, CompletionHandle),
        C: Fn(&Phases) -> Result<(), GraphError>,
        F: FnOnce(Arc<ExecCore>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), GraphError>> + Send + 'static,
    {
        let mut phases = self.core.phases.lock().expect("phase table poisoned");
        if let Some(handle) = get(&phases) {
            return handle;
        }
        if self.core.torn_down.load(Ordering::SeqCst) {
            return CompletionHandle::immediate(Err(GraphError::TornDown));
        }
        if let Err(err) = check(&phases) {
            let handle = CompletionHandle::immediate(Err(err.clone()));
            set(&mut phases, handle.clone());
            drop(phases);
            warn!(phase = label, %err, "phase requested out of order, tearing down");
            self.core.teardown();
            return handle;
        }
        let (tx, handle) = CompletionHandle::pending();
        set(&mut phases, handle.clone());
        drop(phases);

        let core = Arc::clone(&self.core);
        tokio::spawn(async move {
            let result = run(Arc::clone(&core)).await;
            if let Err(err) = &result {
                error!(phase = label, %err, "phase failed, tearing down");
                core.teardown();
            }
            let _ = tx.send(Some(result));
        });
        handle
    }

    fn require_ok(
        label: &'static str,
        handle: &Option<CompletionHandle>,
    ) -> Result<(), String> {
        match handle {
            None => Err(format!("{label} has not been requested")),
            Some(handle) => match handle.try_result() {
                None => Err(format!("{label} has not finished")),
                Some(Err(err)) => Err(format!("{label} failed: {err}")),
                Some(Ok(())) => Ok(()),
            },
        }
    }
}

impl ExecCore {
    async fn initialize_all(&self) -> Result<(), GraphError> {
        info!(operators = self.executors.len(), "initializing graph");
        let mut tasks = JoinSet::new();
        for executor in &self.executors {
            let executor = Arc::clone(executor);
            tasks.spawn(async move {
                let mut operator = executor.operator.lock().await;
                operator
                    .initialize(&executor.ctx)
                    .await
                    .map_err(|err| GraphError::from_hook(&executor.name, err))
            });
        }
        join_phase(tasks).await
    }

    async fn connect_all(&self) -> Result<(), GraphError> {
        // Bind every static connection before any ports-ready hook runs.
        for connection in self.connections.iter() {
            let target = &self.executors[connection.target.op.0];
            let handler = Arc::clone(&target.inputs[connection.target.port]);
            let source = &self.executors[connection.source.op.0];
            source.forwarders[connection.source.port].bind(handler);
        }
        info!(
            connections = self.connections.len(),
            "static connections bound, notifying ports ready"
        );

        let mut tasks = JoinSet::new();
        for executor in &self.executors {
            let executor = Arc::clone(executor);
            tasks.spawn(async move {
                let mut operator = executor.operator.lock().await;
                operator
                    .all_ports_ready(&executor.ctx)
                    .await
                    .map_err(|err| GraphError::from_hook(&executor.name, err))
            });
        }
        join_phase(tasks).await
    }

    async fn complete_all(&self) -> Result<(), GraphError> {
        info!("running graph to completion");
        let mut tasks = JoinSet::new();
        for executor in &self.executors {
            tasks.spawn(Arc::clone(executor).complete_probe());
        }
        join_phase(tasks).await
    }

    async fn shutdown_all(&self) -> Result<(), GraphError> {
        info!("shutting down graph");
        let mut tasks = JoinSet::new();
        for executor in &self.executors {
            let executor = Arc::clone(executor);
            tasks.spawn(async move {
                let mut operator = executor.operator.lock().await;
                operator
                    .shutdown(&executor.ctx)
                    .await
                    .map_err(|err| GraphError::from_hook(&executor.name, err))
            });
        }
        // Every hook runs even when one fails; the first failure is kept.
        let mut first: Option<GraphError> = None;
        while let Some(joined) = tasks.join_next().await {
            match flatten_join(joined) {
                Ok(()) => {}
                Err(err) => {
                    warn!(%err, "shutdown hook failed");
                    first.get_or_insert(err);
                }
            }
        }
        match first {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// Releases executor resources. Idempotent and safe to call from the
    /// failure path, from cancellation and from normal shutdown, in any
    /// number of threads at once.
    fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        for executor in &self.executors {
            executor.abort_pumps();
        }
        debug!("graph executor torn down");
    }
}

/// Awaits a phase's tasks; the first failure aborts the remaining waits.
async fn join_phase(mut tasks: JoinSet<Result<(), GraphError>>) -> Result<(), GraphError> {
    let mut first: Option<GraphError> = None;
    while let Some(joined) = tasks.join_next().await {
        match flatten_join(joined) {
            Ok(()) => {}
            Err(err) => {
                first.get_or_insert(err);
                tasks.abort_all();
            }
        }
    }
    match first {
        None => Ok(()),
        Some(err) => Err(err),
    }
}

fn flatten_join(
    joined: Result<Result<(), GraphError>, tokio::task::JoinError>,
) -> Result<(), GraphError> {
    match joined {
        Ok(result) => result,
        Err(join_err) if join_err.is_cancelled() => Ok(()),
        Err(join_err) => Err(GraphError::Fatal {
            operator: "<task>".into(),
            message: join_err.to_string(),
        }),
    }
}
