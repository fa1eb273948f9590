//! Shared test operators and fixtures.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rivulet_core::{Schema, Tuple, Type, Value};
use rivulet_runtime::{Marker, Operator, OperatorContext, OperatorError};

/// Route engine logs through the test harness when `RUST_LOG` is set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn int_schema() -> Schema {
    Schema::new([("seq", Type::Int)]).unwrap()
}

pub fn int_tuple(seq: i64) -> Tuple {
    int_schema().tuple_from_values([Value::Int(seq)]).unwrap()
}

/// Shared, ordered log of lifecycle events across operators.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.snapshot().iter().position(|e| e == entry)
    }

    pub fn count_of(&self, entry: &str) -> usize {
        self.snapshot().iter().filter(|e| *e == entry).count()
    }
}

/// Source operator: emits the given tuples on output port 0 during its
/// completion hook, after an optional delay.
pub struct Emitter {
    pub tuples: Vec<Tuple>,
    pub delay: Duration,
    pub log: EventLog,
}

impl Emitter {
    pub fn new(tuples: Vec<Tuple>) -> Self {
        Self {
            tuples,
            delay: Duration::ZERO,
            log: EventLog::new(),
        }
    }

    pub fn counting(n: i64) -> Self {
        Self::new((0..n).map(int_tuple).collect())
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = log;
        self
    }
}

#[async_trait]
impl Operator for Emitter {
    async fn complete(&mut self, ctx: &OperatorContext) -> Result<(), OperatorError> {
        self.log.push(format!("{}:complete:start", ctx.name()));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        for tuple in self.tuples.drain(..) {
            ctx.submit(0, tuple).await?;
        }
        self.log.push(format!("{}:complete:end", ctx.name()));
        Ok(())
    }
}

/// Records every hook invocation and every received message.
#[derive(Default)]
pub struct Recorder {
    pub log: EventLog,
    pub tuples: Arc<Mutex<Vec<(usize, Tuple)>>>,
}

impl Recorder {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            tuples: Arc::default(),
        }
    }

    pub fn tuple_store(&self) -> Arc<Mutex<Vec<(usize, Tuple)>>> {
        Arc::clone(&self.tuples)
    }
}

#[async_trait]
impl Operator for Recorder {
    async fn initialize(&mut self, ctx: &OperatorContext) -> Result<(), OperatorError> {
        self.log.push(format!("{}:initialize", ctx.name()));
        Ok(())
    }

    async fn all_ports_ready(&mut self, ctx: &OperatorContext) -> Result<(), OperatorError> {
        self.log.push(format!("{}:ports_ready", ctx.name()));
        Ok(())
    }

    async fn process(
        &mut self,
        port: usize,
        tuple: Tuple,
        ctx: &OperatorContext,
    ) -> Result<(), OperatorError> {
        self.log.push(format!("{}:process:{}", ctx.name(), port));
        self.tuples.lock().unwrap().push((port, tuple));
        Ok(())
    }

    async fn process_marker(
        &mut self,
        port: usize,
        marker: Marker,
        ctx: &OperatorContext,
    ) -> Result<(), OperatorError> {
        let kind = match marker {
            Marker::Window => "window",
            Marker::Final => "final",
        };
        self.log.push(format!("{}:{}:{}", ctx.name(), kind, port));
        Ok(())
    }

    async fn complete(&mut self, ctx: &OperatorContext) -> Result<(), OperatorError> {
        self.log.push(format!("{}:complete", ctx.name()));
        Ok(())
    }

    async fn shutdown(&mut self, ctx: &OperatorContext) -> Result<(), OperatorError> {
        self.log.push(format!("{}:shutdown", ctx.name()));
        Ok(())
    }
}

/// Fails in the named hook, either ordinarily or fatally.
pub struct FailingOp {
    pub hook: &'static str,
    pub fatal: bool,
}

impl FailingOp {
    fn maybe_fail(&self, hook: &'static str) -> Result<(), OperatorError> {
        if self.hook != hook {
            return Ok(());
        }
        if self.fatal {
            Err(OperatorError::fatal(format!("{hook} blew up")))
        } else {
            Err(OperatorError::failed(format!("{hook} blew up")))
        }
    }
}

#[async_trait]
impl Operator for FailingOp {
    async fn initialize(&mut self, _ctx: &OperatorContext) -> Result<(), OperatorError> {
        self.maybe_fail("initialize")
    }

    async fn all_ports_ready(&mut self, _ctx: &OperatorContext) -> Result<(), OperatorError> {
        self.maybe_fail("all_ports_ready")
    }

    async fn complete(&mut self, _ctx: &OperatorContext) -> Result<(), OperatorError> {
        self.maybe_fail("complete")
    }

    async fn shutdown(&mut self, _ctx: &OperatorContext) -> Result<(), OperatorError> {
        self.maybe_fail("shutdown")
    }
}
