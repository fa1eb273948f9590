//! Window-policy configuration for input ports.
//!
//! This module only *describes* window policies; applying eviction and
//! triggering at runtime is the job of whatever windowing machinery the
//! embedding plugs in. A port starts out not windowed; switching it to
//! tumbling or sliding resets any previously configured policies, and a
//! complete configuration (eviction policy, plus a trigger policy for
//! sliding windows) must be in place before the graph may run.

use rivulet_core::{Schema, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Windowing mode of an input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowMode {
    NotWindowed,
    Tumbling,
    Sliding,
}

impl fmt::Display for WindowMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowMode::NotWindowed => write!(f, "not windowed"),
            WindowMode::Tumbling => write!(f, "tumbling"),
            WindowMode::Sliding => write!(f, "sliding"),
        }
    }
}

/// Eviction or trigger policy for a windowed port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WindowPolicy {
    /// Evict/trigger every `n` tuples.
    Count(u64),
    /// Evict/trigger on elapsed seconds.
    Time(f64),
    /// Evict on a window marker. Tumbling eviction only.
    Punctuation,
    /// Evict/trigger when the named attribute drifts more than `delta`
    /// from the oldest buffered tuple.
    Delta {
        /// Attribute the delta is computed over.
        attribute: String,
        /// Maximum drift; its type must equal the attribute's.
        delta: Value,
    },
}

/// Eviction policy for partitions of a partitioned window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PartitionEviction {
    /// Evict partitions older than the given seconds.
    Age(f64),
    /// Keep at most `n` partitions.
    PartitionCount(u64),
    /// Keep at most `n` tuples across all partitions.
    TupleCount(u64),
}

/// Invalid window-policy configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WindowError {
    #[error("port '{0}' is not windowed")]
    NotWindowed(String),

    #[error("port '{port}' window is {actual}, expected {expected}")]
    WrongMode {
        port: String,
        actual: WindowMode,
        expected: WindowMode,
    },

    #[error("port '{port}' window {policy} count {value} is negative")]
    NegativeCount {
        port: String,
        policy: &'static str,
        value: i64,
    },

    #[error("port '{port}' window {policy} time {value} is negative")]
    NegativeTime {
        port: String,
        policy: &'static str,
        value: f64,
    },

    #[error("port '{port}' delta attribute '{attribute}' does not exist")]
    DeltaAttributeNotFound { port: String, attribute: String },

    #[error("port '{port}' delta attribute '{attribute}' has type {expected}, delta value is {actual}")]
    DeltaTypeMismatch {
        port: String,
        attribute: String,
        expected: String,
        actual: &'static str,
    },

    #[error("port '{0}' window is not partitioned")]
    NotPartitioned(String),

    #[error("port '{0}' has no window eviction policy")]
    MissingEvictionPolicy(String),

    #[error("port '{0}' sliding window has no trigger policy")]
    MissingTriggerPolicy(String),
}

/// Window-policy state of one input port.
///
/// Mutators mirror the declaration API: `tumbling()`/`sliding()` select the
/// mode (resetting everything else), the `evict_*`/`trigger_*` family fills
/// in policies, `partitioned()` unlocks the `partition_eviction_*` family.
/// Every mutator validates eagerly and reports a [`WindowError`] at the
/// offending call.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSpec {
    port: String,
    schema: Schema,
    mode: WindowMode,
    partitioned: bool,
    eviction: Option<WindowPolicy>,
    trigger: Option<WindowPolicy>,
    partition_eviction: Option<PartitionEviction>,
}

impl WindowSpec {
    pub(crate) fn new(port: impl Into<String>, schema: Schema) -> Self {
        Self {
            port: port.into(),
            schema,
            mode: WindowMode::NotWindowed,
            partitioned: false,
            eviction: None,
            trigger: None,
            partition_eviction: None,
        }
    }

    pub fn mode(&self) -> WindowMode {
        self.mode
    }

    pub fn is_partitioned(&self) -> bool {
        self.partitioned
    }

    pub fn eviction(&self) -> Option<&WindowPolicy> {
        self.eviction.as_ref()
    }

    pub fn trigger(&self) -> Option<&WindowPolicy> {
        self.trigger.as_ref()
    }

    pub fn partition_eviction(&self) -> Option<&PartitionEviction> {
        self.partition_eviction.as_ref()
    }

    /// Switches the port to a tumbling window, resetting all policies.
    pub fn tumbling(&mut self) -> &mut Self {
        self.reset();
        self.mode = WindowMode::Tumbling;
        self
    }

    /// Switches the port to a sliding window, resetting all policies.
    pub fn sliding(&mut self) -> &mut Self {
        self.reset();
        self.mode = WindowMode::Sliding;
        self
    }

    fn reset(&mut self) {
        self.mode = WindowMode::NotWindowed;
        self.partitioned = false;
        self.eviction = None;
        self.trigger = None;
        self.partition_eviction = None;
    }

    /// Marks the window as partitioned, unlocking partition eviction.
    pub fn partitioned(&mut self) -> Result<&mut Self, WindowError> {
        self.check_windowed()?;
        self.partitioned = true;
        Ok(self)
    }

    pub fn evict_count(&mut self, count: i64) -> Result<&mut Self, WindowError> {
        self.check_windowed()?;
        self.eviction = Some(WindowPolicy::Count(self.check_count("eviction", count)?));
        Ok(self)
    }

    pub fn evict_time(&mut self, seconds: f64) -> Result<&mut Self, WindowError> {
        self.check_windowed()?;
        self.eviction = Some(WindowPolicy::Time(self.check_time("eviction", seconds)?));
        Ok(self)
    }

    /// Punctuation eviction: the window flushes on each window marker.
    /// Tumbling windows only.
    pub fn evict_punctuation(&mut self) -> Result<&mut Self, WindowError> {
        self.check_mode(WindowMode::Tumbling)?;
        self.eviction = Some(WindowPolicy::Punctuation);
        Ok(self)
    }

    pub fn evict_delta(&mut self, attribute: &str, delta: Value) -> Result<&mut Self, WindowError> {
        self.check_windowed()?;
        self.check_delta(attribute, &delta)?;
        self.eviction = Some(WindowPolicy::Delta {
            attribute: attribute.to_string(),
            delta,
        });
        Ok(self)
    }

    pub fn trigger_count(&mut self, count: i64) -> Result<&mut Self, WindowError> {
        self.check_mode(WindowMode::Sliding)?;
        self.trigger = Some(WindowPolicy::Count(self.check_count("trigger", count)?));
        Ok(self)
    }

    pub fn trigger_time(&mut self, seconds: f64) -> Result<&mut Self, WindowError> {
        self.check_mode(WindowMode::Sliding)?;
        self.trigger = Some(WindowPolicy::Time(self.check_time("trigger", seconds)?));
        Ok(self)
    }

    pub fn trigger_delta(&mut self, attribute: &str, delta: Value) -> Result<&mut Self, WindowError> {
        self.check_mode(WindowMode::Sliding)?;
        self.check_delta(attribute, &delta)?;
        self.trigger = Some(WindowPolicy::Delta {
            attribute: attribute.to_string(),
            delta,
        });
        Ok(self)
    }

    pub fn partition_eviction_age(&mut self, seconds: f64) -> Result<&mut Self, WindowError> {
        self.check_partitioned()?;
        self.partition_eviction = Some(PartitionEviction::Age(
            self.check_time("partition eviction", seconds)?,
        ));
        Ok(self)
    }

    pub fn partition_eviction_count(&mut self, count: i64) -> Result<&mut Self, WindowError> {
        self.check_partitioned()?;
        self.partition_eviction = Some(PartitionEviction::PartitionCount(
            self.check_count("partition eviction", count)?,
        ));
        Ok(self)
    }

    pub fn partition_eviction_tuple_count(&mut self, count: i64) -> Result<&mut Self, WindowError> {
        self.check_partitioned()?;
        self.partition_eviction = Some(PartitionEviction::TupleCount(
            self.check_count("partition tuple eviction", count)?,
        ));
        Ok(self)
    }

    /// Run-readiness check: a windowed port needs an eviction policy and a
    /// sliding port additionally needs a trigger policy.
    pub fn validate_complete(&self) -> Result<(), WindowError> {
        if self.mode == WindowMode::NotWindowed {
            return Ok(());
        }
        if self.eviction.is_none() {
            return Err(WindowError::MissingEvictionPolicy(self.port.clone()));
        }
        if self.mode == WindowMode::Sliding && self.trigger.is_none() {
            return Err(WindowError::MissingTriggerPolicy(self.port.clone()));
        }
        Ok(())
    }

    fn check_windowed(&self) -> Result<(), WindowError> {
        if self.mode == WindowMode::NotWindowed {
            return Err(WindowError::NotWindowed(self.port.clone()));
        }
        Ok(())
    }

    fn check_mode(&self, expected: WindowMode) -> Result<(), WindowError> {
        self.check_windowed()?;
        if self.mode != expected {
            return Err(WindowError::WrongMode {
                port: self.port.clone(),
                actual: self.mode,
                expected,
            });
        }
        Ok(())
    }

    fn check_partitioned(&self) -> Result<(), WindowError> {
        self.check_windowed()?;
        if !self.partitioned {
            return Err(WindowError::NotPartitioned(self.port.clone()));
        }
        Ok(())
    }

    fn check_count(&self, policy: &'static str, count: i64) -> Result<u64, WindowError> {
        u64::try_from(count).map_err(|_| WindowError::NegativeCount {
            port: self.port.clone(),
            policy,
            value: count,
        })
    }

    fn check_time(&self, policy: &'static str, seconds: f64) -> Result<f64, WindowError> {
        if seconds < 0.0 {
            return Err(WindowError::NegativeTime {
                port: self.port.clone(),
                policy,
                value: seconds,
            });
        }
        Ok(seconds)
    }

    fn check_delta(&self, attribute: &str, delta: &Value) -> Result<(), WindowError> {
        let attr = self.schema.attribute_named(attribute).ok_or_else(|| {
            WindowError::DeltaAttributeNotFound {
                port: self.port.clone(),
                attribute: attribute.to_string(),
            }
        })?;
        let matches = delta
            .value_type()
            .is_some_and(|ty| &ty == attr.ty.value_type());
        if !matches {
            return Err(WindowError::DeltaTypeMismatch {
                port: self.port.clone(),
                attribute: attribute.to_string(),
                expected: attr.ty.to_string(),
                actual: delta.type_name(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivulet_core::Type;

    fn spec() -> WindowSpec {
        let schema = Schema::new([("seq", Type::Int), ("sym", Type::Str)]).unwrap();
        WindowSpec::new("in", schema)
    }

    #[test]
    fn test_initially_not_windowed() {
        let w = spec();
        assert_eq!(w.mode(), WindowMode::NotWindowed);
        assert!(w.validate_complete().is_ok());
    }

    #[test]
    fn test_policy_before_mode_is_error() {
        let mut w = spec();
        assert_eq!(
            w.evict_count(5).unwrap_err(),
            WindowError::NotWindowed("in".into())
        );
    }

    #[test]
    fn test_negative_count_rejected() {
        let mut w = spec();
        w.sliding();
        let err = w.evict_count(-1).unwrap_err();
        assert!(matches!(err, WindowError::NegativeCount { value: -1, .. }));
    }

    #[test]
    fn test_negative_time_rejected() {
        let mut w = spec();
        w.tumbling();
        assert!(matches!(
            w.evict_time(-0.5).unwrap_err(),
            WindowError::NegativeTime { .. }
        ));
    }

    #[test]
    fn test_trigger_on_tumbling_is_wrong_mode() {
        let mut w = spec();
        w.tumbling();
        let err = w.trigger_count(2).unwrap_err();
        assert_eq!(
            err,
            WindowError::WrongMode {
                port: "in".into(),
                actual: WindowMode::Tumbling,
                expected: WindowMode::Sliding,
            }
        );
    }

    #[test]
    fn test_punctuation_is_tumbling_only() {
        let mut w = spec();
        w.sliding();
        assert!(matches!(
            w.evict_punctuation().unwrap_err(),
            WindowError::WrongMode { .. }
        ));
        w.tumbling();
        assert!(w.evict_punctuation().is_ok());
    }

    #[test]
    fn test_mode_switch_resets_policies() {
        let mut w = spec();
        w.tumbling().evict_count(10).unwrap();
        assert!(w.eviction().is_some());
        w.sliding();
        assert_eq!(w.mode(), WindowMode::Sliding);
        assert!(w.eviction().is_none());
        assert!(!w.is_partitioned());
    }

    #[test]
    fn test_delta_validation() {
        let mut w = spec();
        w.sliding();
        assert!(matches!(
            w.evict_delta("missing", Value::Int(1)).unwrap_err(),
            WindowError::DeltaAttributeNotFound { .. }
        ));
        assert!(matches!(
            w.evict_delta("seq", Value::Str("x".into())).unwrap_err(),
            WindowError::DeltaTypeMismatch { .. }
        ));
        assert!(w.evict_delta("seq", Value::Int(100)).is_ok());
    }

    #[test]
    fn test_delta_against_optional_attribute() {
        let schema = Schema::new([("seq", Type::Optional(Box::new(Type::Int)))]).unwrap();
        let mut w = WindowSpec::new("in", schema);
        w.sliding();
        assert!(w.evict_delta("seq", Value::Int(5)).is_ok());
    }

    #[test]
    fn test_partition_eviction_requires_partitioned() {
        let mut w = spec();
        w.sliding();
        assert_eq!(
            w.partition_eviction_count(4).unwrap_err(),
            WindowError::NotPartitioned("in".into())
        );
        w.partitioned().unwrap();
        assert!(w.partition_eviction_count(4).is_ok());
        assert_eq!(
            w.partition_eviction(),
            Some(&PartitionEviction::PartitionCount(4))
        );
    }

    #[test]
    fn test_partitioned_requires_mode() {
        let mut w = spec();
        assert!(matches!(
            w.partitioned().unwrap_err(),
            WindowError::NotWindowed(_)
        ));
    }

    #[test]
    fn test_validate_complete() {
        let mut w = spec();
        w.sliding();
        assert_eq!(
            w.validate_complete().unwrap_err(),
            WindowError::MissingEvictionPolicy("in".into())
        );
        w.evict_count(10).unwrap();
        assert_eq!(
            w.validate_complete().unwrap_err(),
            WindowError::MissingTriggerPolicy("in".into())
        );
        w.trigger_count(1).unwrap();
        assert!(w.validate_complete().is_ok());
    }

    #[test]
    fn test_chained_configuration() {
        let mut w = spec();
        w.sliding()
            .evict_time(60.0)
            .unwrap()
            .trigger_count(5)
            .unwrap();
        assert_eq!(w.eviction(), Some(&WindowPolicy::Time(60.0)));
        assert_eq!(w.trigger(), Some(&WindowPolicy::Count(5)));
    }
}
