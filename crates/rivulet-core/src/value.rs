//! Runtime attribute values

use crate::types::Type;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Runtime value held by a tuple attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
#[derive(Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Timestamp(i64), // nanoseconds since epoch
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Timestamp(_) => "timestamp",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Whether this value is a legal instance of `ty`.
    ///
    /// Null conforms only to optional types. A non-null value conforms to
    /// an optional type when it conforms to the wrapped type.
    pub fn conforms_to(&self, ty: &Type) -> bool {
        match (self, ty) {
            (Value::Null, Type::Optional(_)) => true,
            (Value::Null, _) => false,
            (v, Type::Optional(inner)) => v.conforms_to(inner),
            (Value::Bool(_), Type::Bool) => true,
            (Value::Int(_), Type::Int) => true,
            (Value::Float(_), Type::Float) => true,
            (Value::Str(_), Type::Str) => true,
            (Value::Timestamp(_), Type::Timestamp) => true,
            (Value::List(items), Type::List(elem)) => items.iter().all(|v| v.conforms_to(elem)),
            (Value::Map(entries), Type::Map(key, val)) => entries
                .iter()
                .all(|(k, v)| Value::Str(k.clone()).conforms_to(key) && v.conforms_to(val)),
            _ => false,
        }
    }

    /// The non-optional type this value is an instance of, if any.
    ///
    /// Used to validate delta window policies, so collections with mixed
    /// or undecidable element types return `None`.
    pub fn value_type(&self) -> Option<Type> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(Type::Bool),
            Value::Int(_) => Some(Type::Int),
            Value::Float(_) => Some(Type::Float),
            Value::Str(_) => Some(Type::Str),
            Value::Timestamp(_) => Some(Type::Timestamp),
            Value::List(_) | Value::Map(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(n) => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "\"{}\"", s),
            Value::Timestamp(ts) => {
                let dt = DateTime::<Utc>::from_timestamp_nanos(*ts);
                write!(f, "@{}", dt.format("%Y-%m-%dT%H:%M:%SZ"))
            }
            Value::List(a) => {
                write!(f, "[")?;
                for (i, v) in a.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Map(m) => {
                write!(f, "{{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts.timestamp_nanos_opt().unwrap_or(0))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(o: Option<T>) -> Self {
        match o {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Conformance Tests
    // ==========================================================================

    #[test]
    fn test_conforms_primitives() {
        assert!(Value::Bool(true).conforms_to(&Type::Bool));
        assert!(Value::Int(1).conforms_to(&Type::Int));
        assert!(Value::Float(0.5).conforms_to(&Type::Float));
        assert!(Value::Str("x".into()).conforms_to(&Type::Str));
        assert!(Value::Timestamp(7).conforms_to(&Type::Timestamp));
    }

    #[test]
    fn test_conforms_wrong_type() {
        assert!(!Value::Int(1).conforms_to(&Type::Float));
        assert!(!Value::Str("1".into()).conforms_to(&Type::Int));
    }

    #[test]
    fn test_null_conforms_only_to_optional() {
        assert!(Value::Null.conforms_to(&Type::Optional(Box::new(Type::Int))));
        assert!(!Value::Null.conforms_to(&Type::Int));
    }

    #[test]
    fn test_conforms_optional_inner() {
        let opt_int = Type::Optional(Box::new(Type::Int));
        assert!(Value::Int(42).conforms_to(&opt_int));
        assert!(!Value::Str("42".into()).conforms_to(&opt_int));
    }

    #[test]
    fn test_conforms_list() {
        let list_int = Type::List(Box::new(Type::Int));
        assert!(Value::List(vec![Value::Int(1), Value::Int(2)]).conforms_to(&list_int));
        assert!(Value::List(vec![]).conforms_to(&list_int));
        assert!(!Value::List(vec![Value::Int(1), Value::Str("x".into())]).conforms_to(&list_int));
    }

    #[test]
    fn test_value_type() {
        assert_eq!(Value::Int(1).value_type(), Some(Type::Int));
        assert_eq!(Value::Timestamp(0).value_type(), Some(Type::Timestamp));
        assert_eq!(Value::Null.value_type(), None);
        assert_eq!(Value::List(vec![]).value_type(), None);
    }

    // ==========================================================================
    // Accessor Tests
    // ==========================================================================

    #[test]
    fn test_as_int() {
        assert_eq!(Value::Int(42).as_int(), Some(42));
        assert_eq!(Value::Float(3.7).as_int(), Some(3));
        assert_eq!(Value::Str("42".into()).as_int(), None);
    }

    #[test]
    fn test_as_float() {
        assert_eq!(Value::Float(2.5).as_float(), Some(2.5));
        assert_eq!(Value::Int(42).as_float(), Some(42.0));
        assert_eq!(Value::Null.as_float(), None);
    }

    #[test]
    fn test_as_str_and_bool() {
        assert_eq!(Value::Str("hello".into()).as_str(), Some("hello"));
        assert_eq!(Value::Int(1).as_str(), None);
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int(1).as_bool(), None);
    }

    // ==========================================================================
    // Conversion Tests
    // ==========================================================================

    #[test]
    fn test_from_impls() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from(42i64), Value::Int(42));
        assert_eq!(Value::from(2.5f64), Value::Float(2.5));
        assert_eq!(Value::from("hi"), Value::Str("hi".into()));
        assert_eq!(Value::from(Option::<i64>::None), Value::Null);
        assert_eq!(
            Value::from(vec![1i64, 2]),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn test_default_is_null() {
        let v: Value = Default::default();
        assert_eq!(v, Value::Null);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::Int(-3).to_string(), "-3");
        assert_eq!(Value::Str("a".into()).to_string(), "\"a\"");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::Int(2)]).to_string(),
            "[1, 2]"
        );
    }
}
