//! Attribute type descriptors for stream schemas

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of a schema attribute
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// Boolean
    Bool,
    /// 64-bit signed integer
    Int,
    /// 64-bit floating point
    Float,
    /// UTF-8 string
    Str,
    /// Timestamp (nanoseconds since epoch)
    Timestamp,
    /// List of elements
    List(Box<Type>),
    /// Map from key to value
    Map(Box<Type>, Box<Type>),
    /// Optional type (T?)
    Optional(Box<Type>),
}

impl Type {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, Type::Optional(_))
    }

    /// The underlying type with one optional layer stripped; `self` otherwise.
    pub fn value_type(&self) -> &Type {
        match self {
            Type::Optional(t) => t,
            other => other,
        }
    }

    /// Default value an unset attribute of this type takes.
    ///
    /// Optional attributes default to null; everything else to the
    /// zero-ish value of the type.
    pub fn default_value(&self) -> Value {
        match self {
            Type::Bool => Value::Bool(false),
            Type::Int => Value::Int(0),
            Type::Float => Value::Float(0.0),
            Type::Str => Value::Str(String::new()),
            Type::Timestamp => Value::Timestamp(0),
            Type::List(_) => Value::List(Vec::new()),
            Type::Map(_, _) => Value::Map(indexmap::IndexMap::new()),
            Type::Optional(_) => Value::Null,
        }
    }

    /// Whether two types match exactly, or one is the optional wrapping
    /// of the other.
    pub fn equals_or_optional(&self, other: &Type) -> bool {
        self == other || self.value_type() == other.value_type()
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::Str => write!(f, "str"),
            Type::Timestamp => write!(f, "timestamp"),
            Type::List(t) => write!(f, "[{}]", t),
            Type::Map(k, v) => write!(f, "{{{}: {}}}", k, v),
            Type::Optional(t) => write!(f, "{}?", t),
        }
    }
}
