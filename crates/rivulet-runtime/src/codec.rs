//! Tuple serialization codec.
//!
//! Schema-driven encoding: a tuple is serialized as its values in
//! attribute order, so attribute order is wire order and the schema is
//! required on decode.
//!
//! - **Default (JSON)**: human-readable, universally supported.
//! - **Binary (MessagePack)**: compact, enabled via the `binary-codec`
//!   feature flag.
//!
//! [`decode`] auto-detects the format by inspecting the first byte, so
//! data written in either format can be read back regardless of which
//! feature is currently enabled.

use rivulet_core::{Schema, Tuple, Value};

use crate::error::GraphError;

/// Serialization format for tuple data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TupleFormat {
    /// JSON (default) — values as a JSON array in attribute order.
    Json,
    /// MessagePack — compact binary format.
    #[cfg(feature = "binary-codec")]
    MessagePack,
}

impl TupleFormat {
    /// Returns the active format based on enabled features.
    pub fn active() -> Self {
        #[cfg(feature = "binary-codec")]
        {
            TupleFormat::MessagePack
        }
        #[cfg(not(feature = "binary-codec"))]
        {
            TupleFormat::Json
        }
    }
}

/// Encodes a tuple's values in attribute order using the given format.
pub fn encode(tuple: &Tuple, format: TupleFormat) -> Result<Vec<u8>, GraphError> {
    match format {
        TupleFormat::Json => {
            serde_json::to_vec(tuple.values()).map_err(|e| GraphError::Codec(e.to_string()))
        }
        #[cfg(feature = "binary-codec")]
        TupleFormat::MessagePack => {
            rmp_serde::to_vec(tuple.values()).map_err(|e| GraphError::Codec(e.to_string()))
        }
    }
}

/// Decodes a tuple against the schema that produced it, auto-detecting
/// the format. Values are validated against the schema's attribute types;
/// trailing attributes absent from the data take their defaults.
pub fn decode(data: &[u8], schema: &Schema) -> Result<Tuple, GraphError> {
    if data.is_empty() {
        return Err(GraphError::Codec("empty tuple data".to_string()));
    }
    let values: Vec<Value> = if is_json(data) {
        serde_json::from_slice(data).map_err(|e| GraphError::Codec(e.to_string()))?
    } else {
        #[cfg(feature = "binary-codec")]
        {
            rmp_serde::from_slice(data).map_err(|e| GraphError::Codec(e.to_string()))?
        }
        #[cfg(not(feature = "binary-codec"))]
        {
            // No binary codec available — try JSON anyway as a fallback.
            serde_json::from_slice(data).map_err(|e| GraphError::Codec(e.to_string()))?
        }
    };
    Ok(schema.tuple_from_values(values)?)
}

/// Estimated encoded size of a tuple, in bytes.
///
/// An upper-bound style heuristic over the value tree; exact only for the
/// degenerate cases. Callers sizing buffers should treat it as a hint.
pub fn estimate_size(tuple: &Tuple) -> usize {
    2 + tuple.values().iter().map(estimate_value).sum::<usize>()
}

fn estimate_value(value: &Value) -> usize {
    match value {
        Value::Null => 4,
        Value::Bool(_) => 5,
        Value::Int(_) | Value::Timestamp(_) => 20,
        Value::Float(_) => 24,
        Value::Str(s) => s.len() + 2,
        Value::List(items) => 2 + items.iter().map(estimate_value).sum::<usize>() + items.len(),
        Value::Map(entries) => {
            2 + entries
                .iter()
                .map(|(k, v)| k.len() + 3 + estimate_value(v))
                .sum::<usize>()
        }
    }
}

/// Check if data looks like JSON (starts with `[`, ignoring whitespace).
fn is_json(data: &[u8]) -> bool {
    data.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'[')
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivulet_core::Type;

    fn schema() -> Schema {
        Schema::new([("id", Type::Int), ("name", Type::Str), ("score", Type::Float)]).unwrap()
    }

    #[test]
    fn test_json_roundtrip() {
        let tuple = schema()
            .tuple_from_values([Value::Int(7), Value::Str("x".into()), Value::Float(0.5)])
            .unwrap();
        let data = encode(&tuple, TupleFormat::Json).unwrap();
        assert!(is_json(&data));
        let back = decode(&data, &schema()).unwrap();
        assert_eq!(back, tuple);
    }

    #[test]
    fn test_decode_short_data_fills_defaults() {
        let data = b"[42]";
        let tuple = decode(data, &schema()).unwrap();
        assert_eq!(tuple.get_int("id"), Some(42));
        assert_eq!(tuple.get_str("name"), Some(""));
    }

    #[test]
    fn test_decode_type_mismatch_rejected() {
        let data = br#"["not an int"]"#;
        assert!(matches!(
            decode(data, &schema()).unwrap_err(),
            GraphError::Schema(_)
        ));
    }

    #[test]
    fn test_decode_empty_rejected() {
        assert!(decode(&[], &schema()).is_err());
    }

    #[test]
    fn test_estimate_covers_encoded_size() {
        let tuple = schema()
            .tuple_from_values([
                Value::Int(1234567),
                Value::Str("some name".into()),
                Value::Float(2.75),
            ])
            .unwrap();
        let encoded = encode(&tuple, TupleFormat::Json).unwrap();
        assert!(estimate_size(&tuple) >= encoded.len());
    }

    #[cfg(feature = "binary-codec")]
    #[test]
    fn test_msgpack_roundtrip() {
        let tuple = schema()
            .tuple_from_values([Value::Int(9), Value::Str("bin".into()), Value::Float(1.5)])
            .unwrap();
        let data = encode(&tuple, TupleFormat::MessagePack).unwrap();
        let back = decode(&data, &schema()).unwrap();
        assert_eq!(back, tuple);
    }
}
