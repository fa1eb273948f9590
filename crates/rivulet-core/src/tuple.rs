//! Schema-bound tuples.
//!
//! A tuple is an immutable array of attribute values bound to one interned
//! [`Schema`]. Cloning shares the underlying value storage.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::SchemaError;
use crate::schema::Schema;
use crate::value::Value;

/// An immutable record flowing through the graph.
#[derive(Clone, PartialEq)]
pub struct Tuple {
    schema: Schema,
    values: Arc<[Value]>,
}

impl Tuple {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_named(&self, name: &str) -> Option<&Value> {
        self.schema.attribute_index(name).map(|i| &self.values[i])
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get_named(name).and_then(Value::as_int)
    }

    pub fn get_float(&self, name: &str) -> Option<f64> {
        self.get_named(name).and_then(Value::as_float)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get_named(name).and_then(Value::as_str)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get_named(name).and_then(Value::as_bool)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

impl fmt::Debug for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tuple{{")?;
        for (i, attr) in self.schema.attributes().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", attr.name, self.values[i])?;
        }
        write!(f, "}}")
    }
}

impl Schema {
    /// The tuple with every attribute at its declared default.
    pub fn default_tuple(&self) -> Tuple {
        Tuple {
            schema: self.clone(),
            values: Arc::clone(self.defaults()),
        }
    }

    /// Builds a tuple from name-keyed values. Keys that do not name an
    /// attribute are ignored; unmatched attributes take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::TypeMismatch`] when a matched value does not
    /// conform to its attribute's type.
    pub fn tuple_from_map(&self, map: &IndexMap<String, Value>) -> Result<Tuple, SchemaError> {
        let mut values: Vec<Value> = self.defaults().to_vec();
        for attr in self.attributes() {
            if let Some(value) = map.get(&attr.name) {
                if !value.conforms_to(&attr.ty) {
                    return Err(SchemaError::TypeMismatch {
                        attribute: attr.name.clone(),
                        expected: attr.ty.to_string(),
                        actual: value.type_name(),
                    });
                }
                values[attr.index] = value.clone();
            }
        }
        Ok(Tuple {
            schema: self.clone(),
            values: values.into(),
        })
    }

    /// Builds a tuple from positional values. Values beyond the schema
    /// length are ignored; missing positions take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::TypeMismatch`] when a value does not conform
    /// to the type of the attribute at its position.
    pub fn tuple_from_values<I>(&self, list: I) -> Result<Tuple, SchemaError>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut values: Vec<Value> = self.defaults().to_vec();
        for (index, value) in list.into_iter().take(values.len()).enumerate() {
            let attr = &self.attributes()[index];
            if !value.conforms_to(&attr.ty) {
                return Err(SchemaError::TypeMismatch {
                    attribute: attr.name.clone(),
                    expected: attr.ty.to_string(),
                    actual: value.type_name(),
                });
            }
            values[index] = value;
        }
        Ok(Tuple {
            schema: self.clone(),
            values: values.into(),
        })
    }

    /// Builds a tuple of this schema from a tuple of any schema.
    ///
    /// Attributes are matched by identical name with an identical or
    /// optional-compatible type; unmatched attributes take their defaults.
    /// The index pairing is memoized per source schema, so the copy is
    /// O(matching attributes). A tuple that already has this schema is
    /// returned as a cheap clone.
    pub fn tuple_from_tuple(&self, other: &Tuple) -> Tuple {
        if Schema::ptr_eq(self, other.schema()) {
            return other.clone();
        }
        let plan = self.assign_plan(other.schema());
        let mut values: Vec<Value> = self.defaults().to_vec();
        for &(target, source) in &plan.pairs {
            values[target] = other.values[source].clone();
        }
        Tuple {
            schema: self.clone(),
            values: values.into(),
        }
    }
}
