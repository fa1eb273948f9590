//! Error types for the schema and tuple model

/// Errors raised while building schemas or constructing tuples.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    /// A schema must describe at least one attribute.
    #[error("schema must have at least one attribute")]
    Empty,

    /// Attribute names are unique within a schema.
    #[error("duplicate attribute name: {0}")]
    DuplicateAttribute(String),

    /// An extension attribute collides with an existing one of a different type.
    #[error("attribute '{name}' already has type {existing}, cannot extend with {requested}")]
    TypeConflict {
        /// Attribute name.
        name: String,
        /// Type already present in the schema.
        existing: String,
        /// Conflicting type requested by the extension.
        requested: String,
    },

    /// Removing the named attributes would leave the schema empty.
    #[error("cannot remove every attribute from schema '{0}'")]
    RemoveAll(String),

    /// A value does not conform to its attribute's declared type.
    #[error("attribute '{attribute}' expects {expected}, got {actual}")]
    TypeMismatch {
        /// Attribute name.
        attribute: String,
        /// Declared attribute type.
        expected: String,
        /// Type name of the offending value.
        actual: &'static str,
    },

    /// The named attribute does not exist in the schema.
    #[error("unknown attribute: {0}")]
    UnknownAttribute(String),
}
