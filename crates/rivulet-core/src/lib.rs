//! # Rivulet Core
//!
//! Foundational data model for the rivulet operator-graph engine.
//!
//! This crate provides the schema and tuple representation exchanged by
//! operators, independent of any execution machinery:
//!
//! - **Type System**: Tagged attribute type descriptors with per-type defaults
//! - **Values**: Runtime value representation
//! - **Schemas**: Immutable, interned, name-indexed attribute lists
//! - **Tuples**: Immutable records bound to a schema
//!
//! ## Features
//!
//! - Interned schemas: identical attribute lists share one allocation, so
//!   identity comparison is a valid fast-path equality check
//! - Memoized cross-schema copy plans (O(matching attributes) assignment)
//! - Serialization support via `serde` on types and values
//!
//! ## Modules
//!
//! - [`types`]: Attribute type descriptors (`Int`, `Float`, `Str`, ...)
//! - [`value`]: Runtime values with conformance checks
//! - [`schema`]: Schemas, attributes and the interning registry
//! - [`tuple`]: Tuples and their construction paths
//!
//! ## Quick Start
//!
//! ```rust
//! use rivulet_core::{Schema, Type, Value};
//!
//! let schema = Schema::new([("symbol", Type::Str), ("price", Type::Float)]).unwrap();
//! let tick = schema
//!     .tuple_from_values([Value::from("ACME"), Value::from(12.5)])
//!     .unwrap();
//! assert_eq!(tick.get_float("price"), Some(12.5));
//! ```

pub mod error;
pub mod schema;
pub mod tuple;
pub mod types;
pub mod value;

pub use error::SchemaError;
pub use schema::{Attribute, Schema};
pub use tuple::Tuple;
pub use types::Type;
pub use value::Value;
