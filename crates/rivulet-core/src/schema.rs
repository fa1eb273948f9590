//! Stream schemas: immutable, ordered, name-indexed attribute lists.
//!
//! Schemas are interned: building the same ordered (name, type) list twice
//! yields the same shared allocation, so [`Schema::ptr_eq`] is a valid
//! fast-path equality check. Derived schemas produced by
//! [`Schema::extend_by_attributes`] and [`Schema::remove`] go through the
//! same registry.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, Weak};

use rustc_hash::FxHashMap;

use crate::error::SchemaError;
use crate::types::Type;
use crate::value::Value;

/// One named, typed attribute of a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name, unique within its schema.
    pub name: String,
    /// Attribute type.
    pub ty: Type,
    /// Position within the schema.
    pub index: usize,
}

impl Attribute {
    /// Two attributes are the same if they agree on name and type.
    /// Position is a property of the schema, not the attribute.
    pub fn same(&self, other: &Attribute) -> bool {
        self.name == other.name && self.ty == other.ty
    }
}

/// Index pairing between two schemas, used for cross-schema tuple copy.
///
/// `pairs[i] = (target_index, source_index)` for every attribute matched
/// by name with an identical or optional-compatible type.
pub(crate) struct AssignPlan {
    pub(crate) pairs: Vec<(usize, usize)>,
}

struct CachedAssign {
    source: Weak<SchemaInner>,
    plan: Arc<AssignPlan>,
}

pub(crate) struct SchemaInner {
    id: u64,
    attributes: Vec<Attribute>,
    name_index: FxHashMap<String, usize>,
    defaults: Arc<[Value]>,
    /// Memoized copy plans keyed by source schema id.
    assigns: Mutex<FxHashMap<u64, CachedAssign>>,
}

/// An immutable, interned stream schema.
///
/// Cheap to clone; clones share one allocation. Create with
/// [`Schema::new`]:
///
/// ```
/// use rivulet_core::{Schema, Type};
///
/// let schema = Schema::new([("symbol", Type::Str), ("price", Type::Float)]).unwrap();
/// assert_eq!(schema.attribute_count(), 2);
/// ```
#[derive(Clone)]
pub struct Schema(Arc<SchemaInner>);

/// Canonical registry key: the ordered (name, type) list.
type SchemaKey = Vec<(String, Type)>;

struct SchemaRegistry {
    table: Mutex<FxHashMap<SchemaKey, Weak<SchemaInner>>>,
    next_id: AtomicU64,
}

static REGISTRY: LazyLock<SchemaRegistry> = LazyLock::new(|| SchemaRegistry {
    table: Mutex::new(FxHashMap::default()),
    next_id: AtomicU64::new(1),
});

impl SchemaRegistry {
    fn intern(&self, key: SchemaKey) -> Schema {
        let mut table = self.table.lock().expect("schema registry poisoned");
        if let Some(existing) = table.get(&key).and_then(Weak::upgrade) {
            return Schema(existing);
        }
        // Drop entries whose schemas are gone before growing the table.
        table.retain(|_, weak| weak.strong_count() > 0);

        let attributes: Vec<Attribute> = key
            .iter()
            .enumerate()
            .map(|(index, (name, ty))| Attribute {
                name: name.clone(),
                ty: ty.clone(),
                index,
            })
            .collect();
        let name_index = attributes
            .iter()
            .map(|a| (a.name.clone(), a.index))
            .collect();
        let defaults: Arc<[Value]> = attributes
            .iter()
            .map(|a| a.ty.default_value())
            .collect::<Vec<_>>()
            .into();

        let inner = Arc::new(SchemaInner {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            attributes,
            name_index,
            defaults,
            assigns: Mutex::new(FxHashMap::default()),
        });
        table.insert(key, Arc::downgrade(&inner));
        Schema(inner)
    }
}

impl Schema {
    /// Builds (or looks up) the schema with the given ordered attributes.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Empty`] for an empty attribute list and
    /// [`SchemaError::DuplicateAttribute`] when two attributes share a name.
    pub fn new<N, I>(attributes: I) -> Result<Schema, SchemaError>
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, Type)>,
    {
        let key: SchemaKey = attributes
            .into_iter()
            .map(|(name, ty)| (name.into(), ty))
            .collect();
        if key.is_empty() {
            return Err(SchemaError::Empty);
        }
        let mut seen = FxHashMap::default();
        for (name, _) in &key {
            if seen.insert(name.as_str(), ()).is_some() {
                return Err(SchemaError::DuplicateAttribute(name.clone()));
            }
        }
        Ok(REGISTRY.intern(key))
    }

    /// Unique identity of this interned schema.
    pub(crate) fn id(&self) -> u64 {
        self.0.id
    }

    /// Whether two schema handles share the same interned allocation.
    pub fn ptr_eq(a: &Schema, b: &Schema) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    pub fn attribute_count(&self) -> usize {
        self.0.attributes.len()
    }

    pub fn attribute(&self, index: usize) -> Option<&Attribute> {
        self.0.attributes.get(index)
    }

    pub fn attribute_named(&self, name: &str) -> Option<&Attribute> {
        self.attribute_index(name).map(|i| &self.0.attributes[i])
    }

    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.0.name_index.get(name).copied()
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.0.attributes
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.0.attributes.iter().map(|a| a.name.as_str())
    }

    pub(crate) fn defaults(&self) -> &Arc<[Value]> {
        &self.0.defaults
    }

    /// Relaxed match: same names in the same order, each type identical or
    /// the optional wrapping of the other. Lets a non-optional stream feed
    /// an optional-typed port.
    pub fn matches_or_optional(&self, other: &Schema) -> bool {
        if Schema::ptr_eq(self, other) {
            return true;
        }
        if self.attribute_count() != other.attribute_count() {
            return false;
        }
        self.0
            .attributes
            .iter()
            .zip(&other.0.attributes)
            .all(|(a, b)| a.name == b.name && a.ty.equals_or_optional(&b.ty))
    }

    /// Extends this schema with additional attributes, producing a new
    /// interned schema. Attributes that are `same` as an existing one are
    /// skipped; if nothing new is added the original schema is returned.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::TypeConflict`] when an extension attribute
    /// shares a name with an existing attribute of a different type.
    pub fn extend_by_attributes<N, I>(&self, attributes: I) -> Result<Schema, SchemaError>
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, Type)>,
    {
        let mut key: SchemaKey = self
            .0
            .attributes
            .iter()
            .map(|a| (a.name.clone(), a.ty.clone()))
            .collect();
        let base_len = key.len();

        for (name, ty) in attributes {
            let name = name.into();
            match self.attribute_named(&name) {
                Some(existing) if existing.ty == ty => continue,
                Some(existing) => {
                    return Err(SchemaError::TypeConflict {
                        name,
                        existing: existing.ty.to_string(),
                        requested: ty.to_string(),
                    })
                }
                None => {
                    // A duplicate within the extension itself is also a conflict
                    // unless it is the same attribute repeated.
                    if let Some((_, prior)) = key[base_len..].iter().find(|(n, _)| *n == name) {
                        if *prior == ty {
                            continue;
                        }
                        return Err(SchemaError::TypeConflict {
                            name,
                            existing: prior.to_string(),
                            requested: ty.to_string(),
                        });
                    }
                    key.push((name, ty));
                }
            }
        }

        if key.len() == base_len {
            return Ok(self.clone());
        }
        Ok(REGISTRY.intern(key))
    }

    /// Extends this schema by a single attribute.
    pub fn extend_one(&self, ty: Type, name: impl Into<String>) -> Result<Schema, SchemaError> {
        self.extend_by_attributes([(name.into(), ty)])
    }

    /// Produces a new schema with the named attributes removed. Names that
    /// do not match any attribute are ignored; if nothing is removed the
    /// original schema is returned.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::RemoveAll`] if the result would be empty.
    pub fn remove<'a, I>(&self, names: I) -> Result<Schema, SchemaError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let doomed: Vec<&str> = names
            .into_iter()
            .filter(|n| self.attribute_index(n).is_some())
            .collect();
        if doomed.is_empty() {
            return Ok(self.clone());
        }

        let key: SchemaKey = self
            .0
            .attributes
            .iter()
            .filter(|a| !doomed.contains(&a.name.as_str()))
            .map(|a| (a.name.clone(), a.ty.clone()))
            .collect();

        if key.is_empty() {
            return Err(SchemaError::RemoveAll(self.to_string()));
        }
        Ok(REGISTRY.intern(key))
    }

    /// Returns the memoized copy plan from `source` into this schema,
    /// computing and caching it on first use.
    pub(crate) fn assign_plan(&self, source: &Schema) -> Arc<AssignPlan> {
        let mut assigns = self.0.assigns.lock().expect("assign cache poisoned");
        if let Some(cached) = assigns.get(&source.id()) {
            if cached.source.strong_count() > 0 {
                return Arc::clone(&cached.plan);
            }
        }
        // Evict plans whose source schemas are gone.
        assigns.retain(|_, c| c.source.strong_count() > 0);

        let mut pairs = Vec::new();
        for target in &self.0.attributes {
            if let Some(from) = source.attribute_named(&target.name) {
                // Identical types, or assignment from a non-optional source
                // into an optional target of the same value type.
                if target.ty == from.ty || target.ty.value_type() == &from.ty {
                    pairs.push((target.index, from.index));
                }
            }
        }
        let plan = Arc::new(AssignPlan { pairs });
        assigns.insert(
            source.id(),
            CachedAssign {
                source: Arc::downgrade(&source.0),
                plan: Arc::clone(&plan),
            },
        );
        plan
    }
}

/// Two schemas are equal iff their attribute lists are pairwise the same
/// in order. Interning makes the pointer comparison the common case.
impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        if Schema::ptr_eq(self, other) {
            return true;
        }
        self.0.attributes.len() == other.0.attributes.len()
            && self
                .0
                .attributes
                .iter()
                .zip(&other.0.attributes)
                .all(|(a, b)| a.same(b))
    }
}

impl Eq for Schema {}

impl Hash for Schema {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Interned: equal schemas share one allocation, so the id hashes
        // consistently with PartialEq.
        self.0.id.hash(state);
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, attr) in self.0.attributes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", attr.ty, attr.name)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Schema<{}>", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_attr() -> Schema {
        Schema::new([("a", Type::Int), ("b", Type::Str)]).unwrap()
    }

    // ==========================================================================
    // Construction & Interning
    // ==========================================================================

    #[test]
    fn test_empty_schema_rejected() {
        let attrs: Vec<(String, Type)> = vec![];
        assert_eq!(Schema::new(attrs), Err(SchemaError::Empty));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let err = Schema::new([("a", Type::Int), ("a", Type::Str)]).unwrap_err();
        assert_eq!(err, SchemaError::DuplicateAttribute("a".into()));
    }

    #[test]
    fn test_indexes_match_positions() {
        let s = two_attr();
        assert_eq!(s.attribute(0).unwrap().name, "a");
        assert_eq!(s.attribute(0).unwrap().index, 0);
        assert_eq!(s.attribute(1).unwrap().index, 1);
        assert_eq!(s.attribute_index("b"), Some(1));
        assert_eq!(s.attribute_index("zzz"), None);
    }

    #[test]
    fn test_equal_schemas_are_interned() {
        let s1 = two_attr();
        let s2 = two_attr();
        assert_eq!(s1, s2);
        assert!(Schema::ptr_eq(&s1, &s2));
    }

    #[test]
    fn test_type_change_breaks_equality() {
        let s1 = two_attr();
        let s2 = Schema::new([("a", Type::Float), ("b", Type::Str)]).unwrap();
        assert_ne!(s1, s2);
        assert!(!Schema::ptr_eq(&s1, &s2));
    }

    #[test]
    fn test_attribute_order_matters() {
        let s1 = two_attr();
        let s2 = Schema::new([("b", Type::Str), ("a", Type::Int)]).unwrap();
        assert_ne!(s1, s2);
    }

    // ==========================================================================
    // Optional-relaxed matching
    // ==========================================================================

    #[test]
    fn test_matches_or_optional() {
        let plain = two_attr();
        let lifted =
            Schema::new([("a", Type::Optional(Box::new(Type::Int))), ("b", Type::Str)]).unwrap();
        assert!(plain.matches_or_optional(&lifted));
        assert!(lifted.matches_or_optional(&plain));
        assert_ne!(plain, lifted);

        let renamed = Schema::new([("x", Type::Int), ("b", Type::Str)]).unwrap();
        assert!(!plain.matches_or_optional(&renamed));
    }

    // ==========================================================================
    // Extend
    // ==========================================================================

    #[test]
    fn test_extend_appends() {
        let s = two_attr();
        let ex = s.extend_by_attributes([("c", Type::Float)]).unwrap();
        assert_eq!(ex.attribute_count(), 3);
        assert_eq!(ex.attribute(2).unwrap().name, "c");
        assert_eq!(ex.attribute(2).unwrap().index, 2);
        // Base schema untouched.
        assert_eq!(s.attribute_count(), 2);
    }

    #[test]
    fn test_extend_nothing_new_returns_self() {
        let s = two_attr();
        let same = s.extend_by_attributes([("a", Type::Int)]).unwrap();
        assert!(Schema::ptr_eq(&s, &same));

        let none = s.extend_by_attributes(Vec::<(String, Type)>::new()).unwrap();
        assert!(Schema::ptr_eq(&s, &none));
    }

    #[test]
    fn test_extend_type_conflict() {
        let s = two_attr();
        let err = s.extend_by_attributes([("a", Type::Str)]).unwrap_err();
        assert!(matches!(err, SchemaError::TypeConflict { .. }));
    }

    #[test]
    fn test_extend_one() {
        let s = two_attr();
        let ex = s.extend_one(Type::Bool, "flag").unwrap();
        assert_eq!(ex.attribute_named("flag").unwrap().ty, Type::Bool);
    }

    // ==========================================================================
    // Remove
    // ==========================================================================

    #[test]
    fn test_remove() {
        let s = Schema::new([("a", Type::Int), ("b", Type::Str), ("c", Type::Float)]).unwrap();
        let r = s.remove(["b"]).unwrap();
        assert_eq!(r.attribute_count(), 2);
        assert_eq!(r.attribute(0).unwrap().name, "a");
        assert_eq!(r.attribute(1).unwrap().name, "c");
        assert_eq!(r.attribute(1).unwrap().index, 1);
    }

    #[test]
    fn test_remove_unknown_names_ignored() {
        let s = two_attr();
        let r = s.remove(["nope"]).unwrap();
        assert!(Schema::ptr_eq(&s, &r));
    }

    #[test]
    fn test_remove_all_rejected() {
        let s = two_attr();
        let err = s.remove(["a", "b"]).unwrap_err();
        assert!(matches!(err, SchemaError::RemoveAll(_)));
    }

    #[test]
    fn test_display() {
        assert_eq!(two_attr().to_string(), "int a, str b");
    }
}
