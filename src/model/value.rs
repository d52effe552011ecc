//! Object-side values and property value types

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bson::oid::ObjectId;
use bson::spec::BinarySubtype;
use bson::{Binary, Bson};
use chrono::{NaiveDateTime, TimeZone, Utc};
use uuid::Uuid;

use super::descriptor::Projection;
use super::types::{Entity, EntityType, Mapped};
use crate::errors::{MappingError, MappingResult};

/// Dynamic value passed between property accessors and codecs.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    String(String),
    ObjectId(ObjectId),
    DateTime(bson::DateTime),
    /// Zone-less date-time; its stored instant depends on `DateStorage`
    LocalDateTime(NaiveDateTime),
    Uuid(Uuid),
    List(Vec<Value>),
    /// Entries in storage order
    Map(Vec<(String, Value)>),
    Entity(Arc<dyn Entity>),
    Reference(ReferenceValue),
}

/// Object-side form of a reference: identity, optional collection and an
/// optional loaded target.
#[derive(Debug, Clone, Default)]
pub struct ReferenceValue {
    pub id: Option<Bson>,
    pub collection: Option<String>,
    /// The loaded target, possibly a subtype of the declared type
    pub target: Option<Arc<dyn Entity>>,
    /// Projection from a subtype target onto the declared type
    pub view: Option<Projection>,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for empty lists and maps
    pub fn is_empty_collection(&self) -> bool {
        match self {
            Value::List(items) => items.is_empty(),
            Value::Map(entries) => entries.is_empty(),
            _ => false,
        }
    }

    /// Name of the value's variant for error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::ObjectId(_) => "objectId",
            Value::DateTime(_) => "date",
            Value::LocalDateTime(_) => "localDateTime",
            Value::Uuid(_) => "uuid",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Entity(_) => "entity",
            Value::Reference(_) => "reference",
        }
    }

    /// Converts a scalar to its default storage form (UTC dates, standard
    /// UUIDs); `None` for lists, maps, entities and references.
    pub fn to_bson_scalar(&self) -> Option<Bson> {
        Some(match self {
            Value::Null => Bson::Null,
            Value::Bool(v) => Bson::Boolean(*v),
            Value::Int32(v) => Bson::Int32(*v),
            Value::Int64(v) => Bson::Int64(*v),
            Value::Double(v) => Bson::Double(*v),
            Value::String(v) => Bson::String(v.clone()),
            Value::ObjectId(v) => Bson::ObjectId(*v),
            Value::DateTime(v) => Bson::DateTime(*v),
            Value::LocalDateTime(v) => {
                Bson::DateTime(bson::DateTime::from_millis(Utc.from_utc_datetime(v).timestamp_millis()))
            }
            Value::Uuid(v) => Bson::Binary(Binary {
                subtype: BinarySubtype::Uuid,
                bytes: v.as_bytes().to_vec(),
            }),
            _ => return None,
        })
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::ObjectId(a), Value::ObjectId(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::LocalDateTime(a), Value::LocalDateTime(b)) => a == b,
            (Value::Uuid(a), Value::Uuid(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Entity(a), Value::Entity(b)) => a.eq_entity(b.as_ref()),
            (Value::Reference(a), Value::Reference(b)) => {
                a.id == b.id && a.collection == b.collection
            }
            _ => false,
        }
    }
}

/// Declared shape of a property's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    Bool,
    Int32,
    Int64,
    Double,
    String,
    ObjectId,
    DateTime,
    LocalDateTime,
    Uuid,
    Optional(Box<ValueType>),
    List(Box<ValueType>),
    /// String-keyed map
    Map(Box<ValueType>),
    /// Embedded instance of a statically known type
    Entity(EntityType),
    /// Identity-only link to another entity
    Reference(EntityType),
    /// `Arc<dyn Entity>`; the hierarchy is declared on the property
    Dynamic,
}

impl ValueType {
    /// Innermost element type, unwrapping options, lists and maps
    pub fn element(&self) -> &ValueType {
        match self {
            ValueType::Optional(inner) | ValueType::List(inner) | ValueType::Map(inner) => {
                inner.element()
            }
            other => other,
        }
    }

    /// True if a list or map wraps the element type
    pub fn is_collection(&self) -> bool {
        match self {
            ValueType::List(_) | ValueType::Map(_) => true,
            ValueType::Optional(inner) => inner.is_collection(),
            _ => false,
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, ValueType::Optional(_))
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            ValueType::Bool
                | ValueType::Int32
                | ValueType::Int64
                | ValueType::Double
                | ValueType::String
                | ValueType::ObjectId
                | ValueType::DateTime
                | ValueType::LocalDateTime
                | ValueType::Uuid
        )
    }
}

/// A Rust type usable as a mapped property.
pub trait PropertyType: Sized + Send + Sync + 'static {
    fn value_type() -> ValueType;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> MappingResult<Self>;
}

fn mismatch(expected: &str, found: &Value) -> MappingError {
    MappingError::malformed(expected, found.kind_name())
}

impl PropertyType for bool {
    fn value_type() -> ValueType {
        ValueType::Bool
    }

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value {
            Value::Bool(v) => Ok(v),
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl PropertyType for i32 {
    fn value_type() -> ValueType {
        ValueType::Int32
    }

    fn to_value(&self) -> Value {
        Value::Int32(*self)
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value {
            Value::Int32(v) => Ok(v),
            other => Err(mismatch("int32", &other)),
        }
    }
}

impl PropertyType for i64 {
    fn value_type() -> ValueType {
        ValueType::Int64
    }

    fn to_value(&self) -> Value {
        Value::Int64(*self)
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value {
            Value::Int64(v) => Ok(v),
            Value::Int32(v) => Ok(v as i64),
            other => Err(mismatch("int64", &other)),
        }
    }
}

impl PropertyType for f64 {
    fn value_type() -> ValueType {
        ValueType::Double
    }

    fn to_value(&self) -> Value {
        Value::Double(*self)
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value {
            Value::Double(v) => Ok(v),
            Value::Int32(v) => Ok(v as f64),
            Value::Int64(v) => Ok(v as f64),
            other => Err(mismatch("double", &other)),
        }
    }
}

impl PropertyType for String {
    fn value_type() -> ValueType {
        ValueType::String
    }

    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value {
            Value::String(v) => Ok(v),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl PropertyType for ObjectId {
    fn value_type() -> ValueType {
        ValueType::ObjectId
    }

    fn to_value(&self) -> Value {
        Value::ObjectId(*self)
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value {
            Value::ObjectId(v) => Ok(v),
            other => Err(mismatch("objectId", &other)),
        }
    }
}

impl PropertyType for chrono::DateTime<Utc> {
    fn value_type() -> ValueType {
        ValueType::DateTime
    }

    fn to_value(&self) -> Value {
        Value::DateTime(bson::DateTime::from_millis(self.timestamp_millis()))
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value {
            Value::DateTime(v) => Utc
                .timestamp_millis_opt(v.timestamp_millis())
                .single()
                .ok_or_else(|| MappingError::malformed("date", "out-of-range date")),
            other => Err(mismatch("date", &other)),
        }
    }
}

impl PropertyType for NaiveDateTime {
    fn value_type() -> ValueType {
        ValueType::LocalDateTime
    }

    fn to_value(&self) -> Value {
        Value::LocalDateTime(*self)
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value {
            Value::LocalDateTime(v) => Ok(v),
            other => Err(mismatch("localDateTime", &other)),
        }
    }
}

impl PropertyType for Uuid {
    fn value_type() -> ValueType {
        ValueType::Uuid
    }

    fn to_value(&self) -> Value {
        Value::Uuid(*self)
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value {
            Value::Uuid(v) => Ok(v),
            other => Err(mismatch("uuid", &other)),
        }
    }
}

impl<V: PropertyType> PropertyType for Option<V> {
    fn value_type() -> ValueType {
        ValueType::Optional(Box::new(V::value_type()))
    }

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => V::from_value(other).map(Some),
        }
    }
}

impl<V: PropertyType> PropertyType for Vec<V> {
    fn value_type() -> ValueType {
        ValueType::List(Box::new(V::value_type()))
    }

    fn to_value(&self) -> Value {
        Value::List(self.iter().map(PropertyType::to_value).collect())
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value {
            Value::List(items) => items.into_iter().map(V::from_value).collect(),
            other => Err(mismatch("list", &other)),
        }
    }
}

impl<V: PropertyType> PropertyType for BTreeMap<String, V> {
    fn value_type() -> ValueType {
        ValueType::Map(Box::new(V::value_type()))
    }

    fn to_value(&self) -> Value {
        Value::Map(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_value()))
                .collect(),
        )
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value {
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| V::from_value(v).map(|v| (k, v)))
                .collect(),
            other => Err(mismatch("map", &other)),
        }
    }
}

impl<V: PropertyType> PropertyType for HashMap<String, V> {
    fn value_type() -> ValueType {
        ValueType::Map(Box::new(V::value_type()))
    }

    /// Entries are sorted by key so encoding is deterministic
    fn to_value(&self) -> Value {
        let mut entries: Vec<(String, Value)> = self
            .iter()
            .map(|(k, v)| (k.clone(), v.to_value()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Value::Map(entries)
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value {
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| V::from_value(v).map(|v| (k, v)))
                .collect(),
            other => Err(mismatch("map", &other)),
        }
    }
}

impl<T: Mapped> PropertyType for Arc<T> {
    fn value_type() -> ValueType {
        ValueType::Entity(EntityType::of::<T>())
    }

    fn to_value(&self) -> Value {
        Value::Entity(self.clone())
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value {
            Value::Entity(entity) => downcast_arc::<T>(entity),
            other => Err(mismatch("entity", &other)),
        }
    }
}

impl PropertyType for Arc<dyn Entity> {
    fn value_type() -> ValueType {
        ValueType::Dynamic
    }

    fn to_value(&self) -> Value {
        Value::Entity(self.clone())
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value {
            Value::Entity(entity) => Ok(entity),
            other => Err(mismatch("entity", &other)),
        }
    }
}

/// Embedded by value
impl<T: Mapped> PropertyType for T {
    fn value_type() -> ValueType {
        ValueType::Entity(EntityType::of::<T>())
    }

    fn to_value(&self) -> Value {
        Value::Entity(Arc::new(self.clone()))
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value {
            Value::Entity(entity) => downcast_arc::<T>(entity)
                .map(|arc| Arc::try_unwrap(arc).unwrap_or_else(|shared| (*shared).clone())),
            other => Err(mismatch("entity", &other)),
        }
    }
}

/// Recovers the concrete `Arc<T>` behind a dynamic entity.
pub(crate) fn downcast_arc<T: Mapped>(entity: Arc<dyn Entity>) -> MappingResult<Arc<T>> {
    let found = entity.entity_type().name();
    entity
        .into_any()
        .downcast::<T>()
        .map_err(|_| MappingError::malformed(std::any::type_name::<T>(), found))
}
