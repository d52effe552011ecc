//! References: identity-only links between entities
//!
//! A reference is stored as the target's id (or `{"$ref": collection,
//! "$id": id}` when configured), never as the target document. Reference
//! edges therefore cannot form encode-time cycles.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use bson::Bson;

use super::context::{DecodeContext, EncodeContext};
use super::Codec;
use crate::document::{
    BsonDocumentReader, BsonDocumentWriter, DocumentReader, DocumentWriter, ElementKind,
    FlattenedDocumentReader,
};
use crate::errors::{MappingError, MappingResult};
use crate::mapper::Mapper;
use crate::model::{
    Entity, EntityModel, EntityType, Mapped, Projection, PropertyType, ReferenceOptions,
    ReferenceValue, Value, ValueType, ID_FIELD,
};
use crate::observability::{log_event_with_fields, Event};
use crate::options::LoadingPolicy;

const REF_FIELD: &str = "$ref";
const REF_ID_FIELD: &str = "$id";

/// Typed reference to a mapped entity.
///
/// Holds the target id, optionally the collection it lives in, and the
/// target itself once loaded. A loaded target may be any mapped subtype of
/// `T`; `get` views it as a `T`, `downcast` reaches the concrete type.
pub struct Reference<T: Mapped> {
    id: Option<Bson>,
    collection: Option<String>,
    target: Option<Arc<dyn Entity>>,
    view: Option<Projection>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Mapped> Reference<T> {
    /// Reference to a loaded target; the id is taken from the target on encode
    pub fn new(target: T) -> Self {
        Self::from_arc(Arc::new(target))
    }

    pub fn from_arc(target: Arc<T>) -> Self {
        Self {
            target: Some(target),
            ..Self::default()
        }
    }

    /// Unresolved reference to the entity with `id`
    pub fn from_id(id: impl Into<Bson>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn with_collection(mut self, collection: &str) -> Self {
        self.collection = Some(collection.to_string());
        self
    }

    /// Stored id. References built from a target carry none until they are
    /// encoded or resolved through `Mapper::reference_id`.
    pub fn id(&self) -> Option<&Bson> {
        self.id.as_ref()
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    /// The target viewed as a `T`, if loaded
    pub fn get(&self) -> Option<&T> {
        let target = self.target.as_deref()?;
        if let Some(typed) = target.downcast_ref::<T>() {
            return Some(typed);
        }
        self.view
            .as_ref()?
            .apply(target.as_any())?
            .downcast_ref::<T>()
    }

    /// The target as its concrete type `S`, if loaded and of that type
    pub fn downcast<S: Mapped>(&self) -> Option<&S> {
        self.target.as_deref()?.downcast_ref::<S>()
    }

    /// The loaded target with its runtime type
    pub fn entity(&self) -> Option<&Arc<dyn Entity>> {
        self.target.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.target.is_some()
    }

    /// Returns the target, fetching it through the mapper's data access if
    /// it is not loaded yet.
    ///
    /// A target that no longer exists is `MappingError::ReferenceNotFound`.
    pub fn fetch(&self, mapper: &Mapper) -> MappingResult<Arc<T>> {
        mapper.dereference(self)
    }
}

impl<T: Mapped> Clone for Reference<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            collection: self.collection.clone(),
            target: self.target.clone(),
            view: self.view.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Mapped> Default for Reference<T> {
    fn default() -> Self {
        Self {
            id: None,
            collection: None,
            target: None,
            view: None,
            _marker: PhantomData,
        }
    }
}

impl<T: Mapped> fmt::Debug for Reference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("type", &std::any::type_name::<T>())
            .field("id", &self.id)
            .field("collection", &self.collection)
            .field("loaded", &self.target.as_ref().map(|t| t.entity_type().name()))
            .finish()
    }
}

/// References with ids compare ids. Otherwise two loaded references compare
/// their targets, and two empty references are equal.
impl<T: Mapped> PartialEq for Reference<T> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => match (&self.target, &other.target) {
                (Some(a), Some(b)) => a.eq_entity(b.as_ref()),
                (None, None) => self.id.is_none() && other.id.is_none(),
                _ => false,
            },
        }
    }
}

impl<T: Mapped> PropertyType for Reference<T> {
    fn value_type() -> ValueType {
        ValueType::Reference(EntityType::of::<T>())
    }

    fn to_value(&self) -> Value {
        Value::Reference(ReferenceValue {
            id: self.id.clone(),
            collection: self.collection.clone(),
            target: self.target.clone(),
            view: self.view.clone(),
        })
    }

    fn from_value(value: Value) -> MappingResult<Self> {
        match value {
            Value::Reference(reference) => {
                if let Some(target) = &reference.target {
                    if !target.is::<T>() && reference.view.is_none() {
                        return Err(MappingError::malformed(
                            std::any::type_name::<T>(),
                            target.entity_type().name(),
                        ));
                    }
                }
                Ok(Self {
                    id: reference.id,
                    collection: reference.collection,
                    target: reference.target,
                    view: reference.view,
                    _marker: PhantomData,
                })
            }
            other => Err(MappingError::malformed("reference", other.kind_name())),
        }
    }
}

/// Codec for reference properties
pub struct ReferenceCodec {
    target: EntityType,
    options: ReferenceOptions,
}

impl ReferenceCodec {
    pub fn new(target: EntityType, options: ReferenceOptions) -> Self {
        Self { target, options }
    }

    /// Storage form of the target's id
    fn identity_of(&self, target: &dyn Entity, ctx: &mut EncodeContext<'_>) -> MappingResult<Bson> {
        let model = ctx.codecs().models().model(&target.entity_type())?;
        let missing = || MappingError::MissingReferenceId(model.name().to_string());
        let id = model.id_property().ok_or_else(missing)?;
        let value = id.get(target)?;
        if value.is_null() {
            return Err(missing());
        }
        let codec = ctx.codecs().lookup(id.value_type(), Some(id))?;
        let mut writer = BsonDocumentWriter::new();
        codec.encode(&value, &mut writer, ctx)?;
        writer.into_bson()
    }

    fn collection_of(
        &self,
        reference: &ReferenceValue,
        declared: &EntityModel,
        ctx: &EncodeContext<'_>,
    ) -> MappingResult<String> {
        if let Some(collection) = &reference.collection {
            return Ok(collection.clone());
        }
        let model = match &reference.target {
            Some(target) => ctx.codecs().models().model(&target.entity_type())?,
            None => ctx.codecs().models().model(&declared.entity_type())?,
        };
        model
            .collection()
            .map(str::to_string)
            .ok_or_else(|| MappingError::invalid_state(format!("{} has no collection", model.name())))
    }

    fn load(
        &self,
        handle: ReferenceValue,
        model: &EntityModel,
        ctx: &mut DecodeContext<'_>,
    ) -> MappingResult<Value> {
        let Some(data_access) = ctx.data_access() else {
            log_event_with_fields(Event::EagerLoadSkipped, &[("entity", model.name())]);
            return Ok(Value::Reference(handle));
        };
        let (Some(id), Some(collection)) = (handle.id.clone(), handle.collection.clone()) else {
            return Ok(Value::Reference(handle));
        };
        if !ctx.begin_fetch(&collection, &id) {
            // Already loading further up this decode; keep the edge lazy
            return Ok(Value::Reference(handle));
        }

        let fetched = data_access
            .find_by_id(&collection, &id)
            .and_then(|found| match found {
                Some(document) => {
                    let codec = ctx.codecs().entity_codec(&model.entity_type())?;
                    let mut reader = BsonDocumentReader::new(&document);
                    codec.decode_entity(&mut reader, ctx).map(Some)
                }
                None => Ok(None),
            });
        ctx.end_fetch(&collection, &id);

        match fetched? {
            Some(target) => {
                let view = if target.entity_type() == model.entity_type() {
                    None
                } else {
                    ctx.codecs()
                        .models()
                        .model(&target.entity_type())?
                        .projection_to(&model.key())
                        .cloned()
                };
                Ok(Value::Reference(ReferenceValue {
                    target: Some(target),
                    view,
                    ..handle
                }))
            }
            None => {
                let rendered = id.to_string();
                log_event_with_fields(
                    Event::ReferenceUnresolved,
                    &[
                        ("entity", model.name()),
                        ("collection", collection.as_str()),
                        ("id", rendered.as_str()),
                    ],
                );
                Ok(Value::Reference(handle))
            }
        }
    }
}

impl Codec for ReferenceCodec {
    fn encode(
        &self,
        value: &Value,
        writer: &mut dyn DocumentWriter,
        ctx: &mut EncodeContext<'_>,
    ) -> MappingResult<()> {
        let reference = match value {
            Value::Reference(reference) => reference,
            Value::Null => return writer.write_null(),
            other => return Err(MappingError::malformed("reference", other.kind_name())),
        };
        let declared = ctx.codecs().models().model(&self.target)?;
        let id = match (&reference.id, &reference.target) {
            (Some(id), _) => id.clone(),
            (None, Some(target)) => self.identity_of(target.as_ref(), ctx)?,
            (None, None) => {
                return Err(MappingError::MissingReferenceId(declared.name().to_string()))
            }
        };

        if self.options.id_only {
            return writer.write_value(id);
        }
        let collection = self.collection_of(reference, &declared, ctx)?;
        writer.write_start_document()?;
        writer.write_name(REF_FIELD)?;
        writer.write_string(&collection)?;
        writer.write_name(REF_ID_FIELD)?;
        writer.write_value(id)?;
        writer.write_end_document()
    }

    fn decode(
        &self,
        reader: &mut dyn DocumentReader,
        ctx: &mut DecodeContext<'_>,
    ) -> MappingResult<Value> {
        let (id, collection) = match reader.peek_kind() {
            ElementKind::Null => {
                reader.read_null()?;
                return Ok(Value::Null);
            }
            ElementKind::Document => {
                // Only the id is needed; the stored shape is sniffed by path
                let flattened = FlattenedDocumentReader::from_reader(reader)?;
                let id = flattened
                    .find(REF_ID_FIELD)
                    .or_else(|| flattened.find(ID_FIELD))
                    .ok_or_else(|| MappingError::malformed("reference id", "document"))?;
                let collection = match flattened.find(REF_FIELD) {
                    Some(Bson::String(collection)) => Some(collection),
                    _ => None,
                };
                (id, collection)
            }
            _ => (reader.read_value()?, None),
        };

        let model = ctx.codecs().models().model(&self.target)?;
        let handle = ReferenceValue {
            id: Some(id),
            collection: collection.or_else(|| model.collection().map(str::to_string)),
            target: None,
            view: None,
        };

        match self.options.loading.unwrap_or(ctx.loading()) {
            LoadingPolicy::Lazy => Ok(Value::Reference(handle)),
            LoadingPolicy::Eager => self.load(handle, &model, ctx),
        }
    }
}
