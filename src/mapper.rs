//! Mapper facade
//!
//! Ties the model registry, codec registry and optional data access into one
//! handle. A `Mapper` is cheap to share behind an `Arc`; every method takes
//! `&self`.

use std::sync::Arc;

use bson::{Bson, Document};

use crate::codec::{
    CodecProvider, CodecRegistry, DataAccess, DecodeContext, EncodeContext, Reference,
};
use crate::document::{BsonDocumentReader, BsonDocumentWriter, DocumentReader, DocumentWriter};
use crate::errors::{MappingError, MappingResult};
use crate::model::{
    downcast_arc, Entity, EntityModel, EntityType, Mapped, ModelRegistry, TypeKey,
};
use crate::options::MapperOptions;
use crate::validation::ValidationReport;

/// Object-document mapper
pub struct Mapper {
    models: Arc<ModelRegistry>,
    codecs: CodecRegistry,
    data_access: Option<Arc<dyn DataAccess>>,
}

impl Mapper {
    pub fn new(options: MapperOptions) -> Self {
        let models = Arc::new(ModelRegistry::new(options));
        Self {
            codecs: CodecRegistry::new(models.clone()),
            models,
            data_access: None,
        }
    }

    /// Mapper over an existing registry, sharing its models
    pub fn with_registry(models: Arc<ModelRegistry>) -> Self {
        Self {
            codecs: CodecRegistry::new(models.clone()),
            models,
            data_access: None,
        }
    }

    /// Collaborator used to load referenced entities
    pub fn with_data_access(mut self, data_access: Arc<dyn DataAccess>) -> Self {
        self.data_access = Some(data_access);
        self
    }

    /// Register a codec provider consulted before the built-in codecs
    pub fn with_provider(mut self, provider: Arc<dyn CodecProvider>) -> Self {
        self.codecs.add_provider(provider);
        self
    }

    pub fn options(&self) -> &MapperOptions {
        self.models.options()
    }

    pub fn models(&self) -> &Arc<ModelRegistry> {
        &self.models
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    /// Build and validate a batch of types up front
    pub fn map(&self, types: &[EntityType]) -> MappingResult<ValidationReport> {
        self.models.map(types)
    }

    pub fn entity_model<T: Mapped>(&self) -> MappingResult<Arc<EntityModel>> {
        self.models.entity_model::<T>()
    }

    /// Encode an entity as a document of its own type
    pub fn to_document<T: Mapped>(&self, entity: &T) -> MappingResult<Document> {
        self.to_document_as(&EntityType::of::<T>(), entity)
    }

    /// Encode an entity as a document of `declared`, which must be the
    /// entity's type or one of its ancestors.
    pub fn to_document_as(
        &self,
        declared: &EntityType,
        entity: &dyn Entity,
    ) -> MappingResult<Document> {
        let mut writer = BsonDocumentWriter::new();
        self.encode_as(declared, entity, &mut writer)?;
        writer.into_document()
    }

    /// Encode an entity through any writer
    pub fn encode(&self, entity: &dyn Entity, writer: &mut dyn DocumentWriter) -> MappingResult<()> {
        self.encode_as(&entity.entity_type(), entity, writer)
    }

    pub fn encode_as(
        &self,
        declared: &EntityType,
        entity: &dyn Entity,
        writer: &mut dyn DocumentWriter,
    ) -> MappingResult<()> {
        let codec = self.codecs.entity_codec(declared)?;
        let mut ctx = EncodeContext::new(&self.codecs);
        codec.encode_entity(entity, writer, &mut ctx)
    }

    pub fn from_document<T: Mapped>(&self, document: &Document) -> MappingResult<T> {
        let mut reader = BsonDocumentReader::new(document);
        let decoded = self.decode::<T>(&mut reader)?;
        Ok(Arc::try_unwrap(decoded).unwrap_or_else(|shared| (*shared).clone()))
    }

    /// Decode the document at the cursor as `T`.
    ///
    /// A discriminator naming a subtype of `T` fails with
    /// `IncompatibleDiscriminator`; use `decode_polymorphic` for hierarchies.
    pub fn decode<T: Mapped>(&self, reader: &mut dyn DocumentReader) -> MappingResult<Arc<T>> {
        let declared = EntityType::of::<T>();
        let decoded = self.decode_polymorphic(&declared, reader)?;
        if decoded.is::<T>() {
            return downcast_arc::<T>(decoded);
        }
        let resolved = self.models.model(&decoded.entity_type())?;
        Err(MappingError::IncompatibleDiscriminator {
            declared: self.models.model(&declared)?.name().to_string(),
            resolved: resolved.name().to_string(),
            value: resolved.discriminator().to_string(),
        })
    }

    /// Decode the document at the cursor as `declared` or any mapped subtype
    pub fn decode_polymorphic(
        &self,
        declared: &EntityType,
        reader: &mut dyn DocumentReader,
    ) -> MappingResult<Arc<dyn Entity>> {
        let codec = self.codecs.entity_codec(declared)?;
        let mut ctx = self.decode_context();
        codec.decode_entity(reader, &mut ctx)
    }

    pub fn from_document_polymorphic(
        &self,
        declared: &EntityType,
        document: &Document,
    ) -> MappingResult<Arc<dyn Entity>> {
        let mut reader = BsonDocumentReader::new(document);
        self.decode_polymorphic(declared, &mut reader)
    }

    /// Returns the target of a reference as a `T`, fetching it if not
    /// loaded. A stored subtype is viewed through its `T` part.
    ///
    /// Missing targets are `MappingError::ReferenceNotFound`, a recoverable
    /// error: the referencing entity itself stays usable.
    pub fn dereference<T: Mapped>(&self, reference: &Reference<T>) -> MappingResult<Arc<T>> {
        let entity = self.dereference_entity(reference)?;
        if entity.is::<T>() {
            return downcast_arc::<T>(entity);
        }
        let resolved = self.models.model(&entity.entity_type())?;
        resolved
            .view_as(entity.as_any(), &TypeKey::of::<T>())
            .and_then(|view| view.downcast_ref::<T>())
            .map(|view| Arc::new(view.clone()))
            .ok_or_else(|| MappingError::IncompatibleDiscriminator {
                declared: std::any::type_name::<T>().to_string(),
                resolved: resolved.name().to_string(),
                value: resolved.discriminator().to_string(),
            })
    }

    /// Returns the target of a reference with its runtime type, which may be
    /// any mapped subtype of `T`.
    pub fn dereference_entity<T: Mapped>(
        &self,
        reference: &Reference<T>,
    ) -> MappingResult<Arc<dyn Entity>> {
        if let Some(target) = reference.entity() {
            return Ok(target.clone());
        }

        let model = self.models.entity_model::<T>()?;
        let id = reference
            .id()
            .cloned()
            .ok_or_else(|| MappingError::MissingReferenceId(model.name().to_string()))?;
        let collection = match reference.collection().or(model.collection()) {
            Some(collection) => collection.to_string(),
            None => {
                return Err(MappingError::invalid_state(format!(
                    "{} has no collection",
                    model.name()
                )))
            }
        };
        let data_access = self.data_access.as_ref().ok_or_else(|| {
            MappingError::DataAccess("no data access configured for dereference".into())
        })?;

        let document = data_access
            .find_by_id(&collection, &id)?
            .ok_or_else(|| not_found(&model, &collection, &id))?;
        self.from_document_polymorphic(&model.entity_type(), &document)
    }

    /// Id of the reference's target: the stored id, or the id property of
    /// the loaded target read through its model and stored as configured.
    pub fn reference_id<T: Mapped>(&self, reference: &Reference<T>) -> MappingResult<Bson> {
        if let Some(id) = reference.id() {
            return Ok(id.clone());
        }
        let declared = self.models.entity_model::<T>()?;
        let missing = || MappingError::MissingReferenceId(declared.name().to_string());
        let target = reference.entity().ok_or_else(missing)?;
        let model = self.models.model(&target.entity_type())?;
        let id = model.id_property().ok_or_else(missing)?;
        let value = id.get(target.as_ref())?;
        if value.is_null() {
            return Err(missing());
        }
        let codec = self.codecs.lookup(id.value_type(), Some(id))?;
        let mut writer = BsonDocumentWriter::new();
        codec.encode(&value, &mut writer, &mut EncodeContext::new(&self.codecs))?;
        writer.into_bson()
    }

    fn decode_context(&self) -> DecodeContext<'_> {
        DecodeContext::new(&self.codecs).with_data_access(self.data_access.as_deref())
    }
}

fn not_found(model: &EntityModel, collection: &str, id: &Bson) -> MappingError {
    MappingError::ReferenceNotFound {
        entity: model.name().to_string(),
        collection: collection.to_string(),
        id: id.to_string(),
    }
}
