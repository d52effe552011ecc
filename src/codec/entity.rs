//! Entity codec
//!
//! Document layout written for an entity:
//!
//! 1. `_id`, when the type has an id and the value is present
//! 2. the discriminator, when the runtime type differs from the declared
//!    type (or always, if configured)
//! 3. every other persisted property in model order
//!
//! Decoding sniffs the discriminator with mark/reset before reading any
//! property, so the concrete type is known before the instance is created.

use std::sync::Arc;

use super::context::{DecodeContext, EncodeContext};
use super::Codec;
use crate::document::{DocumentReader, DocumentWriter, ElementKind};
use crate::errors::{MappingError, MappingResult};
use crate::model::{Entity, EntityModel, PropertyModel, Value, ID_FIELD};
use crate::observability::{log_event_with_fields, Event};

/// Codec for one declared entity type and its mapped subtypes
#[derive(Debug)]
pub struct EntityCodec {
    model: Arc<EntityModel>,
}

impl EntityCodec {
    pub fn new(model: Arc<EntityModel>) -> Self {
        Self { model }
    }

    /// Model of the declared type
    pub fn model(&self) -> &Arc<EntityModel> {
        &self.model
    }

    /// Writes `entity` as a document.
    pub fn encode_entity(
        &self,
        entity: &dyn Entity,
        writer: &mut dyn DocumentWriter,
        ctx: &mut EncodeContext<'_>,
    ) -> MappingResult<()> {
        let runtime = ctx.codecs().models().model(&entity.entity_type())?;
        if !runtime.is_assignable_to(&self.model.key()) {
            return Err(MappingError::IncompatibleDiscriminator {
                declared: self.model.name().to_string(),
                resolved: runtime.name().to_string(),
                value: runtime.discriminator().to_string(),
            });
        }

        let address = entity.address();
        if !ctx.enter(address) {
            return Err(MappingError::CyclicEmbedding(runtime.name().to_string()));
        }
        let result = self.write_document(&runtime, entity, writer, ctx);
        ctx.leave(address);
        result
    }

    fn write_document(
        &self,
        runtime: &EntityModel,
        entity: &dyn Entity,
        writer: &mut dyn DocumentWriter,
        ctx: &mut EncodeContext<'_>,
    ) -> MappingResult<()> {
        writer.write_start_document()?;

        if let Some(id) = runtime.id_property() {
            let value = id
                .get(entity)
                .map_err(|e| e.in_property(runtime.name(), id.name()))?;
            if !value.is_null() {
                writer.write_name(ID_FIELD)?;
                write_property(runtime, id, &value, writer, ctx)?;
            }
        }

        let always = ctx.codecs().options().always_write_discriminator;
        if always || runtime.key() != self.model.key() {
            writer.write_name(runtime.discriminator_key())?;
            writer.write_string(runtime.discriminator())?;
        }

        for property in runtime.properties() {
            if property.is_id() || !property.is_persisted() {
                continue;
            }
            let value = property
                .get(entity)
                .map_err(|e| e.in_property(runtime.name(), property.name()))?;
            if value.is_null() && !property.store_nulls() {
                continue;
            }
            if value.is_empty_collection() && !property.store_empties() {
                continue;
            }
            writer.write_name(property.storage_name())?;
            write_property(runtime, property, &value, writer, ctx)?;
        }

        writer.write_end_document()
    }

    /// Reads a document into a new instance of the declared type or of the
    /// subtype its discriminator names.
    pub fn decode_entity(
        &self,
        reader: &mut dyn DocumentReader,
        ctx: &mut DecodeContext<'_>,
    ) -> MappingResult<Arc<dyn Entity>> {
        let model = self.resolve_model(reader, ctx)?;
        let mut instance = model.new_instance();

        reader.read_start_document()?;
        while reader.peek_kind() != ElementKind::EndOfDocument {
            let field = reader.read_name()?;
            let Some(property) = model.property_for_field(&field) else {
                reader.skip_value()?;
                continue;
            };
            let value = read_property(property, reader, ctx)
                .map_err(|e| e.in_property(model.name(), property.name()))?;
            property
                .set(instance.as_mut(), value)
                .map_err(|e| e.in_property(model.name(), property.name()))?;
        }
        reader.read_end_document()?;

        Ok(Arc::from(instance))
    }

    fn resolve_model(
        &self,
        reader: &mut dyn DocumentReader,
        ctx: &mut DecodeContext<'_>,
    ) -> MappingResult<Arc<EntityModel>> {
        let mark = reader.mark();
        let sniffed = sniff_discriminator(reader, self.model.discriminator_key());
        reader.reset(&mark)?;

        let value = match sniffed? {
            Some(value) if value != self.model.discriminator() => value,
            _ => return Ok(self.model.clone()),
        };

        let codecs = ctx.codecs();
        match codecs.models().resolve_discriminator(&self.model, &value)? {
            Some(resolved) if resolved.is_assignable_to(&self.model.key()) => Ok(resolved),
            Some(resolved) => Err(MappingError::IncompatibleDiscriminator {
                declared: self.model.name().to_string(),
                resolved: resolved.name().to_string(),
                value,
            }),
            None if codecs.options().strict_polymorphism => {
                Err(MappingError::UnknownDiscriminator {
                    declared: self.model.name().to_string(),
                    value,
                })
            }
            None => {
                log_event_with_fields(
                    Event::DiscriminatorFallback,
                    &[("declared", self.model.name()), ("discriminator", value.as_str())],
                );
                Ok(self.model.clone())
            }
        }
    }
}

impl Codec for EntityCodec {
    fn encode(
        &self,
        value: &Value,
        writer: &mut dyn DocumentWriter,
        ctx: &mut EncodeContext<'_>,
    ) -> MappingResult<()> {
        match value {
            Value::Entity(entity) => self.encode_entity(entity.as_ref(), writer, ctx),
            Value::Null => writer.write_null(),
            other => Err(MappingError::malformed("entity", other.kind_name())),
        }
    }

    fn decode(
        &self,
        reader: &mut dyn DocumentReader,
        ctx: &mut DecodeContext<'_>,
    ) -> MappingResult<Value> {
        if reader.peek_kind() == ElementKind::Null {
            reader.read_null()?;
            return Ok(Value::Null);
        }
        self.decode_entity(reader, ctx).map(Value::Entity)
    }
}

fn write_property(
    owner: &EntityModel,
    property: &PropertyModel,
    value: &Value,
    writer: &mut dyn DocumentWriter,
    ctx: &mut EncodeContext<'_>,
) -> MappingResult<()> {
    let codec = ctx
        .codecs()
        .lookup(property.value_type(), Some(property))
        .map_err(|e| e.in_property(owner.name(), property.name()))?;
    codec
        .encode(value, writer, ctx)
        .map_err(|e| e.in_property(owner.name(), property.name()))
}

fn read_property(
    property: &PropertyModel,
    reader: &mut dyn DocumentReader,
    ctx: &mut DecodeContext<'_>,
) -> MappingResult<Value> {
    let codec = ctx.codecs().lookup(property.value_type(), Some(property))?;
    codec.decode(reader, ctx)
}

/// Reads the discriminator of the document at the cursor, if present. A
/// discriminator field that is not a string is malformed.
/// Leaves the reader wherever it stopped; callers reset to a mark.
fn sniff_discriminator(
    reader: &mut dyn DocumentReader,
    key: &str,
) -> MappingResult<Option<String>> {
    reader.read_start_document()?;
    while reader.peek_kind() != ElementKind::EndOfDocument {
        if reader.read_name()? == key {
            return match reader.peek_kind() {
                ElementKind::String => reader.read_string().map(Some),
                kind => Err(MappingError::malformed("string", kind.as_str())),
            };
        }
        reader.skip_value()?;
    }
    Ok(None)
}
