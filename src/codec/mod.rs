//! Codec subsystem
//!
//! A codec converts one `Value` shape to and from a document cursor. The
//! `CodecRegistry` picks a codec per property type:
//!
//! 1. user-supplied providers, in registration order
//! 2. entity codecs (cached per declared type)
//! 3. reference codecs, configured from the property's reference options
//! 4. optional / list / map wrappers around the element codec
//! 5. the scalar codec
//!
//! Codecs hold no per-call state; cycle detection and eager-load tracking
//! live in `EncodeContext` / `DecodeContext`.

mod context;
mod data_access;
mod entity;
mod primitive;
mod reference;

pub use context::{DecodeContext, EncodeContext};
pub use data_access::{DataAccess, MemoryDataAccess};
pub use entity::EntityCodec;
pub use primitive::{ListCodec, MapCodec, OptionalCodec, ScalarCodec};
pub use reference::{Reference, ReferenceCodec};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::document::{DocumentReader, DocumentWriter};
use crate::errors::{poisoned, MappingError, MappingResult};
use crate::model::{
    EntityType, ModelRegistry, PropertyKind, PropertyModel, TypeKey, Value, ValueType,
};
use crate::options::MapperOptions;

/// Converts values of one shape to and from documents
pub trait Codec: Send + Sync {
    fn encode(
        &self,
        value: &Value,
        writer: &mut dyn DocumentWriter,
        ctx: &mut EncodeContext<'_>,
    ) -> MappingResult<()>;

    fn decode(
        &self,
        reader: &mut dyn DocumentReader,
        ctx: &mut DecodeContext<'_>,
    ) -> MappingResult<Value>;
}

/// Supplies codecs for value types before the built-in lookup runs
pub trait CodecProvider: Send + Sync {
    fn get(&self, value_type: &ValueType) -> Option<Arc<dyn Codec>>;
}

/// Codec lookup over a model registry
pub struct CodecRegistry {
    models: Arc<ModelRegistry>,
    providers: Vec<Arc<dyn CodecProvider>>,
    entity_codecs: RwLock<HashMap<TypeKey, Arc<EntityCodec>>>,
}

impl CodecRegistry {
    pub fn new(models: Arc<ModelRegistry>) -> Self {
        Self {
            models,
            providers: Vec::new(),
            entity_codecs: RwLock::new(HashMap::new()),
        }
    }

    /// Register a provider; earlier providers win
    pub fn add_provider(&mut self, provider: Arc<dyn CodecProvider>) {
        self.providers.push(provider);
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn options(&self) -> &MapperOptions {
        self.models.options()
    }

    /// Codec for a declared entity type, building its model if needed
    pub fn entity_codec(&self, entity_type: &EntityType) -> MappingResult<Arc<EntityCodec>> {
        let key = entity_type.key();
        {
            let codecs = self.entity_codecs.read().map_err(|_| poisoned())?;
            if let Some(codec) = codecs.get(&key) {
                return Ok(codec.clone());
            }
        }

        let model = self.models.model(entity_type)?;
        let mut codecs = self.entity_codecs.write().map_err(|_| poisoned())?;
        Ok(codecs
            .entry(key)
            .or_insert_with(|| Arc::new(EntityCodec::new(model)))
            .clone())
    }

    /// Codec for a value type; `property` supplies reference options and the
    /// polymorphic root of dynamic values.
    pub fn lookup(
        &self,
        value_type: &ValueType,
        property: Option<&PropertyModel>,
    ) -> MappingResult<Arc<dyn Codec>> {
        for provider in &self.providers {
            if let Some(codec) = provider.get(value_type) {
                return Ok(codec);
            }
        }

        let codec: Arc<dyn Codec> = match value_type {
            ValueType::Entity(target) => self.entity_codec(target)?,
            ValueType::Dynamic => {
                let root = property.and_then(|p| p.polymorphic()).ok_or_else(|| {
                    MappingError::invalid_state("dynamic entity value without a declared root type")
                })?;
                self.entity_codec(&root)?
            }
            ValueType::Reference(target) => {
                let options = match property.map(|p| p.kind()) {
                    Some(PropertyKind::Reference(options)) => *options,
                    _ => Default::default(),
                };
                Arc::new(ReferenceCodec::new(*target, options))
            }
            ValueType::Optional(inner) => Arc::new(OptionalCodec::new(self.lookup(inner, property)?)),
            ValueType::List(element) => Arc::new(ListCodec::new(self.lookup(element, property)?)),
            ValueType::Map(value) => Arc::new(MapCodec::new(self.lookup(value, property)?)),
            scalar => Arc::new(ScalarCodec::new(scalar.clone())),
        };
        Ok(codec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{BsonDocumentReader, BsonDocumentWriter};
    use bson::Bson;

    struct Upper;

    impl Codec for Upper {
        fn encode(
            &self,
            value: &Value,
            writer: &mut dyn DocumentWriter,
            _: &mut EncodeContext<'_>,
        ) -> MappingResult<()> {
            match value {
                Value::String(s) => writer.write_string(&s.to_uppercase()),
                other => Err(MappingError::malformed("string", other.kind_name())),
            }
        }

        fn decode(
            &self,
            reader: &mut dyn DocumentReader,
            _: &mut DecodeContext<'_>,
        ) -> MappingResult<Value> {
            reader.read_string().map(|s| Value::String(s.to_lowercase()))
        }
    }

    struct UpperProvider;

    impl CodecProvider for UpperProvider {
        fn get(&self, value_type: &ValueType) -> Option<Arc<dyn Codec>> {
            (*value_type == ValueType::String).then(|| Arc::new(Upper) as Arc<dyn Codec>)
        }
    }

    fn registry() -> CodecRegistry {
        CodecRegistry::new(Arc::new(ModelRegistry::new(MapperOptions::default())))
    }

    #[test]
    fn test_scalar_lookup_round_trip() {
        let codecs = registry();
        let codec = codecs
            .lookup(&ValueType::List(Box::new(ValueType::Int64)), None)
            .unwrap();

        let mut writer = BsonDocumentWriter::new();
        let value = Value::List(vec![Value::Int64(1), Value::Int64(2)]);
        codec
            .encode(&value, &mut writer, &mut EncodeContext::new(&codecs))
            .unwrap();
        let stored = writer.into_bson().unwrap();
        assert_eq!(stored, Bson::Array(vec![Bson::Int64(1), Bson::Int64(2)]));

        let mut reader = BsonDocumentReader::from_value(&stored);
        let decoded = codec
            .decode(&mut reader, &mut DecodeContext::new(&codecs))
            .unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_provider_wins_over_builtin() {
        let mut codecs = registry();
        codecs.add_provider(Arc::new(UpperProvider));
        let codec = codecs.lookup(&ValueType::String, None).unwrap();

        let mut writer = BsonDocumentWriter::new();
        codec
            .encode(
                &Value::String("abc".into()),
                &mut writer,
                &mut EncodeContext::new(&codecs),
            )
            .unwrap();
        assert_eq!(writer.into_bson().unwrap(), Bson::String("ABC".into()));
    }

    #[test]
    fn test_dynamic_without_root_is_rejected() {
        let codecs = registry();
        assert!(matches!(
            codecs.lookup(&ValueType::Dynamic, None),
            Err(MappingError::InvalidState(_))
        ));
    }
}
