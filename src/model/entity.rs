//! Entity models

use std::any::Any;

use super::descriptor::{EmbeddingMode, PropertyOrigin, Projection, TypeDescriptor};
use super::property::PropertyModel;
use super::types::{Entity, EntityType, TypeKey};
use crate::options::{MapperOptions, PropertyDiscovery};

/// Built, immutable descriptor of one mapped type's storage shape.
#[derive(Debug)]
pub struct EntityModel {
    entity_type: EntityType,
    name: String,
    mode: EmbeddingMode,
    collection: Option<String>,
    discriminator_key: String,
    discriminator: String,
    parent: Option<TypeKey>,
    /// Nearest first
    ancestors: Vec<TypeKey>,
    root: TypeKey,
    /// Projection onto each ancestor, nearest first
    projections: Vec<(TypeKey, Projection)>,
    properties: Vec<PropertyModel>,
    id_index: Option<usize>,
    stray_annotations: Vec<String>,
    factory: fn() -> Box<dyn Entity>,
}

impl EntityModel {
    /// Builds a model from a descriptor. `parent` must be the already-built
    /// model of the descriptor's parent type.
    pub(crate) fn build(
        entity_type: EntityType,
        descriptor: TypeDescriptor,
        parent: Option<&EntityModel>,
        options: &MapperOptions,
    ) -> Self {
        let wanted = match options.property_discovery {
            PropertyDiscovery::Fields => PropertyOrigin::Field,
            PropertyDiscovery::Methods => PropertyOrigin::Accessor,
        };
        let properties: Vec<PropertyModel> = descriptor
            .properties()
            .into_iter()
            .filter(|p| p.origin() == wanted)
            .map(|p| PropertyModel::build(p, options))
            .collect();
        let id_index = properties.iter().position(|p| p.is_id());

        let discriminator_key = descriptor
            .discriminator_key
            .clone()
            .or_else(|| parent.map(|p| p.discriminator_key.clone()))
            .unwrap_or_else(|| options.discriminator_key.clone());
        let discriminator = descriptor.discriminator.clone().unwrap_or_else(|| {
            options
                .discriminator
                .compute(entity_type.name(), &descriptor.name)
        });

        let collection = match descriptor.mode {
            EmbeddingMode::Root => Some(
                descriptor
                    .collection
                    .clone()
                    .or_else(|| parent.and_then(|p| p.collection.clone()))
                    .unwrap_or_else(|| options.collection_naming.apply(&descriptor.name)),
            ),
            EmbeddingMode::Embeddable => None,
        };

        let mut ancestors = Vec::new();
        if let Some(parent) = parent {
            ancestors.push(parent.key());
            ancestors.extend(parent.ancestors.iter().copied());
        }
        let root = parent.map_or(entity_type.key(), |p| p.root);

        let mut projections = Vec::new();
        if let (Some(parent), Some(upcast)) = (parent, &descriptor.upcast) {
            projections.push((parent.key(), upcast.clone()));
            projections.extend(
                parent
                    .projections
                    .iter()
                    .map(|(key, further)| (*key, upcast.then(further))),
            );
        }

        Self {
            entity_type,
            name: descriptor.name,
            mode: descriptor.mode,
            collection,
            discriminator_key,
            discriminator,
            parent: parent.map(|p| p.key()),
            ancestors,
            root,
            projections,
            properties,
            id_index,
            stray_annotations: descriptor.stray,
            factory: descriptor.factory,
        }
    }

    pub fn key(&self) -> TypeKey {
        self.entity_type.key()
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    /// Declared simple name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> EmbeddingMode {
        self.mode
    }

    pub fn is_root_entity(&self) -> bool {
        self.mode == EmbeddingMode::Root
    }

    /// Collection name; `None` for embeddable types
    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn discriminator_key(&self) -> &str {
        &self.discriminator_key
    }

    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    pub fn parent(&self) -> Option<TypeKey> {
        self.parent
    }

    /// Ancestors, nearest first
    pub fn ancestors(&self) -> &[TypeKey] {
        &self.ancestors
    }

    /// Root-most type of this model's hierarchy
    pub fn hierarchy_root(&self) -> TypeKey {
        self.root
    }

    /// Properties in storage order
    pub fn properties(&self) -> &[PropertyModel] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyModel> {
        self.properties.iter().find(|p| p.name() == name)
    }

    /// Property stored under `field` (storage or also-load name)
    pub fn property_for_field(&self, field: &str) -> Option<&PropertyModel> {
        self.properties
            .iter()
            .find(|p| !p.is_transient() && p.matches_field(field))
    }

    pub fn id_property(&self) -> Option<&PropertyModel> {
        self.id_index.and_then(|i| self.properties.get(i))
    }

    /// Every property declared as id
    pub fn id_properties(&self) -> impl Iterator<Item = &PropertyModel> {
        self.properties.iter().filter(|p| p.is_id())
    }

    /// True if this type is `key` or one of its subtypes
    pub fn is_assignable_to(&self, key: &TypeKey) -> bool {
        self.key() == *key || self.ancestors.contains(key)
    }

    /// Projection of this type's instances onto the ancestor `key`
    pub fn projection_to(&self, key: &TypeKey) -> Option<&Projection> {
        self.projections
            .iter()
            .find(|(ancestor, _)| ancestor == key)
            .map(|(_, projection)| projection)
    }

    /// Views `instance`, an instance of this type, as `key`: itself or one
    /// of its ancestors.
    pub fn view_as<'a>(&self, instance: &'a dyn Any, key: &TypeKey) -> Option<&'a dyn Any> {
        if self.key() == *key {
            return Some(instance);
        }
        self.projection_to(key)?.apply(instance)
    }

    /// Mapping facts declared before any property existed
    pub fn stray_annotations(&self) -> &[String] {
        &self.stray_annotations
    }

    /// Creates a default-initialized instance
    pub fn new_instance(&self) -> Box<dyn Entity> {
        (self.factory)()
    }
}
