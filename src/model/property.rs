//! Property models

use super::descriptor::{Annotation, PropertyAccessor, PropertyDescriptor, ReferenceOptions};
use super::types::{Entity, EntityType, TypeKey};
use super::value::{Value, ValueType};
use crate::errors::MappingResult;
use crate::options::MapperOptions;

/// Storage name of every id property
pub const ID_FIELD: &str = "_id";

/// Classification of a property, resolved once at build time
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKind {
    Id,
    Reference(ReferenceOptions),
    Embedded(EntityType),
    Plain,
}

/// Built descriptor of one mapped property
#[derive(Debug, Clone)]
pub struct PropertyModel {
    name: String,
    storage_name: String,
    also_load: Vec<String>,
    value_type: ValueType,
    kind: PropertyKind,
    annotations: Vec<Annotation>,
    polymorphic: Option<EntityType>,
    nullable: bool,
    store_nulls: bool,
    store_empties: bool,
    persisted: bool,
    transient: bool,
    declared_by: TypeKey,
    accessor: PropertyAccessor,
}

impl PropertyModel {
    /// Classifies a declared property and applies the configured naming and
    /// storage policies.
    pub(crate) fn build(descriptor: PropertyDescriptor, options: &MapperOptions) -> Self {
        let has = |wanted: &str| descriptor.annotations.iter().any(|a| a.name() == wanted);
        let transient = has("Transient");
        let persisted = !has("NotSaved");

        let reference = descriptor.annotations.iter().find_map(|a| match a {
            Annotation::Reference(opts) => Some(*opts),
            _ => None,
        });
        let explicit_name = descriptor.annotations.iter().find_map(|a| match a {
            Annotation::Property(name) => Some(name.clone()),
            _ => None,
        });
        let also_load = descriptor
            .annotations
            .iter()
            .filter_map(|a| match a {
                Annotation::AlsoLoad(names) => Some(names.clone()),
                _ => None,
            })
            .flatten()
            .collect();

        let kind = if has("Id") {
            PropertyKind::Id
        } else if let Some(opts) = reference {
            PropertyKind::Reference(opts)
        } else {
            match descriptor.value_type.element() {
                ValueType::Reference(_) => PropertyKind::Reference(ReferenceOptions::default()),
                ValueType::Entity(target) => PropertyKind::Embedded(*target),
                ValueType::Dynamic => match descriptor.polymorphic {
                    Some(root) => PropertyKind::Embedded(root),
                    None => PropertyKind::Plain,
                },
                _ => PropertyKind::Plain,
            }
        };

        let storage_name = match (&kind, explicit_name) {
            (PropertyKind::Id, _) => ID_FIELD.to_string(),
            (_, Some(name)) => name,
            _ => options.property_naming.apply(&descriptor.name),
        };

        Self {
            storage_name,
            also_load,
            nullable: descriptor.value_type.is_optional(),
            store_nulls: descriptor.store_nulls.unwrap_or(options.store_nulls),
            store_empties: descriptor.store_empties.unwrap_or(options.store_empties),
            persisted,
            transient,
            kind,
            name: descriptor.name,
            value_type: descriptor.value_type,
            annotations: descriptor.annotations,
            polymorphic: descriptor.polymorphic,
            declared_by: descriptor.declared_by,
            accessor: descriptor.accessor,
        }
    }

    /// Logical name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field name in stored documents
    pub fn storage_name(&self) -> &str {
        &self.storage_name
    }

    /// Extra field names accepted on decode
    pub fn also_load(&self) -> &[String] {
        &self.also_load
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn has_annotation(&self, name: &str) -> bool {
        self.annotations.iter().any(|a| a.name() == name)
    }

    /// Storage name given explicitly, bypassing the naming strategy
    pub fn explicit_name(&self) -> Option<&str> {
        self.annotations.iter().find_map(|a| match a {
            Annotation::Property(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Hierarchy declared for an `Arc<dyn Entity>` property
    pub fn polymorphic(&self) -> Option<EntityType> {
        self.polymorphic
    }

    pub fn is_id(&self) -> bool {
        self.kind == PropertyKind::Id
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.kind, PropertyKind::Reference(_))
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self.kind, PropertyKind::Embedded(_))
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn store_nulls(&self) -> bool {
        self.store_nulls
    }

    pub fn store_empties(&self) -> bool {
        self.store_empties
    }

    /// False for properties that are loaded but never written
    pub fn is_persisted(&self) -> bool {
        self.persisted && !self.transient
    }

    /// Transient properties are neither written nor loaded
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// Type whose level declared this property
    pub fn declared_by(&self) -> TypeKey {
        self.declared_by
    }

    /// True if `field` is the storage name or an also-load name
    pub fn matches_field(&self, field: &str) -> bool {
        self.storage_name == field || self.also_load.iter().any(|n| n == field)
    }

    /// Read the property from an instance
    pub fn get(&self, instance: &dyn Entity) -> MappingResult<Value> {
        self.accessor.get(instance.as_any())
    }

    /// Write the property into an instance
    pub fn set(&self, instance: &mut dyn Entity, value: Value) -> MappingResult<()> {
        self.accessor.set(instance.as_any_mut(), value)
    }
}
