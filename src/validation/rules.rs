//! Built-in constraint rules
//!
//! Every rule is independent and side-effect free on the models it reads.
//! Entity rules see one model at a time; property rules see one property of
//! one model. Both may consult the registry view for other models.

use std::collections::HashMap;

use super::violation::{ConstraintViolation, Level};
use crate::model::{EntityModel, PropertyKind, PropertyModel, RegistryView, ValueType};
use crate::options::LoadingPolicy;

/// Collects violations produced by rules
#[derive(Debug, Default)]
pub struct ViolationSink {
    violations: Vec<ConstraintViolation>,
}

impl ViolationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fatal(
        &mut self,
        entity: &EntityModel,
        property: Option<&PropertyModel>,
        rule: &'static str,
        message: impl Into<String>,
    ) {
        self.report(Level::Fatal, entity, property, rule, message);
    }

    pub fn warning(
        &mut self,
        entity: &EntityModel,
        property: Option<&PropertyModel>,
        rule: &'static str,
        message: impl Into<String>,
    ) {
        self.report(Level::Warning, entity, property, rule, message);
    }

    fn report(
        &mut self,
        level: Level,
        entity: &EntityModel,
        property: Option<&PropertyModel>,
        rule: &'static str,
        message: impl Into<String>,
    ) {
        self.violations.push(
            ConstraintViolation::new(
                level,
                entity.name(),
                property.map(|p| p.name().to_string()),
                rule,
                message,
            )
            .with_entity_key(entity.key()),
        );
    }

    pub fn violations(&self) -> &[ConstraintViolation] {
        &self.violations
    }

    pub fn into_violations(self) -> Vec<ConstraintViolation> {
        self.violations
    }
}

/// A rule over a whole entity model
pub trait ConstraintRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, registry: &RegistryView<'_>, entity: &EntityModel, sink: &mut ViolationSink);
}

/// A rule over one property of an entity model
pub trait PropertyConstraint: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(
        &self,
        registry: &RegistryView<'_>,
        entity: &EntityModel,
        property: &PropertyModel,
        sink: &mut ViolationSink,
    );
}

// =============================================================================
// Entity rules
// =============================================================================

/// More than one id property
pub struct MultipleId;

impl ConstraintRule for MultipleId {
    fn name(&self) -> &'static str {
        "MultipleId"
    }

    fn check(&self, _: &RegistryView<'_>, entity: &EntityModel, sink: &mut ViolationSink) {
        let ids: Vec<&str> = entity.id_properties().map(|p| p.name()).collect();
        if ids.len() > 1 {
            sink.fatal(
                entity,
                None,
                self.name(),
                format!("only one id property is allowed, found: {}", ids.join(", ")),
            );
        }
    }
}

/// Root entity without an id property
pub struct NoId;

impl ConstraintRule for NoId {
    fn name(&self) -> &'static str {
        "NoId"
    }

    fn check(&self, _: &RegistryView<'_>, entity: &EntityModel, sink: &mut ViolationSink) {
        if entity.is_root_entity() && entity.id_property().is_none() {
            sink.fatal(
                entity,
                None,
                self.name(),
                "a root entity must declare an id property",
            );
        }
    }
}

/// Embeddable type declaring an id
pub struct EmbeddedWithId;

impl ConstraintRule for EmbeddedWithId {
    fn name(&self) -> &'static str {
        "EmbeddedWithId"
    }

    fn check(&self, _: &RegistryView<'_>, entity: &EntityModel, sink: &mut ViolationSink) {
        if let (false, Some(id)) = (entity.is_root_entity(), entity.id_property()) {
            sink.warning(
                entity,
                Some(id),
                self.name(),
                "embeddable types are stored inline; the id is written as a plain '_id' field",
            );
        }
    }
}

/// Two properties map to the same document field
pub struct DuplicatedAttributeNames;

impl ConstraintRule for DuplicatedAttributeNames {
    fn name(&self) -> &'static str {
        "DuplicatedAttributeNames"
    }

    fn check(&self, _: &RegistryView<'_>, entity: &EntityModel, sink: &mut ViolationSink) {
        let mut owners: HashMap<&str, &str> = HashMap::new();
        for property in entity.properties().iter().filter(|p| !p.is_transient()) {
            let fields = std::iter::once(property.storage_name())
                .chain(property.also_load().iter().map(|n| n.as_str()));
            for field in fields {
                match owners.get(field) {
                    Some(owner) => sink.fatal(
                        entity,
                        Some(property),
                        self.name(),
                        format!("field '{}' is already mapped by property '{}'", field, owner),
                    ),
                    None => {
                        owners.insert(field, property.name());
                    }
                }
            }
        }
        if let Some(owner) = owners.get(entity.discriminator_key()) {
            sink.fatal(
                entity,
                entity.property(*owner),
                self.name(),
                format!(
                    "field '{}' is reserved for the discriminator",
                    entity.discriminator_key()
                ),
            );
        }
    }
}

/// Discriminator already claimed by another type of the same hierarchy
pub struct DuplicatedDiscriminator;

impl ConstraintRule for DuplicatedDiscriminator {
    fn name(&self) -> &'static str {
        "DuplicatedDiscriminator"
    }

    fn check(&self, registry: &RegistryView<'_>, entity: &EntityModel, sink: &mut ViolationSink) {
        let clash = registry.models().into_iter().find(|other| {
            other.key() != entity.key()
                && other.hierarchy_root() == entity.hierarchy_root()
                && other.discriminator() == entity.discriminator()
        });
        if let Some(other) = clash {
            sink.fatal(
                entity,
                None,
                self.name(),
                format!(
                    "discriminator '{}' is already used by {}",
                    entity.discriminator(),
                    other.name()
                ),
            );
        }
    }
}

/// Mapping facts declared before the type declared any property
pub struct AnnotationWithoutProperty;

impl ConstraintRule for AnnotationWithoutProperty {
    fn name(&self) -> &'static str {
        "AnnotationWithoutProperty"
    }

    fn check(&self, _: &RegistryView<'_>, entity: &EntityModel, sink: &mut ViolationSink) {
        for fact in entity.stray_annotations() {
            sink.fatal(
                entity,
                None,
                self.name(),
                format!("{} was declared before any property of the type", fact),
            );
        }
    }
}

// =============================================================================
// Property rules
// =============================================================================

/// The id may not also be a reference or carry an explicit storage name
pub struct IdDoesNotMix;

impl PropertyConstraint for IdDoesNotMix {
    fn name(&self) -> &'static str {
        "IdDoesNotMix"
    }

    fn check(
        &self,
        _: &RegistryView<'_>,
        entity: &EntityModel,
        property: &PropertyModel,
        sink: &mut ViolationSink,
    ) {
        if !property.is_id() {
            return;
        }
        let mut conflicts = Vec::new();
        if property.has_annotation("Reference") {
            conflicts.push("a reference".to_string());
        }
        if let Some(name) = property.explicit_name() {
            conflicts.push(format!("an explicit storage name '{}'", name));
        }
        if !conflicts.is_empty() {
            sink.fatal(
                entity,
                Some(property),
                self.name(),
                format!(
                    "'{}' is the id and cannot also be {}",
                    property.name(),
                    conflicts.join(" or ")
                ),
            );
        }
    }
}

/// Reference and embedded are exclusive
pub struct ReferenceAndEmbedded;

impl PropertyConstraint for ReferenceAndEmbedded {
    fn name(&self) -> &'static str {
        "ReferenceAndEmbedded"
    }

    fn check(
        &self,
        _: &RegistryView<'_>,
        entity: &EntityModel,
        property: &PropertyModel,
        sink: &mut ViolationSink,
    ) {
        if property.has_annotation("Reference") && property.has_annotation("Embedded") {
            sink.fatal(
                entity,
                Some(property),
                self.name(),
                format!("'{}' cannot be both a reference and embedded", property.name()),
            );
        }
    }
}

/// Transient excludes every other mapping fact
pub struct ContradictingAnnotations;

impl PropertyConstraint for ContradictingAnnotations {
    fn name(&self) -> &'static str {
        "ContradictingAnnotations"
    }

    fn check(
        &self,
        _: &RegistryView<'_>,
        entity: &EntityModel,
        property: &PropertyModel,
        sink: &mut ViolationSink,
    ) {
        if !property.is_transient() {
            return;
        }
        let others: Vec<&str> = property
            .annotations()
            .iter()
            .map(|a| a.name())
            .filter(|name| *name != "Transient")
            .collect();
        if !others.is_empty() {
            sink.fatal(
                entity,
                Some(property),
                self.name(),
                format!(
                    "'{}' is transient and cannot also declare {}",
                    property.name(),
                    others.join(", ")
                ),
            );
        }
    }
}

/// Reference targets must have an id
pub struct ReferenceToUnidentifiable;

impl PropertyConstraint for ReferenceToUnidentifiable {
    fn name(&self) -> &'static str {
        "ReferenceToUnidentifiable"
    }

    fn check(
        &self,
        registry: &RegistryView<'_>,
        entity: &EntityModel,
        property: &PropertyModel,
        sink: &mut ViolationSink,
    ) {
        let ValueType::Reference(target) = property.value_type().element() else {
            return;
        };
        if let Some(model) = registry.model(&target.key()) {
            if model.id_property().is_none() {
                sink.fatal(
                    entity,
                    Some(property),
                    self.name(),
                    format!(
                        "'{}' references {}, which has no id property",
                        property.name(),
                        model.name()
                    ),
                );
            }
        }
    }
}

/// A reference declaration needs a `Reference<T>` value
pub struct ReferenceTypeMismatch;

impl PropertyConstraint for ReferenceTypeMismatch {
    fn name(&self) -> &'static str {
        "ReferenceTypeMismatch"
    }

    fn check(
        &self,
        _: &RegistryView<'_>,
        entity: &EntityModel,
        property: &PropertyModel,
        sink: &mut ViolationSink,
    ) {
        let declared = property.has_annotation("Reference");
        let is_reference_type = matches!(property.value_type().element(), ValueType::Reference(_));
        if declared && !is_reference_type {
            sink.fatal(
                entity,
                Some(property),
                self.name(),
                format!(
                    "'{}' is declared as a reference but its type is {:?}",
                    property.name(),
                    property.value_type()
                ),
            );
        }
    }
}

/// `Arc<dyn Entity>` properties must name their hierarchy
pub struct UndeclaredPolymorphicType;

impl PropertyConstraint for UndeclaredPolymorphicType {
    fn name(&self) -> &'static str {
        "UndeclaredPolymorphicType"
    }

    fn check(
        &self,
        _: &RegistryView<'_>,
        entity: &EntityModel,
        property: &PropertyModel,
        sink: &mut ViolationSink,
    ) {
        let dynamic = *property.value_type().element() == ValueType::Dynamic;
        if dynamic && property.polymorphic().is_none() {
            sink.fatal(
                entity,
                Some(property),
                self.name(),
                format!(
                    "'{}' holds a polymorphic entity but declares no hierarchy",
                    property.name()
                ),
            );
        }
    }
}

/// Eager loading of references inside a list or map fetches per element
pub struct EagerReferenceInCollection;

impl PropertyConstraint for EagerReferenceInCollection {
    fn name(&self) -> &'static str {
        "EagerReferenceInCollection"
    }

    fn check(
        &self,
        _: &RegistryView<'_>,
        entity: &EntityModel,
        property: &PropertyModel,
        sink: &mut ViolationSink,
    ) {
        if let PropertyKind::Reference(options) = property.kind() {
            let eager = options.loading == Some(LoadingPolicy::Eager);
            if eager && property.value_type().is_collection() {
                sink.warning(
                    entity,
                    Some(property),
                    self.name(),
                    format!(
                        "'{}' eagerly loads every referenced element with a separate fetch",
                        property.name()
                    ),
                );
            }
        }
    }
}
