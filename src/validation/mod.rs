//! Validation engine
//!
//! A chain of independent rules evaluated over freshly built entity models.
//! The registry validates a whole batch before publishing anything: any
//! FATAL violation rejects the batch, WARNING violations are returned with
//! the successful report.
//!
//! Rule order affects only message order, never the outcome.

mod rules;
mod violation;

pub use rules::{
    AnnotationWithoutProperty, ConstraintRule, ContradictingAnnotations, DuplicatedAttributeNames,
    DuplicatedDiscriminator, EagerReferenceInCollection, EmbeddedWithId, IdDoesNotMix, MultipleId,
    NoId, PropertyConstraint, ReferenceAndEmbedded, ReferenceToUnidentifiable,
    ReferenceTypeMismatch, UndeclaredPolymorphicType, ViolationSink,
};
pub use violation::{ConstraintViolation, EntityReport, Level, ValidationReport};

use std::sync::Arc;

use crate::model::{EntityModel, RegistryView};

/// Runs entity and property rules over a batch of models
pub struct Validator {
    entity_rules: Vec<Box<dyn ConstraintRule>>,
    property_rules: Vec<Box<dyn PropertyConstraint>>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::empty()
            .with_rule(MultipleId)
            .with_rule(NoId)
            .with_rule(EmbeddedWithId)
            .with_rule(DuplicatedAttributeNames)
            .with_rule(DuplicatedDiscriminator)
            .with_rule(AnnotationWithoutProperty)
            .with_property_rule(IdDoesNotMix)
            .with_property_rule(ReferenceAndEmbedded)
            .with_property_rule(ContradictingAnnotations)
            .with_property_rule(ReferenceToUnidentifiable)
            .with_property_rule(ReferenceTypeMismatch)
            .with_property_rule(UndeclaredPolymorphicType)
            .with_property_rule(EagerReferenceInCollection)
    }
}

impl Validator {
    /// A validator with no rules
    pub fn empty() -> Self {
        Self {
            entity_rules: Vec::new(),
            property_rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: impl ConstraintRule + 'static) -> Self {
        self.entity_rules.push(Box::new(rule));
        self
    }

    pub fn with_property_rule(mut self, rule: impl PropertyConstraint + 'static) -> Self {
        self.property_rules.push(Box::new(rule));
        self
    }

    /// Names of all configured rules, entity rules first
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.entity_rules
            .iter()
            .map(|r| r.name())
            .chain(self.property_rules.iter().map(|r| r.name()))
            .collect()
    }

    /// Validates every model of the batch. Runs to completion and reports
    /// all findings together.
    pub fn validate(
        &self,
        registry: &RegistryView<'_>,
        batch: &[Arc<EntityModel>],
    ) -> ValidationReport {
        let mut report = ValidationReport::new();
        for entity in batch {
            report.add_entity(entity.key(), entity.name());
            let mut sink = ViolationSink::new();
            for rule in &self.entity_rules {
                rule.check(registry, entity, &mut sink);
            }
            for property in entity.properties() {
                for rule in &self.property_rules {
                    rule.check(registry, entity, property, &mut sink);
                }
            }
            report.extend(sink.into_violations());
        }
        report
    }
}
