//! Constraint violations and validation reports

use std::fmt;

use crate::model::TypeKey;

/// Severity of a constraint violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Discouraged but legal; reported, never aborts
    Warning,
    /// Illegal; aborts the mapping batch
    Fatal,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Warning => "WARNING",
            Level::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a failed rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintViolation {
    level: Level,
    /// Type the violation belongs to; `None` for name-only violations
    entity_key: Option<TypeKey>,
    entity: String,
    property: Option<String>,
    rule: &'static str,
    message: String,
}

impl ConstraintViolation {
    pub fn new(
        level: Level,
        entity: impl Into<String>,
        property: Option<String>,
        rule: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level,
            entity_key: None,
            entity: entity.into(),
            property,
            rule,
            message: message.into(),
        }
    }

    /// Attach the violating type's key
    pub fn with_entity_key(mut self, key: TypeKey) -> Self {
        self.entity_key = Some(key);
        self
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn entity_key(&self) -> Option<TypeKey> {
        self.entity_key
    }

    pub fn is_fatal(&self) -> bool {
        self.level == Level::Fatal
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn property(&self) -> Option<&str> {
        self.property.as_deref()
    }

    /// Name of the rule that produced the violation
    pub fn rule(&self) -> &'static str {
        self.rule
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} {}", self.level, self.rule, self.entity)?;
        if let Some(property) = &self.property {
            write!(f, ".{}", property)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Violations reported for one entity model, in rule order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityReport {
    key: Option<TypeKey>,
    entity: String,
    violations: Vec<ConstraintViolation>,
}

impl EntityReport {
    pub fn key(&self) -> Option<TypeKey> {
        self.key
    }

    /// Simple name, for display
    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn violations(&self) -> &[ConstraintViolation] {
        &self.violations
    }
}

/// Batch validation report.
///
/// Maps each validated entity model to its ordered violations. The batch
/// passes if and only if no FATAL violation is present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    entities: Vec<EntityReport>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entity, even if it ends up with no violations
    pub fn add_entity(&mut self, key: TypeKey, entity: &str) {
        self.slot(Some(key), entity);
    }

    pub fn push(&mut self, violation: ConstraintViolation) {
        let index = self.slot(violation.entity_key, &violation.entity);
        self.entities[index].violations.push(violation);
    }

    /// Index of the report for `key`, or for `entity` when the key is
    /// unknown; created on first use.
    fn slot(&mut self, key: Option<TypeKey>, entity: &str) -> usize {
        let found = self.entities.iter().position(|e| match (e.key, key) {
            (Some(a), Some(b)) => a == b,
            _ => e.entity == entity,
        });
        match found {
            Some(index) => index,
            None => {
                self.entities.push(EntityReport {
                    key,
                    entity: entity.to_string(),
                    violations: Vec::new(),
                });
                self.entities.len() - 1
            }
        }
    }

    pub fn extend(&mut self, violations: impl IntoIterator<Item = ConstraintViolation>) {
        for violation in violations {
            self.push(violation);
        }
    }

    /// Per-entity reports in validation order
    pub fn entities(&self) -> &[EntityReport] {
        &self.entities
    }

    /// Violations of one entity; empty if it had none or was not validated
    pub fn for_entity(&self, entity: &str) -> &[ConstraintViolation] {
        self.entities
            .iter()
            .find(|e| e.entity == entity)
            .map(|e| e.violations.as_slice())
            .unwrap_or(&[])
    }

    /// Violations of the type `key`
    pub fn for_type(&self, key: &TypeKey) -> &[ConstraintViolation] {
        self.entities
            .iter()
            .find(|e| e.key.as_ref() == Some(key))
            .map(|e| e.violations.as_slice())
            .unwrap_or(&[])
    }

    /// All violations, entity by entity
    pub fn violations(&self) -> impl Iterator<Item = &ConstraintViolation> {
        self.entities.iter().flat_map(|e| e.violations.iter())
    }

    pub fn fatals(&self) -> Vec<&ConstraintViolation> {
        self.violations().filter(|v| v.is_fatal()).collect()
    }

    pub fn warnings(&self) -> Vec<&ConstraintViolation> {
        self.violations().filter(|v| !v.is_fatal()).collect()
    }

    pub fn has_fatal(&self) -> bool {
        self.violations().any(|v| v.is_fatal())
    }

    pub fn is_valid(&self) -> bool {
        !self.has_fatal()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fatals = self.fatals().len();
        let warnings = self.warnings().len();
        write!(f, "{} fatal, {} warning(s)", fatals, warnings)?;
        for violation in self.violations() {
            write!(f, "\n  {}", violation)?;
        }
        Ok(())
    }
}
