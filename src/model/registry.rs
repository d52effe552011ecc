//! Model registry
//!
//! Builds, validates and caches entity models keyed by type identity, and
//! owns the discriminator table of every mapped hierarchy.
//!
//! # Build protocol
//!
//! 1. Fast path: a published model is returned from the read-locked cache.
//! 2. Otherwise the build lock is taken and the cache re-checked, so at most
//!    one build runs per type.
//! 3. The requested types and their transitive closure (parents, embedded
//!    targets, reference targets, polymorphic hierarchies) are built into a
//!    staging set.
//! 4. The staging set is validated as one batch. Any FATAL violation rejects
//!    the batch and nothing is published.
//! 5. Models and discriminator entries are published together.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use super::entity::EntityModel;
use super::types::{EntityType, Mapped, TypeKey};
use super::value::ValueType;
use crate::errors::{poisoned, MappingError, MappingResult};
use crate::observability::{log_event_with_fields, Event};
use crate::options::MapperOptions;
use crate::validation::{ValidationReport, Validator};

/// Read-only view over published and staged models, handed to rules.
pub struct RegistryView<'a> {
    published: &'a HashMap<TypeKey, Arc<EntityModel>>,
    staged: &'a [Arc<EntityModel>],
}

impl<'a> RegistryView<'a> {
    pub fn model(&self, key: &TypeKey) -> Option<&'a EntityModel> {
        self.staged
            .iter()
            .find(|m| m.key() == *key)
            .or_else(|| self.published.get(key))
            .map(|m| m.as_ref())
    }

    /// Published models first, then the staged batch
    pub fn models(&self) -> Vec<&'a EntityModel> {
        self.published
            .values()
            .chain(self.staged.iter())
            .map(|m| m.as_ref())
            .collect()
    }
}

/// Builds one batch; discarded if validation fails
struct Staging {
    models: Vec<Arc<EntityModel>>,
    in_progress: HashSet<TypeKey>,
}

impl Staging {
    fn get(&self, key: &TypeKey) -> Option<Arc<EntityModel>> {
        self.models.iter().find(|m| m.key() == *key).cloned()
    }
}

/// Entity model registry
pub struct ModelRegistry {
    options: MapperOptions,
    validator: Validator,
    models: RwLock<HashMap<TypeKey, Arc<EntityModel>>>,
    /// (hierarchy root, discriminator value) -> concrete type
    discriminators: RwLock<HashMap<(TypeKey, String), TypeKey>>,
    build: Mutex<()>,
}

impl ModelRegistry {
    pub fn new(options: MapperOptions) -> Self {
        Self::with_validator(options, Validator::default())
    }

    pub fn with_validator(options: MapperOptions, validator: Validator) -> Self {
        Self {
            options,
            validator,
            models: RwLock::new(HashMap::new()),
            discriminators: RwLock::new(HashMap::new()),
            build: Mutex::new(()),
        }
    }

    pub fn options(&self) -> &MapperOptions {
        &self.options
    }

    /// Returns the model of `T`, building it on first access
    pub fn entity_model<T: Mapped>(&self) -> MappingResult<Arc<EntityModel>> {
        self.model(&EntityType::of::<T>())
    }

    /// Returns the model of a type, building it on first access
    pub fn model(&self, entity_type: &EntityType) -> MappingResult<Arc<EntityModel>> {
        if let Some(model) = self.published(&entity_type.key())? {
            return Ok(model);
        }
        self.map(std::slice::from_ref(entity_type))?;
        self.get(&entity_type.key())
    }

    /// Returns an already-built model
    pub fn get(&self, key: &TypeKey) -> MappingResult<Arc<EntityModel>> {
        self.published(key)?
            .ok_or_else(|| MappingError::UnmappedType(key.name().to_string()))
    }

    pub fn is_mapped(&self, key: &TypeKey) -> bool {
        matches!(self.published(key), Ok(Some(_)))
    }

    /// All published models, sorted by name
    pub fn models(&self) -> MappingResult<Vec<Arc<EntityModel>>> {
        let models = self.models.read().map_err(|_| poisoned())?;
        let mut all: Vec<Arc<EntityModel>> = models.values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()).then(a.key().name().cmp(b.key().name())));
        Ok(all)
    }

    fn published(&self, key: &TypeKey) -> MappingResult<Option<Arc<EntityModel>>> {
        let models = self.models.read().map_err(|_| poisoned())?;
        Ok(models.get(key).cloned())
    }

    /// Builds and validates a batch of types together with everything they
    /// reach.
    ///
    /// Returns the report (warnings only) on success. If any FATAL violation
    /// is found the whole batch is rejected with `MappingError::Validation`
    /// carrying every violation of the batch.
    pub fn map(&self, types: &[EntityType]) -> MappingResult<ValidationReport> {
        let _build = self.build.lock().map_err(|_| poisoned())?;

        let mut staging = Staging {
            models: Vec::new(),
            in_progress: HashSet::new(),
        };
        for entity_type in types {
            self.stage(entity_type, &mut staging)?;
        }
        if staging.models.is_empty() {
            return Ok(ValidationReport::new());
        }

        let report = {
            let published = self.models.read().map_err(|_| poisoned())?;
            let view = RegistryView {
                published: &published,
                staged: &staging.models,
            };
            self.validator.validate(&view, &staging.models)
        };

        let names = staging
            .models
            .iter()
            .map(|m| m.name())
            .collect::<Vec<_>>()
            .join(",");
        if report.has_fatal() {
            let fatals = report.fatals().len().to_string();
            log_event_with_fields(
                Event::BatchRejected,
                &[("entities", names.as_str()), ("fatal", fatals.as_str())],
            );
            return Err(MappingError::Validation(report));
        }

        self.publish(&staging.models)?;

        for warning in report.warnings() {
            let rendered = warning.to_string();
            log_event_with_fields(Event::ConstraintWarning, &[("violation", rendered.as_str())]);
        }
        let count = staging.models.len().to_string();
        log_event_with_fields(
            Event::BatchMapped,
            &[("entities", names.as_str()), ("count", count.as_str())],
        );
        Ok(report)
    }

    fn publish(&self, batch: &[Arc<EntityModel>]) -> MappingResult<()> {
        let mut models = self.models.write().map_err(|_| poisoned())?;
        let mut discriminators = self.discriminators.write().map_err(|_| poisoned())?;
        for model in batch {
            models.insert(model.key(), model.clone());
            discriminators.insert(
                (model.hierarchy_root(), model.discriminator().to_string()),
                model.key(),
            );
            log_event_with_fields(
                Event::ModelBuilt,
                &[
                    ("entity", model.name()),
                    ("discriminator", model.discriminator()),
                    ("collection", model.collection().unwrap_or("-")),
                ],
            );
        }
        Ok(())
    }

    /// Builds `entity_type` into the staging set, parents first, then stages
    /// every type its properties reach.
    fn stage(
        &self,
        entity_type: &EntityType,
        staging: &mut Staging,
    ) -> MappingResult<Arc<EntityModel>> {
        let key = entity_type.key();
        if let Some(model) = staging.get(&key) {
            return Ok(model);
        }
        if let Some(model) = self.published(&key)? {
            return Ok(model);
        }
        if !staging.in_progress.insert(key) {
            return Err(MappingError::Internal(format!(
                "cyclic inheritance through {}",
                key.name()
            )));
        }

        let descriptor = entity_type.descriptor();
        if descriptor.key() != key {
            return Err(MappingError::UnmappedType(format!(
                "{} (its descriptor describes {})",
                key.name(),
                descriptor.key().name()
            )));
        }

        let parent = match descriptor.parent() {
            Some(parent) => Some(self.stage(&parent, staging)?),
            None => None,
        };
        let model = Arc::new(EntityModel::build(
            *entity_type,
            descriptor,
            parent.as_deref(),
            &self.options,
        ));
        staging.models.push(model.clone());

        for target in dependencies(&model) {
            if !staging.in_progress.contains(&target.key()) {
                self.stage(&target, staging)?;
            }
        }
        staging.in_progress.remove(&key);
        Ok(model)
    }

    /// Resolves a discriminator value within the hierarchy of `declared`.
    ///
    /// Returns `None` if no mapped type of that hierarchy claims the value.
    pub fn resolve_discriminator(
        &self,
        declared: &EntityModel,
        value: &str,
    ) -> MappingResult<Option<Arc<EntityModel>>> {
        let key = {
            let discriminators = self.discriminators.read().map_err(|_| poisoned())?;
            discriminators
                .get(&(declared.hierarchy_root(), value.to_string()))
                .copied()
        };
        match key {
            Some(key) => self.published(&key),
            None => Ok(None),
        }
    }
}

/// Types reached from a model's properties
fn dependencies(model: &EntityModel) -> Vec<EntityType> {
    let mut targets = Vec::new();
    for property in model.properties() {
        match property.value_type().element() {
            ValueType::Entity(target) | ValueType::Reference(target) => targets.push(*target),
            _ => {}
        }
        if let Some(root) = property.polymorphic() {
            targets.push(root);
        }
    }
    targets
}
