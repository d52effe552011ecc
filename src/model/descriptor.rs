//! Type descriptors
//!
//! A `TypeDescriptor` is the declared storage shape of one mapped type: its
//! hierarchy levels (root-most first), each level's properties with their
//! accessors, and the mapping facts attached to every property. Descriptors
//! are plain data; the registry turns them into immutable entity models.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::types::{Entity, EntityType, Mapped, TypeKey};
use super::value::{PropertyType, Value, ValueType};
use crate::errors::{MappingError, MappingResult};
use crate::options::LoadingPolicy;

/// Options carried by a reference declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceOptions {
    /// Store only the target id instead of `{"$ref", "$id"}`
    pub id_only: bool,
    /// Overrides the mapper's loading policy for this property
    pub loading: Option<LoadingPolicy>,
}

impl Default for ReferenceOptions {
    fn default() -> Self {
        Self {
            id_only: true,
            loading: None,
        }
    }
}

impl ReferenceOptions {
    pub fn lazy() -> Self {
        Self {
            loading: Some(LoadingPolicy::Lazy),
            ..Self::default()
        }
    }

    pub fn eager() -> Self {
        Self {
            loading: Some(LoadingPolicy::Eager),
            ..Self::default()
        }
    }

    pub fn with_id_only(mut self, id_only: bool) -> Self {
        self.id_only = id_only;
        self
    }
}

/// A declared mapping fact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    Id,
    Reference(ReferenceOptions),
    Embedded,
    /// Explicit storage name
    Property(String),
    Transient,
    /// Loaded but never written
    NotSaved,
    /// Additional storage names accepted on decode
    AlsoLoad(Vec<String>),
}

impl Annotation {
    pub fn name(&self) -> &'static str {
        match self {
            Annotation::Id => "Id",
            Annotation::Reference(_) => "Reference",
            Annotation::Embedded => "Embedded",
            Annotation::Property(_) => "Property",
            Annotation::Transient => "Transient",
            Annotation::NotSaved => "NotSaved",
            Annotation::AlsoLoad(_) => "AlsoLoad",
        }
    }
}

/// Where a property was declared from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyOrigin {
    Field,
    Accessor,
}

/// Root entities live in a collection; embeddables only inside documents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingMode {
    Root,
    Embeddable,
}

type Getter = Arc<dyn Fn(&dyn Any) -> MappingResult<Value> + Send + Sync>;
type Setter = Arc<dyn Fn(&mut dyn Any, Value) -> MappingResult<()> + Send + Sync>;

/// Type-erased read/write accessor pair
#[derive(Clone)]
pub struct PropertyAccessor {
    get: Getter,
    set: Setter,
}

impl PropertyAccessor {
    fn new<T, V, G, S>(get: G, set: S) -> Self
    where
        T: Mapped,
        V: PropertyType,
        G: Fn(&T) -> V + Send + Sync + 'static,
        S: Fn(&mut T, V) + Send + Sync + 'static,
    {
        Self {
            get: Arc::new(move |instance: &dyn Any| -> MappingResult<Value> {
                Ok(get(downcast::<T>(instance)?).to_value())
            }),
            set: Arc::new(move |instance: &mut dyn Any, value: Value| -> MappingResult<()> {
                let typed = V::from_value(value)?;
                set(downcast_mut::<T>(instance)?, typed);
                Ok(())
            }),
        }
    }

    pub fn get(&self, instance: &dyn Any) -> MappingResult<Value> {
        (self.get)(instance)
    }

    pub fn set(&self, instance: &mut dyn Any, value: Value) -> MappingResult<()> {
        (self.set)(instance, value)
    }

    /// Rewrites a parent-level accessor so it applies to the subtype `T`
    fn project<T: Mapped, P: Mapped>(
        &self,
        project: fn(&T) -> &P,
        project_mut: fn(&mut T) -> &mut P,
    ) -> Self {
        let get = self.get.clone();
        let set = self.set.clone();
        Self {
            get: Arc::new(move |instance: &dyn Any| -> MappingResult<Value> {
                let parent: &dyn Any = project(downcast::<T>(instance)?);
                get(parent)
            }),
            set: Arc::new(move |instance: &mut dyn Any, value: Value| -> MappingResult<()> {
                let parent: &mut dyn Any = project_mut(downcast_mut::<T>(instance)?);
                set(parent, value)
            }),
        }
    }
}

impl fmt::Debug for PropertyAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PropertyAccessor")
    }
}

type ProjectFn = dyn for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Any> + Send + Sync;

/// View of a subtype instance as one of its ancestors.
///
/// Built from the projection passed to `TypeBuilder::extends`; chains
/// compose through `then`.
#[derive(Clone)]
pub struct Projection(Arc<ProjectFn>);

impl Projection {
    fn from_fn<F>(project: F) -> Self
    where
        F: for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Any> + Send + Sync + 'static,
    {
        Self(Arc::new(project))
    }

    fn of<T: Mapped, P: Mapped>(project: fn(&T) -> &P) -> Self {
        Self::from_fn(move |instance| {
            instance
                .downcast_ref::<T>()
                .map(|typed| project(typed) as &dyn Any)
        })
    }

    /// Applies `self`, then `next` to the result
    pub(crate) fn then(&self, next: &Projection) -> Self {
        let first = self.0.clone();
        let second = next.0.clone();
        Self::from_fn(move |instance| first(instance).and_then(|parent| second(parent)))
    }

    /// `None` if `instance` is not of the projection's source type
    pub fn apply<'a>(&self, instance: &'a dyn Any) -> Option<&'a dyn Any> {
        (self.0)(instance)
    }
}

impl fmt::Debug for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Projection")
    }
}

fn downcast<T: 'static>(instance: &dyn Any) -> MappingResult<&T> {
    instance.downcast_ref::<T>().ok_or_else(|| {
        MappingError::Internal(format!(
            "accessor of {} applied to another type",
            std::any::type_name::<T>()
        ))
    })
}

fn downcast_mut<T: 'static>(instance: &mut dyn Any) -> MappingResult<&mut T> {
    instance.downcast_mut::<T>().ok_or_else(|| {
        MappingError::Internal(format!(
            "accessor of {} applied to another type",
            std::any::type_name::<T>()
        ))
    })
}

/// One declared property
#[derive(Clone)]
pub struct PropertyDescriptor {
    pub(crate) name: String,
    pub(crate) origin: PropertyOrigin,
    pub(crate) value_type: ValueType,
    pub(crate) annotations: Vec<Annotation>,
    pub(crate) store_nulls: Option<bool>,
    pub(crate) store_empties: Option<bool>,
    pub(crate) polymorphic: Option<EntityType>,
    pub(crate) declared_by: TypeKey,
    pub(crate) accessor: PropertyAccessor,
}

impl PropertyDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> PropertyOrigin {
        self.origin
    }

    pub fn value_type(&self) -> &ValueType {
        &self.value_type
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Type whose level declared this property
    pub fn declared_by(&self) -> TypeKey {
        self.declared_by
    }

    pub fn accessor(&self) -> &PropertyAccessor {
        &self.accessor
    }

    pub fn is_id(&self) -> bool {
        self.annotations.contains(&Annotation::Id)
    }
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("value_type", &self.value_type)
            .field("annotations", &self.annotations)
            .field("declared_by", &self.declared_by)
            .finish()
    }
}

/// Properties declared by one level of a type hierarchy
#[derive(Debug, Clone)]
pub struct LevelDescriptor {
    pub(crate) type_key: TypeKey,
    pub(crate) properties: Vec<PropertyDescriptor>,
}

impl LevelDescriptor {
    pub fn type_key(&self) -> TypeKey {
        self.type_key
    }

    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }
}

/// Folds hierarchy levels (root-most first) into one property list.
///
/// Order is first-seen order across the walk. A property redeclared by a more
/// derived level replaces the inherited one in place. Two declarations of the
/// same name within one level are both kept so validation can report them.
pub fn merge_levels(levels: &[LevelDescriptor]) -> Vec<PropertyDescriptor> {
    let mut merged: Vec<(usize, PropertyDescriptor)> = Vec::new();
    for (depth, level) in levels.iter().enumerate() {
        for property in &level.properties {
            let inherited = merged
                .iter_mut()
                .find(|(seen_at, seen)| *seen_at < depth && seen.name == property.name);
            match inherited {
                Some(slot) => *slot = (depth, property.clone()),
                None => merged.push((depth, property.clone())),
            }
        }
    }
    merged.into_iter().map(|(_, property)| property).collect()
}

/// Moves the named properties to the front, in the given order.
pub(crate) fn apply_order(
    properties: Vec<PropertyDescriptor>,
    order: &[String],
) -> Vec<PropertyDescriptor> {
    let mut rest = properties;
    let mut ordered = Vec::with_capacity(rest.len());
    for name in order {
        if let Some(pos) = rest.iter().position(|p| &p.name == name) {
            ordered.push(rest.remove(pos));
        }
    }
    ordered.extend(rest);
    ordered
}

fn new_instance<T: Mapped>() -> Box<dyn Entity> {
    Box::new(T::default())
}

/// Declared storage shape of a mapped type
#[derive(Clone)]
pub struct TypeDescriptor {
    pub(crate) key: TypeKey,
    pub(crate) name: String,
    pub(crate) mode: EmbeddingMode,
    pub(crate) collection: Option<String>,
    pub(crate) discriminator: Option<String>,
    pub(crate) discriminator_key: Option<String>,
    pub(crate) order: Option<Vec<String>>,
    pub(crate) parent: Option<EntityType>,
    /// Reaches the parent part of an instance
    pub(crate) upcast: Option<Projection>,
    pub(crate) levels: Vec<LevelDescriptor>,
    /// Facts declared before any property existed to carry them
    pub(crate) stray: Vec<String>,
    pub(crate) factory: fn() -> Box<dyn Entity>,
}

impl TypeDescriptor {
    /// Start describing a root entity stored in its own collection
    pub fn entity<T: Mapped>(name: &str) -> TypeBuilder<T> {
        TypeBuilder::new(name, EmbeddingMode::Root)
    }

    /// Start describing a type that only lives inside other documents
    pub fn embeddable<T: Mapped>(name: &str) -> TypeBuilder<T> {
        TypeBuilder::new(name, EmbeddingMode::Embeddable)
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> EmbeddingMode {
        self.mode
    }

    pub fn parent(&self) -> Option<EntityType> {
        self.parent
    }

    pub fn levels(&self) -> &[LevelDescriptor] {
        &self.levels
    }

    /// Merged property list, ordering override applied
    pub fn properties(&self) -> Vec<PropertyDescriptor> {
        let merged = merge_levels(&self.levels);
        match &self.order {
            Some(order) => apply_order(merged, order),
            None => merged,
        }
    }

    /// The first property declared as id
    pub fn id_property(&self) -> Option<PropertyDescriptor> {
        self.properties().into_iter().find(|p| p.is_id())
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("parent", &self.parent)
            .field("levels", &self.levels)
            .finish()
    }
}

/// Builder for `TypeDescriptor`.
///
/// Property annotations (`id`, `reference`, `named`, ...) apply to the most
/// recently declared property.
pub struct TypeBuilder<T> {
    descriptor: TypeDescriptor,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Mapped> TypeBuilder<T> {
    fn new(name: &str, mode: EmbeddingMode) -> Self {
        let key = TypeKey::of::<T>();
        Self {
            descriptor: TypeDescriptor {
                key,
                name: name.to_string(),
                mode,
                collection: None,
                discriminator: None,
                discriminator_key: None,
                order: None,
                parent: None,
                upcast: None,
                levels: vec![LevelDescriptor {
                    type_key: key,
                    properties: Vec::new(),
                }],
                stray: Vec::new(),
                factory: new_instance::<T>,
            },
            _marker: PhantomData,
        }
    }

    /// Explicit collection name
    pub fn collection(mut self, name: &str) -> Self {
        self.descriptor.collection = Some(name.to_string());
        self
    }

    /// Explicit discriminator value
    pub fn discriminator(mut self, value: &str) -> Self {
        self.descriptor.discriminator = Some(value.to_string());
        self
    }

    /// Discriminator field for this type's hierarchy
    pub fn discriminator_key(mut self, key: &str) -> Self {
        self.descriptor.discriminator_key = Some(key.to_string());
        self
    }

    /// Explicit property order; unlisted properties follow in merged order
    pub fn order(mut self, names: &[&str]) -> Self {
        self.descriptor.order = Some(names.iter().map(|n| n.to_string()).collect());
        self
    }

    /// Inherit the levels of `P`, reached through the given projections.
    ///
    /// A type has at most one parent; call this once.
    pub fn extends<P: Mapped>(
        mut self,
        project: fn(&T) -> &P,
        project_mut: fn(&mut T) -> &mut P,
    ) -> Self {
        let parent = P::descriptor();
        let own = self.descriptor.levels.pop();
        for level in parent.levels {
            self.descriptor.levels.push(LevelDescriptor {
                type_key: level.type_key,
                properties: level
                    .properties
                    .into_iter()
                    .map(|property| PropertyDescriptor {
                        accessor: property.accessor.project(project, project_mut),
                        ..property
                    })
                    .collect(),
            });
        }
        self.descriptor.levels.extend(own);
        self.descriptor.parent = Some(EntityType::of::<P>());
        self.descriptor.upcast = Some(Projection::of::<T, P>(project));
        self
    }

    /// Declare a property backed by a field
    pub fn field<V, G, S>(self, name: &str, get: G, set: S) -> Self
    where
        V: PropertyType,
        G: Fn(&T) -> V + Send + Sync + 'static,
        S: Fn(&mut T, V) + Send + Sync + 'static,
    {
        let accessor = PropertyAccessor::new::<T, V, G, S>(get, set);
        self.property(name, PropertyOrigin::Field, accessor, V::value_type())
    }

    /// Declare a property backed by an accessor pair
    pub fn accessor<V, G, S>(self, name: &str, get: G, set: S) -> Self
    where
        V: PropertyType,
        G: Fn(&T) -> V + Send + Sync + 'static,
        S: Fn(&mut T, V) + Send + Sync + 'static,
    {
        let accessor = PropertyAccessor::new::<T, V, G, S>(get, set);
        self.property(name, PropertyOrigin::Accessor, accessor, V::value_type())
    }

    fn property(
        mut self,
        name: &str,
        origin: PropertyOrigin,
        accessor: PropertyAccessor,
        value_type: ValueType,
    ) -> Self {
        let declared_by = self.descriptor.key;
        if let Some(level) = self.descriptor.levels.last_mut() {
            level.properties.push(PropertyDescriptor {
                name: name.to_string(),
                origin,
                value_type,
                annotations: Vec::new(),
                store_nulls: None,
                store_empties: None,
                polymorphic: None,
                declared_by,
                accessor,
            });
        }
        self
    }

    /// Most recent property of this type's own level
    fn last_property(&mut self, fact: &str) -> Option<&mut PropertyDescriptor> {
        let own_key = self.descriptor.key;
        let declared = self
            .descriptor
            .levels
            .last()
            .map_or(false, |level| level.type_key == own_key && !level.properties.is_empty());
        if !declared {
            self.descriptor.stray.push(fact.to_string());
            return None;
        }
        self.descriptor
            .levels
            .last_mut()
            .and_then(|level| level.properties.last_mut())
    }

    fn annotate(mut self, annotation: Annotation) -> Self {
        let fact = annotation.name();
        if let Some(property) = self.last_property(fact) {
            property.annotations.push(annotation);
        }
        self
    }

    pub fn id(self) -> Self {
        self.annotate(Annotation::Id)
    }

    pub fn reference(self) -> Self {
        self.annotate(Annotation::Reference(ReferenceOptions::default()))
    }

    pub fn reference_with(self, options: ReferenceOptions) -> Self {
        self.annotate(Annotation::Reference(options))
    }

    pub fn embedded(self) -> Self {
        self.annotate(Annotation::Embedded)
    }

    /// Explicit storage name; bypasses the naming strategy
    pub fn named(self, storage_name: &str) -> Self {
        self.annotate(Annotation::Property(storage_name.to_string()))
    }

    pub fn transient(self) -> Self {
        self.annotate(Annotation::Transient)
    }

    pub fn not_saved(self) -> Self {
        self.annotate(Annotation::NotSaved)
    }

    pub fn also_load(self, names: &[&str]) -> Self {
        self.annotate(Annotation::AlsoLoad(
            names.iter().map(|n| n.to_string()).collect(),
        ))
    }

    /// Override the mapper's null storage policy for this property
    pub fn store_nulls(mut self, store: bool) -> Self {
        if let Some(property) = self.last_property("StoreNulls") {
            property.store_nulls = Some(store);
        }
        self
    }

    /// Override the mapper's empty-collection storage policy for this property
    pub fn store_empties(mut self, store: bool) -> Self {
        if let Some(property) = self.last_property("StoreEmpties") {
            property.store_empties = Some(store);
        }
        self
    }

    /// Declare the hierarchy a polymorphic `Arc<dyn Entity>` property holds
    pub fn polymorphic<R: Mapped>(mut self) -> Self {
        if let Some(property) = self.last_property("Polymorphic") {
            property.polymorphic = Some(EntityType::of::<R>());
        }
        self
    }

    pub fn build(self) -> TypeDescriptor {
        self.descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Base {
        id: i64,
        label: String,
    }

    impl Mapped for Base {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::entity::<Base>("Base")
                .field("id", |b| b.id, |b, v| b.id = v)
                .id()
                .field("label", |b| b.label.clone(), |b, v| b.label = v)
                .build()
        }
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Derived {
        base: Base,
        label: String,
        extra: bool,
    }

    impl Mapped for Derived {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::entity::<Derived>("Derived")
                .extends::<Base>(|d| &d.base, |d| &mut d.base)
                .field("extra", |d| d.extra, |d, v| d.extra = v)
                .field("label", |d| d.label.clone(), |d, v| d.label = v)
                .named("title")
                .build()
        }
    }

    #[test]
    fn test_levels_are_root_most_first() {
        let descriptor = Derived::descriptor();
        let keys: Vec<TypeKey> = descriptor.levels().iter().map(|l| l.type_key()).collect();
        assert_eq!(keys, vec![TypeKey::of::<Base>(), TypeKey::of::<Derived>()]);
        assert_eq!(descriptor.parent(), Some(EntityType::of::<Base>()));
    }

    #[test]
    fn test_most_derived_wins_in_place() {
        let properties = Derived::descriptor().properties();
        let names: Vec<&str> = properties.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["id", "label", "extra"]);
        assert_eq!(properties[1].declared_by(), TypeKey::of::<Derived>());
        assert_eq!(
            properties[1].annotations(),
            &[Annotation::Property("title".into())]
        );
    }

    #[test]
    fn test_projected_accessors_reach_parent_fields() {
        let descriptor = Derived::descriptor();
        let id = descriptor.id_property().unwrap();
        let mut instance = Derived::default();
        id.accessor().set(&mut instance, Value::Int64(9)).unwrap();
        assert_eq!(instance.base.id, 9);
        assert_eq!(id.accessor().get(&instance).unwrap(), Value::Int64(9));
    }

    #[test]
    fn test_upcast_reaches_parent_part() {
        let upcast = Derived::descriptor().upcast.unwrap();
        let instance = Derived {
            base: Base {
                id: 4,
                label: "base".into(),
            },
            ..Derived::default()
        };
        let parent = upcast.apply(&instance).and_then(|p| p.downcast_ref::<Base>());
        assert_eq!(parent.map(|b| b.id), Some(4));
        assert!(upcast.apply(&Base::default()).is_none());
    }

    #[test]
    fn test_order_override() {
        let properties = apply_order(Derived::descriptor().properties(), &["extra".to_string()]);
        let names: Vec<&str> = properties.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["extra", "id", "label"]);
    }

    #[test]
    fn test_annotation_without_property_is_recorded() {
        let descriptor = TypeDescriptor::entity::<Base>("Base").id().build();
        assert_eq!(descriptor.stray, vec!["Id".to_string()]);
    }

    #[test]
    fn test_accessor_rejects_foreign_instance() {
        let id = Base::descriptor().id_property().unwrap();
        let other = Derived::default();
        assert!(matches!(
            id.accessor().get(&other),
            Err(MappingError::Internal(_))
        ));
    }
}
