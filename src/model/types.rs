//! Mapped type identity

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::descriptor::TypeDescriptor;

/// A type the mapper can build an entity model for.
///
/// `descriptor()` is the explicit declaration of the type's storage shape:
/// its properties, accessors and mapping facts.
pub trait Mapped: Any + Clone + Default + PartialEq + fmt::Debug + Send + Sync {
    fn descriptor() -> TypeDescriptor;
}

/// Object-safe view of a mapped instance.
///
/// Implemented for every `Mapped` type; polymorphic properties hold
/// `Arc<dyn Entity>`.
pub trait Entity: fmt::Debug + Send + Sync + 'static {
    fn entity_type(&self) -> EntityType;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    fn eq_entity(&self, other: &dyn Entity) -> bool;
}

impl<T: Mapped> Entity for T {
    fn entity_type(&self) -> EntityType {
        EntityType::of::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn eq_entity(&self, other: &dyn Entity) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .map_or(false, |other| self == other)
    }
}

impl dyn Entity {
    /// Returns the concrete instance if it is a `T`
    pub fn downcast_ref<T: Mapped>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Returns true if the concrete instance is a `T`
    pub fn is<T: Mapped>(&self) -> bool {
        self.as_any().is::<T>()
    }

    /// Identity of the entity's allocation, used by the cycle guard
    pub(crate) fn address(&self) -> usize {
        (self as *const dyn Entity).cast::<()>() as usize
    }
}

impl PartialEq for dyn Entity {
    fn eq(&self, other: &Self) -> bool {
        self.eq_entity(other)
    }
}

/// Runtime type identity: equality and hashing use the `TypeId` only.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type path
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A mapped type together with the function producing its descriptor.
///
/// Lets the registry discover property and reference targets lazily.
#[derive(Clone, Copy)]
pub struct EntityType {
    key: TypeKey,
    descriptor: fn() -> TypeDescriptor,
}

impl EntityType {
    pub fn of<T: Mapped>() -> Self {
        Self {
            key: TypeKey::of::<T>(),
            descriptor: T::descriptor,
        }
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn name(&self) -> &'static str {
        self.key.name()
    }

    pub fn descriptor(&self) -> TypeDescriptor {
        (self.descriptor)()
    }
}

impl PartialEq for EntityType {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for EntityType {}

impl Hash for EntityType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityType({})", self.key.name())
    }
}
