//! Entity and property models
//!
//! Rust has no runtime reflection, so a mapped type declares its storage
//! shape explicitly through `Mapped::descriptor()`. The registry turns each
//! descriptor into an immutable `EntityModel`, built once and shared through
//! `Arc` for the lifetime of the registry.
//!
//! # Example
//!
//! ```
//! use aeromap::model::{Mapped, TypeDescriptor};
//!
//! #[derive(Debug, Clone, Default, PartialEq)]
//! struct Author {
//!     id: i64,
//!     name: String,
//! }
//!
//! impl Mapped for Author {
//!     fn descriptor() -> TypeDescriptor {
//!         TypeDescriptor::entity::<Author>("Author")
//!             .field("id", |a| a.id, |a, v| a.id = v)
//!             .id()
//!             .field("name", |a| a.name.clone(), |a, v| a.name = v)
//!             .build()
//!     }
//! }
//! ```

mod descriptor;
mod entity;
mod property;
mod registry;
mod types;
mod value;

pub use descriptor::{
    merge_levels, Annotation, EmbeddingMode, LevelDescriptor, PropertyAccessor,
    PropertyDescriptor, PropertyOrigin, Projection, ReferenceOptions, TypeBuilder, TypeDescriptor,
};
pub use entity::EntityModel;
pub use property::{PropertyKind, PropertyModel, ID_FIELD};
pub use registry::{ModelRegistry, RegistryView};
pub use types::{Entity, EntityType, Mapped, TypeKey};
pub use value::{PropertyType, ReferenceValue, Value, ValueType};

pub(crate) use value::downcast_arc;
