//! Model Registry Invariant Tests
//!
//! - Model construction is idempotent and cached by type identity
//! - Concurrent first access builds one model
//! - Inherited properties fold root-most first, most-derived wins
//! - Options are applied once, at build time
//! - Discriminators resolve within their hierarchy

mod fixtures;

use std::sync::Arc;
use std::thread;

use aeromap::model::{
    merge_levels, EmbeddingMode, EntityType, LevelDescriptor, Mapped, ModelRegistry, PropertyKind,
    TypeDescriptor, TypeKey,
};
use aeromap::options::{DiscriminatorFunction, NamingStrategy, PropertyDiscovery};
use aeromap::{MapperOptions, MappingError};
use fixtures::{Address, Author, Book, Circle, Drawing, Shape, Square};

fn registry() -> ModelRegistry {
    ModelRegistry::new(MapperOptions::default())
}

fn names(model: &aeromap::model::EntityModel) -> Vec<&str> {
    model.properties().iter().map(|p| p.name()).collect()
}

// =============================================================================
// Idempotence
// =============================================================================

/// Repeated lookups return the identical cached model.
#[test]
fn test_entity_model_is_cached() {
    let registry = registry();
    let first = registry.entity_model::<Author>().unwrap();
    let second = registry.entity_model::<Author>().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(names(&first), names(&second));
}

/// Property order is stable across independent registries.
#[test]
fn test_property_order_is_stable() {
    for _ in 0..10 {
        let model = registry().entity_model::<Author>().unwrap();
        assert_eq!(names(&model), vec!["id", "name", "email", "tags", "address"]);
    }
}

/// Concurrent first access publishes one model.
#[test]
fn test_concurrent_first_access_builds_once() {
    let registry = Arc::new(registry());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            thread::spawn(move || registry.entity_model::<Book>().unwrap())
        })
        .collect();
    let models: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for model in &models[1..] {
        assert!(Arc::ptr_eq(&models[0], model));
    }
}

/// Mapping a type also maps everything it reaches.
#[test]
fn test_transitive_closure_is_mapped() {
    let registry = registry();
    registry.entity_model::<Book>().unwrap();

    assert!(registry.is_mapped(&TypeKey::of::<Author>()));
    assert!(registry.is_mapped(&TypeKey::of::<Address>()));
}

/// Asking for an unbuilt model without building it names the type.
#[test]
fn test_get_unmapped_type() {
    let err = registry().get(&TypeKey::of::<Author>()).unwrap_err();
    match err {
        MappingError::UnmappedType(name) => assert!(name.contains("Author")),
        other => panic!("unexpected error: {other}"),
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Properties are classified once into id / reference / embedded / plain.
#[test]
fn test_property_classification() {
    let registry = registry();
    let book = registry.entity_model::<Book>().unwrap();
    let author = registry.entity_model::<Author>().unwrap();

    assert_eq!(book.property("id").unwrap().kind(), &PropertyKind::Id);
    assert_eq!(book.property("id").unwrap().storage_name(), "_id");
    assert!(book.property("author").unwrap().is_reference());
    assert!(book.property("reviewers").unwrap().is_reference());
    assert!(author.property("address").unwrap().is_embedded());
    assert_eq!(author.property("name").unwrap().kind(), &PropertyKind::Plain);
    assert_eq!(book.property("legacy_isbn").unwrap().storage_name(), "isbn");
    assert!(book.property("summary").unwrap().is_transient());
}

/// Root entities get a collection; embeddables do not.
#[test]
fn test_collections_and_modes() {
    let registry = registry();
    let author = registry.entity_model::<Author>().unwrap();
    let address = registry.entity_model::<Address>().unwrap();
    let book = registry.entity_model::<Book>().unwrap();

    assert_eq!(author.collection(), Some("author"));
    assert_eq!(book.collection(), Some("books"));
    assert_eq!(address.mode(), EmbeddingMode::Embeddable);
    assert_eq!(address.collection(), None);
}

/// Naming strategies are applied to storage names, never to the id.
#[test]
fn test_naming_strategy_applied_at_build() {
    let options = MapperOptions::default()
        .with_property_naming(NamingStrategy::SnakeCase)
        .with_collection_naming(NamingStrategy::SnakeCase);
    let registry = ModelRegistry::new(options);
    let book = registry.entity_model::<Book>().unwrap();
    let author = registry.entity_model::<Author>().unwrap();

    assert_eq!(book.property("id").unwrap().storage_name(), "_id");
    assert_eq!(book.property("legacy_isbn").unwrap().storage_name(), "isbn");
    assert_eq!(author.property("name").unwrap().storage_name(), "name");
    assert_eq!(author.collection(), Some("author"));
}

/// Method discovery ignores field-declared properties.
#[test]
fn test_method_discovery() {
    #[derive(Debug, Clone, Default, PartialEq)]
    struct Counter {
        id: i64,
        hits: i64,
    }

    impl Mapped for Counter {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::entity::<Counter>("Counter")
                .accessor("id", |c| c.id, |c, v| c.id = v)
                .id()
                .accessor("hits", |c| c.hits, |c, v| c.hits = v)
                .field("ignored", |c| c.hits, |c, v| c.hits = v)
                .build()
        }
    }

    let options = MapperOptions::default().with_property_discovery(PropertyDiscovery::Methods);
    let model = ModelRegistry::new(options).entity_model::<Counter>().unwrap();
    assert_eq!(names(&model), vec!["id", "hits"]);
}

// =============================================================================
// Inheritance Fold
// =============================================================================

/// Inherited properties come first, in first-seen order.
#[test]
fn test_inherited_properties_fold_root_first() {
    let registry = registry();
    let circle = registry.entity_model::<Circle>().unwrap();

    assert_eq!(names(&circle), vec!["id", "color", "radius"]);
    assert_eq!(circle.parent(), Some(TypeKey::of::<Shape>()));
    assert_eq!(circle.hierarchy_root(), TypeKey::of::<Shape>());
    assert_eq!(circle.collection(), Some("shapes"));
    assert!(circle.is_assignable_to(&TypeKey::of::<Shape>()));
    assert!(!circle.is_assignable_to(&TypeKey::of::<Square>()));
}

/// The fold keeps the position of the first declaration and the facts of
/// the most-derived one.
#[test]
fn test_merge_levels_most_derived_wins() {
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
        extra: i32,
        label: String,
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

    let levels: Vec<LevelDescriptor> = Derived::descriptor().levels().to_vec();
    let merged = merge_levels(&levels);
    let merged_names: Vec<&str> = merged.iter().map(|p| p.name()).collect();
    assert_eq!(merged_names, vec!["id", "label", "extra"]);
    assert_eq!(merged[1].declared_by(), TypeKey::of::<Derived>());

    let model = registry().entity_model::<Derived>().unwrap();
    assert_eq!(model.property("label").unwrap().storage_name(), "title");
}

/// An explicit order overrides the folded order.
#[test]
fn test_order_override() {
    #[derive(Debug, Clone, Default, PartialEq)]
    struct Ordered {
        id: i64,
        a: i32,
        b: i32,
    }

    impl Mapped for Ordered {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::entity::<Ordered>("Ordered")
                .order(&["b", "a"])
                .field("id", |o| o.id, |o, v| o.id = v)
                .id()
                .field("a", |o| o.a, |o, v| o.a = v)
                .field("b", |o| o.b, |o, v| o.b = v)
                .build()
        }
    }

    let model = registry().entity_model::<Ordered>().unwrap();
    assert_eq!(names(&model), vec!["b", "a", "id"]);
}

// =============================================================================
// Discriminators
// =============================================================================

/// Subtypes register their discriminator under the hierarchy root.
#[test]
fn test_discriminator_resolution() {
    let registry = registry();
    registry
        .map(&[EntityType::of::<Circle>(), EntityType::of::<Square>()])
        .unwrap();
    let shape = registry.entity_model::<Shape>().unwrap();

    let resolved = registry.resolve_discriminator(&shape, "Circle").unwrap().unwrap();
    assert_eq!(resolved.key(), TypeKey::of::<Circle>());
    assert!(registry.resolve_discriminator(&shape, "Hexagon").unwrap().is_none());
}

/// Polymorphic property roots are part of the closure.
#[test]
fn test_polymorphic_root_is_mapped() {
    let registry = registry();
    registry.entity_model::<Drawing>().unwrap();
    assert!(registry.is_mapped(&TypeKey::of::<Shape>()));
}

/// The discriminator function and key are applied at build time.
#[test]
fn test_discriminator_options() {
    let options = MapperOptions::default()
        .with_discriminator(DiscriminatorFunction::LowerSimpleName)
        .with_discriminator_key("kind");
    let registry = ModelRegistry::new(options);
    let circle = registry.entity_model::<Circle>().unwrap();

    assert_eq!(circle.discriminator(), "circle");
    assert_eq!(circle.discriminator_key(), "kind");
}

/// The default discriminator is the declared simple name.
#[test]
fn test_default_discriminator() {
    let model = registry().entity_model::<Author>().unwrap();
    assert_eq!(model.discriminator(), "Author");
    assert_eq!(model.discriminator_key(), "_t");
}
