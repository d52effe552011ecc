//! Codec Round-Trip Tests
//!
//! - decode(encode(x)) == x for supported property types
//! - encode(decode(doc)) is the canonical document
//! - Null and empty storage policies
//! - Polymorphic encode/decode with discriminators
//! - Embed-time cycles are rejected
//! - UUID and date storage options

mod fixtures;

use std::sync::Arc;

use aeromap::document::FlattenedDocumentReader;
use aeromap::model::{EntityType, Mapped, TypeDescriptor};
use aeromap::{DateStorage, Mapper, MapperOptions, MappingError, Reference, UuidRepresentation};
use bson::spec::BinarySubtype;
use bson::{doc, Bson};
use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;
use fixtures::{circle, node, square, Address, Author, Book, Circle, Drawing, Shape, Square};

fn mapper() -> Mapper {
    Mapper::new(MapperOptions::default())
}

fn full_author() -> Author {
    Author {
        id: 2,
        name: "Grace".to_string(),
        email: Some("grace@example.com".to_string()),
        tags: vec!["navy".to_string(), "cobol".to_string()],
        address: Some(Address {
            street: "1 Main St".to_string(),
            city: "Arlington".to_string(),
        }),
    }
}

// =============================================================================
// Round Trips
// =============================================================================

/// Every populated property survives a round trip.
#[test]
fn test_author_round_trip() {
    let mapper = mapper();
    let author = full_author();

    let document = mapper.to_document(&author).unwrap();
    assert_eq!(
        document,
        doc! {
            "_id": 2i64,
            "name": "Grace",
            "email": "grace@example.com",
            "tags": ["navy", "cobol"],
            "address": { "street": "1 Main St", "city": "Arlington" },
        }
    );
    assert_eq!(mapper.from_document::<Author>(&document).unwrap(), author);
}

/// Re-encoding a decoded document yields the canonical field order.
#[test]
fn test_encode_decode_is_canonical() {
    let mapper = mapper();
    let stored = doc! { "name": "Ada", "extra": { "deep": [1, 2] }, "_id": 1i64 };

    let author: Author = mapper.from_document(&stored).unwrap();
    let canonical = mapper.to_document(&author).unwrap();
    assert_eq!(canonical, doc! { "_id": 1i64, "name": "Ada" });

    let again: Author = mapper.from_document(&canonical).unwrap();
    assert_eq!(mapper.to_document(&again).unwrap(), canonical);
}

/// The flattened reader decodes exactly like the plain one.
#[test]
fn test_decode_through_flattened_reader() {
    let mapper = mapper();
    let document = mapper.to_document(&full_author()).unwrap();

    let mut reader = FlattenedDocumentReader::new(&document).unwrap();
    let decoded = mapper.decode::<Author>(&mut reader).unwrap();
    assert_eq!(*decoded, full_author());
}

/// Narrower stored integers widen into wider properties.
#[test]
fn test_int32_widens_to_int64() {
    let author: Author = mapper()
        .from_document(&doc! { "_id": 5i32, "name": "Bo" })
        .unwrap();
    assert_eq!(author.id, 5);
}

/// Also-load names are accepted on decode and never written.
#[test]
fn test_also_load_names() {
    let mapper = mapper();
    let author: Author = mapper
        .from_document(&doc! { "_id": 3i64, "fullName": "Barbara" })
        .unwrap();
    assert_eq!(author.name, "Barbara");
    assert_eq!(
        mapper.to_document(&author).unwrap(),
        doc! { "_id": 3i64, "name": "Barbara" }
    );
}

/// Transient properties are never touched; not-saved ones are read only.
#[test]
fn test_transient_and_not_saved() {
    let mapper = mapper();
    let book = Book {
        id: 1,
        title: "Dune".to_string(),
        author: Reference::from_id(7i64),
        reviewers: Vec::new(),
        summary: "computed".to_string(),
        legacy_isbn: Some("0-441-17271-7".to_string()),
    };

    let document = mapper.to_document(&book).unwrap();
    assert_eq!(document, doc! { "_id": 1i64, "title": "Dune", "author": 7i64 });

    let stored = doc! {
        "_id": 1i64,
        "title": "Dune",
        "author": 7i64,
        "isbn": "0-441-17271-7",
        "summary": "stale",
    };
    let decoded: Book = mapper.from_document(&stored).unwrap();
    assert_eq!(decoded.legacy_isbn.as_deref(), Some("0-441-17271-7"));
    assert_eq!(decoded.summary, "");
}

// =============================================================================
// Null and Empty Policy
// =============================================================================

/// Nulls and empty collections are omitted by default.
#[test]
fn test_nulls_and_empties_omitted_by_default() {
    let document = mapper().to_document(&Author::new(1, "Ada")).unwrap();
    assert_eq!(document, doc! { "_id": 1i64, "name": "Ada" });
}

/// Configured policies store them explicitly.
#[test]
fn test_nulls_and_empties_stored_when_configured() {
    let mapper = Mapper::new(
        MapperOptions::default()
            .with_store_nulls(true)
            .with_store_empties(true),
    );
    let author = Author::new(1, "Ada");

    let document = mapper.to_document(&author).unwrap();
    assert_eq!(
        document,
        doc! {
            "_id": 1i64,
            "name": "Ada",
            "email": null,
            "tags": [],
            "address": null,
        }
    );
    assert_eq!(mapper.from_document::<Author>(&document).unwrap(), author);
}

/// The discriminator can be forced onto every document.
#[test]
fn test_always_write_discriminator() {
    let mapper = Mapper::new(MapperOptions::default().with_always_write_discriminator(true));
    let document = mapper.to_document(&Author::new(1, "Ada")).unwrap();
    assert_eq!(document, doc! { "_id": 1i64, "_t": "Author", "name": "Ada" });
}

// =============================================================================
// Polymorphism
// =============================================================================

/// A subtype encoded under its root carries its discriminator and decodes
/// back to the subtype.
#[test]
fn test_polymorphic_round_trip() {
    let mapper = mapper();
    mapper
        .map(&[EntityType::of::<Circle>(), EntityType::of::<Square>()])
        .unwrap();
    let shape = EntityType::of::<Shape>();
    let red = circle(1, "red", 2.5);

    let document = mapper.to_document_as(&shape, &red).unwrap();
    assert_eq!(
        document,
        doc! { "_id": 1i64, "_t": "Circle", "color": "red", "radius": 2.5 }
    );

    let decoded = mapper.from_document_polymorphic(&shape, &document).unwrap();
    assert_eq!(decoded.downcast_ref::<Circle>(), Some(&red));
}

/// The declared type writes no discriminator.
#[test]
fn test_declared_type_has_no_discriminator() {
    let document = mapper().to_document(&circle(1, "red", 1.0)).unwrap();
    assert!(!document.contains_key("_t"));
}

/// Polymorphic list elements keep their concrete types.
#[test]
fn test_polymorphic_collection_round_trip() {
    let mapper = mapper();
    let drawing = Drawing {
        id: 9,
        shapes: vec![
            Arc::new(circle(1, "red", 1.0)),
            Arc::new(square(2, "blue", 3.0)),
        ],
    };

    let document = mapper.to_document(&drawing).unwrap();
    let shapes = document.get_array("shapes").unwrap();
    assert_eq!(shapes[0].as_document().unwrap().get_str("_t").unwrap(), "Circle");
    assert_eq!(shapes[1].as_document().unwrap().get_str("_t").unwrap(), "Square");

    let decoded: Drawing = mapper.from_document(&document).unwrap();
    assert_eq!(decoded, drawing);
    assert!(decoded.shapes[1].is::<Square>());
}

/// Unknown discriminators fall back to the declared type.
#[test]
fn test_unknown_discriminator_falls_back() {
    let decoded = mapper()
        .from_document_polymorphic(
            &EntityType::of::<Shape>(),
            &doc! { "_id": 4i64, "_t": "Hexagon", "color": "green" },
        )
        .unwrap();
    let shape = decoded.downcast_ref::<Shape>().unwrap();
    assert_eq!(shape.color, "green");
}

/// Strict polymorphism rejects unknown discriminators.
#[test]
fn test_unknown_discriminator_strict() {
    let mapper = Mapper::new(MapperOptions::default().with_strict_polymorphism(true));
    let err = mapper
        .from_document_polymorphic(
            &EntityType::of::<Shape>(),
            &doc! { "_id": 4i64, "_t": "Hexagon", "color": "green" },
        )
        .unwrap_err();
    assert!(matches!(err, MappingError::UnknownDiscriminator { .. }));
    assert!(err.is_fatal());
}

/// A discriminator that is not a string is malformed, in either mode.
#[test]
fn test_non_string_discriminator_is_malformed() {
    let document = doc! { "_id": 1i64, "_t": 42, "color": "red" };
    for strict in [false, true] {
        let mapper = Mapper::new(MapperOptions::default().with_strict_polymorphism(strict));
        let err = mapper
            .from_document_polymorphic(&EntityType::of::<Shape>(), &document)
            .unwrap_err();
        assert!(matches!(err, MappingError::Malformed { .. }));
        assert!(err.is_fatal());
    }
}

/// A discriminator of a sibling type is not assignable.
#[test]
fn test_incompatible_discriminator() {
    let mapper = mapper();
    mapper
        .map(&[EntityType::of::<Circle>(), EntityType::of::<Square>()])
        .unwrap();

    let err = mapper
        .from_document::<Circle>(&doc! { "_id": 1i64, "_t": "Square", "side": 2.0 })
        .unwrap_err();
    assert!(matches!(err, MappingError::IncompatibleDiscriminator { .. }));
}

/// Typed decode refuses to hand back a subtype as its root type.
#[test]
fn test_typed_decode_of_subtype_is_rejected() {
    let mapper = mapper();
    mapper.map(&[EntityType::of::<Circle>()]).unwrap();
    let document = mapper
        .to_document_as(&EntityType::of::<Shape>(), &circle(1, "red", 1.0))
        .unwrap();

    let err = mapper.from_document::<Shape>(&document).unwrap_err();
    assert_eq!(err.code(), "MAPPING_INCOMPATIBLE_DISCRIMINATOR");
}

/// Encoding under an unrelated declared type is rejected.
#[test]
fn test_encode_as_unrelated_type() {
    let err = mapper()
        .to_document_as(&EntityType::of::<Square>(), &circle(1, "red", 1.0))
        .unwrap_err();
    assert!(matches!(err, MappingError::IncompatibleDiscriminator { .. }));
}

// =============================================================================
// Malformed Documents
// =============================================================================

/// Shape mismatches carry entity and property context.
#[test]
fn test_malformed_property_has_context() {
    let err = mapper()
        .from_document::<Author>(&doc! { "_id": 1i64, "name": 42 })
        .unwrap_err();

    assert!(matches!(err.root_cause(), MappingError::Malformed { .. }));
    assert!(err.to_string().starts_with("Author.name:"));
    assert_eq!(err.code(), "MAPPING_MALFORMED_DOCUMENT");
}

// =============================================================================
// Cycles
// =============================================================================

/// An acyclic chain embeds each node inline.
#[test]
fn test_embedded_chain() {
    let a = node("a");
    let b = node("b");
    a.next.set(b).unwrap();

    let document = mapper().to_document(a.as_ref()).unwrap();
    assert_eq!(document, doc! { "name": "a", "next": { "name": "b" } });
}

/// A true embed-time cycle is rejected instead of recursing forever.
#[test]
fn test_embedded_cycle_is_rejected() {
    let a = node("a");
    let b = node("b");
    b.next.set(a.clone()).unwrap();
    a.next.set(b.clone()).unwrap();

    let err = mapper().to_document(a.as_ref()).unwrap_err();
    assert!(matches!(err.root_cause(), MappingError::CyclicEmbedding(name) if name == "Node"));
}

// =============================================================================
// Storage Options
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
struct Token {
    id: Uuid,
    issued: NaiveDateTime,
}

impl Mapped for Token {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::entity::<Token>("Token")
            .field("id", |t| t.id, |t, v| t.id = v)
            .id()
            .field("issued", |t| t.issued, |t, v| t.issued = v)
            .build()
    }
}

fn token() -> Token {
    Token {
        id: Uuid::from_bytes([
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
            0xee, 0xff,
        ]),
        issued: NaiveDate::from_ymd_opt(2024, 1, 15)
            .and_then(|d| d.and_hms_milli_opt(12, 30, 0, 250))
            .unwrap(),
    }
}

fn binary_subtype(value: &Bson) -> BinarySubtype {
    match value {
        Bson::Binary(binary) => binary.subtype,
        other => panic!("expected binary, got {other:?}"),
    }
}

/// UUIDs are stored as subtype 4 by default.
#[test]
fn test_uuid_stored_as_standard_by_default() {
    let mapper = mapper();
    let document = mapper.to_document(&token()).unwrap();

    assert_eq!(binary_subtype(document.get("_id").unwrap()), BinarySubtype::Uuid);
    assert_eq!(mapper.from_document::<Token>(&document).unwrap(), token());
}

/// A legacy representation stores subtype 3 and reads back unchanged.
#[test]
fn test_uuid_java_legacy_round_trip() {
    let mapper =
        Mapper::new(MapperOptions::default().with_uuid_representation(UuidRepresentation::JavaLegacy));
    let document = mapper.to_document(&token()).unwrap();

    let stored = document.get("_id").unwrap();
    assert_eq!(binary_subtype(stored), BinarySubtype::UuidOld);
    assert_ne!(stored, &mapper_id_standard());
    assert_eq!(mapper.from_document::<Token>(&document).unwrap(), token());

    let id = mapper.reference_id(&Reference::new(token())).unwrap();
    assert_eq!(&id, stored);
}

fn mapper_id_standard() -> Bson {
    mapper().to_document(&token()).unwrap().get("_id").unwrap().clone()
}

/// Naive date-times are stored as UTC instants by default.
#[test]
fn test_local_date_time_stored_as_utc() {
    let mapper = mapper();
    let document = mapper.to_document(&token()).unwrap();

    assert_eq!(
        document.get("issued"),
        Some(&Bson::DateTime(bson::DateTime::from_millis(1_705_321_800_250)))
    );
    assert_eq!(mapper.from_document::<Token>(&document).unwrap(), token());
}

/// The system zone round-trips through the same zone.
#[test]
fn test_local_date_time_system_zone_round_trip() {
    let mapper =
        Mapper::new(MapperOptions::default().with_date_storage(DateStorage::SystemDefault));
    let document = mapper.to_document(&token()).unwrap();

    assert!(matches!(document.get("issued"), Some(Bson::DateTime(_))));
    assert_eq!(mapper.from_document::<Token>(&document).unwrap(), token());
}
