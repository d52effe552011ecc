//! Shared mapped types for the integration tests
//!
//! - `Author` / `Address` / `Book`: plain entity, embeddable, references
//! - `Shape` / `Circle` / `Square` / `Drawing`: a polymorphic hierarchy
//! - `Node`: an embeddable that can be wired into a cycle

#![allow(dead_code)]

use std::fmt;
use std::sync::{Arc, OnceLock};

use aeromap::model::{Entity, Mapped, TypeDescriptor};
use aeromap::Reference;

// =============================================================================
// Authors and books
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Address {
    pub street: String,
    pub city: String,
}

impl Mapped for Address {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::embeddable::<Address>("Address")
            .field("street", |a| a.street.clone(), |a, v| a.street = v)
            .field("city", |a| a.city.clone(), |a, v| a.city = v)
            .build()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub tags: Vec<String>,
    pub address: Option<Address>,
}

impl Author {
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            ..Self::default()
        }
    }
}

impl Mapped for Author {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::entity::<Author>("Author")
            .field("id", |a| a.id, |a, v| a.id = v)
            .id()
            .field("name", |a| a.name.clone(), |a, v| a.name = v)
            .also_load(&["fullName"])
            .field("email", |a| a.email.clone(), |a, v| a.email = v)
            .field("tags", |a| a.tags.clone(), |a, v| a.tags = v)
            .field("address", |a| a.address.clone(), |a, v| a.address = v)
            .build()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: Reference<Author>,
    pub reviewers: Vec<Reference<Author>>,
    /// Computed on load, never stored
    pub summary: String,
    /// Loaded if present, never written back
    pub legacy_isbn: Option<String>,
}

impl Mapped for Book {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::entity::<Book>("Book")
            .collection("books")
            .field("id", |b| b.id, |b, v| b.id = v)
            .id()
            .field("title", |b| b.title.clone(), |b, v| b.title = v)
            .field("author", |b| b.author.clone(), |b, v| b.author = v)
            .reference()
            .field("reviewers", |b| b.reviewers.clone(), |b, v| b.reviewers = v)
            .field("summary", |b| b.summary.clone(), |b, v| b.summary = v)
            .transient()
            .field("legacy_isbn", |b| b.legacy_isbn.clone(), |b, v| b.legacy_isbn = v)
            .named("isbn")
            .not_saved()
            .build()
    }
}

// =============================================================================
// Shapes
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shape {
    pub id: i64,
    pub color: String,
}

impl Mapped for Shape {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::entity::<Shape>("Shape")
            .collection("shapes")
            .field("id", |s| s.id, |s, v| s.id = v)
            .id()
            .field("color", |s| s.color.clone(), |s, v| s.color = v)
            .build()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Circle {
    pub shape: Shape,
    pub radius: f64,
}

impl Mapped for Circle {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::entity::<Circle>("Circle")
            .extends::<Shape>(|c| &c.shape, |c| &mut c.shape)
            .field("radius", |c| c.radius, |c, v| c.radius = v)
            .build()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Square {
    pub shape: Shape,
    pub side: f64,
}

impl Mapped for Square {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::entity::<Square>("Square")
            .extends::<Shape>(|s| &s.shape, |s| &mut s.shape)
            .field("side", |s| s.side, |s, v| s.side = v)
            .build()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Drawing {
    pub id: i64,
    pub shapes: Vec<Arc<dyn Entity>>,
}

impl Mapped for Drawing {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::entity::<Drawing>("Drawing")
            .field("id", |d| d.id, |d, v| d.id = v)
            .id()
            .field("shapes", |d| d.shapes.clone(), |d, v| d.shapes = v)
            .polymorphic::<Shape>()
            .build()
    }
}

pub fn circle(id: i64, color: &str, radius: f64) -> Circle {
    Circle {
        shape: Shape {
            id,
            color: color.to_string(),
        },
        radius,
    }
}

pub fn square(id: i64, color: &str, side: f64) -> Square {
    Square {
        shape: Shape {
            id,
            color: color.to_string(),
        },
        side,
    }
}

// =============================================================================
// Cycles
// =============================================================================

/// Linked node; `next` is set after construction so two nodes can point at
/// each other.
#[derive(Clone, Default)]
pub struct Node {
    pub name: String,
    pub next: OnceLock<Arc<Node>>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("next", &self.next.get().map(|n| n.name.as_str()))
            .finish()
    }
}

/// Compares names only; a cyclic chain would never terminate otherwise.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Mapped for Node {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::embeddable::<Node>("Node")
            .field("name", |n| n.name.clone(), |n, v| n.name = v)
            .field(
                "next",
                |n| n.next.get().cloned(),
                |n, v: Option<Arc<Node>>| n.next = v.map(OnceLock::from).unwrap_or_default(),
            )
            .build()
    }
}

pub fn node(name: &str) -> Arc<Node> {
    Arc::new(Node {
        name: name.to_string(),
        next: OnceLock::new(),
    })
}
