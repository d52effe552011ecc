//! aeromap - A strict, deterministic object-document mapper
//!
//! Maps plain Rust types to BSON documents:
//!
//! - `model`: explicit type descriptors built into immutable entity models
//! - `validation`: structural rules run over every freshly built batch
//! - `codec`: per-type encode/decode units, references and data access
//! - `document`: reader/writer cursors, including the flattened reader
//! - `mapper`: the facade tying it all together
//!
//! Invalid mappings fail when the model is built, never halfway through an
//! encode or decode.

pub mod codec;
pub mod document;
pub mod errors;
pub mod mapper;
pub mod model;
pub mod observability;
pub mod options;
pub mod validation;

pub use codec::{DataAccess, MemoryDataAccess, Reference};
pub use errors::{MappingError, MappingResult};
pub use mapper::Mapper;
pub use model::{Entity, EntityType, Mapped, ReferenceOptions, TypeDescriptor};
pub use options::{DateStorage, LoadingPolicy, MapperOptions, UuidRepresentation};
pub use validation::{ConstraintViolation, Level, ValidationReport};
