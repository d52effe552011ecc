//! Mapping error types
//!
//! Error classes:
//! - Structural (FATAL): illegal mapping-fact combinations, reported as a
//!   `ValidationReport` through `MappingError::Validation`
//! - Decode (recoverable): missing reference targets, surfaced at dereference
//! - Decode (malformed): document shape does not match the property shape
//! - Programming: unmapped types, cursor misuse

use thiserror::Error;

use crate::validation::ValidationReport;

/// Result type for mapping operations
pub type MappingResult<T> = Result<T, MappingError>;

/// Mapping errors
#[derive(Debug, Clone, Error)]
pub enum MappingError {
    #[error("Type '{0}' is not mapped and cannot be introspected")]
    UnmappedType(String),

    #[error("Mapping validation failed: {0}")]
    Validation(ValidationReport),

    #[error("Malformed document: expected {expected}, found {found}")]
    Malformed { expected: String, found: String },

    #[error("Unknown discriminator '{value}' for declared type {declared}")]
    UnknownDiscriminator { declared: String, value: String },

    #[error("Discriminator '{value}' resolves to {resolved}, which is not assignable to {declared}")]
    IncompatibleDiscriminator {
        declared: String,
        resolved: String,
        value: String,
    },

    #[error("Cyclic embedding of {0} detected while encoding")]
    CyclicEmbedding(String),

    #[error("Referenced {entity} with id {id} not found in collection '{collection}'")]
    ReferenceNotFound {
        entity: String,
        collection: String,
        id: String,
    },

    #[error("Reference to {0} carries neither a target nor an id")]
    MissingReferenceId(String),

    #[error("{entity}.{property}: {source}")]
    Property {
        entity: String,
        property: String,
        #[source]
        source: Box<MappingError>,
    },

    #[error("Invalid cursor state: {0}")]
    InvalidState(String),

    #[error("Data access failed: {0}")]
    DataAccess(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MappingError {
    /// Create a malformed-document error
    pub fn malformed(expected: impl Into<String>, found: impl Into<String>) -> Self {
        MappingError::Malformed {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create an invalid-state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        MappingError::InvalidState(msg.into())
    }

    /// Wrap this error with the entity and property it occurred in
    pub fn in_property(self, entity: impl Into<String>, property: impl Into<String>) -> Self {
        MappingError::Property {
            entity: entity.into(),
            property: property.into(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, skipping property context
    pub fn root_cause(&self) -> &MappingError {
        match self {
            MappingError::Property { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Returns the stable error code
    pub fn code(&self) -> &'static str {
        match self {
            MappingError::UnmappedType(_) => "MAPPING_UNMAPPED_TYPE",
            MappingError::Validation(_) => "MAPPING_VALIDATION_FAILED",
            MappingError::Malformed { .. } => "MAPPING_MALFORMED_DOCUMENT",
            MappingError::UnknownDiscriminator { .. } => "MAPPING_UNKNOWN_DISCRIMINATOR",
            MappingError::IncompatibleDiscriminator { .. } => {
                "MAPPING_INCOMPATIBLE_DISCRIMINATOR"
            }
            MappingError::CyclicEmbedding(_) => "MAPPING_CYCLIC_EMBEDDING",
            MappingError::ReferenceNotFound { .. } => "MAPPING_REFERENCE_NOT_FOUND",
            MappingError::MissingReferenceId(_) => "MAPPING_MISSING_REFERENCE_ID",
            MappingError::Property { source, .. } => source.code(),
            MappingError::InvalidState(_) => "MAPPING_INVALID_STATE",
            MappingError::DataAccess(_) => "MAPPING_DATA_ACCESS_FAILED",
            MappingError::Internal(_) => "MAPPING_INTERNAL",
        }
    }

    /// Recoverable errors leave the caller free to retry or ignore the
    /// affected value; everything else aborts the operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.root_cause(), MappingError::ReferenceNotFound { .. })
    }

    /// Returns true if this error aborts the current operation
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }
}

pub(crate) fn poisoned() -> MappingError {
    MappingError::Internal("Lock poisoned".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            MappingError::UnmappedType("Foo".into()).code(),
            "MAPPING_UNMAPPED_TYPE"
        );
        assert_eq!(
            MappingError::malformed("int32", "string").code(),
            "MAPPING_MALFORMED_DOCUMENT"
        );
    }

    #[test]
    fn test_property_context_keeps_code() {
        let err = MappingError::malformed("int32", "string").in_property("Author", "age");
        assert_eq!(err.code(), "MAPPING_MALFORMED_DOCUMENT");
        assert!(err.to_string().starts_with("Author.age: "));
        assert!(matches!(err.root_cause(), MappingError::Malformed { .. }));
    }

    #[test]
    fn test_missing_reference_is_recoverable() {
        let err = MappingError::ReferenceNotFound {
            entity: "Author".into(),
            collection: "author".into(),
            id: "1".into(),
        }
        .in_property("Book", "author");
        assert!(err.is_recoverable());
        assert!(!err.is_fatal());
        assert!(MappingError::CyclicEmbedding("Node".into()).is_fatal());
    }
}
