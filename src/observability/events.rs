//! Observable mapping events
//!
//! Events are explicit and typed. Each event has a stable upper-case name
//! and a severity; emission goes through `log_event`.

use std::fmt;

/// Severity of an observable event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Normal operations
    Info,
    /// Discouraged but legal situations
    Warn,
    /// An operation was rejected
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Observable events of the mapper
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Model registry
    /// An entity model was built and published
    ModelBuilt,
    /// A mapping batch passed validation and was published
    BatchMapped,
    /// A mapping batch failed validation; nothing was published
    BatchRejected,
    /// A WARNING-level constraint violation was reported
    ConstraintWarning,

    // Decode
    /// An unknown discriminator fell back to the declared type
    DiscriminatorFallback,
    /// An eager reference fetch found no target
    ReferenceUnresolved,
    /// Eager loading was requested without a data access collaborator
    EagerLoadSkipped,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ModelBuilt => "MODEL_BUILT",
            Event::BatchMapped => "MAPPING_BATCH_COMPLETE",
            Event::BatchRejected => "MAPPING_BATCH_REJECTED",
            Event::ConstraintWarning => "CONSTRAINT_WARNING",
            Event::DiscriminatorFallback => "DISCRIMINATOR_FALLBACK",
            Event::ReferenceUnresolved => "REFERENCE_UNRESOLVED",
            Event::EagerLoadSkipped => "EAGER_LOAD_SKIPPED",
        }
    }

    /// Returns the severity the event is logged with
    pub fn severity(&self) -> Severity {
        match self {
            Event::BatchRejected => Severity::Error,
            Event::ConstraintWarning
            | Event::DiscriminatorFallback
            | Event::ReferenceUnresolved
            | Event::EagerLoadSkipped => Severity::Warn,
            Event::ModelBuilt | Event::BatchMapped => Severity::Info,
        }
    }

    /// Returns true if this event reports a rejected operation
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Error
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
