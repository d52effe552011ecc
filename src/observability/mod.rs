//! Observability for the mapper
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on mapping outcome
//! 3. No background threads
//!
//! Events are emitted through `tracing` under the `aeromap` target; the
//! application chooses the subscriber.
//!
//! ```ignore
//! use aeromap::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::ModelBuilt, &[("entity", "Author")]);
//! ```

mod events;

pub use events::{Event, Severity};

/// Log a lifecycle event
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
///
/// Fields are rendered in the order given as `key=value` pairs.
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    let rendered = render_fields(fields);
    match event.severity() {
        Severity::Info => {
            tracing::info!(target: "aeromap", event = event.as_str(), fields = %rendered)
        }
        Severity::Warn => {
            tracing::warn!(target: "aeromap", event = event.as_str(), fields = %rendered)
        }
        Severity::Error => {
            tracing::error!(target: "aeromap", event = event.as_str(), fields = %rendered)
        }
    }
}

fn render_fields(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        // This just verifies no panic without a subscriber
        log_event(Event::ModelBuilt);
        log_event(Event::BatchRejected);
    }

    #[test]
    fn test_render_fields_keeps_order() {
        assert_eq!(
            render_fields(&[("entity", "Book"), ("collection", "book")]),
            "entity=Book collection=book"
        );
        assert_eq!(render_fields(&[]), "");
    }
}
