//! Observability subsystem
//!
//! Provides:
//! - Structured logging (JSON lines on stderr)
//! - Operational counters
//! - Begin/complete scopes around multi-step operations
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on orchestration
//! 3. No background threads
//!
//! # Usage
//!
//! ```ignore
//! use herdsman::observability::{log_event, Event, ObservationScope};
//!
//! log_event(Event::InstanceStarted, &[("instance", "3")]);
//!
//! let scope = ObservationScope::begin("REBUILD", &[("instance", "3".into())]);
//! // ... do work ...
//! scope.complete(&[("path", "rewind")]);
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{Counter, MetricsRegistry, MetricsSnapshot};
pub use scope::ObservationScope;

/// Log a typed event at its own severity.
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        log_event(Event::ConfigLoaded, &[("path", "/etc/herdsman.json")]);
        log_event(Event::FollowerRepointFailed, &[("instance", "9")]);
    }
}
