//! ObservationScope for automatic begin/complete logging
//!
//! - Logs `{name}_BEGIN` on creation
//! - Logs `{name}_COMPLETE` or `{name}_FAILED` when closed
//! - Logs `{name}_INCOMPLETE` on drop if never closed
//!
//! Every scope carries an operation id so the lines of one rebuild or one
//! failover can be correlated.

use std::time::Instant;

use uuid::Uuid;

use super::logger::Logger;

/// A scope that automatically logs start and complete events
pub struct ObservationScope {
    name: &'static str,
    operation_id: Uuid,
    started: Instant,
    completed: bool,
    fields: Vec<(&'static str, String)>,
}

impl ObservationScope {
    /// Open a scope with identifying fields.
    pub fn begin(name: &'static str, fields: &[(&'static str, String)]) -> Self {
        let scope = Self {
            name,
            operation_id: Uuid::new_v4(),
            started: Instant::now(),
            completed: false,
            fields: fields.to_vec(),
        };
        Logger::info(&format!("{}_BEGIN", name), &scope.field_refs(&[]));
        scope
    }

    pub fn operation_id(&self) -> Uuid {
        self.operation_id
    }

    fn field_refs<'a>(&'a self, extra: &[(&'a str, &'a str)]) -> Vec<(&'a str, &'a str)> {
        let mut refs: Vec<(&str, &str)> = self
            .fields
            .iter()
            .map(|(k, v)| (*k, v.as_str()))
            .collect();
        refs.extend_from_slice(extra);
        refs
    }

    /// Close the scope successfully.
    pub fn complete(mut self, extra: &[(&str, &str)]) {
        self.completed = true;
        let elapsed = self.started.elapsed().as_millis().to_string();
        let op = self.operation_id.to_string();
        let mut fields = self.field_refs(extra);
        fields.push(("elapsed_ms", elapsed.as_str()));
        fields.push(("operation_id", op.as_str()));
        Logger::info(&format!("{}_COMPLETE", self.name), &fields);
    }

    /// Close the scope as failed.
    pub fn fail(mut self, reason: &str) {
        self.completed = true;
        let op = self.operation_id.to_string();
        let mut fields = self.field_refs(&[("reason", reason)]);
        fields.push(("operation_id", op.as_str()));
        Logger::error(&format!("{}_FAILED", self.name), &fields);
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        if !self.completed {
            let op = self.operation_id.to_string();
            let mut fields = self.field_refs(&[("reason", "scope dropped without completion")]);
            fields.push(("operation_id", op.as_str()));
            Logger::warn(&format!("{}_INCOMPLETE", self.name), &fields);
        }
    }
}
