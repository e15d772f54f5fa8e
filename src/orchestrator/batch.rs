//! Batch lifecycle requests
//!
//! Every instance in a batch is handled independently; one failure never
//! stops the others. Outcomes are reported in request order.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::errors::OrchestratorError;
use crate::inventory::InstanceId;

/// Lifecycle actions that can be applied to many instances at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Start,
    Stop,
    Reload,
    Restart,
    Rebuild,
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::Start => "start",
            LifecycleAction::Stop => "stop",
            LifecycleAction::Reload => "reload",
            LifecycleAction::Restart => "restart",
            LifecycleAction::Rebuild => "rebuild",
        }
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LifecycleAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(LifecycleAction::Start),
            "stop" => Ok(LifecycleAction::Stop),
            "reload" => Ok(LifecycleAction::Reload),
            "restart" => Ok(LifecycleAction::Restart),
            "rebuild" => Ok(LifecycleAction::Rebuild),
            other => Err(format!("unknown lifecycle action '{}'", other)),
        }
    }
}

/// Result for one instance of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    /// Action carried out
    Done { instance: InstanceId, online: bool },
    /// Instance already in the requested state
    Skipped { instance: InstanceId, reason: String },
    /// Action failed; nothing was rolled back
    Failed {
        instance: InstanceId,
        code: String,
        error: String,
    },
}

impl BatchOutcome {
    pub fn failed(instance: InstanceId, error: &OrchestratorError) -> Self {
        BatchOutcome::Failed {
            instance,
            code: error.code().to_string(),
            error: error.to_string(),
        }
    }

    pub fn instance(&self) -> InstanceId {
        match self {
            BatchOutcome::Done { instance, .. }
            | BatchOutcome::Skipped { instance, .. }
            | BatchOutcome::Failed { instance, .. } => *instance,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, BatchOutcome::Failed { .. })
    }
}

/// Outcomes of one batch in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub action: LifecycleAction,
    pub outcomes: Vec<BatchOutcome>,
}

impl BatchReport {
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    pub fn is_success(&self) -> bool {
        self.failures() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parse() {
        assert_eq!("rebuild".parse::<LifecycleAction>(), Ok(LifecycleAction::Rebuild));
        assert!("vacuum".parse::<LifecycleAction>().is_err());
    }

    #[test]
    fn test_outcome_serialization() {
        let report = BatchReport {
            action: LifecycleAction::Start,
            outcomes: vec![
                BatchOutcome::Done {
                    instance: InstanceId(1),
                    online: true,
                },
                BatchOutcome::Skipped {
                    instance: InstanceId(2),
                    reason: "already online".into(),
                },
                BatchOutcome::failed(InstanceId(3), &OrchestratorError::connection("db3 down")),
            ],
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["action"], "start");
        assert_eq!(json["outcomes"][0]["status"], "done");
        assert_eq!(json["outcomes"][1]["status"], "skipped");
        assert_eq!(json["outcomes"][2]["code"], "HERD_CONNECTION_ERROR");
        assert_eq!(report.failures(), 1);
        assert!(!report.is_success());
    }
}
