//! Execution status machine
//!
//! ```text
//! pending → running
//! running → waiting_user | paused | completed | failed
//! waiting_user → running
//! paused → running
//! failed → running        (retry_step)
//! completed / failed → terminal
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Paused,
    WaitingUser,
    Completed,
    Failed,
}

impl ExecutionStatus {
    /// Completed and failed are terminal; failed may still be retried
    /// explicitly, which is modelled as a permitted transition below.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }

    /// Whether the transition to `next` is permitted by the state machine.
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, WaitingUser)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Failed)
                | (WaitingUser, Running)
                | (WaitingUser, Failed)
                | (Paused, Running)
                | (Paused, Failed)
                | (Failed, Running)
        )
    }

    /// Database/wire representation, matching the serde rename.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Paused => "paused",
            ExecutionStatus::WaitingUser => "waiting_user",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ExecutionStatus::Pending),
            "running" => Some(ExecutionStatus::Running),
            "paused" => Some(ExecutionStatus::Paused),
            "waiting_user" => Some(ExecutionStatus::WaitingUser),
            "completed" => Some(ExecutionStatus::Completed),
            "failed" => Some(ExecutionStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ExecutionStatus::*;

    #[test]
    fn test_permitted_transitions() {
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(WaitingUser));
        assert!(Running.can_transition_to(Paused));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));
        assert!(WaitingUser.can_transition_to(Running));
        assert!(Paused.can_transition_to(Running));
        assert!(Failed.can_transition_to(Running));
    }

    #[test]
    fn test_forbidden_transitions() {
        assert!(!Completed.can_transition_to(Running));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Paused.can_transition_to(WaitingUser));
    }

    #[test]
    fn test_wire_names_round_trip() {
        for status in [Pending, Running, Paused, WaitingUser, Completed, Failed] {
            assert_eq!(ExecutionStatus::parse(status.as_str()), Some(status));
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }
}
