//! Status - how a cycle and a whole run ended.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Outcome of one consumption cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleStatus {
    /// Nothing to pull; the loop idled.
    Idle,
    /// Worker succeeded and the message was settled.
    Succeeded,
    /// Worker exited with a failure status.
    Failed { exit_code: Option<i32> },
    /// The cycle aborted with a `LoopError`.
    Errored { code: Option<i32> },
}

impl CycleStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, CycleStatus::Idle | CycleStatus::Succeeded)
    }
}

impl fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleStatus::Idle => f.write_str("idle"),
            CycleStatus::Succeeded => f.write_str("succeeded"),
            CycleStatus::Failed { exit_code: Some(code) } => write!(f, "failed (exit code {code})"),
            CycleStatus::Failed { exit_code: None } => f.write_str("failed (killed by signal)"),
            CycleStatus::Errored { code: Some(code) } => write!(f, "errored (code {code})"),
            CycleStatus::Errored { code: None } => f.write_str("errored"),
        }
    }
}

/// Why the driver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Signal,
    Timeout,
}

/// What [`super::ConsumerLoop::run`] hands back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub stop: StopReason,
    pub cycles: u64,
    pub processed: u64,
    pub failed: u64,
    pub errored: u64,
    pub last_cycle: CycleStatus,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_idle_and_succeeded_count_as_success() {
        assert!(CycleStatus::Idle.is_success());
        assert!(CycleStatus::Succeeded.is_success());
        assert!(!CycleStatus::Failed { exit_code: Some(1) }.is_success());
        assert!(!CycleStatus::Errored { code: None }.is_success());
    }

    #[test]
    fn display() {
        assert_eq!(
            CycleStatus::Failed { exit_code: Some(2) }.to_string(),
            "failed (exit code 2)"
        );
        assert_eq!(
            serde_json::to_string(&CycleStatus::Errored { code: Some(404) }).unwrap(),
            r#"{"status":"errored","code":404}"#
        );
    }
}
