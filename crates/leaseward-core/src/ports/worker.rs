//! WorkerLauncher port - process supervision.
//!
//! The consumer loop hands each message to an external worker and only cares
//! about four things: start it, ask whether it still runs, collect what it
//! printed, and learn whether it succeeded.

use async_trait::async_trait;

use crate::domain::{Message, WorkerError};

/// Starts one worker per message.
pub trait WorkerLauncher: Send + Sync {
    fn spawn(&self, message: &Message) -> Result<Box<dyn WorkerProcess>, WorkerError>;
}

/// A running (or just exited) worker, owned by the loop for one cycle.
#[async_trait]
pub trait WorkerProcess: Send {
    /// OS process id, when there is one.
    fn id(&self) -> Option<u32>;

    /// Non-blocking liveness check.
    fn is_running(&mut self) -> Result<bool, WorkerError>;

    /// Waits for exit and returns the captured output and status.
    async fn finish(self: Box<Self>) -> Result<WorkerOutput, WorkerError>;
}

/// What a finished worker left behind.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkerOutput {
    /// Everything the worker wrote (stdout, then stderr).
    pub output: String,
    pub success: bool,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl WorkerOutput {
    pub fn succeeded(&self) -> bool {
        self.success
    }

    /// Non-blank output lines.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.output.lines().filter(|l| !l.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_skip_blank_ones() {
        let out = WorkerOutput {
            output: "first\n\n   \nsecond\r\n".to_string(),
            success: true,
            exit_code: Some(0),
        };
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines, vec!["first", "second"]);
    }
}
