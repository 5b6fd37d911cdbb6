//! Errors - error types and their classification.
//!
//! - [`GatewayError`]: failures talking to the queue (validation, unknown names, RPC).
//! - [`WorkerError`]: failures supervising the worker process.
//! - [`LoopError`]: anything that aborted one consumption cycle.

use thiserror::Error;

use super::lease::AckDeadline;

/// ErrorKind classifies a failure for operators.
///
/// - Transient: retrying the same call may succeed
/// - Permanent: the call site is wrong, retrying is pointless
/// - Infrastructure: the worker host or the queue backend misbehaved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

/// Errors surfaced by the subscription and topic gateways.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Lease extension outside `[0, 600]`; rejected before any call is made.
    #[error("ack deadline must be between 0 and {max} seconds, got {0}", max = AckDeadline::MAX_SECS)]
    InvalidLeaseExtension(i64),

    #[error("unknown subscription: {0}")]
    UnknownSubscription(String),

    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    /// The backend rejected the request (e.g. expired ack ids in a batch).
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::InvalidLeaseExtension(_) => ErrorKind::Permanent,
            GatewayError::UnknownSubscription(_) | GatewayError::UnknownTopic(_) => {
                ErrorKind::Permanent
            }
            GatewayError::BadRequest(_) => ErrorKind::Transient,
            GatewayError::Transport(_) => ErrorKind::Infrastructure,
        }
    }

    /// Whether the caller may retry the same request.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::BadRequest(_) | GatewayError::Transport(_)
        )
    }

    /// HTTP-style status code, the way the queue API reports it.
    pub fn code(&self) -> i32 {
        match self {
            GatewayError::InvalidLeaseExtension(_) | GatewayError::BadRequest(_) => 400,
            GatewayError::UnknownSubscription(_) | GatewayError::UnknownTopic(_) => 404,
            GatewayError::Transport(_) => 503,
        }
    }
}

/// Errors raised while spawning, polling or reaping a worker process.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to spawn worker `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write payload to worker stdin: {0}")]
    Stdin(#[source] std::io::Error),

    #[error("failed to poll worker status: {0}")]
    Poll(#[source] std::io::Error),

    #[error("failed to reap worker: {0}")]
    Reap(#[source] std::io::Error),
}

impl WorkerError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Infrastructure
    }

    pub fn code(&self) -> Option<i32> {
        let io = match self {
            WorkerError::Spawn { source, .. } => source,
            WorkerError::Stdin(e) | WorkerError::Poll(e) | WorkerError::Reap(e) => e,
        };
        io.raw_os_error()
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// LoopError wraps whatever aborted a consumption cycle.
///
/// It keeps the original message, code and cause so the driver can log the
/// failure and move on to the next cycle.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct LoopError {
    message: String,
    code: Option<i32>,
    #[source]
    cause: Option<BoxError>,
}

impl LoopError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            cause: None,
        }
    }

    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }
}

impl From<GatewayError> for LoopError {
    fn from(err: GatewayError) -> Self {
        let code = err.code();
        LoopError::new(err.to_string()).with_code(code).with_cause(err)
    }
}

impl From<WorkerError> for LoopError {
    fn from(err: WorkerError) -> Self {
        let mut loop_err = LoopError::new(err.to_string());
        loop_err.code = err.code();
        loop_err.with_cause(err)
    }
}
