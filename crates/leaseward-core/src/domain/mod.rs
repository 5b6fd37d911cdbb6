//! Domain model (messages, leases, log records, errors).
//!
//! Nothing in here talks to the queue or spawns processes; see `ports` for
//! the seams and `app` for the consumer loop.

pub mod errors;
pub mod lease;
pub mod log_record;
pub mod message;
pub mod process_id;

pub use self::errors::{ErrorKind, GatewayError, LoopError, WorkerError};
pub use self::lease::AckDeadline;
pub use self::log_record::LogRecord;
pub use self::message::{AckId, Message, OutboundMessage};
pub use self::process_id::ProcessId;
