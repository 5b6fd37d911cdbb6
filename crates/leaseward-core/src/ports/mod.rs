//! Ports - the seams to the outside world.
//!
//! - [`PubSubClient`]: the queue backend (pull / ack / lease / publish)
//! - [`WorkerLauncher`] / [`WorkerProcess`]: the worker process
//!
//! Development and test implementations live in [`crate::impls`].

pub mod pubsub;
pub mod worker;

pub use self::pubsub::PubSubClient;
pub use self::worker::{WorkerLauncher, WorkerOutput, WorkerProcess};
