//! Impls - implementations of the ports.
//!
//! - **InMemoryPubSub**: in-process queue backend with lease semantics, used
//!   by the CLI demo mode and the tests
//! - **CommandLauncher**: runs each message through an external program
//!
//! A client for a hosted queue implements [`crate::ports::PubSubClient`] in
//! its own crate.

pub mod command_worker;
pub mod inmem_pubsub;

pub use self::command_worker::{CommandLauncher, CommandSpec, DEFAULT_DRAIN_GRACE, PayloadMode};
pub use self::inmem_pubsub::{
    ClientCall, DEFAULT_ACK_DEADLINE, DEFAULT_JOURNAL_CAPACITY, InMemoryPubSub,
};
