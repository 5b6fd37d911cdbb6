//! App - the consumer loop and what surrounds it.
//!
//! # Main components
//! - **ConsumerLoop**: pull → spawn → renew → reap → ack/release → repeat
//! - **ConsumerBuilder**: wiring and start-up validation
//! - **LoopHooks**: extension points, with the standard behavior as defaults
//! - **reingest**: worker output back through our own logger
//! - **summary**: end-of-run duration/memory report
//! - **signals**: OS signals → shutdown token

pub mod builder;
pub mod config;
pub mod consumer_loop;
pub mod hooks;
pub mod reingest;
pub mod signals;
pub mod status;
pub mod summary;

pub use self::builder::{BuildError, ConsumerBuilder};
pub use self::config::{ConfigError, LoopConfig};
pub use self::consumer_loop::ConsumerLoop;
pub use self::hooks::{DefaultHooks, LoopHooks, Settlement};
pub use self::signals::{cancel_on_signal, wait_for_shutdown_signal};
pub use self::status::{CycleStatus, RunReport, StopReason};
