//! leaseward-core
//!
//! A lease-renewing consumer for pull subscriptions. Each message is handed
//! to an external worker process; its lease is kept alive while the worker
//! runs, the worker's log output is re-emitted as structured records, and
//! the message is acknowledged or released depending on the exit status.
//!
//! # Modules
//! - **domain**: messages, ack deadlines, log records, errors
//! - **ports**: the queue client and worker process seams
//! - **gateway**: validated, cached subscription/topic access
//! - **logparse**: worker log line → [`domain::LogRecord`]
//! - **app**: the consumer loop, hooks, signals, run summary
//! - **impls**: in-memory queue backend, process launcher

pub mod app;
pub mod domain;
pub mod gateway;
pub mod impls;
pub mod logparse;
pub mod ports;
