//! ConsumerLoop - pull, supervise, renew, settle, repeat.
//!
//! # Cycle
//! 1. `on_start_loop`
//! 2. pull one message; none → `on_empty_pull` (idle sleep), cycle is `Idle`
//! 3. spawn the worker, then renew: extend the lease by `ack_deadline`, sleep
//!    half of it, check the worker, repeat while it runs
//! 4. re-emit every output line through our own logger
//! 5. success → `on_loop_success` (ack), failure → `on_loop_fail` (release)
//! 6. `on_end_loop`
//!
//! A failure anywhere in 2-5 becomes a [`LoopError`]: `on_loop_error` sees
//! it and the driver goes on with the next cycle. The message is left alone
//! and comes back once its lease runs out.
//!
//! # Driver
//! Cycles run back to back until the shutdown token is cancelled or the
//! wall-clock budget is spent, both checked only between cycles. A running
//! worker is never interrupted.

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::builder::ConsumerBuilder;
use super::config::LoopConfig;
use super::hooks::{LoopHooks, Settlement};
use super::reingest::reingest;
use super::status::{CycleStatus, RunReport, StopReason};
use super::summary::{RunSummary, cgroup_memory_limit, peak_memory};
use crate::domain::{LoopError, Message, ProcessId};
use crate::gateway::{PullOptions, SubscriptionGateway};
use crate::logparse::LogParser;
use crate::ports::{WorkerLauncher, WorkerOutput, WorkerProcess};

pub struct ConsumerLoop {
    pub(super) config: LoopConfig,
    pub(super) gateway: Arc<SubscriptionGateway>,
    pub(super) launcher: Arc<dyn WorkerLauncher>,
    pub(super) hooks: Arc<dyn LoopHooks>,
    pub(super) parser: LogParser,
    pub(super) shutdown: CancellationToken,
}

impl ConsumerLoop {
    pub fn builder(config: LoopConfig) -> ConsumerBuilder {
        ConsumerBuilder::new(config)
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Cancelling this token stops the driver at the next cycle boundary.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs cycles until stopped, then logs the run summary.
    ///
    /// Never fails: cycle errors are logged and handed to `on_loop_error`.
    pub async fn run(&self) -> RunReport {
        let started = Instant::now();
        info!(
            subscription = %self.config.subscription,
            ack_deadline = %self.config.ack_deadline,
            timeout_secs = self.config.worker_timeout.as_secs(),
            "consumer started"
        );
        self.hooks.on_start().await;

        let mut cycles = 0;
        let mut processed = 0;
        let mut failed = 0;
        let mut errored = 0;
        let mut last_cycle;

        loop {
            last_cycle = match self.run_cycle().await {
                Ok(status) => status,
                Err(err) => {
                    self.hooks.on_loop_error(&err).await;
                    CycleStatus::Errored { code: err.code() }
                }
            };
            cycles += 1;
            match last_cycle {
                CycleStatus::Idle => {}
                CycleStatus::Succeeded => processed += 1,
                CycleStatus::Failed { .. } => failed += 1,
                CycleStatus::Errored { .. } => errored += 1,
            }

            if self.shutdown.is_cancelled() || started.elapsed() >= self.config.worker_timeout {
                break;
            }
            if matches!(last_cycle, CycleStatus::Errored { .. }) {
                // keep a broken backend from turning the driver into a hot loop
                tokio::select! {
                    _ = tokio::time::sleep(self.config.idle_interval) => {}
                    _ = self.shutdown.cancelled() => {}
                }
            }
        }

        let stop = if self.shutdown.is_cancelled() {
            info!("consumer stopped by signal");
            self.hooks.on_stopped_by_signal().await;
            StopReason::Signal
        } else {
            info!("consumer stopped by timeout");
            self.hooks.on_stopped_by_timeout().await;
            StopReason::Timeout
        };
        self.hooks.on_end().await;

        let report = RunReport {
            stop,
            cycles,
            processed,
            failed,
            errored,
            last_cycle,
            elapsed: started.elapsed(),
        };
        RunSummary {
            report: &report,
            subscription: &self.config.subscription,
            peak_memory: peak_memory(),
            memory_limit: self.config.memory_limit.or_else(cgroup_memory_limit),
            memory_warning_percent: self.config.memory_warning_percent,
        }
        .log();
        report
    }

    /// One cycle, traced under a fresh process id.
    pub async fn run_cycle(&self) -> Result<CycleStatus, LoopError> {
        let process_id = ProcessId::generate();
        let span = info_span!(
            "cycle",
            process_id = %process_id,
            subscription = %self.config.subscription
        );
        async move {
            let result = self.cycle().await;
            if let Err(err) = &result {
                error!(error = %err, code = ?err.code(), "cycle failed");
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn cycle(&self) -> Result<CycleStatus, LoopError> {
        self.hooks.on_start_loop().await;

        let subscription = self.config.subscription.as_str();
        let Some(message) = self
            .gateway
            .pull(subscription, PullOptions::default())
            .await?
        else {
            debug!(idle_secs = self.config.idle_interval.as_secs_f64(), "no message");
            self.hooks.on_empty_pull(self.config.idle_interval).await;
            return Ok(CycleStatus::Idle);
        };
        info!(
            message_id = message.message_id(),
            delivery_attempt = message.delivery_attempt(),
            "message pulled"
        );

        let output = self.supervise(&message).await?;
        let lines = reingest(&self.parser, &output);

        let settlement = Settlement::new(&self.gateway, subscription, &message);
        let status = if output.succeeded() {
            self.hooks.on_loop_success(&settlement, &output).await?;
            info!(message_id = message.message_id(), lines, "message processed");
            CycleStatus::Succeeded
        } else {
            self.hooks.on_loop_fail(&settlement, &output).await?;
            warn!(
                message_id = message.message_id(),
                exit_code = ?output.exit_code,
                lines,
                "worker failed"
            );
            CycleStatus::Failed {
                exit_code: output.exit_code,
            }
        };

        self.hooks.on_end_loop(&message).await;
        Ok(status)
    }

    /// Spawns the worker and keeps the lease alive until it exits.
    ///
    /// When renewal fails the worker is still awaited, so two workers never
    /// overlap; the renewal error wins.
    async fn supervise(&self, message: &Message) -> Result<WorkerOutput, LoopError> {
        let mut worker = self.launcher.spawn(message)?;
        debug!(pid = ?worker.id(), "worker started");

        let renewed = self.renew_while_running(worker.as_mut(), message).await;
        let finished = worker.finish().await;
        renewed?;
        let output = finished?;
        debug!(exit_code = ?output.exit_code, "worker exited");
        Ok(output)
    }

    // Renew first, then sleep, then look: a worker that has just exited may
    // get one last (harmless) extension.
    async fn renew_while_running(
        &self,
        worker: &mut dyn WorkerProcess,
        message: &Message,
    ) -> Result<(), LoopError> {
        let extension = i64::from(self.config.ack_deadline.as_secs());
        let interval = self.config.renewal_interval();
        loop {
            self.gateway
                .modify_ack_deadline(&self.config.subscription, message, extension)
                .await?;
            tokio::time::sleep(interval).await;
            if !worker.is_running()? {
                return Ok(());
            }
        }
    }
}
