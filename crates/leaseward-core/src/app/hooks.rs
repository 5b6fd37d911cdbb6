//! LoopHooks - extension points of the consumer loop.
//!
//! Every hook has a default, so an implementation overrides only what it
//! needs. The defaults give the standard behavior: sleep on an empty pull,
//! acknowledge on success, release on failure.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{GatewayError, LoopError, Message};
use crate::gateway::SubscriptionGateway;
use crate::ports::WorkerOutput;

/// The message of the current cycle, with the means to settle it.
pub struct Settlement<'a> {
    gateway: &'a SubscriptionGateway,
    subscription: &'a str,
    message: &'a Message,
}

impl<'a> Settlement<'a> {
    pub fn new(gateway: &'a SubscriptionGateway, subscription: &'a str, message: &'a Message) -> Self {
        Self {
            gateway,
            subscription,
            message,
        }
    }

    pub fn message(&self) -> &Message {
        self.message
    }

    pub fn subscription(&self) -> &str {
        self.subscription
    }

    pub async fn acknowledge(&self) -> Result<(), GatewayError> {
        self.gateway.acknowledge(self.subscription, self.message).await
    }

    /// Lease to zero: the queue redelivers the message at once.
    pub async fn release(&self) -> Result<(), GatewayError> {
        self.gateway.release(self.subscription, self.message).await
    }

    pub async fn extend(&self, seconds: i64) -> Result<(), GatewayError> {
        self.gateway
            .modify_ack_deadline(self.subscription, self.message, seconds)
            .await
    }
}

#[async_trait]
pub trait LoopHooks: Send + Sync {
    /// Once, before the first cycle.
    async fn on_start(&self) {}

    /// At the top of every cycle.
    async fn on_start_loop(&self) {}

    async fn on_empty_pull(&self, idle: Duration) {
        tokio::time::sleep(idle).await;
    }

    /// The worker exited successfully.
    async fn on_loop_success(
        &self,
        settlement: &Settlement<'_>,
        _output: &WorkerOutput,
    ) -> Result<(), LoopError> {
        settlement.acknowledge().await?;
        Ok(())
    }

    /// The worker exited with a failure status.
    async fn on_loop_fail(
        &self,
        settlement: &Settlement<'_>,
        _output: &WorkerOutput,
    ) -> Result<(), LoopError> {
        settlement.release().await?;
        Ok(())
    }

    /// A cycle aborted with an error. The driver carries on afterwards.
    async fn on_loop_error(&self, _error: &LoopError) {}

    /// After a message was settled.
    async fn on_end_loop(&self, _message: &Message) {}

    async fn on_stopped_by_signal(&self) {}

    async fn on_stopped_by_timeout(&self) {}

    /// Once, after the last cycle.
    async fn on_end(&self) {}
}

/// The standard behavior, nothing overridden.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

#[async_trait]
impl LoopHooks for DefaultHooks {}
