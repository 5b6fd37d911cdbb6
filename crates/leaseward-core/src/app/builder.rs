//! ConsumerBuilder - wiring of a [`ConsumerLoop`].
//!
//! Fail-fast: `build()` validates the configuration and refuses to produce
//! a loop with a missing queue client or worker launcher.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::config::{ConfigError, LoopConfig};
use super::consumer_loop::ConsumerLoop;
use super::hooks::{DefaultHooks, LoopHooks};
use crate::gateway::SubscriptionGateway;
use crate::logparse::LogParser;
use crate::ports::{PubSubClient, WorkerLauncher};

/// ```ignore
/// let consumer = ConsumerLoop::builder(LoopConfig::new("jobs"))
///     .client(client)
///     .launcher(Arc::new(CommandLauncher::new(spec)))
///     .build()?;
/// let report = consumer.run().await;
/// ```
pub struct ConsumerBuilder {
    config: LoopConfig,
    gateway: Option<Arc<SubscriptionGateway>>,
    launcher: Option<Arc<dyn WorkerLauncher>>,
    hooks: Arc<dyn LoopHooks>,
    shutdown: CancellationToken,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid consumer configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("no queue client or subscription gateway was provided")]
    MissingGateway,

    #[error("no worker launcher was provided")]
    MissingLauncher,
}

impl ConsumerBuilder {
    pub fn new(config: LoopConfig) -> Self {
        Self {
            config,
            gateway: None,
            launcher: None,
            hooks: Arc::new(DefaultHooks),
            shutdown: CancellationToken::new(),
        }
    }

    /// Uses a private gateway over `client`.
    pub fn client(self, client: Arc<dyn PubSubClient>) -> Self {
        self.gateway(Arc::new(SubscriptionGateway::new(client)))
    }

    /// Shares an existing gateway (and its handle cache).
    pub fn gateway(mut self, gateway: Arc<SubscriptionGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn launcher(mut self, launcher: Arc<dyn WorkerLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn LoopHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn build(self) -> Result<ConsumerLoop, BuildError> {
        self.config.validate()?;
        let gateway = self.gateway.ok_or(BuildError::MissingGateway)?;
        let launcher = self.launcher.ok_or(BuildError::MissingLauncher)?;
        let parser = LogParser::new().with_relaxed(self.config.relaxed_logs);
        Ok(ConsumerLoop {
            config: self.config,
            gateway,
            launcher,
            hooks: self.hooks,
            parser,
            shutdown: self.shutdown,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{CommandLauncher, CommandSpec, InMemoryPubSub};

    #[test]
    fn missing_parts_fail_the_build() {
        let err = ConsumerBuilder::new(LoopConfig::new("jobs"))
            .launcher(Arc::new(CommandLauncher::new(CommandSpec::new("true"))))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, BuildError::MissingGateway));

        let err = ConsumerBuilder::new(LoopConfig::new("jobs"))
            .client(Arc::new(InMemoryPubSub::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, BuildError::MissingLauncher));
    }

    #[test]
    fn invalid_config_fails_the_build() {
        let err = ConsumerBuilder::new(LoopConfig::new(""))
            .client(Arc::new(InMemoryPubSub::new()))
            .launcher(Arc::new(CommandLauncher::new(CommandSpec::new("true"))))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, BuildError::Config(ConfigError::EmptySubscription)));
    }

    #[test]
    fn relaxed_logs_reach_the_parser() {
        let consumer = ConsumerBuilder::new(LoopConfig::new("jobs").with_relaxed_logs(true))
            .client(Arc::new(InMemoryPubSub::new()))
            .launcher(Arc::new(CommandLauncher::new(CommandSpec::new("true"))))
            .build()
            .unwrap();
        assert!(consumer.parser.is_relaxed());
    }
}
