//! SubscriptionGateway - validated, cached access to subscriptions.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use super::PullOptions;
use crate::domain::{AckDeadline, AckId, GatewayError, Message};
use crate::ports::PubSubClient;

/// Handle to a subscription whose existence has been confirmed.
#[derive(Debug, PartialEq, Eq)]
pub struct Subscription {
    name: String,
}

impl Subscription {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Thin stateful wrapper over a [`PubSubClient`].
///
/// # Handle cache
/// - keyed by subscription name, filled lazily on first use
/// - an entry is only inserted after the backend confirmed the subscription
///   exists, so each name is checked at most once per process
pub struct SubscriptionGateway {
    client: Arc<dyn PubSubClient>,
    pull_defaults: PullOptions,
    subscriptions: Mutex<HashMap<String, Arc<Subscription>>>,
}

impl SubscriptionGateway {
    pub fn new(client: Arc<dyn PubSubClient>) -> Self {
        Self::with_pull_defaults(client, PullOptions::default())
    }

    pub fn with_pull_defaults(client: Arc<dyn PubSubClient>, pull_defaults: PullOptions) -> Self {
        Self {
            client,
            pull_defaults,
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached handle, or checks existence and caches a new one.
    pub async fn subscription(&self, name: &str) -> Result<Arc<Subscription>, GatewayError> {
        let mut cache = self.subscriptions.lock().await;
        if let Some(handle) = cache.get(name) {
            return Ok(Arc::clone(handle));
        }

        if !self.client.subscription_exists(name).await? {
            return Err(GatewayError::UnknownSubscription(name.to_string()));
        }

        debug!(subscription = name, "subscription resolved");
        let handle = Arc::new(Subscription {
            name: name.to_string(),
        });
        cache.insert(name.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Pulls at most one message. `Ok(None)` when the subscription is empty.
    pub async fn pull(
        &self,
        subscription: &str,
        options: PullOptions,
    ) -> Result<Option<Message>, GatewayError> {
        let options = options.max_messages(1);
        let mut messages = self.pull_batch(subscription, options).await?;
        if messages.is_empty() {
            return Ok(None);
        }
        Ok(Some(messages.swap_remove(0)))
    }

    /// Pulls up to `max_messages`, in the order the queue returned them.
    pub async fn pull_batch(
        &self,
        subscription: &str,
        options: PullOptions,
    ) -> Result<Vec<Message>, GatewayError> {
        let handle = self.subscription(subscription).await?;
        let options = options.merged_over(&self.pull_defaults);
        self.client.pull(handle.name(), &options).await
    }

    pub async fn acknowledge(
        &self,
        subscription: &str,
        message: &Message,
    ) -> Result<(), GatewayError> {
        let handle = self.subscription(subscription).await?;
        debug!(
            subscription = handle.name(),
            message_id = message.message_id(),
            "acknowledge"
        );
        self.client
            .acknowledge(handle.name(), std::slice::from_ref(message.ack_id()))
            .await
    }

    /// Acknowledges several messages in one request.
    ///
    /// A [`GatewayError::BadRequest`] here is transient (typically some ack
    /// ids expired meanwhile); the caller may retry.
    pub async fn acknowledge_batch(
        &self,
        subscription: &str,
        messages: &[Message],
    ) -> Result<(), GatewayError> {
        if messages.is_empty() {
            return Ok(());
        }
        let handle = self.subscription(subscription).await?;
        let ack_ids: Vec<AckId> = messages.iter().map(|m| m.ack_id().clone()).collect();
        self.client.acknowledge(handle.name(), &ack_ids).await
    }

    /// Pushes the message's redelivery deadline to `now + seconds`.
    ///
    /// `seconds` must be within `[0, 600]`; otherwise this fails with
    /// [`GatewayError::InvalidLeaseExtension`] before anything is sent.
    pub async fn modify_ack_deadline(
        &self,
        subscription: &str,
        message: &Message,
        seconds: i64,
    ) -> Result<(), GatewayError> {
        let deadline = AckDeadline::new(seconds)?;
        let handle = self.subscription(subscription).await?;
        debug!(
            subscription = handle.name(),
            message_id = message.message_id(),
            %deadline,
            "modify ack deadline"
        );
        self.client
            .modify_ack_deadline(
                handle.name(),
                std::slice::from_ref(message.ack_id()),
                deadline,
            )
            .await
    }

    /// Hands the message back for immediate redelivery (deadline `0`).
    pub async fn release(&self, subscription: &str, message: &Message) -> Result<(), GatewayError> {
        self.modify_ack_deadline(subscription, message, 0).await
    }
}
