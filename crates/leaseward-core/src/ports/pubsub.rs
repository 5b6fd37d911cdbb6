//! PubSubClient port - the queue backend.
//!
//! The gateways in [`crate::gateway`] own validation and handle caching;
//! implementations of this trait only move bytes. Every call takes names that
//! the gateway has already confirmed exist, and ack deadlines that are
//! already range-checked ([`AckDeadline`] cannot hold anything else).

use async_trait::async_trait;

use crate::domain::{AckDeadline, AckId, GatewayError, Message, OutboundMessage};
use crate::gateway::{PublishOptions, PullOptions};

/// Queue backend (pull, ack, lease changes, publish).
///
/// # Thread Safety
/// - `Send + Sync` so one client can back several gateways
#[async_trait]
pub trait PubSubClient: Send + Sync {
    async fn subscription_exists(&self, subscription: &str) -> Result<bool, GatewayError>;

    async fn topic_exists(&self, topic: &str) -> Result<bool, GatewayError>;

    /// Returns up to `options.max_messages` messages, in queue order. An
    /// empty vector means the subscription currently has nothing to deliver.
    async fn pull(
        &self,
        subscription: &str,
        options: &PullOptions,
    ) -> Result<Vec<Message>, GatewayError>;

    async fn acknowledge(&self, subscription: &str, ack_ids: &[AckId]) -> Result<(), GatewayError>;

    /// Sets the redelivery deadline of each message to `now + deadline`.
    async fn modify_ack_deadline(
        &self,
        subscription: &str,
        ack_ids: &[AckId],
        deadline: AckDeadline,
    ) -> Result<(), GatewayError>;

    /// Returns the ids the backend assigned, in input order.
    async fn publish(
        &self,
        topic: &str,
        messages: Vec<OutboundMessage>,
        options: &PublishOptions,
    ) -> Result<Vec<String>, GatewayError>;
}
