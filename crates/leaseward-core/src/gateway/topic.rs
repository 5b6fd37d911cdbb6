//! TopicGateway - the publishing side.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use super::PublishOptions;
use crate::domain::{GatewayError, OutboundMessage};
use crate::ports::PubSubClient;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Handle to a topic whose existence has been confirmed.
#[derive(Debug, PartialEq, Eq)]
pub struct Topic {
    name: String,
}

impl Topic {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// JSON-encodes `data` into a message ready for publishing.
///
/// The payload is always JSON, so `Content-Type: application/json` replaces
/// any value the caller put in `attributes`.
pub fn build_message<T>(
    data: &T,
    mut attributes: BTreeMap<String, String>,
    ordering_key: Option<String>,
) -> Result<OutboundMessage, GatewayError>
where
    T: Serialize + ?Sized,
{
    let payload = serde_json::to_vec(data)
        .map_err(|e| GatewayError::BadRequest(format!("payload is not serializable: {e}")))?;
    attributes.insert(CONTENT_TYPE.to_string(), JSON_CONTENT_TYPE.to_string());
    Ok(OutboundMessage {
        data: payload,
        attributes,
        ordering_key,
    })
}

pub struct TopicGateway {
    client: Arc<dyn PubSubClient>,
    publish_defaults: PublishOptions,
    topics: Mutex<HashMap<String, Arc<Topic>>>,
}

impl TopicGateway {
    pub fn new(client: Arc<dyn PubSubClient>) -> Self {
        Self::with_publish_defaults(client, PublishOptions::default())
    }

    pub fn with_publish_defaults(
        client: Arc<dyn PubSubClient>,
        publish_defaults: PublishOptions,
    ) -> Self {
        Self {
            client,
            publish_defaults,
            topics: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached handle, or checks existence and caches a new one.
    pub async fn topic(&self, name: &str) -> Result<Arc<Topic>, GatewayError> {
        let mut cache = self.topics.lock().await;
        if let Some(handle) = cache.get(name) {
            return Ok(Arc::clone(handle));
        }

        if !self.client.topic_exists(name).await? {
            return Err(GatewayError::UnknownTopic(name.to_string()));
        }

        debug!(topic = name, "topic resolved");
        let handle = Arc::new(Topic {
            name: name.to_string(),
        });
        cache.insert(name.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Builds a JSON message from `data` and publishes it. Returns the id.
    pub async fn publish<T>(
        &self,
        topic: &str,
        data: &T,
        attributes: BTreeMap<String, String>,
        options: PublishOptions,
        ordering_key: Option<String>,
    ) -> Result<String, GatewayError>
    where
        T: Serialize + ?Sized,
    {
        let message = build_message(data, attributes, ordering_key)?;
        self.publish_message(topic, message, options).await
    }

    pub async fn publish_message(
        &self,
        topic: &str,
        message: OutboundMessage,
        options: PublishOptions,
    ) -> Result<String, GatewayError> {
        let mut ids = self.publish_batch(topic, vec![message], options).await?;
        ids.pop()
            .ok_or_else(|| GatewayError::Transport("publish returned no message id".to_string()))
    }

    /// Publishes several messages in one request.
    ///
    /// Ordering is switched on whenever one of them carries an ordering key;
    /// the backend drops keyed messages otherwise.
    pub async fn publish_batch(
        &self,
        topic: &str,
        messages: Vec<OutboundMessage>,
        options: PublishOptions,
    ) -> Result<Vec<String>, GatewayError> {
        let handle = self.topic(topic).await?;
        let mut options = options.merged_over(&self.publish_defaults);
        if messages.iter().any(|m| m.ordering_key.is_some()) {
            options.enable_message_ordering = Some(true);
        }
        debug!(
            topic = handle.name(),
            count = messages.len(),
            ordered = options.enable_message_ordering.unwrap_or(false),
            "publish"
        );
        self.client.publish(handle.name(), messages, &options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{ClientCall, InMemoryPubSub};
    use serde_json::json;

    async fn setup() -> (Arc<InMemoryPubSub>, TopicGateway) {
        let client = Arc::new(InMemoryPubSub::new());
        client.bind("orders", "orders-worker").await;
        let gateway = TopicGateway::new(client.clone());
        (client, gateway)
    }

    #[test]
    fn build_message_forces_json_content_type() {
        let mut attrs = BTreeMap::new();
        attrs.insert(CONTENT_TYPE.to_string(), "text/plain".to_string());
        attrs.insert("tenant".to_string(), "acme".to_string());

        let msg = build_message(&json!({"id": 7}), attrs, Some("user-7".into())).unwrap();

        assert_eq!(msg.data, br#"{"id":7}"#);
        assert_eq!(msg.attributes[CONTENT_TYPE], JSON_CONTENT_TYPE);
        assert_eq!(msg.attributes["tenant"], "acme");
        assert_eq!(msg.ordering_key.as_deref(), Some("user-7"));
    }

    #[tokio::test]
    async fn unknown_topic_is_never_cached() {
        let (client, gateway) = setup().await;
        for _ in 0..2 {
            let err = gateway.topic("missing").await.unwrap_err();
            assert!(matches!(err, GatewayError::UnknownTopic(ref n) if n == "missing"));
        }
        let checks = client
            .calls()
            .await
            .into_iter()
            .filter(|c| matches!(c, ClientCall::TopicExists(_)))
            .count();
        assert_eq!(checks, 2);
    }

    #[tokio::test]
    async fn topic_handle_is_cached() {
        let (client, gateway) = setup().await;
        let a = gateway.topic("orders").await.unwrap();
        let b = gateway.topic("orders").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(client.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn ordering_key_enables_message_ordering() {
        let (client, gateway) = setup().await;

        gateway
            .publish(
                "orders",
                &json!({"id": 1}),
                BTreeMap::new(),
                PublishOptions::default().enable_message_ordering(false),
                Some("user-1".into()),
            )
            .await
            .unwrap();
        gateway
            .publish_message("orders", OutboundMessage::new("plain"), PublishOptions::default())
            .await
            .unwrap();

        let publishes: Vec<_> = client
            .calls()
            .await
            .into_iter()
            .filter_map(|c| match c {
                ClientCall::Publish { ordered, .. } => Some(ordered),
                _ => None,
            })
            .collect();
        assert_eq!(publishes, vec![true, false]);
        assert_eq!(client.ready("orders-worker").await, 2);
    }

    #[tokio::test]
    async fn publish_batch_returns_ids_in_order() {
        let (client, gateway) = setup().await;
        let ids = gateway
            .publish_batch(
                "orders",
                vec![OutboundMessage::new("a"), OutboundMessage::new("b")],
                PublishOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        let published = client.published("orders").await;
        assert_eq!(published[0].data, b"a");
        assert_eq!(published[1].data, b"b");
    }
}
