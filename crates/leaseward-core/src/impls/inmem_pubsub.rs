//! InMemoryPubSub - an in-process queue backend for development and tests.
//!
//! Lease semantics follow a real pull subscription:
//! - a pulled message is in flight until its deadline passes, then it is
//!   delivered again (with `delivery_attempt` incremented)
//! - `modify_ack_deadline(0)` puts it back at the head of the queue at once
//! - acking an unknown or expired ack id is a `BadRequest`
//!
//! Every client call is recorded in a journal ([`ClientCall`]) so tests can
//! assert exactly which RPCs the gateways and the consumer issued. The journal
//! and the per-topic publish log keep only the most recent entries
//! ([`DEFAULT_JOURNAL_CAPACITY`]), so a long-running consumer stays bounded.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::Instant;
use ulid::Ulid;

use crate::domain::{AckDeadline, AckId, GatewayError, Message, OutboundMessage};
use crate::gateway::{PublishOptions, PullOptions};
use crate::ports::PubSubClient;

/// Deadline given to a freshly pulled message.
pub const DEFAULT_ACK_DEADLINE: Duration = Duration::from_secs(10);

const DEFAULT_MAX_MESSAGES: u32 = 100;

/// Entries kept in the call journal and in each topic's publish log.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 1024;

/// One recorded client call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCall {
    SubscriptionExists(String),
    TopicExists(String),
    Pull {
        subscription: String,
        max_messages: u32,
    },
    Acknowledge {
        subscription: String,
        ack_ids: Vec<AckId>,
    },
    ModifyAckDeadline {
        subscription: String,
        ack_ids: Vec<AckId>,
        seconds: u32,
    },
    Publish {
        topic: String,
        count: usize,
        ordered: bool,
    },
}

#[derive(Debug, Clone)]
struct Stored {
    seq: u64,
    message_id: String,
    data: Vec<u8>,
    attributes: BTreeMap<String, String>,
    ordering_key: Option<String>,
    publish_time: DateTime<Utc>,
    deliveries: u32,
}

#[derive(Debug)]
struct InFlight {
    stored: Stored,
    deadline: Instant,
}

#[derive(Debug)]
struct SubscriptionState {
    ready: VecDeque<Stored>,
    in_flight: HashMap<AckId, InFlight>,
    ack_deadline: Duration,
    acked: usize,
}

impl SubscriptionState {
    fn new() -> Self {
        Self {
            ready: VecDeque::new(),
            in_flight: HashMap::new(),
            ack_deadline: DEFAULT_ACK_DEADLINE,
            acked: 0,
        }
    }

    /// Moves leases that ran out back to the queue head, oldest first.
    fn requeue_expired(&mut self, now: Instant) {
        let expired: Vec<AckId> = self
            .in_flight
            .iter()
            .filter(|(_, f)| f.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        let mut stored: Vec<Stored> = expired
            .iter()
            .filter_map(|id| self.in_flight.remove(id))
            .map(|f| f.stored)
            .collect();
        stored.sort_by_key(|s| std::cmp::Reverse(s.seq));
        for s in stored {
            self.ready.push_front(s);
        }
    }

    /// Removes a live lease, or reports the id as unknown/expired.
    fn take_live(&mut self, ack_id: &AckId, now: Instant) -> Option<InFlight> {
        let flight = self.in_flight.remove(ack_id)?;
        if flight.deadline <= now {
            self.ready.push_front(flight.stored);
            return None;
        }
        Some(flight)
    }
}

#[derive(Debug)]
struct State {
    subscriptions: HashMap<String, SubscriptionState>,
    /// topic -> bound subscriptions
    topics: HashMap<String, Vec<String>>,
    published: HashMap<String, VecDeque<OutboundMessage>>,
    calls: VecDeque<ClientCall>,
    journal_capacity: usize,
    next_seq: u64,
    fail_modify_ack_deadline: bool,
}

impl Default for State {
    fn default() -> Self {
        Self {
            subscriptions: HashMap::new(),
            topics: HashMap::new(),
            published: HashMap::new(),
            calls: VecDeque::new(),
            journal_capacity: DEFAULT_JOURNAL_CAPACITY,
            next_seq: 0,
            fail_modify_ack_deadline: false,
        }
    }
}

/// Appends to a ring of at most `capacity` entries, dropping the oldest.
fn push_bounded<T>(ring: &mut VecDeque<T>, capacity: usize, item: T) {
    if capacity == 0 {
        return;
    }
    while ring.len() >= capacity {
        ring.pop_front();
    }
    ring.push_back(item);
}

impl State {
    fn record(&mut self, call: ClientCall) {
        push_bounded(&mut self.calls, self.journal_capacity, call);
    }

    fn subscription_mut(&mut self, name: &str) -> Result<&mut SubscriptionState, GatewayError> {
        self.subscriptions
            .get_mut(name)
            .ok_or_else(|| GatewayError::UnknownSubscription(name.to_string()))
    }

    fn store(&mut self, message: &OutboundMessage) -> Stored {
        self.next_seq += 1;
        Stored {
            seq: self.next_seq,
            message_id: Ulid::new().to_string(),
            data: message.data.clone(),
            attributes: message.attributes.clone(),
            ordering_key: message.ordering_key.clone(),
            publish_time: Utc::now(),
            deliveries: 0,
        }
    }
}

/// In-process [`PubSubClient`].
#[derive(Debug, Default)]
pub struct InMemoryPubSub {
    state: Mutex<State>,
}

impl InMemoryPubSub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `capacity` journal and publish-log entries; `0` turns
    /// both off.
    pub fn with_journal_capacity(capacity: usize) -> Self {
        let state = State {
            journal_capacity: capacity,
            ..State::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    pub async fn create_subscription(&self, name: &str) {
        let mut state = self.state.lock().await;
        state
            .subscriptions
            .entry(name.to_string())
            .or_insert_with(SubscriptionState::new);
    }

    pub async fn create_topic(&self, name: &str) {
        let mut state = self.state.lock().await;
        state.topics.entry(name.to_string()).or_default();
    }

    /// Creates `subscription` (if needed) and routes `topic` into it.
    pub async fn bind(&self, topic: &str, subscription: &str) {
        let mut state = self.state.lock().await;
        state
            .subscriptions
            .entry(subscription.to_string())
            .or_insert_with(SubscriptionState::new);
        let bound = state.topics.entry(topic.to_string()).or_default();
        if !bound.iter().any(|s| s == subscription) {
            bound.push(subscription.to_string());
        }
    }

    pub async fn set_ack_deadline(&self, subscription: &str, deadline: Duration) {
        let mut state = self.state.lock().await;
        if let Some(sub) = state.subscriptions.get_mut(subscription) {
            sub.ack_deadline = deadline;
        }
    }

    /// Enqueues a message directly on a subscription. Returns its id.
    pub async fn push_message(&self, subscription: &str, message: OutboundMessage) -> String {
        let mut state = self.state.lock().await;
        let stored = state.store(&message);
        let id = stored.message_id.clone();
        state
            .subscriptions
            .entry(subscription.to_string())
            .or_insert_with(SubscriptionState::new)
            .ready
            .push_back(stored);
        id
    }

    pub async fn push(&self, subscription: &str, data: &str) -> String {
        self.push_message(subscription, OutboundMessage::new(data))
            .await
    }

    /// Makes every following `modify_ack_deadline` call fail with a
    /// transport error (or stop failing).
    pub async fn fail_modify_ack_deadline(&self, fail: bool) {
        self.state.lock().await.fail_modify_ack_deadline = fail;
    }

    pub async fn calls(&self) -> Vec<ClientCall> {
        self.state.lock().await.calls.iter().cloned().collect()
    }

    pub async fn ready(&self, subscription: &str) -> usize {
        let state = self.state.lock().await;
        state.subscriptions.get(subscription).map_or(0, |s| s.ready.len())
    }

    pub async fn in_flight(&self, subscription: &str) -> usize {
        let state = self.state.lock().await;
        state
            .subscriptions
            .get(subscription)
            .map_or(0, |s| s.in_flight.len())
    }

    pub async fn acked(&self, subscription: &str) -> usize {
        let state = self.state.lock().await;
        state.subscriptions.get(subscription).map_or(0, |s| s.acked)
    }

    pub async fn published(&self, topic: &str) -> Vec<OutboundMessage> {
        let state = self.state.lock().await;
        state
            .published
            .get(topic)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PubSubClient for InMemoryPubSub {
    async fn subscription_exists(&self, subscription: &str) -> Result<bool, GatewayError> {
        let mut state = self.state.lock().await;
        state.record(ClientCall::SubscriptionExists(subscription.to_string()));
        Ok(state.subscriptions.contains_key(subscription))
    }

    async fn topic_exists(&self, topic: &str) -> Result<bool, GatewayError> {
        let mut state = self.state.lock().await;
        state.record(ClientCall::TopicExists(topic.to_string()));
        Ok(state.topics.contains_key(topic))
    }

    async fn pull(
        &self,
        subscription: &str,
        options: &PullOptions,
    ) -> Result<Vec<Message>, GatewayError> {
        let max_messages = options.max_messages.unwrap_or(DEFAULT_MAX_MESSAGES);
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.record(ClientCall::Pull {
            subscription: subscription.to_string(),
            max_messages,
        });

        let sub = state.subscription_mut(subscription)?;
        sub.requeue_expired(now);

        let mut delivered = Vec::new();
        while delivered.len() < max_messages as usize {
            let Some(mut stored) = sub.ready.pop_front() else {
                break;
            };
            stored.deliveries += 1;
            let ack_id = AckId::new(Ulid::new().to_string());
            let message = Message::new(stored.message_id.clone(), ack_id.clone(), stored.data.clone())
                .with_attributes(stored.attributes.clone())
                .with_ordering_key(stored.ordering_key.clone())
                .with_publish_time(stored.publish_time)
                .with_delivery_attempt(stored.deliveries);
            sub.in_flight.insert(
                ack_id,
                InFlight {
                    stored,
                    deadline: now + sub.ack_deadline,
                },
            );
            delivered.push(message);
        }
        Ok(delivered)
    }

    async fn acknowledge(&self, subscription: &str, ack_ids: &[AckId]) -> Result<(), GatewayError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.record(ClientCall::Acknowledge {
            subscription: subscription.to_string(),
            ack_ids: ack_ids.to_vec(),
        });

        let sub = state.subscription_mut(subscription)?;
        let mut rejected = Vec::new();
        for ack_id in ack_ids {
            match sub.take_live(ack_id, now) {
                Some(_) => sub.acked += 1,
                None => rejected.push(ack_id.to_string()),
            }
        }
        if !rejected.is_empty() {
            return Err(GatewayError::BadRequest(format!(
                "unknown or expired ack ids: {}",
                rejected.join(", ")
            )));
        }
        Ok(())
    }

    async fn modify_ack_deadline(
        &self,
        subscription: &str,
        ack_ids: &[AckId],
        deadline: AckDeadline,
    ) -> Result<(), GatewayError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.record(ClientCall::ModifyAckDeadline {
            subscription: subscription.to_string(),
            ack_ids: ack_ids.to_vec(),
            seconds: deadline.as_secs(),
        });
        if state.fail_modify_ack_deadline {
            return Err(GatewayError::Transport("connection reset".to_string()));
        }

        let sub = state.subscription_mut(subscription)?;
        let mut rejected = Vec::new();
        for ack_id in ack_ids {
            let Some(mut flight) = sub.take_live(ack_id, now) else {
                rejected.push(ack_id.to_string());
                continue;
            };
            if deadline.is_release() {
                sub.ready.push_front(flight.stored);
            } else {
                flight.deadline = now + deadline.as_duration();
                sub.in_flight.insert(ack_id.clone(), flight);
            }
        }
        if !rejected.is_empty() {
            return Err(GatewayError::BadRequest(format!(
                "unknown or expired ack ids: {}",
                rejected.join(", ")
            )));
        }
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        messages: Vec<OutboundMessage>,
        options: &PublishOptions,
    ) -> Result<Vec<String>, GatewayError> {
        let mut state = self.state.lock().await;
        state.record(ClientCall::Publish {
            topic: topic.to_string(),
            count: messages.len(),
            ordered: options.enable_message_ordering.unwrap_or(false),
        });

        let Some(bound) = state.topics.get(topic).cloned() else {
            return Err(GatewayError::UnknownTopic(topic.to_string()));
        };

        let mut ids = Vec::with_capacity(messages.len());
        for message in &messages {
            let stored = state.store(message);
            ids.push(stored.message_id.clone());
            for name in &bound {
                if let Some(sub) = state.subscriptions.get_mut(name) {
                    sub.ready.push_back(stored.clone());
                }
            }
        }
        let capacity = state.journal_capacity;
        let log = state.published.entry(topic.to_string()).or_default();
        for message in messages {
            push_bounded(log, capacity, message);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expired_lease_is_redelivered() {
        let client = InMemoryPubSub::new();
        client.create_subscription("s").await;
        client.push("s", "payload").await;
        let opts = PullOptions::default().max_messages(1);

        let first = client.pull("s", &opts).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(client.pull("s", &opts).await.unwrap().is_empty());

        tokio::time::advance(DEFAULT_ACK_DEADLINE + Duration::from_millis(1)).await;

        let again = client.pull("s", &opts).await.unwrap();
        assert_eq!(again[0].message_id(), first[0].message_id());
        assert_eq!(again[0].delivery_attempt(), 2);
        assert_ne!(again[0].ack_id(), first[0].ack_id());
    }

    #[tokio::test(start_paused = true)]
    async fn extension_keeps_message_leased() {
        let client = InMemoryPubSub::new();
        client.create_subscription("s").await;
        client.push("s", "payload").await;
        let opts = PullOptions::default();

        let msg = client.pull("s", &opts).await.unwrap().remove(0);
        tokio::time::advance(Duration::from_secs(8)).await;
        client
            .modify_ack_deadline("s", std::slice::from_ref(msg.ack_id()), AckDeadline::new(10).unwrap())
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(8)).await;

        assert!(client.pull("s", &opts).await.unwrap().is_empty());
        client
            .acknowledge("s", std::slice::from_ref(msg.ack_id()))
            .await
            .unwrap();
        assert_eq!(client.acked("s").await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ack_after_expiry_is_rejected() {
        let client = InMemoryPubSub::new();
        client.create_subscription("s").await;
        client.push("s", "payload").await;

        let msg = client.pull("s", &PullOptions::default()).await.unwrap().remove(0);
        tokio::time::advance(Duration::from_secs(11)).await;

        let err = client
            .acknowledge("s", std::slice::from_ref(msg.ack_id()))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
        assert_eq!(client.ready("s").await, 1);
    }

    #[tokio::test]
    async fn publish_fans_out_to_bound_subscriptions() {
        let client = InMemoryPubSub::new();
        client.bind("events", "audit").await;
        client.bind("events", "mailer").await;

        let ids = client
            .publish("events", vec![OutboundMessage::new("e1")], &PublishOptions::default())
            .await
            .unwrap();

        assert_eq!(ids.len(), 1);
        assert_eq!(client.ready("audit").await, 1);
        assert_eq!(client.ready("mailer").await, 1);
        assert_eq!(client.published("events").await.len(), 1);
    }

    #[tokio::test]
    async fn journal_keeps_only_recent_entries() {
        let client = InMemoryPubSub::with_journal_capacity(3);
        client.bind("events", "audit").await;

        for n in 0..5 {
            client
                .publish("events", vec![OutboundMessage::new(format!("e{n}"))], &PublishOptions::default())
                .await
                .unwrap();
        }
        client.topic_exists("events").await.unwrap();

        let calls = client.calls().await;
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[2], ClientCall::TopicExists("events".to_string()));

        let published: Vec<_> = client
            .published("events")
            .await
            .into_iter()
            .map(|m| m.data)
            .collect();
        assert_eq!(published, vec![b"e2".to_vec(), b"e3".to_vec(), b"e4".to_vec()]);
        // delivery is never affected by the journal
        assert_eq!(client.ready("audit").await, 5);
    }

    #[tokio::test]
    async fn zero_capacity_disables_the_journal() {
        let client = InMemoryPubSub::with_journal_capacity(0);
        client.create_subscription("s").await;
        client.push("s", "payload").await;

        assert_eq!(client.pull("s", &PullOptions::default()).await.unwrap().len(), 1);
        assert!(client.calls().await.is_empty());
    }
}
