//! Gateways - validated, cached access to the queue backend.
//!
//! - [`SubscriptionGateway`]: pull, acknowledge, lease changes
//! - [`TopicGateway`]: message building and publishing
//!
//! Both sit in front of a shared [`crate::ports::PubSubClient`]. Handles are
//! resolved lazily, checked for existence once, and cached for the lifetime
//! of the gateway.

pub mod options;
pub mod subscription;
pub mod topic;

pub use self::options::{PublishOptions, PullOptions};
pub use self::subscription::{Subscription, SubscriptionGateway};
pub use self::topic::{CONTENT_TYPE, JSON_CONTENT_TYPE, Topic, TopicGateway, build_message};
