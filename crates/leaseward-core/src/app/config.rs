//! LoopConfig - knobs of the consumer loop.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::AckDeadline;

pub const DEFAULT_ACK_DEADLINE_SECS: u32 = 10;
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_WORKER_TIMEOUT: Duration = Duration::from_secs(900);
pub const DEFAULT_MEMORY_WARNING_PERCENT: u8 = 70;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("subscription name must not be empty")]
    EmptySubscription,

    #[error("ack deadline must be between 1 and {max} seconds, got {0}", max = AckDeadline::MAX_SECS)]
    AckDeadline(i64),

    #[error("memory warning threshold must be between 1 and 100 percent, got {0}")]
    MemoryWarningPercent(u8),

    #[error("idle interval must be greater than zero")]
    IdleInterval,
}

/// Configuration of one [`super::ConsumerLoop`].
///
/// Durations are (de)serialized as whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopConfig {
    pub subscription: String,
    /// Lease granted on every renewal. The loop renews at half this period.
    #[serde(default = "default_ack_deadline")]
    pub ack_deadline: AckDeadline,
    /// Sleep after an empty pull. Never zero, an empty subscription would
    /// be polled in a tight loop.
    #[serde(default = "default_idle_interval", with = "secs")]
    pub idle_interval: Duration,
    /// Wall-clock budget of the whole run, checked between cycles.
    #[serde(default = "default_worker_timeout", with = "secs")]
    pub worker_timeout: Duration,
    #[serde(default = "default_memory_warning_percent")]
    pub memory_warning_percent: u8,
    /// Bytes. Falls back to the cgroup limit when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<u64>,
    /// Decode non-JSON context/extra in worker logs with the literal parser.
    #[serde(default)]
    pub relaxed_logs: bool,
}

fn default_ack_deadline() -> AckDeadline {
    // in range by construction
    AckDeadline::new(i64::from(DEFAULT_ACK_DEADLINE_SECS)).unwrap_or(AckDeadline::RELEASE)
}

fn default_idle_interval() -> Duration {
    DEFAULT_IDLE_INTERVAL
}

fn default_worker_timeout() -> Duration {
    DEFAULT_WORKER_TIMEOUT
}

fn default_memory_warning_percent() -> u8 {
    DEFAULT_MEMORY_WARNING_PERCENT
}

impl LoopConfig {
    pub fn new(subscription: impl Into<String>) -> Self {
        Self {
            subscription: subscription.into(),
            ack_deadline: default_ack_deadline(),
            idle_interval: DEFAULT_IDLE_INTERVAL,
            worker_timeout: DEFAULT_WORKER_TIMEOUT,
            memory_warning_percent: DEFAULT_MEMORY_WARNING_PERCENT,
            memory_limit: None,
            relaxed_logs: false,
        }
    }

    /// Fails for `seconds` outside `[1, 600]`; a zero lease would release
    /// the message on every renewal.
    pub fn with_ack_deadline(mut self, seconds: i64) -> Result<Self, ConfigError> {
        let deadline = AckDeadline::new(seconds).map_err(|_| ConfigError::AckDeadline(seconds))?;
        if deadline.is_release() {
            return Err(ConfigError::AckDeadline(seconds));
        }
        self.ack_deadline = deadline;
        Ok(self)
    }

    pub fn with_idle_interval(mut self, idle: Duration) -> Self {
        self.idle_interval = idle;
        self
    }

    pub fn with_worker_timeout(mut self, timeout: Duration) -> Self {
        self.worker_timeout = timeout;
        self
    }

    pub fn with_memory_warning_percent(mut self, percent: u8) -> Result<Self, ConfigError> {
        self.memory_warning_percent = percent;
        self.validate()?;
        Ok(self)
    }

    pub fn with_memory_limit(mut self, bytes: Option<u64>) -> Self {
        self.memory_limit = bytes;
        self
    }

    pub fn with_relaxed_logs(mut self, relaxed: bool) -> Self {
        self.relaxed_logs = relaxed;
        self
    }

    /// Re-checks every field; deserialized configs go through this before use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.subscription.trim().is_empty() {
            return Err(ConfigError::EmptySubscription);
        }
        if self.ack_deadline.is_release() {
            return Err(ConfigError::AckDeadline(0));
        }
        if self.idle_interval.is_zero() {
            return Err(ConfigError::IdleInterval);
        }
        if !(1..=100).contains(&self.memory_warning_percent) {
            return Err(ConfigError::MemoryWarningPercent(self.memory_warning_percent));
        }
        Ok(())
    }

    /// Sleep between two lease renewals.
    pub fn renewal_interval(&self) -> Duration {
        self.ack_deadline.as_duration() / 2
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn defaults() {
        let config = LoopConfig::new("jobs");
        assert_eq!(config.ack_deadline.as_secs(), 10);
        assert_eq!(config.renewal_interval(), Duration::from_secs(5));
        assert_eq!(config.idle_interval, Duration::from_secs(5));
        assert_eq!(config.worker_timeout, Duration::from_secs(900));
        assert_eq!(config.memory_warning_percent, 70);
        assert!(!config.relaxed_logs);
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case::zero(0)]
    #[case::negative(-5)]
    #[case::too_long(601)]
    fn ack_deadline_is_range_checked(#[case] seconds: i64) {
        let err = LoopConfig::new("jobs").with_ack_deadline(seconds).unwrap_err();
        assert_eq!(err, ConfigError::AckDeadline(seconds));
    }

    #[test]
    fn empty_subscription_is_rejected() {
        assert_eq!(
            LoopConfig::new("  ").validate(),
            Err(ConfigError::EmptySubscription)
        );
    }

    #[test]
    fn zero_idle_interval_is_rejected() {
        let config = LoopConfig::new("jobs").with_idle_interval(Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::IdleInterval));

        let res = serde_json::from_str::<LoopConfig>(r#"{"subscription":"jobs","idle_interval":0}"#)
            .map(|c| c.validate());
        assert_eq!(res.unwrap(), Err(ConfigError::IdleInterval));
    }

    #[test]
    fn memory_threshold_is_a_percentage() {
        assert!(LoopConfig::new("jobs").with_memory_warning_percent(100).is_ok());
        assert_eq!(
            LoopConfig::new("jobs").with_memory_warning_percent(0).unwrap_err(),
            ConfigError::MemoryWarningPercent(0)
        );
    }

    #[test]
    fn deserializes_with_defaults_and_seconds() {
        let config: LoopConfig =
            serde_json::from_str(r#"{"subscription":"jobs","ack_deadline":60,"worker_timeout":30}"#)
                .unwrap();
        assert_eq!(config.ack_deadline.as_secs(), 60);
        assert_eq!(config.worker_timeout, Duration::from_secs(30));
        assert_eq!(config.idle_interval, DEFAULT_IDLE_INTERVAL);
    }

    #[test]
    fn out_of_range_deadline_fails_to_deserialize() {
        let res = serde_json::from_str::<LoopConfig>(r#"{"subscription":"jobs","ack_deadline":900}"#);
        assert!(res.is_err());
    }
}
