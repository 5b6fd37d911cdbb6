//! Per-call and default options for pull and publish.
//!
//! Both follow the same rule: a value set on the call wins, anything left
//! unset falls back to the gateway-level default.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_messages: Option<u32>,
    /// Return at once when nothing is available instead of waiting briefly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_immediately: Option<bool>,
}

impl PullOptions {
    pub fn max_messages(mut self, n: u32) -> Self {
        self.max_messages = Some(n);
        self
    }

    pub fn return_immediately(mut self, yes: bool) -> Self {
        self.return_immediately = Some(yes);
        self
    }

    pub fn merged_over(&self, defaults: &PullOptions) -> PullOptions {
        PullOptions {
            max_messages: self.max_messages.or(defaults.max_messages),
            return_immediately: self.return_immediately.or(defaults.return_immediately),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_message_ordering: Option<bool>,
}

impl PublishOptions {
    pub fn enable_message_ordering(mut self, yes: bool) -> Self {
        self.enable_message_ordering = Some(yes);
        self
    }

    pub fn merged_over(&self, defaults: &PublishOptions) -> PublishOptions {
        PublishOptions {
            enable_message_ordering: self
                .enable_message_ordering
                .or(defaults.enable_message_ordering),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_options_win_over_defaults() {
        let defaults = PullOptions::default().max_messages(10).return_immediately(true);
        let call = PullOptions::default().max_messages(1);
        let merged = call.merged_over(&defaults);
        assert_eq!(merged.max_messages, Some(1));
        assert_eq!(merged.return_immediately, Some(true));
    }

    #[test]
    fn publish_defaults_fill_gaps() {
        let defaults = PublishOptions::default().enable_message_ordering(false);
        assert_eq!(
            PublishOptions::default().merged_over(&defaults).enable_message_ordering,
            Some(false)
        );
        assert_eq!(
            PublishOptions::default()
                .enable_message_ordering(true)
                .merged_over(&defaults)
                .enable_message_ordering,
            Some(true)
        );
    }
}
