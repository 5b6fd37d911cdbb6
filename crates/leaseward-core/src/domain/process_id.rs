//! ProcessId - correlation id stamped on every log line of a consumer cycle.

use std::fmt;

use chrono::Utc;

/// `<unix seconds>-<8 hex chars>`, e.g. `1704067200-9f86d081`.
///
/// The consumer regenerates it at the start of each cycle so the log lines of
/// one message (including the re-emitted worker lines) share one id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessId(String);

impl ProcessId {
    pub fn generate() -> Self {
        let secs = Utc::now().timestamp();
        let suffix: u32 = rand::random();
        Self(format!("{secs}-{suffix:08x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_seconds_and_hex_suffix() {
        let id = ProcessId::generate();
        let (secs, suffix) = id.as_str().split_once('-').unwrap();
        assert!(secs.parse::<i64>().unwrap() > 0);
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn regenerated_ids_differ() {
        // 32 random bits: a collision here is not a realistic outcome
        assert_ne!(ProcessId::generate(), ProcessId::generate());
    }
}
