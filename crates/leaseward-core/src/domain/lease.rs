//! Lease / ack deadline.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::GatewayError;

/// A validated ack deadline extension, in seconds.
///
/// Only values in `[0, 600]` can be built, so anything that reaches a queue
/// client has already been checked. `0` releases the message for immediate
/// redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct AckDeadline(u32);

impl AckDeadline {
    pub const MAX_SECS: i64 = 600;

    pub const RELEASE: AckDeadline = AckDeadline(0);

    pub fn new(seconds: i64) -> Result<Self, GatewayError> {
        if !(0..=Self::MAX_SECS).contains(&seconds) {
            return Err(GatewayError::InvalidLeaseExtension(seconds));
        }
        Ok(Self(seconds as u32))
    }

    pub fn as_secs(&self) -> u32 {
        self.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.0))
    }

    pub fn is_release(&self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<i64> for AckDeadline {
    type Error = GatewayError;

    fn try_from(seconds: i64) -> Result<Self, Self::Error> {
        Self::new(seconds)
    }
}

impl From<AckDeadline> for u32 {
    fn from(deadline: AckDeadline) -> Self {
        deadline.0
    }
}

impl fmt::Display for AckDeadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::zero(0)]
    #[case::default_renewal(10)]
    #[case::max(600)]
    fn accepts_bounds(#[case] seconds: i64) {
        let deadline = AckDeadline::new(seconds).unwrap();
        assert_eq!(i64::from(deadline.as_secs()), seconds);
    }

    #[rstest]
    #[case::negative(-1)]
    #[case::just_above(601)]
    #[case::huge(i64::MAX)]
    #[case::very_negative(i64::MIN)]
    fn rejects_out_of_range(#[case] seconds: i64) {
        let err = AckDeadline::new(seconds).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidLeaseExtension(s) if s == seconds));
    }

    #[test]
    fn release_is_zero() {
        assert!(AckDeadline::RELEASE.is_release());
        assert_eq!(AckDeadline::RELEASE.as_duration(), Duration::ZERO);
    }

    #[test]
    fn deserialization_validates() {
        let ok: AckDeadline = serde_json::from_str("30").unwrap();
        assert_eq!(ok.as_secs(), 30);
        assert!(serde_json::from_str::<AckDeadline>("900").is_err());
    }
}
