//! Recognised textual line formats and timestamp parsing.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

/// `[<datetime>] <channel>.<level>: <message> <context> <extra>`
///
/// Context and extra are a JSON-ish object or the literal `[]`.
pub(super) static CHANNEL_LEVEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\[(?P<datetime>.*?)\] (?P<channel>.*?)\.(?P<level>.*?): (?P<message>.*?) (?P<context>\{.*?\}|\[\]) (?P<extra>\{.*?\}|\[\])$",
    )
    .expect("channel.level pattern is valid")
});

/// `<timestamp> <LEVEL> [<channel>] <message> [<context>] [<extra>]`
///
/// Context and extra are optional trailing brackets (`{...}` or `[...]`).
pub(super) static LEVEL_CHANNEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<datetime>\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})?) (?P<level>[A-Za-z]+) \[(?P<channel>[^\]]*)\] (?P<message>.*?)(?: (?P<context>\{.*?\}|\[.*?\]))?(?: (?P<extra>\{.*?\}|\[.*?\]))?$",
    )
    .expect("level [channel] pattern is valid")
});

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S,%f",
];

/// Parses the timestamp flavours loggers commonly emit. Timestamps without
/// an offset are taken as UTC. Returns `None` for empty or unknown input.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::rfc3339_z("2024-01-01T00:00:00Z")]
    #[case::rfc3339_offset("2024-01-01T01:00:00+01:00")]
    #[case::space_offset("2024-01-01 01:00:00+01:00")]
    #[case::compact_offset("2024-01-01T01:00:00+0100")]
    #[case::naive("2024-01-01 00:00:00")]
    #[case::naive_t("2024-01-01T00:00:00")]
    #[case::fraction("2024-01-01T00:00:00.000000+00:00")]
    fn parses_midnight_utc(#[case] raw: &str) {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp(raw), Some(expected));
    }

    #[rstest]
    #[case::empty("")]
    #[case::blank("   ")]
    #[case::garbage("yesterday")]
    fn rejects_unknown(#[case] raw: &str) {
        assert_eq!(parse_timestamp(raw), None);
    }

    #[test]
    fn channel_level_matches_monolog_line() {
        let caps = CHANNEL_LEVEL
            .captures(r#"[2024-01-01T00:00:00+00:00] app.INFO: hello {"a":{"b":1}} []"#)
            .unwrap();
        assert_eq!(&caps["channel"], "app");
        assert_eq!(&caps["level"], "INFO");
        assert_eq!(&caps["message"], "hello");
        assert_eq!(&caps["context"], r#"{"a":{"b":1}}"#);
        assert_eq!(&caps["extra"], "[]");
    }

    #[test]
    fn level_channel_extra_is_optional() {
        let caps = LEVEL_CHANNEL
            .captures(r#"2024-01-01 00:00:00 WARNING [worker] disk almost full {"pct":91}"#)
            .unwrap();
        assert_eq!(&caps["level"], "WARNING");
        assert_eq!(&caps["channel"], "worker");
        assert_eq!(&caps["message"], "disk almost full");
        assert_eq!(&caps["context"], r#"{"pct":91}"#);
        assert!(caps.name("extra").is_none());
    }
}
