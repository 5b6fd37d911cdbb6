//! Re-emits worker output through the consumer's own logger.

use tracing::Level;

use crate::domain::LogRecord;
use crate::logparse::LogParser;
use crate::ports::WorkerOutput;

/// Maps a free-form record level onto a tracing level.
///
/// Syslog/PSR levels above `error` collapse to ERROR, `notice` to INFO.
/// Empty or unknown levels are INFO.
pub fn tracing_level(level: &str) -> Level {
    match level.trim().to_ascii_lowercase().as_str() {
        "emergency" | "emerg" | "alert" | "critical" | "crit" | "error" | "err" | "fatal" => {
            Level::ERROR
        }
        "warning" | "warn" => Level::WARN,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}

macro_rules! emit_at {
    ($level:expr, $record:expr, $timestamp:expr, $context:expr) => {
        tracing::event!(
            $level,
            worker_level = $record.level(),
            channel = $record.channel().unwrap_or_default(),
            timestamp = %$timestamp,
            context = %$context,
            "{}",
            $record.message()
        )
    };
}

/// Logs one record. `extra` ends up nested in the context under `extra`.
pub fn emit(record: &LogRecord) {
    let timestamp = record
        .timestamp()
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();
    let context = serde_json::Value::Object(record.merged_context());

    let level = tracing_level(record.level());
    if level == Level::ERROR {
        emit_at!(Level::ERROR, record, timestamp, context);
    } else if level == Level::WARN {
        emit_at!(Level::WARN, record, timestamp, context);
    } else if level == Level::DEBUG {
        emit_at!(Level::DEBUG, record, timestamp, context);
    } else if level == Level::TRACE {
        emit_at!(Level::TRACE, record, timestamp, context);
    } else {
        emit_at!(Level::INFO, record, timestamp, context);
    }
}

/// Parses every non-blank output line and logs it. Returns the line count.
pub fn reingest(parser: &LogParser, output: &WorkerOutput) -> usize {
    let mut count = 0;
    for line in output.lines() {
        emit(&parser.parse(line));
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tracing_test::traced_test;

    #[rstest]
    #[case("ERROR", Level::ERROR)]
    #[case("critical", Level::ERROR)]
    #[case("Warning", Level::WARN)]
    #[case("NOTICE", Level::INFO)]
    #[case("", Level::INFO)]
    #[case("debug", Level::DEBUG)]
    fn maps_levels(#[case] level: &str, #[case] expected: Level) {
        assert_eq!(tracing_level(level), expected);
    }

    #[traced_test]
    #[test]
    fn worker_lines_are_re_emitted_with_context() {
        let output = WorkerOutput {
            output: concat!(
                r#"{"severity":"WARNING","message":"disk almost full","channel":"app","context":{"free":3},"extra":{"host":"w1"}}"#,
                "\n\n",
                "plain text line\n",
            )
            .to_string(),
            success: true,
            exit_code: Some(0),
        };

        let count = reingest(&LogParser::new(), &output);

        assert_eq!(count, 2);
        assert!(logs_contain("disk almost full"));
        assert!(logs_contain("channel=\"app\""));
        assert!(logs_contain(r#"{"free":3,"extra":{"host":"w1"}}"#));
        assert!(logs_contain("plain text line"));
    }
}
