use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use leaseward_core::app::{ConsumerLoop, LoopConfig, cancel_on_signal};
use leaseward_core::domain::OutboundMessage;
use leaseward_core::gateway::{PublishOptions, TopicGateway};
use leaseward_core::impls::{CommandLauncher, CommandSpec, InMemoryPubSub, PayloadMode};
use leaseward_core::logparse::LogParser;

type CliResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

#[derive(Parser, Debug)]
#[command(name = "leaseward", version)]
#[command(about = "Lease-renewing message consumer that delegates each message to a worker process")]
struct Cli {
    /// Log filter, overridden by RUST_LOG.
    #[arg(long, env = "LEASEWARD_LOG", default_value = "info", global = true)]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Consume a subscription of the in-memory backend, one worker per message.
    Consume(ConsumeArgs),
    /// Read log lines on stdin and print the parsed records as JSON lines.
    ParseLog(ParseLogArgs),
}

#[derive(Args, Debug)]
struct ConsumeArgs {
    #[arg(long, short = 's', env = "LEASEWARD_SUBSCRIPTION")]
    subscription: String,

    /// Topic the seed messages are published to; defaults to the subscription name.
    #[arg(long)]
    topic: Option<String>,

    /// Total runtime budget in seconds, checked between messages.
    #[arg(long, short = 't', env = "LEASEWARD_TIMEOUT", default_value_t = 900)]
    timeout: u64,

    /// Lease granted on each renewal, in seconds (1-600).
    #[arg(long, env = "LEASEWARD_ACK_DEADLINE", default_value_t = 10)]
    ack_deadline: i64,

    /// Sleep after an empty pull, in seconds (at least 1).
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    idle: u64,

    /// Memory limit in bytes for the usage warning (default: cgroup memory.max).
    #[arg(long)]
    memory_limit: Option<u64>,

    /// Decode non-JSON context/extra in worker logs as literals.
    #[arg(long)]
    relaxed_logs: bool,

    /// JSON-lines file of messages (`{"data": ..., "attributes": {...}}`) to publish first.
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Pass the payload as the last argument instead of on stdin.
    #[arg(long)]
    payload_as_arg: bool,

    /// Worker command and its arguments.
    #[arg(required = true, trailing_var_arg = true, num_args = 1..)]
    worker: Vec<String>,
}

#[derive(Args, Debug)]
struct ParseLogArgs {
    #[arg(long)]
    relaxed: bool,
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format);

    let result = match cli.command {
        Command::Consume(args) => consume(args).await,
        Command::ParseLog(args) => parse_log(args).await,
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "leaseward failed");
            ExitCode::FAILURE
        }
    }
}

async fn consume(args: ConsumeArgs) -> CliResult<()> {
    let config = LoopConfig::new(&args.subscription)
        .with_ack_deadline(args.ack_deadline)?
        .with_idle_interval(Duration::from_secs(args.idle))
        .with_worker_timeout(Duration::from_secs(args.timeout))
        .with_memory_limit(args.memory_limit)
        .with_relaxed_logs(args.relaxed_logs);

    let client = Arc::new(InMemoryPubSub::new());
    let topic = args.topic.as_deref().unwrap_or(&args.subscription);
    client.bind(topic, &args.subscription).await;

    if let Some(path) = &args.seed {
        let messages = read_seed(path).await?;
        let count = messages.len();
        TopicGateway::new(client.clone())
            .publish_batch(topic, messages, PublishOptions::default())
            .await?;
        info!(topic, count, seed = %path.display(), "seed messages published");
    }

    // output still read after exit must fit in the lease granted by the last renewal
    let launcher = CommandLauncher::new(worker_spec(&args.worker, args.payload_as_arg)?)
        .with_drain_grace(config.renewal_interval());

    let shutdown = CancellationToken::new();
    let signals = cancel_on_signal(shutdown.clone());

    let consumer = ConsumerLoop::builder(config)
        .client(client)
        .launcher(Arc::new(launcher))
        .shutdown(shutdown.clone())
        .build()?;
    let report = consumer.run().await;

    shutdown.cancel();
    signals.await?;
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

fn worker_spec(command: &[String], payload_as_arg: bool) -> CliResult<CommandSpec> {
    let (program, args) = command.split_first().ok_or("missing worker command")?;
    let mode = if payload_as_arg {
        PayloadMode::Argument
    } else {
        PayloadMode::Stdin
    };
    Ok(CommandSpec::new(program.as_str()).args(args.iter().cloned()).payload(mode))
}

async fn read_seed(path: &Path) -> CliResult<Vec<OutboundMessage>> {
    let text = tokio::fs::read_to_string(path).await?;
    parse_seed(&text)
}

fn parse_seed(text: &str) -> CliResult<Vec<OutboundMessage>> {
    let mut messages = Vec::new();
    for (n, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let message: OutboundMessage =
            serde_json::from_str(line).map_err(|e| format!("seed line {}: {e}", n + 1))?;
        messages.push(message);
    }
    Ok(messages)
}

async fn parse_log(args: ParseLogArgs) -> CliResult<()> {
    let parser = LogParser::new().with_relaxed(args.relaxed);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        println!("{}", serde_json::to_string(&parser.parse(&line))?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn consume_takes_a_trailing_worker_command() {
        let cli = Cli::try_parse_from([
            "leaseward",
            "consume",
            "--subscription",
            "jobs",
            "--timeout",
            "60",
            "php",
            "bin/console",
            "app:process",
            "--no-debug",
        ])
        .unwrap();
        let Command::Consume(args) = cli.command else {
            panic!("expected consume");
        };
        assert_eq!(args.timeout, 60);
        assert_eq!(args.ack_deadline, 10);
        assert_eq!(args.worker, vec!["php", "bin/console", "app:process", "--no-debug"]);

        let spec = worker_spec(&args.worker, false).unwrap();
        assert_eq!(spec.program, "php");
        assert_eq!(spec.args, vec!["bin/console", "app:process", "--no-debug"]);
        assert_eq!(spec.payload, PayloadMode::Stdin);
    }

    #[test]
    fn zero_idle_is_rejected() {
        let res = Cli::try_parse_from(["leaseward", "consume", "-s", "jobs", "--idle", "0", "true"]);
        assert!(res.is_err());

        let cli = Cli::try_parse_from(["leaseward", "consume", "-s", "jobs", "--idle", "1", "true"])
            .unwrap();
        let Command::Consume(args) = cli.command else {
            panic!("expected consume");
        };
        assert_eq!(args.idle, 1);
    }

    #[test]
    fn seed_lines_are_outbound_messages() {
        let seed = "{\"data\":\"{\\\"id\\\":1}\",\"attributes\":{\"tenant\":\"acme\"}}\n\n{\"data\":\"b\",\"ordering_key\":\"k\"}\n";
        let messages = parse_seed(seed).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].data, br#"{"id":1}"#);
        assert_eq!(messages[0].attributes["tenant"], "acme");
        assert_eq!(messages[1].ordering_key.as_deref(), Some("k"));
    }

    #[test]
    fn bad_seed_line_is_reported_with_its_number() {
        let err = parse_seed("{\"data\":\"a\"}\nnot json\n").unwrap_err();
        assert!(err.to_string().starts_with("seed line 2:"));
    }
}
