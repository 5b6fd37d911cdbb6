//! CommandLauncher - runs each message through an external program.
//!
//! # Process contract
//! - payload on stdin (default) or appended as the last argument
//! - `LEASEWARD_MESSAGE_ID` and one `LEASEWARD_ATTR_<NAME>` per attribute in
//!   the environment
//! - stdout and stderr are drained in background tasks while the worker runs,
//!   so a chatty worker never blocks on a full pipe
//! - once the worker is reaped its output is collected for at most the drain
//!   grace period; a background child still holding the pipes cannot stall
//!   the cycle, and whatever was read by then is kept
//! - exit status 0 means success
//!
//! The child is not killed when its handle is dropped: cancellation stays
//! cooperative and a worker is always allowed to finish.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::{Message, WorkerError};
use crate::ports::{WorkerLauncher, WorkerOutput, WorkerProcess};

pub const MESSAGE_ID_ENV: &str = "LEASEWARD_MESSAGE_ID";
pub const ATTRIBUTE_ENV_PREFIX: &str = "LEASEWARD_ATTR_";

/// How long output is still read after the worker exited.
pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(2);

const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadMode {
    #[default]
    Stdin,
    Argument,
}

/// What to run for each message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub payload: PayloadMode,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            payload: PayloadMode::default(),
            env: BTreeMap::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn payload(mut self, mode: PayloadMode) -> Self {
        self.payload = mode;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// [`WorkerLauncher`] backed by `tokio::process`.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    spec: CommandSpec,
    drain_grace: Duration,
}

impl CommandLauncher {
    pub fn new(spec: CommandSpec) -> Self {
        Self {
            spec,
            drain_grace: DEFAULT_DRAIN_GRACE,
        }
    }

    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    fn command(&self, message: &Message) -> Command {
        let spec = &self.spec;
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        if spec.payload == PayloadMode::Argument {
            cmd.arg(message.data_str().into_owned());
        }
        cmd.envs(&spec.env);
        cmd.env(MESSAGE_ID_ENV, message.message_id());
        for (name, value) in message.attributes() {
            cmd.env(attribute_env_name(name), value);
        }
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }
        let stdin = match spec.payload {
            PayloadMode::Stdin => Stdio::piped(),
            PayloadMode::Argument => Stdio::null(),
        };
        cmd.stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);
        cmd
    }
}

impl WorkerLauncher for CommandLauncher {
    fn spawn(&self, message: &Message) -> Result<Box<dyn WorkerProcess>, WorkerError> {
        let mut child = self
            .command(message)
            .spawn()
            .map_err(|source| WorkerError::Spawn {
                program: self.spec.program.clone(),
                source,
            })?;
        debug!(
            program = %self.spec.program,
            pid = ?child.id(),
            message_id = message.message_id(),
            "worker spawned"
        );

        let stdin = child.stdin.take().map(|mut stdin| {
            let payload = message.data().to_vec();
            tokio::spawn(async move {
                stdin.write_all(&payload).await?;
                stdin.shutdown().await
            })
        });
        let stdout = child.stdout.take().map(Drain::spawn);
        let stderr = child.stderr.take().map(Drain::spawn);

        Ok(Box::new(CommandProcess {
            child,
            stdin,
            stdout,
            stderr,
            drain_grace: self.drain_grace,
        }))
    }
}

/// `order-id` → `LEASEWARD_ATTR_ORDER_ID`
pub fn attribute_env_name(attribute: &str) -> String {
    let suffix: String = attribute
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{ATTRIBUTE_ENV_PREFIX}{suffix}")
}

/// Reader task forwarding chunks of one output pipe.
struct Drain {
    chunks: mpsc::UnboundedReceiver<Vec<u8>>,
    task: JoinHandle<io::Result<()>>,
}

impl Drain {
    fn spawn<R: AsyncRead + Unpin + Send + 'static>(mut reader: R) -> Self {
        let (tx, chunks) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; READ_CHUNK];
            loop {
                let n = reader.read(&mut buf).await?;
                if n == 0 || tx.send(buf[..n].to_vec()).is_err() {
                    return Ok(());
                }
            }
        });
        Self { chunks, task }
    }

    /// Reads until EOF or `deadline`. On the deadline the reader is aborted
    /// and the chunks received so far are returned.
    async fn collect(
        mut self,
        deadline: Instant,
        stream: &'static str,
    ) -> Result<Vec<u8>, WorkerError> {
        let mut out = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, self.chunks.recv()).await {
                Ok(Some(chunk)) => out.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(_) => {
                    self.task.abort();
                    while let Ok(chunk) = self.chunks.try_recv() {
                        out.extend_from_slice(&chunk);
                    }
                    warn!(stream, "worker exited but its output stayed open, output truncated");
                    return Ok(out);
                }
            }
        }
        self.task
            .await
            .map_err(|e| WorkerError::Reap(io::Error::other(e)))?
            .map_err(WorkerError::Reap)?;
        Ok(out)
    }
}

async fn collect(
    drain: Option<Drain>,
    deadline: Instant,
    stream: &'static str,
) -> Result<Vec<u8>, WorkerError> {
    match drain {
        Some(drain) => drain.collect(deadline, stream).await,
        None => Ok(Vec::new()),
    }
}

struct CommandProcess {
    child: Child,
    stdin: Option<JoinHandle<io::Result<()>>>,
    stdout: Option<Drain>,
    stderr: Option<Drain>,
    drain_grace: Duration,
}

#[async_trait]
impl WorkerProcess for CommandProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn is_running(&mut self) -> Result<bool, WorkerError> {
        let status = self.child.try_wait().map_err(WorkerError::Poll)?;
        Ok(status.is_none())
    }

    async fn finish(mut self: Box<Self>) -> Result<WorkerOutput, WorkerError> {
        let status = self.child.wait().await.map_err(WorkerError::Reap)?;
        let deadline = Instant::now() + self.drain_grace;

        if let Some(mut task) = self.stdin.take() {
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(Ok(()))) => {}
                // the worker may exit without reading its input
                Ok(Ok(Err(e))) if e.kind() == io::ErrorKind::BrokenPipe => {}
                Ok(Ok(Err(e))) => return Err(WorkerError::Stdin(e)),
                Ok(Err(e)) => warn!(error = %e, "payload writer task failed"),
                Err(_) => {
                    task.abort();
                    warn!("worker exited before reading its whole payload");
                }
            }
        }

        let stdout = collect(self.stdout.take(), deadline, "stdout").await?;
        let stderr = collect(self.stderr.take(), deadline, "stderr").await?;

        let mut output = String::from_utf8_lossy(&stdout).into_owned();
        if !stderr.is_empty() {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&String::from_utf8_lossy(&stderr));
        }

        Ok(WorkerOutput {
            output,
            success: status.success(),
            exit_code: status.code(),
        })
    }
}
