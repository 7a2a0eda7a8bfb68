//! Process-execution substrate for the engine CLI
//!
//! Every orchestration step reduces to "spawn the docker binary with this
//! argument vector, capture streams, return the exit code". [`CommandRunner`]
//! is that primitive; [`CliRunner`] is the real implementation over
//! `tokio::process`. Tests swap in a scripted fake.

use std::fmt;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Error;

#[cfg(test)]
pub(crate) mod fake;

/// A single argument token. Masked tokens are redacted when displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Arg {
    value: String,
    masked: bool,
}

/// An ordered engine-CLI argument vector with per-token secret masking.
///
/// The engine binary itself is owned by the runner; an `ArgList` starts at
/// the subcommand (`run`, `exec`, `network`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgList {
    args: Vec<Arg>,
}

impl ArgList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from plain tokens, none masked.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Self::new();
        for t in tokens {
            list.add(t);
        }
        list
    }

    pub fn add(&mut self, value: impl Into<String>) -> &mut Self {
        self.args.push(Arg {
            value: value.into(),
            masked: false,
        });
        self
    }

    /// Append a token whose value must never appear in logs.
    pub fn add_masked(&mut self, value: impl Into<String>) -> &mut Self {
        self.args.push(Arg {
            value: value.into(),
            masked: true,
        });
        self
    }

    /// Append a flag and its value as two tokens.
    pub fn add_pair(&mut self, flag: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.add(flag);
        self.add(value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    /// Tokens in order, unredacted. For handing to the process builder.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.args.iter().map(|a| a.value.as_str())
    }

    /// `(token, masked)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.args.iter().map(|a| (a.value.as_str(), a.masked))
    }

    /// Append every token of `other`, preserving its mask flags.
    pub fn extend_from(&mut self, other: &ArgList) -> &mut Self {
        self.args.extend(other.args.iter().cloned());
        self
    }
}

impl fmt::Display for ArgList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            if arg.masked {
                f.write_str("********")?;
            } else {
                f.write_str(&arg.value)?;
            }
        }
        Ok(())
    }
}

/// Result of a completed engine invocation.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code; `-1` when the process was killed by a signal.
    pub status: i32,
    /// Captured stdout, undecoded beyond lossy UTF-8.
    pub stdout: String,
    /// Captured stderr, kept for diagnostics on failure.
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Where a delegated process's output stream goes.
pub enum OutputSink {
    /// Stream lines into the ambient build log (tracing).
    BuildLog,
    /// Inherit the parent process's stream.
    Inherit,
    /// Copy bytes into a caller-supplied writer.
    Writer(Box<dyn AsyncWrite + Send + Unpin>),
}

/// Stream wiring for a delegated process.
pub struct StdioSinks {
    pub stdout: OutputSink,
    pub stderr: OutputSink,
}

impl Default for StdioSinks {
    fn default() -> Self {
        Self {
            stdout: OutputSink::BuildLog,
            stderr: OutputSink::BuildLog,
        }
    }
}

/// A running delegated process.
///
/// Supports blocking wait-for-exit and forced termination; there is no other
/// cancellation mechanism.
#[derive(Debug)]
pub struct ProcessHandle {
    inner: HandleInner,
}

#[derive(Debug)]
enum HandleInner {
    Live {
        child: Child,
        forwarders: Vec<JoinHandle<()>>,
    },
    #[cfg(test)]
    Scripted { status: i32 },
}

impl ProcessHandle {
    fn live(child: Child, forwarders: Vec<JoinHandle<()>>) -> Self {
        Self {
            inner: HandleInner::Live { child, forwarders },
        }
    }

    #[cfg(test)]
    pub(crate) fn scripted(status: i32) -> Self {
        Self {
            inner: HandleInner::Scripted { status },
        }
    }

    /// Wait for the process to exit and its output to drain.
    pub async fn wait(&mut self) -> Result<i32, Error> {
        match &mut self.inner {
            HandleInner::Live { child, forwarders } => {
                let status = child.wait().await?;
                for task in forwarders.drain(..) {
                    let _ = task.await;
                }
                Ok(status.code().unwrap_or(-1))
            }
            #[cfg(test)]
            HandleInner::Scripted { status } => Ok(*status),
        }
    }

    /// Forcibly terminate the process.
    pub async fn kill(&mut self) -> Result<(), Error> {
        match &mut self.inner {
            HandleInner::Live { child, .. } => {
                child.kill().await?;
                Ok(())
            }
            #[cfg(test)]
            HandleInner::Scripted { .. } => Ok(()),
        }
    }
}

/// The "spawn this command, capture streams, return exit code" primitive.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion, capturing both streams.
    async fn run(&self, args: &ArgList) -> Result<CommandOutput, Error>;

    /// Spawn without waiting, wiring streams per `io`.
    async fn spawn(&self, args: &ArgList, io: StdioSinks) -> Result<ProcessHandle, Error>;
}

/// [`CommandRunner`] over the real engine binary.
pub struct CliRunner {
    engine: String,
    debug: bool,
}

impl CliRunner {
    /// Locate the engine binary and build a runner.
    ///
    /// An explicit override wins; otherwise the binary is searched on PATH,
    /// falling back to the bare name for the OS to resolve at spawn time.
    pub fn new(engine_override: Option<&str>, debug: bool) -> Self {
        let engine = match engine_override {
            Some(path) => path.to_string(),
            None => which::which("docker")
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_else(|_| "docker".to_string()),
        };
        Self { engine, debug }
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    fn command(&self, args: &ArgList) -> Command {
        let mut cmd = Command::new(&self.engine);
        cmd.args(args.tokens());
        cmd.kill_on_drop(true);
        cmd
    }

    fn echo(&self, args: &ArgList) {
        if self.debug {
            info!(engine = %self.engine, command = %args, "Running engine command");
        } else {
            debug!(engine = %self.engine, command = %args, "Running engine command");
        }
    }
}

#[async_trait]
impl CommandRunner for CliRunner {
    async fn run(&self, args: &ArgList) -> Result<CommandOutput, Error> {
        self.echo(args);

        let output = self.command(args).stdin(Stdio::null()).output().await?;

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    async fn spawn(&self, args: &ArgList, io: StdioSinks) -> Result<ProcessHandle, Error> {
        self.echo(args);

        let mut cmd = self.command(args);
        cmd.stdin(Stdio::null());
        cmd.stdout(stdio_for(&io.stdout));
        cmd.stderr(stdio_for(&io.stderr));

        let mut child = cmd.spawn()?;
        let mut forwarders = Vec::new();

        if let Some(stdout) = child.stdout.take() {
            forwarders.push(forward(stdout, io.stdout, "stdout"));
        }
        if let Some(stderr) = child.stderr.take() {
            forwarders.push(forward(stderr, io.stderr, "stderr"));
        }

        Ok(ProcessHandle::live(child, forwarders))
    }
}

fn stdio_for(sink: &OutputSink) -> Stdio {
    match sink {
        OutputSink::Inherit => Stdio::inherit(),
        OutputSink::BuildLog | OutputSink::Writer(_) => Stdio::piped(),
    }
}

/// Pump one child stream into its sink.
fn forward<R>(stream: R, sink: OutputSink, name: &'static str) -> JoinHandle<()>
where
    R: tokio::io::AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        match sink {
            OutputSink::BuildLog => {
                let mut lines = BufReader::new(stream).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => info!(stream = name, "{}", line),
                        Ok(None) => break,
                        Err(e) => {
                            warn!(stream = name, error = %e, "Error reading process output");
                            break;
                        }
                    }
                }
            }
            OutputSink::Writer(mut writer) => {
                let mut reader = stream;
                if let Err(e) = tokio::io::copy(&mut reader, &mut writer).await {
                    warn!(stream = name, error = %e, "Error copying process output");
                }
            }
            // Inherited streams never reach here; the child was not piped.
            OutputSink::Inherit => {}
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arglist_display_redacts_masked_tokens() {
        let mut args = ArgList::new();
        args.add("exec").add("abc123").add("deploy");
        args.add_masked("s3cret");
        assert_eq!(args.to_string(), "exec abc123 deploy ********");
    }

    #[test]
    fn test_arglist_tokens_are_unredacted() {
        let mut args = ArgList::new();
        args.add("login").add_masked("hunter2");
        let tokens: Vec<&str> = args.tokens().collect();
        assert_eq!(tokens, vec!["login", "hunter2"]);
    }

    #[test]
    fn test_extend_from_preserves_masks() {
        let mut cmd = ArgList::new();
        cmd.add("make").add_masked("TOKEN=xyz");

        let mut args = ArgList::from_tokens(["exec", "cid"]);
        args.extend_from(&cmd);

        let masks: Vec<bool> = args.iter().map(|(_, m)| m).collect();
        assert_eq!(masks, vec![false, false, false, true]);
    }

    #[test]
    fn test_add_pair() {
        let mut args = ArgList::new();
        args.add_pair("--workdir", "/build");
        let tokens: Vec<&str> = args.tokens().collect();
        assert_eq!(tokens, vec!["--workdir", "/build"]);
    }
}
