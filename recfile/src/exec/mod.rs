//! Bounded execution of external commands
//!
//! Every call to the evaluation capability goes through [`CommandRunner`],
//! which enforces a hard time bound, captures stdout and stderr separately
//! and folds every failure into an [`Outcome`] instead of propagating it.

use crate::error::{Error, FailureKind, Result};
use crate::outcome::Outcome;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::Instant;

/// Per-operation context handed down from the caller.
///
/// Carries an optional deadline that bounds every command the operation
/// runs, on top of the runner's own timeout. Whichever expires first wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpContext {
    deadline: Option<Instant>,
}

impl OpContext {
    /// Context without a caller deadline
    pub fn new() -> Self {
        Self::default()
    }

    /// Context that expires at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    /// Context that expires `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// The caller deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline (None = unbounded)
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Whether the deadline has already passed
    pub fn is_expired(&self) -> bool {
        self.remaining().is_some_and(|r| r.is_zero())
    }
}

/// A program, its arguments and an optional stdin payload
#[derive(Debug, Clone)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<OsString>,
    stdin: Option<String>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Feed `input` to the program's stdin
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Runs invocations with a hard upper bound on wall-clock time
#[derive(Debug, Clone)]
pub struct CommandRunner {
    timeout: Duration,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_COMMAND_TIMEOUT)
    }
}

impl CommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run an invocation to completion.
    ///
    /// Never returns an error: spawn failures, non-zero exits, timeouts and
    /// deadline expiry all come back as a failed [`Outcome`]. On success
    /// both streams are trimmed; on a non-zero exit they are returned raw.
    pub async fn invoke(&self, invocation: &Invocation, cx: &OpContext) -> Outcome {
        match self.run(invocation, cx).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!("Command `{}` failed: {}", invocation, err);
                err.into()
            }
        }
    }

    async fn run(&self, invocation: &Invocation, cx: &OpContext) -> Result<Outcome> {
        let (bound, bounded_by_caller) = match cx.remaining() {
            Some(remaining) if remaining < self.timeout => (remaining, true),
            _ => (self.timeout, false),
        };
        if bounded_by_caller && bound.is_zero() {
            return Err(Error::DeadlineExceeded);
        }

        tracing::debug!("Running: {}", invocation);

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let pipe = child.stdin.take();
        let payload = invocation.stdin.clone();
        let feed = async move {
            if let (Some(mut pipe), Some(payload)) = (pipe, payload) {
                match pipe.write_all(payload.as_bytes()).await {
                    // The program may exit without draining its input
                    Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e),
                    _ => {}
                }
            }
            Ok(())
        };

        let finished = tokio::time::timeout(bound, async {
            let (fed, output) = tokio::join!(feed, child.wait_with_output());
            fed?;
            output
        })
        .await;

        let output = match finished {
            Ok(output) => output?,
            Err(_) if bounded_by_caller => return Err(Error::DeadlineExceeded),
            Err(_) => return Err(Error::Timeout(bound)),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            return Ok(Outcome {
                success: true,
                output: stdout.trim().to_string(),
                error: stderr.trim().to_string(),
                kind: None,
            });
        }

        tracing::debug!("`{}` exited with {}", invocation, output.status);
        let error = if stderr.trim().is_empty() {
            format!("{} exited with {}", invocation.program.display(), output.status)
        } else {
            stderr
        };
        Ok(Outcome::failure(FailureKind::Capability, error).with_output(stdout))
    }
}
