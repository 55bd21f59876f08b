use std::io::{self, Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use wait_timeout::ChildExt;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last non-empty stderr line, falling back to the exit code.
    pub fn failure_reason(&self) -> String {
        self.stderr
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| format!("exit_code={}", self.exit_code))
    }
}

/// The child outlived its time budget and was killed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("timed out after {timeout:?}: {cmd}")]
pub struct TimedOut {
    pub cmd: String,
    pub timeout: Duration,
}

pub fn is_timeout(err: &anyhow::Error) -> bool {
    err.downcast_ref::<TimedOut>().is_some()
}

#[derive(Debug, Clone, Default)]
pub struct CommandRunOptions {
    pub env: Vec<(String, String)>,
    pub stdin: Option<Vec<u8>>,
}

pub fn run_command(cmd: &str, args: &[&str], timeout: Duration) -> Result<CommandOutput> {
    run_command_with_options(cmd, args, timeout, &CommandRunOptions::default())
}

/// Runs `cmd` and waits at most `timeout` for it. stdout and stderr are drained on
/// helper threads so a chatty child cannot stall on a full pipe.
pub fn run_command_with_options(
    cmd: &str,
    args: &[&str],
    timeout: Duration,
    options: &CommandRunOptions,
) -> Result<CommandOutput> {
    let mut command = Command::new(cmd);
    command
        .args(args)
        .stdin(if options.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    for (k, v) in &options.env {
        command.env(k, v);
    }

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to start process: {cmd}"))?;

    if let (Some(mut stdin), Some(input)) = (child.stdin.take(), options.stdin.clone()) {
        thread::spawn(move || {
            let _ = stdin.write_all(&input);
        });
    }

    let stdout_reader = child.stdout.take().map(|out| thread::spawn(move || drain(out)));
    let stderr_reader = child.stderr.take().map(|err| thread::spawn(move || drain(err)));

    let status = match child
        .wait_timeout(timeout)
        .with_context(|| format!("failed to wait for process: {cmd}"))?
    {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(TimedOut {
                cmd: cmd.to_string(),
                timeout,
            }
            .into());
        }
    };

    let stdout = stdout_reader
        .and_then(|h| h.join().ok())
        .transpose()
        .with_context(|| format!("failed to read stdout of {cmd}"))?
        .unwrap_or_default();
    let stderr = stderr_reader
        .and_then(|h| h.join().ok())
        .transpose()
        .with_context(|| format!("failed to read stderr of {cmd}"))?
        .unwrap_or_default();

    Ok(CommandOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout,
        stderr,
    })
}

/// Reads a pipe to the end. Bytes that are not UTF-8 are replaced rather than
/// dropping the whole stream.
fn drain(mut pipe: impl Read) -> io::Result<String> {
    let mut buf = Vec::new();
    pipe.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
