//! Process execution capability.
//!
//! Every external program (submission tools and local jobs) runs through a
//! [`ProcessRunner`], so tests can substitute a recording double for `bash`.

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::trace;

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit status. Signals are reported as `128 + signo`.
    pub status: i32,
    /// Raw standard output.
    pub stdout: Vec<u8>,
    /// Raw standard error.
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    /// Whether the process exited with status zero.
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Something that can run shell text.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `command_line` in a shell, write `stdin` to it, and capture its output.
    async fn capture(&self, command_line: &str, stdin: &[u8]) -> io::Result<ProcessOutput>;

    /// Run `script` with positional arguments (`$0`, `$1`, ...), inheriting
    /// the caller's stdout and stderr. Returns the exit status.
    async fn inherit(&self, script: &str, args: &[String]) -> io::Result<i32>;
}

/// Runs everything through `bash -c`.
#[derive(Debug, Clone)]
pub struct BashRunner {
    shell: PathBuf,
}

impl Default for BashRunner {
    fn default() -> Self {
        Self {
            shell: PathBuf::from("bash"),
        }
    }
}

impl BashRunner {
    /// Use a specific bash binary.
    pub fn with_shell(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

#[async_trait]
impl ProcessRunner for BashRunner {
    async fn capture(&self, command_line: &str, stdin: &[u8]) -> io::Result<ProcessOutput> {
        trace!(shell = %self.shell.display(), command_line, "spawning captured process");

        let mut child = Command::new(&self.shell)
            .arg("-c")
            .arg(command_line)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Feed stdin from a separate task so a chatty child cannot deadlock us.
        let writer = child.stdin.take().map(|mut pipe| {
            let payload = stdin.to_vec();
            tokio::spawn(async move {
                let result = pipe.write_all(&payload).await;
                drop(pipe);
                result
            })
        });

        let output = child.wait_with_output().await?;

        if let Some(writer) = writer {
            match writer.await {
                Ok(Ok(())) => {}
                // The tool may exit without reading its input.
                Ok(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {}
                Ok(Err(e)) => return Err(e),
                Err(e) => return Err(io::Error::other(e)),
            }
        }

        Ok(ProcessOutput {
            status: exit_code(output.status),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    async fn inherit(&self, script: &str, args: &[String]) -> io::Result<i32> {
        trace!(shell = %self.shell.display(), script, ?args, "spawning inherited process");

        let status = Command::new(&self.shell)
            .arg("-c")
            .arg(script)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await?;
        Ok(exit_code(status))
    }
}

/// Map an exit status to a shell-style integer.
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}
