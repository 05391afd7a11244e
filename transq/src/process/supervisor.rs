//! Child process supervision.
//!
//! A [`ProcessSupervisor`] owns exactly one external OS process: it spawns
//! the process, forwards every output line through an event channel, relays
//! the exit code, and exposes terminate / suspend / resume control. It never
//! interprets the output it forwards; interpretation belongs to the parser.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{Error, Result};

/// Which output stream a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Events emitted by a supervised process.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    /// One line of process output.
    Output { stream: OutputStream, chunk: String },
    /// The process stopped running.
    ///
    /// `code` is `None` when the process was killed by a signal (including
    /// a termination requested through the supervisor).
    Exited { code: Option<i32> },
    /// A runtime error occurred while supervising the process.
    Error { message: String },
}

/// Supervisor for one external process.
///
/// Created at task admission, dropped at the task's terminal transition.
/// All output lines are delivered before the final [`ProcessEvent::Exited`].
pub struct ProcessSupervisor {
    pid: Option<u32>,
    cancellation_token: CancellationToken,
    exited: Arc<AtomicBool>,
}

impl ProcessSupervisor {
    /// Spawn `program` with `args` and begin supervising it.
    ///
    /// Both output streams are piped and forwarded line-by-line as
    /// [`ProcessEvent::Output`]; a waiter task relays the exit code once
    /// the readers have drained.
    pub fn spawn(
        program: &str,
        args: &[String],
        event_tx: mpsc::Sender<ProcessEvent>,
    ) -> Result<Self> {
        let mut child = Command::new(program)
            .args(args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let pid = child.id();
        debug!(program, ?pid, "Spawned supervised process");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let stdout_task = stdout.map(|out| {
            tokio::spawn(forward_lines(out, OutputStream::Stdout, event_tx.clone()))
        });
        let stderr_task = stderr.map(|err| {
            tokio::spawn(forward_lines(err, OutputStream::Stderr, event_tx.clone()))
        });

        let cancellation_token = CancellationToken::new();
        let exited = Arc::new(AtomicBool::new(false));

        let waiter_token = cancellation_token.clone();
        let exited_flag = Arc::clone(&exited);
        tokio::spawn(async move {
            let code = tokio::select! {
                _ = waiter_token.cancelled() => {
                    let _ = child.kill().await;
                    None
                }
                status = child.wait() => {
                    match status {
                        Ok(exit_status) => {
                            let code = exit_status.code();
                            match code {
                                Some(c) if c != 0 => warn!("Process exited with code {}", c),
                                None => warn!("Process terminated by signal"),
                                _ => {}
                            }
                            code
                        }
                        Err(e) => {
                            error!("Error waiting for process: {}", e);
                            let _ = event_tx
                                .send(ProcessEvent::Error {
                                    message: format!("failed to wait for process: {}", e),
                                })
                                .await;
                            Some(-1)
                        }
                    }
                }
            };

            // Drain the readers so every output line precedes the exit notice.
            if let Some(task) = stdout_task {
                let _ = task.await;
            }
            if let Some(task) = stderr_task {
                let _ = task.await;
            }

            exited_flag.store(true, Ordering::SeqCst);
            let _ = event_tx.send(ProcessEvent::Exited { code }).await;
        });

        Ok(Self {
            pid,
            cancellation_token,
            exited,
        })
    }

    /// Request forceful termination.
    ///
    /// Asynchronous: the waiter kills the process and the exit notice
    /// arrives through the event channel like any natural exit.
    pub fn terminate(&self) {
        self.cancellation_token.cancel();
    }

    /// Whether the process can still be signalled.
    ///
    /// False once the process has exited or termination was requested.
    pub fn is_controllable(&self) -> bool {
        !self.cancellation_token.is_cancelled() && !self.exited.load(Ordering::SeqCst)
    }

    /// Suspend the process (POSIX stop semantics).
    #[cfg(unix)]
    pub fn suspend(&self) -> Result<()> {
        self.signal(nix::sys::signal::Signal::SIGSTOP)
    }

    /// Resume a suspended process (POSIX continue semantics).
    #[cfg(unix)]
    pub fn resume(&self) -> Result<()> {
        self.signal(nix::sys::signal::Signal::SIGCONT)
    }

    #[cfg(unix)]
    fn signal(&self, signal: nix::sys::signal::Signal) -> Result<()> {
        let pid = self
            .pid
            .ok_or_else(|| Error::signal("process id unavailable"))?;
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), signal)
            .map_err(|e| Error::signal(format!("{:?} to pid {}: {}", signal, pid, e)))
    }

    /// Suspend the process (POSIX stop semantics).
    ///
    /// Not available on this platform.
    #[cfg(not(unix))]
    pub fn suspend(&self) -> Result<()> {
        Err(Error::unsupported("process suspension requires POSIX signals"))
    }

    /// Resume a suspended process (POSIX continue semantics).
    ///
    /// Not available on this platform.
    #[cfg(not(unix))]
    pub fn resume(&self) -> Result<()> {
        Err(Error::unsupported("process resumption requires POSIX signals"))
    }
}

/// Forward lines from a child output stream into the event channel.
async fn forward_lines<R>(reader: R, stream: OutputStream, tx: mpsc::Sender<ProcessEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(chunk)) = lines.next_line().await {
        if tx.send(ProcessEvent::Output { stream, chunk }).await.is_err() {
            break;
        }
    }
}

/// Detect the version of a transcoder binary.
///
/// Runs `<program> -version` and returns the first output line, or `None`
/// when the binary is missing or produces nothing.
pub fn detect_version(program: &str) -> Option<String> {
    std::process::Command::new(program)
        .arg("-version")
        .output()
        .ok()
        .and_then(|output| {
            String::from_utf8(output.stdout)
                .ok()
                .and_then(|s| s.lines().next().map(|l| l.to_string()))
        })
}
