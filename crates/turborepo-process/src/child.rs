//! Spawns a single child process inside its own process group so a `stop()`
//! reaches anything it forked, and drives it to completion as an actor: a
//! background task owns the real `command_group::AsyncGroupChild` and replies
//! to `stop`/`kill` over a channel, while `Child` itself is a cheap `Clone`
//! handle any number of callers can hold.

use std::{
    io::{self, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use command_group::{AsyncCommandGroup, AsyncGroupChild};
#[cfg(unix)]
use command_group::{Signal, UnixChildExt};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{ChildStderr, ChildStdin, ChildStdout},
    sync::{mpsc, watch},
};
use tracing::{debug, trace};

use super::Command;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChildExit {
    Finished(Option<i32>),
    /// The child was sent an interrupt and shut down on its own.
    Interrupted,
    /// The child was killed, either explicitly or after ignoring an interrupt.
    Killed,
    /// The child exited in a way that suggests something else killed it.
    KilledExternal,
    Failed,
}

#[derive(Debug, Clone, Copy)]
pub enum ShutdownStyle {
    /// Send `SIGINT` to the process group; if `Duration` elapses without the
    /// child exiting, follow up with a kill. On Windows there is no signal
    /// to send, so this kills immediately.
    Graceful(Duration),
    Kill,
}

struct ChildIo {
    stdin: Option<ChildStdin>,
    stdout: ChildStdout,
    stderr: ChildStderr,
}

impl ShutdownStyle {
    async fn process(&self, child: &mut AsyncGroupChild) -> ChildExit {
        match self {
            ShutdownStyle::Graceful(timeout) => {
                #[cfg(unix)]
                {
                    debug!("sending SIGINT to child group {:?}", child.id());
                    if let Err(err) = child.signal(Signal::SIGINT) {
                        debug!("failed to send SIGINT: {err}");
                    }
                    match tokio::time::timeout(*timeout, child.wait()).await {
                        Ok(Ok(_)) => ChildExit::Interrupted,
                        Ok(Err(_)) => ChildExit::Failed,
                        Err(_) => {
                            debug!("graceful shutdown timed out, killing child group");
                            match child.kill() {
                                Ok(()) => ChildExit::Killed,
                                Err(_) => ChildExit::Failed,
                            }
                        }
                    }
                }
                #[cfg(not(unix))]
                {
                    let _ = timeout;
                    match child.kill() {
                        Ok(()) => ChildExit::Killed,
                        Err(_) => ChildExit::Failed,
                    }
                }
            }
            ShutdownStyle::Kill => match child.kill() {
                Ok(()) => ChildExit::Killed,
                Err(_) => ChildExit::Failed,
            },
        }
    }
}

enum ChildCommand {
    Stop,
    Kill,
}

#[derive(Clone)]
struct ChildCommandChannel(mpsc::Sender<ChildCommand>);

impl ChildCommandChannel {
    fn new() -> (Self, mpsc::Receiver<ChildCommand>) {
        let (tx, rx) = mpsc::channel(1);
        (ChildCommandChannel(tx), rx)
    }

    async fn stop(&self) {
        self.0.send(ChildCommand::Stop).await.ok();
    }

    async fn kill(&self) {
        self.0.send(ChildCommand::Kill).await.ok();
    }
}

/// A handle to a running child process. Cloning shares the same underlying
/// process: any clone can `stop`/`kill` it, and `wait` on any clone observes
/// the same exit.
#[derive(Clone, Debug)]
pub struct Child {
    pid: Option<u32>,
    label: String,
    command_channel: ChildCommandChannel,
    exit_channel: watch::Receiver<Option<ChildExit>>,
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    stdout: Arc<Mutex<Option<ChildStdout>>>,
    stderr: Arc<Mutex<Option<ChildStderr>>>,
    closing: Arc<AtomicBool>,
}

impl Child {
    pub fn spawn(command: Command, shutdown_style: ShutdownStyle) -> io::Result<Self> {
        let label = command.label();
        let mut tokio_command: tokio::process::Command = command.into();
        let mut child = tokio_command.group_spawn()?;
        let pid = child.id();

        let io = ChildIo {
            stdin: child.inner().stdin.take(),
            stdout: child
                .inner()
                .stdout
                .take()
                .expect("child spawned with piped stdout"),
            stderr: child
                .inner()
                .stderr
                .take()
                .expect("child spawned with piped stderr"),
        };

        let (command_tx, mut command_rx) = ChildCommandChannel::new();
        let (exit_tx, exit_rx) = watch::channel(None);

        tokio::spawn(async move {
            debug!("waiting for child {pid:?}");
            let mut shutdown_initiated = false;

            tokio::select! {
                biased;
                command = command_rx.recv() => {
                    shutdown_initiated = true;
                    let exit = match command {
                        Some(ChildCommand::Kill) | None => {
                            debug!("killing child process group");
                            ShutdownStyle::Kill.process(&mut child).await
                        }
                        Some(ChildCommand::Stop) => {
                            debug!("stopping child process group");
                            shutdown_style.process(&mut child).await
                        }
                    };
                    trace!("sending child exit after shutdown");
                    exit_tx.send(Some(exit)).ok();
                }
                status = child.wait() => {
                    if !shutdown_initiated {
                        let exit = match status {
                            Ok(status) => ChildExit::Finished(status.code()),
                            Err(_) => ChildExit::Failed,
                        };
                        trace!("sending child exit");
                        exit_tx.send(Some(exit)).ok();
                    }
                }
            }
            debug!("child process stopped");
        });

        Ok(Self {
            pid,
            label,
            command_channel: command_tx,
            exit_channel: exit_rx,
            stdin: Arc::new(Mutex::new(io.stdin)),
            stdout: Arc::new(Mutex::new(Some(io.stdout))),
            stderr: Arc::new(Mutex::new(Some(io.stderr))),
            closing: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub async fn wait(&mut self) -> Option<ChildExit> {
        match self.exit_channel.changed().await {
            Ok(()) => trace!("exit channel updated"),
            Err(_) => trace!("exit channel sender dropped"),
        }
        *self.exit_channel.borrow()
    }

    pub async fn stop(&mut self) -> Option<ChildExit> {
        self.command_channel.stop().await;
        self.wait().await
    }

    pub async fn kill(&mut self) -> Option<ChildExit> {
        self.command_channel.kill().await;
        self.wait().await
    }

    pub fn stdin(&self) -> Option<ChildStdin> {
        self.stdin.lock().unwrap().take()
    }

    /// Marks this child as being stopped as part of a `ProcessManager`-wide
    /// shutdown, as opposed to having been stopped individually.
    pub fn set_closing(&self) {
        self.closing.store(true, Ordering::Release);
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Drains stdout and stderr concurrently into `sink`, one line at a time,
    /// until the child exits or both streams hit EOF. Used to feed a
    /// line-prefixing writer a single interleaved stream to hand to the
    /// cache.
    pub async fn pipe_output(&mut self, mut sink: impl Write) -> io::Result<Option<ChildExit>> {
        let stdout = self.stdout.lock().unwrap().take();
        let stderr = self.stderr.lock().unwrap().take();
        let mut stdout = stdout.map(BufReader::new);
        let mut stderr = stderr.map(BufReader::new);

        let mut out_buf = Vec::new();
        let mut err_buf = Vec::new();
        let mut exited = false;
        let mut exit = None;

        loop {
            tokio::select! {
                result = read_line(&mut stdout, &mut out_buf), if stdout.is_some() => {
                    match result {
                        Some(Ok(())) => {
                            sink.write_all(&out_buf)?;
                            out_buf.clear();
                        }
                        Some(Err(err)) => return Err(err),
                        None => stdout = None,
                    }
                }
                result = read_line(&mut stderr, &mut err_buf), if stderr.is_some() => {
                    match result {
                        Some(Ok(())) => {
                            sink.write_all(&err_buf)?;
                            err_buf.clear();
                        }
                        Some(Err(err)) => return Err(err),
                        None => stderr = None,
                    }
                }
                status = self.wait(), if !exited => {
                    exited = true;
                    exit = status;
                }
                else => break,
            }
        }

        if exit.is_none() {
            exit = self.wait().await;
        }
        Ok(exit)
    }
}

async fn read_line<R: tokio::io::AsyncRead + Unpin>(
    stream: &mut Option<BufReader<R>>,
    buffer: &mut Vec<u8>,
) -> Option<io::Result<()>> {
    match stream {
        Some(stream) => match stream.read_until(b'\n', buffer).await {
            Ok(0) => None,
            Ok(_) => Some(Ok(())),
            Err(err) => Some(Err(err)),
        },
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::Command;

    fn echo_command(text: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", format!("echo {text}").as_str()]);
        cmd
    }

    #[tokio::test]
    async fn spawns_and_finishes() {
        let mut child = Child::spawn(echo_command("hello"), ShutdownStyle::Kill).unwrap();
        assert!(child.pid().is_some());
        let exit = child.wait().await;
        assert_eq!(exit, Some(ChildExit::Finished(Some(0))));
    }

    #[tokio::test]
    async fn kill_reports_killed() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 5"]);
        let mut child = Child::spawn(cmd, ShutdownStyle::Kill).unwrap();
        let exit = child.kill().await;
        assert_eq!(exit, Some(ChildExit::Killed));
    }

    #[tokio::test]
    async fn pipes_combined_output() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; echo err 1>&2"]);
        let mut child = Child::spawn(cmd, ShutdownStyle::Kill).unwrap();
        let mut buf = Vec::new();
        let exit = child.pipe_output(&mut buf).await.unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("out"));
        assert!(text.contains("err"));
        assert_eq!(exit, Some(ChildExit::Finished(Some(0))));
    }

    #[tokio::test]
    async fn graceful_timeout_kills() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "trap '' INT; sleep 5"]);
        let mut child =
            Child::spawn(cmd, ShutdownStyle::Graceful(Duration::from_millis(200))).unwrap();
        let exit = child.stop().await;
        assert_eq!(exit, Some(ChildExit::Killed));
    }
}
