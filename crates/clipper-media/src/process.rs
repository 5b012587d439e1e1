//! Transcoder subprocess lifecycle.
//!
//! A launched transcoder is owned by exactly one [`TranscoderProcess`].
//! Waiting for it is raced against the job deadline and the job's
//! cancellation token by [`race_terminal`]; whichever fires first decides
//! the terminal state.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::command::TranscodeCommand;
use crate::error::{MediaError, MediaResult};
use crate::stderr::OutputTail;

/// How a subprocess exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code; `None` when terminated by a signal
    pub code: Option<i32>,
    pub success: bool,
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
            success: status.success(),
        }
    }
}

/// A running transcode that can be awaited and forcibly stopped.
#[async_trait]
pub trait TranscodeProcess: Send {
    /// OS process id, if still known.
    fn id(&self) -> Option<u32>;

    /// Wait for the process to exit. Must be cancel-safe.
    async fn wait(&mut self) -> io::Result<ExitOutcome>;

    /// Kill the process and wait at most `grace` for it to be reaped.
    async fn terminate(&mut self, grace: Duration) -> io::Result<()>;
}

/// First event observed while a transcode runs.
#[derive(Debug)]
pub enum Signal {
    Exited(io::Result<ExitOutcome>),
    DeadlineElapsed,
    Canceled,
}

/// Race subprocess exit against the deadline and cancellation.
///
/// Ties resolve in a fixed order: an exit that is already observable wins
/// over cancellation, and cancellation wins over the deadline.
pub async fn race_terminal<P>(process: &mut P, deadline: Instant, cancel: &CancellationToken) -> Signal
where
    P: TranscodeProcess + ?Sized,
{
    tokio::select! {
        biased;
        status = process.wait() => Signal::Exited(status),
        _ = cancel.cancelled() => Signal::Canceled,
        _ = tokio::time::sleep_until(deadline) => Signal::DeadlineElapsed,
    }
}

/// Captured tails of the transcoder's output streams.
#[derive(Debug, Default)]
pub struct CapturedOutput {
    pub stdout: OutputTail,
    pub stderr: OutputTail,
}

/// Transcoder child process with drained stdout/stderr.
///
/// The child runs in its own process group so termination also reaches
/// anything it forked. Dropping an unreaped handle kills the group.
pub struct TranscoderProcess {
    child: Child,
    pid: Option<u32>,
    stdout: Option<JoinHandle<OutputTail>>,
    stderr: Option<JoinHandle<OutputTail>>,
    reaped: bool,
}

impl TranscoderProcess {
    /// Launch `command`, keeping at most `tail_bytes` of each output stream.
    pub fn spawn(command: &TranscodeCommand, tail_bytes: usize) -> MediaResult<Self> {
        let args = command.build_args();
        debug!("Running transcoder: {} {}", command.program().display(), args.join(" "));

        let mut cmd = Command::new(command.program());
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(MediaError::Spawn)?;
        let pid = child.id();

        let stdout = child
            .stdout
            .take()
            .map(|out| tokio::spawn(OutputTail::drain(out, tail_bytes)));
        let stderr = child
            .stderr
            .take()
            .map(|err| tokio::spawn(OutputTail::drain(err, tail_bytes)));

        Ok(Self {
            child,
            pid,
            stdout,
            stderr,
            reaped: false,
        })
    }

    pub fn is_reaped(&self) -> bool {
        self.reaped
    }

    /// Collect the output tails, waiting at most `wait` for the pipes to close.
    ///
    /// A descendant still holding a pipe open would otherwise stall the
    /// drain forever; on timeout the drain is aborted and that stream is
    /// reported empty.
    pub async fn collect_output(&mut self, wait: Duration) -> CapturedOutput {
        CapturedOutput {
            stdout: join_tail(self.stdout.take(), wait).await,
            stderr: join_tail(self.stderr.take(), wait).await,
        }
    }

    #[cfg(unix)]
    fn kill_group(&self) {
        use nix::sys::signal::{killpg, Signal as UnixSignal};
        use nix::unistd::Pid;

        if let Some(pid) = self.pid {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), UnixSignal::SIGKILL) {
                debug!(pid, "killpg failed: {}", e);
            }
        }
    }

    #[cfg(not(unix))]
    fn kill_group(&self) {}
}

async fn join_tail(handle: Option<JoinHandle<OutputTail>>, wait: Duration) -> OutputTail {
    let Some(mut handle) = handle else {
        return OutputTail::default();
    };
    match tokio::time::timeout(wait, &mut handle).await {
        Ok(Ok(tail)) => tail,
        Ok(Err(e)) => {
            warn!("Output drain task failed: {}", e);
            OutputTail::default()
        }
        Err(_) => {
            handle.abort();
            OutputTail::default()
        }
    }
}

#[async_trait]
impl TranscodeProcess for TranscoderProcess {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    async fn wait(&mut self) -> io::Result<ExitOutcome> {
        let status = self.child.wait().await?;
        self.reaped = true;
        Ok(status.into())
    }

    async fn terminate(&mut self, grace: Duration) -> io::Result<()> {
        if self.reaped {
            return Ok(());
        }

        self.kill_group();
        if let Err(e) = self.child.start_kill() {
            debug!(pid = ?self.pid, "start_kill failed: {}", e);
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(_)) => {
                self.reaped = true;
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("transcoder not reaped within {}ms", grace.as_millis()),
            )),
        }
    }
}

impl Drop for TranscoderProcess {
    fn drop(&mut self) {
        if !self.reaped {
            self.kill_group();
        }
        for handle in [self.stdout.take(), self.stderr.take()].into_iter().flatten() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    /// Process whose exit is driven by a channel.
    struct FakeProcess {
        exit: oneshot::Receiver<i32>,
        terminated: bool,
    }

    impl FakeProcess {
        fn new() -> (oneshot::Sender<i32>, Self) {
            let (tx, rx) = oneshot::channel();
            (
                tx,
                Self {
                    exit: rx,
                    terminated: false,
                },
            )
        }
    }

    #[async_trait]
    impl TranscodeProcess for FakeProcess {
        fn id(&self) -> Option<u32> {
            None
        }

        async fn wait(&mut self) -> io::Result<ExitOutcome> {
            match (&mut self.exit).await {
                Ok(code) => Ok(ExitOutcome {
                    code: Some(code),
                    success: code == 0,
                }),
                Err(_) => std::future::pending().await,
            }
        }

        async fn terminate(&mut self, _grace: Duration) -> io::Result<()> {
            self.terminated = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_exit_wins_ties() {
        let (tx, mut process) = FakeProcess::new();
        tx.send(0).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let signal = race_terminal(&mut process, Instant::now(), &cancel).await;
        assert!(matches!(signal, Signal::Exited(Ok(ExitOutcome { code: Some(0), .. }))));
    }

    #[tokio::test]
    async fn test_cancel_beats_deadline() {
        let (_tx, mut process) = FakeProcess::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let signal = race_terminal(&mut process, Instant::now(), &cancel).await;
        assert!(matches!(signal, Signal::Canceled));
    }

    #[tokio::test]
    async fn test_deadline_elapses() {
        let (_tx, mut process) = FakeProcess::new();
        let cancel = CancellationToken::new();
        let deadline = Instant::now() + Duration::from_millis(20);

        let signal = race_terminal(&mut process, deadline, &cancel).await;
        assert!(matches!(signal, Signal::DeadlineElapsed));
        assert!(!process.terminated);
    }

    #[tokio::test]
    async fn test_late_cancel_interrupts_wait() {
        let (_tx, mut process) = FakeProcess::new();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let deadline = Instant::now() + Duration::from_secs(30);
        let signal = race_terminal(&mut process, deadline, &cancel).await;
        assert!(matches!(signal, Signal::Canceled));
    }

    #[cfg(unix)]
    fn shell(script: &str) -> TranscodeCommand {
        // Trailing transcoder arguments become ignored positional parameters
        TranscodeCommand::new("/bin/sh", "in.mp4", "/dev/null").global_args(["-c", script, "sh"])
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_real_exit_code_and_stderr() {
        let mut process = TranscoderProcess::spawn(&shell("echo boom >&2; exit 3"), 1024).unwrap();
        let outcome = process.wait().await.unwrap();
        assert_eq!(outcome.code, Some(3));
        assert!(!outcome.success);

        let output = process.collect_output(Duration::from_secs(1)).await;
        assert_eq!(output.stderr.to_bytes(), b"boom\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_reaps_promptly() {
        let mut process = TranscoderProcess::spawn(&shell("exec sleep 30"), 1024).unwrap();
        let pid = process.id().unwrap();

        let started = std::time::Instant::now();
        process.terminate(Duration::from_secs(2)).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(process.is_reaped());
        if cfg!(target_os = "linux") {
            assert!(!std::path::Path::new(&format!("/proc/{pid}")).exists());
        }
    }
}
