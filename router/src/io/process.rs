//! Child process execution with a timeout and bounded output capture.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// How long the output pipes may stay open after the child has exited.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Notice appended to logs when a stream was cut at the limit.
    pub fn truncated_notice(&self, label: &str) -> String {
        let mut notice = String::new();
        if self.stdout_truncated > 0 {
            notice.push_str(&format!(
                "\n[{label} stdout truncated {} bytes]\n",
                self.stdout_truncated
            ));
        }
        if self.stderr_truncated > 0 {
            notice.push_str(&format!(
                "\n[{label} stderr truncated {} bytes]\n",
                self.stderr_truncated
            ));
        }
        notice
    }
}

/// Run `cmd`, feeding `stdin`, and kill it if it outlives `timeout`.
///
/// Both pipes are drained on reader threads and stdin is written from its own
/// thread, so neither a chatty agent nor one that never reads its input can
/// stall the call. On unix the child leads its own process group and the whole
/// group is killed on timeout, including tool subprocesses that inherited the
/// pipes. At most `output_limit_bytes` of each stream are kept.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!("spawning agent process");
    let mut child = cmd.spawn().map_err(|e| {
        error!(err = %e, "failed to spawn command");
        anyhow!(e).context("spawn command")
    })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stdout_capture = StreamCapture::spawn(stdout, output_limit_bytes);
    let stderr_capture = StreamCapture::spawn(stderr, output_limit_bytes);

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        let input = input.to_vec();
        thread::spawn(move || {
            // Dropping closes the pipe so the agent sees EOF.
            if let Err(err) = child_stdin.write_all(&input) {
                debug!(err = %err, "agent did not consume stdin");
            }
        });
    }

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            timed_out = true;
            kill_process_group(&child);
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let drain_deadline = Instant::now() + PIPE_DRAIN_GRACE;
    let stdout_closed = stdout_capture.wait(drain_deadline, "stdout")?;
    let stderr_closed = stderr_capture.wait(drain_deadline, "stderr")?;
    if !(stdout_closed && stderr_closed) {
        warn!("output pipes still held open after exit, keeping partial output");
        kill_process_group(&child);
    }

    let (stdout, stdout_truncated) = stdout_capture.take("stdout")?;
    let (stderr, stderr_truncated) = stderr_capture.take("stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// Kill every process in the child's group.
#[cfg(unix)]
fn kill_process_group(child: &Child) {
    let group = format!("-{}", child.id());
    let result = Command::new("kill")
        .args(["-s", "KILL", "--", &group])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    match result {
        Ok(status) if status.success() => debug!(pgid = child.id(), "process group killed"),
        // The group is already gone once every member has exited.
        Ok(status) => debug!(pgid = child.id(), code = ?status.code(), "kill reported no group"),
        Err(err) => warn!(err = %err, "failed to run kill for process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

#[derive(Default)]
struct Captured {
    buf: Vec<u8>,
    truncated: usize,
}

/// One output pipe drained on a background thread.
///
/// The buffer is shared so that whatever arrived before the drain deadline is
/// still returned when something else keeps the pipe open.
struct StreamCapture {
    shared: Arc<Mutex<Captured>>,
    done: mpsc::Receiver<Result<()>>,
}

impl StreamCapture {
    fn spawn<R: Read + Send + 'static>(reader: R, limit: usize) -> Self {
        let shared = Arc::new(Mutex::new(Captured::default()));
        let sink = Arc::clone(&shared);
        let (tx, done) = mpsc::channel();
        thread::spawn(move || {
            // The receiver is gone if the drain deadline already passed.
            let _ = tx.send(read_stream_limited(reader, limit, &sink));
        });
        Self { shared, done }
    }

    /// Wait for EOF until `deadline`. Returns false if the pipe is still open.
    fn wait(&self, deadline: Instant, label: &str) -> Result<bool> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match self.done.recv_timeout(remaining) {
            Ok(result) => result.with_context(|| format!("read {label}"))?,
            Err(mpsc::RecvTimeoutError::Timeout) => return Ok(false),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                bail!("{label} reader thread panicked")
            }
        }
        Ok(true)
    }

    fn take(&self, label: &str) -> Result<(Vec<u8>, usize)> {
        let mut captured = self
            .shared
            .lock()
            .map_err(|_| anyhow!("{label} buffer poisoned"))?;
        Ok((std::mem::take(&mut captured.buf), captured.truncated))
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize, sink: &Mutex<Captured>) -> Result<()> {
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            return Ok(());
        }
        let mut captured = sink
            .lock()
            .map_err(|_| anyhow!("output buffer poisoned"))?;
        let keep = n.min(limit.saturating_sub(captured.buf.len()));
        captured.buf.extend_from_slice(&chunk[..keep]);
        captured.truncated += n - keep;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_stdout_and_stdin() {
        let output =
            run_command_with_timeout(sh("cat"), Some(b"hello"), Duration::from_secs(5), 1024)
                .expect("run");
        assert!(output.status.success());
        assert_eq!(output.stdout, b"hello");
        assert!(!output.timed_out);
    }

    #[test]
    fn truncates_beyond_limit() {
        let output = run_command_with_timeout(
            sh("printf 0123456789"),
            None,
            Duration::from_secs(5),
            4,
        )
        .expect("run");
        assert_eq!(output.stdout, b"0123");
        assert_eq!(output.stdout_truncated, 6);
        assert!(output.truncated_notice("agent").contains("truncated 6 bytes"));
    }

    #[test]
    fn kills_on_timeout() {
        let output =
            run_command_with_timeout(sh("exec sleep 5"), None, Duration::from_millis(100), 1024)
                .expect("run");
        assert!(output.timed_out);
        assert!(!output.status.success());
    }

    #[test]
    fn timeout_kills_subprocesses_holding_the_pipes() {
        let started = Instant::now();
        let output = run_command_with_timeout(
            sh("sleep 4; echo done"),
            None,
            Duration::from_millis(200),
            1024,
        )
        .expect("run");
        assert!(output.timed_out);
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(output.stdout.is_empty());
    }

    #[test]
    fn unread_stdin_does_not_block_timeout() {
        let input = vec![b'x'; 1 << 20];
        let started = Instant::now();
        let output = run_command_with_timeout(
            sh("sleep 4"),
            Some(&input),
            Duration::from_millis(200),
            1024,
        )
        .expect("run");
        assert!(output.timed_out);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn background_leftover_does_not_hold_exited_call() {
        let started = Instant::now();
        let output = run_command_with_timeout(
            sh("sleep 10 & echo hi"),
            None,
            Duration::from_secs(5),
            1024,
        )
        .expect("run");
        assert!(!output.timed_out);
        assert!(output.status.success());
        assert_eq!(output.stdout, b"hi\n");
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
