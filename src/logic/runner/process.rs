//! Subordinate Process Management
//!
//! One child at a time per runner. Train runs expose stdout as a bounded
//! line channel fed by a dedicated reader task; predict runs return the
//! whole stdout once the child exits.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::types::{RunMode, RunnerError, TrainParams};
use crate::constants::{MAX_STDERR_BYTES, PIPE_DRAIN_GRACE_MS};
use crate::logic::config::OrchestratorConfig;
use crate::logic::dataset::Features;

// ============================================================================
// IN-FLIGHT GUARD
// ============================================================================

/// Held for the lifetime of one invocation; released on drop
#[derive(Debug)]
struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl RunGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self, RunnerError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| RunnerError::Busy)?;
        Ok(Self { flag: Arc::clone(flag) })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// ============================================================================
// RUNNER
// ============================================================================

#[derive(Debug, Clone)]
pub struct ProcessRunner {
    config: Arc<OrchestratorConfig>,
    in_flight: Arc<AtomicBool>,
}

impl ProcessRunner {
    pub fn new(config: Arc<OrchestratorConfig>) -> Self {
        Self {
            config,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// True while a train or predict invocation owns the runner
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Resolve the binary path, failing if nothing is there
    pub fn check_executable(&self) -> Result<PathBuf, RunnerError> {
        let path = self.config.resolved_binary();
        if path.is_file() {
            Ok(path)
        } else {
            Err(RunnerError::ExecutableMissing(path))
        }
    }

    /// Start `<binary> --train <dataset> <epochs> <lr>`.
    ///
    /// Parameters are validated before the executable is even looked up.
    pub fn spawn_train(&self, dataset: &Path, params: TrainParams) -> Result<TrainRun, RunnerError> {
        params.validate()?;
        let guard = RunGuard::acquire(&self.in_flight)?;
        let binary = self.check_executable()?;

        let mut cmd = self.command(&binary, RunMode::Train)?;
        cmd.arg(dataset)
            .arg(params.epochs.to_string())
            .arg(params.learning_rate.to_string());

        let mut child = spawn(&mut cmd, &binary)?;
        log::info!(
            "Training started (pid {:?}): {:?} epochs={} lr={}",
            child.id(),
            dataset,
            params.epochs,
            params.learning_rate
        );

        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;

        let (tx, rx) = mpsc::channel(self.config.line_queue_capacity.max(1));
        let reader = tokio::spawn(pump_lines(stdout, tx));
        let stderr = tokio::spawn(collect_tail(stderr, MAX_STDERR_BYTES));

        Ok(TrainRun {
            child,
            lines: rx,
            lines_closed: false,
            reader,
            stderr,
            _guard: guard,
        })
    }

    /// Run `<binary> --predict <14 features>` and return its stdout.
    ///
    /// The child is killed and reaped if it outlives the predict timeout.
    pub async fn run_predict(&self, features: &Features) -> Result<String, RunnerError> {
        let _guard = RunGuard::acquire(&self.in_flight)?;
        let binary = self.check_executable()?;

        let mut cmd = self.command(&binary, RunMode::Predict)?;
        cmd.args(features.iter().map(|value| value.to_string()));

        let mut child = spawn(&mut cmd, &binary)?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing_pipe("stderr"))?;
        let out_task = tokio::spawn(read_to_string(stdout));
        let err_task = tokio::spawn(collect_tail(stderr, MAX_STDERR_BYTES));

        let timeout = self.config.predict_timeout;
        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                log::warn!("Prediction exceeded {:?}, killing pid {:?}", timeout, child.id());
                out_task.abort();
                err_task.abort();
                child.kill().await?;
                return Err(RunnerError::Timeout {
                    mode: RunMode::Predict,
                    after: timeout,
                });
            }
        };

        let output = out_task.await.map_err(std::io::Error::from)??;
        let stderr = err_task.await.unwrap_or_default();

        if !status.success() {
            return Err(RunnerError::ProcessFailed {
                mode: RunMode::Predict,
                code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        log::debug!("Prediction output: {}", output.trim());
        Ok(output)
    }

    fn command(&self, binary: &Path, mode: RunMode) -> Result<Command, RunnerError> {
        let working_dir = self.config.resolved_working_dir();
        if !working_dir.is_dir() {
            return Err(RunnerError::Spawn {
                path: working_dir,
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "working directory does not exist",
                ),
            });
        }

        let mut cmd = Command::new(binary);
        cmd.current_dir(working_dir)
            .arg(mode.flag())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }
}

fn spawn(cmd: &mut Command, binary: &Path) -> Result<Child, RunnerError> {
    cmd.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => RunnerError::ExecutableMissing(binary.to_path_buf()),
        _ => RunnerError::Spawn {
            path: binary.to_path_buf(),
            source: e,
        },
    })
}

fn missing_pipe(name: &str) -> RunnerError {
    RunnerError::Io(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        format!("child {} was not captured", name),
    ))
}

// ============================================================================
// TRAIN RUN
// ============================================================================

/// A running training process.
///
/// Dropping it kills the child; `finish` or `kill` also reap it.
#[derive(Debug)]
pub struct TrainRun {
    child: Child,
    lines: mpsc::Receiver<String>,
    lines_closed: bool,
    reader: JoinHandle<std::io::Result<u64>>,
    stderr: JoinHandle<String>,
    _guard: RunGuard,
}

impl TrainRun {
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Next raw stdout line, `None` once stdout is closed
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Wait for the child to exit, dropping stdout lines nobody read.
    ///
    /// Cancel safe: may be raced against a cancellation signal and
    /// called again, after which `finish` or `kill` still apply.
    pub async fn wait(&mut self) -> Result<ExitStatus, RunnerError> {
        let mut discarded = 0usize;
        let status = loop {
            let line = tokio::select! {
                status = self.child.wait() => break status?,
                line = self.lines.recv(), if !self.lines_closed => line,
            };
            match line {
                Some(_) => discarded += 1,
                None => self.lines_closed = true,
            }
        };
        if discarded > 0 {
            log::debug!("Discarded {} unread stdout lines", discarded);
        }
        Ok(status)
    }

    /// Wait for exit and check the status.
    ///
    /// Pipes held open by descendants of the child get a short grace
    /// period after exit, then they are abandoned.
    pub async fn finish(mut self) -> Result<(), RunnerError> {
        let status = self.wait().await?;

        let TrainRun {
            mut lines,
            lines_closed,
            reader,
            mut stderr,
            ..
        } = self;

        let grace = Duration::from_millis(PIPE_DRAIN_GRACE_MS);
        if !lines_closed {
            let drained = tokio::time::timeout(grace, async {
                while lines.recv().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                log::warn!("Training stdout still open after exit, abandoning it");
                reader.abort();
            }
        }

        match reader.await {
            Ok(Ok(count)) => log::debug!("Training stdout closed after {} lines", count),
            Ok(Err(e)) => log::warn!("Training stdout read failed: {}", e),
            Err(e) if e.is_cancelled() => {}
            Err(e) => log::warn!("Training stdout reader aborted: {}", e),
        }

        let stderr = match tokio::time::timeout(grace, &mut stderr).await {
            Ok(text) => text.unwrap_or_default(),
            Err(_) => {
                log::warn!("Training stderr still open after exit, abandoning it");
                stderr.abort();
                String::new()
            }
        };

        if status.success() {
            log::info!("Training process exited successfully");
            Ok(())
        } else {
            log::warn!("Training process failed: {}", status);
            Err(RunnerError::ProcessFailed {
                mode: RunMode::Train,
                code: status.code(),
                stderr: stderr.trim().to_string(),
            })
        }
    }

    /// Terminate the child and wait for it to be reaped
    pub async fn kill(self) -> Result<(), RunnerError> {
        let TrainRun {
            mut child,
            lines,
            reader,
            stderr,
            ..
        } = self;

        drop(lines);
        reader.abort();
        stderr.abort();
        child.kill().await?;
        log::info!("Training process killed");
        Ok(())
    }
}

// ============================================================================
// PIPE TASKS
// ============================================================================

/// Forward stdout line by line until EOF or until the consumer goes away
async fn pump_lines(stdout: ChildStdout, tx: mpsc::Sender<String>) -> std::io::Result<u64> {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    let mut count = 0u64;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(count);
        }
        count += 1;

        let line = String::from_utf8_lossy(&buf)
            .trim_end_matches(&['\r', '\n'][..])
            .to_string();
        if tx.send(line).await.is_err() {
            return Ok(count);
        }
    }
}

async fn read_to_string<R: AsyncRead + Unpin>(mut pipe: R) -> std::io::Result<String> {
    let mut buf = Vec::new();
    pipe.read_to_end(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Keep at most the last `cap` bytes written to the pipe
async fn collect_tail<R: AsyncRead + Unpin>(mut pipe: R, cap: usize) -> String {
    let mut tail: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&chunk[..n]);
                if tail.len() > cap {
                    let excess = tail.len() - cap;
                    tail.drain(..excess);
                }
            }
        }
    }

    String::from_utf8_lossy(&tail).into_owned()
}
