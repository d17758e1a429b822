//! Supervision of a single external encoder process.
//!
//! A run moves through `Spawning -> Starting -> Running -> Settling` and ends
//! in exactly one terminal state. Startup is confirmed either by the first
//! byte on stdout/stderr or by the injected [`ProgressSignal`] turning
//! positive, whichever happens first; until then a startup deadline is armed.
//! Once running, the process is never killed for being slow: stalls are only
//! logged.

use gifbatch_config::TimeoutsConfig;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Upper bound on captured text per stream; older output is discarded first.
const MAX_CAPTURE_BYTES: usize = 256 * 1024;

/// Starts external processes. The seam tests use to observe or fake launches.
pub trait Launcher: Send + Sync {
    /// Spawn `program` with `args`, stdout and stderr piped.
    fn launch(&self, program: &Path, args: &[OsString]) -> io::Result<Child>;
}

/// Launches real OS processes via `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn launch(&self, program: &Path, args: &[OsString]) -> io::Result<Child> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        isolate_process_group(&mut cmd);
        cmd.spawn()
    }
}

/// Run the child in its own process group so a terminal Ctrl-C reaches only
/// the caller, which then cancels between jobs.
#[cfg(unix)]
fn isolate_process_group(cmd: &mut Command) {
    cmd.process_group(0);
}

#[cfg(windows)]
fn isolate_process_group(cmd: &mut Command) {
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
}

#[cfg(not(any(unix, windows)))]
fn isolate_process_group(_cmd: &mut Command) {}

/// Externally observable evidence that a process is doing work.
pub trait ProgressSignal: Send + Sync {
    /// Current value; only increases are treated as activity.
    fn sample(&self) -> u64;
}

/// Number of extracted frame files in a directory.
#[derive(Debug, Clone)]
pub struct FrameCountSignal {
    dir: PathBuf,
}

impl FrameCountSignal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ProgressSignal for FrameCountSignal {
    fn sample(&self) -> u64 {
        crate::workspace::count_frames(&self.dir) as u64
    }
}

/// Byte size of a file that grows while the process writes it.
#[derive(Debug, Clone)]
pub struct FileSizeSignal {
    path: PathBuf,
}

impl FileSizeSignal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ProgressSignal for FileSizeSignal {
    fn sample(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }
}

impl<F> ProgressSignal for F
where
    F: Fn() -> u64 + Send + Sync,
{
    fn sample(&self) -> u64 {
        self()
    }
}

/// Supervisor timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorTimeouts {
    /// Silence allowed before the process counts as never started.
    pub startup: Duration,
    /// Wait between the graceful terminate and the forced kill.
    pub kill_grace: Duration,
    /// Activity monitor cadence.
    pub poll_interval: Duration,
    /// No-progress window before a stall warning.
    pub stall_threshold: Duration,
}

impl Default for SupervisorTimeouts {
    fn default() -> Self {
        Self::from(&TimeoutsConfig::default())
    }
}

impl From<&TimeoutsConfig> for SupervisorTimeouts {
    fn from(config: &TimeoutsConfig) -> Self {
        Self {
            startup: Duration::from_secs(config.startup_secs),
            kill_grace: Duration::from_secs(config.kill_grace_secs),
            // A zero period would make the interval panic
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            stall_threshold: Duration::from_secs(config.stall_threshold_secs),
        }
    }
}

/// Lifecycle of one supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Spawning,
    Starting,
    Running,
    Settling,
    Succeeded,
    Failed,
    Killed,
}

impl SupervisorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupervisorState::Spawning => "spawning",
            SupervisorState::Starting => "starting",
            SupervisorState::Running => "running",
            SupervisorState::Settling => "settling",
            SupervisorState::Succeeded => "succeeded",
            SupervisorState::Failed => "failed",
            SupervisorState::Killed => "killed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SupervisorState::Succeeded | SupervisorState::Failed | SupervisorState::Killed
        )
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a supervised process settled.
#[derive(Debug)]
pub enum ExitReason {
    /// Exit code 0.
    Succeeded,
    /// Nonzero exit code.
    NonZeroExit(i32),
    /// No exit code: terminated by a signal or never reaped.
    Killed,
    /// Neither output nor progress before the startup deadline.
    StartupTimeout,
    /// The launch itself failed.
    SpawnFailed(io::Error),
}

/// Text captured from the process streams.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    /// The diagnostic payload: stderr, or stdout when stderr is empty.
    pub fn diagnostic(&self) -> &str {
        if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        }
    }
}

/// Final result of a supervised run.
#[derive(Debug)]
pub struct SettleResult {
    pub reason: ExitReason,
    pub output: CapturedOutput,
    /// Highest progress signal value observed.
    pub progress: u64,
    pub pid: Option<u32>,
}

impl SettleResult {
    pub fn ok(&self) -> bool {
        matches!(self.reason, ExitReason::Succeeded)
    }

    /// Terminal state corresponding to [`SettleResult::reason`].
    pub fn state(&self) -> SupervisorState {
        match self.reason {
            ExitReason::Succeeded => SupervisorState::Succeeded,
            ExitReason::Killed => SupervisorState::Killed,
            _ => SupervisorState::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    Stdout,
    Stderr,
}

/// Mutable bookkeeping for one live process.
#[derive(Debug)]
struct ProcessHandle {
    label: &'static str,
    pid: Option<u32>,
    state: SupervisorState,
    output: CapturedOutput,
    started: bool,
    last_activity: Instant,
    progress: u64,
    stall_warned: bool,
}

impl ProcessHandle {
    fn new(label: &'static str) -> Self {
        Self {
            label,
            pid: None,
            state: SupervisorState::Spawning,
            output: CapturedOutput::default(),
            started: false,
            last_activity: Instant::now(),
            progress: 0,
            stall_warned: false,
        }
    }

    fn transition(&mut self, next: SupervisorState) {
        debug!(
            stage = self.label,
            pid = ?self.pid,
            from = %self.state,
            to = %next,
            "Supervisor transition"
        );
        self.state = next;
    }

    fn mark_started(&mut self, source: &str) {
        if self.started {
            return;
        }
        self.started = true;
        self.transition(SupervisorState::Running);
        info!(stage = self.label, pid = ?self.pid, source, "Process started");
    }

    fn record_output(&mut self, kind: StreamKind, bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes);
        self.last_activity = Instant::now();
        self.stall_warned = false;
        match kind {
            StreamKind::Stdout => {
                append_capped(&mut self.output.stdout, &text);
                self.mark_started("stdout");
            }
            StreamKind::Stderr => {
                append_capped(&mut self.output.stderr, &text);
                self.mark_started("stderr");
                if let Some(frame) = parse_frame_counter(&text) {
                    debug!(stage = self.label, frame, "Encoder frame counter");
                }
            }
        }
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            debug!(stage = self.label, "{}", line);
        }
    }

    fn poll_activity(&mut self, sample: u64, alive: bool, stall_threshold: Duration) {
        if sample > 0 && !self.started {
            self.mark_started("progress signal");
        }

        if sample > self.progress {
            self.progress = sample;
            self.last_activity = Instant::now();
            self.stall_warned = false;
            debug!(stage = self.label, progress = sample, "Progress");
        }

        let idle = self.last_activity.elapsed();
        if self.started && alive && idle >= stall_threshold && !self.stall_warned {
            self.stall_warned = true;
            warn!(
                stage = self.label,
                pid = ?self.pid,
                idle_secs = idle.as_secs(),
                progress = self.progress,
                "Process appears stuck; still waiting"
            );
        }
    }

    fn settle(mut self, reason: ExitReason) -> SettleResult {
        let result = SettleResult {
            reason,
            output: std::mem::take(&mut self.output),
            progress: self.progress,
            pid: self.pid,
        };
        self.transition(result.state());
        result
    }
}

/// Runs one external process to completion under timeout and stall supervision.
#[derive(Clone)]
pub struct ProcessSupervisor {
    launcher: Arc<dyn Launcher>,
    timeouts: SupervisorTimeouts,
    label: &'static str,
}

impl ProcessSupervisor {
    /// `label` names the stage in logs.
    pub fn new(launcher: Arc<dyn Launcher>, timeouts: SupervisorTimeouts, label: &'static str) -> Self {
        Self {
            launcher,
            timeouts,
            label,
        }
    }

    /// Spawn `program` and supervise it until it settles.
    ///
    /// Always returns exactly one [`SettleResult`]; launch errors are reported
    /// as [`ExitReason::SpawnFailed`] rather than as an `Err`.
    pub async fn run(
        &self,
        program: &Path,
        args: &[OsString],
        signal: &dyn ProgressSignal,
    ) -> SettleResult {
        let mut handle = ProcessHandle::new(self.label);
        debug!(stage = self.label, program = %program.display(), ?args, "Spawning");

        let mut child = match self.launcher.launch(program, args) {
            Ok(child) => child,
            Err(e) => {
                warn!(stage = self.label, program = %program.display(), error = %e, "Spawn failed");
                return handle.settle(ExitReason::SpawnFailed(e));
            }
        };
        handle.pid = child.id();
        handle.transition(SupervisorState::Starting);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, StreamKind::Stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, StreamKind::Stderr, tx.clone()));
        }
        drop(tx);

        let startup_deadline = tokio::time::sleep(self.timeouts.startup);
        tokio::pin!(startup_deadline);
        let mut poll = tokio::time::interval(self.timeouts.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut streams_open = true;

        let status = loop {
            tokio::select! {
                status = child.wait() => break status,
                chunk = rx.recv(), if streams_open => match chunk {
                    Some((kind, bytes)) => handle.record_output(kind, &bytes),
                    None => streams_open = false,
                },
                _ = &mut startup_deadline, if !handle.started => {
                    warn!(
                        stage = self.label,
                        pid = ?handle.pid,
                        timeout_secs = self.timeouts.startup.as_secs_f64(),
                        "No output before startup timeout; terminating"
                    );
                    self.terminate(&mut child).await;
                    abort_readers(&readers);
                    while let Ok((kind, bytes)) = rx.try_recv() {
                        handle.record_output(kind, &bytes);
                    }
                    return handle.settle(ExitReason::StartupTimeout);
                }
                _ = poll.tick() => {
                    let alive = matches!(child.try_wait(), Ok(None));
                    handle.poll_activity(signal.sample(), alive, self.timeouts.stall_threshold);
                }
            }
        };

        handle.transition(SupervisorState::Settling);

        // Grandchildren can keep a pipe open after the process exits
        let drain = async {
            while let Some((kind, bytes)) = rx.recv().await {
                handle.record_output(kind, &bytes);
            }
        };
        if tokio::time::timeout(self.timeouts.kill_grace, drain).await.is_err() {
            debug!(stage = self.label, "Output streams still open after exit; detaching");
        }
        abort_readers(&readers);

        let sample = signal.sample();
        if sample > handle.progress {
            handle.progress = sample;
        }

        let reason = classify_exit(status);
        info!(
            stage = self.label,
            pid = ?handle.pid,
            reason = ?reason,
            progress = handle.progress,
            "Process finished"
        );
        handle.settle(reason)
    }

    /// Graceful terminate, then a forced kill once the grace window passes.
    async fn terminate(&self, child: &mut Child) {
        send_terminate(child);
        if tokio::time::timeout(self.timeouts.kill_grace, child.wait())
            .await
            .is_err()
        {
            warn!(stage = self.label, "Process ignored terminate; killing");
            if let Err(e) = child.kill().await {
                warn!(stage = self.label, error = %e, "Error killing process");
            }
        }
    }
}

fn classify_exit(status: io::Result<ExitStatus>) -> ExitReason {
    match status {
        Ok(status) => match status.code() {
            Some(0) => ExitReason::Succeeded,
            Some(code) => ExitReason::NonZeroExit(code),
            None => ExitReason::Killed,
        },
        Err(e) => {
            warn!(error = %e, "Failed to reap process");
            ExitReason::Killed
        }
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // `id()` is None once the child has been reaped
    if let Some(pid) = child.id() {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            warn!(pid, error = %e, "Failed to send SIGTERM");
        }
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) {
    let _ = child.start_kill();
}

fn spawn_reader<R>(
    mut stream: R,
    kind: StreamKind,
    tx: mpsc::UnboundedSender<(StreamKind, Vec<u8>)>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; 8192];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send((kind, buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

fn abort_readers(readers: &[JoinHandle<()>]) {
    for reader in readers {
        reader.abort();
    }
}

fn append_capped(buf: &mut String, text: &str) {
    buf.push_str(text);
    if buf.len() > MAX_CAPTURE_BYTES {
        let mut cut = buf.len() - MAX_CAPTURE_BYTES;
        while !buf.is_char_boundary(cut) {
            cut += 1;
        }
        buf.drain(..cut);
    }
}

/// Last `frame=<n>` counter in an ffmpeg progress chunk.
pub fn parse_frame_counter(text: &str) -> Option<u64> {
    let idx = text.rfind("frame=")?;
    let digits: String = text[idx + "frame=".len()..]
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
