use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use super::error::ServerError;
use super::interpreter::{CachedInterpreter, InterpreterPath, InterpreterResolver};
use super::launcher::{CommandSpec, OutputStream, ProcessHandle, ProcessLauncher, SpawnedProcess};
use super::readiness::{DEFAULT_READY_MARKERS, Readiness, ReadinessDetector};

/// Backend sources live here, relative to the plugin directory.
pub const BACKEND_DIR: &str = "backend_py";
pub const ENTRY_POINT: &str = "server.py";
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Lifecycle of the backend process.
///
/// ```text
/// NotStarted -> Starting -> Running -> Terminated
///                  |-> FailedToStart | ExitedEarly | TimedOut | Terminated
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerState {
    NotStarted,
    Starting,
    Running,
    FailedToStart,
    ExitedEarly { code: Option<i32> },
    TimedOut,
    Terminated,
}

impl ServerState {
    /// Whether a process is (or is about to be) owned by the supervisor.
    pub fn is_active(&self) -> bool {
        matches!(self, ServerState::Starting | ServerState::Running)
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerState::NotStarted => write!(f, "not started"),
            ServerState::Starting => write!(f, "starting"),
            ServerState::Running => write!(f, "running"),
            ServerState::FailedToStart => write!(f, "failed to start"),
            ServerState::ExitedEarly { code: Some(code) } => write!(f, "exited early (code {code})"),
            ServerState::ExitedEarly { code: None } => write!(f, "exited early (signal)"),
            ServerState::TimedOut => write!(f, "timed out"),
            ServerState::Terminated => write!(f, "terminated"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub plugin_dir: PathBuf,
    /// Relative to `plugin_dir`.
    pub entry_point: PathBuf,
    /// `None` waits for readiness indefinitely.
    pub startup_timeout: Option<Duration>,
    pub ready_markers: Vec<String>,
    /// Skips interpreter auto-detection when set.
    pub interpreter: Option<PathBuf>,
}

impl ServerOptions {
    pub fn new(plugin_dir: impl Into<PathBuf>) -> Self {
        Self {
            plugin_dir: plugin_dir.into(),
            entry_point: Path::new(BACKEND_DIR).join(ENTRY_POINT),
            startup_timeout: Some(DEFAULT_STARTUP_TIMEOUT),
            ready_markers: DEFAULT_READY_MARKERS.iter().map(|m| m.to_string()).collect(),
            interpreter: None,
        }
    }

    pub fn with_startup_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_interpreter(mut self, interpreter: Option<PathBuf>) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn entry_point_path(&self) -> PathBuf {
        self.plugin_dir.join(&self.entry_point)
    }
}

struct RunningProcess {
    pid: Option<u32>,
    handle: Box<dyn ProcessHandle>,
    drains: Vec<JoinHandle<()>>,
}

struct Inner {
    state: ServerState,
    process: Option<RunningProcess>,
    startup: Option<CancellationToken>,
}

enum StartupFailure {
    Exited(Option<i32>),
    WaitFailed(io::Error),
    TimedOut(Duration),
    Cancelled,
}

/// Owns the backend `server.py` process: spawns it, waits for it to announce
/// readiness on stdout, and terminates it.
///
/// At most one process is owned at a time. Dropping the supervisor terminates
/// the process.
pub struct ServerSupervisor {
    options: ServerOptions,
    launcher: Arc<dyn ProcessLauncher>,
    interpreter: CachedInterpreter,
    detector: ReadinessDetector,
    inner: Mutex<Inner>,
}

impl ServerSupervisor {
    pub fn new(options: ServerOptions, launcher: Arc<dyn ProcessLauncher>) -> Self {
        let interpreter = CachedInterpreter::new(
            InterpreterResolver::new(launcher.clone()),
            options.interpreter.clone(),
        );
        let detector = ReadinessDetector::new(options.ready_markers.clone());
        Self {
            options,
            launcher,
            interpreter,
            detector,
            inner: Mutex::new(Inner {
                state: ServerState::NotStarted,
                process: None,
                startup: None,
            }),
        }
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// The interpreter the backend is (or will be) launched with. Resolved on
    /// first use and cached.
    pub async fn interpreter(&self) -> InterpreterPath {
        self.interpreter.get().await.clone()
    }

    /// Uses `interpreter` from now on, or goes back to auto-detection with `None`.
    pub fn reconfigure_interpreter(&mut self, interpreter: Option<&Path>) {
        self.interpreter.reconfigure(interpreter);
    }

    pub fn state(&self) -> ServerState {
        self.lock().state.clone()
    }

    pub fn pid(&self) -> Option<u32> {
        self.lock().process.as_ref().and_then(|p| p.pid)
    }

    /// Spawns the backend and resolves once its stdout signals readiness, even
    /// mid-line.
    ///
    /// Fails if the process cannot be spawned, exits first, does not become
    /// ready within the startup timeout, or [`stop`](Self::stop) is called
    /// meanwhile. In the last two cases the process is killed.
    #[instrument(skip(self), fields(plugin_dir = %self.options.plugin_dir.display()))]
    pub async fn start(&self) -> Result<Readiness, ServerError> {
        let startup = CancellationToken::new();
        {
            let mut inner = self.lock();
            if inner.state.is_active() {
                return Err(ServerError::AlreadyStarted);
            }
            inner.state = ServerState::Starting;
            inner.startup = Some(startup.clone());
        }

        let entry_point = self.options.entry_point_path();
        if !fs::try_exists(&entry_point).await.unwrap_or(false) {
            error!(entry_point = %entry_point.display(), "Backend entry point missing");
            self.settle(ServerState::FailedToStart);
            return Err(ServerError::EntryPointMissing(entry_point));
        }

        let interpreter = self.interpreter().await;
        if startup.is_cancelled() {
            info!("Backend startup cancelled before spawning");
            self.settle(ServerState::Terminated);
            return Err(ServerError::StartupCancelled);
        }

        let command = CommandSpec::new(interpreter.program())
            .arg(&entry_point)
            .current_dir(&self.options.plugin_dir);

        let SpawnedProcess { pid, stdout, stderr, mut handle } = match self.launcher.spawn(&command) {
            Ok(spawned) => spawned,
            Err(source) => {
                error!(command = %command, error = %source, "Failed to spawn backend");
                self.settle(ServerState::FailedToStart);
                return Err(ServerError::Spawn {
                    interpreter: interpreter.to_string(),
                    source,
                });
            }
        };
        info!(?pid, %interpreter, "Backend spawned, waiting for readiness");

        let mut drains = Vec::with_capacity(2);
        if let Some(stderr) = stderr {
            drains.push(tokio::spawn(drain_output(OutputLines::new(stderr), "stderr")));
        }

        let mut stdout = OutputLines::new(stdout);
        let failure = match self.await_readiness(&mut stdout, handle.as_mut(), &startup).await {
            Ok(readiness) => {
                drains.push(tokio::spawn(drain_output(stdout, "stdout")));
                let mut inner = self.lock();
                inner.startup = None;
                if startup.is_cancelled() {
                    // stop() ran after readiness was seen but before the process was stored
                    kill(handle.as_mut(), pid);
                    abort_all(&drains);
                    inner.state = ServerState::Terminated;
                    return Err(ServerError::StartupCancelled);
                }
                info!(?pid, ?readiness, "Backend ready");
                inner.state = ServerState::Running;
                inner.process = Some(RunningProcess { pid, handle, drains });
                return Ok(readiness);
            }
            Err(failure) => failure,
        };

        let (state, err) = match failure {
            StartupFailure::Exited(code) => {
                error!(?code, "Backend exited before it was ready");
                (ServerState::ExitedEarly { code }, ServerError::ExitedEarly { code })
            }
            StartupFailure::WaitFailed(e) => {
                error!(error = %e, "Lost track of backend process");
                kill(handle.as_mut(), pid);
                (ServerState::FailedToStart, ServerError::Wait(e))
            }
            StartupFailure::TimedOut(timeout) => {
                error!(?timeout, "Backend did not become ready in time");
                kill(handle.as_mut(), pid);
                (ServerState::TimedOut, ServerError::StartupTimeout(timeout))
            }
            StartupFailure::Cancelled => {
                info!("Backend startup cancelled");
                kill(handle.as_mut(), pid);
                (ServerState::Terminated, ServerError::StartupCancelled)
            }
        };
        abort_all(&drains);
        self.settle(state);
        Err(err)
    }

    /// Terminates the backend. Safe to call in any state, any number of times.
    pub fn stop(&self) {
        let mut inner = self.lock();
        if let Some(startup) = inner.startup.take() {
            startup.cancel();
        }
        if let Some(mut process) = inner.process.take() {
            kill(process.handle.as_mut(), process.pid);
            abort_all(&process.drains);
            inner.state = ServerState::Terminated;
        }
    }

    async fn await_readiness<R>(
        &self,
        stdout: &mut OutputLines<R>,
        handle: &mut dyn ProcessHandle,
        startup: &CancellationToken,
    ) -> Result<Readiness, StartupFailure>
    where
        R: AsyncRead + Unpin,
    {
        let timeout = self.options.startup_timeout;
        let deadline = async move {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let mut stdout_open = true;
        loop {
            tokio::select! {
                biased;

                _ = startup.cancelled() => return Err(StartupFailure::Cancelled),

                chunk = stdout.next_chunk(), if stdout_open => match chunk {
                    Ok(Some(text)) => {
                        trace!(target: "quicknote::backend", stream = "stdout", "{text}");
                        if let Some(readiness) = self.detector.detect(&text) {
                            return Ok(readiness);
                        }
                    }
                    Ok(None) => {
                        debug!("Backend closed stdout");
                        stdout_open = false;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read backend stdout");
                        stdout_open = false;
                    }
                },

                exit = handle.wait() => return Err(match exit {
                    Ok(code) => StartupFailure::Exited(code),
                    Err(e) => StartupFailure::WaitFailed(e),
                }),

                _ = &mut deadline => {
                    return Err(StartupFailure::TimedOut(timeout.unwrap_or_default()));
                }
            }
        }
    }

    /// Records the outcome of a failed start.
    fn settle(&self, state: ServerState) {
        let mut inner = self.lock();
        inner.startup = None;
        inner.state = state;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ServerSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for ServerSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSupervisor")
            .field("options", &self.options)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn kill(handle: &mut dyn ProcessHandle, pid: Option<u32>) {
    match handle.start_kill() {
        Ok(()) => info!(?pid, "Backend terminated"),
        Err(e) => debug!(?pid, error = %e, "Backend could not be signalled, assuming it already exited"),
    }
}

fn abort_all(tasks: &[JoinHandle<()>]) {
    for task in tasks {
        task.abort();
    }
}

/// Line splitter over process output that tolerates invalid UTF-8 and can be
/// cancelled between calls without losing a partial line.
///
/// Bytes are kept in `buf` until a newline arrives, so a fragment seen by
/// [`next_chunk`](Self::next_chunk) is still part of the next full line.
struct OutputLines<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    unseen_fragment: bool,
}

impl<R: AsyncRead + Unpin> OutputLines<R> {
    fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buf: Vec::new(),
            unseen_fragment: false,
        }
    }

    /// The next line, trimmed. `None` at end of stream.
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        if let Some(line) = self.take_line() {
            return Ok(Some(line));
        }
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 && self.buf.is_empty() {
            return Ok(None);
        }
        let line = decode(&self.buf);
        self.buf.clear();
        Ok(Some(line))
    }

    /// The next piece of text worth looking at: a complete line if one is
    /// buffered, otherwise the unterminated fragment received so far, trimmed.
    /// A fragment stays buffered and is reported again, longer, after each
    /// read that extends it. `None` at end of stream.
    async fn next_chunk(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }
            if self.unseen_fragment && !self.buf.is_empty() {
                self.unseen_fragment = false;
                return Ok(Some(decode(&self.buf)));
            }

            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                let rest = decode(&self.buf);
                self.buf.clear();
                return Ok(Some(rest));
            }
            let read = available.len();
            self.buf.extend_from_slice(available);
            self.reader.consume(read);
            self.unseen_fragment = true;
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.buf.iter().position(|b| *b == b'\n')?;
        let rest = self.buf.split_off(end + 1);
        let line = decode(&self.buf);
        self.buf = rest;
        Some(line)
    }
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

async fn drain_output(mut lines: OutputLines<OutputStream>, stream: &'static str) {
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.is_empty() => {}
            Ok(Some(line)) => debug!(target: "quicknote::backend", stream, "{line}"),
            Ok(None) => break,
            Err(e) => {
                debug!(target: "quicknote::backend", stream, error = %e, "Stopped reading backend output");
                break;
            }
        }
    }
}
