use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};

/// A command line plus working directory, independent of how it gets run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).stdin(Stdio::null());
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        command
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Result of a command that was run to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Control over a spawned long-running process.
#[async_trait]
pub trait ProcessHandle: Send {
    /// Waits for the process to exit and returns its exit code (`None` if it was
    /// killed by a signal). Must be safe to cancel and call again.
    async fn wait(&mut self) -> io::Result<Option<i32>>;

    /// Sends a termination signal without waiting for the process to exit.
    fn start_kill(&mut self) -> io::Result<()>;
}

pub type OutputStream = Box<dyn AsyncRead + Send + Unpin>;

/// A freshly spawned process with its output pipes.
pub struct SpawnedProcess {
    pub pid: Option<u32>,
    pub stdout: OutputStream,
    pub stderr: Option<OutputStream>,
    pub handle: Box<dyn ProcessHandle>,
}

impl fmt::Debug for SpawnedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnedProcess")
            .field("pid", &self.pid)
            .field("stderr", &self.stderr.is_some())
            .finish_non_exhaustive()
    }
}

/// Starts external processes on behalf of the resolver, the probe and the
/// supervisor.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Runs `command` to completion, capturing stdout.
    async fn output(&self, command: &CommandSpec) -> io::Result<CommandOutput>;

    /// Spawns `command` with piped stdout and stderr.
    fn spawn(&self, command: &CommandSpec) -> io::Result<SpawnedProcess>;
}

/// Launches real OS processes through `tokio::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioLauncher;

#[async_trait]
impl ProcessLauncher for TokioLauncher {
    async fn output(&self, command: &CommandSpec) -> io::Result<CommandOutput> {
        let output = command.to_command().output().await?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }

    fn spawn(&self, command: &CommandSpec) -> io::Result<SpawnedProcess> {
        let mut child = command
            .to_command()
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("child stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .map(|stderr| Box::new(stderr) as OutputStream);

        Ok(SpawnedProcess {
            pid: child.id(),
            stdout: Box::new(stdout),
            stderr,
            handle: Box::new(ChildHandle(child)),
        })
    }
}

struct ChildHandle(Child);

#[async_trait]
impl ProcessHandle for ChildHandle {
    async fn wait(&mut self) -> io::Result<Option<i32>> {
        Ok(self.0.wait().await?.code())
    }

    fn start_kill(&mut self) -> io::Result<()> {
        self.0.start_kill()
    }
}
