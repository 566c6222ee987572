use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_once_cell::OnceCell;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use super::launcher::{CommandSpec, ProcessLauncher};

/// Interpreter names tried in order.
pub const INTERPRETER_CANDIDATES: [&str; 2] = ["python3", "python"];

/// Used when no candidate can be located; the OS search path decides at spawn time.
pub const FALLBACK_INTERPRETER: &str = "python3";

/// The Python interpreter the backend will be launched with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpreterPath {
    /// Found by the platform locator and confirmed to exist.
    Located(PathBuf),
    /// Set explicitly in the plugin settings. Not checked.
    Configured(PathBuf),
    /// Nothing found; the bare [`FALLBACK_INTERPRETER`] token.
    Fallback,
}

impl InterpreterPath {
    /// What to pass as the program when spawning.
    pub fn program(&self) -> &OsStr {
        match self {
            InterpreterPath::Located(path) | InterpreterPath::Configured(path) => path.as_os_str(),
            InterpreterPath::Fallback => OsStr::new(FALLBACK_INTERPRETER),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, InterpreterPath::Fallback)
    }
}

impl fmt::Display for InterpreterPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program().to_string_lossy())
    }
}

/// The program used to look up executables on the search path.
pub fn locator_command() -> &'static str {
    if cfg!(windows) { "where" } else { "which" }
}

/// Finds an installed Python interpreter using the platform locator.
#[derive(Clone)]
pub struct InterpreterResolver {
    launcher: Arc<dyn ProcessLauncher>,
    candidates: Vec<String>,
}

impl InterpreterResolver {
    pub fn new(launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self {
            launcher,
            candidates: INTERPRETER_CANDIDATES.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Tries each candidate in order and returns the first located path that
    /// exists on disk. Never fails: falls back to [`InterpreterPath::Fallback`].
    #[instrument(skip(self))]
    pub async fn resolve(&self) -> InterpreterPath {
        let locator = locator_command();
        for candidate in &self.candidates {
            let command = CommandSpec::new(locator).arg(candidate);
            let output = match self.launcher.output(&command).await {
                Ok(output) => output,
                Err(e) => {
                    debug!(candidate, error = %e, "Locator could not be run");
                    continue;
                }
            };
            if !output.success() {
                debug!(candidate, code = ?output.code, "Candidate not on search path");
                continue;
            }

            let Some(path) = first_path_line(&output.stdout) else {
                debug!(candidate, "Locator printed nothing");
                continue;
            };
            if fs::try_exists(&path).await.unwrap_or(false) {
                info!(interpreter = %path.display(), "Python interpreter located");
                return InterpreterPath::Located(path);
            }
            debug!(candidate, path = %path.display(), "Located interpreter does not exist");
        }

        warn!(fallback = FALLBACK_INTERPRETER, "No Python interpreter located, using fallback");
        InterpreterPath::Fallback
    }
}

impl fmt::Debug for InterpreterResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterpreterResolver")
            .field("candidates", &self.candidates)
            .finish_non_exhaustive()
    }
}

/// `where` can list several matches, one per line, with CRLF endings.
fn first_path_line(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(PathBuf::from)
}

/// Resolves the interpreter once and reuses the result.
#[derive(Debug)]
pub struct CachedInterpreter {
    resolver: InterpreterResolver,
    configured: Option<PathBuf>,
    cell: OnceCell<InterpreterPath>,
}

impl CachedInterpreter {
    pub fn new(resolver: InterpreterResolver, configured: Option<PathBuf>) -> Self {
        Self {
            resolver,
            configured,
            cell: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> &InterpreterPath {
        self.cell
            .get_or_init(async {
                match &self.configured {
                    Some(path) => {
                        debug!(interpreter = %path.display(), "Using configured interpreter");
                        InterpreterPath::Configured(path.clone())
                    }
                    None => self.resolver.resolve().await,
                }
            })
            .await
    }

    /// The resolved interpreter, if resolution already happened.
    pub fn cached(&self) -> Option<&InterpreterPath> {
        self.cell.get()
    }

    /// Switches to a different configured interpreter (or back to auto-detection)
    /// and forgets the cached result.
    pub fn reconfigure(&mut self, configured: Option<&Path>) {
        self.configured = configured.map(Path::to_path_buf);
        self.invalidate();
    }

    /// Forgets the cached result; the next [`get`](Self::get) resolves again.
    pub fn invalidate(&mut self) {
        self.cell = OnceCell::new();
    }
}
