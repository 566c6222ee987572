use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::interpreter::InterpreterPath;
use super::launcher::{CommandSpec, ProcessLauncher};

/// Modules the backend imports at startup.
pub const DEFAULT_REQUIRED_MODULES: [&str; 2] = ["flask", "ollama"];

/// Result of trying to import the backend's modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyStatus {
    Satisfied,
    Missing,
    /// The interpreter itself could not be launched.
    Indeterminate,
}

/// How an [`DependencyStatus::Indeterminate`] probe is reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndeterminatePolicy {
    /// Warn that the check could not run, but do not claim anything is missing.
    #[default]
    NonBlocking,
    /// Report it like missing dependencies.
    TreatAsMissing,
}

/// Which advisory, if any, the user should see after probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeAdvice {
    None,
    CouldNotVerify,
    Missing,
}

impl IndeterminatePolicy {
    pub fn advise(self, status: DependencyStatus) -> ProbeAdvice {
        match (status, self) {
            (DependencyStatus::Satisfied, _) => ProbeAdvice::None,
            (DependencyStatus::Missing, _) => ProbeAdvice::Missing,
            (DependencyStatus::Indeterminate, IndeterminatePolicy::NonBlocking) => ProbeAdvice::CouldNotVerify,
            (DependencyStatus::Indeterminate, IndeterminatePolicy::TreatAsMissing) => ProbeAdvice::Missing,
        }
    }
}

/// Checks whether an interpreter can import the backend's modules by running
/// `<interpreter> -c "import a, b"` and looking at the exit code.
///
/// Advisory only. Nothing is installed or changed.
#[derive(Clone)]
pub struct DependencyProbe {
    launcher: Arc<dyn ProcessLauncher>,
    modules: Vec<String>,
}

impl DependencyProbe {
    pub fn new(launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self {
            launcher,
            modules: DEFAULT_REQUIRED_MODULES.iter().map(|m| m.to_string()).collect(),
        }
    }

    pub fn with_modules(mut self, modules: Vec<String>) -> Self {
        self.modules = modules;
        self
    }

    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    /// The `-c` argument, e.g. `import flask, ollama`.
    pub fn import_directive(&self) -> String {
        format!("import {}", self.modules.join(", "))
    }

    #[instrument(skip(self), fields(interpreter = %interpreter))]
    pub async fn check(&self, interpreter: &InterpreterPath, working_dir: &Path) -> DependencyStatus {
        let command = CommandSpec::new(interpreter.program())
            .arg("-c")
            .arg(self.import_directive())
            .current_dir(working_dir);

        match self.launcher.output(&command).await {
            Ok(output) if output.success() => {
                debug!("Backend dependencies importable");
                DependencyStatus::Satisfied
            }
            Ok(output) => {
                warn!(code = ?output.code, modules = ?self.modules, "Backend dependencies missing");
                DependencyStatus::Missing
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(error = %e, "Interpreter could not be launched, dependency check skipped");
                DependencyStatus::Indeterminate
            }
            Err(e) => {
                warn!(error = %e, "Dependency check failed to run");
                DependencyStatus::Missing
            }
        }
    }
}

impl fmt::Debug for DependencyProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyProbe")
            .field("modules", &self.modules)
            .finish_non_exhaustive()
    }
}
