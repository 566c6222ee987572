//! Supervision of the Python backend that serves summaries.
//!
//! Starting the backend means finding an interpreter ([`interpreter`]),
//! optionally checking that it can import the backend's modules ([`probe`]),
//! spawning `backend_py/server.py` and waiting until it says it is listening
//! ([`supervisor`], [`readiness`]). All processes go through a
//! [`launcher::ProcessLauncher`] so tests can substitute scripted ones.

pub mod error;
pub mod interpreter;
pub mod launcher;
pub mod probe;
pub mod readiness;
pub mod supervisor;

pub use error::ServerError;
pub use interpreter::{CachedInterpreter, InterpreterPath, InterpreterResolver};
pub use launcher::{CommandOutput, CommandSpec, ProcessHandle, ProcessLauncher, SpawnedProcess, TokioLauncher};
pub use probe::{DependencyProbe, DependencyStatus, IndeterminatePolicy, ProbeAdvice};
pub use readiness::{Readiness, ReadinessDetector};
pub use supervisor::{ServerOptions, ServerState, ServerSupervisor};
