use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("server.py not found at {}", .0.display())]
    EntryPointMissing(PathBuf),

    #[error("Backend server is already starting or running")]
    AlreadyStarted,

    #[error("Failed to spawn backend with interpreter '{interpreter}': {source}")]
    Spawn {
        interpreter: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Backend server exited before it was ready ({})", exit_code_label(.code))]
    ExitedEarly { code: Option<i32> },

    #[error("Backend server did not report readiness within {0:?}")]
    StartupTimeout(Duration),

    #[error("Backend server startup was cancelled")]
    StartupCancelled,

    #[error("Failed to wait for backend process: {0}")]
    Wait(#[source] std::io::Error),
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}
