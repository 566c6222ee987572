mod common;

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use common::{ScriptedLauncher, fake_process, plugin_dir_with_entry_point};
use quicknote_extensions::plugin::python::backend::{
    Readiness, ServerError, ServerOptions, ServerState, ServerSupervisor,
};

fn supervisor(plugin_dir: &std::path::Path, launcher: Arc<ScriptedLauncher>) -> ServerSupervisor {
    let options = ServerOptions::new(plugin_dir)
        .with_interpreter(Some("/usr/bin/python3".into()))
        .with_startup_timeout(Some(Duration::from_secs(5)));
    ServerSupervisor::new(options, launcher)
}

#[tokio::test]
async fn ready_only_after_banner() {
    common::init_tracing();
    let dir = plugin_dir_with_entry_point();
    let launcher = ScriptedLauncher::new();
    let (mut backend, process) = fake_process();
    launcher.push_spawn(process);
    let server = supervisor(dir.path(), launcher.clone());

    let (result, _) = tokio::join!(server.start(), async {
        backend.say("Loading model weights...").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.state(), ServerState::Starting);
        backend.say(" * Running on http://127.0.0.1:5000").await;
    });

    assert_eq!(result.unwrap(), Readiness::Banner("Running on".to_string()));
    assert_eq!(server.state(), ServerState::Running);
    assert_eq!(server.pid(), Some(4242));

    let spawned = &launcher.calls()[0];
    assert_eq!(spawned.program, "/usr/bin/python3");
    assert_eq!(spawned.args, vec![dir.path().join("backend_py").join("server.py").into_os_string()]);
    assert_eq!(spawned.cwd.as_deref(), Some(dir.path()));

    // Output after readiness is drained, not re-evaluated
    backend.say(" * Serving Flask app 'server'").await;
    assert_eq!(server.state(), ServerState::Running);

    server.stop();
    assert!(backend.was_killed());
    assert_eq!(server.state(), ServerState::Terminated);
}

#[tokio::test]
async fn handshake_line_signals_readiness() {
    let dir = plugin_dir_with_entry_point();
    let launcher = ScriptedLauncher::new();
    let (mut backend, process) = fake_process();
    launcher.push_spawn(process);
    backend.say(r#"{"event":"ready","protocol":1}"#).await;

    let server = supervisor(dir.path(), launcher);
    assert_eq!(server.start().await.unwrap(), Readiness::Handshake { protocol: 1 });
}

#[tokio::test]
async fn exit_before_banner_reports_code() {
    let dir = plugin_dir_with_entry_point();
    let launcher = ScriptedLauncher::new();
    let (mut backend, process) = fake_process();
    launcher.push_spawn(process);
    backend.say("Traceback (most recent call last):").await;
    backend.say("ModuleNotFoundError: No module named 'flask'").await;
    backend.exit(1);

    let server = supervisor(dir.path(), launcher);
    let err = server.start().await.unwrap_err();
    assert!(matches!(err, ServerError::ExitedEarly { code: Some(1) }), "{err:?}");
    assert_eq!(server.state(), ServerState::ExitedEarly { code: Some(1) });
}

#[tokio::test]
async fn spawn_error_fails_immediately() {
    let dir = plugin_dir_with_entry_point();
    let launcher = ScriptedLauncher::new();
    launcher.push_spawn_error(ErrorKind::PermissionDenied);

    let server = supervisor(dir.path(), launcher);
    let err = tokio::time::timeout(Duration::from_secs(1), server.start())
        .await
        .expect("spawn failure must not wait for output")
        .unwrap_err();
    assert!(matches!(err, ServerError::Spawn { .. }), "{err:?}");
    assert_eq!(server.state(), ServerState::FailedToStart);
}

#[tokio::test]
async fn missing_entry_point_fails_before_spawning() {
    let dir = tempfile::tempdir().unwrap();
    let launcher = ScriptedLauncher::new();
    let server = supervisor(dir.path(), launcher.clone());

    let err = server.start().await.unwrap_err();
    assert!(matches!(err, ServerError::EntryPointMissing(ref path) if path.ends_with("backend_py/server.py")));
    assert!(err.to_string().starts_with("server.py not found at "));
    assert_eq!(launcher.spawn_count(), 0);
    assert_eq!(server.state(), ServerState::FailedToStart);
}

#[tokio::test]
async fn timeout_kills_the_process() {
    let dir = plugin_dir_with_entry_point();
    let launcher = ScriptedLauncher::new();
    let (mut backend, process) = fake_process();
    launcher.push_spawn(process);
    backend.say("still loading").await;

    let options = ServerOptions::new(dir.path())
        .with_interpreter(Some("/usr/bin/python3".into()))
        .with_startup_timeout(Some(Duration::from_millis(100)));
    let server = ServerSupervisor::new(options, launcher);

    let err = server.start().await.unwrap_err();
    assert!(matches!(err, ServerError::StartupTimeout(t) if t == Duration::from_millis(100)));
    assert!(backend.was_killed());
    assert_eq!(server.state(), ServerState::TimedOut);
}

#[tokio::test]
async fn banner_without_trailing_newline_signals_readiness() {
    let dir = plugin_dir_with_entry_point();
    let launcher = ScriptedLauncher::new();
    let (mut backend, process) = fake_process();
    launcher.push_spawn(process);
    backend.write(" * Running on http://127.0.0.1:5000").await;

    let options = ServerOptions::new(dir.path())
        .with_interpreter(Some("/usr/bin/python3".into()))
        .with_startup_timeout(Some(Duration::from_millis(500)));
    let server = ServerSupervisor::new(options, launcher);

    assert_eq!(server.start().await.unwrap(), Readiness::Banner("Running on".to_string()));
    assert_eq!(server.state(), ServerState::Running);
    assert!(!backend.was_killed());
}

#[tokio::test]
async fn banner_split_across_writes_signals_readiness() {
    let dir = plugin_dir_with_entry_point();
    let launcher = ScriptedLauncher::new();
    let (mut backend, process) = fake_process();
    launcher.push_spawn(process);
    let server = supervisor(dir.path(), launcher);

    let (result, _) = tokio::join!(server.start(), async {
        backend.write("starting\n * Serving Fl").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.state(), ServerState::Starting);
        backend.write("ask app 'server'").await;
    });

    assert_eq!(result.unwrap(), Readiness::Banner("Serving Flask app".to_string()));
}

#[tokio::test]
async fn stop_while_resolving_interpreter_never_spawns() {
    let dir = plugin_dir_with_entry_point();
    let launcher = ScriptedLauncher::new();
    let (backend, process) = fake_process();
    launcher.push_spawn(process);
    let release = launcher.hold_next_output();

    // No configured interpreter, so start() has to ask the locator first
    let options = ServerOptions::new(dir.path()).with_startup_timeout(Some(Duration::from_secs(5)));
    let server = ServerSupervisor::new(options, launcher.clone());

    let (result, _) = tokio::join!(server.start(), async {
        launcher.output_held().await;
        server.stop();
        release.notify_one();
    });

    assert!(matches!(result, Err(ServerError::StartupCancelled)));
    assert_eq!(launcher.spawn_count(), 0);
    assert!(!backend.was_killed());
    assert_eq!(server.state(), ServerState::Terminated);
}

#[tokio::test]
async fn stop_during_startup_cancels() {
    let dir = plugin_dir_with_entry_point();
    let launcher = ScriptedLauncher::new();
    let (backend, process) = fake_process();
    launcher.push_spawn(process);
    let server = supervisor(dir.path(), launcher);

    let (result, _) = tokio::join!(server.start(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        server.stop();
    });

    assert!(matches!(result, Err(ServerError::StartupCancelled)));
    assert!(backend.was_killed());
    assert_eq!(server.state(), ServerState::Terminated);
}

#[tokio::test]
async fn second_start_while_running_is_rejected() {
    let dir = plugin_dir_with_entry_point();
    let launcher = ScriptedLauncher::new();
    let (mut backend, process) = fake_process();
    launcher.push_spawn(process);
    backend.say(" * Serving Flask app 'server'").await;

    let server = supervisor(dir.path(), launcher.clone());
    server.start().await.unwrap();
    assert!(matches!(server.start().await, Err(ServerError::AlreadyStarted)));
    assert_eq!(launcher.spawn_count(), 1);
    assert_eq!(server.state(), ServerState::Running);
}

#[tokio::test]
async fn stop_is_idempotent_and_drop_terminates() {
    let dir = plugin_dir_with_entry_point();
    let launcher = ScriptedLauncher::new();
    let (mut backend, process) = fake_process();
    launcher.push_spawn(process);
    backend.say(" * Running on http://127.0.0.1:5000").await;

    let server = supervisor(dir.path(), launcher.clone());
    server.stop();
    assert_eq!(server.state(), ServerState::NotStarted);

    server.start().await.unwrap();
    let killed = backend.kill_flag();
    drop(server);
    assert!(killed.load(std::sync::atomic::Ordering::SeqCst));
}

#[tokio::test]
async fn can_restart_after_failure() {
    let dir = plugin_dir_with_entry_point();
    let launcher = ScriptedLauncher::new();
    launcher.push_spawn_error(ErrorKind::NotFound);
    let (mut backend, process) = fake_process();
    launcher.push_spawn(process);
    backend.say(" * Running on http://127.0.0.1:5000").await;

    let server = supervisor(dir.path(), launcher);
    assert!(server.start().await.is_err());
    assert!(server.start().await.is_ok());
    assert_eq!(server.state(), ServerState::Running);
}
