mod common;

use common::{Scripted, ScriptedLauncher};
use quicknote_extensions::plugin::python::backend::interpreter::{
    CachedInterpreter, InterpreterPath, InterpreterResolver, locator_command,
};

fn fake_executable(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, "").unwrap();
    path
}

fn locate(candidate: &str) -> String {
    format!("{} {candidate}", locator_command())
}

#[tokio::test]
async fn python3_is_preferred_when_both_are_found() {
    let dir = tempfile::tempdir().unwrap();
    let python3 = fake_executable(&dir, "python3");
    let python = fake_executable(&dir, "python");

    let launcher = ScriptedLauncher::new();
    launcher.on_output(&locate("python3"), Scripted::prints(format!("{}\n", python3.display())));
    launcher.on_output(&locate("python"), Scripted::prints(format!("{}\n", python.display())));

    let resolved = InterpreterResolver::new(launcher.clone()).resolve().await;
    assert_eq!(resolved, InterpreterPath::Located(python3));
    assert_eq!(launcher.command_lines(), vec![locate("python3")]);
}

#[tokio::test]
async fn falls_back_to_python_then_to_token() {
    let dir = tempfile::tempdir().unwrap();
    let python = fake_executable(&dir, "python");

    let launcher = ScriptedLauncher::new();
    launcher.on_output(&locate("python3"), Scripted::exit(1));
    launcher.on_output(&locate("python"), Scripted::prints(format!("{}\r\n", python.display())));
    assert_eq!(
        InterpreterResolver::new(launcher).resolve().await,
        InterpreterPath::Located(python)
    );

    let nothing = ScriptedLauncher::new();
    let resolved = InterpreterResolver::new(nothing.clone()).resolve().await;
    assert_eq!(resolved, InterpreterPath::Fallback);
    assert_eq!(resolved.to_string(), "python3");
    assert_eq!(nothing.command_lines(), vec![locate("python3"), locate("python")]);
}

#[tokio::test]
async fn located_path_that_does_not_exist_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let python = fake_executable(&dir, "python");

    let launcher = ScriptedLauncher::new();
    launcher.on_output(&locate("python3"), Scripted::prints("/gone/bin/python3\n"));
    launcher.on_output(&locate("python"), Scripted::prints(format!("{}\n", python.display())));

    assert_eq!(
        InterpreterResolver::new(launcher).resolve().await,
        InterpreterPath::Located(python)
    );
}

#[tokio::test]
async fn locator_that_cannot_run_counts_as_not_found() {
    let launcher = ScriptedLauncher::new();
    launcher.on_output(&locate("python3"), Scripted::SpawnError(std::io::ErrorKind::NotFound));
    launcher.on_output(&locate("python"), Scripted::SpawnError(std::io::ErrorKind::PermissionDenied));

    assert!(InterpreterResolver::new(launcher).resolve().await.is_fallback());
}

#[tokio::test]
async fn cache_resolves_once_until_reconfigured() {
    let launcher = ScriptedLauncher::new();
    let mut cached = CachedInterpreter::new(InterpreterResolver::new(launcher.clone()), None);
    assert!(cached.cached().is_none());

    assert!(cached.get().await.is_fallback());
    assert!(cached.get().await.is_fallback());
    assert_eq!(launcher.calls().len(), 2, "one locator call per candidate, once");

    cached.reconfigure(Some(std::path::Path::new("/opt/py/bin/python3")));
    assert!(cached.cached().is_none());
    assert_eq!(
        cached.get().await,
        &InterpreterPath::Configured("/opt/py/bin/python3".into())
    );
    assert_eq!(launcher.calls().len(), 2, "configured interpreter skips the locator");
}
