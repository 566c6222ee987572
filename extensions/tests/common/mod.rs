#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use quicknote_core::note::NoteFile;
use quicknote_core::vault::{NoteEdit, Notifier, Vault, VaultError, VaultEvents};
use quicknote_extensions::plugin::python::backend::launcher::{
    CommandOutput, CommandSpec, ProcessHandle, ProcessLauncher, SpawnedProcess,
};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::{Notify, mpsc, watch};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Creates `<dir>/backend_py/server.py` so the supervisor finds an entry point.
pub fn plugin_dir_with_entry_point() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("backend_py")).unwrap();
    std::fs::write(dir.path().join("backend_py").join("server.py"), "# backend\n").unwrap();
    dir
}

// --- Scripted processes ---

/// What `output()` returns for a given command line.
#[derive(Clone, Debug)]
pub enum Scripted {
    Exit { code: Option<i32>, stdout: String },
    SpawnError(io::ErrorKind),
}

impl Scripted {
    pub fn exit(code: i32) -> Self {
        Scripted::Exit { code: Some(code), stdout: String::new() }
    }

    pub fn prints(stdout: impl Into<String>) -> Self {
        Scripted::Exit { code: Some(0), stdout: stdout.into() }
    }
}

/// A [`ProcessLauncher`] that replays canned results and records every command.
#[derive(Default)]
pub struct ScriptedLauncher {
    outputs: Mutex<HashMap<String, Scripted>>,
    spawns: Mutex<VecDeque<io::Result<SpawnedProcess>>>,
    calls: Mutex<Vec<CommandSpec>>,
    held_output: Mutex<Option<Arc<Notify>>>,
    output_entered: Notify,
}

impl ScriptedLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `command_line` is the program and args joined by spaces, e.g. `which python3`.
    pub fn on_output(&self, command_line: &str, result: Scripted) {
        self.outputs.lock().unwrap().insert(command_line.to_string(), result);
    }

    pub fn push_spawn(&self, process: SpawnedProcess) {
        self.spawns.lock().unwrap().push_back(Ok(process));
    }

    pub fn push_spawn_error(&self, kind: io::ErrorKind) {
        self.spawns.lock().unwrap().push_back(Err(io::Error::from(kind)));
    }

    /// Makes the next `output()` call wait until the returned handle is notified.
    pub fn hold_next_output(&self) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        *self.held_output.lock().unwrap() = Some(release.clone());
        release
    }

    /// Resolves once a held `output()` call has started waiting.
    pub async fn output_held(&self) {
        self.output_entered.notified().await;
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.to_string()).collect()
    }

    pub fn spawn_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.args.iter().any(|a| a.to_string_lossy().ends_with("server.py")))
            .count()
    }
}

#[async_trait]
impl ProcessLauncher for ScriptedLauncher {
    async fn output(&self, command: &CommandSpec) -> io::Result<CommandOutput> {
        self.calls.lock().unwrap().push(command.clone());
        let held = self.held_output.lock().unwrap().take();
        if let Some(release) = held {
            self.output_entered.notify_one();
            release.notified().await;
        }
        let scripted = self.outputs.lock().unwrap().get(&command.to_string()).cloned();
        match scripted {
            Some(Scripted::Exit { code, stdout }) => Ok(CommandOutput { code, stdout }),
            Some(Scripted::SpawnError(kind)) => Err(io::Error::from(kind)),
            // Unknown commands behave like a locator that found nothing
            None => Ok(CommandOutput { code: Some(1), stdout: String::new() }),
        }
    }

    fn spawn(&self, command: &CommandSpec) -> io::Result<SpawnedProcess> {
        self.calls.lock().unwrap().push(command.clone());
        self.spawns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(io::Error::from(io::ErrorKind::NotFound)))
    }
}

/// Test side of a fake backend process.
pub struct FakeBackend {
    stdout: DuplexStream,
    exit: Arc<watch::Sender<Option<Option<i32>>>>,
    killed: Arc<AtomicBool>,
}

impl FakeBackend {
    /// Writes one line to the process's stdout.
    pub async fn say(&mut self, line: &str) {
        self.stdout.write_all(format!("{line}\n").as_bytes()).await.unwrap();
    }

    /// Writes `text` as is, without a line terminator.
    pub async fn write(&mut self, text: &str) {
        self.stdout.write_all(text.as_bytes()).await.unwrap();
    }

    pub fn exit(&self, code: i32) {
        self.exit.send_replace(Some(Some(code)));
    }

    pub fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    pub fn kill_flag(&self) -> Arc<AtomicBool> {
        self.killed.clone()
    }
}

struct FakeHandle {
    exit: Arc<watch::Sender<Option<Option<i32>>>>,
    exit_rx: watch::Receiver<Option<Option<i32>>>,
    killed: Arc<AtomicBool>,
}

#[async_trait]
impl ProcessHandle for FakeHandle {
    async fn wait(&mut self) -> io::Result<Option<i32>> {
        let status = *self
            .exit_rx
            .wait_for(|status| status.is_some())
            .await
            .map_err(|_| io::Error::other("exit channel closed"))?;
        Ok(status.flatten())
    }

    fn start_kill(&mut self) -> io::Result<()> {
        self.killed.store(true, Ordering::SeqCst);
        self.exit.send_replace(Some(None));
        Ok(())
    }
}

pub fn fake_process() -> (FakeBackend, SpawnedProcess) {
    let (test_side, process_side) = tokio::io::duplex(8 * 1024);
    let (exit_tx, exit_rx) = watch::channel(None);
    let exit = Arc::new(exit_tx);
    let killed = Arc::new(AtomicBool::new(false));

    let backend = FakeBackend {
        stdout: test_side,
        exit: exit.clone(),
        killed: killed.clone(),
    };
    let process = SpawnedProcess {
        pid: Some(4242),
        stdout: Box::new(process_side),
        stderr: None,
        handle: Box::new(FakeHandle { exit, exit_rx, killed }),
    };
    (backend, process)
}

// --- Host fakes ---

/// Collects notices and forwards them to a channel tests can await.
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    tx: mpsc::UnboundedSender<String>,
}

impl RecordingNotifier {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { messages: Mutex::new(Vec::new()), tx }), rx)
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notice(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
        let _ = self.tx.send(message.to_string());
    }
}

/// A vault that keeps notes in memory.
pub struct MemoryVault {
    base: Option<PathBuf>,
    notes: Mutex<HashMap<PathBuf, String>>,
    writes: AtomicUsize,
    events: VaultEvents,
}

impl MemoryVault {
    pub fn new(base: Option<&Path>) -> Arc<Self> {
        Arc::new(Self {
            base: base.map(Path::to_path_buf),
            notes: Mutex::new(HashMap::new()),
            writes: AtomicUsize::new(0),
            events: VaultEvents::new(),
        })
    }

    /// Adds a note and returns its handle. Relative to the base path if there is one.
    pub fn create(&self, name: &str, content: &str) -> NoteFile {
        let path = match &self.base {
            Some(base) => base.join(name),
            None => PathBuf::from(name),
        };
        self.notes.lock().unwrap().insert(path.clone(), content.to_string());
        NoteFile::from_path(path).unwrap()
    }

    pub fn content(&self, note: &NoteFile) -> Option<String> {
        self.notes.lock().unwrap().get(note.path()).cloned()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Vault for MemoryVault {
    fn base_path(&self) -> Option<&Path> {
        self.base.as_deref()
    }

    fn config_dir(&self) -> &str {
        ".obsidian"
    }

    async fn process(&self, note: &NoteFile, edit: NoteEdit) -> Result<String, VaultError> {
        let mut notes = self.notes.lock().unwrap();
        let current = notes
            .get(note.path())
            .ok_or_else(|| VaultError::NoteNotFound(note.path().to_path_buf()))?;
        let updated = edit(current);
        notes.insert(note.path().to_path_buf(), updated.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }

    fn events(&self) -> &VaultEvents {
        &self.events
    }
}
