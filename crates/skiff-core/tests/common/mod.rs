//! Shared test helpers for skiff-core integration tests.
//!
//! [`MockRemote`] is an in-memory stand-in for an SSH server: a tiny
//! filesystem, canned command output and a log of every call the runner
//! makes. Connectors and sessions created from it share its state.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use skiff_core::action::Action;
use skiff_core::report::{Reporter, SkipReason, TransferProgress};
use skiff_core::session::{
    build_command, CommandOptions, ConnectTarget, Connector, PasswordPrompt, RemoteEntry,
    RemoteMetadata, RemoteSession, SessionError,
};

// ---------------------------------------------------------------------------
// Recorded calls
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Dial { target: String, password: String },
    Close,
    Run(String),
    Captured(String),
    MkdirAll(String),
    Upload { local: PathBuf, remote: String },
    Download { remote: String, local: PathBuf },
    Copy { source: String, destination: String },
    Chmod { path: String, mode: u32 },
    Rename { from: String, to: String },
    Remove(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Dir,
    File { data: Vec<u8>, mode: u32 },
}

#[derive(Default)]
struct MockState {
    calls: Vec<Call>,
    fs: BTreeMap<String, Node>,
    outputs: HashMap<String, String>,
    failures: HashMap<String, i32>,
    home: String,
    refuse_dial: bool,
}

fn parent_of(path: &str) -> String {
    match path.rsplit_once('/') {
        Some(("", _)) => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
        None => "/".to_string(),
    }
}

fn is_child(parent: &str, path: &str) -> bool {
    let prefix = if parent == "/" {
        "/".to_string()
    } else {
        format!("{}/", parent)
    };
    path.len() > prefix.len() && path.starts_with(&prefix) && !path[prefix.len()..].contains('/')
}

fn is_descendant(root: &str, path: &str) -> bool {
    path == root || path.starts_with(&format!("{}/", root))
}

// ---------------------------------------------------------------------------
// MockRemote: shared handle for setup and assertions
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MockRemote {
    state: Arc<Mutex<MockState>>,
}

impl MockRemote {
    /// A remote host whose login directory is `home`.
    pub fn new(home: &str) -> Self {
        let remote = Self {
            state: Arc::new(Mutex::new(MockState {
                home: home.to_string(),
                ..MockState::default()
            })),
        };
        remote.add_dir(home);
        remote
    }

    pub fn connector(&self) -> Arc<MockConnector> {
        Arc::new(MockConnector {
            state: Arc::clone(&self.state),
        })
    }

    /// Make every dial fail with an authentication error.
    pub fn refuse_dial(&self) {
        self.state.lock().unwrap().refuse_dial = true;
    }

    pub fn add_dir(&self, path: &str) {
        let mut state = self.state.lock().unwrap();
        let mut current = String::new();
        state.fs.insert("/".to_string(), Node::Dir);
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            state.fs.insert(current.clone(), Node::Dir);
        }
    }

    pub fn add_file(&self, path: &str, data: &[u8], mode: u32) {
        self.add_dir(&parent_of(path));
        self.state.lock().unwrap().fs.insert(
            path.to_string(),
            Node::File {
                data: data.to_vec(),
                mode,
            },
        );
    }

    pub fn node(&self, path: &str) -> Option<Node> {
        self.state.lock().unwrap().fs.get(path).cloned()
    }

    pub fn file(&self, path: &str) -> Option<(Vec<u8>, u32)> {
        match self.node(path) {
            Some(Node::File { data, mode }) => Some((data, mode)),
            _ => None,
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.node(path).is_some()
    }

    /// Canned output for a fully built command line.
    pub fn set_output(&self, command_line: &str, output: &str) {
        self.state
            .lock()
            .unwrap()
            .outputs
            .insert(command_line.to_string(), output.to_string());
    }

    /// Make a fully built command line exit with `status`.
    pub fn fail_command(&self, command_line: &str, status: i32) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(command_line.to_string(), status);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| matches(call)).count()
    }

    /// Remote command lines passed to `run_command`.
    pub fn commands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Run(line) => Some(line),
                _ => None,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Connector and session
// ---------------------------------------------------------------------------

pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn dial(&self, target: &ConnectTarget) -> Result<Box<dyn RemoteSession>, SessionError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Dial {
            target: target.to_string(),
            password: target.password.clone(),
        });
        if state.refuse_dial {
            return Err(SessionError::Auth {
                user: target.username.clone(),
                host: target.host.clone(),
            });
        }
        Ok(Box::new(MockSession {
            state: Arc::clone(&self.state),
        }))
    }
}

pub struct MockSession {
    state: Arc<Mutex<MockState>>,
}

impl MockSession {
    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn execute(&self, line: &str, command: &str) -> Result<String, SessionError> {
        let state = self.state.lock().unwrap();
        if let Some(status) = state.failures.get(line) {
            return Err(SessionError::CommandFailed {
                command: command.to_string(),
                status: *status,
            });
        }
        Ok(state.outputs.get(line).cloned().unwrap_or_default())
    }

    fn require_dir(state: &MockState, path: &str) -> Result<(), SessionError> {
        match state.fs.get(path) {
            Some(Node::Dir) => Ok(()),
            _ => Err(SessionError::NotFound(path.to_string())),
        }
    }
}

#[async_trait]
impl RemoteSession for MockSession {
    async fn close(&mut self) -> Result<(), SessionError> {
        self.record(Call::Close);
        Ok(())
    }

    async fn initial_working_dir(&self) -> Result<String, SessionError> {
        Ok(self.state.lock().unwrap().home.clone())
    }

    async fn run_command(
        &self,
        command: &str,
        options: &CommandOptions,
    ) -> Result<(), SessionError> {
        let line = build_command(command, options);
        self.record(Call::Run(line.clone()));
        self.execute(&line, command).map(|_| ())
    }

    async fn run_command_captured(
        &self,
        command: &str,
        options: &CommandOptions,
    ) -> Result<String, SessionError> {
        let line = build_command(command, options);
        self.record(Call::Captured(line.clone()));
        self.execute(&line, command)
    }

    async fn stat(&self, path: &str) -> Result<RemoteMetadata, SessionError> {
        match self.state.lock().unwrap().fs.get(path) {
            Some(Node::Dir) => Ok(RemoteMetadata {
                is_dir: true,
                size: 0,
                mode: 0o755,
            }),
            Some(Node::File { data, mode }) => Ok(RemoteMetadata {
                is_dir: false,
                size: data.len() as u64,
                mode: *mode,
            }),
            None => Err(SessionError::NotFound(path.to_string())),
        }
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<RemoteEntry>, SessionError> {
        let state = self.state.lock().unwrap();
        Self::require_dir(&state, path)?;
        Ok(state
            .fs
            .iter()
            .filter(|(candidate, _)| is_child(path, candidate))
            .map(|(candidate, node)| RemoteEntry {
                name: candidate.rsplit('/').next().unwrap_or_default().to_string(),
                is_dir: matches!(node, Node::Dir),
            })
            .collect())
    }

    async fn mkdir_all(&self, path: &str) -> Result<(), SessionError> {
        self.record(Call::MkdirAll(path.to_string()));
        let mut state = self.state.lock().unwrap();
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current.push('/');
            current.push_str(part);
            state.fs.entry(current.clone()).or_insert(Node::Dir);
        }
        Ok(())
    }

    async fn upload_file(
        &self,
        local: &Path,
        remote: &str,
        mut progress: Box<dyn TransferProgress>,
    ) -> Result<u64, SessionError> {
        self.record(Call::Upload {
            local: local.to_path_buf(),
            remote: remote.to_string(),
        });
        let data = std::fs::read(local)?;
        let mut state = self.state.lock().unwrap();
        Self::require_dir(&state, &parent_of(remote))?;
        let size = data.len() as u64;
        state
            .fs
            .insert(remote.to_string(), Node::File { data, mode: 0o644 });
        progress.advance(size);
        progress.finish();
        Ok(size)
    }

    async fn download_file(
        &self,
        remote: &str,
        local: &Path,
        mut progress: Box<dyn TransferProgress>,
    ) -> Result<u64, SessionError> {
        self.record(Call::Download {
            remote: remote.to_string(),
            local: local.to_path_buf(),
        });
        let data = match self.state.lock().unwrap().fs.get(remote) {
            Some(Node::File { data, .. }) => data.clone(),
            _ => return Err(SessionError::NotFound(remote.to_string())),
        };
        std::fs::write(local, &data)?;
        progress.advance(data.len() as u64);
        progress.finish();
        Ok(data.len() as u64)
    }

    async fn copy_file(&self, source: &str, destination: &str) -> Result<(), SessionError> {
        self.record(Call::Copy {
            source: source.to_string(),
            destination: destination.to_string(),
        });
        let mut state = self.state.lock().unwrap();
        let data = match state.fs.get(source) {
            Some(Node::File { data, .. }) => data.clone(),
            _ => return Err(SessionError::NotFound(source.to_string())),
        };
        Self::require_dir(&state, &parent_of(destination))?;
        state
            .fs
            .insert(destination.to_string(), Node::File { data, mode: 0o644 });
        Ok(())
    }

    async fn chmod(&self, path: &str, mode: u32) -> Result<(), SessionError> {
        self.record(Call::Chmod {
            path: path.to_string(),
            mode,
        });
        match self.state.lock().unwrap().fs.get_mut(path) {
            Some(Node::File { mode: current, .. }) => {
                *current = mode;
                Ok(())
            }
            Some(Node::Dir) => Ok(()),
            None => Err(SessionError::NotFound(path.to_string())),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), SessionError> {
        self.record(Call::Rename {
            from: from.to_string(),
            to: to.to_string(),
        });
        let mut state = self.state.lock().unwrap();
        if !state.fs.contains_key(from) {
            return Err(SessionError::NotFound(from.to_string()));
        }
        let moved: Vec<String> = state
            .fs
            .keys()
            .filter(|path| is_descendant(from, path))
            .cloned()
            .collect();
        for path in moved {
            if let Some(node) = state.fs.remove(&path) {
                let renamed = format!("{}{}", to, &path[from.len()..]);
                state.fs.insert(renamed, node);
            }
        }
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), SessionError> {
        self.record(Call::Remove(path.to_string()));
        let mut state = self.state.lock().unwrap();
        let has_children = state.fs.keys().any(|candidate| is_child(path, candidate));
        if has_children {
            return Err(SessionError::Io(std::io::Error::other("directory not empty")));
        }
        state
            .fs
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| SessionError::NotFound(path.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Prompt and reporter
// ---------------------------------------------------------------------------

/// Answers every password prompt with a fixed string.
pub struct FixedPrompt(pub String);

impl PasswordPrompt for FixedPrompt {
    fn prompt(&self, _message: &str) -> std::io::Result<String> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Step(usize, String),
    Finished(usize),
    Skipped(String, SkipReason),
    Transfer(String, u64),
}

/// Records everything the runner reports.
#[derive(Default, Clone)]
pub struct RecordingReporter {
    events: Arc<Mutex<Vec<Event>>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

struct NullProgress;

impl TransferProgress for NullProgress {
    fn advance(&mut self, _bytes: u64) {}
    fn finish(&mut self) {}
}

impl Reporter for RecordingReporter {
    fn step_completed(&self, step: usize, action: &Action) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Step(step, action.to_string()));
    }

    fn run_finished(&self, step: usize) {
        self.events.lock().unwrap().push(Event::Finished(step));
    }

    fn delete_skipped(&self, path: &str, reason: SkipReason) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Skipped(path.to_string(), reason));
    }

    fn transfer(&self, label: &str, total: u64) -> Box<dyn TransferProgress> {
        self.events
            .lock()
            .unwrap()
            .push(Event::Transfer(label.to_string(), total));
        Box::new(NullProgress)
    }
}
