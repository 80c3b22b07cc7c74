//! SSH backend built on `ssh2`: password authentication, exec channels for
//! commands and SFTP for file operations.
//!
//! `ssh2` is blocking, so every call runs on the blocking thread pool behind a
//! mutex. Command output is pumped from the channel in non-blocking mode and
//! handed to two async drain tasks (stdout, stderr) over channels.

use std::io::{self, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ssh2::{ErrorCode, FileStat, OpenFlags, OpenType, Session, Sftp};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::report::{copy_with_progress, TransferProgress};
use crate::session::{
    build_command, CommandOptions, ConnectTarget, Connector, RemoteEntry, RemoteMetadata,
    RemoteSession, SessionError,
};

/// Connect timeout used when none is configured.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// SFTP status code for a missing file (`LIBSSH2_FX_NO_SUCH_FILE`).
const SFTP_NO_SUCH_FILE: i32 = 2;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const READ_BUFFER: usize = 32 * 1024;

/// Dials real SSH servers.
#[derive(Debug, Clone)]
pub struct SshConnector {
    connect_timeout: Duration,
}

impl SshConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn dial(&self, target: &ConnectTarget) -> Result<Box<dyn RemoteSession>, SessionError> {
        let target = target.clone();
        let timeout = self.connect_timeout;
        let inner = tokio::task::spawn_blocking(move || connect(&target, timeout))
            .await
            .map_err(|e| SessionError::Task(e.to_string()))??;
        Ok(Box::new(SshSession {
            inner: Arc::new(Mutex::new(inner)),
        }))
    }
}

fn connect(target: &ConnectTarget, timeout: Duration) -> Result<Inner, SessionError> {
    let mut last_error = None;
    let mut stream = None;
    for addr in (target.host.as_str(), target.port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(tcp) => {
                stream = Some(tcp);
                break;
            }
            Err(e) => {
                debug!(%addr, error = %e, "connect attempt failed");
                last_error = Some(e);
            }
        }
    }
    let tcp = match (stream, last_error) {
        (Some(tcp), _) => tcp,
        (None, Some(e)) => return Err(SessionError::Io(e)),
        (None, None) => {
            return Err(SessionError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("could not resolve {}", target.host),
            )))
        }
    };

    let mut session = Session::new()?;
    session.set_tcp_stream(tcp);
    session.handshake()?;

    let auth_failed = || SessionError::Auth {
        user: target.username.clone(),
        host: target.host.clone(),
    };
    if let Err(e) = session.userauth_password(&target.username, &target.password) {
        debug!(error = %e, "password authentication rejected");
        return Err(auth_failed());
    }
    if !session.authenticated() {
        return Err(auth_failed());
    }

    let sftp = session.sftp()?;
    info!(target = %target, "ssh session established");
    Ok(Inner { session, sftp })
}

struct Inner {
    session: Session,
    sftp: Sftp,
}

/// A live `ssh2` session plus its SFTP subsystem.
pub struct SshSession {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

impl SshSession {
    async fn blocking<F, T>(&self, f: F) -> Result<T, SessionError>
    where
        F: FnOnce(&mut Inner) -> Result<T, SessionError> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut guard = inner
                .lock()
                .map_err(|_| SessionError::Task("session lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| SessionError::Task(e.to_string()))?
    }
}

/// Runs `command` on a fresh exec channel, passing every output chunk to
/// `sink`. Returns the exit status.
fn exec(
    session: &Session,
    command: &str,
    sink: &mut dyn FnMut(OutputStream, &[u8]),
) -> Result<i32, SessionError> {
    let mut channel = session.channel_session()?;
    channel.exec(command)?;

    session.set_blocking(false);
    let pumped = pump(&mut channel, sink);
    session.set_blocking(true);
    pumped?;

    channel.wait_close()?;
    Ok(channel.exit_status()?)
}

fn pump(
    channel: &mut ssh2::Channel,
    sink: &mut dyn FnMut(OutputStream, &[u8]),
) -> Result<(), SessionError> {
    let mut buf = vec![0u8; READ_BUFFER];
    let mut stderr = channel.stderr();

    loop {
        let mut progressed = false;

        match channel.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                sink(OutputStream::Stdout, &buf[..n]);
                progressed = true;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(SessionError::Io(e)),
        }
        match stderr.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                sink(OutputStream::Stderr, &buf[..n]);
                progressed = true;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(SessionError::Io(e)),
        }

        if !progressed {
            if channel.eof() {
                return Ok(());
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

async fn drain<W>(mut rx: mpsc::UnboundedReceiver<Vec<u8>>, mut writer: W) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(chunk) = rx.recv().await {
        writer.write_all(&chunk).await?;
    }
    writer.flush().await
}

fn is_missing(error: &ssh2::Error) -> bool {
    error.code() == ErrorCode::SFTP(SFTP_NO_SUCH_FILE)
}

fn metadata_from(stat: &FileStat) -> RemoteMetadata {
    RemoteMetadata {
        is_dir: stat.is_dir(),
        size: stat.size.unwrap_or(0),
        mode: stat.perm.unwrap_or(0) & 0o7777,
    }
}

/// Whether `stat` (taken with lstat) names a real directory.
fn removes_as_dir(stat: &FileStat) -> bool {
    stat.file_type().is_dir()
}

fn create_remote(sftp: &Sftp, path: &str) -> Result<ssh2::File, SessionError> {
    Ok(sftp.open_mode(
        Path::new(path),
        OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
        0o644,
        OpenType::File,
    )?)
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn close(&mut self) -> Result<(), SessionError> {
        self.blocking(|inner| {
            inner.session.disconnect(None, "closing", None)?;
            Ok(())
        })
        .await
    }

    async fn initial_working_dir(&self) -> Result<String, SessionError> {
        self.blocking(|inner| {
            let path = inner.sftp.realpath(Path::new("."))?;
            Ok(path.to_string_lossy().into_owned())
        })
        .await
    }

    async fn run_command(
        &self,
        command: &str,
        options: &CommandOptions,
    ) -> Result<(), SessionError> {
        let full = build_command(command, options);
        debug!(command = %full, "running remote command");

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (err_tx, err_rx) = mpsc::unbounded_channel();
        let out_task = tokio::spawn(drain(out_rx, tokio::io::stdout()));
        let err_task = tokio::spawn(drain(err_rx, tokio::io::stderr()));

        let line = full.clone();
        let status = self
            .blocking(move |inner| {
                exec(&inner.session, &line, &mut |stream, chunk| {
                    let tx = match stream {
                        OutputStream::Stdout => &out_tx,
                        OutputStream::Stderr => &err_tx,
                    };
                    let _ = tx.send(chunk.to_vec());
                })
            })
            .await;

        let (out, err) = tokio::join!(out_task, err_task);
        out.map_err(|e| SessionError::Task(e.to_string()))??;
        err.map_err(|e| SessionError::Task(e.to_string()))??;

        match status? {
            0 => Ok(()),
            status => Err(SessionError::CommandFailed {
                command: command.to_string(),
                status,
            }),
        }
    }

    async fn run_command_captured(
        &self,
        command: &str,
        options: &CommandOptions,
    ) -> Result<String, SessionError> {
        let full = build_command(command, options);
        debug!(command = %full, "running remote command (captured)");

        let line = full.clone();
        let (status, output) = self
            .blocking(move |inner| {
                let mut output = Vec::new();
                let status = exec(&inner.session, &line, &mut |_, chunk| {
                    output.extend_from_slice(chunk)
                })?;
                Ok((status, output))
            })
            .await?;

        if status != 0 {
            return Err(SessionError::CommandFailed {
                command: command.to_string(),
                status,
            });
        }
        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    async fn stat(&self, path: &str) -> Result<RemoteMetadata, SessionError> {
        let path = path.to_string();
        self.blocking(move |inner| match inner.sftp.stat(Path::new(&path)) {
            Ok(stat) => Ok(metadata_from(&stat)),
            Err(e) if is_missing(&e) => Err(SessionError::NotFound(path)),
            Err(e) => Err(e.into()),
        })
        .await
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<RemoteEntry>, SessionError> {
        let path = path.to_string();
        self.blocking(move |inner| {
            let entries = inner.sftp.readdir(Path::new(&path))?;
            Ok(entries
                .into_iter()
                .filter_map(|(entry, stat)| {
                    let name = entry.file_name()?.to_string_lossy().into_owned();
                    if name == "." || name == ".." {
                        return None;
                    }
                    Some(RemoteEntry {
                        name,
                        is_dir: stat.is_dir(),
                    })
                })
                .collect())
        })
        .await
    }

    async fn mkdir_all(&self, path: &str) -> Result<(), SessionError> {
        let path = path.to_string();
        self.blocking(move |inner| {
            let mut current = PathBuf::from("/");
            for part in path.split('/').filter(|p| !p.is_empty()) {
                current.push(part);
                match inner.sftp.stat(&current) {
                    Ok(_) => continue,
                    Err(e) if is_missing(&e) => inner.sftp.mkdir(&current, 0o755)?,
                    Err(e) => return Err(e.into()),
                }
            }
            Ok(())
        })
        .await
    }

    async fn upload_file(
        &self,
        local: &Path,
        remote: &str,
        progress: Box<dyn TransferProgress>,
    ) -> Result<u64, SessionError> {
        let local = local.to_path_buf();
        let remote = remote.to_string();
        self.blocking(move |inner| {
            let source = std::fs::File::open(&local)?;
            let mut target = create_remote(&inner.sftp, &remote)?;
            Ok(copy_with_progress(source, &mut target, progress)?)
        })
        .await
    }

    async fn download_file(
        &self,
        remote: &str,
        local: &Path,
        progress: Box<dyn TransferProgress>,
    ) -> Result<u64, SessionError> {
        let local = local.to_path_buf();
        let remote = remote.to_string();
        self.blocking(move |inner| {
            let source = match inner.sftp.open(Path::new(&remote)) {
                Ok(file) => file,
                Err(e) if is_missing(&e) => return Err(SessionError::NotFound(remote)),
                Err(e) => return Err(e.into()),
            };
            let mut target = std::fs::File::create(&local)?;
            Ok(copy_with_progress(source, &mut target, progress)?)
        })
        .await
    }

    async fn copy_file(&self, source: &str, destination: &str) -> Result<(), SessionError> {
        let source = source.to_string();
        let destination = destination.to_string();
        self.blocking(move |inner| {
            let mut reader = match inner.sftp.open(Path::new(&source)) {
                Ok(file) => file,
                Err(e) if is_missing(&e) => return Err(SessionError::NotFound(source)),
                Err(e) => return Err(e.into()),
            };
            let mut writer = create_remote(&inner.sftp, &destination)?;
            io::copy(&mut reader, &mut writer)?;
            Ok(())
        })
        .await
    }

    async fn chmod(&self, path: &str, mode: u32) -> Result<(), SessionError> {
        let path = path.to_string();
        self.blocking(move |inner| {
            let stat = FileStat {
                size: None,
                uid: None,
                gid: None,
                perm: Some(mode),
                atime: None,
                mtime: None,
            };
            inner.sftp.setstat(Path::new(&path), stat)?;
            Ok(())
        })
        .await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), SessionError> {
        let from = from.to_string();
        let to = to.to_string();
        self.blocking(move |inner| {
            inner.sftp.rename(Path::new(&from), Path::new(&to), None)?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, path: &str) -> Result<(), SessionError> {
        let path = path.to_string();
        self.blocking(move |inner| {
            let target = Path::new(&path);
            // lstat: a symlink to a directory is unlinked, not rmdir'd
            let stat = inner.sftp.lstat(target)?;
            if removes_as_dir(&stat) {
                inner.sftp.rmdir(target)?;
            } else {
                inner.sftp.unlink(target)?;
            }
            Ok(())
        })
        .await
    }
}
