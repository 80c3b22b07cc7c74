//! Recursive file transfer between the local machine and a remote session.
//!
//! Both directions follow the same layout rule: a file source lands directly
//! inside the destination directory, and a directory source is recreated
//! under the destination as a directory named after the source.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use thiserror::Error;
use tracing::debug;

use crate::paths::{base_name_posix, join_posix};
use crate::report::Reporter;
use crate::session::{RemoteSession, SessionError};

/// Mode applied to uploads when the local platform has no permission bits.
const FALLBACK_MODE: u32 = 0o644;

/// Errors from `UPLOAD` and `DOWNLOAD`.
#[derive(Error, Debug)]
pub enum TransferError {
    /// A local source path does not exist.
    #[error("local path not found: {}", .0.display())]
    LocalNotFound(PathBuf),

    /// Reading or writing a local file or directory failed.
    #[error("local IO error on {}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The remote side failed.
    #[error(transparent)]
    Remote(#[from] SessionError),
}

impl TransferError {
    fn local(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            TransferError::LocalNotFound(path.to_path_buf())
        } else {
            TransferError::LocalIo {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

type TransferFuture<'a> = Pin<Box<dyn Future<Output = Result<u64, TransferError>> + Send + 'a>>;

fn local_base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(unix)]
fn local_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn local_mode(_metadata: &std::fs::Metadata) -> u32 {
    FALLBACK_MODE
}

#[cfg(unix)]
async fn set_local_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn set_local_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

/// Upload `source` (file or directory) into the remote directory
/// `remote_dir`. Returns the number of bytes sent.
pub async fn upload(
    session: &dyn RemoteSession,
    source: &Path,
    remote_dir: &str,
    reporter: &dyn Reporter,
) -> Result<u64, TransferError> {
    let metadata = tokio::fs::metadata(source)
        .await
        .map_err(|e| TransferError::local(source, e))?;

    if metadata.is_dir() {
        upload_dir(session, source.to_path_buf(), remote_dir.to_string(), reporter).await
    } else {
        upload_file(session, source, &metadata, remote_dir, reporter).await
    }
}

fn upload_dir<'a>(
    session: &'a dyn RemoteSession,
    source: PathBuf,
    remote_dir: String,
    reporter: &'a dyn Reporter,
) -> TransferFuture<'a> {
    Box::pin(async move {
        let target = join_posix(&remote_dir, &local_base_name(&source));
        session.mkdir_all(&target).await?;

        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&source)
            .await
            .map_err(|e| TransferError::local(&source, e))?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| TransferError::local(&source, e))?
        {
            entries.push(entry.path());
        }
        entries.sort();

        let mut total = 0;
        for path in entries {
            let metadata = tokio::fs::metadata(&path)
                .await
                .map_err(|e| TransferError::local(&path, e))?;
            total += if metadata.is_dir() {
                upload_dir(session, path, target.clone(), reporter).await?
            } else {
                upload_file(session, &path, &metadata, &target, reporter).await?
            };
        }
        Ok(total)
    })
}

async fn upload_file(
    session: &dyn RemoteSession,
    source: &Path,
    metadata: &std::fs::Metadata,
    remote_dir: &str,
    reporter: &dyn Reporter,
) -> Result<u64, TransferError> {
    session.mkdir_all(remote_dir).await?;

    let name = local_base_name(source);
    let target = join_posix(remote_dir, &name);
    debug!(source = %source.display(), target = %target, "uploading file");

    let progress = reporter.transfer(&name, metadata.len());
    let sent = session.upload_file(source, &target, progress).await?;
    session.chmod(&target, local_mode(metadata)).await?;
    Ok(sent)
}

/// Download `source` (remote file or directory) into the local directory
/// `local_dir`. Returns the number of bytes received.
pub async fn download(
    session: &dyn RemoteSession,
    source: &str,
    local_dir: &Path,
    reporter: &dyn Reporter,
) -> Result<u64, TransferError> {
    let metadata = session.stat(source).await?;
    if metadata.is_dir {
        download_dir(session, source.to_string(), local_dir.to_path_buf(), reporter).await
    } else {
        download_file(session, source, metadata.size, metadata.mode, local_dir, reporter).await
    }
}

fn download_dir<'a>(
    session: &'a dyn RemoteSession,
    source: String,
    local_dir: PathBuf,
    reporter: &'a dyn Reporter,
) -> TransferFuture<'a> {
    Box::pin(async move {
        let target = local_dir.join(base_name_posix(&source));
        tokio::fs::create_dir_all(&target)
            .await
            .map_err(|e| TransferError::local(&target, e))?;

        let mut entries = session.list_dir(&source).await?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let mut total = 0;
        for entry in entries {
            let path = join_posix(&source, &entry.name);
            total += if entry.is_dir {
                download_dir(session, path, target.clone(), reporter).await?
            } else {
                let metadata = session.stat(&path).await?;
                download_file(session, &path, metadata.size, metadata.mode, &target, reporter)
                    .await?
            };
        }
        Ok(total)
    })
}

async fn download_file(
    session: &dyn RemoteSession,
    source: &str,
    size: u64,
    mode: u32,
    local_dir: &Path,
    reporter: &dyn Reporter,
) -> Result<u64, TransferError> {
    tokio::fs::create_dir_all(local_dir)
        .await
        .map_err(|e| TransferError::local(local_dir, e))?;

    let name = base_name_posix(source);
    let target = local_dir.join(&name);
    debug!(source = %source, target = %target.display(), "downloading file");

    let progress = reporter.transfer(&name, size);
    let received = session.download_file(source, &target, progress).await?;

    let mode = if mode == 0 { FALLBACK_MODE } else { mode };
    set_local_mode(&target, mode)
        .await
        .map_err(|e| TransferError::local(&target, e))?;
    Ok(received)
}
