//! Path resolution against the local and remote working directories.
//!
//! Remote paths are always POSIX paths, whatever the local platform is, so
//! they are handled as strings rather than [`std::path::Path`].

use std::path::{Path, PathBuf};

/// Lexically cleans a POSIX path: collapses repeated slashes, drops `.`
/// segments and resolves `..` against the preceding segment.
pub fn clean_posix(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            s => parts.push(s),
        }
    }

    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Joins two POSIX paths and cleans the result.
pub fn join_posix(base: &str, path: &str) -> String {
    if base.is_empty() {
        return clean_posix(path);
    }
    clean_posix(&format!("{}/{}", base, path))
}

/// Resolves `path` against the remote working directory. Absolute paths
/// pass through (cleaned).
pub fn resolve_remote(cwd: &str, path: &str) -> String {
    if path.starts_with('/') {
        clean_posix(path)
    } else {
        join_posix(cwd, path)
    }
}

/// Last segment of a POSIX path, ignoring trailing slashes.
pub fn base_name_posix(path: &str) -> String {
    let cleaned = clean_posix(path);
    match cleaned.rsplit_once('/') {
        Some((_, name)) if !name.is_empty() => name.to_string(),
        Some(_) => "/".to_string(),
        None => cleaned,
    }
}

/// Resolves `path` against the local working directory.
pub fn resolve_local(cwd: &Path, path: &str) -> PathBuf {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        cwd.join(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_handles_dots_and_slashes() {
        assert_eq!(clean_posix("/a//b/./c/"), "/a/b/c");
        assert_eq!(clean_posix("/a/b/../c"), "/a/c");
        assert_eq!(clean_posix("/../x"), "/x");
        assert_eq!(clean_posix("a/../../b"), "../b");
        assert_eq!(clean_posix(""), ".");
        assert_eq!(clean_posix("/"), "/");
    }

    #[test]
    fn resolve_remote_relative_and_absolute() {
        assert_eq!(resolve_remote("/home/deploy", "app"), "/home/deploy/app");
        assert_eq!(resolve_remote("/home/deploy", "./app/../web"), "/home/deploy/web");
        assert_eq!(resolve_remote("/home/deploy", ".."), "/home");
        assert_eq!(resolve_remote("/home/deploy", "/etc/nginx"), "/etc/nginx");
    }

    #[test]
    fn base_name() {
        assert_eq!(base_name_posix("/srv/app/dist/"), "dist");
        assert_eq!(base_name_posix("file.txt"), "file.txt");
        assert_eq!(base_name_posix("/"), "/");
    }

    #[test]
    fn resolve_local_paths() {
        let cwd = Path::new("/work");
        assert_eq!(resolve_local(cwd, "./a.txt"), PathBuf::from("/work/./a.txt"));
        assert_eq!(resolve_local(cwd, "/tmp/b"), PathBuf::from("/tmp/b"));
    }
}
