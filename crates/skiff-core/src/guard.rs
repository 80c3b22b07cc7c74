//! Guard rail for `DELETE`: well-known system directories are never removed.

use std::collections::HashSet;

use crate::paths::clean_posix;

/// Linux top-level and system directories that `DELETE` silently skips.
pub const DEFAULT_PROTECTED_PATHS: &[&str] = &[
    "/",
    "/bin",
    "/boot",
    "/dev",
    "/etc",
    "/home",
    "/lib",
    "/lib32",
    "/lib64",
    "/lost+found",
    "/media",
    "/mnt",
    "/opt",
    "/proc",
    "/root",
    "/run",
    "/sbin",
    "/snap",
    "/srv",
    "/sys",
    "/tmp",
    "/usr",
    "/usr/bin",
    "/usr/include",
    "/usr/lib",
    "/usr/local",
    "/usr/local/bin",
    "/usr/sbin",
    "/usr/share",
    "/var",
    "/var/lib",
    "/var/log",
];

/// Set of remote paths that must never be deleted.
#[derive(Debug, Clone)]
pub struct ProtectedPaths {
    paths: HashSet<String>,
}

impl Default for ProtectedPaths {
    fn default() -> Self {
        Self::new(std::iter::empty::<String>())
    }
}

impl ProtectedPaths {
    /// The default denylist plus `extra` entries.
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let paths = DEFAULT_PROTECTED_PATHS
            .iter()
            .map(|p| p.to_string())
            .chain(extra.into_iter().map(|p| clean_posix(p.as_ref())))
            .collect();
        Self { paths }
    }

    /// Whether `path` (already resolved) names a protected directory.
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(&clean_posix(path))
    }
}
