//! Locating the daemon executable and the shared libraries it loads.

use log::debug;
use std::env;
use std::ffi::{OsStr, OsString};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::{HarnessError, HarnessResult};

/// Environment variable naming an explicit daemon executable
pub const BINARY_ENV: &str = "CHIMERA_BINARY";

/// Daemon path relative to a build directory
const DAEMON_RELATIVE: &str = "src/daemon/chimera";

const BUILD_TYPES: [&str; 2] = ["Debug", "Release"];

/// Build-tree directories holding the daemon's shared objects, relative to the build root.
pub const LIBRARY_SUBDIRS: [&str; 9] = [
    "src/server",
    "src/server/rest",
    "src/server/nfs",
    "src/server/smb",
    "src/server/s3",
    "src/vfs",
    "src/common",
    "ext/libevpl/src/core",
    "ext/libevpl/src/http",
];

/// Root of the source checkout this workspace lives in.
pub fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

/// Build locations probed, in order, when no explicit binary is given.
pub fn candidate_paths() -> Vec<PathBuf> {
    let roots = [project_root().join("build"), PathBuf::from("/build")];
    roots
        .iter()
        .flat_map(|root| {
            BUILD_TYPES
                .iter()
                .map(move |build| root.join(build).join(DAEMON_RELATIVE))
        })
        .collect()
}

pub fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Resolve the daemon executable.
///
/// An explicit path wins, then `CHIMERA_BINARY`, then the first executable
/// candidate. An override that is missing is not silently skipped.
pub fn find_daemon_binary(explicit: Option<&Path>) -> HarnessResult<PathBuf> {
    let from_env = env::var_os(BINARY_ENV).filter(|value| !value.is_empty());
    let overridden = explicit
        .map(Path::to_path_buf)
        .or_else(|| from_env.map(PathBuf::from));

    let searched = match overridden {
        Some(path) => vec![path],
        None => candidate_paths(),
    };

    for candidate in &searched {
        debug!("Probing for chimera binary at {}", candidate.display());
        if is_executable(candidate) {
            return Ok(candidate.clone());
        }
    }

    Err(HarnessError::BinaryNotFound { searched })
}

/// Directories that may hold the daemon's runtime libraries.
///
/// The binary sits at `<build>/src/daemon/chimera`, so the build root is two
/// levels above its directory.
pub fn library_dirs(binary: &Path) -> Vec<PathBuf> {
    let build_root = binary
        .parent()
        .and_then(Path::parent)
        .and_then(Path::parent)
        .unwrap_or_else(|| Path::new("/"));

    LIBRARY_SUBDIRS
        .iter()
        .map(|subdir| build_root.join(subdir))
        .collect()
}

/// `dirs` prepended to an existing search path.
pub fn library_search_path(
    dirs: &[PathBuf],
    existing: Option<&OsStr>,
) -> HarnessResult<OsString> {
    let mut entries: Vec<PathBuf> = dirs.to_vec();
    if let Some(existing) = existing.filter(|value| !value.is_empty()) {
        entries.extend(env::split_paths(existing));
    }

    env::join_paths(entries).map_err(|e| {
        HarnessError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Invalid library search path: {}", e),
        ))
    })
}
