//! Program lookup
//!
//! Mirrors the `execvp` search rules so the candidate list can be computed
//! before forking, leaving the child with nothing to allocate.

use std::ffi::OsStr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Search path used when `$PATH` is unset (same as glibc's `_CS_PATH`)
pub const DEFAULT_SEARCH_PATH: &str = "/bin:/usr/bin";

/// List the paths `program` may be executed from, in search order.
///
/// A program containing a `/` is taken as-is (relative to the working
/// directory the child will run in). Otherwise every `$PATH` entry is tried;
/// an empty entry means the current directory.
#[must_use]
pub fn program_candidates(program: &Path, path_var: Option<&OsStr>) -> Vec<PathBuf> {
    if program.as_os_str().is_empty() {
        return Vec::new();
    }
    if program.as_os_str().as_encoded_bytes().contains(&b'/') {
        return vec![program.to_path_buf()];
    }

    let search = path_var.unwrap_or_else(|| OsStr::new(DEFAULT_SEARCH_PATH));
    std::env::split_paths(search)
        .map(|dir| if dir.as_os_str().is_empty() { PathBuf::from(".") } else { dir })
        .map(|dir| dir.join(program))
        .collect()
}

/// Resolve `program` to the first executable regular file on the search path.
#[must_use]
pub fn resolve_program(program: &Path, path_var: Option<&OsStr>) -> Option<PathBuf> {
    program_candidates(program, path_var).into_iter().find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}
