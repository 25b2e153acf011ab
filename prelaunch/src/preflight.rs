//! Pre-flight checks for prelaunch
//!
//! Validates the target and recorder before anything is forked.
//! Provides clear, actionable error messages when requirements aren't met.

use anyhow::{Context, Result};
use object::{Object, ObjectSection};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::domain::PreflightError;
use crate::launcher::resolve_program;

/// Run all pre-flight checks. Returns the resolved target and recorder paths.
///
/// # Errors
/// Returns a [`PreflightError`] if the target or recorder cannot be found, or
/// if the working directory does not exist.
pub fn run_preflight_checks(
    target: &Path,
    recorder: &Path,
    working_dir: Option<&Path>,
    quiet: bool,
) -> Result<(PathBuf, PathBuf)> {
    let path_var = std::env::var_os("PATH");
    if let Some(dir) = working_dir {
        check_working_dir(dir)?;
    }
    let target = check_program(target, working_dir, path_var.as_deref())
        .ok_or_else(|| PreflightError::TargetNotFound(target.to_path_buf()))?;
    let recorder = check_program(recorder, None, path_var.as_deref())
        .ok_or_else(|| PreflightError::RecorderNotFound(recorder.to_path_buf()))?;
    check_debug_symbols(&target, quiet)?;
    Ok((target, recorder))
}

/// Resolve `program` to an executable, the way the child will look it up
/// after changing into `working_dir`
fn check_program(program: &Path, working_dir: Option<&Path>, path_var: Option<&OsStr>) -> Option<PathBuf> {
    // Relative paths are resolved by the child after chdir
    let lookup = match working_dir {
        Some(dir) if program.is_relative() && program.components().count() > 1 => dir.join(program),
        _ => program.to_path_buf(),
    };
    resolve_program(&lookup, path_var)
}

fn check_working_dir(dir: &Path) -> Result<(), PreflightError> {
    if !dir.is_dir() {
        return Err(PreflightError::WorkingDirNotFound(dir.to_path_buf()));
    }
    Ok(())
}

/// Check if the binary has symbols, so recorded samples can be resolved
fn check_debug_symbols(target_path: &Path, quiet: bool) -> Result<()> {
    if quiet {
        return Ok(());
    }

    let file_data = std::fs::read(target_path)
        .with_context(|| format!("Failed to read binary: {}", target_path.display()))?;

    let Ok(obj) = object::File::parse(&*file_data) else {
        // Scripts and other non-ELF targets: nothing to check
        return Ok(());
    };

    let has_debug_info = obj.section_by_name(".debug_info").is_some_and(|s| s.size() > 0);
    let has_symtab = obj.section_by_name(".symtab").is_some_and(|s| s.size() > 0);

    if !has_debug_info && !has_symtab {
        eprintln!("warning: target is stripped, samples will show addresses only");
    } else if !has_debug_info {
        eprintln!("warning: no DWARF debug info in target, source locations unavailable");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_target_is_typed() {
        let err = run_preflight_checks(Path::new("/nonexistent/path/to/binary"), Path::new("sh"), None, true)
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<PreflightError>(), Some(PreflightError::TargetNotFound(_))));
    }

    #[test]
    fn test_missing_recorder_is_typed() {
        let err = run_preflight_checks(Path::new("sh"), Path::new("/nonexistent/perf"), None, true).unwrap_err();
        assert!(matches!(err.downcast_ref::<PreflightError>(), Some(PreflightError::RecorderNotFound(_))));
    }

    #[test]
    fn test_program_found_on_default_path() {
        let path = check_program(Path::new("sh"), None, None).unwrap();
        assert!(path.is_absolute());
    }

    #[test]
    fn test_relative_program_resolved_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir(&bin).unwrap();
        let script = bin.join("app");
        std::fs::write(&script, "#!/bin/sh\n").unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o755);
        std::fs::set_permissions(&script, perms).unwrap();

        let found = check_program(Path::new("bin/app"), Some(dir.path()), None).unwrap();
        assert_eq!(found, script);
    }

    #[test]
    fn test_missing_working_dir() {
        let err = check_working_dir(Path::new("/nonexistent/dir")).unwrap_err();
        assert!(matches!(err, PreflightError::WorkingDirNotFound(_)));
    }

    #[test]
    fn test_non_elf_target_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("run.sh");
        std::fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();
        assert!(check_debug_symbols(&script, false).is_ok());
    }
}
