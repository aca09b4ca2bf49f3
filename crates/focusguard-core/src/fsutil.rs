//! Filesystem helpers shared by the controller and the watchdog.
//!
//! Every write lands in a staging file inside the destination directory and is
//! renamed over the target, so a reader never observes a half-written
//! artifact and no staging file survives a failed write.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

const STAGING_PREFIX: &str = ".focusguard_staging_";

pub fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
    Ok(())
}

pub fn mode_of(path: &Path) -> io::Result<u32> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        Ok(fs::metadata(path)?.permissions().mode() & 0o7777)
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(0o644)
    }
}

/// Atomically replace `dest` with `data`, leaving it at `mode`.
pub fn write_atomic(dest: &Path, data: &[u8], mode: u32) -> io::Result<()> {
    let mut staging = staging_file_for(dest)?;
    staging.write_all(data)?;
    staging.as_file().sync_all()?;
    set_mode(staging.path(), mode)?;
    staging.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

/// Atomically replace `dest` with the contents of `src`. The copy keeps the
/// staging file's default mode; callers set the final mode.
pub fn copy_atomic(src: &Path, dest: &Path) -> io::Result<()> {
    let mut staging = staging_file_for(dest)?;
    with_owner_read(src, |readable| {
        let mut source = File::open(readable)?;
        io::copy(&mut source, staging.as_file_mut())?;
        Ok(())
    })?;
    staging.as_file().sync_all()?;
    staging.persist(dest).map_err(|e| e.error)?;
    Ok(())
}

/// Install the executable `src` at `dest` with `mode`. When both paths name
/// the same file only the mode changes.
pub fn install_executable(src: &Path, dest: &Path, mode: u32) -> io::Result<()> {
    if same_file(src, dest) {
        return set_mode(dest, mode);
    }
    copy_atomic(src, dest)?;
    set_mode(dest, mode)
}

/// Run `f` against `path`, temporarily granting the owner read permission if
/// the current mode denies it (exec-only artifacts).
pub fn with_owner_read<T>(path: &Path, f: impl FnOnce(&Path) -> io::Result<T>) -> io::Result<T> {
    let mode = mode_of(path)?;
    if cfg!(not(unix)) || mode & 0o400 != 0 {
        return f(path);
    }
    set_mode(path, mode | 0o400)?;
    let result = f(path);
    let restored = set_mode(path, mode);
    let value = result?;
    restored?;
    Ok(value)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn staging_file_for(dest: &Path) -> io::Result<NamedTempFile> {
    let parent = dest.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no parent directory for {}", dest.display()),
        )
    })?;
    fs::create_dir_all(parent)?;
    tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempfile_in(parent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_atomic_sets_mode_and_leaves_no_staging() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("artifact");
        write_atomic(&dest, b"payload", 0o444).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"payload");
        #[cfg(unix)]
        assert_eq!(mode_of(&dest).unwrap(), 0o444);
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with(STAGING_PREFIX))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn write_atomic_replaces_read_only_file() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("artifact");
        write_atomic(&dest, b"old", 0o400).unwrap();
        write_atomic(&dest, b"new", 0o400).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"new");
    }

    #[cfg(unix)]
    #[test]
    fn copy_of_exec_only_source_restores_its_mode() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("tool");
        fs::write(&src, b"#!binary").unwrap();
        set_mode(&src, 0o100).unwrap();
        let dest = dir.path().join("copy");
        copy_atomic(&src, &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"#!binary");
        assert_eq!(mode_of(&src).unwrap(), 0o100);
    }

    #[cfg(unix)]
    #[test]
    fn install_onto_itself_only_changes_mode() {
        let dir = tempdir().unwrap();
        let exe = dir.path().join("focusguard");
        fs::write(&exe, b"controller").unwrap();
        install_executable(&exe, &exe, 0o100).unwrap();
        assert_eq!(mode_of(&exe).unwrap(), 0o100);
        set_mode(&exe, 0o755).unwrap();
        assert_eq!(fs::read(&exe).unwrap(), b"controller");
    }
}
