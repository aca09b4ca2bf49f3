//! Filesystem immutable flag.
//!
//! macOS uses the user-immutable flag (`chflags uchg`); Linux shells out to
//! `chattr`/`lsattr`, which needs `CAP_LINUX_IMMUTABLE`.

use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

pub trait ImmutabilityPrimitive: Send + Sync {
    fn set_immutable(&self, path: &Path) -> io::Result<()>;
    fn clear_immutable(&self, path: &Path) -> io::Result<()>;
    fn is_immutable(&self, path: &Path) -> io::Result<bool>;
}

/// The OS implementation of [`ImmutabilityPrimitive`].
#[derive(Debug, Default, Clone, Copy)]
pub struct FileFlags;

#[cfg(target_os = "macos")]
mod platform {
    use std::ffi::CString;
    use std::io;
    use std::os::macos::fs::MetadataExt;
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    const UF_IMMUTABLE: u32 = 0x0000_0002;

    fn c_path(path: &Path) -> io::Result<CString> {
        CString::new(path.as_os_str().as_bytes())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"))
    }

    fn flags(path: &Path) -> io::Result<u32> {
        Ok(std::fs::symlink_metadata(path)?.st_flags())
    }

    fn apply(path: &Path, flags: u32) -> io::Result<()> {
        let c_path = c_path(path)?;
        let ret = unsafe { libc::chflags(c_path.as_ptr(), flags as _) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn set(path: &Path) -> io::Result<()> {
        apply(path, flags(path)? | UF_IMMUTABLE)
    }

    pub fn clear(path: &Path) -> io::Result<()> {
        apply(path, flags(path)? & !UF_IMMUTABLE)
    }

    pub fn is_set(path: &Path) -> io::Result<bool> {
        Ok(flags(path)? & UF_IMMUTABLE != 0)
    }
}

#[cfg(target_os = "linux")]
mod platform {
    use std::io;
    use std::path::Path;
    use std::process::Command;

    fn chattr(flag: &str, path: &Path) -> io::Result<()> {
        let output = Command::new("chattr").arg(flag).arg(path).output()?;
        if !output.status.success() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!(
                    "chattr {flag} {}: {}",
                    path.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        Ok(())
    }

    pub fn set(path: &Path) -> io::Result<()> {
        chattr("+i", path)
    }

    pub fn clear(path: &Path) -> io::Result<()> {
        chattr("-i", path)
    }

    pub fn is_set(path: &Path) -> io::Result<bool> {
        let output = Command::new("lsattr").arg("-d").arg(path).output()?;
        if !output.status.success() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let attrs = stdout.split_whitespace().next().unwrap_or_default();
        Ok(attrs.contains('i'))
    }
}

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
mod platform {
    use std::io;
    use std::path::Path;

    fn unsupported() -> io::Error {
        io::Error::new(
            io::ErrorKind::Unsupported,
            "immutable flag not supported on this platform",
        )
    }

    pub fn set(_path: &Path) -> io::Result<()> {
        Err(unsupported())
    }

    pub fn clear(_path: &Path) -> io::Result<()> {
        Err(unsupported())
    }

    pub fn is_set(_path: &Path) -> io::Result<bool> {
        Err(unsupported())
    }
}

impl ImmutabilityPrimitive for FileFlags {
    fn set_immutable(&self, path: &Path) -> io::Result<()> {
        platform::set(path)
    }

    fn clear_immutable(&self, path: &Path) -> io::Result<()> {
        platform::clear(path)
    }

    fn is_immutable(&self, path: &Path) -> io::Result<bool> {
        platform::is_set(path)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("immutable flag on {path}: {source}")]
pub struct FlagError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Applies or removes the immutable flag across a set of artifacts.
pub struct ImmutabilityGuard<'a> {
    primitive: &'a dyn ImmutabilityPrimitive,
}

impl<'a> ImmutabilityGuard<'a> {
    pub fn new(primitive: &'a dyn ImmutabilityPrimitive) -> Self {
        Self { primitive }
    }

    /// Flag every path. Stops at the first failure; paths flagged before it
    /// stay flagged. Returns the paths flagged.
    pub fn protect<'p, I>(&self, paths: I) -> Result<Vec<PathBuf>, FlagError>
    where
        I: IntoIterator<Item = &'p Path>,
    {
        let mut flagged = Vec::new();
        for path in paths {
            self.primitive
                .set_immutable(path)
                .map_err(|source| FlagError {
                    path: path.to_path_buf(),
                    source,
                })?;
            flagged.push(path.to_path_buf());
        }
        Ok(flagged)
    }

    /// Clear the flag on every existing path that carries it. Missing paths
    /// are skipped. Returns how many flags were cleared.
    pub fn release<'p, I>(&self, paths: I) -> Result<usize, FlagError>
    where
        I: IntoIterator<Item = &'p Path>,
    {
        let mut cleared = 0;
        for path in paths {
            if !path.exists() {
                continue;
            }
            match self.primitive.is_immutable(path) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(e) => debug!(path = %path.display(), error = %e, "flag query failed; clearing anyway"),
            }
            self.primitive
                .clear_immutable(path)
                .map_err(|source| FlagError {
                    path: path.to_path_buf(),
                    source,
                })?;
            cleared += 1;
        }
        Ok(cleared)
    }
}
