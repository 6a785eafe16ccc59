//! Per-process temporary directories for staged extraction.
//!
//! Directories are created next to the archive as `.<tag>_<pid>_<nn>`
//! (mode 0o700) so GUI drag-out extraction stays on the same filesystem as
//! the archive; when that location is unusable (read-only media, missing
//! parent, permissions) the fallback is `/tmp/<tag>_<pid>_<nn>`.  Up to 100
//! uniqueness attempts are made per location.
//!
//! Every directory created through a [`TempDirRegistry`] is recorded in it
//! and removed recursively when the registry is dropped or `cleanup` is
//! called.  The registry is an explicit handle owned by the embedding
//! process; the engine holds no global state.

use std::fs::DirBuilder;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const MAX_ATTEMPTS: u32 = 100;

#[derive(Debug, Default)]
pub struct TempDirRegistry {
    dirs: Vec<PathBuf>,
}

impl TempDirRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh private directory near `archive`, falling back to
    /// `/tmp`.  The result is registered for cleanup.
    pub fn create(&mut self, archive: &Path, tag: &str) -> Result<PathBuf> {
        let pid = std::process::id();
        let near = archive.parent().filter(|p| !p.as_os_str().is_empty());

        if let Some(parent) = near {
            if let Some(dir) = try_location(parent, &format!(".{tag}"), pid) {
                self.dirs.push(dir.clone());
                return Ok(dir);
            }
        }
        if let Some(dir) = try_location(Path::new("/tmp"), tag, pid) {
            self.dirs.push(dir.clone());
            return Ok(dir);
        }
        Err(Error::InvalidArgument(format!(
            "could not create a temporary directory for {}",
            archive.display()
        )))
    }

    /// Remove every registered directory.  Errors are ignored — the
    /// directories are disposable by construction.
    pub fn cleanup(&mut self) {
        for dir in self.dirs.drain(..) {
            let _ = std::fs::remove_dir_all(&dir);
        }
    }
}

impl Drop for TempDirRegistry {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn try_location(base: &Path, prefix: &str, pid: u32) -> Option<PathBuf> {
    for nn in 0..MAX_ATTEMPTS {
        let candidate = base.join(format!("{prefix}_{pid}_{nn:02}"));
        match private_dir_builder().create(&candidate) {
            Ok(()) => return Some(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            // Unusable location (read-only, missing, forbidden).
            Err(_) => return None,
        }
    }
    None
}

#[cfg(unix)]
fn private_dir_builder() -> DirBuilder {
    use std::os::unix::fs::DirBuilderExt;
    let mut b = DirBuilder::new();
    b.mode(0o700);
    b
}

#[cfg(not(unix))]
fn private_dir_builder() -> DirBuilder {
    DirBuilder::new()
}
