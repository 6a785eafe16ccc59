//! High-level [`Archive`] API — the primary embedding surface.
//!
//! ```no_run
//! use baar::archive::Archive;
//! use baar::crypto::CipherMode;
//!
//! let mut ar = Archive::open("backup.baar")?;
//! for e in ar.list() {
//!     println!("{:>10}  {}", e.uncomp_size, e.name);
//! }
//! let data = ar.read("notes/todo.txt", "", CipherMode::Modern)?;
//! # let _ = data;
//! # Ok::<(), baar::error::Error>(())
//! ```
//!
//! Read operations go through an `Archive` opened read-only.  Mutations
//! that rewrite only the index (rename, mkdir) are free functions that
//! open the file r+w for the duration of the call; removal delegates to
//! the rebuild pass.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use chrono::Utc;
use glob::Pattern;

use crate::crypto::CipherMode;
use crate::error::{Error, Result};
use crate::index::{Entry, ListEntry};
use crate::reader::Container;
use crate::status::StatusSink;

pub struct Archive {
    c: Container,
}

/// Aggregate result of a whole-archive integrity test.
#[derive(Debug, Default)]
pub struct TestReport {
    pub tested: usize,
    pub failed: usize,
}

impl TestReport {
    pub fn ok(&self) -> bool {
        self.failed == 0
    }
}

/// Summary counters for an archive file.
#[derive(Debug)]
pub struct ArchiveStat {
    pub live_entries:    usize,
    pub deleted_entries: usize,
    pub data_bytes:      u64,
    pub index_offset:    u64,
}

impl Archive {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Archive { c: Container::open(path.as_ref(), false)? })
    }

    pub fn path(&self) -> &Path {
        &self.c.path
    }

    /// Live entries in insertion order.
    pub fn list(&self) -> Vec<ListEntry> {
        self.c.index.live().map(ListEntry::from).collect()
    }

    pub fn stat(&self) -> ArchiveStat {
        let live = self.c.index.live_count();
        ArchiveStat {
            live_entries:    live,
            deleted_entries: self.c.index.entries.len() - live,
            data_bytes:      self.c.header.index_offset.saturating_sub(crate::header::HEADER_SIZE),
            index_offset:    self.c.header.index_offset,
        }
    }

    /// Metadata of one live entry by name.
    pub fn info(&self, name: &str) -> Result<ListEntry> {
        self.c
            .index
            .find_live(name)
            .map(ListEntry::from)
            .ok_or_else(|| Error::NotFound(name.into()))
    }

    /// Live entries whose name matches a shell-style wildcard pattern.
    pub fn search(&self, pattern: &str) -> Result<Vec<ListEntry>> {
        if pattern.is_empty() {
            return Err(Error::InvalidArgument("empty pattern".into()));
        }
        let pat = Pattern::new(pattern)
            .map_err(|e| Error::InvalidArgument(format!("bad pattern {pattern:?}: {e}")))?;
        Ok(self
            .c
            .index
            .live()
            .filter(|e| pat.matches(&e.name))
            .map(ListEntry::from)
            .collect())
    }

    /// Plaintext of one live entry by name.
    pub fn read(&mut self, name: &str, password: &str, mode: CipherMode) -> Result<Vec<u8>> {
        let entry = self
            .c
            .index
            .find_live(name)
            .ok_or_else(|| Error::NotFound(name.into()))?
            .clone();
        self.c.retrieve(&entry, password, mode)
    }

    /// Plaintext of one entry by id (deleted entries are rejected).
    pub fn read_by_id(&mut self, id: u32, password: &str, mode: CipherMode) -> Result<Vec<u8>> {
        let entry = self
            .c
            .index
            .find_by_id(id)
            .ok_or_else(|| Error::NotFound(format!("id {id}")))?
            .clone();
        self.c.retrieve(&entry, password, mode)
    }

    /// Write one entry's plaintext to a sink.
    pub fn cat(
        &mut self,
        name: &str,
        password: &str,
        mode: CipherMode,
        out: &mut dyn Write,
    ) -> Result<()> {
        let data = self.read(name, password, mode)?;
        out.write_all(&data)?;
        Ok(())
    }

    /// Decrypt, decompress and CRC-check every live entry.  Per-entry
    /// failures go to the sink; the report aggregates pass/fail.
    pub fn test(
        &mut self,
        password: &str,
        mode: CipherMode,
        sink: &dyn StatusSink,
    ) -> Result<TestReport> {
        let mut report = TestReport::default();
        let entries: Vec<Entry> = self.c.index.live().cloned().collect();
        for entry in &entries {
            if entry.is_dir() {
                continue;
            }
            report.tested += 1;
            if let Err(e) = self.c.retrieve(entry, password, mode) {
                sink.line(&format!("{}: {e}", entry.name));
                report.failed += 1;
            }
        }
        Ok(report)
    }

    /// Extract every live entry under `dest`, restoring mode and mtime.
    pub fn extract_all(
        &mut self,
        dest: &Path,
        password: &str,
        mode: CipherMode,
        sink: &dyn StatusSink,
    ) -> Result<usize> {
        fs::create_dir_all(dest).map_err(|e| Error::file(dest, e))?;
        let entries: Vec<Entry> = self.c.index.live().cloned().collect();
        let mut written = 0usize;
        for entry in &entries {
            let target = match relative_name(&entry.name) {
                Ok(rel) => dest.join(rel),
                Err(e) => {
                    sink.line(&format!("{}: {e}", entry.name));
                    continue;
                }
            };
            match self.extract_entry(entry, &target, password, mode) {
                Ok(()) => written += 1,
                Err(e) => sink.line(&format!("{}: {e}", entry.name)),
            }
        }
        Ok(written)
    }

    /// Extract one entry into `dest_dir` under its basename; returns the
    /// path written.
    pub fn extract_single(
        &mut self,
        name: &str,
        dest_dir: &Path,
        password: &str,
        mode: CipherMode,
    ) -> Result<PathBuf> {
        let base = name.trim_end_matches('/').rsplit('/').next().unwrap_or(name);
        let dest = dest_dir.join(base);
        self.extract_to_path(name, &dest, password, mode)?;
        Ok(dest)
    }

    /// Extract one entry to an explicit destination path.
    pub fn extract_to_path(
        &mut self,
        name: &str,
        dest: &Path,
        password: &str,
        mode: CipherMode,
    ) -> Result<()> {
        let entry = self
            .c
            .index
            .find_live(name)
            .ok_or_else(|| Error::NotFound(name.into()))?
            .clone();
        self.extract_entry(&entry, dest, password, mode)
    }

    fn extract_entry(
        &mut self,
        entry: &Entry,
        dest: &Path,
        password: &str,
        mode: CipherMode,
    ) -> Result<()> {
        if entry.is_dir() {
            fs::create_dir_all(dest).map_err(|e| Error::file(dest, e))?;
            restore_attrs(dest, entry)?;
            return Ok(());
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::file(parent, e))?;
        }
        let data = self.c.retrieve(entry, password, mode)?;
        fs::write(dest, data).map_err(|e| Error::file(dest, e))?;
        restore_attrs(dest, entry)?;
        Ok(())
    }
}

/// Rename one entry in place.  Returns `false` (silently) when no entry
/// carries the id; `AlreadyExists` when the target name is taken by another
/// live entry.
pub fn rename(archive: &Path, id: u32, new_name: &str) -> Result<bool> {
    let mut c = Container::open(archive, true)?;
    let Some(pos) = c.index.entries.iter().position(|e| e.id == id) else {
        return Ok(false);
    };
    let clean = new_name.trim_start_matches('/');
    if clean.is_empty() {
        return Err(Error::InvalidArgument("empty entry name".into()));
    }
    if let Some(other) = c.index.position_live(clean) {
        if other != pos {
            return Err(Error::AlreadyExists(clean.into()));
        }
    }
    c.index.rename(pos, clean.to_string());
    c.commit_index()?;
    Ok(true)
}

/// Create an explicit directory entry (name gets a trailing `/`).
pub fn mkdir(archive: &Path, name: &str) -> Result<()> {
    let mut clean = name.trim_start_matches('/').trim_end_matches('/').to_string();
    if clean.is_empty() {
        return Err(Error::InvalidArgument("empty directory name".into()));
    }
    clean.push('/');

    let mut c = Container::open_or_create(archive)?;
    if c.index.find_live(&clean).is_some() {
        return Err(Error::AlreadyExists(clean));
    }
    let now = Utc::now().timestamp().max(0) as u64;
    let entry = Entry {
        id: c.index.alloc_id(),
        name: clean,
        flags: 0,
        comp_level: 0,
        data_offset: crate::header::HEADER_SIZE,
        comp_size: 0,
        uncomp_size: 0,
        crc32: 0,
        mode: 0o755,
        uid: 0,
        gid: 0,
        mtime: now,
        meta: Vec::new(),
    };
    c.index.push(entry);
    c.commit_index()
}

/// Reject names that would escape the destination directory.
fn relative_name(name: &str) -> Result<&Path> {
    let p = Path::new(name);
    if p.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
        return Err(Error::InvalidArgument(format!("unsafe entry name {name:?}")));
    }
    Ok(p)
}

#[cfg(unix)]
fn restore_attrs(dest: &Path, entry: &Entry) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(dest, fs::Permissions::from_mode(entry.mode & 0o7777))
        .map_err(|e| Error::file(dest, e))?;
    set_mtime(dest, entry)
}

#[cfg(not(unix))]
fn restore_attrs(dest: &Path, entry: &Entry) -> Result<()> {
    set_mtime(dest, entry)
}

fn set_mtime(dest: &Path, entry: &Entry) -> Result<()> {
    if entry.is_dir() || entry.mtime == 0 {
        return Ok(());
    }
    let file = fs::File::options()
        .write(true)
        .open(dest)
        .map_err(|e| Error::file(dest, e))?;
    file.set_modified(UNIX_EPOCH + Duration::from_secs(entry.mtime))
        .map_err(|e| Error::file(dest, e))?;
    Ok(())
}
