//! Streaming add: directory walk, incremental and mirror modes, payload
//! append, index commit.
//!
//! The mutation model is append-only until finalize: payload blobs are
//! written at end-of-file as they are produced, the in-memory index grows
//! alongside, and one `commit_index` call at the end appends the fresh
//! index and patches the header.  A crash before the patch leaves the old
//! index (and header offset) fully intact.
//!
//! Incremental mode skips files whose `(size, mtime, mode & 0o7777)` match
//! the live entry of the same name and marks superseded or mirror-removed
//! entries deleted in place.  Non-incremental mode finalizes and then runs
//! a compaction pass so superseded payloads are physically dropped.
//!
//! Cancellation is polled between walk entries and before each file read;
//! entries already appended are still committed so the archive stays
//! consistent.

use std::collections::BTreeSet;
use std::fs::{self, Metadata};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use glob::Pattern;
use walkdir::WalkDir;

use crate::cancel::CancelFlag;
use crate::codec;
use crate::crypto::{self, CipherMode};
use crate::error::{Error, Result};
use crate::index::{Entry, FLAG_COMPRESSED, FLAG_ENCRYPTED};
use crate::reader::Container;
use crate::rebuild;
use crate::status::{saved_percent, StatusSink};

/// One already-parsed add job: a source file or directory, an optional
/// archive-name override, and an optional fixed compression level
/// (`None` → per-file auto-selection).
#[derive(Debug, Clone)]
pub struct AddJob {
    pub source: PathBuf,
    pub rename: Option<String>,
    pub level:  Option<u8>,
}

impl AddJob {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        AddJob { source: source.into(), rename: None, level: None }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    /// Empty string means "no encryption".
    pub password:     String,
    pub incremental:  bool,
    pub mirror:       bool,
    pub ignore:       Vec<Pattern>,
    pub cipher_mode:  CipherMode,
    /// Progress lines show full source paths instead of basenames.
    pub verbose:      bool,
    /// Emit per-entry mirror planning decisions.
    pub debug_mirror: bool,
}

#[derive(Debug, Default)]
pub struct AddReport {
    pub added:   usize,
    pub skipped: usize,
    pub removed: usize,
    /// Per-entry failures that were logged and skipped.
    pub errors:  usize,
}

/// Add `jobs` to the archive at `path`, creating it if absent.
///
/// Returns `Error::Cancelled` after committing whatever was already added
/// when the flag was raised mid-walk.
pub fn add(
    path: &Path,
    jobs: &[AddJob],
    opts: &AddOptions,
    cancel: &CancelFlag,
    sink: &dyn StatusSink,
) -> Result<AddReport> {
    for job in jobs {
        if let Some(level) = job.level {
            codec::validate_level(level)?;
        }
    }

    let mut c = Container::open_or_create(path)?;
    // "Seen" covers only entries that existed before this run; additions are
    // live by construction.
    let mut seen = vec![false; c.index.entries.len()];
    let mut to_remove: BTreeSet<u32> = BTreeSet::new();
    let mut report = AddReport::default();
    let mut cancelled = false;

    'jobs: for job in jobs {
        let meta = fs::symlink_metadata(&job.source).map_err(|e| Error::file(&job.source, e))?;

        if meta.is_file() {
            if cancel.is_cancelled() {
                cancelled = true;
                break 'jobs;
            }
            let arc_name = job
                .rename
                .clone()
                .unwrap_or_else(|| basename(&job.source));
            if !is_ignored(&opts.ignore, &job.source, &arc_name) {
                process_file(
                    &mut c, &mut seen, &mut to_remove, &job.source, arc_name, job.level,
                    opts, cancel, sink, &mut report,
                );
            }
            continue;
        }

        if !meta.is_dir() {
            // Symlinks, sockets, device nodes are outside the format.
            sink.line(&format!("skipping special file {}", job.source.display()));
            continue;
        }

        let prefix = job.rename.clone().unwrap_or_else(|| basename(&job.source));
        let mut walk = WalkDir::new(&job.source).follow_links(false).into_iter();
        while let Some(item) = walk.next() {
            if cancel.is_cancelled() {
                cancelled = true;
                break 'jobs;
            }
            let dent = match item {
                Ok(d) => d,
                Err(e) => {
                    sink.line(&format!("walk error: {e}"));
                    report.errors += 1;
                    continue;
                }
            };
            let rel = dent.path().strip_prefix(&job.source).unwrap_or(dent.path());
            let arc_name = join_archive_path(&prefix, rel);

            if dent.file_type().is_dir() {
                if !rel.as_os_str().is_empty()
                    && is_ignored(&opts.ignore, dent.path(), &arc_name)
                {
                    walk.skip_current_dir();
                }
                continue;
            }
            if !dent.file_type().is_file() {
                continue;
            }
            if is_ignored(&opts.ignore, dent.path(), &arc_name) {
                continue;
            }
            process_file(
                &mut c, &mut seen, &mut to_remove, dent.path(), arc_name, job.level,
                opts, cancel, sink, &mut report,
            );
        }
    }

    // Mirror sweep — only when the walk saw the complete source set.
    if opts.mirror && !cancelled {
        for pos in 0..seen.len() {
            let (live, dir, name, id) = {
                let e = &c.index.entries[pos];
                (e.is_live(), e.is_dir(), e.name.clone(), e.id)
            };
            if !live || dir {
                continue;
            }
            if seen[pos] {
                if opts.debug_mirror {
                    sink.line(&format!("mirror: keeping {name}"));
                }
            } else {
                if opts.debug_mirror {
                    sink.line(&format!("mirror: removing {name}"));
                }
                to_remove.insert(id);
                if opts.incremental {
                    c.index.mark_deleted(pos);
                }
                report.removed += 1;
            }
        }
    }

    c.commit_index()?;

    if cancelled {
        return Err(Error::Cancelled);
    }

    if !opts.incremental && !to_remove.is_empty() {
        drop(c);
        rebuild::compact(path, &to_remove)?;
    }

    Ok(report)
}

/// Process one regular file.  Per-entry failures are reported through the
/// sink and counted; only index/container-level failures abort the add.
#[allow(clippy::too_many_arguments)]
fn process_file(
    c: &mut Container,
    seen: &mut [bool],
    to_remove: &mut BTreeSet<u32>,
    src: &Path,
    arc_name: String,
    level: Option<u8>,
    opts: &AddOptions,
    cancel: &CancelFlag,
    sink: &dyn StatusSink,
    report: &mut AddReport,
) {
    if cancel.is_cancelled() {
        return;
    }
    let shown = if opts.verbose {
        src.display().to_string()
    } else {
        basename(src)
    };

    let result = (|| -> Result<bool> {
        let meta = fs::metadata(src).map_err(|e| Error::file(src, e))?;

        if let Some(pos) = c.index.position_live(&arc_name) {
            if opts.incremental && unchanged(&c.index.entries[pos], &meta) {
                if pos < seen.len() {
                    seen[pos] = true;
                }
                sink.line(&format!("Skipping unchanged {shown}"));
                return Ok(false);
            }
        }

        if meta.len() > usize::MAX as u64 {
            return Err(Error::InvalidArgument(format!(
                "{}: file exceeds addressable memory",
                src.display()
            )));
        }
        let data = fs::read(src).map_err(|e| Error::file(src, e))?;

        // The previous live holder of this name is superseded only once the
        // replacement bytes are safely in memory.
        if let Some(pos) = c.index.position_live(&arc_name) {
            to_remove.insert(c.index.entries[pos].id);
            c.index.mark_deleted(pos);
        }

        let uncomp_size = data.len() as u64;
        let crc32 = crc32fast::hash(&data);
        let level = level.unwrap_or_else(|| codec::auto_level(src, &data));

        let mut flags = 0u8;
        let mut comp_level = 0u8;
        let mut payload = data;
        if level > 0 && !payload.is_empty() {
            if let Some(comp) = codec::try_compress(&payload, level)? {
                payload = comp;
                flags |= FLAG_COMPRESSED;
                comp_level = level;
            }
        }
        if !opts.password.is_empty() {
            crypto::apply_keystream(opts.password.as_bytes(), &mut payload, opts.cipher_mode)?;
            flags |= FLAG_ENCRYPTED;
        }

        let data_offset = c.file.seek(SeekFrom::End(0))?;
        c.file.write_all(&payload)?;
        let comp_size = payload.len() as u64;

        let (mode, uid, gid, mtime) = posix_attrs(&meta);
        let entry = Entry {
            id: c.index.alloc_id(),
            name: arc_name,
            flags,
            comp_level,
            data_offset,
            comp_size,
            uncomp_size,
            crc32,
            mode,
            uid,
            gid,
            mtime,
            meta: Vec::new(),
        };
        c.index.push(entry);

        sink.line(&format!("{shown} ({:.0}%)", saved_percent(comp_size, uncomp_size)));
        Ok(true)
    })();

    match result {
        Ok(true) => report.added += 1,
        Ok(false) => report.skipped += 1,
        Err(e) => {
            sink.line(&format!("{shown}: {e}"));
            report.errors += 1;
        }
    }
}

/// Incremental skip test: size, mtime, and permission bits all unchanged.
fn unchanged(entry: &Entry, meta: &Metadata) -> bool {
    let (mode, _, _, mtime) = posix_attrs(meta);
    entry.uncomp_size == meta.len()
        && entry.mtime == mtime
        && entry.mode & 0o7777 == mode & 0o7777
}

#[cfg(unix)]
fn posix_attrs(meta: &Metadata) -> (u32, u32, u32, u64) {
    use std::os::unix::fs::MetadataExt;
    (
        meta.mode() & 0o7777,
        meta.uid(),
        meta.gid(),
        meta.mtime().max(0) as u64,
    )
}

#[cfg(not(unix))]
fn posix_attrs(meta: &Metadata) -> (u32, u32, u32, u64) {
    use std::time::UNIX_EPOCH;
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs());
    (if meta.permissions().readonly() { 0o444 } else { 0o644 }, 0, 0, mtime)
}

/// Ignore globs are tested against the full source path, the
/// archive-relative path, and the basename.
fn is_ignored(patterns: &[Pattern], src: &Path, arc_name: &str) -> bool {
    if patterns.is_empty() {
        return false;
    }
    let full = src.to_string_lossy();
    let base = arc_name.rsplit('/').next().unwrap_or(arc_name);
    patterns
        .iter()
        .any(|p| p.matches(&full) || p.matches(arc_name) || p.matches(base))
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Join the job prefix with a walk-relative path using `/` separators.
fn join_archive_path(prefix: &str, rel: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    let trimmed = prefix.trim_matches('/');
    if !trimmed.is_empty() {
        parts.push(trimmed.to_string());
    }
    for comp in rel.components() {
        parts.push(comp.as_os_str().to_string_lossy().into_owned());
    }
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_path_joining() {
        assert_eq!(join_archive_path("src", Path::new("a/b.txt")), "src/a/b.txt");
        assert_eq!(join_archive_path("", Path::new("x")), "x");
        assert_eq!(join_archive_path("dir/", Path::new("")), "dir");
    }

    #[test]
    fn ignore_matches_all_three_forms() {
        let pats = vec![Pattern::new("*.log").unwrap()];
        assert!(is_ignored(&pats, Path::new("/tmp/build/x.log"), "build/x.log"));
        assert!(!is_ignored(&pats, Path::new("/tmp/build/x.txt"), "build/x.txt"));

        let pats = vec![Pattern::new("target").unwrap()];
        assert!(is_ignored(&pats, Path::new("proj/target"), "proj/target"));
    }
}
