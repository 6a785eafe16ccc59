//! Compaction and recompression — the two whole-archive rewrite passes.
//!
//! Compaction renames the archive to `<name>.bak`, copies every live,
//! non-excluded entry's blob verbatim into a fresh file (ids, flags, POSIX
//! attributes and meta preserved), commits the new index, and deletes the
//! backup.  On any failure after the rename the backup is retained so the
//! caller can restore by renaming it back.
//!
//! Recompression builds the replacement as `<name>.tmp` first, then commits
//! with `archive → .bak`, `.tmp → archive`, delete `.bak`.  Encrypted
//! entries are copied verbatim — their plaintext is unknowable without the
//! password — and a re-encoded payload is kept only when it is strictly
//! smaller than the entry's current one.

use std::collections::BTreeSet;
use std::fs;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::codec;
use crate::error::{Error, Result};
use crate::index::FLAG_COMPRESSED;
use crate::reader::Container;
use crate::status::StatusSink;

#[derive(Debug, Default)]
pub struct CompactReport {
    pub kept:    usize,
    pub dropped: usize,
}

#[derive(Debug, Default)]
pub struct RecompressReport {
    pub recoded: usize,
    pub copied:  usize,
    pub errors:  usize,
}

/// Rebuild the archive, physically dropping deleted entries and everything
/// in `exclude`.
pub fn compact(path: &Path, exclude: &BTreeSet<u32>) -> Result<CompactReport> {
    let bak = sibling(path, ".bak");
    fs::rename(path, &bak).map_err(|e| Error::file(path, e))?;

    match copy_live(path, &bak, exclude) {
        Ok(report) => {
            fs::remove_file(&bak).map_err(|e| Error::file(&bak, e))?;
            Ok(report)
        }
        // Backup retained; renaming it back restores the original archive.
        Err(e) => Err(e),
    }
}

/// Logical delete: rebuild with the given ids excluded.
pub fn remove(path: &Path, ids: &BTreeSet<u32>) -> Result<CompactReport> {
    compact(path, ids)
}

fn copy_live(path: &Path, bak: &Path, exclude: &BTreeSet<u32>) -> Result<CompactReport> {
    let mut src = Container::open(bak, false)?;
    let mut dst = Container::create(path)?;
    let mut report = CompactReport::default();
    let mut max_id = 0u32;

    let entries = src.index.entries.clone();
    for entry in &entries {
        if entry.is_deleted() || exclude.contains(&entry.id) {
            report.dropped += 1;
            continue;
        }
        let blob = src.read_blob(entry)?;
        let data_offset = dst.file.seek(SeekFrom::End(0))?;
        dst.file.write_all(&blob)?;

        let mut copied = entry.clone();
        copied.data_offset = data_offset;
        max_id = max_id.max(copied.id);
        dst.index.push(copied);
        report.kept += 1;
    }

    dst.index.next_id = max_id.checked_add(1).unwrap_or(u32::MAX).max(1);
    dst.commit_index()?;
    Ok(report)
}

/// Re-encode every live entry at `level`.
pub fn recompress(path: &Path, level: u8, sink: &dyn StatusSink) -> Result<RecompressReport> {
    codec::validate_level(level)?;

    let tmp = sibling(path, ".tmp");
    let bak = sibling(path, ".bak");
    let mut report = RecompressReport::default();

    {
        let mut src = Container::open(path, false)?;
        let mut dst = Container::create(&tmp)?;
        let mut max_id = 0u32;

        let entries = src.index.entries.clone();
        for entry in &entries {
            if entry.is_deleted() {
                continue;
            }
            max_id = max_id.max(entry.id);
            let blob = src.read_blob(entry)?;

            // Without the password the plaintext is unknowable; copy as-is.
            if entry.is_encrypted() || entry.is_dir() || entry.uncomp_size == 0 {
                let data_offset = append(&mut dst, &blob)?;
                let mut copied = entry.clone();
                copied.data_offset = data_offset;
                dst.index.push(copied);
                report.copied += 1;
                continue;
            }

            let plain = if entry.is_compressed() {
                match codec::inflate(&blob, entry.uncomp_size) {
                    Ok(p) => p,
                    Err(e) => {
                        sink.line(&format!("{}: {e}", entry.name));
                        report.errors += 1;
                        let data_offset = append(&mut dst, &blob)?;
                        let mut copied = entry.clone();
                        copied.data_offset = data_offset;
                        dst.index.push(copied);
                        report.copied += 1;
                        continue;
                    }
                }
            } else {
                blob
            };

            let mut updated = entry.clone();
            match codec::try_compress(&plain, level)? {
                Some(comp) if (comp.len() as u64) < entry.comp_size => {
                    updated.data_offset = append(&mut dst, &comp)?;
                    updated.comp_size = comp.len() as u64;
                    updated.comp_level = level;
                    updated.flags |= FLAG_COMPRESSED;
                    updated.crc32 = crc32fast::hash(&plain);
                    dst.index.push(updated);
                    report.recoded += 1;
                }
                _ => {
                    // No improvement over the current encoding — unchanged.
                    let stored = if entry.is_compressed() {
                        src.read_blob(entry)?
                    } else {
                        plain
                    };
                    updated.data_offset = append(&mut dst, &stored)?;
                    dst.index.push(updated);
                    report.copied += 1;
                }
            }
        }

        dst.index.next_id = max_id.checked_add(1).unwrap_or(u32::MAX).max(1);
        dst.commit_index()?;
    }

    fs::rename(path, &bak).map_err(|e| Error::file(path, e))?;
    if let Err(e) = fs::rename(&tmp, path) {
        // `.bak` retained for manual restore.
        return Err(Error::file(&tmp, e));
    }
    fs::remove_file(&bak).map_err(|e| Error::file(&bak, e))?;
    Ok(report)
}

fn append(dst: &mut Container, payload: &[u8]) -> Result<u64> {
    let offset = dst.file.seek(SeekFrom::End(0))?;
    dst.file.write_all(payload)?;
    Ok(offset)
}

/// `a.bin` → `a.bin.bak` style sibling paths.
pub(crate) fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_appends_to_full_name() {
        assert_eq!(sibling(Path::new("/x/a.bin"), ".bak"), Path::new("/x/a.bin.bak"));
        assert_eq!(sibling(Path::new("arch"), ".tmp"), Path::new("arch.tmp"));
    }
}
