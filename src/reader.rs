//! Container access: open, decode the trailing index, retrieve entries.
//!
//! Opening seeks straight to the trailing index named by the header; the
//! data region is only touched when a payload is actually needed.  The
//! in-memory index is authoritative for the duration of one operation and
//! is committed by appending a fresh index at end-of-file, then patching
//! the header's offset.
//!
//! Retrieval order is fixed: read blob → decrypt (if flagged) → inflate
//! (if flagged) → CRC-32 compare.  A CRC or inflate failure on an encrypted
//! entry is the wrong-password signal (`DecryptFailed`); the same failure
//! on a plaintext entry is `CorruptEntry` / `Decompression`.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::codec;
use crate::crypto::{self, CipherMode};
use crate::error::{read_failed, Error, FormatError, Result};
use crate::header::{Header, HEADER_SIZE};
use crate::index::{Entry, Index};

/// An open archive: file handle, parsed header, decoded index.
pub struct Container {
    pub path:   PathBuf,
    pub file:   File,
    pub header: Header,
    pub index:  Index,
}

impl Container {
    /// Open an existing archive.  `write` selects r+b semantics for
    /// mutating calls; the caller guarantees exclusive access.
    pub fn open(path: &Path, write: bool) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(write)
            .open(path)
            .map_err(|e| Error::file(path, e))?;

        let header = Header::read(&mut file)?;
        let index = if header.index_offset == 0 {
            // Header written, index never finalized.
            Index::new()
        } else {
            if header.index_offset < HEADER_SIZE {
                return Err(FormatError::Inconsistent(format!(
                    "index offset {} lies inside the header",
                    header.index_offset
                ))
                .into());
            }
            file.seek(SeekFrom::Start(header.index_offset))
                .map_err(|e| read_failed("index", e))?;
            Index::read(&mut file)?
        };

        Ok(Container { path: path.to_owned(), file, header, index })
    }

    /// Create a fresh archive: 32-byte header pointing at an empty index.
    pub fn create(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| Error::file(path, e))?;

        let header = Header::fresh();
        header.write(&mut file)?;
        let index = Index::new();
        index.write(&mut file)?;
        file.sync_all()?;

        Ok(Container { path: path.to_owned(), file, header, index })
    }

    pub fn open_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::open(path, true)
        } else {
            Self::create(path)
        }
    }

    /// Append the in-memory index at end-of-file, patch the header to point
    /// at it, and flush.  The previous index bytes become unreferenced and
    /// are reclaimed by the next rebuild.
    pub fn commit_index(&mut self) -> Result<()> {
        let index_offset = self.file.seek(SeekFrom::End(0))?;
        self.index.write(&mut self.file)?;
        Header::patch_index_offset(&mut self.file, index_offset)?;
        self.header.index_offset = index_offset;
        self.file.sync_all()?;
        Ok(())
    }

    /// Read an entry's raw on-disk blob (still compressed/encrypted).
    pub fn read_blob(&mut self, entry: &Entry) -> Result<Vec<u8>> {
        let end = entry.data_offset.saturating_add(entry.comp_size);
        if entry.data_offset < HEADER_SIZE || end > self.header.index_offset {
            return Err(FormatError::Inconsistent(format!(
                "entry {} blob {}..{} escapes the data region",
                entry.id, entry.data_offset, end
            ))
            .into());
        }
        let len = usize::try_from(entry.comp_size)
            .map_err(|_| Error::Decompression("entry larger than addressable memory".into()))?;
        self.file.seek(SeekFrom::Start(entry.data_offset))?;
        let mut buf = vec![0u8; len];
        self.file
            .read_exact(&mut buf)
            .map_err(|e| read_failed("entry payload", e))?;
        Ok(buf)
    }

    /// Retrieve one entry's plaintext: decrypt, inflate, verify CRC.
    pub fn retrieve(
        &mut self,
        entry: &Entry,
        password: &str,
        mode: CipherMode,
    ) -> Result<Vec<u8>> {
        if entry.is_deleted() {
            return Err(Error::NotFound(entry.name.clone()));
        }
        if entry.is_dir() {
            return Ok(Vec::new());
        }

        let mut data = self.read_blob(entry)?;
        if entry.is_encrypted() {
            crypto::apply_keystream(password.as_bytes(), &mut data, mode)?;
        }

        let plain = if entry.is_compressed() {
            match codec::inflate(&data, entry.uncomp_size) {
                Ok(p) => p,
                // Garbage after a wrong-password decrypt usually dies in the
                // inflater before the CRC ever runs.
                Err(_) if entry.is_encrypted() => return Err(Error::DecryptFailed),
                Err(e) => return Err(e),
            }
        } else {
            data
        };

        if plain.len() as u64 != entry.uncomp_size || crc32fast::hash(&plain) != entry.crc32 {
            return Err(if entry.is_encrypted() {
                Error::DecryptFailed
            } else {
                Error::CorruptEntry
            });
        }
        Ok(plain)
    }
}
