//! Container header — format anchor at offset 0.
//!
//! # On-disk layout (32 bytes, all fields little-endian)
//!
//! ```text
//! Offset  Size  Field
//!    0      6   magic         = "BAARv1"  (6 ASCII bytes)
//!    6      2   pad           = 0
//!    8      8   index_offset  byte offset of the trailing index (LE u64);
//!                             zero means "no index yet"
//!   16     16   reserved      zero on creation; readers ignore
//! ```
//!
//! Only the six magic bytes are compared on read; the pad and the reserved
//! region are accepted with any content for forward compatibility.  New
//! writes always emit zeros there.
//!
//! The index lives at the tail of the file, so mutation appends data and a
//! fresh index, then patches `index_offset` in place — O(index), never
//! O(archive).

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{read_failed, FormatError, Result};

pub const MAGIC:       &[u8; 6] = b"BAARv1";
pub const HEADER_SIZE: u64      = 32;

/// Byte offset of the `index_offset` field, used for the in-place patch.
const INDEX_OFFSET_POS: u64 = 8;

#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub index_offset: u64,
}

impl Header {
    /// A header for a freshly created archive whose (empty) index starts
    /// immediately after the header.
    pub fn fresh() -> Self {
        Header { index_offset: HEADER_SIZE }
    }

    /// Write the full 32-byte header with zeroed pad and reserved regions.
    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[..6].copy_from_slice(MAGIC);
        buf[8..16].copy_from_slice(&self.index_offset.to_le_bytes());
        w.write_all(&buf)?;
        Ok(())
    }

    /// Read and validate the header.  Only the six-byte magic prefix is
    /// checked; the reserved bytes are ignored.
    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        let mut buf = [0u8; HEADER_SIZE as usize];
        r.read_exact(&mut buf).map_err(|e| read_failed("header", e))?;
        if &buf[..6] != MAGIC {
            return Err(FormatError::BadMagic.into());
        }
        let index_offset = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        Ok(Header { index_offset })
    }

    /// Rewrite only the `index_offset` field of an existing archive.
    /// Called after the new index has been appended at end-of-file.
    pub fn patch_index_offset(file: &mut File, index_offset: u64) -> Result<()> {
        file.seek(SeekFrom::Start(INDEX_OFFSET_POS))?;
        file.write_all(&index_offset.to_le_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn fresh_header_roundtrip() {
        let mut buf = Vec::new();
        Header::fresh().write(&mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE as usize);
        assert_eq!(&buf[..6], MAGIC);
        assert_eq!(&buf[6..8], &[0, 0]);

        let h = Header::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(h.index_offset, HEADER_SIZE);
    }

    #[test]
    fn nonzero_reserved_bytes_are_accepted() {
        let mut buf = Vec::new();
        Header { index_offset: 99 }.write(&mut buf).unwrap();
        for b in &mut buf[16..32] {
            *b = 0xAA;
        }
        let h = Header::read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(h.index_offset, 99);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let buf = vec![0u8; HEADER_SIZE as usize];
        assert!(Header::read(&mut Cursor::new(buf)).is_err());
    }
}
