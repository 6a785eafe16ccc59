//! # baar — native engine for the BAARv1 single-file container
//!
//! Format guarantees (frozen in v1):
//! - All numeric fields are little-endian; never negotiated
//! - 32-byte header at offset 0: magic `BAARv1`, u64 offset of the index
//! - The index lives at the tail; mutation appends data and a fresh index,
//!   then patches the header offset — O(index), never O(archive)
//! - Every entry stores the CRC-32 of its uncompressed, unencrypted bytes;
//!   retrieval always verifies it
//! - Payload compression is raw DEFLATE, per entry, with a strict
//!   "store unless strictly smaller" rule
//! - Optional per-entry encryption is a password-derived keystream
//!   (PBKDF2-HMAC-SHA256 → per-block HMAC); wrong passwords surface as a
//!   CRC mismatch, there is no MAC
//! - A deleted entry keeps its record until the next rebuild physically
//!   drops it

pub mod adapter;
pub mod archive;
pub mod cancel;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod header;
pub mod index;
pub mod reader;
pub mod rebuild;
pub mod status;
pub mod tempdir;
pub mod wire;
pub mod writer;

// Flat re-exports for the most common types.
pub use archive::{Archive, ArchiveStat, TestReport};
pub use cancel::CancelFlag;
pub use config::Config;
pub use crypto::CipherMode;
pub use error::{Error, FormatError, Result};
pub use header::{Header, HEADER_SIZE, MAGIC};
pub use index::{Entry, Index, ListEntry, FLAG_COMPRESSED, FLAG_DELETED, FLAG_ENCRYPTED};
pub use reader::Container;
pub use rebuild::{compact, recompress, remove, CompactReport, RecompressReport};
pub use status::{NullSink, StatusSink, StderrSink};
pub use tempdir::TempDirRegistry;
pub use writer::{add, AddJob, AddOptions, AddReport};
