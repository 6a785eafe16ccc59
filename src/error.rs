//! Engine-wide error taxonomy and exit-code mapping.
//!
//! Per-entry failures during add/extract/test/recompress are reported through
//! the status sink and the operation continues; index-write failures abort
//! the whole call.  The CLI maps the final result onto process exit codes:
//! 0 success, 1 general failure, 2 data errors (CRC / decompress), 130
//! cancelled.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::crypto::CryptoError;

pub type Result<T> = std::result::Result<T, Error>;

/// Structural problems with the container itself.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("bad magic — not a BAARv1 archive")]
    BadMagic,
    #[error("unexpected end of file while reading {0}")]
    Truncated(&'static str),
    #[error("inconsistent container: {0}")]
    Inconsistent(String),
}

#[derive(Error, Debug)]
pub enum Error {
    /// File-level I/O failure with the path that caused it.
    #[error("{}: {}", .path.display(), .source)]
    File {
        path:   PathBuf,
        source: io::Error,
    },
    /// I/O failure on an already-open handle.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("compression failed: {0}")]
    Compression(String),
    #[error("decompression failed: {0}")]
    Decompression(String),
    /// CRC or inflate mismatch on an encrypted entry — wrong password.
    #[error("decryption failed — wrong password or corrupted data")]
    DecryptFailed,
    /// CRC mismatch or size mismatch on a plaintext entry.
    #[error("entry is corrupt (CRC or size mismatch)")]
    CorruptEntry,
    #[error("no such entry: {0}")]
    NotFound(String),
    #[error("entry already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Attach a path to a raw `io::Error`.
    pub fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::File { path: path.into(), source }
    }

    /// Process exit code for this error per the engine contract.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Cancelled => 130,
            Error::DecryptFailed | Error::CorruptEntry | Error::Decompression(_) => 2,
            _ => 1,
        }
    }
}

/// Map a read failure on an open handle: EOF becomes a `Truncated` format
/// error (the caller names the structure being read), anything else stays I/O.
pub(crate) fn read_failed(what: &'static str, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        FormatError::Truncated(what).into()
    } else {
        Error::Io(e)
    }
}
