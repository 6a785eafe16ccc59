//! DEFLATE engine: level mapping, multi-configuration search, store
//! fallback, and the auto-level probe.
//!
//! # Levels
//!
//! | Level | Strategy |
//! |-------|----------|
//! | 0 | store (no compression) |
//! | 1 | best-speed deflate |
//! | 2 | default deflate |
//! | 3 | candidate search: 4 strategies × 2 effort settings, smallest wins |
//! | 4 | candidate search: 4 strategies × 3 effort settings, smallest wins |
//!
//! The search axes are the knobs the deflate backend really has: the match
//! strategy (default / filtered / RLE / Huffman-only) and the effort level.
//! miniz keeps a fixed 32 KiB dictionary, so there is no separate window or
//! memory-level parameter to vary.
//!
//! After any compression pass the result is kept only if it is strictly
//! smaller than the input; otherwise the entry is stored and the caller
//! clears its COMPRESSED flag.
//!
//! All streams are raw deflate — no zlib wrapper, no gzip framing.

use std::path::Path;

use miniz_oxide::deflate::core::{
    compress, create_comp_flags_from_zip_params, CompressorOxide, TDEFLFlush, TDEFLStatus,
};
use miniz_oxide::deflate::compress_to_vec;
use miniz_oxide::deflate::core::CompressionStrategy;
use miniz_oxide::inflate::decompress_to_vec_with_limit;

use crate::error::{Error, Result};

/// Compression level 0 — store.
pub const LEVEL_STORE: u8 = 0;
/// Highest supported compression level.
pub const LEVEL_MAX: u8 = 4;

/// Effort passed to the backend for level 1 (best speed).
const EFFORT_FAST: u8 = 1;
/// Effort passed to the backend for level 2 (default).
const EFFORT_DEFAULT: u8 = 6;
/// Effort candidates searched at level 3.
const EFFORTS_L3: &[u8] = &[9, 10];
/// Effort candidates searched at level 4.
const EFFORTS_L4: &[u8] = &[6, 9, 10];

/// Strategies searched at levels 3 and 4.
const STRATEGIES: &[CompressionStrategy] = &[
    CompressionStrategy::Default,
    CompressionStrategy::Filtered,
    CompressionStrategy::RLE,
    CompressionStrategy::HuffmanOnly,
];

/// Extensions of files that are almost certainly compressed already; the
/// auto-level probe stores these without sampling.
const COMPRESSED_EXTS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "zip", "gz", "bz2", "7z", "xz", "rar", "mp3", "ogg", "mp4",
    "mkv", "pdf", "woff", "woff2", "lz4", "zst",
];

/// Files smaller than this are always stored by the auto-level probe.
const AUTO_MIN_SIZE: u64 = 1024;
/// The auto-level probe compresses at most this much of the file.
const AUTO_SAMPLE: usize = 64 * 1024;

pub fn validate_level(level: u8) -> Result<()> {
    if level > LEVEL_MAX {
        return Err(Error::InvalidArgument(format!(
            "compression level {level} out of range 0..={LEVEL_MAX}"
        )));
    }
    Ok(())
}

/// Compress `data` at `level` (1..=4) and return the result only when it is
/// strictly smaller than the input.  `None` means "store instead".
pub fn try_compress(data: &[u8], level: u8) -> Result<Option<Vec<u8>>> {
    validate_level(level)?;
    if level == LEVEL_STORE || data.is_empty() {
        return Ok(None);
    }
    let out = match level {
        1 => compress_to_vec(data, EFFORT_FAST),
        2 => compress_to_vec(data, EFFORT_DEFAULT),
        3 => search_smallest(data, EFFORTS_L3)?,
        _ => search_smallest(data, EFFORTS_L4)?,
    };
    if out.len() < data.len() {
        Ok(Some(out))
    } else {
        Ok(None)
    }
}

/// Inflate a raw deflate stream, bounded by the expected plaintext size.
/// The caller compares the returned length against the entry's recorded
/// size and the CRC; this function only reports backend failures.
pub fn inflate(data: &[u8], expected_len: u64) -> Result<Vec<u8>> {
    let limit = usize::try_from(expected_len)
        .map_err(|_| Error::Decompression("entry larger than addressable memory".into()))?;
    decompress_to_vec_with_limit(data, limit)
        .map_err(|e| Error::Decompression(format!("inflate: {:?}", e.status)))
}

/// Run every strategy × effort candidate and keep the smallest output.
fn search_smallest(data: &[u8], efforts: &[u8]) -> Result<Vec<u8>> {
    let mut best: Option<Vec<u8>> = None;
    for &strategy in STRATEGIES {
        for &effort in efforts {
            let flags =
                create_comp_flags_from_zip_params(i32::from(effort), -15, strategy as i32);
            let out = deflate_with_flags(data, flags)?;
            if best.as_ref().map_or(true, |b| out.len() < b.len()) {
                best = Some(out);
            }
        }
    }
    // STRATEGIES is non-empty, so best is always set.
    best.ok_or_else(|| Error::Compression("no deflate candidate produced output".into()))
}

/// Drive the streaming compressor to completion with the given flags.
fn deflate_with_flags(data: &[u8], flags: u32) -> Result<Vec<u8>> {
    let mut compressor = CompressorOxide::new(flags);
    let mut output = vec![0u8; (data.len() / 2).max(64)];
    let mut in_pos = 0usize;
    let mut out_pos = 0usize;
    loop {
        let (status, bytes_in, bytes_out) = compress(
            &mut compressor,
            &data[in_pos..],
            &mut output[out_pos..],
            TDEFLFlush::Finish,
        );
        in_pos += bytes_in;
        out_pos += bytes_out;
        match status {
            TDEFLStatus::Done => {
                output.truncate(out_pos);
                return Ok(output);
            }
            TDEFLStatus::Okay => {
                if output.len().saturating_sub(out_pos) < 30 {
                    output.resize(output.len() * 2, 0);
                }
            }
            s => return Err(Error::Compression(format!("deflate failed: {s:?}"))),
        }
    }
}

/// Pick a compression level for a file from its path and content.
///
/// Empty files, files with a known already-compressed extension, and files
/// under 1 KiB are stored.  Everything else is judged by compressing up to
/// a 64 KiB prefix at best speed:
/// ratio > 0.95 → store, ratio > 0.6 → level 1, otherwise level 2.
pub fn auto_level(path: &Path, data: &[u8]) -> u8 {
    if data.is_empty() {
        return LEVEL_STORE;
    }
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        let ext = ext.to_ascii_lowercase();
        if COMPRESSED_EXTS.iter().any(|&e| e == ext) {
            return LEVEL_STORE;
        }
    }
    if (data.len() as u64) < AUTO_MIN_SIZE {
        return LEVEL_STORE;
    }
    let sample = &data[..data.len().min(AUTO_SAMPLE)];
    let comp = compress_to_vec(sample, EFFORT_FAST);
    let ratio = comp.len() as f64 / sample.len() as f64;
    if ratio > 0.95 {
        LEVEL_STORE
    } else if ratio > 0.6 {
        1
    } else {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Deterministic high-entropy bytes; deflate cannot shrink these.
    fn noise(len: usize) -> Vec<u8> {
        let mut state = 0x2545_F491_4F6C_DD1Du64;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state >> 32) as u8
            })
            .collect()
    }

    #[test]
    fn compressible_data_roundtrips_at_every_level() {
        let data = b"abcabcabcabcabcabc".repeat(512);
        for level in 1..=LEVEL_MAX {
            let comp = try_compress(&data, level).unwrap().expect("should shrink");
            assert!(comp.len() < data.len());
            let back = inflate(&comp, data.len() as u64).unwrap();
            assert_eq!(back, data);
        }
    }

    #[test]
    fn incompressible_data_falls_back_to_store() {
        let data = noise(4096);
        for level in 1..=LEVEL_MAX {
            assert!(try_compress(&data, level).unwrap().is_none());
        }
    }

    #[test]
    fn tiny_input_is_stored() {
        // 14 bytes of text cannot shrink under deflate framing overhead.
        assert!(try_compress(b"Hello, World!\n", 2).unwrap().is_none());
    }

    #[test]
    fn level_out_of_range_is_rejected() {
        assert!(try_compress(b"xx", 5).is_err());
        assert!(validate_level(4).is_ok());
    }

    #[test]
    fn search_beats_or_matches_default() {
        let data = b"the quick brown fox jumps over the lazy dog. ".repeat(200);
        let at2 = try_compress(&data, 2).unwrap().unwrap();
        let at4 = try_compress(&data, 4).unwrap().unwrap();
        assert!(at4.len() <= at2.len());
    }

    #[test]
    fn auto_level_rules() {
        let p = Path::new("data.bin");
        assert_eq!(auto_level(p, &[]), 0);
        assert_eq!(auto_level(Path::new("photo.JPG"), &noise(8192)), 0);
        assert_eq!(auto_level(p, &[0u8; 100]), 0); // under 1 KiB
        assert_eq!(auto_level(p, &vec![0u8; 65536]), 2); // highly compressible
        assert_eq!(auto_level(p, &noise(65536)), 0); // ratio > 0.95
    }

    #[test]
    fn auto_level_is_idempotent() {
        let data = vec![0x41u8; 20000];
        let first = auto_level(Path::new("a.txt"), &data);
        let second = auto_level(Path::new("a.txt"), &data);
        assert_eq!(first, second);
    }
}
