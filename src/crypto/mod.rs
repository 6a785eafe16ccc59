//! Password-derived keystream cipher for archive payloads.
//!
//! Modern mode:
//!   salt = SHA-256(password)[..16]
//!   key  = PBKDF2-HMAC-SHA256(password, salt, 100 000 iterations, 32 bytes)
//!   block i keystream = HMAC-SHA256(key, "BAARSTREAM" || BE u64 i)
//! The keystream is XORed over the buffer in 32-byte blocks; the final block
//! is truncated to the remaining length.  Key material is wiped after use.
//!
//! Legacy mode (`legacy_xor` in the configuration) repeats the raw password
//! bytes as the keystream.  It exists only to stay bit-exact with archives
//! written by old builds and is never selected implicitly.
//!
//! This is a stream cipher without authentication: a wrong password is
//! detected downstream by the entry CRC, not here.  Applying the cipher to
//! an empty buffer or with an empty password is a no-op.

use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroize;

type HmacSha256 = Hmac<Sha256>;

/// Domain-separation label mixed into every keystream block.
const KEYSTREAM_LABEL: &[u8] = b"BAARSTREAM";

/// PBKDF2 iteration count, frozen with the format.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Keystream block width (one HMAC-SHA256 output).
const BLOCK: usize = 32;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}

/// Which keystream derivation the cipher uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CipherMode {
    #[default]
    Modern,
    LegacyXor,
}

/// XOR `buf` in place with the keystream derived from `password`.
///
/// Encryption and decryption are the same operation.  No-op when either the
/// buffer or the password is empty.
pub fn apply_keystream(
    password: &[u8],
    buf: &mut [u8],
    mode: CipherMode,
) -> Result<(), CryptoError> {
    if password.is_empty() || buf.is_empty() {
        return Ok(());
    }
    match mode {
        CipherMode::LegacyXor => {
            for (i, b) in buf.iter_mut().enumerate() {
                *b ^= password[i % password.len()];
            }
            Ok(())
        }
        CipherMode::Modern => apply_modern(password, buf),
    }
}

fn apply_modern(password: &[u8], buf: &mut [u8]) -> Result<(), CryptoError> {
    let mut salt_full: [u8; 32] = Sha256::digest(password).into();
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password, &salt_full[..16], PBKDF2_ITERATIONS, &mut key);

    let result = (|| {
        for (i, block) in buf.chunks_mut(BLOCK).enumerate() {
            let mut mac = HmacSha256::new_from_slice(&key)
                .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
            mac.update(KEYSTREAM_LABEL);
            mac.update(&(i as u64).to_be_bytes());
            let ks = mac.finalize().into_bytes();
            for (b, k) in block.iter_mut().zip(ks.iter()) {
                *b ^= k;
            }
        }
        Ok(())
    })();

    key.zeroize();
    salt_full.zeroize();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modern_roundtrip() {
        let mut data = b"some payload bytes that span more than one block....".to_vec();
        let orig = data.clone();
        apply_keystream(b"secret", &mut data, CipherMode::Modern).unwrap();
        assert_ne!(data, orig);
        apply_keystream(b"secret", &mut data, CipherMode::Modern).unwrap();
        assert_eq!(data, orig);
    }

    #[test]
    fn modern_wrong_password_differs() {
        let mut data = vec![0u8; 64];
        apply_keystream(b"pw", &mut data, CipherMode::Modern).unwrap();
        let mut other = vec![0u8; 64];
        apply_keystream(b"px", &mut other, CipherMode::Modern).unwrap();
        assert_ne!(data, other);
    }

    #[test]
    fn legacy_mode_is_repeat_xor() {
        // Bit-exactness contract for archives written by old builds.
        let mut data = b"ABCDEFG".to_vec();
        apply_keystream(b"key", &mut data, CipherMode::LegacyXor).unwrap();
        let expected: Vec<u8> = b"ABCDEFG"
            .iter()
            .zip(b"keykeyk".iter())
            .map(|(a, k)| a ^ k)
            .collect();
        assert_eq!(data, expected);
    }

    #[test]
    fn empty_password_or_buffer_is_noop() {
        let mut data = b"payload".to_vec();
        apply_keystream(b"", &mut data, CipherMode::Modern).unwrap();
        assert_eq!(data, b"payload");

        let mut empty: Vec<u8> = Vec::new();
        apply_keystream(b"pw", &mut empty, CipherMode::Modern).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn keystream_blocks_are_position_dependent() {
        let mut data = vec![0u8; 96];
        apply_keystream(b"pw", &mut data, CipherMode::Modern).unwrap();
        assert_ne!(&data[0..32], &data[32..64]);
        assert_ne!(&data[32..64], &data[64..96]);
    }
}
