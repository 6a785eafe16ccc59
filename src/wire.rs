//! Binary wire primitives.
//!
//! Every multi-byte integer in the container is little-endian; this is frozen
//! and never negotiated.  Strings are a 16-bit byte length followed by the
//! raw bytes — no terminator and no UTF-8 validation on disk.  Reads that
//! run off the end of the file surface as `FormatError::Truncated`.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::error::{read_failed, Error, Result};

pub fn read_u16<R: Read>(r: &mut R, what: &'static str) -> Result<u16> {
    r.read_u16::<LittleEndian>().map_err(|e| read_failed(what, e))
}

pub fn read_u32<R: Read>(r: &mut R, what: &'static str) -> Result<u32> {
    r.read_u32::<LittleEndian>().map_err(|e| read_failed(what, e))
}

pub fn read_u64<R: Read>(r: &mut R, what: &'static str) -> Result<u64> {
    r.read_u64::<LittleEndian>().map_err(|e| read_failed(what, e))
}

pub fn read_bytes<R: Read>(r: &mut R, len: usize, what: &'static str) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).map_err(|e| read_failed(what, e))?;
    Ok(buf)
}

/// Read a length-prefixed string.  The on-disk bytes are raw; anything that
/// is not valid UTF-8 is replaced lossily so the engine always works with
/// `String` names.
pub fn read_string<R: Read>(r: &mut R, what: &'static str) -> Result<String> {
    let len = read_u16(r, what)? as usize;
    let bytes = read_bytes(r, len, what)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn write_u16<W: Write>(w: &mut W, v: u16) -> Result<()> {
    w.write_u16::<LittleEndian>(v)?;
    Ok(())
}

pub fn write_u32<W: Write>(w: &mut W, v: u32) -> Result<()> {
    w.write_u32::<LittleEndian>(v)?;
    Ok(())
}

pub fn write_u64<W: Write>(w: &mut W, v: u64) -> Result<()> {
    w.write_u64::<LittleEndian>(v)?;
    Ok(())
}

/// Write a length-prefixed string.  Names longer than a u16 can address are
/// rejected rather than silently truncated.
pub fn write_string<W: Write>(w: &mut W, s: &str) -> Result<()> {
    let bytes = s.as_bytes();
    if bytes.len() > u16::MAX as usize {
        return Err(Error::InvalidArgument(format!(
            "string of {} bytes exceeds the 16-bit length prefix",
            bytes.len()
        )));
    }
    write_u16(w, bytes.len() as u16)?;
    w.write_all(bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn integers_roundtrip_little_endian() {
        let mut buf = Vec::new();
        write_u16(&mut buf, 0xBEEF).unwrap();
        write_u32(&mut buf, 0xDEAD_BEEF).unwrap();
        write_u64(&mut buf, 0x0123_4567_89AB_CDEF).unwrap();
        assert_eq!(&buf[..2], &[0xEF, 0xBE]);

        let mut c = Cursor::new(buf);
        assert_eq!(read_u16(&mut c, "t").unwrap(), 0xBEEF);
        assert_eq!(read_u32(&mut c, "t").unwrap(), 0xDEAD_BEEF);
        assert_eq!(read_u64(&mut c, "t").unwrap(), 0x0123_4567_89AB_CDEF);
    }

    #[test]
    fn string_roundtrip() {
        let mut buf = Vec::new();
        write_string(&mut buf, "dir/file.txt").unwrap();
        let mut c = Cursor::new(buf);
        assert_eq!(read_string(&mut c, "t").unwrap(), "dir/file.txt");
    }

    #[test]
    fn short_read_is_truncated() {
        let mut c = Cursor::new(vec![0x01u8]);
        let err = read_u32(&mut c, "index header").unwrap_err();
        assert!(err.to_string().contains("index header"));
    }
}
