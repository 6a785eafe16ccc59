//! Seam for foreign container formats (ZIP/TAR/7z/...).
//!
//! The native engine neither parses nor writes foreign formats.  When a
//! path is not a BAARv1 container the caller may route the operation to an
//! implementation of [`ForeignArchiver`]; this crate only defines the
//! contract and the routing probe.  Exit codes follow the engine
//! convention (0 success, 1 failure, 2 data errors).

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::header::MAGIC;

/// Contract for a multi-format archive backend.
pub trait ForeignArchiver {
    fn is_supported(&self, path: &Path) -> bool;
    fn list(&self, path: &Path, json: bool, verbose: bool) -> i32;
    fn extract(&self, path: &Path, dest_dir: &Path, password: Option<&str>) -> i32;
    fn extract_single(
        &self,
        path: &Path,
        entry_name: &str,
        dest_dir: &Path,
        password: Option<&str>,
    ) -> i32;
    fn extract_to_path(
        &self,
        path: &Path,
        entry_name: &str,
        dest_path: &Path,
        password: Option<&str>,
    ) -> i32;
    fn test(&self, path: &Path, password: Option<&str>) -> i32;
    fn add_files(
        &self,
        path: &Path,
        file_paths: &[&Path],
        compression_level: u8,
        password: Option<&str>,
        verbose: bool,
    ) -> i32;
    fn get_format(&self, path: &Path) -> String;
}

/// True when the file starts with the native magic.  A missing or short
/// file is not native; creation paths handle those separately.
pub fn is_native(path: &Path) -> bool {
    let mut buf = [0u8; 6];
    match File::open(path).and_then(|mut f| f.read_exact(&mut buf)) {
        Ok(()) => &buf == MAGIC,
        Err(_) => false,
    }
}

/// Pick the foreign backend for a non-native container, if one applies.
pub fn route<'a>(
    adapter: Option<&'a dyn ForeignArchiver>,
    path: &Path,
) -> Option<&'a dyn ForeignArchiver> {
    if is_native(path) {
        return None;
    }
    adapter.filter(|a| a.is_supported(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_probe() {
        let dir = tempfile::tempdir().unwrap();
        let native = dir.path().join("n.baar");
        std::fs::write(&native, b"BAARv1\0\0restofheader").unwrap();
        assert!(is_native(&native));

        let foreign = dir.path().join("f.zip");
        std::fs::write(&foreign, b"PK\x03\x04").unwrap();
        assert!(!is_native(&foreign));
        assert!(!is_native(&dir.path().join("missing")));
    }

    struct ZipStub;

    impl ForeignArchiver for ZipStub {
        fn is_supported(&self, path: &Path) -> bool {
            path.extension().is_some_and(|e| e == "zip")
        }
        fn list(&self, _: &Path, _: bool, _: bool) -> i32 { 0 }
        fn extract(&self, _: &Path, _: &Path, _: Option<&str>) -> i32 { 0 }
        fn extract_single(&self, _: &Path, _: &str, _: &Path, _: Option<&str>) -> i32 { 0 }
        fn extract_to_path(&self, _: &Path, _: &str, _: &Path, _: Option<&str>) -> i32 { 0 }
        fn test(&self, _: &Path, _: Option<&str>) -> i32 { 0 }
        fn add_files(&self, _: &Path, _: &[&Path], _: u8, _: Option<&str>, _: bool) -> i32 { 0 }
        fn get_format(&self, _: &Path) -> String { "zip".into() }
    }

    #[test]
    fn routing_prefers_native_and_consults_the_adapter() {
        let dir = tempfile::tempdir().unwrap();
        let native = dir.path().join("n.baar");
        std::fs::write(&native, b"BAARv1\0\0x").unwrap();
        let foreign = dir.path().join("f.zip");
        std::fs::write(&foreign, b"PK\x03\x04").unwrap();

        let stub = ZipStub;
        assert!(route(Some(&stub), &native).is_none());
        let routed = route(Some(&stub), &foreign).expect("zip goes to the adapter");
        assert_eq!(routed.get_format(&foreign), "zip");
        assert!(route(None, &foreign).is_none());
    }
}
