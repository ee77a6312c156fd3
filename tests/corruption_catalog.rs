//! Corruption detection tests
//!
//! Damaged headers and catalog runs must be reported on open, never
//! silently accepted.

use chipstore::{Dtype, OpenFlags, StoreError, StoreFile, PAGE_SIZE};
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn sample_file(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("sample.cst");
    let mut file = StoreFile::open(&path, OpenFlags::CREATE).unwrap();
    file.add_header("chip-type", "HG-U133A").unwrap();
    let v = file.open_vector("v", Some(Dtype::Double), OpenFlags::CREATE).unwrap();
    for i in 0..2000 {
        v.push_back(i as f64).unwrap();
    }
    file.close().unwrap();
    path
}

fn overwrite(path: &Path, offset: u64, bytes: &[u8]) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
}

/// First page of the catalog run, read from the header
fn catalog_page(path: &Path) -> u64 {
    let mut header = [0u8; 32];
    let mut file = std::fs::File::open(path).unwrap();
    file.read_exact(&mut header).unwrap();
    u64::from_le_bytes(header[24..32].try_into().unwrap())
}

#[test]
fn test_bad_magic() {
    let dir = TempDir::new().unwrap();
    let path = sample_file(&dir);
    overwrite(&path, 0, b"CARTRIDG");

    assert!(!StoreFile::is_store_file(&path));
    assert!(matches!(StoreFile::open(&path, OpenFlags::OPEN), Err(StoreError::InvalidMagic)));
}

#[test]
fn test_future_major_version() {
    let dir = TempDir::new().unwrap();
    let path = sample_file(&dir);
    overwrite(&path, 8, &2u16.to_le_bytes());

    assert!(matches!(
        StoreFile::open(&path, OpenFlags::OPEN),
        Err(StoreError::UnsupportedVersion { major: 2, .. })
    ));
}

#[test]
fn test_damaged_catalog() {
    let dir = TempDir::new().unwrap();
    let path = sample_file(&dir);
    let page = catalog_page(&path);
    assert!(page > 0);
    overwrite(&path, page * PAGE_SIZE as u64 + 1, b"#");

    assert!(matches!(
        StoreFile::open(&path, OpenFlags::OPEN),
        Err(StoreError::ChecksumMismatch)
    ));
}

#[test]
fn test_truncated_file() {
    let dir = TempDir::new().unwrap();
    let path = sample_file(&dir);
    let page = catalog_page(&path);
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(page * PAGE_SIZE as u64).unwrap();
    drop(file);

    assert!(StoreFile::open(&path, OpenFlags::OPEN | OpenFlags::READONLY).is_err());
}
