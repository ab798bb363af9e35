use std::io::Write;

use tempfile::NamedTempFile;
use visor_util::hash::{sha256_file, sha256_reader};

const HELLO: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

#[test]
fn test_sha256_reader_empty() {
    assert_eq!(
        sha256_reader(&b""[..]).unwrap(),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

#[test]
fn test_sha256_reader_spans_buffers() {
    let data = vec![b'v'; 20_000];
    let chunked = sha256_reader(&data[..]).unwrap();
    assert_eq!(chunked.len(), 64);
    assert_eq!(chunked, sha256_reader(std::io::Cursor::new(data)).unwrap());
}

#[test]
fn test_sha256_file() {
    let mut tmp = NamedTempFile::new().unwrap();
    tmp.write_all(b"hello").unwrap();
    tmp.flush().unwrap();
    assert_eq!(sha256_file(tmp.path()).unwrap(), HELLO);
}

#[test]
fn test_sha256_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    assert!(sha256_file(&dir.path().join("absent")).is_err());
}
