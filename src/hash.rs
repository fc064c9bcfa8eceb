// Content digests used to integrity-check uploads. The service receives
// the hex SHA-256 of the archive next to the archive itself.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{IoContext, Result};

const BLOCK_SIZE: usize = 4096;

/// Stream `path` through SHA-256 in fixed-size blocks and return the
/// lowercase hex digest.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path)
        .io_context(|| format!("open file for hashing: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; BLOCK_SIZE];

    loop {
        let read = reader
            .read(&mut buffer)
            .io_context(|| format!("read {} for hashing", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

pub fn sha256_bytes(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TEST_DATA_DIGEST: &str =
        "916f0027a575074ce72a331777c3478d6513f786a591bd892da1a577bf2335f9";

    #[test]
    fn known_digest_of_literal() {
        assert_eq!(sha256_bytes(b"test data"), TEST_DATA_DIGEST);
    }

    #[test]
    fn file_digest_matches_in_memory_digest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"test data").unwrap();
        file.flush().unwrap();

        let first = sha256_file(file.path()).unwrap();
        let second = sha256_file(file.path()).unwrap();
        assert_eq!(first, TEST_DATA_DIGEST);
        assert_eq!(first, second);
    }

    #[test]
    fn digest_spans_multiple_blocks() {
        let data: Vec<u8> = (0..BLOCK_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();
        file.flush().unwrap();

        assert_eq!(sha256_file(file.path()).unwrap(), sha256_bytes(&data));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = sha256_file(&dir.path().join("absent.tar")).unwrap_err();
        assert!(matches!(err, crate::error::Error::Io { .. }));
    }
}
