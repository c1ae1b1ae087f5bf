//! Content hashing for replica integrity checks
//!
//! Digests are only compared between two copies of the same file; they are
//! never used for addressing or deduplication.

use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::Result;

/// Read buffer size used while streaming file content through the hasher
const HASH_BLOCK_SIZE: usize = 64 * 1024;

/// Hex-encoded SHA-256 of an in-memory buffer
pub fn digest_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hex-encoded SHA-256 of everything a reader yields, in fixed-size blocks
pub async fn digest_reader<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut block = vec![0u8; HASH_BLOCK_SIZE];

    loop {
        let n = reader.read(&mut block).await?;
        if n == 0 {
            break;
        }
        hasher.update(&block[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hex-encoded SHA-256 of a file, streamed so size is not bounded by memory
pub async fn digest_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    digest_reader(&mut file).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            digest_bytes(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[tokio::test]
    async fn test_file_digest_matches_buffer_digest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("large.bin");

        // Spans several hash blocks with a partial last block
        let data: Vec<u8> = (0..(HASH_BLOCK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        assert_eq!(digest_file(&path).await.unwrap(), digest_bytes(&data));
    }

    #[tokio::test]
    async fn test_digest_differs_on_single_byte_change() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hellx").unwrap();

        assert_ne!(digest_file(&path).await.unwrap(), digest_bytes(b"hello"));
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let err = digest_file(&dir.path().join("absent")).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
