//! Content hashing per the node-id grammar: SHA-512 digest, URL-safe base64,
//! `=` padding retained.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE as B64;
use sha2::{Digest, Sha512};

/// SHA-512 over `bytes`, URL-safe base64 encoded with padding retained.
pub fn sha512_base64(bytes: &[u8]) -> String {
    let digest = Sha512::digest(bytes);
    B64.encode(digest)
}

/// Streaming SHA-512 hasher for files too large to read fully into memory at once.
pub struct StreamingHasher {
    inner: Sha512,
}

impl Default for StreamingHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingHasher {
    pub fn new() -> Self {
        Self {
            inner: Sha512::new(),
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
    }

    pub fn finish(self) -> String {
        B64.encode(self.inner.finalize())
    }
}

/// Hash a file's contents from disk, in fixed-size chunks, without loading the whole file.
pub fn sha512_base64_file(path: &std::path::Path) -> std::io::Result<String> {
    use std::io::Read;
    let mut file = std::fs::File::open(path)?;
    let mut hasher = StreamingHasher::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = sha512_base64(b"hello world");
        let b = sha512_base64(b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn streaming_hash_matches_one_shot() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let one_shot = sha512_base64(data);
        let mut streaming = StreamingHasher::new();
        streaming.update(&data[..10]);
        streaming.update(&data[10..]);
        assert_eq!(one_shot, streaming.finish());
    }

    #[test]
    fn file_hash_matches_in_memory_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, b"some pdf bytes").unwrap();
        let expected = sha512_base64(b"some pdf bytes");
        assert_eq!(sha512_base64_file(&path).unwrap(), expected);
    }
}
