//! Keyed selector hashing

use sha2::{Digest, Sha256};

/// Maps a selector to a row index in `[0, 2^bit_size)`.
///
/// SHA-256 over `key || 0x00 || selector`, first four digest bytes
/// big-endian, masked to `bit_size` bits. Deterministic for a given key.
#[derive(Debug, Clone)]
pub struct SelectorHasher {
    key: Vec<u8>,
    mask: u32,
}

impl SelectorHasher {
    pub fn new(key: &str, bit_size: u32) -> Self {
        let mask = if bit_size >= 32 {
            u32::MAX
        } else {
            (1u32 << bit_size) - 1
        };
        Self {
            key: key.as_bytes().to_vec(),
            mask,
        }
    }

    pub fn hash(&self, selector: &str) -> u32 {
        let mut hasher = Sha256::new();
        hasher.update(&self.key);
        hasher.update([0u8]);
        hasher.update(selector.as_bytes());
        let digest = hasher.finalize();

        u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) & self.mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        let hasher = SelectorHasher::new("secret", 12);
        assert_eq!(hasher.hash("alice@example.com"), hasher.hash("alice@example.com"));
    }

    #[test]
    fn test_hash_bounded_by_bit_size() {
        let hasher = SelectorHasher::new("secret", 3);
        for i in 0..200 {
            assert!(hasher.hash(&format!("sel-{}", i)) < 8);
        }
    }

    #[test]
    fn test_key_changes_rows() {
        let a = SelectorHasher::new("key-a", 24);
        let b = SelectorHasher::new("key-b", 24);
        let differing = (0..32)
            .filter(|i| {
                let sel = format!("sel-{}", i);
                a.hash(&sel) != b.hash(&sel)
            })
            .count();
        assert!(differing > 0);
    }
}
