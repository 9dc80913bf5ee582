//! Merkle-style content hashing.
//!
//! A node hashes its type and name; a link hashes its type, arity and the
//! already-computed hashes of its outgoing atoms. Digests are blake3
//! truncated to 64 bits, so they are stable across processes.

use crate::types::Type;

/// 64-bit digest of an atom's immutable content.
pub type ContentHash = u64;

/// Sentinel for "not yet computed". Never returned by [`ContentHasher::finish`].
pub const INVALID_HASH: ContentHash = u64::MAX;

/// Incremental hasher combining an atom's fields into a [`ContentHash`].
pub struct ContentHasher {
    inner: blake3::Hasher,
}

impl ContentHasher {
    pub fn node(t: Type) -> Self {
        Self::tagged(b"node", t)
    }

    pub fn link(t: Type) -> Self {
        Self::tagged(b"link", t)
    }

    fn tagged(tag: &[u8], t: Type) -> Self {
        let mut inner = blake3::Hasher::new();
        inner.update(tag);
        inner.update(&t.raw().to_le_bytes());
        Self { inner }
    }

    pub fn update_str(&mut self, s: &str) -> &mut Self {
        self.update_len(s.len());
        self.inner.update(s.as_bytes());
        self
    }

    pub fn update_len(&mut self, n: usize) -> &mut Self {
        self.inner.update(&(n as u64).to_le_bytes());
        self
    }

    pub fn update_hash(&mut self, h: ContentHash) -> &mut Self {
        self.inner.update(&h.to_le_bytes());
        self
    }

    pub fn finish(&self) -> ContentHash {
        let digest = self.inner.finalize();
        let mut first = [0u8; 8];
        first.copy_from_slice(&digest.as_bytes()[..8]);
        let h = u64::from_le_bytes(first);
        if h == INVALID_HASH {
            INVALID_HASH - 1
        } else {
            h
        }
    }
}
