//! 256-bit hashes.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use std::fmt;

/// Blake2b with 256-bit output, the hash function used throughout the chain.
pub type Blake2b256 = Blake2b<U32>;

/// Length of a hash in bytes.
pub const HASH_LENGTH: usize = 32;

/// A 256-bit hash value.
///
/// Opaque byte string defining ordering and equality; used for block ids,
/// transaction ids, output keys, and script hashes alike.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash([u8; HASH_LENGTH]);

impl Hash {
    /// The all-zero hash.
    pub const ZERO: Hash = Hash([0u8; HASH_LENGTH]);

    /// Wrap raw bytes as a hash.
    pub const fn from_bytes(bytes: [u8; HASH_LENGTH]) -> Self {
        Hash(bytes)
    }

    /// Parse a hash from a byte slice.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != HASH_LENGTH {
            return None;
        }
        let mut arr = [0u8; HASH_LENGTH];
        arr.copy_from_slice(bytes);
        Some(Hash(arr))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    /// Check whether this is the all-zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LENGTH]
    }

    /// Hash arbitrary bytes with Blake2b-256.
    pub fn hash(data: &[u8]) -> Self {
        let digest = Blake2b256::digest(data);
        let mut arr = [0u8; HASH_LENGTH];
        arr.copy_from_slice(&digest);
        Hash(arr)
    }

    /// Hash the concatenation of two hashes (Merkle node).
    pub fn combine(left: &Hash, right: &Hash) -> Self {
        let mut hasher = Blake2b256::new();
        hasher.update(left.0);
        hasher.update(right.0);
        let digest = hasher.finalize();
        let mut arr = [0u8; HASH_LENGTH];
        arr.copy_from_slice(&digest);
        Hash(arr)
    }
}

/// Hash the canonical encoding of a value.
pub fn hash_of<T: crate::Encode>(value: &T) -> Hash {
    let mut buf = Vec::new();
    value.encode(&mut buf);
    Hash::hash(&buf)
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", hex::encode(self.0))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
