//! Lockup scripts and the key material they reference.

use crate::codec::put_len;
use crate::{CodecError, CodecResult, Decode, Encode, GroupIndex, Hash, Reader};
use ed25519_dalek::{Signature as DalekSignature, VerifyingKey};
use std::fmt;

/// Hash of a public key, the payee identity in P2PKH/P2MPKH lockups.
pub type PublicKeyHash = Hash;

/// An Ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Wrap raw key bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        PublicKey(bytes)
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Blake2b-256 of the key bytes.
    pub fn hash(&self) -> PublicKeyHash {
        Hash::hash(&self.0)
    }

    /// Verify `signature` over `message` with this key.
    ///
    /// An undecodable key or signature simply fails verification; the
    /// distinction does not matter to consensus.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let sig = DalekSignature::from_bytes(&signature.0);
        key.verify_strict(message, &sig).is_ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.0))
    }
}

impl Encode for PublicKey {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.0);
    }
}

impl Decode for PublicKey {
    fn decode(reader: &mut Reader<'_>) -> CodecResult<Self> {
        let bytes = reader.get_bytes(32)?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        Ok(PublicKey(arr))
    }
}

/// An Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; 64]);

impl Signature {
    /// Wrap raw signature bytes.
    pub const fn from_bytes(bytes: [u8; 64]) -> Self {
        Signature(bytes)
    }

    /// The all-zero signature carried by coinbase transactions.
    pub const fn zero() -> Self {
        Signature([0u8; 64])
    }

    /// The raw signature bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Whether this is the all-zero signature.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 64]
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(&self.0[..8]))
    }
}

impl Encode for Signature {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.0);
    }
}

impl Decode for Signature {
    fn decode(reader: &mut Reader<'_>) -> CodecResult<Self> {
        let bytes = reader.get_bytes(64)?;
        let mut arr = [0u8; 64];
        arr.copy_from_slice(bytes);
        Ok(Signature(arr))
    }
}

/// Spending condition attached to an output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockupScript {
    /// Pay to the holder of the key hashing to `pub_key_hash`.
    P2pkh {
        /// Blake2b-256 of the payee public key.
        pub_key_hash: PublicKeyHash,
    },
    /// Pay to `m` of the listed key hashes, unlocked in index order.
    P2mpkh {
        /// Hashes of the eligible public keys.
        pub_key_hashes: Vec<PublicKeyHash>,
        /// Threshold; at most `pub_key_hashes.len()`.
        m: u32,
    },
    /// Pay to the script hashing to `script_hash`.
    P2sh {
        /// Blake2b-256 of the unlock script bytes.
        script_hash: Hash,
    },
}

impl LockupScript {
    /// Convenience constructor for a single-key lockup.
    pub fn p2pkh(key: &PublicKey) -> Self {
        LockupScript::P2pkh {
            pub_key_hash: key.hash(),
        }
    }

    /// Script hint deciding which group an output belongs to: the first
    /// four big-endian bytes of the lockup hash.
    pub fn script_hint(&self) -> u32 {
        let hash = Hash::hash(&self.encode_to_vec());
        let bytes = hash.as_bytes();
        u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    /// The group this lockup's outputs live in.
    pub fn group_index(&self, groups: u32) -> GroupIndex {
        GroupIndex::from_hint(self.script_hint(), groups)
    }
}

impl Encode for LockupScript {
    fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            LockupScript::P2pkh { pub_key_hash } => {
                buf.push(0);
                pub_key_hash.encode(buf);
            }
            LockupScript::P2mpkh { pub_key_hashes, m } => {
                buf.push(1);
                put_len(buf, pub_key_hashes.len());
                for hash in pub_key_hashes {
                    hash.encode(buf);
                }
                m.encode(buf);
            }
            LockupScript::P2sh { script_hash } => {
                buf.push(2);
                script_hash.encode(buf);
            }
        }
    }
}

impl Decode for LockupScript {
    fn decode(reader: &mut Reader<'_>) -> CodecResult<Self> {
        match reader.get_u8()? {
            0 => Ok(LockupScript::P2pkh {
                pub_key_hash: Hash::decode(reader)?,
            }),
            1 => {
                let pub_key_hashes = Vec::<Hash>::decode(reader)?;
                let m = reader.get_u32()?;
                Ok(LockupScript::P2mpkh { pub_key_hashes, m })
            }
            2 => Ok(LockupScript::P2sh {
                script_hash: Hash::decode(reader)?,
            }),
            tag => Err(CodecError::Invalid(format!("Bad lockup tag: {tag}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn keypair(seed: u8) -> (SigningKey, PublicKey) {
        let sk = SigningKey::from_bytes(&[seed; 32]);
        let pk = PublicKey::from_bytes(sk.verifying_key().to_bytes());
        (sk, pk)
    }

    #[test]
    fn test_verify_accepts_valid_signature() {
        let (sk, pk) = keypair(1);
        let msg = b"spend it";
        let sig = Signature::from_bytes(sk.sign(msg).to_bytes());
        assert!(pk.verify(msg, &sig));
        assert!(!pk.verify(b"spend it twice", &sig));
    }

    #[test]
    fn test_zero_signature_never_verifies() {
        let (_, pk) = keypair(2);
        assert!(!pk.verify(b"anything", &Signature::zero()));
        assert!(Signature::zero().is_zero());
    }

    #[test]
    fn test_lockup_roundtrip() {
        let (_, pk) = keypair(3);
        let scripts = vec![
            LockupScript::p2pkh(&pk),
            LockupScript::P2mpkh {
                pub_key_hashes: vec![Hash::hash(b"a"), Hash::hash(b"b")],
                m: 2,
            },
            LockupScript::P2sh {
                script_hash: Hash::hash(b"script"),
            },
        ];
        for script in scripts {
            let bytes = script.encode_to_vec();
            assert_eq!(LockupScript::decode_exact(&bytes).unwrap(), script);
        }
    }

    #[test]
    fn test_script_hint_stable_per_lockup() {
        let (_, pk) = keypair(4);
        let lockup = LockupScript::p2pkh(&pk);
        assert_eq!(lockup.script_hint(), lockup.script_hint());
        assert!(lockup.group_index(3).value() < 3);
    }
}
