//! 256-bit unsigned arithmetic for amounts, gas fees, and mining targets.

use num_bigint::BigUint;
use num_traits::{One, Zero};
use std::cmp::Ordering;
use std::fmt;

/// An unsigned 256-bit integer.
///
/// Backed by a `BigUint` kept within the 256-bit range; every arithmetic
/// operation is checked so balance sums can detect overflow explicitly.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct U256(BigUint);

impl U256 {
    /// Zero.
    pub fn zero() -> Self {
        U256(BigUint::zero())
    }

    /// One.
    pub fn one() -> Self {
        U256(BigUint::one())
    }

    /// The maximum representable value, `2^256 - 1`.
    pub fn max_value() -> Self {
        U256((BigUint::one() << 256u32) - BigUint::one())
    }

    /// Construct from a `u64`.
    pub fn from_u64(value: u64) -> Self {
        U256(BigUint::from(value))
    }

    /// Construct from a `u128`.
    pub fn from_u128(value: u128) -> Self {
        U256(BigUint::from(value))
    }

    /// Interpret 32 big-endian bytes.
    pub fn from_be_bytes(bytes: &[u8; 32]) -> Self {
        U256(BigUint::from_bytes_be(bytes))
    }

    /// Interpret a big-endian byte slice; fails if wider than 256 bits.
    pub fn from_be_slice(bytes: &[u8]) -> Option<Self> {
        let v = BigUint::from_bytes_be(bytes);
        if v.bits() > 256 {
            return None;
        }
        Some(U256(v))
    }

    /// Big-endian 32-byte encoding.
    pub fn to_be_bytes(&self) -> [u8; 32] {
        let raw = self.0.to_bytes_be();
        let mut out = [0u8; 32];
        out[32 - raw.len()..].copy_from_slice(&raw);
        out
    }

    /// Whether this value is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Checked addition; `None` on 256-bit overflow.
    pub fn checked_add(&self, other: &U256) -> Option<U256> {
        let sum = &self.0 + &other.0;
        if sum.bits() > 256 {
            return None;
        }
        Some(U256(sum))
    }

    /// Checked subtraction; `None` on underflow.
    pub fn checked_sub(&self, other: &U256) -> Option<U256> {
        if self.0 < other.0 {
            return None;
        }
        Some(U256(&self.0 - &other.0))
    }

    /// Checked multiplication; `None` on 256-bit overflow.
    pub fn checked_mul(&self, other: &U256) -> Option<U256> {
        let product = &self.0 * &other.0;
        if product.bits() > 256 {
            return None;
        }
        Some(U256(product))
    }

    /// Access the backing big integer (target/weight arithmetic).
    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    /// Wrap a big integer, clamping to the 256-bit maximum.
    pub fn from_biguint_clamped(value: BigUint) -> Self {
        if value.bits() > 256 {
            Self::max_value()
        } else {
            U256(value)
        }
    }
}

impl PartialOrd for U256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for U256 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Debug for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U256({})", self.0)
    }
}

impl fmt::Display for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for U256 {
    fn from(value: u64) -> Self {
        U256::from_u64(value)
    }
}

impl From<u128> for U256 {
    fn from(value: u128) -> Self {
        U256::from_u128(value)
    }
}
