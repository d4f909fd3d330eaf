//! Key-space types
//!
//! Every index of the storage engine is keyed by these types. `Id160` is a
//! 160-bit unsigned identifier stored big-endian, so the derived byte-wise
//! ordering equals numeric ordering. `StorageKey` is ordered lexicographically
//! over its components, which makes a fixed `(location, domain)` prefix a
//! contiguous range of keys bounded by `LocationDomain::min` and `max`.

use std::fmt;
use std::ops::BitXor;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::Error;
use crate::result::Result;

/// Number of bytes in an `Id160`
pub const ID_LENGTH: usize = 20;

/// A 160-bit identifier used for peer IDs and location, domain and content keys
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Id160([u8; ID_LENGTH]);

impl Id160 {
    /// The all-zero identifier, the neutral element of XOR
    pub const ZERO: Id160 = Id160([0u8; ID_LENGTH]);

    /// The largest identifier
    pub const MAX: Id160 = Id160([0xffu8; ID_LENGTH]);

    /// Create an identifier from its big-endian byte representation
    pub const fn new(bytes: [u8; ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Create an identifier from a slice, which must be exactly 20 bytes long
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let array: [u8; ID_LENGTH] = bytes.try_into().map_err(|_| {
            Error::invalid_key(format!(
                "expected {} bytes, got {}",
                ID_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    /// Parse an identifier from 40 hex digits
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        Self::from_bytes(&bytes)
    }

    /// Create an identifier whose low-order 64 bits are `value`
    pub fn from_u64(value: u64) -> Self {
        let mut bytes = [0u8; ID_LENGTH];
        bytes[ID_LENGTH - 8..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }

    /// Derive an identifier by hashing arbitrary data (truncated SHA-256)
    pub fn hash_of(data: impl AsRef<[u8]>) -> Self {
        let digest = Sha256::digest(data.as_ref());
        let mut bytes = [0u8; ID_LENGTH];
        bytes.copy_from_slice(&digest[..ID_LENGTH]);
        Self(bytes)
    }

    /// Bitwise XOR of two identifiers
    pub fn xor(&self, other: &Id160) -> Id160 {
        let mut bytes = [0u8; ID_LENGTH];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        Id160(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Get the big-endian bytes of the identifier
    pub fn as_bytes(&self) -> &[u8; ID_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl BitXor for Id160 {
    type Output = Id160;

    fn bitxor(self, rhs: Id160) -> Id160 {
        self.xor(&rhs)
    }
}

impl fmt::Display for Id160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Id160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id160({})", self.to_hex())
    }
}

impl FromStr for Id160 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl From<u64> for Id160 {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl Serialize for Id160 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Id160 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Id160::from_hex(&s).map_err(de::Error::custom)
    }
}

/// A (location, domain) pair, the unit of domain protection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationDomain {
    pub location: Id160,
    pub domain: Id160,
}

impl LocationDomain {
    pub fn new(location: Id160, domain: Id160) -> Self {
        Self { location, domain }
    }

    /// The lowest storage key inside this pair
    pub fn min(&self) -> StorageKey {
        StorageKey::new(self.location, self.domain, Id160::ZERO)
    }

    /// The highest storage key inside this pair
    pub fn max(&self) -> StorageKey {
        StorageKey::new(self.location, self.domain, Id160::MAX)
    }
}

impl fmt::Display for LocationDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.location, self.domain)
    }
}

/// A (location, domain, content) triple identifying exactly one stored entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StorageKey {
    pub location: Id160,
    pub domain: Id160,
    pub content: Id160,
}

impl StorageKey {
    pub fn new(location: Id160, domain: Id160, content: Id160) -> Self {
        Self {
            location,
            domain,
            content,
        }
    }

    /// The (location, domain) pair governing this key's protection
    pub fn location_domain(&self) -> LocationDomain {
        LocationDomain::new(self.location, self.domain)
    }

    /// The lowest storage key under `location`
    pub fn location_min(location: Id160) -> StorageKey {
        StorageKey::new(location, Id160::ZERO, Id160::ZERO)
    }

    /// The highest storage key under `location`
    pub fn location_max(location: Id160) -> StorageKey {
        StorageKey::new(location, Id160::MAX, Id160::MAX)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.location, self.domain, self.content)
    }
}

/// An opaque public key, compared by value.
///
/// Keys arrive already verified from the request layer; this type only
/// carries their encoded bytes.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        if bytes.is_empty() {
            return Err(Error::invalid_key("public key must not be empty"));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl FromStr for PublicKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_hex(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ordering_is_numeric() {
        assert!(Id160::ZERO < Id160::from_u64(1));
        assert!(Id160::from_u64(255) < Id160::from_u64(256));
        assert!(Id160::from_u64(u64::MAX) < Id160::MAX);

        let mut high = [0u8; ID_LENGTH];
        high[0] = 1;
        assert!(Id160::from_u64(u64::MAX) < Id160::new(high));
    }

    #[test]
    fn test_hex_round_trip_and_errors() {
        let id = Id160::hash_of("location");
        let parsed: Id160 = id.to_hex().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(id.to_hex().len(), 40);

        assert!(matches!(Id160::from_hex("abcd"), Err(Error::InvalidKey(_))));
        assert!(matches!(Id160::from_hex("zz"), Err(Error::InvalidKey(_))));
        assert!(Id160::from_bytes(&[0u8; 21]).is_err());
    }

    #[test]
    fn test_storage_key_order_is_lexicographic() {
        let a = StorageKey::new(1.into(), Id160::MAX, Id160::MAX);
        let b = StorageKey::new(2.into(), Id160::ZERO, Id160::ZERO);
        assert!(a < b);

        let c = StorageKey::new(1.into(), 5.into(), Id160::MAX);
        let d = StorageKey::new(1.into(), 6.into(), Id160::ZERO);
        assert!(c < d);

        let ld = LocationDomain::new(1.into(), 5.into());
        assert!(ld.min() <= c && c <= ld.max());
        assert!(StorageKey::location_min(1.into()) <= a);
        assert!(a <= StorageKey::location_max(1.into()));
    }

    #[test]
    fn test_serde_uses_hex() {
        let key = StorageKey::new(1.into(), 2.into(), 3.into());
        let json = serde_json::to_string(&key).unwrap();
        assert!(json.contains(&Id160::from_u64(3).to_hex()));
        let back: StorageKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);

        let pk = PublicKey::new(vec![0xde, 0xad]);
        assert_eq!(serde_json::to_string(&pk).unwrap(), "\"dead\"");
        assert!(PublicKey::from_hex("").is_err());
    }

    fn arb_id() -> impl Strategy<Value = Id160> {
        any::<[u8; ID_LENGTH]>().prop_map(Id160::new)
    }

    proptest! {
        #[test]
        fn xor_is_self_inverse(a in arb_id(), b in arb_id()) {
            prop_assert_eq!((a ^ b) ^ b, a);
            prop_assert!((a ^ a).is_zero());
            prop_assert_eq!(a ^ Id160::ZERO, a);
        }

        #[test]
        fn xor_is_commutative_and_associative(a in arb_id(), b in arb_id(), c in arb_id()) {
            prop_assert_eq!(a ^ b, b ^ a);
            prop_assert_eq!((a ^ b) ^ c, a ^ (b ^ c));
        }
    }
}
